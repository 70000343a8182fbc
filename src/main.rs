use clap::Parser;

use dynatrace_config_deployer::apply;
use dynatrace_config_deployer::config::{CliArgs, DeployerConfig};
use dynatrace_config_deployer::telemetry;

#[tokio::main]
async fn main() {
    let cli = CliArgs::parse();
    let config = match DeployerConfig::from_env_and_args(cli) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(2);
        }
    };

    if let Err(err) = telemetry::init(&config) {
        eprintln!("failed to initialize logging: {err}");
        std::process::exit(2);
    }

    match apply::run(config).await {
        Ok(errors) => {
            if errors.is_empty() {
                std::process::exit(0);
            } else {
                eprintln!("{errors}");
                std::process::exit(1);
            }
        }
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(2);
        }
    }
}
