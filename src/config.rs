use std::collections::BTreeMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::error::{DeployerError, Result};

/// Which top-level action the CLI was invoked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Deploy,
    Download,
}

/// Output format for the terminal summary.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Beta/gated resource types, each controlled by its own environment
/// variable so they can be enabled per-tenant without a code change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureFlag {
    OpenPipeline,
    Segments,
    SloV2,
    SettingsAccessControl,
    PlatformToken,
}

impl FeatureFlag {
    fn env_var(self) -> &'static str {
        match self {
            FeatureFlag::OpenPipeline => "FEATURE_FLAG_OPENPIPELINE",
            FeatureFlag::Segments => "FEATURE_FLAG_SEGMENTS",
            FeatureFlag::SloV2 => "FEATURE_FLAG_SLO_V2",
            FeatureFlag::SettingsAccessControl => "FEATURE_FLAG_SETTINGS_ACCESS_CONTROL",
            FeatureFlag::PlatformToken => "FEATURE_FLAG_PLATFORM_TOKEN",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            FeatureFlag::OpenPipeline => "openpipeline",
            FeatureFlag::Segments => "segments",
            FeatureFlag::SloV2 => "slo-v2",
            FeatureFlag::SettingsAccessControl => "settings-access-control",
            FeatureFlag::PlatformToken => "platform-token",
        }
    }
}

/// Feature flags read once at configuration-assembly time — per the design
/// notes, gating happens at load time so the dispatcher never has to ask
/// "is this enabled?" on the hot path.
#[derive(Debug, Clone, Default)]
pub struct FeatureFlags {
    enabled: BTreeMap<&'static str, bool>,
}

impl FeatureFlags {
    pub fn from_env() -> Self {
        let mut enabled = BTreeMap::new();
        for flag in [
            FeatureFlag::OpenPipeline,
            FeatureFlag::Segments,
            FeatureFlag::SloV2,
            FeatureFlag::SettingsAccessControl,
            FeatureFlag::PlatformToken,
        ] {
            let value = env::var(flag.env_var()).map(|v| v == "1" || v.eq_ignore_ascii_case("true")).unwrap_or(false);
            enabled.insert(flag.name(), value);
        }
        Self { enabled }
    }

    pub fn is_enabled(&self, flag: FeatureFlag) -> bool {
        self.enabled.get(flag.name()).copied().unwrap_or(false)
    }
}

/// Per-environment connection details resolved from `URL_<ENV>` /
/// `TOKEN_<ENV>` / `OAUTH_CLIENT_ID_<ENV>` / `OAUTH_CLIENT_SECRET_<ENV>`.
#[derive(Debug, Clone)]
pub struct EnvironmentTarget {
    pub name: String,
    pub url: String,
    pub token: Option<String>,
    pub oauth_client_id: Option<String>,
    pub oauth_client_secret: Option<String>,
}

impl EnvironmentTarget {
    fn from_env(name: &str) -> Result<Self> {
        let upper = name.to_ascii_uppercase().replace(['-', '.'], "_");
        let url = env::var(format!("URL_{upper}")).map_err(|_| {
            DeployerError::Config(format!("missing URL_{upper} for environment '{name}'"))
        })?;
        let token = env::var(format!("TOKEN_{upper}")).ok();
        let oauth_client_id = env::var(format!("OAUTH_CLIENT_ID_{upper}")).ok();
        let oauth_client_secret = env::var(format!("OAUTH_CLIENT_SECRET_{upper}")).ok();
        if token.is_none() && (oauth_client_id.is_none() || oauth_client_secret.is_none()) {
            return Err(DeployerError::Config(format!(
                "environment '{name}' needs either TOKEN_{upper} or both OAUTH_CLIENT_ID_{upper} and OAUTH_CLIENT_SECRET_{upper}"
            )));
        }
        Ok(Self {
            name: name.to_string(),
            url,
            token,
            oauth_client_id,
            oauth_client_secret,
        })
    }
}

/// Global flags shared by `deploy` and `download`.
#[derive(Debug, Args, Clone)]
pub struct CommonArgs {
    /// Path to the manifest describing projects, groups, and environments.
    #[arg(long)]
    pub manifest: PathBuf,

    /// Limit the run to these environments (repeatable); defaults to every
    /// environment named in the manifest.
    #[arg(long = "environment")]
    pub environments: Vec<String>,

    /// Limit the run to these groups (repeatable); defaults to every group.
    #[arg(long = "group")]
    pub groups: Vec<String>,

    /// Build the plan and resolve parameters but issue no API calls.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Keep deploying unaffected environments/components after a failure.
    #[arg(long, default_value_t = false)]
    pub continue_on_error: bool,

    /// Maximum number of in-flight API calls per environment.
    #[arg(long, default_value_t = 5)]
    pub concurrency: usize,

    #[arg(long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Emit debug-level logs.
    #[arg(long, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Args, Clone)]
pub struct DownloadArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Directory downloaded configs are written under; defaults to
    /// `download_<timestamp>`.
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(
    name = "dtcd",
    version,
    about = "Materializes Dynatrace tenant configuration as code.",
    long_about = "Deploys a loaded project graph onto one or more Dynatrace environments, or reads a live environment back into source form. Environment credentials are read from URL_<ENV>/TOKEN_<ENV> (or OAUTH_CLIENT_ID_<ENV>/OAUTH_CLIENT_SECRET_<ENV>) environment variables."
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Deploy the loaded project graph onto the selected environments.
    Deploy(CommonArgs),
    /// Read the selected environments back into source form.
    Download(DownloadArgs),
}

/// Fully resolved configuration for one invocation: merges CLI flags with
/// environment-variable credentials and feature flags. Validation failures
/// surface before any deployment work begins.
#[derive(Debug, Clone)]
pub struct DeployerConfig {
    pub action: Action,
    pub manifest: PathBuf,
    pub environments: Vec<EnvironmentTarget>,
    pub groups: Vec<String>,
    pub dry_run: bool,
    pub continue_on_error: bool,
    pub concurrency: usize,
    pub output: OutputFormat,
    pub verbose: bool,
    pub feature_flags: FeatureFlags,
    pub http_timeout: Duration,
    pub download_output_dir: Option<PathBuf>,
}

impl DeployerConfig {
    pub fn from_env_and_args(cli: CliArgs) -> Result<Self> {
        let (action, common, download_output_dir) = match cli.command {
            Command::Deploy(args) => (Action::Deploy, args, None),
            Command::Download(args) => (Action::Download, args.common, args.output_dir),
        };

        if !common.manifest.exists() {
            return Err(DeployerError::Load(format!(
                "manifest path {} does not exist",
                common.manifest.display()
            )));
        }

        let environment_names = if common.environments.is_empty() {
            return Err(DeployerError::Config(
                "at least one --environment must be specified".to_string(),
            ));
        } else {
            common.environments.clone()
        };

        let mut environments = Vec::with_capacity(environment_names.len());
        for name in &environment_names {
            environments.push(EnvironmentTarget::from_env(name)?);
        }

        Ok(Self {
            action,
            manifest: common.manifest,
            environments,
            groups: common.groups,
            dry_run: common.dry_run,
            continue_on_error: common.continue_on_error,
            concurrency: common.concurrency.max(1),
            output: common.output,
            verbose: common.verbose,
            feature_flags: FeatureFlags::from_env(),
            http_timeout: Duration::from_secs(30),
            download_output_dir,
        })
    }
}

#[cfg(test)]
#[allow(unsafe_code)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn base_args() -> Vec<&'static str> {
        vec!["dtcd", "deploy", "--manifest", "Cargo.toml", "--environment", "prod"]
    }

    #[test]
    fn requires_url_env_var() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::remove_var("URL_PROD");
            env::remove_var("TOKEN_PROD");
        }
        let cli = CliArgs::parse_from(base_args());
        let err = DeployerConfig::from_env_and_args(cli).unwrap_err();
        assert!(format!("{err}").contains("URL_PROD"));
    }

    #[test]
    fn builds_config_from_token_env_vars() {
        let _guard = ENV_LOCK.lock().unwrap();
        unsafe {
            env::set_var("URL_PROD", "https://abc.live.dynatrace.com");
            env::set_var("TOKEN_PROD", "dt0c01.sometoken");
        }
        let cli = CliArgs::parse_from(base_args());
        let config = DeployerConfig::from_env_and_args(cli).expect("config builds");
        assert_eq!(config.environments.len(), 1);
        assert_eq!(config.environments[0].url, "https://abc.live.dynatrace.com");
        unsafe {
            env::remove_var("URL_PROD");
            env::remove_var("TOKEN_PROD");
        }
    }

    #[test]
    fn feature_flags_default_to_disabled() {
        let flags = FeatureFlags::from_env();
        assert!(!flags.is_enabled(FeatureFlag::OpenPipeline));
    }
}
