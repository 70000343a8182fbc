//! Top-level orchestration: loads the project graph, fans deployment out
//! across selected environments, or drives the downloader, then reports the
//! outcome. This is the one place that ties the engine's independent pieces
//! (manifest, scheduler, downloader, report) into the two verbs the CLI
//! exposes.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn};

use crate::client::{EnvironmentClients, HttpTransport, RetryPolicy, StaticTokenProvider, TokenProvider};
use crate::config::{Action, DeployerConfig, EnvironmentTarget};
use crate::coordinate::Coordinate;
use crate::downloader::{self, DownloadKind};
use crate::error::{DeployerError, DeploymentErrors, Result};
use crate::manifest::{FileManifestLoader, ManifestLoader};
use crate::model::{Config, ConfigType};
use crate::report::{self, ReportEntry, ReportState};
use crate::scheduler::{self, EnvironmentOutcome};

/// Runs the action named by `config` to completion and returns the
/// per-environment errors collected along the way. An `Err` return means the
/// run never got as far as attempting a deployment (bad manifest, bad
/// credentials); `Ok` with non-empty errors means it ran but some configs
/// failed.
pub async fn run(config: DeployerConfig) -> Result<DeploymentErrors> {
    let environment_names: Vec<String> = config.environments.iter().map(|t| t.name.clone()).collect();

    let loader = FileManifestLoader;
    let configs = loader.load(&config.manifest, &environment_names)?;
    let (configs, excluded_by_group) = filter_by_groups(configs, &config.groups);

    match config.action {
        Action::Deploy => run_deploy(&config, configs, excluded_by_group).await,
        Action::Download => {
            run_download(&config, configs).await?;
            Ok(DeploymentErrors::default())
        }
    }
}

/// Splits `configs` into those whose group was selected and those dropped by
/// `--group` — the dropped half is reported as `EXCLUDED` rather than simply
/// vanishing, per the report state set named in the design notes.
fn filter_by_groups(configs: Vec<Config>, groups: &[String]) -> (Vec<Config>, Vec<Config>) {
    if groups.is_empty() {
        return (configs, Vec::new());
    }
    configs.into_iter().partition(|c| groups.contains(&c.group))
}

async fn run_deploy(config: &DeployerConfig, configs: Vec<Config>, excluded_by_group: Vec<Config>) -> Result<DeploymentErrors> {
    let cancellation = CancellationToken::new();
    let mut handles = Vec::with_capacity(config.environments.len());
    let mut report_entries: Vec<ReportEntry> = excluded_by_group
        .iter()
        .map(|config| excluded_entry(config, &config.environment, "excluded by --group filter"))
        .collect();

    for target in &config.environments {
        let span = stage_span("deploy", &target.name, None);
        let _enter = span.enter();

        let environment_configs: Vec<Config> =
            configs.iter().filter(|c| c.environment == target.name).cloned().collect();

        if config.dry_run {
            info!(environment = %target.name, count = environment_configs.len(), "dry run: skipping API calls");
            for planned in &environment_configs {
                info!(coordinate = %planned.coordinate, group = %planned.group, "would deploy");
                report_entries.push(excluded_entry(planned, &target.name, "dry run: not deployed"));
            }
            continue;
        }

        let clients = build_clients(config, target)?;
        let feature_flags = Arc::new(config.feature_flags.clone());
        let concurrency = config.concurrency;
        let environment = target.name.clone();
        let cancellation = cancellation.clone();

        handles.push(tokio::spawn(async move {
            let outcome =
                scheduler::deploy_environment(&environment, environment_configs, clients, feature_flags, concurrency, cancellation)
                    .await;
            (environment, outcome)
        }));
    }

    let mut errors = DeploymentErrors::default();

    for handle in handles {
        let (environment, outcome) = handle.await.map_err(|err| DeployerError::Other(format!("deployment task panicked: {err}")))?;
        report_entries.extend(build_report_entries(&environment, &outcome, &configs));

        if !outcome.errors.is_empty() {
            error!(environment = %environment, count = outcome.errors.len(), "environment finished with errors");
            if !config.continue_on_error {
                cancellation.cancel();
            }
        } else {
            info!(environment = %environment, "environment deployed successfully");
        }
        errors.push(outcome.errors);
    }

    if let Some(report_path) = default_report_path(config) {
        if let Err(err) = report::append(&report_path, &report_entries) {
            warn!(%err, "failed to write deployment report");
        }
    }

    print_summary(config, &errors, &report_entries);
    Ok(errors)
}

fn excluded_entry(config: &Config, environment: &str, details: &str) -> ReportEntry {
    ReportEntry::new(config.config_type.name(), config.coordinate.clone(), environment, ReportState::Excluded, details)
}

async fn run_download(config: &DeployerConfig, configs: Vec<Config>) -> Result<()> {
    let output_dir = config
        .download_output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("download_{}", now_ts())));
    fs::create_dir_all(&output_dir)
        .map_err(|err| DeployerError::Load(format!("failed to create download directory {}: {err}", output_dir.display())))?;

    let kinds_by_project_group = kinds_from_loaded_configs(&configs);

    for target in &config.environments {
        let span = stage_span("download", &target.name, None);
        let _enter = span.enter();

        let clients = build_clients(config, target)?;
        for ((project, group), kinds) in &kinds_by_project_group {
            let outcome = downloader::download(&clients, project, group, kinds).await;
            for (kind, err) in outcome.errors() {
                warn!(%err, environment = %target.name, project, group, kind, "download of one kind failed");
            }
            write_downloaded_configs(&output_dir, &target.name, &outcome.configs)?;
        }
    }
    Ok(())
}

/// Reconstructs the set of kinds to request per `(project, group)` from the
/// already-loaded project graph: Dynatrace exposes no "list every config
/// type this tenant has" endpoint, so the download surface mirrors whatever
/// the manifest already declares for that project rather than a hardcoded
/// catalog of API ids.
fn kinds_from_loaded_configs(configs: &[Config]) -> BTreeMap<(String, String), Vec<DownloadKind>> {
    let mut seen: BTreeMap<(String, String), Vec<DownloadKind>> = BTreeMap::new();
    for config in configs {
        let key = (config.coordinate.project.clone(), config.group.clone());
        let kind = download_kind_for(&config.config_type);
        let entry = seen.entry(key).or_default();
        if !entry.iter().any(|existing| existing.label() == kind.label()) {
            entry.push(kind);
        }
    }
    seen
}

fn download_kind_for(config_type: &ConfigType) -> DownloadKind {
    match config_type {
        ConfigType::ClassicApi { api_id, unique_name, .. } => DownloadKind::ClassicApi {
            api_id: api_id.clone(),
            parent_scope: None,
            unique_name: *unique_name,
        },
        ConfigType::Settings {
            schema_id,
            schema_version,
            allow_all_user_permission,
            ordered,
        } => DownloadKind::Settings {
            schema_id: schema_id.clone(),
            schema_version: schema_version.clone(),
            scope: None,
            ordered: *ordered,
            allow_all_user_permission: *allow_all_user_permission,
        },
        ConfigType::Automation { resource } => DownloadKind::Automation { resource: *resource },
        ConfigType::Bucket => DownloadKind::Bucket,
        ConfigType::Document { kind, private } => DownloadKind::Document { kind: *kind, private: *private },
        ConfigType::OpenPipeline { kind } => DownloadKind::OpenPipeline { kind: kind.clone() },
        ConfigType::Segment => DownloadKind::Segment,
        ConfigType::Slo => DownloadKind::Slo,
    }
}

fn write_downloaded_configs(output_dir: &std::path::Path, environment: &str, configs: &[Config]) -> Result<()> {
    for config in configs {
        let project_dir = output_dir.join(environment).join(&config.coordinate.project);
        fs::create_dir_all(&project_dir)
            .map_err(|err| DeployerError::Load(format!("failed to create project directory {}: {err}", project_dir.display())))?;

        let config_path = project_dir.join(format!("{}.yaml", config.coordinate.config_id));
        let template_path = project_dir.join(format!("{}.json", config.coordinate.config_id));

        fs::write(&config_path, render_config_yaml(config))
            .map_err(|err| DeployerError::Load(format!("failed to write {}: {err}", config_path.display())))?;
        fs::write(&template_path, &config.template)
            .map_err(|err| DeployerError::Load(format!("failed to write {}: {err}", template_path.display())))?;
    }
    Ok(())
}

/// Emits a config file shaped like the one `FileManifestLoader` expects to
/// read back, so a downloaded project round-trips through `deploy` as-is.
fn render_config_yaml(config: &Config) -> String {
    let mut doc = serde_json::Map::new();
    doc.insert("group".to_string(), serde_json::Value::String(config.group.clone()));
    doc.insert(
        "template".to_string(),
        serde_json::Value::String(format!("{}.json", config.coordinate.config_id)),
    );
    if let Some(origin_object_id) = &config.origin_object_id {
        doc.insert("originObjectId".to_string(), serde_json::Value::String(origin_object_id.clone()));
    }
    match &config.config_type {
        ConfigType::ClassicApi { api_id, unique_name, .. } => {
            doc.insert("type".to_string(), serde_json::Value::String("classic-api".to_string()));
            doc.insert("apiId".to_string(), serde_json::Value::String(api_id.clone()));
            doc.insert("uniqueName".to_string(), serde_json::Value::Bool(*unique_name));
        }
        ConfigType::Bucket => {
            doc.insert("type".to_string(), serde_json::Value::String("bucket".to_string()));
        }
        other => {
            doc.insert("type".to_string(), serde_json::Value::String(other.name().to_string()));
        }
    }
    serde_yaml_bw::to_string(&serde_json::Value::Object(doc)).unwrap_or_default()
}

fn build_clients(config: &DeployerConfig, target: &EnvironmentTarget) -> Result<EnvironmentClients> {
    let token_provider: Arc<dyn TokenProvider> = if let Some(token) = &target.token {
        Arc::new(StaticTokenProvider::new(token.clone()))
    } else {
        return Err(DeployerError::Config(format!(
            "environment '{}' has no TOKEN_<ENV> configured; client-credentials token exchange is an external collaborator this crate does not implement",
            target.name
        )));
    };

    let transport = HttpTransport::new(
        target.url.clone(),
        target.name.clone(),
        token_provider,
        config.http_timeout,
        config.concurrency,
        RetryPolicy::default(),
    )?;
    Ok(EnvironmentClients::new(transport))
}

fn build_report_entries(environment: &str, outcome: &EnvironmentOutcome, configs: &[Config]) -> Vec<ReportEntry> {
    let mut entries = Vec::new();
    for config in configs.iter().filter(|c| c.environment == environment) {
        if let Some(entity) = outcome.entity_map.get(&config.coordinate) {
            let state = if entity.skip { ReportState::Skipped } else { ReportState::Success };
            entries.push(ReportEntry::new(
                config.config_type.name(),
                config.coordinate.clone(),
                environment,
                state,
                "deployment completed",
            ));
        }
    }
    for err in &outcome.errors.errors {
        if let Some(coordinate) = err.coordinate() {
            let config_type = configs
                .iter()
                .find(|c| &c.coordinate == coordinate)
                .map(|c| c.config_type.name())
                .unwrap_or("unknown");
            entries.push(
                ReportEntry::new(config_type, coordinate.clone(), environment, ReportState::Error, "deployment failed")
                    .with_error(err.to_string()),
            );
        }
    }
    entries
}

fn default_report_path(config: &DeployerConfig) -> Option<PathBuf> {
    config.download_output_dir.clone().map(|dir| dir.join("report.jsonl")).or_else(|| {
        config
            .manifest
            .parent()
            .map(|parent| parent.join("deployment_report.jsonl"))
    })
}

fn print_summary(config: &DeployerConfig, errors: &DeploymentErrors, entries: &[ReportEntry]) {
    let succeeded = entries.iter().filter(|e| e.state == ReportState::Success).count();
    let skipped = entries.iter().filter(|e| e.state == ReportState::Skipped).count();
    let failed = entries.iter().filter(|e| e.state == ReportState::Error).count();
    let excluded = entries.iter().filter(|e| e.state == ReportState::Excluded).count();

    match config.output {
        crate::config::OutputFormat::Json => {
            let summary = serde_json::json!({
                "succeeded": succeeded,
                "skipped": skipped,
                "failed": failed,
                "excluded": excluded,
            });
            println!("{summary}");
        }
        crate::config::OutputFormat::Text => {
            println!("deployment summary: {succeeded} succeeded, {skipped} skipped, {excluded} excluded, {failed} failed");
            if !errors.is_empty() {
                println!("{errors}");
            }
        }
    }
}

fn stage_span(stage: &str, environment: &str, project: Option<&str>) -> tracing::Span {
    info_span!("deployment", stage, environment, project = project.unwrap_or(""))
}

fn now_ts() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConfigType;
    use indexmap::IndexMap;

    fn sample_config(project: &str, group: &str, config_type: ConfigType, id: &str) -> Config {
        Config {
            coordinate: Coordinate::new(project, config_type.name(), id).unwrap(),
            group: group.to_string(),
            environment: "prod".to_string(),
            config_type,
            origin_object_id: None,
            template: "{}".to_string(),
            template_path: "x.json".to_string(),
            parameters: IndexMap::new(),
        }
    }

    #[test]
    fn filter_by_groups_keeps_only_named_groups_and_reports_the_rest_excluded() {
        let configs = vec![
            sample_config("p", "infra", ConfigType::Bucket, "a"),
            sample_config("p", "apps", ConfigType::Bucket, "b"),
        ];
        let (kept, excluded) = filter_by_groups(configs, &["infra".to_string()]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].coordinate.config_id, "a");
        assert_eq!(excluded.len(), 1);
        assert_eq!(excluded[0].coordinate.config_id, "b");
    }

    #[test]
    fn filter_by_groups_is_noop_when_empty() {
        let configs = vec![sample_config("p", "infra", ConfigType::Bucket, "a")];
        let (kept, excluded) = filter_by_groups(configs, &[]);
        assert_eq!(kept.len(), 1);
        assert!(excluded.is_empty());
    }

    #[test]
    fn excluded_entry_carries_the_given_reason() {
        let config = sample_config("p", "infra", ConfigType::Bucket, "a");
        let entry = excluded_entry(&config, "prod", "excluded by --group filter");
        assert_eq!(entry.state, ReportState::Excluded);
        assert_eq!(entry.details, "excluded by --group filter");
        assert_eq!(entry.environment, "prod");
    }

    #[test]
    fn kinds_from_loaded_configs_deduplicates_per_project_group() {
        let configs = vec![
            sample_config("p", "infra", ConfigType::Bucket, "a"),
            sample_config("p", "infra", ConfigType::Bucket, "b"),
            sample_config(
                "p",
                "infra",
                ConfigType::ClassicApi {
                    api_id: "alerting-profile".to_string(),
                    parent_scope: None,
                    unique_name: true,
                },
                "c",
            ),
        ];
        let kinds = kinds_from_loaded_configs(&configs);
        let project_kinds = kinds.get(&("p".to_string(), "infra".to_string())).unwrap();
        assert_eq!(project_kinds.len(), 2);
    }

    #[test]
    fn build_clients_requires_a_static_token() {
        let config = DeployerConfig {
            action: Action::Deploy,
            manifest: PathBuf::from("manifest.yaml"),
            environments: Vec::new(),
            groups: Vec::new(),
            dry_run: false,
            continue_on_error: false,
            concurrency: 1,
            output: crate::config::OutputFormat::Text,
            verbose: false,
            feature_flags: crate::config::FeatureFlags::from_env(),
            http_timeout: std::time::Duration::from_secs(1),
            download_output_dir: None,
        };
        let target = EnvironmentTarget {
            name: "prod".to_string(),
            url: "https://abc.live.dynatrace.com".to_string(),
            token: None,
            oauth_client_id: Some("id".to_string()),
            oauth_client_secret: Some("secret".to_string()),
        };
        let err = build_clients(&config, &target).unwrap_err();
        assert!(matches!(err, DeployerError::Config(_)));
    }
}
