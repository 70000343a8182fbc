//! Minimal implementation of the manifest/project-loading collaborator.
//!
//! The full YAML manifest and config-file persistence format is explicitly
//! out of scope as a feature (see the purpose & scope notes this crate was
//! built against): this module defines the narrow interface the engine
//! needs from that collaborator, plus two implementations — an in-memory
//! fixture for tests, and a thin YAML/JSON-on-disk loader sufficient to
//! drive `dtcd` end to end.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;
use walkdir::WalkDir;

use crate::coordinate::Coordinate;
use crate::error::{DeployerError, Result};
use crate::model::{AutomationResource, Config, ConfigType, DocumentKind};
use crate::parameter::Parameter;
use crate::path_safety;

/// Produces the deployable config graph for a set of selected environments.
///
/// Implementations are expected to expand every loaded config once per
/// environment in `environments`, stamping `Config::environment` — the
/// engine downstream (the dependency graph, scheduler, dispatcher) only
/// ever sees configs already addressed to one concrete environment.
pub trait ManifestLoader: Send + Sync {
    fn load(&self, manifest_path: &Path, environments: &[String]) -> Result<Vec<Config>>;
}

/// Test/fixture loader: holds environment-agnostic config templates and
/// stamps a clone of each onto every selected environment. Plays the same
/// role for the manifest collaborator that `StaticTokenProvider` plays for
/// the transport layer.
#[derive(Default, Clone)]
pub struct InMemoryManifestLoader {
    templates: Vec<Config>,
}

impl InMemoryManifestLoader {
    pub fn new(templates: Vec<Config>) -> Self {
        Self { templates }
    }
}

impl ManifestLoader for InMemoryManifestLoader {
    fn load(&self, _manifest_path: &Path, environments: &[String]) -> Result<Vec<Config>> {
        Ok(expand_across_environments(&self.templates, environments))
    }
}

/// Reads a manifest YAML naming projects, then walks each project directory
/// for `<name>.yaml` config files paired with a sibling JSON template.
///
/// This is intentionally the thin shape described as this crate's external
/// persistence collaborator: one manifest-level list of projects, one
/// config-per-file, no schema versioning, no includes/overlays.
pub struct FileManifestLoader;

impl ManifestLoader for FileManifestLoader {
    fn load(&self, manifest_path: &Path, environments: &[String]) -> Result<Vec<Config>> {
        let manifest_text = fs::read_to_string(manifest_path)
            .map_err(|err| DeployerError::Load(format!("failed to read manifest {}: {err}", manifest_path.display())))?;
        let manifest: ManifestFile =
            serde_yaml_bw::from_str(&manifest_text).map_err(|err| DeployerError::Yaml(err.to_string()))?;
        let manifest_dir = manifest_path.parent().unwrap_or_else(|| Path::new("."));

        let mut templates = Vec::new();
        for project in &manifest.projects {
            let project_dir = manifest_dir.join(&project.path);
            templates.extend(load_project(&project.name, &project_dir)?);
        }
        Ok(expand_across_environments(&templates, environments))
    }
}

fn expand_across_environments(templates: &[Config], environments: &[String]) -> Vec<Config> {
    let mut configs = Vec::with_capacity(templates.len() * environments.len().max(1));
    for environment in environments {
        for template in templates {
            let mut config = template.clone();
            config.environment = environment.clone();
            configs.push(config);
        }
    }
    configs
}

#[derive(Debug, Deserialize)]
struct ManifestFile {
    projects: Vec<ManifestProjectEntry>,
}

#[derive(Debug, Deserialize)]
struct ManifestProjectEntry {
    name: String,
    path: PathBuf,
}

fn load_project(project_name: &str, project_dir: &Path) -> Result<Vec<Config>> {
    if !project_dir.exists() {
        return Err(DeployerError::Load(format!(
            "project '{project_name}' points at a path that does not exist: {}",
            project_dir.display()
        )));
    }

    let mut configs = Vec::new();
    for entry in WalkDir::new(project_dir).into_iter() {
        let entry = entry.map_err(|err| DeployerError::Load(format!("failed to walk project '{project_name}': {err}")))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|ext| ext.to_str()) != Some("yaml") {
            continue;
        }
        configs.push(load_config_file(project_name, project_dir, entry.path())?);
    }
    Ok(configs)
}

fn load_config_file(project_name: &str, project_dir: &Path, config_path: &Path) -> Result<Config> {
    let relative = config_path.strip_prefix(project_dir).unwrap_or(config_path);
    let load_err = |message: String| DeployerError::Load(format!("{} ({}): {message}", relative.display(), project_name));

    let text = fs::read_to_string(config_path)
        .map_err(|err| load_err(format!("failed to read config file: {err}")))?;
    let file: ConfigFile = serde_yaml_bw::from_str(&text).map_err(|err| load_err(format!("invalid config.yaml: {err}")))?;

    let config_id = config_path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| load_err("config file name is not valid UTF-8".to_string()))?
        .to_string();

    let config_type = convert_config_type(file.config_type);
    let type_tag = config_type_tag(&config_type);
    let coordinate = Coordinate::new(project_name, &type_tag, &config_id).map_err(DeployerError::Load)?;

    let template_file = file.template.clone().unwrap_or_else(|| format!("{config_id}.json"));
    let template_abs = path_safety::normalize_under_root(project_dir, Path::new(&template_file))?;
    let template = fs::read_to_string(&template_abs)
        .map_err(|err| load_err(format!("failed to read template '{template_file}': {err}")))?;
    let template_path = format!("{project_name}/{}", relative.with_file_name(&template_file).display());

    let config_dir = config_path.parent().unwrap_or(project_dir);
    let mut parameters = IndexMap::new();
    for (name, raw) in file.parameters {
        parameters.insert(name, convert_parameter(raw, config_dir)?);
    }

    Ok(Config {
        coordinate,
        group: file.group,
        environment: String::new(),
        config_type,
        origin_object_id: file.origin_object_id,
        template,
        template_path,
        parameters,
    })
}

/// Mirrors the downloader's per-kind type-tag convention so load-time and
/// download-time coordinates of the same object agree.
fn config_type_tag(config_type: &ConfigType) -> String {
    match config_type {
        ConfigType::ClassicApi { api_id, .. } => api_id.clone(),
        ConfigType::Settings { schema_id, .. } => format!("settings-{}", schema_id.replace(':', "-")),
        ConfigType::Automation { resource } => match resource {
            AutomationResource::Workflow => "workflow".to_string(),
            AutomationResource::BusinessCalendar => "business-calendar".to_string(),
            AutomationResource::SchedulingRule => "scheduling-rule".to_string(),
        },
        ConfigType::Bucket => "bucket".to_string(),
        ConfigType::Document { kind, .. } => match kind {
            DocumentKind::Dashboard => "dashboard".to_string(),
            DocumentKind::Notebook => "notebook".to_string(),
            DocumentKind::Launchpad => "launchpad".to_string(),
        },
        ConfigType::OpenPipeline { kind } => kind.clone(),
        ConfigType::Segment => "segment".to_string(),
        ConfigType::Slo => "slo".to_string(),
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default = "default_group")]
    group: String,
    #[serde(default, rename = "originObjectId")]
    origin_object_id: Option<String>,
    #[serde(default)]
    template: Option<String>,
    #[serde(flatten)]
    config_type: ConfigTypeFile,
    #[serde(default)]
    parameters: IndexMap<String, ParameterFile>,
}

fn default_group() -> String {
    "default".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum ConfigTypeFile {
    ClassicApi {
        #[serde(rename = "apiId")]
        api_id: String,
        #[serde(default = "default_true", rename = "uniqueName")]
        unique_name: bool,
    },
    Settings {
        #[serde(rename = "schemaId")]
        schema_id: String,
        #[serde(rename = "schemaVersion")]
        schema_version: String,
        #[serde(default, rename = "allowAllUserPermission")]
        allow_all_user_permission: bool,
        #[serde(default)]
        ordered: bool,
    },
    Automation {
        resource: AutomationResourceFile,
    },
    Bucket,
    Document {
        kind: DocumentKindFile,
        #[serde(default)]
        private: bool,
    },
    OpenPipeline {
        kind: String,
    },
    Segment,
    Slo,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum AutomationResourceFile {
    Workflow,
    BusinessCalendar,
    SchedulingRule,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum DocumentKindFile {
    Dashboard,
    Notebook,
    Launchpad,
}

fn convert_config_type(file: ConfigTypeFile) -> ConfigType {
    match file {
        ConfigTypeFile::ClassicApi { api_id, unique_name } => ConfigType::ClassicApi {
            api_id,
            parent_scope: None,
            unique_name,
        },
        ConfigTypeFile::Settings {
            schema_id,
            schema_version,
            allow_all_user_permission,
            ordered,
        } => ConfigType::Settings {
            schema_id,
            schema_version,
            allow_all_user_permission,
            ordered,
        },
        ConfigTypeFile::Automation { resource } => ConfigType::Automation {
            resource: match resource {
                AutomationResourceFile::Workflow => AutomationResource::Workflow,
                AutomationResourceFile::BusinessCalendar => AutomationResource::BusinessCalendar,
                AutomationResourceFile::SchedulingRule => AutomationResource::SchedulingRule,
            },
        },
        ConfigTypeFile::Bucket => ConfigType::Bucket,
        ConfigTypeFile::Document { kind, private } => ConfigType::Document {
            kind: match kind {
                DocumentKindFile::Dashboard => DocumentKind::Dashboard,
                DocumentKindFile::Notebook => DocumentKind::Notebook,
                DocumentKindFile::Launchpad => DocumentKind::Launchpad,
            },
            private,
        },
        ConfigTypeFile::OpenPipeline { kind } => ConfigType::OpenPipeline { kind },
        ConfigTypeFile::Segment => ConfigType::Segment,
        ConfigTypeFile::Slo => ConfigType::Slo,
    }
}

/// A parameter as authored in YAML: either a plain JSON literal, or a
/// `kind`-tagged object naming one of the non-literal parameter variants.
/// Untagged so a bare string/number/array/object is taken as a literal
/// value without the author needing to wrap it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ParameterFile {
    Tagged(TaggedParameterFile),
    Literal(Value),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum TaggedParameterFile {
    Env {
        name: String,
    },
    Ref {
        project: String,
        #[serde(rename = "type")]
        config_type: String,
        #[serde(rename = "configId")]
        config_id: String,
        property: String,
    },
    Compound {
        fields: BTreeMap<String, ParameterFile>,
    },
    List {
        items: Vec<ParameterFile>,
    },
    File {
        path: String,
    },
}

fn convert_parameter(file: ParameterFile, config_dir: &Path) -> Result<Parameter> {
    match file {
        ParameterFile::Literal(value) => Ok(Parameter::Value(value)),
        ParameterFile::Tagged(TaggedParameterFile::Env { name }) => Ok(Parameter::EnvironmentVariable { name }),
        ParameterFile::Tagged(TaggedParameterFile::Ref {
            project,
            config_type,
            config_id,
            property,
        }) => {
            let coordinate = Coordinate::new(project, config_type, config_id).map_err(DeployerError::Load)?;
            Ok(Parameter::Reference { coordinate, property })
        }
        ParameterFile::Tagged(TaggedParameterFile::Compound { fields }) => {
            let mut out = BTreeMap::new();
            for (key, value) in fields {
                out.insert(key, convert_parameter(value, config_dir)?);
            }
            Ok(Parameter::Compound(out))
        }
        ParameterFile::Tagged(TaggedParameterFile::List { items }) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(convert_parameter(item, config_dir)?);
            }
            Ok(Parameter::List(out))
        }
        ParameterFile::Tagged(TaggedParameterFile::File { path: file_path }) => {
            let resolved = path_safety::normalize_under_root(config_dir, Path::new(&file_path))?;
            let content = fs::read_to_string(&resolved)
                .map_err(|err| DeployerError::Load(format!("failed to read file parameter '{file_path}': {err}")))?;
            Ok(Parameter::File { path: file_path, content })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config(id: &str) -> Config {
        Config {
            coordinate: Coordinate::new("p", "alerting-profile", id).unwrap(),
            group: "default".to_string(),
            environment: String::new(),
            config_type: ConfigType::ClassicApi {
                api_id: "alerting-profile".to_string(),
                parent_scope: None,
                unique_name: true,
            },
            origin_object_id: None,
            template: "{}".to_string(),
            template_path: "template.json".to_string(),
            parameters: IndexMap::new(),
        }
    }

    #[test]
    fn in_memory_loader_stamps_every_selected_environment() {
        let loader = InMemoryManifestLoader::new(vec![sample_config("a"), sample_config("b")]);
        let configs = loader
            .load(Path::new("unused"), &["prod".to_string(), "staging".to_string()])
            .unwrap();
        assert_eq!(configs.len(), 4);
        assert!(configs.iter().any(|c| c.environment == "prod" && c.coordinate.config_id == "a"));
        assert!(configs.iter().any(|c| c.environment == "staging" && c.coordinate.config_id == "b"));
    }

    #[test]
    fn file_loader_reads_project_tree() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("manifest.yaml");
        fs::write(
            &manifest_path,
            "projects:\n  - name: infra\n    path: infra\n",
        )
        .unwrap();

        let project_dir = dir.path().join("infra");
        fs::create_dir_all(&project_dir).unwrap();
        fs::write(
            project_dir.join("prod-alerts.yaml"),
            "type: classic-api\napiId: alerting-profile\nparameters:\n  name: prod-alerts\n",
        )
        .unwrap();
        fs::write(project_dir.join("prod-alerts.json"), r#"{"name": "{{ .name }}"}"#).unwrap();

        let configs = FileManifestLoader
            .load(&manifest_path, &["prod".to_string()])
            .unwrap();
        assert_eq!(configs.len(), 1);
        let config = &configs[0];
        assert_eq!(config.coordinate.project, "infra");
        assert_eq!(config.coordinate.config_type, "alerting-profile");
        assert_eq!(config.environment, "prod");
        match config.parameters.get("name") {
            Some(Parameter::Value(Value::String(s))) => assert_eq!(s, "prod-alerts"),
            other => panic!("unexpected parameter: {other:?}"),
        }
    }

    #[test]
    fn file_loader_rejects_template_path_escaping_project_dir() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = dir.path().join("manifest.yaml");
        fs::write(&manifest_path, "projects:\n  - name: infra\n    path: infra\n").unwrap();

        let project_dir = dir.path().join("infra");
        fs::create_dir_all(&project_dir).unwrap();
        fs::write(
            project_dir.join("leaky.yaml"),
            "type: bucket\ntemplate: ../../manifest.yaml\n",
        )
        .unwrap();

        let err = FileManifestLoader.load(&manifest_path, &["prod".to_string()]).unwrap_err();
        assert!(matches!(err, DeployerError::Load(_)));
    }
}
