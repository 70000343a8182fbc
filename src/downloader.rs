//! Mirror image of the dispatcher: lists what's already deployed to an
//! environment and converts each object into an internal [`Config`], ready to
//! be written out as a project and redeployed — to the same tenant or a
//! different one.
//!
//! Each kind is downloaded independently; one kind's failure is recorded and
//! skipped rather than aborting the others, matching the scheduler's
//! per-component isolation.

use std::collections::BTreeMap;
use std::collections::HashMap;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::client::EnvironmentClients;
use crate::coordinate::Coordinate;
use crate::error::{DeployerError, Result};
use crate::model::{AutomationResource, Config, ConfigType, DocumentKind};
use crate::parameter::Parameter;

/// Names one object class the downloader should fetch, with whatever
/// kind-specific addressing its listing call needs. These mirror
/// [`ConfigType`]'s variants but carry only the shape needed to *list*, not
/// the per-object identity `deploy` resolves at dispatch time.
#[derive(Debug, Clone)]
pub enum DownloadKind {
    ClassicApi {
        api_id: String,
        parent_scope: Option<String>,
        unique_name: bool,
    },
    Settings {
        schema_id: String,
        schema_version: String,
        scope: Option<String>,
        ordered: bool,
        allow_all_user_permission: bool,
    },
    Automation {
        resource: AutomationResource,
    },
    Bucket,
    Document {
        kind: DocumentKind,
        private: bool,
    },
    OpenPipeline {
        kind: String,
    },
    Segment,
    Slo,
}

impl DownloadKind {
    /// A short, stable label for this kind — used to attribute a per-kind
    /// download failure to the kind that produced it, and to dedupe kinds
    /// requested for the same `(project, group)`.
    pub fn label(&self) -> String {
        match self {
            DownloadKind::ClassicApi { api_id, .. } => format!("classic-api:{api_id}"),
            DownloadKind::Settings { schema_id, .. } => format!("settings:{schema_id}"),
            DownloadKind::Automation { resource } => format!("automation:{resource:?}"),
            DownloadKind::Bucket => "bucket".to_string(),
            DownloadKind::Document { kind, .. } => format!("document:{kind:?}"),
            DownloadKind::OpenPipeline { kind } => format!("openpipeline:{kind}"),
            DownloadKind::Segment => "segment".to_string(),
            DownloadKind::Slo => "slo".to_string(),
        }
    }
}

/// Result of downloading one requested kind: the configs it produced, or the
/// error that aborted just that kind. `download` keeps one of these per
/// requested kind so a failure is attributable rather than folded into an
/// anonymous error list.
pub struct KindOutcome {
    pub kind: String,
    pub configs: Vec<Config>,
    pub error: Option<DeployerError>,
}

/// Aggregate result of a download run across every requested kind.
#[derive(Default)]
pub struct DownloadOutcome {
    pub configs: Vec<Config>,
    pub kinds: Vec<KindOutcome>,
}

impl DownloadOutcome {
    /// The `(kind_label, error)` pairs for every kind whose download failed —
    /// the per-kind isolation the rest of `download` preserves.
    pub fn errors(&self) -> impl Iterator<Item = (&str, &DeployerError)> {
        self.kinds.iter().filter_map(|k| k.error.as_ref().map(|err| (k.kind.as_str(), err)))
    }
}

/// Downloads every requested kind from `clients`, attributing produced
/// configs to `project`/`group`, then links same-scope `ordered` settings
/// with `insert_after` references. One kind's failure is recorded against
/// that kind alone and never aborts the others.
pub async fn download(
    clients: &EnvironmentClients,
    project: &str,
    group: &str,
    kinds: &[DownloadKind],
) -> DownloadOutcome {
    let mut outcome = DownloadOutcome::default();
    for kind in kinds {
        let label = kind.label();
        let result = download_kind(clients, project, group, kind).await;
        let kind_outcome = match result {
            Ok(configs) => {
                outcome.configs.extend(configs.iter().cloned());
                KindOutcome { kind: label, configs, error: None }
            }
            Err(err) => KindOutcome { kind: label, configs: Vec::new(), error: Some(err) },
        };
        outcome.kinds.push(kind_outcome);
    }
    link_ordered_settings(&mut outcome.configs);
    outcome
}

async fn download_kind(
    clients: &EnvironmentClients,
    project: &str,
    group: &str,
    kind: &DownloadKind,
) -> Result<Vec<Config>> {
    match kind {
        DownloadKind::ClassicApi {
            api_id,
            parent_scope,
            unique_name,
        } => download_classic_api(clients, project, group, api_id, parent_scope.as_deref(), *unique_name).await,
        DownloadKind::Settings {
            schema_id,
            schema_version,
            scope,
            ordered,
            allow_all_user_permission,
        } => {
            download_settings(
                clients,
                project,
                group,
                schema_id,
                schema_version,
                scope.as_deref(),
                *ordered,
                *allow_all_user_permission,
            )
            .await
        }
        DownloadKind::Automation { resource } => download_automation(clients, project, group, *resource).await,
        DownloadKind::Bucket => download_bucket(clients, project, group).await,
        DownloadKind::Document { kind, private } => download_document(clients, project, group, *kind, *private).await,
        DownloadKind::OpenPipeline { kind } => download_generic(
            clients.openpipeline(kind),
            clients.environment(),
            project,
            group,
            ConfigType::OpenPipeline { kind: kind.clone() },
            "openpipeline",
        )
        .await,
        DownloadKind::Segment => {
            download_generic(clients.segment(), clients.environment(), project, group, ConfigType::Segment, "segment").await
        }
        DownloadKind::Slo => {
            download_generic(clients.slo(), clients.environment(), project, group, ConfigType::Slo, "slo").await
        }
    }
}

async fn download_classic_api(
    clients: &EnvironmentClients,
    project: &str,
    group: &str,
    api_id: &str,
    parent_scope: Option<&str>,
    unique_name: bool,
) -> Result<Vec<Config>> {
    let client = clients.classic_api(api_id);
    let summaries = client.list_all(parent_scope).await?;

    let mut configs = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let id = summary
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| DeployerError::Other(format!("classic API '{api_id}' list entry missing id")))?;
        let name = summary.get("name").and_then(Value::as_str);

        let mut body = client.get(parent_scope, id).await?;
        strip_volatile_fields(&mut body);

        let config_id = slug(name.unwrap_or(id));
        let coordinate = Coordinate::new(project, api_id, &config_id)
            .map_err(DeployerError::Other)?;
        let (template, extracted_ids) = extract_ids(&body_to_template(&body));

        let mut parameters = IndexMap::new();
        if let Some(name) = name {
            parameters.insert("name".to_string(), Parameter::Value(Value::String(name.to_string())));
        }
        if let Some(scope) = parent_scope {
            parameters.insert("scope".to_string(), Parameter::Value(Value::String(scope.to_string())));
        }
        merge_extracted_ids(&mut parameters, extracted_ids);

        configs.push(Config {
            coordinate,
            group: group.to_string(),
            environment: clients.environment().to_string(),
            config_type: ConfigType::ClassicApi {
                api_id: api_id.to_string(),
                parent_scope: None,
                unique_name,
            },
            origin_object_id: Some(id.to_string()),
            template,
            template_path: format!("{project}/{api_id}/{config_id}.json"),
            parameters,
        });
    }
    Ok(configs)
}

#[allow(clippy::too_many_arguments)]
async fn download_settings(
    clients: &EnvironmentClients,
    project: &str,
    group: &str,
    schema_id: &str,
    schema_version: &str,
    scope: Option<&str>,
    ordered: bool,
    allow_all_user_permission: bool,
) -> Result<Vec<Config>> {
    let client = clients.settings();
    let objects = client.list(schema_id, scope).await?;

    let mut configs = Vec::with_capacity(objects.len());
    for object in objects {
        let object_id = object
            .get("objectId")
            .and_then(Value::as_str)
            .ok_or_else(|| DeployerError::Other(format!("settings object for schema '{schema_id}' missing objectId")))?;
        let object_scope = object.get("scope").and_then(Value::as_str).unwrap_or("tenant").to_string();
        let mut value = object.get("value").cloned().unwrap_or(Value::Null);
        strip_volatile_fields(&mut value);

        let type_name = format!("settings-{}", slug(schema_id));
        let config_id = slug(object_id);
        let coordinate = Coordinate::new(project, &type_name, &config_id).map_err(DeployerError::Other)?;
        let (template, extracted_ids) = extract_ids(&body_to_template(&value));

        let mut parameters = IndexMap::new();
        parameters.insert("scope".to_string(), Parameter::Value(Value::String(object_scope.clone())));
        merge_extracted_ids(&mut parameters, extracted_ids);

        configs.push(Config {
            coordinate,
            group: group.to_string(),
            environment: clients.environment().to_string(),
            config_type: ConfigType::Settings {
                schema_id: schema_id.to_string(),
                schema_version: schema_version.to_string(),
                allow_all_user_permission,
                ordered,
            },
            origin_object_id: None,
            template,
            template_path: format!("{project}/{type_name}/{config_id}.json"),
            parameters,
        });
    }
    Ok(configs)
}

async fn download_automation(
    clients: &EnvironmentClients,
    project: &str,
    group: &str,
    resource: AutomationResource,
) -> Result<Vec<Config>> {
    let client = clients.automation();
    let summaries = client.list(resource).await?;
    let type_name = automation_type_name(resource);

    let mut configs = Vec::with_capacity(summaries.len());
    for summary in summaries {
        let id = summary
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| DeployerError::Other(format!("automation '{type_name}' list entry missing id")))?;
        let mut body = client.get(resource, id).await?;
        let name = body.get("title").or_else(|| body.get("name")).and_then(Value::as_str).map(str::to_string);
        strip_volatile_fields(&mut body);

        let config_id = slug(name.as_deref().unwrap_or(id));
        let coordinate = Coordinate::new(project, type_name, &config_id).map_err(DeployerError::Other)?;
        let (template, extracted_ids) = extract_ids(&body_to_template(&body));

        let mut parameters = IndexMap::new();
        if let Some(name) = &name {
            parameters.insert("name".to_string(), Parameter::Value(Value::String(name.clone())));
        }
        merge_extracted_ids(&mut parameters, extracted_ids);

        configs.push(Config {
            coordinate,
            group: group.to_string(),
            environment: clients.environment().to_string(),
            config_type: ConfigType::Automation { resource },
            origin_object_id: Some(id.to_string()),
            template,
            template_path: format!("{project}/{type_name}/{config_id}.json"),
            parameters,
        });
    }
    Ok(configs)
}

async fn download_bucket(clients: &EnvironmentClients, project: &str, group: &str) -> Result<Vec<Config>> {
    let client = clients.bucket();
    let buckets = client.list().await?;

    let mut configs = Vec::with_capacity(buckets.len());
    for mut body in buckets {
        let id = body
            .get("bucketName")
            .and_then(Value::as_str)
            .ok_or_else(|| DeployerError::Other("bucket list entry missing bucketName".to_string()))?
            .to_string();
        strip_volatile_fields(&mut body);

        let config_id = slug(&id);
        let coordinate = Coordinate::new(project, "bucket", &config_id).map_err(DeployerError::Other)?;
        let (template, extracted_ids) = extract_ids(&body_to_template(&body));

        let mut parameters = IndexMap::new();
        merge_extracted_ids(&mut parameters, extracted_ids);

        configs.push(Config {
            coordinate,
            group: group.to_string(),
            environment: clients.environment().to_string(),
            config_type: ConfigType::Bucket,
            origin_object_id: Some(id),
            template,
            template_path: format!("{project}/bucket/{config_id}.json"),
            parameters,
        });
    }
    Ok(configs)
}

async fn download_document(
    clients: &EnvironmentClients,
    project: &str,
    group: &str,
    kind: DocumentKind,
    private: bool,
) -> Result<Vec<Config>> {
    let client = clients.document();
    let entries = client.list(kind).await?;

    let mut configs = Vec::with_capacity(entries.len());
    for entry in entries {
        let id = entry.get("id").and_then(Value::as_str).ok_or_else(|| {
            DeployerError::Other("document list entry missing id".to_string())
        })?;
        let name = entry.get("name").and_then(Value::as_str);
        let mut content = client.get(id).await?;
        strip_volatile_fields(&mut content);

        let config_id = slug(name.unwrap_or(id));
        let type_name = document_type_name(kind);
        let coordinate = Coordinate::new(project, type_name, &config_id).map_err(DeployerError::Other)?;
        let (template, extracted_ids) = extract_ids(&body_to_template(&content));

        let mut parameters = IndexMap::new();
        if let Some(name) = name {
            parameters.insert("name".to_string(), Parameter::Value(Value::String(name.to_string())));
        }
        merge_extracted_ids(&mut parameters, extracted_ids);

        configs.push(Config {
            coordinate,
            group: group.to_string(),
            environment: clients.environment().to_string(),
            config_type: ConfigType::Document { kind, private },
            origin_object_id: Some(id.to_string()),
            template,
            template_path: format!("{project}/{type_name}/{config_id}.json"),
            parameters,
        });
    }
    Ok(configs)
}

async fn download_generic(
    client: crate::client::GenericUpsertClient,
    environment: &str,
    project: &str,
    group: &str,
    config_type_template: ConfigType,
    type_name: &str,
) -> Result<Vec<Config>> {
    let objects = client.list().await?;

    let mut configs = Vec::with_capacity(objects.len());
    for mut body in objects {
        let id = body
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| DeployerError::Other(format!("'{type_name}' list entry missing id")))?
            .to_string();
        strip_volatile_fields(&mut body);

        let config_id = slug(&id);
        let coordinate = Coordinate::new(project, type_name, &config_id).map_err(DeployerError::Other)?;
        let (template, extracted_ids) = extract_ids(&body_to_template(&body));

        let mut parameters = IndexMap::new();
        merge_extracted_ids(&mut parameters, extracted_ids);

        configs.push(Config {
            coordinate,
            group: group.to_string(),
            environment: environment.to_string(),
            config_type: config_type_template.clone(),
            origin_object_id: Some(id.clone()),
            template,
            template_path: format!("{project}/{type_name}/{config_id}.json"),
            parameters,
        });
    }
    Ok(configs)
}

fn automation_type_name(resource: AutomationResource) -> &'static str {
    match resource {
        AutomationResource::Workflow => "workflow",
        AutomationResource::BusinessCalendar => "business-calendar",
        AutomationResource::SchedulingRule => "scheduling-rule",
    }
}

fn document_type_name(kind: DocumentKind) -> &'static str {
    match kind {
        DocumentKind::Dashboard => "dashboard",
        DocumentKind::Notebook => "notebook",
        DocumentKind::Launchpad => "launchpad",
    }
}

/// Fields Dynatrace assigns server-side that must not round-trip back into a
/// template — re-uploading a downloaded config must produce no net change,
/// not fight the server over its own bookkeeping fields.
const VOLATILE_FIELDS: &[&str] = &[
    "id",
    "objectId",
    "externalId",
    "metadata",
    "modificationInfo",
    "version",
    "createdAt",
    "updatedAt",
    "schemaVersion",
];

fn strip_volatile_fields(value: &mut Value) {
    if let Value::Object(map) = value {
        for field in VOLATILE_FIELDS {
            map.remove(*field);
        }
    }
}

fn body_to_template(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

/// Lowercases and replaces every run of non-alphanumeric characters with a
/// single `-`, producing a configId safe to use as a path segment.
fn slug(raw: &str) -> String {
    static NON_ALNUM: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-zA-Z0-9]+").unwrap());
    let replaced = NON_ALNUM.replace_all(raw, "-").to_lowercase();
    let trimmed = replaced.trim_matches('-');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Dynatrace entity ids (`HOST-0123456789ABCDEF`) and UUIDs, the two shapes
/// downloaded bodies embed that are tenant-specific and must not survive
/// verbatim into a portable template.
static ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"[A-Z][A-Z0-9_]*-[0-9A-F]{16}|[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}",
    )
    .expect("id extraction pattern is a valid regex")
});

/// Replaces every entity-id/UUID occurrence in `input` with a
/// `{{ .extracted_ids.id_N }}` placeholder, returning the rewritten text plus
/// the `id_N -> original value` parameters that placeholder set refers to.
/// Identical occurrences share one placeholder.
fn extract_ids(input: &str) -> (String, IndexMap<String, Parameter>) {
    let mut extracted = IndexMap::new();
    let mut seen: HashMap<String, String> = HashMap::new();
    let mut output = String::with_capacity(input.len());
    let mut last_end = 0;

    for m in ID_PATTERN.find_iter(input) {
        output.push_str(&input[last_end..m.start()]);
        let matched = m.as_str();
        let key = match seen.get(matched) {
            Some(key) => key.clone(),
            None => {
                let key = format!("id_{}", extracted.len() + 1);
                extracted.insert(key.clone(), Parameter::Value(Value::String(matched.to_string())));
                seen.insert(matched.to_string(), key.clone());
                key
            }
        };
        output.push_str(&format!("{{{{ .extracted_ids.{key} }}}}"));
        last_end = m.end();
    }
    output.push_str(&input[last_end..]);
    (output, extracted)
}

/// Folds an id-extraction result into a config's parameter set, under the
/// reserved `extracted_ids` compound parameter.
fn merge_extracted_ids(parameters: &mut IndexMap<String, Parameter>, extracted: IndexMap<String, Parameter>) {
    if extracted.is_empty() {
        return;
    }
    let compound: BTreeMap<String, Parameter> = extracted.into_iter().collect();
    parameters.insert("extracted_ids".to_string(), Parameter::Compound(compound));
}

/// Links ordered-settings configs within the same scope: every config after
/// the first in a `(project, schema, scope)` group gets an `insert_after`
/// parameter referencing its predecessor's resolved `id`, reproducing the
/// server-side insertion order on redeploy.
fn link_ordered_settings(configs: &mut [Config]) {
    let mut previous_in_scope: HashMap<(String, String), Coordinate> = HashMap::new();

    for config in configs.iter_mut() {
        let ConfigType::Settings { ordered: true, .. } = &config.config_type else {
            continue;
        };
        let Some(Parameter::Value(Value::String(scope))) = config.parameters.get("scope") else {
            continue;
        };
        let key = (config.coordinate.config_type.clone(), scope.clone());

        if let Some(previous) = previous_in_scope.get(&key) {
            config.parameters.insert(
                "insert_after".to_string(),
                Parameter::Reference {
                    coordinate: previous.clone(),
                    property: "id".to_string(),
                },
            );
        }
        previous_in_scope.insert(key, config.coordinate.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_normalizes_names() {
        assert_eq!(slug("Prod Alerts!"), "prod-alerts");
        assert_eq!(slug("already-slug"), "already-slug");
        assert_eq!(slug("***"), "unnamed");
    }

    #[test]
    fn extract_ids_replaces_entity_id_and_dedups() {
        let input = r#"{"scope": "HOST-0123456789ABCDEF", "other": "HOST-0123456789ABCDEF"}"#;
        let (template, extracted) = extract_ids(input);
        assert_eq!(template, r#"{"scope": "{{ .extracted_ids.id_1 }}", "other": "{{ .extracted_ids.id_1 }}"}"#);
        assert_eq!(extracted.len(), 1);
        match &extracted["id_1"] {
            Parameter::Value(Value::String(s)) => assert_eq!(s, "HOST-0123456789ABCDEF"),
            other => panic!("unexpected parameter: {other:?}"),
        }
    }

    #[test]
    fn extract_ids_replaces_uuid() {
        let input = r#""ref": "550e8400-e29b-41d4-a716-446655440000""#;
        let (template, extracted) = extract_ids(input);
        assert!(template.contains("{{ .extracted_ids.id_1 }}"));
        assert_eq!(extracted.len(), 1);
    }

    #[test]
    fn strip_volatile_fields_removes_known_keys() {
        let mut body = serde_json::json!({"id": "x", "name": "keep", "metadata": {"a": 1}});
        strip_volatile_fields(&mut body);
        assert_eq!(body, serde_json::json!({"name": "keep"}));
    }

    #[test]
    fn link_ordered_settings_chains_same_scope_entries() {
        let mut parameters_a = IndexMap::new();
        parameters_a.insert("scope".to_string(), Parameter::Value(Value::String("tenant".to_string())));
        let mut parameters_b = parameters_a.clone();
        let mut parameters_c = IndexMap::new();
        parameters_c.insert("scope".to_string(), Parameter::Value(Value::String("other".to_string())));

        let config_type = ConfigType::Settings {
            schema_id: "builtin:x".to_string(),
            schema_version: "1.0".to_string(),
            allow_all_user_permission: false,
            ordered: true,
        };

        let mut configs = vec![
            Config {
                coordinate: Coordinate::new("p", "settings-builtin-x", "a").unwrap(),
                group: "g".to_string(),
                environment: "prod".to_string(),
                config_type: config_type.clone(),
                origin_object_id: None,
                template: "{}".to_string(),
                template_path: "t".to_string(),
                parameters: parameters_a,
            },
            Config {
                coordinate: Coordinate::new("p", "settings-builtin-x", "b").unwrap(),
                group: "g".to_string(),
                environment: "prod".to_string(),
                config_type: config_type.clone(),
                origin_object_id: None,
                template: "{}".to_string(),
                template_path: "t".to_string(),
                parameters: parameters_b,
            },
            Config {
                coordinate: Coordinate::new("p", "settings-builtin-x", "c").unwrap(),
                group: "g".to_string(),
                environment: "prod".to_string(),
                config_type,
                origin_object_id: None,
                template: "{}".to_string(),
                template_path: "t".to_string(),
                parameters: parameters_c,
            },
        ];

        link_ordered_settings(&mut configs);

        assert!(!configs[0].parameters.contains_key("insert_after"));
        match configs[1].parameters.get("insert_after") {
            Some(Parameter::Reference { coordinate, property }) => {
                assert_eq!(coordinate.config_id, "a");
                assert_eq!(property, "id");
            }
            other => panic!("expected a reference, got {other:?}"),
        }
        assert!(!configs[2].parameters.contains_key("insert_after"));
    }
}
