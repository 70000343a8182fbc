//! End-to-end dispatcher tests against a mock Dynatrace API.
//!
//! Each test drives `dispatch::deploy` through a real `HttpTransport` pointed
//! at a `wiremock` server, exercising the exact upsert-call-count properties
//! named in the spec's testable-properties section: one `POST` on first run
//! and one `PUT` on second run for a unique-name classic API, one `Upsert`
//! per deploy for a bucket, and the document create-then-update dance.

use std::sync::Arc;
use std::time::Duration;

use dynatrace_config_deployer::client::{EnvironmentClients, HttpTransport, RetryPolicy, StaticTokenProvider};
use dynatrace_config_deployer::config::FeatureFlags;
use dynatrace_config_deployer::coordinate::Coordinate;
use dynatrace_config_deployer::dispatch;
use dynatrace_config_deployer::model::{Config, ConfigType, DocumentKind};
use dynatrace_config_deployer::value::Properties;
use indexmap::IndexMap;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport(server: &MockServer) -> HttpTransport {
    HttpTransport::new(
        server.uri(),
        "prod",
        Arc::new(StaticTokenProvider::new("test-token")),
        Duration::from_secs(5),
        5,
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(1),
            multiplier: 1.0,
        },
    )
    .unwrap()
}

fn classic_config(unique_name: bool) -> Config {
    Config {
        coordinate: Coordinate::new("alerting", "alerting-profile", "prod-alerts").unwrap(),
        group: "default".into(),
        environment: "prod".into(),
        config_type: ConfigType::ClassicApi {
            api_id: "alerting-profile".into(),
            parent_scope: None,
            unique_name,
        },
        origin_object_id: None,
        template: r#"{"name":"{{ .name }}"}"#.into(),
        template_path: "alerting/prod-alerts/template.json".into(),
        parameters: IndexMap::new(),
    }
}

fn properties_with_name(name: &str) -> Properties {
    let mut properties = Properties::new();
    properties.insert("name", name);
    properties
}

#[tokio::test]
async fn classic_upsert_first_run_issues_exactly_one_post() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config/v1/alerting-profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"values": []})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/config/v1/alerting-profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "srv-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let clients = EnvironmentClients::new(transport(&server));
    let config = classic_config(true);
    let properties = properties_with_name("prod-alerts");
    let rendered = r#"{"name":"prod-alerts"}"#;

    let entity = dispatch::deploy(&clients, &FeatureFlags::default(), &config, &properties, rendered)
        .await
        .unwrap();

    assert_eq!(entity.properties.id(), Some("srv-1"));
    server.verify().await;
}

#[tokio::test]
async fn classic_upsert_second_run_issues_exactly_one_put_to_existing_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/config/v1/alerting-profile"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "values": [{"id": "srv-1", "name": "prod-alerts"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/api/config/v1/alerting-profile/srv-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let clients = EnvironmentClients::new(transport(&server));
    let config = classic_config(true);
    let properties = properties_with_name("prod-alerts");
    let rendered = r#"{"name":"prod-alerts"}"#;

    let entity = dispatch::deploy(&clients, &FeatureFlags::default(), &config, &properties, rendered)
        .await
        .unwrap();

    assert_eq!(entity.properties.id(), Some("srv-1"));
    server.verify().await;
}

#[tokio::test]
async fn bucket_deploy_is_idempotent_across_two_sequential_runs() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/platform/storage/management/v1/bucket-definitions/p_myB"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"bucketName": "p_myB"})))
        .expect(2)
        .mount(&server)
        .await;

    let clients = EnvironmentClients::new(transport(&server));
    let config = Config {
        coordinate: Coordinate::new("p", "bucket", "myB").unwrap(),
        group: "default".into(),
        environment: "prod".into(),
        config_type: ConfigType::Bucket,
        origin_object_id: None,
        template: "{}".into(),
        template_path: "p/bucket/myB/template.json".into(),
        parameters: IndexMap::new(),
    };
    let properties = Properties::new();

    for _ in 0..2 {
        let entity = dispatch::deploy(&clients, &FeatureFlags::default(), &config, &properties, "{}")
            .await
            .unwrap();
        assert_eq!(entity.properties.id(), Some("p_myB"));
    }

    server.verify().await;
}

#[tokio::test]
async fn document_create_then_update_issues_one_list_and_one_update_on_redeploy() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/platform/document/v1/documents/d1"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path_regex(r"^/platform/document/v1/documents$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "documents": [{"id": "d1", "externalId": "whatever"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/platform/document/v1/documents/d1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let clients = EnvironmentClients::new(transport(&server));
    let config = Config {
        coordinate: Coordinate::new("dash", "dashboard", "d1").unwrap(),
        group: "default".into(),
        environment: "prod".into(),
        config_type: ConfigType::Document {
            kind: DocumentKind::Dashboard,
            private: false,
        },
        origin_object_id: Some("d1".into()),
        template: r#"{"tiles":{}}"#.into(),
        template_path: "dash/dashboard/d1/template.json".into(),
        parameters: IndexMap::new(),
    };
    let properties = Properties::new();

    let entity = dispatch::deploy(&clients, &FeatureFlags::default(), &config, &properties, r#"{"tiles":{}}"#)
        .await
        .unwrap();

    assert_eq!(entity.properties.id(), Some("d1"));
    server.verify().await;
}

#[tokio::test]
async fn settings_ordered_upsert_attaches_insert_after_from_resolved_properties() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v2/settings/objects"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"objectId": "obj-b"}])))
        .expect(1)
        .mount(&server)
        .await;

    let clients = EnvironmentClients::new(transport(&server));
    let config = Config {
        coordinate: Coordinate::new("p", "builtin:x", "b").unwrap(),
        group: "default".into(),
        environment: "prod".into(),
        config_type: ConfigType::Settings {
            schema_id: "builtin:x".into(),
            schema_version: "1.0".into(),
            allow_all_user_permission: false,
            ordered: true,
        },
        origin_object_id: None,
        template: "{}".into(),
        template_path: "p/builtin:x/b/template.json".into(),
        parameters: IndexMap::new(),
    };
    let mut properties = Properties::new();
    properties.insert("scope", "tenant");
    properties.insert("insert_after", "obj-a");

    let entity = dispatch::deploy(&clients, &FeatureFlags::default(), &config, &properties, "{}")
        .await
        .unwrap();

    assert_eq!(entity.properties.id(), Some("obj-b"));
    server.verify().await;
}
