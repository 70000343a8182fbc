//! Per-environment scheduling: builds the dependency graph, decomposes it
//! into components, and drives each component through the config state
//! machine described in the design notes (`Pending -> Ready -> Resolving ->
//! Rendering -> Dispatching -> Succeeded | Failed | Blocked`, or `Skipped`).
//!
//! Components run concurrently as tokio tasks bounded by a semaphore, the
//! same bounded-concurrency shape `HttpTransport` uses for in-flight API
//! calls. Within one component, vertices run strictly serially in
//! topological order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

use crate::client::EnvironmentClients;
use crate::config::FeatureFlags;
use crate::coordinate::Coordinate;
use crate::dispatch;
use crate::entity_map::{EntityMap, ResolvedEntity};
use crate::error::{DeployerError, EnvironmentDeploymentErrors, Result};
use crate::graph::{self, DependencyGraph};
use crate::model::Config;
use crate::parameter::resolve_config;
use crate::template;

/// Outcome of deploying every config targeting one environment.
pub struct EnvironmentOutcome {
    pub entity_map: EntityMap,
    pub errors: EnvironmentDeploymentErrors,
}

/// Deploys every config in `configs` (already filtered to one environment)
/// against that environment, honoring the dependency graph, concurrency
/// limit, and cancellation signal.
pub async fn deploy_environment(
    environment: &str,
    configs: Vec<Config>,
    clients: EnvironmentClients,
    feature_flags: Arc<FeatureFlags>,
    concurrency: usize,
    cancellation: CancellationToken,
) -> EnvironmentOutcome {
    let span = info_span!("deploy_environment", environment);
    let _enter = span.enter();

    let graph = DependencyGraph::build(environment, &configs);
    let by_coordinate: HashMap<Coordinate, Config> =
        configs.into_iter().map(|c| (c.coordinate.clone(), c)).collect();

    let entity_map = Arc::new(Mutex::new(EntityMap::new()));
    let errors = Arc::new(Mutex::new(EnvironmentDeploymentErrors::new(environment.to_string())));
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));

    let components = graph.components();
    let mut handles = Vec::with_capacity(components.len());

    for component in components {
        if let Err(summary) = graph::require_acyclic(&graph, &component) {
            let mut guard = errors.lock().await;
            guard.push(summary);
            let cycle = component.cycle.as_ref().expect("require_acyclic only fails on a cyclic component");
            for err in graph.cycle_errors(cycle) {
                guard.push(err);
            }
            continue;
        }

        let order = component.order.expect("acyclic component carries a topological order");
        let vertex_coordinates: Vec<Coordinate> = order.iter().map(|&v| graph.coordinate(v).clone()).collect();
        let dep_coordinates: Vec<Vec<Coordinate>> = order
            .iter()
            .map(|&v| graph.dependencies_of(v).iter().map(|&d| graph.coordinate(d).clone()).collect())
            .collect();

        let component_configs: Vec<Config> = vertex_coordinates
            .iter()
            .map(|c| by_coordinate.get(c).cloned().expect("vertex coordinate present in config map"))
            .collect();

        let environment = environment.to_string();
        let clients = clients.clone();
        let feature_flags = feature_flags.clone();
        let entity_map = entity_map.clone();
        let errors = errors.clone();
        let semaphore = semaphore.clone();
        let cancellation = cancellation.clone();

        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return,
            };
            run_component(
                &environment,
                component_configs,
                dep_coordinates,
                &clients,
                &feature_flags,
                entity_map,
                errors,
                cancellation,
            )
            .await;
        });
        handles.push(handle);
    }

    for handle in handles {
        if let Err(err) = handle.await {
            warn!(%err, "component task panicked");
        }
    }

    let entity_map = Arc::try_unwrap(entity_map)
        .expect("every component task has completed and dropped its entity-map handle")
        .into_inner();
    let errors = Arc::try_unwrap(errors)
        .expect("every component task has completed and dropped its errors handle")
        .into_inner();

    EnvironmentOutcome { entity_map, errors }
}

/// Runs one component's vertices serially, in the topological order computed
/// by the graph. `dependencies` is parallel to `configs`: `dependencies[i]`
/// names the direct dependency coordinates of `configs[i]`.
#[allow(clippy::too_many_arguments)]
async fn run_component(
    environment: &str,
    configs: Vec<Config>,
    dependencies: Vec<Vec<Coordinate>>,
    clients: &EnvironmentClients,
    feature_flags: &FeatureFlags,
    entity_map: Arc<Mutex<EntityMap>>,
    errors: Arc<Mutex<EnvironmentDeploymentErrors>>,
    cancellation: CancellationToken,
) {
    let mut blocked_or_failed: HashSet<Coordinate> = HashSet::new();

    for (config, deps) in configs.into_iter().zip(dependencies.into_iter()) {
        if cancellation.is_cancelled() {
            let mut guard = errors.lock().await;
            guard.push(DeployerError::Cancelled {
                environment: environment.to_string(),
                unfinished: vec![config.coordinate.clone()],
            });
            continue;
        }

        let failed_dep = deps.iter().find(|d| blocked_or_failed.contains(d)).cloned();
        if let Some(ancestor) = failed_dep {
            blocked_or_failed.insert(config.coordinate.clone());
            let mut guard = errors.lock().await;
            guard.push(DeployerError::BlockedByAncestorFailure {
                coordinate: config.coordinate.clone(),
                environment: environment.to_string(),
                ancestor,
            });
            continue;
        }

        match run_one_config(environment, &config, clients, feature_flags, &entity_map).await {
            Ok(()) => {}
            Err(err) => {
                blocked_or_failed.insert(config.coordinate.clone());
                let mut guard = errors.lock().await;
                guard.push(err);
            }
        }
    }
}

/// Drives a single config through `Resolving -> Rendering -> Dispatching ->
/// Succeeded`, or short-circuits into `Skipped` once the resolved `skip`
/// property is true. Writes the resolved entity into the shared map on
/// success; returns the error (without writing) on any failure.
async fn run_one_config(
    environment: &str,
    config: &Config,
    clients: &EnvironmentClients,
    feature_flags: &FeatureFlags,
    entity_map: &Arc<Mutex<EntityMap>>,
) -> Result<()> {
    let properties = {
        let guard = entity_map.lock().await;
        resolve_config(&config.coordinate, environment, &config.group, &config.parameters, &guard)?
    };

    let skip = matches!(properties.get("skip"), Some(Value::Bool(true)));
    if skip {
        let entity = ResolvedEntity {
            coordinate: config.coordinate.clone(),
            entity_name: properties.get("name").and_then(Value::as_str).map(str::to_string),
            properties: properties.clone(),
            skip: true,
        };
        let mut guard = entity_map.lock().await;
        guard.put(entity);
        info!(coordinate = %config.coordinate, "skipped");
        return Ok(());
    }

    if config.config_type.disallows_duplicate_names() {
        if let Some(name) = properties.get("name").and_then(Value::as_str) {
            let guard = entity_map.lock().await;
            if let Some(owner) = guard.name_owner(&config.coordinate.config_type, name) {
                return Err(DeployerError::DuplicateName {
                    first: owner.clone(),
                    second: config.coordinate.clone(),
                    environment: environment.to_string(),
                    name: name.to_string(),
                });
            }
        }
    }

    let rendered = template::render(&config.template, &properties, &config.coordinate, &config.template_path)?;
    let entity = dispatch::deploy(clients, feature_flags, config, &properties, &rendered).await?;

    let mut guard = entity_map.lock().await;
    guard.put(entity);
    info!(coordinate = %config.coordinate, "deployed");
    Ok(())
}
