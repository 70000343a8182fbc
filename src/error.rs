use std::io;

use thiserror::Error;

use crate::coordinate::Coordinate;

/// Error taxonomy for the deployment engine.
///
/// Kinds, not exception types: every variant that can be attributed to a single
/// config carries its [`Coordinate`] and environment name so a batch run can
/// report exactly which vertex failed without unwinding the whole deployment.
#[derive(Debug, Error)]
pub enum DeployerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("failed to load manifest: {0}")]
    Load(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(String),

    #[error(
        "parameter '{parameter}' on {coordinate} ({environment}) has a circular reference chain: {cycle:?}"
    )]
    CircularDependencyInParameters {
        coordinate: Coordinate,
        environment: String,
        parameter: String,
        cycle: Vec<String>,
    },

    #[error("configs form a dependency cycle in environment {environment}: {cycle:?}")]
    CircularDependencyInConfigs {
        environment: String,
        cycle: Vec<Coordinate>,
    },

    #[error("projects form a dependency cycle: {cycle:?}")]
    CircularDependencyInProjects { cycle: Vec<String> },

    #[error("failed to parse parameter '{parameter}' on {coordinate}: {message}")]
    ParameterParse {
        coordinate: Coordinate,
        parameter: String,
        message: String,
    },

    #[error("failed to write parameter '{parameter}' on {coordinate}: {message}")]
    ParameterWrite {
        coordinate: Coordinate,
        parameter: String,
        message: String,
    },

    #[error(
        "failed to resolve parameter '{parameter}' on {coordinate} ({environment}): {message}"
    )]
    ParameterResolve {
        coordinate: Coordinate,
        environment: String,
        parameter: String,
        message: String,
    },

    #[error("failed to render template '{template_path}' for {coordinate}: {message}")]
    TemplateRender {
        coordinate: Coordinate,
        template_path: String,
        message: String,
    },

    #[error("rendered template '{template_path}' for {coordinate} is not valid JSON: {message}")]
    InvalidJson {
        coordinate: Coordinate,
        template_path: String,
        message: String,
    },

    #[error("failed to deploy {coordinate} ({environment}): {source}")]
    ConfigDeploy {
        coordinate: Coordinate,
        environment: String,
        #[source]
        source: Box<DeployerError>,
    },

    #[error("non-success response on {environment}: {status} {body}")]
    Response {
        environment: String,
        status: u16,
        body: String,
    },

    #[error("not found on {environment}: {status} {body}")]
    NotFound {
        environment: String,
        status: u16,
        body: String,
    },

    #[error("{config_type} is unsupported on {environment} (coordinate {coordinate}): {reason}")]
    UnsupportedType {
        coordinate: Coordinate,
        environment: String,
        config_type: String,
        reason: String,
    },

    #[error(
        "configs {first} and {second} both resolve to the name '{name}' on environment {environment}"
    )]
    DuplicateName {
        first: Coordinate,
        second: Coordinate,
        environment: String,
        name: String,
    },

    #[error("{coordinate} was not deployed on {environment} because ancestor {ancestor} failed")]
    BlockedByAncestorFailure {
        coordinate: Coordinate,
        environment: String,
        ancestor: Coordinate,
    },

    #[error("deployment on {environment} was cancelled; unfinished: {unfinished:?}")]
    Cancelled {
        environment: String,
        unfinished: Vec<Coordinate>,
    },

    #[error("transport error calling {url}: {message}")]
    Transport { url: String, message: String },

    #[error("unexpected error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DeployerError>;

impl DeployerError {
    /// Returns the coordinate this error is attributed to, when it carries one.
    pub fn coordinate(&self) -> Option<&Coordinate> {
        match self {
            DeployerError::CircularDependencyInParameters { coordinate, .. }
            | DeployerError::ParameterParse { coordinate, .. }
            | DeployerError::ParameterWrite { coordinate, .. }
            | DeployerError::ParameterResolve { coordinate, .. }
            | DeployerError::TemplateRender { coordinate, .. }
            | DeployerError::InvalidJson { coordinate, .. }
            | DeployerError::ConfigDeploy { coordinate, .. }
            | DeployerError::UnsupportedType { coordinate, .. }
            | DeployerError::BlockedByAncestorFailure { coordinate, .. } => Some(coordinate),
            _ => None,
        }
    }

    /// Whether this error represents a 404 response, used by the document
    /// dispatcher to fall through from "update by origin id" to "list by
    /// external id".
    pub fn is_not_found(&self) -> bool {
        matches!(self, DeployerError::NotFound { .. })
    }

    /// Wraps this error as a `ConfigDeployError` attributed to `coordinate`
    /// on `environment`, unless it already carries that shape.
    pub fn into_config_deploy(self, coordinate: &Coordinate, environment: &str) -> Self {
        match self {
            DeployerError::ConfigDeploy { .. } => self,
            other => DeployerError::ConfigDeploy {
                coordinate: coordinate.clone(),
                environment: environment.to_string(),
                source: Box::new(other),
            },
        }
    }
}

/// Aggregates every error produced while deploying a single environment.
///
/// One environment's failures never prevent another environment's report from
/// being collected; the scheduler pushes into this as components finish.
#[derive(Debug, Default)]
pub struct EnvironmentDeploymentErrors {
    pub environment: String,
    pub errors: Vec<DeployerError>,
}

impl EnvironmentDeploymentErrors {
    pub fn new(environment: impl Into<String>) -> Self {
        Self {
            environment: environment.into(),
            errors: Vec::new(),
        }
    }

    pub fn push(&mut self, error: DeployerError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl std::fmt::Display for EnvironmentDeploymentErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} error(s) deploying environment {}:",
            self.errors.len(),
            self.environment
        )?;
        for err in &self.errors {
            writeln!(f, "  - {err}")?;
        }
        Ok(())
    }
}

/// Aggregates per-environment error reports across a whole deployment run.
#[derive(Debug, Default)]
pub struct DeploymentErrors {
    pub environments: Vec<EnvironmentDeploymentErrors>,
}

impl DeploymentErrors {
    pub fn is_empty(&self) -> bool {
        self.environments.iter().all(|e| e.is_empty())
    }

    pub fn push(&mut self, env_errors: EnvironmentDeploymentErrors) {
        if !env_errors.is_empty() {
            self.environments.push(env_errors);
        }
    }
}

impl std::fmt::Display for DeploymentErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for env in &self.environments {
            write!(f, "{env}")?;
        }
        Ok(())
    }
}
