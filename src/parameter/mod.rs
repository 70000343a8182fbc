mod resolver;

pub use resolver::resolve_config;

use std::collections::BTreeMap;

use serde_json::Value;

use crate::coordinate::Coordinate;
use crate::entity_map::EntityMap;
use crate::error::{DeployerError, Result};
use crate::value::Properties;

/// Names a config cannot use for a user-defined parameter: they carry
/// special meaning to the resolver and dispatcher.
pub const RESERVED_PARAMETER_NAMES: &[&str] = &["id", "name", "scope", "insert_after", "skip"];

/// A parameter's resolution context: the config it belongs to, the
/// already-resolved parameters of that same config (in topological order),
/// and the cross-config entity map.
pub struct ResolveContext<'a> {
    pub coordinate: &'a Coordinate,
    pub environment: &'a str,
    pub group: &'a str,
    pub local: &'a Properties,
    pub entity_map: &'a EntityMap,
}

/// Tagged variant for the value a config parameter carries. Every variant
/// implements the same two-method contract: enumerate the coordinates it
/// depends on, and produce a concrete [`serde_json::Value`] given a context.
#[derive(Debug, Clone)]
pub enum Parameter {
    /// A literal value, fixed at load time.
    Value(Value),
    /// Read from a process environment variable at resolve time.
    EnvironmentVariable { name: String },
    /// A pointer to another config's resolved property (or, when the
    /// coordinate equals the owning config's own, another local parameter).
    Reference { coordinate: Coordinate, property: String },
    /// An ordered object built from named sub-parameters.
    Compound(BTreeMap<String, Parameter>),
    /// An ordered array built from sub-parameters.
    List(Vec<Parameter>),
    /// Literal file content, already read by the manifest loader.
    File { path: String, content: String },
}

impl Parameter {
    pub fn kind(&self) -> &'static str {
        match self {
            Parameter::Value(_) => "value",
            Parameter::EnvironmentVariable { .. } => "environment-variable",
            Parameter::Reference { .. } => "reference",
            Parameter::Compound(_) => "compound",
            Parameter::List(_) => "list",
            Parameter::File { .. } => "file",
        }
    }

    /// Every `(coordinate, property)` this parameter (transitively) depends
    /// on. Self-references — a reference whose coordinate equals the owning
    /// config's own coordinate — are included; the local resolver is
    /// responsible for treating those as same-config edges.
    pub fn references(&self) -> Vec<(Coordinate, String)> {
        match self {
            Parameter::Value(_) | Parameter::EnvironmentVariable { .. } | Parameter::File { .. } => {
                Vec::new()
            }
            Parameter::Reference { coordinate, property } => {
                vec![(coordinate.clone(), property.clone())]
            }
            Parameter::Compound(fields) => fields.values().flat_map(Parameter::references).collect(),
            Parameter::List(items) => items.iter().flat_map(Parameter::references).collect(),
        }
    }

    pub fn resolve(&self, ctx: &ResolveContext<'_>, parameter_name: &str) -> Result<Value> {
        match self {
            Parameter::Value(value) => Ok(value.clone()),
            Parameter::File { content, .. } => Ok(Value::String(content.clone())),
            Parameter::EnvironmentVariable { name } => std::env::var(name).map(Value::String).map_err(|_| {
                DeployerError::ParameterResolve {
                    coordinate: ctx.coordinate.clone(),
                    environment: ctx.environment.to_string(),
                    parameter: parameter_name.to_string(),
                    message: format!("environment variable '{name}' is not set"),
                }
            }),
            Parameter::Reference { coordinate, property } => {
                let resolved = if coordinate == ctx.coordinate {
                    ctx.local.get(property).cloned()
                } else {
                    ctx.entity_map.get_property(coordinate, property)
                };
                resolved.ok_or_else(|| DeployerError::ParameterResolve {
                    coordinate: ctx.coordinate.clone(),
                    environment: ctx.environment.to_string(),
                    parameter: parameter_name.to_string(),
                    message: format!("unresolved reference to {coordinate}.{property}"),
                })
            }
            Parameter::Compound(fields) => {
                let mut object = serde_json::Map::new();
                for (key, param) in fields {
                    object.insert(key.clone(), param.resolve(ctx, parameter_name)?);
                }
                Ok(Value::Object(object))
            }
            Parameter::List(items) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(item.resolve(ctx, parameter_name)?);
                }
                Ok(Value::Array(values))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord() -> Coordinate {
        Coordinate::new("p", "t", "c").unwrap()
    }

    #[test]
    fn value_parameter_has_no_references() {
        assert!(Parameter::Value(Value::from(1)).references().is_empty());
    }

    #[test]
    fn reference_parameter_reports_its_target() {
        let p = Parameter::Reference {
            coordinate: coord(),
            property: "id".to_string(),
        };
        assert_eq!(p.references(), vec![(coord(), "id".to_string())]);
    }

    #[test]
    fn compound_aggregates_nested_references() {
        let mut fields = BTreeMap::new();
        fields.insert(
            "scope".to_string(),
            Parameter::Reference {
                coordinate: coord(),
                property: "id".to_string(),
            },
        );
        let p = Parameter::Compound(fields);
        assert_eq!(p.references(), vec![(coord(), "id".to_string())]);
    }
}
