use indexmap::IndexMap;

use super::{Parameter, ResolveContext};
use crate::coordinate::Coordinate;
use crate::entity_map::EntityMap;
use crate::error::{DeployerError, Result};
use crate::value::Properties;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Resolves every parameter of one config into a [`Properties`] map.
///
/// Builds a local dependency graph restricted to parameters that reference
/// another parameter of this same config, topologically sorts it, then
/// resolves each parameter in order so later parameters can see earlier
/// ones' values through `ResolveContext::local`.
pub fn resolve_config(
    coordinate: &Coordinate,
    environment: &str,
    group: &str,
    parameters: &IndexMap<String, Parameter>,
    entity_map: &EntityMap,
) -> Result<Properties> {
    let local_edges = build_local_edges(coordinate, parameters);
    let order = topological_order(coordinate, environment, parameters, &local_edges)?;

    let mut resolved = Properties::new();
    for name in order {
        let parameter = &parameters[&name];
        let ctx = ResolveContext {
            coordinate,
            environment,
            group,
            local: &resolved,
            entity_map,
        };
        let value = parameter.resolve(&ctx, &name)?;
        resolved.insert(name, value);
    }
    Ok(resolved)
}

/// For each parameter, the names of other local parameters it references.
fn build_local_edges(
    coordinate: &Coordinate,
    parameters: &IndexMap<String, Parameter>,
) -> IndexMap<String, Vec<String>> {
    let mut edges = IndexMap::new();
    for (name, parameter) in parameters {
        let deps: Vec<String> = parameter
            .references()
            .into_iter()
            .filter(|(ref_coord, _)| ref_coord == coordinate)
            .map(|(_, property)| property)
            .filter(|property| property != name && parameters.contains_key(property))
            .collect();
        edges.insert(name.clone(), deps);
    }
    edges
}

/// Depth-first topological sort with cycle detection over the local edges.
fn topological_order(
    coordinate: &Coordinate,
    environment: &str,
    parameters: &IndexMap<String, Parameter>,
    edges: &IndexMap<String, Vec<String>>,
) -> Result<Vec<String>> {
    let mut marks: IndexMap<String, Mark> = parameters.keys().map(|k| (k.clone(), Mark::Unvisited)).collect();
    let mut order = Vec::with_capacity(parameters.len());
    let mut stack = Vec::new();

    for name in parameters.keys() {
        if marks[name] == Mark::Unvisited {
            visit(coordinate, environment, name, edges, &mut marks, &mut order, &mut stack)?;
        }
    }
    Ok(order)
}

fn visit(
    coordinate: &Coordinate,
    environment: &str,
    name: &str,
    edges: &IndexMap<String, Vec<String>>,
    marks: &mut IndexMap<String, Mark>,
    order: &mut Vec<String>,
    stack: &mut Vec<String>,
) -> Result<()> {
    marks.insert(name.to_string(), Mark::InProgress);
    stack.push(name.to_string());

    if let Some(deps) = edges.get(name) {
        for dep in deps {
            match marks.get(dep).copied().unwrap_or(Mark::Done) {
                Mark::Unvisited => visit(coordinate, environment, dep, edges, marks, order, stack)?,
                Mark::InProgress => {
                    let start = stack.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle = stack[start..].to_vec();
                    cycle.push(dep.clone());
                    return Err(DeployerError::CircularDependencyInParameters {
                        coordinate: coordinate.clone(),
                        environment: environment.to_string(),
                        parameter: dep.clone(),
                        cycle,
                    });
                }
                Mark::Done => {}
            }
        }
    }

    stack.pop();
    marks.insert(name.to_string(), Mark::Done);
    order.push(name.to_string());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn coord() -> Coordinate {
        Coordinate::new("p", "t", "c").unwrap()
    }

    #[test]
    fn resolves_in_dependency_order() {
        let mut params = IndexMap::new();
        params.insert(
            "base".to_string(),
            Parameter::Value(Value::String("root".to_string())),
        );
        params.insert(
            "derived".to_string(),
            Parameter::Reference {
                coordinate: coord(),
                property: "base".to_string(),
            },
        );
        let entity_map = EntityMap::new();
        let resolved = resolve_config(&coord(), "prod", "g", &params, &entity_map).unwrap();
        assert_eq!(resolved.get("derived").unwrap(), "root");
    }

    #[test]
    fn detects_cycles() {
        let mut params = IndexMap::new();
        params.insert(
            "a".to_string(),
            Parameter::Reference {
                coordinate: coord(),
                property: "b".to_string(),
            },
        );
        params.insert(
            "b".to_string(),
            Parameter::Reference {
                coordinate: coord(),
                property: "a".to_string(),
            },
        );
        let entity_map = EntityMap::new();
        let err = resolve_config(&coord(), "prod", "g", &params, &entity_map).unwrap_err();
        assert!(matches!(err, DeployerError::CircularDependencyInParameters { .. }));
    }
}
