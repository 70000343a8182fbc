use std::collections::HashMap;

use crate::coordinate::Coordinate;
use crate::error::{DeployerError, Result};
use crate::model::Config;

/// A per-environment dependency graph over configs.
///
/// Vertices are dense `usize` ids; coordinates map to ids through a hash
/// table, and edges live in an adjacency list — the representation called
/// out in the design notes rather than a graph of boxed trait objects.
pub struct DependencyGraph {
    environment: String,
    coordinates: Vec<Coordinate>,
    index: HashMap<Coordinate, usize>,
    /// `edges[u]` contains every `v` such that `u` depends on `v` (`u -> v`).
    edges: Vec<Vec<usize>>,
}

/// A weakly connected subgraph of the dependency graph: the unit of parallel
/// deployment. `order` is a topological order over `vertices` (descendants
/// before ancestors are invalid; predecessors of `u` in the edge list
/// complete before `u` runs), or `None` when the component contains a cycle.
pub struct Component {
    pub vertices: Vec<usize>,
    pub order: Option<Vec<usize>>,
    pub cycle: Option<Vec<usize>>,
}

impl DependencyGraph {
    /// Builds the graph for one environment's non-skipped-at-load configs.
    /// Edges come from each config's reference parameters; self-references
    /// and references that don't resolve to a config in this environment are
    /// ignored (the latter is caught later as a parameter-resolution error).
    pub fn build(environment: &str, configs: &[Config]) -> Self {
        let mut index = HashMap::new();
        let mut coordinates = Vec::with_capacity(configs.len());
        for config in configs {
            let id = coordinates.len();
            coordinates.push(config.coordinate.clone());
            index.insert(config.coordinate.clone(), id);
        }

        let mut edges = vec![Vec::new(); configs.len()];
        for config in configs {
            let u = index[&config.coordinate];
            for parameter in config.parameters.values() {
                for (target, _property) in parameter.references() {
                    if target == config.coordinate {
                        continue;
                    }
                    if let Some(&v) = index.get(&target) {
                        if !edges[u].contains(&v) {
                            edges[u].push(v);
                        }
                    }
                }
            }
        }

        Self {
            environment: environment.to_string(),
            coordinates,
            index,
            edges,
        }
    }

    pub fn coordinate(&self, vertex: usize) -> &Coordinate {
        &self.coordinates[vertex]
    }

    pub fn vertex_of(&self, coordinate: &Coordinate) -> Option<usize> {
        self.index.get(coordinate).copied()
    }

    pub fn len(&self) -> usize {
        self.coordinates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.coordinates.is_empty()
    }

    /// Direct predecessors of `vertex`: every `w` with `vertex -> w` removed —
    /// i.e. every vertex `vertex` itself depends on.
    pub fn dependencies_of(&self, vertex: usize) -> &[usize] {
        &self.edges[vertex]
    }

    /// Decomposes the graph into weakly connected components via union-find,
    /// then topologically sorts each (or detects its cycle).
    pub fn components(&self) -> Vec<Component> {
        let n = self.coordinates.len();
        let mut uf = UnionFind::new(n);
        for u in 0..n {
            for &v in &self.edges[u] {
                uf.union(u, v);
            }
        }

        let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
        for v in 0..n {
            groups.entry(uf.find(v)).or_default().push(v);
        }

        groups
            .into_values()
            .map(|vertices| self.schedule_component(vertices))
            .collect()
    }

    fn schedule_component(&self, mut vertices: Vec<usize>) -> Component {
        vertices.sort_by_key(|&v| self.coordinates[v].to_string());
        match topological_sort(&vertices, &self.edges, &self.coordinates) {
            Ok(order) => Component {
                vertices,
                order: Some(order),
                cycle: None,
            },
            Err(cycle) => Component {
                vertices,
                order: None,
                cycle: Some(cycle),
            },
        }
    }

    /// Builds the `CircularDependencyInConfigs` error for every vertex
    /// participating in `cycle`, each naming its own outgoing cycle edges.
    pub fn cycle_errors(&self, cycle: &[usize]) -> Vec<DeployerError> {
        let cycle_set: std::collections::HashSet<usize> = cycle.iter().copied().collect();
        cycle
            .iter()
            .map(|&v| {
                let outgoing: Vec<Coordinate> = self.edges[v]
                    .iter()
                    .filter(|w| cycle_set.contains(w))
                    .map(|&w| self.coordinates[w].clone())
                    .collect();
                DeployerError::CircularDependencyInConfigs {
                    environment: self.environment.clone(),
                    cycle: std::iter::once(self.coordinates[v].clone())
                        .chain(outgoing)
                        .collect(),
                }
            })
            .collect()
    }
}

/// Kahn's algorithm restricted to `vertices`, with coordinate-string ties
/// broken deterministically. `edges[u]` lists `u`'s dependencies (`u -> v`
/// meaning `v` must run first), so the order produced here visits
/// dependency-free vertices first and `u` only after every `v` it points to.
/// Returns the offending cycle (as vertex ids) on failure.
fn topological_sort(
    vertices: &[usize],
    edges: &[Vec<usize>],
    coordinates: &[Coordinate],
) -> std::result::Result<Vec<usize>, Vec<usize>> {
    let member: std::collections::HashSet<usize> = vertices.iter().copied().collect();
    let mut remaining_deps: HashMap<usize, Vec<usize>> = vertices
        .iter()
        .map(|&v| {
            let deps: Vec<usize> = edges[v].iter().copied().filter(|w| member.contains(w)).collect();
            (v, deps)
        })
        .collect();

    let mut order = Vec::with_capacity(vertices.len());
    loop {
        let mut ready: Vec<usize> = remaining_deps
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(&v, _)| v)
            .collect();
        if ready.is_empty() {
            break;
        }
        ready.sort_by_key(|&v| coordinates[v].to_string());
        for v in ready {
            remaining_deps.remove(&v);
            order.push(v);
            for deps in remaining_deps.values_mut() {
                deps.retain(|w| *w != v);
            }
        }
    }

    if order.len() == vertices.len() {
        Ok(order)
    } else {
        let mut stuck: Vec<usize> = remaining_deps.keys().copied().collect();
        stuck.sort_by_key(|&v| coordinates[v].to_string());
        Err(stuck)
    }
}

struct UnionFind {
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
            rank: vec![0; n],
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return;
        }
        match self.rank[ra].cmp(&self.rank[rb]) {
            std::cmp::Ordering::Less => self.parent[ra] = rb,
            std::cmp::Ordering::Greater => self.parent[rb] = ra,
            std::cmp::Ordering::Equal => {
                self.parent[rb] = ra;
                self.rank[ra] += 1;
            }
        }
    }
}

/// Guard a scheduler loop against dispatching a cyclic component as if it
/// had a topological order. Returns a summary error; callers that need the
/// per-vertex detail still go to [`DependencyGraph::cycle_errors`].
pub fn require_acyclic(graph: &DependencyGraph, component: &Component) -> Result<()> {
    if component.cycle.is_some() {
        return Err(DeployerError::Other(format!(
            "component on {} contains a cycle",
            graph.environment
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ConfigType;
    use crate::parameter::Parameter;
    use indexmap::IndexMap;

    fn classic_config(project: &str, id: &str, params: IndexMap<String, Parameter>) -> Config {
        Config {
            coordinate: Coordinate::new(project, "alerting-profile", id).unwrap(),
            group: "default".into(),
            environment: "prod".into(),
            config_type: ConfigType::ClassicApi {
                api_id: "alerting-profile".into(),
                parent_scope: None,
                unique_name: true,
            },
            origin_object_id: None,
            template: "{}".into(),
            template_path: "template.json".into(),
            parameters: params,
        }
    }

    fn reference(coordinate: Coordinate, property: &str) -> Parameter {
        Parameter::Reference {
            coordinate,
            property: property.to_string(),
        }
    }

    #[test]
    fn linear_chain_topo_sorts_dependencies_first() {
        let a = classic_config("p", "a", IndexMap::new());
        let mut b_params = IndexMap::new();
        b_params.insert("scope".to_string(), reference(a.coordinate.clone(), "id"));
        let b = classic_config("p", "b", b_params);

        let graph = DependencyGraph::build("prod", &[a.clone(), b.clone()]);
        let components = graph.components();
        assert_eq!(components.len(), 1);
        let component = &components[0];
        let order = component.order.as_ref().unwrap();
        let a_pos = order.iter().position(|&v| graph.coordinate(v) == &a.coordinate).unwrap();
        let b_pos = order.iter().position(|&v| graph.coordinate(v) == &b.coordinate).unwrap();
        assert!(a_pos < b_pos, "dependency must be scheduled before dependent");
    }

    #[test]
    fn three_node_cycle_is_detected_with_all_members() {
        let a_coord = Coordinate::new("p", "alerting-profile", "a").unwrap();
        let b_coord = Coordinate::new("p", "alerting-profile", "b").unwrap();
        let c_coord = Coordinate::new("p", "alerting-profile", "c").unwrap();

        let mut a_params = IndexMap::new();
        a_params.insert("scope".to_string(), reference(b_coord.clone(), "id"));
        let mut b_params = IndexMap::new();
        b_params.insert("scope".to_string(), reference(c_coord.clone(), "id"));
        let mut c_params = IndexMap::new();
        c_params.insert("scope".to_string(), reference(a_coord.clone(), "id"));

        let a = classic_config("p", "a", a_params);
        let b = classic_config("p", "b", b_params);
        let c = classic_config("p", "c", c_params);

        let graph = DependencyGraph::build("prod", &[a, b, c]);
        let components = graph.components();
        assert_eq!(components.len(), 1);
        let component = &components[0];
        assert!(component.order.is_none());
        let cycle = component.cycle.as_ref().unwrap();
        assert_eq!(cycle.len(), 3);

        let errors = graph.cycle_errors(cycle);
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn independent_configs_form_separate_components() {
        let a = classic_config("p", "a", IndexMap::new());
        let b = classic_config("p", "b", IndexMap::new());
        let graph = DependencyGraph::build("prod", &[a, b]);
        assert_eq!(graph.components().len(), 2);
    }

    #[test]
    fn self_reference_is_ignored() {
        let coord = Coordinate::new("p", "alerting-profile", "a").unwrap();
        let mut params = IndexMap::new();
        params.insert("name".to_string(), reference(coord.clone(), "id"));
        let config = classic_config("p", "a", params);
        let graph = DependencyGraph::build("prod", &[config]);
        let components = graph.components();
        assert_eq!(components.len(), 1);
        assert!(components[0].order.is_some());
    }
}
