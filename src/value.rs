use indexmap::IndexMap;
use serde_json::Value;

/// A resolved config's properties: `id`, optionally `name`/`scope`, and any
/// resource-specific outputs a later config's parameters may reference.
///
/// Backed by an [`IndexMap`] so insertion order survives into JSON output,
/// matching how templates expect stable iteration for debug/dump paths.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(IndexMap<String, Value>);

impl Properties {
    pub fn new() -> Self {
        Self(IndexMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Resolves a dotted path (`a.b.c`) by walking nested objects starting
    /// from the top-level properties. Returns `None` if any segment is
    /// missing or the path traverses through a non-object value.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let first = segments.next()?;
        let mut current = self.0.get(first)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    pub fn id(&self) -> Option<&str> {
        self.get("id").and_then(Value::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Flattens into a single `serde_json::Value::Object`, used as the root
    /// context for template rendering.
    pub fn to_json(&self) -> Value {
        Value::Object(self.0.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }
}

impl FromIterator<(String, Value)> for Properties {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn get_path_walks_nested_objects() {
        let mut props = Properties::new();
        props.insert("id", "abc");
        props.insert("meta", json!({"owner": {"team": "observability"}}));
        assert_eq!(props.get_path("id").unwrap(), "abc");
        assert_eq!(
            props.get_path("meta.owner.team").unwrap(),
            &Value::String("observability".into())
        );
        assert!(props.get_path("meta.owner.missing").is_none());
        assert!(props.get_path("meta.owner.team.nope").is_none());
    }

    #[test]
    fn id_accessor_requires_string() {
        let mut props = Properties::new();
        props.insert("id", "p_myB");
        assert_eq!(props.id(), Some("p_myB"));
    }

    #[test]
    fn to_json_round_trips_as_object() {
        let mut props = Properties::new();
        props.insert("id", "x1");
        props.insert("name", "My Config");
        let json = props.to_json();
        assert_eq!(json["id"], "x1");
        assert_eq!(json["name"], "My Config");
    }
}
