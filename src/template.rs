use crate::coordinate::Coordinate;
use crate::error::{DeployerError, Result};
use crate::value::Properties;

/// Renders a request body template against a config's resolved properties.
///
/// The template language is a closed subset: `{{ .ident }}` and
/// `{{ .a.b.c }}` dotted-path lookups only. No conditionals, no loops, no
/// arbitrary expressions — rendering is a single streaming pass rather than
/// a general interpreter.
pub fn render(
    template: &str,
    properties: &Properties,
    coordinate: &Coordinate,
    template_path: &str,
) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            return Err(DeployerError::TemplateRender {
                coordinate: coordinate.clone(),
                template_path: template_path.to_string(),
                message: "unterminated '{{' placeholder".to_string(),
            });
        };
        let raw = after_open[..end].trim();
        let path = raw.strip_prefix('.').ok_or_else(|| DeployerError::TemplateRender {
            coordinate: coordinate.clone(),
            template_path: template_path.to_string(),
            message: format!("placeholder '{{{{{raw}}}}}' must start with '.'"),
        })?;
        if path.is_empty() {
            return Err(DeployerError::TemplateRender {
                coordinate: coordinate.clone(),
                template_path: template_path.to_string(),
                message: "empty placeholder path".to_string(),
            });
        }
        let value = properties.get_path(path).ok_or_else(|| DeployerError::TemplateRender {
            coordinate: coordinate.clone(),
            template_path: template_path.to_string(),
            message: format!("undefined property path '{path}'"),
        })?;
        push_rendered_value(&mut out, value);
        rest = &after_open[end + 2..];
    }
    out.push_str(rest);

    serde_json::from_str::<serde_json::Value>(&out).map_err(|e| DeployerError::InvalidJson {
        coordinate: coordinate.clone(),
        template_path: template_path.to_string(),
        message: e.to_string(),
    })?;

    Ok(out)
}

/// Substitutes a resolved value into the output. Strings are inserted
/// literally (the template author is expected to quote them in JSON); other
/// JSON types are inserted via their canonical JSON form.
fn push_rendered_value(out: &mut String, value: &serde_json::Value) {
    match value {
        serde_json::Value::String(s) => out.push_str(s),
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coord() -> Coordinate {
        Coordinate::new("p", "t", "c").unwrap()
    }

    #[test]
    fn substitutes_dotted_paths() {
        let mut props = Properties::new();
        props.insert("name", "my-profile");
        props.insert("meta", json!({"scope": "HOST"}));
        let rendered = render(
            r#"{"name": "{{ .name }}", "scope": "{{ .meta.scope }}"}"#,
            &props,
            &coord(),
            "template.json",
        )
        .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["name"], "my-profile");
        assert_eq!(parsed["scope"], "HOST");
    }

    #[test]
    fn undefined_path_is_an_error() {
        let props = Properties::new();
        let err = render("{{ .missing }}", &props, &coord(), "t.json").unwrap_err();
        assert!(matches!(err, DeployerError::TemplateRender { .. }));
    }

    #[test]
    fn non_json_output_is_rejected() {
        let mut props = Properties::new();
        props.insert("name", "unquoted");
        let err = render("{ name: {{ .name }} }", &props, &coord(), "t.json").unwrap_err();
        assert!(matches!(err, DeployerError::InvalidJson { .. }));
    }

    #[test]
    fn placeholder_without_leading_dot_is_rejected() {
        let props = Properties::new();
        let err = render("{{ name }}", &props, &coord(), "t.json").unwrap_err();
        assert!(matches!(err, DeployerError::TemplateRender { .. }));
    }
}
