//! Manifest normalization
//!
//! Maps the loosely-typed `plugins` array of a marketplace.json into
//! [`PluginRecord`]s. Bad fields fall back to empty values; only entries
//! without a name are dropped.

use serde_json::{Map, Value};

use crate::marketplace::types::{
    ComponentOverride, ComponentOverrides, PluginRecord, ResourceKind, SourceSpec,
};

/// Normalize every named plugin entry, in manifest order
pub fn normalize_plugins(json: &Value) -> Vec<PluginRecord> {
    let Some(entries) = json.get("plugins").and_then(Value::as_array) else {
        return Vec::new();
    };

    let default_root = json
        .get("metadata")
        .and_then(|m| str_field(m, "pluginRoot"));

    entries
        .iter()
        .filter_map(|entry| normalize_entry(entry, default_root.as_deref()))
        .collect()
}

fn normalize_entry(entry: &Value, default_root: Option<&str>) -> Option<PluginRecord> {
    let name = str_field(entry, "name")?;

    let mut overrides = ComponentOverrides::default();
    for kind in ResourceKind::ALL {
        overrides.set(kind, entry.get(kind.dir_name()).and_then(parse_override));
    }

    Some(PluginRecord {
        name,
        description: str_field(entry, "description").unwrap_or_default(),
        version: str_field(entry, "version"),
        plugin_root: str_field(entry, "pluginRoot").or_else(|| default_root.map(str::to_string)),
        source: parse_source(entry.get("source")),
        overrides,
    })
}

/// Non-empty, trimmed string field
fn str_field(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_source(source: Option<&Value>) -> SourceSpec {
    match source {
        None | Some(Value::Null) => SourceSpec::Unknown("missing source".to_string()),
        Some(Value::String(path)) => SourceSpec::Path(path.trim().to_string()),
        Some(Value::Object(map)) => parse_structured_source(map),
        Some(other) => SourceSpec::Unknown(format!("{} source", json_type(other))),
    }
}

fn parse_structured_source(map: &Map<String, Value>) -> SourceSpec {
    let obj = Value::Object(map.clone());
    let discriminator = str_field(&obj, "source").or_else(|| str_field(&obj, "type"));
    let git_ref = str_field(&obj, "ref").or_else(|| str_field(&obj, "branch"));
    let path = str_field(&obj, "path");

    match discriminator.as_deref() {
        Some("github") => SourceSpec::GitHub {
            repo: str_field(&obj, "repo"),
            git_ref,
            path,
        },
        Some("git") | Some("url") => SourceSpec::Git {
            url: str_field(&obj, "url"),
            git_ref,
            path,
        },
        Some(other) => SourceSpec::Unknown(format!("source type '{}'", other)),
        None => SourceSpec::Unknown("object source without type".to_string()),
    }
}

fn parse_override(value: &Value) -> Option<ComponentOverride> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else if looks_like_file(s) {
                Some(ComponentOverride::Files(vec![s.to_string()]))
            } else {
                Some(ComponentOverride::Dir(s.to_string()))
            }
        }
        Value::Array(items) => Some(ComponentOverride::Files(
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )),
        Value::Object(_) => {
            if let Some(dir) = str_field(value, "path").or_else(|| str_field(value, "dir")) {
                return Some(ComponentOverride::Dir(dir));
            }
            let files = value.get("files").or_else(|| value.get("paths"))?;
            match files {
                Value::Array(_) => parse_override(files),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Last segment has an extension (`./hooks/hooks.json`)
fn looks_like_file(path: &str) -> bool {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|last| last.rsplit_once('.'))
        .is_some_and(|(stem, ext)| !stem.is_empty() && !ext.is_empty())
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_or_malformed_plugins_is_empty() {
        assert!(normalize_plugins(&json!({})).is_empty());
        assert!(normalize_plugins(&json!({"plugins": "nope"})).is_empty());
        assert!(normalize_plugins(&json!([1, 2])).is_empty());
    }

    #[test]
    fn test_entries_without_name_are_dropped() {
        let records = normalize_plugins(&json!({
            "plugins": [
                {"source": "./a"},
                {"name": "", "source": "./b"},
                {"name": "kept"}
            ]
        }));
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "kept");
        assert_eq!(records[0].description, "");
        assert_eq!(
            records[0].source,
            SourceSpec::Unknown("missing source".to_string())
        );
    }

    #[test]
    fn test_sources_are_classified() {
        let records = normalize_plugins(&json!({
            "plugins": [
                {"name": "rel", "source": "./plugins/rel"},
                {"name": "gh", "source": {"source": "github", "repo": "acme/tools", "ref": "v2", "path": "pkg"}},
                {"name": "git", "source": {"type": "git", "url": "https://gitlab.com/g/r.git"}},
                {"name": "npm", "source": {"source": "npm", "package": "x"}},
                {"name": "num", "source": 42}
            ]
        }));

        assert_eq!(records[0].source, SourceSpec::Path("./plugins/rel".into()));
        assert_eq!(
            records[1].source,
            SourceSpec::GitHub {
                repo: Some("acme/tools".into()),
                git_ref: Some("v2".into()),
                path: Some("pkg".into()),
            }
        );
        assert_eq!(
            records[2].source,
            SourceSpec::Git {
                url: Some("https://gitlab.com/g/r.git".into()),
                git_ref: None,
                path: None,
            }
        );
        assert!(matches!(records[3].source, SourceSpec::Unknown(ref s) if s.contains("npm")));
        assert!(matches!(records[4].source, SourceSpec::Unknown(ref s) if s.contains("number")));
    }

    #[test]
    fn test_overrides_shapes() {
        let records = normalize_plugins(&json!({
            "plugins": [{
                "name": "p",
                "source": "./p",
                "commands": "./cmds",
                "agents": ["./agents/a.md", 3, "./agents/b.md"],
                "hooks": "./hooks/hooks.json",
                "skills": {"path": "./my-skills"}
            }]
        }));
        let o = &records[0].overrides;
        assert_eq!(o.commands, Some(ComponentOverride::Dir("./cmds".into())));
        assert_eq!(
            o.agents,
            Some(ComponentOverride::Files(vec![
                "./agents/a.md".into(),
                "./agents/b.md".into()
            ]))
        );
        assert_eq!(
            o.hooks,
            Some(ComponentOverride::Files(vec!["./hooks/hooks.json".into()]))
        );
        assert_eq!(o.skills, Some(ComponentOverride::Dir("./my-skills".into())));
    }

    #[test]
    fn test_inline_hook_config_is_ignored() {
        let records = normalize_plugins(&json!({
            "plugins": [{"name": "p", "hooks": {"PreToolUse": []}}]
        }));
        assert_eq!(records[0].overrides.hooks, None);
    }

    #[test]
    fn test_plugin_root_falls_back_to_metadata() {
        let records = normalize_plugins(&json!({
            "metadata": {"pluginRoot": "./plugins"},
            "plugins": [
                {"name": "a", "source": "a"},
                {"name": "b", "source": "b", "pluginRoot": "./other"}
            ]
        }));
        assert_eq!(records[0].plugin_root.as_deref(), Some("./plugins"));
        assert_eq!(records[1].plugin_root.as_deref(), Some("./other"));
    }
}
