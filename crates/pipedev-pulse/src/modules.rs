//! Decoding of `pactl --format=json list modules`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use pipedev_core::{ControlResult, ModuleIndex, ModuleInfo};

/// One module entry as pactl prints it.
#[derive(Debug, Deserialize)]
struct PactlModule {
    index: u32,
    name: String,
    #[serde(default)]
    argument: Option<String>,
    // A number, null, or absent depending on the server
    #[serde(default)]
    n_used: Option<Value>,
    #[serde(default)]
    properties: BTreeMap<String, Value>,
}

impl From<PactlModule> for ModuleInfo {
    fn from(raw: PactlModule) -> Self {
        Self {
            index: ModuleIndex(raw.index),
            name: raw.name,
            argument: raw.argument.filter(|a| !a.is_empty()),
            n_used: raw
                .n_used
                .as_ref()
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok()),
            properties: raw
                .properties
                .into_iter()
                .map(|(key, value)| match value {
                    Value::String(s) => (key, s),
                    other => (key, other.to_string()),
                })
                .collect(),
        }
    }
}

/// Parse the module list, keeping server order.
pub(crate) fn parse_module_list(json: &str) -> ControlResult<Vec<ModuleInfo>> {
    let raw: Vec<PactlModule> = serde_json::from_str(json)?;
    Ok(raw.into_iter().map(ModuleInfo::from).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use pipedev_core::ControlError;

    const LIST: &str = r#"[
        {"index":0,"name":"module-device-restore","argument":"","n_used":null,
         "properties":{"module.author":"Lennart Poettering","module.version":"16.1"}},
        {"index":23,"name":"module-pipe-source",
         "argument":"source_name=\"RX1\" file=\"/tmp/nDAX-RX1.pipe\"","n_used":1,"properties":{}},
        {"index":7,"name":"module-null-sink","n_used":"n/a"}
    ]"#;

    #[test]
    fn test_parse_module_list_keeps_order() {
        let modules = parse_module_list(LIST).unwrap();

        let indices: Vec<_> = modules.iter().map(|m| m.index.0).collect();
        assert_eq!(indices, vec![0, 23, 7]);
    }

    #[test]
    fn test_parse_module_fields() {
        let modules = parse_module_list(LIST).unwrap();

        assert_eq!(modules[0].argument, None);
        assert_eq!(modules[0].n_used, None);
        assert_eq!(modules[0].properties["module.author"], "Lennart Poettering");

        assert_eq!(modules[1].name, "module-pipe-source");
        assert_eq!(
            modules[1].argument.as_deref(),
            Some(r#"source_name="RX1" file="/tmp/nDAX-RX1.pipe""#)
        );
        assert_eq!(modules[1].n_used, Some(1));

        assert_eq!(modules[2].n_used, None);
        assert!(modules[2].properties.is_empty());
    }

    #[test]
    fn test_parse_empty_list() {
        assert!(parse_module_list("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert_matches!(parse_module_list("Module #0\n"), Err(ControlError::Json(_)));
        assert_matches!(parse_module_list(r#"[{"name":"x"}]"#), Err(ControlError::Json(_)));
    }
}
