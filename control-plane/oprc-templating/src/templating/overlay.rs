//! Field bindings copying values from the parent into rendered objects.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::TemplatingError;

/// Targets one rendered object and copies parent fields into it.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Overlay {
    pub api_version: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub bindings: Vec<FieldBinding>,
}

/// Dotted paths: `from` on the parent, `to` on the overlay target.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
pub struct FieldBinding {
    pub from: String,
    pub to: String,
}

impl Overlay {
    pub fn matches(&self, doc: &JsonValue) -> bool {
        doc.get("apiVersion").and_then(JsonValue::as_str)
            == Some(self.api_version.as_str())
            && doc.get("kind").and_then(JsonValue::as_str)
                == Some(self.kind.as_str())
            && nested_field(doc, "metadata.name").and_then(JsonValue::as_str)
                == Some(self.name.as_str())
    }

    /// Apply every binding whose source exists on `parent`. Missing sources
    /// are skipped.
    pub fn apply(
        &self,
        parent: &JsonValue,
        doc: &mut JsonValue,
    ) -> Result<(), TemplatingError> {
        for binding in &self.bindings {
            let Some(value) = nested_field(parent, &binding.from) else {
                continue;
            };
            set_nested_field(doc, &binding.to, value.clone()).map_err(
                |reason| TemplatingError::Overlay {
                    overlay: format!("{}/{}", self.kind, self.name),
                    reason,
                },
            )?;
        }
        Ok(())
    }
}

pub fn nested_field<'a>(root: &'a JsonValue, path: &str) -> Option<&'a JsonValue> {
    path.split('.')
        .try_fold(root, |cur, seg| cur.as_object()?.get(seg))
}

pub fn set_nested_field(
    root: &mut JsonValue,
    path: &str,
    value: JsonValue,
) -> Result<(), String> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(format!("invalid field path {path:?}"));
    }
    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| format!("invalid field path {path:?}"))?;

    let mut cur = root;
    for seg in parents {
        if cur.is_null() {
            *cur = JsonValue::Object(Map::new());
        }
        let obj = cur
            .as_object_mut()
            .ok_or_else(|| format!("{path}: {seg} is not inside an object"))?;
        cur = obj
            .entry(seg.to_string())
            .or_insert_with(|| JsonValue::Object(Map::new()));
    }
    if cur.is_null() {
        *cur = JsonValue::Object(Map::new());
    }
    let obj = cur
        .as_object_mut()
        .ok_or_else(|| format!("{path}: parent of {last} is not an object"))?;
    obj.insert(last.to_string(), value);
    Ok(())
}
