//! JSON/config pipeline: splits along the object-key path, similar to
//! the code pipeline's symbol path.

use serde_json::Value;

use super::{ContentPipeline, PipelineOutput};
use crate::core::types::ScrapeResultChunk;

#[derive(Default)]
pub struct ConfigPipeline;

impl ContentPipeline for ConfigPipeline {
    fn can_handle(&self, mime_type: &str) -> bool {
        matches!(mime_type, "application/json" | "text/x-yaml" | "application/yaml")
    }

    fn process(&self, _url: &str, _mime_type: &str, bytes: &[u8]) -> anyhow::Result<PipelineOutput> {
        let text = String::from_utf8_lossy(bytes).to_string();
        let value: Value = serde_json::from_str(&text)?;
        let mut chunks = Vec::new();
        walk(&value, None, &mut Vec::new(), false, 0, &mut chunks);
        Ok(PipelineOutput {
            title: String::new(),
            content_type: "application/json".to_string(),
            chunks,
        })
    }
}

/// Emits one chunk per opening brace/bracket, one per closing brace/bracket,
/// and one per leaf key-value pair, each holding the verbatim JSON syntax for
/// that token (key literal, punctuation, trailing comma). Concatenating every
/// chunk's content in `sort_order` reproduces a valid, re-parseable JSON
/// document — whitespace-only differences from the source aside — rather
/// than a placeholder summary.
fn walk(
    value: &Value,
    key: Option<&str>,
    path: &mut Vec<String>,
    trailing_comma: bool,
    indent: usize,
    chunks: &mut Vec<ScrapeResultChunk>,
) {
    let indent_str = "  ".repeat(indent);
    let prefix = match key {
        Some(k) => format!("{indent_str}{}: ", serde_json::to_string(k).unwrap_or_default()),
        None => indent_str.clone(),
    };
    let comma = if trailing_comma { "," } else { "" };

    match value {
        Value::Object(map) if !map.is_empty() => {
            chunks.push(ScrapeResultChunk {
                content: format!("{prefix}{{"),
                path: path.clone(),
                level: path.len() as u32,
                types: vec!["structural".to_string()],
            });
            let n = map.len();
            for (i, (k, child)) in map.iter().enumerate() {
                path.push(k.clone());
                walk(child, Some(k), path, i + 1 < n, indent + 1, chunks);
                path.pop();
            }
            chunks.push(ScrapeResultChunk {
                content: format!("{indent_str}}}{comma}"),
                path: path.clone(),
                level: path.len() as u32,
                types: vec!["structural".to_string()],
            });
        }
        Value::Array(items) if !items.is_empty() => {
            chunks.push(ScrapeResultChunk {
                content: format!("{prefix}["),
                path: path.clone(),
                level: path.len() as u32,
                types: vec!["structural".to_string()],
            });
            let n = items.len();
            for (i, item) in items.iter().enumerate() {
                path.push(i.to_string());
                walk(item, None, path, i + 1 < n, indent + 1, chunks);
                path.pop();
            }
            chunks.push(ScrapeResultChunk {
                content: format!("{indent_str}]{comma}"),
                path: path.clone(),
                level: path.len() as u32,
                types: vec!["structural".to_string()],
            });
        }
        leaf => {
            let rendered = serde_json::to_string(leaf).unwrap_or_default();
            chunks.push(ScrapeResultChunk {
                content: format!("{prefix}{rendered}{comma}"),
                path: path.clone(),
                level: path.len() as u32,
                types: vec!["code".to_string()],
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_nested_key_path() {
        let json = br#"{"server": {"port": 8080, "host": "localhost"}}"#;
        let pipeline = ConfigPipeline;
        let output = pipeline.process("test", "application/json", json).unwrap();
        assert!(output
            .chunks
            .iter()
            .any(|c| c.path == vec!["server".to_string(), "port".to_string()]));
    }

    #[test]
    fn concatenated_chunks_reparse_as_the_same_json() {
        let json = br#"{"server": {"port": 8080, "host": "localhost"}, "tags": ["a", "b"]}"#;
        let pipeline = ConfigPipeline;
        let output = pipeline.process("test", "application/json", json).unwrap();
        let rejoined = output.chunks.iter().map(|c| c.content.as_str()).collect::<Vec<_>>().join("\n");
        let reparsed: Value = serde_json::from_str(&rejoined).expect("rejoined chunks must still be valid JSON");
        let original: Value = serde_json::from_str(std::str::from_utf8(json).unwrap()).unwrap();
        assert_eq!(reparsed, original);
    }
}
