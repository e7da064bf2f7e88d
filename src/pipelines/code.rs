//! Structured-code pipeline: a language-aware symbol-path splitter. `path`
//! tracks the enclosing namespace/class/function chain; container-opening
//! chunks are marked `structural`, leaves `code`.
//!
//! Nesting is tracked by brace depth for C-family languages (Rust, Go, Java,
//! JS/TS, C/C++) and by indentation for Python. This is a heuristic splitter,
//! not a language parser — good enough to recover a useful symbol path
//! without per-language grammars.

use regex::Regex;
use std::sync::LazyLock;

use super::{ContentPipeline, PipelineOutput};
use crate::core::types::ScrapeResultChunk;

static DECL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\s*(?:pub(?:\([^)]*\))?\s+)?(?:export\s+)?(?:default\s+)?(?:async\s+)?(?:static\s+)?(fn|func|function|def|class|struct|enum|interface|impl|namespace|mod|module|trait)\s+([A-Za-z_][A-Za-z0-9_]*)",
    )
    .expect("static regex")
});

#[derive(Default)]
pub struct CodePipeline;

impl ContentPipeline for CodePipeline {
    fn can_handle(&self, mime_type: &str) -> bool {
        matches!(
            mime_type,
            "text/x-source-code"
                | "text/rust"
                | "text/x-rust"
                | "application/javascript"
                | "text/javascript"
                | "application/typescript"
                | "text/x-python"
                | "text/x-go"
                | "text/x-java"
        )
    }

    fn process(&self, _url: &str, _mime_type: &str, bytes: &[u8]) -> anyhow::Result<PipelineOutput> {
        let source = String::from_utf8_lossy(bytes).to_string();
        let chunks = if source.contains('{') {
            split_by_braces(&source)
        } else {
            split_by_indentation(&source)
        };
        Ok(PipelineOutput {
            title: String::new(),
            content_type: "text/x-source-code".to_string(),
            chunks,
        })
    }
}

struct Frame {
    depth_at_open: i32,
    path: Vec<String>,
}

fn split_by_braces(source: &str) -> Vec<ScrapeResultChunk> {
    let mut chunks = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();
    let mut buffer = String::new();
    let mut depth = 0i32;

    let current_path = |stack: &[Frame]| -> Vec<String> {
        stack.last().map(|f| f.path.clone()).unwrap_or_default()
    };

    let flush = |buffer: &mut String, path: Vec<String>, types: &[&str], chunks: &mut Vec<ScrapeResultChunk>| {
        let trimmed = buffer.trim_end_matches('\n');
        if !trimmed.trim().is_empty() {
            chunks.push(ScrapeResultChunk {
                content: trimmed.to_string(),
                level: path.len() as u32,
                path,
                types: types.iter().map(|s| s.to_string()).collect(),
            });
        }
        buffer.clear();
    };

    for line in source.lines() {
        if let Some(caps) = DECL_RE.captures(line) {
            flush(&mut buffer, current_path(&stack), &["code"], &mut chunks);

            let name = caps.get(2).map(|m| m.as_str()).unwrap_or("anonymous").to_string();
            let mut path = current_path(&stack);
            path.push(name);

            chunks.push(ScrapeResultChunk {
                content: line.trim().to_string(),
                level: path.len() as u32,
                path: path.clone(),
                types: vec!["structural".to_string()],
            });

            stack.push(Frame {
                depth_at_open: depth,
                path,
            });
        } else {
            buffer.push_str(line);
            buffer.push('\n');
        }

        depth += line.matches('{').count() as i32 - line.matches('}').count() as i32;

        while let Some(top) = stack.last() {
            if depth <= top.depth_at_open {
                flush(&mut buffer, current_path(&stack), &["code"], &mut chunks);
                stack.pop();
            } else {
                break;
            }
        }
    }

    flush(&mut buffer, current_path(&stack), &["code"], &mut chunks);
    chunks
}

fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ').count()
}

fn split_by_indentation(source: &str) -> Vec<ScrapeResultChunk> {
    let mut chunks = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut buffer = String::new();

    let current_path = |stack: &[(usize, String)]| -> Vec<String> {
        stack.iter().map(|(_, n)| n.clone()).collect()
    };

    let flush = |buffer: &mut String, path: Vec<String>, chunks: &mut Vec<ScrapeResultChunk>| {
        let trimmed = buffer.trim_end_matches('\n');
        if !trimmed.trim().is_empty() {
            chunks.push(ScrapeResultChunk {
                content: trimmed.to_string(),
                level: path.len() as u32,
                path,
                types: vec!["code".to_string()],
            });
        }
        buffer.clear();
    };

    for line in source.lines() {
        if let Some(caps) = DECL_RE.captures(line) {
            let indent = indent_of(line);
            while stack.last().map(|(i, _)| *i >= indent).unwrap_or(false) {
                flush(&mut buffer, current_path(&stack), &mut chunks);
                stack.pop();
            }
            flush(&mut buffer, current_path(&stack), &mut chunks);

            let name = caps.get(2).map(|m| m.as_str()).unwrap_or("anonymous").to_string();
            let mut path = current_path(&stack);
            path.push(name);
            chunks.push(ScrapeResultChunk {
                content: line.trim().to_string(),
                level: path.len() as u32,
                path: path.clone(),
                types: vec!["structural".to_string()],
            });
            stack.push((indent, path.last().cloned().unwrap_or_default()));
        } else {
            buffer.push_str(line);
            buffer.push('\n');
        }
    }

    flush(&mut buffer, current_path(&stack), &mut chunks);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brace_splitter_tracks_nested_functions() {
        let src = "fn outer() {\n    let x = 1;\n    fn inner() {\n        let y = 2;\n    }\n}\n";
        let chunks = split_by_braces(src);
        assert!(chunks.iter().any(|c| c.path == vec!["outer".to_string()]));
        assert!(chunks
            .iter()
            .any(|c| c.path == vec!["outer".to_string(), "inner".to_string()]));
    }

    #[test]
    fn indentation_splitter_tracks_python_def() {
        let src = "def outer():\n    x = 1\n    def inner():\n        y = 2\n";
        let chunks = split_by_indentation(src);
        assert!(chunks.iter().any(|c| c.path == vec!["outer".to_string()]));
    }
}
