//! Prose pipeline: HTML/Markdown/plain-text, split along heading hierarchy.
//! HTML is cleaned with `readability`, converted to Markdown with `html2md`,
//! then walked with `pulldown-cmark`.

use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Parser, Tag, TagEnd};
use scraper::{Html, Selector};

use super::{ContentPipeline, PipelineOutput};
use crate::core::types::ScrapeResultChunk;

const DROPPED_SELECTORS: &[&str] = &["nav", "footer", "script", "style", "noscript"];

#[derive(Default)]
pub struct ProsePipeline;

impl ContentPipeline for ProsePipeline {
    fn can_handle(&self, mime_type: &str) -> bool {
        matches!(
            mime_type,
            "text/html" | "text/markdown" | "text/plain" | "application/xhtml+xml"
        )
    }

    fn process(&self, url: &str, mime_type: &str, bytes: &[u8]) -> anyhow::Result<PipelineOutput> {
        let raw = String::from_utf8_lossy(bytes).to_string();

        let (title, markdown) = match mime_type {
            "text/html" | "application/xhtml+xml" => html_to_markdown(&raw, url)?,
            "text/markdown" => (first_heading_text(&raw), raw.clone()),
            _ => (String::new(), raw.clone()),
        };

        let chunks = split_markdown(&markdown);
        Ok(PipelineOutput {
            title,
            content_type: "text/markdown".to_string(),
            chunks,
        })
    }
}

fn html_to_markdown(raw: &str, url: &str) -> anyhow::Result<(String, String)> {
    let cleaned = strip_noise(raw);

    let product = {
        let mut cursor = std::io::Cursor::new(cleaned.as_bytes());
        let parsed_url = url::Url::parse(url).unwrap_or_else(|_| url::Url::parse("about:blank").unwrap());
        readability::extractor::extract(&mut cursor, &parsed_url).ok()
    };

    match product {
        Some(p) => Ok((p.title, html2md::parse_html(&p.content))),
        None => {
            let title = extract_title(&cleaned);
            Ok((title, html2md::parse_html(&cleaned)))
        }
    }
}

fn strip_noise(raw: &str) -> String {
    let document = Html::parse_document(raw);
    let mut html = raw.to_string();
    for selector_str in DROPPED_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            for element in document.select(&selector) {
                let fragment = element.html();
                html = html.replacen(&fragment, "", 1);
            }
        }
    }
    html
}

fn extract_title(html: &str) -> String {
    let document = Html::parse_document(html);
    if let Ok(selector) = Selector::parse("title") {
        if let Some(el) = document.select(&selector).next() {
            return el.text().collect::<String>().trim().to_string();
        }
    }
    String::new()
}

fn first_heading_text(markdown: &str) -> String {
    markdown
        .lines()
        .find(|l| l.trim_start().starts_with('#'))
        .map(|l| l.trim_start_matches('#').trim().to_string())
        .unwrap_or_default()
}

fn heading_level_num(level: HeadingLevel) -> u32 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

fn flush(buffer: &mut String, heading_stack: &[(u32, String)], chunks: &mut Vec<ScrapeResultChunk>, types: &[&str]) {
    let trimmed = buffer.trim();
    if !trimmed.is_empty() {
        chunks.push(ScrapeResultChunk {
            content: trimmed.to_string(),
            path: heading_stack.iter().map(|(_, t)| t.clone()).collect(),
            level: heading_stack.len() as u32,
            types: types.iter().map(|s| s.to_string()).collect(),
        });
    }
    buffer.clear();
}

/// Splits Markdown into chunks aligned to heading hierarchy. `path` is the
/// stack of ancestor heading titles at the point each chunk was emitted.
fn split_markdown(markdown: &str) -> Vec<ScrapeResultChunk> {
    let parser = Parser::new(markdown);
    let mut chunks = Vec::new();
    let mut heading_stack: Vec<(u32, String)> = Vec::new();
    let mut current_heading_text = String::new();
    let mut in_heading = false;
    let mut current_level = 0u32;
    let mut buffer = String::new();
    let mut in_code_block = false;
    let mut in_table = false;

    for event in parser {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                flush(&mut buffer, &heading_stack, &mut chunks, &["text"]);
                in_heading = true;
                current_level = heading_level_num(level);
                current_heading_text.clear();
            }
            Event::End(TagEnd::Heading(_)) => {
                in_heading = false;
                while heading_stack
                    .last()
                    .map(|(l, _)| *l >= current_level)
                    .unwrap_or(false)
                {
                    heading_stack.pop();
                }
                heading_stack.push((current_level, current_heading_text.trim().to_string()));
            }
            Event::Start(Tag::CodeBlock(kind)) => {
                flush(&mut buffer, &heading_stack, &mut chunks, &["text"]);
                in_code_block = true;
                if let CodeBlockKind::Fenced(lang) = kind {
                    buffer.push_str(&format!("```{lang}\n"));
                } else {
                    buffer.push_str("```\n");
                }
            }
            Event::End(TagEnd::CodeBlock) => {
                buffer.push_str("```\n");
                in_code_block = false;
                flush(&mut buffer, &heading_stack, &mut chunks, &["code"]);
            }
            Event::Start(Tag::Table(_)) => {
                flush(&mut buffer, &heading_stack, &mut chunks, &["text"]);
                in_table = true;
            }
            Event::End(TagEnd::Table) => {
                in_table = false;
                flush(&mut buffer, &heading_stack, &mut chunks, &["table"]);
            }
            Event::Text(t) | Event::Code(t) => {
                if in_heading {
                    current_heading_text.push_str(&t);
                } else {
                    buffer.push_str(&t);
                }
            }
            Event::SoftBreak | Event::HardBreak => buffer.push('\n'),
            Event::End(TagEnd::Paragraph) | Event::End(TagEnd::Item) => {
                if !in_code_block && !in_table {
                    buffer.push_str("\n\n");
                }
            }
            _ => {}
        }
    }

    flush(&mut buffer, &heading_stack, &mut chunks, &["text"]);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_headings() {
        let md = "# Guide\n\nIntro text.\n\n## Install\n\nStep one.\n";
        let chunks = split_markdown(md);
        assert!(chunks.iter().any(|c| c.path == vec!["Guide".to_string()]));
        assert!(chunks
            .iter()
            .any(|c| c.path == vec!["Guide".to_string(), "Install".to_string()]));
    }

    #[test]
    fn code_block_is_marked_code() {
        let md = "# Title\n\n```rust\nfn main() {}\n```\n";
        let chunks = split_markdown(md);
        assert!(chunks.iter().any(|c| c.types.contains(&"code".to_string())));
    }
}
