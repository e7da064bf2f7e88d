//! The agent-facing tool catalog (§6): JSON Schemas for the MCP surface,
//! independent of transport (stdio or HTTP).

use serde_json::Value;

#[derive(Clone, Debug)]
pub struct ToolCatalogEntry {
    pub name: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
    pub icons: Vec<&'static str>,
}

fn scraper_options_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "max_pages": {"type": "integer", "minimum": 1},
            "max_depth": {"type": "integer", "minimum": 0},
            "scope": {"type": "string", "enum": ["subpages", "hostname", "domain"]},
            "follow_redirects": {"type": "boolean"},
            "ignore_errors": {"type": "boolean"},
            "max_concurrency": {"type": "integer", "minimum": 1},
            "include_patterns": {"type": "array", "items": {"type": "string"}},
            "exclude_patterns": {"type": "array", "items": {"type": "string"}},
            "scrape_mode": {"type": "string", "enum": ["auto", "fetch", "playwright"]},
            "headers": {"type": "object", "additionalProperties": {"type": "string"}}
        }
    })
}

pub fn tool_catalog() -> Vec<ToolCatalogEntry> {
    vec![
        ToolCatalogEntry {
            name: "search_docs",
            title: "Search Documentation",
            description: "Hybrid full-text + semantic search over an indexed library version. Returns assembled passages, not raw chunks.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "library": {"type": "string"},
                    "version": {"type": "string", "description": "Omit, empty, or 'latest' for the unversioned/most recent indexed version."},
                    "query": {"type": "string"},
                    "limit": {"type": "integer", "minimum": 1, "default": 5}
                },
                "required": ["library", "query"]
            }),
            icons: vec![],
        },
        ToolCatalogEntry {
            name: "list_libraries",
            title: "List Libraries",
            description: "Lists every indexed library with a summary of each of its versions.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            icons: vec![],
        },
        ToolCatalogEntry {
            name: "list_versions",
            title: "List Versions",
            description: "Lists every indexed version of one library, with status and page counts.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "library": {"type": "string"}
                },
                "required": ["library"]
            }),
            icons: vec![],
        },
        ToolCatalogEntry {
            name: "find_version",
            title: "Find Version",
            description: "Resolves a library/version pair, returning the best matching indexed version and whether an unversioned variant exists.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "library": {"type": "string"},
                    "target": {"type": "string"}
                },
                "required": ["library"]
            }),
            icons: vec![],
        },
        ToolCatalogEntry {
            name: "scrape_docs",
            title: "Scrape Documentation",
            description: "Enqueues a crawl of a documentation site starting at one URL, indexing pages under the given library/version. Returns immediately with a job id.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"},
                    "library": {"type": "string"},
                    "version": {"type": "string"},
                    "options": scraper_options_schema()
                },
                "required": ["url", "library"]
            }),
            icons: vec![],
        },
        ToolCatalogEntry {
            name: "fetch_url",
            title: "Fetch URL",
            description: "Fetches one URL and returns its content converted to Markdown, without indexing it.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {"type": "string"},
                    "options": scraper_options_schema()
                },
                "required": ["url"]
            }),
            icons: vec![],
        },
        ToolCatalogEntry {
            name: "remove_docs",
            title: "Remove Documentation",
            description: "Deletes an indexed library version and all of its pages, chunks, and vectors.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "library": {"type": "string"},
                    "version": {"type": "string"}
                },
                "required": ["library"]
            }),
            icons: vec![],
        },
        ToolCatalogEntry {
            name: "get_job_info",
            title: "Get Job Info",
            description: "Returns status/progress for one job, or every tracked job when no id is given.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "job_id": {"type": "string"}
                }
            }),
            icons: vec![],
        },
        ToolCatalogEntry {
            name: "cancel_job",
            title: "Cancel Job",
            description: "Cooperatively cancels a running or queued job; the version reaches CANCELLED once the worker observes it.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "job_id": {"type": "string"}
                },
                "required": ["job_id"]
            }),
            icons: vec![],
        },
        ToolCatalogEntry {
            name: "clear_completed_jobs",
            title: "Clear Completed Jobs",
            description: "Drops every tracked job whose version has reached a terminal status (completed, failed, cancelled).",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {}
            }),
            icons: vec![],
        },
        ToolCatalogEntry {
            name: "refresh_version",
            title: "Refresh Version",
            description: "Re-crawls an already-completed version using conditional requests, updating changed pages and removing ones that now 404.",
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "library": {"type": "string"},
                    "version": {"type": "string"}
                },
                "required": ["library"]
            }),
            icons: vec![],
        },
    ]
}
