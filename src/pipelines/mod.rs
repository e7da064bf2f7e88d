//! Content pipelines: `(bytes, mime_type, source_url) -> scrape_result`.
//! Pipelines are selected by MIME type, not inheritance — a tagged set of
//! variants behind a small capability interface.

pub mod code;
pub mod config_pipeline;
pub mod prose;

use crate::core::types::ScrapeResultChunk;

/// What a pipeline produces before the store wraps it with fetch-level
/// metadata (etag/last-modified come from the fetcher, not the pipeline).
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub title: String,
    pub content_type: String,
    pub chunks: Vec<ScrapeResultChunk>,
}

pub trait ContentPipeline: Send + Sync {
    fn can_handle(&self, mime_type: &str) -> bool;
    fn process(&self, url: &str, mime_type: &str, bytes: &[u8]) -> anyhow::Result<PipelineOutput>;
}

/// Picks the first pipeline whose `can_handle` matches; falls back to the
/// prose pipeline for unrecognized MIME types.
pub fn dispatch(
    pipelines: &[Box<dyn ContentPipeline>],
    url: &str,
    mime_type: &str,
    bytes: &[u8],
) -> anyhow::Result<PipelineOutput> {
    for pipeline in pipelines {
        if pipeline.can_handle(mime_type) {
            return pipeline.process(url, mime_type, bytes);
        }
    }
    prose::ProsePipeline::default().process(url, mime_type, bytes)
}

pub fn default_pipelines() -> Vec<Box<dyn ContentPipeline>> {
    vec![
        Box::new(config_pipeline::ConfigPipeline::default()),
        Box::new(code::CodePipeline::default()),
        Box::new(prose::ProsePipeline::default()),
    ]
}
