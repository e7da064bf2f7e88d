//! Link discovery and scope/pattern filtering shared by the scrape and
//! refresh job bodies. Grounded in the teacher's BFS crawler
//! (`tools/crawl.rs`): a visited set, a depth-tagged queue, and a
//! buffered-unordered fetch wave per round.

pub mod refresh;
pub mod scrape;

use url::Url;

use crate::core::errors::{AppError, AppResult};
use crate::core::types::CrawlScope;
use crate::fetcher::file::FileFetcher;

/// If `start` is a `file://` URL pointing at a directory, enumerates every
/// file under it as a BFS seed (§4.2 directory-tree pseudo-pages). Returns
/// `None` for anything else, leaving the caller to seed its queue with
/// `start` alone.
pub async fn enumerate_file_root(start: &Url) -> AppResult<Option<Vec<String>>> {
    if start.scheme() != "file" {
        return Ok(None);
    }
    let Ok(path) = start.to_file_path() else {
        return Ok(None);
    };
    if !path.is_dir() {
        return Ok(None);
    }
    let files = FileFetcher::enumerate(&path)
        .await
        .map_err(|e| AppError::Validation(format!("failed to enumerate {}: {e}", path.display())))?;
    Ok(Some(files))
}

/// Pulls every `href` out of an HTML document, resolves it against
/// `base_url`, strips the fragment, and drops non-http(s) schemes.
pub fn extract_links(html: &str, base_url: &str) -> Vec<String> {
    use scraper::{Html, Selector};

    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);
    let base = Url::parse(base_url).ok();

    let mut out = Vec::new();
    for el in document.select(&selector) {
        let Some(href) = el.value().attr("href") else { continue };
        let trimmed = href.trim();
        if trimmed.is_empty()
            || trimmed.starts_with('#')
            || trimmed.starts_with("javascript:")
            || trimmed.starts_with("mailto:")
            || trimmed.starts_with("tel:")
            || trimmed.starts_with("data:")
        {
            continue;
        }

        let resolved = match &base {
            Some(b) => b.join(trimmed).ok(),
            None => Url::parse(trimmed).ok(),
        };
        let Some(mut resolved) = resolved else { continue };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        resolved.set_fragment(None);
        out.push(resolved.to_string());
    }
    out
}

fn registrable_domain(host: &str) -> String {
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() >= 2 {
        parts[parts.len() - 2..].join(".")
    } else {
        host.to_string()
    }
}

/// Whether `candidate` stays within `scope` of `start`.
pub fn in_scope(candidate: &str, start: &Url, scope: CrawlScope) -> bool {
    let Ok(candidate_url) = Url::parse(candidate) else {
        return false;
    };
    match scope {
        CrawlScope::Hostname => candidate_url.host_str() == start.host_str(),
        CrawlScope::Domain => {
            let candidate_domain = registrable_domain(candidate_url.host_str().unwrap_or(""));
            let start_domain = registrable_domain(start.host_str().unwrap_or(""));
            !candidate_domain.is_empty() && candidate_domain == start_domain
        }
        CrawlScope::Subpages => {
            candidate_url.host_str() == start.host_str() && candidate_url.path().starts_with(start.path())
        }
    }
}

/// A pattern may be a regex, a glob, or (if neither compiles) a plain
/// substring — whichever the operator meant, this matches it.
fn matches_pattern(url: &str, pattern: &str) -> bool {
    if let Ok(re) = regex::Regex::new(pattern) {
        if re.is_match(url) {
            return true;
        }
    }
    if let Ok(glob) = globset::Glob::new(pattern) {
        if glob.compile_matcher().is_match(url) {
            return true;
        }
    }
    url.contains(pattern)
}

/// Exclude wins on conflict (§4.4): a URL matching both an include and an
/// exclude pattern is dropped.
pub fn passes_filters(url: &str, include: &[String], exclude: &[String]) -> bool {
    if exclude.iter().any(|p| matches_pattern(url, p)) {
        return false;
    }
    if !include.is_empty() && !include.iter().any(|p| matches_pattern(url, p)) {
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_and_resolves_relative_links() {
        let html = r#"<a href="/foo">foo</a><a href="https://other.example/bar">bar</a><a href="#frag">skip</a><a href="mailto:a@b.com">skip</a>"#;
        let links = extract_links(html, "https://docs.example/base/");
        assert_eq!(
            links,
            vec![
                "https://docs.example/foo".to_string(),
                "https://other.example/bar".to_string(),
            ]
        );
    }

    #[test]
    fn subpages_scope_requires_path_prefix() {
        let start = Url::parse("https://docs.example/guide/").unwrap();
        assert!(in_scope("https://docs.example/guide/intro", &start, CrawlScope::Subpages));
        assert!(!in_scope("https://docs.example/other", &start, CrawlScope::Subpages));
    }

    #[test]
    fn domain_scope_allows_subdomains() {
        let start = Url::parse("https://docs.example.com/").unwrap();
        assert!(in_scope("https://api.example.com/x", &start, CrawlScope::Domain));
        assert!(!in_scope("https://example.org/x", &start, CrawlScope::Domain));
    }

    #[test]
    fn exclude_wins_over_include() {
        let include = vec!["docs".to_string()];
        let exclude = vec!["changelog".to_string()];
        assert!(passes_filters("https://x/docs/intro", &include, &exclude));
        assert!(!passes_filters("https://x/docs/changelog", &include, &exclude));
        assert!(!passes_filters("https://x/other", &include, &exclude));
    }
}
