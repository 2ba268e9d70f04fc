use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::OnceLock;
use tracing::debug;

use crate::tools::common::LookupTools;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

fn result_link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#)
            .expect("static regex")
    })
}

fn snippet_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#).expect("static regex")
    })
}

fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"))
}

fn strip_tags(html: &str) -> String {
    let text = tag_re().replace_all(html, "");
    decode_entities(text.trim())
}

fn decode_entities(s: &str) -> String {
    s.replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1].is_ascii_hexdigit()
            && bytes[i + 2].is_ascii_hexdigit()
            && let Ok(hex) = u8::from_str_radix(&s[i + 1..i + 3], 16)
        {
            out.push(hex);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Result links point at the redirect endpoint with the real URL in the
/// `uddg` query parameter; unwrap it when present.
fn unwrap_redirect(href: &str) -> String {
    if let Some(pos) = href.find("uddg=") {
        let rest = &href[pos + 5..];
        let end = rest.find('&').unwrap_or(rest.len());
        return percent_decode(&rest[..end]);
    }
    let href = decode_entities(href);
    if let Some(stripped) = href.strip_prefix("//") {
        return format!("https://{stripped}");
    }
    href
}

/// Extract result triples from the HTML results page, document order.
pub(crate) fn parse_results(html: &str, limit: usize) -> Vec<SearchHit> {
    let snippets: Vec<String> = snippet_re()
        .captures_iter(html)
        .map(|c| strip_tags(&c[1]))
        .collect();

    result_link_re()
        .captures_iter(html)
        .take(limit)
        .enumerate()
        .map(|(i, c)| SearchHit {
            title: strip_tags(&c[2]),
            url: unwrap_redirect(&c[1]),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}

impl LookupTools {
    /// Search the web and return up to `max_results` hits as JSON.
    pub async fn web_search(
        &self,
        query: &str,
        max_results: Option<usize>,
    ) -> Result<serde_json::Value> {
        let limit = max_results
            .unwrap_or(self.cfg.max_results)
            .clamp(1, self.cfg.max_results.max(1));

        let resp = self
            .http
            .get(&self.cfg.web_search_endpoint)
            .query(&[("q", query)])
            .send()
            .await
            .context("send web search request")?;
        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("web search error: {status}");
        }
        let html = resp.text().await.context("read web search response")?;

        let hits = parse_results(&html, limit);
        debug!(query, hits = hits.len(), "web_search completed");
        Ok(json!({ "query": query, "results": hits }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LookupConfig;
    use httptest::{Expectation, Server, matchers::*, responders::*};

    const FIXTURE: &str = r#"
<div class="result results_links results_links_deep web-result">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust%2Dlang.org%2F&amp;rut=abc">Rust Programming &amp; Language</a>
  </h2>
  <a class="result__snippet" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.rust%2Dlang.org%2F">A language empowering everyone to build <b>reliable</b> software.</a>
</div>
<div class="result results_links results_links_deep web-result">
  <h2 class="result__title">
    <a rel="nofollow" class="result__a" href="https://doc.rust-lang.org/book/">The Book</a>
  </h2>
  <a class="result__snippet" href="https://doc.rust-lang.org/book/">The Rust Programming Language book.</a>
</div>
"#;

    #[test]
    fn parses_results_with_redirect_urls() {
        let hits = parse_results(FIXTURE, 5);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].title, "Rust Programming & Language");
        assert_eq!(hits[0].url, "https://www.rust-lang.org/");
        assert_eq!(
            hits[0].snippet,
            "A language empowering everyone to build reliable software."
        );
        assert_eq!(hits[1].url, "https://doc.rust-lang.org/book/");
    }

    #[test]
    fn respects_limit() {
        let hits = parse_results(FIXTURE, 1);
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn empty_page_yields_no_hits() {
        assert!(parse_results("<html><body>no results</body></html>", 5).is_empty());
    }

    #[tokio::test]
    async fn web_search_round_trip() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/html/"),
                request::query(url_decoded(contains(("q", "rust")))),
            ])
            .respond_with(status_code(200).body(FIXTURE)),
        );

        let tools = LookupTools::new(LookupConfig {
            web_search_endpoint: server.url_str("/html/"),
            ..LookupConfig::default()
        })
        .unwrap();
        let out = tools.web_search("rust", Some(2)).await.unwrap();
        let results = out["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0]["url"], "https://www.rust-lang.org/");
    }

    #[tokio::test]
    async fn web_search_http_error_is_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/html/"))
                .respond_with(status_code(503)),
        );
        let tools = LookupTools::new(LookupConfig {
            web_search_endpoint: server.url_str("/html/"),
            ..LookupConfig::default()
        })
        .unwrap();
        assert!(tools.web_search("rust", None).await.is_err());
    }
}
