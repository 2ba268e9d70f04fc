use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::tools::common::LookupTools;

const DEFAULT_SENTENCES: usize = 5;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    query: Option<SearchQuery>,
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    #[serde(default)]
    search: Vec<SearchEntry>,
}

#[derive(Debug, Deserialize)]
struct SearchEntry {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ExtractResponse {
    query: Option<ExtractQuery>,
}

#[derive(Debug, Deserialize)]
struct ExtractQuery {
    #[serde(default)]
    pages: std::collections::HashMap<String, ExtractPage>,
}

#[derive(Debug, Deserialize)]
struct ExtractPage {
    title: String,
    #[serde(default)]
    extract: String,
}

fn article_url(title: &str) -> String {
    format!(
        "https://en.wikipedia.org/wiki/{}",
        title.replace(' ', "_")
    )
}

impl LookupTools {
    /// Look up a topic: find the best-matching article, then fetch a
    /// plain-text introductory extract for it.
    pub async fn wikipedia(
        &self,
        query: &str,
        sentences: Option<usize>,
    ) -> Result<serde_json::Value> {
        let sentences = sentences.unwrap_or(DEFAULT_SENTENCES).clamp(1, 10);

        let search: SearchResponse = self
            .http
            .get(&self.cfg.wikipedia_endpoint)
            .query(&[
                ("action", "query"),
                ("list", "search"),
                ("srsearch", query),
                ("srlimit", "1"),
                ("format", "json"),
            ])
            .send()
            .await
            .context("send wikipedia search request")?
            .error_for_status()
            .context("wikipedia search")?
            .json()
            .await
            .context("parse wikipedia search response")?;

        let Some(entry) = search.query.map(|q| q.search).and_then(|s| s.into_iter().next())
        else {
            debug!(query, "wikipedia: no matching article");
            return Ok(json!({ "query": query, "found": false }));
        };

        let sentences_s = sentences.to_string();
        let extract: ExtractResponse = self
            .http
            .get(&self.cfg.wikipedia_endpoint)
            .query(&[
                ("action", "query"),
                ("prop", "extracts"),
                ("titles", entry.title.as_str()),
                ("exintro", "1"),
                ("explaintext", "1"),
                ("exsentences", sentences_s.as_str()),
                ("redirects", "1"),
                ("format", "json"),
            ])
            .send()
            .await
            .context("send wikipedia extract request")?
            .error_for_status()
            .context("wikipedia extract")?
            .json()
            .await
            .context("parse wikipedia extract response")?;

        let page = extract
            .query
            .map(|q| q.pages)
            .and_then(|pages| pages.into_values().next());
        let Some(page) = page else {
            return Ok(json!({ "query": query, "found": false }));
        };

        debug!(query, title = %page.title, "wikipedia lookup completed");
        Ok(json!({
            "query": query,
            "found": true,
            "title": page.title,
            "extract": page.extract,
            "url": article_url(&page.title),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LookupConfig;
    use httptest::{Expectation, Server, matchers::*, responders::*};

    #[test]
    fn article_url_underscores_spaces() {
        assert_eq!(
            article_url("Ada Lovelace"),
            "https://en.wikipedia.org/wiki/Ada_Lovelace"
        );
    }

    #[test]
    fn extract_response_parses() {
        let payload = r#"{"query":{"pages":{"856":{"pageid":856,"ns":0,"title":"Ada Lovelace","extract":"Augusta Ada King was an English mathematician."}}}}"#;
        let resp: ExtractResponse = serde_json::from_str(payload).unwrap();
        let page = resp.query.unwrap().pages.into_values().next().unwrap();
        assert_eq!(page.title, "Ada Lovelace");
        assert!(page.extract.contains("mathematician"));
    }

    #[tokio::test]
    async fn wikipedia_round_trip() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/w/api.php"),
                request::query(url_decoded(contains(("list", "search")))),
            ])
            .respond_with(json_encoded(serde_json::json!({
                "query": {"search": [{"title": "Ada Lovelace"}]}
            }))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/w/api.php"),
                request::query(url_decoded(contains(("prop", "extracts")))),
            ])
            .respond_with(json_encoded(serde_json::json!({
                "query": {"pages": {"856": {
                    "title": "Ada Lovelace",
                    "extract": "Augusta Ada King was an English mathematician."
                }}}
            }))),
        );

        let tools = LookupTools::new(LookupConfig {
            wikipedia_endpoint: server.url_str("/w/api.php"),
            ..LookupConfig::default()
        })
        .unwrap();
        let out = tools.wikipedia("ada lovelace", Some(2)).await.unwrap();
        assert_eq!(out["found"], true);
        assert_eq!(out["title"], "Ada Lovelace");
        assert_eq!(out["url"], "https://en.wikipedia.org/wiki/Ada_Lovelace");
    }

    #[tokio::test]
    async fn wikipedia_no_match_reports_not_found() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/w/api.php"))
                .respond_with(json_encoded(serde_json::json!({
                    "query": {"search": []}
                }))),
        );

        let tools = LookupTools::new(LookupConfig {
            wikipedia_endpoint: server.url_str("/w/api.php"),
            ..LookupConfig::default()
        })
        .unwrap();
        let out = tools.wikipedia("zxqv nonsense", None).await.unwrap();
        assert_eq!(out["found"], false);
    }
}
