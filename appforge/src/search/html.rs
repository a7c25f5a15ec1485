//! HTML result pages and the small selector engine that reads them.
//!
//! Selectors are minimal: `tag`, `.class` or `tag.class`. A
//! page is cut into result blocks at every opening tag matching the block
//! selector; fields are the first matching element inside a block.

use std::sync::LazyLock;

use async_trait::async_trait;
use percent_encoding::{NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use regex::Regex;

use super::SearchProvider;
use crate::config::HtmlProviderSpec;
use crate::error::{Error, Result};
use crate::model::SearchResult;

static OPEN_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<([a-z][a-z0-9]*)\b([^>]*)>").expect("valid regex"));
static ATTR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)([a-zA-Z_:][-a-zA-Z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("valid regex")
});
static ANY_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));

// ── Selectors ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    tag: Option<String>,
    class: Option<String>,
}

impl Selector {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (tag, class) = match s.split_once('.') {
            Some((tag, class)) => (tag, Some(class)),
            None => (s, None),
        };
        let valid = |part: &str| {
            !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        };
        let tag = if tag.is_empty() { None } else { Some(tag) };
        if tag.is_none() && class.is_none() {
            return Err(Error::Config(format!("empty selector: {s:?}")));
        }
        if tag.is_some_and(|t| !valid(t)) || class.is_some_and(|c| !valid(c)) {
            return Err(Error::Config(format!("unsupported selector: {s:?}")));
        }
        Ok(Self {
            tag: tag.map(|t| t.to_ascii_lowercase()),
            class: class.map(str::to_string),
        })
    }

    fn matches(&self, tag: &str, attrs: &str) -> bool {
        if let Some(want) = &self.tag
            && !tag.eq_ignore_ascii_case(want)
        {
            return false;
        }
        match &self.class {
            Some(want) => attr(attrs, "class")
                .is_some_and(|classes| classes.split_whitespace().any(|c| c == want)),
            None => true,
        }
    }
}

/// One matched element.
#[derive(Debug, Clone, Copy)]
pub struct Element<'a> {
    attrs: &'a str,
    inner: &'a str,
}

impl<'a> Element<'a> {
    pub fn attr(&self, name: &str) -> Option<String> {
        attr(self.attrs, name)
    }

    pub fn inner_html(&self) -> &'a str {
        self.inner
    }

    /// Inner text with tags stripped, entities decoded, whitespace collapsed.
    pub fn text(&self) -> String {
        let stripped = ANY_TAG.replace_all(self.inner, " ");
        decode_html_entities(&stripped)
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn attr(attrs: &str, name: &str) -> Option<String> {
    ATTR.captures_iter(attrs)
        .find(|caps| caps[1].eq_ignore_ascii_case(name))
        .and_then(|caps| caps.get(2).or(caps.get(3)).or(caps.get(4)))
        .map(|m| decode_html_entities(m.as_str()))
}

/// Cut `html` into blocks, each starting at an opening tag matching `sel`.
pub fn blocks<'a>(html: &'a str, sel: &Selector) -> Vec<&'a str> {
    let starts: Vec<usize> = OPEN_TAG
        .captures_iter(html)
        .filter(|caps| sel.matches(&caps[1], &caps[2]))
        .filter_map(|caps| caps.get(0).map(|m| m.start()))
        .collect();
    starts
        .iter()
        .enumerate()
        .map(|(i, &start)| {
            let end = starts.get(i + 1).copied().unwrap_or(html.len());
            &html[start..end]
        })
        .collect()
}

/// First element in `html` matching `sel`.
pub fn first<'a>(html: &'a str, sel: &Selector) -> Option<Element<'a>> {
    for caps in OPEN_TAG.captures_iter(html) {
        let (Some(whole), Some(tag), Some(attrs)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if !sel.matches(tag.as_str(), attrs.as_str()) {
            continue;
        }
        let rest = &html[whole.end()..];
        let close = format!("</{}", tag.as_str().to_ascii_lowercase());
        let inner_end = rest.to_ascii_lowercase().find(&close).unwrap_or(rest.len());
        return Some(Element {
            attrs: attrs.as_str(),
            inner: &rest[..inner_end],
        });
    }
    None
}

pub fn decode_html_entities(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&#x27;", "'")
        .replace("&#x2F;", "/")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Unwrap redirect links (`/l/?uddg=<encoded>`) and scheme-relative URLs.
pub fn normalize_link(href: &str) -> String {
    if let Some(pos) = href.find("uddg=") {
        let encoded = &href[pos + 5..];
        let encoded = encoded.split('&').next().unwrap_or(encoded);
        return percent_decode_str(encoded).decode_utf8_lossy().into_owned();
    }
    if let Some(rest) = href.strip_prefix("//") {
        return format!("https://{rest}");
    }
    href.to_string()
}

// ── Provider ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Selectors {
    result: Selector,
    title: Selector,
    link: Selector,
    snippet: Selector,
}

/// A search engine scraped through its HTML results page.
pub struct HtmlProvider {
    spec: HtmlProviderSpec,
    selectors: Selectors,
    http: reqwest::Client,
}

impl HtmlProvider {
    pub fn new(spec: HtmlProviderSpec, http: reqwest::Client) -> Result<Self> {
        if !spec.url_template.contains("{query}") {
            return Err(Error::Config(format!(
                "search provider {}: url_template has no {{query}}",
                spec.name
            )));
        }
        let selectors = Selectors {
            result: Selector::parse(&spec.result)?,
            title: Selector::parse(&spec.title)?,
            link: Selector::parse(&spec.link)?,
            snippet: Selector::parse(&spec.snippet)?,
        };
        Ok(Self {
            spec,
            selectors,
            http,
        })
    }

    pub fn url_for(&self, query: &str) -> String {
        let encoded = utf8_percent_encode(query, NON_ALPHANUMERIC).to_string();
        self.spec.url_template.replace("{query}", &encoded)
    }

    /// Extract results from a page, skipping blocks without a title or link.
    pub fn parse_page(&self, html: &str) -> Vec<SearchResult> {
        blocks(html, &self.selectors.result)
            .into_iter()
            .filter_map(|block| {
                let title = first(block, &self.selectors.title)?.text();
                let href = first(block, &self.selectors.link)?.attr("href")?;
                let snippet = first(block, &self.selectors.snippet)
                    .map(|e| e.text())
                    .unwrap_or_default();
                let url = normalize_link(&href);
                if title.is_empty() || !url.starts_with("http") {
                    return None;
                }
                Some(SearchResult::new(url, title, snippet))
            })
            .collect()
    }
}

#[async_trait]
impl SearchProvider for HtmlProvider {
    fn name(&self) -> &str {
        &self.spec.name
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        let url = self.url_for(query);
        let resp = self.http.get(&url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::http_status(status.as_u16(), &body));
        }
        let html = resp.text().await?;
        let results = self.parse_page(&html);
        tracing::debug!(provider = %self.spec.name, count = results.len(), "Parsed results page");
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DDG_PAGE: &str = r##"
<div class="result results_links results_links_deep web-result">
  <div class="links_main links_deep result__body">
    <h2 class="result__title">
      <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Ftodo&amp;rut=abc">Build a <b>Todo</b> App</a>
    </h2>
    <a class="result__snippet" href="#">A <b>todo</b> list with React &amp; hooks.</a>
  </div>
</div>
<div class="result results_links">
  <div class="links_main result__body">
    <h2 class="result__title"><a class="result__a" href="https://blog.dev/tasks">Task apps</a></h2>
    <div class="result__extras"></div>
  </div>
</div>
<div class="result__body"><span>ad without link</span></div>
"##;

    #[test]
    fn selector_parsing() {
        assert!(Selector::parse("a.result__a").is_ok());
        assert!(Selector::parse(".b_algo").is_ok());
        assert!(Selector::parse("li").is_ok());
        assert!(Selector::parse("div > a").is_err());
        assert!(Selector::parse("").is_err());
    }

    #[test]
    fn parses_duckduckgo_blocks() {
        let provider =
            HtmlProvider::new(HtmlProviderSpec::duckduckgo(), reqwest::Client::new()).unwrap();
        let results = provider.parse_page(DDG_PAGE);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].url, "https://example.com/todo");
        assert_eq!(results[0].title, "Build a Todo App");
        assert_eq!(results[0].content, "A todo list with React & hooks.");
        assert_eq!(results[1].url, "https://blog.dev/tasks");
        assert_eq!(results[1].content, "");
    }

    #[test]
    fn parses_bing_blocks() {
        let page = r#"<ol><li class="b_algo"><h2><a href="https://a.io/x">Alpha</a></h2>
            <div class="b_caption"><p>First snippet</p></div></li>
            <li class="b_algo"><h2><a href="https://b.io/y">Beta</a></h2><p>Second</p></li></ol>"#;
        let provider = HtmlProvider::new(HtmlProviderSpec::bing(), reqwest::Client::new()).unwrap();
        let results = provider.parse_page(page);
        let titles: Vec<&str> = results.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, ["Alpha", "Beta"]);
        assert_eq!(results[0].content, "First snippet");
    }

    #[test]
    fn query_is_percent_encoded() {
        let provider =
            HtmlProvider::new(HtmlProviderSpec::duckduckgo(), reqwest::Client::new()).unwrap();
        assert_eq!(
            provider.url_for("todo app&more"),
            "https://html.duckduckgo.com/html/?q=todo%20app%26more"
        );
    }

    #[test]
    fn template_without_placeholder_is_rejected() {
        let mut spec = HtmlProviderSpec::bing();
        spec.url_template = "https://www.bing.com/search".into();
        assert!(HtmlProvider::new(spec, reqwest::Client::new()).is_err());
    }
}
