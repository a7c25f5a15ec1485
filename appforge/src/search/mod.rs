//! Keyword search with a four-stage fallback chain.
//!
//! Strategies, in order, until one yields at least one result:
//! 1. the primary HTML provider
//! 2. each alternative provider, independently
//! 3. a similarity lookup in the research cache
//! 4. knowledge synthesized by the text generator
//!
//! When all four come up empty the result is an empty list, which callers
//! treat as "no research available" rather than an error.

pub mod cache;
pub mod extract;
pub mod html;
pub mod journal;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::SearchSettings;
use crate::error::{Error, Result};
use crate::fallback::{Chain, Traced};
use crate::llm::{GenerationParams, TextGenerator, parse_structured_payload};
use crate::model::{SearchResult, rank};

pub use cache::{CacheStore, JsonFileStore, MemoryStore, ResearchCache};
pub use html::HtmlProvider;
pub use journal::InsightJournal;

/// Extra query facets searched alongside the bare keywords.
const RESEARCH_FACETS: [&str; 3] = ["best practices", "architecture patterns", "open source example"];

#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

#[derive(Debug, Deserialize)]
struct KnowledgeHit {
    #[serde(default)]
    url: String,
    title: String,
    #[serde(default, alias = "snippet", alias = "summary")]
    content: String,
}

pub struct SearchChain {
    primary: Arc<dyn SearchProvider>,
    alternatives: Vec<Arc<dyn SearchProvider>>,
    cache: Option<ResearchCache>,
    knowledge: Option<Arc<dyn TextGenerator>>,
    max_results: usize,
}

impl SearchChain {
    pub fn new(primary: Arc<dyn SearchProvider>) -> Self {
        Self {
            primary,
            alternatives: Vec::new(),
            cache: None,
            knowledge: None,
            max_results: SearchSettings::default().max_results,
        }
    }

    /// Build the HTML providers described by `settings`.
    pub fn from_settings(
        settings: &SearchSettings,
        cache: Option<ResearchCache>,
        knowledge: Option<Arc<dyn TextGenerator>>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .user_agent(settings.user_agent.clone())
            .build()?;
        let primary = HtmlProvider::new(settings.primary.clone(), http.clone())?;
        let mut chain = Self::new(Arc::new(primary)).with_max_results(settings.max_results);
        for spec in &settings.alternatives {
            chain = chain.with_alternative(Arc::new(HtmlProvider::new(spec.clone(), http.clone())?));
        }
        chain.cache = cache;
        chain.knowledge = knowledge;
        Ok(chain)
    }

    pub fn with_alternative(mut self, provider: Arc<dyn SearchProvider>) -> Self {
        self.alternatives.push(provider);
        self
    }

    pub fn with_cache(mut self, cache: ResearchCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_knowledge(mut self, llm: Arc<dyn TextGenerator>) -> Self {
        self.knowledge = Some(llm);
        self
    }

    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max.max(1);
        self
    }

    /// Ranked results for `keywords`, never an error.
    pub async fn search(&self, keywords: &[String]) -> Vec<SearchResult> {
        self.search_traced(keywords).await.into_inner()
    }

    pub async fn search_traced(&self, keywords: &[String]) -> Traced<Vec<SearchResult>> {
        let keywords: Vec<String> = keywords
            .iter()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .collect();
        if keywords.is_empty() {
            return Traced {
                value: Vec::new(),
                log: vec!["search: no keywords".to_string()],
            };
        }
        let query = keywords.join(" ");

        let mut chain = Chain::new();
        for provider in std::iter::once(&self.primary).chain(&self.alternatives) {
            let (query, keywords) = (query.as_str(), keywords.as_slice());
            chain = chain.then(format!("search:{}", provider.name()), move || async move {
                let raw = provider.search(query).await?;
                Ok((self.finish(raw, keywords), true))
            });
        }
        if let Some(cache) = &self.cache {
            let keywords = keywords.as_slice();
            chain = chain.then("search:cache", move || async move {
                let hit = cache
                    .lookup(keywords)
                    .ok_or_else(|| Error::Provider("no similar cached query".into()))?;
                tracing::debug!(key = %hit.key, similarity = hit.similarity, "Research cache hit");
                Ok((self.finish(hit.results, keywords), false))
            });
        }
        if let Some(llm) = &self.knowledge {
            let (query, keywords) = (query.as_str(), keywords.as_slice());
            chain = chain.then("search:knowledge", move || async move {
                let raw = knowledge_results(llm.as_ref(), query).await?;
                Ok((self.finish(raw, keywords), false))
            });
        }

        let resolved = chain.run(|(results, _)| !results.is_empty()).await;
        let mut log = resolved.trail;
        let Some((results, from_network)) = resolved.value else {
            tracing::warn!(query = %query, "Every search strategy came up empty");
            log.push("search: no results from any strategy".to_string());
            return Traced {
                value: Vec::new(),
                log,
            };
        };

        if from_network && let Some(cache) = &self.cache {
            if let Err(e) = cache.store(&query, &results) {
                tracing::warn!(error = %e, "Failed to write research cache");
                log.push(format!("search: cache write failed: {e}"));
            }
        }
        Traced {
            value: results,
            log,
        }
    }

    /// Concurrent searches for the bare keywords plus each research facet,
    /// merged by URL and ranked against the bare keywords. Duplicate URLs
    /// keep the best-scoring snippet.
    pub async fn fan_out(&self, keywords: &[String]) -> Traced<Vec<SearchResult>> {
        if keywords.iter().all(|k| k.trim().is_empty()) {
            return Traced {
                value: Vec::new(),
                log: vec!["search: no keywords".to_string()],
            };
        }
        let queries = research_queries(keywords);
        let runs = futures::future::join_all(queries.iter().map(|q| self.search_traced(q))).await;

        let mut log = Vec::new();
        let mut merged: HashMap<String, SearchResult> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for (query, run) in queries.iter().zip(runs) {
            let label = query.join(" ");
            log.extend(run.log.into_iter().map(|line| format!("[{label}] {line}")));
            for mut result in run.value {
                result.relevance = extract::relevance(&result.content, keywords);
                match merged.get_mut(&result.url) {
                    Some(existing) => {
                        if result.relevance > existing.relevance {
                            existing.title = result.title;
                            existing.content = result.content;
                            existing.relevance = result.relevance;
                        }
                        existing.insights.extend(result.insights);
                        existing.code_patterns.extend(result.code_patterns);
                        existing.ui_patterns.extend(result.ui_patterns);
                    }
                    None => {
                        order.push(result.url.clone());
                        merged.insert(result.url.clone(), result);
                    }
                }
            }
        }

        let mut results: Vec<SearchResult> =
            order.into_iter().filter_map(|url| merged.remove(&url)).collect();
        rank(&mut results);
        results.truncate(self.max_results);
        Traced {
            value: results,
            log,
        }
    }

    /// Existing apps resembling a free-text idea.
    pub async fn similar_apps(&self, prompt: &str) -> Traced<Vec<SearchResult>> {
        let keywords = crate::agents::research::fallback_keywords(prompt);
        self.fan_out(&keywords).await
    }

    fn finish(&self, raw: Vec<SearchResult>, keywords: &[String]) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = raw
            .into_iter()
            .map(|r| extract::enrich(r, keywords))
            .collect();
        rank(&mut results);
        results.truncate(self.max_results);
        results
    }
}

/// The bare keyword query followed by one query per research facet.
pub fn research_queries(keywords: &[String]) -> Vec<Vec<String>> {
    let mut queries = vec![keywords.to_vec()];
    for facet in RESEARCH_FACETS {
        let mut q = keywords.to_vec();
        q.push(facet.to_string());
        queries.push(q);
    }
    queries
}

async fn knowledge_results(llm: &dyn TextGenerator, query: &str) -> Result<Vec<SearchResult>> {
    let prompt = format!(
        "Web search is unavailable. From your own knowledge, list up to 5 well-known \
         resources (documentation, tutorials, open source projects) about: {query}\n\n\
         Reply with a JSON array of objects: \
         [{{\"url\": \"...\", \"title\": \"...\", \"content\": \"two or three sentences of key takeaways\"}}]"
    );
    let reply = llm.generate(&prompt, GenerationParams::structured(1500)).await?;
    let hits: Vec<KnowledgeHit> = parse_structured_payload(&reply)?;
    Ok(hits
        .into_iter()
        .filter(|h| !h.title.trim().is_empty())
        .map(|h| SearchResult::new(h.url, h.title, h.content))
        .collect())
}
