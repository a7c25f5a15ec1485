//! Research agent: keywords → fan-out search → top-K enhancement → summary.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Deserialize;

use super::{Role, ask, json_context};
use crate::fallback::{Chain, Traced};
use crate::llm::{GenerationParams, TextGenerator};
use crate::model::{AppPlan, ResearchSummary, SearchResult};
use crate::search::{InsightJournal, SearchChain};

const MAX_KEYWORDS: usize = 8;
const FALLBACK_KEYWORDS: usize = 5;
const SUMMARY_SOURCES: usize = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct Enhancement {
    insights: Vec<String>,
    code_patterns: Vec<String>,
    ui_patterns: Vec<String>,
}

pub struct ResearchAgent {
    llm: Arc<dyn TextGenerator>,
    search: Arc<SearchChain>,
    journal: Option<Arc<InsightJournal>>,
    enhance_top_k: usize,
}

impl ResearchAgent {
    pub fn new(llm: Arc<dyn TextGenerator>, search: Arc<SearchChain>) -> Self {
        Self {
            llm,
            search,
            journal: None,
            enhance_top_k: 3,
        }
    }

    pub fn with_journal(mut self, journal: Arc<InsightJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn with_enhance_top_k(mut self, k: usize) -> Self {
        self.enhance_top_k = k;
        self
    }

    /// Research an app idea. Never fails: every sub-step that cannot
    /// complete degrades and leaves a line in the log.
    pub async fn research(&self, prompt: &str, plan: Option<&AppPlan>) -> Traced<ResearchSummary> {
        let mut log = Vec::new();

        let keywords = self.keywords(prompt, plan).await;
        log.extend(keywords.log);
        let keywords = keywords.value;
        tracing::info!(role = %Role::Researcher, keywords = ?keywords, "Researching");

        let found = self.search.fan_out(&keywords).await;
        log.extend(found.log);
        let enhanced = self.enhance(found.value).await;
        log.extend(enhanced.log);
        let results = enhanced.value;

        let summary = self.summarize(prompt, plan, &results).await;
        log.extend(summary.log);
        let summary = summary.value;

        if let Some(journal) = &self.journal
            && let Err(e) = journal.append(&summary.insights)
        {
            tracing::warn!(error = %e, "Could not record insights");
            log.push(format!("research:journal: {e}"));
        }

        tracing::info!(
            role = %Role::Researcher,
            sources = results.len(),
            insights = summary.insights.len(),
            degraded = !log.is_empty(),
            "Research complete"
        );
        Traced {
            value: summary,
            log,
        }
    }

    /// Search keywords for the idea, falling back to its longer words.
    pub async fn keywords(&self, prompt: &str, plan: Option<&AppPlan>) -> Traced<Vec<String>> {
        let mut request = format!(
            "Extract 3 to {MAX_KEYWORDS} web search keywords for researching how to build this app:\n\n{prompt}\n"
        );
        if let Some(plan) = plan {
            request.push_str(&format!(
                "\nPlanned name: {}\nPlanned features: {}\n",
                plan.name,
                plan.features.iter().cloned().collect::<Vec<_>>().join(", ")
            ));
        }
        request.push_str("\nReply with a JSON array of strings only.");

        let llm = self.llm.as_ref();
        Chain::new()
            .then("research:keywords", || async move {
                ask::<Vec<String>>(llm, &request, GenerationParams::structured(300), |k| {
                    if k.iter().any(|w| !w.trim().is_empty()) {
                        Ok(())
                    } else {
                        Err("empty keyword list".to_string())
                    }
                })
                .await
            })
            .first_ok()
            .await
            .or_fallback("research:keywords", || fallback_keywords(prompt))
            .map(clean_keywords)
    }

    /// Ask the generator to deepen the top results, concurrently. A result
    /// whose enhancement fails is kept as it was.
    pub async fn enhance(&self, mut results: Vec<SearchResult>) -> Traced<Vec<SearchResult>> {
        let k = self.enhance_top_k.min(results.len());
        let rest = results.split_off(k);
        let outcomes =
            futures::future::join_all(results.into_iter().map(|r| self.enhance_one(r))).await;

        let mut log = Vec::new();
        let mut enhanced = Vec::with_capacity(outcomes.len() + rest.len());
        for (result, failure) in outcomes {
            if let Some(line) = failure {
                log.push(line);
            }
            enhanced.push(result);
        }
        enhanced.extend(rest);
        Traced {
            value: enhanced,
            log,
        }
    }

    async fn enhance_one(&self, mut result: SearchResult) -> (SearchResult, Option<String>) {
        let prompt = format!(
            "Analyze this resource for someone building a similar app.\n\n\
             Title: {}\nURL: {}\nContent: {}\n\n\
             Reply with JSON: {{\"insights\": [...], \"codePatterns\": [...], \"uiPatterns\": [...]}}",
            result.title, result.url, result.content
        );
        match ask::<Enhancement>(self.llm.as_ref(), &prompt, GenerationParams::structured(800), |_| Ok(())).await {
            Ok(extra) => {
                result.insights.extend(extra.insights.into_iter().filter(|s| !s.trim().is_empty()));
                result.code_patterns.extend(extra.code_patterns);
                result.ui_patterns.extend(extra.ui_patterns);
                (result, None)
            }
            Err(e) => {
                tracing::debug!(url = %result.url, error = %e, "Enhancement failed");
                let line = format!("research:enhance {}: {e}", result.url);
                (result, Some(line))
            }
        }
    }

    async fn summarize(
        &self,
        prompt: &str,
        plan: Option<&AppPlan>,
        results: &[SearchResult],
    ) -> Traced<ResearchSummary> {
        let sources: Vec<_> = results
            .iter()
            .take(SUMMARY_SOURCES)
            .map(|r| {
                serde_json::json!({
                    "title": r.title,
                    "url": r.url,
                    "content": r.content,
                    "insights": r.insights,
                })
            })
            .collect();
        let mut request = format!(
            "Write a research summary for building this app:\n\n{prompt}\n\nSources:\n{}\n",
            json_context(&sources)
        );
        if let Some(plan) = plan {
            request.push_str(&format!("\nCurrent plan:\n{}\n", json_context(plan)));
        }
        request.push_str(
            "\nReply with JSON: {\"insights\": [...], \"recommendedStack\": [...], \
             \"designPatterns\": [...], \"codeExamples\": [...], \"bestPractices\": [...], \
             \"potentialIssues\": [...]}",
        );

        let llm = self.llm.as_ref();
        Chain::new()
            .then("research:summary", || async move {
                ask::<ResearchSummary>(llm, &request, GenerationParams::structured(2000), |s| {
                    if s.is_empty() {
                        Err("summary has no content".to_string())
                    } else {
                        Ok(())
                    }
                })
                .await
            })
            .first_ok()
            .await
            .or_fallback("research:summary", || summary_from_results(results))
    }
}

/// Lowercased words longer than three characters, first occurrences only.
pub fn fallback_keywords(prompt: &str) -> Vec<String> {
    let mut seen = BTreeSet::new();
    prompt
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3)
        .map(str::to_lowercase)
        .filter(|w| seen.insert(w.clone()))
        .take(FALLBACK_KEYWORDS)
        .collect()
}

fn clean_keywords(words: Vec<String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    words
        .into_iter()
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty() && seen.insert(w.to_lowercase()))
        .take(MAX_KEYWORDS)
        .collect()
}

/// The static summary, with insights taken from whatever the search found.
pub fn summary_from_results(results: &[SearchResult]) -> ResearchSummary {
    let mut summary = ResearchSummary::fallback();
    let found: Vec<String> = results
        .iter()
        .flat_map(|r| r.insights.iter().cloned())
        .take(10)
        .collect();
    if !found.is_empty() {
        summary.insights = found;
    }
    summary
}
