//! Content extraction over a result snippet or page body.
//!
//! Pure functions: no I/O, same input always gives the same output.

use std::collections::BTreeSet;

use crate::model::SearchResult;

/// Weight of one keyword occurrence in the relevance sum.
const OCCURRENCE_WEIGHT: f64 = 0.1;
const MAX_INSIGHTS: usize = 5;

/// Phrases that mark a sentence as advice worth keeping.
const INSIGHT_MARKERS: &[&str] = &[
    "best practice",
    "recommend",
    "should",
    "avoid",
    "important",
    "tip",
    "make sure",
    "prefer",
    "consider",
    "pitfall",
];

/// Content token → code pattern tag.
const CODE_PATTERNS: &[(&str, &str)] = &[
    ("usestate", "react-hooks"),
    ("useeffect", "react-hooks"),
    ("async ", "async-await"),
    ("await ", "async-await"),
    ("fetch(", "fetch-api"),
    ("axios", "http-client"),
    ("graphql", "graphql"),
    ("websocket", "websockets"),
    ("middleware", "middleware"),
    ("rest api", "rest-api"),
    ("restful", "rest-api"),
    ("jwt", "jwt-auth"),
    ("oauth", "oauth"),
    ("redux", "state-management"),
    ("zustand", "state-management"),
    ("typescript", "typescript"),
    ("docker", "containerization"),
    ("prisma", "orm"),
    ("sequelize", "orm"),
    ("typeorm", "orm"),
    ("unit test", "testing"),
    ("jest", "testing"),
    ("vitest", "testing"),
];

/// Content token → UI pattern tag.
const UI_PATTERNS: &[(&str, &str)] = &[
    ("dashboard", "dashboard"),
    ("modal", "modal"),
    ("sidebar", "sidebar"),
    ("navbar", "navigation"),
    ("navigation", "navigation"),
    ("dark mode", "dark-mode"),
    ("responsive", "responsive-layout"),
    ("grid", "grid-layout"),
    ("card", "card-layout"),
    ("infinite scroll", "infinite-scroll"),
    ("drag and drop", "drag-and-drop"),
    ("drag-and-drop", "drag-and-drop"),
    ("form validation", "form-validation"),
    ("toast", "notifications"),
    ("notification", "notifications"),
    ("kanban", "kanban-board"),
];

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Extraction {
    pub relevance: f64,
    pub insights: BTreeSet<String>,
    pub code_patterns: BTreeSet<String>,
    pub ui_patterns: BTreeSet<String>,
}

/// `min(1, Σ 0.1 × occurrences)` over the keywords, case-insensitive.
pub fn relevance(content: &str, keywords: &[String]) -> f64 {
    let haystack = content.to_lowercase();
    let score: f64 = keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .filter(|k| !k.is_empty())
        .map(|k| OCCURRENCE_WEIGHT * haystack.matches(k.as_str()).count() as f64)
        .sum();
    score.clamp(0.0, 1.0)
}

/// Sentences that read like advice.
pub fn insights(content: &str) -> BTreeSet<String> {
    content
        .split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| (20..=240).contains(&s.len()))
        .filter(|s| {
            let lower = s.to_lowercase();
            INSIGHT_MARKERS.iter().any(|m| lower.contains(m))
        })
        .take(MAX_INSIGHTS)
        .map(str::to_string)
        .collect()
}

fn tags(text: &str, table: &[(&str, &str)]) -> BTreeSet<String> {
    let lower = text.to_lowercase();
    table
        .iter()
        .filter(|(needle, _)| lower.contains(needle))
        .map(|(_, tag)| tag.to_string())
        .collect()
}

pub fn code_patterns(text: &str) -> BTreeSet<String> {
    tags(text, CODE_PATTERNS)
}

pub fn ui_patterns(text: &str) -> BTreeSet<String> {
    tags(text, UI_PATTERNS)
}

pub fn extract(content: &str, keywords: &[String]) -> Extraction {
    Extraction {
        relevance: relevance(content, keywords),
        insights: insights(content),
        code_patterns: code_patterns(content),
        ui_patterns: ui_patterns(content),
    }
}

/// Score and tag a raw result. Tags are merged with any already present.
pub fn enrich(mut result: SearchResult, keywords: &[String]) -> SearchResult {
    let tagged_text = format!("{}\n{}", result.title, result.content);
    result.relevance = relevance(&result.content, keywords);
    result.insights.extend(insights(&result.content));
    result.code_patterns.extend(code_patterns(&tagged_text));
    result.ui_patterns.extend(ui_patterns(&tagged_text));
    result
}
