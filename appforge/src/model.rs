//! Artifacts passed between pipeline stages.
//!
//! Every stage produces a new value; nothing here is mutated after the
//! stage that owns it returns. Ordered collections use `BTreeMap` /
//! `BTreeSet` so serialized artifacts are stable across runs.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ── Request ────────────────────────────────────────────────────────────

/// Target platform for the generated app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Web,
    Mobile,
    Desktop,
    Ar,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Web => write!(f, "web"),
            Platform::Mobile => write!(f, "mobile"),
            Platform::Desktop => write!(f, "desktop"),
            Platform::Ar => write!(f, "ar"),
        }
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" => Ok(Platform::Web),
            "mobile" => Ok(Platform::Mobile),
            "desktop" => Ok(Platform::Desktop),
            "ar" => Ok(Platform::Ar),
            other => Err(format!("unknown platform: {other}")),
        }
    }
}

/// One user submission. A request drives exactly one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub platform: Platform,
    #[serde(default)]
    pub features: Vec<String>,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_style() -> String {
    "modern".to_string()
}

fn default_audience() -> String {
    "general".to_string()
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            platform: Platform::default(),
            features: Vec::new(),
            style: default_style(),
            audience: default_audience(),
        }
    }
}

// ── Research ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResearchSummary {
    pub insights: Vec<String>,
    pub recommended_stack: Vec<String>,
    pub design_patterns: Vec<String>,
    pub code_examples: Vec<String>,
    pub best_practices: Vec<String>,
    pub potential_issues: Vec<String>,
}

impl ResearchSummary {
    /// Static summary used when research cannot be produced.
    pub fn fallback() -> Self {
        fn owned(items: &[&str]) -> Vec<String> {
            items.iter().map(|s| s.to_string()).collect()
        }
        Self {
            insights: owned(&[
                "Start with a small, working core and iterate on it",
                "Users expect fast initial loads and responsive layouts",
            ]),
            recommended_stack: owned(&["React", "Node.js", "Express", "PostgreSQL"]),
            design_patterns: owned(&[
                "Component-based UI",
                "REST API with resource routes",
                "Repository pattern for data access",
            ]),
            code_examples: Vec::new(),
            best_practices: owned(&[
                "Validate all user input on the server",
                "Handle errors explicitly and surface them to the user",
                "Keep components small and focused",
            ]),
            potential_issues: owned(&[
                "Unvalidated input reaching the database",
                "Unbounded list rendering on large datasets",
            ]),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.insights.is_empty()
            && self.recommended_stack.is_empty()
            && self.design_patterns.is_empty()
            && self.code_examples.is_empty()
            && self.best_practices.is_empty()
            && self.potential_issues.is_empty()
    }
}

// ── Plan ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Simple,
    Medium,
    Complex,
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Complexity::Simple => write!(f, "simple"),
            Complexity::Medium => write!(f, "medium"),
            Complexity::Complex => write!(f, "complex"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AppStructure {
    pub pages: Vec<String>,
    pub components: Vec<String>,
    pub api_routes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppPlan {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub features: BTreeSet<String>,
    #[serde(default)]
    pub tech_stack: BTreeMap<String, String>,
    #[serde(default)]
    pub structure: AppStructure,
    #[serde(default)]
    pub timeline: String,
    #[serde(default)]
    pub complexity: Complexity,
}

// ── Code bundle ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Frontend {
    pub components: BTreeMap<String, String>,
    pub pages: BTreeMap<String, String>,
    pub styles: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Backend {
    pub routes: BTreeMap<String, String>,
    pub models: BTreeMap<String, String>,
    pub middleware: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Database {
    pub schema: String,
    pub migrations: Vec<String>,
    pub seeds: Vec<String>,
}

/// Generated source text, grouped by layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeBundle {
    pub frontend: Frontend,
    pub backend: Backend,
    pub database: Database,
    /// Manifest name → manifest text (package.json, Dockerfile, ...).
    pub deployment: BTreeMap<String, String>,
}

/// Where a source file sits inside a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Component,
    Page,
    Style,
    Route,
    Model,
    Middleware,
}

impl Section {
    pub fn is_frontend(self) -> bool {
        matches!(self, Section::Component | Section::Page | Section::Style)
    }

    pub fn is_backend(self) -> bool {
        matches!(self, Section::Route | Section::Model | Section::Middleware)
    }

    /// Directory a section's files are written under.
    pub fn dir(self) -> &'static str {
        match self {
            Section::Component => "src/components",
            Section::Page => "src/pages",
            Section::Style => "src/styles",
            Section::Route => "server/routes",
            Section::Model => "server/models",
            Section::Middleware => "server/middleware",
        }
    }
}

/// A flattened bundle entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleFile {
    pub path: String,
    pub content: String,
}

impl CodeBundle {
    /// Iterate over every source map with its section tag.
    pub fn sections(&self) -> [(Section, &BTreeMap<String, String>); 6] {
        [
            (Section::Component, &self.frontend.components),
            (Section::Page, &self.frontend.pages),
            (Section::Style, &self.frontend.styles),
            (Section::Route, &self.backend.routes),
            (Section::Model, &self.backend.models),
            (Section::Middleware, &self.backend.middleware),
        ]
    }

    /// Build a new bundle with `f` applied to every source text.
    ///
    /// Schema, migrations, seeds and manifests are carried over unchanged.
    pub fn map_sources(&self, mut f: impl FnMut(Section, &str, &str) -> String) -> CodeBundle {
        let mut map = |section: Section, sources: &BTreeMap<String, String>| {
            sources
                .iter()
                .map(|(name, text)| (name.clone(), f(section, name, text)))
                .collect::<BTreeMap<_, _>>()
        };
        CodeBundle {
            frontend: Frontend {
                components: map(Section::Component, &self.frontend.components),
                pages: map(Section::Page, &self.frontend.pages),
                styles: map(Section::Style, &self.frontend.styles),
            },
            backend: Backend {
                routes: map(Section::Route, &self.backend.routes),
                models: map(Section::Model, &self.backend.models),
                middleware: map(Section::Middleware, &self.backend.middleware),
            },
            database: self.database.clone(),
            deployment: self.deployment.clone(),
        }
    }

    /// Flatten into deployable path → content pairs.
    pub fn files(&self) -> Vec<BundleFile> {
        let mut files: Vec<BundleFile> = self
            .sources()
            .map(|(section, name, content)| BundleFile {
                path: format!("{}/{name}", section.dir()),
                content: content.to_string(),
            })
            .collect();
        if !self.database.schema.is_empty() {
            files.push(BundleFile {
                path: "database/schema.sql".to_string(),
                content: self.database.schema.clone(),
            });
        }
        for (i, migration) in self.database.migrations.iter().enumerate() {
            files.push(BundleFile {
                path: format!("database/migrations/{:03}.sql", i + 1),
                content: migration.clone(),
            });
        }
        for (i, seed) in self.database.seeds.iter().enumerate() {
            files.push(BundleFile {
                path: format!("database/seeds/{:03}.sql", i + 1),
                content: seed.clone(),
            });
        }
        for (name, content) in &self.deployment {
            files.push(BundleFile {
                path: name.clone(),
                content: content.clone(),
            });
        }
        files
    }

    /// Every source file as `(section, name, text)`.
    pub fn sources(&self) -> impl Iterator<Item = (Section, &str, &str)> + '_ {
        self.sections().into_iter().flat_map(|(section, sources)| {
            sources
                .iter()
                .map(move |(name, text)| (section, name.as_str(), text.as_str()))
        })
    }

    pub fn source_count(&self) -> usize {
        self.sections().iter().map(|(_, s)| s.len()).sum()
    }
}

// ── Search ─────────────────────────────────────────────────────────────

/// One ranked web result.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchResult {
    pub url: String,
    pub title: String,
    pub content: String,
    pub relevance: f64,
    pub insights: BTreeSet<String>,
    pub code_patterns: BTreeSet<String>,
    pub ui_patterns: BTreeSet<String>,
}

impl SearchResult {
    pub fn new(url: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            content: content.into(),
            ..Default::default()
        }
    }
}

/// Sort descending by relevance. Ties keep their incoming order.
pub fn rank(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_parses_case_insensitively() {
        assert_eq!("AR".parse::<Platform>(), Ok(Platform::Ar));
        assert!("console".parse::<Platform>().is_err());
    }

    #[test]
    fn request_defaults_fill_missing_fields() {
        let req: GenerationRequest = serde_json::from_str(r#"{"prompt":"todo list app"}"#).unwrap();
        assert_eq!(req.platform, Platform::Web);
        assert_eq!(req.style, "modern");
        assert_eq!(req.audience, "general");
    }

    #[test]
    fn files_flatten_every_layer() {
        let mut bundle = CodeBundle::default();
        bundle
            .frontend
            .components
            .insert("Header.jsx".into(), "export default Header;".into());
        bundle
            .backend
            .routes
            .insert("tasks.js".into(), "router.get('/')".into());
        bundle.database.schema = "CREATE TABLE t();".into();
        bundle.database.migrations.push("ALTER TABLE t;".into());
        bundle
            .deployment
            .insert("package.json".into(), "{}".into());

        let paths: Vec<String> = bundle.files().into_iter().map(|f| f.path).collect();
        assert_eq!(
            paths,
            vec![
                "src/components/Header.jsx",
                "server/routes/tasks.js",
                "database/schema.sql",
                "database/migrations/001.sql",
                "package.json",
            ]
        );
    }

    #[test]
    fn map_sources_leaves_database_alone() {
        let mut bundle = CodeBundle::default();
        bundle.frontend.pages.insert("Home.jsx".into(), "a".into());
        bundle.database.schema = "a".into();
        let mapped = bundle.map_sources(|_, _, text| text.to_uppercase());
        assert_eq!(mapped.frontend.pages["Home.jsx"], "A");
        assert_eq!(mapped.database.schema, "a");
        assert_eq!(bundle.frontend.pages["Home.jsx"], "a");
    }

    #[test]
    fn rank_orders_by_relevance_descending() {
        let mut results = vec![
            SearchResult { relevance: 0.2, ..SearchResult::new("a", "", "") },
            SearchResult { relevance: 0.9, ..SearchResult::new("b", "", "") },
            SearchResult { relevance: 0.5, ..SearchResult::new("c", "", "") },
        ];
        rank(&mut results);
        let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(urls, ["b", "c", "a"]);
    }
}
