//! Pipeline configuration.
//!
//! Config file lives at `~/.config/appforge/config.toml`. Every section is
//! optional; missing keys take the defaults below. Credentials are never
//! stored here, only the names of the environment variables holding them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub llm: LlmSettings,
    pub search: SearchSettings,
    pub optimize: OptimizeSettings,
    pub deploy: DeploySettings,
}

impl ForgeConfig {
    /// Default config path under the user's config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("appforge")
            .join("config.toml")
    }

    /// Load from `path`. A missing file yields defaults; malformed TOML is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Read a credential from the environment.
pub fn credential(env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!("missing credential: set {env_var}"))),
    }
}

// ── Text generation ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub api_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub timeout_secs: u64,
    pub api_key_env: String,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.anthropic.com/v1/messages".to_string(),
            model: "claude-sonnet-4-20250514".to_string(),
            max_tokens: 4096,
            temperature: 0.7,
            timeout_secs: 120,
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
        }
    }
}

// ── Search ─────────────────────────────────────────────────────────────

/// A search engine results page and the selectors that pick it apart.
///
/// Selectors are `tag`, `.class` or `tag.class`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HtmlProviderSpec {
    pub name: String,
    /// URL with a `{query}` placeholder.
    pub url_template: String,
    pub result: String,
    pub title: String,
    pub link: String,
    pub snippet: String,
}

impl HtmlProviderSpec {
    pub fn duckduckgo() -> Self {
        Self {
            name: "duckduckgo".to_string(),
            url_template: "https://html.duckduckgo.com/html/?q={query}".to_string(),
            result: "div.result__body".to_string(),
            title: "a.result__a".to_string(),
            link: "a.result__a".to_string(),
            snippet: "a.result__snippet".to_string(),
        }
    }

    pub fn bing() -> Self {
        Self {
            name: "bing".to_string(),
            url_template: "https://www.bing.com/search?q={query}".to_string(),
            result: "li.b_algo".to_string(),
            title: "h2".to_string(),
            link: "a".to_string(),
            snippet: "p".to_string(),
        }
    }

    pub fn mojeek() -> Self {
        Self {
            name: "mojeek".to_string(),
            url_template: "https://www.mojeek.com/search?q={query}".to_string(),
            result: "li".to_string(),
            title: "a.title".to_string(),
            link: "a.title".to_string(),
            snippet: "p.s".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub primary: HtmlProviderSpec,
    pub alternatives: Vec<HtmlProviderSpec>,
    /// Cached keyword sets with Jaccard similarity strictly above this are reused.
    pub similarity_threshold: f64,
    /// How many top results get an AI enhancement pass.
    pub enhance_top_k: usize,
    pub max_results: usize,
    pub timeout_secs: u64,
    pub user_agent: String,
    pub cache_path: Option<PathBuf>,
    pub insights_path: Option<PathBuf>,
    pub insights_cap: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            primary: HtmlProviderSpec::duckduckgo(),
            alternatives: vec![HtmlProviderSpec::bing(), HtmlProviderSpec::mojeek()],
            similarity_threshold: 0.7,
            enhance_top_k: 3,
            max_results: 10,
            timeout_secs: 15,
            user_agent: "Mozilla/5.0 (compatible; appforge/0.1)".to_string(),
            cache_path: None,
            insights_path: None,
            insights_cap: 100,
        }
    }
}

// ── Optimization ───────────────────────────────────────────────────────

/// Points deducted per detected anti-pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PenaltyWeights {
    pub unsafe_eval: u32,
    pub unescaped_html: u32,
    pub missing_validation: u32,
    pub hardcoded_secret: u32,
    pub sql_concat: u32,
    pub sync_io: u32,
    pub console_log: u32,
    pub select_star: u32,
    pub missing_memo: u32,
    pub todo_marker: u32,
    pub unused_import: u32,
    pub any_type: u32,
    pub long_file: u32,
    pub missing_types: u32,
}

impl Default for PenaltyWeights {
    fn default() -> Self {
        Self {
            unsafe_eval: 50,
            unescaped_html: 20,
            missing_validation: 15,
            hardcoded_secret: 25,
            sql_concat: 20,
            sync_io: 15,
            console_log: 5,
            select_star: 10,
            missing_memo: 5,
            todo_marker: 5,
            unused_import: 3,
            any_type: 2,
            long_file: 10,
            missing_types: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoverageWeights {
    pub base: u32,
    pub tests: u32,
    pub error_handling: u32,
    pub validation: u32,
    pub cap: u32,
}

impl Default for CoverageWeights {
    fn default() -> Self {
        Self {
            base: 60,
            tests: 20,
            error_handling: 10,
            validation: 10,
            cap: 95,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeSettings {
    pub penalties: PenaltyWeights,
    pub coverage: CoverageWeights,
    /// Files longer than this many lines count against maintainability.
    pub long_file_lines: Option<usize>,
}

// ── Deployment ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploySettings {
    pub object_storage: ObjectStorageSettings,
    pub git_build: GitBuildSettings,
    pub zip_upload: ZipUploadSettings,
    pub build_api: BuildApiSettings,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStorageSettings {
    /// Storage endpoint; objects live at `{api_url}/{bucket}/{key}`.
    pub api_url: String,
    pub bucket: String,
    /// Public website origin serving the bucket.
    pub website_url: String,
    pub token_env: String,
}

impl Default for ObjectStorageSettings {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            bucket: String::new(),
            website_url: String::new(),
            token_env: "OBJECT_STORAGE_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitBuildSettings {
    /// GraphQL endpoint of the build service.
    pub api_url: String,
    pub project_id: String,
    pub branch: String,
    pub token_env: String,
}

impl Default for GitBuildSettings {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            project_id: String::new(),
            branch: "main".to_string(),
            token_env: "GIT_BUILD_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZipUploadSettings {
    pub api_url: String,
    pub site_id: String,
    pub token_env: String,
}

impl Default for ZipUploadSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.netlify.com/api/v1".to_string(),
            site_id: String::new(),
            token_env: "NETLIFY_AUTH_TOKEN".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildApiSettings {
    pub api_url: String,
    pub project: String,
    pub team_id: Option<String>,
    pub token_env: String,
}

impl Default for BuildApiSettings {
    fn default() -> Self {
        Self {
            api_url: "https://api.vercel.com".to_string(),
            project: String::new(),
            team_id: None,
            token_env: "VERCEL_TOKEN".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = ForgeConfig::from_toml(
            r#"
            [search]
            similarity_threshold = 0.8

            [optimize.penalties]
            unsafe_eval = 40
            "#,
        )
        .unwrap();
        assert_eq!(cfg.search.similarity_threshold, 0.8);
        assert_eq!(cfg.search.enhance_top_k, 3);
        assert_eq!(cfg.search.primary.name, "duckduckgo");
        assert_eq!(cfg.optimize.penalties.unsafe_eval, 40);
        assert_eq!(cfg.optimize.penalties.unescaped_html, 20);
        assert_eq!(cfg.llm.max_tokens, 4096);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = ForgeConfig::from_toml("[search\nfoo").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ForgeConfig::load(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(cfg.search.insights_cap, 100);
    }

    #[test]
    fn missing_credential_is_config_error() {
        let err = credential("APPFORGE_TEST_SURELY_UNSET_VAR").unwrap_err();
        assert!(err.to_string().contains("APPFORGE_TEST_SURELY_UNSET_VAR"));
    }
}
