//! Optimization stage: lint, coverage estimate, rewrite passes and scoring.
//!
//! Pure and deterministic; nothing here touches the network or the clock.

pub mod coverage;
pub mod lint;
pub mod rewrite;
pub mod score;

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

pub use lint::{LintIssue, Severity};
pub use rewrite::Pass;
pub use score::{Finding, ScoreCard};

use crate::config::OptimizeSettings;
use crate::error::{Error, Result};
use crate::model::CodeBundle;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResult {
    pub success: bool,
    pub optimized_code: CodeBundle,
    pub improvements: Vec<String>,
    pub issues: Vec<String>,
    pub performance_score: u8,
    pub security_score: u8,
    pub maintainability_score: u8,
    pub lint: Vec<LintIssue>,
    /// Estimated test coverage, percent.
    pub coverage: u32,
}

#[derive(Debug, Clone, Default)]
pub struct Optimizer {
    settings: OptimizeSettings,
}

impl Optimizer {
    pub fn new(settings: OptimizeSettings) -> Self {
        Self { settings }
    }

    /// Rewrite, then lint, score and estimate coverage of the result.
    ///
    /// A structurally invalid bundle is returned unchanged with
    /// `success: false` and the reason in `issues`.
    pub fn optimize(&self, bundle: &CodeBundle) -> OptimizationResult {
        if let Err(e) = validate(bundle) {
            tracing::warn!(error = %e, "Bundle failed validation, skipping rewrites");
            let card = score::score_bundle(bundle, &self.settings);
            return OptimizationResult {
                success: false,
                optimized_code: bundle.clone(),
                improvements: Vec::new(),
                issues: vec![e.to_string()],
                performance_score: card.performance,
                security_score: card.security,
                maintainability_score: card.maintainability,
                lint: lint::lint_bundle(bundle),
                coverage: coverage::estimate_bundle(bundle, &self.settings.coverage),
            };
        }

        let mut current = bundle.clone();
        let mut improvements = Vec::new();
        for pass in Pass::ALL {
            let (next, notes) = pass.run(&current);
            current = next;
            improvements.extend(notes);
        }

        let card = score::score_bundle(&current, &self.settings);
        let lint = lint::lint_bundle(&current);
        let issues = card
            .findings
            .iter()
            .map(ToString::to_string)
            .chain(
                lint.iter()
                    .filter(|i| i.severity >= Severity::Warning)
                    .map(ToString::to_string),
            )
            .collect();
        let coverage = coverage::estimate_bundle(&current, &self.settings.coverage);

        tracing::info!(
            files = current.source_count(),
            rewrites = improvements.len(),
            performance = card.performance,
            security = card.security,
            maintainability = card.maintainability,
            coverage,
            "Optimized bundle"
        );

        OptimizationResult {
            success: true,
            optimized_code: current,
            improvements,
            issues,
            performance_score: card.performance,
            security_score: card.security,
            maintainability_score: card.maintainability,
            lint,
            coverage,
        }
    }
}

/// Reject bundles whose file names cannot be written out safely.
pub fn validate(bundle: &CodeBundle) -> Result<()> {
    for (section, name, _) in bundle.sources() {
        if name.trim().is_empty() {
            return Err(Error::Parse(format!("{}: empty file name", section.dir())));
        }
        if name.starts_with('/') || name.split(['/', '\\']).any(|seg| seg == "..") {
            return Err(Error::Parse(format!(
                "{}/{name}: path escapes the bundle",
                section.dir()
            )));
        }
    }
    for name in bundle.deployment.keys() {
        if name.trim().is_empty() || name.starts_with('/') || name.split(['/', '\\']).any(|seg| seg == "..") {
            return Err(Error::Parse(format!("invalid manifest name {name:?}")));
        }
    }
    let mut seen = HashSet::new();
    for file in bundle.files() {
        if !seen.insert(file.path.clone()) {
            return Err(Error::Parse(format!("duplicate path {}", file.path)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CodeBundle {
        let mut bundle = CodeBundle::default();
        bundle.frontend.components.insert(
            "Header.jsx".into(),
            "import lodash from 'lodash';\n\nfunction Header() {\n  console.log('render');\n  return null;\n}\n\nexport default Header;\n".into(),
        );
        bundle.backend.routes.insert(
            "items.js".into(),
            "const express = require('express');\nconst router = express.Router();\n\nrouter.get('/', (req, res) => res.json([]));\n\nmodule.exports = router;\n".into(),
        );
        bundle
    }

    #[test]
    fn optimizing_improves_scores_and_is_stable() {
        let optimizer = Optimizer::default();
        let before = score::score_bundle(&sample(), &OptimizeSettings::default());
        let result = optimizer.optimize(&sample());
        assert!(result.success);
        assert!(result.performance_score >= before.performance);
        assert!(result.maintainability_score > before.maintainability);
        assert!(!result.improvements.is_empty());
        // console.log survives rewriting and is still reported
        assert!(result.lint.iter().any(|i| i.rule == "no-console"));
        assert!(result.issues.iter().any(|i| i.contains("console")));

        let again = optimizer.optimize(&result.optimized_code);
        assert_eq!(again.optimized_code, result.optimized_code);
        assert!(again.improvements.is_empty());
    }

    #[test]
    fn optimize_is_deterministic() {
        let optimizer = Optimizer::default();
        assert_eq!(optimizer.optimize(&sample()), optimizer.optimize(&sample()));
    }

    #[test]
    fn traversal_names_fail_validation() {
        let mut bundle = sample();
        bundle
            .backend
            .models
            .insert("../../etc/passwd".into(), "x".into());
        let result = Optimizer::default().optimize(&bundle);
        assert!(!result.success);
        assert_eq!(result.optimized_code, bundle);
        assert!(result.issues[0].contains("escapes"));
    }

    #[test]
    fn manifest_colliding_with_a_source_path_fails_validation() {
        let mut bundle = sample();
        bundle
            .deployment
            .insert("server/routes/items.js".into(), "{}".into());
        let result = Optimizer::default().optimize(&bundle);
        assert!(!result.success);
        assert!(result.issues[0].contains("duplicate"));
    }

    #[test]
    fn empty_bundle_is_valid() {
        let result = Optimizer::default().optimize(&CodeBundle::default());
        assert!(result.success);
        assert_eq!(result.coverage, 60);
        assert_eq!(
            (result.performance_score, result.security_score, result.maintainability_score),
            (100, 100, 100)
        );
    }
}
