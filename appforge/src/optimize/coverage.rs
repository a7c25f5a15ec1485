//! Heuristic test-coverage estimate from source text.

use crate::config::CoverageWeights;
use crate::model::CodeBundle;

const TEST_MARKERS: &[&str] = &["describe(", "it(", "test(", "expect(", "assert"];
const ERROR_MARKERS: &[&str] = &["try {", "try{", "catch", "throw ", "next(err"];
const VALIDATION_MARKERS: &[&str] = &[
    "validate", "schema", "zod", "joi", "yup", "required", "isvalid", "typeof ",
];

fn mentions_any(lower: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| lower.contains(m))
}

/// Estimated coverage percentage for one file.
pub fn estimate_source(text: &str, weights: &CoverageWeights) -> u32 {
    let lower = text.to_lowercase();
    let mut score = weights.base;
    if mentions_any(&lower, TEST_MARKERS) {
        score += weights.tests;
    }
    if mentions_any(&lower, ERROR_MARKERS) {
        score += weights.error_handling;
    }
    if mentions_any(&lower, VALIDATION_MARKERS) {
        score += weights.validation;
    }
    score.min(weights.cap)
}

/// Mean of per-file estimates over every source file; the base value when
/// the bundle has none.
pub fn estimate_bundle(bundle: &CodeBundle, weights: &CoverageWeights) -> u32 {
    let scores: Vec<u32> = bundle
        .sources()
        .map(|(_, _, text)| estimate_source(text, weights))
        .collect();
    if scores.is_empty() {
        return weights.base.min(weights.cap);
    }
    let total: u32 = scores.iter().sum();
    (total as f64 / scores.len() as f64).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_add_up_to_the_cap() {
        let w = CoverageWeights::default();
        assert_eq!(estimate_source("const x = 1;", &w), 60);
        assert_eq!(estimate_source("try { a() } catch (e) {}", &w), 70);
        let everything = "describe('x', () => { it('works', () => expect(validate(x))) });\n\
                          try { run() } catch (e) { throw e }";
        // 60 + 20 + 10 + 10 = 100, capped
        assert_eq!(estimate_source(everything, &w), 95);
    }

    #[test]
    fn bundle_average_and_empty_bundle() {
        let w = CoverageWeights::default();
        assert_eq!(estimate_bundle(&CodeBundle::default(), &w), 60);

        let mut bundle = CodeBundle::default();
        bundle.frontend.components.insert("A.jsx".into(), "plain".into());
        bundle
            .backend
            .routes
            .insert("b.js".into(), "try { x() } catch (err) { next(err) }".into());
        // (60 + 70) / 2
        assert_eq!(estimate_bundle(&bundle, &w), 65);
    }
}
