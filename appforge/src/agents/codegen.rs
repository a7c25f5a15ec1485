//! Code generation agent.

use std::sync::Arc;

use super::templates::fallback_bundle;
use super::{Role, ask, json_context};
use crate::fallback::{Chain, Traced};
use crate::llm::{GenerationParams, TextGenerator};
use crate::model::{AppPlan, CodeBundle, GenerationRequest};

const BUNDLE_SHAPE: &str = "Reply with JSON: {\"frontend\": {\"components\": {\"Name.jsx\": \"source\"}, \
     \"pages\": {...}, \"styles\": {...}}, \"backend\": {\"routes\": {...}, \"models\": {...}, \
     \"middleware\": {...}}, \"database\": {\"schema\": \"...\", \"migrations\": [...], \"seeds\": [...]}, \
     \"deployment\": {\"package.json\": \"...\"}}";

pub struct CodegenAgent {
    llm: Arc<dyn TextGenerator>,
}

impl CodegenAgent {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Generate sources for `plan`, or fall back to the template bundle.
    pub async fn generate(&self, plan: &AppPlan, request: &GenerationRequest) -> Traced<CodeBundle> {
        let prompt = format!(
            "Generate the source code for this application.\n\n\
             Plan:\n{}\n\nPlatform: {}\nStyle: {}\n\n{BUNDLE_SHAPE}",
            json_context(plan),
            request.platform,
            request.style,
        );
        let llm = self.llm.as_ref();
        let out = Chain::new()
            .then("codegen:llm", || async move {
                ask(llm, &prompt, GenerationParams::structured(8000), check_bundle).await
            })
            .first_ok()
            .await
            .or_fallback("codegen", || fallback_bundle(plan, request));
        tracing::info!(
            role = %Role::Builder,
            files = out.value.source_count(),
            degraded = out.degraded(),
            "Code generated"
        );
        out
    }

    /// Revise `bundle` with `feedback`. On any failure the input bundle
    /// comes back untouched.
    pub async fn optimize_with_feedback(&self, bundle: &CodeBundle, feedback: &str) -> Traced<CodeBundle> {
        let prompt = format!(
            "Revise this code bundle according to the feedback. Return the complete bundle.\n\n\
             Bundle:\n{}\n\nFeedback: {feedback}\n\n{BUNDLE_SHAPE}",
            json_context(bundle)
        );
        let llm = self.llm.as_ref();
        Chain::new()
            .then("codegen:revise", || async move {
                ask(llm, &prompt, GenerationParams::structured(8000), check_bundle).await
            })
            .first_ok()
            .await
            .or_fallback("codegen:revise", || bundle.clone())
    }
}

fn check_bundle(bundle: &CodeBundle) -> Result<(), String> {
    if bundle.frontend.components.is_empty() && bundle.frontend.pages.is_empty() {
        return Err("bundle has no components or pages".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::planner::fallback_plan;
    use crate::llm::scripted::ScriptedGenerator;

    fn request() -> GenerationRequest {
        GenerationRequest::new("todo list app")
    }

    #[tokio::test]
    async fn failure_falls_back_to_templates() {
        let agent = CodegenAgent::new(Arc::new(ScriptedGenerator::failing()));
        let plan = fallback_plan(&request());
        let out = agent.generate(&plan, &request()).await;
        assert_eq!(out.value, fallback_bundle(&plan, &request()));
        assert!(!out.value.frontend.components.is_empty());
        assert_eq!(out.log.last().map(String::as_str), Some("codegen: using fallback"));
    }

    #[tokio::test]
    async fn backend_only_bundle_is_rejected() {
        let llm = ScriptedGenerator::new()
            .reply(r#"{"backend": {"routes": {"a.js": "module.exports = {};"}}}"#);
        let agent = CodegenAgent::new(Arc::new(llm));
        let plan = fallback_plan(&request());
        let out = agent.generate(&plan, &request()).await;
        assert!(out.log[0].contains("no components or pages"));
        assert!(out.value.frontend.components.contains_key("Header.jsx"));
    }

    #[tokio::test]
    async fn generated_bundle_is_used() {
        let llm = ScriptedGenerator::new().reply(
            r#"{"frontend": {"components": {"App.jsx": "export default function App() { return null; }"}}}"#,
        );
        let agent = CodegenAgent::new(Arc::new(llm));
        let out = agent.generate(&fallback_plan(&request()), &request()).await;
        assert!(!out.degraded());
        assert_eq!(out.value.source_count(), 1);
    }

    #[tokio::test]
    async fn revision_failure_returns_input() {
        let plan = fallback_plan(&request());
        let bundle = fallback_bundle(&plan, &request());
        let agent = CodegenAgent::new(Arc::new(ScriptedGenerator::failing()));
        let out = agent.optimize_with_feedback(&bundle, "use TypeScript").await;
        assert_eq!(out.value, bundle);
        assert!(out.degraded());
    }
}
