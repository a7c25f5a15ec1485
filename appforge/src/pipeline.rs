//! Pipeline orchestrator.
//!
//! One `run` drives a request through research, planning, code generation
//! and optimization, then optionally deploys the optimized bundle. The
//! first three stages cannot fail, only degrade. A failed deployment is
//! recorded in `errors` and leaves the generated artifacts in place.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::agents::{CodegenAgent, PlannerAgent, ResearchAgent};
use crate::config::ForgeConfig;
use crate::deploy::{DeployConfig, Deployments, DeploymentRecord, ProviderKind};
use crate::error::Result;
use crate::fallback::Traced;
use crate::llm::{LlmClient, TextGenerator};
use crate::model::{AppPlan, CodeBundle, GenerationRequest, ResearchSummary};
use crate::optimize::{OptimizationResult, Optimizer};
use crate::search::{InsightJournal, JsonFileStore, MemoryStore, ResearchCache, SearchChain};

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Research,
    Planning,
    Codegen,
    Optimization,
    Deployment,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Research => write!(f, "research"),
            Stage::Planning => write!(f, "planning"),
            Stage::Codegen => write!(f, "codegen"),
            Stage::Optimization => write!(f, "optimization"),
            Stage::Deployment => write!(f, "deployment"),
        }
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Deploy the optimized bundle to this provider.
    pub deploy: Option<(ProviderKind, DeployConfig)>,
}

impl RunOptions {
    pub fn deploy_to(kind: ProviderKind, config: DeployConfig) -> Self {
        Self {
            deploy: Some((kind, config)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunResult {
    pub success: bool,
    pub research: ResearchSummary,
    pub plan: AppPlan,
    pub code: CodeBundle,
    pub optimization: OptimizationResult,
    pub deployment: Option<DeploymentRecord>,
    pub errors: Vec<String>,
    pub logs: Vec<String>,
}

pub struct Pipeline {
    research: ResearchAgent,
    planner: PlannerAgent,
    codegen: CodegenAgent,
    optimizer: Optimizer,
    deployments: Arc<Deployments>,
}

impl Pipeline {
    pub fn new(llm: Arc<dyn TextGenerator>, search: Arc<SearchChain>) -> Self {
        Self {
            research: ResearchAgent::new(llm.clone(), search),
            planner: PlannerAgent::new(llm.clone()),
            codegen: CodegenAgent::new(llm),
            optimizer: Optimizer::default(),
            deployments: Arc::new(Deployments::new()),
        }
    }

    /// Wire every collaborator from configuration.
    pub fn from_config(config: &ForgeConfig) -> Result<Self> {
        let llm: Arc<dyn TextGenerator> = Arc::new(LlmClient::from_settings(&config.llm)?);

        let search_settings = &config.search;
        let cache = match &search_settings.cache_path {
            Some(path) => ResearchCache::new(Arc::new(JsonFileStore::open(path)), search_settings.similarity_threshold),
            None => ResearchCache::new(Arc::new(MemoryStore::new()), search_settings.similarity_threshold),
        };
        let search = SearchChain::from_settings(search_settings, Some(cache), Some(llm.clone()))?;

        let mut pipeline = Self::new(llm, Arc::new(search))
            .with_enhance_top_k(search_settings.enhance_top_k)
            .with_optimizer(Optimizer::new(config.optimize.clone()))
            .with_deployments(Arc::new(Deployments::from_settings(&config.deploy)?));
        if let Some(path) = &search_settings.insights_path {
            pipeline = pipeline.with_journal(Arc::new(InsightJournal::new(path, search_settings.insights_cap)));
        }
        Ok(pipeline)
    }

    pub fn with_journal(mut self, journal: Arc<InsightJournal>) -> Self {
        self.research = self.research.with_journal(journal);
        self
    }

    pub fn with_enhance_top_k(mut self, k: usize) -> Self {
        self.research = self.research.with_enhance_top_k(k);
        self
    }

    pub fn with_optimizer(mut self, optimizer: Optimizer) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_deployments(mut self, deployments: Arc<Deployments>) -> Self {
        self.deployments = deployments;
        self
    }

    /// Deployment registry, for status checks and rollbacks after a run.
    pub fn deployments(&self) -> &Arc<Deployments> {
        &self.deployments
    }

    pub async fn run(&self, request: &GenerationRequest, options: &RunOptions) -> RunResult {
        let mut logs = Vec::new();
        let mut errors = Vec::new();
        tracing::info!(prompt = %request.prompt, platform = %request.platform, "Pipeline started");

        let research = collect(Stage::Research, self.research.research(&request.prompt, None).await, &mut logs);
        let plan = collect(Stage::Planning, self.planner.plan(request, &research).await, &mut logs);
        let code = collect(Stage::Codegen, self.codegen.generate(&plan, request).await, &mut logs);

        let optimization = self.optimizer.optimize(&code);
        if !optimization.success {
            tracing::warn!(stage = %Stage::Optimization, "Bundle rejected");
            errors.extend(optimization.issues.iter().map(|i| format!("{}: {i}", Stage::Optimization)));
        }
        logs.push(format!(
            "{}: performance {} security {} maintainability {}",
            Stage::Optimization,
            optimization.performance_score,
            optimization.security_score,
            optimization.maintainability_score
        ));

        let deployment = match &options.deploy {
            Some((kind, config)) if optimization.success => {
                match self
                    .deployments
                    .deploy(&optimization.optimized_code, *kind, config)
                    .await
                {
                    Ok(record) => {
                        logs.push(format!("{}: {kind} {} {}", Stage::Deployment, record.id, record.status));
                        Some(record)
                    }
                    Err(e) => {
                        tracing::warn!(stage = %Stage::Deployment, provider = %kind, error = %e, "Deployment failed");
                        errors.push(format!("{}: {kind}: {e}", Stage::Deployment));
                        None
                    }
                }
            }
            Some((kind, _)) => {
                errors.push(format!("{}: {kind}: skipped, bundle failed validation", Stage::Deployment));
                None
            }
            None => None,
        };

        let success = optimization.success;
        tracing::info!(
            success,
            plan = %plan.name,
            files = optimization.optimized_code.source_count(),
            deployed = deployment.is_some(),
            errors = errors.len(),
            "Pipeline finished"
        );
        RunResult {
            success,
            research,
            plan,
            code,
            optimization,
            deployment,
            errors,
            logs,
        }
    }
}

/// Move a stage's diagnostics into the run log and keep its value.
fn collect<T>(stage: Stage, out: Traced<T>, logs: &mut Vec<String>) -> T {
    for line in &out.log {
        tracing::warn!(stage = %stage, "{line}");
    }
    logs.extend(out.log);
    out.value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};
    use crate::llm::scripted::ScriptedGenerator;
    use crate::model::SearchResult;
    use crate::search::SearchProvider;
    use async_trait::async_trait;

    struct Offline;

    #[async_trait]
    impl SearchProvider for Offline {
        fn name(&self) -> &str {
            "offline"
        }

        async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
            Err(Error::transport("network unreachable"))
        }
    }

    fn offline_pipeline(llm: ScriptedGenerator) -> Pipeline {
        Pipeline::new(Arc::new(llm), Arc::new(SearchChain::new(Arc::new(Offline))))
    }

    #[test]
    fn stage_labels() {
        assert_eq!(Stage::Codegen.to_string(), "codegen");
        assert_eq!(Stage::Deployment.to_string(), "deployment");
    }

    #[tokio::test]
    async fn failing_generator_still_produces_artifacts() {
        let pipeline = offline_pipeline(ScriptedGenerator::failing());
        let result = pipeline
            .run(&GenerationRequest::new("todo list app"), &RunOptions::default())
            .await;
        assert!(result.success);
        assert!(result.errors.is_empty());
        assert!(result.deployment.is_none());
        assert!(result.logs.iter().any(|l| l == "planning: using fallback"));
        assert!(result.logs.iter().any(|l| l == "codegen: using fallback"));
        assert!(result.optimization.success);
    }

    #[tokio::test]
    async fn missing_provider_is_a_run_error_not_a_failure() {
        let pipeline = offline_pipeline(ScriptedGenerator::failing());
        let options = RunOptions::deploy_to(ProviderKind::BuildApi, DeployConfig::new("todo"));
        let result = pipeline.run(&GenerationRequest::new("todo list app"), &options).await;
        assert!(result.success);
        assert!(result.deployment.is_none());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].starts_with("deployment: build-api:"));
    }

    #[tokio::test]
    async fn invalid_bundle_is_not_deployed() {
        let llm = ScriptedGenerator::new()
            .when("Create an application plan", r#"{"name": "Notes", "structure": {"pages": ["Home"]}}"#)
            .when(
                "Generate the source code",
                r#"{"frontend": {"pages": {"../escape.jsx": "export default () => null;"}}}"#,
            );
        let pipeline = offline_pipeline(llm);
        let options = RunOptions::deploy_to(ProviderKind::ZipUpload, DeployConfig::new("notes"));
        let result = pipeline.run(&GenerationRequest::new("notes app"), &options).await;
        assert!(!result.success);
        assert!(result.deployment.is_none());
        assert!(result.errors.iter().any(|e| e.starts_with("optimization: ")));
        assert!(result.errors.iter().any(|e| e.contains("skipped")));
    }
}
