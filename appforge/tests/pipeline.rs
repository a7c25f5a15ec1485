//! End-to-end runs with the network and the model unavailable.

use std::sync::Arc;

use async_trait::async_trait;

use appforge::agents::planner::fallback_plan;
use appforge::agents::templates::fallback_bundle;
use appforge::llm::scripted::ScriptedGenerator;
use appforge::model::{Complexity, GenerationRequest, Platform, SearchResult};
use appforge::optimize::Optimizer;
use appforge::search::{MemoryStore, ResearchCache, SearchChain, SearchProvider};
use appforge::{Error, Pipeline, Result, RunOptions};

struct Unreachable(&'static str);

#[async_trait]
impl SearchProvider for Unreachable {
    fn name(&self) -> &str {
        self.0
    }

    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
        Err(Error::transport("connection refused"))
    }
}

fn todo_request() -> GenerationRequest {
    GenerationRequest {
        prompt: "todo list app".into(),
        platform: Platform::Web,
        features: Vec::new(),
        style: "modern".into(),
        audience: "general".into(),
    }
}

fn offline_search() -> SearchChain {
    SearchChain::new(Arc::new(Unreachable("primary")))
        .with_alternative(Arc::new(Unreachable("alternative")))
        .with_cache(ResearchCache::new(Arc::new(MemoryStore::new()), 0.7))
}

#[tokio::test]
async fn run_succeeds_when_every_generation_fails() {
    let llm = Arc::new(ScriptedGenerator::failing());
    let search = offline_search().with_knowledge(llm.clone());
    let pipeline = Pipeline::new(llm, Arc::new(search));

    let result = pipeline.run(&todo_request(), &RunOptions::default()).await;

    assert!(result.success);
    assert_eq!(result.plan.complexity, Complexity::Simple);
    assert!(!result.plan.structure.pages.is_empty());
    assert!(!result.code.frontend.components.is_empty());
    assert!(result.optimization.success);
    assert!(result.errors.is_empty());
    assert!(!result.research.is_empty());
    assert!(!result.logs.is_empty());
}

#[tokio::test]
async fn exhausted_search_returns_nothing() {
    let search = offline_search().with_knowledge(Arc::new(ScriptedGenerator::failing()));
    let results = search.search(&["xyzxyz_no_such_topic".to_string()]).await;
    assert!(results.is_empty());
}

#[test]
fn fallbacks_are_deterministic() {
    let request = todo_request();
    let plan = fallback_plan(&request);
    assert_eq!(plan, fallback_plan(&request));
    assert_eq!(fallback_bundle(&plan, &request), fallback_bundle(&plan, &request));
}

#[test]
fn optimizing_twice_changes_nothing_more() {
    let request = todo_request();
    let bundle = fallback_bundle(&fallback_plan(&request), &request);
    let optimizer = Optimizer::default();

    let once = optimizer.optimize(&bundle);
    let twice = optimizer.optimize(&once.optimized_code);
    assert_eq!(twice.optimized_code, once.optimized_code);
    assert!(twice.improvements.is_empty());
    for score in [once.performance_score, once.security_score, once.maintainability_score] {
        assert!(score <= 100);
    }
}
