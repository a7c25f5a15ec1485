//! Planning agent and the deterministic fallback plan.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::{Role, ask, json_context};
use crate::fallback::{Chain, Traced};
use crate::llm::{GenerationParams, TextGenerator};
use crate::model::{AppPlan, AppStructure, Complexity, GenerationRequest, Platform, ResearchSummary};

const NAME_WORDS: usize = 4;
const MAX_FEATURE_PAGES: usize = 6;

pub struct PlannerAgent {
    llm: Arc<dyn TextGenerator>,
}

impl PlannerAgent {
    pub fn new(llm: Arc<dyn TextGenerator>) -> Self {
        Self { llm }
    }

    /// Plan the app, or fall back to [`fallback_plan`].
    pub async fn plan(&self, request: &GenerationRequest, research: &ResearchSummary) -> Traced<AppPlan> {
        let prompt = format!(
            "Create an application plan.\n\n\
             Idea: {}\nPlatform: {}\nRequested features: {}\nStyle: {}\nAudience: {}\n\n\
             Research:\n{}\n\n{PLAN_SHAPE}",
            request.prompt,
            request.platform,
            request.features.join(", "),
            request.style,
            request.audience,
            json_context(research),
        );
        let llm = self.llm.as_ref();
        let out = Chain::new()
            .then("planning:llm", || async move {
                ask(llm, &prompt, GenerationParams::structured(3000), check_plan).await
            })
            .first_ok()
            .await
            .or_fallback("planning", || fallback_plan(request));
        tracing::info!(
            role = %Role::Planner,
            name = %out.value.name,
            complexity = %out.value.complexity,
            pages = out.value.structure.pages.len(),
            degraded = out.degraded(),
            "Plan ready"
        );
        out
    }

    /// Revise `plan` with `feedback`. On any failure the input plan comes
    /// back untouched.
    pub async fn refine(&self, plan: &AppPlan, feedback: &str) -> Traced<AppPlan> {
        let prompt = format!(
            "Refine this application plan using the feedback.\n\n\
             Current plan:\n{}\n\nFeedback: {feedback}\n\n{PLAN_SHAPE}",
            json_context(plan)
        );
        let llm = self.llm.as_ref();
        Chain::new()
            .then("planning:refine", || async move {
                ask(llm, &prompt, GenerationParams::structured(3000), check_plan).await
            })
            .first_ok()
            .await
            .or_fallback("planning:refine", || plan.clone())
    }
}

const PLAN_SHAPE: &str = "Reply with JSON: {\"name\": \"...\", \"description\": \"...\", \
     \"features\": [...], \"techStack\": {\"frontend\": \"...\", \"backend\": \"...\", \"database\": \"...\"}, \
     \"structure\": {\"pages\": [...], \"components\": [...], \"apiRoutes\": [...]}, \
     \"timeline\": \"...\", \"complexity\": \"simple|medium|complex\"}";

fn check_plan(plan: &AppPlan) -> Result<(), String> {
    if plan.name.trim().is_empty() {
        return Err("plan has no name".to_string());
    }
    if plan.structure.pages.iter().all(|p| p.trim().is_empty()) {
        return Err("plan has no pages".to_string());
    }
    Ok(())
}

// ── Fallback ───────────────────────────────────────────────────────────

/// Complexity by number of requested features.
pub fn complexity_for(feature_count: usize) -> Complexity {
    match feature_count {
        0..=3 => Complexity::Simple,
        4..=7 => Complexity::Medium,
        _ => Complexity::Complex,
    }
}

pub fn tech_stack_for(platform: Platform) -> BTreeMap<String, String> {
    let pairs: &[(&str, &str)] = match platform {
        Platform::Web => &[
            ("frontend", "React"),
            ("backend", "Node.js + Express"),
            ("database", "PostgreSQL"),
            ("hosting", "Static host + serverless API"),
        ],
        Platform::Mobile => &[
            ("frontend", "React Native"),
            ("backend", "Node.js + Express"),
            ("database", "SQLite (device) + PostgreSQL"),
            ("hosting", "App stores + container API"),
        ],
        Platform::Desktop => &[
            ("frontend", "Electron + React"),
            ("backend", "Node.js"),
            ("database", "SQLite"),
            ("hosting", "Signed installers"),
        ],
        Platform::Ar => &[
            ("frontend", "React + WebXR"),
            ("backend", "Node.js + Express"),
            ("database", "PostgreSQL"),
            ("rendering", "Three.js"),
        ],
    };
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn timeline_for(complexity: Complexity) -> &'static str {
    match complexity {
        Complexity::Simple => "1-2 weeks",
        Complexity::Medium => "3-4 weeks",
        Complexity::Complex => "6-8 weeks",
    }
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric()).filter(|w| !w.is_empty())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// `"drag and drop"` → `"DragAndDrop"`.
pub fn pascal_case(text: &str) -> String {
    words(text).map(capitalize).collect()
}

/// `"Drag and Drop!"` → `"drag-and-drop"`.
pub fn slug(text: &str) -> String {
    words(text).map(str::to_lowercase).collect::<Vec<_>>().join("-")
}

fn app_name(prompt: &str) -> String {
    let name: Vec<String> = words(prompt).take(NAME_WORDS).map(capitalize).collect();
    if name.is_empty() {
        "Generated App".to_string()
    } else {
        name.join(" ")
    }
}

/// A plan built only from the request. Identical requests give identical plans.
pub fn fallback_plan(request: &GenerationRequest) -> AppPlan {
    let features: Vec<&str> = request
        .features
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .collect();
    let complexity = complexity_for(features.len());

    let mut pages = vec!["Home".to_string()];
    let mut seen: BTreeSet<String> = pages.iter().cloned().collect();
    for feature in features.iter().take(MAX_FEATURE_PAGES) {
        let page = pascal_case(feature);
        if !page.is_empty() && seen.insert(page.clone()) {
            pages.push(page);
        }
    }
    if complexity != Complexity::Simple && seen.insert("Settings".to_string()) {
        pages.push("Settings".to_string());
    }

    let mut components: Vec<String> = ["Header", "Footer", "Layout"].iter().map(|s| s.to_string()).collect();
    for feature in &features {
        let component = format!("{}Panel", pascal_case(feature));
        if component != "Panel" && !components.contains(&component) {
            components.push(component);
        }
    }

    let mut api_routes = vec!["/api/health".to_string()];
    let resources: Vec<String> = if features.is_empty() {
        vec!["items".to_string()]
    } else {
        features.iter().map(|f| slug(f)).filter(|s| !s.is_empty()).collect()
    };
    for resource in resources {
        let route = format!("/api/{resource}");
        if !api_routes.contains(&route) {
            api_routes.push(route);
        }
    }

    let mut feature_set: BTreeSet<String> = features.iter().map(|f| f.to_string()).collect();
    if feature_set.is_empty() {
        feature_set.insert("Core functionality".to_string());
    }
    feature_set.insert("Responsive layout".to_string());

    AppPlan {
        name: app_name(&request.prompt),
        description: format!(
            "A {} {} application for {} users: {}",
            request.style,
            request.platform,
            request.audience,
            request.prompt.trim()
        ),
        features: feature_set,
        tech_stack: tech_stack_for(request.platform),
        structure: AppStructure {
            pages,
            components,
            api_routes,
        },
        timeline: timeline_for(complexity).to_string(),
        complexity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::scripted::ScriptedGenerator;

    fn todo_request() -> GenerationRequest {
        GenerationRequest::new("todo list app")
    }

    #[test]
    fn complexity_thresholds() {
        assert_eq!(complexity_for(0), Complexity::Simple);
        assert_eq!(complexity_for(3), Complexity::Simple);
        assert_eq!(complexity_for(4), Complexity::Medium);
        assert_eq!(complexity_for(7), Complexity::Medium);
        assert_eq!(complexity_for(8), Complexity::Complex);
    }

    #[test]
    fn fallback_plan_for_bare_request() {
        let plan = fallback_plan(&todo_request());
        assert_eq!(plan.name, "Todo List App");
        assert_eq!(plan.complexity, Complexity::Simple);
        assert_eq!(plan.structure.pages, ["Home"]);
        assert_eq!(plan.structure.components, ["Header", "Footer", "Layout"]);
        assert_eq!(plan.structure.api_routes, ["/api/health", "/api/items"]);
        assert_eq!(plan.timeline, "1-2 weeks");
        assert_eq!(plan.tech_stack["frontend"], "React");
    }

    #[test]
    fn fallback_plan_derives_structure_from_features() {
        let mut request = GenerationRequest::new("recipe sharing");
        request.platform = Platform::Mobile;
        request.features = ["user login", "photo upload", "comments", "ratings", " "]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let plan = fallback_plan(&request);
        assert_eq!(plan.complexity, Complexity::Medium);
        assert_eq!(
            plan.structure.pages,
            ["Home", "UserLogin", "PhotoUpload", "Comments", "Ratings", "Settings"]
        );
        assert!(plan.structure.components.contains(&"PhotoUploadPanel".to_string()));
        assert!(plan.structure.api_routes.contains(&"/api/user-login".to_string()));
        assert_eq!(plan.tech_stack["frontend"], "React Native");
    }

    #[tokio::test]
    async fn failed_generation_gives_identical_fallback_plans() {
        let planner = PlannerAgent::new(Arc::new(ScriptedGenerator::failing()));
        let research = ResearchSummary::fallback();
        let a = planner.plan(&todo_request(), &research).await;
        let b = planner.plan(&todo_request(), &research).await;
        assert_eq!(
            serde_json::to_string(&a.value).unwrap(),
            serde_json::to_string(&b.value).unwrap()
        );
        assert_eq!(a.log.last().map(String::as_str), Some("planning: using fallback"));
    }

    #[tokio::test]
    async fn plan_without_pages_is_rejected() {
        let llm = ScriptedGenerator::new()
            .reply(r#"Sure! {"name": "Todos", "structure": {"pages": []}}"#);
        let planner = PlannerAgent::new(Arc::new(llm));
        let out = planner.plan(&todo_request(), &ResearchSummary::default()).await;
        assert_eq!(out.value, fallback_plan(&todo_request()));
        assert!(out.log[0].contains("no pages"));
    }

    #[tokio::test]
    async fn parses_plan_embedded_in_prose() {
        let llm = ScriptedGenerator::new().reply(
            "Here is the plan:\n```json\n{\"name\": \"Todos\", \"features\": [\"lists\"], \
             \"structure\": {\"pages\": [\"Board\"]}, \"complexity\": \"medium\"}\n```",
        );
        let planner = PlannerAgent::new(Arc::new(llm));
        let out = planner.plan(&todo_request(), &ResearchSummary::default()).await;
        assert!(!out.degraded());
        assert_eq!(out.value.name, "Todos");
        assert_eq!(out.value.complexity, Complexity::Medium);
        assert_eq!(out.value.structure.pages, ["Board"]);
    }

    #[tokio::test]
    async fn refine_failure_keeps_the_input_plan() {
        let mut plan = fallback_plan(&todo_request());
        plan.name = "Hand Tuned".to_string();
        let planner = PlannerAgent::new(Arc::new(ScriptedGenerator::new().reply("not json")));
        let out = planner.refine(&plan, "add dark mode").await;
        assert_eq!(out.value, plan);
        assert!(out.degraded());
    }

    #[tokio::test]
    async fn refine_applies_a_valid_revision() {
        let llm = ScriptedGenerator::new()
            .when("dark mode", r#"{"name": "Todo Dark", "structure": {"pages": ["Home", "Theme"]}}"#);
        let planner = PlannerAgent::new(Arc::new(llm));
        let out = planner.refine(&fallback_plan(&todo_request()), "add dark mode").await;
        assert_eq!(out.value.name, "Todo Dark");
        assert_eq!(out.value.structure.pages, ["Home", "Theme"]);
    }

    #[test]
    fn naming_helpers() {
        assert_eq!(pascal_case("drag and drop"), "DragAndDrop");
        assert_eq!(slug("Drag and Drop!"), "drag-and-drop");
        assert_eq!(app_name("   "), "Generated App");
    }
}
