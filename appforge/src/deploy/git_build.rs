//! Git-push build service driven over GraphQL.
//!
//! The bundle is sent as a single commit; the service builds it and reports
//! progress on the deployment object it returns.

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{
    DeployConfig, DeployProvider, DeployStatus, DeploymentRecord, ProviderKind, StatusReport, check_response,
    https_url, resolve_token,
};
use crate::config::GitBuildSettings;
use crate::error::{Error, Result};
use crate::model::CodeBundle;

const CREATE: &str = "mutation DeploymentCreate($input: DeploymentCreateInput!) {
  deploymentCreate(input: $input) { id status url }
}";

const STATUS: &str = "query Deployment($id: String!) {
  deployment(id: $id) { id status url }
}";

const ROLLBACK: &str = "mutation DeploymentRollback($id: String!) {
  deploymentRollback(id: $id) { id status url }
}";

#[derive(Debug, Deserialize)]
struct GqlDeployment {
    id: String,
    status: String,
    #[serde(default)]
    url: Option<String>,
}

pub struct GitBuild {
    settings: GitBuildSettings,
    http: reqwest::Client,
    token: Option<String>,
}

impl GitBuild {
    pub fn new(settings: GitBuildSettings, http: reqwest::Client) -> Self {
        Self {
            settings,
            http,
            token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// POST one operation and pull `data.{field}` out of the response.
    async fn graphql<T: DeserializeOwned>(&self, query: &str, variables: Value, field: &str) -> Result<T> {
        let token = resolve_token(&self.token, &self.settings.token_env)?;
        if self.settings.api_url.is_empty() {
            return Err(Error::Config("git build needs deploy.git_build.api_url".into()));
        }
        let resp = self
            .http
            .post(&self.settings.api_url)
            .bearer_auth(token)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;
        let body: Value = check_response(resp).await?.json().await?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array)
            && !errors.is_empty()
        {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect();
            return Err(Error::Provider(if messages.is_empty() {
                "git build returned errors".to_string()
            } else {
                messages.join("; ")
            }));
        }
        let data = body
            .get("data")
            .and_then(|d| d.get(field))
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| Error::Parse(format!("response has no data.{field}")))?;
        Ok(serde_json::from_value(data)?)
    }
}

pub fn map_status(status: &str) -> DeployStatus {
    match status.to_ascii_uppercase().as_str() {
        "SUCCESS" | "READY" => DeployStatus::Ready,
        "FAILED" | "CRASHED" | "ERROR" | "CANCELED" | "CANCELLED" => DeployStatus::Error,
        _ => DeployStatus::Building,
    }
}

#[async_trait]
impl DeployProvider for GitBuild {
    fn kind(&self) -> ProviderKind {
        ProviderKind::GitBuild
    }

    async fn deploy(&self, bundle: &CodeBundle, config: &DeployConfig) -> Result<DeploymentRecord> {
        let files: Vec<Value> = bundle
            .files()
            .into_iter()
            .map(|f| json!({ "path": f.path, "content": f.content }))
            .collect();
        let count = files.len();
        let input = json!({
            "projectId": self.settings.project_id,
            "branch": self.settings.branch,
            "message": format!("Deploy {}", config.project_name),
            "files": files,
            "variables": config.environment,
        });
        let created: GqlDeployment = self
            .graphql(CREATE, json!({ "input": input }), "deploymentCreate")
            .await?;
        Ok(DeploymentRecord::new(self.kind(), map_status(&created.status))
            .with_target(created.id.clone())
            .with_url(created.url.as_deref().and_then(https_url))
            .log(format!(
                "committed {count} files to {}, deployment {} {}",
                self.settings.branch, created.id, created.status
            )))
    }

    async fn check_status(&self, record: &DeploymentRecord) -> Result<StatusReport> {
        let id = record
            .target
            .as_deref()
            .ok_or_else(|| Error::Provider(format!("deployment {} has no provider id", record.id)))?;
        let current: GqlDeployment = self.graphql(STATUS, json!({ "id": id }), "deployment").await?;
        Ok(StatusReport {
            status: map_status(&current.status),
            url: current.url.as_deref().and_then(https_url).or_else(|| record.url.clone()),
            logs: vec![format!("deployment {} {}", current.id, current.status)],
        })
    }

    async fn rollback(&self, _current: &DeploymentRecord, target: &DeploymentRecord) -> Result<DeploymentRecord> {
        let id = target
            .target
            .as_deref()
            .ok_or_else(|| Error::Provider(format!("deployment {} has no provider id", target.id)))?;
        let restored: GqlDeployment = self
            .graphql(ROLLBACK, json!({ "id": id }), "deploymentRollback")
            .await?;
        Ok(DeploymentRecord::restoring(target).log(format!(
            "rolled back to {id} as {} {}",
            restored.id, restored.status
        )))
    }
}
