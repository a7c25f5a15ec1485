//! Build API that accepts file contents inline.
//!
//! Files go up base64-encoded in the create call; the service builds them
//! and exposes progress through `readyState`. Rollback promotes an earlier
//! deployment back onto the project's production alias.

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::{Value, json};

use super::{
    DeployConfig, DeployProvider, DeployStatus, DeploymentRecord, ProviderKind, StatusReport, check_response,
    https_url, resolve_token,
};
use crate::config::BuildApiSettings;
use crate::error::{Error, Result};
use crate::model::{BundleFile, CodeBundle};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiDeployment {
    id: String,
    #[serde(default, alias = "state")]
    ready_state: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    alias: Vec<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl ApiDeployment {
    fn public_url(&self) -> Option<String> {
        self.alias
            .first()
            .and_then(|a| https_url(a))
            .or_else(|| self.url.as_deref().and_then(https_url))
    }
}

pub struct BuildApi {
    settings: BuildApiSettings,
    http: reqwest::Client,
    token: Option<String>,
}

impl BuildApi {
    pub fn new(settings: BuildApiSettings, http: reqwest::Client) -> Self {
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

    fn request(&self, method: reqwest::Method, path: &str, token: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path}", self.settings.api_url.trim_end_matches('/'));
        let mut req = self.http.request(method, url).bearer_auth(token);
        if let Some(team) = self.settings.team_id.as_deref().filter(|t| !t.is_empty()) {
            req = req.query(&[("teamId", team)]);
        }
        req
    }

    fn project<'a>(&'a self, config: &'a DeployConfig) -> &'a str {
        if self.settings.project.is_empty() {
            &config.project_name
        } else {
            &self.settings.project
        }
    }
}

/// Inline file entries for the create call.
pub fn inline_files(files: &[BundleFile]) -> Vec<Value> {
    let engine = base64::engine::general_purpose::STANDARD;
    files
        .iter()
        .map(|f| {
            json!({
                "file": f.path,
                "data": engine.encode(f.content.as_bytes()),
                "encoding": "base64",
            })
        })
        .collect()
}

pub fn map_ready_state(state: &str) -> DeployStatus {
    match state.to_ascii_uppercase().as_str() {
        "READY" => DeployStatus::Ready,
        "ERROR" | "CANCELED" => DeployStatus::Error,
        _ => DeployStatus::Building,
    }
}

#[async_trait]
impl DeployProvider for BuildApi {
    fn kind(&self) -> ProviderKind {
        ProviderKind::BuildApi
    }

    async fn deploy(&self, bundle: &CodeBundle, config: &DeployConfig) -> Result<DeploymentRecord> {
        let token = resolve_token(&self.token, &self.settings.token_env)?;
        let project = self.project(config);
        if project.is_empty() {
            return Err(Error::Config("build api needs deploy.build_api.project".into()));
        }
        let files = inline_files(&bundle.files());
        let count = files.len();
        let payload = json!({
            "name": project,
            "project": project,
            "target": "production",
            "files": files,
            "env": config.environment,
        });
        let resp = self
            .request(reqwest::Method::POST, "/v13/deployments", &token)
            .json(&payload)
            .send()
            .await?;
        let created: ApiDeployment = check_response(resp).await?.json().await?;
        Ok(DeploymentRecord::new(self.kind(), map_ready_state(&created.ready_state))
            .with_target(created.id.clone())
            .with_url(created.public_url())
            .log(format!("sent {count} files, deployment {} {}", created.id, created.ready_state)))
    }

    async fn check_status(&self, record: &DeploymentRecord) -> Result<StatusReport> {
        let token = resolve_token(&self.token, &self.settings.token_env)?;
        let id = record
            .target
            .as_deref()
            .ok_or_else(|| Error::Provider(format!("deployment {} has no provider id", record.id)))?;
        let resp = self
            .request(reqwest::Method::GET, &format!("/v13/deployments/{id}"), &token)
            .send()
            .await?;
        let current: ApiDeployment = check_response(resp).await?.json().await?;
        let mut logs = vec![format!("deployment {} {}", current.id, current.ready_state)];
        logs.extend(current.error_message.clone());
        Ok(StatusReport {
            status: map_ready_state(&current.ready_state),
            url: current.public_url().or_else(|| record.url.clone()),
            logs,
        })
    }

    async fn rollback(&self, _current: &DeploymentRecord, target: &DeploymentRecord) -> Result<DeploymentRecord> {
        let token = resolve_token(&self.token, &self.settings.token_env)?;
        if self.settings.project.is_empty() {
            return Err(Error::Config("build api rollback needs deploy.build_api.project".into()));
        }
        let id = target
            .target
            .as_deref()
            .ok_or_else(|| Error::Provider(format!("deployment {} has no provider id", target.id)))?;
        let path = format!("/v9/projects/{}/promote/{id}", self.settings.project);
        let resp = self.request(reqwest::Method::POST, &path, &token).send().await?;
        check_response(resp).await?;
        Ok(DeploymentRecord::restoring(target).log(format!("promoted {id} to production")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> BuildApi {
        BuildApi::new(
            BuildApiSettings {
                api_url: server.uri(),
                project: "todo".into(),
                team_id: Some("team_1".into()),
                token_env: "APPFORGE_TEST_UNSET_TOKEN".into(),
            },
            reqwest::Client::new(),
        )
        .with_token("tok")
    }

    #[test]
    fn files_are_base64_inline() {
        let files = inline_files(&[BundleFile {
            path: "package.json".into(),
            content: "{}".into(),
        }]);
        assert_eq!(files[0], json!({ "file": "package.json", "data": "e30=", "encoding": "base64" }));
    }

    #[tokio::test]
    async fn deploy_sends_inline_files_with_team() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v13/deployments"))
            .and(query_param("teamId", "team_1"))
            .and(body_partial_json(json!({ "name": "todo", "target": "production" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "dpl_1", "readyState": "QUEUED", "url": "todo-abc.vercel.app"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let record = provider(&server)
            .deploy(&CodeBundle::default(), &DeployConfig::new("ignored"))
            .await
            .unwrap();
        assert_eq!(record.status, DeployStatus::Building);
        assert_eq!(record.url.as_deref(), Some("https://todo-abc.vercel.app"));
    }

    #[tokio::test]
    async fn status_prefers_alias() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v13/deployments/dpl_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "dpl_1", "readyState": "READY", "url": "todo-abc.vercel.app", "alias": ["todo.vercel.app"]
            })))
            .mount(&server)
            .await;

        let record = DeploymentRecord::new(ProviderKind::BuildApi, DeployStatus::Building).with_target("dpl_1");
        let report = provider(&server).check_status(&record).await.unwrap();
        assert_eq!(report.status, DeployStatus::Ready);
        assert_eq!(report.url.as_deref(), Some("https://todo.vercel.app"));
    }

    #[tokio::test]
    async fn rollback_promotes_target() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v9/projects/todo/promote/dpl_1"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let first = DeploymentRecord::new(ProviderKind::BuildApi, DeployStatus::Ready)
            .with_target("dpl_1")
            .with_url(Some("https://todo-abc.vercel.app".into()));
        let second = DeploymentRecord::new(ProviderKind::BuildApi, DeployStatus::Ready).with_target("dpl_2");
        let restored = provider(&server).rollback(&second, &first).await.unwrap();
        assert_eq!(restored.url, first.url);
    }

    #[tokio::test]
    async fn missing_token_is_config_error() {
        let server = MockServer::start().await;
        let mut provider = provider(&server);
        provider.token = None;
        let err = provider
            .deploy(&CodeBundle::default(), &DeployConfig::new("todo"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
