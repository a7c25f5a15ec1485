//! Static host that takes one zip archive per deploy.

use std::io::{Cursor, Write};

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    DeployConfig, DeployProvider, DeployStatus, DeploymentRecord, ProviderKind, StatusReport, check_response,
    https_url, resolve_token,
};
use crate::config::ZipUploadSettings;
use crate::error::{Error, Result};
use crate::model::{BundleFile, CodeBundle};

#[derive(Debug, Deserialize)]
struct SiteDeploy {
    id: String,
    #[serde(default)]
    state: String,
    #[serde(default)]
    ssl_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    deploy_ssl_url: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl SiteDeploy {
    fn public_url(&self) -> Option<String> {
        [&self.ssl_url, &self.url, &self.deploy_ssl_url]
            .into_iter()
            .flatten()
            .find_map(|u| https_url(u))
    }
}

pub struct ZipUpload {
    settings: ZipUploadSettings,
    http: reqwest::Client,
    token: Option<String>,
}

impl ZipUpload {
    pub fn new(settings: ZipUploadSettings, http: reqwest::Client) -> Self {
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

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.settings.api_url.trim_end_matches('/'))
    }

    fn credentials(&self) -> Result<String> {
        let token = resolve_token(&self.token, &self.settings.token_env)?;
        if self.settings.site_id.is_empty() {
            return Err(Error::Config("zip upload needs deploy.zip_upload.site_id".into()));
        }
        Ok(token)
    }
}

/// Pack files into a deflated zip held in memory.
pub fn archive(files: &[BundleFile]) -> Result<Vec<u8>> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for file in files {
        zip.start_file(file.path.as_str(), options)
            .map_err(|e| Error::Provider(format!("zip {}: {e}", file.path)))?;
        zip.write_all(file.content.as_bytes())?;
    }
    let cursor = zip
        .finish()
        .map_err(|e| Error::Provider(format!("zip: {e}")))?;
    Ok(cursor.into_inner())
}

fn map_state(state: &str) -> DeployStatus {
    match state {
        "ready" => DeployStatus::Ready,
        "error" | "rejected" => DeployStatus::Error,
        _ => DeployStatus::Building,
    }
}

#[async_trait]
impl DeployProvider for ZipUpload {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ZipUpload
    }

    async fn deploy(&self, bundle: &CodeBundle, config: &DeployConfig) -> Result<DeploymentRecord> {
        let token = self.credentials()?;
        let files = bundle.files();
        let body = archive(&files)?;
        let size = body.len();
        let resp = self
            .http
            .post(self.endpoint(&format!("/sites/{}/deploys", self.settings.site_id)))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, "application/zip")
            .query(&[("title", config.project_name.as_str())])
            .body(body)
            .send()
            .await?;
        let created: SiteDeploy = check_response(resp).await?.json().await?;
        Ok(DeploymentRecord::new(self.kind(), map_state(&created.state))
            .with_target(created.id.clone())
            .with_url(created.public_url())
            .log(format!("uploaded {} files ({size} bytes zipped) as deploy {}", files.len(), created.id)))
    }

    async fn check_status(&self, record: &DeploymentRecord) -> Result<StatusReport> {
        let token = self.credentials()?;
        let id = record
            .target
            .as_deref()
            .ok_or_else(|| Error::Provider(format!("deployment {} has no provider id", record.id)))?;
        let resp = self
            .http
            .get(self.endpoint(&format!("/deploys/{id}")))
            .bearer_auth(token)
            .send()
            .await?;
        let current: SiteDeploy = check_response(resp).await?.json().await?;
        let mut logs = vec![format!("deploy {} {}", current.id, current.state)];
        logs.extend(current.error_message.clone());
        Ok(StatusReport {
            status: map_state(&current.state),
            url: current.public_url().or_else(|| record.url.clone()),
            logs,
        })
    }

    async fn rollback(&self, _current: &DeploymentRecord, target: &DeploymentRecord) -> Result<DeploymentRecord> {
        let token = self.credentials()?;
        let id = target
            .target
            .as_deref()
            .ok_or_else(|| Error::Provider(format!("deployment {} has no provider id", target.id)))?;
        let resp = self
            .http
            .post(self.endpoint(&format!("/sites/{}/deploys/{id}/restore", self.settings.site_id)))
            .bearer_auth(token)
            .send()
            .await?;
        check_response(resp).await?;
        Ok(DeploymentRecord::restoring(target).log(format!("restored deploy {id}")))
    }
}
