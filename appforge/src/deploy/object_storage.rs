//! Static hosting from an object-storage bucket.
//!
//! Each deploy uploads the bundle under `releases/{release}/` where the
//! release id is a content hash, then repoints the `current` object at it.
//! Rolling back only rewrites `current`.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::{
    DeployConfig, DeployProvider, DeployStatus, DeploymentRecord, ProviderKind, StatusReport, check_response,
    resolve_token,
};
use crate::config::ObjectStorageSettings;
use crate::error::{Error, Result};
use crate::model::{BundleFile, CodeBundle};

pub struct ObjectStorage {
    settings: ObjectStorageSettings,
    http: reqwest::Client,
    token: Option<String>,
}

impl ObjectStorage {
    pub fn new(settings: ObjectStorageSettings, http: reqwest::Client) -> Self {
        Self {
            settings,
            http,
            token: None,
        }
    }

    /// Use this token instead of reading `token_env`.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{key}",
            self.settings.api_url.trim_end_matches('/'),
            self.settings.bucket
        )
    }

    fn site_url(&self, release: &str) -> Option<String> {
        let base = self.settings.website_url.trim_end_matches('/');
        (!base.is_empty()).then(|| format!("{base}/releases/{release}/"))
    }

    async fn put(&self, token: &str, key: &str, content_type: &str, body: Vec<u8>) -> Result<()> {
        let resp = self
            .http
            .put(self.object_url(key))
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await?;
        check_response(resp).await?;
        Ok(())
    }

    async fn point_current_at(&self, token: &str, release: &str) -> Result<()> {
        self.put(token, "current", "text/plain", release.as_bytes().to_vec())
            .await
    }

    fn ensure_configured(&self) -> Result<()> {
        if self.settings.api_url.is_empty() || self.settings.bucket.is_empty() {
            return Err(Error::Config(
                "object storage needs deploy.object_storage.api_url and bucket".into(),
            ));
        }
        Ok(())
    }
}

/// First 12 hex chars of a SHA-256 over every path and content.
pub fn release_id(files: &[BundleFile]) -> String {
    let mut sorted: Vec<&BundleFile> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));
    let mut hasher = Sha256::new();
    for file in sorted {
        hasher.update(file.path.as_bytes());
        hasher.update([0]);
        hasher.update(file.content.as_bytes());
        hasher.update([0]);
    }
    hasher.finalize()[..6].iter().map(|b| format!("{b:02x}")).collect()
}

fn content_type(path: &str) -> &'static str {
    match path.rsplit('.').next().unwrap_or_default() {
        "html" => "text/html",
        "css" => "text/css",
        "js" | "jsx" | "mjs" => "text/javascript",
        "ts" | "tsx" => "text/plain",
        "json" => "application/json",
        "sql" => "application/sql",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl DeployProvider for ObjectStorage {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ObjectStorage
    }

    async fn deploy(&self, bundle: &CodeBundle, config: &DeployConfig) -> Result<DeploymentRecord> {
        let token = resolve_token(&self.token, &self.settings.token_env)?;
        self.ensure_configured()?;

        let files = bundle.files();
        let release = release_id(&files);
        for file in &files {
            let key = format!("releases/{release}/{}", file.path);
            self.put(&token, &key, content_type(&file.path), file.content.clone().into_bytes())
                .await?;
        }
        self.point_current_at(&token, &release).await?;
        tracing::debug!(release = %release, files = files.len(), "Release uploaded");

        Ok(DeploymentRecord::new(self.kind(), DeployStatus::Ready)
            .with_target(release.clone())
            .with_url(self.site_url(&release))
            .log(format!(
                "uploaded {} files for {} to release {release}",
                files.len(),
                config.project_name
            ))
            .log("current → ".to_string() + &release))
    }

    async fn check_status(&self, record: &DeploymentRecord) -> Result<StatusReport> {
        let token = resolve_token(&self.token, &self.settings.token_env)?;
        self.ensure_configured()?;
        let resp = self
            .http
            .get(self.object_url("current"))
            .bearer_auth(&token)
            .send()
            .await?;
        let current = check_response(resp).await?.text().await?;
        let serving = record.target.as_deref() == Some(current.trim());
        Ok(StatusReport {
            status: DeployStatus::Ready,
            url: record.url.clone(),
            logs: vec![format!(
                "current release {}{}",
                current.trim(),
                if serving { "" } else { " (superseded)" }
            )],
        })
    }

    async fn rollback(&self, current: &DeploymentRecord, target: &DeploymentRecord) -> Result<DeploymentRecord> {
        let token = resolve_token(&self.token, &self.settings.token_env)?;
        self.ensure_configured()?;
        let release = target
            .target
            .as_deref()
            .ok_or_else(|| Error::Provider(format!("deployment {} has no release", target.id)))?;
        self.point_current_at(&token, release).await?;
        Ok(DeploymentRecord::restoring(target).log(format!(
            "current → {release} (was {})",
            current.target.as_deref().unwrap_or("unknown")
        )))
    }
}
