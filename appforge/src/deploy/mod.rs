//! Deployment abstraction: one capability trait, four providers, and a
//! registry that owns each provider's deployment history.
//!
//! Record lifecycle: `building → ready` or `building → error`. Terminal
//! records never change status again; a rollback appends a new `ready`
//! record instead of reviving an old one.

pub mod build_api;
pub mod git_build;
pub mod object_storage;
pub mod zip_upload;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

pub use build_api::BuildApi;
pub use git_build::GitBuild;
pub use object_storage::ObjectStorage;
pub use zip_upload::ZipUpload;

use crate::config::{self, DeploySettings};
use crate::error::{Error, Result};
use crate::model::CodeBundle;

const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// Static files uploaded to a bucket behind a website endpoint.
    ObjectStorage,
    /// A build service fed by a commit of the bundle.
    GitBuild,
    /// A static host taking one zip archive per deploy.
    ZipUpload,
    /// A build API taking inline file contents.
    BuildApi,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::ObjectStorage,
        ProviderKind::GitBuild,
        ProviderKind::ZipUpload,
        ProviderKind::BuildApi,
    ];
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::ObjectStorage => write!(f, "object-storage"),
            ProviderKind::GitBuild => write!(f, "git-build"),
            ProviderKind::ZipUpload => write!(f, "zip-upload"),
            ProviderKind::BuildApi => write!(f, "build-api"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|k| k.to_string() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| {
                format!("unknown provider {s:?} (expected object-storage, git-build, zip-upload or build-api)")
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployStatus {
    Building,
    Ready,
    Error,
}

impl DeployStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, DeployStatus::Building)
    }
}

impl fmt::Display for DeployStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeployStatus::Building => write!(f, "building"),
            DeployStatus::Ready => write!(f, "ready"),
            DeployStatus::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRecord {
    pub id: String,
    pub provider: ProviderKind,
    pub status: DeployStatus,
    pub url: Option<String>,
    /// The provider's own handle for what is being served: a release
    /// prefix, a provider deployment id.
    pub target: Option<String>,
    pub logs: Vec<String>,
    pub created_at: DateTime<Utc>,
    /// Set on rollback records: id of the record whose target was restored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback_of: Option<String>,
}

impl DeploymentRecord {
    pub fn new(provider: ProviderKind, status: DeployStatus) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            provider,
            status,
            url: None,
            target: None,
            logs: Vec::new(),
            created_at: Utc::now(),
            rollback_of: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn with_url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }

    /// A `ready` record serving what `restored` served.
    pub fn restoring(restored: &DeploymentRecord) -> Self {
        let mut record = Self::new(restored.provider, DeployStatus::Ready);
        record.url = restored.url.clone();
        record.target = restored.target.clone();
        record.rollback_of = Some(restored.id.clone());
        record
    }
}

/// Per-deploy options passed through to providers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployConfig {
    pub project_name: String,
    pub environment: BTreeMap<String, String>,
}

impl DeployConfig {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            environment: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: DeployStatus,
    pub url: Option<String>,
    pub logs: Vec<String>,
}

impl From<&DeploymentRecord> for StatusReport {
    fn from(record: &DeploymentRecord) -> Self {
        Self {
            status: record.status,
            url: record.url.clone(),
            logs: record.logs.clone(),
        }
    }
}

/// What every deployment target can do.
#[async_trait]
pub trait DeployProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Start a deployment. The record may still be `building`.
    async fn deploy(&self, bundle: &CodeBundle, config: &DeployConfig) -> Result<DeploymentRecord>;

    /// Current provider-side status of a non-terminal record.
    async fn check_status(&self, record: &DeploymentRecord) -> Result<StatusReport>;

    /// Serve `target` again. Returns the new `ready` record.
    async fn rollback(&self, current: &DeploymentRecord, target: &DeploymentRecord) -> Result<DeploymentRecord>;
}

// ── Shared HTTP helpers ────────────────────────────────────────────────

pub(crate) fn http_client(timeout_secs: Option<u64>) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS)))
        .build()?;
    Ok(client)
}

/// An explicit token, else the named environment variable.
pub(crate) fn resolve_token(explicit: &Option<String>, env_var: &str) -> Result<String> {
    match explicit {
        Some(token) if !token.is_empty() => Ok(token.clone()),
        _ => config::credential(env_var),
    }
}

/// Pass 2xx responses through; turn anything else into an error.
pub(crate) async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::http_status(status.as_u16(), &body))
}

/// `example.app` → `https://example.app`.
pub(crate) fn https_url(host_or_url: &str) -> Option<String> {
    let trimmed = host_or_url.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        Some(trimmed.to_string())
    } else {
        Some(format!("https://{trimmed}"))
    }
}

// ── Registry ───────────────────────────────────────────────────────────

/// Dispatches to providers by kind and keeps every record they produce.
#[derive(Default)]
pub struct Deployments {
    providers: HashMap<ProviderKind, Arc<dyn DeployProvider>>,
    history: Mutex<Vec<DeploymentRecord>>,
}

impl Deployments {
    pub fn new() -> Self {
        Self::default()
    }

    /// All four providers, configured from `settings`. Credentials are read
    /// when a provider is first used.
    pub fn from_settings(settings: &DeploySettings) -> Result<Self> {
        let http = http_client(settings.timeout_secs)?;
        Ok(Self::new()
            .with_provider(Arc::new(ObjectStorage::new(settings.object_storage.clone(), http.clone())))
            .with_provider(Arc::new(GitBuild::new(settings.git_build.clone(), http.clone())))
            .with_provider(Arc::new(ZipUpload::new(settings.zip_upload.clone(), http.clone())))
            .with_provider(Arc::new(BuildApi::new(settings.build_api.clone(), http))))
    }

    pub fn with_provider(mut self, provider: Arc<dyn DeployProvider>) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    fn provider(&self, kind: ProviderKind) -> Result<Arc<dyn DeployProvider>> {
        self.providers
            .get(&kind)
            .cloned()
            .ok_or_else(|| Error::Provider(format!("no {kind} provider configured")))
    }

    fn record(&self, id: &str, kind: ProviderKind) -> Result<DeploymentRecord> {
        self.history
            .lock()
            .iter()
            .find(|r| r.id == id && r.provider == kind)
            .cloned()
            .ok_or_else(|| Error::Provider(format!("unknown {kind} deployment {id}")))
    }

    pub async fn deploy(
        &self,
        bundle: &CodeBundle,
        kind: ProviderKind,
        config: &DeployConfig,
    ) -> Result<DeploymentRecord> {
        let provider = self.provider(kind)?;
        tracing::info!(provider = %kind, files = bundle.files().len(), "Deploying");
        let record = provider.deploy(bundle, config).await.inspect_err(|e| {
            tracing::warn!(provider = %kind, error = %e, "Deployment failed");
        })?;
        tracing::info!(provider = %kind, id = %record.id, status = %record.status, url = ?record.url, "Deployment created");
        self.history.lock().push(record.clone());
        Ok(record)
    }

    /// Refresh and return a record's status. Terminal records are answered
    /// from history without asking the provider.
    pub async fn check_status(&self, id: &str, kind: ProviderKind) -> Result<StatusReport> {
        let record = self.record(id, kind)?;
        if record.status.is_terminal() {
            return Ok(StatusReport::from(&record));
        }
        let provider = self.provider(kind)?;
        let report = provider.check_status(&record).await?;

        let mut history = self.history.lock();
        let Some(stored) = history.iter_mut().find(|r| r.id == id && r.provider == kind) else {
            return Ok(report);
        };
        // another caller may have settled it while we were waiting
        if !stored.status.is_terminal() {
            stored.status = report.status;
            if report.url.is_some() {
                stored.url = report.url.clone();
            }
            stored.logs.extend(report.logs.iter().cloned());
        }
        Ok(StatusReport::from(&*stored))
    }

    /// Restore the last successful deployment made before `id`.
    pub async fn rollback(&self, id: &str, kind: ProviderKind) -> Result<DeploymentRecord> {
        let (current, target) = {
            let history = self.history.lock();
            let records: Vec<&DeploymentRecord> = history.iter().filter(|r| r.provider == kind).collect();
            if records.len() < 2 {
                return Err(Error::Provider(format!(
                    "rollback needs at least two {kind} deployments, found {}",
                    records.len()
                )));
            }
            let pos = records
                .iter()
                .position(|r| r.id == id)
                .ok_or_else(|| Error::Provider(format!("unknown {kind} deployment {id}")))?;
            if records[pos].status == DeployStatus::Building {
                return Err(Error::Provider(format!("deployment {id} is still building")));
            }
            let target = records[..pos]
                .iter()
                .rev()
                .find(|r| r.status == DeployStatus::Ready)
                .ok_or_else(|| Error::Provider(format!("no successful {kind} deployment before {id}")))?;
            (records[pos].clone(), (*target).clone())
        };

        let provider = self.provider(kind)?;
        let mut record = provider.rollback(&current, &target).await?;
        record.status = DeployStatus::Ready;
        record.url = target.url.clone();
        record.rollback_of = Some(target.id.clone());
        tracing::info!(provider = %kind, from = %current.id, to = %target.id, "Rolled back");
        self.history.lock().push(record.clone());
        Ok(record)
    }

    /// Records for one provider, oldest first.
    pub fn history(&self, kind: ProviderKind) -> Vec<DeploymentRecord> {
        self.history
            .lock()
            .iter()
            .filter(|r| r.provider == kind)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Hands out sequential ready (or building) deployments.
    struct Counter {
        n: AtomicUsize,
        initial: DeployStatus,
        polls: AtomicUsize,
    }

    impl Counter {
        fn new(initial: DeployStatus) -> Arc<Self> {
            Arc::new(Self {
                n: AtomicUsize::new(0),
                initial,
                polls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl DeployProvider for Counter {
        fn kind(&self) -> ProviderKind {
            ProviderKind::ZipUpload
        }

        async fn deploy(&self, _bundle: &CodeBundle, _config: &DeployConfig) -> Result<DeploymentRecord> {
            let n = self.n.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(DeploymentRecord::new(self.kind(), self.initial)
                .with_target(format!("d{n}"))
                .with_url(Some(format!("https://d{n}.example.app"))))
        }

        async fn check_status(&self, record: &DeploymentRecord) -> Result<StatusReport> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            Ok(StatusReport {
                status: DeployStatus::Ready,
                url: record.url.clone(),
                logs: vec!["build finished".into()],
            })
        }

        async fn rollback(&self, _current: &DeploymentRecord, target: &DeploymentRecord) -> Result<DeploymentRecord> {
            Ok(DeploymentRecord::restoring(target))
        }
    }

    fn config() -> DeployConfig {
        DeployConfig::new("todo")
    }

    #[test]
    fn provider_kind_round_trips_through_strings() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.to_string().parse::<ProviderKind>().unwrap(), kind);
        }
        assert!("heroku".parse::<ProviderKind>().is_err());
        assert_eq!(
            serde_json::to_string(&ProviderKind::ObjectStorage).unwrap(),
            "\"object-storage\""
        );
    }

    #[test]
    fn settings_register_every_provider() {
        let settings = DeploySettings {
            timeout_secs: Some(5),
            ..DeploySettings::default()
        };
        let deployments = Deployments::from_settings(&settings).unwrap();
        for kind in ProviderKind::ALL {
            assert_eq!(deployments.provider(kind).unwrap().kind(), kind);
        }
        assert!(http_client(None).is_ok());
    }

    #[tokio::test]
    async fn rollback_restores_previous_ready_deployment() {
        let deployments = Deployments::new().with_provider(Counter::new(DeployStatus::Ready));
        let bundle = CodeBundle::default();
        let first = deployments.deploy(&bundle, ProviderKind::ZipUpload, &config()).await.unwrap();
        let second = deployments.deploy(&bundle, ProviderKind::ZipUpload, &config()).await.unwrap();

        let restored = deployments.rollback(&second.id, ProviderKind::ZipUpload).await.unwrap();
        assert_eq!(restored.status, DeployStatus::Ready);
        assert_eq!(restored.url, first.url);
        assert_eq!(restored.rollback_of.as_deref(), Some(first.id.as_str()));
        assert_ne!(restored.id, first.id);
        assert_eq!(deployments.history(ProviderKind::ZipUpload).len(), 3);
    }

    #[tokio::test]
    async fn rollback_needs_two_deployments() {
        let deployments = Deployments::new().with_provider(Counter::new(DeployStatus::Ready));
        let only = deployments
            .deploy(&CodeBundle::default(), ProviderKind::ZipUpload, &config())
            .await
            .unwrap();
        let err = deployments.rollback(&only.id, ProviderKind::ZipUpload).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[tokio::test]
    async fn rollback_skips_failed_deployments() {
        let deployments = Deployments::new().with_provider(Counter::new(DeployStatus::Ready));
        let bundle = CodeBundle::default();
        let good = deployments.deploy(&bundle, ProviderKind::ZipUpload, &config()).await.unwrap();
        let bad = deployments.deploy(&bundle, ProviderKind::ZipUpload, &config()).await.unwrap();
        deployments
            .history
            .lock()
            .iter_mut()
            .filter(|r| r.id == bad.id)
            .for_each(|r| r.status = DeployStatus::Error);
        let latest = deployments.deploy(&bundle, ProviderKind::ZipUpload, &config()).await.unwrap();

        let restored = deployments.rollback(&latest.id, ProviderKind::ZipUpload).await.unwrap();
        assert_eq!(restored.rollback_of.as_deref(), Some(good.id.as_str()));
    }

    #[tokio::test]
    async fn status_settles_once_and_never_regresses() {
        let provider = Counter::new(DeployStatus::Building);
        let deployments = Deployments::new().with_provider(provider.clone());
        let record = deployments
            .deploy(&CodeBundle::default(), ProviderKind::ZipUpload, &config())
            .await
            .unwrap();
        assert_eq!(record.status, DeployStatus::Building);

        let report = deployments.check_status(&record.id, ProviderKind::ZipUpload).await.unwrap();
        assert_eq!(report.status, DeployStatus::Ready);
        assert_eq!(report.logs, ["build finished"]);

        let again = deployments.check_status(&record.id, ProviderKind::ZipUpload).await.unwrap();
        assert_eq!(again, report);
        assert_eq!(provider.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unknown_ids_and_providers_are_provider_errors() {
        let deployments = Deployments::new();
        let err = deployments
            .deploy(&CodeBundle::default(), ProviderKind::GitBuild, &config())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
        let err = deployments.check_status("nope", ProviderKind::GitBuild).await.unwrap_err();
        assert!(matches!(err, Error::Provider(_)));
    }

    #[test]
    fn https_url_normalization() {
        assert_eq!(https_url("todo.example.app").as_deref(), Some("https://todo.example.app"));
        assert_eq!(https_url("http://x.io").as_deref(), Some("http://x.io"));
        assert_eq!(https_url(" "), None);
    }
}
