use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

/// File staging for values files and kubeconfigs consumed by extension-side commands.
#[async_trait]
pub trait StagingBackend: Send + Sync {
    /// Stores a values document and returns a reference usable as `--extra-values`.
    async fn store_values(&self, values: &str) -> Result<String>;
    async fn store_kube_config(&self, kubeconfig: &str) -> Result<()>;
    async fn hello(&self) -> Result<String>;
}

#[derive(Debug, Serialize)]
struct Payload<'a> {
    data: &'a str,
}

/// Talks to the extension backend service over HTTP.
///
/// The CLIs run on this machine, so every staged file must also be readable here. The
/// kubeconfig is always written to the local extension path before it is posted, and a
/// values reference the backend returns is only used when it resolves locally (a shared
/// staging directory). Otherwise the values are staged through `local`.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    local: LocalBackend,
}

impl HttpBackend {
    pub fn new(base_url: &str, request_timeout: Duration, local: LocalBackend) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build backend HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            local,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_values(&self, values: &str) -> Result<String> {
        let response = self
            .client
            .post(self.url("/store-values"))
            .json(&Payload { data: values })
            .send()
            .await
            .context("store-values request failed")?
            .error_for_status()
            .context("store-values rejected")?;
        let body = response
            .text()
            .await
            .context("failed to read store-values response")?;
        // The service answers with a JSON string; tolerate a bare path too.
        let reference =
            serde_json::from_str::<String>(&body).unwrap_or_else(|_| body.trim().to_string());
        anyhow::ensure!(
            !reference.is_empty(),
            "store-values returned an empty reference"
        );
        Ok(reference)
    }

    async fn post_kube_config(&self, kubeconfig: &str) -> Result<()> {
        self.client
            .post(self.url("/store-kube-config"))
            .json(&Payload { data: kubeconfig })
            .send()
            .await
            .context("store-kube-config request failed")?
            .error_for_status()
            .context("store-kube-config rejected")?;
        Ok(())
    }
}

#[async_trait]
impl StagingBackend for HttpBackend {
    async fn store_values(&self, values: &str) -> Result<String> {
        match self.post_values(values).await {
            Ok(reference) if tokio::fs::try_exists(&reference).await.unwrap_or(false) => {
                Ok(reference)
            }
            Ok(reference) => {
                warn!("backend values file {reference} is not visible locally, staging here");
                self.local.store_values(values).await
            }
            Err(error) => {
                warn!("{error:#}, staging values locally");
                self.local.store_values(values).await
            }
        }
    }

    async fn store_kube_config(&self, kubeconfig: &str) -> Result<()> {
        self.local.store_kube_config(kubeconfig).await?;
        if let Err(error) = self.post_kube_config(kubeconfig).await {
            warn!("{error:#}");
        }
        Ok(())
    }

    async fn hello(&self) -> Result<String> {
        self.client
            .get(self.url("/hello"))
            .send()
            .await
            .context("hello request failed")?
            .error_for_status()
            .context("hello rejected")?
            .text()
            .await
            .context("failed to read hello response")
    }
}

const LETTERS: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn random_letters(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| LETTERS[rng.gen_range(0..LETTERS.len())] as char)
        .collect()
}

/// Stages files on the local disk when no backend service is configured.
#[derive(Debug, Clone)]
pub struct LocalBackend {
    staging_dir: PathBuf,
    kubeconfig_path: PathBuf,
}

impl LocalBackend {
    pub fn new(staging_dir: PathBuf, kubeconfig_path: PathBuf) -> Self {
        Self {
            staging_dir,
            kubeconfig_path,
        }
    }
}

#[async_trait]
impl StagingBackend for LocalBackend {
    async fn store_values(&self, values: &str) -> Result<String> {
        tokio::fs::create_dir_all(&self.staging_dir)
            .await
            .with_context(|| format!("failed to create {}", self.staging_dir.display()))?;
        let path = self.staging_dir.join(random_letters(10));
        tokio::fs::write(&path, values)
            .await
            .with_context(|| format!("failed to write values file {}", path.display()))?;
        debug!("staged values file {}", path.display());
        Ok(path.display().to_string())
    }

    async fn store_kube_config(&self, kubeconfig: &str) -> Result<()> {
        if let Some(parent) = self.kubeconfig_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&self.kubeconfig_path, kubeconfig)
            .await
            .with_context(|| {
                format!(
                    "failed to write extension kubeconfig {}",
                    self.kubeconfig_path.display()
                )
            })
    }

    async fn hello(&self) -> Result<String> {
        Ok(format!("hello from {}", self.staging_dir.display()))
    }
}
