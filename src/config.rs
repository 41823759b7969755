use crate::cli::CliArgs;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIN_REFRESH_MS: u64 = 500;

/// Effective runtime settings: file values overlaid by command-line flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub source: Option<PathBuf>,
    pub refresh_interval: Duration,
    pub list_timeout: Duration,
    pub lifecycle_timeout: Duration,
    pub probe_timeout: Duration,
    pub backend_url: Option<String>,
    pub state_file: PathBuf,
    pub extension_kubeconfig: PathBuf,
    pub staging_dir: PathBuf,
    pub vcluster_binary: Option<PathBuf>,
    pub kubectl_binary: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct SettingsFile {
    #[serde(default, alias = "refresh")]
    refresh_ms: Option<u64>,
    #[serde(default, alias = "list_timeout")]
    list_timeout_secs: Option<u64>,
    #[serde(default, alias = "lifecycle_timeout")]
    lifecycle_timeout_secs: Option<u64>,
    #[serde(default, alias = "probe_timeout")]
    probe_timeout_secs: Option<u64>,
    #[serde(default)]
    backend_url: Option<String>,
    #[serde(default)]
    state_file: Option<PathBuf>,
    #[serde(default, alias = "kubeconfig")]
    extension_kubeconfig: Option<PathBuf>,
    #[serde(default)]
    staging_dir: Option<PathBuf>,
    #[serde(default)]
    binaries: BinariesSpec,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct BinariesSpec {
    #[serde(default)]
    vcluster: Option<PathBuf>,
    #[serde(default)]
    kubectl: Option<PathBuf>,
}

impl Settings {
    pub fn load(args: &CliArgs) -> Result<Self> {
        let path = args.config.clone().or_else(discover_config_path);
        let file = match &path {
            Some(path) => read_settings_file(path)?,
            None => SettingsFile::default(),
        };
        Ok(Self::merge(path, file, args))
    }

    fn merge(source: Option<PathBuf>, file: SettingsFile, args: &CliArgs) -> Self {
        let data_dir = data_dir();
        let refresh_ms = args
            .refresh_ms
            .or(file.refresh_ms)
            .unwrap_or(5_000)
            .max(MIN_REFRESH_MS);
        let backend_url = args
            .backend_url
            .clone()
            .or(file.backend_url)
            .filter(|url| !url.trim().is_empty());

        Self {
            source,
            refresh_interval: Duration::from_millis(refresh_ms),
            list_timeout: Duration::from_secs(file.list_timeout_secs.unwrap_or(30).max(1)),
            lifecycle_timeout: Duration::from_secs(
                file.lifecycle_timeout_secs.unwrap_or(600).max(1),
            ),
            probe_timeout: Duration::from_secs(file.probe_timeout_secs.unwrap_or(2).max(1)),
            backend_url,
            state_file: file
                .state_file
                .unwrap_or_else(|| data_dir.join("state.json")),
            extension_kubeconfig: file
                .extension_kubeconfig
                .unwrap_or_else(|| data_dir.join("kubeconfig.yaml")),
            staging_dir: file.staging_dir.unwrap_or_else(|| data_dir.join("staging")),
            vcluster_binary: file.binaries.vcluster,
            kubectl_binary: file.binaries.kubectl,
        }
    }
}

fn read_settings_file(path: &Path) -> Result<SettingsFile> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings {}", path.display()))?;
    if raw.trim().is_empty() {
        return Ok(SettingsFile::default());
    }
    serde_yaml::from_str(&raw).with_context(|| format!("failed to parse settings {}", path.display()))
}

fn data_dir() -> PathBuf {
    match std::env::var("HOME") {
        Ok(home) if !home.trim().is_empty() => PathBuf::from(home).join(".config/vcluster-desk"),
        _ => PathBuf::from(".vcluster-desk"),
    }
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("VCLUSTER_DESK_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("vcluster-desk.yaml"),
        PathBuf::from("vcluster-desk.yml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/vcluster-desk/config.yaml"),
            PathBuf::from(&home).join(".config/vcluster-desk/config.yml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}
