use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command as TokioCommand;
use tokio::time::{Duration, timeout};
use tracing::debug;

/// Where a command runs. `Extension` commands see the staged extension kubeconfig,
/// `Host` commands see the user's own kubeconfig and environment.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Target {
    Extension,
    Host,
}

impl Target {
    pub fn label(self) -> &'static str {
        match self {
            Self::Extension => "extension",
            Self::Host => "host",
        }
    }
}

#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    #[cfg(test)]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    #[cfg(test)]
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// The CLI contract: anything on stderr means the call failed.
    pub fn error_text(&self) -> Option<&str> {
        let trimmed = self.stderr.trim();
        (!trimmed.is_empty()).then_some(trimmed)
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to spawn {command} on {target}: {source}")]
    Spawn {
        command: String,
        target: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{command} {args} on {target} timed out after {after:?}")]
    Timeout {
        command: String,
        args: String,
        target: &'static str,
        after: Duration,
    },
}

/// How long a single invocation may take.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Deadline {
    List,
    Lifecycle,
    Custom(Duration),
}

#[async_trait]
pub trait CommandBridge: Send + Sync {
    async fn execute(
        &self,
        target: Target,
        command: &str,
        args: &[String],
        deadline: Deadline,
    ) -> Result<ExecOutput, BridgeError>;
}

#[derive(Debug, Clone)]
pub struct ProcessBridge {
    extension_kubeconfig: PathBuf,
    binaries: HashMap<String, PathBuf>,
    list_timeout: Duration,
    lifecycle_timeout: Duration,
}

impl ProcessBridge {
    pub fn new(
        extension_kubeconfig: PathBuf,
        list_timeout: Duration,
        lifecycle_timeout: Duration,
    ) -> Self {
        Self {
            extension_kubeconfig,
            binaries: HashMap::new(),
            list_timeout,
            lifecycle_timeout,
        }
    }

    pub fn with_binary(mut self, command: &str, path: Option<PathBuf>) -> Self {
        if let Some(path) = path {
            self.binaries.insert(command.to_string(), path);
        }
        self
    }

    fn resolve(&self, command: &str) -> PathBuf {
        self.binaries
            .get(command)
            .cloned()
            .unwrap_or_else(|| PathBuf::from(command))
    }

    fn limit(&self, deadline: Deadline) -> Duration {
        match deadline {
            Deadline::List => self.list_timeout,
            Deadline::Lifecycle => self.lifecycle_timeout,
            Deadline::Custom(limit) => limit,
        }
    }
}

#[async_trait]
impl CommandBridge for ProcessBridge {
    async fn execute(
        &self,
        target: Target,
        command: &str,
        args: &[String],
        deadline: Deadline,
    ) -> Result<ExecOutput, BridgeError> {
        debug!("exec[{}] {command} {}", target.label(), args.join(" "));

        let mut cmd = TokioCommand::new(self.resolve(command));
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if target == Target::Extension {
            cmd.env("KUBECONFIG", &self.extension_kubeconfig);
        }

        let limit = self.limit(deadline);
        let output = match timeout(limit, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(BridgeError::Spawn {
                    command: command.to_string(),
                    target: target.label(),
                    source,
                });
            }
            Err(_) => {
                return Err(BridgeError::Timeout {
                    command: command.to_string(),
                    args: args.join(" "),
                    target: target.label(),
                    after: limit,
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let mut stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if !output.status.success() && stderr.trim().is_empty() {
            stderr = format!("{command} exited with {}", output.status);
        }

        Ok(ExecOutput { stdout, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::{CommandBridge, Deadline, ExecOutput, ProcessBridge, Target};
    use std::path::PathBuf;
    use tokio::time::Duration;

    fn bridge() -> ProcessBridge {
        ProcessBridge::new(
            PathBuf::from("/nonexistent/kubeconfig"),
            Duration::from_secs(5),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn error_text_ignores_whitespace_only_stderr() {
        assert_eq!(ExecOutput::failed("  \n").error_text(), None);
        assert_eq!(ExecOutput::failed(" boom \n").error_text(), Some("boom"));
        assert_eq!(ExecOutput::ok("fine").error_text(), None);
    }

    #[test]
    fn binary_overrides_resolve() {
        let bridge = bridge().with_binary("vcluster", Some(PathBuf::from("/opt/bin/vcluster")));
        assert_eq!(bridge.resolve("vcluster"), PathBuf::from("/opt/bin/vcluster"));
        assert_eq!(bridge.resolve("kubectl"), PathBuf::from("kubectl"));
    }

    #[tokio::test]
    async fn missing_binary_is_a_spawn_error() {
        let result = bridge()
            .execute(
                Target::Host,
                "definitely-not-a-real-binary-vcluster-desk",
                &[],
                Deadline::List,
            )
            .await;
        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn slow_command_times_out() {
        let result = bridge()
            .execute(
                Target::Host,
                "sleep",
                &["5".to_string()],
                Deadline::Custom(Duration::from_millis(50)),
            )
            .await;
        assert!(matches!(result, Err(super::BridgeError::Timeout { .. })));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_without_stderr_is_reported() {
        let output = bridge()
            .execute(Target::Host, "false", &[], Deadline::List)
            .await
            .expect("false should spawn");
        assert!(output.error_text().is_some());
    }
}
