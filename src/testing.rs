//! Recording doubles for the bridge and staging seams.

use crate::backend::StagingBackend;
use crate::bridge::{BridgeError, CommandBridge, Deadline, ExecOutput, Target};
use async_trait::async_trait;
use std::sync::Mutex;
use tokio::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub target: Target,
    pub command: String,
    pub args: Vec<String>,
}

impl RecordedCall {
    pub fn line(&self) -> String {
        format!("{} {}", self.command, self.args.join(" "))
    }
}

enum Reply {
    Output(ExecOutput),
    Timeout,
}

struct Rule {
    command: String,
    prefix: Vec<String>,
    reply: Reply,
}

/// Replies by longest matching `command + leading args` rule; unmatched calls succeed
/// with empty output.
#[derive(Default)]
pub struct MockBridge {
    rules: Mutex<Vec<Rule>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockBridge {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, command: &str, prefix: &[&str], reply: Reply) {
        if let Ok(mut rules) = self.rules.lock() {
            rules.push(Rule {
                command: command.to_string(),
                prefix: prefix.iter().map(|arg| arg.to_string()).collect(),
                reply,
            });
        }
    }

    pub fn respond(&self, command: &str, prefix: &[&str], stdout: &str) {
        self.push(command, prefix, Reply::Output(ExecOutput::ok(stdout)));
    }

    pub fn fail(&self, command: &str, prefix: &[&str], stderr: &str) {
        self.push(command, prefix, Reply::Output(ExecOutput::failed(stderr)));
    }

    pub fn time_out(&self, command: &str, prefix: &[&str]) {
        self.push(command, prefix, Reply::Timeout);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.calls().iter().map(RecordedCall::line).collect()
    }

    pub fn count_matching(&self, needle: &str) -> usize {
        self.lines()
            .iter()
            .filter(|line| line.contains(needle))
            .count()
    }
}

#[async_trait]
impl CommandBridge for MockBridge {
    async fn execute(
        &self,
        target: Target,
        command: &str,
        args: &[String],
        _deadline: Deadline,
    ) -> Result<ExecOutput, BridgeError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                target,
                command: command.to_string(),
                args: args.to_vec(),
            });
        }

        let rules = self
            .rules
            .lock()
            .map_err(|_| BridgeError::Timeout {
                command: command.to_string(),
                args: args.join(" "),
                target: target.label(),
                after: Duration::ZERO,
            })?;
        let best = rules
            .iter()
            .filter(|rule| rule.command == command && args.starts_with(&rule.prefix))
            .max_by_key(|rule| rule.prefix.len());

        match best.map(|rule| &rule.reply) {
            Some(Reply::Output(output)) => Ok(output.clone()),
            Some(Reply::Timeout) => Err(BridgeError::Timeout {
                command: command.to_string(),
                args: args.join(" "),
                target: target.label(),
                after: Duration::from_secs(1),
            }),
            None => Ok(ExecOutput::default()),
        }
    }
}

#[derive(Default)]
pub struct MockBackend {
    pub reject_values: bool,
    stored_values: Mutex<Vec<String>>,
    stored_kubeconfigs: Mutex<Vec<String>>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rejecting_values() -> Self {
        Self {
            reject_values: true,
            ..Self::default()
        }
    }

    pub fn stored_values(&self) -> Vec<String> {
        self.stored_values
            .lock()
            .map(|values| values.clone())
            .unwrap_or_default()
    }

    pub fn stored_kubeconfigs(&self) -> Vec<String> {
        self.stored_kubeconfigs
            .lock()
            .map(|values| values.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StagingBackend for MockBackend {
    async fn store_values(&self, values: &str) -> anyhow::Result<String> {
        anyhow::ensure!(!self.reject_values, "backend unavailable");
        let mut stored = self
            .stored_values
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?;
        stored.push(values.to_string());
        Ok(format!("/tmp/values-{}", stored.len()))
    }

    async fn store_kube_config(&self, kubeconfig: &str) -> anyhow::Result<()> {
        self.stored_kubeconfigs
            .lock()
            .map_err(|_| anyhow::anyhow!("poisoned"))?
            .push(kubeconfig.to_string());
        Ok(())
    }

    async fn hello(&self) -> anyhow::Result<String> {
        Ok("hello".to_string())
    }
}
