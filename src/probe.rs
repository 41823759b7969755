use crate::bridge::{CommandBridge, Deadline, Target};
use crate::commands::{self, KUBECTL};
use crate::context::ContextTracker;
use crate::model::ConnectivityState;
use std::sync::Arc;
use tokio::time::Duration;
use tracing::{debug, warn};

/// Extra time granted on top of `--request-timeout` before the process is killed.
const PROBE_GRACE: Duration = Duration::from_secs(3);

#[derive(Clone)]
pub struct Prober {
    bridge: Arc<dyn CommandBridge>,
    tracker: ContextTracker,
    request_timeout: Duration,
}

impl Prober {
    pub fn new(
        bridge: Arc<dyn CommandBridge>,
        tracker: ContextTracker,
        request_timeout: Duration,
    ) -> Self {
        Self {
            bridge,
            tracker,
            request_timeout,
        }
    }

    fn request_timeout_arg(&self) -> String {
        format!("{}s", self.request_timeout.as_secs().max(1))
    }

    /// Checks `context` and, if it is still the active extension context, persists the
    /// result. Only a clean, stderr-free answer counts as reachable.
    pub async fn probe(&self, context: &str) -> ConnectivityState {
        let args = commands::cluster_info(context, &self.request_timeout_arg());
        let deadline = Deadline::Custom(self.request_timeout + PROBE_GRACE);
        let reachable = match self
            .bridge
            .execute(Target::Extension, KUBECTL, &args, deadline)
            .await
        {
            Ok(output) => match output.error_text() {
                Some(error) => {
                    debug!("[checkK8sConnection] {context}: {error}");
                    false
                }
                None => true,
            },
            Err(error) => {
                warn!("[checkK8sConnection] {context}: {error}");
                false
            }
        };

        if self.tracker.extension_context() == context {
            self.tracker.set_kubernetes_reachable(reachable);
        } else {
            debug!("discarding probe result for inactive context {context}");
        }
        ConnectivityState::from_reachable(reachable)
    }
}
