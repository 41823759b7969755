use crate::backend::StagingBackend;
use crate::bridge::CommandBridge;
use crate::context::ContextTracker;
use crate::model::{ConnectivityState, Snapshot, VCluster};
use crate::probe::Prober;
use crate::store::StateStore;
use crate::vcluster::VclusterOps;
use anyhow::Result;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info, warn};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// What the interactive surface shows. Only ever mutated through the `apply_*` methods.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UiState {
    pub extension_context: String,
    pub host_context: String,
    /// `None` until the first successful refresh for the current context.
    pub vclusters: Option<Vec<VCluster>>,
    pub namespaces: Vec<String>,
    pub connectivity: ConnectivityState,
}

impl UiState {
    pub fn new(extension_context: String) -> Self {
        Self {
            extension_context,
            ..Self::default()
        }
    }

    /// Commits a whole refresh, or on failure clears only the host context label.
    /// Snapshots taken for another extension context are dropped.
    pub fn apply_refresh(&mut self, result: Result<Option<Snapshot>>) {
        match result {
            Ok(Some(snapshot)) => {
                if snapshot.extension_context != self.extension_context {
                    debug!(
                        "dropping refresh for {} (active: {})",
                        snapshot.extension_context, self.extension_context
                    );
                    return;
                }
                self.host_context = snapshot.host_context;
                self.vclusters = Some(snapshot.vclusters);
                self.namespaces = snapshot.namespaces;
            }
            Ok(None) => {}
            Err(error) => {
                warn!("refresh failed: {error:#}");
                self.host_context.clear();
            }
        }
    }

    pub fn apply_connectivity(&mut self, context: &str, state: ConnectivityState) {
        if context == self.extension_context {
            self.connectivity = state;
        }
    }

    /// Forgets everything fetched for the previous context.
    pub fn switch_to(&mut self, extension_context: &str) {
        self.extension_context = extension_context.to_string();
        self.host_context.clear();
        self.vclusters = None;
        self.namespaces.clear();
        self.connectivity = ConnectivityState::Probing;
    }
}

#[derive(Debug)]
pub struct SwitchOutcome {
    pub context: String,
    pub connectivity: ConnectivityState,
    pub refresh: Result<Option<Snapshot>>,
}

#[derive(Clone)]
pub struct Orchestrator {
    ops: VclusterOps,
    prober: Prober,
    tracker: ContextTracker,
}

impl Orchestrator {
    pub fn new(
        bridge: Arc<dyn CommandBridge>,
        backend: Arc<dyn StagingBackend>,
        store: Arc<dyn StateStore>,
        probe_timeout: Duration,
    ) -> Self {
        let tracker = ContextTracker::new(store);
        let ops = VclusterOps::new(bridge.clone(), backend, tracker.clone());
        let prober = Prober::new(bridge, tracker.clone(), probe_timeout);
        Self {
            ops,
            prober,
            tracker,
        }
    }

    pub fn ops(&self) -> &VclusterOps {
        &self.ops
    }

    pub fn tracker(&self) -> &ContextTracker {
        &self.tracker
    }

    /// Copies the host kubeconfig to where extension-side commands read it. Best effort:
    /// a failure is logged and the previous copy, if any, stays in place.
    pub async fn stage_kubeconfig(&self) {
        match self.ops.stage_host_kubeconfig().await {
            Ok(contexts) => debug!("staged host kubeconfig with {contexts} context(s)"),
            Err(error) => warn!("[listHostContexts] {error:#}"),
        }
    }

    /// Re-stages the host kubeconfig and probes the active context.
    pub async fn refresh_connectivity(&self) -> (String, ConnectivityState) {
        self.stage_kubeconfig().await;
        let context = self.tracker.extension_context();
        let state = self.prober.probe(&context).await;
        (context, state)
    }

    /// Fetches host context, vclusters and namespaces together. Returns `Ok(None)` without
    /// running anything while the cluster is marked unreachable; any bridge failure fails
    /// the whole cycle.
    pub async fn refresh_data(&self) -> Result<Option<Snapshot>> {
        if !self.tracker.kubernetes_reachable() {
            debug!("skipping data refresh: kubernetes unreachable");
            return Ok(None);
        }

        let context = self.tracker.extension_context();
        let (host_context, vclusters, namespaces) = tokio::try_join!(
            self.ops.current_host_context(),
            self.ops.list_vclusters(&context),
            self.ops.list_namespaces(&context),
        )?;

        Ok(Some(Snapshot {
            extension_context: context,
            host_context: host_context.into_lenient("getCurrentHostContext"),
            vclusters: vclusters.into_lenient("listVClusters"),
            namespaces: namespaces.into_lenient("listNamespaces"),
        }))
    }

    /// Switches the extension context. The flag is cleared before the new context is
    /// persisted so concurrent ticks stay idle until the probe below has answered.
    pub async fn switch_context(&self, context: &str) -> Result<SwitchOutcome> {
        if !self.ops.use_extension_context(context).await {
            anyhow::bail!("kubectl config use-context {context} failed");
        }

        self.tracker.set_kubernetes_reachable(false);
        self.tracker.set_extension_context(context);
        info!("extension context switched to {context}");

        let connectivity = self.prober.probe(context).await;
        let refresh = if connectivity.is_connected() {
            self.refresh_data().await
        } else {
            Ok(None)
        };

        Ok(SwitchOutcome {
            context: context.to_string(),
            connectivity,
            refresh,
        })
    }

    /// One-off view of both kubeconfigs, connectivity and, when reachable, list sizes.
    pub async fn status(&self) -> Result<StatusReport> {
        let (extension_context, connectivity) = self.refresh_connectivity().await;
        let (kubeconfig_context, host_context) = tokio::try_join!(
            self.ops.current_extension_context(),
            self.ops.current_host_context(),
        )?;
        let snapshot = self.refresh_data().await?;

        Ok(StatusReport {
            extension_context,
            kubeconfig_context: kubeconfig_context.into_lenient("getCurrentExtensionContext"),
            host_context: host_context.into_lenient("getCurrentHostContext"),
            connectivity,
            snapshot,
        })
    }
}

#[derive(Debug)]
pub struct StatusReport {
    /// The context every extension-side command targets.
    pub extension_context: String,
    /// `current-context` of the staged extension kubeconfig.
    pub kubeconfig_context: String,
    pub host_context: String,
    pub connectivity: ConnectivityState,
    pub snapshot: Option<Snapshot>,
}

#[derive(Debug)]
pub enum PollEvent {
    Connectivity {
        context: String,
        state: ConnectivityState,
    },
    Data(Result<Option<Snapshot>>),
}

/// Two repeating refresh tasks feeding a channel. Results produced after `shutdown`
/// are never delivered.
pub struct Poller {
    alive: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Poller {
    pub fn start(
        orchestrator: Orchestrator,
        period: Duration,
        tx: mpsc::UnboundedSender<PollEvent>,
    ) -> Self {
        let alive = Arc::new(AtomicBool::new(true));

        let connectivity_task = {
            let orchestrator = orchestrator.clone();
            let alive = alive.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let (context, state) = orchestrator.refresh_connectivity().await;
                    if !alive.load(Ordering::SeqCst)
                        || tx.send(PollEvent::Connectivity { context, state }).is_err()
                    {
                        break;
                    }
                }
            })
        };

        let data_task = {
            let alive = alive.clone();
            tokio::spawn(async move {
                let mut ticker = interval(period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
                loop {
                    ticker.tick().await;
                    let result = orchestrator.refresh_data().await;
                    if !alive.load(Ordering::SeqCst) || tx.send(PollEvent::Data(result)).is_err()
                    {
                        break;
                    }
                }
            })
        };

        Self {
            alive,
            tasks: vec![connectivity_task, data_task],
        }
    }

    pub fn shutdown(&mut self) {
        self.alive.store(false, Ordering::SeqCst);
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
