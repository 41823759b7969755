use crate::model::KubeContext;
use crate::store::StateStore;
use std::sync::Arc;
use tracing::warn;

pub const EXTENSION_CONTEXT_KEY: &str = "extension-context";
pub const KUBERNETES_REACHABLE_KEY: &str = "kubernetes-reachable";
pub const DEFAULT_EXTENSION_CONTEXT: &str = "docker-desktop";

const SYNTHETIC_PREFIX: &str = "vcluster_";

/// Name `vcluster connect` gives the kubeconfig entries it creates.
pub fn vcluster_context_name(name: &str, namespace: &str, parent_context: &str) -> String {
    format!("{SYNTHETIC_PREFIX}{name}_{namespace}_{parent_context}")
}

/// True for contexts written by `vcluster connect` whose parent context is still known.
pub fn is_synthetic_context<'a, I>(candidate: &str, known: I) -> bool
where
    I: IntoIterator<Item = &'a str>,
{
    let segments = candidate.split('_').collect::<Vec<_>>();
    if segments.len() < 4 || !candidate.starts_with(SYNTHETIC_PREFIX) {
        return false;
    }
    let parent = segments[3..].join("_");
    known.into_iter().any(|name| name == parent)
}

/// Context names worth offering in a context picker.
pub fn user_facing_contexts(contexts: &[KubeContext]) -> Vec<String> {
    contexts
        .iter()
        .filter(|ctx| {
            !is_synthetic_context(&ctx.name, contexts.iter().map(|known| known.name.as_str()))
        })
        .map(|ctx| ctx.name.clone())
        .collect()
}

/// Reads and writes the persisted extension context and connectivity flag.
///
/// Every accessor goes back to the store, so long-lived timers always observe the
/// latest value instead of whatever was current when they were started.
#[derive(Clone)]
pub struct ContextTracker {
    store: Arc<dyn StateStore>,
}

impl ContextTracker {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    pub fn extension_context(&self) -> String {
        self.store
            .get(EXTENSION_CONTEXT_KEY)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| DEFAULT_EXTENSION_CONTEXT.to_string())
    }

    pub fn set_extension_context(&self, context: &str) {
        if let Err(error) = self.store.set(EXTENSION_CONTEXT_KEY, context) {
            warn!("failed to persist extension context '{context}': {error:#}");
        }
    }

    pub fn kubernetes_reachable(&self) -> bool {
        self.store
            .get(KUBERNETES_REACHABLE_KEY)
            .is_some_and(|value| value.trim() == "true")
    }

    pub fn set_kubernetes_reachable(&self, reachable: bool) {
        let value = if reachable { "true" } else { "false" };
        if let Err(error) = self.store.set(KUBERNETES_REACHABLE_KEY, value) {
            warn!("failed to persist connectivity flag: {error:#}");
        }
    }
}
