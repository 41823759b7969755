use crate::backend::StagingBackend;
use crate::bridge::{CommandBridge, Deadline, Target};
use crate::commands::{self, CreateRequest, KUBECTL, VCLUSTER};
use crate::context::{ContextTracker, vcluster_context_name};
use crate::model::{KubeContext, ServiceRecord, VCluster};
use crate::parse::{self, CliOutcome};
use anyhow::{Context, Result};
use futures::future::join_all;
use kube::config::Kubeconfig;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Every vcluster and kubeconfig operation, parameterized by the active extension context.
#[derive(Clone)]
pub struct VclusterOps {
    bridge: Arc<dyn CommandBridge>,
    backend: Arc<dyn StagingBackend>,
    tracker: ContextTracker,
}

impl VclusterOps {
    pub fn new(
        bridge: Arc<dyn CommandBridge>,
        backend: Arc<dyn StagingBackend>,
        tracker: ContextTracker,
    ) -> Self {
        Self {
            bridge,
            backend,
            tracker,
        }
    }

    pub fn backend(&self) -> Arc<dyn StagingBackend> {
        self.backend.clone()
    }

    /// Runs a mutating command. `false` on any failure; the reason is logged.
    async fn run_action(
        &self,
        label: &str,
        target: Target,
        command: &str,
        args: Vec<String>,
    ) -> bool {
        match self
            .bridge
            .execute(target, command, &args, Deadline::Lifecycle)
            .await
        {
            Ok(output) => match output.error_text() {
                Some(error) => {
                    warn!("[{label}] {error}");
                    false
                }
                None => {
                    debug!("[{label}] {}", output.stdout.trim());
                    true
                }
            },
            Err(error) => {
                warn!("[{label}] {error}");
                false
            }
        }
    }

    pub async fn list_vclusters(&self, context: &str) -> Result<CliOutcome<Vec<VCluster>>> {
        let output = self
            .bridge
            .execute(
                Target::Extension,
                VCLUSTER,
                &commands::list_vclusters(context),
                Deadline::List,
            )
            .await?;
        Ok(parse::decode(&output, parse::parse_vclusters))
    }

    pub async fn list_namespaces(&self, context: &str) -> Result<CliOutcome<Vec<String>>> {
        let output = self
            .bridge
            .execute(
                Target::Extension,
                KUBECTL,
                &commands::list_namespaces(context),
                Deadline::List,
            )
            .await?;
        Ok(parse::decode(&output, parse::parse_namespaces))
    }

    pub async fn list_node_port_services(
        &self,
        context: &str,
    ) -> Result<CliOutcome<Vec<ServiceRecord>>> {
        let output = self
            .bridge
            .execute(
                Target::Extension,
                KUBECTL,
                &commands::list_services(context),
                Deadline::List,
            )
            .await?;
        Ok(parse::decode(&output, parse::parse_node_port_services))
    }

    pub async fn has_node_port_service(&self, name: &str, namespace: &str) -> Result<bool> {
        let context = self.tracker.extension_context();
        let services = self
            .list_node_port_services(&context)
            .await?
            .into_lenient("listServices");
        Ok(services
            .iter()
            .any(|svc| svc.name == name && svc.namespace == namespace))
    }

    /// Creates, or upgrades when `request.upgrade` is set. A values document is staged
    /// first; if staging fails the cluster is created without it.
    pub async fn create(&self, request: &CreateRequest) -> bool {
        let context = self.tracker.extension_context();
        let mut values_ref = None;
        if let Some(values) = request.values.as_deref().filter(|v| !v.trim().is_empty()) {
            match self.backend.store_values(values).await {
                Ok(reference) => values_ref = Some(reference),
                Err(error) => warn!("[createVCluster] failed to stage values: {error:#}"),
            }
        }

        let args = commands::create_vcluster(request, values_ref.as_deref(), &context);
        let label = if request.upgrade {
            "upgradeVCluster"
        } else {
            "createVCluster"
        };
        let created = self
            .run_action(label, Target::Extension, VCLUSTER, args)
            .await;
        if created {
            info!("{label}: {} ready in context {context}", request.name);
        }
        created
    }

    /// Deletes the vcluster, then drops the kubeconfig entries `connect` left behind.
    pub async fn delete(&self, name: &str, namespace: &str) -> bool {
        let context = self.tracker.extension_context();
        let deleted = self
            .run_action(
                "deleteVCluster",
                Target::Extension,
                VCLUSTER,
                commands::delete_vcluster(name, namespace, &context),
            )
            .await;
        if !deleted {
            return false;
        }

        // Entries are named after the context the delete ran under.
        let synthetic = vcluster_context_name(name, namespace, &context);
        self.unset_connect_entries(&synthetic).await;
        true
    }

    async fn unset_connect_entries(&self, synthetic: &str) {
        let unsets = ["users", "contexts", "clusters"].map(|kind| {
            let args = commands::unset_config_entry(kind, synthetic);
            async move {
                let result = self
                    .bridge
                    .execute(Target::Host, KUBECTL, &args, Deadline::List)
                    .await;
                (kind, result)
            }
        });

        for (kind, result) in join_all(unsets).await {
            match result {
                Ok(output) => {
                    if let Some(error) = output.error_text() {
                        debug!("[unset {kind}.{synthetic}] {error}");
                    }
                }
                Err(error) => debug!("[unset {kind}.{synthetic}] {error}"),
            }
        }
    }

    pub async fn pause(&self, name: &str, namespace: &str) -> bool {
        let context = self.tracker.extension_context();
        self.run_action(
            "pauseVCluster",
            Target::Extension,
            VCLUSTER,
            commands::pause_vcluster(name, namespace, &context),
        )
        .await
    }

    pub async fn resume(&self, name: &str, namespace: &str) -> bool {
        let context = self.tracker.extension_context();
        self.run_action(
            "resumeVCluster",
            Target::Extension,
            VCLUSTER,
            commands::resume_vcluster(name, namespace, &context),
        )
        .await
    }

    /// Without a NodePort service the vcluster is only reachable through a background
    /// proxy. The check runs on every call.
    pub async fn connect(&self, name: &str, namespace: &str) -> bool {
        let context = self.tracker.extension_context();
        let node_port = match self.has_node_port_service(name, namespace).await {
            Ok(found) => found,
            Err(error) => {
                warn!("[connectVCluster] service lookup failed: {error:#}");
                false
            }
        };
        self.run_action(
            "connectVCluster",
            Target::Host,
            VCLUSTER,
            commands::connect_vcluster(name, namespace, !node_port, &context),
        )
        .await
    }

    pub async fn disconnect(&self, namespace: &str) -> bool {
        let context = self.tracker.extension_context();
        self.run_action(
            "disconnectVCluster",
            Target::Host,
            VCLUSTER,
            commands::disconnect_vcluster(namespace, &context),
        )
        .await
    }

    pub async fn extension_contexts(&self) -> Result<CliOutcome<Vec<KubeContext>>> {
        let output = self
            .bridge
            .execute(
                Target::Extension,
                KUBECTL,
                &commands::view_contexts(),
                Deadline::List,
            )
            .await?;
        Ok(parse::decode(&output, parse::parse_contexts))
    }

    pub async fn current_extension_context(&self) -> Result<CliOutcome<String>> {
        self.current_context(Target::Extension).await
    }

    pub async fn current_host_context(&self) -> Result<CliOutcome<String>> {
        self.current_context(Target::Host).await
    }

    async fn current_context(&self, target: Target) -> Result<CliOutcome<String>> {
        let output = self
            .bridge
            .execute(
                target,
                KUBECTL,
                &commands::view_current_context(),
                Deadline::List,
            )
            .await?;
        Ok(parse::decode(&output, parse::parse_current_context))
    }

    /// Points the extension kubeconfig at `context`. Does not touch persisted state.
    pub async fn use_extension_context(&self, context: &str) -> bool {
        let output = self
            .bridge
            .execute(
                Target::Extension,
                KUBECTL,
                &commands::use_context(context),
                Deadline::List,
            )
            .await;
        match output {
            Ok(output) => match output.error_text() {
                Some(error) => {
                    warn!("[changeContext] {error}");
                    false
                }
                None => true,
            },
            Err(error) => {
                warn!("[changeContext] {error}");
                false
            }
        }
    }

    /// Copies the host kubeconfig into the extension's staging area. Returns the number
    /// of contexts it carried.
    pub async fn stage_host_kubeconfig(&self) -> Result<usize> {
        let output = self
            .bridge
            .execute(
                Target::Host,
                KUBECTL,
                &commands::view_raw_config(),
                Deadline::List,
            )
            .await?;
        if let Some(error) = output.error_text() {
            anyhow::bail!("kubectl config view failed: {error}");
        }

        let kubeconfig = Kubeconfig::from_yaml(&output.stdout)
            .context("host kubeconfig is not a valid kubeconfig")?;
        self.backend
            .store_kube_config(&output.stdout)
            .await
            .context("failed to stage host kubeconfig")?;
        Ok(kubeconfig.contexts.len())
    }
}
