//! Argument vectors for every `vcluster` and `kubectl` invocation.

pub const VCLUSTER: &str = "vcluster";
pub const KUBECTL: &str = "kubectl";

/// Parameters of `vcluster create`, also used for upgrades.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRequest {
    pub name: String,
    pub namespace: Option<String>,
    pub distro: Option<String>,
    pub chart_version: Option<String>,
    pub values: Option<String>,
    pub upgrade: bool,
}

impl CreateRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Namespace used when the user leaves it blank: `vcluster-<name>`.
    pub fn default_namespace(name: &str) -> String {
        format!("vcluster-{}", name.to_lowercase())
    }

    pub fn with_default_namespace(mut self) -> Self {
        if non_empty(self.namespace.as_deref()).is_none() {
            self.namespace = Some(Self::default_namespace(&self.name));
        }
        self
    }
}

fn owned(args: &[&str]) -> Vec<String> {
    args.iter().map(|arg| arg.to_string()).collect()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

pub fn list_vclusters(context: &str) -> Vec<String> {
    owned(&["list", "--output", "json", "--context", context])
}

/// `values_ref` is the staged file reference, not the values themselves.
pub fn create_vcluster(
    request: &CreateRequest,
    values_ref: Option<&str>,
    context: &str,
) -> Vec<String> {
    let mut args = owned(&["create", &request.name]);
    if let Some(namespace) = non_empty(request.namespace.as_deref()) {
        args.extend(owned(&["--namespace", namespace]));
    }
    if !request.upgrade
        && let Some(distro) = non_empty(request.distro.as_deref())
    {
        args.extend(owned(&["--distro", distro]));
    }
    if let Some(version) = non_empty(request.chart_version.as_deref()) {
        args.extend(owned(&["--chart-version", version]));
    }
    if let Some(values_ref) = non_empty(values_ref) {
        args.extend(owned(&["--extra-values", values_ref]));
    }
    args.push("--connect=false".to_string());
    args.extend(owned(&["--context", context]));
    if request.upgrade {
        args.push("--upgrade".to_string());
    }
    args
}

pub fn delete_vcluster(name: &str, namespace: &str, context: &str) -> Vec<String> {
    owned(&["delete", name, "-n", namespace, "--context", context])
}

pub fn pause_vcluster(name: &str, namespace: &str, context: &str) -> Vec<String> {
    owned(&["pause", name, "-n", namespace, "--context", context])
}

pub fn resume_vcluster(name: &str, namespace: &str, context: &str) -> Vec<String> {
    owned(&["resume", name, "-n", namespace, "--context", context])
}

pub fn connect_vcluster(
    name: &str,
    namespace: &str,
    background_proxy: bool,
    context: &str,
) -> Vec<String> {
    let mut args = owned(&["connect", name, "-n", namespace]);
    if background_proxy {
        args.push("--background-proxy".to_string());
    }
    args.extend(owned(&["--context", context]));
    args
}

pub fn disconnect_vcluster(namespace: &str, context: &str) -> Vec<String> {
    owned(&["disconnect", "-n", namespace, "--context", context])
}

pub fn list_namespaces(context: &str) -> Vec<String> {
    owned(&[
        "get",
        "namespaces",
        "--no-headers",
        "-o",
        "custom-columns=:metadata.name",
        "--context",
        context,
    ])
}

pub fn list_services(context: &str) -> Vec<String> {
    owned(&[
        "get",
        "services",
        "-A",
        "--no-headers",
        "-o",
        "custom-columns=:metadata.name,:metadata.namespace,:spec.type",
        "--context",
        context,
    ])
}

pub fn view_raw_config() -> Vec<String> {
    owned(&["config", "view", "--raw"])
}

pub fn view_contexts() -> Vec<String> {
    owned(&["config", "view", "-o", "jsonpath={.contexts}"])
}

pub fn view_current_context() -> Vec<String> {
    owned(&["config", "view", "-o", "jsonpath={.current-context}"])
}

pub fn use_context(context: &str) -> Vec<String> {
    owned(&["config", "use-context", context])
}

/// `kind` is one of `users`, `contexts`, `clusters`.
pub fn unset_config_entry(kind: &str, name: &str) -> Vec<String> {
    vec!["config".to_string(), "unset".to_string(), format!("{kind}.{name}")]
}

pub fn cluster_info(context: &str, request_timeout: &str) -> Vec<String> {
    owned(&[
        "cluster-info",
        "--request-timeout",
        request_timeout,
        "--context",
        context,
    ])
}
