use crate::bridge::ExecOutput;
use crate::model::{KubeContext, ServiceRecord, VCluster};
use kube::config::NamedContext;
use tracing::debug;

/// Result of running and decoding one CLI call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliOutcome<T> {
    Ok(T),
    ParseError(String),
    ExecError(String),
}

impl<T> CliOutcome<T> {
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Ok(_) => None,
            Self::ParseError(error) | Self::ExecError(error) => Some(error),
        }
    }

    /// Strict counterpart of `into_lenient` for callers that must report failures.
    pub fn into_result(self, what: &str) -> anyhow::Result<T> {
        match self {
            Self::Ok(value) => Ok(value),
            Self::ParseError(error) => Err(anyhow::anyhow!("{what}: unparseable output: {error}")),
            Self::ExecError(error) => Err(anyhow::anyhow!("{what}: {error}")),
        }
    }
}

impl<T: Default> CliOutcome<T> {
    /// Failures collapse into an empty value; `what` labels the debug log line.
    pub fn into_lenient(self, what: &str) -> T {
        match self {
            Self::Ok(value) => value,
            Self::ParseError(error) => {
                debug!("[{what}] unparseable output: {error}");
                T::default()
            }
            Self::ExecError(error) => {
                debug!("[{what}] {error}");
                T::default()
            }
        }
    }
}

/// Applies the stderr contract before handing stdout to `parse`.
pub fn decode<T>(
    output: &ExecOutput,
    parse: impl FnOnce(&str) -> Result<T, String>,
) -> CliOutcome<T> {
    if let Some(error) = output.error_text() {
        return CliOutcome::ExecError(error.to_string());
    }
    match parse(&output.stdout) {
        Ok(value) => CliOutcome::Ok(value),
        Err(error) => CliOutcome::ParseError(error),
    }
}

/// `jsonpath='...'` output may arrive wrapped in the quotes it was requested with.
pub fn strip_jsonpath_quotes(raw: &str) -> &str {
    let trimmed = raw.trim();
    trimmed
        .strip_prefix('\'')
        .and_then(|inner| inner.strip_suffix('\''))
        .unwrap_or(trimmed)
}

pub fn parse_vclusters(stdout: &str) -> Result<Vec<VCluster>, String> {
    let body = stdout.trim();
    if body.is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str::<Option<Vec<VCluster>>>(body)
        .map(Option::unwrap_or_default)
        .map_err(|error| format!("vcluster list: {error}"))
}

/// Whitespace-separated rows with exactly `columns` tokens; anything else is dropped.
pub fn parse_columns(stdout: &str, columns: usize) -> Vec<Vec<String>> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.split_whitespace()
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .filter(|tokens| tokens.len() == columns)
        .collect()
}

pub fn parse_namespaces(stdout: &str) -> Result<Vec<String>, String> {
    Ok(stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn parse_node_port_services(stdout: &str) -> Result<Vec<ServiceRecord>, String> {
    Ok(parse_columns(stdout, 3)
        .into_iter()
        .filter_map(|row| {
            let [name, namespace, service_type]: [String; 3] = row.try_into().ok()?;
            (service_type == "NodePort").then_some(ServiceRecord {
                name,
                namespace,
                service_type,
            })
        })
        .collect())
}

pub fn parse_contexts(stdout: &str) -> Result<Vec<KubeContext>, String> {
    let body = strip_jsonpath_quotes(stdout);
    if body.is_empty() {
        return Ok(Vec::new());
    }
    let named = serde_json::from_str::<Option<Vec<NamedContext>>>(body)
        .map_err(|error| format!("kubectl contexts: {error}"))?
        .unwrap_or_default();

    Ok(named
        .into_iter()
        .map(|named| {
            let (cluster, user) = named
                .context
                .map(|ctx| (ctx.cluster, ctx.user.unwrap_or_default()))
                .unwrap_or_default();
            KubeContext {
                name: named.name,
                cluster,
                user,
            }
        })
        .collect())
}

pub fn parse_current_context(stdout: &str) -> Result<String, String> {
    Ok(strip_jsonpath_quotes(stdout).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strict_outcome_carries_label() {
        let failed: CliOutcome<Vec<String>> = CliOutcome::ExecError("forbidden".to_string());
        let error = failed.into_result("listNamespaces").expect_err("exec error");
        assert_eq!(error.to_string(), "listNamespaces: forbidden");
        assert_eq!(CliOutcome::Ok(3).into_result("n").expect("ok"), 3);
    }

    #[test]
    fn vcluster_list_preserves_count_and_fields() {
        let raw = r#"[
            {"Name":"demo","Namespace":"vcluster-demo","Created":"2024-03-01T10:00:00Z","AgeSeconds":120,"Status":"Running"},
            {"Name":"paused","Namespace":"team-b","Created":"2024-03-01T11:00:00Z","AgeSeconds":60,"Status":"Paused","Context":"extra"}
        ]"#;
        let clusters = parse_vclusters(raw).expect("valid json");
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].name, "demo");
        assert_eq!(clusters[0].namespace, "vcluster-demo");
        assert_eq!(clusters[0].created, "2024-03-01T10:00:00Z");
        assert_eq!(clusters[0].age_seconds, 120);
        assert_eq!(clusters[0].status, "Running");
        assert!(clusters[1].is_paused());
    }

    #[test]
    fn vcluster_list_round_trips_field_names() {
        let raw = r#"[{"Name":"a","Namespace":"b","Created":"c","AgeSeconds":1,"Status":"d"}]"#;
        let clusters = parse_vclusters(raw).expect("valid json");
        let encoded = serde_json::to_value(&clusters).expect("serializable");
        let expected: serde_json::Value = serde_json::from_str(raw).expect("valid json");
        assert_eq!(encoded, expected);
    }

    #[test]
    fn empty_or_null_vcluster_output_is_empty() {
        assert_eq!(parse_vclusters("").expect("empty"), Vec::new());
        assert_eq!(parse_vclusters("null").expect("null"), Vec::new());
        assert!(parse_vclusters("{not json").is_err());
    }

    #[test]
    fn namespaces_are_trimmed_and_blank_lines_dropped() {
        let parsed = parse_namespaces("default\n  foo  \n\n   \nkube-system\n").expect("ok");
        assert_eq!(parsed, vec!["default", "foo", "kube-system"]);
    }

    #[test]
    fn service_rows_need_three_tokens_and_node_port() {
        let raw = "\
            demo      vcluster-demo   NodePort\n\
            api       default         ClusterIP\n\
            broken    only-two\n\
            too many  tokens here     NodePort\n\
            \n\
            edge   ingress   NodePort   \n";
        let services = parse_node_port_services(raw).expect("ok");
        assert_eq!(
            services,
            vec![
                ServiceRecord {
                    name: "demo".to_string(),
                    namespace: "vcluster-demo".to_string(),
                    service_type: "NodePort".to_string(),
                },
                ServiceRecord {
                    name: "edge".to_string(),
                    namespace: "ingress".to_string(),
                    service_type: "NodePort".to_string(),
                },
            ]
        );
    }

    #[test]
    fn contexts_accept_quoted_jsonpath_output() {
        let raw = r#"'[{"name":"docker-desktop","context":{"cluster":"docker-desktop","user":"docker-desktop"}},{"name":"bare"}]'"#;
        let contexts = parse_contexts(raw).expect("valid json");
        assert_eq!(contexts.len(), 2);
        assert_eq!(contexts[0].name, "docker-desktop");
        assert_eq!(contexts[0].cluster, "docker-desktop");
        assert_eq!(contexts[0].user, "docker-desktop");
        assert_eq!(contexts[1].cluster, "");
    }

    #[test]
    fn current_context_strips_quotes() {
        assert_eq!(
            parse_current_context("'kind-dev'\n").expect("ok"),
            "kind-dev"
        );
        assert_eq!(parse_current_context("minikube").expect("ok"), "minikube");
    }

    #[test]
    fn decode_prefers_stderr_over_stdout() {
        let output = ExecOutput {
            stdout: "[]".to_string(),
            stderr: "connection refused".to_string(),
        };
        let outcome = decode(&output, parse_vclusters);
        assert_eq!(
            outcome,
            CliOutcome::ExecError("connection refused".to_string())
        );
        assert!(outcome.into_lenient("list").is_empty());
    }

    #[test]
    fn decode_reports_parse_errors() {
        let outcome = decode(&ExecOutput::ok("{"), parse_vclusters);
        assert!(matches!(outcome, CliOutcome::ParseError(_)));
        assert!(outcome.error().is_some());
    }
}
