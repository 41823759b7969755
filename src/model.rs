use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// One row of `vcluster list --output json`. Field names follow the CLI verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VCluster {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub created: String,
    #[serde(default)]
    pub age_seconds: i64,
    #[serde(default)]
    pub status: String,
}

impl VCluster {
    pub fn is_paused(&self) -> bool {
        self.status.eq_ignore_ascii_case("paused")
    }

    /// Human age such as `2d3h`, computed from `Created` when it parses, otherwise from
    /// `AgeSeconds`.
    pub fn age(&self, now: DateTime<Local>) -> String {
        let elapsed = DateTime::parse_from_rfc3339(self.created.trim())
            .map(|created| now.timestamp() - created.timestamp())
            .unwrap_or(self.age_seconds);
        format_age(elapsed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub namespace: String,
    pub service_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KubeContext {
    pub name: String,
    pub cluster: String,
    pub user: String,
}

#[derive(Debug, Clone, Copy, Default, Eq, PartialEq)]
pub enum ConnectivityState {
    #[default]
    Unknown,
    Probing,
    Disconnected,
    Connected,
}

impl ConnectivityState {
    pub fn from_reachable(reachable: bool) -> Self {
        if reachable {
            Self::Connected
        } else {
            Self::Disconnected
        }
    }

    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Probing => "probing",
            Self::Disconnected => "unreachable",
            Self::Connected => "connected",
        }
    }
}

impl Display for ConnectivityState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything one data refresh produces; committed as a unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Extension context the lists were fetched for.
    pub extension_context: String,
    pub host_context: String,
    pub vclusters: Vec<VCluster>,
    pub namespaces: Vec<String>,
}

/// Days and hours once past a day, hours and minutes once past an hour, otherwise
/// minutes and seconds. Zero components are omitted.
pub fn format_age(seconds: i64) -> String {
    if seconds <= 0 {
        return String::new();
    }
    let days = seconds / 86_400;
    let hours = seconds % 86_400 / 3_600;
    let minutes = seconds % 3_600 / 60;
    let secs = seconds % 60;

    let mut out = String::new();
    if days > 0 {
        out.push_str(&format!("{days}d"));
    }
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if minutes > 0 && days == 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if secs > 0 && days == 0 && hours == 0 {
        out.push_str(&format!("{secs}s"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{ConnectivityState, VCluster, format_age};
    use chrono::{Duration, Local};

    #[test]
    fn format_age_drops_fine_units_for_old_clusters() {
        assert_eq!(format_age(0), "");
        assert_eq!(format_age(42), "42s");
        assert_eq!(format_age(3 * 60 + 5), "3m5s");
        assert_eq!(format_age(2 * 3_600 + 4 * 60 + 9), "2h4m");
        assert_eq!(format_age(86_400 + 3 * 3_600 + 59), "1d3h");
        assert_eq!(format_age(2 * 86_400), "2d");
    }

    #[test]
    fn age_prefers_created_timestamp() {
        let now = Local::now();
        let created = (now - Duration::seconds(125)).to_rfc3339();
        let cluster = VCluster {
            name: "demo".to_string(),
            created,
            age_seconds: 99_999,
            ..VCluster::default()
        };
        assert_eq!(cluster.age(now), "2m5s");
    }

    #[test]
    fn age_falls_back_to_age_seconds() {
        let cluster = VCluster {
            created: "not a timestamp".to_string(),
            age_seconds: 61,
            ..VCluster::default()
        };
        assert_eq!(cluster.age(Local::now()), "1m1s");
    }

    #[test]
    fn connectivity_from_flag() {
        assert_eq!(
            ConnectivityState::from_reachable(true),
            ConnectivityState::Connected
        );
        assert!(!ConnectivityState::from_reachable(false).is_connected());
        assert_eq!(ConnectivityState::default().label(), "unknown");
    }
}
