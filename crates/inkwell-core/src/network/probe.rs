//! OS connectivity probe: a TCP reachability check plus interface type
//! detection from `/sys/class/net`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use super::{ConnectionType, ConnectivityProbe, NetworkStatus};

const DEFAULT_TARGETS: [&str; 2] = ["1.1.1.1:443", "8.8.8.8:53"];
const SYS_CLASS_NET: &str = "/sys/class/net";

pub struct SystemProbe {
    targets: Vec<String>,
    timeout: Duration,
    interfaces_root: PathBuf,
}

impl Default for SystemProbe {
    fn default() -> Self {
        Self::new(
            DEFAULT_TARGETS.iter().map(ToString::to_string).collect(),
            Duration::from_secs(3),
        )
    }
}

impl SystemProbe {
    pub fn new(targets: Vec<String>, timeout: Duration) -> Self {
        Self {
            targets,
            timeout,
            interfaces_root: PathBuf::from(SYS_CLASS_NET),
        }
    }

    #[must_use]
    pub fn with_interfaces_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.interfaces_root = root.into();
        self
    }

    async fn reachable(&self) -> bool {
        for target in &self.targets {
            match tokio::time::timeout(self.timeout, TcpStream::connect(target.as_str())).await {
                Ok(Ok(_)) => return true,
                Ok(Err(error)) => tracing::debug!("Probe {} failed: {}", target, error),
                Err(_) => tracing::debug!("Probe {} timed out", target),
            }
        }
        false
    }
}

#[async_trait]
impl ConnectivityProbe for SystemProbe {
    async fn probe(&self) -> NetworkStatus {
        if !self.reachable().await {
            return NetworkStatus::offline();
        }
        let root = self.interfaces_root.clone();
        let connection_type = tokio::task::spawn_blocking(move || classify_interfaces(&root))
            .await
            .unwrap_or(ConnectionType::Unknown);
        NetworkStatus::online(connection_type)
    }
}

/// Classify the active link from a sysfs-style interface directory.
///
/// Ethernet wins over WiFi, WiFi over cellular. Loopback and interfaces whose
/// `operstate` is not `up` are ignored.
pub fn classify_interfaces(root: &Path) -> ConnectionType {
    let Ok(entries) = std::fs::read_dir(root) else {
        return ConnectionType::Unknown;
    };

    let mut best = ConnectionType::Unknown;
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name == "lo" {
            continue;
        }
        let path = entry.path();
        let state = std::fs::read_to_string(path.join("operstate")).unwrap_or_default();
        if state.trim() != "up" {
            continue;
        }

        let kind = if path.join("wireless").exists() || path.join("phy80211").exists() {
            ConnectionType::Wifi
        } else if name.starts_with("ww") || name.starts_with("rmnet") {
            ConnectionType::Cellular
        } else if name.starts_with("en") || name.starts_with("eth") {
            ConnectionType::Ethernet
        } else {
            ConnectionType::Unknown
        };
        if rank(kind) > rank(best) {
            best = kind;
        }
    }
    best
}

const fn rank(kind: ConnectionType) -> u8 {
    match kind {
        ConnectionType::Unknown => 0,
        ConnectionType::Cellular => 1,
        ConnectionType::Wifi => 2,
        ConnectionType::Ethernet => 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::net::TcpListener;

    fn interface(root: &Path, name: &str, state: &str, wireless: bool) {
        let dir = root.join(name);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("operstate"), format!("{state}\n")).unwrap();
        if wireless {
            std::fs::create_dir_all(dir.join("wireless")).unwrap();
        }
    }

    #[test]
    fn classifies_wifi_and_ignores_down_links() {
        let tmp = tempdir().unwrap();
        interface(tmp.path(), "lo", "unknown", false);
        interface(tmp.path(), "wlp2s0", "up", true);
        interface(tmp.path(), "enp3s0", "down", false);

        assert_eq!(classify_interfaces(tmp.path()), ConnectionType::Wifi);
    }

    #[test]
    fn prefers_ethernet_over_wifi() {
        let tmp = tempdir().unwrap();
        interface(tmp.path(), "wlan0", "up", true);
        interface(tmp.path(), "eth0", "up", false);
        interface(tmp.path(), "wwan0", "up", false);

        assert_eq!(classify_interfaces(tmp.path()), ConnectionType::Ethernet);
    }

    #[test]
    fn missing_root_is_unknown() {
        let tmp = tempdir().unwrap();
        assert_eq!(
            classify_interfaces(&tmp.path().join("absent")),
            ConnectionType::Unknown
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn probe_reports_online_when_a_target_accepts() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let tmp = tempdir().unwrap();
        interface(tmp.path(), "wwan0", "up", false);

        let probe = SystemProbe::new(vec![address], Duration::from_secs(1))
            .with_interfaces_root(tmp.path());
        let status = probe.probe().await;

        assert_eq!(status, NetworkStatus::online(ConnectionType::Cellular));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn probe_reports_offline_when_nothing_answers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let probe = SystemProbe::new(vec![address], Duration::from_millis(200));
        assert_eq!(probe.probe().await, NetworkStatus::offline());
    }
}
