use inkwell_core::network::{NetworkStatus, SyncTrigger};
use serde::Serialize;

use crate::app::App;
use crate::error::CliError;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct NetworkReport {
    pub online: bool,
    pub connection_type: &'static str,
    pub wifi_only: bool,
    pub automatic_sync_allowed: bool,
    pub manual_commit_allowed: bool,
}

pub const fn network_report(status: NetworkStatus, wifi_only: bool) -> NetworkReport {
    NetworkReport {
        online: status.online,
        connection_type: status.connection_type.as_str(),
        wifi_only,
        automatic_sync_allowed: status.allows(SyncTrigger::Automatic, wifi_only),
        manual_commit_allowed: status.allows(SyncTrigger::Manual, wifi_only),
    }
}

pub fn run_network(app: &App, as_json: bool) -> Result<(), CliError> {
    let report = network_report(app.network.status(), app.network.wifi_only());
    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.online {
        println!("Online ({})", report.connection_type);
    } else {
        println!("Offline");
    }
    println!(
        "Automatic sync: {}{}",
        if report.automatic_sync_allowed {
            "allowed"
        } else {
            "paused"
        },
        if report.wifi_only { " (WiFi only)" } else { "" }
    );
    println!(
        "Manual commit: {}",
        if report.manual_commit_allowed {
            "allowed"
        } else {
            "unavailable"
        }
    );
    Ok(())
}
