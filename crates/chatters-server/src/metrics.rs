//! Prometheus exposition for `/metrics`, plus every metric name the server
//! records.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::info;

/// Install the process-wide recorder. Only the first call can succeed.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    info!("prometheus recorder installed");
    Ok(handle)
}

/// Text exposition format of everything recorded so far.
pub fn render(handle: &PrometheusHandle) -> String {
    handle.render()
}

/// Counter: sessions that completed the upgrade and registered.
pub const WS_CONNECTIONS_TOTAL: &str = "chatters_ws_connections_total";
/// Counter, `reason` label: sessions that ended.
pub const WS_DISCONNECTIONS_TOTAL: &str = "chatters_ws_disconnections_total";
/// Gauge: sessions currently running.
pub const WS_CONNECTIONS_ACTIVE: &str = "chatters_ws_connections_active";
/// Histogram: session lifetime in seconds.
pub const WS_CONNECTION_DURATION_SECONDS: &str = "chatters_ws_session_seconds";
/// Counter: upgrades refused with 401.
pub const WS_UPGRADE_REJECTED_TOTAL: &str = "chatters_ws_upgrade_rejected_total";
/// Counter: inbound frames skipped as undecodable.
pub const WS_INVALID_FRAMES_TOTAL: &str = "chatters_ws_invalid_frames_total";
/// Counter: connections closed because the same user connected again.
pub const WS_CONNECTIONS_SUPERSEDED_TOTAL: &str = "chatters_ws_superseded_total";
/// Gauge: users in the router's registry.
pub const HUB_ONLINE_USERS: &str = "chatters_hub_online_users";
/// Histogram, `command` label: time the router spent on one command.
pub const HUB_COMMAND_DURATION_SECONDS: &str = "chatters_hub_command_seconds";
/// Counter: chat messages written before fan-out.
pub const HUB_MESSAGES_PERSISTED_TOTAL: &str = "chatters_hub_messages_persisted_total";
/// Counter, `kind` label: chat messages storage refused.
pub const HUB_PERSIST_FAILURES_TOTAL: &str = "chatters_hub_persist_failures_total";
/// Counter, `event` label: payloads queued to a member.
pub const HUB_DELIVERIES_TOTAL: &str = "chatters_hub_deliveries_total";
/// Counter, `event` label: payloads dropped on a full or closed member queue.
pub const HUB_DELIVERY_DROPS_TOTAL: &str = "chatters_hub_delivery_drops_total";

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [&str; 13] = [
        WS_CONNECTIONS_TOTAL,
        WS_DISCONNECTIONS_TOTAL,
        WS_CONNECTIONS_ACTIVE,
        WS_CONNECTION_DURATION_SECONDS,
        WS_UPGRADE_REJECTED_TOTAL,
        WS_INVALID_FRAMES_TOTAL,
        WS_CONNECTIONS_SUPERSEDED_TOTAL,
        HUB_ONLINE_USERS,
        HUB_COMMAND_DURATION_SECONDS,
        HUB_MESSAGES_PERSISTED_TOTAL,
        HUB_PERSIST_FAILURES_TOTAL,
        HUB_DELIVERIES_TOTAL,
        HUB_DELIVERY_DROPS_TOTAL,
    ];

    #[test]
    fn names_are_prefixed_and_unique() {
        let mut seen = std::collections::HashSet::new();
        for name in ALL {
            assert!(name.starts_with("chatters_"), "{name}");
            assert!(name.chars().all(|c| c.is_ascii_lowercase() || c == '_'), "{name}");
            assert!(seen.insert(name), "duplicate metric name {name}");
        }
    }

    #[test]
    fn recorded_counter_is_rendered() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!(HUB_MESSAGES_PERSISTED_TOTAL).increment(3);
        });
        let text = render(&handle);
        assert!(text.contains("chatters_hub_messages_persisted_total 3"), "{text}");
    }
}
