//! Liveness monitor, one per open connection.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{MissedTickBehavior, interval};
use tracing::debug;

use super::connection::Connection;
use crate::types::now_ms;

/// Probes the connection every `interval` and tears it down when nothing
/// proved it alive for `interval * timeout_multiple`.
///
/// With `traffic_counts_as_alive`, any inbound frame counts; otherwise only a
/// frame the adapter recognizes as a pong (or a protocol pong) does.
pub(super) async fn monitor(conn: Arc<Connection>) {
    let heartbeat = conn.config().heartbeat.clone();
    let window = heartbeat.timeout();
    let mut ticker = interval(heartbeat.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            () = conn.cancel_token().cancelled() => break,
            _ = ticker.tick() => {}
        }

        let stats = conn.raw_stats();
        let last_alive = if heartbeat.traffic_counts_as_alive {
            stats.last_pong_time().max(stats.last_message_time())
        } else {
            stats.last_pong_time()
        };
        let elapsed = Duration::from_millis(u64::try_from(now_ms() - last_alive).unwrap_or(0));

        if elapsed >= window {
            conn.heartbeat_timeout(elapsed, window);
            break;
        }

        if let Err(e) = conn.send_ping() {
            debug!(error = %e, "Heartbeat stopped");
            break;
        }
    }
}
