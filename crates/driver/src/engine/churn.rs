//! Connection-churn controller: open a fresh session, handshake, ping,
//! close — in a tight loop per worker for the run duration.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;

use stress_mcp_client::McpClient;

use crate::recorder::Recorder;

use super::RunPlan;

/// Run `concurrency` churn workers until the duration elapses.
pub async fn run(plan: &RunPlan, recorder: &Arc<Recorder>) {
    let initialize_id = recorder.register_method("initialize");
    let ping_id = recorder.register_method("ping");
    let concurrency = plan.profile.concurrency;
    recorder.publish_concurrency(concurrency);

    let deadline = Instant::now() + Duration::from_secs(plan.profile.duration_secs);
    let timeout = plan.timeout();

    let workers = (0..concurrency).map(|worker| {
        let recorder = Arc::clone(recorder);
        let target = plan.target.clone();
        async move {
            tracing::debug!(worker, "churn worker started");
            while Instant::now() < deadline {
                let transport = target.build_transport(timeout);
                let client = McpClient::new(Arc::clone(&transport));

                if let Err(e) = transport.connect().await {
                    recorder.failure(
                        initialize_id,
                        0.0,
                        e.category(),
                        e.code(),
                        &e.to_string(),
                    );
                    continue;
                }
                match client.initialize().await {
                    Ok(handshake) => {
                        recorder.success(initialize_id, handshake.latency_ms);
                        match client.ping().await {
                            Ok(reply) => recorder.success(ping_id, reply.latency_ms),
                            Err(f) => recorder.transport_failure(ping_id, &f),
                        }
                    }
                    Err(f) => recorder.transport_failure(initialize_id, &f),
                }
                client.close().await;
            }
        }
    });
    join_all(workers).await;
}
