//! Live dashboard: an ephemeral-port HTTP server serving a small HTML
//! shell at `/` and a server-sent-event stream at `/events`.
//!
//! The engine publishes events through a broadcast channel; every SSE
//! connection replays from its subscription point and closes after the
//! terminal `complete` / `all-complete` event. Dashboard errors are
//! logged, never fatal to a run.

use std::net::SocketAddr;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use futures_util::Stream;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use stress_domain::error::Result;

/// Broadcast capacity; slow dashboard clients miss events rather than
/// stalling the engine.
const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
struct DashEvent {
    name: String,
    /// Pre-serialized JSON payload.
    data: String,
}

/// Cheap cloneable publisher half.
#[derive(Clone)]
pub struct DashboardHandle {
    tx: broadcast::Sender<DashEvent>,
}

impl DashboardHandle {
    /// Publish one event to every connected dashboard.
    pub fn emit(&self, name: &str, data: serde_json::Value) {
        let _ = self.tx.send(DashEvent {
            name: name.to_string(),
            data: data.to_string(),
        });
    }

    /// Free-form progress message.
    pub fn message(&self, text: &str) {
        self.emit("message", serde_json::json!({ "text": text }));
    }
}

/// A running dashboard server.
pub struct DashboardServer {
    pub addr: SocketAddr,
    handle: DashboardHandle,
    join: JoinHandle<()>,
}

impl DashboardServer {
    /// Bind an ephemeral localhost port and start serving.
    pub async fn start() -> Result<Self> {
        let (tx, _) = broadcast::channel(EVENT_CAPACITY);
        let handle = DashboardHandle { tx };

        let app = Router::new()
            .route("/", get(index))
            .route("/events", get(events))
            .with_state(handle.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let join = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::warn!(error = %e, "dashboard server error");
            }
        });

        tracing::info!(url = %format!("http://{addr}/"), "dashboard listening");
        Ok(Self { addr, handle, join })
    }

    pub fn handle(&self) -> DashboardHandle {
        self.handle.clone()
    }

    /// Tear the server down once the engine signals completion.
    pub fn shutdown(self) {
        self.join.abort();
    }
}

async fn index() -> impl IntoResponse {
    Html(DASHBOARD_HTML)
}

async fn events(
    State(handle): State<DashboardHandle>,
) -> Sse<impl Stream<Item = std::result::Result<Event, std::convert::Infallible>>> {
    let mut rx = handle.tx.subscribe();
    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let terminal =
                        event.name == "complete" || event.name == "all-complete";
                    yield Ok(Event::default().event(event.name).data(event.data));
                    if terminal {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "dashboard client lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Self-contained shell that subscribes to `/events` and renders the
/// live numbers. The full chart templates live outside the engine; this
/// keeps the event contract observable from a browser.
const DASHBOARD_HTML: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>mcp-stress</title>
<style>
  body { font-family: ui-monospace, monospace; margin: 2rem; background: #111; color: #ddd; }
  h1 { font-size: 1.1rem; }
  table { border-collapse: collapse; margin-top: 1rem; }
  td, th { padding: 0.25rem 0.75rem; text-align: right; border-bottom: 1px solid #333; }
  #log { margin-top: 1rem; color: #888; white-space: pre-line; }
</style>
</head>
<body>
<h1>mcp-stress live run</h1>
<div id="meta"></div>
<table>
  <tr><th>t</th><th>req/s</th><th>errors</th><th>p50</th><th>p95</th><th>p99</th><th>conc</th></tr>
  <tbody id="rows"></tbody>
</table>
<div id="log"></div>
<script>
const es = new EventSource('/events');
const fmt = (v) => typeof v === 'number' ? v.toFixed(2) : v;
es.addEventListener('meta', (e) => {
  const m = JSON.parse(e.data);
  document.getElementById('meta').textContent =
    m.profile + ' @ ' + m.transport + ' -> ' + m.target;
});
es.addEventListener('window', (e) => {
  const w = JSON.parse(e.data);
  const row = document.createElement('tr');
  row.innerHTML = '<td>' + (w.t / 1000).toFixed(0) + 's</td><td>' + w.count +
    '</td><td>' + w.errors + '</td><td>' + fmt(w.p50) + '</td><td>' +
    fmt(w.p95) + '</td><td>' + fmt(w.p99) + '</td><td>' + (w.concurrency ?? '') + '</td>';
  const rows = document.getElementById('rows');
  rows.appendChild(row);
  while (rows.children.length > 60) rows.removeChild(rows.firstChild);
});
es.addEventListener('message', (e) => {
  document.getElementById('log').textContent += JSON.parse(e.data).text + '\n';
});
for (const name of ['complete', 'all-complete']) {
  es.addEventListener(name, () => {
    document.getElementById('log').textContent += 'run complete\n';
    es.close();
  });
}
</script>
</body>
</html>
"#;
