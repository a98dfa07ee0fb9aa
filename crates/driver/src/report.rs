//! Console reporting and the static chart shell.

use stress_domain::events::{AggregateStat, AggregateSummary, MetaEvent, SummaryEvent};
use stress_stats::{AssertionResult, PreparedChart};

/// Tabulate a run summary: totals, category breakdown, per-method
/// percentiles.
pub fn print_summary(summary: &SummaryEvent) {
    println!();
    println!("  requests      {}", summary.total_requests);
    println!(
        "  errors        {} ({:.2}%)",
        summary.total_errors,
        summary.error_rate()
    );
    println!("  duration      {:.1}s", summary.duration_ms as f64 / 1_000.0);
    println!("  throughput    {:.1} req/s", summary.requests_per_second);
    println!(
        "  latency       min {:.2}  mean {:.2}  p50 {:.2}  p95 {:.2}  p99 {:.2}  max {:.2}",
        summary.overall.min,
        summary.overall.mean,
        summary.overall.p50,
        summary.overall.p95,
        summary.overall.p99,
        summary.overall.max
    );

    if !summary.error_categories.is_empty() {
        println!();
        println!("  errors by category");
        for (category, count) in &summary.error_categories {
            println!("    {category:<10} {count}");
        }
    }

    if !summary.by_method.is_empty() {
        println!();
        println!(
            "  {:<32} {:>8} {:>8} {:>9} {:>9} {:>9}",
            "method", "count", "errors", "p50", "p95", "p99"
        );
        for m in &summary.by_method {
            println!(
                "  {:<32} {:>8} {:>8} {:>9.2} {:>9.2} {:>9.2}",
                m.method, m.count, m.errors, m.stats.p50, m.stats.p95, m.stats.p99
            );
        }
    }

    if !summary.phases.is_empty() {
        println!();
        println!(
            "  {:<7} {:>12} {:>10} {:>9} {:>9} {:>8}",
            "phase", "concurrency", "rps", "p50", "p99", "errors"
        );
        for p in &summary.phases {
            println!(
                "  {:<7} {:>12} {:>10.1} {:>9.2} {:>9.2} {:>8}",
                p.phase, p.concurrency, p.rps, p.p50, p.p99, p.errors
            );
        }
        if let Some(ceiling) = &summary.ceiling {
            println!();
            println!(
                "  ceiling: {} at concurrency {}",
                ceiling.reason, ceiling.concurrency
            );
        }
    }
    println!();
}

/// One PASS/FAIL line per assertion with the observed value.
pub fn print_assertions(results: &[AssertionResult]) {
    for result in results {
        let verdict = if result.passed { "PASS" } else { "FAIL" };
        println!(
            "  [{verdict}] {:<24} actual {:.2}",
            result.assertion.raw, result.actual
        );
    }
}

/// Cross-run aggregate table.
pub fn print_aggregate(aggregate: &AggregateSummary) {
    let line = |name: &str, stat: &AggregateStat| {
        println!("  {name:<16} {:>12.2} ± {:.2}", stat.mean, stat.stddev);
    };
    println!();
    println!("  aggregate over {} runs (mean ± stddev)", aggregate.run_count);
    line("requests", &aggregate.total_requests);
    line("errors", &aggregate.total_errors);
    line("error rate %", &aggregate.error_rate);
    line("duration ms", &aggregate.duration_ms);
    line("req/s", &aggregate.requests_per_second);
    line("p50", &aggregate.overall.p50);
    line("p95", &aggregate.overall.p95);
    line("p99", &aggregate.overall.p99);
    line("mean", &aggregate.overall.mean);
    println!();
}

/// Render the self-contained chart HTML: the prepared data embedded as
/// JSON into a shell that draws simple latency/throughput bars.
pub fn render_chart_html(
    meta: Option<&MetaEvent>,
    chart: &PreparedChart,
    summary: Option<&SummaryEvent>,
) -> String {
    let payload = serde_json::json!({
        "meta": meta,
        "chart": chart,
        "summary": summary,
    });
    CHART_SHELL.replace(
        "/*DATA*/null",
        &payload.to_string().replace("</", "<\\/"),
    )
}

const CHART_SHELL: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>mcp-stress chart</title>
<style>
  body { font-family: ui-monospace, monospace; margin: 2rem; background: #111; color: #ddd; }
  h1 { font-size: 1.1rem; }
  .bars { display: flex; align-items: flex-end; height: 220px; gap: 1px; margin: 1rem 0; }
  .bar { flex: 1; background: #4a8; min-width: 2px; position: relative; }
  .bar.anomaly { background: #d66; }
  .bar.err { background: #b53; }
  #summary { color: #aaa; white-space: pre; }
</style>
</head>
<body>
<h1 id="title">mcp-stress run</h1>
<div>p99 per window</div>
<div class="bars" id="latency"></div>
<div>requests per window</div>
<div class="bars" id="count"></div>
<div id="summary"></div>
<script>
const data = /*DATA*/null;
if (data) {
  if (data.meta) {
    document.getElementById('title').textContent =
      data.meta.profile + ' @ ' + data.meta.transport + ' — ' + data.meta.target;
  }
  const anomalies = new Set(data.chart.anomalies);
  const windows = data.chart.windows;
  const maxP99 = Math.max(1, ...windows.map((w) => w.p99));
  const maxCount = Math.max(1, ...windows.map((w) => w.count));
  const latency = document.getElementById('latency');
  const count = document.getElementById('count');
  windows.forEach((w, i) => {
    const lbar = document.createElement('div');
    lbar.className = 'bar' + (anomalies.has(i) ? ' anomaly' : '');
    lbar.style.height = (w.p99 / maxP99 * 100) + '%';
    lbar.title = 't=' + w.t + 'ms p99=' + w.p99.toFixed(2);
    latency.appendChild(lbar);
    const cbar = document.createElement('div');
    cbar.className = 'bar' + (w.errors > 0 ? ' err' : '');
    cbar.style.height = (w.count / maxCount * 100) + '%';
    cbar.title = 't=' + w.t + 'ms count=' + w.count + ' errors=' + w.errors;
    count.appendChild(cbar);
  });
  if (data.summary) {
    const s = data.summary;
    document.getElementById('summary').textContent =
      'requests ' + s.totalRequests + '   errors ' + s.totalErrors +
      '   req/s ' + s.requestsPerSecond.toFixed(1) +
      '   p50 ' + s.overall.p50.toFixed(2) + '   p99 ' + s.overall.p99.toFixed(2);
  }
}
</script>
</body>
</html>
"#;
