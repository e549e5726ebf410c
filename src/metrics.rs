//! Prometheus-compatible metrics endpoint
//!
//! Exposes simulation counters in Prometheus text format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::assets::TextureStats;
use crate::game::performance::PerformanceStatus;
use crate::render::FrameStats;

/// Metrics registry for the simulation
#[derive(Debug)]
pub struct Metrics {
    // Entity counts
    pub bubbles_total: AtomicU64,
    pub bubbles_alive: AtomicU64,
    pub projectile_count: AtomicU64,
    pub super_health: AtomicU64,

    // Tick timing (microseconds)
    pub tick_time_us: AtomicU64,
    pub tick_time_p95_us: AtomicU64,
    pub tick_time_p99_us: AtomicU64,
    pub tick_time_max_us: AtomicU64,
    pub tick_count: AtomicU64,

    // Performance status (0=Excellent, 1=Good, 2=Warning, 3=Critical, 4=Catastrophic)
    pub performance_status: AtomicU64,
    pub budget_usage_percent: AtomicU64,

    // Texture pipeline
    pub texture_entries: AtomicU64,
    pub texture_bytes: AtomicU64,
    pub texture_in_flight: AtomicU64,
    pub texture_failures: AtomicU64,

    // Rendering
    pub sprites_drawn: AtomicU64,
    pub sprites_skipped: AtomicU64,

    // Rounds
    pub round_time_ms: AtomicU64,
    pub rounds_completed: AtomicU64,

    start_time: Instant,

    // Rolling tick times for percentile calculation
    tick_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            bubbles_total: AtomicU64::new(0),
            bubbles_alive: AtomicU64::new(0),
            projectile_count: AtomicU64::new(0),
            super_health: AtomicU64::new(0),
            tick_time_us: AtomicU64::new(0),
            tick_time_p95_us: AtomicU64::new(0),
            tick_time_p99_us: AtomicU64::new(0),
            tick_time_max_us: AtomicU64::new(0),
            tick_count: AtomicU64::new(0),
            performance_status: AtomicU64::new(0),
            budget_usage_percent: AtomicU64::new(0),
            texture_entries: AtomicU64::new(0),
            texture_bytes: AtomicU64::new(0),
            texture_in_flight: AtomicU64::new(0),
            texture_failures: AtomicU64::new(0),
            sprites_drawn: AtomicU64::new(0),
            sprites_skipped: AtomicU64::new(0),
            round_time_ms: AtomicU64::new(0),
            rounds_completed: AtomicU64::new(0),
            start_time: Instant::now(),
            tick_history: RwLock::new(VecDeque::with_capacity(1000)),
        }
    }

    /// Record a tick time and update percentiles
    pub fn record_tick_time(&self, duration: Duration) {
        let us = duration.as_micros() as u64;
        self.tick_time_us.store(us, Ordering::Relaxed);
        self.tick_count.fetch_add(1, Ordering::Relaxed);

        let mut history = self.tick_history.write();
        history.push_back(us);
        while history.len() > 1000 {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            let p99_idx = (sorted.len() as f32 * 0.99) as usize;

            self.tick_time_p95_us.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_p99_us.store(sorted[p99_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.tick_time_max_us.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    pub fn record_status(&self, status: PerformanceStatus, budget_percent: f32) {
        self.performance_status.store(status.level() as u64, Ordering::Relaxed);
        self.budget_usage_percent.store(budget_percent.max(0.0) as u64, Ordering::Relaxed);
    }

    pub fn record_textures(&self, stats: &TextureStats) {
        self.texture_entries.store(stats.textures as u64, Ordering::Relaxed);
        self.texture_bytes.store(stats.texture_bytes as u64, Ordering::Relaxed);
        self.texture_in_flight.store(stats.in_flight as u64, Ordering::Relaxed);
        self.texture_failures.store(stats.failures, Ordering::Relaxed);
    }

    pub fn record_frame(&self, frame: &FrameStats) {
        self.sprites_drawn.store(frame.drawn as u64, Ordering::Relaxed);
        self.sprites_skipped.store(frame.skipped as u64, Ordering::Relaxed);
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn status_name(&self) -> &'static str {
        match self.performance_status.load(Ordering::Relaxed) {
            0 => "excellent",
            1 => "good",
            2 => "warning",
            3 => "critical",
            _ => "catastrophic",
        }
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(4096);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        // Entities
        metric!("bubble_arena_bubbles", "Bubbles in the store, dying included", "gauge",
            self.bubbles_total.load(Ordering::Relaxed));
        metric!("bubble_arena_bubbles_alive", "Bubbles with health above zero", "gauge",
            self.bubbles_alive.load(Ordering::Relaxed));
        metric!("bubble_arena_projectiles", "Active super-entity projectiles", "gauge",
            self.projectile_count.load(Ordering::Relaxed));
        metric!("bubble_arena_super_health", "Super-entity health (0 when absent)", "gauge",
            self.super_health.load(Ordering::Relaxed));

        // Ticks
        metric!("bubble_arena_tick_time_microseconds", "Last tick time in microseconds", "gauge",
            self.tick_time_us.load(Ordering::Relaxed));
        metric!("bubble_arena_tick_time_p95_microseconds", "95th percentile tick time", "gauge",
            self.tick_time_p95_us.load(Ordering::Relaxed));
        metric!("bubble_arena_tick_time_p99_microseconds", "99th percentile tick time", "gauge",
            self.tick_time_p99_us.load(Ordering::Relaxed));
        metric!("bubble_arena_tick_time_max_microseconds", "Maximum tick time", "gauge",
            self.tick_time_max_us.load(Ordering::Relaxed));
        metric!("bubble_arena_tick_count", "Total ticks processed", "counter",
            self.tick_count.load(Ordering::Relaxed));

        // Budget
        metric!("bubble_arena_performance_status", "Performance status (0=Excellent, 4=Catastrophic)", "gauge",
            self.performance_status.load(Ordering::Relaxed));
        metric!("bubble_arena_budget_usage_percent", "Tick budget usage percentage", "gauge",
            self.budget_usage_percent.load(Ordering::Relaxed));
        output.push_str(&format!(
            "# HELP bubble_arena_performance_state Human-readable performance state\n# TYPE bubble_arena_performance_state gauge\nbubble_arena_performance_state{{state=\"{}\"}} 1\n",
            self.status_name()
        ));

        // Textures
        metric!("bubble_arena_texture_entries", "Masked textures in the ready cache", "gauge",
            self.texture_entries.load(Ordering::Relaxed));
        metric!("bubble_arena_texture_bytes", "Bytes held by the ready cache", "gauge",
            self.texture_bytes.load(Ordering::Relaxed));
        metric!("bubble_arena_texture_in_flight", "Texture jobs queued or running", "gauge",
            self.texture_in_flight.load(Ordering::Relaxed));
        metric!("bubble_arena_texture_failures_total", "Texture fetch or decode failures", "counter",
            self.texture_failures.load(Ordering::Relaxed));

        // Rendering
        metric!("bubble_arena_sprites_drawn", "Bubbles drawn in the last frame", "gauge",
            self.sprites_drawn.load(Ordering::Relaxed));
        metric!("bubble_arena_sprites_skipped", "Bubbles over the sprite cap in the last frame", "gauge",
            self.sprites_skipped.load(Ordering::Relaxed));

        // Rounds
        metric!("bubble_arena_round_time_milliseconds", "Simulated time of the current round", "gauge",
            self.round_time_ms.load(Ordering::Relaxed));
        metric!("bubble_arena_rounds_completed_total", "Rounds that reached an outcome", "counter",
            self.rounds_completed.load(Ordering::Relaxed));
        metric!("bubble_arena_uptime_seconds", "Process uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// JSON form for direct API access
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "entities": {
                "bubbles": self.bubbles_total.load(Ordering::Relaxed),
                "alive": self.bubbles_alive.load(Ordering::Relaxed),
                "projectiles": self.projectile_count.load(Ordering::Relaxed),
                "super_health": self.super_health.load(Ordering::Relaxed),
            },
            "performance": {
                "tick_time_us": self.tick_time_us.load(Ordering::Relaxed),
                "tick_time_p95_us": self.tick_time_p95_us.load(Ordering::Relaxed),
                "tick_time_p99_us": self.tick_time_p99_us.load(Ordering::Relaxed),
                "tick_time_max_us": self.tick_time_max_us.load(Ordering::Relaxed),
                "tick_count": self.tick_count.load(Ordering::Relaxed),
                "status": self.performance_status.load(Ordering::Relaxed),
                "status_name": self.status_name(),
                "budget_percent": self.budget_usage_percent.load(Ordering::Relaxed),
            },
            "textures": {
                "entries": self.texture_entries.load(Ordering::Relaxed),
                "bytes": self.texture_bytes.load(Ordering::Relaxed),
                "in_flight": self.texture_in_flight.load(Ordering::Relaxed),
                "failures": self.texture_failures.load(Ordering::Relaxed),
            },
            "rounds": {
                "time_ms": self.round_time_ms.load(Ordering::Relaxed),
                "completed": self.rounds_completed.load(Ordering::Relaxed),
                "uptime_seconds": self.uptime_seconds(),
            },
        })
        .to_string()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);
                    let response = respond(&metrics, &request);
                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

fn respond(metrics: &Metrics, request: &str) -> String {
    let (content_type, body) = if request.starts_with("GET /metrics/json") || request.starts_with("GET /json") {
        ("application/json", metrics.to_json())
    } else if request.starts_with("GET /metrics") {
        ("text/plain; version=0.0.4", metrics.to_prometheus())
    } else if request.starts_with("GET /health") || request.starts_with("GET / ") {
        ("text/plain", "OK".to_string())
    } else {
        return "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string();
    };
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        content_type,
        body.len(),
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.bubbles_total.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_tick_time() {
        let metrics = Metrics::new();
        for i in 0..100 {
            metrics.record_tick_time(Duration::from_micros(100 + i * 10));
        }

        assert_eq!(metrics.tick_count.load(Ordering::Relaxed), 100);
        assert!(metrics.tick_time_p95_us.load(Ordering::Relaxed) > 0);
        assert!(metrics.tick_time_p99_us.load(Ordering::Relaxed) >= metrics.tick_time_p95_us.load(Ordering::Relaxed));
        assert_eq!(metrics.tick_time_max_us.load(Ordering::Relaxed), 1090);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.bubbles_total.store(50, Ordering::Relaxed);
        metrics.bubbles_alive.store(45, Ordering::Relaxed);
        metrics.record_status(PerformanceStatus::Critical, 97.4);

        let output = metrics.to_prometheus();
        assert!(output.contains("bubble_arena_bubbles 50"));
        assert!(output.contains("bubble_arena_bubbles_alive 45"));
        assert!(output.contains("bubble_arena_performance_status 3"));
        assert!(output.contains("state=\"critical\""));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_texture_stats_exported() {
        let metrics = Metrics::new();
        metrics.record_textures(&TextureStats {
            textures: 12,
            texture_bytes: 4096,
            ..Default::default()
        });
        let output = metrics.to_prometheus();
        assert!(output.contains("bubble_arena_texture_entries 12"));
        assert!(output.contains("bubble_arena_texture_bytes 4096"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.projectile_count.store(8, Ordering::Relaxed);

        let value: serde_json::Value = serde_json::from_str(&metrics.to_json()).unwrap();
        assert_eq!(value["entities"]["projectiles"], 8);
        assert_eq!(value["performance"]["status_name"], "excellent");
    }

    #[test]
    fn test_routes() {
        let metrics = Metrics::new();
        assert!(respond(&metrics, "GET /metrics HTTP/1.1").contains("bubble_arena_tick_count"));
        assert!(respond(&metrics, "GET /metrics/json HTTP/1.1").contains("application/json"));
        assert!(respond(&metrics, "GET /health HTTP/1.1").ends_with("OK"));
        assert!(respond(&metrics, "POST /metrics HTTP/1.1").starts_with("HTTP/1.1 404"));
    }

    #[tokio::test]
    async fn test_server_serves_metrics() {
        let metrics = Arc::new(Metrics::new());
        metrics.bubbles_total.store(7, Ordering::Relaxed);

        // Grab a free port, then hand it to the server
        let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = free.local_addr().unwrap().port();
        drop(free);
        tokio::spawn(start_metrics_server(metrics, port));

        let mut body = String::new();
        for _ in 0..50 {
            if let Ok(mut stream) = tokio::net::TcpStream::connect(("127.0.0.1", port)).await {
                stream.write_all(b"GET /metrics HTTP/1.1\r\n\r\n").await.unwrap();
                stream.read_to_string(&mut body).await.unwrap();
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(body.contains("bubble_arena_bubbles 7"));
    }
}
