//! Headless runner
//!
//! Drives one round at real-time pace: roster fetches run as tokio tasks and
//! come back over a channel tagged with their load epoch, logic ticks run from
//! a fixed-step accumulator inside a frame interval, and every frame is drawn
//! to an offscreen surface so the texture pipeline sees realistic traffic.

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::assets::fetch::{FsFetcher, ImageFetcher};
use crate::assets::TexturePipeline;
use crate::config::SimConfig;
use crate::game::game_loop::FixedStep;
use crate::game::match_result::Outcome;
use crate::game::performance::PerformanceMonitor;
use crate::game::round::{Phase, Round, RosterRequest};
use crate::game::state::ModeKind;
use crate::metrics::Metrics;
use crate::render::{FrameStats, RenderBudget, Renderer};
use crate::roster::{self, DirectoryRoster, Roster, RosterError, RosterSource};
use crate::stats::{LogSink, StatsFlusher, StatsQueue};

/// Frame pacing for the offscreen renderer
const FRAME_INTERVAL: Duration = Duration::from_millis(16);

type RosterResult = (u64, Result<Roster, RosterError>);

/// How a finished run went
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub mode: ModeKind,
    pub outcome: Outcome,
    pub winners: Vec<String>,
    pub ticks: u64,
    pub time_ms: u64,
    pub frames: u64,
}

/// Run one round to completion with collaborators picked from config
pub async fn run(config: SimConfig, metrics: Arc<Metrics>) -> anyhow::Result<RunSummary> {
    if let Some(api) = config.assets.api_url.clone() {
        return run_api(config, api, metrics).await;
    }
    run_directory(config, metrics).await
}

async fn run_directory(config: SimConfig, metrics: Arc<Metrics>) -> anyhow::Result<RunSummary> {
    let root = config
        .assets
        .image_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    info!("Using image directory {}", root.display());
    run_with(config, DirectoryRoster::new(root.clone()), FsFetcher::new(root), metrics).await
}

#[cfg(feature = "http")]
async fn run_api(config: SimConfig, api: String, metrics: Arc<Metrics>) -> anyhow::Result<RunSummary> {
    info!("Using image API at {}", api);
    let roster = crate::roster::HttpRoster::new(api.clone());
    let fetcher = crate::assets::fetch::HttpFetcher::new(Some(api));
    run_with(config, roster, fetcher, metrics).await
}

#[cfg(not(feature = "http"))]
async fn run_api(config: SimConfig, _api: String, metrics: Arc<Metrics>) -> anyhow::Result<RunSummary> {
    warn!("ARENA_API_URL is set but this build has no http feature; using the image directory");
    run_directory(config, metrics).await
}

/// Run one round against explicit roster and image sources
pub async fn run_with<S: RosterSource, F: ImageFetcher>(
    config: SimConfig,
    roster: S,
    fetcher: F,
    metrics: Arc<Metrics>,
) -> anyhow::Result<RunSummary> {
    let seed = config.round.seed.unwrap_or_else(rand::random);
    let mut round = Round::new(&config, seed);
    info!(seed, mode = config.round.mode.as_str(), "Round created");

    let textures = TexturePipeline::new(
        fetcher,
        config.assets.texture_workers,
        config.assets.texture_budget_bytes,
    );
    let (stats, flusher) = spawn_stats(&config);
    let roster = Arc::new(roster);
    let (roster_tx, mut roster_rx) = mpsc::unbounded_channel::<RosterResult>();

    let request = round
        .select_mode(config.round.mode)
        .context("Round refused mode selection")?;
    spawn_roster_fetch(&roster, request, &roster_tx);

    let mut renderer = Renderer::new(config.arena.width as u32, config.arena.height as u32);
    let mut monitor = PerformanceMonitor::new(round.tick_ms());
    let mut step = FixedStep::from_millis(round.tick_ms());

    let mut frame_interval = tokio::time::interval(FRAME_INTERVAL);
    frame_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let poll_every = Duration::from_millis(config.assets.roster_poll_ms.max(1));
    let mut poll_interval = tokio::time::interval_at(tokio::time::Instant::now() + poll_every, poll_every);
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut loaded_at: Option<Instant> = None;
    let mut last_frame = Instant::now();
    let mut frames: u64 = 0;

    let (outcome, frame) = loop {
        tokio::select! {
            Some((epoch, result)) = roster_rx.recv() => {
                round.apply_roster(epoch, result);
                if loaded_at.is_none() && ready_to_start(&round) {
                    loaded_at = Some(Instant::now());
                }
                // Boss rosters are fetched once; nothing to wait for
                if matches!(round.phase(), Phase::Loaded(ModeKind::Boss)) {
                    if loaded_at.is_none() {
                        anyhow::bail!("Boss roster could not be loaded; round not started");
                    }
                    start_round(&mut round, &mut step);
                }
            }
            _ = poll_interval.tick() => {
                if matches!(round.phase(), Phase::Loaded(ModeKind::Normal)) {
                    // One merge window after the first roster, then go
                    match loaded_at {
                        Some(at) if at.elapsed() >= poll_every => start_round(&mut round, &mut step),
                        _ => spawn_roster_fetch(&roster, RosterRequest { epoch: round.epoch(), mode: ModeKind::Normal }, &roster_tx),
                    }
                }
            }
            _ = frame_interval.tick() => {
                let now = Instant::now();
                let elapsed = now - last_frame;
                last_frame = now;

                let ticks = step.advance(elapsed);
                for _ in 0..ticks {
                    let started = Instant::now();
                    if !round.tick() {
                        break;
                    }
                    let took = started.elapsed();
                    monitor.record_tick(took);
                    metrics.record_tick_time(took);
                }

                let completed = textures.pump();
                if completed > 0 {
                    debug!(completed, "Textures ready");
                }

                let snapshot = round.snapshot();
                let frame = renderer.draw(&snapshot, round.images(), &textures, RenderBudget::from_monitor(&monitor));
                frames += 1;
                update_metrics(&metrics, &round, &monitor, &textures, &frame);

                for batch in round.take_stats() {
                    stats.push(batch);
                }

                if let Some(outcome) = round.outcome() {
                    break (outcome.clone(), frame);
                }
            }
        }
    };

    metrics.rounds_completed.fetch_add(1, Ordering::Relaxed);
    let winners = outcome.winner_identities(
        round.images(),
        round.super_entity().and_then(|s| s.image),
    );
    info!(
        ticks = round.tick_count(),
        time_ms = round.time_ms(),
        frames,
        drawn = frame.drawn,
        winners = ?winners,
        "Round finished"
    );

    if let Some(path) = &config.runner.frame_out {
        renderer
            .surface()
            .save_png(path)
            .with_context(|| format!("Writing final frame to {}", path.display()))?;
        info!("Final frame written to {}", path.display());
    }

    for batch in round.take_stats() {
        stats.push(batch);
    }
    drop(stats);
    if let Err(e) = flusher.await {
        warn!("Stats flusher ended abnormally: {}", e);
    }

    let dropped = textures.discard_pending();
    if dropped > 0 {
        debug!(dropped, "Discarded pending texture jobs");
    }
    // Joining the workers blocks; keep it off the runtime threads
    tokio::task::spawn_blocking(move || drop(textures))
        .await
        .context("Texture workers panicked")?;

    Ok(RunSummary {
        mode: config.round.mode,
        outcome,
        winners,
        ticks: round.tick_count(),
        time_ms: round.time_ms(),
        frames,
    })
}

fn ready_to_start(round: &Round) -> bool {
    match round.phase() {
        Phase::Loaded(ModeKind::Normal) => !round.store().is_empty(),
        Phase::Loaded(ModeKind::Boss) => round.super_entity().is_some(),
        _ => false,
    }
}

fn start_round(round: &mut Round, step: &mut FixedStep) {
    if round.start() {
        step.reset();
    }
}

fn spawn_roster_fetch<S: RosterSource>(
    source: &Arc<S>,
    request: RosterRequest,
    tx: &UnboundedSender<RosterResult>,
) {
    let source = source.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let result = roster::load_for_mode(&*source, request.mode).await;
        if let Err(e) = &result {
            debug!(epoch = request.epoch, "Roster fetch failed: {}", e);
        }
        // The runner may have finished already
        let _ = tx.send((request.epoch, result));
    });
}

fn spawn_stats(config: &SimConfig) -> (StatsQueue, tokio::task::JoinHandle<()>) {
    let every = Duration::from_millis(config.stats.flush_ms);
    match &config.stats.url {
        Some(url) => spawn_http_stats(url, every),
        None => StatsFlusher::spawn(LogSink, every),
    }
}

#[cfg(feature = "http")]
fn spawn_http_stats(url: &str, every: Duration) -> (StatsQueue, tokio::task::JoinHandle<()>) {
    StatsFlusher::spawn(crate::stats::HttpSink::new(url), every)
}

#[cfg(not(feature = "http"))]
fn spawn_http_stats(_url: &str, every: Duration) -> (StatsQueue, tokio::task::JoinHandle<()>) {
    warn!("ARENA_STATS_URL is set but this build has no http feature; logging stats instead");
    StatsFlusher::spawn(LogSink, every)
}

fn update_metrics(
    metrics: &Metrics,
    round: &Round,
    monitor: &PerformanceMonitor,
    textures: &TexturePipeline,
    frame: &FrameStats,
) {
    let store = round.store();
    metrics.bubbles_total.store(store.len() as u64, Ordering::Relaxed);
    metrics.bubbles_alive.store(store.alive_count() as u64, Ordering::Relaxed);
    metrics.projectile_count.store(round.projectile_count() as u64, Ordering::Relaxed);
    metrics.super_health.store(
        round.super_entity().map(|s| s.health.max(0.0) as u64).unwrap_or(0),
        Ordering::Relaxed,
    );
    metrics.round_time_ms.store(round.time_ms(), Ordering::Relaxed);
    metrics.record_status(monitor.status(), monitor.budget_usage_percent());
    metrics.record_textures(&textures.stats());
    metrics.record_frame(frame);
}
