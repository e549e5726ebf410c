//! Texture pipeline
//!
//! Turns image references into circular, size-bucketed textures on
//! background worker threads. The frame thread only ever:
//!
//! 1. asks for a texture with `get_ready_texture` (never blocks on decode),
//! 2. on a miss, calls `request_masked_texture` (idempotent),
//! 3. calls `pump` once per frame to publish finished work.
//!
//! ```text
//!  frame thread            job queue            workers
//!  request_* ───────────▶ [Job] ───────────▶ fetch → decode → mask
//!                                                   │ sources (shared)
//!  pump ◀──────────────── [Done] ◀──────────────────┘
//!   └─▶ ready map (byte-budget LRU)
//! ```
//!
//! A texture may be evicted after it was ready; callers simply request it
//! again on the next miss.

pub mod cache;
pub mod fetch;
pub mod mask;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbaImage;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use tracing::{debug, info, warn};

use self::cache::ByteLru;
use self::fetch::{fetch_with_retry, FetchError, ImageFetcher};

/// Render-ready circular texture
pub type Texture = Arc<RgbaImage>;

/// Masked texture sizes; requests round up to the next bucket
pub const SIZE_BUCKETS: [u32; 5] = [16, 32, 64, 128, 256];
/// Decoded sources are downscaled so neither side exceeds this
pub const MAX_SOURCE_SIDE: u32 = 512;
/// Extra fetch attempts after the first
pub const FETCH_RETRIES: u32 = 2;
/// Backoff unit between fetch attempts (multiplied by the attempt number)
pub const FETCH_BACKOFF: Duration = Duration::from_millis(150);
/// A failed reference is not requested again before this elapses
pub const FAILURE_COOLDOWN: Duration = Duration::from_secs(5);

/// Round a pixel size to its bucket
pub fn size_bucket(size: f32) -> u32 {
    if !size.is_finite() || size <= 0.0 {
        return SIZE_BUCKETS[0];
    }
    let px = size.ceil() as u32;
    SIZE_BUCKETS
        .iter()
        .copied()
        .find(|&b| b >= px)
        .unwrap_or(SIZE_BUCKETS[SIZE_BUCKETS.len() - 1])
}

/// Texture pipeline errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TextureError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("Failed to decode image: {0}")]
    Decode(String),
}

/// Cache key: reference plus bucket (bucket 0 marks a decode-only job)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureKey {
    pub url: String,
    pub bucket: u32,
}

/// Borrowed form of `TextureKey` for allocation-free lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct KeyRef<'a> {
    url: &'a str,
    bucket: u32,
}

impl hashbrown::Equivalent<TextureKey> for KeyRef<'_> {
    fn equivalent(&self, key: &TextureKey) -> bool {
        self.bucket == key.bucket && self.url == key.url
    }
}

impl KeyRef<'_> {
    fn owned(self) -> TextureKey {
        TextureKey {
            url: self.url.to_string(),
            bucket: self.bucket,
        }
    }
}

const DECODE_ONLY: u32 = 0;

#[derive(Debug)]
struct Job {
    key: TextureKey,
}

#[derive(Debug)]
enum Done {
    Decoded(TextureKey),
    Masked(TextureKey, Texture),
    Failed(TextureKey, TextureError),
}

struct Shared {
    /// Decoded sources, read and filled by workers
    sources: Mutex<ByteLru<String, Texture>>,
    /// Masked textures, filled by `pump`
    ready: Mutex<ByteLru<TextureKey, Texture>>,
    in_flight: Mutex<FxHashSet<TextureKey>>,
    failed: Mutex<FxHashMap<String, Instant>>,
    completed: AtomicU64,
    failures: AtomicU64,
}

/// Point-in-time pipeline counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TextureStats {
    pub textures: usize,
    pub texture_bytes: usize,
    pub sources: usize,
    pub source_bytes: usize,
    pub budget_bytes: usize,
    pub in_flight: usize,
    pub queued: usize,
    pub completed: u64,
    pub failures: u64,
    pub evictions: u64,
}

pub struct TexturePipeline {
    shared: Arc<Shared>,
    jobs: Option<Sender<Job>>,
    /// Second handle on the job queue for discarding pending work
    pending: Receiver<Job>,
    done: Receiver<Done>,
    workers: Vec<JoinHandle<()>>,
}

impl TexturePipeline {
    /// Spawn `workers` decode threads. Masked textures share `budget_bytes`;
    /// decoded sources get half of that again.
    pub fn new<F: ImageFetcher>(fetcher: F, workers: usize, budget_bytes: usize) -> Self {
        let shared = Arc::new(Shared {
            sources: Mutex::new(ByteLru::new(budget_bytes / 2)),
            ready: Mutex::new(ByteLru::new(budget_bytes)),
            in_flight: Mutex::new(FxHashSet::default()),
            failed: Mutex::new(FxHashMap::default()),
            completed: AtomicU64::new(0),
            failures: AtomicU64::new(0),
        });
        let (job_tx, job_rx) = unbounded::<Job>();
        let (done_tx, done_rx) = unbounded::<Done>();
        let fetcher = Arc::new(fetcher);

        let mut handles = Vec::with_capacity(workers);
        for i in 0..workers.max(1) {
            let fetcher = fetcher.clone();
            let shared = shared.clone();
            let jobs = job_rx.clone();
            let done = done_tx.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("texture-{}", i))
                .spawn(move || worker_loop(&*fetcher, &shared, jobs, done));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => warn!("Failed to spawn texture worker {}: {}", i, e),
            }
        }
        if handles.is_empty() {
            warn!("No texture workers running; bubbles will use placeholders");
        } else {
            info!(workers = handles.len(), budget_mb = budget_bytes / (1024 * 1024), "Texture pipeline started");
        }

        Self {
            shared,
            jobs: Some(job_tx),
            pending: job_rx,
            done: done_rx,
            workers: handles,
        }
    }

    fn recently_failed(&self, url: &str) -> bool {
        let mut failed = self.shared.failed.lock();
        match failed.get(url) {
            Some(at) if at.elapsed() < FAILURE_COOLDOWN => true,
            Some(_) => {
                failed.remove(url);
                false
            }
            None => false,
        }
    }

    fn enqueue(&self, key: KeyRef<'_>) -> bool {
        if self.recently_failed(key.url) {
            return false;
        }
        let Some(jobs) = &self.jobs else {
            return false;
        };
        let key = key.owned();
        if !self.shared.in_flight.lock().insert(key.clone()) {
            return false;
        }
        if jobs.send(Job { key: key.clone() }).is_err() {
            self.shared.in_flight.lock().remove(&key);
            return false;
        }
        true
    }

    /// Fetch and decode `url` in the background. No-op when already decoded
    /// or in flight. Returns whether a job was queued.
    pub fn request_decode(&self, url: &str) -> bool {
        if self.shared.sources.lock().contains(url) {
            return false;
        }
        self.enqueue(KeyRef { url, bucket: DECODE_ONLY })
    }

    /// Produce a circular texture of `url` at the bucket for `size` pixels.
    /// No-op when ready or in flight.
    pub fn request_masked_texture(&self, url: &str, size: f32) -> bool {
        let key = KeyRef { url, bucket: size_bucket(size) };
        if self.shared.ready.lock().contains(&key) {
            return false;
        }
        self.enqueue(key)
    }

    /// Texture for `url` at the bucket for `size`, if ready
    pub fn get_ready_texture(&self, url: &str, size: f32) -> Option<Texture> {
        self.shared.ready.lock().get(&KeyRef { url, bucket: size_bucket(size) })
    }

    /// Publish finished work into the ready map. Returns the number of
    /// completions processed.
    pub fn pump(&self) -> usize {
        let mut processed = 0;
        for done in self.done.try_iter() {
            processed += 1;
            let key = match done {
                Done::Decoded(key) => key,
                Done::Masked(key, texture) => {
                    let bytes = texture.as_raw().len();
                    self.shared.ready.lock().insert(key.clone(), texture, bytes);
                    key
                }
                Done::Failed(key, e) => {
                    warn!(url = %key.url, "Texture failed: {}", e);
                    self.shared.failed.lock().insert(key.url.clone(), Instant::now());
                    key
                }
            };
            self.shared.in_flight.lock().remove(&key);
        }
        processed
    }

    /// Drop queued jobs that no worker has started yet
    pub fn discard_pending(&self) -> usize {
        let mut dropped = 0;
        let mut in_flight = self.shared.in_flight.lock();
        for job in self.pending.try_iter() {
            in_flight.remove(&job.key);
            dropped += 1;
        }
        if dropped > 0 {
            debug!(dropped, "Discarded pending texture jobs");
        }
        dropped
    }

    pub fn stats(&self) -> TextureStats {
        let (textures, texture_bytes, budget_bytes, ready_evictions) = {
            let ready = self.shared.ready.lock();
            (ready.len(), ready.bytes(), ready.budget(), ready.evictions())
        };
        let (sources, source_bytes, source_evictions) = {
            let sources = self.shared.sources.lock();
            (sources.len(), sources.bytes(), sources.evictions())
        };
        TextureStats {
            textures,
            texture_bytes,
            sources,
            source_bytes,
            budget_bytes,
            in_flight: self.shared.in_flight.lock().len(),
            queued: self.pending.len(),
            completed: self.shared.completed.load(Ordering::Relaxed),
            failures: self.shared.failures.load(Ordering::Relaxed),
            evictions: ready_evictions + source_evictions,
        }
    }
}

impl Drop for TexturePipeline {
    fn drop(&mut self) {
        self.discard_pending();
        // Closing the queue ends the worker loops
        self.jobs.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                warn!("Texture worker panicked");
            }
        }
    }
}

fn worker_loop<F: ImageFetcher + ?Sized>(fetcher: &F, shared: &Shared, jobs: Receiver<Job>, done: Sender<Done>) {
    while let Ok(Job { key }) = jobs.recv() {
        let result = source_for(fetcher, shared, &key.url).map(|source| {
            (key.bucket != DECODE_ONLY).then(|| Arc::new(mask::circular_cover(&source, key.bucket)))
        });
        let message = match result {
            Ok(Some(texture)) => {
                shared.completed.fetch_add(1, Ordering::Relaxed);
                Done::Masked(key, texture)
            }
            Ok(None) => {
                shared.completed.fetch_add(1, Ordering::Relaxed);
                Done::Decoded(key)
            }
            Err(e) => {
                shared.failures.fetch_add(1, Ordering::Relaxed);
                Done::Failed(key, e)
            }
        };
        if done.send(message).is_err() {
            break;
        }
    }
}

fn source_for<F: ImageFetcher + ?Sized>(fetcher: &F, shared: &Shared, url: &str) -> Result<Texture, TextureError> {
    if let Some(source) = shared.sources.lock().get(url) {
        return Ok(source);
    }
    let bytes = fetch_with_retry(fetcher, url, FETCH_RETRIES, FETCH_BACKOFF)?;
    let image = Arc::new(mask::decode(&bytes)?);
    let cost = image.as_raw().len();
    shared.sources.lock().insert(url.to_string(), image.clone(), cost);
    Ok(image)
}
