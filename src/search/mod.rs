//! Multi-threaded password search over a [`Keyspace`].
//!
//! ## Architecture
//!
//! ```text
//! producer ──► bounded task queue ──► worker 0..N ──► outcome (capacity 1)
//!                                        │
//!                                        └──► progress (try_send) ──► dispatcher ──► ProgressSink
//! ```
//!
//! - The producer cuts the keyspace into [`SearchTask`]s lazily and blocks
//!   (with a timeout) when the queue is full.
//! - Workers poll the stop flags before every candidate, not just between
//!   tasks, so a match elsewhere stops them mid-task.
//! - The first worker to find the password (or hit an opener error) writes
//!   the single outcome slot and raises the run's stop flag.
//! - Progress updates are dropped when the dispatcher falls behind.
//!
//! ## Verifiers
//!
//! | Verifier | Needs | Cost per candidate |
//! |----------|-------|--------------------|
//! | [`Verifier::Fast`] | salt and password check | one PBKDF2 + compare |
//! | [`Verifier::Slow`] | an [`ArchiveOpener`] | whatever opening costs |

mod opener;

pub use opener::{ArchiveOpener, SampleDecryptOpener, SAMPLE_LEN};

use crate::crypto::{CheckDerivation, CryptoProfile, PasswordCheck};
use crate::error::{RarError, Result};
use crate::keyspace::{Alphabet, Keyspace, Odometer, SearchTask};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Progress updates buffered before new ones are dropped.
const PROGRESS_BUFFER: usize = 64;

/// Engine tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Worker threads
    pub workers: usize,
    /// Candidates per task
    pub chunk_size: u64,
    /// Tasks buffered between producer and workers
    pub queue_capacity: usize,
    /// Candidates between progress reports, per worker
    pub progress_interval: u64,
    /// How long a blocked queue operation waits before re-checking the stop flags
    pub poll_timeout_ms: u64,
    /// How check values are derived on the fast path
    pub derivation: CheckDerivation,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            chunk_size: 4096,
            queue_capacity: 16,
            progress_interval: 100,
            poll_timeout_ms: 50,
            derivation: CheckDerivation::default(),
        }
    }
}

impl SearchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(RarError::InvalidConfig("workers must be at least 1"));
        }
        if self.chunk_size == 0 {
            return Err(RarError::InvalidConfig("chunk_size must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(RarError::InvalidConfig("queue_capacity must be at least 1"));
        }
        if self.progress_interval == 0 {
            return Err(RarError::InvalidConfig("progress_interval must be at least 1"));
        }
        if self.poll_timeout_ms == 0 {
            return Err(RarError::InvalidConfig("poll_timeout_ms must be at least 1"));
        }
        Ok(())
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

/// How a single candidate is checked.
#[derive(Clone)]
pub enum Verifier {
    /// Key derivation plus check-value comparison; never reads ciphertext.
    Fast(PasswordCheck),
    /// Delegates to an opener.
    Slow(Arc<dyn ArchiveOpener>),
}

impl Verifier {
    /// Fast when `profile` has a salt and check value, else `fallback`.
    pub fn for_profile(
        profile: &CryptoProfile,
        derivation: CheckDerivation,
        fallback: Option<Arc<dyn ArchiveOpener>>,
    ) -> Result<Self> {
        match PasswordCheck::from_profile(profile, derivation) {
            Ok(check) => Ok(Self::Fast(check)),
            Err(RarError::IncompleteCryptoProfile) => {
                let opener = fallback.ok_or(RarError::IncompleteCryptoProfile)?;
                info!("no password check available, using slow path");
                Ok(Self::Slow(opener))
            }
            Err(err) => Err(err),
        }
    }

    pub fn verify(&self, candidate: &str) -> Result<bool> {
        match self {
            Self::Fast(check) => Ok(check.matches(candidate.as_bytes())),
            Self::Slow(opener) => opener.try_open(candidate),
        }
    }

    pub fn is_fast(&self) -> bool {
        matches!(self, Self::Fast(_))
    }
}

impl fmt::Debug for Verifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fast(check) => f.debug_tuple("Fast").field(check).finish(),
            Self::Slow(_) => f.debug_tuple("Slow").finish_non_exhaustive(),
        }
    }
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Cancels a [`StopHandle`] once a duration has passed.
///
/// Dropping (or disarming) the deadline first leaves the handle alone.
#[derive(Debug)]
pub struct Deadline {
    disarm: Option<Sender<()>>,
    timer: Option<JoinHandle<()>>,
}

impl Deadline {
    pub fn start(stop: StopHandle, after: Duration) -> Result<Self> {
        let (disarm, disarmed) = bounded::<()>(0);
        let timer = thread::Builder::new()
            .name("search-deadline".to_string())
            .spawn(move || {
                if let Err(RecvTimeoutError::Timeout) = disarmed.recv_timeout(after) {
                    warn!(?after, "search deadline reached, cancelling");
                    stop.cancel();
                }
            })?;

        Ok(Self {
            disarm: Some(disarm),
            timer: Some(timer),
        })
    }

    /// Stop the timer without cancelling.
    pub fn disarm(self) {}
}

impl Drop for Deadline {
    fn drop(&mut self) {
        // Disconnecting wakes the timer thread
        drop(self.disarm.take());
        if let Some(timer) = self.timer.take() {
            let _ = timer.join();
        }
    }
}

/// One progress report from a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub worker: usize,
    pub last_candidate: String,
    /// Candidates this worker has tried so far
    pub attempts: u64,
}

/// Receives progress reports on a dedicated thread.
pub trait ProgressSink: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        self(update);
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchOutcome {
    /// A verifier accepted this candidate.
    Found(String),
    /// Every candidate was tried.
    Exhausted,
    /// Stopped from outside before the keyspace was exhausted.
    Cancelled,
    /// The verifier failed; the search was abandoned.
    Error(String),
}

impl SearchOutcome {
    pub fn password(&self) -> Option<&str> {
        match self {
            Self::Found(password) => Some(password),
            _ => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

impl fmt::Display for SearchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Found(_) => write!(f, "password found"),
            Self::Exhausted => write!(f, "keyspace exhausted"),
            Self::Cancelled => write!(f, "search cancelled"),
            Self::Error(reason) => write!(f, "search failed: {reason}"),
        }
    }
}

/// Counters from one run.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SearchStats {
    pub attempts: u64,
    pub tasks_queued: u64,
    /// Tasks still queued when the run stopped
    pub tasks_dropped: u64,
    pub elapsed: Duration,
}

impl SearchStats {
    /// Candidates per second.
    pub fn rate(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.attempts as f64 / secs
        } else {
            0.0
        }
    }
}

/// What a worker wrote to the outcome slot.
enum Finding {
    Found(String),
    Error(String),
}

/// Why a worker returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerExit {
    /// Queue closed and empty
    Drained,
    /// A stop flag was raised
    Stopped,
}

/// State shared by every thread of one run.
struct RunState<'a> {
    stop: &'a StopHandle,
    done: AtomicBool,
    attempts: AtomicU64,
    queued: AtomicU64,
}

impl RunState<'_> {
    fn should_stop(&self) -> bool {
        self.done.load(Ordering::Acquire) || self.stop.is_cancelled()
    }
}

/// Runs a search.
pub struct SearchEngine {
    config: SearchConfig,
    verifier: Verifier,
    progress: Option<Arc<dyn ProgressSink>>,
    stop: StopHandle,
}

impl SearchEngine {
    pub fn new(config: SearchConfig, verifier: Verifier) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            verifier,
            progress: None,
            stop: StopHandle::new(),
        })
    }

    pub fn with_progress(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.progress = Some(Arc::new(sink));
        self
    }

    /// Share a stop handle created elsewhere.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    /// Handle that cancels this engine's runs. Cancellation is sticky.
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn verifier(&self) -> &Verifier {
        &self.verifier
    }

    pub fn run(&self, keyspace: &Keyspace) -> SearchOutcome {
        self.run_with_stats(keyspace).0
    }

    pub fn run_with_stats(&self, keyspace: &Keyspace) -> (SearchOutcome, SearchStats) {
        let started = Instant::now();
        let config = &self.config;
        info!(
            workers = config.workers,
            candidates = keyspace.total(),
            min_len = keyspace.min_len(),
            max_len = keyspace.max_len(),
            fast = self.verifier.is_fast(),
            "starting search"
        );

        let state = RunState {
            stop: &self.stop,
            done: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
            queued: AtomicU64::new(0),
        };
        let (task_tx, task_rx) = bounded::<SearchTask>(config.queue_capacity);
        let (outcome_tx, outcome_rx) = bounded::<Finding>(1);
        let (progress_tx, progress_rx) = bounded::<ProgressUpdate>(PROGRESS_BUFFER);
        let progress_tx = self.progress.as_ref().map(|_| progress_tx);

        let (produced_all, exits) = thread::scope(|s| {
            let state = &state;

            let producer = s.spawn(move || produce(keyspace, config, state, task_tx));

            let dispatcher = self.progress.as_ref().map(|sink| {
                s.spawn(move || {
                    for update in progress_rx {
                        sink.report(update);
                    }
                })
            });

            let mut workers = Vec::with_capacity(config.workers);
            for id in 0..config.workers {
                let worker = Worker {
                    id,
                    verifier: &self.verifier,
                    alphabet: keyspace.alphabet(),
                    state,
                    outcome: outcome_tx.clone(),
                    progress: progress_tx.clone(),
                    poll_timeout: config.poll_timeout(),
                    progress_interval: config.progress_interval,
                };
                let tasks = task_rx.clone();
                let spawned = thread::Builder::new()
                    .name(format!("search-worker-{id}"))
                    .spawn_scoped(s, move || worker.run(&tasks));
                match spawned {
                    Ok(handle) => workers.push(handle),
                    Err(err) => {
                        let _ = outcome_tx.try_send(Finding::Error(format!("failed to start worker: {err}")));
                        state.done.store(true, Ordering::Release);
                        break;
                    }
                }
            }
            // Workers hold the remaining senders; the dispatcher ends with them
            drop(progress_tx);

            let mut exits = Vec::with_capacity(workers.len());
            for handle in workers {
                match handle.join() {
                    Ok(exit) => exits.push(exit),
                    Err(_) => {
                        let _ = outcome_tx.try_send(Finding::Error("worker panicked".to_string()));
                        state.done.store(true, Ordering::Release);
                        exits.push(WorkerExit::Stopped);
                    }
                }
            }
            // Reports are best effort; a failing sink does not change the outcome
            if let Some(handle) = dispatcher {
                if handle.join().is_err() {
                    warn!("progress sink panicked, later updates were dropped");
                }
            }
            let produced_all = producer.join().unwrap_or(false);
            (produced_all, exits)
        });

        let tasks_dropped = task_rx.try_iter().count() as u64;

        let outcome = match outcome_rx.try_recv() {
            Ok(Finding::Found(password)) => SearchOutcome::Found(password),
            Ok(Finding::Error(reason)) => SearchOutcome::Error(reason),
            Err(_) if produced_all && exits.iter().all(|&e| e == WorkerExit::Drained) => {
                SearchOutcome::Exhausted
            }
            Err(_) => SearchOutcome::Cancelled,
        };

        let stats = SearchStats {
            attempts: state.attempts.load(Ordering::Relaxed),
            tasks_queued: state.queued.load(Ordering::Relaxed),
            tasks_dropped,
            elapsed: started.elapsed(),
        };
        info!(
            %outcome,
            attempts = stats.attempts,
            tasks_dropped,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "search finished"
        );
        (outcome, stats)
    }
}

impl fmt::Debug for SearchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchEngine")
            .field("config", &self.config)
            .field("verifier", &self.verifier)
            .field("progress", &self.progress.is_some())
            .field("stop", &self.stop)
            .finish()
    }
}

/// Feed tasks until the keyspace runs out or a stop flag is raised.
///
/// Returns true if every task was queued.
fn produce(
    keyspace: &Keyspace,
    config: &SearchConfig,
    state: &RunState<'_>,
    tasks: Sender<SearchTask>,
) -> bool {
    let timeout = config.poll_timeout();
    for task in keyspace.tasks(config.chunk_size) {
        let mut task = task;
        loop {
            if state.should_stop() {
                return false;
            }
            match tasks.send_timeout(task, timeout) {
                Ok(()) => break,
                Err(SendTimeoutError::Timeout(back)) => task = back,
                Err(SendTimeoutError::Disconnected(_)) => return false,
            }
        }
        state.queued.fetch_add(1, Ordering::Relaxed);
    }
    debug!("all tasks queued");
    true
}

struct Worker<'a> {
    id: usize,
    verifier: &'a Verifier,
    alphabet: &'a Alphabet,
    state: &'a RunState<'a>,
    outcome: Sender<Finding>,
    progress: Option<Sender<ProgressUpdate>>,
    poll_timeout: Duration,
    progress_interval: u64,
}

impl Worker<'_> {
    fn run(&self, tasks: &Receiver<SearchTask>) -> WorkerExit {
        let mut attempts = 0u64;
        loop {
            if self.state.should_stop() {
                return WorkerExit::Stopped;
            }

            let task = match tasks.recv_timeout(self.poll_timeout) {
                Ok(task) => task,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return WorkerExit::Drained,
            };
            debug!(worker = self.id, length = task.length, start = task.start, end = task.end, "task");

            let mut odometer = match Odometer::new(self.alphabet, &task) {
                Ok(odometer) => odometer,
                Err(err) => {
                    self.finish(Finding::Error(err.to_string()));
                    return WorkerExit::Stopped;
                }
            };

            while let Some(candidate) = odometer.advance() {
                if self.state.should_stop() {
                    return WorkerExit::Stopped;
                }
                attempts += 1;
                self.state.attempts.fetch_add(1, Ordering::Relaxed);

                match self.verifier.verify(candidate) {
                    Ok(true) => {
                        info!(worker = self.id, "password found");
                        self.finish(Finding::Found(candidate.to_string()));
                        return WorkerExit::Stopped;
                    }
                    Ok(false) => {}
                    Err(err) => {
                        warn!(worker = self.id, error = %err, "verifier failed");
                        self.finish(Finding::Error(err.to_string()));
                        return WorkerExit::Stopped;
                    }
                }

                if attempts % self.progress_interval == 0 {
                    self.report(candidate, attempts);
                }
            }
        }
    }

    /// First writer wins; later findings are dropped.
    fn finish(&self, finding: Finding) {
        let _ = self.outcome.try_send(finding);
        self.state.done.store(true, Ordering::Release);
    }

    fn report(&self, candidate: &str, attempts: u64) {
        if let Some(progress) = &self.progress {
            // Full buffer: drop the update
            let _ = progress.try_send(ProgressUpdate {
                worker: self.id,
                last_candidate: candidate.to_string(),
                attempts,
            });
        }
    }
}
