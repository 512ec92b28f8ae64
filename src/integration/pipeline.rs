//! Multi-camera frame pipeline: admission, a fixed worker pool and graceful
//! shutdown.
//!
//! Frames enter through [`FramePipeline::enqueue`], pass the per-camera
//! frame-skip filter and land in a bounded queue. When the queue is full the
//! frame is dropped; callers are never blocked. Workers take tasks in FIFO
//! order, run the detector and feed the camera's [`TrackingSession`]. Each
//! camera's session sits behind its own lock, which the worker holds for the
//! whole detect-and-track step, so one camera's frames are never processed
//! concurrently while different cameras proceed in parallel.
//!
//! Admission hands each camera's frames consecutive tickets. A worker that
//! dequeues a frame waits until the camera's previous ticket is finished, so
//! frames are detected, tracked and published in arrival order. A ticket
//! finishes when its frame is processed, panics, or is discarded during
//! shutdown. While it waits a worker serves no other camera.

use std::any::Any;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use parking_lot::{Condvar, Mutex, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::config::{PipelineConfig, TrackingConfig};
use crate::error::{ConfigError, PipelineError};
use crate::integration::detector::DetectionSource;
use crate::integration::events::{EventBus, PipelineEvent};
use crate::integration::frame::{FrameTask, Priority};
use crate::integration::metrics::{MetricsRecorder, PipelineMetrics};
use crate::tracker::{TrackedPerson, TrackerStatistics, TrackingSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Created,
    Running,
    Stopped,
}

/// Outcome of [`FramePipeline::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Every worker finished inside the grace period
    pub drained: bool,
    /// The grace period expired and in-flight work was cancelled
    pub forced: bool,
    /// Workers still busy when the hard timeout expired. They are detached
    /// and exit once their current frame returns.
    pub abandoned_workers: usize,
    /// Queued tasks released without being processed
    pub discarded_tasks: usize,
    pub elapsed: Duration,
}

/// Finished tickets of one camera.
#[derive(Debug, Default)]
struct Turns {
    /// Lowest ticket not finished yet
    serving: u64,
    /// Finished tickets above `serving`
    skipped: BTreeSet<u64>,
}

impl Turns {
    /// Returns `true` when `serving` moved.
    fn finish(&mut self, ticket: u64) -> bool {
        if ticket != self.serving {
            if ticket > self.serving {
                self.skipped.insert(ticket);
            }
            return false;
        }
        self.serving += 1;
        while self.skipped.remove(&self.serving) {
            self.serving += 1;
        }
        true
    }
}

struct CameraSlot {
    arrivals: AtomicU64,
    /// Next ticket, held across the queue send so admitted tickets have no gaps
    issued: Mutex<u64>,
    turns: Mutex<Turns>,
    turn_passed: Condvar,
    session: Mutex<TrackingSession>,
}

impl CameraSlot {
    fn new(camera_id: &str, config: TrackingConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            arrivals: AtomicU64::new(0),
            issued: Mutex::new(0),
            turns: Mutex::new(Turns::default()),
            turn_passed: Condvar::new(),
            session: Mutex::new(TrackingSession::new(camera_id, config)?),
        })
    }

    /// Block until every earlier ticket is finished.
    fn wait_turn(&self, ticket: u64) -> Turn<'_> {
        let mut turns = self.turns.lock();
        while turns.serving < ticket {
            self.turn_passed.wait(&mut turns);
        }
        Turn { slot: self, ticket }
    }

    fn finish_turn(&self, ticket: u64) {
        if self.turns.lock().finish(ticket) {
            self.turn_passed.notify_all();
        }
    }
}

/// A ticket whose turn has come. Finishes the ticket when dropped, unwinding
/// included.
struct Turn<'a> {
    slot: &'a CameraSlot,
    ticket: u64,
}

impl Drop for Turn<'_> {
    fn drop(&mut self) {
        self.slot.finish_turn(self.ticket);
    }
}

/// State shared between the pipeline handle and its workers.
struct Shared<D: DetectionSource> {
    detector: D,
    config: PipelineConfig,
    queue: Receiver<FrameTask<D::Frame>>,
    cameras: RwLock<HashMap<String, Arc<CameraSlot>>>,
    metrics: MetricsRecorder,
    events: EventBus,
    accepting: AtomicBool,
    cancelled: AtomicBool,
}

/// Schedules detection and tracking for many cameras on a fixed worker pool.
pub struct FramePipeline<D: DetectionSource> {
    shared: Arc<Shared<D>>,
    sender: RwLock<Option<Sender<FrameTask<D::Frame>>>>,
    lifecycle: Mutex<Lifecycle>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    done_tx: Sender<usize>,
    done_rx: Receiver<usize>,
}

impl<D: DetectionSource> FramePipeline<D> {
    /// Create a pipeline. No threads run until [`start`](Self::start);
    /// frames enqueued before then wait in the queue.
    pub fn new(detector: D, config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let (tx, rx) = bounded(config.queue_capacity);
        let (done_tx, done_rx) = unbounded();
        Ok(Self {
            shared: Arc::new(Shared {
                detector,
                config,
                queue: rx,
                cameras: RwLock::new(HashMap::new()),
                metrics: MetricsRecorder::default(),
                events: EventBus::default(),
                accepting: AtomicBool::new(true),
                cancelled: AtomicBool::new(false),
            }),
            sender: RwLock::new(Some(tx)),
            lifecycle: Mutex::new(Lifecycle::Created),
            workers: Mutex::new(Vec::new()),
            done_tx,
            done_rx,
        })
    }

    /// Spawn the worker pool.
    pub fn start(&self) -> Result<(), PipelineError> {
        let mut lifecycle = self.lifecycle.lock();
        match *lifecycle {
            Lifecycle::Running => return Err(PipelineError::AlreadyStarted),
            Lifecycle::Stopped => return Err(PipelineError::ShutDown),
            Lifecycle::Created => {}
        }
        // Running before spawning, so shutdown still reaps a partial pool.
        *lifecycle = Lifecycle::Running;

        let mut workers = self.workers.lock();
        for index in 0..self.shared.config.workers {
            let shared = Arc::clone(&self.shared);
            let done = self.done_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("frame-worker-{index}"))
                .spawn(move || worker_loop(index, shared, done))
                .map_err(PipelineError::Spawn)?;
            workers.push(handle);
        }

        info!(
            workers = self.shared.config.workers,
            queue_capacity = self.shared.config.queue_capacity,
            frame_skip = self.shared.config.frame_skip,
            strategy = %self.shared.config.tracking.strategy,
            "frame pipeline started"
        );
        Ok(())
    }

    /// Offer one frame. Returns `true` when the frame was admitted to the
    /// queue; skipped, overflowing and post-shutdown frames return `false`
    /// and are counted as dropped. Never blocks on a full queue.
    pub fn enqueue(&self, camera_id: &str, frame: &D::Frame, priority: Priority) -> bool {
        let shared = &self.shared;
        shared.metrics.record_arrival();

        if !shared.accepting.load(Ordering::Acquire) {
            shared.metrics.record_dropped();
            trace!(camera = camera_id, "frame rejected after shutdown");
            return false;
        }

        let slot = match shared.slot_or_insert(camera_id) {
            Ok(slot) => slot,
            Err(e) => {
                shared.metrics.record_dropped();
                warn!(camera = camera_id, error = %e, "could not create camera session");
                return false;
            }
        };

        let arrival = slot.arrivals.fetch_add(1, Ordering::Relaxed) + 1;
        if arrival % u64::from(shared.config.frame_skip) != 0 {
            shared.metrics.record_dropped();
            return false;
        }

        let sender = self.sender.read();
        let Some(tx) = sender.as_ref() else {
            shared.metrics.record_dropped();
            return false;
        };

        let mut issued = slot.issued.lock();
        let task = FrameTask {
            camera_id: camera_id.to_string(),
            frame: frame.clone(),
            priority,
            ticket: *issued,
            enqueued_at: Instant::now(),
        };
        match tx.try_send(task) {
            Ok(()) => {
                *issued += 1;
                true
            }
            Err(TrySendError::Full(task)) => {
                drop(task);
                shared.metrics.record_dropped();
                debug!(camera = camera_id, "queue full, frame dropped");
                false
            }
            Err(TrySendError::Disconnected(task)) => {
                drop(task);
                shared.metrics.record_dropped();
                false
            }
        }
    }

    /// Set or replace a camera's tracking configuration. An existing camera
    /// gets a fresh strategy, so its tracks and ids start over; its frame-skip
    /// count and queued frames are kept.
    pub fn register_camera(
        &self,
        camera_id: &str,
        config: TrackingConfig,
    ) -> Result<(), ConfigError> {
        config.validate()?;
        let mut cameras = self.shared.cameras.write();
        if let Some(slot) = cameras.get(camera_id).cloned() {
            drop(cameras);
            slot.session.lock().reconfigure(config)?;
        } else {
            let slot = Arc::new(CameraSlot::new(camera_id, config)?);
            cameras.insert(camera_id.to_string(), slot);
        }
        info!(camera = camera_id, "camera registered");
        Ok(())
    }

    /// Current tracks of one camera, or `None` for an unknown camera.
    pub fn tracked_persons(&self, camera_id: &str) -> Option<Vec<TrackedPerson>> {
        let slot = self.shared.slot(camera_id)?;
        let session = slot.session.lock();
        Some(session.tracked_persons())
    }

    pub fn camera_statistics(&self, camera_id: &str) -> Option<TrackerStatistics> {
        let slot = self.shared.slot(camera_id)?;
        let session = slot.session.lock();
        Some(session.statistics())
    }

    /// Known camera ids, sorted.
    pub fn cameras(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.shared.cameras.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        self.shared.events.subscribe()
    }

    pub fn metrics(&self) -> PipelineMetrics {
        self.shared.snapshot()
    }

    /// Zero the throughput counters. Tracking state is untouched.
    pub fn reset_metrics(&self) {
        self.shared.metrics.reset();
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn detector(&self) -> &D {
        &self.shared.detector
    }

    pub fn is_running(&self) -> bool {
        *self.lifecycle.lock() == Lifecycle::Running
    }

    /// Stop admission and wind the worker pool down.
    ///
    /// Workers first get the grace period to finish everything already
    /// queued. After that the pipeline cancels: remaining queued tasks are
    /// released unprocessed and workers exit as soon as their current frame
    /// returns. Workers still busy at the hard timeout are detached.
    /// Calling this again is a no-op.
    pub fn shutdown(&self) -> ShutdownReport {
        let started = Instant::now();
        let handles = {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle == Lifecycle::Stopped {
                return ShutdownReport {
                    drained: true,
                    ..ShutdownReport::default()
                };
            }
            *lifecycle = Lifecycle::Stopped;
            self.shared.accepting.store(false, Ordering::Release);
            self.sender.write().take();
            std::mem::take(&mut *self.workers.lock())
        };

        let config = &self.shared.config;
        info!(
            workers = handles.len(),
            queued = self.shared.queue.len(),
            "frame pipeline shutting down"
        );

        let total = handles.len();
        let mut finished = HashSet::with_capacity(total);
        collect_finished(
            &self.done_rx,
            total,
            started + config.shutdown_grace(),
            &mut finished,
        );

        let forced = finished.len() < total;
        if forced {
            warn!(
                busy = total - finished.len(),
                "shutdown grace period expired, cancelling remaining work"
            );
            self.shared.cancelled.store(true, Ordering::Release);
            collect_finished(
                &self.done_rx,
                total,
                started + config.shutdown_timeout(),
                &mut finished,
            );
        }

        let abandoned_workers = total - finished.len();
        if abandoned_workers > 0 {
            error!(
                abandoned_workers,
                "shutdown timed out, detaching workers still in flight"
            );
        }

        for (index, handle) in handles.into_iter().enumerate() {
            if finished.contains(&index) && handle.join().is_err() {
                warn!(worker = index, "worker thread panicked");
            }
        }

        let mut discarded_tasks = 0;
        while let Ok(task) = self.shared.queue.try_recv() {
            self.shared.discard(task);
            discarded_tasks += 1;
        }
        // Detached workers keep the bus alive; hang up on subscribers anyway.
        self.shared.events.close();

        let report = ShutdownReport {
            drained: !forced,
            forced,
            abandoned_workers,
            discarded_tasks,
            elapsed: started.elapsed(),
        };
        info!(?report, "frame pipeline stopped");
        report
    }
}

impl<D: DetectionSource> Drop for FramePipeline<D> {
    fn drop(&mut self) {
        let lifecycle = *self.lifecycle.get_mut();
        if lifecycle == Lifecycle::Stopped {
            return;
        }
        self.shared.accepting.store(false, Ordering::Release);
        self.sender.get_mut().take();
        if lifecycle == Lifecycle::Running {
            warn!("frame pipeline dropped while running, cancelling workers");
            self.shared.cancelled.store(true, Ordering::Release);
        }
        self.shared.events.close();
    }
}

impl<D: DetectionSource> Shared<D> {
    fn slot(&self, camera_id: &str) -> Option<Arc<CameraSlot>> {
        self.cameras.read().get(camera_id).cloned()
    }

    fn slot_or_insert(&self, camera_id: &str) -> Result<Arc<CameraSlot>, ConfigError> {
        if let Some(slot) = self.slot(camera_id) {
            return Ok(slot);
        }
        let mut cameras = self.cameras.write();
        if let Some(slot) = cameras.get(camera_id) {
            return Ok(Arc::clone(slot));
        }
        let slot = Arc::new(CameraSlot::new(camera_id, self.config.tracking.clone())?);
        cameras.insert(camera_id.to_string(), Arc::clone(&slot));
        debug!(camera = camera_id, "camera discovered");
        Ok(slot)
    }

    fn snapshot(&self) -> PipelineMetrics {
        self.metrics
            .snapshot(self.queue.len(), self.config.queue_capacity)
    }

    /// Release a task without processing it.
    fn discard(&self, task: FrameTask<D::Frame>) {
        if let Some(slot) = self.slot(&task.camera_id) {
            slot.finish_turn(task.ticket);
        }
        drop(task);
        self.metrics.record_dropped();
    }

    fn process(&self, task: FrameTask<D::Frame>) {
        let FrameTask {
            camera_id,
            frame,
            priority,
            ticket,
            enqueued_at,
        } = task;
        trace!(
            camera = %camera_id,
            ?priority,
            ticket,
            waited_ms = enqueued_at.elapsed().as_secs_f64() * 1000.0,
            "task dequeued"
        );

        self.metrics.worker_busy();
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.track_frame(&camera_id, ticket, &frame)
        }));
        drop(frame);
        self.metrics.worker_idle();

        let elapsed = match outcome {
            Ok(Some(elapsed)) => elapsed,
            Ok(None) => {
                warn!(camera = %camera_id, "no session for camera, frame discarded");
                started.elapsed()
            }
            Err(payload) => {
                error!(
                    camera = %camera_id,
                    panic = panic_message(payload.as_ref()),
                    "frame processing panicked"
                );
                started.elapsed()
            }
        };

        let processed = self.metrics.record_processed(elapsed);
        if processed % self.config.performance_interval == 0 {
            let snapshot = self.snapshot();
            debug!(
                processed = snapshot.processed,
                dropped = snapshot.dropped,
                queue_length = snapshot.queue_length,
                "performance update"
            );
            self.events.publish(PipelineEvent::PerformanceUpdated(snapshot));
        }
    }

    /// Detect and track one frame once its turn has come, then publish the
    /// result before passing the turn on. A detector error or panic degrades
    /// to a predict-only cycle. Returns the time spent after the turn began.
    fn track_frame(&self, camera_id: &str, ticket: u64, frame: &D::Frame) -> Option<Duration> {
        let slot = self.slot(camera_id)?;
        let _turn = slot.wait_turn(ticket);
        let mut session = slot.session.lock();
        let started = Instant::now();

        let detected =
            panic::catch_unwind(AssertUnwindSafe(|| self.detector.detect(camera_id, frame)));
        let detections = match detected {
            Ok(Ok(detections)) => detections,
            Ok(Err(e)) => {
                warn!(camera = camera_id, error = %e, "detection failed, predicting only");
                Vec::new()
            }
            Err(payload) => {
                error!(
                    camera = camera_id,
                    panic = panic_message(payload.as_ref()),
                    "detector panicked, predicting only"
                );
                Vec::new()
            }
        };

        let tracked = session.update(&detections);
        let elapsed = started.elapsed();
        self.events.publish(PipelineEvent::ObjectDetected {
            camera_id: camera_id.to_string(),
            detections,
            tracked,
            processing_time_ms: elapsed.as_secs_f64() * 1000.0,
        });
        Some(elapsed)
    }
}

/// Signals the pipeline when a worker exits, including by unwinding.
struct ExitSignal {
    index: usize,
    done: Sender<usize>,
}

impl Drop for ExitSignal {
    fn drop(&mut self) {
        let _ = self.done.send(self.index);
    }
}

fn worker_loop<D: DetectionSource>(index: usize, shared: Arc<Shared<D>>, done: Sender<usize>) {
    let _exit = ExitSignal { index, done };
    debug!(worker = index, "worker started");
    // Ends once the sender is gone and the queue is empty.
    for task in shared.queue.iter() {
        if shared.cancelled.load(Ordering::Acquire) {
            shared.discard(task);
            continue;
        }
        shared.process(task);
    }
    debug!(worker = index, "worker stopped");
}

fn collect_finished(
    done: &Receiver<usize>,
    expected: usize,
    deadline: Instant,
    finished: &mut HashSet<usize>,
) {
    while finished.len() < expected {
        match done.recv_deadline(deadline) {
            Ok(index) => {
                finished.insert(index);
            }
            Err(_) => break,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "non-string panic payload"
    }
}
