use std::convert::Infallible;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

use multicam_track::logging::{LogConfig, LogFormat, LogLevel, init_logging};
use multicam_track::{
    Detection, DetectionBuilder, DetectionSource, Frame, FramePipeline, PipelineConfig,
    PipelineEvent, PipelineMetrics, Priority, StrategyKind, TrackerStatistics,
};

#[derive(Parser)]
#[command(
    name = "multicam-sim",
    about = "Drive the multi-camera tracking pipeline with synthetic pedestrians",
    version
)]
struct Args {
    /// Path to a JSON pipeline configuration
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of simulated cameras
    #[arg(long, default_value_t = 4)]
    cameras: usize,

    /// Frames generated per camera
    #[arg(long, default_value_t = 300)]
    frames: u64,

    /// Pedestrians walking through each camera's view
    #[arg(long, default_value_t = 3)]
    people: usize,

    /// Tracking strategy (sort, bytetrack, deepsort, strongsort)
    #[arg(short, long)]
    strategy: Option<StrategyKind>,

    /// Worker threads
    #[arg(short, long)]
    workers: Option<usize>,

    /// Keep every n-th frame per camera
    #[arg(long)]
    frame_skip: Option<u32>,

    /// Delay between frame batches
    #[arg(long, default_value_t = 10)]
    interval_ms: u64,

    #[arg(long, default_value = "info")]
    log_level: LogLevel,

    #[arg(long, default_value = "compact")]
    log_format: LogFormat,
}

/// Pedestrians moving on straight lines across a 1280x720 view. Every
/// seventh frame each person is partially occluded and reported with a low
/// score, and every thirteenth frame one of them is missed entirely.
struct SyntheticDetector {
    people: usize,
}

impl SyntheticDetector {
    fn person(&self, camera_index: u64, person: usize, sequence: u64) -> Option<Detection> {
        let lane = person as f32;
        let speed = 2.0 + lane + camera_index as f32 * 0.5;
        let x = (40.0 + lane * 150.0 + speed * sequence as f32) % 1200.0;
        let y = 120.0 + lane * 160.0;

        if sequence % 13 == 0 && person == (sequence as usize / 13) % self.people.max(1) {
            return None;
        }
        let score = if (sequence + person as u64) % 7 == 0 { 0.35 } else { 0.88 };
        Some(
            DetectionBuilder::new()
                .tlwh(x, y, 60.0, 150.0)
                .score(score)
                .build(),
        )
    }
}

impl DetectionSource for SyntheticDetector {
    type Frame = Frame;
    type Error = Infallible;

    fn detect(&self, camera_id: &str, frame: &Frame) -> Result<Vec<Detection>, Infallible> {
        let camera_index = camera_id
            .rsplit('-')
            .next()
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);
        Ok((0..self.people)
            .filter_map(|p| self.person(camera_index, p, frame.sequence))
            .collect())
    }
}

#[derive(Serialize)]
struct Summary {
    metrics: PipelineMetrics,
    cameras: Vec<(String, TrackerStatistics)>,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    init_logging(&LogConfig {
        level: args.log_level,
        format: args.log_format,
        thread_names: true,
    });

    let mut config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(strategy) = args.strategy {
        config.tracking.strategy = strategy;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(frame_skip) = args.frame_skip {
        config.frame_skip = frame_skip;
    }

    let detector = SyntheticDetector {
        people: args.people,
    };
    let pipeline = FramePipeline::new(detector, config)?;
    let events = pipeline.subscribe();
    pipeline.start()?;

    let reporter = thread::spawn(move || {
        let mut detected = 0u64;
        for event in events.iter() {
            match event {
                PipelineEvent::ObjectDetected { .. } => detected += 1,
                PipelineEvent::PerformanceUpdated(metrics) => info!(
                    processed = metrics.processed,
                    dropped = metrics.dropped,
                    queue_utilization = metrics.queue_utilization,
                    average_processing_ms = metrics.average_processing_ms,
                    "throughput"
                ),
            }
        }
        detected
    });

    let camera_ids: Vec<String> = (0..args.cameras).map(|i| format!("cam-{i}")).collect();
    let interval = Duration::from_millis(args.interval_ms);
    for sequence in 0..args.frames {
        for camera_id in &camera_ids {
            let frame = Frame::new(Vec::new(), 1280, 720, sequence);
            pipeline.enqueue(camera_id, &frame, Priority::Normal);
        }
        thread::sleep(interval);
    }

    let report = pipeline.shutdown();
    if !report.drained {
        warn!(?report, "pipeline did not drain cleanly");
    }

    let summary = Summary {
        metrics: pipeline.metrics(),
        cameras: pipeline
            .cameras()
            .into_iter()
            .filter_map(|id| pipeline.camera_statistics(&id).map(|s| (id, s)))
            .collect(),
    };
    // Shutdown closed the event bus, even with workers detached.
    let detected = reporter.join().unwrap_or(0);
    info!(frames_reported = detected, "simulation finished");

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
