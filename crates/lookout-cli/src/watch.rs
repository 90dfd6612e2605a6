//! Live loop: read → sample → downscale → recognize → draw → show.

use crate::config::Config;
use crate::engine::{spawn_engine, EngineHandle, EngineState};
use crate::shutdown::{install_ctrl_c, ShutdownFlag};
use anyhow::{bail, Context, Result};
use lookout_core::{CosineMatcher, FaceEngine, Gallery, Recognition};
use lookout_stream::{
    configure_transport, frame, overlay, FrameSampler, ReconnectState, VideoStream, Window,
};
use std::time::Instant;

const STATS_EVERY: u64 = 100;
const KEY_WAIT_MS: i32 = 1;

/// Loop counters, logged every [`STATS_EVERY`] processed frames.
#[derive(Debug)]
struct Stats {
    started: Instant,
    processed: u64,
    recognized: u64,
}

impl Stats {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            processed: 0,
            recognized: 0,
        }
    }

    fn record(&mut self, read: u64, recognitions: &[Recognition]) {
        self.processed += 1;
        self.recognized += recognitions.len() as u64;

        if self.processed % STATS_EVERY == 0 {
            let elapsed = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
            tracing::debug!(
                read,
                processed = self.processed,
                recognized = self.recognized,
                processed_fps = self.processed as f64 / elapsed,
                "watch stats"
            );
        }
    }
}

pub fn run(config: &Config) -> Result<()> {
    let stream_options = config.stream_options()?;
    // Before ONNX Runtime or any of our threads start.
    configure_transport(stream_options.transport);

    let shutdown = ShutdownFlag::new();
    install_ctrl_c(shutdown.clone()).context("installing Ctrl-C handler")?;

    let mut faces = FaceEngine::load(&config.model_dir, config.detector_options())
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    let (gallery, _report) = Gallery::load(&config.known_faces_dir, &mut faces)?;
    if gallery.is_empty() {
        bail!(
            "no known faces could be encoded from {}",
            config.known_faces_dir.display()
        );
    }

    tracing::info!(
        encodings = gallery.len(),
        people = gallery.names().len(),
        threshold = config.similarity_threshold,
        policy = ?config.match_policy,
        "gallery ready"
    );

    let (engine, worker) = spawn_engine(EngineState {
        faces,
        gallery,
        matcher: CosineMatcher::new(config.match_policy),
        threshold: config.similarity_threshold,
    })?;

    let result = VideoStream::open(stream_options)
        .context("opening stream")
        .and_then(|stream| watch_stream(config, stream, &engine, &shutdown));

    drop(engine);
    if worker.join().is_err() {
        tracing::error!("engine thread panicked");
    }
    result
}

fn watch_stream(
    config: &Config,
    mut stream: VideoStream,
    engine: &EngineHandle,
    shutdown: &ShutdownFlag,
) -> Result<()> {
    let window = if config.headless {
        None
    } else {
        Some(Window::open(&config.window_title)?)
    };
    let mut sampler = FrameSampler::new(config.skip_frames);
    let mut reconnect = ReconnectState::new(config.reconnect_policy());
    let mut stats = Stats::new();

    tracing::info!(
        url = %stream.url(),
        skip_frames = config.skip_frames,
        scale = config.scale,
        headless = config.headless,
        "watching stream"
    );

    loop {
        if shutdown.is_requested() {
            tracing::info!(frames = sampler.count(), "stopping on interrupt");
            return Ok(());
        }

        let frame = match stream.read() {
            Ok(Some(frame)) => {
                reconnect.record_success();
                frame
            }
            outcome => {
                if let Err(e) = outcome {
                    tracing::warn!(error = %e, "frame read failed");
                }
                wait_and_reopen(&mut stream, &mut reconnect, shutdown)?;
                continue;
            }
        };

        if !sampler.should_process() {
            continue;
        }

        let mut small = frame::downscale(&frame, config.scale)?;
        let recognitions = engine.recognize(frame::mat_to_rgb(&small)?)?;
        stats.record(sampler.count(), &recognitions);

        let Some(window) = &window else {
            log_recognitions(&recognitions, config.scale);
            continue;
        };

        overlay::draw_recognitions(&mut small, &recognitions)?;
        window.show(&small)?;
        if window.poll_quit(KEY_WAIT_MS)? {
            tracing::info!(frames = sampler.count(), "quit requested");
            return Ok(());
        }
    }
}

fn wait_and_reopen(
    stream: &mut VideoStream,
    reconnect: &mut ReconnectState,
    shutdown: &ShutdownFlag,
) -> Result<()> {
    let Some(wait) = reconnect.next_backoff() else {
        bail!(
            "stream {} stopped producing frames ({} reconnect attempts)",
            stream.url(),
            reconnect.consecutive_failures()
        );
    };

    tracing::warn!(
        attempt = reconnect.consecutive_failures(),
        total = reconnect.total_reconnects(),
        wait_ms = wait.as_millis() as u64,
        "no frame from stream; reconnecting"
    );
    if shutdown.sleep(wait) {
        return Ok(());
    }

    if let Err(e) = stream.reopen() {
        tracing::warn!(error = %e, "reconnect failed");
    }
    Ok(())
}

/// Report recognitions in source-stream pixel coordinates.
fn log_recognitions(recognitions: &[Recognition], scale: f64) {
    for r in recognitions {
        let (left, top, right, bottom) = r.face.scaled(1.0 / scale as f32).corners();
        tracing::info!(
            name = %r.name,
            similarity = r.similarity,
            left,
            top,
            right,
            bottom,
            "face recognized"
        );
    }
}
