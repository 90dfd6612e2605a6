use image::RgbImage;
use lookout_core::{CosineMatcher, FaceEngine, Gallery, PipelineError, Recognition};
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Everything the engine thread owns.
pub struct EngineState {
    pub faces: FaceEngine,
    pub gallery: Gallery,
    pub matcher: CosineMatcher,
    pub threshold: f32,
}

/// Work done on the engine thread for each frame.
pub trait FrameRecognizer {
    fn recognize(&mut self, frame: &RgbImage) -> Result<Vec<Recognition>, EngineError>;
}

impl FrameRecognizer for EngineState {
    fn recognize(&mut self, frame: &RgbImage) -> Result<Vec<Recognition>, EngineError> {
        let found = self
            .faces
            .recognize(frame, self.gallery.entries(), &self.matcher, self.threshold)?;
        Ok(found)
    }
}

/// Messages sent from the capture loop to the engine thread.
enum EngineRequest {
    Recognize {
        frame: RgbImage,
        reply: oneshot::Sender<Result<Vec<Recognition>, EngineError>>,
    },
}

/// Handle to the engine thread. The thread exits once the handle is dropped.
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Recognize faces in `frame`, blocking until the engine replies.
    ///
    /// Must not be called from inside an async runtime.
    pub fn recognize(&self, frame: RgbImage) -> Result<Vec<Recognition>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .blocking_send(EngineRequest::Recognize {
                frame,
                reply: reply_tx,
            })
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.blocking_recv().map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
pub fn spawn_engine<R>(mut state: R) -> Result<(EngineHandle, JoinHandle<()>), EngineError>
where
    R: FrameRecognizer + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(1);

    let worker = std::thread::Builder::new()
        .name("lookout-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Recognize { frame, reply } => {
                        let result = state.recognize(&frame);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok((EngineHandle { tx }, worker))
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::BoundingBox;

    /// Reports one face per frame, named after the frame width.
    struct WidthNamer {
        frames: usize,
    }

    impl FrameRecognizer for WidthNamer {
        fn recognize(&mut self, frame: &RgbImage) -> Result<Vec<Recognition>, EngineError> {
            self.frames += 1;
            Ok(vec![Recognition {
                name: format!("w{}-n{}", frame.width(), self.frames),
                similarity: 1.0,
                face: BoundingBox {
                    x: 0.0, y: 0.0, width: 1.0, height: 1.0, confidence: 1.0, landmarks: None,
                },
            }])
        }
    }

    #[test]
    fn test_engine_replies_in_order_and_exits_on_drop() {
        let (engine, worker) = spawn_engine(WidthNamer { frames: 0 }).unwrap();

        let first = engine.recognize(RgbImage::new(4, 2)).unwrap();
        let second = engine.recognize(RgbImage::new(8, 2)).unwrap();
        assert_eq!(first[0].name, "w4-n1");
        assert_eq!(second[0].name, "w8-n2");

        drop(engine);
        assert!(worker.join().is_ok());
    }
}
