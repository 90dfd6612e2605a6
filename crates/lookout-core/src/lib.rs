//! lookout-core: face detection, encoding and gallery matching.
//!
//! Uses SCRFD for face detection and ArcFace for face encodings,
//! both running via ONNX Runtime for CPU inference.

pub mod alignment;
pub mod detector;
pub mod gallery;
pub mod pipeline;
pub mod recognizer;
pub mod types;

pub use detector::{DetectorOptions, FaceDetector};
pub use gallery::{Gallery, GalleryError, GalleryReport};
pub use pipeline::{EncodedFace, FaceEngine, PipelineError, SampleEncoder};
pub use recognizer::FaceRecognizer;
pub use types::{
    BoundingBox, CosineMatcher, Embedding, KnownFace, MatchPolicy, MatchResult, Matcher,
    Recognition,
};

/// SCRFD detection model file name inside the model directory.
pub const DETECTOR_MODEL_FILE: &str = "det_10g.onnx";

/// ArcFace recognition model file name inside the model directory.
pub const RECOGNIZER_MODEL_FILE: &str = "w600k_r50.onnx";
