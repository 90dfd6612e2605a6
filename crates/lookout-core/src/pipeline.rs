//! Detect → encode → compare, shared by the live loop and still-image identification.

use crate::detector::{DetectorError, DetectorOptions, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::{BoundingBox, Embedding, KnownFace, Matcher, Recognition};
use crate::{DETECTOR_MODEL_FILE, RECOGNIZER_MODEL_FILE};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// A detected face together with its encoding.
pub type EncodedFace = (BoundingBox, Embedding);

/// Produces the encoding of one enrollment image.
pub trait SampleEncoder {
    /// Encoding of the face that represents `image`, or `None` when it has no usable face.
    fn encode_sample(&mut self, image: &RgbImage) -> Result<Option<EncodedFace>, PipelineError>;
}

/// Detector and recognizer pair.
pub struct FaceEngine {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl FaceEngine {
    pub fn new(detector: FaceDetector, recognizer: FaceRecognizer) -> Self {
        Self { detector, recognizer }
    }

    /// Load both models from `model_dir` (`det_10g.onnx`, `w600k_r50.onnx`).
    pub fn load(model_dir: &Path, options: DetectorOptions) -> Result<Self, PipelineError> {
        let detector = FaceDetector::load(&model_dir.join(DETECTOR_MODEL_FILE), options)?;
        let recognizer = FaceRecognizer::load(&model_dir.join(RECOGNIZER_MODEL_FILE))?;
        Ok(Self::new(detector, recognizer))
    }

    /// Detect every face in `image` and encode it. Ordered by detection confidence.
    pub fn encode_faces(&mut self, image: &RgbImage) -> Result<Vec<EncodedFace>, PipelineError> {
        let faces = with_landmarks(self.detector.detect(image)?);
        let embeddings = self.recognizer.encode_all(image, &faces)?;
        Ok(faces.into_iter().zip(embeddings).collect())
    }

    /// Encode only the most confident face in `image`, if there is one.
    pub fn encode_primary(&mut self, image: &RgbImage) -> Result<Option<EncodedFace>, PipelineError> {
        let Some(face) = most_confident(self.detector.detect(image)?) else {
            return Ok(None);
        };
        let embedding = self.recognizer.encode(image, &face)?;
        Ok(Some((face, embedding)))
    }

    /// Detect, encode and match every face in `image`; only matched faces are returned.
    pub fn recognize(
        &mut self,
        image: &RgbImage,
        gallery: &[KnownFace],
        matcher: &dyn Matcher,
        threshold: f32,
    ) -> Result<Vec<Recognition>, PipelineError> {
        let encoded = self.encode_faces(image)?;
        Ok(identify(encoded, gallery, matcher, threshold))
    }
}

impl SampleEncoder for FaceEngine {
    fn encode_sample(&mut self, image: &RgbImage) -> Result<Option<EncodedFace>, PipelineError> {
        self.encode_primary(image)
    }
}

/// Faces the recognizer can align, in their original order.
fn with_landmarks(faces: Vec<BoundingBox>) -> Vec<BoundingBox> {
    let total = faces.len();
    let kept: Vec<BoundingBox> = faces.into_iter().filter(|f| f.landmarks.is_some()).collect();
    if kept.len() < total {
        tracing::debug!(skipped = total - kept.len(), "skipping faces without landmarks");
    }
    kept
}

/// Highest-confidence face with landmarks; the earliest one wins a tie.
fn most_confident(faces: Vec<BoundingBox>) -> Option<BoundingBox> {
    with_landmarks(faces)
        .into_iter()
        .reduce(|best, face| if face.confidence > best.confidence { face } else { best })
}

/// Match encoded faces against the gallery, keeping detection order.
pub fn identify(
    encoded: Vec<EncodedFace>,
    gallery: &[KnownFace],
    matcher: &dyn Matcher,
    threshold: f32,
) -> Vec<Recognition> {
    encoded
        .into_iter()
        .filter_map(|(face, embedding)| {
            let result = matcher.compare(&embedding, gallery, threshold);
            tracing::trace!(
                matched = result.matched,
                similarity = result.similarity,
                name = ?result.name,
                "face compared"
            );
            result.name.filter(|_| result.matched).map(|name| Recognition {
                name,
                similarity: result.similarity,
                face,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CosineMatcher, MatchPolicy};
    use std::path::PathBuf;

    fn face(x: f32) -> BoundingBox {
        BoundingBox {
            x, y: 0.0, width: 10.0, height: 10.0, confidence: 0.9,
            landmarks: Some([(0.0, 0.0); 5]),
        }
    }

    fn emb(values: &[f32]) -> Embedding {
        Embedding { values: values.to_vec(), model_version: None }
    }

    fn gallery() -> Vec<KnownFace> {
        vec![
            KnownFace { name: "alice".into(), source: PathBuf::from("a.jpg"), embedding: emb(&[1.0, 0.0]) },
            KnownFace { name: "bob".into(), source: PathBuf::from("b.jpg"), embedding: emb(&[0.0, 1.0]) },
        ]
    }

    #[test]
    fn test_identify_drops_unmatched_faces() {
        let encoded = vec![
            (face(0.0), emb(&[0.0, 1.0])),
            (face(50.0), emb(&[-1.0, 0.0])),
            (face(100.0), emb(&[1.0, 0.1])),
        ];
        let matcher = CosineMatcher::new(MatchPolicy::First);
        let found = identify(encoded, &gallery(), &matcher, 0.4);

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].name, "bob");
        assert_eq!(found[0].face.x, 0.0);
        assert_eq!(found[1].name, "alice");
        assert_eq!(found[1].face.x, 100.0);
    }

    fn scored(x: f32, confidence: f32, landmarks: bool) -> BoundingBox {
        BoundingBox {
            confidence,
            landmarks: landmarks.then_some([(0.0, 0.0); 5]),
            ..face(x)
        }
    }

    #[test]
    fn test_with_landmarks_drops_unalignable_faces_in_order() {
        let kept = with_landmarks(vec![
            scored(0.0, 0.9, true),
            scored(10.0, 0.8, false),
            scored(20.0, 0.7, true),
        ]);
        let xs: Vec<f32> = kept.iter().map(|f| f.x).collect();
        assert_eq!(xs, vec![0.0, 20.0]);
    }

    #[test]
    fn test_most_confident_picks_highest_score() {
        let best = most_confident(vec![
            scored(0.0, 0.6, true),
            scored(10.0, 0.95, false),
            scored(20.0, 0.8, true),
            scored(30.0, 0.8, true),
        ])
        .unwrap();
        assert_eq!(best.x, 20.0);
    }

    #[test]
    fn test_most_confident_none_without_landmarks() {
        assert!(most_confident(vec![scored(0.0, 0.9, false)]).is_none());
        assert!(most_confident(Vec::new()).is_none());
    }

    #[test]
    fn test_identify_empty_gallery() {
        let encoded = vec![(face(0.0), emb(&[1.0, 0.0]))];
        let found = identify(encoded, &[], &CosineMatcher::default(), 0.4);
        assert!(found.is_empty());
    }
}
