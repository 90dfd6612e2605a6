use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

impl BoundingBox {
    /// Map this box (and its landmarks) into a frame scaled by `factor`.
    pub fn scaled(&self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
            width: self.width * factor,
            height: self.height * factor,
            confidence: self.confidence,
            landmarks: self
                .landmarks
                .map(|lms| lms.map(|(lx, ly)| (lx * factor, ly * factor))),
        }
    }

    /// Corner pixels as `(left, top, right, bottom)`, rounded to the nearest pixel.
    pub fn corners(&self) -> (i32, i32, i32, i32) {
        (
            self.x.round() as i32,
            self.y.round() as i32,
            (self.x + self.width).round() as i32,
            (self.y + self.height).round() as i32,
        )
    }
}

/// Face encoding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
    /// A zero vector on either side yields 0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }
}

/// One enrolled sample: a person's name and the encoding of one of their images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownFace {
    pub name: String,
    /// Image file the encoding was computed from.
    pub source: PathBuf,
    pub embedding: Embedding,
}

/// A face found in a frame that matched someone in the gallery.
#[derive(Debug, Clone, Serialize)]
pub struct Recognition {
    pub name: String,
    pub similarity: f32,
    pub face: BoundingBox,
}

/// Result of matching a probe embedding against a gallery.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub matched: bool,
    /// Similarity of the selected entry (best entry when nothing matched).
    pub similarity: f32,
    /// Gallery index of the matched entry (if any).
    pub index: Option<usize>,
    /// Name of the matched entry (if any).
    pub name: Option<String>,
}

impl MatchResult {
    fn no_match(similarity: f32) -> Self {
        Self {
            matched: false,
            similarity,
            index: None,
            name: None,
        }
    }
}

/// Which gallery entry wins when several are within the threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchPolicy {
    /// First entry in gallery order whose similarity reaches the threshold.
    #[default]
    First,
    /// Highest-similarity entry, if it reaches the threshold.
    Best,
}

impl FromStr for MatchPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "best" => Ok(Self::Best),
            other => Err(format!("unknown match policy '{other}' (expected 'first' or 'best')")),
        }
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &[KnownFace], threshold: f32) -> MatchResult;
}

/// Cosine similarity matcher.
///
/// Always compares the probe against every gallery entry, regardless of policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct CosineMatcher {
    pub policy: MatchPolicy,
}

impl CosineMatcher {
    pub fn new(policy: MatchPolicy) -> Self {
        Self { policy }
    }
}

impl Matcher for CosineMatcher {
    fn compare(&self, probe: &Embedding, gallery: &[KnownFace], threshold: f32) -> MatchResult {
        let mut best_sim = f32::NEG_INFINITY;
        let mut best_idx: Option<usize> = None;
        let mut first_hit: Option<(usize, f32)> = None;

        for (i, known) in gallery.iter().enumerate() {
            let sim = probe.similarity(&known.embedding);
            if sim >= threshold && first_hit.is_none() {
                first_hit = Some((i, sim));
            }
            if sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        let selected = match self.policy {
            MatchPolicy::First => first_hit,
            MatchPolicy::Best => best_idx
                .filter(|_| best_sim >= threshold)
                .map(|idx| (idx, best_sim)),
        };

        match selected {
            Some((idx, sim)) => MatchResult {
                matched: true,
                similarity: sim,
                index: Some(idx),
                name: Some(gallery[idx].name.clone()),
            },
            None => MatchResult::no_match(if best_idx.is_none() { 0.0 } else { best_sim }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding { values: values.to_vec(), model_version: None }
    }

    fn known(name: &str, values: &[f32]) -> KnownFace {
        KnownFace {
            name: name.into(),
            source: PathBuf::from(format!("{name}.jpg")),
            embedding: emb(values),
        }
    }

    #[test]
    fn test_cosine_similarity_identical() {
        let a = emb(&[1.0, 0.0, 0.0]);
        assert!((a.similarity(&a.clone()) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        assert!(emb(&[1.0, 0.0]).similarity(&emb(&[0.0, 1.0])).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        assert!((emb(&[1.0, 0.0]).similarity(&emb(&[-1.0, 0.0])) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_similarity_zero_vector() {
        assert_eq!(emb(&[0.0, 0.0]).similarity(&emb(&[1.0, 0.0])), 0.0);
    }

    #[test]
    fn test_first_policy_takes_first_hit_in_gallery_order() {
        let probe = emb(&[1.0, 0.0, 0.0]);
        let gallery = vec![
            known("decoy", &[0.0, 1.0, 0.0]),
            known("alice", &[0.8, 0.6, 0.0]),
            known("bob", &[1.0, 0.0, 0.0]),
        ];

        let result = CosineMatcher::new(MatchPolicy::First).compare(&probe, &gallery, 0.5);
        assert!(result.matched);
        assert_eq!(result.index, Some(1));
        assert_eq!(result.name.as_deref(), Some("alice"));
        assert!((result.similarity - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_best_policy_takes_highest_similarity() {
        let probe = emb(&[1.0, 0.0, 0.0]);
        let gallery = vec![
            known("decoy", &[0.0, 1.0, 0.0]),
            known("alice", &[0.8, 0.6, 0.0]),
            known("bob", &[1.0, 0.0, 0.0]),
        ];

        let result = CosineMatcher::new(MatchPolicy::Best).compare(&probe, &gallery, 0.5);
        assert!(result.matched);
        assert_eq!(result.index, Some(2));
        assert_eq!(result.name.as_deref(), Some("bob"));
        assert!((result.similarity - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_no_match_reports_best_similarity() {
        let probe = emb(&[1.0, 0.0, 0.0]);
        let gallery = vec![known("other", &[0.0, 1.0, 0.0])];

        for policy in [MatchPolicy::First, MatchPolicy::Best] {
            let result = CosineMatcher::new(policy).compare(&probe, &gallery, 0.5);
            assert!(!result.matched);
            assert!(result.name.is_none());
            assert!(result.similarity.abs() < 1e-6);
        }
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let probe = emb(&[1.0, 0.0]);
        let gallery = vec![known("exact", &[1.0, 0.0])];
        let result = CosineMatcher::default().compare(&probe, &gallery, 1.0);
        assert!(result.matched);
    }

    #[test]
    fn test_empty_gallery() {
        let probe = emb(&[1.0, 0.0]);
        let result = CosineMatcher::default().compare(&probe, &[], 0.5);
        assert!(!result.matched);
        assert_eq!(result.similarity, 0.0);
    }

    #[test]
    fn test_match_policy_from_str() {
        assert_eq!("first".parse::<MatchPolicy>(), Ok(MatchPolicy::First));
        assert_eq!(" BEST ".parse::<MatchPolicy>(), Ok(MatchPolicy::Best));
        assert!("nearest".parse::<MatchPolicy>().is_err());
    }

    #[test]
    fn test_scaled_box_and_landmarks() {
        let b = BoundingBox {
            x: 10.0, y: 20.0, width: 30.0, height: 40.0, confidence: 0.9,
            landmarks: Some([(1.0, 2.0); 5]),
        };
        let s = b.scaled(2.0);
        assert_eq!((s.x, s.y, s.width, s.height), (20.0, 40.0, 60.0, 80.0));
        assert_eq!(s.confidence, 0.9);
        assert_eq!(s.landmarks, Some([(2.0, 4.0); 5]));
        assert_eq!(s.corners(), (20, 40, 80, 120));
    }
}
