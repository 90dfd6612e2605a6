//! Known-face gallery loaded from `<root>/<name>/<image>` folders.

use crate::pipeline::SampleEncoder;
use crate::types::KnownFace;
use image::{ImageReader, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("known faces directory not found: {0}")]
    DirNotFound(String),
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// One image file belonging to a named person.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub name: String,
    pub path: PathBuf,
}

/// An image that did not contribute an encoding.
#[derive(Debug, Clone)]
pub struct SkippedSample {
    pub sample: Sample,
    pub reason: String,
}

/// Outcome of [`Gallery::load`].
#[derive(Debug, Clone, Default)]
pub struct GalleryReport {
    pub loaded: usize,
    pub skipped: Vec<SkippedSample>,
}

/// Enrolled encodings, in directory order (names sorted, then files sorted).
#[derive(Debug, Clone, Default)]
pub struct Gallery {
    entries: Vec<KnownFace>,
}

fn read_dir_sorted(dir: &Path) -> Result<Vec<PathBuf>, GalleryError> {
    let io_err = |source| GalleryError::Io {
        path: dir.display().to_string(),
        source,
    };
    let mut paths = std::fs::read_dir(dir)
        .map_err(io_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(io_err)?;
    paths.sort();
    Ok(paths)
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

/// List every sample under `root`. Each subdirectory is a person; each file
/// inside it is one image. Files directly under `root` and hidden entries are ignored.
pub fn scan(root: &Path) -> Result<Vec<Sample>, GalleryError> {
    if !root.is_dir() {
        return Err(GalleryError::DirNotFound(root.display().to_string()));
    }

    let mut samples = Vec::new();
    for person_dir in read_dir_sorted(root)? {
        if !person_dir.is_dir() || is_hidden(&person_dir) {
            continue;
        }
        let Some(name) = person_dir.file_name().and_then(|n| n.to_str()) else {
            tracing::warn!(path = %person_dir.display(), "skipping non UTF-8 directory name");
            continue;
        };
        for path in read_dir_sorted(&person_dir)? {
            if path.is_file() && !is_hidden(&path) {
                samples.push(Sample {
                    name: name.to_string(),
                    path,
                });
            }
        }
    }
    Ok(samples)
}

/// Decode an image, picking the decoder from the file contents rather than the extension.
fn decode_sample(path: &Path) -> image::ImageResult<RgbImage> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(image.to_rgb8())
}

impl Gallery {
    pub fn from_entries(entries: Vec<KnownFace>) -> Self {
        Self { entries }
    }

    /// Encode every sample under `root`.
    ///
    /// The most confident face of each image becomes that sample's encoding.
    /// Undecodable images, images without a face and images the encoder
    /// fails on are reported as skipped.
    pub fn load<E>(root: &Path, encoder: &mut E) -> Result<(Self, GalleryReport), GalleryError>
    where
        E: SampleEncoder + ?Sized,
    {
        tracing::info!(dir = %root.display(), "loading known faces");

        let mut entries = Vec::new();
        let mut report = GalleryReport::default();

        for sample in scan(root)? {
            let image = match decode_sample(&sample.path) {
                Ok(image) => image,
                Err(e) => {
                    tracing::warn!(path = %sample.path.display(), error = %e, "cannot decode image; skipping");
                    report.skipped.push(SkippedSample { sample, reason: e.to_string() });
                    continue;
                }
            };

            match encoder.encode_sample(&image) {
                Ok(Some((face, embedding))) => {
                    tracing::debug!(
                        name = %sample.name,
                        path = %sample.path.display(),
                        confidence = face.confidence,
                        "encoded known face"
                    );
                    entries.push(KnownFace {
                        name: sample.name,
                        source: sample.path,
                        embedding,
                    });
                }
                Ok(None) => {
                    tracing::warn!(path = %sample.path.display(), "no face found; skipping");
                    report.skipped.push(SkippedSample {
                        sample,
                        reason: "no face detected".to_string(),
                    });
                }
                Err(e) => {
                    tracing::warn!(path = %sample.path.display(), error = %e, "encoding failed; skipping");
                    report.skipped.push(SkippedSample { sample, reason: e.to_string() });
                }
            }
        }

        report.loaded = entries.len();
        let gallery = Self::from_entries(entries);
        tracing::info!(
            encodings = report.loaded,
            people = gallery.names().len(),
            skipped = report.skipped.len(),
            "known faces loaded"
        );
        Ok((gallery, report))
    }

    pub fn entries(&self) -> &[KnownFace] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct names, in gallery order.
    pub fn names(&self) -> Vec<&str> {
        self.counts().into_iter().map(|(name, _)| name).collect()
    }

    /// Number of encodings per name, in gallery order.
    pub fn counts(&self) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for entry in &self.entries {
            match counts.iter().position(|(name, _)| *name == entry.name) {
                Some(i) => counts[i].1 += 1,
                None => counts.push((entry.name.as_str(), 1)),
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{EncodedFace, PipelineError};
    use crate::recognizer::RecognizerError;
    use crate::types::{BoundingBox, Embedding};
    use image::{ImageFormat, Rgb};
    use std::fs;

    const FACE: Rgb<u8> = Rgb([200, 10, 10]);
    const NO_FACE: Rgb<u8> = Rgb([0, 0, 0]);
    const BROKEN: Rgb<u8> = Rgb([0, 0, 255]);

    /// Stands in for the ONNX models: the colour of the top-left pixel
    /// decides whether a face is found.
    #[derive(Default)]
    struct FakeEncoder {
        calls: usize,
    }

    impl SampleEncoder for FakeEncoder {
        fn encode_sample(&mut self, image: &RgbImage) -> Result<Option<EncodedFace>, PipelineError> {
            self.calls += 1;
            let pixel = *image.get_pixel(0, 0);
            if pixel == NO_FACE {
                return Ok(None);
            }
            if pixel == BROKEN {
                return Err(RecognizerError::InferenceFailed("bad tensor".into()).into());
            }
            let face = BoundingBox {
                x: 0.0, y: 0.0, width: 4.0, height: 4.0, confidence: 0.9,
                landmarks: Some([(1.0, 1.0); 5]),
            };
            let embedding = Embedding {
                values: pixel.0.iter().map(|&c| f32::from(c)).collect(),
                model_version: None,
            };
            Ok(Some((face, embedding)))
        }
    }

    fn write_png(path: &Path, colour: Rgb<u8>) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        RgbImage::from_pixel(8, 8, colour)
            .save_with_format(path, ImageFormat::Png)
            .unwrap();
    }

    fn touch(path: &Path) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"not really an image").unwrap();
    }

    #[test]
    fn test_scan_sorted_by_name_then_file() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("zoe/2.jpg"));
        touch(&root.join("zoe/1.jpg"));
        touch(&root.join("adam/photo.png"));

        let samples = scan(root).unwrap();
        let got: Vec<(String, String)> = samples
            .iter()
            .map(|s| (s.name.clone(), s.path.file_name().unwrap().to_string_lossy().into_owned()))
            .collect();
        assert_eq!(
            got,
            vec![
                ("adam".to_string(), "photo.png".to_string()),
                ("zoe".to_string(), "1.jpg".to_string()),
                ("zoe".to_string(), "2.jpg".to_string()),
            ]
        );
    }

    #[test]
    fn test_scan_ignores_stray_and_hidden_entries() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("stray.jpg"));
        touch(&root.join(".cache/x.jpg"));
        touch(&root.join("eve/.DS_Store"));
        touch(&root.join("eve/eve.jpg"));
        fs::create_dir_all(root.join("eve/nested")).unwrap();

        let samples = scan(root).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].name, "eve");
    }

    #[test]
    fn test_scan_empty_person_dir() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("nobody")).unwrap();
        assert!(scan(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, GalleryError::DirNotFound(_)));
    }

    #[test]
    fn test_names_and_counts_keep_gallery_order() {
        let entry = |name: &str| KnownFace {
            name: name.into(),
            source: PathBuf::from(format!("{name}.jpg")),
            embedding: Embedding { values: vec![1.0], model_version: None },
        };
        let gallery = Gallery::from_entries(vec![entry("bo"), entry("al"), entry("bo")]);

        assert_eq!(gallery.len(), 3);
        assert_eq!(gallery.names(), vec!["bo", "al"]);
        assert_eq!(gallery.counts(), vec![("bo", 2), ("al", 1)]);
        assert!(Gallery::default().is_empty());
    }

    #[test]
    fn test_load_detects_format_from_contents() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write_png(&root.join("alice/portrait"), FACE);
        write_png(&root.join("bob/mislabelled.jpg"), FACE);

        let (gallery, report) = Gallery::load(root, &mut FakeEncoder::default()).unwrap();

        assert!(report.skipped.is_empty(), "skipped: {:?}", report.skipped);
        assert_eq!(gallery.names(), vec!["alice", "bob"]);
        assert_eq!(gallery.entries()[0].embedding.values, vec![200.0, 10.0, 10.0]);
    }

    #[test]
    fn test_load_skips_bad_samples_and_keeps_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        touch(&root.join("carol/garbage.jpg"));
        write_png(&root.join("carol/good.png"), FACE);
        write_png(&root.join("dave/blank.png"), NO_FACE);
        write_png(&root.join("erin/corrupt.png"), BROKEN);

        let mut encoder = FakeEncoder::default();
        let (gallery, report) = Gallery::load(root, &mut encoder).unwrap();

        assert_eq!(encoder.calls, 3);
        assert_eq!(report.loaded, 1);
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery.entries()[0].name, "carol");
        assert!(gallery.entries()[0].source.ends_with("carol/good.png"));

        let skipped: Vec<(&str, &str)> = report
            .skipped
            .iter()
            .map(|s| (s.sample.name.as_str(), s.reason.as_str()))
            .collect();
        assert_eq!(skipped.len(), 3);
        assert_eq!(skipped[0].0, "carol");
        assert_eq!(skipped[1], ("dave", "no face detected"));
        assert_eq!(skipped[2].0, "erin");
        assert!(skipped[2].1.contains("bad tensor"));
    }

    #[test]
    fn test_load_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = Gallery::load(&dir.path().join("missing"), &mut FakeEncoder::default()).unwrap_err();
        assert!(matches!(err, GalleryError::DirNotFound(_)));
    }
}
