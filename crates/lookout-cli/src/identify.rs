//! One-shot recognition of a still image.

use crate::config::Config;
use anyhow::{bail, Context, Result};
use lookout_core::{CosineMatcher, FaceEngine, Gallery, Recognition};
use lookout_stream::{frame, overlay};
use opencv::core::Vector;
use opencv::imgcodecs;
use opencv::prelude::*;
use std::path::Path;

pub fn run(config: &Config, image_path: &Path, output: Option<&Path>, json: bool) -> Result<()> {
    let mut faces = FaceEngine::load(&config.model_dir, config.detector_options())
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    let (gallery, _report) = Gallery::load(&config.known_faces_dir, &mut faces)?;

    let path = image_path.to_string_lossy();
    let mut image = imgcodecs::imread(&path, imgcodecs::IMREAD_COLOR)?;
    if image.empty() {
        bail!("cannot read image {}", image_path.display());
    }

    let matcher = CosineMatcher::new(config.match_policy);
    let recognitions = faces.recognize(
        &frame::mat_to_rgb(&image)?,
        gallery.entries(),
        &matcher,
        config.similarity_threshold,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&recognitions)?);
    } else {
        print!("{}", render_table(&recognitions));
    }

    if let Some(output) = output {
        overlay::draw_recognitions(&mut image, &recognitions)?;
        let written = imgcodecs::imwrite(&output.to_string_lossy(), &image, &Vector::new())?;
        if !written {
            bail!("cannot write annotated image {}", output.display());
        }
        tracing::info!(path = %output.display(), "annotated image written");
    }

    Ok(())
}

fn render_table(recognitions: &[Recognition]) -> String {
    if recognitions.is_empty() {
        return "no known faces found\n".to_string();
    }
    recognitions
        .iter()
        .map(|r| {
            let (left, top, right, bottom) = r.face.corners();
            format!(
                "{}\tsimilarity={:.3}\tbox=({left},{top})-({right},{bottom})\n",
                r.name, r.similarity
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use lookout_core::BoundingBox;

    #[test]
    fn test_render_table() {
        let recognitions = vec![Recognition {
            name: "alice".into(),
            similarity: 0.61234,
            face: BoundingBox {
                x: 10.0, y: 20.0, width: 30.0, height: 40.0, confidence: 0.9, landmarks: None,
            },
        }];
        assert_eq!(
            render_table(&recognitions),
            "alice\tsimilarity=0.612\tbox=(10,20)-(40,60)\n"
        );
    }

    #[test]
    fn test_render_table_empty() {
        assert_eq!(render_table(&[]), "no known faces found\n");
    }
}
