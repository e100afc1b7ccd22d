//! Offline debugging commands that run the core library locally

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tabled::Tabled;

use crate::output::{color_confidence, format_confidence, print_json, print_warning, OutputFormat};
use eyebreak_core::classifier::{
    parse_labels, ArtifactSpec, ClassifierArtifact, ClassifierEngine, FsArtifactStore,
    Normalization, OnnxBackend,
};
use eyebreak_core::pipeline::{analyze_frame, FrameOutcome};
use eyebreak_core::session::{AcceptanceRule, Decision, LabelMatcher};
use eyebreak_core::{FrameSample, PixelFormat};

/// Options for a single offline classification
pub struct ClassifyOptions {
    pub model: PathBuf,
    pub labels: PathBuf,
    pub image: PathBuf,
    pub input_side: u32,
    pub channels: u32,
    pub threshold: f32,
    pub accepted_labels: Vec<String>,
    pub model_sha256: Option<String>,
}

#[derive(Tabled)]
struct LabelRow {
    #[tabled(rename = "Index")]
    index: usize,
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Eyes Closed")]
    accepted: String,
}

#[derive(Tabled)]
struct ScoreRow {
    #[tabled(rename = "Label")]
    label: String,
    #[tabled(rename = "Score")]
    score: String,
}

#[derive(Serialize)]
struct ClassifyReport {
    label: String,
    confidence: f32,
    accepted: bool,
    reason: Option<String>,
    scores: Vec<(String, f32)>,
}

/// Parse a label file and show what the session would see
pub fn labels(path: &Path, accepted_labels: &[String], format: OutputFormat) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read label file {}", path.display()))?;
    let labels = parse_labels(&text);
    let matcher = LabelMatcher::new(accepted_labels);

    if let OutputFormat::Json = format {
        return print_json(&labels);
    }

    if labels.is_empty() {
        print_warning("Label file contains no labels");
        return Ok(());
    }

    let rows: Vec<LabelRow> = labels
        .iter()
        .enumerate()
        .map(|(index, label)| LabelRow {
            index,
            label: label.clone(),
            accepted: if matcher.matches(label) {
                "yes".green().to_string()
            } else {
                "no".to_string()
            },
        })
        .collect();

    let table = tabled::Table::new(rows)
        .with(tabled::settings::Style::rounded())
        .to_string();
    println!("{}", table);
    println!("\nTotal: {} labels", labels.len());

    if !labels.iter().any(|label| matcher.matches(label)) {
        print_warning("No label matches the eyes-closed aliases; a break could never complete");
    }

    Ok(())
}

/// Run one image through preprocessing, inference and the acceptance rule
pub fn classify(options: ClassifyOptions, format: OutputFormat) -> Result<()> {
    let frame = load_image(&options.image)?;

    let spec = ArtifactSpec {
        model: options.model.display().to_string(),
        labels: options.labels.display().to_string(),
        input_side: options.input_side,
        channels: options.channels,
        model_sha256: options.model_sha256.clone(),
    };
    let artifact = ClassifierArtifact::load(&FsArtifactStore::new("."), &spec, &OnnxBackend)
        .context("Failed to load classifier")?;
    let labels = artifact.labels().to_vec();
    let engine = ClassifierEngine::new(artifact);

    let result = match analyze_frame(&engine, frame, Normalization::default()) {
        FrameOutcome::Classified(result) => result,
        FrameOutcome::Discarded(e) => bail!("Image could not be preprocessed: {}", e),
    };
    engine.close();

    if result.is_error() {
        bail!("Inference failed for {}", options.image.display());
    }

    let rule = AcceptanceRule::new(LabelMatcher::new(&options.accepted_labels), options.threshold);
    let decision = rule.evaluate(&result.label, result.confidence);

    let report = ClassifyReport {
        label: result.label.clone(),
        confidence: result.confidence,
        accepted: decision == Decision::Accept,
        reason: match decision {
            Decision::Accept => None,
            Decision::Reject(reason) => Some(reason.to_string()),
        },
        scores: labels
            .iter()
            .cloned()
            .zip(result.scores.iter().copied())
            .collect(),
    };

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{}", "Classification".bold());
            println!("{}", "=".repeat(50));
            println!("Image:       {}", options.image.display().to_string().cyan());
            println!("Label:       {}", report.label);
            println!(
                "Confidence:  {}",
                color_confidence(report.confidence, options.threshold)
            );
            match &report.reason {
                None => println!("Decision:    {}", "accept".green().bold()),
                Some(reason) => println!("Decision:    {} ({})", "reject".red().bold(), reason),
            }
            println!();

            let rows: Vec<ScoreRow> = report
                .scores
                .iter()
                .map(|(label, score)| ScoreRow {
                    label: label.clone(),
                    score: format_confidence(*score),
                })
                .collect();
            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}

/// Decode an image file into an RGB frame
fn load_image(path: &Path) -> Result<FrameSample> {
    let rgb = image::open(path)
        .with_context(|| format!("Failed to decode image {}", path.display()))?
        .to_rgb8();
    let (width, height) = rgb.dimensions();
    Ok(FrameSample::new(width, height, PixelFormat::Rgb8, rgb.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_image_decodes_rgb() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frame.png");
        image::RgbImage::from_pixel(6, 4, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let frame = load_image(&path).unwrap();
        assert_eq!((frame.width, frame.height), (6, 4));
        assert_eq!(frame.format, PixelFormat::Rgb8);
        assert_eq!(&frame.data[..3], &[10, 20, 30]);
    }

    #[test]
    fn test_load_image_rejects_non_images() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello").unwrap();

        assert!(load_image(&path).is_err());
    }

    #[test]
    fn test_labels_command_reads_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.txt");
        std::fs::write(&path, "0 Close_eyes\n1 Open_eyes\n").unwrap();

        assert!(labels(&path, &["closed_eyes".to_string()], OutputFormat::Json).is_ok());
        assert!(labels(&dir.path().join("missing.txt"), &[], OutputFormat::Table).is_err());
    }

    #[test]
    fn test_classify_reports_missing_model() {
        let dir = TempDir::new().unwrap();
        let image_path = dir.path().join("frame.png");
        image::RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 0]))
            .save(&image_path)
            .unwrap();

        let options = ClassifyOptions {
            model: dir.path().join("missing.onnx"),
            labels: dir.path().join("labels.txt"),
            image: image_path,
            input_side: 224,
            channels: 3,
            threshold: 0.85,
            accepted_labels: vec!["close_eyes".to_string()],
            model_sha256: None,
        };
        assert!(classify(options, OutputFormat::Json).is_err());
    }
}
