use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use till_audit::{ClassNames, ImageSequenceSource, ScriptedDetector, Session, StreamEvent, TillConfig};
use tracing_subscriber::EnvFilter;

/// Replay a recorded till clip with precomputed detections and print the item counts.
#[derive(Parser, Debug)]
#[command(name = "till-replay")]
struct Args {
    /// Directory of frame images, read in file name order.
    #[arg(long, value_name = "DIR")]
    frames: PathBuf,
    /// JSON-lines detections, one `{"frame": n, "detections": [...]}` per line.
    #[arg(long, value_name = "PATH")]
    detections: PathBuf,
    /// Optional JSON config; missing fields keep their defaults.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Overrides the configured confidence threshold.
    #[arg(long)]
    confidence: Option<f32>,
    /// Overrides the configured frame stride.
    #[arg(long)]
    stride: Option<u32>,
    /// Write annotated frames here.
    #[arg(long, value_name = "DIR")]
    output: Option<PathBuf>,
    /// Font used to caption boxes in the written frames.
    #[arg(long, value_name = "PATH")]
    font: Option<PathBuf>,
    /// Print the summary as JSON instead of a table.
    #[arg(long)]
    json: bool,
}

// Command-line values win over the config file. Annotation is only forced off
// when there is nowhere to write the frames.
fn apply_overrides(config: &mut TillConfig, args: &Args) {
    if let Some(confidence) = args.confidence {
        config.confidence_threshold = confidence;
    }
    if let Some(stride) = args.stride {
        config.frame_stride = stride;
    }
    if args.output.is_none() {
        config.annotate = false;
    }
    if args.font.is_some() {
        config.label_font = args.font.clone();
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => TillConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => TillConfig::default(),
    };
    apply_overrides(&mut config, &args);

    let detector = ScriptedDetector::from_json_lines(&args.detections, ClassNames::coco())?;
    let mut session = Session::new(detector, config)?;

    if let Some(dir) = &args.output {
        std::fs::create_dir_all(dir)?;
    }

    let source = ImageSequenceSource::open(&args.frames)
        .with_context(|| format!("opening {}", args.frames.display()))?;
    let mut stream = session.stream(source);

    while let Some(event) = stream.next() {
        let event = event?;

        if let StreamEvent::Processed(processed) = &event {
            let counts: Vec<_> = processed.snapshot
                .iter()
                .map(|(label, n)| format!("{} {}", n, label))
                .collect();
            tracing::info!(frame = processed.frame.index, counts = %counts.join(", "), "live");
        }

        if let Some(dir) = &args.output {
            let frame = event.frame();
            frame.image.save(dir.join(format!("{:06}.png", frame.index)))?;
        }
    }

    let summary = stream.finish()?;

    if args.json {
        println!("{}", summary.to_json()?);
    } else if summary.is_empty() {
        println!("No items detected.");
    } else {
        print!("{}", summary);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["till-replay", "--frames", "clip", "--detections", "clip.jsonl"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    #[test]
    fn configured_annotate_survives_when_writing_frames() {
        let mut config = TillConfig { annotate: false, ..Default::default() };
        apply_overrides(&mut config, &args(&["--output", "out"]));
        assert!(!config.annotate);

        let mut config = TillConfig { annotate: true, ..Default::default() };
        apply_overrides(&mut config, &args(&["--output", "out", "--stride", "2"]));
        assert!(config.annotate);
        assert_eq!(config.frame_stride, 2);
    }

    #[test]
    fn annotation_is_off_without_output() {
        let mut config = TillConfig::default();
        apply_overrides(&mut config, &args(&[]));
        assert!(!config.annotate);
    }
}
