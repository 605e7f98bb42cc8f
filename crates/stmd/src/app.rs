//! Shared application-level helpers for tools and examples.
//!
//! These functions wire up I/O (frame directory walking, JSON/PNG output)
//! around the pipeline so the golden-generator tool and examples share the
//! same behavior.

use anyhow::{Context, Result};
use image::{GrayImage, ImageReader, Luma};
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};
use stmd_core::{peaks_from_response, NmsEngine, NmsMethod};
use tracing::info;

use crate::image::frame_from_gray;
use crate::pipeline::{PipelineParams, StmdPipeline};

/// Detection run configuration, typically loaded from JSON.
///
/// Unknown keys are rejected at parse time, so a typo in a parameter name
/// surfaces immediately instead of being silently ignored.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DetectionConfig {
    /// Directory of grayscale PNG frames, processed in name order.
    pub frames: PathBuf,
    pub order: Option<u32>,
    pub tau: Option<f32>,
    pub kernel_size: Option<usize>,
    pub sigma1: Option<f32>,
    pub sigma2: Option<f32>,
    pub e: Option<f32>,
    pub rho: Option<f32>,
    pub a: Option<f32>,
    pub b: Option<f32>,
    pub num_directions: Option<usize>,
    pub nms_radius: Option<usize>,
    pub nms_method: Option<String>,
    pub threshold_rel: Option<f32>,
    pub output_json: Option<PathBuf>,
    pub output_png: Option<PathBuf>,
    pub log_level: Option<String>,
}

#[derive(Serialize)]
pub struct PeakOut {
    pub x: usize,
    pub y: usize,
    pub score: f32,
    pub direction: Option<f32>,
}

#[derive(Serialize)]
pub struct FrameDetections {
    pub frame: String,
    pub peaks: Vec<PeakOut>,
}

#[derive(Serialize)]
pub struct DetectionDump {
    pub frames: String,
    pub width: u32,
    pub height: u32,
    pub num_frames: usize,
    pub nms_method: String,
    pub nms_radius: usize,
    pub detections: Vec<FrameDetections>,
}

/// Run the pipeline over every PNG in the configured directory and write
/// the detection dump (plus an optional marker image of the last frame).
pub fn run_detection(cfg: DetectionConfig) -> Result<()> {
    let mut params = PipelineParams::default();
    apply_params_overrides(&mut params, &cfg);
    let nms_radius = cfg.nms_radius.unwrap_or(5);
    let nms_method = match &cfg.nms_method {
        Some(name) => name.parse::<NmsMethod>()?,
        None => NmsMethod::Auto,
    };

    let mut frame_paths: Vec<PathBuf> = std::fs::read_dir(&cfg.frames)
        .with_context(|| format!("reading frame directory {}", cfg.frames.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("png"))
        .collect();
    frame_paths.sort();
    if frame_paths.is_empty() {
        anyhow::bail!("no PNG frames in {}", cfg.frames.display());
    }

    let mut pipeline = StmdPipeline::new(params);
    pipeline.init_config()?;
    let mut engine = NmsEngine::new(nms_radius, nms_method)?;

    let mut detections = Vec::with_capacity(frame_paths.len());
    let mut last_frame: Option<GrayImage> = None;
    let mut size = (0u32, 0u32);

    for path in &frame_paths {
        let img = ImageReader::open(path)
            .with_context(|| format!("opening frame {}", path.display()))?
            .decode()?
            .to_luma8();
        size = img.dimensions();

        let frame = frame_from_gray(&img);
        let output = pipeline.process(&frame)?;
        let peaks = peaks_from_response(
            &output.response,
            output.direction.as_ref(),
            &mut engine,
            pipeline.params().threshold_rel,
        );
        info!(
            frame = %path.display(),
            peaks = peaks.len(),
            "processed frame"
        );
        detections.push(FrameDetections {
            frame: path.to_string_lossy().into_owned(),
            peaks: peaks
                .iter()
                .map(|p| PeakOut {
                    x: p.x,
                    y: p.y,
                    score: p.score,
                    direction: p.direction,
                })
                .collect(),
        });
        last_frame = Some(img);
    }

    let json_out = cfg
        .output_json
        .unwrap_or_else(|| cfg.frames.join("detections.json"));
    let dump = DetectionDump {
        frames: cfg.frames.to_string_lossy().into_owned(),
        width: size.0,
        height: size.1,
        num_frames: frame_paths.len(),
        nms_method: nms_method.name().to_string(),
        nms_radius,
        detections,
    };
    write_json(&json_out, &dump)?;

    if let Some(png_out) = cfg.output_png {
        let mut vis = last_frame.expect("at least one frame was processed");
        if let Some(last) = dump.detections.last() {
            draw_peaks(&mut vis, last.peaks.iter().map(|p| (p.x, p.y)));
        }
        vis.save(&png_out)
            .with_context(|| format!("writing marker image {}", png_out.display()))?;
    }

    Ok(())
}

fn apply_params_overrides(params: &mut PipelineParams, cfg: &DetectionConfig) {
    if let Some(v) = cfg.order {
        params.delay_order = v;
    }
    if let Some(v) = cfg.tau {
        params.delay_tau = v;
    }
    if let Some(v) = cfg.kernel_size {
        params.kernel_size = v;
    }
    if let Some(v) = cfg.sigma1 {
        params.sigma1 = v;
    }
    if let Some(v) = cfg.sigma2 {
        params.sigma2 = v;
    }
    if let Some(v) = cfg.e {
        params.e = v;
    }
    if let Some(v) = cfg.rho {
        params.rho = v;
    }
    if let Some(v) = cfg.a {
        params.a = v;
    }
    if let Some(v) = cfg.b {
        params.b = v;
    }
    if let Some(v) = cfg.num_directions {
        params.num_directions = v;
    }
    if let Some(v) = cfg.threshold_rel {
        params.threshold_rel = v;
    }
}

/// Mark each peak with a 3×3 white square.
fn draw_peaks(vis: &mut GrayImage, peaks: impl Iterator<Item = (usize, usize)>) {
    for (x, y) in peaks {
        for dy in -1i32..=1 {
            for dx in -1i32..=1 {
                let xx = x as i32 + dx;
                let yy = y as i32 + dy;
                if xx >= 0 && yy >= 0 && xx < vis.width() as i32 && yy < vis.height() as i32 {
                    vis.put_pixel(xx as u32, yy as u32, Luma([255u8]));
                }
            }
        }
    }
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let mut json_file =
        File::create(path).with_context(|| format!("creating {}", path.display()))?;
    serde_json::to_writer_pretty(&mut json_file, value)?;
    json_file.write_all(b"\n")?;
    Ok(())
}

/// Load a [`DetectionConfig`] from a JSON file.
pub fn load_config(path: &Path) -> Result<DetectionConfig> {
    let file = File::open(path).with_context(|| format!("opening config {}", path.display()))?;
    let cfg: DetectionConfig = serde_json::from_reader(file)
        .with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_config_keys_are_rejected() {
        let json = r#"{ "frames": "seq", "nms_radius": 4, "nmsRadius": 4 }"#;
        let err = serde_json::from_str::<DetectionConfig>(json).unwrap_err();
        assert!(err.to_string().contains("nmsRadius"));
    }

    #[test]
    fn known_keys_parse() {
        let json = r#"{
            "frames": "seq",
            "tau": 12.5,
            "num_directions": 8,
            "nms_method": "greedy",
            "threshold_rel": 0.25
        }"#;
        let cfg: DetectionConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.tau, Some(12.5));
        assert_eq!(cfg.nms_method.as_deref(), Some("greedy"));
    }

    #[test]
    fn bad_nms_method_fails_at_parse() {
        assert!("quick".parse::<NmsMethod>().is_err());
    }
}
