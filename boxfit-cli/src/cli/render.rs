//! Raster export and JSONL serialisation helpers for the CLI commands.
//!
//! Rasters are expanded from normalised pixel rows into RGBA images so the
//! bounding-box overlays can use colour against the greyscale background.

use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use boxfit_core::BoundingBox;
use image::{
    Rgba, RgbaImage,
    imageops::{self, FilterType},
};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};
use serde::Serialize;

use super::commands::CliError;

/// Outline colour for the bounding box a raster was generated from.
const ACTUAL_COLOUR: Rgba<u8> = Rgba([0, 255, 0, 255]);
/// Outline colour for the bounding box the regressor predicted.
const PREDICTED_COLOUR: Rgba<u8> = Rgba([255, 0, 255, 255]);

/// Inputs for a single prediction overlay image.
pub(super) struct PredictionRendering<'a> {
    /// Normalised pixels of the rendered raster, row-major.
    pub pixels: &'a [f32],
    /// Edge length of the square raster, in pixels.
    pub edge: u32,
    /// Pixel multiplier applied before drawing the overlays.
    pub scale: u32,
    /// Bounding box the raster was generated from.
    pub actual: [f32; BoundingBox::LABEL_VALUES],
    /// Bounding box the regressor predicted.
    pub predicted: [f32; BoundingBox::LABEL_VALUES],
}

/// One `labels.jsonl` line describing a generated sample.
#[derive(Debug, Serialize)]
pub(super) struct SampleRecord {
    /// Record schema identifier.
    pub schema: &'static str,
    /// Path of the sample image, relative to the output directory.
    pub image: String,
    /// Bounding box the raster was generated from.
    pub bounding_box: BoxDto,
    /// Seed the generation run was started with.
    pub seed: u64,
}

/// Bounding box serialised as plain integer fields.
#[derive(Debug, Serialize)]
pub(super) struct BoxDto {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl From<&BoundingBox> for BoxDto {
    fn from(value: &BoundingBox) -> Self {
        Self {
            x: value.x(),
            y: value.y(),
            width: value.width(),
            height: value.height(),
        }
    }
}

/// One metrics JSONL line.
#[derive(Debug, Serialize)]
pub(super) struct MetricRecord {
    /// Metric name, `loss` or `accuracy`.
    pub metric: &'static str,
    /// Training batch the value was recorded after.
    pub batch: usize,
    /// Recorded metric value.
    pub value: f32,
    /// Split the metric was measured on.
    pub split: &'static str,
}

/// Create `path` and every missing parent directory.
pub(super) fn ensure_dir(path: &Path) -> Result<(), CliError> {
    fs::create_dir_all(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Open `path` for buffered line-oriented writing, truncating any existing
/// file.
pub(super) fn create_jsonl_writer(path: &Path) -> Result<BufWriter<File>, CliError> {
    let file = File::create(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufWriter::new(file))
}

/// Serialise `record` as one JSON line on `writer`.
///
/// `path` is only used to attribute I/O failures.
pub(super) fn write_jsonl_line(
    writer: &mut impl Write,
    record: &impl Serialize,
    path: &Path,
) -> Result<(), CliError> {
    let json = serde_json::to_string(record)?;
    writeln!(writer, "{json}").map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Write a plain greyscale raster to `path` as a PNG.
pub(super) fn render_sample(pixels: &[f32], edge: u32, path: &Path) -> Result<(), CliError> {
    save_png(&raster_image(pixels, edge), path)
}

/// Write an upscaled raster with actual and predicted box outlines to `path`.
///
/// The raster is enlarged with nearest-neighbour resampling so individual
/// pixels stay legible, and the outlines are drawn in scaled coordinates so
/// they remain one pixel wide.
pub(super) fn render_prediction(
    rendering: &PredictionRendering<'_>,
    path: &Path,
) -> Result<(), CliError> {
    let scale = rendering.scale.max(1);
    let base = raster_image(rendering.pixels, rendering.edge);
    let target = rendering.edge.saturating_mul(scale).max(1);
    let mut image = imageops::resize(&base, target, target, FilterType::Nearest);
    draw_box(&mut image, scaled(rendering.actual, scale), ACTUAL_COLOUR);
    draw_box(&mut image, scaled(rendering.predicted, scale), PREDICTED_COLOUR);
    save_png(&image, path)
}

/// Expand normalised pixels into an RGBA image, one grey level per value.
fn raster_image(pixels: &[f32], edge: u32) -> RgbaImage {
    RgbaImage::from_fn(edge, edge, |x, y| {
        let index = (y as usize)
            .saturating_mul(edge as usize)
            .saturating_add(x as usize);
        let value = pixels.get(index).copied().unwrap_or_default();
        let level = (value.clamp(0.0, 1.0) * 255.0).round() as u8;
        Rgba([level, level, level, 255])
    })
}

fn scaled(label: [f32; BoundingBox::LABEL_VALUES], scale: u32) -> [f32; BoundingBox::LABEL_VALUES] {
    label.map(|value| value * scale as f32)
}

fn draw_box(image: &mut RgbaImage, label: [f32; BoundingBox::LABEL_VALUES], colour: Rgba<u8>) {
    let [x, y, width, height] = label;
    // `of_size` requires a non-zero extent; degenerate predictions collapse
    // to a single-pixel outline.
    let rect = Rect::at(x.round() as i32, y.round() as i32).of_size(
        (width.round() as u32).max(1),
        (height.round() as u32).max(1),
    );
    draw_hollow_rect_mut(image, rect, colour);
}

fn save_png(image: &RgbaImage, path: &Path) -> Result<(), CliError> {
    image.save(path).map_err(|source| CliError::Image {
        path: path.to_path_buf(),
        source,
    })
}
