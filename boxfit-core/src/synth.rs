//! Deterministic rectangle raster synthesis.
//!
//! The synthesiser draws one filled rectangle per sample into a square
//! greyscale raster. Sizes are drawn uniformly from the configured inclusive
//! range and positions uniformly from the placements that keep the rectangle
//! fully inside the raster, so the bounds invariant holds by construction.

use rand::{Rng, SeedableRng, rngs::SmallRng};

use crate::{
    error::ConfigError,
    raster::{BoundingBox, Sample},
};

/// Intensity written for rectangle pixels before normalisation.
const FILL_INTENSITY: u8 = u8::MAX;

/// Configuration for the rectangle synthesiser.
///
/// All sizes are in pixels. The configuration is validated once by
/// [`Synthesiser::new`]; generation itself cannot fail.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SynthesisConfig {
    /// Edge length of the square raster.
    pub raster_edge: u32,
    /// Smallest rectangle width and height, inclusive.
    pub min_rect_size: u32,
    /// Largest rectangle width and height, inclusive.
    pub max_rect_size: u32,
    /// RNG seed for reproducibility.
    pub seed: u64,
}

impl SynthesisConfig {
    /// Default raster edge length.
    pub const DEFAULT_RASTER_EDGE: u32 = 32;
    /// Default minimum rectangle size.
    pub const DEFAULT_MIN_RECT_SIZE: u32 = 4;
    /// Default maximum rectangle size.
    pub const DEFAULT_MAX_RECT_SIZE: u32 = 16;

    /// Returns the number of pixels in one raster.
    ///
    /// # Errors
    /// Returns [`ConfigError::RasterOverflow`] when the pixel count does not
    /// fit in `usize`.
    pub fn pixel_count(&self) -> Result<usize, ConfigError> {
        let overflow = ConfigError::RasterOverflow {
            edge: self.raster_edge,
        };
        let edge = usize::try_from(self.raster_edge).map_err(|_| overflow.clone())?;
        edge.checked_mul(edge).ok_or(overflow)
    }
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            raster_edge: Self::DEFAULT_RASTER_EDGE,
            min_rect_size: Self::DEFAULT_MIN_RECT_SIZE,
            max_rect_size: Self::DEFAULT_MAX_RECT_SIZE,
            seed: 0,
        }
    }
}

/// Generates rectangle rasters from a validated configuration.
///
/// # Examples
/// ```
/// use boxfit_core::{SynthesisConfig, Synthesiser};
///
/// let mut synthesiser = Synthesiser::new(SynthesisConfig {
///     seed: 11,
///     ..SynthesisConfig::default()
/// })
/// .expect("default geometry is valid");
///
/// let sample = synthesiser.sample();
/// assert_eq!(sample.pixels().len(), 1024);
/// assert!(sample.bounding_box().fits_within(32));
/// ```
#[derive(Clone, Debug)]
pub struct Synthesiser {
    config: SynthesisConfig,
    pixel_count: usize,
    rng: SmallRng,
}

impl Synthesiser {
    /// Validates the configuration and seeds the generator.
    ///
    /// # Errors
    /// Returns [`ConfigError::ZeroRasterEdge`] when the raster edge is zero,
    /// [`ConfigError::ZeroRectSize`] when the minimum rectangle size is zero,
    /// [`ConfigError::InvertedRectSizeRange`] when `min > max`, and
    /// [`ConfigError::RectExceedsRaster`] when the maximum rectangle size
    /// does not fit the raster.
    pub fn new(config: SynthesisConfig) -> Result<Self, ConfigError> {
        validate(&config)?;
        let pixel_count = config.pixel_count()?;
        let rng = SmallRng::seed_from_u64(config.seed);
        Ok(Self {
            config,
            pixel_count,
            rng,
        })
    }

    /// Returns the validated configuration.
    #[rustfmt::skip]
    #[must_use]
    pub const fn config(&self) -> &SynthesisConfig { &self.config }

    /// Returns the number of pixels per raster.
    #[rustfmt::skip]
    #[must_use]
    pub const fn pixel_count(&self) -> usize { self.pixel_count }

    /// Draws the next sample from the stream.
    ///
    /// Width and height are drawn first, then a position that keeps the
    /// rectangle inside the raster. Rectangle pixels are written at full
    /// intensity and the raster is normalised by 255 into `[0.0, 1.0]`.
    pub fn sample(&mut self) -> Sample {
        let edge = self.config.raster_edge;
        let width = self
            .rng
            .gen_range(self.config.min_rect_size..=self.config.max_rect_size);
        let height = self
            .rng
            .gen_range(self.config.min_rect_size..=self.config.max_rect_size);
        let x = self.rng.gen_range(0..=edge - width);
        let y = self.rng.gen_range(0..=edge - height);

        let mut raster = vec![0_u8; self.pixel_count];
        let row_len = edge as usize;
        for row in y..y + height {
            let start = row as usize * row_len + x as usize;
            let end = start + width as usize;
            if let Some(cells) = raster.get_mut(start..end) {
                cells.fill(FILL_INTENSITY);
            }
        }

        let pixels = raster
            .iter()
            .map(|&value| f32::from(value) / f32::from(FILL_INTENSITY))
            .collect();
        Sample::new(pixels, BoundingBox::new(x, y, width, height))
    }

    /// Draws exactly `count` samples from the stream.
    #[must_use]
    pub fn samples(&mut self, count: usize) -> Vec<Sample> {
        (0..count).map(|_| self.sample()).collect()
    }
}

const fn validate(config: &SynthesisConfig) -> Result<(), ConfigError> {
    if config.raster_edge == 0 {
        return Err(ConfigError::ZeroRasterEdge);
    }
    if config.min_rect_size == 0 {
        return Err(ConfigError::ZeroRectSize);
    }
    if config.min_rect_size > config.max_rect_size {
        return Err(ConfigError::InvertedRectSizeRange {
            min: config.min_rect_size,
            max: config.max_rect_size,
        });
    }
    if config.max_rect_size > config.raster_edge {
        return Err(ConfigError::RectExceedsRaster {
            max: config.max_rect_size,
            edge: config.raster_edge,
        });
    }
    Ok(())
}
