use serde::{Deserialize, Serialize};

use crate::error::{MasError, Result};

/// Intensity above which a pixel of the segmented image counts as plant.
pub const ACTIVITY_THRESHOLD: u8 = 220;

/// A segmented (binary-activity) image stored as 8-bit intensities, row-major.
///
/// Coordinates follow the image convention: `x` is the column, `y` the row.
/// The bounds of this map are the only source of truth for in-frame checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityMap {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl ActivityMap {
    /// Create a map filled with the given intensity.
    pub fn new(width: usize, height: usize, fill: u8) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(MasError::EmptyImage);
        }
        Ok(Self { data: vec![fill; width * height], width, height })
    }

    /// Wrap an existing row-major intensity buffer.
    pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(MasError::EmptyImage);
        }
        if data.len() != width * height {
            return Err(MasError::BufferSize {
                width,
                height,
                expected: width * height,
                actual: data.len(),
            });
        }
        Ok(Self { data, width, height })
    }

    /// Build a map from a boolean mask: `true` cells become fully active.
    pub fn from_mask(width: usize, height: usize, mask: &[bool]) -> Result<Self> {
        let data = mask.iter().map(|&m| if m { u8::MAX } else { 0 }).collect();
        Self::from_raw(width, height, data)
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.data[row * self.width + col]
    }

    #[inline]
    pub fn set(&mut self, row: usize, col: usize, val: u8) {
        self.data[row * self.width + col] = val;
    }

    /// True if `(x, y)` lies inside the image frame.
    #[inline]
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && (x as usize) < self.width && (y as usize) < self.height
    }

    /// Active sample at `(x, y)`. Out-of-frame positions are never active.
    #[inline]
    pub fn is_active(&self, x: i32, y: i32) -> bool {
        self.contains(x, y) && self.get(y as usize, x as usize) > ACTIVITY_THRESHOLD
    }

    /// Inactive sample at `(x, y)`: strictly below the threshold, so a
    /// sample exactly at it is neither active nor inactive. Out-of-frame
    /// positions are neither as well.
    #[inline]
    pub fn is_inactive(&self, x: i32, y: i32) -> bool {
        self.contains(x, y) && self.get(y as usize, x as usize) < ACTIVITY_THRESHOLD
    }

    /// Paint an axis-aligned filled rectangle, clipped to the frame.
    /// Mostly useful for building synthetic fields.
    pub fn fill_rect(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, val: u8) {
        let (x0, x1) = (x0.max(0), x1.min(self.width as i32 - 1));
        let (y0, y1) = (y0.max(0), y1.min(self.height as i32 - 1));
        for y in y0..=y1 {
            for x in x0..=x1 {
                self.set(y as usize, x as usize, val);
            }
        }
    }

    /// Fraction of active pixels over the whole image.
    pub fn active_fraction(&self) -> f64 {
        let n = self.data.iter().filter(|&&v| v > ACTIVITY_THRESHOLD).count();
        n as f64 / self.data.len() as f64
    }
}
