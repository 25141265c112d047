//! Tile addressing for a pyramidal image
//!
//! Level 0 is the most zoomed-out level and `level_count - 1` is full
//! resolution. All functions here are pure; indices outside the tile grid are
//! computed without complaint and it is up to the caller to decide visibility.

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewerError};

/// Identifies one tile image: pyramid level plus column and row index.
///
/// Ordering is level, then row, then column, so sets of keys iterate in
/// reading order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub level: u32,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(level: u32, x: u32, y: u32) -> Self {
        Self { level, x, y }
    }
}

impl Ord for TileKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.level, self.y, self.x).cmp(&(other.level, other.y, other.x))
    }
}

impl PartialOrd for TileKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Image description as served by the metadata endpoint
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PyramidMetadata {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub level_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scaling_per_level: Option<Vec<f64>>,
}

impl PyramidMetadata {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Validated, immutable pyramid geometry
#[derive(Clone, Debug, PartialEq)]
pub struct ImagePyramid {
    width: u32,
    height: u32,
    tile_width: u32,
    tile_height: u32,
    level_count: u32,
    scaling_per_level: Option<Vec<f64>>,
}

impl ImagePyramid {
    /// Power-of-two pyramid
    pub fn new(width: u32, height: u32, tile_width: u32, tile_height: u32, level_count: u32) -> Result<Self> {
        Self::try_from(PyramidMetadata {
            width,
            height,
            tile_width,
            tile_height,
            level_count,
            scaling_per_level: None,
        })
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::try_from(PyramidMetadata::from_json(json)?)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn tile_size(&self) -> (u32, u32) {
        (self.tile_width, self.tile_height)
    }

    pub fn level_count(&self) -> u32 {
        self.level_count
    }

    /// Index of the full-resolution level
    pub fn max_level(&self) -> u32 {
        self.level_count - 1
    }

    /// Display scale of a level relative to full resolution.
    ///
    /// Levels past `max_level` keep doubling; they have no tiles of their own
    /// and are drawn by upscaling the top level.
    pub fn scale_for_level(&self, level: u32) -> f64 {
        let max = self.max_level();
        let over = level.saturating_sub(max) as i32;
        let base = match &self.scaling_per_level {
            Some(scales) => scales[level.min(max) as usize],
            None => 2f64.powi(level.min(max) as i32 - max as i32),
        };
        base * 2f64.powi(over)
    }

    /// Pixel size of the whole image at `level`
    pub fn level_size(&self, level: u32) -> (u32, u32) {
        let scale = self.scale_for_level(level);
        let w = (self.width as f64 * scale).ceil().max(1.0) as u32;
        let h = (self.height as f64 * scale).ceil().max(1.0) as u32;
        (w, h)
    }

    /// Number of tile columns and rows at `level`
    pub fn tile_count_at_level(&self, level: u32) -> (u32, u32) {
        let (w, h) = self.level_size(level);
        (w.div_ceil(self.tile_width), h.div_ceil(self.tile_height))
    }

    /// Top-left pixel of a tile in its level's pixel space
    pub fn tile_origin(&self, _level: u32, x: u32, y: u32) -> (u64, u64) {
        (x as u64 * self.tile_width as u64, y as u64 * self.tile_height as u64)
    }

    /// Tile rectangle `(x, y, w, h)` in level pixel space, clipped to the
    /// level's extent. Tiles outside the grid have zero size.
    pub fn tile_extent(&self, key: TileKey) -> (u64, u64, u32, u32) {
        let (ox, oy) = self.tile_origin(key.level, key.x, key.y);
        let (lw, lh) = self.level_size(key.level);
        let w = (lw as u64).saturating_sub(ox).min(self.tile_width as u64) as u32;
        let h = (lh as u64).saturating_sub(oy).min(self.tile_height as u64) as u32;
        (ox, oy, w, h)
    }

    /// Lowest real level whose scale reaches `scale`; the top level when none does.
    pub fn level_for_scale(&self, scale: f64) -> u32 {
        (0..self.level_count)
            .find(|&level| self.scale_for_level(level) >= scale * (1.0 - 1e-9))
            .unwrap_or(self.max_level())
    }

    /// Whether `key` names a tile that exists in this pyramid
    pub fn contains(&self, key: TileKey) -> bool {
        if key.level >= self.level_count {
            return false;
        }
        let (cols, rows) = self.tile_count_at_level(key.level);
        key.x < cols && key.y < rows
    }
}

impl TryFrom<PyramidMetadata> for ImagePyramid {
    type Error = ViewerError;

    fn try_from(meta: PyramidMetadata) -> Result<Self> {
        if meta.width == 0 || meta.height == 0 {
            return Err(ViewerError::InvalidDimensions {
                width: meta.width,
                height: meta.height,
            });
        }
        if meta.tile_width == 0 || meta.tile_height == 0 {
            return Err(ViewerError::InvalidTileSize {
                width: meta.tile_width,
                height: meta.tile_height,
            });
        }
        if meta.level_count == 0 {
            return Err(ViewerError::NoLevels);
        }
        if let Some(scales) = &meta.scaling_per_level {
            if scales.len() != meta.level_count as usize {
                return Err(ViewerError::ScalingLengthMismatch {
                    expected: meta.level_count as usize,
                    actual: scales.len(),
                });
            }
            if let Some((level, &value)) = scales
                .iter()
                .enumerate()
                .find(|(_, s)| !s.is_finite() || **s <= 0.0)
            {
                return Err(ViewerError::InvalidScale { level, value });
            }
            if let Some(level) = scales.windows(2).position(|w| w[1] <= w[0]) {
                return Err(ViewerError::ScalingNotIncreasing { level: level + 1 });
            }
        }

        Ok(Self {
            width: meta.width,
            height: meta.height,
            tile_width: meta.tile_width,
            tile_height: meta.tile_height,
            level_count: meta.level_count,
            scaling_per_level: meta.scaling_per_level,
        })
    }
}
