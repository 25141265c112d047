//! Which tiles intersect the viewport
//!
//! Indices are clamped to the level's tile grid. Tiles beyond the image edge
//! are left out rather than wrapped around.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

use crate::pyramid::{ImagePyramid, TileKey};
use crate::viewport::ViewportState;

/// Clamped rectangle of tile indices at one level
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TileRange {
    pub level: u32,
    pub cols: RangeInclusive<u32>,
    pub rows: RangeInclusive<u32>,
}

impl TileRange {
    pub fn keys(&self) -> impl Iterator<Item = TileKey> + '_ {
        self.rows
            .clone()
            .flat_map(move |y| self.cols.clone().map(move |x| TileKey::new(self.level, x, y)))
    }

    pub fn len(&self) -> usize {
        let cols = self.cols.end() - self.cols.start() + 1;
        let rows = self.rows.end() - self.rows.start() + 1;
        cols as usize * rows as usize
    }
}

/// Pyramid level whose tiles are drawn for the viewport's zoom
pub fn tile_level(viewport: &ViewportState, pyramid: &ImagePyramid) -> u32 {
    viewport.zoom_level.min(pyramid.max_level())
}

/// Tile index rectangle covering the viewport plus `margin_tiles` on each
/// side, or `None` when nothing of the image is in range.
pub fn visible_range(viewport: &ViewportState, pyramid: &ImagePyramid, margin_tiles: u32) -> Option<TileRange> {
    if viewport.is_empty() || viewport.scale <= 0.0 {
        return None;
    }

    let level = tile_level(viewport, pyramid);
    let level_scale = pyramid.scale_for_level(level);
    let (tw, th) = pyramid.tile_size();
    let (cols, rows) = pyramid.tile_count_at_level(level);

    let (x0, y0, x1, y1) = viewport.visible_image_rect();
    let cols = clamp_axis(x0 * level_scale, x1 * level_scale, tw, margin_tiles, cols)?;
    let rows = clamp_axis(y0 * level_scale, y1 * level_scale, th, margin_tiles, rows)?;
    Some(TileRange { level, cols, rows })
}

fn clamp_axis(lo: f64, hi: f64, tile: u32, margin: u32, count: u32) -> Option<RangeInclusive<u32>> {
    let tile = tile as f64;
    let first = (lo / tile).floor() as i64 - margin as i64;
    let last = (hi / tile).ceil() as i64 - 1 + margin as i64;
    let first = first.max(0);
    let last = last.min(count as i64 - 1);
    (first <= last).then(|| first as u32..=last as u32)
}

/// Every tile key intersecting the viewport plus margin
pub fn visible_tiles(viewport: &ViewportState, pyramid: &ImagePyramid, margin_tiles: u32) -> BTreeSet<TileKey> {
    let mut tiles = BTreeSet::new();
    if let Some(range) = visible_range(viewport, pyramid, margin_tiles) {
        tiles.extend(range.keys());
    }
    tiles
}

/// Viewport rectangle `(x, y, w, h)` where a tile is drawn
pub fn tile_screen_rect(viewport: &ViewportState, pyramid: &ImagePyramid, key: TileKey) -> (f64, f64, f64, f64) {
    let level_scale = pyramid.scale_for_level(key.level);
    let (ox, oy, w, h) = pyramid.tile_extent(key);
    let (sx, sy) = viewport.to_viewport_space(ox as f64 / level_scale, oy as f64 / level_scale);
    let to_screen = viewport.scale / level_scale;
    (sx, sy, w as f64 * to_screen, h as f64 * to_screen)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_4096() -> ImagePyramid {
        ImagePyramid::new(4096, 4096, 256, 256, 5).unwrap()
    }

    fn centered_view() -> ViewportState {
        let mut v = ViewportState::new(800.0, 600.0);
        v.zoom_level = 4;
        v.scale = 1.0;
        v.pan_x = -1648.0;
        v.pan_y = -1748.0;
        v
    }

    #[test]
    fn test_centered_viewport_sees_sixteen_tiles() {
        let p = square_4096();
        let tiles = visible_tiles(&centered_view(), &p, 0);
        assert_eq!(tiles.len(), 16);
        for key in &tiles {
            assert_eq!(key.level, 4);
            assert!((6..=9).contains(&key.x), "unexpected column {}", key.x);
            assert!((6..=9).contains(&key.y), "unexpected row {}", key.y);
        }
    }

    #[test]
    fn test_margin_expands_range() {
        let p = square_4096();
        let range = visible_range(&centered_view(), &p, 2).unwrap();
        assert_eq!(range.cols, 4..=11);
        assert_eq!(range.rows, 4..=11);
        assert_eq!(range.len(), 64);
    }

    #[test]
    fn test_never_returns_out_of_grid_keys() {
        let p = square_4096();
        let mut v = centered_view();
        for &(px, py) in &[(500.0, 400.0), (-3900.0, -3900.0), (-10.0, 300.0), (0.0, 0.0)] {
            v.pan_x = px;
            v.pan_y = py;
            for key in visible_tiles(&v, &p, 3) {
                assert!(key.x < 16 && key.y < 16, "key {:?} outside grid", key);
            }
        }
    }

    #[test]
    fn test_offscreen_image_is_empty() {
        let p = square_4096();
        let mut v = centered_view();
        v.pan_x = 1000.0;
        assert!(visible_tiles(&v, &p, 0).is_empty());
        v.pan_x = -5000.0;
        assert!(visible_tiles(&v, &p, 0).is_empty());
    }

    #[test]
    fn test_zero_area_viewport_is_empty() {
        let p = square_4096();
        let mut v = centered_view();
        v.width = 0.0;
        assert!(visible_tiles(&v, &p, 2).is_empty());
    }

    #[test]
    fn test_boundary_on_tile_edge_is_exclusive() {
        let p = square_4096();
        let mut v = ViewportState::new(512.0, 256.0);
        v.zoom_level = 4;
        let range = visible_range(&v, &p, 0).unwrap();
        assert_eq!(range.cols, 0..=1);
        assert_eq!(range.rows, 0..=0);
    }

    #[test]
    fn test_zoomed_out_level_and_overzoom() {
        let p = square_4096();
        let mut v = ViewportState::new(800.0, 600.0);
        v.zoom_level = 0;
        v.scale = 1.0 / 16.0;
        let tiles = visible_tiles(&v, &p, 0);
        assert_eq!(tiles.into_iter().collect::<Vec<_>>(), vec![TileKey::new(0, 0, 0)]);

        // two digital zoom steps past level 4 still fetch level 4 tiles
        v.zoom_level = 6;
        v.scale = 4.0;
        v.pan_x = 0.0;
        v.pan_y = 0.0;
        let range = visible_range(&v, &p, 0).unwrap();
        assert_eq!(range.level, 4);
        assert_eq!(range.cols, 0..=0);
        assert_eq!(range.rows, 0..=0);
    }

    #[test]
    fn test_tile_screen_rect() {
        let p = square_4096();
        let v = centered_view();
        let (x, y, w, h) = tile_screen_rect(&v, &p, TileKey::new(4, 6, 7));
        assert_eq!((x, y, w, h), (1536.0 - 1648.0, 1792.0 - 1748.0, 256.0, 256.0));

        // level 3 tiles cover 512 image pixels and are drawn at half size when the scale is 0.25
        let mut v = ViewportState::new(800.0, 600.0);
        v.zoom_level = 3;
        v.scale = 0.25;
        let (x, y, w, h) = tile_screen_rect(&v, &p, TileKey::new(3, 1, 0));
        assert_eq!((x, y, w, h), (128.0, 0.0, 128.0, 128.0));
    }
}
