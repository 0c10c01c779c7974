//! Bilinear sampling of grid cell matrices.
//!
//! All sampling works in radians, in the grid's own frame (offsets from
//! the lower-left origin). Horizontal grids yield (lon, lat) offset
//! pairs, vertical grids a scalar in metres.

use std::sync::Arc;

use geo_common::angle::adjlon;
use grid_formats::CellMatrix;
use grid_store::{GridResource, GridSet};

/// The official no-data value of the single-band vertical format.
pub const GTX_NODATA: f64 = -88.8888;

/// Any value of larger magnitude is treated as no-data regardless of
/// format.
pub const NODATA_BOUND: f64 = 1000.0;

/// Edge tolerances for the half-cell clamp at the grid boundary.
const LOWER_EDGE_FRACT: f64 = 0.999_999_999_99;
const UPPER_EDGE_FRACT: f64 = 1e-11;

/// Whether a raw cell value is a no-data sentinel.
pub fn is_nodata(value: f64) -> bool {
    value.abs() > NODATA_BOUND || (value as f32) == (GTX_NODATA as f32)
}

/// Find, among the grid sets, the most deeply nested grid containing
/// the point. Sets are consulted in chain order; first match wins.
pub fn find_grid<'a>(sets: &'a [Arc<GridSet>], lon: f64, lat: f64) -> Option<&'a GridResource> {
    let found = sets.iter().find_map(|set| set.grid_at(lon, lat));
    if let Some(grid) = &found {
        tracing::trace!(grid = grid.id().trim_end(), "matched grid for point");
    }
    found
}

/// Resolve a grid-relative axis index with the boundary half-cell
/// clamps: just below the origin snaps to node 0, just past the last
/// node snaps to the final cell.
fn clamp_index(index: i64, fract: f64, node_count: usize) -> Option<(usize, f64)> {
    if index < 0 {
        if index == -1 && fract > LOWER_EDGE_FRACT {
            Some((0, 0.0))
        } else {
            None
        }
    } else if index as usize + 1 >= node_count {
        if index > 0 && index as usize + 1 == node_count && fract < UPPER_EDGE_FRACT {
            Some((index as usize - 1, 1.0))
        } else {
            None
        }
    } else {
        Some((index as usize, fract))
    }
}

/// Bilinear interpolation of a horizontal offset pair at a point given
/// relative to the grid's lower-left origin, in radians.
///
/// Returns None outside the cell-node envelope or when any corner is a
/// no-data sentinel.
pub fn sample_offsets(
    grid: &GridResource,
    cells: &CellMatrix,
    rel_lon: f64,
    rel_lat: f64,
) -> Option<(f64, f64)> {
    let extent = grid.extent();
    let gx = rel_lon / extent.delta_lon;
    let gy = rel_lat / extent.delta_lat;
    if gx.is_nan() || gy.is_nan() {
        return None;
    }

    let ix = gx.floor() as i64;
    let iy = gy.floor() as i64;
    let (col, fx) = clamp_index(ix, gx - ix as f64, extent.columns)?;
    let (row, fy) = clamp_index(iy, gy - iy as f64, extent.rows)?;

    let f00 = cells.offset_at(col, row)?;
    let f10 = cells.offset_at(col + 1, row)?;
    let f01 = cells.offset_at(col, row + 1)?;
    let f11 = cells.offset_at(col + 1, row + 1)?;
    for value in [f00, f10, f01, f11] {
        if is_nodata(value.0) || is_nodata(value.1) {
            return None;
        }
    }

    let m10 = fx * (1.0 - fy);
    let m11 = fx * fy;
    let m01 = (1.0 - fx) * fy;
    let m00 = (1.0 - fx) * (1.0 - fy);

    Some((
        m00 * f00.0 + m10 * f10.0 + m01 * f01.0 + m11 * f11.0,
        m00 * f00.1 + m10 * f10.1 + m01 * f01.1 + m11 * f11.1,
    ))
}

/// Bilinear interpolation of a vertical shift at an absolute (lon, lat)
/// in radians.
///
/// No-data corners are dropped from the weighted average rather than
/// poisoning it; the sample fails only when no corner carries data.
/// Grids covering the full longitude circle wrap their column index.
pub fn sample_vertical(grid: &GridResource, lon: f64, lat: f64) -> Option<f64> {
    let extent = grid.extent();
    let full_world = extent.full_world_longitude();
    if !full_world && !extent.contains(lon, lat) {
        return None;
    }
    let cells = grid.cells()?;

    let mut gx = (lon - extent.west) / extent.delta_lon;
    if full_world {
        let w = extent.columns as f64;
        gx = ((gx % w) + w) % w;
    }
    let gy = (lat - extent.south) / extent.delta_lat;
    if gx < 0.0 || gy < 0.0 || gy > (extent.rows as f64 - 1.0) + 0.25 {
        return None;
    }

    let ix = (gx.floor() as usize).min(extent.columns - 1);
    let iy = (gy.floor() as usize).min(extent.rows - 1);
    let fx = gx - ix as f64;
    let fy = gy - iy as f64;

    let ix2 = if ix + 1 >= extent.columns {
        if full_world {
            0
        } else {
            extent.columns - 1
        }
    } else {
        ix + 1
    };
    let iy2 = (iy + 1).min(extent.rows - 1);

    let corners = [
        (cells.value_at(ix, iy)?, (1.0 - fx) * (1.0 - fy)),
        (cells.value_at(ix2, iy)?, fx * (1.0 - fy)),
        (cells.value_at(ix, iy2)?, (1.0 - fx) * fy),
        (cells.value_at(ix2, iy2)?, fx * fy),
    ];

    let mut value = 0.0;
    let mut total_weight = 0.0;
    let mut used = 0;
    for (corner, weight) in corners {
        if !is_nodata(corner) {
            value += corner * weight;
            total_weight += weight;
            used += 1;
        }
    }
    if used == 0 || total_weight <= 0.0 {
        return None;
    }
    if used < 4 {
        value /= total_weight;
    }
    Some(value)
}

/// Bilinear horizontal sample at an absolute (lon, lat) in radians,
/// re-centring the longitude into the grid's frame first.
pub fn sample_horizontal(grid: &GridResource, lon: f64, lat: f64) -> Option<(f64, f64)> {
    let cells = grid.cells()?;
    let extent = grid.extent();
    let rel_lon = adjlon(lon - extent.west - std::f64::consts::PI) + std::f64::consts::PI;
    let rel_lat = lat - extent.south;
    sample_offsets(grid, &cells, rel_lon, rel_lat)
}
