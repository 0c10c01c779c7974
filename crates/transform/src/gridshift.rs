//! Grid-backed shift operations.

use std::sync::{Arc, Mutex};

use geo_common::angle::adjlon;
use geo_common::{BoundingBox, Coord, ShiftResult};
use grid_store::{GridCatalog, GridRegistry, GridResource, GridSet};

use crate::candidate::CoordOperation;
use crate::interp::{find_grid, sample_offsets, sample_vertical};

const MAX_ITERATIONS: usize = 10;
const TOL: f64 = 1e-12;

/// Apply the horizontal shift read from `grid` to a (lon, lat) pair in
/// radians. Forward subtracts the longitude offset and adds the
/// latitude offset; the inverse iterates from the forward offset.
///
/// Returns None when the point leaves the grid before convergence; the
/// inverse falls back to its first-order approximation at grid edges.
fn shift_point(grid: &GridResource, inverse: bool, lon: f64, lat: f64) -> Option<(f64, f64)> {
    let cells = grid.cells()?;
    let extent = grid.extent();
    let pi = std::f64::consts::PI;

    let tb_lon = adjlon(lon - extent.west - pi) + pi;
    let tb_lat = lat - extent.south;

    let (mut t_lon, mut t_lat) = sample_offsets(grid, &cells, tb_lon, tb_lat)?;

    if !inverse {
        return Some((lon - t_lon, lat + t_lat));
    }

    t_lon += tb_lon;
    t_lat = tb_lat - t_lat;

    let mut converged = false;
    let mut at_edge = false;
    for _ in 0..MAX_ITERATIONS {
        let del = sample_offsets(grid, &cells, t_lon, t_lat);
        let (del_lon, del_lat) = match del {
            // The inverse can step outside the grid that the forward
            // shift mapped into; keep the first approximation rather
            // than reporting nothing at all.
            None => {
                at_edge = true;
                break;
            }
            Some(d) => d,
        };
        if del_lon == 0.0 && del_lat == 0.0 {
            converged = true;
            break;
        }

        let dif_lon = t_lon - del_lon - tb_lon;
        let dif_lat = t_lat + del_lat - tb_lat;
        t_lon -= dif_lon;
        t_lat -= dif_lat;
        if dif_lon * dif_lon + dif_lat * dif_lat <= TOL * TOL {
            converged = true;
            break;
        }
    }

    if !converged && !at_edge {
        tracing::warn!(
            grid = grid.id().trim_end(),
            "inverse grid shift iteration failed to converge"
        );
        return None;
    }
    if at_edge {
        tracing::debug!(
            grid = grid.id().trim_end(),
            "inverse grid shift iteration stopped at grid edge, using first approximation"
        );
    }

    Some((adjlon(t_lon + extent.west), t_lat + extent.south))
}

/// Horizontal datum shift through a chain of grid files.
pub struct HorizontalGridShift {
    chain_spec: String,
    grids: Vec<Arc<GridSet>>,
}

impl HorizontalGridShift {
    /// Resolve the chain specification against the registry. Opening is
    /// lazy: only headers are read here.
    pub fn new(registry: &GridRegistry, chain_spec: &str) -> ShiftResult<Self> {
        Ok(Self {
            chain_spec: chain_spec.to_string(),
            grids: registry.find_grid_chain(chain_spec)?,
        })
    }

    fn apply_shift(&self, inverse: bool, coord: Coord) -> Coord {
        let Some(grid) = find_grid(&self.grids, coord.x, coord.y) else {
            return Coord::error();
        };
        if grid.id() == "null" {
            return coord;
        }
        match shift_point(grid, inverse, coord.x, coord.y) {
            Some((lon, lat)) => Coord::new(lon, lat, coord.z, coord.t),
            None => Coord::error(),
        }
    }
}

impl CoordOperation for HorizontalGridShift {
    fn forward(&self, coord: Coord) -> ShiftResult<Coord> {
        Ok(self.apply_shift(false, coord))
    }

    fn inverse(&self, coord: Coord) -> ShiftResult<Coord> {
        Ok(self.apply_shift(true, coord))
    }

    fn required_grids(&self) -> Vec<String> {
        grid_store::parse_chain_spec(&self.chain_spec)
            .into_iter()
            .filter(|item| !item.optional)
            .map(|item| item.name)
            .collect()
    }

    fn is_instantiable(&self) -> bool {
        !self.grids.is_empty()
    }
}

/// Vertical datum shift through a chain of single-band grids.
pub struct VerticalGridShift {
    chain_spec: String,
    grids: Vec<Arc<GridSet>>,
    /// Scale applied to the sampled value, usually +/-1.
    multiplier: f64,
}

impl VerticalGridShift {
    pub fn new(registry: &GridRegistry, chain_spec: &str, multiplier: f64) -> ShiftResult<Self> {
        Ok(Self {
            chain_spec: chain_spec.to_string(),
            grids: registry.find_grid_chain(chain_spec)?,
            multiplier,
        })
    }

    fn apply_shift(&self, inverse: bool, coord: Coord) -> Coord {
        if coord.x.is_nan() || coord.y.is_nan() {
            return Coord::error();
        }
        let Some(grid) = find_grid(&self.grids, coord.x, coord.y) else {
            return Coord::error();
        };
        let Some(value) = sample_vertical(grid, coord.x, coord.y) else {
            return Coord::error();
        };
        let sign = if inverse { 1.0 } else { -1.0 };
        Coord::new(
            coord.x,
            coord.y,
            coord.z + sign * self.multiplier * value,
            coord.t,
        )
    }
}

impl CoordOperation for VerticalGridShift {
    fn forward(&self, coord: Coord) -> ShiftResult<Coord> {
        Ok(self.apply_shift(false, coord))
    }

    fn inverse(&self, coord: Coord) -> ShiftResult<Coord> {
        Ok(self.apply_shift(true, coord))
    }

    fn required_grids(&self) -> Vec<String> {
        grid_store::parse_chain_spec(&self.chain_spec)
            .into_iter()
            .filter(|item| !item.optional)
            .map(|item| item.name)
            .collect()
    }

    fn is_instantiable(&self) -> bool {
        !self.grids.is_empty()
    }
}

/// Cached grid lookup for one side (before/after) of an epoch blend.
#[derive(Default)]
struct CachedSlice {
    region: Option<BoundingBox>,
    date: f64,
    definition: Option<String>,
}

/// Horizontal shift driven by a time-sliced grid catalog.
///
/// For a non-zero epoch, the shifted coordinate is blended linearly
/// between the nearest catalog entries before and after the epoch that
/// contain the point and are available. An epoch of zero uses the
/// "after" entry alone.
///
/// The per-slice lookup caches are guarded so a context can still be
/// cloned and the clones driven from separate threads.
pub struct CatalogShift {
    registry: Arc<GridRegistry>,
    catalog: Arc<GridCatalog>,
    /// Epoch the coordinates are referenced to, as a decimal year.
    epoch: f64,
    after: Mutex<CachedSlice>,
    before: Mutex<CachedSlice>,
}

impl CatalogShift {
    pub fn new(registry: Arc<GridRegistry>, catalog_name: &str, epoch: f64) -> ShiftResult<Self> {
        let catalog = registry.find_catalog(catalog_name)?;
        Ok(Self {
            registry,
            catalog,
            epoch,
            after: Mutex::new(CachedSlice::default()),
            before: Mutex::new(CachedSlice::default()),
        })
    }

    /// Resolve the entry covering the point on one side of the epoch,
    /// reusing the cached result while the point stays inside its
    /// region.
    fn slice_for(
        &self,
        cache: &Mutex<CachedSlice>,
        lon: f64,
        lat: f64,
        after: bool,
    ) -> Option<(String, f64)> {
        {
            let cached = cache.lock().unwrap();
            if let (Some(region), Some(definition)) = (&cached.region, &cached.definition) {
                if region.contains_point(lon, lat) {
                    return Some((definition.clone(), cached.date));
                }
            }
        }

        let entry = self
            .catalog
            .find_entry(&self.registry, lon, lat, self.epoch, after)?;
        let mut cached = cache.lock().unwrap();
        cached.region = Some(entry.region);
        cached.date = entry.date;
        cached.definition = Some(entry.definition.clone());
        Some((entry.definition.clone(), entry.date))
    }

    fn shift_through(&self, definition: &str, inverse: bool, coord: Coord) -> Option<Coord> {
        let sets = self.registry.find_grid_chain(definition).ok()?;
        let grid = find_grid(&sets, coord.x, coord.y)?;
        let (lon, lat) = shift_point(grid, inverse, coord.x, coord.y)?;
        Some(Coord::new(lon, lat, coord.z, coord.t))
    }

    fn apply_shift(&self, inverse: bool, coord: Coord) -> Coord {
        let Some((after_def, after_date)) = self.slice_for(&self.after, coord.x, coord.y, true)
        else {
            return Coord::error();
        };
        let Some(output_after) = self.shift_through(&after_def, inverse, coord) else {
            return Coord::error();
        };

        if self.epoch == 0.0 {
            return output_after;
        }

        let Some((before_def, before_date)) = self.slice_for(&self.before, coord.x, coord.y, false)
        else {
            return Coord::error();
        };
        if before_date == after_date {
            return output_after;
        }
        let Some(output_before) = self.shift_through(&before_def, inverse, coord) else {
            return Coord::error();
        };

        let ratio = (self.epoch - before_date) / (after_date - before_date);
        Coord::new(
            ratio * output_after.x + (1.0 - ratio) * output_before.x,
            ratio * output_after.y + (1.0 - ratio) * output_before.y,
            coord.z,
            coord.t,
        )
    }
}

impl CoordOperation for CatalogShift {
    fn forward(&self, coord: Coord) -> ShiftResult<Coord> {
        Ok(self.apply_shift(false, coord))
    }

    fn inverse(&self, coord: Coord) -> ShiftResult<Coord> {
        Ok(self.apply_shift(true, coord))
    }

    fn required_grids(&self) -> Vec<String> {
        self.catalog
            .entries
            .iter()
            .flat_map(|e| grid_store::parse_chain_spec(&e.definition))
            .filter(|item| !item.optional)
            .map(|item| item.name)
            .collect()
    }

    fn is_instantiable(&self) -> bool {
        !self.catalog.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_common::angle::{ARCSEC_TO_RAD, DEG_TO_RAD};
    use std::io::Write;
    use test_support::{gtx_file, ntv2_file, Ntv2SubGrid};

    fn registry_with(files: &[(&str, Vec<u8>)]) -> (Arc<GridRegistry>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        for (name, bytes) in files {
            let mut f = std::fs::File::create(dir.path().join(name)).unwrap();
            f.write_all(bytes).unwrap();
        }
        let registry = Arc::new(GridRegistry::new());
        registry.add_data_dir(dir.path());
        (registry, dir)
    }

    #[test]
    fn test_forward_applies_constant_shift() {
        let sub =
            Ntv2SubGrid::constant("CONST   ", "NONE    ", 0.0, 0.0, 4.0, 4.0, 1.0, 3.6, -7.2);
        let (registry, _dir) = registry_with(&[("c.gsb", ntv2_file(&[sub]))]);
        let op = HorizontalGridShift::new(&registry, "c.gsb").unwrap();

        let input = Coord::xy(2.0 * DEG_TO_RAD, 2.0 * DEG_TO_RAD);
        let out = op.forward(input).unwrap();
        assert!((out.x - (input.x + 7.2 * ARCSEC_TO_RAD)).abs() < 1e-12);
        assert!((out.y - (input.y + 3.6 * ARCSEC_TO_RAD)).abs() < 1e-12);
    }

    #[test]
    fn test_roundtrip_constant_shift() {
        let sub =
            Ntv2SubGrid::constant("CONST   ", "NONE    ", -2.0, -2.0, 6.0, 6.0, 1.0, 1.8, 2.4);
        let (registry, _dir) = registry_with(&[("c.gsb", ntv2_file(&[sub]))]);
        let op = HorizontalGridShift::new(&registry, "c.gsb").unwrap();

        let input = Coord::xy(2.0 * DEG_TO_RAD, 2.0 * DEG_TO_RAD);
        let forwarded = op.forward(input).unwrap();
        let back = op.inverse(forwarded).unwrap();
        assert!((back.x - input.x).abs() < 1e-11);
        assert!((back.y - input.y).abs() < 1e-11);
    }

    #[test]
    fn test_point_outside_all_grids_is_error() {
        let sub = Ntv2SubGrid::flat("FLAT    ", "NONE    ", 0.0, 0.0, 4.0, 4.0, 1.0);
        let (registry, _dir) = registry_with(&[("f.gsb", ntv2_file(&[sub]))]);
        let op = HorizontalGridShift::new(&registry, "f.gsb").unwrap();
        let out = op
            .forward(Coord::xy(100.0 * DEG_TO_RAD, 2.0 * DEG_TO_RAD))
            .unwrap();
        assert!(out.is_error());
    }

    #[test]
    fn test_null_grid_is_identity() {
        let registry = Arc::new(GridRegistry::new());
        let op = HorizontalGridShift::new(&registry, "null").unwrap();
        let input = Coord::xy(0.5, -0.25);
        assert_eq!(op.forward(input).unwrap(), input);
        assert!(op.required_grids().contains(&"null".to_string()));
    }

    #[test]
    fn test_vertical_shift_roundtrip() {
        let (registry, _dir) =
            registry_with(&[("geoid.gtx", gtx_file(0.0, 0.0, 1.0, 1.0, 3, 3, &[2.5; 9]))]);
        let op = VerticalGridShift::new(&registry, "geoid.gtx", 1.0).unwrap();

        let input = Coord::new(1.5 * DEG_TO_RAD, 1.5 * DEG_TO_RAD, 10.0, 0.0);
        let out = op.forward(input).unwrap();
        assert!((out.z - 7.5).abs() < 1e-9);
        assert_eq!(out.x, input.x);

        let back = op.inverse(out).unwrap();
        assert!((back.z - 10.0).abs() < 1e-9);

        // Outside the grid the shift declines the point.
        let far = op
            .forward(Coord::new(50.0 * DEG_TO_RAD, 1.5 * DEG_TO_RAD, 10.0, 0.0))
            .unwrap();
        assert!(far.is_error());
    }

    #[test]
    fn test_catalog_blend_endpoints() {
        // Two epochs of the same region with different shifts: blending
        // at either entry's date must return exactly that entry's value.
        let g1997 =
            Ntv2SubGrid::constant("Y1997   ", "NONE    ", -10.0, 40.0, 0.0, 50.0, 1.0, 36.0, 0.0);
        let g2002 =
            Ntv2SubGrid::constant("Y2002   ", "NONE    ", -10.0, 40.0, 0.0, 50.0, 1.0, 72.0, 0.0);
        let catalog = b"test catalog\ng1997.gsb,-10,40,0,50,0,1997.0\ng2002.gsb,-10,40,0,50,0,2002.0\n";
        let (registry, dir) = registry_with(&[
            ("g1997.gsb", ntv2_file(&[g1997])),
            ("g2002.gsb", ntv2_file(&[g2002])),
        ]);
        std::fs::write(dir.path().join("cat.csv"), catalog).unwrap();

        let input = Coord::xy(-5.0 * DEG_TO_RAD, 45.0 * DEG_TO_RAD);

        let at_before = CatalogShift::new(registry.clone(), "cat.csv", 1997.0).unwrap();
        let out = at_before.forward(input).unwrap();
        assert!((out.y - (input.y + 36.0 * ARCSEC_TO_RAD)).abs() < 1e-12);

        let at_after = CatalogShift::new(registry.clone(), "cat.csv", 2002.0).unwrap();
        let out = at_after.forward(input).unwrap();
        assert!((out.y - (input.y + 72.0 * ARCSEC_TO_RAD)).abs() < 1e-12);

        // Halfway between the slices: halfway between the shifts.
        let mid = CatalogShift::new(registry, "cat.csv", 1999.5).unwrap();
        let out = mid.forward(input).unwrap();
        assert!((out.y - (input.y + 54.0 * ARCSEC_TO_RAD)).abs() < 1e-11);
    }

    #[test]
    fn test_catalog_epoch_zero_uses_after_only() {
        let g1997 =
            Ntv2SubGrid::constant("Y1997   ", "NONE    ", -10.0, 40.0, 0.0, 50.0, 1.0, 36.0, 0.0);
        let catalog = b"test catalog\ng1997.gsb,-10,40,0,50,0,1997.0\n";
        let (registry, dir) = registry_with(&[("g1997.gsb", ntv2_file(&[g1997]))]);
        std::fs::write(dir.path().join("cat.csv"), catalog).unwrap();

        let op = CatalogShift::new(registry, "cat.csv", 0.0).unwrap();
        let input = Coord::xy(-5.0 * DEG_TO_RAD, 45.0 * DEG_TO_RAD);
        let out = op.forward(input).unwrap();
        assert!((out.y - (input.y + 36.0 * ARCSEC_TO_RAD)).abs() < 1e-12);
    }
}
