//! Grid resources: a parsed grid header plus its lazily loaded cell
//! matrix, and grid sets (all grids from one opened file).

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use grid_formats::{load_cells, CellMatrix, GridDescriptor, GridExtent, GridFormat};

/// One grid out of a shift file: header data plus the cell matrix,
/// which is absent until first use and loaded at most once per process.
///
/// Loading is guarded so that threads racing to load the same resource
/// block on each other rather than double-load. A failed load is
/// remembered: later samples see "no value here" without retrying the
/// disk read per point.
#[derive(Debug)]
pub struct GridResource {
    descriptor: GridDescriptor,
    path: PathBuf,
    children: Vec<GridResource>,
    cells: OnceLock<Option<Arc<CellMatrix>>>,
}

impl GridResource {
    /// Build a resource tree from a descriptor, taking over its children.
    pub(crate) fn from_descriptor(mut descriptor: GridDescriptor, path: &Path) -> Self {
        let children = std::mem::take(&mut descriptor.children)
            .into_iter()
            .map(|child| GridResource::from_descriptor(child, path))
            .collect();
        Self {
            descriptor,
            path: path.to_path_buf(),
            children,
            cells: OnceLock::new(),
        }
    }

    /// A built-in resource with preloaded cells; used for the null grid.
    pub(crate) fn preloaded(descriptor: GridDescriptor, cells: CellMatrix) -> Self {
        let resource = Self {
            descriptor,
            path: PathBuf::new(),
            children: Vec::new(),
            cells: OnceLock::new(),
        };
        resource
            .cells
            .set(Some(Arc::new(cells)))
            .expect("fresh cell slot");
        resource
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub fn extent(&self) -> &GridExtent {
        &self.descriptor.extent
    }

    pub fn format(&self) -> GridFormat {
        self.descriptor.format
    }

    pub fn descriptor(&self) -> &GridDescriptor {
        &self.descriptor
    }

    pub fn children(&self) -> &[GridResource] {
        &self.children
    }

    /// The cell matrix, loading it on first call. `None` means the grid
    /// data could not be read; the failure is remembered.
    pub fn cells(&self) -> Option<Arc<CellMatrix>> {
        self.cells
            .get_or_init(|| match self.load() {
                Ok(matrix) => Some(Arc::new(matrix)),
                Err(err) => {
                    tracing::warn!(
                        grid = self.descriptor.id.trim_end(),
                        file = %self.path.display(),
                        %err,
                        "failed to load grid cells"
                    );
                    None
                }
            })
            .clone()
    }

    fn load(&self) -> geo_common::ShiftResult<CellMatrix> {
        let file = File::open(&self.path)?;
        let mut reader = BufReader::new(file);
        load_cells(&self.descriptor, &mut reader)
    }

    /// Find, among this grid and its descendants, the most deeply nested
    /// grid whose extent contains the point. Children win over parents.
    pub fn grid_at(&self, lon: f64, lat: f64) -> Option<&GridResource> {
        if !self.descriptor.extent.contains(lon, lat) {
            return None;
        }
        for child in &self.children {
            if let Some(found) = child.grid_at(lon, lat) {
                return Some(found);
            }
        }
        Some(self)
    }
}

/// All grids from one opened shift file, in file order.
#[derive(Debug)]
pub struct GridSet {
    name: String,
    grids: Vec<GridResource>,
    is_null: bool,
}

impl GridSet {
    pub(crate) fn new(name: String, grids: Vec<GridResource>) -> Self {
        Self {
            name,
            grids,
            is_null: false,
        }
    }

    /// The built-in null grid: global coverage, zero shift everywhere.
    pub(crate) fn null() -> Self {
        use std::f64::consts::{FRAC_PI_2, PI};
        let descriptor = GridDescriptor {
            id: "null".to_string(),
            file_name: "null".to_string(),
            format: GridFormat::CtableV2,
            extent: GridExtent {
                west: -PI,
                south: -FRAC_PI_2,
                delta_lon: PI,
                delta_lat: FRAC_PI_2,
                columns: 3,
                rows: 3,
            },
            data_offset: 0,
            must_swap: false,
            children: Vec::new(),
        };
        let cells = grid_formats::cells::zero_horizontal(3, 3);
        Self {
            name: "null".to_string(),
            grids: vec![GridResource::preloaded(descriptor, cells)],
            is_null: true,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn grids(&self) -> &[GridResource] {
        &self.grids
    }

    pub fn is_null(&self) -> bool {
        self.is_null
    }

    /// Most specific grid in this set containing the point.
    pub fn grid_at(&self, lon: f64, lat: f64) -> Option<&GridResource> {
        self.grids.iter().find_map(|grid| grid.grid_at(lon, lat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_common::angle::DEG_TO_RAD;
    use std::io::Write;
    use test_support::{ntv2_file, Ntv2SubGrid};

    fn write_temp(bytes: &[u8]) -> tempfile::TempPath {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(bytes).unwrap();
        file.into_temp_path()
    }

    fn open_set(path: &std::path::Path, name: &str) -> GridSet {
        let mut reader = std::io::BufReader::new(File::open(path).unwrap());
        let forest = grid_formats::parse_grid_file(name, &mut reader).unwrap();
        GridSet::new(
            name.to_string(),
            forest
                .into_iter()
                .map(|d| GridResource::from_descriptor(d, path))
                .collect(),
        )
    }

    #[test]
    fn test_child_wins_over_parent() {
        let parent = Ntv2SubGrid::flat("COARSE  ", "NONE    ", -10.0, 40.0, 0.0, 50.0, 1.0);
        let child = Ntv2SubGrid::flat("FINE    ", "COARSE  ", -6.0, 44.0, -4.0, 46.0, 0.5);
        let path = write_temp(&ntv2_file(&[parent, child]));
        let set = open_set(&path, "pair.gsb");

        let inside_child = set
            .grid_at(-5.0 * DEG_TO_RAD, 45.0 * DEG_TO_RAD)
            .expect("point is covered");
        assert_eq!(inside_child.id(), "FINE    ");

        let only_parent = set
            .grid_at(-9.0 * DEG_TO_RAD, 41.0 * DEG_TO_RAD)
            .expect("point is covered");
        assert_eq!(only_parent.id(), "COARSE  ");

        assert!(set.grid_at(5.0 * DEG_TO_RAD, 45.0 * DEG_TO_RAD).is_none());
    }

    #[test]
    fn test_cells_load_once_and_remember_failure() {
        let sub = Ntv2SubGrid::flat("ONLY    ", "NONE    ", 0.0, 0.0, 2.0, 2.0, 1.0);
        let path = write_temp(&ntv2_file(&[sub]));
        let set = open_set(&path, "ok.gsb");
        let grid = &set.grids()[0];

        let first = grid.cells().expect("loads");
        let second = grid.cells().expect("cached");
        assert!(Arc::ptr_eq(&first, &second));

        // A resource pointing at a missing file stays unavailable.
        let sub = Ntv2SubGrid::flat("GONE    ", "NONE    ", 0.0, 0.0, 2.0, 2.0, 1.0);
        let path2 = write_temp(&ntv2_file(&[sub]));
        let set2 = open_set(&path2, "gone.gsb");
        std::fs::remove_file(&path2).unwrap();
        let grid2 = &set2.grids()[0];
        assert!(grid2.cells().is_none());
        assert!(grid2.cells().is_none());
    }

    #[test]
    fn test_null_set() {
        let set = GridSet::null();
        assert!(set.is_null());
        let grid = set.grid_at(1.0, 0.5).unwrap();
        let cells = grid.cells().unwrap();
        assert_eq!(cells.offset_at(1, 1), Some((0.0, 0.0)));
    }
}
