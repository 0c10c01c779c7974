//! Normalized grid descriptors shared by all format readers.

/// The supported grid-shift file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridFormat {
    /// Legacy cell table, platform-native struct dump.
    Ctable,
    /// Cell table v2, `"CTABLE V2"` magic.
    CtableV2,
    /// NTv1, nine-record Canadian grid shift file.
    Ntv1,
    /// NTv2 `.gsb`, multi-subfile with nested children.
    Ntv2,
    /// GTX single-band vertical shift grid.
    Gtx,
}

impl GridFormat {
    /// Vertical (single scalar per cell) or horizontal (offset pair).
    pub fn is_vertical(self) -> bool {
        matches!(self, GridFormat::Gtx)
    }
}

/// The georeferencing of one grid: lower-left origin, cell size and
/// dimensions. Angular grids store radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridExtent {
    pub west: f64,
    pub south: f64,
    pub delta_lon: f64,
    pub delta_lat: f64,
    pub columns: usize,
    pub rows: usize,
}

impl GridExtent {
    /// Longitude of the last column.
    pub fn east(&self) -> f64 {
        self.west + (self.columns.saturating_sub(1)) as f64 * self.delta_lon
    }

    /// Latitude of the last row.
    pub fn north(&self) -> f64 {
        self.south + (self.rows.saturating_sub(1)) as f64 * self.delta_lat
    }

    /// Whether the point lies within the cell-node envelope, with a
    /// quarter-cell tolerance at the edges.
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        let eps_lon = 0.25 * self.delta_lon;
        let eps_lat = 0.25 * self.delta_lat;
        lon >= self.west - eps_lon
            && lon <= self.east() + eps_lon
            && lat >= self.south - eps_lat
            && lat <= self.north() + eps_lat
    }

    /// A grid covering the full longitude circle (vertical grids only).
    pub fn full_world_longitude(&self) -> bool {
        let span = self.columns as f64 * self.delta_lon;
        (span - 2.0 * std::f64::consts::PI).abs() < 1e-9
    }
}

/// One grid normalized out of a shift file: identity, placement, where
/// its bulk data lives and how to read it.
///
/// NTv2 files produce a forest of descriptors; a child's extent is always
/// contained within its parent's, and children are searched depth-first
/// with the most specific match winning.
#[derive(Debug, Clone)]
pub struct GridDescriptor {
    /// Grid identifier: the NTv2 `SUB_NAME`, or a per-format label.
    pub id: String,
    /// File the grid was read from, as given to the registry.
    pub file_name: String,
    pub format: GridFormat,
    pub extent: GridExtent,
    /// Byte offset where this grid's cell data begins.
    pub data_offset: u64,
    /// Whether bulk reads of this file must swap byte order. Decided
    /// once from the header and applied to every subsequent read.
    pub must_swap: bool,
    /// Higher-resolution grids nested inside this grid's extent.
    pub children: Vec<GridDescriptor>,
}

impl GridDescriptor {
    /// Number of cells in this grid (excluding children).
    pub fn cell_count(&self) -> usize {
        self.extent.columns * self.extent.rows
    }
}
