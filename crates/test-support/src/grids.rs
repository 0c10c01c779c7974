//! Synthetic grid shift file builders.

/// One NTv2 subfile: identity, parent link, extent in degrees and the
/// shift values in file order (rows south to north, columns east to
/// west), each `(lat_shift, lon_shift)` in arc-seconds.
#[derive(Debug, Clone)]
pub struct Ntv2SubGrid {
    pub name: String,
    pub parent: String,
    pub west_deg: f64,
    pub south_deg: f64,
    pub east_deg: f64,
    pub north_deg: f64,
    pub delta_deg: f64,
    pub shifts: Vec<(f32, f32)>,
}

impl Ntv2SubGrid {
    /// A subgrid with all shifts zero. Names must be exactly 8 chars
    /// (pad with spaces), matching the on-disk field width.
    pub fn flat(
        name: &str,
        parent: &str,
        west_deg: f64,
        south_deg: f64,
        east_deg: f64,
        north_deg: f64,
        delta_deg: f64,
    ) -> Self {
        let columns = ((east_deg - west_deg) / delta_deg + 0.5) as usize + 1;
        let rows = ((north_deg - south_deg) / delta_deg + 0.5) as usize + 1;
        Self {
            name: name.to_string(),
            parent: parent.to_string(),
            west_deg,
            south_deg,
            east_deg,
            north_deg,
            delta_deg,
            shifts: vec![(0.0, 0.0); columns * rows],
        }
    }

    /// Constant shift everywhere, in arc-seconds.
    pub fn constant(
        name: &str,
        parent: &str,
        west_deg: f64,
        south_deg: f64,
        east_deg: f64,
        north_deg: f64,
        delta_deg: f64,
        lat_shift: f32,
        lon_shift: f32,
    ) -> Self {
        let mut grid = Self::flat(name, parent, west_deg, south_deg, east_deg, north_deg, delta_deg);
        for cell in &mut grid.shifts {
            *cell = (lat_shift, lon_shift);
        }
        grid
    }

    pub fn columns(&self) -> usize {
        ((self.east_deg - self.west_deg) / self.delta_deg + 0.5) as usize + 1
    }

    pub fn rows(&self) -> usize {
        ((self.north_deg - self.south_deg) / self.delta_deg + 0.5) as usize + 1
    }
}

fn put_ne_f64(buf: &mut [u8], offset: usize, value: f64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_ne_bytes());
}

fn put_ne_i32(buf: &mut [u8], offset: usize, value: i32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_ne_bytes());
}

/// Build an NTv2 (`.gsb`) file from subfile definitions, host-native
/// byte order. Extents are degrees; the file stores arc-seconds.
pub fn ntv2_file(subgrids: &[Ntv2SubGrid]) -> Vec<u8> {
    let mut out = Vec::new();

    let mut overview = vec![0u8; 176];
    overview[0..8].copy_from_slice(b"NUM_OREC");
    put_ne_i32(&mut overview, 8, 11);
    overview[16..24].copy_from_slice(b"NUM_SREC");
    put_ne_i32(&mut overview, 24, 11);
    overview[32..40].copy_from_slice(b"NUM_FILE");
    put_ne_i32(&mut overview, 40, subgrids.len() as i32);
    overview[48..56].copy_from_slice(b"GS_TYPE ");
    overview[56..64].copy_from_slice(b"SECONDS ");
    out.extend_from_slice(&overview);

    for sub in subgrids {
        let columns = sub.columns();
        let rows = sub.rows();
        assert_eq!(sub.shifts.len(), columns * rows, "shift count mismatch");
        assert_eq!(sub.name.len(), 8, "subgrid names are 8 chars");
        assert_eq!(sub.parent.len(), 8, "parent names are 8 chars");

        let mut header = vec![0u8; 176];
        header[0..8].copy_from_slice(b"SUB_NAME");
        header[8..16].copy_from_slice(sub.name.as_bytes());
        header[16..24].copy_from_slice(b"PARENT  ");
        header[24..32].copy_from_slice(sub.parent.as_bytes());
        header[64..72].copy_from_slice(b"S_LAT   ");
        put_ne_f64(&mut header, 72, sub.south_deg * 3600.0);
        header[80..88].copy_from_slice(b"N_LAT   ");
        put_ne_f64(&mut header, 88, sub.north_deg * 3600.0);
        header[96..104].copy_from_slice(b"E_LONG  ");
        put_ne_f64(&mut header, 104, -sub.east_deg * 3600.0);
        header[112..120].copy_from_slice(b"W_LONG  ");
        put_ne_f64(&mut header, 120, -sub.west_deg * 3600.0);
        header[128..136].copy_from_slice(b"LAT_INC ");
        put_ne_f64(&mut header, 136, sub.delta_deg * 3600.0);
        header[144..152].copy_from_slice(b"LONG_INC");
        put_ne_f64(&mut header, 152, sub.delta_deg * 3600.0);
        header[160..168].copy_from_slice(b"GS_COUNT");
        put_ne_i32(&mut header, 168, (columns * rows) as i32);
        out.extend_from_slice(&header);

        for &(lat, lon) in &sub.shifts {
            out.extend_from_slice(&lat.to_ne_bytes());
            out.extend_from_slice(&lon.to_ne_bytes());
            out.extend_from_slice(&0.0f32.to_ne_bytes());
            out.extend_from_slice(&0.0f32.to_ne_bytes());
        }
    }

    out
}

/// Build an NTv1 file with zero shifts, big-endian. Extents in degrees.
pub fn ntv1_file(
    west_deg: f64,
    south_deg: f64,
    east_deg: f64,
    north_deg: f64,
    delta_lon_deg: f64,
    delta_lat_deg: f64,
) -> Vec<u8> {
    let columns = ((east_deg - west_deg) / delta_lon_deg + 0.5) as usize + 1;
    let rows = ((north_deg - south_deg) / delta_lat_deg + 0.5) as usize + 1;

    let mut header = vec![0u8; 192];
    header[0..6].copy_from_slice(b"HEADER");
    header[8..12].copy_from_slice(&12i32.to_be_bytes());
    header[24..32].copy_from_slice(&south_deg.to_be_bytes());
    header[40..48].copy_from_slice(&north_deg.to_be_bytes());
    header[56..64].copy_from_slice(&(-east_deg).to_be_bytes());
    header[72..80].copy_from_slice(&(-west_deg).to_be_bytes());
    header[88..96].copy_from_slice(&delta_lat_deg.to_be_bytes());
    header[96..102].copy_from_slice(b"W GRID");
    header[104..112].copy_from_slice(&delta_lon_deg.to_be_bytes());
    header[144..160].copy_from_slice(b"TO      NAD83   ");

    let mut out = header;
    for _ in 0..columns * rows {
        out.extend_from_slice(&0.0f64.to_be_bytes());
        out.extend_from_slice(&0.0f64.to_be_bytes());
    }
    out
}

/// Build a GTX vertical shift file, big-endian. Origin and steps in
/// degrees, values row-major south to north.
pub fn gtx_file(
    y_origin_deg: f64,
    x_origin_deg: f64,
    y_step_deg: f64,
    x_step_deg: f64,
    rows: i32,
    columns: i32,
    values: &[f32],
) -> Vec<u8> {
    assert_eq!(values.len(), (rows * columns) as usize, "value count mismatch");
    let mut out = Vec::with_capacity(40 + values.len() * 4);
    out.extend_from_slice(&y_origin_deg.to_be_bytes());
    out.extend_from_slice(&x_origin_deg.to_be_bytes());
    out.extend_from_slice(&y_step_deg.to_be_bytes());
    out.extend_from_slice(&x_step_deg.to_be_bytes());
    out.extend_from_slice(&rows.to_be_bytes());
    out.extend_from_slice(&columns.to_be_bytes());
    for v in values {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

/// Build a cell table v2 file, little-endian. Extent in radians, cells
/// row-major `(lon_shift, lat_shift)` pairs in radians.
pub fn ctable2_file(
    id: &str,
    west_rad: f64,
    south_rad: f64,
    delta_lon_rad: f64,
    delta_lat_rad: f64,
    columns: i32,
    rows: i32,
    cells: &[(f32, f32)],
) -> Vec<u8> {
    assert_eq!(cells.len(), (columns * rows) as usize, "cell count mismatch");
    assert!(id.len() <= 80);
    let mut header = vec![0u8; 160];
    header[0..9].copy_from_slice(b"CTABLE V2");
    header[16..16 + id.len()].copy_from_slice(id.as_bytes());
    header[96..104].copy_from_slice(&west_rad.to_le_bytes());
    header[104..112].copy_from_slice(&south_rad.to_le_bytes());
    header[112..120].copy_from_slice(&delta_lon_rad.to_le_bytes());
    header[120..128].copy_from_slice(&delta_lat_rad.to_le_bytes());
    header[128..132].copy_from_slice(&columns.to_le_bytes());
    header[132..136].copy_from_slice(&rows.to_le_bytes());

    let mut out = header;
    for &(lon, lat) in cells {
        out.extend_from_slice(&lon.to_le_bytes());
        out.extend_from_slice(&lat.to_le_bytes());
    }
    out
}
