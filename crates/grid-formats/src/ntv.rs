//! NTv1 and NTv2 grid shift file readers.
//!
//! Both formats store their bounding boxes with west/east longitudes
//! sign-flipped (positive west) and their shift values in arc-seconds.
//! NTv2 files hold several subfiles forming a parent/child forest; the
//! parent link is an 8-character name field matched case-sensitively.

use std::io::{Read, Seek, SeekFrom};

use bytes::Bytes;
use geo_common::angle::{ARCSEC_TO_RAD, DEG_TO_RAD, RAD_TO_DEG};
use geo_common::{ShiftError, ShiftResult};

use crate::descriptor::{GridDescriptor, GridExtent, GridFormat};
use crate::endian::{read_f64, read_i32, HOST_IS_LITTLE_ENDIAN};

/// NTv1 header: 12 records of 16 bytes.
pub(crate) const NTV1_HEADER_LEN: usize = 192;

/// NTv2 overview and subfile headers: 11 records of 16 bytes.
pub(crate) const NTV2_HEADER_LEN: usize = 176;

fn read_block<R: Read>(reader: &mut R, len: usize, name: &str) -> ShiftResult<Bytes> {
    let mut buf = vec![0u8; len];
    reader
        .read_exact(&mut buf)
        .map_err(|_| ShiftError::GridUnavailable(name.to_string()))?;
    Ok(Bytes::from(buf))
}

fn check_extent(name: &str, extent: &GridExtent) -> ShiftResult<()> {
    let four_pi = 4.0 * std::f64::consts::PI;
    let pi_eps = std::f64::consts::PI + 1e-5;
    let east = extent.west + (extent.columns.saturating_sub(1)) as f64 * extent.delta_lon;
    let north = extent.south + (extent.rows.saturating_sub(1)) as f64 * extent.delta_lat;
    if extent.west.abs() <= four_pi
        && east.abs() <= four_pi
        && extent.south.abs() <= pi_eps
        && north.abs() <= pi_eps
        && extent.west < east
        && extent.south < north
        && extent.delta_lon > 1e-10
        && extent.delta_lat > 1e-10
    {
        Ok(())
    } else {
        Err(ShiftError::Decode {
            grid: name.to_string(),
            reason: "inconsistent georeferencing".to_string(),
        })
    }
}

fn derive_dims(west: f64, east: f64, south: f64, north: f64, dlon: f64, dlat: f64) -> (usize, usize) {
    let columns = (((east - west).abs() / dlon + 0.5) as i64 + 1).max(0) as usize;
    let rows = (((north - south).abs() / dlat + 0.5) as i64 + 1).max(0) as usize;
    (columns, rows)
}

/// Parse an NTv1 grid shift file header.
///
/// NTv1 is big-endian on disk; fields are swapped on little-endian hosts.
/// The record count field must decode to 12.
pub fn parse_ntv1<R: Read + Seek>(name: &str, reader: &mut R) -> ShiftResult<GridDescriptor> {
    let header = read_block(reader, NTV1_HEADER_LEN, name)?;
    let swap = HOST_IS_LITTLE_ENDIAN;

    if read_i32(&header, 8, swap) != 12 {
        return Err(ShiftError::Decode {
            grid: name.to_string(),
            reason: "wrong record count, corrupt?".to_string(),
        });
    }

    let south = read_f64(&header, 24, swap) * DEG_TO_RAD;
    let north = read_f64(&header, 40, swap) * DEG_TO_RAD;
    let east = -read_f64(&header, 56, swap) * DEG_TO_RAD;
    let west = -read_f64(&header, 72, swap) * DEG_TO_RAD;
    let delta_lat = read_f64(&header, 88, swap) * DEG_TO_RAD;
    let delta_lon = read_f64(&header, 104, swap) * DEG_TO_RAD;

    let (columns, rows) = derive_dims(west, east, south, north, delta_lon, delta_lat);
    let extent = GridExtent {
        west,
        south,
        delta_lon,
        delta_lat,
        columns,
        rows,
    };
    check_extent(name, &extent)?;

    tracing::debug!(
        grid = name,
        columns,
        rows,
        west = west * RAD_TO_DEG,
        south = south * RAD_TO_DEG,
        "parsed NTv1 header"
    );

    Ok(GridDescriptor {
        id: name.to_string(),
        file_name: name.to_string(),
        format: GridFormat::Ntv1,
        extent,
        data_offset: NTV1_HEADER_LEN as u64,
        must_swap: swap,
        children: Vec::new(),
    })
}

/// Search the forest depth-first for a grid with the given 8-char id.
fn find_parent<'a>(forest: &'a mut [GridDescriptor], id: &str) -> Option<&'a mut GridDescriptor> {
    for grid in forest {
        if grid.id == id {
            return Some(grid);
        }
        if let Some(found) = find_parent(&mut grid.children, id) {
            return Some(found);
        }
    }
    None
}

/// Parse an NTv2 file: overview header, then one tagged header plus cell
/// data per subfile. Returns the forest of top-level grids.
pub fn parse_ntv2<R: Read + Seek>(name: &str, reader: &mut R) -> ShiftResult<Vec<GridDescriptor>> {
    let overview = read_block(reader, NTV2_HEADER_LEN, name)?;

    // The byte at offset 8 is the first byte of the NUM_OREC value (11).
    // Seeing it there means the file matches the host's least significant
    // byte placement on little-endian hosts only.
    let must_swap = if overview[8] == 11 {
        !HOST_IS_LITTLE_ENDIAN
    } else {
        HOST_IS_LITTLE_ENDIAN
    };

    let num_subfiles = read_i32(&overview, 8 + 32, must_swap);
    if num_subfiles <= 0 {
        return Err(ShiftError::Decode {
            grid: name.to_string(),
            reason: format!("invalid subfile count {num_subfiles}"),
        });
    }

    let mut forest: Vec<GridDescriptor> = Vec::new();
    for _ in 0..num_subfiles {
        let header = read_block(reader, NTV2_HEADER_LEN, name)?;
        if &header[0..8] != b"SUB_NAME" {
            return Err(ShiftError::Decode {
                grid: name.to_string(),
                reason: "subfile header missing SUB_NAME tag".to_string(),
            });
        }

        let id = String::from_utf8_lossy(&header[8..16]).to_string();
        let parent = String::from_utf8_lossy(&header[24..32]).to_string();

        let south = read_f64(&header, 4 * 16 + 8, must_swap) * ARCSEC_TO_RAD;
        let north = read_f64(&header, 5 * 16 + 8, must_swap) * ARCSEC_TO_RAD;
        let east = -read_f64(&header, 6 * 16 + 8, must_swap) * ARCSEC_TO_RAD;
        let west = -read_f64(&header, 7 * 16 + 8, must_swap) * ARCSEC_TO_RAD;
        let delta_lat = read_f64(&header, 8 * 16 + 8, must_swap) * ARCSEC_TO_RAD;
        let delta_lon = read_f64(&header, 9 * 16 + 8, must_swap) * ARCSEC_TO_RAD;

        let (columns, rows) = derive_dims(west, east, south, north, delta_lon, delta_lat);
        let extent = GridExtent {
            west,
            south,
            delta_lon,
            delta_lat,
            columns,
            rows,
        };
        check_extent(name, &extent)?;

        let gs_count = read_i32(&header, 10 * 16 + 8, must_swap);
        if gs_count < 0 || gs_count as usize != columns * rows {
            return Err(ShiftError::Decode {
                grid: name.to_string(),
                reason: format!("GS_COUNT({gs_count}) does not match expected cells ({columns}x{rows})"),
            });
        }

        let data_offset = reader.stream_position()?;
        tracing::debug!(
            grid = name,
            subgrid = %id.trim_end(),
            columns,
            rows,
            west = west * RAD_TO_DEG,
            south = south * RAD_TO_DEG,
            "parsed NTv2 subfile"
        );

        let grid = GridDescriptor {
            id,
            file_name: name.to_string(),
            format: GridFormat::Ntv2,
            extent,
            data_offset,
            must_swap,
            children: Vec::new(),
        };

        if parent.starts_with("NONE") {
            forest.push(grid);
        } else if let Some(p) = find_parent(&mut forest, &parent) {
            p.children.push(grid);
        } else {
            tracing::error!(
                grid = name,
                subgrid = %grid.id.trim_end(),
                parent = %parent.trim_end(),
                "failed to find parent subgrid; treating as top-level"
            );
            forest.push(grid);
        }

        // Cell data: 4 floats per node.
        reader.seek(SeekFrom::Current(gs_count as i64 * 16))?;
    }

    Ok(forest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_support::{ntv1_file, ntv2_file, Ntv2SubGrid};

    #[test]
    fn test_ntv1_header() {
        let file = ntv1_file(-120.0, 40.0, -110.0, 50.0, 1.0, 1.0);
        let desc = parse_ntv1("ntv1.dat", &mut Cursor::new(file)).unwrap();
        assert_eq!(desc.extent.columns, 11);
        assert_eq!(desc.extent.rows, 11);
        assert!((desc.extent.west - -120.0 * DEG_TO_RAD).abs() < 1e-12);
        assert_eq!(desc.data_offset, 192);
    }

    #[test]
    fn test_ntv1_bad_record_count() {
        let mut file = ntv1_file(-120.0, 40.0, -110.0, 50.0, 1.0, 1.0);
        file[8..12].copy_from_slice(&13i32.to_be_bytes());
        let err = parse_ntv1("ntv1.dat", &mut Cursor::new(file)).unwrap_err();
        assert!(matches!(err, ShiftError::Decode { .. }));
    }

    #[test]
    fn test_ntv2_parent_child_forest() {
        let parent = Ntv2SubGrid::flat("COARSE  ", "NONE    ", -10.0, 40.0, 0.0, 50.0, 1.0);
        let child = Ntv2SubGrid::flat("FINE    ", "COARSE  ", -6.0, 44.0, -4.0, 46.0, 0.5);
        let file = ntv2_file(&[parent, child]);

        let forest = parse_ntv2("pair.gsb", &mut Cursor::new(file)).unwrap();
        assert_eq!(forest.len(), 1);
        assert_eq!(forest[0].id, "COARSE  ");
        assert_eq!(forest[0].children.len(), 1);
        assert_eq!(forest[0].children[0].id, "FINE    ");
        assert!(forest[0]
            .extent
            .contains(forest[0].children[0].extent.west, forest[0].children[0].extent.south));
    }

    #[test]
    fn test_ntv2_unknown_parent_degrades_to_top_level() {
        let orphan = Ntv2SubGrid::flat("ORPHAN  ", "MISSING ", -10.0, 40.0, 0.0, 50.0, 1.0);
        let file = ntv2_file(&[orphan]);
        let forest = parse_ntv2("orphan.gsb", &mut Cursor::new(file)).unwrap();
        assert_eq!(forest.len(), 1);
        assert!(forest[0].children.is_empty());
    }
}
