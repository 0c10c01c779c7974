//! Cell table readers: the legacy platform-native format and v2.

use std::io::{Read, Seek, SeekFrom};

use bytes::Bytes;
use geo_common::{ShiftError, ShiftResult};

use crate::descriptor::{GridDescriptor, GridExtent, GridFormat};
use crate::endian::{read_f64, read_i32, HOST_IS_LITTLE_ENDIAN};

/// Identifier field width shared by both cell table layouts.
const ID_LEN: usize = 80;

/// Legacy header: id, two coordinate pairs, two dimension ints, then a
/// pointer-sized tail that was dumped along with the rest of the struct.
pub(crate) const CTABLE_HEADER_LEN: usize = ID_LEN + 4 * 8 + 2 * 4 + 8;

/// v2 header is a fixed 160 bytes: magic, id, then packed fields.
pub(crate) const CTABLE2_HEADER_LEN: usize = 160;

/// Read `len` bytes, tolerating a short read by zero-filling the rest.
/// Returns the block and the number of bytes actually present.
fn read_block_lenient<R: Read>(reader: &mut R, len: usize) -> ShiftResult<(Bytes, usize)> {
    let mut buf = vec![0u8; len];
    let mut total = 0;
    while total < len {
        let n = reader.read(&mut buf[total..]).map_err(ShiftError::Io)?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok((Bytes::from(buf), total))
}

fn trimmed_id(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim_end().to_string()
}

/// Parse a legacy cell table header.
///
/// The file is a raw dump of the in-memory table struct with no
/// portability guarantee, so no byte swapping applies. This is the one
/// format where a short header is tolerated: missing fields decode from
/// the zero fill and dimensions end up zero, yielding an empty grid
/// rather than an error.
pub fn parse_ctable<R: Read + Seek>(name: &str, reader: &mut R) -> ShiftResult<GridDescriptor> {
    let (header, got) = read_block_lenient(reader, CTABLE_HEADER_LEN)?;
    if got < CTABLE_HEADER_LEN {
        tracing::debug!(grid = name, bytes = got, "short legacy cell table header");
    }

    let id = trimmed_id(&header[0..ID_LEN]);
    let west = read_f64(&header, ID_LEN, false);
    let south = read_f64(&header, ID_LEN + 8, false);
    let delta_lon = read_f64(&header, ID_LEN + 16, false);
    let delta_lat = read_f64(&header, ID_LEN + 24, false);
    let columns = read_i32(&header, ID_LEN + 32, false).max(0) as usize;
    let rows = read_i32(&header, ID_LEN + 36, false).max(0) as usize;

    Ok(GridDescriptor {
        id: if id.is_empty() { name.to_string() } else { id },
        file_name: name.to_string(),
        format: GridFormat::Ctable,
        extent: GridExtent {
            west,
            south,
            delta_lon,
            delta_lat,
            columns,
            rows,
        },
        data_offset: CTABLE_HEADER_LEN as u64,
        must_swap: false,
        children: Vec::new(),
    })
}

/// Parse a cell table v2 header.
///
/// The v2 layout is little-endian on disk. Georeferencing is already in
/// radians; the data section is row-major (lon, lat) float pairs, rows
/// south to north.
pub fn parse_ctable2<R: Read + Seek>(name: &str, reader: &mut R) -> ShiftResult<GridDescriptor> {
    let (header, got) = read_block_lenient(reader, CTABLE2_HEADER_LEN)?;
    if got < CTABLE2_HEADER_LEN {
        return Err(ShiftError::Decode {
            grid: name.to_string(),
            reason: format!("cell table v2 header truncated at {got} bytes"),
        });
    }
    if &header[0..9] != b"CTABLE V2" {
        return Err(ShiftError::Decode {
            grid: name.to_string(),
            reason: "missing CTABLE V2 magic".to_string(),
        });
    }

    let must_swap = !HOST_IS_LITTLE_ENDIAN;
    let id = trimmed_id(&header[16..16 + ID_LEN]);
    let west = read_f64(&header, 96, must_swap);
    let south = read_f64(&header, 104, must_swap);
    let delta_lon = read_f64(&header, 112, must_swap);
    let delta_lat = read_f64(&header, 120, must_swap);
    let columns = read_i32(&header, 128, must_swap);
    let rows = read_i32(&header, 132, must_swap);

    let four_pi = 4.0 * std::f64::consts::PI;
    if !(west.abs() <= four_pi
        && south.abs() <= std::f64::consts::PI + 1e-5
        && delta_lon > 1e-10
        && delta_lat > 1e-10)
    {
        return Err(ShiftError::Decode {
            grid: name.to_string(),
            reason: "inconsistent georeferencing".to_string(),
        });
    }
    if columns <= 0 || rows <= 0 {
        return Err(ShiftError::Decode {
            grid: name.to_string(),
            reason: format!("non-positive dimensions {columns}x{rows}"),
        });
    }

    reader.seek(SeekFrom::Start(CTABLE2_HEADER_LEN as u64))?;

    Ok(GridDescriptor {
        id: if id.is_empty() { name.to_string() } else { id },
        file_name: name.to_string(),
        format: GridFormat::CtableV2,
        extent: GridExtent {
            west,
            south,
            delta_lon,
            delta_lat,
            columns: columns as usize,
            rows: rows as usize,
        },
        data_offset: CTABLE2_HEADER_LEN as u64,
        must_swap,
        children: Vec::new(),
    })
}
