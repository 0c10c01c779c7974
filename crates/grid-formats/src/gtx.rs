//! GTX vertical shift grid reader.

use std::io::{Read, Seek};

use bytes::Bytes;
use geo_common::angle::{DEG_TO_RAD, RAD_TO_DEG};
use geo_common::{ShiftError, ShiftResult};

use crate::descriptor::{GridDescriptor, GridExtent, GridFormat};
use crate::endian::{read_f64, read_i32, HOST_IS_LITTLE_ENDIAN};

/// 4 doubles of georeferencing plus 2 dimension ints.
pub(crate) const GTX_HEADER_LEN: usize = 40;

/// Parse a GTX vertical datum shift file header.
///
/// The header is big-endian: y origin, x origin, y step, x step as
/// doubles, then rows and columns as 32-bit integers. Cell data follows
/// as row-major floats, rows south to north.
pub fn parse_gtx<R: Read + Seek>(name: &str, reader: &mut R) -> ShiftResult<GridDescriptor> {
    let mut buf = vec![0u8; GTX_HEADER_LEN];
    reader
        .read_exact(&mut buf)
        .map_err(|_| ShiftError::GridUnavailable(name.to_string()))?;
    let header = Bytes::from(buf);

    let swap = HOST_IS_LITTLE_ENDIAN;
    let y_origin = read_f64(&header, 0, swap);
    let mut x_origin = read_f64(&header, 8, swap);
    let y_step = read_f64(&header, 16, swap);
    let x_step = read_f64(&header, 24, swap);
    let rows = read_i32(&header, 32, swap);
    let columns = read_i32(&header, 36, swap);

    if !(-360.0..=360.0).contains(&x_origin) || !(-90.0..=90.0).contains(&y_origin) {
        return Err(ShiftError::Decode {
            grid: name.to_string(),
            reason: "header has invalid extents, corrupt?".to_string(),
        });
    }
    if rows <= 0 || columns <= 0 || x_step <= 0.0 || y_step <= 0.0 {
        return Err(ShiftError::Decode {
            grid: name.to_string(),
            reason: format!("invalid dimensions {columns}x{rows} or steps"),
        });
    }

    // Some files come in the 0..360 longitude convention; shift back into
    // -180..180 when possible. Grids genuinely spanning the dateline
    // cannot be fixed this way.
    if x_origin >= 180.0 {
        x_origin -= 360.0;
    }
    if x_origin >= 0.0 && x_origin + x_step * columns as f64 > 180.0 {
        tracing::warn!(grid = name, "grid spans the dateline, sampling near +/-180 will misbehave");
    }

    let extent = GridExtent {
        west: x_origin * DEG_TO_RAD,
        south: y_origin * DEG_TO_RAD,
        delta_lon: x_step * DEG_TO_RAD,
        delta_lat: y_step * DEG_TO_RAD,
        columns: columns as usize,
        rows: rows as usize,
    };

    tracing::debug!(
        grid = name,
        columns,
        rows,
        west = extent.west * RAD_TO_DEG,
        south = extent.south * RAD_TO_DEG,
        "parsed GTX header"
    );

    Ok(GridDescriptor {
        id: name.to_string(),
        file_name: name.to_string(),
        format: GridFormat::Gtx,
        extent,
        data_offset: GTX_HEADER_LEN as u64,
        must_swap: swap,
        children: Vec::new(),
    })
}
