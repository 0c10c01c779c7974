//! Bulk cell matrix loading.
//!
//! Each loader seeks to the descriptor's recorded data offset and applies
//! the byte-swap decision made at header time. The two historical
//! hierarchical formats store each row with longitudes running opposite
//! to the cell-matrix convention, so their columns are reversed on load.

use std::io::{Read, Seek, SeekFrom};

use geo_common::angle::ARCSEC_TO_RAD;
use geo_common::{ShiftError, ShiftResult};

use crate::descriptor::{GridDescriptor, GridFormat};
use crate::endian::{read_f32, read_f64};

/// A fully materialized grid: horizontal offset pairs or vertical
/// scalars, row-major with row 0 at the southern origin.
#[derive(Debug, Clone)]
pub struct CellMatrix {
    columns: usize,
    rows: usize,
    values: CellValues,
}

#[derive(Debug, Clone)]
enum CellValues {
    /// (lon shift, lat shift), radians.
    Horizontal(Vec<(f32, f32)>),
    /// Scalar shift, metres.
    Vertical(Vec<f32>),
}

impl CellMatrix {
    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn is_vertical(&self) -> bool {
        matches!(self.values, CellValues::Vertical(_))
    }

    /// Horizontal offset pair at a node, or None for out-of-range
    /// indices or a vertical matrix.
    pub fn offset_at(&self, col: usize, row: usize) -> Option<(f64, f64)> {
        if col >= self.columns || row >= self.rows {
            return None;
        }
        match &self.values {
            CellValues::Horizontal(cells) => {
                let (lon, lat) = cells[row * self.columns + col];
                Some((lon as f64, lat as f64))
            }
            CellValues::Vertical(_) => None,
        }
    }

    /// Scalar value at a node, or None for out-of-range indices or a
    /// horizontal matrix.
    pub fn value_at(&self, col: usize, row: usize) -> Option<f64> {
        if col >= self.columns || row >= self.rows {
            return None;
        }
        match &self.values {
            CellValues::Vertical(cells) => Some(cells[row * self.columns + col] as f64),
            CellValues::Horizontal(_) => None,
        }
    }
}

/// An all-zero horizontal matrix. Backs the built-in null grid.
pub fn zero_horizontal(columns: usize, rows: usize) -> CellMatrix {
    CellMatrix {
        columns,
        rows,
        values: CellValues::Horizontal(vec![(0.0, 0.0); columns * rows]),
    }
}

fn read_exact_or_unavailable<R: Read>(reader: &mut R, buf: &mut [u8], grid: &str) -> ShiftResult<()> {
    reader
        .read_exact(buf)
        .map_err(|_| ShiftError::GridUnavailable(grid.to_string()))
}

/// Load the bulk cell matrix for a grid descriptor.
///
/// A failed open or short read reports the grid as unavailable; the
/// caller decides whether that is fatal. The reader is seeked to the
/// descriptor's data offset first (NTv2 subfiles are laid out
/// sequentially after the shared header section).
pub fn load_cells<R: Read + Seek>(desc: &GridDescriptor, reader: &mut R) -> ShiftResult<CellMatrix> {
    let columns = desc.extent.columns;
    let rows = desc.extent.rows;
    reader.seek(SeekFrom::Start(desc.data_offset))?;

    let values = match desc.format {
        GridFormat::Ctable | GridFormat::CtableV2 => {
            let swap = desc.must_swap;
            let mut raw = vec![0u8; columns * rows * 8];
            read_exact_or_unavailable(reader, &mut raw, &desc.file_name)?;
            let mut cells = Vec::with_capacity(columns * rows);
            for i in 0..columns * rows {
                let lon = read_f32(&raw, i * 8, swap);
                let lat = read_f32(&raw, i * 8 + 4, swap);
                cells.push((lon, lat));
            }
            CellValues::Horizontal(cells)
        }
        GridFormat::Ntv1 => {
            // One row at a time: pairs of doubles (lat, lon) in
            // arc-seconds, columns stored in reverse order.
            let mut cells = vec![(0.0f32, 0.0f32); columns * rows];
            let mut row_buf = vec![0u8; columns * 16];
            for row in 0..rows {
                read_exact_or_unavailable(reader, &mut row_buf, &desc.file_name)?;
                for i in 0..columns {
                    let lat = read_f64(&row_buf, i * 16, desc.must_swap);
                    let lon = read_f64(&row_buf, i * 16 + 8, desc.must_swap);
                    cells[row * columns + (columns - 1 - i)] = (
                        (lon * ARCSEC_TO_RAD) as f32,
                        (lat * ARCSEC_TO_RAD) as f32,
                    );
                }
            }
            CellValues::Horizontal(cells)
        }
        GridFormat::Ntv2 => {
            // Four floats per node (lat, lon, lat err, lon err) in
            // arc-seconds; accuracies are discarded, columns reversed.
            let mut cells = vec![(0.0f32, 0.0f32); columns * rows];
            let mut row_buf = vec![0u8; columns * 16];
            for row in 0..rows {
                read_exact_or_unavailable(reader, &mut row_buf, &desc.file_name)?;
                for i in 0..columns {
                    let lat = read_f32(&row_buf, i * 16, desc.must_swap) as f64;
                    let lon = read_f32(&row_buf, i * 16 + 4, desc.must_swap) as f64;
                    cells[row * columns + (columns - 1 - i)] = (
                        (lon * ARCSEC_TO_RAD) as f32,
                        (lat * ARCSEC_TO_RAD) as f32,
                    );
                }
            }
            CellValues::Horizontal(cells)
        }
        GridFormat::Gtx => {
            let mut raw = vec![0u8; columns * rows * 4];
            read_exact_or_unavailable(reader, &mut raw, &desc.file_name)?;
            let cells = (0..columns * rows)
                .map(|i| read_f32(&raw, i * 4, desc.must_swap))
                .collect();
            CellValues::Vertical(cells)
        }
    };

    Ok(CellMatrix {
        columns,
        rows,
        values,
    })
}
