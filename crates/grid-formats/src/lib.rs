//! Binary readers for datum shift grid files.
//!
//! This crate identifies and decodes the headers of the five supported
//! grid-shift file formats, normalizing them into [`GridDescriptor`]s,
//! and loads their bulk cell matrices on demand:
//!
//! - legacy cell table (platform-native struct dump)
//! - cell table v2 (`"CTABLE V2"` magic)
//! - NTv1 (hierarchical nine-record Canadian format, single grid)
//! - NTv2 (`.gsb`, multi-subfile with nested child grids)
//! - GTX (single-band float vertical shift grid)
//!
//! Every multi-byte field is decoded through [`endian`] with the per-file
//! byte-swap decision made once at header time.

pub mod cells;
pub mod ctable;
pub mod descriptor;
pub mod endian;
pub mod gtx;
pub mod ntv;

use std::io::{Read, Seek, SeekFrom};

use geo_common::{ShiftError, ShiftResult};

pub use cells::{load_cells, CellMatrix};
pub use descriptor::{GridDescriptor, GridExtent, GridFormat};

/// Size of the header peek used for format identification.
pub const HEADER_PEEK_LEN: usize = 160;

/// Identify the format of a grid file from a header peek and its name.
///
/// Short peeks are allowed: files smaller than the peek window can still
/// be legacy cell tables.
pub fn identify_format(name: &str, header: &[u8]) -> GridFormat {
    if header.len() >= 144 + 16
        && &header[0..6] == b"HEADER"
        && &header[96..102] == b"W GRID"
        && &header[144..160] == b"TO      NAD83   "
    {
        GridFormat::Ntv1
    } else if header.len() >= 48 + 7
        && &header[0..8] == b"NUM_OREC"
        && &header[48..55] == b"GS_TYPE"
    {
        GridFormat::Ntv2
    } else if name.len() > 4 && (name.ends_with(".gtx") || name.ends_with(".GTX")) {
        GridFormat::Gtx
    } else if header.len() >= 9 && &header[0..9] == b"CTABLE V2" {
        GridFormat::CtableV2
    } else {
        GridFormat::Ctable
    }
}

/// Open and parse the header details of a datum grid-shift file,
/// returning the descriptors of the grids it contains.
///
/// Only the NTv2 format yields more than one descriptor (a forest of
/// top-level grids with nested children). The reader is left positioned
/// arbitrarily; bulk data is fetched later through [`load_cells`] using
/// each descriptor's recorded data offset.
pub fn parse_grid_file<R: Read + Seek>(name: &str, reader: &mut R) -> ShiftResult<Vec<GridDescriptor>> {
    let mut header = [0u8; HEADER_PEEK_LEN];
    let peeked = read_up_to(reader, &mut header)?;
    if peeked < HEADER_PEEK_LEN {
        tracing::debug!(grid = name, bytes = peeked, "short header read");
    }
    reader.seek(SeekFrom::Start(0))?;

    let format = identify_format(name, &header[..peeked]);
    tracing::debug!(grid = name, ?format, "identified grid format");
    match format {
        GridFormat::Ntv1 => ntv::parse_ntv1(name, reader).map(|d| vec![d]),
        GridFormat::Ntv2 => ntv::parse_ntv2(name, reader),
        GridFormat::Gtx => gtx::parse_gtx(name, reader).map(|d| vec![d]),
        GridFormat::CtableV2 => ctable::parse_ctable2(name, reader).map(|d| vec![d]),
        GridFormat::Ctable => ctable::parse_ctable(name, reader).map(|d| vec![d]),
    }
}

/// Read as many bytes as available into `buf`, returning the count.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> ShiftResult<usize> {
    let mut total = 0;
    while total < buf.len() {
        let n = reader.read(&mut buf[total..]).map_err(ShiftError::Io)?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identify_by_name_gtx() {
        assert_eq!(identify_format("egm96.gtx", &[0u8; 160]), GridFormat::Gtx);
        assert_eq!(identify_format("EGM96.GTX", &[0u8; 160]), GridFormat::Gtx);
    }

    #[test]
    fn test_identify_ctable2_magic() {
        let mut header = [0u8; 160];
        header[..9].copy_from_slice(b"CTABLE V2");
        assert_eq!(identify_format("conus", &header), GridFormat::CtableV2);
    }

    #[test]
    fn test_unknown_falls_back_to_legacy_ctable() {
        assert_eq!(identify_format("conus", &[0u8; 160]), GridFormat::Ctable);
        // Short peeks are still legacy cell tables, never an error.
        assert_eq!(identify_format("tiny", &[0u8; 12]), GridFormat::Ctable);
    }
}
