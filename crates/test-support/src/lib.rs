//! Shared test fixtures for the gridshift workspace.
//!
//! Builders that emit syntactically valid grid shift files as byte
//! vectors, for feeding the format readers and the registry without
//! shipping real grid assets.
//!
//! Byte order conventions match what the readers expect: NTv1 and GTX
//! files are big-endian, cell table v2 files little-endian, and NTv2
//! files host-native (the format is self-describing through its record
//! count marker).

pub mod grids;

pub use grids::*;
