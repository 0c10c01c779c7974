//! Grid resource management: lazy-loading grid resources, the
//! process-wide registry of opened grid files and parsed catalogs, and
//! the grid chain specification language.

pub mod catalog;
pub mod registry;
pub mod resource;

pub use catalog::{parse_decimal_date, GridCatalog, GridCatalogEntry};
pub use registry::{parse_chain_spec, ChainItem, GridRegistry};
pub use resource::{GridResource, GridSet};

/// Environment variable listing extra directories to search for grid
/// files, separated by the platform path separator.
pub const DATA_DIR_ENV: &str = "GRIDSHIFT_DATA";

/// Environment variable that disables the grid availability advisory
/// check entirely, making every grid report as available. Useful for
/// offline testing without grid assets installed.
pub const SKIP_GRID_CHECK_ENV: &str = "GRIDSHIFT_SKIP_GRID_CHECK";
