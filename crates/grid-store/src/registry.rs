//! Process-wide registry of opened grid files and parsed catalogs.
//!
//! Both caches live behind one coarse mutex each: the lock is held
//! across "check cache, else open/parse and insert" so concurrent
//! callers never parse the same file twice. `Arc` handles are returned,
//! so using an already-cached grid set or catalog takes no lock.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use geo_common::{ShiftError, ShiftResult};

use crate::catalog::{parse_catalog, GridCatalog};
use crate::resource::{GridResource, GridSet};
use crate::{DATA_DIR_ENV, SKIP_GRID_CHECK_ENV};

/// One item of a grid chain specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainItem {
    pub name: String,
    /// `@`-prefixed grids are optional: absence is not an error.
    pub optional: bool,
}

/// Parse a chain specification such as `"gridA,gridB"` or `"@gridC"`.
pub fn parse_chain_spec(spec: &str) -> Vec<ChainItem> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.strip_prefix('@') {
            Some(name) => ChainItem {
                name: name.to_string(),
                optional: true,
            },
            None => ChainItem {
                name: s.to_string(),
                optional: false,
            },
        })
        .collect()
}

/// Process-wide cache of named grid resources and grid catalogs.
pub struct GridRegistry {
    data_dirs: Mutex<Vec<PathBuf>>,
    grid_sets: Mutex<HashMap<String, Arc<GridSet>>>,
    catalogs: Mutex<HashMap<String, Arc<GridCatalog>>>,
}

impl GridRegistry {
    /// The process-wide registry, created on first use.
    pub fn global() -> Arc<GridRegistry> {
        static REGISTRY: OnceLock<Arc<GridRegistry>> = OnceLock::new();
        REGISTRY.get_or_init(|| Arc::new(GridRegistry::new())).clone()
    }

    /// A private registry; tests use this to avoid cross-test state.
    pub fn new() -> Self {
        Self {
            data_dirs: Mutex::new(Vec::new()),
            grid_sets: Mutex::new(HashMap::new()),
            catalogs: Mutex::new(HashMap::new()),
        }
    }

    /// Prepend a directory to the grid search path.
    pub fn add_data_dir(&self, dir: impl Into<PathBuf>) {
        self.data_dirs.lock().unwrap().insert(0, dir.into());
    }

    /// Resolve a grid or catalog name against the search path: absolute
    /// paths as-is, then configured directories, then directories from
    /// the `GRIDSHIFT_DATA` environment variable.
    pub fn resolve(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.is_absolute() {
            return direct.is_file().then(|| direct.to_path_buf());
        }
        for dir in self.data_dirs.lock().unwrap().iter() {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        if let Ok(env_dirs) = std::env::var(DATA_DIR_ENV) {
            for dir in std::env::split_paths(&env_dirs) {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
        if direct.is_file() {
            return Some(direct.to_path_buf());
        }
        None
    }

    /// Advisory check used by missing-grid diagnostics and catalog
    /// entries. The `GRIDSHIFT_SKIP_GRID_CHECK` environment variable
    /// disables the check entirely.
    pub fn grid_is_available(&self, name: &str) -> bool {
        if std::env::var_os(SKIP_GRID_CHECK_ENV).is_some() {
            return true;
        }
        if name == "null" {
            return true;
        }
        if self.grid_sets.lock().unwrap().contains_key(name) {
            return true;
        }
        self.resolve(name).is_some()
    }

    /// Open a grid file (or return the cached set). The special name
    /// `null` yields the built-in zero-shift grid.
    pub fn open_grid_set(&self, name: &str) -> ShiftResult<Arc<GridSet>> {
        let mut cache = self.grid_sets.lock().unwrap();
        if let Some(set) = cache.get(name) {
            return Ok(set.clone());
        }

        let set = if name == "null" {
            Arc::new(GridSet::null())
        } else {
            let path = self
                .resolve(name)
                .ok_or_else(|| ShiftError::GridUnavailable(name.to_string()))?;
            let file = File::open(&path)
                .map_err(|_| ShiftError::GridUnavailable(name.to_string()))?;
            let mut reader = BufReader::new(file);
            let forest = grid_formats::parse_grid_file(name, &mut reader)?;
            tracing::debug!(grid = name, grids = forest.len(), "opened grid file");
            Arc::new(GridSet::new(
                name.to_string(),
                forest
                    .into_iter()
                    .map(|d| GridResource::from_descriptor(d, &path))
                    .collect(),
            ))
        };

        cache.insert(name.to_string(), set.clone());
        Ok(set)
    }

    /// Resolve a chain specification into grid sets, opening each grid
    /// lazily (headers only). A missing mandatory grid is an error; a
    /// missing optional grid is skipped with a debug log. A chain that
    /// ends up empty is an error unless every item was optional.
    pub fn find_grid_chain(&self, spec: &str) -> ShiftResult<Vec<Arc<GridSet>>> {
        let items = parse_chain_spec(spec);
        let mut sets = Vec::new();
        for item in &items {
            match self.open_grid_set(&item.name) {
                Ok(set) => sets.push(set),
                Err(err) if item.optional => {
                    tracing::debug!(grid = %item.name, %err, "skipping optional grid");
                }
                Err(err) => return Err(err),
            }
        }
        if sets.is_empty() && items.iter().any(|item| !item.optional) {
            return Err(ShiftError::GridUnavailable(spec.to_string()));
        }
        Ok(sets)
    }

    /// Read a previously parsed catalog from the cache, or parse it from
    /// disk and insert it.
    pub fn find_catalog(&self, name: &str) -> ShiftResult<Arc<GridCatalog>> {
        let mut cache = self.catalogs.lock().unwrap();
        if let Some(catalog) = cache.get(name) {
            return Ok(catalog.clone());
        }

        let path = self
            .resolve(name)
            .ok_or_else(|| ShiftError::GridUnavailable(name.to_string()))?;
        let file = File::open(&path).map_err(|_| ShiftError::GridUnavailable(name.to_string()))?;
        let catalog = Arc::new(parse_catalog(name, BufReader::new(file))?);
        tracing::debug!(catalog = name, entries = catalog.entries.len(), "parsed grid catalog");

        cache.insert(name.to_string(), catalog.clone());
        Ok(catalog)
    }
}

impl Default for GridRegistry {
    fn default() -> Self {
        Self::new()
    }
}
