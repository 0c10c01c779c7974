//! Grid catalogs: time-sliced collections of region-tagged grid chains.
//!
//! A catalog file is CSV with one title line, then entries of the form
//! `definition,ll_lon,ll_lat,ur_lon,ur_lat[,priority[,date]]` where the
//! region is in degrees and the date is either `yyyy-mm-dd` or a decimal
//! year. Blank lines and `#` comments are skipped.

use std::io::BufRead;
use std::sync::OnceLock;

use chrono::NaiveDate;
use geo_common::angle::DEG_TO_RAD;
use geo_common::{BoundingBox, ShiftError, ShiftResult};

use crate::registry::GridRegistry;

/// One catalog entry: a grid chain valid over a region at an epoch.
#[derive(Debug)]
pub struct GridCatalogEntry {
    /// Grid chain specification, as accepted by the registry.
    pub definition: String,
    /// Validity region in radians.
    pub region: BoundingBox,
    pub priority: i32,
    /// Decimal year.
    pub date: f64,
    availability: OnceLock<bool>,
}

impl GridCatalogEntry {
    pub fn new(definition: String, region: BoundingBox, priority: i32, date: f64) -> Self {
        Self {
            definition,
            region,
            priority,
            date,
            availability: OnceLock::new(),
        }
    }

    /// Whether every mandatory grid of this entry's chain is present
    /// locally. Computed once and cached.
    pub fn is_available(&self, registry: &GridRegistry) -> bool {
        *self.availability.get_or_init(|| {
            crate::registry::parse_chain_spec(&self.definition)
                .iter()
                .filter(|item| !item.optional)
                .all(|item| registry.grid_is_available(&item.name))
        })
    }
}

/// An ordered collection of catalog entries sharing a name.
#[derive(Debug)]
pub struct GridCatalog {
    pub name: String,
    pub entries: Vec<GridCatalogEntry>,
}

impl GridCatalog {
    /// The nearest entry at or after (`after == true`) / at or before
    /// (`after == false`) the epoch that spatially contains the point
    /// (radians) and is available. File order breaks ties.
    pub fn find_entry(
        &self,
        registry: &GridRegistry,
        lon: f64,
        lat: f64,
        epoch: f64,
        after: bool,
    ) -> Option<&GridCatalogEntry> {
        self.entries
            .iter()
            .filter(|e| {
                if after {
                    e.date >= epoch
                } else {
                    e.date <= epoch
                }
            })
            .filter(|e| e.region.contains_point(lon, lat))
            .filter(|e| e.is_available(registry))
            .min_by(|a, b| {
                let da = (a.date - epoch).abs();
                let db = (b.date - epoch).abs();
                da.partial_cmp(&db).unwrap_or(std::cmp::Ordering::Equal)
            })
    }
}

/// Parse a date string into a decimal year. Accepts `yyyy-mm-dd`
/// (validated as a calendar date) or a plain decimal year; anything
/// else yields 0.0.
pub fn parse_decimal_date(s: &str) -> f64 {
    let s = s.trim();
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        use chrono::Datelike;
        let year = date.year() as f64;
        // Simplified fraction; exact day-of-year precision is not needed
        // for blending between yearly snapshots.
        let fraction = ((date.month() - 1) * 31 + (date.day() - 1)) as f64 / 372.0;
        return year + fraction;
    }
    s.parse::<f64>().unwrap_or(0.0)
}

/// Parse a catalog from CSV text. The first line is a title and is
/// discarded.
pub fn parse_catalog<R: BufRead>(name: &str, reader: R) -> ShiftResult<GridCatalog> {
    let mut entries = Vec::new();
    let mut lines = reader.lines();

    if lines.next().transpose()?.is_none() {
        return Err(ShiftError::Decode {
            grid: name.to_string(),
            reason: "empty catalog file".to_string(),
        });
    }

    for line in lines {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let tokens: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        if tokens.len() < 5 {
            tracing::warn!(catalog = name, line = trimmed, "short line in grid catalog");
            break;
        }

        let coord = |idx: usize| -> ShiftResult<f64> {
            tokens[idx].parse::<f64>().map_err(|_| ShiftError::Decode {
                grid: name.to_string(),
                reason: format!("invalid region value '{}'", tokens[idx]),
            })
        };
        let region = BoundingBox::new(
            coord(1)? * DEG_TO_RAD,
            coord(2)? * DEG_TO_RAD,
            coord(3)? * DEG_TO_RAD,
            coord(4)? * DEG_TO_RAD,
        );
        let priority = tokens
            .get(5)
            .and_then(|t| t.parse::<i32>().ok())
            .unwrap_or(0);
        let date = tokens.get(6).map(|t| parse_decimal_date(t)).unwrap_or(0.0);

        entries.push(GridCatalogEntry::new(
            tokens[0].to_string(),
            region,
            priority,
            date,
        ));
    }

    Ok(GridCatalog {
        name: name.to_string(),
        entries,
    })
}
