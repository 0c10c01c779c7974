//! Registry integration tests against synthetic grid files on disk.

use std::io::Write;
use std::sync::Arc;

use grid_store::GridRegistry;
use test_support::{gtx_file, ntv2_file, Ntv2SubGrid};

fn write_file(dir: &std::path::Path, name: &str, bytes: &[u8]) {
    let mut file = std::fs::File::create(dir.join(name)).unwrap();
    file.write_all(bytes).unwrap();
}

#[test]
fn test_open_grid_set_is_cached() {
    let dir = tempfile::tempdir().unwrap();
    let sub = Ntv2SubGrid::flat("ONLY    ", "NONE    ", 0.0, 0.0, 2.0, 2.0, 1.0);
    write_file(dir.path(), "cached.gsb", &ntv2_file(&[sub]));

    let registry = GridRegistry::new();
    registry.add_data_dir(dir.path());

    let first = registry.open_grid_set("cached.gsb").unwrap();
    let second = registry.open_grid_set("cached.gsb").unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.grids().len(), 1);
}

#[test]
fn test_chain_first_available_wins_order() {
    let dir = tempfile::tempdir().unwrap();
    let a = Ntv2SubGrid::flat("AGRID   ", "NONE    ", 0.0, 0.0, 2.0, 2.0, 1.0);
    let b = Ntv2SubGrid::flat("BGRID   ", "NONE    ", 10.0, 0.0, 12.0, 2.0, 1.0);
    write_file(dir.path(), "a.gsb", &ntv2_file(&[a]));
    write_file(dir.path(), "b.gsb", &ntv2_file(&[b]));

    let registry = GridRegistry::new();
    registry.add_data_dir(dir.path());

    let sets = registry.find_grid_chain("a.gsb,b.gsb").unwrap();
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0].name(), "a.gsb");
    assert_eq!(sets[1].name(), "b.gsb");
}

#[test]
fn test_chain_mixes_optional_missing() {
    let dir = tempfile::tempdir().unwrap();
    write_file(
        dir.path(),
        "v.gtx",
        &gtx_file(0.0, 0.0, 1.0, 1.0, 3, 3, &[1.0; 9]),
    );

    let registry = GridRegistry::new();
    registry.add_data_dir(dir.path());

    let sets = registry.find_grid_chain("@missing.gsb,v.gtx").unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].name(), "v.gtx");
}

#[test]
fn test_find_catalog_cached_and_availability() {
    let dir = tempfile::tempdir().unwrap();
    let sub = Ntv2SubGrid::flat("HERE    ", "NONE    ", -10.0, 40.0, 0.0, 50.0, 1.0);
    write_file(dir.path(), "here.gsb", &ntv2_file(&[sub]));
    write_file(
        dir.path(),
        "catalog.csv",
        b"test catalog\nhere.gsb,-10,40,0,50,0,1997.0\nmissing.gsb,-10,40,0,50,0,2002.0\n",
    );

    let registry = GridRegistry::new();
    registry.add_data_dir(dir.path());

    let catalog = registry.find_catalog("catalog.csv").unwrap();
    let again = registry.find_catalog("catalog.csv").unwrap();
    assert!(Arc::ptr_eq(&catalog, &again));

    assert_eq!(catalog.entries.len(), 2);
    assert!(catalog.entries[0].is_available(&registry));
    assert!(!catalog.entries[1].is_available(&registry));
}
