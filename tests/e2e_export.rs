//! Dump test: save a small geometry, then check the listing line by line.

use geomodel_io::*;
use pretty_assertions::assert_eq;

async fn seeded_store() -> GeometryStore<MemoryBackend> {
    let air = Material::new("Air", 0.0012).into_shared();
    let world = PhysVol::new(LogicalVolume::new("World", Shape::boxed(10.0, 10.0, 10.0), air.clone()));
    let leaf = PhysVol::new(LogicalVolume::new("Leaf", Shape::tube(1.0, 2.0, 3.0), air));
    world.add(NameTag::new("Top"));
    world.add(leaf);

    let store = GeometryStore::open_memory().await.unwrap();
    store.save(&world).await.unwrap();
    store
}

async fn dump(store: &GeometryStore<MemoryBackend>) -> String {
    let mut out = Vec::new();
    store.dump(&mut out).await.unwrap();
    String::from_utf8(out).unwrap()
}

#[tokio::test]
async fn test_dump_lists_every_table() {
    let text = dump(&seeded_store().await).await;
    let headers: Vec<&str> = text.lines().filter(|l| l.starts_with('[')).collect();
    assert_eq!(headers.len(), TableKind::ALL.len() + 1);
    assert!(headers.contains(&"[GeoPhysVol] 2 rows (logvol_id)"));
    assert!(headers.contains(&"[GeoElement] 0 rows (name, symbol, z, a)"));
    assert!(headers.contains(&"[child positions] 2 records"));
}

#[tokio::test]
async fn test_dump_rows_and_index() {
    let text = dump(&seeded_store().await).await;
    let lines: Vec<&str> = text.lines().collect();

    assert_eq!(lines[0], "# geomodel-io dump");
    for expected in [
        "  1 | 'World' | 1 | 1",
        "  2 | 'Leaf' | 2 | 1",
        "  1 | 'Box' | 'XHalfLength=10;YHalfLength=10;ZHalfLength=10'",
        "  2 | 'Tube' | 'RMin=1;RMax=2;ZHalfLength=3'",
        "  1 | 'Air' | 0.0012 | ''",
        "  1 | 'Top'",
        "root: GeoPhysVol 1",
    ] {
        assert!(lines.contains(&expected), "missing line {expected:?} in\n{text}");
    }

    let index: Vec<&str> = lines
        .iter()
        .skip_while(|l| !l.starts_with("[child positions]"))
        .skip(1)
        .copied()
        .collect();
    assert_eq!(
        index,
        vec!["  1:1:1 #1 -> GeoNameTag 1 copy 0", "  1:1:1 #2 -> GeoPhysVol 2 copy 1"]
    );
}

#[tokio::test]
async fn test_dump_of_empty_store() {
    let store = GeometryStore::open_memory().await.unwrap();
    store.backend().initialize().await.unwrap();
    let text = dump(&store).await;
    assert!(text.contains("root: none"));
    assert!(text.contains("[child positions] 0 records"));
}

#[tokio::test]
async fn test_dump_after_shutdown_fails() {
    let store = seeded_store().await;
    store.backend().shutdown().await.unwrap();
    let mut out = Vec::new();
    assert!(matches!(store.dump(&mut out).await, Err(Error::BackendUnavailable(_))));
}
