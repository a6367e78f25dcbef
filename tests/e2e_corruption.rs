//! Reading stores whose tables were damaged after a successful save.

use geomodel_io::storage::Snapshot;
use geomodel_io::xf::{GenFunction, Primitive, TransFunction};
use geomodel_io::*;
use pretty_assertions::assert_eq;

/// World → [Box volume "Inner", SerialTransformer ×2 over a tube].
async fn saved_snapshot() -> Snapshot {
    let air = Material::new("Air", 0.0012).into_shared();
    let world = PhysVol::new(LogicalVolume::new("World", Shape::boxed(100.0, 100.0, 100.0), air.clone()));
    let inner = PhysVol::new(LogicalVolume::new("Inner", Shape::boxed(1.0, 2.0, 3.0), air.clone()));
    let tube = PhysVol::new(LogicalVolume::new("Ring", Shape::tube(1.0, 2.0, 3.0), air));
    let f = TransFunction::pow(Primitive::RotateZ3D, GenFunction::constant(0.5) * GenFunction::x());
    world.add(inner);
    world.add(SerialTransformer::new(Function::new(f), tube, 2));

    let store = GeometryStore::open_memory().await.unwrap();
    store.save(&world).await.unwrap();
    store.backend().snapshot().unwrap()
}

async fn load(snapshot: Snapshot) -> Result<BuiltGeometry> {
    GeometryStore::with_backend(MemoryBackend::from_snapshot(snapshot)).load().await
}

fn row(snapshot: &mut Snapshot, table: TableKind, id: u64) -> &mut Row {
    let rows = snapshot.tables.get_mut(&table).unwrap();
    &mut rows[id as usize - 1]
}

#[tokio::test]
async fn test_untouched_snapshot_loads() {
    let built = load(saved_snapshot().await).await.unwrap();
    assert_eq!(built.root.child_count(), 2);
    assert!(built.unknown_shapes.is_empty());
}

#[tokio::test]
async fn test_truncated_shape_parameters_are_fatal() {
    let mut snap = saved_snapshot().await;
    // shape 2 is the Inner box
    row(&mut snap, TableKind::Shape, 2)[1] = Cell::from("XHalfLength=1;YHalfLength=2");

    match load(snap).await {
        Err(Error::MalformedRecord { table, id, message }) => {
            assert_eq!(table, "GeoShape");
            assert_eq!(id, Some(RowId(2)));
            assert_eq!(message, "Box: expected at least 3 fields, found 2");
        }
        other => panic!("expected a malformed shape record, got {other:?}"),
    }
}

#[tokio::test]
async fn test_null_cell_is_a_malformed_record() {
    let mut snap = saved_snapshot().await;
    row(&mut snap, TableKind::Shape, 2)[1] = Cell::Null;
    let err = load(snap).await.unwrap_err();
    assert_eq!(err.to_string(), "Malformed GeoShape record 2: column parameters: expected text, found NULL");
}

#[tokio::test]
async fn test_misnamed_field_is_fatal() {
    let mut snap = saved_snapshot().await;
    row(&mut snap, TableKind::Shape, 3)[1] = Cell::from("RMin=1;RMax=2;Length=3");
    assert!(matches!(load(snap).await, Err(Error::MalformedRecord { .. })));
}

#[tokio::test]
async fn test_unknown_child_table_id_is_fatal() {
    let mut snap = saved_snapshot().await;
    snap.child_positions[0].child_table_id = 42;
    match load(snap).await {
        Err(Error::UnknownNodeType(msg)) => assert!(msg.contains("42"), "{msg}"),
        other => panic!("expected an unknown node type, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unknown_shape_type_gets_placeholder() {
    let mut snap = saved_snapshot().await;
    let shape = row(&mut snap, TableKind::Shape, 2);
    shape[0] = Cell::from("Ellipsoid");
    shape[1] = Cell::from("");

    let built = load(snap).await.unwrap();
    assert_eq!(built.unknown_shapes.iter().collect::<Vec<_>>(), vec!["Ellipsoid"]);
    let inner = built.root.children()[0].as_volume().unwrap().clone();
    assert_eq!(inner.logvol().shape.kind, ShapeKind::Box { x: 300.0, y: 300.0, z: 300.0 });
}

#[tokio::test]
async fn test_placeholder_size_is_configurable() {
    let mut snap = saved_snapshot().await;
    row(&mut snap, TableKind::Shape, 2)[0] = Cell::from("Ellipsoid");
    let store = GeometryStore::with_backend(MemoryBackend::from_snapshot(snap));
    let config = ReaderConfig { placeholder_half_length: 5.0, ..ReaderConfig::default() };
    let built = store.load_with(config).await.unwrap();
    let inner = built.root.children()[0].as_volume().unwrap().clone();
    assert_eq!(inner.logvol().shape.kind, ShapeKind::Box { x: 5.0, y: 5.0, z: 5.0 });
}

#[tokio::test]
async fn test_empty_function_is_fatal() {
    let mut snap = saved_snapshot().await;
    row(&mut snap, TableKind::Function, 1)[0] = Cell::from("");
    assert!(matches!(load(snap).await, Err(Error::EmptyFunction)));
}

#[tokio::test]
async fn test_unparseable_function_names_the_row() {
    let mut snap = saved_snapshot().await;
    row(&mut snap, TableKind::Function, 1)[0] = Cell::from("Pow(RotateZ3D(1),");
    match load(snap).await {
        Err(Error::MalformedRecord { table, id, .. }) => {
            assert_eq!(table, "Function");
            assert_eq!(id, Some(RowId(1)));
        }
        other => panic!("expected a malformed function record, got {other:?}"),
    }
}

#[tokio::test]
async fn test_dangling_reference_is_fatal() {
    let mut snap = saved_snapshot().await;
    row(&mut snap, TableKind::PhysVol, 2)[0] = Cell::Int(99);
    match load(snap).await {
        Err(Error::MalformedRecord { table, id, .. }) => {
            assert_eq!(table, "GeoLogVol");
            assert_eq!(id, Some(RowId(99)));
        }
        other => panic!("expected a dangling logical volume, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_root_record() {
    let mut snap = saved_snapshot().await;
    snap.root = None;
    assert!(matches!(load(snap).await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_orphan_group_is_built_but_not_attached() {
    let mut snap = saved_snapshot().await;
    let mut orphan = snap.child_positions[0].clone();
    orphan.parent_id = None;
    snap.child_positions.push(orphan);

    let built = load(snap).await.unwrap();
    assert_eq!(built.root.child_count(), 2);
}

#[tokio::test]
async fn test_snapshot_survives_json() {
    let snap = saved_snapshot().await;
    let text = serde_json::to_string(&snap).unwrap();
    let back: Snapshot = serde_json::from_str(&text).unwrap();
    assert_eq!(back, snap);

    let built = load(back).await.unwrap();
    let children = built.root.children();
    let GraphNode::SerialTransformer(st) = &children[1] else {
        panic!("expected a serial transformer");
    };
    let rotated = st.placement(1);
    assert!(rotated.approx_eq(&Transform3D::rotation_z(0.5), 1e-12));
    assert_eq!(st.volume.logvol().name, "Ring");
}
