//! End-to-end write → read round trips through the in-memory backend.

use std::sync::Arc;

use geomodel_io::model::{Facet, ZPlane};
use geomodel_io::xf::{self, GenFunction, Primitive, TransFunction};
use geomodel_io::*;
use pretty_assertions::assert_eq;

// ============================================================================
// Fixtures
// ============================================================================

fn air() -> Arc<Material> {
    let n = Element::new("Nitrogen", "N", 7.0, 14.007);
    let o = Element::new("Oxygen", "O", 8.0, 15.999);
    Material::new("Air", 0.0012).with_element(n, 0.76).with_element(o, 0.24).into_shared()
}

fn volume(name: &str, shape: Arc<Shape>, material: &Arc<Material>) -> Arc<PhysVol> {
    PhysVol::new(LogicalVolume::new(name, shape, material.clone()))
}

fn ramp() -> TransFunction {
    let f = GenFunction::constant(-150.0) + GenFunction::constant(100.0) * GenFunction::x();
    TransFunction::pow(Primitive::TranslateZ3D, f)
}

/// World → [NameTag "Inner", Box volume, SerialTransformer ×4 over a tube].
fn scenario() -> Arc<PhysVol> {
    let air = air();
    let world = volume("World", Shape::boxed(1000.0, 1000.0, 1000.0), &air);
    let inner = volume("Inner", Shape::boxed(10.0, 20.0, 30.0), &air);
    let tube = volume("Ring", Shape::tube(5.0, 8.0, 40.0), &air);
    world.add(NameTag::new("Inner"));
    world.add(inner);
    world.add(SerialTransformer::new(Function::new(ramp()), tube, 4));
    world
}

/// Structural comparison: same node kinds in the same order, value-equal
/// logical volumes and transforms.
fn assert_isomorphic(a: &Arc<PhysVol>, b: &Arc<PhysVol>) {
    assert_eq!(a.kind(), b.kind());
    assert_eq!(**a.logvol(), **b.logvol());
    let (ca, cb) = (a.children(), b.children());
    assert_eq!(ca.len(), cb.len(), "child count of {}", a.logvol().name);
    for (x, y) in ca.iter().zip(cb.iter()) {
        match (x, y) {
            (GraphNode::PhysVol(x), GraphNode::PhysVol(y)) => assert_isomorphic(x, y),
            (GraphNode::NameTag(x), GraphNode::NameTag(y)) => assert_eq!(x.name, y.name),
            (GraphNode::SerialDenominator(x), GraphNode::SerialDenominator(y)) => {
                assert_eq!(x.base_name, y.base_name)
            }
            (GraphNode::Transform(x), GraphNode::Transform(y)) => assert_eq!(x.matrix, y.matrix),
            (GraphNode::AlignableTransform(x), GraphNode::AlignableTransform(y)) => {
                assert_eq!(x.transform(), y.transform())
            }
            (GraphNode::SerialTransformer(x), GraphNode::SerialTransformer(y)) => {
                assert_eq!(x.copies, y.copies);
                assert_eq!(xf::persistify(&x.function.expression).unwrap(), xf::persistify(&y.function.expression).unwrap());
                assert_isomorphic(&x.volume, &y.volume);
            }
            (x, y) => panic!("child kinds differ: {x:?} vs {y:?}"),
        }
    }
}

// ============================================================================
// Round trips
// ============================================================================

#[tokio::test]
async fn test_scenario_round_trip() {
    let world = scenario();
    let store = GeometryStore::open_memory().await.unwrap();
    let summary = store.save(&world).await.unwrap();

    assert_eq!(summary.root, RootVolumeRecord { id: RowId(1), node_type: "GeoPhysVol".into() });
    assert_eq!(summary.rows[&TableKind::PhysVol], 3);
    assert_eq!(summary.rows[&TableKind::Material], 1);
    assert_eq!(summary.rows[&TableKind::Element], 2);
    assert_eq!(summary.rows[&TableKind::Function], 1);
    assert_eq!(summary.child_positions, 3);
    assert!(summary.needs_persistence.is_empty());

    let built = store.load().await.unwrap();
    assert!(built.unknown_shapes.is_empty());
    assert_eq!(built.volume_instances, 3);
    assert_isomorphic(&world, &built.root);

    let children = built.root.children();
    let GraphNode::SerialTransformer(st) = &children[2] else {
        panic!("third child should be the serial transformer");
    };
    assert_eq!(
        xf::persistify(&st.function.expression).unwrap(),
        "Pow(TranslateZ3D(1),Sum(Const(-150),Prod(Const(100),X)))"
    );
    let z: Vec<f64> = (0..st.copies).map(|i| st.placement(i).translation_vector()[2]).collect();
    assert_eq!(z, vec![-150.0, -50.0, 50.0, 150.0]);
}

#[tokio::test]
async fn test_shared_volume_gets_one_instance_per_placement() {
    let air = air();
    let world = volume("World", Shape::boxed(100.0, 100.0, 100.0), &air);
    let cell = volume("Cell", Shape::boxed(1.0, 1.0, 1.0), &air);
    cell.add(NameTag::new("sensor"));
    world.add(Transform::new(Transform3D::translation(-10.0, 0.0, 0.0)));
    world.add(cell.clone());
    world.add(Transform::new(Transform3D::translation(10.0, 0.0, 0.0)));
    world.add(cell);

    let store = GeometryStore::open_memory().await.unwrap();
    let summary = store.save(&world).await.unwrap();
    assert_eq!(summary.rows[&TableKind::PhysVol], 2);
    assert_eq!(summary.rows[&TableKind::NameTag], 1);
    // four world edges, one tag edge per Cell copy
    assert_eq!(summary.child_positions, 6);

    let tx = store.backend().begin_tx(TxMode::ReadOnly).await.unwrap();
    let records = store.backend().child_positions(&tx).await.unwrap();
    let cell_copies: Vec<u32> = records
        .iter()
        .filter(|r| r.child_table_id == 1 && r.child_id == RowId(2))
        .map(|r| r.child_copy_number)
        .collect();
    assert_eq!(cell_copies, vec![1, 2]);
    let tag_parents: Vec<u32> = records
        .iter()
        .filter(|r| r.child_table_id == 7)
        .map(|r| r.parent_copy_number)
        .collect();
    assert_eq!(tag_parents, vec![1, 2]);
    store.backend().commit_tx(tx).await.unwrap();

    let built = store.load().await.unwrap();
    assert_eq!(built.volume_instances, 3);
    let children = built.root.children();
    let (a, b) = (children[1].as_volume().unwrap(), children[3].as_volume().unwrap());
    assert!(!Arc::ptr_eq(a, b), "each placement is its own instance");
    assert_eq!(a.child_count(), 1);
    assert_eq!(b.child_count(), 1);
    assert!(!Arc::ptr_eq(a.logvol(), b.logvol()));
    assert_eq!(**a.logvol(), **b.logvol());
}

#[tokio::test]
async fn test_share_logical_volumes_opt_in() {
    let air = air();
    let world = volume("World", Shape::boxed(100.0, 100.0, 100.0), &air);
    let cell = volume("Cell", Shape::boxed(1.0, 1.0, 1.0), &air);
    world.add(cell.clone());
    world.add(cell);

    let store = GeometryStore::open_memory().await.unwrap();
    store.save(&world).await.unwrap();
    let config = ReaderConfig { share_logical_volumes: true, ..ReaderConfig::default() };
    let built = store.load_with(config).await.unwrap();

    let children = built.root.children();
    let (a, b) = (children[0].as_volume().unwrap(), children[1].as_volume().unwrap());
    assert!(!Arc::ptr_eq(a, b));
    assert!(Arc::ptr_eq(a.logvol(), b.logvol()));
    assert!(Arc::ptr_eq(&built.root.logvol().material, &a.logvol().material));
}

#[tokio::test]
async fn test_nested_boolean_shapes() {
    let air = air();
    let body = Shape::union(Shape::boxed(10.0, 10.0, 10.0), Shape::tube(0.0, 4.0, 20.0));
    let hole = Shape::shift(Shape::boxed(2.0, 2.0, 30.0), Transform3D::translation(3.0, 0.0, 0.0));
    let carved = Shape::subtraction(body, hole);
    let world = volume("World", Shape::boxed(100.0, 100.0, 100.0), &air);
    world.add(volume("Carved", carved, &air));

    let store = GeometryStore::open_memory().await.unwrap();
    let summary = store.save(&world).await.unwrap();
    // world box, box, tube, union, box, shift, subtraction
    assert_eq!(summary.rows[&TableKind::Shape], 7);
    assert_eq!(summary.rows[&TableKind::Transform], 1);

    let built = store.load().await.unwrap();
    assert_isomorphic(&world, &built.root);
    let carved = built.root.children()[0].as_volume().unwrap().clone();
    let ShapeKind::Subtraction { b, .. } = &carved.logvol().shape.kind else {
        panic!("expected a subtraction");
    };
    let ShapeKind::Shift { transform, .. } = &b.kind else {
        panic!("expected a shift");
    };
    assert_eq!(transform.translation_vector(), [3.0, 0.0, 0.0]);
}

#[tokio::test]
async fn test_every_shape_kind_survives() {
    let air = air();
    let shapes = vec![
        ShapeKind::Cons { rmin1: 1.0, rmin2: 2.0, rmax1: 3.0, rmax2: 4.0, dz: 5.0, sphi: 0.0, dphi: 6.2 },
        ShapeKind::Torus { rmin: 1.0, rmax: 2.0, rtor: 10.0, sphi: 0.0, dphi: 3.1 },
        ShapeKind::Para { x: 1.0, y: 2.0, z: 3.0, alpha: 0.1, theta: 0.2, phi: 0.3 },
        ShapeKind::Pcon { sphi: 0.0, dphi: 6.2, planes: vec![ZPlane::new(-5.0, 0.0, 2.0), ZPlane::new(5.0, 1.0, 3.0)] },
        ShapeKind::Pgon { sphi: 0.0, dphi: 6.2, nsides: 8, planes: vec![ZPlane::new(0.0, 1.0, 2.0)] },
        ShapeKind::SimplePolygonBrep { dz: 2.0, vertices: vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]] },
        ShapeKind::Trap {
            zhalf: 10.0,
            theta: 0.1,
            phi: 0.2,
            dydzn: 3.0,
            dxdyndzn: 4.0,
            dxdypdzn: 5.0,
            angleydzn: 0.0,
            dydzp: 3.5,
            dxdyndzp: 4.5,
            dxdypdzp: 5.5,
            angleydzp: 0.0,
        },
        ShapeKind::Trd { x1: 1.0, x2: 2.0, y1: 3.0, y2: 4.0, z: 5.0 },
        ShapeKind::Tubs { rmin: 1.0, rmax: 2.0, zhalf: 3.0, sphi: 0.5, dphi: 1.5 },
        ShapeKind::GenericTrap { zhalf: 4.0, vertices: vec![[0.0, 0.0]; 8] },
        ShapeKind::TessellatedSolid {
            facets: vec![
                Facet::triangle([[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]),
                Facet::quad([[0.0, 0.0, 1.0], [1.0, 0.0, 1.0], [1.0, 1.0, 1.0], [0.0, 1.0, 1.0]]),
            ],
        },
        ShapeKind::Unidentified { name: "LArCustomShape".into(), ascii_data: "EMEC".into() },
    ];
    let world = volume("World", Shape::boxed(100.0, 100.0, 100.0), &air);
    for (i, kind) in shapes.iter().enumerate() {
        world.add(volume(&format!("v{i}"), Shape::new(kind.clone()), &air));
    }

    let store = GeometryStore::open_memory().await.unwrap();
    store.save(&world).await.unwrap();
    let built = store.load().await.unwrap();

    let rebuilt: Vec<ShapeKind> = built
        .root
        .children()
        .iter()
        .map(|c| c.as_volume().unwrap().logvol().shape.kind.clone())
        .collect();
    assert_eq!(rebuilt, shapes);
}

#[tokio::test]
async fn test_opaque_shapes_load_as_placeholders() {
    let air = air();
    let world = volume("World", Shape::boxed(100.0, 100.0, 100.0), &air);
    // "Tube" is also a tag with a parameter layout
    for name in ["Tube", "Ellipsoid"] {
        world.add(volume(name, Shape::new(ShapeKind::Opaque { type_name: name.into() }), &air));
    }

    let store = GeometryStore::open_memory().await.unwrap();
    let summary = store.save(&world).await.unwrap();
    assert_eq!(summary.needs_persistence.iter().collect::<Vec<_>>(), vec!["Ellipsoid", "Tube"]);

    let built = store.load().await.unwrap();
    assert_eq!(built.unknown_shapes.iter().collect::<Vec<_>>(), vec!["Ellipsoid", "Tube#opaque"]);
    let children = built.root.children();
    assert_eq!(children.len(), 2);
    for child in children.iter() {
        let v = child.as_volume().unwrap();
        assert_eq!(v.logvol().shape.kind, ShapeKind::Box { x: 300.0, y: 300.0, z: 300.0 });
    }
    assert_eq!(children[0].as_volume().unwrap().logvol().name, "Tube");
}

#[tokio::test]
async fn test_child_order_is_preserved() {
    let air = air();
    let world = volume("World", Shape::boxed(100.0, 100.0, 100.0), &air);
    let aligned = AlignableTransform::new(Transform3D::translation(0.0, 0.0, 5.0));
    aligned.set_delta(Transform3D::rotation_z(0.01));
    world.add(SerialDenominator::new("Module"));
    world.add(aligned);
    world.add(PhysVol::new_full(LogicalVolume::new("Full", Shape::boxed(1.0, 1.0, 1.0), air.clone())));
    world.add(NameTag::new("Plain"));
    world.add(Transform::new(Transform3D::rotation_x(0.5)));
    world.add(volume("Plain", Shape::boxed(2.0, 2.0, 2.0), &air));

    let store = GeometryStore::open_memory().await.unwrap();
    store.save(&world).await.unwrap();
    let built = store.load().await.unwrap();
    assert_isomorphic(&world, &built.root);

    let children = built.root.children();
    assert!(children[2].as_volume().unwrap().is_full());
    let GraphNode::AlignableTransform(t) = &children[1] else {
        panic!("expected an alignable transform");
    };
    let want = Transform3D::translation(0.0, 0.0, 5.0) * Transform3D::rotation_z(0.01);
    assert!(t.transform().approx_eq(&want, 1e-12));
}

#[tokio::test]
async fn test_serial_transformer_volume_keeps_children() {
    let air = air();
    let world = volume("World", Shape::boxed(100.0, 100.0, 100.0), &air);
    let slab = volume("Slab", Shape::boxed(10.0, 10.0, 1.0), &air);
    slab.add(NameTag::new("Strip"));
    slab.add(volume("Strip", Shape::boxed(1.0, 10.0, 1.0), &air));
    world.add(SerialTransformer::new(Function::new(ramp()), slab, 3));

    let store = GeometryStore::open_memory().await.unwrap();
    let summary = store.save(&world).await.unwrap();
    // world→ST, slab→tag, slab→strip; the replicated slab itself has no edge
    assert_eq!(summary.child_positions, 3);

    let built = store.load().await.unwrap();
    assert_isomorphic(&world, &built.root);
    let children = built.root.children();
    let GraphNode::SerialTransformer(st) = &children[0] else {
        panic!("expected a serial transformer");
    };
    assert_eq!(st.volume.child_count(), 2);
}

#[tokio::test]
async fn test_single_root_per_store() {
    let store = GeometryStore::open_memory().await.unwrap();
    store.save(&scenario()).await.unwrap();

    let err = store.save(&scenario()).await.unwrap_err();
    assert!(matches!(err, Error::Structure(_)), "{err}");

    // the failed save left the first geometry intact
    let built = store.load().await.unwrap();
    assert_eq!(built.root.logvol().name, "World");
    assert_eq!(built.root.child_count(), 3);
}

#[tokio::test]
async fn test_load_from_empty_store() {
    let store = GeometryStore::open_memory().await.unwrap();
    assert!(store.load().await.is_err());

    store.backend().initialize().await.unwrap();
    assert!(matches!(store.load().await, Err(Error::NotFound(_))));
}

#[tokio::test]
async fn test_consumer_walk_matches_original() {
    #[derive(Default)]
    struct Names(Vec<String>);
    impl NodeVisitor for Names {
        fn visit_volume(&mut self, vol: &Arc<PhysVol>, depth: usize) {
            self.0.push(format!("{depth}:{}", vol.logvol().name));
        }
        fn visit_name_tag(&mut self, tag: &Arc<NameTag>, depth: usize) {
            self.0.push(format!("{depth}:tag {}", tag.name));
        }
        fn visit_serial_transformer(&mut self, st: &Arc<SerialTransformer>, depth: usize) {
            self.0.push(format!("{depth}:x{}", st.copies));
        }
    }

    let world = scenario();
    let store = GeometryStore::open_memory().await.unwrap();
    store.save(&world).await.unwrap();
    let built = store.load().await.unwrap();

    let (mut before, mut after) = (Names::default(), Names::default());
    GraphNode::from(world).exec(&mut before);
    GraphNode::from(built.root).exec(&mut after);
    assert_eq!(before.0, vec!["0:World", "1:tag Inner", "1:Inner", "1:x4"]);
    assert_eq!(after.0, before.0);
}

#[tokio::test]
async fn test_snapshot_file_round_trip() {
    let path = std::env::temp_dir().join(format!("geomodel-io-e2e-{}.json", std::process::id()));
    let _ = std::fs::remove_file(&path);
    let config = BackendConfig::Snapshot { path: path.clone() };

    let store = GeometryStore::open(&config).await.unwrap();
    store.save(&scenario()).await.unwrap();
    store.backend().shutdown().await.unwrap();

    let reopened = GeometryStore::open(&config).await.unwrap();
    let built = reopened.load().await.unwrap();
    assert_isomorphic(&scenario(), &built.root);
    let _ = std::fs::remove_file(&path);
}
