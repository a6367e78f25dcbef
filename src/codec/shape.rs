//! Shape codec.
//!
//! `encode` turns a shape into `(type tag, parameter string)`. Composite
//! operands are never inlined: the [`ShapeSink`] persists each operand first
//! and the composite stores the returned row ids. `decode` is the inverse and
//! pulls operands back through a [`ShapeSource`].

use std::sync::Arc;

use super::{FieldCursor, FieldWriter};
use crate::model::{Facet, FacetKind, Shape, ShapeKind, Transform3D, VertexType, ZPlane};
use crate::storage::RowId;
use crate::{Error, Result};

/// Where the encoder sends operand shapes and shift matrices.
pub trait ShapeSink {
    /// Persist (or reuse) a shape row and return its id.
    fn persist_shape(&mut self, shape: &Arc<Shape>) -> Result<RowId>;

    /// Persist a shift matrix as a new transform row and return its id.
    fn persist_shift_transform(&mut self, transform: &Transform3D) -> Result<RowId>;

    /// Record a shape kind that has no parameter layout.
    fn needs_persistence(&mut self, type_name: &str);
}

/// Where the decoder fetches operand shapes and shift matrices by row id.
pub trait ShapeSource {
    fn shape(&mut self, id: RowId) -> Result<Arc<Shape>>;
    fn transform(&mut self, id: RowId) -> Result<Transform3D>;
}

/// Stored form of one shape row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedShape {
    pub type_tag: String,
    pub parameters: String,
}

/// Result of decoding a stored shape row.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedShape {
    Known(ShapeKind),
    /// The tag has no decoder; carries the tag for diagnostics.
    Unknown(String),
}

/// Fixed-size cube standing in for shapes that cannot be decoded.
pub fn placeholder(half_length: f64) -> ShapeKind {
    ShapeKind::Box { x: half_length, y: half_length, z: half_length }
}

// ============================================================================
// Encode
// ============================================================================

pub fn encode(shape: &Shape, sink: &mut dyn ShapeSink) -> Result<EncodedShape> {
    let mut w = FieldWriter::new();
    match &shape.kind {
        ShapeKind::Box { x, y, z } => {
            w.number("XHalfLength", *x).number("YHalfLength", *y).number("ZHalfLength", *z);
        }
        ShapeKind::Cons { rmin1, rmin2, rmax1, rmax2, dz, sphi, dphi } => {
            w.number("RMin1", *rmin1)
                .number("RMin2", *rmin2)
                .number("RMax1", *rmax1)
                .number("RMax2", *rmax2)
                .number("DZ", *dz)
                .number("SPhi", *sphi)
                .number("DPhi", *dphi);
        }
        ShapeKind::Torus { rmin, rmax, rtor, sphi, dphi } => {
            w.number("Rmin", *rmin)
                .number("Rmax", *rmax)
                .number("Rtor", *rtor)
                .number("SPhi", *sphi)
                .number("DPhi", *dphi);
        }
        ShapeKind::Para { x, y, z, alpha, theta, phi } => {
            w.number("XHalfLength", *x)
                .number("YHalfLength", *y)
                .number("ZHalfLength", *z)
                .number("Alpha", *alpha)
                .number("Theta", *theta)
                .number("Phi", *phi);
        }
        ShapeKind::Pcon { sphi, dphi, planes } => {
            w.number("SPhi", *sphi).number("DPhi", *dphi).field("NZPlanes", planes.len());
            write_planes(&mut w, planes);
        }
        ShapeKind::Pgon { sphi, dphi, nsides, planes } => {
            w.number("SPhi", *sphi)
                .number("DPhi", *dphi)
                .field("NSides", nsides)
                .field("NZPlanes", planes.len());
            write_planes(&mut w, planes);
        }
        ShapeKind::SimplePolygonBrep { dz, vertices } => {
            w.number("DZ", *dz).field("NVertices", vertices.len());
            for [x, y] in vertices {
                w.number("xV", *x).number("yV", *y);
            }
        }
        ShapeKind::Trap {
            zhalf,
            theta,
            phi,
            dydzn,
            dxdyndzn,
            dxdypdzn,
            angleydzn,
            dydzp,
            dxdyndzp,
            dxdypdzp,
            angleydzp,
        } => {
            w.number("ZHalfLength", *zhalf)
                .number("Theta", *theta)
                .number("Phi", *phi)
                .number("Dydzn", *dydzn)
                .number("Dxdyndzn", *dxdyndzn)
                .number("Dxdypdzn", *dxdypdzn)
                .number("Angleydzn", *angleydzn)
                .number("Dydzp", *dydzp)
                .number("Dxdyndzp", *dxdyndzp)
                .number("Dxdypdzp", *dxdypdzp)
                .number("Angleydzp", *angleydzp);
        }
        ShapeKind::Trd { x1, x2, y1, y2, z } => {
            w.number("XHalfLength1", *x1)
                .number("XHalfLength2", *x2)
                .number("YHalfLength1", *y1)
                .number("YHalfLength2", *y2)
                .number("ZHalfLength", *z);
        }
        ShapeKind::Tube { rmin, rmax, zhalf } => {
            w.number("RMin", *rmin).number("RMax", *rmax).number("ZHalfLength", *zhalf);
        }
        ShapeKind::Tubs { rmin, rmax, zhalf, sphi, dphi } => {
            w.number("RMin", *rmin)
                .number("RMax", *rmax)
                .number("ZHalfLength", *zhalf)
                .number("SPhi", *sphi)
                .number("DPhi", *dphi);
        }
        ShapeKind::GenericTrap { zhalf, vertices } => {
            w.number("ZHalfLength", *zhalf).field("NVertices", vertices.len());
            for [x, y] in vertices {
                w.number("X", *x).number("Y", *y);
            }
        }
        ShapeKind::TessellatedSolid { facets } => {
            w.field("nFacets", facets.len());
            for facet in facets {
                w.marker(match facet.kind {
                    FacetKind::Triangular => "TRI",
                    FacetKind::Quadrangular => "QUAD",
                })
                .field("vT", facet.vertex_type.as_str())
                .field("nV", facet.vertices.len());
                for [x, y, z] in &facet.vertices {
                    w.number("xV", *x).number("yV", *y).number("zV", *z);
                }
            }
        }
        ShapeKind::Intersection { a, b } | ShapeKind::Subtraction { a, b } | ShapeKind::Union { a, b } => {
            let op_a = sink.persist_shape(a)?;
            let op_b = sink.persist_shape(b)?;
            w.field("opA", op_a).field("opB", op_b);
        }
        ShapeKind::Shift { op, transform } => {
            let op_id = sink.persist_shape(op)?;
            let xf_id = sink.persist_shift_transform(transform)?;
            w.field("A", op_id).field("X", xf_id);
        }
        ShapeKind::Unidentified { name, ascii_data } => {
            w.text("name", name).text("asciiData", ascii_data);
        }
        ShapeKind::Opaque { type_name } => {
            sink.needs_persistence(type_name);
            return Ok(EncodedShape { type_tag: opaque_tag(type_name), parameters: w.finish() });
        }
    }
    Ok(EncodedShape { type_tag: shape.type_name().to_owned(), parameters: w.finish() })
}

/// Tags with a parameter layout in [`decode`].
pub const KNOWN_TAGS: &[&str] = &[
    "Box",
    "Cons",
    "Torus",
    "Para",
    "Pcon",
    "Pgon",
    "SimplePolygonBrep",
    "Trap",
    "Trd",
    "Tube",
    "Tubs",
    "GenericTrap",
    "TessellatedSolid",
    "Intersection",
    "Subtraction",
    "Union",
    "Shift",
    "UnidentifiedShape",
];

/// Marker appended to an opaque shape name that collides with a known tag.
pub const OPAQUE_SUFFIX: &str = "#opaque";

/// Stored tag for a shape with no parameter layout. A name equal to a known
/// tag gets [`OPAQUE_SUFFIX`] so its empty parameter string is never handed
/// to that tag's decoder.
fn opaque_tag(type_name: &str) -> String {
    if KNOWN_TAGS.contains(&type_name) {
        format!("{type_name}{OPAQUE_SUFFIX}")
    } else {
        type_name.to_owned()
    }
}

fn write_planes(w: &mut FieldWriter, planes: &[ZPlane]) {
    for p in planes {
        w.number("ZPos", p.z).number("ZRmin", p.rmin).number("ZRmax", p.rmax);
    }
}

// ============================================================================
// Decode
// ============================================================================

pub fn decode(type_tag: &str, parameters: &str, source: &mut dyn ShapeSource) -> Result<DecodedShape> {
    let kind = match type_tag {
        "Box" => {
            let mut c = FieldCursor::new(type_tag, parameters, 3)?;
            let kind = ShapeKind::Box {
                x: c.expect_f64("XHalfLength")?,
                y: c.expect_f64("YHalfLength")?,
                z: c.expect_f64("ZHalfLength")?,
            };
            c.finish()?;
            kind
        }
        "Cons" => {
            let mut c = FieldCursor::new(type_tag, parameters, 7)?;
            let kind = ShapeKind::Cons {
                rmin1: c.expect_f64("RMin1")?,
                rmin2: c.expect_f64("RMin2")?,
                rmax1: c.expect_f64("RMax1")?,
                rmax2: c.expect_f64("RMax2")?,
                dz: c.expect_f64("DZ")?,
                sphi: c.expect_f64("SPhi")?,
                dphi: c.expect_f64("DPhi")?,
            };
            c.finish()?;
            kind
        }
        "Torus" => {
            let mut c = FieldCursor::new(type_tag, parameters, 5)?;
            let kind = ShapeKind::Torus {
                rmin: c.expect_f64("Rmin")?,
                rmax: c.expect_f64("Rmax")?,
                rtor: c.expect_f64("Rtor")?,
                sphi: c.expect_f64("SPhi")?,
                dphi: c.expect_f64("DPhi")?,
            };
            c.finish()?;
            kind
        }
        "Para" => {
            let mut c = FieldCursor::new(type_tag, parameters, 6)?;
            let kind = ShapeKind::Para {
                x: c.expect_f64("XHalfLength")?,
                y: c.expect_f64("YHalfLength")?,
                z: c.expect_f64("ZHalfLength")?,
                alpha: c.expect_f64("Alpha")?,
                theta: c.expect_f64("Theta")?,
                phi: c.expect_f64("Phi")?,
            };
            c.finish()?;
            kind
        }
        "Pcon" => {
            let mut c = FieldCursor::new(type_tag, parameters, 3)?;
            let sphi = c.expect_f64("SPhi")?;
            let dphi = c.expect_f64("DPhi")?;
            let n = c.expect_u32("NZPlanes")?;
            let planes = read_planes(&mut c, n)?;
            c.finish()?;
            ShapeKind::Pcon { sphi, dphi, planes }
        }
        "Pgon" => {
            let mut c = FieldCursor::new(type_tag, parameters, 4)?;
            let sphi = c.expect_f64("SPhi")?;
            let dphi = c.expect_f64("DPhi")?;
            let nsides = c.expect_u32("NSides")?;
            let n = c.expect_u32("NZPlanes")?;
            let planes = read_planes(&mut c, n)?;
            c.finish()?;
            ShapeKind::Pgon { sphi, dphi, nsides, planes }
        }
        "SimplePolygonBrep" => {
            let mut c = FieldCursor::new(type_tag, parameters, 2)?;
            let dz = c.expect_f64("DZ")?;
            let n = c.expect_u32("NVertices")?;
            check_group_count(&c, n, 2)?;
            let vertices = (0..n)
                .map(|_| Ok([c.expect_f64("xV")?, c.expect_f64("yV")?]))
                .collect::<Result<Vec<_>>>()?;
            c.finish()?;
            ShapeKind::SimplePolygonBrep { dz, vertices }
        }
        "Trap" => {
            let mut c = FieldCursor::new(type_tag, parameters, 11)?;
            let kind = ShapeKind::Trap {
                zhalf: c.expect_f64("ZHalfLength")?,
                theta: c.expect_f64("Theta")?,
                phi: c.expect_f64("Phi")?,
                dydzn: c.expect_f64("Dydzn")?,
                dxdyndzn: c.expect_f64("Dxdyndzn")?,
                dxdypdzn: c.expect_f64("Dxdypdzn")?,
                angleydzn: c.expect_f64("Angleydzn")?,
                dydzp: c.expect_f64("Dydzp")?,
                dxdyndzp: c.expect_f64("Dxdyndzp")?,
                dxdypdzp: c.expect_f64("Dxdypdzp")?,
                angleydzp: c.expect_f64("Angleydzp")?,
            };
            c.finish()?;
            kind
        }
        "Trd" => {
            let mut c = FieldCursor::new(type_tag, parameters, 5)?;
            let kind = ShapeKind::Trd {
                x1: c.expect_f64("XHalfLength1")?,
                x2: c.expect_f64("XHalfLength2")?,
                y1: c.expect_f64("YHalfLength1")?,
                y2: c.expect_f64("YHalfLength2")?,
                z: c.expect_f64("ZHalfLength")?,
            };
            c.finish()?;
            kind
        }
        "Tube" => {
            let mut c = FieldCursor::new(type_tag, parameters, 3)?;
            let kind = ShapeKind::Tube {
                rmin: c.expect_f64("RMin")?,
                rmax: c.expect_f64("RMax")?,
                zhalf: c.expect_f64("ZHalfLength")?,
            };
            c.finish()?;
            kind
        }
        "Tubs" => {
            let mut c = FieldCursor::new(type_tag, parameters, 5)?;
            let kind = ShapeKind::Tubs {
                rmin: c.expect_f64("RMin")?,
                rmax: c.expect_f64("RMax")?,
                zhalf: c.expect_f64("ZHalfLength")?,
                sphi: c.expect_f64("SPhi")?,
                dphi: c.expect_f64("DPhi")?,
            };
            c.finish()?;
            kind
        }
        "GenericTrap" => {
            let mut c = FieldCursor::new(type_tag, parameters, 2)?;
            let zhalf = c.expect_f64("ZHalfLength")?;
            let n = c.expect_u32("NVertices")?;
            check_group_count(&c, n, 2)?;
            let vertices = (0..n)
                .map(|_| Ok([c.expect_f64("X")?, c.expect_f64("Y")?]))
                .collect::<Result<Vec<_>>>()?;
            c.finish()?;
            ShapeKind::GenericTrap { zhalf, vertices }
        }
        "TessellatedSolid" => {
            let mut c = FieldCursor::new(type_tag, parameters, 1)?;
            let n = c.expect_u32("nFacets")?;
            let facets = (0..n).map(|_| read_facet(&mut c)).collect::<Result<Vec<_>>>()?;
            c.finish()?;
            ShapeKind::TessellatedSolid { facets }
        }
        "Intersection" | "Subtraction" | "Union" => {
            let mut c = FieldCursor::new(type_tag, parameters, 2)?;
            let op_a = c.expect_row_id("opA")?;
            let op_b = c.expect_row_id("opB")?;
            c.finish()?;
            let a = source.shape(op_a)?;
            let b = source.shape(op_b)?;
            match type_tag {
                "Intersection" => ShapeKind::Intersection { a, b },
                "Subtraction" => ShapeKind::Subtraction { a, b },
                _ => ShapeKind::Union { a, b },
            }
        }
        "Shift" => {
            let mut c = FieldCursor::new(type_tag, parameters, 2)?;
            let op_id = c.expect_row_id("A")?;
            let xf_id = c.expect_row_id("X")?;
            c.finish()?;
            ShapeKind::Shift { op: source.shape(op_id)?, transform: source.transform(xf_id)? }
        }
        "UnidentifiedShape" => {
            let mut c = FieldCursor::new(type_tag, parameters, 2)?;
            let kind = ShapeKind::Unidentified {
                name: c.expect_str("name")?.to_owned(),
                ascii_data: c.expect_str("asciiData")?.to_owned(),
            };
            c.finish()?;
            kind
        }
        other => return Ok(DecodedShape::Unknown(other.to_owned())),
    };
    Ok(DecodedShape::Known(kind))
}

/// A declared group count must fit in the fields that are left.
fn check_group_count(c: &FieldCursor, n: u32, group: usize) -> Result<()> {
    let needed = (n as usize).saturating_mul(group);
    if needed > c.remaining() {
        return Err(Error::MalformedRecord {
            table: "GeoShape".into(),
            id: None,
            message: format!("{n} groups of {group} declared, only {} fields left", c.remaining()),
        });
    }
    Ok(())
}

fn read_planes(c: &mut FieldCursor, n: u32) -> Result<Vec<ZPlane>> {
    check_group_count(c, n, 3)?;
    (0..n)
        .map(|_| Ok(ZPlane::new(c.expect_f64("ZPos")?, c.expect_f64("ZRmin")?, c.expect_f64("ZRmax")?)))
        .collect()
}

fn read_facet(c: &mut FieldCursor) -> Result<Facet> {
    let marker = c.expect_marker()?;
    let kind = match marker {
        "TRI" => FacetKind::Triangular,
        "QUAD" => FacetKind::Quadrangular,
        other => {
            return Err(Error::MalformedRecord {
                table: "GeoShape".into(),
                id: None,
                message: format!("TessellatedSolid: unknown facet marker '{other}'"),
            });
        }
    };
    let vt = c.expect_str("vT")?;
    let vertex_type = VertexType::parse(vt).ok_or_else(|| Error::MalformedRecord {
        table: "GeoShape".into(),
        id: None,
        message: format!("TessellatedSolid: unknown vertex type '{vt}'"),
    })?;
    let nv = c.expect_u32("nV")?;
    if nv as usize != kind.vertex_count() {
        return Err(Error::MalformedRecord {
            table: "GeoShape".into(),
            id: None,
            message: format!("TessellatedSolid: {marker} facet with {nv} vertices"),
        });
    }
    let vertices = (0..nv)
        .map(|_| Ok([c.expect_f64("xV")?, c.expect_f64("yV")?, c.expect_f64("zV")?]))
        .collect::<Result<Vec<_>>>()?;
    Ok(Facet { kind, vertex_type, vertices })
}

// ============================================================================
// Tests
// ============================================================================
