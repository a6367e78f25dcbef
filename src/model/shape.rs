//! Shapes: primitive solids and boolean/shift composites.
//!
//! Composite variants hold their operands as `Arc<Shape>` so an operand may be
//! shared between several composites. Sharing is by identity and survives a
//! write (one row per identity) but not a read, where each reference is
//! decoded on its own.

use std::sync::Arc;

use super::{NodeIdentity, Transform3D};

/// One z-plane of a polycone or polygon: position and radial extent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZPlane {
    pub z: f64,
    pub rmin: f64,
    pub rmax: f64,
}

impl ZPlane {
    pub fn new(z: f64, rmin: f64, rmax: f64) -> Self {
        Self { z, rmin, rmax }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetKind {
    Triangular,
    Quadrangular,
}

impl FacetKind {
    pub fn vertex_count(self) -> usize {
        match self {
            FacetKind::Triangular => 3,
            FacetKind::Quadrangular => 4,
        }
    }
}

/// Whether facet vertices after the first are absolute or relative to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexType {
    Absolute,
    Relative,
}

impl VertexType {
    pub fn as_str(self) -> &'static str {
        match self {
            VertexType::Absolute => "ABSOLUTE",
            VertexType::Relative => "RELATIVE",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ABSOLUTE" => Some(VertexType::Absolute),
            "RELATIVE" => Some(VertexType::Relative),
            _ => None,
        }
    }
}

/// A facet of a tessellated solid.
#[derive(Debug, Clone, PartialEq)]
pub struct Facet {
    pub kind: FacetKind,
    pub vertex_type: VertexType,
    pub vertices: Vec<[f64; 3]>,
}

impl Facet {
    pub fn triangle(vertices: [[f64; 3]; 3]) -> Self {
        Self { kind: FacetKind::Triangular, vertex_type: VertexType::Absolute, vertices: vertices.to_vec() }
    }

    pub fn quad(vertices: [[f64; 3]; 4]) -> Self {
        Self { kind: FacetKind::Quadrangular, vertex_type: VertexType::Absolute, vertices: vertices.to_vec() }
    }
}

/// The closed set of shape variants this crate knows how to persist.
///
/// `Opaque` stands for a shape implemented outside this crate; it carries only
/// its type name and cannot be encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum ShapeKind {
    Box { x: f64, y: f64, z: f64 },
    Cons { rmin1: f64, rmin2: f64, rmax1: f64, rmax2: f64, dz: f64, sphi: f64, dphi: f64 },
    Torus { rmin: f64, rmax: f64, rtor: f64, sphi: f64, dphi: f64 },
    Para { x: f64, y: f64, z: f64, alpha: f64, theta: f64, phi: f64 },
    Pcon { sphi: f64, dphi: f64, planes: Vec<ZPlane> },
    Pgon { sphi: f64, dphi: f64, nsides: u32, planes: Vec<ZPlane> },
    SimplePolygonBrep { dz: f64, vertices: Vec<[f64; 2]> },
    Trap {
        zhalf: f64,
        theta: f64,
        phi: f64,
        dydzn: f64,
        dxdyndzn: f64,
        dxdypdzn: f64,
        angleydzn: f64,
        dydzp: f64,
        dxdyndzp: f64,
        dxdypdzp: f64,
        angleydzp: f64,
    },
    Trd { x1: f64, x2: f64, y1: f64, y2: f64, z: f64 },
    Tube { rmin: f64, rmax: f64, zhalf: f64 },
    Tubs { rmin: f64, rmax: f64, zhalf: f64, sphi: f64, dphi: f64 },
    GenericTrap { zhalf: f64, vertices: Vec<[f64; 2]> },
    TessellatedSolid { facets: Vec<Facet> },
    Intersection { a: Arc<Shape>, b: Arc<Shape> },
    Subtraction { a: Arc<Shape>, b: Arc<Shape> },
    Union { a: Arc<Shape>, b: Arc<Shape> },
    Shift { op: Arc<Shape>, transform: Transform3D },
    Unidentified { name: String, ascii_data: String },
    Opaque { type_name: String },
}

impl ShapeKind {
    /// Persisted type tag.
    pub fn type_name(&self) -> &str {
        match self {
            ShapeKind::Box { .. } => "Box",
            ShapeKind::Cons { .. } => "Cons",
            ShapeKind::Torus { .. } => "Torus",
            ShapeKind::Para { .. } => "Para",
            ShapeKind::Pcon { .. } => "Pcon",
            ShapeKind::Pgon { .. } => "Pgon",
            ShapeKind::SimplePolygonBrep { .. } => "SimplePolygonBrep",
            ShapeKind::Trap { .. } => "Trap",
            ShapeKind::Trd { .. } => "Trd",
            ShapeKind::Tube { .. } => "Tube",
            ShapeKind::Tubs { .. } => "Tubs",
            ShapeKind::GenericTrap { .. } => "GenericTrap",
            ShapeKind::TessellatedSolid { .. } => "TessellatedSolid",
            ShapeKind::Intersection { .. } => "Intersection",
            ShapeKind::Subtraction { .. } => "Subtraction",
            ShapeKind::Union { .. } => "Union",
            ShapeKind::Shift { .. } => "Shift",
            ShapeKind::Unidentified { .. } => "UnidentifiedShape",
            ShapeKind::Opaque { type_name } => type_name,
        }
    }

    /// Operand shapes of a composite, empty for primitives.
    pub fn operands(&self) -> Vec<&Arc<Shape>> {
        match self {
            ShapeKind::Intersection { a, b }
            | ShapeKind::Subtraction { a, b }
            | ShapeKind::Union { a, b } => vec![a, b],
            ShapeKind::Shift { op, .. } => vec![op],
            _ => Vec::new(),
        }
    }
}

/// A shape instance with a runtime identity.
#[derive(Debug, Clone)]
pub struct Shape {
    identity: NodeIdentity,
    pub kind: ShapeKind,
}

impl Shape {
    pub fn new(kind: ShapeKind) -> Arc<Self> {
        Arc::new(Self { identity: NodeIdentity::next(), kind })
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }

    pub fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    // Convenience constructors for the most common solids.

    pub fn boxed(x: f64, y: f64, z: f64) -> Arc<Self> {
        Self::new(ShapeKind::Box { x, y, z })
    }

    pub fn tube(rmin: f64, rmax: f64, zhalf: f64) -> Arc<Self> {
        Self::new(ShapeKind::Tube { rmin, rmax, zhalf })
    }

    pub fn union(a: Arc<Shape>, b: Arc<Shape>) -> Arc<Self> {
        Self::new(ShapeKind::Union { a, b })
    }

    pub fn subtraction(a: Arc<Shape>, b: Arc<Shape>) -> Arc<Self> {
        Self::new(ShapeKind::Subtraction { a, b })
    }

    pub fn intersection(a: Arc<Shape>, b: Arc<Shape>) -> Arc<Self> {
        Self::new(ShapeKind::Intersection { a, b })
    }

    pub fn shift(op: Arc<Shape>, transform: Transform3D) -> Arc<Self> {
        Self::new(ShapeKind::Shift { op, transform })
    }
}

/// Structural equality over the kind; identity is ignored.
impl PartialEq for Shape {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_names() {
        assert_eq!(Shape::boxed(1.0, 2.0, 3.0).type_name(), "Box");
        let u = Shape::union(Shape::tube(0.0, 1.0, 2.0), Shape::boxed(1.0, 1.0, 1.0));
        assert_eq!(u.type_name(), "Union");
        assert_eq!(u.kind.operands().len(), 2);
        let o = Shape::new(ShapeKind::Opaque { type_name: "Ellipsoid".into() });
        assert_eq!(o.type_name(), "Ellipsoid");
    }

    #[test]
    fn test_structural_equality_of_composites() {
        let a = Shape::union(Shape::tube(0.0, 1.0, 2.0), Shape::boxed(1.0, 1.0, 1.0));
        let b = Shape::union(Shape::tube(0.0, 1.0, 2.0), Shape::boxed(1.0, 1.0, 1.0));
        assert_ne!(a.identity(), b.identity());
        assert_eq!(a, b);
    }
}
