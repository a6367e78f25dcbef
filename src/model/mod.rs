//! # Geometry Graph Model
//!
//! The live scene graph that the writer persists and the reader rebuilds:
//! volumes, their logical volumes, shapes, materials and the leaf nodes
//! (name tags, serial denominators, transforms, serial transformers) that
//! decorate a volume's child list.
//!
//! Design rule: this module is pure data. No I/O, no tables, no async.
//! Every node carries a [`NodeIdentity`] stamped at construction, which the
//! writer uses as its deduplication key.

pub mod identity;
pub mod transform;
pub mod material;
pub mod shape;
pub mod volume;
pub mod node;

pub use identity::NodeIdentity;
pub use transform::Transform3D;
pub use material::{Element, Material, MaterialComponent};
pub use shape::{Facet, FacetKind, Shape, ShapeKind, VertexType, ZPlane};
pub use volume::{LogicalVolume, PhysVol, VolumeKind};
pub use node::{
    AlignableTransform, Function, GraphNode, NameTag, NodeVisitor,
    SerialDenominator, SerialTransformer, Transform,
};
