//! Graph nodes and depth-first traversal.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{NodeIdentity, PhysVol, Transform3D};
use crate::xf::TransFunction;

// ============================================================================
// Leaf nodes
// ============================================================================

/// Display name for the next sibling volume. No geometric meaning.
#[derive(Debug, Clone, PartialEq)]
pub struct NameTag {
    identity: NodeIdentity,
    pub name: String,
}

impl NameTag {
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { identity: NodeIdentity::next(), name: name.into() })
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }
}

/// Naming prefix for a run of sibling volumes (`base_name` + index).
#[derive(Debug, Clone, PartialEq)]
pub struct SerialDenominator {
    identity: NodeIdentity,
    pub base_name: String,
}

impl SerialDenominator {
    pub fn new(base_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { identity: NodeIdentity::next(), base_name: base_name.into() })
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }
}

/// A static placement transform applying to the next sibling volume.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    identity: NodeIdentity,
    pub matrix: Transform3D,
}

impl Transform {
    pub fn new(matrix: Transform3D) -> Arc<Self> {
        Arc::new(Self { identity: NodeIdentity::next(), matrix })
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }
}

/// A placement transform that may be re-aligned after construction.
///
/// The effective transform is `default * delta`. Only the effective value at
/// write time is persisted; a rebuilt node starts with no delta.
#[derive(Debug)]
pub struct AlignableTransform {
    identity: NodeIdentity,
    default: Transform3D,
    delta: RwLock<Option<Transform3D>>,
}

impl AlignableTransform {
    pub fn new(default: Transform3D) -> Arc<Self> {
        Arc::new(Self { identity: NodeIdentity::next(), default, delta: RwLock::new(None) })
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }

    pub fn default_transform(&self) -> Transform3D {
        self.default
    }

    pub fn set_delta(&self, delta: Transform3D) {
        *self.delta.write() = Some(delta);
    }

    pub fn clear_delta(&self) {
        *self.delta.write() = None;
    }

    pub fn transform(&self) -> Transform3D {
        match *self.delta.read() {
            Some(delta) => self.default * delta,
            None => self.default,
        }
    }
}

/// A placement function over the copy index.
#[derive(Debug, Clone)]
pub struct Function {
    identity: NodeIdentity,
    pub expression: TransFunction,
}

impl Function {
    pub fn new(expression: TransFunction) -> Arc<Self> {
        Arc::new(Self { identity: NodeIdentity::next(), expression })
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }
}

/// Generates `copies` placements of one volume through a placement function.
#[derive(Debug)]
pub struct SerialTransformer {
    identity: NodeIdentity,
    pub function: Arc<Function>,
    pub volume: Arc<PhysVol>,
    pub copies: u32,
}

impl SerialTransformer {
    pub fn new(function: Arc<Function>, volume: Arc<PhysVol>, copies: u32) -> Arc<Self> {
        Arc::new(Self { identity: NodeIdentity::next(), function, volume, copies })
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }

    /// Placement of copy `index` (0-based).
    pub fn placement(&self, index: u32) -> Transform3D {
        self.function.expression.eval(f64::from(index))
    }
}

// ============================================================================
// GraphNode
// ============================================================================

/// Any node that can appear as a child of a physical volume.
#[derive(Debug, Clone)]
pub enum GraphNode {
    PhysVol(Arc<PhysVol>),
    NameTag(Arc<NameTag>),
    SerialDenominator(Arc<SerialDenominator>),
    Transform(Arc<Transform>),
    AlignableTransform(Arc<AlignableTransform>),
    SerialTransformer(Arc<SerialTransformer>),
}

impl GraphNode {
    pub fn identity(&self) -> NodeIdentity {
        match self {
            GraphNode::PhysVol(n) => n.identity(),
            GraphNode::NameTag(n) => n.identity(),
            GraphNode::SerialDenominator(n) => n.identity(),
            GraphNode::Transform(n) => n.identity(),
            GraphNode::AlignableTransform(n) => n.identity(),
            GraphNode::SerialTransformer(n) => n.identity(),
        }
    }

    pub fn as_volume(&self) -> Option<&Arc<PhysVol>> {
        match self {
            GraphNode::PhysVol(v) => Some(v),
            _ => None,
        }
    }

    /// Depth-first walk starting at this node with depth 0.
    ///
    /// Volumes descend into their children in order. Serial transformers are
    /// reported but their referenced volume is not entered.
    pub fn exec(&self, visitor: &mut dyn NodeVisitor) {
        self.walk(visitor, 0);
    }

    fn walk(&self, visitor: &mut dyn NodeVisitor, depth: usize) {
        match self {
            GraphNode::PhysVol(vol) => {
                visitor.visit_volume(vol, depth);
                for child in vol.children() {
                    child.walk(visitor, depth + 1);
                }
            }
            GraphNode::NameTag(n) => visitor.visit_name_tag(n, depth),
            GraphNode::SerialDenominator(n) => visitor.visit_serial_denominator(n, depth),
            GraphNode::Transform(n) => visitor.visit_transform(n, depth),
            GraphNode::AlignableTransform(n) => visitor.visit_alignable_transform(n, depth),
            GraphNode::SerialTransformer(n) => visitor.visit_serial_transformer(n, depth),
        }
    }
}

macro_rules! graph_node_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<Arc<$variant>> for GraphNode {
                fn from(n: Arc<$variant>) -> Self {
                    GraphNode::$variant(n)
                }
            }
        )*
    };
}

graph_node_from!(PhysVol, NameTag, SerialDenominator, Transform, AlignableTransform, SerialTransformer);

// ============================================================================
// NodeVisitor
// ============================================================================

/// Callbacks for [`GraphNode::exec`]. Every method defaults to a no-op.
#[allow(unused_variables)]
pub trait NodeVisitor {
    fn visit_volume(&mut self, vol: &Arc<PhysVol>, depth: usize) {}
    fn visit_name_tag(&mut self, tag: &Arc<NameTag>, depth: usize) {}
    fn visit_serial_denominator(&mut self, denom: &Arc<SerialDenominator>, depth: usize) {}
    fn visit_transform(&mut self, xf: &Arc<Transform>, depth: usize) {}
    fn visit_alignable_transform(&mut self, xf: &Arc<AlignableTransform>, depth: usize) {}
    fn visit_serial_transformer(&mut self, st: &Arc<SerialTransformer>, depth: usize) {}
}
