//! Logical and physical volumes.

use std::sync::Arc;

use parking_lot::RwLock;

use super::{GraphNode, Material, NodeIdentity, Shape};

/// Immutable `(name, shape, material)` triple, shareable between placements.
#[derive(Debug)]
pub struct LogicalVolume {
    identity: NodeIdentity,
    pub name: String,
    pub shape: Arc<Shape>,
    pub material: Arc<Material>,
}

impl LogicalVolume {
    pub fn new(name: impl Into<String>, shape: Arc<Shape>, material: Arc<Material>) -> Arc<Self> {
        Arc::new(Self { identity: NodeIdentity::next(), name: name.into(), shape, material })
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }
}

impl PartialEq for LogicalVolume {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.shape == other.shape && self.material == other.material
    }
}

/// Plain placement or a full physical volume with its own alignable state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VolumeKind {
    Plain,
    Full,
}

/// A placed volume in the tree.
///
/// Children are appended while the graph is being assembled and are kept in
/// insertion order. Both variants share this capability; the reader relies on
/// it to attach rebuilt children.
#[derive(Debug)]
pub struct PhysVol {
    identity: NodeIdentity,
    kind: VolumeKind,
    logvol: Arc<LogicalVolume>,
    children: RwLock<Vec<GraphNode>>,
}

impl PhysVol {
    pub fn new(logvol: Arc<LogicalVolume>) -> Arc<Self> {
        Self::with_kind(VolumeKind::Plain, logvol)
    }

    pub fn new_full(logvol: Arc<LogicalVolume>) -> Arc<Self> {
        Self::with_kind(VolumeKind::Full, logvol)
    }

    pub fn with_kind(kind: VolumeKind, logvol: Arc<LogicalVolume>) -> Arc<Self> {
        Arc::new(Self {
            identity: NodeIdentity::next(),
            kind,
            logvol,
            children: RwLock::new(Vec::new()),
        })
    }

    pub fn identity(&self) -> NodeIdentity {
        self.identity
    }

    pub fn kind(&self) -> VolumeKind {
        self.kind
    }

    pub fn is_full(&self) -> bool {
        self.kind == VolumeKind::Full
    }

    pub fn logvol(&self) -> &Arc<LogicalVolume> {
        &self.logvol
    }

    /// Append a child graph node.
    pub fn add(&self, child: impl Into<GraphNode>) {
        self.children.write().push(child.into());
    }

    /// Snapshot of the children in order.
    pub fn children(&self) -> Vec<GraphNode> {
        self.children.read().clone()
    }

    pub fn child_count(&self) -> usize {
        self.children.read().len()
    }
}
