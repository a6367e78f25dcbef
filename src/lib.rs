//! # geomodel-io: Geometry Scene-Graph Persistence
//!
//! Writes a detector-geometry scene graph (volumes, logical volumes, shapes,
//! materials, placement transforms, name tags and parametrised replicas) to
//! typed tables, and rebuilds an equivalent graph from them.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `StorageBackend` is the contract between the
//!    writer/reader and storage
//! 2. **Identity, not value**: the writer deduplicates by node identity, so
//!    a node reachable through several parents is stored once
//! 3. **Copy numbers**: each placement of a shared volume is an instance;
//!    its children are recorded against `(table, id, copy number)`
//! 4. **Bulk I/O**: one transaction per save, one bulk fetch per load
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use geomodel_io::{GeometryStore, Material, PhysVol, LogicalVolume, Shape};
//!
//! # async fn example() -> geomodel_io::Result<()> {
//! let store = GeometryStore::open_memory().await?;
//!
//! let air = Material::new("Air", 0.0012).into_shared();
//! let world = PhysVol::new(LogicalVolume::new("World", Shape::boxed(1000.0, 1000.0, 1000.0), air));
//!
//! let summary = store.save(&world).await?;
//! println!("{:?}", summary.rows);
//!
//! let built = store.load().await?;
//! assert_eq!(built.root.logvol().name, "World");
//! # Ok(())
//! # }
//! ```
//!
//! ## Storage Backends
//!
//! | Backend | Config | Description |
//! |---------|--------|-------------|
//! | Memory | `BackendConfig::Memory` (default) | In-memory tables for testing/embedding |
//! | Snapshot | `BackendConfig::Snapshot { path }` | Memory tables loaded from and saved to a JSON file |

use std::sync::Arc;

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod xf;
pub mod storage;
pub mod tx;
pub mod codec;
pub mod cache;
pub mod write;
pub mod read;
pub mod export;

// ============================================================================
// Re-exports: Model
// ============================================================================

pub use model::{
    AlignableTransform, Element, Function, GraphNode, LogicalVolume, Material, NameTag,
    NodeIdentity, NodeVisitor, PhysVol, SerialDenominator, SerialTransformer, Shape, ShapeKind,
    Transform, Transform3D, VolumeKind,
};

// ============================================================================
// Re-exports: Storage
// ============================================================================

pub use storage::{
    BackendConfig, Cell, ChildPositionRecord, MemoryBackend, NodeTypeRegistry, RootVolumeRecord,
    Row, RowId, StorageBackend, TableKind,
};

// ============================================================================
// Re-exports: Transactions
// ============================================================================

pub use tx::{Transaction, TxId, TxMode};

// ============================================================================
// Re-exports: Sessions
// ============================================================================

pub use read::{BuiltGeometry, GraphReader, ReaderConfig};
pub use write::{GraphWriter, WriteSummary, WriterState};

// ============================================================================
// Top-level store handle
// ============================================================================

/// The primary entry point. A `GeometryStore` wraps a storage backend and
/// runs one writer or reader session per call.
pub struct GeometryStore<B: StorageBackend> {
    backend: B,
}

impl<B: StorageBackend> GeometryStore<B> {
    /// Create a store with the given backend.
    pub fn with_backend(backend: B) -> Self {
        Self { backend }
    }

    /// Persist the tree under `root` in a single transaction. The store
    /// must be empty.
    pub async fn save(&self, root: &Arc<PhysVol>) -> Result<WriteSummary> {
        let mut writer = GraphWriter::open(&self.backend).await?;
        writer.write_tree(root)?;
        writer.save().await
    }

    /// Rebuild the stored geometry.
    pub async fn load(&self) -> Result<BuiltGeometry> {
        self.load_with(ReaderConfig::default()).await
    }

    pub async fn load_with(&self, config: ReaderConfig) -> Result<BuiltGeometry> {
        let mut reader = GraphReader::open_with(&self.backend, config).await?;
        reader.load().await?;
        reader.build()
    }

    /// Write a human-readable listing of the stored tables.
    pub async fn dump(&self, out: &mut dyn std::io::Write) -> Result<()> {
        export::dump_geometry(&self.backend, out).await
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }
}

/// In-memory store for testing and embedding.
impl GeometryStore<MemoryBackend> {
    pub async fn open_memory() -> Result<Self> {
        Ok(Self::with_backend(MemoryBackend::new()))
    }

    pub async fn open(config: &BackendConfig) -> Result<Self> {
        Ok(Self::with_backend(MemoryBackend::with_config(config)?))
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Malformed {table} record{}: {message}", row_suffix(.id))]
    MalformedRecord { table: String, id: Option<RowId>, message: String },

    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    #[error("Structure error: {0}")]
    Structure(String),

    #[error("Placement function has no persistable expression")]
    EmptyFunction,

    #[error("Expression error: {0}")]
    Expression(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Attach the row a codec or expression error came from. Errors that
    /// already name a row pass through unchanged, as do all other variants.
    pub fn in_row(self, table: TableKind, row: RowId) -> Self {
        match self {
            Error::MalformedRecord { table: context, id: None, message } => {
                let message = if context == table.type_name() { message } else { format!("{context}: {message}") };
                Error::MalformedRecord { table: table.type_name().to_owned(), id: Some(row), message }
            }
            Error::Expression(message) => Error::MalformedRecord {
                table: table.type_name().to_owned(),
                id: Some(row),
                message: format!("expression: {message}"),
            },
            other => other,
        }
    }
}

fn row_suffix(id: &Option<RowId>) -> String {
    id.map(|id| format!(" {id}")).unwrap_or_default()
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_row_names_the_row() {
        let err = codec::transform::decode(&[0.0; 3]).unwrap_err().in_row(TableKind::Transform, RowId(5));
        assert_eq!(err.to_string(), "Malformed GeoTransform record 5: expected 12 coefficients, found 3");

        let err = Error::MalformedRecord { table: "Box".into(), id: None, message: "too short".into() }
            .in_row(TableKind::Shape, RowId(2));
        assert_eq!(err.to_string(), "Malformed GeoShape record 2: Box: too short");

        assert!(matches!(Error::EmptyFunction.in_row(TableKind::Function, RowId(1)), Error::EmptyFunction));
    }
}
