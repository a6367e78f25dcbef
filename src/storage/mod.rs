//! # Storage Backend Trait
//!
//! This is THE contract between the geometry writer/reader and any table
//! store. It covers typed node-type tables with sequential row ids, the
//! child-position edge index, the root designation and the node-type
//! registry.
//!
//! ## Implementations
//!
//! | Backend | Module | Description |
//! |---------|--------|-------------|
//! | `MemoryBackend` | `memory` | In-memory, optional JSON snapshot file |

pub mod memory;
pub mod schema;
pub mod value;

use std::fmt;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::tx::{Transaction, TxMode};
use crate::Result;

pub use memory::{MemoryBackend, Snapshot};
pub use schema::{Column, ColumnType, NodeTypeEntry, NodeTypeRegistry, TableKind, TableSchema};
pub use value::{Cell, Row};

// ============================================================================
// Backend Configuration
// ============================================================================

/// Configuration for opening a storage backend.
#[derive(Debug, Clone, Default)]
pub enum BackendConfig {
    /// In-memory (no persistence)
    #[default]
    Memory,

    /// In-memory, loaded from and written back to a JSON snapshot file
    Snapshot { path: PathBuf },
}

// ============================================================================
// Ids and records
// ============================================================================

/// Row id within one table. Assigned sequentially from 1; 0 is never valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RowId(pub u64);

impl RowId {
    pub fn get(self) -> u64 {
        self.0
    }

    /// Row id from a stored integer cell; rejects zero and negatives.
    pub fn from_cell_value(v: i64) -> Option<Self> {
        u64::try_from(v).ok().filter(|v| *v > 0).map(RowId)
    }

    pub fn as_cell(self) -> Cell {
        Cell::Int(self.0 as i64)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One parent→child edge with ordering and copy-number disambiguation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildPositionRecord {
    /// `None` marks the legacy root group whose children attach to nothing.
    pub parent_id: Option<RowId>,
    pub parent_table_id: u32,
    pub parent_copy_number: u32,
    pub position: u32,
    pub child_table_id: u32,
    pub child_id: RowId,
    /// 0 for non-volume children.
    pub child_copy_number: u32,
}

impl ChildPositionRecord {
    pub fn parent_key(&self) -> ParentKey {
        ParentKey {
            id: self.parent_id,
            table_id: self.parent_table_id,
            copy_number: self.parent_copy_number,
        }
    }
}

/// Grouping key of the child-position index: one instance of one parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParentKey {
    pub id: Option<RowId>,
    pub table_id: u32,
    pub copy_number: u32,
}

impl fmt::Display for ParentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            Some(id) => write!(f, "{id}:{}:{}", self.table_id, self.copy_number),
            None => write!(f, "NULL:{}:{}", self.table_id, self.copy_number),
        }
    }
}

/// The designated root volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootVolumeRecord {
    pub id: RowId,
    pub node_type: String,
}

// ============================================================================
// StorageBackend Trait
// ============================================================================

/// The table-store contract.
///
/// Mutating operations take the open transaction mutably; reads borrow it.
/// A backend that has been shut down fails every call with
/// `Error::BackendUnavailable`.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// The transaction type for this backend.
    type Tx: Transaction;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Whether the store accepts operations.
    fn is_open(&self) -> bool;

    /// Create all typed tables and the node-type registry. Idempotent.
    async fn initialize(&self) -> Result<()>;

    /// The node-type name ↔ table id mapping.
    async fn node_types(&self) -> Result<NodeTypeRegistry>;

    /// Shut down the backend, flushing any pending writes.
    async fn shutdown(&self) -> Result<()>;

    // ========================================================================
    // Transactions
    // ========================================================================

    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Node-type tables
    // ========================================================================

    /// Append one row, returning its id.
    async fn insert_row(&self, tx: &mut Self::Tx, table: TableKind, row: Row) -> Result<RowId>;

    /// Append many rows, returning their ids in order.
    async fn insert_rows(&self, tx: &mut Self::Tx, table: TableKind, rows: Vec<Row>) -> Result<Vec<RowId>> {
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            ids.push(self.insert_row(tx, table, row).await?);
        }
        Ok(ids)
    }

    async fn get_row(&self, tx: &Self::Tx, table: TableKind, id: RowId) -> Result<Option<Row>>;

    /// Every row of a table in id order.
    async fn table_rows(&self, tx: &Self::Tx, table: TableKind) -> Result<Vec<(RowId, Row)>>;

    async fn row_count(&self, tx: &Self::Tx, table: TableKind) -> Result<u64>;

    // ========================================================================
    // Child positions and root
    // ========================================================================

    async fn insert_child_positions(&self, tx: &mut Self::Tx, records: Vec<ChildPositionRecord>) -> Result<()>;

    async fn child_positions(&self, tx: &Self::Tx) -> Result<Vec<ChildPositionRecord>>;

    async fn set_root_volume(&self, tx: &mut Self::Tx, root: RootVolumeRecord) -> Result<()>;

    async fn root_volume(&self, tx: &Self::Tx) -> Result<Option<RootVolumeRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_id_from_cell() {
        assert_eq!(RowId::from_cell_value(3), Some(RowId(3)));
        assert_eq!(RowId::from_cell_value(0), None);
        assert_eq!(RowId::from_cell_value(-2), None);
    }

    #[test]
    fn test_parent_keys_sort_null_first() {
        let null = ParentKey { id: None, table_id: 1, copy_number: 1 };
        let one = ParentKey { id: Some(RowId(1)), table_id: 1, copy_number: 1 };
        assert!(null < one);
        assert_eq!(one.to_string(), "1:1:1");
        assert_eq!(null.to_string(), "NULL:1:1");
    }
}
