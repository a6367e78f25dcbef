//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`.
//! It keeps every table as a `Vec<Row>` (row id = index + 1) behind
//! per-collection `RwLock`s.
//!
//! ## Transactions
//!
//! Writes are staged inside the `MemoryTx` and applied on `commit_tx()`;
//! `rollback_tx()` discards them. Reads through a transaction see committed
//! rows plus that transaction's own staged rows. There is no isolation
//! between concurrent writers: a commit fails if another commit grew a table
//! after this transaction started staging into it.
//!
//! ## Snapshots
//!
//! With `BackendConfig::Snapshot` the backend loads a JSON snapshot on open
//! (if the file exists) and writes the committed state back on `shutdown()`.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hashbrown::HashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    ChildPositionRecord, NodeTypeRegistry, RootVolumeRecord, Row, RowId, StorageBackend, TableKind,
};
use crate::tx::{Transaction, TxId, TxMode};
use crate::{Error, Result};

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory geometry table store.
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    open: AtomicBool,
    snapshot_path: Option<PathBuf>,
    created_at: RwLock<DateTime<Utc>>,
    registry: RwLock<NodeTypeRegistry>,
    /// table → rows; a table exists only once `initialize()` created it
    tables: RwLock<HashMap<TableKind, Vec<Row>>>,
    child_positions: RwLock<Vec<ChildPositionRecord>>,
    root: RwLock<Option<RootVolumeRecord>>,
    next_tx_id: AtomicU64,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::build(None, Snapshot::empty())
    }

    /// Open according to `config`. A snapshot path that does not exist yet
    /// starts an empty store that will be written there on shutdown.
    pub fn with_config(config: &super::BackendConfig) -> Result<Self> {
        match config {
            super::BackendConfig::Memory => Ok(Self::new()),
            super::BackendConfig::Snapshot { path } => {
                let snapshot = if path.exists() {
                    let s = Self::read_snapshot(path)?;
                    info!(path = %path.display(), created_at = %s.created_at, "loaded geometry snapshot");
                    s
                } else {
                    Snapshot::empty()
                };
                Ok(Self::build(Some(path.clone()), snapshot))
            }
        }
    }

    /// Rebuild a backend from a snapshot (no file attached).
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self::build(None, snapshot)
    }

    fn build(snapshot_path: Option<PathBuf>, s: Snapshot) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                open: AtomicBool::new(true),
                snapshot_path,
                created_at: RwLock::new(s.created_at),
                registry: RwLock::new(s.node_types),
                tables: RwLock::new(s.tables.into_iter().collect()),
                child_positions: RwLock::new(s.child_positions),
                root: RwLock::new(s.root),
                next_tx_id: AtomicU64::new(1),
            }),
        }
    }

    /// Copy of the committed state.
    pub fn snapshot(&self) -> Result<Snapshot> {
        self.check_open()?;
        Ok(Snapshot {
            created_at: *self.inner.created_at.read(),
            node_types: self.inner.registry.read().clone(),
            tables: self.inner.tables.read().iter().map(|(k, v)| (*k, v.clone())).collect(),
            child_positions: self.inner.child_positions.read().clone(),
            root: self.inner.root.read().clone(),
        })
    }

    pub fn write_snapshot(&self, path: &Path) -> Result<()> {
        let snapshot = self.snapshot()?;
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, &snapshot)?;
        debug!(path = %path.display(), "wrote geometry snapshot");
        Ok(())
    }

    pub fn read_snapshot(path: &Path) -> Result<Snapshot> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    fn check_open(&self) -> Result<()> {
        if self.inner.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(Error::BackendUnavailable("memory backend has been shut down".into()))
        }
    }

    fn committed_len(&self, table: TableKind) -> Result<usize> {
        self.inner
            .tables
            .read()
            .get(&table)
            .map(Vec::len)
            .ok_or_else(|| Error::Storage(format!("table {table} does not exist; initialize the store first")))
    }
}

// ============================================================================
// Snapshot
// ============================================================================

/// Serializable committed state of a `MemoryBackend`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub created_at: DateTime<Utc>,
    pub node_types: NodeTypeRegistry,
    pub tables: BTreeMap<TableKind, Vec<Row>>,
    pub child_positions: Vec<ChildPositionRecord>,
    pub root: Option<RootVolumeRecord>,
}

impl Snapshot {
    fn empty() -> Self {
        Self {
            created_at: Utc::now(),
            node_types: NodeTypeRegistry::default(),
            tables: BTreeMap::new(),
            child_positions: Vec::new(),
            root: None,
        }
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// In-memory transaction holding its staged writes.
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    staged: Staged,
}

#[derive(Default)]
struct Staged {
    tables: HashMap<TableKind, StagedTable>,
    child_positions: Vec<ChildPositionRecord>,
    root: Option<RootVolumeRecord>,
}

struct StagedTable {
    /// Committed length when staging started; ids continue from here.
    base_len: usize,
    rows: Vec<Row>,
}

impl MemoryTx {
    fn check_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::Storage(format!("transaction {} is read-only", self.id)));
        }
        Ok(())
    }
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    async fn initialize(&self) -> Result<()> {
        self.check_open()?;
        {
            let mut reg = self.inner.registry.write();
            if reg.is_empty() {
                *reg = NodeTypeRegistry::standard();
            }
        }
        let mut tables = self.inner.tables.write();
        for kind in TableKind::ALL {
            tables.entry(kind).or_default();
        }
        Ok(())
    }

    async fn node_types(&self) -> Result<NodeTypeRegistry> {
        self.check_open()?;
        Ok(self.inner.registry.read().clone())
    }

    async fn shutdown(&self) -> Result<()> {
        self.check_open()?;
        if let Some(path) = &self.inner.snapshot_path {
            self.write_snapshot(path)?;
        }
        self.inner.open.store(false, Ordering::Release);
        Ok(())
    }

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        self.check_open()?;
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        Ok(MemoryTx { id, mode, staged: Staged::default() })
    }

    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        self.check_open()?;
        let Staged { tables: staged, child_positions, root } = tx.staged;

        let mut tables = self.inner.tables.write();
        for (kind, st) in &staged {
            let len = tables.get(kind).map_or(0, Vec::len);
            if len != st.base_len {
                return Err(Error::Storage(format!(
                    "table {kind} grew from {} to {len} rows during transaction {}",
                    st.base_len, tx.id
                )));
            }
        }
        let mut current_root = self.inner.root.write();
        if root.is_some() && current_root.is_some() {
            return Err(Error::Structure("a root volume is already recorded".into()));
        }

        for (kind, st) in staged {
            tables.entry(kind).or_default().extend(st.rows);
        }
        self.inner.child_positions.write().extend(child_positions);
        if root.is_some() {
            *current_root = root;
        }
        Ok(())
    }

    async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
        debug!(tx = %tx.id, "discarding staged writes");
        Ok(())
    }

    // ========================================================================
    // Node-type tables
    // ========================================================================

    async fn insert_row(&self, tx: &mut MemoryTx, table: TableKind, row: Row) -> Result<RowId> {
        self.check_open()?;
        tx.check_writable()?;
        table.schema().check_row(&row)?;
        let committed = self.committed_len(table)?;
        let st = tx
            .staged
            .tables
            .entry(table)
            .or_insert_with(|| StagedTable { base_len: committed, rows: Vec::new() });
        st.rows.push(row);
        Ok(RowId((st.base_len + st.rows.len()) as u64))
    }

    async fn get_row(&self, tx: &MemoryTx, table: TableKind, id: RowId) -> Result<Option<Row>> {
        self.check_open()?;
        let Some(idx) = (id.get() as usize).checked_sub(1) else {
            return Ok(None);
        };
        if let Some(row) = self.inner.tables.read().get(&table).and_then(|rows| rows.get(idx)) {
            return Ok(Some(row.clone()));
        }
        Ok(tx
            .staged
            .tables
            .get(&table)
            .and_then(|st| idx.checked_sub(st.base_len).and_then(|i| st.rows.get(i)))
            .cloned())
    }

    async fn table_rows(&self, tx: &MemoryTx, table: TableKind) -> Result<Vec<(RowId, Row)>> {
        self.check_open()?;
        let mut rows: Vec<Row> = self.inner.tables.read().get(&table).cloned().unwrap_or_default();
        if let Some(st) = tx.staged.tables.get(&table) {
            rows.extend(st.rows.iter().cloned());
        }
        Ok(rows.into_iter().zip(1u64..).map(|(r, id)| (RowId(id), r)).collect())
    }

    async fn row_count(&self, tx: &MemoryTx, table: TableKind) -> Result<u64> {
        self.check_open()?;
        let committed = self.inner.tables.read().get(&table).map_or(0, Vec::len);
        let staged = tx.staged.tables.get(&table).map_or(0, |st| st.rows.len());
        Ok((committed + staged) as u64)
    }

    // ========================================================================
    // Child positions and root
    // ========================================================================

    async fn insert_child_positions(&self, tx: &mut MemoryTx, records: Vec<ChildPositionRecord>) -> Result<()> {
        self.check_open()?;
        tx.check_writable()?;
        tx.staged.child_positions.extend(records);
        Ok(())
    }

    async fn child_positions(&self, tx: &MemoryTx) -> Result<Vec<ChildPositionRecord>> {
        self.check_open()?;
        let mut out = self.inner.child_positions.read().clone();
        out.extend(tx.staged.child_positions.iter().cloned());
        Ok(out)
    }

    async fn set_root_volume(&self, tx: &mut MemoryTx, root: RootVolumeRecord) -> Result<()> {
        self.check_open()?;
        tx.check_writable()?;
        if tx.staged.root.is_some() || self.inner.root.read().is_some() {
            return Err(Error::Structure("a root volume is already recorded".into()));
        }
        tx.staged.root = Some(root);
        Ok(())
    }

    async fn root_volume(&self, tx: &MemoryTx) -> Result<Option<RootVolumeRecord>> {
        self.check_open()?;
        Ok(tx.staged.root.clone().or_else(|| self.inner.root.read().clone()))
    }
}

// ============================================================================
// Tests
// ============================================================================
