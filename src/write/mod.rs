//! # Graph Writer
//!
//! Walks a live geometry graph once and turns it into table rows, held in
//! memory until [`GraphWriter::save`] flushes everything in one transaction.
//!
//! Every node is stored at most once per session (deduplicated by
//! [`NodeIdentity`]). Each occurrence of a volume gets the next copy number
//! for its row, and every parent→child occurrence becomes one
//! [`ChildPositionRecord`] tagged with the parent's current copy number.
//!
//! The first volume walked is the root. A volume reached only through a
//! serial transformer is walked as an unconnected subtree: its descendants
//! are stored normally but no edge points at the volume itself.
//!
//! Any fatal error moves the writer to [`WriterState::Failed`]; a failed
//! writer never flushes.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{AddressCache, ChildPositionCounter, CopyNumberTracker};
use crate::codec::shape::{self as shape_codec, ShapeSink};
use crate::codec::{self, transform as transform_codec, FieldWriter};
use crate::model::{
    Element, GraphNode, LogicalVolume, Material, NodeIdentity, PhysVol, SerialTransformer, Shape,
    Transform3D,
};
use crate::storage::{
    Cell, ChildPositionRecord, NodeTypeRegistry, ParentKey, RootVolumeRecord, Row, RowId,
    StorageBackend, TableKind,
};
use crate::tx::TxMode;
use crate::xf;
use crate::{Error, Result};

// ============================================================================
// Results
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    NotStarted,
    /// Walking, no root recorded yet.
    RootPending,
    /// Walking, root recorded.
    Traversing,
    /// Walk complete, ready to flush.
    RootFound,
    Done,
    Failed,
}

/// What a successful flush wrote.
#[derive(Debug, Clone, PartialEq)]
pub struct WriteSummary {
    pub rows: BTreeMap<TableKind, usize>,
    pub child_positions: usize,
    pub root: RootVolumeRecord,
    /// Shape kinds that were stored without parameters.
    pub needs_persistence: BTreeSet<String>,
}

/// A parent volume row; its instance is resolved through the copy tracker.
#[derive(Debug, Clone, Copy)]
struct ParentRef {
    table: TableKind,
    id: RowId,
}

// ============================================================================
// GraphWriter
// ============================================================================

pub struct GraphWriter<'b, B: StorageBackend> {
    backend: &'b B,
    registry: NodeTypeRegistry,
    state: WriterState,
    addresses: AddressCache<NodeIdentity, RowId>,
    copies: CopyNumberTracker,
    positions: ChildPositionCounter,
    pending: BTreeMap<TableKind, Vec<Row>>,
    child_positions: Vec<ChildPositionRecord>,
    root: Option<RootVolumeRecord>,
    needs_persistence: BTreeSet<String>,
    /// Volumes on the current walk path, for cycle detection.
    ancestors: Vec<NodeIdentity>,
}

impl<'b, B: StorageBackend> GraphWriter<'b, B> {
    /// Start a session. Fails immediately if the backend is not open.
    pub async fn open(backend: &'b B) -> Result<Self> {
        if !backend.is_open() {
            return Err(Error::BackendUnavailable("cannot start a write session".into()));
        }
        backend.initialize().await?;
        let registry = backend.node_types().await?;
        debug!(node_types = registry.len(), "write session opened");
        Ok(Self {
            backend,
            registry,
            state: WriterState::NotStarted,
            addresses: AddressCache::new(),
            copies: CopyNumberTracker::new(),
            positions: ChildPositionCounter::new(),
            pending: BTreeMap::new(),
            child_positions: Vec::new(),
            root: None,
            needs_persistence: BTreeSet::new(),
            ancestors: Vec::new(),
        })
    }

    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Rows buffered so far for one table.
    pub fn pending_rows(&self, table: TableKind) -> &[Row] {
        self.pending.get(&table).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn pending_child_positions(&self) -> &[ChildPositionRecord] {
        &self.child_positions
    }

    /// Walk the tree under `root`. Allowed once per session.
    pub fn write_tree(&mut self, root: &Arc<PhysVol>) -> Result<()> {
        if self.state != WriterState::NotStarted {
            return Err(Error::Structure(format!(
                "a session writes a single tree; writer is in state {:?}",
                self.state
            )));
        }
        self.state = WriterState::RootPending;
        let walked = self.visit_volume(root, None).and_then(|()| match self.root {
            Some(_) => Ok(()),
            None => Err(Error::Structure("walk finished without a root volume".into())),
        });
        match walked {
            Ok(()) => {
                self.state = WriterState::RootFound;
                info!(
                    rows = self.pending.values().map(Vec::len).sum::<usize>(),
                    child_positions = self.child_positions.len(),
                    "geometry tree walked"
                );
                Ok(())
            }
            Err(e) => {
                self.state = WriterState::Failed;
                Err(e)
            }
        }
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    fn visit_volume(&mut self, vol: &Arc<PhysVol>, parent: Option<ParentRef>) -> Result<()> {
        let identity = vol.identity();
        if self.ancestors.contains(&identity) {
            return Err(Error::Structure(format!("volume {identity} contains itself")));
        }
        let table = TableKind::for_volume(vol.kind());
        let id = match self.addresses.lookup(&identity) {
            Some(id) => id,
            None => {
                let logvol_id = self.store_logvol(vol.logvol())?;
                let id = self.push_row(table, vec![logvol_id.as_cell()]);
                self.addresses.insert(identity, id);
                id
            }
        };
        let copy = self.copies.next_copy_number(table, id);
        debug!(%table, %id, copy, name = %vol.logvol().name, "volume");

        match parent {
            Some(p) => self.push_edge(p, table, id, copy)?,
            None if self.state == WriterState::RootPending => self.record_root(table, id),
            None => debug!(%table, %id, "unconnected subtree entry"),
        }

        let me = ParentRef { table, id };
        self.ancestors.push(identity);
        for child in vol.children() {
            self.visit_child(&child, me)?;
        }
        self.ancestors.pop();
        Ok(())
    }

    fn record_root(&mut self, table: TableKind, id: RowId) {
        debug_assert!(self.root.is_none(), "root recorded twice");
        self.root = Some(RootVolumeRecord { id, node_type: table.type_name().to_owned() });
        self.state = WriterState::Traversing;
    }

    fn visit_child(&mut self, child: &GraphNode, parent: ParentRef) -> Result<()> {
        let (table, id) = match child {
            GraphNode::PhysVol(vol) => return self.visit_volume(vol, Some(parent)),
            GraphNode::SerialTransformer(st) => {
                (TableKind::SerialTransformer, self.store_serial_transformer(st)?)
            }
            GraphNode::NameTag(tag) => (
                TableKind::NameTag,
                self.store_simple(TableKind::NameTag, tag.identity(), || vec![Cell::from(tag.name.as_str())]),
            ),
            GraphNode::SerialDenominator(d) => (
                TableKind::SerialDenominator,
                self.store_simple(TableKind::SerialDenominator, d.identity(), || {
                    vec![Cell::from(d.base_name.as_str())]
                }),
            ),
            GraphNode::Transform(t) => (
                TableKind::Transform,
                self.store_simple(TableKind::Transform, t.identity(), || transform_codec::to_row(&t.matrix)),
            ),
            GraphNode::AlignableTransform(t) => (
                TableKind::AlignableTransform,
                self.store_simple(TableKind::AlignableTransform, t.identity(), || {
                    transform_codec::to_row(&t.transform())
                }),
            ),
        };
        self.push_edge(parent, table, id, 0)
    }

    fn store_serial_transformer(&mut self, st: &Arc<SerialTransformer>) -> Result<RowId> {
        if let Some(id) = self.addresses.lookup(&st.identity()) {
            return Ok(id);
        }
        let function_id = self.store_function(st)?;
        let vol_table = TableKind::for_volume(st.volume.kind());
        let vol_id = match self.addresses.lookup(&st.volume.identity()) {
            Some(id) => id,
            None => {
                self.visit_volume(&st.volume, None)?;
                self.addresses
                    .lookup(&st.volume.identity())
                    .ok_or_else(|| Error::Structure("serial transformer volume was not stored".into()))?
            }
        };
        let row = vec![
            function_id.as_cell(),
            vol_id.as_cell(),
            Cell::from(self.registry.table_id(vol_table)?),
            Cell::from(st.copies),
        ];
        let id = self.push_row(TableKind::SerialTransformer, row);
        self.addresses.insert(st.identity(), id);
        Ok(id)
    }

    fn store_function(&mut self, st: &SerialTransformer) -> Result<RowId> {
        let function = &st.function;
        if let Some(id) = self.addresses.lookup(&function.identity()) {
            return Ok(id);
        }
        let expression = xf::persistify(&function.expression).unwrap_or_else(|e| {
            warn!(error = %e, "placement function could not be persisted");
            String::new()
        });
        if expression.is_empty() {
            return Err(Error::EmptyFunction);
        }
        let id = self.push_row(TableKind::Function, vec![Cell::Text(expression)]);
        self.addresses.insert(function.identity(), id);
        Ok(id)
    }

    // ========================================================================
    // Logical volumes, materials, shapes
    // ========================================================================

    fn store_logvol(&mut self, lv: &Arc<LogicalVolume>) -> Result<RowId> {
        if let Some(id) = self.addresses.lookup(&lv.identity()) {
            return Ok(id);
        }
        let shape_id = self.store_shape(&lv.shape)?;
        let material_id = self.store_material(&lv.material);
        let id = self.push_row(
            TableKind::LogVol,
            vec![Cell::from(lv.name.as_str()), shape_id.as_cell(), material_id.as_cell()],
        );
        self.addresses.insert(lv.identity(), id);
        Ok(id)
    }

    fn store_material(&mut self, m: &Arc<Material>) -> RowId {
        if let Some(id) = self.addresses.lookup(&m.identity()) {
            return id;
        }
        let pairs: Vec<(RowId, f64)> = m
            .components
            .iter()
            .map(|c| (self.store_element(&c.element), c.fraction))
            .collect();
        let elements = element_list(&pairs);
        let id = self.push_row(
            TableKind::Material,
            vec![Cell::from(m.name.as_str()), Cell::Float(m.density), Cell::Text(elements)],
        );
        self.addresses.insert(m.identity(), id);
        id
    }

    fn store_element(&mut self, e: &Arc<Element>) -> RowId {
        let row = || {
            vec![
                Cell::from(e.name.as_str()),
                Cell::from(e.symbol.as_str()),
                Cell::Float(e.z),
                Cell::Float(e.a),
            ]
        };
        self.store_simple(TableKind::Element, e.identity(), row)
    }

    /// Store a shape after its operands. Deduplicated by identity.
    fn store_shape(&mut self, shape: &Arc<Shape>) -> Result<RowId> {
        if let Some(id) = self.addresses.lookup(&shape.identity()) {
            return Ok(id);
        }
        let encoded = shape_codec::encode(shape, &mut *self)?;
        let id = self.push_row(
            TableKind::Shape,
            vec![Cell::Text(encoded.type_tag), Cell::Text(encoded.parameters)],
        );
        self.addresses.insert(shape.identity(), id);
        Ok(id)
    }

    // ========================================================================
    // Pending tables
    // ========================================================================

    fn store_simple(&mut self, table: TableKind, identity: NodeIdentity, row: impl FnOnce() -> Row) -> RowId {
        if let Some(id) = self.addresses.lookup(&identity) {
            return id;
        }
        let id = self.push_row(table, row());
        self.addresses.insert(identity, id);
        id
    }

    fn push_row(&mut self, table: TableKind, row: Row) -> RowId {
        let rows = self.pending.entry(table).or_default();
        rows.push(row);
        RowId(rows.len() as u64)
    }

    fn push_edge(&mut self, parent: ParentRef, child_table: TableKind, child_id: RowId, child_copy: u32) -> Result<()> {
        let Some(parent_copy) = self.copies.latest_copy_number(parent.table, parent.id) else {
            warn!(
                parent_table = %parent.table,
                parent_id = %parent.id,
                "parent has no copy number; child treated as unconnected"
            );
            return Ok(());
        };
        let key = ParentKey {
            id: Some(parent.id),
            table_id: self.registry.table_id(parent.table)?,
            copy_number: parent_copy,
        };
        let position = self.positions.next_position(key);
        self.child_positions.push(ChildPositionRecord {
            parent_id: key.id,
            parent_table_id: key.table_id,
            parent_copy_number: key.copy_number,
            position,
            child_table_id: self.registry.table_id(child_table)?,
            child_id,
            child_copy_number: child_copy,
        });
        Ok(())
    }

    // ========================================================================
    // Flush
    // ========================================================================

    /// Write every buffered row, the child-position index and the root
    /// record in one transaction.
    pub async fn save(&mut self) -> Result<WriteSummary> {
        match self.state {
            WriterState::RootFound => {}
            WriterState::Failed => {
                return Err(Error::Structure("session failed; nothing will be written".into()));
            }
            other => return Err(Error::Structure(format!("cannot save in state {other:?}"))),
        }
        let backend = self.backend;
        let mut tx = backend.begin_tx(TxMode::ReadWrite).await?;
        match self.flush(&mut tx).await {
            Ok(summary) => {
                backend.commit_tx(tx).await.inspect_err(|_| self.state = WriterState::Failed)?;
                self.state = WriterState::Done;
                info!(
                    rows = summary.rows.values().sum::<usize>(),
                    child_positions = summary.child_positions,
                    root = %summary.root.id,
                    "geometry saved"
                );
                if !summary.needs_persistence.is_empty() {
                    warn!(shapes = ?summary.needs_persistence, "shape kinds stored without parameters");
                }
                Ok(summary)
            }
            Err(e) => {
                self.state = WriterState::Failed;
                if let Err(rollback) = backend.rollback_tx(tx).await {
                    warn!(error = %rollback, "rollback after failed flush also failed");
                }
                Err(e)
            }
        }
    }

    async fn flush(&mut self, tx: &mut B::Tx) -> Result<WriteSummary> {
        let backend = self.backend;
        // row ids in the child-position index assume every table starts at 1
        for kind in TableKind::ALL {
            let existing = backend.row_count(tx, kind).await?;
            if existing > 0 {
                return Err(Error::Structure(format!("store already holds {existing} {kind} rows")));
            }
        }
        if backend.root_volume(tx).await?.is_some() {
            return Err(Error::Structure("store already records a root volume".into()));
        }

        let root = self
            .root
            .clone()
            .ok_or_else(|| Error::Structure("no root volume recorded".into()))?;
        let mut rows = BTreeMap::new();
        for (kind, table_rows) in std::mem::take(&mut self.pending) {
            let n = table_rows.len();
            let ids = backend.insert_rows(tx, kind, table_rows).await?;
            let sequential = ids.len() == n && ids.iter().zip(1u64..).all(|(id, want)| id.get() == want);
            if !sequential {
                return Err(Error::Storage(format!(
                    "{kind}: store assigned ids {:?}..{:?} to {n} rows, expected 1..{n}",
                    ids.first(),
                    ids.last()
                )));
            }
            rows.insert(kind, n);
        }
        let child_positions = self.child_positions.len();
        backend
            .insert_child_positions(tx, std::mem::take(&mut self.child_positions))
            .await?;
        backend.set_root_volume(tx, root.clone()).await?;

        Ok(WriteSummary {
            rows,
            child_positions,
            root,
            needs_persistence: self.needs_persistence.clone(),
        })
    }
}

impl<B: StorageBackend> ShapeSink for GraphWriter<'_, B> {
    fn persist_shape(&mut self, shape: &Arc<Shape>) -> Result<RowId> {
        self.store_shape(shape)
    }

    fn persist_shift_transform(&mut self, transform: &Transform3D) -> Result<RowId> {
        Ok(self.push_row(TableKind::Transform, transform_codec::to_row(transform)))
    }

    fn needs_persistence(&mut self, type_name: &str) {
        if self.needs_persistence.insert(type_name.to_owned()) {
            warn!(shape = type_name, "shape kind has no parameter layout; stored as a bare tag");
        }
    }
}

/// `id:fraction` pairs joined by the field separator.
fn element_list(pairs: &[(RowId, f64)]) -> String {
    let mut w = FieldWriter::new();
    for (id, fraction) in pairs {
        w.marker(&format!("{id}{}{}", codec::ELEMENT_SEPARATOR, codec::format_number(*fraction)));
    }
    w.finish()
}
