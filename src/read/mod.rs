//! # Graph Reader
//!
//! Loads every table, the child-position index and the root record in one
//! pass, then rebuilds the live graph.
//!
//! Volumes are memoized by `(row id, table, copy number)`: each stored copy
//! of a shared volume becomes its own `PhysVol`. Logical volumes, shapes and
//! materials are rebuilt for every volume instance unless
//! [`ReaderConfig::share_logical_volumes`] is set, in which case they are
//! memoized by row id.
//!
//! Shapes with an unknown type tag are replaced by a placeholder cube and
//! reported in [`BuiltGeometry::unknown_shapes`]. Every other inconsistency
//! ends the build with an error and no graph.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use hashbrown::HashMap;
use tracing::{debug, info, warn};

use crate::cache::AddressCache;
use crate::codec::shape::{self as shape_codec, DecodedShape, ShapeSource};
use crate::codec::{self, transform as transform_codec};
use crate::model::{
    AlignableTransform, Element, Function, GraphNode, LogicalVolume, Material, NameTag, PhysVol,
    SerialDenominator, SerialTransformer, Shape, Transform, Transform3D,
};
use crate::storage::{
    Cell, ChildPositionRecord, NodeTypeRegistry, ParentKey, RootVolumeRecord, Row, RowId,
    StorageBackend, TableKind,
};
use crate::tx::TxMode;
use crate::xf;
use crate::{Error, Result};

// ============================================================================
// Configuration and results
// ============================================================================

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Memoize logical volumes, shapes, materials and elements by row id
    /// instead of rebuilding them for each volume instance.
    pub share_logical_volumes: bool,
    /// Half-length of the cube substituted for undecodable shapes.
    pub placeholder_half_length: f64,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self { share_logical_volumes: false, placeholder_half_length: 300.0 }
    }
}

/// The rebuilt geometry.
#[derive(Debug)]
pub struct BuiltGeometry {
    pub root: Arc<PhysVol>,
    /// Shape type tags that had no decoder.
    pub unknown_shapes: BTreeSet<String>,
    /// Number of distinct volume instances built.
    pub volume_instances: usize,
}

// ============================================================================
// GraphReader
// ============================================================================

pub struct GraphReader<'b, B: StorageBackend> {
    backend: &'b B,
    registry: NodeTypeRegistry,
    config: ReaderConfig,
    rows: HashMap<(TableKind, RowId), Row>,
    groups: BTreeMap<ParentKey, Vec<ChildPositionRecord>>,
    root: Option<RootVolumeRecord>,
    loaded: bool,
}

impl<'b, B: StorageBackend> GraphReader<'b, B> {
    pub async fn open(backend: &'b B) -> Result<Self> {
        Self::open_with(backend, ReaderConfig::default()).await
    }

    /// Start a session. Fails immediately if the backend is not open.
    pub async fn open_with(backend: &'b B, config: ReaderConfig) -> Result<Self> {
        if !backend.is_open() {
            return Err(Error::BackendUnavailable("cannot start a read session".into()));
        }
        let registry = backend.node_types().await?;
        if registry.is_empty() {
            return Err(Error::Structure("store has no node-type registry; nothing was written".into()));
        }
        Ok(Self {
            backend,
            registry,
            config,
            rows: HashMap::new(),
            groups: BTreeMap::new(),
            root: None,
            loaded: false,
        })
    }

    /// Fetch every table, the child-position index and the root record.
    pub async fn load(&mut self) -> Result<()> {
        let backend = self.backend;
        let tx = backend.begin_tx(TxMode::ReadOnly).await?;

        for kind in TableKind::ALL {
            for (id, row) in backend.table_rows(&tx, kind).await? {
                self.rows.insert((kind, id), row);
            }
        }

        let records = backend.child_positions(&tx).await?;
        let record_count = records.len();
        self.groups.clear();
        for rec in records {
            self.groups.entry(rec.parent_key()).or_default().push(rec);
        }
        for children in self.groups.values_mut() {
            children.sort_by_key(|r| r.position);
        }

        self.root = backend.root_volume(&tx).await?;
        backend.commit_tx(tx).await?;
        self.loaded = true;

        info!(
            rows = self.rows.len(),
            child_positions = record_count,
            parents = self.groups.len(),
            "geometry loaded"
        );
        Ok(())
    }

    /// Rebuild the graph from what `load` fetched.
    pub fn build(self) -> Result<BuiltGeometry> {
        if !self.loaded {
            return Err(Error::Structure("build called before load".into()));
        }
        let root_record = self.root.clone().ok_or_else(|| Error::NotFound("root volume record".into()))?;

        let mut builder = Builder {
            registry: &self.registry,
            rows: &self.rows,
            config: &self.config,
            volumes: AddressCache::new(),
            logvols: AddressCache::new(),
            shapes: AddressCache::new(),
            materials: AddressCache::new(),
            elements: AddressCache::new(),
            shape_stack: Vec::new(),
            unknown_shapes: BTreeSet::new(),
        };

        for (key, children) in &self.groups {
            builder.attach_group(key, children)?;
        }

        let root_kind = TableKind::from_type_name(&root_record.node_type)
            .filter(|k| k.is_volume())
            .ok_or_else(|| Error::UnknownNodeType(root_record.node_type.clone()))?;
        let root = builder.volume_instance(root_record.id, root_kind, 1)?;

        if !builder.unknown_shapes.is_empty() {
            warn!(shapes = ?builder.unknown_shapes, "unknown shape types replaced by placeholder cubes");
        }
        info!(volume_instances = builder.volumes.len(), "geometry built");
        Ok(BuiltGeometry {
            root,
            volume_instances: builder.volumes.len(),
            unknown_shapes: builder.unknown_shapes,
        })
    }
}

// ============================================================================
// Builder
// ============================================================================

type VolumeKey = (RowId, TableKind, u32);

struct Builder<'r> {
    registry: &'r NodeTypeRegistry,
    rows: &'r HashMap<(TableKind, RowId), Row>,
    config: &'r ReaderConfig,
    volumes: AddressCache<VolumeKey, Arc<PhysVol>>,
    logvols: AddressCache<RowId, Arc<LogicalVolume>>,
    shapes: AddressCache<RowId, Arc<Shape>>,
    materials: AddressCache<RowId, Arc<Material>>,
    elements: AddressCache<RowId, Arc<Element>>,
    /// Shape rows being decoded, outermost first.
    shape_stack: Vec<RowId>,
    unknown_shapes: BTreeSet<String>,
}

impl<'r> Builder<'r> {
    fn attach_group(&mut self, key: &ParentKey, children: &[ChildPositionRecord]) -> Result<()> {
        let parent = match key.id {
            Some(id) => {
                let kind = self.volume_kind(key.table_id)?;
                Some(self.volume_instance(id, kind, key.copy_number)?)
            }
            None => None,
        };
        debug!(parent = %key, children = children.len(), "attaching children");
        for rec in children {
            let child = self.build_child(rec)?;
            if let Some(parent) = &parent {
                parent.add(child);
            }
        }
        Ok(())
    }

    fn volume_kind(&self, table_id: u32) -> Result<TableKind> {
        match self.registry.kind_of(table_id) {
            Some(kind) if kind.is_volume() => Ok(kind),
            Some(kind) => Err(Error::Structure(format!("{kind} rows cannot hold children"))),
            None => Err(Error::UnknownNodeType(format!("table id {table_id}"))),
        }
    }

    fn build_child(&mut self, rec: &ChildPositionRecord) -> Result<GraphNode> {
        let kind = self
            .registry
            .kind_of(rec.child_table_id)
            .ok_or_else(|| Error::UnknownNodeType(format!("table id {}", rec.child_table_id)))?;
        let id = rec.child_id;
        let node = match kind {
            TableKind::PhysVol | TableKind::FullPhysVol => {
                GraphNode::PhysVol(self.volume_instance(id, kind, rec.child_copy_number)?)
            }
            TableKind::NameTag => GraphNode::NameTag(NameTag::new(self.fields(kind, id)?.text(0)?)),
            TableKind::SerialDenominator => {
                GraphNode::SerialDenominator(SerialDenominator::new(self.fields(kind, id)?.text(0)?))
            }
            TableKind::Transform => GraphNode::Transform(Transform::new(self.matrix(kind, id)?)),
            TableKind::AlignableTransform => {
                GraphNode::AlignableTransform(AlignableTransform::new(self.matrix(kind, id)?))
            }
            TableKind::SerialTransformer => GraphNode::SerialTransformer(self.serial_transformer(id)?),
            other => return Err(Error::Structure(format!("{other} rows cannot be children"))),
        };
        Ok(node)
    }

    /// The `copy`-th instance of a stored volume, built on first request.
    fn volume_instance(&mut self, id: RowId, kind: TableKind, copy: u32) -> Result<Arc<PhysVol>> {
        let key = (id, kind, copy);
        if let Some(vol) = self.volumes.lookup(&key) {
            return Ok(vol);
        }
        let volume_kind = kind
            .volume_kind()
            .ok_or_else(|| Error::Structure(format!("{kind} is not a volume table")))?;
        let logvol_id = self.fields(kind, id)?.row_id(0)?;
        let logvol = self.logical_volume(logvol_id)?;
        let vol = PhysVol::with_kind(volume_kind, logvol);
        debug!(%kind, %id, copy, "volume instance");
        self.volumes.insert(key, vol.clone());
        Ok(vol)
    }

    fn logical_volume(&mut self, id: RowId) -> Result<Arc<LogicalVolume>> {
        if self.config.share_logical_volumes {
            if let Some(lv) = self.logvols.lookup(&id) {
                return Ok(lv);
            }
        }
        let f = self.fields(TableKind::LogVol, id)?;
        let name = f.text(0)?.to_owned();
        let (shape_id, material_id) = (f.row_id(1)?, f.row_id(2)?);
        let shape = self.shape(shape_id)?;
        let material = self.material(material_id)?;
        let lv = LogicalVolume::new(name, shape, material);
        if self.config.share_logical_volumes {
            self.logvols.insert(id, lv.clone());
        }
        Ok(lv)
    }

    fn material(&mut self, id: RowId) -> Result<Arc<Material>> {
        if self.config.share_logical_volumes {
            if let Some(m) = self.materials.lookup(&id) {
                return Ok(m);
            }
        }
        let f = self.fields(TableKind::Material, id)?;
        let mut material = Material::new(f.text(0)?, f.float(1)?);
        for (element_id, fraction) in f.element_list(2)? {
            material = material.with_element(self.element(element_id)?, fraction);
        }
        let material = material.into_shared();
        if self.config.share_logical_volumes {
            self.materials.insert(id, material.clone());
        }
        Ok(material)
    }

    fn element(&mut self, id: RowId) -> Result<Arc<Element>> {
        if self.config.share_logical_volumes {
            if let Some(e) = self.elements.lookup(&id) {
                return Ok(e);
            }
        }
        let f = self.fields(TableKind::Element, id)?;
        let element = Element::new(f.text(0)?, f.text(1)?, f.float(2)?, f.float(3)?);
        if self.config.share_logical_volumes {
            self.elements.insert(id, element.clone());
        }
        Ok(element)
    }

    fn matrix(&self, kind: TableKind, id: RowId) -> Result<Transform3D> {
        let row = self.fields(kind, id)?.row;
        transform_codec::from_row(row).map_err(|e| e.in_row(kind, id))
    }

    fn serial_transformer(&mut self, id: RowId) -> Result<Arc<SerialTransformer>> {
        let f = self.fields(TableKind::SerialTransformer, id)?;
        let function_id = f.row_id(0)?;
        let volume_id = f.row_id(1)?;
        let volume_table_id = f.count(2)?;
        let copies = f.count(3)?;

        let expression = self.fields(TableKind::Function, function_id)?.text(0)?;
        let function = Function::new(xf::interpret(expression).map_err(|e| e.in_row(TableKind::Function, function_id))?);
        let kind = self.volume_kind(volume_table_id)?;
        let volume = self.volume_instance(volume_id, kind, 1)?;
        Ok(SerialTransformer::new(function, volume, copies))
    }

    fn fields(&self, kind: TableKind, id: RowId) -> Result<RowFields<'r>> {
        let rows: &'r HashMap<(TableKind, RowId), Row> = self.rows;
        let row = rows.get(&(kind, id)).ok_or_else(|| Error::MalformedRecord {
            table: kind.type_name().to_owned(),
            id: Some(id),
            message: "referenced row does not exist".into(),
        })?;
        Ok(RowFields { kind, id, row })
    }
}

impl ShapeSource for Builder<'_> {
    fn shape(&mut self, id: RowId) -> Result<Arc<Shape>> {
        if self.config.share_logical_volumes {
            if let Some(s) = self.shapes.lookup(&id) {
                return Ok(s);
            }
        }
        if self.shape_stack.contains(&id) {
            return Err(Error::MalformedRecord {
                table: TableKind::Shape.type_name().to_owned(),
                id: Some(id),
                message: "shape refers to itself through its operands".into(),
            });
        }
        let f = self.fields(TableKind::Shape, id)?;
        let (tag, params) = (f.text(0)?, f.text(1)?);

        self.shape_stack.push(id);
        let decoded = shape_codec::decode(tag, params, &mut *self);
        self.shape_stack.pop();

        let kind = match decoded.map_err(|e| e.in_row(TableKind::Shape, id))? {
            DecodedShape::Known(kind) => kind,
            DecodedShape::Unknown(tag) => {
                warn!(%id, shape = %tag, "unknown shape type; substituting placeholder");
                self.unknown_shapes.insert(tag);
                shape_codec::placeholder(self.config.placeholder_half_length)
            }
        };
        let shape = Shape::new(kind);
        if self.config.share_logical_volumes {
            self.shapes.insert(id, shape.clone());
        }
        Ok(shape)
    }

    fn transform(&mut self, id: RowId) -> Result<Transform3D> {
        self.matrix(TableKind::Transform, id)
    }
}

// ============================================================================
// Row access
// ============================================================================

/// Typed column access for one stored row; errors name the row.
struct RowFields<'r> {
    kind: TableKind,
    id: RowId,
    row: &'r Row,
}

impl<'r> RowFields<'r> {
    fn error(&self, column: usize, message: impl Into<String>) -> Error {
        let name = self.kind.schema().columns.get(column).map_or("?", |c| c.name);
        Error::MalformedRecord {
            table: self.kind.type_name().to_owned(),
            id: Some(self.id),
            message: format!("column {name}: {}", message.into()),
        }
    }

    fn cell(&self, column: usize) -> Result<&'r Cell> {
        self.row.get(column).ok_or_else(|| self.error(column, "missing"))
    }

    fn text(&self, column: usize) -> Result<&'r str> {
        let cell = self.cell(column)?;
        cell.as_str().ok_or_else(|| self.error(column, format!("expected text, found {}", cell.type_name())))
    }

    fn float(&self, column: usize) -> Result<f64> {
        let cell = self.cell(column)?;
        cell.as_float().ok_or_else(|| self.error(column, format!("expected a number, found {}", cell.type_name())))
    }

    fn int(&self, column: usize) -> Result<i64> {
        let cell = self.cell(column)?;
        cell.as_int().ok_or_else(|| self.error(column, format!("expected an integer, found {}", cell.type_name())))
    }

    fn row_id(&self, column: usize) -> Result<RowId> {
        let v = self.int(column)?;
        RowId::from_cell_value(v).ok_or_else(|| self.error(column, format!("{v} is not a row id")))
    }

    fn count(&self, column: usize) -> Result<u32> {
        let v = self.int(column)?;
        u32::try_from(v).map_err(|_| self.error(column, format!("{v} is out of range")))
    }

    /// `id:fraction` pairs; an empty string is an empty list.
    fn element_list(&self, column: usize) -> Result<Vec<(RowId, f64)>> {
        let text = self.text(column)?;
        if text.is_empty() {
            return Ok(Vec::new());
        }
        text.split(codec::FIELD_SEPARATOR)
            .map(|pair| {
                pair.split_once(codec::ELEMENT_SEPARATOR)
                    .and_then(|(id, fraction)| {
                        let id = id.parse::<i64>().ok().and_then(RowId::from_cell_value)?;
                        Some((id, fraction.parse::<f64>().ok()?))
                    })
                    .ok_or_else(|| self.error(column, format!("bad element entry '{pair}'")))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row_fields(row: &Row) -> RowFields<'_> {
        RowFields { kind: TableKind::Material, id: RowId(4), row }
    }

    #[test]
    fn test_element_list_parsing() {
        let row: Row = vec!["Water".into(), 1.0.into(), "1:0.111;2:0.889".into()];
        assert_eq!(row_fields(&row).element_list(2).unwrap(), vec![(RowId(1), 0.111), (RowId(2), 0.889)]);

        let empty: Row = vec!["Vacuum".into(), 0.0.into(), "".into()];
        assert!(row_fields(&empty).element_list(2).unwrap().is_empty());

        let bad: Row = vec!["Bad".into(), 0.0.into(), "1-0.5".into()];
        let err = row_fields(&bad).element_list(2).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { id: Some(RowId(4)), .. }));
    }

    #[test]
    fn test_row_field_types() {
        let row: Row = vec!["x".into(), Cell::Int(0), Cell::Int(-1)];
        let f = row_fields(&row);
        assert!(f.float(0).is_err());
        assert!(f.row_id(1).is_err());
        assert!(f.count(2).is_err());
        assert!(f.text(5).is_err());
    }
}
