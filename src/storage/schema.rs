//! Typed table layouts and the node-type registry.

use std::collections::BTreeMap;
use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use super::{Cell, Row};
use crate::model::VolumeKind;
use crate::{Error, Result};

// ============================================================================
// TableKind
// ============================================================================

/// One persisted node-type table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TableKind {
    PhysVol,
    FullPhysVol,
    LogVol,
    Shape,
    Material,
    Element,
    NameTag,
    SerialDenominator,
    Transform,
    AlignableTransform,
    SerialTransformer,
    Function,
}

impl TableKind {
    /// Registry order: the position + 1 is the standard table id.
    pub const ALL: [TableKind; 12] = [
        TableKind::PhysVol,
        TableKind::FullPhysVol,
        TableKind::LogVol,
        TableKind::Shape,
        TableKind::Material,
        TableKind::Element,
        TableKind::NameTag,
        TableKind::SerialDenominator,
        TableKind::Transform,
        TableKind::AlignableTransform,
        TableKind::SerialTransformer,
        TableKind::Function,
    ];

    /// Persisted node-type name.
    pub fn type_name(self) -> &'static str {
        match self {
            TableKind::PhysVol => "GeoPhysVol",
            TableKind::FullPhysVol => "GeoFullPhysVol",
            TableKind::LogVol => "GeoLogVol",
            TableKind::Shape => "GeoShape",
            TableKind::Material => "GeoMaterial",
            TableKind::Element => "GeoElement",
            TableKind::NameTag => "GeoNameTag",
            TableKind::SerialDenominator => "GeoSerialDenominator",
            TableKind::Transform => "GeoTransform",
            TableKind::AlignableTransform => "GeoAlignableTransform",
            TableKind::SerialTransformer => "GeoSerialTransformer",
            TableKind::Function => "Function",
        }
    }

    pub fn from_type_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.type_name() == name)
    }

    pub fn is_volume(self) -> bool {
        matches!(self, TableKind::PhysVol | TableKind::FullPhysVol)
    }

    pub fn for_volume(kind: VolumeKind) -> Self {
        match kind {
            VolumeKind::Plain => TableKind::PhysVol,
            VolumeKind::Full => TableKind::FullPhysVol,
        }
    }

    pub fn volume_kind(self) -> Option<VolumeKind> {
        match self {
            TableKind::PhysVol => Some(VolumeKind::Plain),
            TableKind::FullPhysVol => Some(VolumeKind::Full),
            _ => None,
        }
    }

    pub fn schema(self) -> TableSchema {
        use ColumnType::{Float, Int, Text};
        const XF: [Column; 12] = [
            Column { name: "xx", ty: Float }, Column { name: "xy", ty: Float }, Column { name: "xz", ty: Float },
            Column { name: "yx", ty: Float }, Column { name: "yy", ty: Float }, Column { name: "yz", ty: Float },
            Column { name: "zx", ty: Float }, Column { name: "zy", ty: Float }, Column { name: "zz", ty: Float },
            Column { name: "dx", ty: Float }, Column { name: "dy", ty: Float }, Column { name: "dz", ty: Float },
        ];
        let columns: &'static [Column] = match self {
            TableKind::PhysVol | TableKind::FullPhysVol => &[Column { name: "logvol_id", ty: Int }],
            TableKind::LogVol => &[
                Column { name: "name", ty: Text },
                Column { name: "shape_id", ty: Int },
                Column { name: "material_id", ty: Int },
            ],
            TableKind::Shape => &[Column { name: "type", ty: Text }, Column { name: "parameters", ty: Text }],
            TableKind::Material => &[
                Column { name: "name", ty: Text },
                Column { name: "density", ty: Float },
                Column { name: "elements", ty: Text },
            ],
            TableKind::Element => &[
                Column { name: "name", ty: Text },
                Column { name: "symbol", ty: Text },
                Column { name: "z", ty: Float },
                Column { name: "a", ty: Float },
            ],
            TableKind::NameTag => &[Column { name: "name", ty: Text }],
            TableKind::SerialDenominator => &[Column { name: "base_name", ty: Text }],
            TableKind::Transform | TableKind::AlignableTransform => &XF,
            TableKind::SerialTransformer => &[
                Column { name: "function_id", ty: Int },
                Column { name: "volume_id", ty: Int },
                Column { name: "volume_table_id", ty: Int },
                Column { name: "copies", ty: Int },
            ],
            TableKind::Function => &[Column { name: "expression", ty: Text }],
        };
        TableSchema { kind: self, columns }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

// ============================================================================
// Columns and schemas
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int,
    Float,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

impl Column {
    fn accepts(&self, cell: &Cell) -> bool {
        matches!(
            (self.ty, cell),
            (ColumnType::Int, Cell::Int(_))
                | (ColumnType::Float, Cell::Float(_) | Cell::Int(_))
                | (ColumnType::Text, Cell::Text(_))
        )
    }
}

/// Column layout of one table.
#[derive(Debug, Clone, Copy)]
pub struct TableSchema {
    pub kind: TableKind,
    pub columns: &'static [Column],
}

impl TableSchema {
    /// Reject rows of the wrong arity or with a cell of the wrong type.
    pub fn check_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(Error::Storage(format!(
                "{}: expected {} columns, got {}",
                self.kind,
                self.columns.len(),
                row.len()
            )));
        }
        for (col, cell) in self.columns.iter().zip(row) {
            if !col.accepts(cell) {
                return Err(Error::Storage(format!(
                    "{}.{}: {:?} column cannot hold {}",
                    self.kind,
                    col.name,
                    col.ty,
                    cell.type_name()
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// NodeTypeRegistry
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTypeEntry {
    pub id: u32,
    pub name: String,
}

/// Mapping between persisted node-type names and the small integer table ids
/// used by child-position rows. Fixed when a store is initialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<NodeTypeEntry>", into = "Vec<NodeTypeEntry>")]
pub struct NodeTypeRegistry {
    by_id: BTreeMap<u32, String>,
    by_name: HashMap<String, u32>,
}

impl NodeTypeRegistry {
    /// The 12 standard types with ids 1..=12.
    pub fn standard() -> Self {
        TableKind::ALL
            .iter()
            .zip(1u32..)
            .map(|(k, id)| NodeTypeEntry { id, name: k.type_name().to_owned() })
            .collect::<Vec<_>>()
            .into()
    }

    pub fn insert(&mut self, id: u32, name: impl Into<String>) {
        let name = name.into();
        self.by_name.insert(name.clone(), id);
        self.by_id.insert(id, name);
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn name_of(&self, table_id: u32) -> Option<&str> {
        self.by_id.get(&table_id).map(String::as_str)
    }

    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Table id of a kind, failing if the store was initialized without it.
    pub fn table_id(&self, kind: TableKind) -> Result<u32> {
        self.id_of(kind.type_name())
            .ok_or_else(|| Error::UnknownNodeType(kind.type_name().to_owned()))
    }

    /// Kind behind a table id; `None` when the id or the name is unknown.
    pub fn kind_of(&self, table_id: u32) -> Option<TableKind> {
        self.name_of(table_id).and_then(TableKind::from_type_name)
    }
}

impl From<Vec<NodeTypeEntry>> for NodeTypeRegistry {
    fn from(entries: Vec<NodeTypeEntry>) -> Self {
        let mut reg = NodeTypeRegistry::default();
        for e in entries {
            reg.insert(e.id, e.name);
        }
        reg
    }
}

impl From<NodeTypeRegistry> for Vec<NodeTypeEntry> {
    fn from(reg: NodeTypeRegistry) -> Self {
        reg.by_id.into_iter().map(|(id, name)| NodeTypeEntry { id, name }).collect()
    }
}
