//! Geometry dump: a line-oriented listing of a persisted geometry.
//!
//! ```text
//! # geomodel-io dump
//! [GeoPhysVol] 2 rows (logvol_id)
//!   1 | 1
//!   2 | 2
//! ...
//! root: GeoPhysVol 1
//! [child positions] 3 records
//!   1:1:1 #1 -> GeoNameTag 1 copy 0
//! ```
//!
//! Intended for inspection and for diffing two stores; nothing reads it back.

use std::io::Write;

use crate::storage::{Cell, NodeTypeRegistry, Row, StorageBackend, TableKind};
use crate::tx::TxMode;
use crate::Result;

/// Write every table, the root record and the child-position index.
pub async fn dump_geometry<B: StorageBackend>(backend: &B, writer: &mut dyn Write) -> Result<()> {
    let registry = backend.node_types().await?;
    let tx = backend.begin_tx(TxMode::ReadOnly).await?;

    writeln!(writer, "# geomodel-io dump")?;
    for kind in TableKind::ALL {
        let rows = backend.table_rows(&tx, kind).await?;
        let columns: Vec<&str> = kind.schema().columns.iter().map(|c| c.name).collect();
        writeln!(writer, "[{kind}] {} rows ({})", rows.len(), columns.join(", "))?;
        for (id, row) in &rows {
            writeln!(writer, "  {id} | {}", format_row(row))?;
        }
    }

    match backend.root_volume(&tx).await? {
        Some(root) => writeln!(writer, "root: {} {}", root.node_type, root.id)?,
        None => writeln!(writer, "root: none")?,
    }

    let mut records = backend.child_positions(&tx).await?;
    records.sort_by_key(|r| (r.parent_key(), r.position));
    writeln!(writer, "[child positions] {} records", records.len())?;
    for rec in &records {
        writeln!(
            writer,
            "  {} #{} -> {} {} copy {}",
            rec.parent_key(),
            rec.position,
            table_label(&registry, rec.child_table_id),
            rec.child_id,
            rec.child_copy_number,
        )?;
    }

    backend.commit_tx(tx).await?;
    Ok(())
}

fn table_label(registry: &NodeTypeRegistry, table_id: u32) -> String {
    registry.name_of(table_id).map_or_else(|| format!("table#{table_id}"), str::to_owned)
}

fn format_row(row: &Row) -> String {
    row.iter().map(format_cell).collect::<Vec<_>>().join(" | ")
}

fn format_cell(cell: &Cell) -> String {
    match cell {
        Cell::Text(s) => format!("'{}'", s.replace('\'', "\\'")),
        Cell::Int(i) => i.to_string(),
        Cell::Float(f) => crate::codec::format_number(*f),
        Cell::Null => "NULL".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cell() {
        assert_eq!(format_cell(&Cell::Text("it's".into())), "'it\\'s'");
        assert_eq!(format_cell(&Cell::Int(42)), "42");
        assert_eq!(format_cell(&Cell::Float(0.5)), "0.5");
        assert_eq!(format_cell(&Cell::Null), "NULL");
    }

    #[test]
    fn test_format_row() {
        let row: Row = vec!["Water".into(), 1.0.into(), "1:0.111;2:0.889".into()];
        assert_eq!(format_row(&row), "'Water' | 1 | '1:0.111;2:0.889'");
    }

    #[test]
    fn test_unregistered_table_label() {
        let registry = NodeTypeRegistry::standard();
        assert_eq!(table_label(&registry, 7), "GeoNameTag");
        assert_eq!(table_label(&registry, 99), "table#99");
    }
}
