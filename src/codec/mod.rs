//! # Parameter Codecs
//!
//! Shapes are stored as a type tag plus a parameter string of `Name=value`
//! fields joined by `;`. Decoding is strictly positional: every field must
//! carry the expected name at the expected position, and a record with fewer
//! fields than its type's minimum is rejected outright.
//!
//! Neither separator is escaped. A value containing `;` or `=` cannot be
//! framed; the writer logs a warning when it meets one.

pub mod shape;
pub mod transform;

use std::fmt::Display;

use tracing::warn;

use crate::storage::RowId;
use crate::{Error, Result};

/// Separates fields within a parameter string.
pub const FIELD_SEPARATOR: char = ';';
/// Separates a field's name from its value.
pub const KEY_VALUE_SEPARATOR: char = '=';
/// Separates id and fraction in a material's element list.
pub const ELEMENT_SEPARATOR: char = ':';

/// Shortest decimal form that parses back to the same `f64`.
pub fn format_number(v: f64) -> String {
    format!("{v}")
}

fn malformed(context: &str, message: String) -> Error {
    Error::MalformedRecord { table: context.to_owned(), id: None, message }
}

// ============================================================================
// FieldWriter
// ============================================================================

/// Builds a parameter string field by field.
#[derive(Debug, Default)]
pub struct FieldWriter {
    out: String,
}

impl FieldWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn separator(&mut self) {
        if !self.out.is_empty() {
            self.out.push(FIELD_SEPARATOR);
        }
    }

    /// `name=value` for numbers and ids.
    pub fn field(&mut self, name: &str, value: impl Display) -> &mut Self {
        self.separator();
        self.out.push_str(name);
        self.out.push(KEY_VALUE_SEPARATOR);
        self.out.push_str(&value.to_string());
        self
    }

    pub fn number(&mut self, name: &str, value: f64) -> &mut Self {
        self.field(name, format_number(value))
    }

    /// `name=value` for free text. Separator characters are written as-is.
    pub fn text(&mut self, name: &str, value: &str) -> &mut Self {
        if value.contains([FIELD_SEPARATOR, KEY_VALUE_SEPARATOR]) {
            warn!(field = name, value, "value contains a parameter separator and will not decode");
        }
        self.field(name, value)
    }

    /// A bare field with no name, used as a group marker.
    pub fn marker(&mut self, marker: &str) -> &mut Self {
        self.separator();
        self.out.push_str(marker);
        self
    }

    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.out)
    }
}

// ============================================================================
// FieldCursor
// ============================================================================

/// Positional reader over a parameter string.
#[derive(Debug)]
pub struct FieldCursor<'a> {
    context: &'a str,
    fields: Vec<&'a str>,
    pos: usize,
}

impl<'a> FieldCursor<'a> {
    /// Split `params` and check the field count against `min_fields`.
    /// An empty string has zero fields.
    pub fn new(context: &'a str, params: &'a str, min_fields: usize) -> Result<Self> {
        let fields: Vec<&str> = if params.is_empty() {
            Vec::new()
        } else {
            params.split(FIELD_SEPARATOR).collect()
        };
        if fields.len() < min_fields {
            return Err(malformed(
                context,
                format!("expected at least {min_fields} fields, found {}", fields.len()),
            ));
        }
        Ok(Self { context, fields, pos: 0 })
    }

    pub fn remaining(&self) -> usize {
        self.fields.len() - self.pos
    }

    fn error(&self, message: String) -> Error {
        malformed(self.context, format!("field {}: {message}", self.pos))
    }

    fn next_field(&mut self, what: &str) -> Result<&'a str> {
        let field = self
            .fields
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error(format!("expected {what}, found end of record")))?;
        self.pos += 1;
        Ok(field)
    }

    fn expect_value(&mut self, name: &str) -> Result<&'a str> {
        let field = self.next_field(&format!("'{name}'"))?;
        match field.split_once(KEY_VALUE_SEPARATOR) {
            Some((key, value)) if key == name => Ok(value),
            Some((key, _)) => {
                self.pos -= 1;
                Err(self.error(format!("expected '{name}', found '{key}'")))
            }
            None => {
                self.pos -= 1;
                Err(self.error(format!("expected '{name}=', found '{field}'")))
            }
        }
    }

    pub fn expect_f64(&mut self, name: &str) -> Result<f64> {
        let v = self.expect_value(name)?;
        v.parse().map_err(|_| self.error(format!("'{name}' is not a number: '{v}'")))
    }

    pub fn expect_u32(&mut self, name: &str) -> Result<u32> {
        let v = self.expect_value(name)?;
        v.parse().map_err(|_| self.error(format!("'{name}' is not a count: '{v}'")))
    }

    pub fn expect_row_id(&mut self, name: &str) -> Result<RowId> {
        let v = self.expect_value(name)?;
        v.parse::<i64>()
            .ok()
            .and_then(RowId::from_cell_value)
            .ok_or_else(|| self.error(format!("'{name}' is not a row id: '{v}'")))
    }

    pub fn expect_str(&mut self, name: &str) -> Result<&'a str> {
        self.expect_value(name)
    }

    /// A bare marker field (no `=`).
    pub fn expect_marker(&mut self) -> Result<&'a str> {
        let field = self.next_field("a group marker")?;
        if field.contains(KEY_VALUE_SEPARATOR) {
            self.pos -= 1;
            return Err(self.error(format!("expected a group marker, found '{field}'")));
        }
        Ok(field)
    }

    /// Fail if fields are left over.
    pub fn finish(self) -> Result<()> {
        if self.remaining() > 0 {
            return Err(self.error(format!("{} unexpected trailing fields", self.remaining())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_and_cursor_agree() {
        let params = FieldWriter::new()
            .number("XHalfLength", 10.0)
            .field("N", 2)
            .marker("TRI")
            .number("Z", -0.25)
            .finish();
        assert_eq!(params, "XHalfLength=10;N=2;TRI;Z=-0.25");

        let mut c = FieldCursor::new("Test", &params, 4).unwrap();
        assert_eq!(c.expect_f64("XHalfLength").unwrap(), 10.0);
        assert_eq!(c.expect_u32("N").unwrap(), 2);
        assert_eq!(c.expect_marker().unwrap(), "TRI");
        assert_eq!(c.expect_f64("Z").unwrap(), -0.25);
        c.finish().unwrap();
    }

    #[test]
    fn test_too_few_fields() {
        let err = FieldCursor::new("Box", "XHalfLength=1;YHalfLength=2", 3).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { ref table, .. } if table == "Box"));
        assert_eq!(err.to_string(), "Malformed Box record: expected at least 3 fields, found 2");
    }

    #[test]
    fn test_wrong_name_at_position() {
        let mut c = FieldCursor::new("Box", "XHalfLength=1;ZHalfLength=2;YHalfLength=3", 3).unwrap();
        c.expect_f64("XHalfLength").unwrap();
        let err = c.expect_f64("YHalfLength").unwrap_err();
        assert_eq!(err.to_string(), "Malformed Box record: field 1: expected 'YHalfLength', found 'ZHalfLength'");
    }

    #[test]
    fn test_row_ids_must_be_positive() {
        let mut c = FieldCursor::new("Union", "opA=0;opB=x", 2).unwrap();
        assert!(c.expect_row_id("opA").is_err());
    }

    #[test]
    fn test_trailing_fields_rejected() {
        let mut c = FieldCursor::new("Tube", "RMin=0;RMax=1;ZHalfLength=2;Extra=3", 3).unwrap();
        c.expect_f64("RMin").unwrap();
        c.expect_f64("RMax").unwrap();
        c.expect_f64("ZHalfLength").unwrap();
        assert!(c.finish().is_err());
    }

    #[test]
    fn test_empty_params_have_no_fields() {
        let c = FieldCursor::new("Opaque", "", 0).unwrap();
        assert_eq!(c.remaining(), 0);
        c.finish().unwrap();
    }
}
