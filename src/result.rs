//! Owned query results.
//!
//! A [`Resultset`] owns the raw DataRow bytes of one batch; each [`RowData`]
//! records where its column values sit inside that buffer. Values are decoded
//! lazily through [`Row::get`].

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::backend::{self, RowDescription};
use crate::protocol::codec::read_i32;
use crate::protocol::types::{FormatCode, Oid};
use crate::types::FromWireValue;

/// Column metadata of a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescription {
    /// Column name
    pub name: String,
    /// Table OID (0 if not a table column)
    pub table_oid: Oid,
    /// Column attribute number (0 if not a table column)
    pub column_id: i16,
    /// Data type OID
    pub type_oid: Oid,
    /// Type size (-1 for variable, -2 for null-terminated)
    pub type_size: i16,
    /// Type modifier
    pub type_modifier: i32,
    /// Format the values arrive in
    pub format: FormatCode,
}

impl From<&backend::FieldDescription<'_>> for FieldDescription {
    fn from(field: &backend::FieldDescription<'_>) -> Self {
        Self {
            name: field.name.to_owned(),
            table_oid: field.table_oid(),
            column_id: field.column_id(),
            type_oid: field.type_oid(),
            type_size: field.type_size(),
            type_modifier: field.type_modifier(),
            format: field.format(),
        }
    }
}

/// Convert a RowDescription into shareable column metadata.
pub fn columns_of(desc: &RowDescription<'_>) -> Arc<[FieldDescription]> {
    desc.fields().iter().map(FieldDescription::from).collect()
}

/// Location of each column value of one row.
///
/// Ranges are `(offset, len)` into the owning buffer; NULL columns are marked
/// in the bitmap and carry an empty range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowData {
    ranges: Vec<(usize, usize)>,
    nulls: Vec<u64>,
}

impl RowData {
    fn with_columns(count: usize) -> Self {
        Self {
            ranges: Vec::with_capacity(count),
            nulls: vec![0; count.div_ceil(64)],
        }
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// True for a row without columns.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// True if column `idx` is NULL.
    pub fn is_null(&self, idx: usize) -> bool {
        self.nulls
            .get(idx / 64)
            .is_some_and(|word| word & (1 << (idx % 64)) != 0)
    }

    /// Byte range of column `idx`, `None` for NULL.
    pub fn range(&self, idx: usize) -> Option<(usize, usize)> {
        if self.is_null(idx) {
            return None;
        }
        self.ranges.get(idx).copied()
    }

    fn set_null(&mut self, idx: usize) {
        if let Some(word) = self.nulls.get_mut(idx / 64) {
            *word |= 1 << (idx % 64);
        }
    }

    /// Shift every range by `offset`, after the payload moved into a larger buffer.
    fn rebase(&mut self, offset: usize) {
        for (start, _) in &mut self.ranges {
            *start += offset;
        }
    }
}

/// Decode the value ranges of a DataRow payload.
///
/// The column count must equal `columns.len()` and every value length must fit
/// in the payload. Ranges are relative to `payload`.
pub fn decode_row(columns: &[FieldDescription], payload: &[u8]) -> Result<RowData> {
    let (count, mut data) = backend::query::parse_count(payload, "DataRow")?;
    if count != columns.len() {
        return Err(Error::Protocol(format!(
            "DataRow has {} columns, RowDescription has {}",
            count,
            columns.len()
        )));
    }

    let mut row = RowData::with_columns(count);
    for idx in 0..count {
        let (len, rest) = read_i32(data)?;
        let offset = payload.len() - rest.len();
        if len < 0 {
            row.set_null(idx);
            row.ranges.push((offset, 0));
            data = rest;
            continue;
        }
        let len = len as usize;
        if rest.len() < len {
            return Err(Error::Protocol(format!(
                "DataRow column {}: value of {} bytes, {} remaining",
                idx,
                len,
                rest.len()
            )));
        }
        row.ranges.push((offset, len));
        data = &rest[len..];
    }
    Ok(row)
}

/// A batch of rows from one statement.
///
/// Batches of the same statement share their column metadata and can be
/// merged with [`Resultset::append`]. The command tag is set on the last batch.
#[derive(Debug, Clone, Default)]
pub struct Resultset {
    columns: Option<Arc<[FieldDescription]>>,
    data: Vec<u8>,
    rows: Vec<RowData>,
    tag: Option<String>,
}

impl Resultset {
    /// Create an empty result with the given columns.
    pub fn new(columns: Arc<[FieldDescription]>) -> Self {
        Self {
            columns: Some(columns),
            ..Default::default()
        }
    }

    /// Column metadata; empty for commands that return no rows.
    pub fn columns(&self) -> &[FieldDescription] {
        self.columns.as_deref().unwrap_or_default()
    }

    pub(crate) fn shared_columns(&self) -> Option<Arc<[FieldDescription]>> {
        self.columns.clone()
    }

    /// Index of the column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns().iter().position(|c| c.name == name)
    }

    /// Decode and store one DataRow payload.
    pub fn push_row(&mut self, payload: &[u8]) -> Result<()> {
        let mut row = decode_row(self.columns(), payload)?;
        row.rebase(self.data.len());
        self.data.extend_from_slice(payload);
        self.rows.push(row);
        Ok(())
    }

    /// Move every row of `other` to the end of this result.
    ///
    /// The tag of `other` wins when it has one.
    pub fn append(&mut self, other: Resultset) {
        if self.columns.is_none() {
            self.columns = other.columns;
        }
        let offset = self.data.len();
        self.data.extend_from_slice(&other.data);
        self.rows.extend(other.rows.into_iter().map(|mut row| {
            row.rebase(offset);
            row
        }));
        if other.tag.is_some() {
            self.tag = other.tag;
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True when there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Command tag, e.g. `SELECT 3` or `INSERT 0 1`, once the statement completed.
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub(crate) fn set_tag(&mut self, tag: &str) {
        self.tag = Some(tag.to_owned());
    }

    /// Rows affected according to the command tag.
    pub fn rows_affected(&self) -> Option<u64> {
        self.tag.as_deref().and_then(backend::rows_affected)
    }

    /// Row at `idx`.
    pub fn get(&self, idx: usize) -> Option<Row<'_>> {
        self.rows.get(idx).map(|data| Row {
            columns: self.columns(),
            data: &self.data,
            row: data,
        })
    }

    /// Iterate over the rows.
    pub fn iter(&self) -> impl Iterator<Item = Row<'_>> + '_ {
        let columns = self.columns();
        self.rows.iter().map(move |data| Row {
            columns,
            data: &self.data,
            row: data,
        })
    }

    /// Decode every row into `T`.
    pub fn decode<'a, T: FromRow<'a>>(&'a self) -> Result<Vec<T>> {
        self.iter().map(|row| T::from_row(&row)).collect()
    }
}

/// A borrowed row of a [`Resultset`].
#[derive(Debug, Clone, Copy)]
pub struct Row<'a> {
    columns: &'a [FieldDescription],
    data: &'a [u8],
    row: &'a RowData,
}

impl<'a> Row<'a> {
    /// Column metadata.
    pub fn columns(&self) -> &'a [FieldDescription] {
        self.columns
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.row.len()
    }

    /// True for a row without columns.
    pub fn is_empty(&self) -> bool {
        self.row.is_empty()
    }

    /// True if column `idx` is NULL.
    pub fn is_null(&self, idx: usize) -> bool {
        self.row.is_null(idx)
    }

    /// Raw bytes of column `idx` in the column's wire format; `None` for NULL.
    pub fn raw(&self, idx: usize) -> Result<Option<&'a [u8]>> {
        if idx >= self.row.len() {
            return Err(Error::InvalidUsage(format!(
                "column index {} out of range for {} columns",
                idx,
                self.row.len()
            )));
        }
        Ok(self
            .row
            .range(idx)
            .and_then(|(start, len)| self.data.get(start..start + len)))
    }

    /// Decode column `idx`.
    pub fn get<T: FromWireValue<'a>>(&self, idx: usize) -> Result<T> {
        let value = self.raw(idx)?;
        let field = self
            .columns
            .get(idx)
            .ok_or_else(|| Error::Protocol(format!("no description for column {}", idx)))?;
        match value {
            None => T::from_null(),
            Some(bytes) => match field.format {
                FormatCode::Text => T::from_text(field.type_oid, bytes),
                FormatCode::Binary => T::from_binary(field.type_oid, bytes),
            },
        }
    }

    /// Decode the column called `name`.
    pub fn get_by_name<T: FromWireValue<'a>>(&self, name: &str) -> Result<T> {
        let idx = self
            .columns
            .iter()
            .position(|c| c.name == name)
            .ok_or_else(|| Error::InvalidUsage(format!("no column named {:?}", name)))?;
        self.get(idx)
    }

    /// Decode the whole row.
    pub fn to<T: FromRow<'a>>(&self) -> Result<T> {
        T::from_row(self)
    }
}

/// Trait for decoding a whole row into a Rust type.
pub trait FromRow<'a>: Sized {
    /// Decode from a row.
    fn from_row(row: &Row<'a>) -> Result<Self>;
}

macro_rules! impl_from_row_tuple {
    ($count:literal: $($idx:tt => $T:ident),+) => {
        impl<'a, $($T: FromWireValue<'a>),+> FromRow<'a> for ($($T,)+) {
            fn from_row(row: &Row<'a>) -> Result<Self> {
                if row.len() < $count {
                    return Err(Error::Decode(format!(
                        "row has {} columns, tuple needs {}",
                        row.len(),
                        $count
                    )));
                }
                Ok(($(row.get::<$T>($idx)?,)+))
            }
        }
    };
}

impl_from_row_tuple!(1: 0 => T1);
impl_from_row_tuple!(2: 0 => T1, 1 => T2);
impl_from_row_tuple!(3: 0 => T1, 1 => T2, 2 => T3);
impl_from_row_tuple!(4: 0 => T1, 1 => T2, 2 => T3, 3 => T4);
impl_from_row_tuple!(5: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5);
impl_from_row_tuple!(6: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6);
impl_from_row_tuple!(7: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7);
impl_from_row_tuple!(8: 0 => T1, 1 => T2, 2 => T3, 3 => T4, 4 => T5, 5 => T6, 6 => T7, 7 => T8);
