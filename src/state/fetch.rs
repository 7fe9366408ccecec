//! Row collection shared by the simple and extended query states.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::backend::{CommandComplete, RowDescription};
use crate::result::{FieldDescription, Resultset, columns_of};

use super::{Context, OpId, Output};

/// Accumulates DataRows into batches of at most `batch_rows` rows.
#[derive(Debug)]
pub(crate) struct Fetch {
    op: OpId,
    batch_rows: usize,
    current: Option<Resultset>,
}

impl Fetch {
    pub fn new(op: OpId, batch_rows: usize) -> Self {
        Self {
            op,
            batch_rows: batch_rows.max(1),
            current: None,
        }
    }

    /// Open a result from a RowDescription payload.
    pub fn describe(&mut self, payload: &[u8]) -> Result<()> {
        let desc = RowDescription::parse(payload)?;
        self.open(columns_of(&desc));
        Ok(())
    }

    /// Open a result with known columns.
    pub fn open(&mut self, columns: Arc<[FieldDescription]>) {
        self.current = Some(Resultset::new(columns));
    }

    pub fn data_row(&mut self, payload: &[u8], ctx: &mut Context<'_>) -> Result<()> {
        let current = self
            .current
            .as_mut()
            .ok_or_else(|| Error::Protocol("DataRow without RowDescription".into()))?;
        current.push_row(payload)?;

        if current.len() >= self.batch_rows {
            let fresh = match current.shared_columns() {
                Some(columns) => Resultset::new(columns),
                None => Resultset::default(),
            };
            let result = std::mem::replace(current, fresh);
            ctx.emit(Output::Rows {
                op: self.op,
                result,
                complete: false,
            });
        }
        Ok(())
    }

    /// Emit the rest of the current statement with its command tag.
    pub fn command_complete(&mut self, payload: &[u8], ctx: &mut Context<'_>) -> Result<()> {
        let complete = CommandComplete::parse(payload)?;
        let mut result = self.current.take().unwrap_or_default();
        result.set_tag(complete.tag);
        ctx.emit(Output::Rows {
            op: self.op,
            result,
            complete: true,
        });
        Ok(())
    }

    /// An empty query string produces an empty, untagged result.
    pub fn empty_query(&mut self, ctx: &mut Context<'_>) {
        let result = self.current.take().unwrap_or_default();
        ctx.emit(Output::Rows {
            op: self.op,
            result,
            complete: true,
        });
    }

    /// Drop rows of a statement that failed.
    pub fn reset(&mut self) {
        self.current = None;
    }
}
