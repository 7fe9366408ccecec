//! Reusable SQL text with parameters.

use crate::error::{Error, Result};
use crate::types::{BoundParams, ToParams, ToWireValue};

/// SQL plus its bound parameters.
///
/// Encoding errors from [`bind`](Self::bind) are kept and reported when the
/// query is dispatched, so binding can be chained:
///
/// ```
/// use pg_async::Query;
///
/// let query = Query::new("SELECT * FROM users WHERE id = $1 AND active = $2")
///     .bind(42i32)
///     .bind(true);
/// assert_eq!(query.param_count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct Query {
    sql: String,
    params: BoundParams,
    error: Option<Error>,
}

impl Query {
    /// A query without parameters.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: BoundParams::new(),
            error: None,
        }
    }

    /// A query with every parameter of `params` bound.
    pub fn with_params<P: ToParams + ?Sized>(sql: impl Into<String>, params: &P) -> Self {
        let mut query = Self::new(sql);
        if let Err(e) = params.bind_into(&mut query.params) {
            query.error = Some(e);
        }
        query
    }

    /// Bind the next parameter.
    pub fn bind<T: ToWireValue>(mut self, value: T) -> Self {
        if self.error.is_none() {
            if let Err(e) = self.params.push(&value) {
                self.error = Some(e);
            }
        }
        self
    }

    /// The SQL text.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Number of bound parameters.
    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// The bound parameters.
    pub fn params(&self) -> &BoundParams {
        &self.params
    }

    /// SQL and parameters, or the first binding error.
    ///
    /// Queries without parameters yield `None` and run over the simple protocol.
    pub fn into_parts(self) -> Result<(String, Option<BoundParams>)> {
        if let Some(e) = self.error {
            return Err(e);
        }
        let params = (!self.params.is_empty()).then_some(self.params);
        Ok((self.sql, params))
    }
}

impl From<&str> for Query {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Query {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}
