//! Forward-only result cursor

use crate::database::traits::DriverError;
use crate::schema::{Meta, Row};
use std::fmt;
use std::iter::Peekable;

/// Column name of [`ResultStream::rows_affected`] results
pub const ROWS_AFFECTED_COLUMN: &str = "Rows Affected";

type RowSource = Box<dyn Iterator<Item = Result<Row, DriverError>> + Send>;

/// Forward-only cursor over the rows of a query result
///
/// Backend rows are decoded one at a time as the cursor advances, so a
/// decoding failure surfaces from [`ResultStream::next_row`] for the row that
/// caused it. A stream cannot be rewound.
pub struct ResultStream {
    header: Vec<String>,
    meta: Meta,
    rows: Peekable<RowSource>,
}

impl ResultStream {
    /// Create a stream from a header and a lazily decoded row source
    pub fn new<I>(header: Vec<String>, meta: Meta, rows: I) -> Self
    where
        I: IntoIterator<Item = Result<Row, DriverError>>,
        I::IntoIter: Send + 'static,
    {
        let rows: RowSource = Box::new(rows.into_iter());
        Self {
            header,
            meta,
            rows: rows.peekable(),
        }
    }

    /// Create a stream over already decoded rows
    pub fn from_rows(header: Vec<String>, meta: Meta, rows: Vec<Row>) -> Self {
        Self::new(header, meta, rows.into_iter().map(Ok))
    }

    /// Create a stream without rows
    pub fn empty(meta: Meta) -> Self {
        Self::from_rows(Vec::new(), meta, Vec::new())
    }

    /// Single-row result reporting how many rows a statement changed
    pub fn rows_affected(meta: Meta, count: u64) -> Self {
        Self::from_rows(
            vec![ROWS_AFFECTED_COLUMN.to_string()],
            meta,
            vec![vec![count.into()]],
        )
    }

    /// Column names, empty when the backend returned no rows
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Whether another row (or row error) is available
    pub fn has_next(&mut self) -> bool {
        self.rows.peek().is_some()
    }

    /// Advance the cursor
    ///
    /// # Errors
    ///
    /// [`DriverError::StreamExhausted`] past the last row, or the error
    /// produced while decoding this row.
    pub fn next_row(&mut self) -> Result<Row, DriverError> {
        self.rows.next().unwrap_or(Err(DriverError::StreamExhausted))
    }

    /// Drain up to `limit` rows
    ///
    /// Returns the rows and whether more rows were left in the stream.
    pub fn collect_rows(&mut self, limit: usize) -> Result<(Vec<Row>, bool), DriverError> {
        let mut rows = Vec::new();
        while self.has_next() {
            if rows.len() == limit {
                return Ok((rows, true));
            }
            rows.push(self.next_row()?);
        }
        Ok((rows, false))
    }
}

impl fmt::Debug for ResultStream {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ResultStream")
            .field("header", &self.header)
            .field("meta", &self.meta)
            .finish_non_exhaustive()
    }
}
