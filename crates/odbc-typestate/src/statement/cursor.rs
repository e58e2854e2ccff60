//! Row fetching and column reads on an open cursor.

use super::{CursorState, HasResult, Statement, StatementState};
use crate::binding::{ColumnDescriptor, Indicator, Nullability, OutputValue, registry};
use crate::diagnostics::DiagnosticRecord;
use crate::error::{Error, Result};
use crate::ffi::{CDataType, SqlDataType};
use crate::handle::{OwnedHandle, unexpected};
use crate::outcome::Outcome;

const GET_DATA: &str = "SQLGetData";
const DESCRIBE_COL: &str = "SQLDescribeCol";
const NAME_CAPACITY: usize = 128;

impl<'c, S: StatementState> Statement<'c, S, HasResult> {
    /// Advances the cursor. `None` once the result set is exhausted, and on
    /// every call after that.
    pub fn fetch(&mut self) -> Result<Option<Row<'_, 'c>>> {
        const FUNCTION: &str = "SQLFetch";

        if self.cursor.exhausted {
            return Ok(None);
        }
        let outcome = self.handle.invoke(FUNCTION, |api, raw| api.fetch(raw))?;
        if outcome == Outcome::NoData {
            tracing::debug!("result set exhausted");
            self.cursor.exhausted = true;
            return Ok(None);
        }
        let warnings = self.handle.attach(FUNCTION, outcome)?;
        Ok(Some(Row {
            handle: &self.handle,
            cursor: &mut self.cursor,
            warnings,
        }))
    }

    /// Lending iterator over the remaining rows.
    pub fn rows(&mut self) -> Rows<'_, 'c, S> {
        Rows { statement: self }
    }

    /// Describes a result column (1-based). Cached per cursor.
    pub fn describe_col(&mut self, column: u16) -> Result<&ColumnDescriptor> {
        self.cursor.describe(&self.handle, column)
    }
}

impl CursorState {
    fn check_column(&self, column: u16) -> Result<usize> {
        if column == 0 || column > self.columns {
            return Err(Error::out_of_range(
                "column",
                usize::from(column),
                usize::from(self.columns),
            ));
        }
        Ok(usize::from(column - 1))
    }

    fn describe(&mut self, handle: &OwnedHandle<'_>, column: u16) -> Result<&ColumnDescriptor> {
        let index = self.check_column(column)?;
        let slot = &mut self.described[index];
        if slot.is_none() {
            *slot = Some(describe(handle, column)?);
        }
        slot.as_ref().ok_or_else(|| {
            Error::protocol_violation(DESCRIBE_COL, format!("column {column} not described"))
        })
    }
}

fn describe(handle: &OwnedHandle<'_>, column: u16) -> Result<ColumnDescriptor> {
    let mut name = vec![0_u8; NAME_CAPACITY];
    loop {
        let mut name_length = 0_i16;
        let mut data_type = 0_i16;
        let mut column_size = 0_usize;
        let mut decimal_digits = 0_i16;
        let mut nullable = 0_i16;
        handle
            .call(DESCRIBE_COL, |api, raw| {
                api.describe_col(
                    raw,
                    column,
                    &mut name,
                    &mut name_length,
                    &mut data_type,
                    &mut column_size,
                    &mut decimal_digits,
                    &mut nullable,
                )
            })?
            .success()?;

        let length = usize::try_from(name_length).unwrap_or(0);
        if length >= name.len() {
            name.resize(length + 1, 0);
            continue;
        }
        name.truncate(length);
        return Ok(ColumnDescriptor {
            name: String::from_utf8_lossy(&name).into_owned(),
            data_type: SqlDataType::from_raw(data_type),
            column_size: Some(column_size).filter(|&size| size > 0),
            decimal_digits: u16::try_from(decimal_digits).ok().filter(|&d| d > 0),
            nullable: Nullability::from_raw(nullable),
        });
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Row
// ═══════════════════════════════════════════════════════════════════════════

/// A value read from a column together with its indicator.
#[derive(Debug, Clone, PartialEq)]
pub struct Field<T> {
    /// `None` exactly when the indicator is [`Indicator::Null`].
    pub value: Option<T>,
    /// [`Indicator::Length`] of the complete value, or [`Indicator::Null`].
    pub indicator: Indicator,
    /// Records the driver attached while delivering the value, such as
    /// fractional truncation (`01S07`).
    pub warnings: Vec<DiagnosticRecord>,
}

/// The current row of a cursor. Borrows the statement until dropped.
#[derive(Debug)]
pub struct Row<'s, 'c> {
    handle: &'s OwnedHandle<'c>,
    cursor: &'s mut CursorState,
    warnings: Vec<DiagnosticRecord>,
}

impl Row<'_, '_> {
    /// Reads a column (1-based). `None` for SQL NULL.
    ///
    /// Each column can be read once per row. Warnings attached to the read
    /// are added to [`warnings`](Row::warnings).
    pub fn get_data<T: OutputValue>(&mut self, column: u16) -> Result<Option<T>> {
        Ok(self.get_field(column)?.value)
    }

    /// Reads a column along with its indicator and the warnings attached
    /// to it. The warnings are also added to [`warnings`](Row::warnings).
    pub fn get_field<T: OutputValue>(&mut self, column: u16) -> Result<Field<T>> {
        let described = self.cursor.describe(self.handle, column)?.data_type;
        registry::check(T::TYPE_NAME, T::C_TYPE, described)?;

        let chunk_size = self.handle.config().get_data_chunk_size();
        let (bytes, warnings) = read_column(self.handle, column, T::C_TYPE, chunk_size)?;
        self.warnings.extend_from_slice(&warnings);
        match bytes {
            None => Ok(Field {
                value: None,
                indicator: Indicator::Null,
                warnings,
            }),
            Some(bytes) => Ok(Field {
                indicator: Indicator::Length(bytes.len()),
                value: Some(T::decode(&bytes)?),
                warnings,
            }),
        }
    }

    /// Describes a result column (1-based).
    pub fn describe_col(&mut self, column: u16) -> Result<&ColumnDescriptor> {
        self.cursor.describe(self.handle, column)
    }

    pub const fn num_result_cols(&self) -> u16 {
        self.cursor.columns
    }

    /// Warnings attached by the fetch that produced this row and by the
    /// column reads made on it so far.
    pub fn warnings(&self) -> &[DiagnosticRecord] {
        &self.warnings
    }
}

/// Reads a complete column value, `None` for NULL, with the warnings of the
/// final call.
///
/// Variable-length data comes in chunks: the driver answers
/// `SuccessWithInfo` (truncation) while more remains and `Success` with the
/// last piece. Truncation chunks are expected, so their diagnostics are not
/// retrieved.
fn read_column(
    handle: &OwnedHandle<'_>,
    column: u16,
    c_type: CDataType,
    chunk_size: usize,
) -> Result<(Option<Vec<u8>>, Vec<DiagnosticRecord>)> {
    let terminator = usize::from(c_type.is_nul_terminated());
    let mut buffer = vec![0_u8; c_type.fixed_size().unwrap_or(chunk_size)];
    let usable = buffer.len() - terminator;
    let mut value = Vec::new();
    let mut warnings = Vec::new();
    let mut chunks = 0_usize;

    loop {
        let mut raw_indicator = 0_isize;
        let outcome = handle.invoke(GET_DATA, |api, raw| {
            api.get_data(raw, column, c_type, &mut buffer, &mut raw_indicator)
        })?;
        match outcome {
            Outcome::Success | Outcome::SuccessWithInfo => {}
            Outcome::NoData if chunks == 0 => {
                return Err(Error::protocol_violation(
                    GET_DATA,
                    format!("column {column} was already read from this row"),
                ));
            }
            Outcome::NoData => break,
            Outcome::Error | Outcome::InvalidHandle => {
                handle.attach(GET_DATA, outcome)?;
                return Err(unexpected(GET_DATA, outcome));
            }
            Outcome::NeedData | Outcome::StillExecuting => {
                return Err(unexpected(GET_DATA, outcome));
            }
        }
        chunks += 1;

        let indicator = Indicator::from_raw(raw_indicator).ok_or_else(|| {
            Error::protocol_violation(GET_DATA, format!("invalid indicator {raw_indicator}"))
        })?;
        let delivered = match indicator {
            Indicator::Null if chunks == 1 => {
                return Ok((None, handle.attach(GET_DATA, outcome)?));
            }
            Indicator::Null => {
                return Err(Error::protocol_violation(
                    GET_DATA,
                    format!("NULL indicator after {} bytes", value.len()),
                ));
            }
            Indicator::NoTotal => usable,
            Indicator::Length(remaining) => remaining.min(usable),
        };
        value.extend_from_slice(&buffer[..delivered]);

        let complete = c_type.fixed_size().is_some()
            || outcome == Outcome::Success
            || !indicator.is_truncated(usable);
        if complete {
            warnings = handle.attach(GET_DATA, outcome)?;
            break;
        }
    }

    if chunks > 1 {
        tracing::trace!(column, chunks, bytes = value.len(), "column read in chunks");
    }
    Ok((Some(value), warnings))
}

// ═══════════════════════════════════════════════════════════════════════════
// Rows
// ═══════════════════════════════════════════════════════════════════════════

/// Forward-only lending iterator over a cursor's rows.
///
/// Each [`Row`] borrows the iterator, so at most one row is alive at a
/// time. Once exhausted, `next_row` keeps returning `None` without calling
/// the driver.
#[derive(Debug)]
pub struct Rows<'s, 'c, S: StatementState> {
    statement: &'s mut Statement<'c, S, HasResult>,
}

impl<'c, S: StatementState> Rows<'_, 'c, S> {
    pub fn next_row(&mut self) -> Result<Option<Row<'_, 'c>>> {
        self.statement.fetch()
    }

    pub const fn is_exhausted(&self) -> bool {
        self.statement.cursor.exhausted
    }
}
