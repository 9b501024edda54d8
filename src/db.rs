//! Collaborator interfaces the core needs from the database.
//!
//! The core never opens connections. Callers hand it one object that can
//! invoke the server-side procedures, open a bulk-load channel and create
//! tables; [`crate::pg::PgSession`] provides all of them over a PostgreSQL
//! client or transaction, and tests provide in-memory fakes.

use std::io::Write;

use serde::Serialize;
use serde_json::Value;

use crate::error::DbError;

/// A positional argument to a server-side procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcArg {
    Oid(u32),
    Int(i32),
    Text(String),
    Json(Value),
}

impl ProcArg {
    /// SQL type the argument is cast to in the generated call.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ProcArg::Oid(_) => "oid",
            ProcArg::Int(_) => "integer",
            ProcArg::Text(_) => "text",
            ProcArg::Json(_) => "jsonb",
        }
    }
}

/// Write side of an open bulk-load channel.
///
/// Dropping a sink without calling [`CopySink::finish`] abandons the load.
pub trait CopySink: Write {
    /// Completes the transfer and returns the number of rows loaded.
    fn finish(self: Box<Self>) -> Result<u64, DbError>;
}

pub trait Database {
    /// Invokes a named procedure and returns the first column of its first
    /// row rendered as text.
    fn call_procedure(&mut self, function: &str, args: &[ProcArg])
    -> Result<Option<String>, DbError>;

    /// Opens a bulk-load channel for a prepared `COPY ... FROM STDIN` command.
    fn copy_in(&mut self, command: &str) -> Result<Box<dyn CopySink + '_>, DbError>;
}

/// Description of a table to create for an import.
#[derive(Debug, Clone, Copy)]
pub struct NewTable<'a> {
    pub schema: &'a str,
    pub name: &'a str,
    pub columns: &'a [String],
    pub comment: Option<&'a str>,
}

/// Stable identifier of a table created for an import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreatedTable {
    pub oid: u32,
    pub schema: String,
    pub name: String,
}

impl CreatedTable {
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

pub trait TableCreator {
    fn create_table(&mut self, table: &NewTable<'_>) -> Result<CreatedTable, DbError>;
}

/// Secondary read used to enrich alteration errors.
pub trait ColumnNameLookup {
    fn column_name(&mut self, table_oid: u32, attnum: i16) -> Result<Option<String>, DbError>;
}

impl<D: Database + ?Sized> ColumnNameLookup for D {
    fn column_name(&mut self, table_oid: u32, attnum: i16) -> Result<Option<String>, DbError> {
        self.call_procedure(
            "get_column_name",
            &[ProcArg::Oid(table_oid), ProcArg::Int(i32::from(attnum))],
        )
    }
}
