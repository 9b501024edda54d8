//! Error types shared by the alteration and import paths.
//!
//! Database failures arrive as [`DbError`], classified into the handful of
//! SQLSTATE categories the alteration procedures are known to raise. The
//! alteration path re-raises those as [`AlterError`] variants with stable
//! [`ErrorKind`] codes; the import path reports [`ImportError`].

use std::{io, path::PathBuf};

use thiserror::Error;

/// SQLSTATE classes the alteration procedures raise for user mistakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbErrorCategory {
    /// `22023` invalid_parameter_value
    InvalidParameterValue,
    /// `22P02` invalid_text_representation
    InvalidTextRepresentation,
    /// `P0001` raise_exception
    RaiseException,
    /// `42601` syntax_error
    SyntaxError,
    Other,
}

impl DbErrorCategory {
    pub fn from_sqlstate(code: &str) -> Self {
        match code {
            "22023" => DbErrorCategory::InvalidParameterValue,
            "22P02" => DbErrorCategory::InvalidTextRepresentation,
            "P0001" => DbErrorCategory::RaiseException,
            "42601" => DbErrorCategory::SyntaxError,
            _ => DbErrorCategory::Other,
        }
    }
}

/// A failure reported by the database collaborator.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct DbError {
    category: DbErrorCategory,
    sqlstate: Option<String>,
    message: String,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl DbError {
    pub fn new(category: DbErrorCategory, message: impl Into<String>) -> Self {
        DbError {
            category,
            sqlstate: None,
            message: message.into(),
            source: None,
        }
    }

    /// Builds an error from a raw SQLSTATE code, classifying it on the way.
    pub fn with_sqlstate(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        DbError {
            category: DbErrorCategory::from_sqlstate(&code),
            sqlstate: Some(code),
            message: message.into(),
            source: None,
        }
    }

    pub fn category(&self) -> DbErrorCategory {
        self.category
    }

    pub fn sqlstate(&self) -> Option<&str> {
        self.sqlstate.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<postgres::Error> for DbError {
    fn from(err: postgres::Error) -> Self {
        let sqlstate = err.code().map(|state| state.code().to_string());
        let message = err
            .as_db_error()
            .map(|db| db.message().to_string())
            .unwrap_or_else(|| err.to_string());
        DbError {
            category: sqlstate
                .as_deref()
                .map(DbErrorCategory::from_sqlstate)
                .unwrap_or(DbErrorCategory::Other),
            sqlstate,
            message,
            source: Some(Box::new(err)),
        }
    }
}

impl From<IdentifierError> for DbError {
    fn from(err: IdentifierError) -> Self {
        DbError {
            category: DbErrorCategory::Other,
            sqlstate: None,
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Stable classification of alteration failures for the outer API layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    InvalidType,
    InvalidTypeOption,
    InvalidDefault,
    Generic,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::InvalidType => "invalid_type",
            ErrorKind::InvalidTypeOption => "invalid_type_option",
            ErrorKind::InvalidDefault => "invalid_default",
            ErrorKind::Generic => "database_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum AlterError {
    /// Malformed or disallowed request, detected before any database call.
    #[error("Invalid alteration request: {0}")]
    Validation(String),

    /// The requested type cannot hold the column's existing data.
    #[error("{}", invalid_type_message(.column.as_deref(), .type_name.as_deref()))]
    InvalidType {
        column: Option<String>,
        type_name: Option<String>,
        #[source]
        source: DbError,
    },

    /// The type options were rejected. Statement syntax errors raised by the
    /// procedures land here too, so this is a best-effort classification.
    #[error("Invalid type options{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    InvalidTypeOption {
        message: Option<String>,
        #[source]
        source: DbError,
    },

    #[error("Default value is not valid for the column type")]
    InvalidDefault {
        #[source]
        source: DbError,
    },

    /// Any database failure outside the known categories, unchanged.
    #[error(transparent)]
    Database(#[from] DbError),
}

fn invalid_type_message(column: Option<&str>, type_name: Option<&str>) -> String {
    match (column, type_name) {
        (Some(column), Some(type_name)) => {
            format!("Column \"{column}\" cannot be converted to type {type_name}")
        }
        (Some(column), None) => format!("Column \"{column}\" cannot be converted to the requested type"),
        (None, Some(type_name)) => format!("Column cannot be converted to type {type_name}"),
        (None, None) => "Column cannot be converted to the requested type".to_string(),
    }
}

impl AlterError {
    pub fn validation(message: impl Into<String>) -> Self {
        AlterError::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            AlterError::Validation(_) => ErrorKind::Validation,
            AlterError::InvalidType { .. } => ErrorKind::InvalidType,
            AlterError::InvalidTypeOption { .. } => ErrorKind::InvalidTypeOption,
            AlterError::InvalidDefault { .. } => ErrorKind::InvalidDefault,
            AlterError::Database(_) => ErrorKind::Generic,
        }
    }

    /// Current display name of the offending column, when it could be resolved.
    pub fn column_name(&self) -> Option<&str> {
        match self {
            AlterError::InvalidType { column, .. } => column.as_deref(),
            _ => None,
        }
    }

    pub fn type_name(&self) -> Option<&str> {
        match self {
            AlterError::InvalidType { type_name, .. } => type_name.as_deref(),
            _ => None,
        }
    }

    /// The low-level database message behind a translated error.
    pub fn db_message(&self) -> Option<&str> {
        self.db_error().map(DbError::message)
    }

    pub fn db_error(&self) -> Option<&DbError> {
        match self {
            AlterError::Validation(_) => None,
            AlterError::InvalidType { source, .. }
            | AlterError::InvalidTypeOption { source, .. }
            | AlterError::InvalidDefault { source } => Some(source),
            AlterError::Database(err) => Some(err),
        }
    }
}

#[derive(Debug, Error)]
pub enum IdentifierError {
    #[error("Identifier cannot be empty")]
    Empty,

    #[error("Identifier contains a null byte: {0:?}")]
    NullByte(String),

    #[error("Identifier exceeds {max} bytes (got {len}): {name:?}")]
    TooLong { name: String, len: usize, max: usize },
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("Invalid dialect: {0}")]
    Dialect(String),

    #[error("{context} {path:?}: {source}")]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Parsing delimited text: {0}")]
    Csv(#[from] csv::Error),

    #[error("No columns found in {0:?}")]
    NoColumns(PathBuf),

    #[error(transparent)]
    Identifier(#[from] IdentifierError),

    #[error("Preparing table {table}: {source}")]
    CreateTable {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("Starting bulk load into {table}: {source}")]
    CopyStart {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("Streaming rows into {table}: {source}")]
    Stream {
        table: String,
        #[source]
        source: io::Error,
    },

    /// The table exists but the load did not complete; removing it is up to
    /// the caller unless the import ran inside a transaction.
    #[error("Bulk load into {table} (oid {oid}) failed and the table was left in place: {source}")]
    Finalize {
        table: String,
        oid: u32,
        #[source]
        source: DbError,
    },
}

impl ImportError {
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        ImportError::Io {
            context,
            path: path.into(),
            source,
        }
    }
}
