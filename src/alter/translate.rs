//! Re-raises database failures from `alter_columns` as domain errors.
//!
//! | category                    | error                                          |
//! |-----------------------------|------------------------------------------------|
//! | invalid_parameter_value     | [`AlterError::InvalidTypeOption`]              |
//! | invalid_text_representation | `InvalidDefault` when a default was set, else `InvalidType` |
//! | raise_exception             | [`AlterError::InvalidType`]                    |
//! | syntax_error                | `InvalidTypeOption` carrying the server message |
//! | anything else               | [`AlterError::Database`], unchanged            |
//!
//! The syntax error mapping is broad: a mistake inside a procedure body
//! surfaces the same way as a bad option, so callers should not treat the
//! classification as exhaustive.

use log::{debug, warn};

use crate::{
    db::ColumnNameLookup,
    error::{AlterError, DbError, DbErrorCategory},
};

/// What the failed call was asked to do.
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    pub table_oid: u32,
    /// Column to name in the error; `None` for batches, which skips the
    /// lookup entirely.
    pub attnum: Option<i16>,
    pub requested_type: Option<&'a str>,
    /// Whether the request assigned a default value.
    pub supplied_default: bool,
}

impl<'a> FailureContext<'a> {
    pub fn single(
        table_oid: u32,
        attnum: i16,
        requested_type: Option<&'a str>,
        supplied_default: bool,
    ) -> Self {
        FailureContext {
            table_oid,
            attnum: Some(attnum),
            requested_type,
            supplied_default,
        }
    }

    pub fn batch(table_oid: u32, supplied_default: bool) -> Self {
        FailureContext {
            table_oid,
            attnum: None,
            requested_type: None,
            supplied_default,
        }
    }
}

pub fn translate_failure<L>(lookup: &mut L, context: &FailureContext<'_>, error: DbError) -> AlterError
where
    L: ColumnNameLookup + ?Sized,
{
    debug!(
        "alter_columns on table {} failed with {:?} ({}): {}",
        context.table_oid,
        error.category(),
        error.sqlstate().unwrap_or("no sqlstate"),
        error.message()
    );
    match error.category() {
        DbErrorCategory::InvalidParameterValue => AlterError::InvalidTypeOption {
            message: None,
            source: error,
        },
        DbErrorCategory::InvalidTextRepresentation if context.supplied_default => {
            AlterError::InvalidDefault { source: error }
        }
        DbErrorCategory::InvalidTextRepresentation | DbErrorCategory::RaiseException => {
            invalid_type(lookup, context, error)
        }
        DbErrorCategory::SyntaxError => AlterError::InvalidTypeOption {
            message: Some(error.message().to_string()),
            source: error,
        },
        DbErrorCategory::Other => AlterError::Database(error),
    }
}

fn invalid_type<L>(lookup: &mut L, context: &FailureContext<'_>, error: DbError) -> AlterError
where
    L: ColumnNameLookup + ?Sized,
{
    let column = context.attnum.and_then(|attnum| {
        match lookup.column_name(context.table_oid, attnum) {
            Ok(name) => name,
            Err(err) => {
                warn!(
                    "Could not look up the name of column {attnum} in table {}: {err}",
                    context.table_oid
                );
                None
            }
        }
    });
    AlterError::InvalidType {
        column,
        type_name: context.requested_type.map(str::to_string),
        source: error,
    }
}
