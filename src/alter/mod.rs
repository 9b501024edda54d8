//! Column alteration entry points.
//!
//! Every entry point normalizes its input before touching the database and
//! makes a single `alter_columns` (or `drop_columns`) procedure call. Known
//! failure categories come back as [`AlterError`] variants; see
//! [`translate`] for the mapping.

pub mod request;
pub mod translate;

use log::{debug, info};
use serde_json::{Value, json};

use crate::{
    db::{Database, ProcArg},
    error::{AlterError, DbError},
};

pub use request::{
    AlterationRequest, BATCH_ALLOWED_KEYS, ColumnAlteration, Patch, RequestShape, TypeChange,
    normalize, validate_batch,
};
pub use translate::{FailureContext, translate_failure};

const ALTER_COLUMNS: &str = "alter_columns";
const DROP_COLUMNS: &str = "drop_columns";

fn call_alter_columns<D>(
    db: &mut D,
    table_oid: u32,
    alterations: &[ColumnAlteration],
) -> Result<(), DbError>
where
    D: Database + ?Sized,
{
    let payload = Value::Array(alterations.iter().map(ColumnAlteration::to_json).collect());
    debug!("{ALTER_COLUMNS}({table_oid}, {payload})");
    db.call_procedure(ALTER_COLUMNS, &[ProcArg::Oid(table_oid), ProcArg::Json(payload)])?;
    Ok(())
}

/// Alters one column. `request` may use any accepted shape; `attnum` is
/// used when the request does not name its column itself.
pub fn alter_column<D>(
    db: &mut D,
    table_oid: u32,
    attnum: i16,
    request: Value,
) -> Result<ColumnAlteration, AlterError>
where
    D: Database + ?Sized,
{
    let alteration = normalize(request, Some(attnum))?;
    info!("Altering column {} of table {table_oid}", alteration.attnum);
    let context = FailureContext::single(
        table_oid,
        alteration.attnum,
        alteration.requested_type(),
        alteration.sets_default(),
    );
    call_alter_columns(db, table_oid, std::slice::from_ref(&alteration))
        .map_err(|err| translate_failure(db, &context, err))?;
    Ok(alteration)
}

pub fn alter_column_type<D>(
    db: &mut D,
    table_oid: u32,
    attnum: i16,
    type_name: &str,
    type_options: Option<Value>,
) -> Result<ColumnAlteration, AlterError>
where
    D: Database + ?Sized,
{
    alter_column(
        db,
        table_oid,
        attnum,
        json!({"type": type_name, "type_options": type_options}),
    )
}

pub fn rename_column<D>(
    db: &mut D,
    table_oid: u32,
    attnum: i16,
    new_name: &str,
) -> Result<ColumnAlteration, AlterError>
where
    D: Database + ?Sized,
{
    alter_column(db, table_oid, attnum, json!({"name": new_name}))
}

/// Alters several columns at once. Items are restricted to
/// [`BATCH_ALLOWED_KEYS`] and each must carry `attnum`; a single bad item
/// rejects the batch before the database is called.
pub fn batch_update_columns<D>(
    db: &mut D,
    table_oid: u32,
    items: &[Value],
) -> Result<Vec<ColumnAlteration>, AlterError>
where
    D: Database + ?Sized,
{
    validate_batch(items)?;
    let alterations = normalize_all(items)?;
    info!(
        "Batch updating {} column(s) of table {table_oid}",
        alterations.len()
    );
    apply_batch(db, table_oid, &alterations)?;
    Ok(alterations)
}

/// Alters columns described in the current request shape and returns how
/// many items were applied.
pub fn alter_columns_in_table<D>(
    db: &mut D,
    table_oid: u32,
    items: &[Value],
) -> Result<usize, AlterError>
where
    D: Database + ?Sized,
{
    let alterations = normalize_all(items)?;
    info!(
        "Altering {} column(s) of table {table_oid}",
        alterations.len()
    );
    apply_batch(db, table_oid, &alterations)?;
    Ok(alterations.len())
}

fn normalize_all(items: &[Value]) -> Result<Vec<ColumnAlteration>, AlterError> {
    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            normalize(item.clone(), None).map_err(|err| match err {
                AlterError::Validation(message) => {
                    AlterError::validation(format!("item {index}: {message}"))
                }
                other => other,
            })
        })
        .collect()
}

fn apply_batch<D>(db: &mut D, table_oid: u32, alterations: &[ColumnAlteration]) -> Result<(), AlterError>
where
    D: Database + ?Sized,
{
    let context = FailureContext::batch(
        table_oid,
        alterations.iter().any(ColumnAlteration::sets_default),
    );
    call_alter_columns(db, table_oid, alterations).map_err(|err| translate_failure(db, &context, err))
}

/// Drops every item whose `attnum` is present and whose `delete` flag is
/// `true`, returning the dropped attribute numbers. Nothing is sent when no
/// item qualifies.
pub fn drop_columns<D>(db: &mut D, table_oid: u32, items: &[Value]) -> Result<Vec<i16>, AlterError>
where
    D: Database + ?Sized,
{
    let mut attnums = Vec::new();
    for item in items {
        let Some(attnum) = item.get("attnum").filter(|value| !value.is_null()) else {
            continue;
        };
        if item.get("delete").and_then(Value::as_bool) != Some(true) {
            continue;
        }
        let attnum = attnum
            .as_i64()
            .and_then(|raw| i16::try_from(raw).ok())
            .filter(|attnum| *attnum > 0)
            .ok_or_else(|| AlterError::validation(format!("attnum {attnum} is not a valid column number")))?;
        attnums.push(attnum);
    }
    if attnums.is_empty() {
        debug!("No columns of table {table_oid} marked for deletion");
        return Ok(attnums);
    }
    info!(
        "Dropping {} column(s) of table {table_oid}",
        attnums.len()
    );
    let mut args = vec![ProcArg::Oid(table_oid)];
    args.extend(attnums.iter().map(|attnum| ProcArg::Int(i32::from(*attnum))));
    db.call_procedure(DROP_COLUMNS, &args)?;
    Ok(attnums)
}
