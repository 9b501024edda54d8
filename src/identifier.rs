//! Identifier and literal quoting for the SQL text this crate generates.
//!
//! Identifiers cannot be bound as statement parameters, and neither can the
//! option values of a `COPY` command, so both are embedded into the command
//! text. Everything embedded goes through [`quote_ident`] or
//! [`quote_literal`] first.

use crate::error::IdentifierError;

/// PostgreSQL truncates identifiers beyond NAMEDATALEN - 1 bytes.
pub const MAX_IDENTIFIER_BYTES: usize = 63;

pub fn validate_identifier(name: &str) -> Result<(), IdentifierError> {
    if name.is_empty() {
        return Err(IdentifierError::Empty);
    }
    if name.contains('\0') {
        return Err(IdentifierError::NullByte(name.to_string()));
    }
    if name.len() > MAX_IDENTIFIER_BYTES {
        return Err(IdentifierError::TooLong {
            name: name.to_string(),
            len: name.len(),
            max: MAX_IDENTIFIER_BYTES,
        });
    }
    Ok(())
}

/// Double-quotes an identifier, doubling any embedded quotes.
pub fn quote_ident(name: &str) -> Result<String, IdentifierError> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Returns `"schema"."name"`.
pub fn qualify(schema: &str, name: &str) -> Result<String, IdentifierError> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(name)?))
}

/// Quotes a string literal the way PostgreSQL's `quote_literal` does: single
/// quotes are doubled, and a value containing a backslash is emitted in the
/// `E'...'` form with the backslashes doubled.
pub fn quote_literal(value: &str) -> String {
    let escaped = value.replace('\'', "''");
    if escaped.contains('\\') {
        format!("E'{}'", escaped.replace('\\', "\\\\"))
    } else {
        format!("'{escaped}'")
    }
}
