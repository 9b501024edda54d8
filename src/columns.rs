//! Column name processing for imported files.
//!
//! Header cells become table column names, so every name must be a legal,
//! distinct identifier: trimmed, free of NUL and line breaks, no longer
//! than [`MAX_IDENTIFIER_BYTES`], never empty, and not colliding with a name
//! the table creator reserves for itself.

use std::collections::HashSet;

use crate::identifier::MAX_IDENTIFIER_BYTES;

/// Prefix of synthesized names for headerless files and empty header cells.
pub const COLUMN_NAME_TEMPLATE: &str = "Column ";

/// Names the table creator adds on its own.
pub const RESERVED_COLUMN_NAMES: &[&str] = &["id"];

/// Positional names for a file without a header row.
pub fn placeholder_names(count: usize) -> Vec<String> {
    (0..count).map(placeholder_name).collect()
}

fn placeholder_name(position: usize) -> String {
    format!("{COLUMN_NAME_TEMPLATE}{position}")
}

/// Cuts `name` to at most `max_bytes`, backing off to a char boundary.
pub fn truncate_identifier(name: &str, max_bytes: usize) -> &str {
    if name.len() <= max_bytes {
        return name;
    }
    let mut end = max_bytes;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

fn clean(raw: &str) -> String {
    let replaced = raw
        .chars()
        .filter(|ch| *ch != '\0')
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect::<String>();
    let trimmed = replaced.trim();
    truncate_identifier(trimmed, MAX_IDENTIFIER_BYTES)
        .trim_end()
        .to_string()
}

/// Turns raw header cells into distinct column names, in order.
///
/// Empty cells become `Column <position>`. A name that is already taken,
/// or reserved, gets `_<position>` appended (and a further counter if even
/// that is taken), truncating the base so the result still fits. The
/// outcome depends only on the input, so repeated runs agree.
pub fn process_column_names<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let cleaned = raw
        .into_iter()
        .enumerate()
        .map(|(position, name)| {
            let name = clean(name.as_ref());
            if name.is_empty() {
                placeholder_name(position)
            } else {
                name
            }
        })
        .collect::<Vec<_>>();

    let mut taken = RESERVED_COLUMN_NAMES
        .iter()
        .map(|name| name.to_string())
        .collect::<HashSet<_>>();
    let mut names = Vec::with_capacity(cleaned.len());
    for (position, name) in cleaned.into_iter().enumerate() {
        let unique = if taken.contains(&name) {
            disambiguate(&name, position, &taken)
        } else {
            name
        };
        taken.insert(unique.clone());
        names.push(unique);
    }
    names
}

fn disambiguate(name: &str, position: usize, taken: &HashSet<String>) -> String {
    let mut attempt = 0usize;
    loop {
        let suffix = if attempt == 0 {
            format!("_{position}")
        } else {
            format!("_{position}_{attempt}")
        };
        let base = truncate_identifier(name, MAX_IDENTIFIER_BYTES - suffix.len());
        let candidate = format!("{base}{suffix}");
        if !taken.contains(&candidate) {
            return candidate;
        }
        attempt += 1;
    }
}
