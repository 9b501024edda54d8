//! Delimited-text dialects, delimiter sniffing and header recovery.
//!
//! A [`Dialect`] is the delimiter/quote/escape triple of a file. The same
//! triple configures the `csv` reader used to sniff headers and is passed
//! through unchanged to the bulk load command, so both sides parse the file
//! identically.
//!
//! Files are always read through a decoding reader for inspection, so
//! sniffing works the same for UTF-16 input as it does for UTF-8.

use std::{
    fs::File,
    io::{BufReader, Read},
    path::Path,
};

use encoding_rs::Encoding;
use encoding_rs_io::DecodeReaderBytesBuilder;
use log::debug;
use serde::{Serialize, Serializer};

use crate::{columns, error::ImportError, printable_delimiter};

pub const DEFAULT_DELIMITER: u8 = b',';
pub const DEFAULT_QUOTE: u8 = b'"';
const HEADER_DETECTION_SAMPLE_ROWS: usize = 6;
const SNIFF_SAMPLE_BYTES: u64 = 64 * 1024;
const SNIFF_SAMPLE_LINES: usize = 20;
const SNIFF_CANDIDATES: &[u8] = b",\t;|";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dialect {
    #[serde(serialize_with = "serialize_char")]
    pub delimiter: u8,
    #[serde(serialize_with = "serialize_char")]
    pub quote: u8,
    #[serde(serialize_with = "serialize_optional_char")]
    pub escape: Option<u8>,
}

fn serialize_char<S: Serializer>(value: &u8, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_char(*value as char)
}

fn serialize_optional_char<S: Serializer>(
    value: &Option<u8>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(ch) => serializer.serialize_some(&(*ch as char)),
        None => serializer.serialize_none(),
    }
}

impl Default for Dialect {
    fn default() -> Self {
        Dialect {
            delimiter: DEFAULT_DELIMITER,
            quote: DEFAULT_QUOTE,
            escape: None,
        }
    }
}

impl Dialect {
    pub fn new(delimiter: u8, quote: u8, escape: Option<u8>) -> Result<Self, ImportError> {
        let dialect = Dialect {
            delimiter,
            quote,
            escape,
        };
        dialect.validate()?;
        Ok(dialect)
    }

    pub fn validate(&self) -> Result<(), ImportError> {
        for (role, value) in [
            ("delimiter", Some(self.delimiter)),
            ("quote", Some(self.quote)),
            ("escape", self.escape),
        ] {
            let Some(value) = value else {
                continue;
            };
            if !value.is_ascii() || matches!(value, b'\r' | b'\n' | b'\0') {
                return Err(ImportError::Dialect(format!(
                    "{role} must be a printable ASCII character or tab (got {value:#04x})"
                )));
            }
        }
        if self.delimiter == self.quote {
            return Err(ImportError::Dialect(format!(
                "delimiter and quote cannot both be '{}'",
                printable_delimiter(self.delimiter)
            )));
        }
        Ok(())
    }

    /// Escape character that differs from the quote; `None` means quotes
    /// are escaped by doubling them.
    pub fn effective_escape(&self) -> Option<u8> {
        self.escape.filter(|escape| *escape != self.quote)
    }

    pub fn reader_builder(&self, has_headers: bool) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(has_headers)
            .delimiter(self.delimiter)
            .quote(self.quote)
            .flexible(true);
        match self.effective_escape() {
            Some(escape) => builder.escape(Some(escape)).double_quote(false),
            None => builder.double_quote(true),
        };
        builder
    }

    pub fn open_reader<R: Read>(&self, reader: R, has_headers: bool) -> csv::Reader<R> {
        self.reader_builder(has_headers).from_reader(reader)
    }
}

/// Wraps `reader` so it yields UTF-8 decoded from `encoding`, with malformed
/// sequences replaced by U+FFFD and any byte-order mark removed.
pub fn decoding_reader<R: Read>(reader: R, encoding: &'static Encoding) -> impl Read {
    DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .strip_bom(true)
        .build(reader)
}

pub fn open_decoded(path: &Path, encoding: &'static Encoding) -> Result<impl Read, ImportError> {
    let file = File::open(path).map_err(|err| ImportError::io("Opening", path, err))?;
    Ok(decoding_reader(BufReader::new(file), encoding))
}

/// Picks the candidate delimiter whose field count is most consistent
/// across the sample lines, preferring more fields on ties. Delimiters
/// between `quote` characters are not counted.
pub fn sniff_delimiter(sample: &str, quote: u8) -> Option<u8> {
    let lines = sample
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(SNIFF_SAMPLE_LINES)
        .collect::<Vec<_>>();
    if lines.is_empty() {
        return None;
    }
    let mut best: Option<(u8, usize, usize)> = None;
    for &candidate in SNIFF_CANDIDATES {
        let counts = lines
            .iter()
            .map(|line| count_unquoted(line, candidate, quote))
            .collect::<Vec<_>>();
        let first = counts[0];
        if first == 0 {
            continue;
        }
        let consistent = counts.iter().filter(|count| **count == first).count();
        let better = match best {
            None => true,
            Some((_, best_consistent, best_fields)) => {
                consistent > best_consistent
                    || (consistent == best_consistent && first > best_fields)
            }
        };
        if better {
            best = Some((candidate, consistent, first));
        }
    }
    best.map(|(candidate, _, _)| candidate)
}

fn count_unquoted(line: &str, delimiter: u8, quote: u8) -> usize {
    let mut in_quotes = false;
    let mut count = 0usize;
    for byte in line.bytes() {
        if byte == quote {
            in_quotes = !in_quotes;
        } else if byte == delimiter && !in_quotes {
            count += 1;
        }
    }
    count
}

/// Sniffs the delimiter of a file, falling back to the extension default.
pub fn sniff_file_delimiter(
    path: &Path,
    encoding: &'static Encoding,
    quote: u8,
) -> Result<u8, ImportError> {
    let mut sample = String::new();
    open_decoded(path, encoding)?
        .take(SNIFF_SAMPLE_BYTES)
        .read_to_string(&mut sample)
        .map_err(|err| ImportError::io("Reading", path, err))?;
    let delimiter = sniff_delimiter(&sample, quote).unwrap_or_else(|| default_delimiter_for(path));
    debug!(
        "Sniffed delimiter '{}' for {path:?}",
        printable_delimiter(delimiter)
    );
    Ok(delimiter)
}

pub fn default_delimiter_for(path: &Path) -> u8 {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => b'\t',
        _ => DEFAULT_DELIMITER,
    }
}

/// Header names (raw, before sanitization) and whether the first row is a
/// header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvLayout {
    pub headers: Vec<String>,
    pub has_headers: bool,
}

impl CsvLayout {
    pub fn field_count(&self) -> usize {
        self.headers.len()
    }
}

/// Reads the header row of `path`, or synthesizes positional names when the
/// file has none. With no `header_override`, header presence is inferred
/// from the first few rows.
pub fn detect_csv_layout(
    path: &Path,
    dialect: &Dialect,
    encoding: &'static Encoding,
    header_override: Option<bool>,
) -> Result<CsvLayout, ImportError> {
    let mut reader = dialect.open_reader(open_decoded(path, encoding)?, false);
    let mut record = csv::StringRecord::new();
    let mut rows = Vec::new();
    let wanted = if header_override.is_some() {
        1
    } else {
        HEADER_DETECTION_SAMPLE_ROWS
    };
    while rows.len() < wanted && reader.read_record(&mut record)? {
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }
    let Some(first_row) = rows.first() else {
        return Ok(CsvLayout {
            headers: Vec::new(),
            has_headers: header_override.unwrap_or(true),
        });
    };
    let has_headers = header_override.unwrap_or_else(|| infer_has_header(first_row, &rows[1..]));
    let headers = if has_headers {
        first_row.clone()
    } else {
        columns::placeholder_names(first_row.len())
    };
    debug!(
        "Layout for {path:?}: {} column(s), header row {}",
        headers.len(),
        if has_headers { "present" } else { "absent" }
    );
    Ok(CsvLayout {
        headers,
        has_headers,
    })
}

fn value_is_data_like(value: &str) -> bool {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return false;
    }
    let lowered = trimmed.to_ascii_lowercase();
    if matches!(
        lowered.as_str(),
        "true" | "false" | "t" | "f" | "yes" | "no" | "y" | "n" | "1" | "0"
    ) {
        return true;
    }
    let numeric = trimmed
        .trim_start_matches(['$', '\u{20AC}', '\u{a3}', '-', '+'])
        .replace(',', "");
    if numeric.parse::<f64>().is_ok() {
        return true;
    }
    looks_temporal(trimmed)
}

fn looks_temporal(value: &str) -> bool {
    value.len() >= 6
        && value.chars().any(|c| c.is_ascii_digit())
        && value.chars().all(|c| {
            c.is_ascii_digit() || matches!(c, '-' | '/' | ':' | '.' | ' ' | 'T' | 'Z' | '+')
        })
}

fn value_is_header_like(value: &str) -> bool {
    let trimmed = value.trim();
    !trimmed.is_empty()
        && !value_is_data_like(trimmed)
        && trimmed.chars().any(|c| c.is_alphabetic())
}

fn infer_has_header(first_row: &[String], other_rows: &[Vec<String>]) -> bool {
    let header_like_first = first_row
        .iter()
        .filter(|value| value_is_header_like(value))
        .count();
    let data_like_first = first_row
        .iter()
        .filter(|value| value_is_data_like(value))
        .count();

    if header_like_first == 0 {
        return false;
    }
    if data_like_first > header_like_first {
        return false;
    }
    if other_rows.is_empty() {
        return data_like_first == 0;
    }

    let mut header_signal = 0usize;
    let mut data_signal = 0usize;
    for (column, first_value) in first_row.iter().enumerate() {
        let other_has_data = other_rows
            .iter()
            .filter_map(|row| row.get(column))
            .any(|value| value_is_data_like(value));
        let others_match = other_rows
            .iter()
            .filter_map(|row| row.get(column))
            .any(|value| value.trim() == first_value.trim());
        if value_is_header_like(first_value) && (other_has_data || !others_match) {
            header_signal += 1;
        } else if value_is_data_like(first_value) && other_has_data {
            data_signal += 1;
        }
    }
    header_signal > data_signal
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn dialect_rejects_conflicting_characters() {
        assert!(Dialect::new(b',', b',', None).is_err());
        assert!(Dialect::new(b'\n', b'"', None).is_err());
        assert!(Dialect::new(b';', b'\'', Some(b'\\')).is_ok());
    }

    #[test]
    fn escape_equal_to_quote_means_doubling() {
        let dialect = Dialect::new(b',', b'"', Some(b'"')).unwrap();
        assert_eq!(dialect.effective_escape(), None);
    }

    #[test]
    fn reader_honours_escape_character() {
        let dialect = Dialect::new(b',', b'"', Some(b'\\')).unwrap();
        let mut reader = dialect.open_reader("a,\"say \\\"hi\\\"\"\n".as_bytes(), false);
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[1], "say \"hi\"");
    }

    #[test]
    fn sniff_delimiter_prefers_consistent_counts() {
        assert_eq!(sniff_delimiter("a;b;c\n1;2;3\n4;5;6\n", DEFAULT_QUOTE), Some(b';'));
        assert_eq!(sniff_delimiter("a\tb\n1\t2,5\n", DEFAULT_QUOTE), Some(b'\t'));
        assert_eq!(sniff_delimiter("\"x,y\"|z\n1|2\n", DEFAULT_QUOTE), Some(b'|'));
        assert_eq!(sniff_delimiter("single\nvalues\n", DEFAULT_QUOTE), None);
    }

    #[test]
    fn sniff_delimiter_skips_custom_quoted_fields() {
        let sample = "'a,b'|c\n'x,y'|z\n'p,q'|r\n";
        assert_eq!(sniff_delimiter(sample, b'\''), Some(b'|'));
        assert_eq!(sniff_delimiter(sample, DEFAULT_QUOTE), Some(b','));
    }

    #[test]
    fn header_inference_distinguishes_text_from_data() {
        assert!(infer_has_header(
            &row(&["name", "age"]),
            &[row(&["alice", "30"]), row(&["bob", "41"])]
        ));
        assert!(!infer_has_header(
            &row(&["1", "30"]),
            &[row(&["2", "41"]), row(&["3", "17"])]
        ));
        assert!(!infer_has_header(
            &row(&["2024-01-05", "12.50"]),
            &[row(&["2024-01-06", "8.00"])]
        ));
        assert!(infer_has_header(&row(&["city", "country"]), &[]));
    }
}
