use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::pg::DEFAULT_PROCEDURE_SCHEMA;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Import delimited files into PostgreSQL and alter table columns",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect encoding, dialect and column names of a file without importing it
    Probe(ProbeArgs),
    /// Create a table from a delimited file and bulk load its rows
    Import(ImportArgs),
    /// Alter a single column from a JSON request in any accepted shape
    Alter(AlterArgs),
    /// Alter several columns from a JSON array of restricted requests
    BatchUpdate(BatchUpdateArgs),
    /// Drop the columns marked with "delete": true in a JSON array
    DropColumns(DropColumnsArgs),
}

/// How to read an input file. Flags override values from `--data-file`.
#[derive(Debug, Args)]
pub struct FileArgs {
    /// Delimited file to read
    #[arg(short = 'i', long = "input", required_unless_present = "data_file")]
    pub input: Option<PathBuf>,
    /// YAML descriptor recording how to read the file
    #[arg(long = "data-file")]
    pub data_file: Option<PathBuf>,
    /// Field delimiter (supports ',', 'tab', ';', '|'); sniffed when omitted
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Quote character (defaults to '"')
    #[arg(long, value_parser = parse_ascii_char)]
    pub quote: Option<u8>,
    /// Escape character; quotes are escaped by doubling when omitted
    #[arg(long, value_parser = parse_ascii_char)]
    pub escape: Option<u8>,
    /// Treat the first row as a header
    #[arg(long, conflicts_with = "no_header")]
    pub header: bool,
    /// Treat the first row as data
    #[arg(long = "no-header")]
    pub no_header: bool,
    /// Character encoding of the file; detected when omitted
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

impl FileArgs {
    /// Declared header presence; `None` leaves it to inference.
    pub fn header_flag(&self) -> Option<bool> {
        match (self.header, self.no_header) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub file: FileArgs,
    /// Write the detected settings to a YAML data file descriptor
    #[arg(long)]
    pub save: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct ConnectionArgs {
    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub connection: Option<String>,
    /// Schema holding the server-side column procedures
    #[arg(long = "procedure-schema", default_value = DEFAULT_PROCEDURE_SCHEMA)]
    pub procedure_schema: String,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub file: FileArgs,
    /// Target schema for the new table
    #[arg(long, default_value = "public")]
    pub schema: String,
    /// Name of the table to create
    #[arg(short, long)]
    pub table: String,
    /// Comment to attach to the new table
    #[arg(long)]
    pub comment: Option<String>,
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Args)]
pub struct AlterArgs {
    /// OID of the table owning the column
    #[arg(long = "table-oid")]
    pub table_oid: u32,
    /// Attribute number of the column, used when the request omits one
    #[arg(long)]
    pub attnum: i16,
    /// JSON request file ('-' reads standard input)
    #[arg(short, long, default_value = "-")]
    pub request: PathBuf,
    /// Print the canonical alteration instead of applying it
    #[arg(long)]
    pub dry_run: bool,
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Args)]
pub struct BatchUpdateArgs {
    /// OID of the table owning the columns
    #[arg(long = "table-oid")]
    pub table_oid: u32,
    /// JSON array of requests ('-' reads standard input)
    #[arg(short, long, default_value = "-")]
    pub request: PathBuf,
    /// Print the canonical alterations instead of applying them
    #[arg(long)]
    pub dry_run: bool,
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

#[derive(Debug, Args)]
pub struct DropColumnsArgs {
    /// OID of the table owning the columns
    #[arg(long = "table-oid")]
    pub table_oid: u32,
    /// JSON array of column items ('-' reads standard input)
    #[arg(short, long, default_value = "-")]
    pub request: PathBuf,
    #[command(flatten)]
    pub connection: ConnectionArgs,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" | "\\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => parse_ascii_char(other),
    }
}

pub fn parse_ascii_char(value: &str) -> Result<u8, String> {
    let mut chars = value.chars();
    let first = chars
        .next()
        .ok_or_else(|| "Value cannot be empty".to_string())?;
    if chars.next().is_some() {
        return Err("Value must be a single character".to_string());
    }
    if !first.is_ascii() {
        return Err("Value must be ASCII".to_string());
    }
    Ok(first as u8)
}
