#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tabledesk::db::{CopySink, CreatedTable, Database, NewTable, ProcArg, TableCreator};
use tabledesk::error::DbError;
use tempfile::{TempDir, tempdir};

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    /// Writes raw bytes, for files in encodings other than UTF-8.
    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }
}

/// Encodes `text` as UTF-16LE with a byte-order mark.
pub fn utf16le_with_bom(text: &str) -> Vec<u8> {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in text.encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRecord {
    pub schema: String,
    pub name: String,
    pub columns: Vec<String>,
    pub comment: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CopyRecord {
    pub command: String,
    pub payload: Vec<u8>,
    pub rows: u64,
}

impl CopyRecord {
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

#[derive(Debug, Clone)]
struct Failure {
    sqlstate: String,
    message: String,
}

impl Failure {
    fn to_error(&self) -> DbError {
        DbError::with_sqlstate(&self.sqlstate, &self.message)
    }
}

/// In-memory database collaborator that records every interaction.
#[derive(Debug, Default)]
pub struct FakeDatabase {
    pub calls: Vec<(String, Vec<ProcArg>)>,
    pub created: Vec<CreatedRecord>,
    pub copies: Vec<CopyRecord>,
    column_names: HashMap<(u32, i16), String>,
    procedure_failures: HashMap<String, Failure>,
    finish_failure: Option<Failure>,
    next_oid: u32,
}

impl FakeDatabase {
    pub fn new() -> Self {
        Self {
            next_oid: 16_384,
            ..Self::default()
        }
    }

    pub fn with_column_name(mut self, table_oid: u32, attnum: i16, name: &str) -> Self {
        self.column_names.insert((table_oid, attnum), name.to_string());
        self
    }

    /// Makes every call to `function` fail with the given SQLSTATE.
    pub fn failing(mut self, function: &str, sqlstate: &str, message: &str) -> Self {
        self.procedure_failures.insert(
            function.to_string(),
            Failure {
                sqlstate: sqlstate.to_string(),
                message: message.to_string(),
            },
        );
        self
    }

    /// Makes the bulk load fail when it is finalized.
    pub fn failing_copy(mut self, sqlstate: &str, message: &str) -> Self {
        self.finish_failure = Some(Failure {
            sqlstate: sqlstate.to_string(),
            message: message.to_string(),
        });
        self
    }

    pub fn calls_to(&self, function: &str) -> Vec<&[ProcArg]> {
        self.calls
            .iter()
            .filter(|(name, _)| name == function)
            .map(|(_, args)| args.as_slice())
            .collect()
    }
}

impl Database for FakeDatabase {
    fn call_procedure(
        &mut self,
        function: &str,
        args: &[ProcArg],
    ) -> Result<Option<String>, DbError> {
        self.calls.push((function.to_string(), args.to_vec()));
        if let Some(failure) = self.procedure_failures.get(function) {
            return Err(failure.to_error());
        }
        match (function, args) {
            ("get_column_name", [ProcArg::Oid(oid), ProcArg::Int(attnum)]) => {
                let attnum = i16::try_from(*attnum).expect("attnum fits i16");
                Ok(self.column_names.get(&(*oid, attnum)).cloned())
            }
            _ => Ok(None),
        }
    }

    fn copy_in(&mut self, command: &str) -> Result<Box<dyn CopySink + '_>, DbError> {
        Ok(Box::new(FakeCopy {
            command: command.to_string(),
            payload: Vec::new(),
            failure: self.finish_failure.clone(),
            copies: &mut self.copies,
        }))
    }
}

impl TableCreator for FakeDatabase {
    fn create_table(&mut self, table: &NewTable<'_>) -> Result<CreatedTable, DbError> {
        self.created.push(CreatedRecord {
            schema: table.schema.to_string(),
            name: table.name.to_string(),
            columns: table.columns.to_vec(),
            comment: table.comment.map(str::to_string),
        });
        let oid = self.next_oid;
        self.next_oid += 1;
        Ok(CreatedTable {
            oid,
            schema: table.schema.to_string(),
            name: table.name.to_string(),
        })
    }
}

struct FakeCopy<'a> {
    command: String,
    payload: Vec<u8>,
    failure: Option<Failure>,
    copies: &'a mut Vec<CopyRecord>,
}

impl Write for FakeCopy<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.payload.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Character following `OPTION '` in a COPY command.
fn copy_option(command: &str, option: &str) -> Option<u8> {
    let marker = format!("{option} '");
    let start = command.find(&marker)? + marker.len();
    command.as_bytes().get(start).copied()
}

impl CopySink for FakeCopy<'_> {
    fn finish(self: Box<Self>) -> Result<u64, DbError> {
        let this = *self;
        if let Some(failure) = this.failure {
            return Err(failure.to_error());
        }
        let rows = csv::ReaderBuilder::new()
            .has_headers(this.command.contains("HEADER true"))
            .delimiter(copy_option(&this.command, "DELIMITER").unwrap_or(b','))
            .quote(copy_option(&this.command, "QUOTE").unwrap_or(b'"'))
            .flexible(true)
            .from_reader(this.payload.as_slice())
            .byte_records()
            .count() as u64;
        this.copies.push(CopyRecord {
            command: this.command,
            payload: this.payload,
            rows,
        });
        Ok(rows)
    }
}
