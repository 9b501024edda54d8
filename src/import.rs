//! Bulk import of delimited text files.
//!
//! An import resolves the file's encoding and column names, creates the
//! destination table through the [`TableCreator`] collaborator, and streams
//! the file into it with `COPY ... FROM STDIN`.
//!
//! Files whose encoding the server accepts are streamed byte-for-byte in
//! bounded chunks. Anything else is first decoded chunk by chunk into UTF-8,
//! with malformed or unmappable input replaced by U+FFFD, and spilled to a
//! spooled temporary file that only moves to disk past
//! [`SPILL_MEMORY_LIMIT`]. Transcoding finishes before the destination table
//! is created, so a read or spill failure leaves nothing behind.
//!
//! # Partial failure
//!
//! Table creation and the load are separate steps. If the load fails after
//! the table was created, [`ImportError::Finalize`] (or
//! [`ImportError::Stream`]) is returned and the empty table stays behind.
//! Run the import inside a transaction and roll back on error to get
//! all-or-nothing behaviour; the CLI does exactly that.

use std::{
    fs::File,
    io::{self, BufReader, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use encoding_rs::Encoding;
use itertools::Itertools;
use log::{debug, info};
use serde::Serialize;
use tempfile::SpooledTempFile;

use crate::{
    columns,
    db::{CopySink, CreatedTable, Database, NewTable, TableCreator},
    dialect::{self, CsvLayout, Dialect},
    encoding::{self, EncodingPlan},
    error::ImportError,
    identifier::{qualify, quote_ident, quote_literal},
    printable_delimiter,
};

/// Size of each read from the source file.
pub const COPY_CHUNK_BYTES: usize = 64 * 1024;

/// Transcoded output beyond this size spills to a temporary file on disk.
pub const SPILL_MEMORY_LIMIT: usize = 8 * 1024 * 1024;

/// Everything needed to import one file.
#[derive(Debug, Clone)]
pub struct ImportSpec {
    pub path: PathBuf,
    /// `None` infers header presence from the data.
    pub header: Option<bool>,
    /// `None` sniffs the delimiter and uses the default quote character.
    pub dialect: Option<Dialect>,
    /// Declared or previously detected source encoding; `None` detects it.
    pub encoding: Option<&'static Encoding>,
    pub schema: String,
    pub table: String,
    pub comment: Option<String>,
}

impl ImportSpec {
    pub fn new(path: impl Into<PathBuf>, schema: impl Into<String>, table: impl Into<String>) -> Self {
        ImportSpec {
            path: path.into(),
            header: None,
            dialect: None,
            encoding: None,
            schema: schema.into(),
            table: table.into(),
            comment: None,
        }
    }
}

/// Resolved reading plan for a file: its encoding, dialect and sanitized
/// column names.
#[derive(Debug, Clone, Serialize)]
pub struct PreparedFile {
    pub path: PathBuf,
    pub encoding: EncodingPlan,
    pub dialect: Dialect,
    pub has_header: bool,
    /// Header cells as found in the file, before sanitization.
    pub raw_headers: Vec<String>,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportedTable {
    pub table: CreatedTable,
    pub rows: u64,
    pub transcoded: bool,
}

/// Resolves encoding, dialect and column names without touching the
/// database.
pub fn prepare_file(
    path: &Path,
    header: Option<bool>,
    dialect: Option<Dialect>,
    source_encoding: Option<&'static Encoding>,
) -> Result<PreparedFile, ImportError> {
    let source = match source_encoding {
        Some(encoding) => encoding,
        None => encoding::detect_file_encoding(path)?,
    };
    let plan = encoding::resolve(source);
    debug!(
        "Encoding for {path:?}: source {}, transfer {} (declared {})",
        plan.source.name(),
        plan.transfer.name(),
        plan.declared
    );
    let dialect = match dialect {
        Some(dialect) => dialect,
        None => Dialect::new(
            dialect::sniff_file_delimiter(path, source, dialect::DEFAULT_QUOTE)?,
            dialect::DEFAULT_QUOTE,
            None,
        )?,
    };
    dialect.validate()?;
    let CsvLayout {
        headers,
        has_headers,
    } = dialect::detect_csv_layout(path, &dialect, source, header)?;
    if headers.is_empty() {
        return Err(ImportError::NoColumns(path.to_path_buf()));
    }
    let columns = columns::process_column_names(&headers);
    Ok(PreparedFile {
        path: path.to_path_buf(),
        encoding: plan,
        dialect,
        has_header: has_headers,
        raw_headers: headers,
        columns,
    })
}

/// Imports `spec.path` into a new table and returns its identifier along
/// with the number of rows loaded.
pub fn import_csv<D>(db: &mut D, spec: &ImportSpec) -> Result<ImportedTable, ImportError>
where
    D: Database + TableCreator + ?Sized,
{
    qualify(&spec.schema, &spec.table)?;
    let prepared = prepare_file(&spec.path, spec.header, spec.dialect, spec.encoding)?;
    info!(
        "Importing '{}' into {}.{} ({} column(s), delimiter '{}')",
        spec.path.display(),
        spec.schema,
        spec.table,
        prepared.columns.len(),
        printable_delimiter(prepared.dialect.delimiter)
    );
    let source = open_copy_source(&prepared)?;
    let table = db
        .create_table(&NewTable {
            schema: &spec.schema,
            name: &spec.table,
            columns: &prepared.columns,
            comment: spec.comment.as_deref(),
        })
        .map_err(|source| ImportError::CreateTable {
            table: format!("{}.{}", spec.schema, spec.table),
            source,
        })?;
    let rows = stream_copy_source(db, &table, &prepared, source)?;
    info!("Loaded {rows} row(s) into {}", table.display_name());
    Ok(ImportedTable {
        table,
        rows,
        transcoded: prepared.encoding.requires_transcoding(),
    })
}

/// Parameters of a `COPY ... FROM STDIN` command.
#[derive(Debug, Clone, Copy)]
pub struct CopyCommand<'a> {
    pub schema: &'a str,
    pub table: &'a str,
    pub columns: &'a [String],
    pub header: bool,
    pub dialect: Dialect,
    pub encoding: &'a str,
}

impl CopyCommand<'_> {
    /// Renders the command with every identifier and option value quoted.
    pub fn to_sql(&self) -> Result<String, ImportError> {
        let columns = self
            .columns
            .iter()
            .map(|column| quote_ident(column))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .join(", ");
        let mut options = vec![
            "FORMAT csv".to_string(),
            format!("HEADER {}", self.header),
            format!(
                "DELIMITER {}",
                quote_literal(&char::from(self.dialect.delimiter).to_string())
            ),
            format!(
                "QUOTE {}",
                quote_literal(&char::from(self.dialect.quote).to_string())
            ),
        ];
        if let Some(escape) = self.dialect.escape {
            options.push(format!(
                "ESCAPE {}",
                quote_literal(&char::from(escape).to_string())
            ));
        }
        options.push(format!("ENCODING {}", quote_literal(self.encoding)));
        Ok(format!(
            "COPY {} ({columns}) FROM STDIN WITH ({})",
            qualify(self.schema, self.table)?,
            options.join(", ")
        ))
    }
}

/// File contents ready to stream into `COPY`: the raw file when the server
/// accepts its encoding, otherwise its UTF-8 transcoding.
pub enum CopySource {
    Direct {
        reader: BufReader<File>,
        encoding: &'static Encoding,
    },
    Transcoded(SpooledTempFile),
}

/// Opens the prepared file for loading. Transcoding happens here, so a
/// read or spill failure surfaces before anything is created.
pub fn open_copy_source(prepared: &PreparedFile) -> Result<CopySource, ImportError> {
    let path = prepared.path.as_path();
    let file = File::open(path).map_err(|err| ImportError::io("Opening", path, err))?;
    if prepared.encoding.requires_transcoding() {
        info!(
            "Transcoding {path:?} from {} to {} before loading",
            prepared.encoding.source.name(),
            prepared.encoding.transfer.name()
        );
        let spill = transcode_to_spill(file, prepared.encoding.source)
            .map_err(|err| ImportError::io("Transcoding", path, err))?;
        Ok(CopySource::Transcoded(spill))
    } else {
        Ok(CopySource::Direct {
            reader: BufReader::with_capacity(COPY_CHUNK_BYTES, file),
            encoding: prepared.encoding.source,
        })
    }
}

/// Streams a prepared file into an existing table and returns the number of
/// rows the server reports as loaded.
pub fn insert_csv_records<D>(
    db: &mut D,
    table: &CreatedTable,
    prepared: &PreparedFile,
) -> Result<u64, ImportError>
where
    D: Database + ?Sized,
{
    let source = open_copy_source(prepared)?;
    stream_copy_source(db, table, prepared, source)
}

/// Streams an opened [`CopySource`] into an existing table and returns the
/// number of rows the server reports as loaded.
pub fn stream_copy_source<D>(
    db: &mut D,
    table: &CreatedTable,
    prepared: &PreparedFile,
    source: CopySource,
) -> Result<u64, ImportError>
where
    D: Database + ?Sized,
{
    let command = CopyCommand {
        schema: &table.schema,
        table: &table.name,
        columns: &prepared.columns,
        header: prepared.has_header,
        dialect: prepared.dialect,
        encoding: prepared.encoding.declared,
    }
    .to_sql()?;
    debug!("Bulk load command: {command}");

    let stream_error = |source: io::Error| ImportError::Stream {
        table: table.display_name(),
        source,
    };
    let mut sink = open_sink(db, table, &command)?;
    match source {
        CopySource::Transcoded(mut spill) => {
            copy_chunks(&mut spill, &mut sink).map_err(stream_error)?;
        }
        CopySource::Direct {
            mut reader,
            encoding,
        } => {
            copy_without_bom(&mut reader, encoding, &mut sink).map_err(stream_error)?;
        }
    }
    finish_sink(sink, table)
}

fn open_sink<'a, D>(
    db: &'a mut D,
    table: &CreatedTable,
    command: &str,
) -> Result<Box<dyn CopySink + 'a>, ImportError>
where
    D: Database + ?Sized,
{
    db.copy_in(command).map_err(|source| ImportError::CopyStart {
        table: table.display_name(),
        source,
    })
}

fn finish_sink(sink: Box<dyn CopySink + '_>, table: &CreatedTable) -> Result<u64, ImportError> {
    sink.finish().map_err(|source| ImportError::Finalize {
        table: table.display_name(),
        oid: table.oid,
        source,
    })
}

/// Decodes `reader` from `source` into UTF-8, chunk by chunk, into a spooled
/// temporary file positioned at its start.
pub fn transcode_to_spill<R: Read>(
    reader: R,
    source: &'static Encoding,
) -> io::Result<SpooledTempFile> {
    let mut decoded = dialect::decoding_reader(reader, source);
    let mut spill = tempfile::spooled_tempfile(SPILL_MEMORY_LIMIT);
    let mut chunk = vec![0u8; COPY_CHUNK_BYTES];
    loop {
        let read = match decoded.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        spill.write_all(&chunk[..read])?;
    }
    spill.seek(SeekFrom::Start(0))?;
    Ok(spill)
}

/// Copies `reader` to `writer` in bounded chunks and returns the byte count.
pub fn copy_chunks<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
) -> io::Result<u64> {
    let mut chunk = vec![0u8; COPY_CHUNK_BYTES];
    let mut total = 0u64;
    loop {
        let read = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        };
        writer.write_all(&chunk[..read])?;
        total += read as u64;
    }
    writer.flush()?;
    Ok(total)
}

/// Like [`copy_chunks`], but drops a leading byte-order mark of `encoding`,
/// which the server would otherwise load as part of the first field. Bytes
/// that only look like another encoding's mark are data and are kept.
fn copy_without_bom<R: io::BufRead, W: Write + ?Sized>(
    reader: &mut R,
    encoding: &'static Encoding,
    writer: &mut W,
) -> io::Result<u64> {
    let mut prefix = [0u8; 3];
    let mut filled = 0;
    while filled < prefix.len() {
        let read = reader.read(&mut prefix[filled..])?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    let skip = encoding::bom_length_for(&prefix[..filled], encoding);
    writer.write_all(&prefix[skip..filled])?;
    Ok((filled - skip) as u64 + copy_chunks(reader, writer)?)
}
