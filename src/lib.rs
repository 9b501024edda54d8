pub mod alter;
pub mod cli;
pub mod columns;
pub mod data_file;
pub mod db;
pub mod dialect;
pub mod encoding;
pub mod error;
pub mod identifier;
pub mod import;
pub mod io_utils;
pub mod pg;

use std::{env, path::PathBuf, sync::OnceLock};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use encoding_rs::Encoding;
use log::{LevelFilter, debug, info};
use postgres::{Client, NoTls};
use serde_json::Value;

use crate::{
    alter::ColumnAlteration,
    cli::{Cli, Commands, ConnectionArgs, FileArgs},
    data_file::DataFile,
    dialect::{DEFAULT_QUOTE, Dialect},
    error::AlterError,
    import::ImportSpec,
    pg::PgSession,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("tabledesk", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::Import(args) => handle_import(&args),
        Commands::Alter(args) => handle_alter(&args),
        Commands::BatchUpdate(args) => handle_batch_update(&args),
        Commands::DropColumns(args) => handle_drop_columns(&args),
    }
}

/// Reading settings gathered from flags and an optional descriptor.
struct FileSettings {
    path: PathBuf,
    header: Option<bool>,
    dialect: Option<Dialect>,
    encoding: Option<&'static Encoding>,
}

fn file_settings(args: &FileArgs) -> Result<FileSettings> {
    let descriptor = args
        .data_file
        .as_deref()
        .map(DataFile::load)
        .transpose()?;
    let path = match (&args.input, &descriptor) {
        (Some(path), _) => path.clone(),
        (None, Some(descriptor)) => descriptor.path.clone(),
        (None, None) => return Err(anyhow!("Either --input or --data-file is required")),
    };
    let encoding = match &args.input_encoding {
        Some(label) => Some(encoding::resolve_label(Some(label))?),
        None => descriptor
            .as_ref()
            .map(DataFile::encoding)
            .transpose()?
            .flatten(),
    };
    let described = descriptor
        .as_ref()
        .map(DataFile::dialect)
        .transpose()?
        .flatten();
    let delimiter = args
        .delimiter
        .or(described.map(|dialect| dialect.delimiter));
    let quote = args
        .quote
        .or(described.map(|dialect| dialect.quote))
        .or(descriptor.as_ref().map(|d| d.quotechar as u8));
    let escape = args
        .escape
        .or(described.and_then(|dialect| dialect.escape))
        .or(descriptor
            .as_ref()
            .and_then(|d| d.escapechar)
            .map(|c| c as u8));
    let dialect = match (delimiter, quote, escape) {
        (None, None, None) => None,
        (Some(delimiter), quote, escape) => Some(Dialect::new(
            delimiter,
            quote.unwrap_or(DEFAULT_QUOTE),
            escape,
        )?),
        (None, quote, escape) => {
            let source = match encoding {
                Some(encoding) => encoding,
                None => encoding::detect_file_encoding(&path)?,
            };
            let quote = quote.unwrap_or(DEFAULT_QUOTE);
            Some(Dialect::new(
                dialect::sniff_file_delimiter(&path, source, quote)?,
                quote,
                escape,
            )?)
        }
    };
    Ok(FileSettings {
        header: args
            .header_flag()
            .or(descriptor.as_ref().and_then(|d| d.header)),
        path,
        dialect,
        encoding,
    })
}

fn handle_probe(args: &cli::ProbeArgs) -> Result<()> {
    let settings = file_settings(&args.file)?;
    info!("Probing '{}'", settings.path.display());
    let prepared = import::prepare_file(
        &settings.path,
        settings.header,
        settings.dialect,
        settings.encoding,
    )
    .with_context(|| format!("Probing {:?}", settings.path))?;
    info!(
        "Found {} column(s) in {} with delimiter '{}'",
        prepared.columns.len(),
        prepared.encoding.source.name(),
        printable_delimiter(prepared.dialect.delimiter)
    );
    if let Some(target) = &args.save {
        let descriptor = DataFile {
            path: std::path::absolute(&prepared.path)
                .with_context(|| format!("Resolving {:?}", prepared.path))?,
            header: Some(prepared.has_header),
            delimiter: Some(prepared.dialect.delimiter as char),
            quotechar: prepared.dialect.quote as char,
            escapechar: prepared.dialect.escape.map(char::from),
            encoding: Some(prepared.encoding.source.name().to_string()),
        };
        descriptor
            .save(target)
            .with_context(|| format!("Writing data file descriptor to {target:?}"))?;
        info!("Data file descriptor written to {target:?}");
    }
    io_utils::print_json(&prepared)
}

fn connect(args: &ConnectionArgs) -> Result<Client> {
    let url = args
        .connection
        .as_deref()
        .ok_or_else(|| anyhow!("A connection string is required (--connection or DATABASE_URL)"))?;
    Client::connect(url, NoTls).context("Connecting to the database")
}

fn handle_import(args: &cli::ImportArgs) -> Result<()> {
    let settings = file_settings(&args.file)?;
    let spec = ImportSpec {
        header: settings.header,
        dialect: settings.dialect,
        encoding: settings.encoding,
        comment: args.comment.clone(),
        ..ImportSpec::new(&settings.path, &args.schema, &args.table)
    };
    let mut client = connect(&args.connection)?;
    let mut transaction = client.transaction().context("Starting import transaction")?;
    let imported = {
        let mut session = PgSession::new(&mut transaction)
            .with_procedure_schema(&args.connection.procedure_schema);
        import::import_csv(&mut session, &spec)
            .with_context(|| format!("Importing {:?}", spec.path))?
    };
    transaction.commit().context("Committing import")?;
    info!(
        "Created {} (oid {}) with {} row(s)",
        imported.table.display_name(),
        imported.table.oid,
        imported.rows
    );
    io_utils::print_json(&imported)
}

/// Renders an alteration failure with its stable code.
fn alter_failure(err: AlterError) -> anyhow::Error {
    if let Some(message) = err.db_message() {
        debug!("Database reported: {message}");
    }
    anyhow!("{}: {err}", err.kind().code())
}

fn handle_alter(args: &cli::AlterArgs) -> Result<()> {
    let request = io_utils::read_json(&args.request)?;
    if args.dry_run {
        let alteration = alter::normalize(request, Some(args.attnum)).map_err(alter_failure)?;
        return io_utils::print_json(&alteration);
    }
    let mut client = connect(&args.connection)?;
    let mut session =
        PgSession::new(&mut client).with_procedure_schema(&args.connection.procedure_schema);
    let alteration = alter::alter_column(&mut session, args.table_oid, args.attnum, request)
        .map_err(alter_failure)?;
    info!(
        "Altered column {} of table {}",
        alteration.attnum, args.table_oid
    );
    io_utils::print_json(&alteration)
}

fn handle_batch_update(args: &cli::BatchUpdateArgs) -> Result<()> {
    let items = io_utils::read_json_array(&args.request)?;
    if args.dry_run {
        alter::validate_batch(&items).map_err(alter_failure)?;
        let alterations = items
            .into_iter()
            .map(|item| alter::normalize(item, None))
            .collect::<Result<Vec<ColumnAlteration>, _>>()
            .map_err(alter_failure)?;
        return io_utils::print_json(&alterations);
    }
    let mut client = connect(&args.connection)?;
    let mut session =
        PgSession::new(&mut client).with_procedure_schema(&args.connection.procedure_schema);
    let alterations = alter::batch_update_columns(&mut session, args.table_oid, &items)
        .map_err(alter_failure)?;
    info!(
        "Updated {} column(s) of table {}",
        alterations.len(),
        args.table_oid
    );
    io_utils::print_json(&alterations)
}

fn handle_drop_columns(args: &cli::DropColumnsArgs) -> Result<()> {
    let items = io_utils::read_json_array(&args.request)?;
    let mut client = connect(&args.connection)?;
    let mut session =
        PgSession::new(&mut client).with_procedure_schema(&args.connection.procedure_schema);
    let dropped =
        alter::drop_columns(&mut session, args.table_oid, &items).map_err(alter_failure)?;
    io_utils::print_json(&Value::from(dropped))
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
