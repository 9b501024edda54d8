//! Request and report I/O for the command line.
//!
//! The `-` path convention routes request input through standard input.
//! Reports are written to standard output as pretty-printed JSON.

use std::{
    fs::File,
    io::{self, BufReader, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde_json::Value;

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if is_dash(path) {
        Ok(Box::new(io::stdin().lock()))
    } else {
        Ok(Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening request file {path:?}"))?,
        )))
    }
}

pub fn read_json(path: &Path) -> Result<Value> {
    let reader = open_input(path)?;
    serde_json::from_reader(reader).with_context(|| {
        if is_dash(path) {
            "Parsing JSON from standard input".to_string()
        } else {
            format!("Parsing JSON from {path:?}")
        }
    })
}

/// Reads a JSON array of request objects.
pub fn read_json_array(path: &Path) -> Result<Vec<Value>> {
    match read_json(path)? {
        Value::Array(items) => Ok(items),
        other => Err(anyhow!(
            "Expected a JSON array of column requests, found {}",
            match other {
                Value::Object(_) => "an object",
                Value::Null => "null",
                _ => "a scalar value",
            }
        )),
    }
}

pub fn write_json<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value).context("Serializing JSON output")?;
    writeln!(writer).context("Writing JSON output")?;
    Ok(())
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    write_json(&mut handle, value)
}
