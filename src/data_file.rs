//! YAML descriptors for uploaded data files.
//!
//! A descriptor records how a file should be read: its header flag, dialect
//! and encoding. `probe --save` writes one from detected settings so it can
//! be reviewed or edited before `import --data-file` consumes it.

use std::{
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};

use crate::{
    dialect::{DEFAULT_QUOTE, Dialect},
    encoding,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataFile {
    /// Location of the data; relative paths resolve against the descriptor.
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<char>,
    #[serde(default = "default_quotechar")]
    pub quotechar: char,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub escapechar: Option<char>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
}

fn default_quotechar() -> char {
    DEFAULT_QUOTE as char
}

impl DataFile {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening data file descriptor {path:?}"))?;
        let mut descriptor: DataFile = serde_yaml::from_reader(BufReader::new(file))
            .with_context(|| format!("Parsing data file descriptor {path:?}"))?;
        if descriptor.path.is_relative()
            && let Some(parent) = path.parent()
        {
            descriptor.path = parent.join(&descriptor.path);
        }
        Ok(descriptor)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("Creating descriptor {path:?}"))?;
        serde_yaml::to_writer(file, self).context("Writing data file descriptor YAML")
    }

    /// Dialect described by the file; `None` when no delimiter is recorded
    /// and one has to be sniffed.
    pub fn dialect(&self) -> Result<Option<Dialect>> {
        let Some(delimiter) = self.delimiter else {
            return Ok(None);
        };
        let dialect = Dialect::new(
            ascii_byte("delimiter", delimiter)?,
            ascii_byte("quotechar", self.quotechar)?,
            self.escapechar
                .map(|escape| ascii_byte("escapechar", escape))
                .transpose()?,
        )?;
        Ok(Some(dialect))
    }

    pub fn encoding(&self) -> Result<Option<&'static Encoding>> {
        self.encoding
            .as_deref()
            .map(|label| encoding::resolve_label(Some(label)))
            .transpose()
            .map_err(Into::into)
    }
}

fn ascii_byte(field: &str, value: char) -> Result<u8> {
    if value.is_ascii() {
        Ok(value as u8)
    } else {
        Err(anyhow!("{field} must be an ASCII character (got '{value}')"))
    }
}
