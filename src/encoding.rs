//! Source encoding detection and resolution against the encodings the
//! database load command accepts.
//!
//! Every file has a *source* encoding (what its bytes are in). The bulk load
//! declares an encoding to the server, and that declaration must describe the
//! bytes actually sent. When the source is a server-supported client
//! encoding the file is sent as-is and declared under its server name;
//! otherwise it is transcoded to UTF-8 first and declared as `UTF8`.

use std::{fs::File, io::Read, path::Path};

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use log::debug;
use serde::Serialize;

use crate::error::ImportError;

/// Bytes inspected when guessing a file's encoding.
pub const DETECTION_SAMPLE_BYTES: usize = 64 * 1024;

/// Server-side name of `encoding`, or `None` when the load command cannot
/// accept it as a client encoding.
pub fn server_encoding_name(encoding: &'static Encoding) -> Option<&'static str> {
    let name = match encoding.name() {
        "UTF-8" => "UTF8",
        "windows-874" => "WIN874",
        "windows-1250" => "WIN1250",
        "windows-1251" => "WIN1251",
        "windows-1252" => "WIN1252",
        "windows-1253" => "WIN1253",
        "windows-1254" => "WIN1254",
        "windows-1255" => "WIN1255",
        "windows-1256" => "WIN1256",
        "windows-1257" => "WIN1257",
        "windows-1258" => "WIN1258",
        "IBM866" => "WIN866",
        "ISO-8859-2" => "LATIN2",
        "ISO-8859-3" => "LATIN3",
        "ISO-8859-4" => "LATIN4",
        "ISO-8859-5" => "ISO_8859_5",
        "ISO-8859-6" => "ISO_8859_6",
        "ISO-8859-7" => "ISO_8859_7",
        "ISO-8859-8" => "ISO_8859_8",
        "ISO-8859-10" => "LATIN6",
        "ISO-8859-13" => "LATIN7",
        "ISO-8859-14" => "LATIN8",
        "ISO-8859-15" => "LATIN9",
        "ISO-8859-16" => "LATIN10",
        "KOI8-R" => "KOI8R",
        "KOI8-U" => "KOI8U",
        "Shift_JIS" => "SJIS",
        "EUC-JP" => "EUC_JP",
        // encoding_rs's EUC-KR is the windows-949 superset.
        "EUC-KR" => "UHC",
        "GBK" => "GBK",
        "gb18030" => "GB18030",
        "Big5" => "BIG5",
        _ => return None,
    };
    Some(name)
}

/// Looks an encoding up by label, defaulting to UTF-8 when no label is given.
pub fn resolve_label(label: Option<&str>) -> Result<&'static Encoding, ImportError> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| ImportError::UnknownEncoding(value.to_string())),
        None => Ok(UTF_8),
    }
}

/// Guesses the encoding of a byte sample: a byte-order mark wins, then
/// UTF-8 if the sample is valid UTF-8, otherwise windows-1252.
pub fn detect_encoding(sample: &[u8]) -> &'static Encoding {
    if let Some((encoding, _)) = Encoding::for_bom(sample) {
        return encoding;
    }
    match std::str::from_utf8(sample) {
        Ok(_) => UTF_8,
        // The sample may end inside a multi-byte sequence.
        Err(err) if err.error_len().is_none() => UTF_8,
        Err(_) => WINDOWS_1252,
    }
}

pub fn detect_file_encoding(path: &Path) -> Result<&'static Encoding, ImportError> {
    let file = File::open(path).map_err(|err| ImportError::io("Opening", path, err))?;
    let mut sample = Vec::with_capacity(DETECTION_SAMPLE_BYTES);
    file.take(DETECTION_SAMPLE_BYTES as u64)
        .read_to_end(&mut sample)
        .map_err(|err| ImportError::io("Reading", path, err))?;
    let encoding = detect_encoding(&sample);
    debug!("Detected encoding {} for {path:?}", encoding.name());
    Ok(encoding)
}

/// How a file's bytes get to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EncodingPlan {
    /// Encoding of the file on disk; used to read it for inspection.
    #[serde(serialize_with = "serialize_encoding")]
    pub source: &'static Encoding,
    /// Encoding of the bytes handed to the load stream.
    #[serde(serialize_with = "serialize_encoding")]
    pub transfer: &'static Encoding,
    /// Name declared to the load command; always describes `transfer`.
    pub declared: &'static str,
}

fn serialize_encoding<S>(encoding: &&'static Encoding, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(encoding.name())
}

impl EncodingPlan {
    pub fn requires_transcoding(&self) -> bool {
        self.source != self.transfer
    }
}

/// Maps a detected or declared source encoding onto a transfer plan.
pub fn resolve(source: &'static Encoding) -> EncodingPlan {
    match server_encoding_name(source) {
        Some(declared) => EncodingPlan {
            source,
            transfer: source,
            declared,
        },
        None => EncodingPlan {
            source,
            transfer: UTF_8,
            declared: "UTF8",
        },
    }
}

/// Length of the byte-order mark of `encoding` at the start of `bytes`.
/// A mark belonging to any other encoding counts as zero.
pub fn bom_length_for(bytes: &[u8], encoding: &'static Encoding) -> usize {
    match Encoding::for_bom(bytes) {
        Some((marked, len)) if marked == encoding => len,
        _ => 0,
    }
}
