//! Input decoding and JSON output helpers.
//!
//! Every file the commands read flows through [`open_input`]: the `-` path
//! reads stdin, and non-UTF-8 exports (Thai portals still emit `windows-874`)
//! are transcoded to UTF-8 before the JSON parser sees them. A byte-order mark
//! overrides the requested encoding.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use encoding_rs_io::DecodeReaderBytesBuilder;
use serde::Serialize;

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Wraps `reader` so it yields UTF-8, decoding from `encoding`.
pub fn decoding_reader<R: Read>(reader: R, encoding: &'static Encoding) -> impl Read {
    DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding))
        .bom_override(true)
        .build(reader)
}

pub fn open_input(path: &Path, encoding: &'static Encoding) -> Result<Box<dyn Read>> {
    let raw: Box<dyn Read> = if is_dash(path) {
        Box::new(io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(Box::new(decoding_reader(raw, encoding)))
}

/// Pretty JSON to `path`, or stdout for `-`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer: Box<dyn Write> = if is_dash(path) {
        Box::new(io::stdout().lock())
    } else {
        Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
        ))
    };
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Writing JSON to {path:?}"))?;
    writeln!(writer)?;
    writer.flush().with_context(|| format!("Flushing {path:?}"))
}
