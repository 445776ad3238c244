// archive.rs - Bundling converted images into one downloadable archive

use crate::error::ArchiveError;
use crate::pipeline::ConversionResult;
use std::collections::HashSet;
use std::io::{Cursor, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub trait ArchiveSink {
    fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<(), ArchiveError>;

    fn produce(self) -> Result<Vec<u8>, ArchiveError>;
}

pub struct ZipSink {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    options: SimpleFileOptions,
}

impl ZipSink {
    pub fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            // Encoded images barely shrink further, so spend little effort.
            options: SimpleFileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .compression_level(Some(1)),
        }
    }
}

impl Default for ZipSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveSink for ZipSink {
    fn add_entry(&mut self, name: &str, bytes: &[u8]) -> Result<(), ArchiveError> {
        self.writer.start_file(name, self.options)?;
        self.writer.write_all(bytes)?;
        Ok(())
    }

    fn produce(self) -> Result<Vec<u8>, ArchiveError> {
        Ok(self.writer.finish()?.into_inner())
    }
}

/// `<prefix><display name>` for each result. Names that repeat get `-2`, `-3`, ...
/// before the extension.
pub fn entry_names(results: &[ConversionResult], prefix: &str) -> Vec<String> {
    let mut used = HashSet::new();
    results
        .iter()
        .map(|result| {
            let base = format!("{prefix}{}", result.display_name);
            let mut name = base.clone();
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = match base.rsplit_once('.') {
                    Some((stem, ext)) => format!("{stem}-{n}.{ext}"),
                    None => format!("{base}-{n}"),
                };
                n += 1;
            }
            name
        })
        .collect()
}

/// Write every result into `sink` and return the finished archive, or `None`
/// when there is nothing to export. Any failing entry fails the whole export.
pub fn export_with<S: ArchiveSink>(
    results: &[ConversionResult],
    prefix: &str,
    mut sink: S,
) -> Result<Option<Vec<u8>>, ArchiveError> {
    if results.is_empty() {
        return Ok(None);
    }
    for (result, name) in results.iter().zip(entry_names(results, prefix)) {
        sink.add_entry(&name, &result.bytes)?;
    }
    sink.produce().map(Some)
}

pub fn export_zip(
    results: &[ConversionResult],
    prefix: &str,
) -> Result<Option<Vec<u8>>, ArchiveError> {
    export_with(results, prefix, ZipSink::new())
}
