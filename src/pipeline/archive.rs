//! Zip bundling for multi-file results (page images, split pages) and for
//! the OOXML package written by [`super::docx`].

use std::io::{Read, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Streams named entries into a zip archive.
pub struct ArchiveBuilder<W: Write + Seek> {
    zip: ZipWriter<W>,
    options: SimpleFileOptions,
    entries: usize,
}

impl<W: Write + Seek> ArchiveBuilder<W> {
    /// Deflate-compressed entries.
    pub fn new(target: W) -> Self {
        Self::with_method(target, CompressionMethod::Deflated)
    }

    /// Entries stored as-is. Used for already-compressed payloads such as
    /// JPEG pages.
    pub fn stored(target: W) -> Self {
        Self::with_method(target, CompressionMethod::Stored)
    }

    fn with_method(target: W, method: CompressionMethod) -> Self {
        Self {
            zip: ZipWriter::new(target),
            options: SimpleFileOptions::default()
                .compression_method(method)
                .unix_permissions(0o644),
            entries: 0,
        }
    }

    pub fn add(&mut self, name: &str, bytes: &[u8]) -> zip::result::ZipResult<()> {
        self.zip.start_file(name, self.options)?;
        self.zip.write_all(bytes)?;
        self.entries += 1;
        Ok(())
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Write the central directory and hand back the target.
    pub fn finish(self) -> zip::result::ZipResult<W> {
        self.zip.finish()
    }
}

/// Entry names in archive order.
pub fn entry_names<R: Read + Seek>(source: R) -> zip::result::ZipResult<Vec<String>> {
    let mut archive = ZipArchive::new(source)?;
    let mut names = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        names.push(archive.by_index(i)?.name().to_string());
    }
    Ok(names)
}

/// Read one entry fully.
pub fn read_entry<R: Read + Seek>(source: R, name: &str) -> zip::result::ZipResult<Vec<u8>> {
    let mut archive = ZipArchive::new(source)?;
    let mut entry = archive.by_name(name)?;
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    Ok(buf)
}

/// Entry name for the `n`th (1-based) item of a numbered bundle.
pub fn numbered(n: usize, extension: &str) -> String {
    format!("page_{n}.{extension}")
}
