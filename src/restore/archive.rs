// dbimporter/src/restore/archive.rs
use flate2::read::MultiGzDecoder;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::ZipArchive;

use crate::errors::{ImportError, Result};

pub const GZIP_CONTENT_TYPE: &str = "application/x-gzip";
pub const ZIP_CONTENT_TYPE: &str = "application/zip";

const CHUNK_SIZE: usize = 4096;

/// Archive format of a backup, derived from the content type the store reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Gzip,
    Zip,
}

impl ArchiveFormat {
    /// Matches the content type exactly; anything else has no extractor.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match content_type {
            GZIP_CONTENT_TYPE => Some(ArchiveFormat::Gzip),
            ZIP_CONTENT_TYPE => Some(ArchiveFormat::Zip),
            _ => None,
        }
    }

    /// File extension used for the downloaded archive.
    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Gzip => "gz",
            ArchiveFormat::Zip => "zip",
        }
    }
}

impl std::fmt::Display for ArchiveFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ArchiveFormat::Gzip => "gzip",
            ArchiveFormat::Zip => "zip",
        };
        f.write_str(name)
    }
}

/// Extracts `archive_path` into `destination` according to `format`.
pub fn extract(format: ArchiveFormat, archive_path: &Path, destination: &Path) -> Result<PathBuf> {
    match format {
        ArchiveFormat::Gzip => {
            extract_gzip(archive_path, destination)?;
        }
        ArchiveFormat::Zip => {
            extract_zip(archive_path, destination)?;
        }
    }
    Ok(destination.to_path_buf())
}

/// Decompresses a gzip file into a single destination file.
///
/// Reads in 4 KiB chunks until end of stream. Concatenated gzip members are
/// decoded as one stream. Returns the number of decompressed bytes.
pub fn extract_gzip(archive_path: &Path, destination_file: &Path) -> Result<u64> {
    tracing::debug!(
        "Decompressing gzip archive {} to {}",
        archive_path.display(),
        destination_file.display()
    );

    let archive_file = File::open(archive_path).map_err(|e| corrupt(archive_path, e))?;
    let mut decoder = MultiGzDecoder::new(archive_file);
    let mut output = File::create(destination_file).map_err(|source| ImportError::Scratch {
        path: destination_file.to_path_buf(),
        source,
    })?;

    let mut buf = [0u8; CHUNK_SIZE];
    let mut total: u64 = 0;
    loop {
        let read = match decoder.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(corrupt(archive_path, e)),
        };
        output
            .write_all(&buf[..read])
            .map_err(|source| ImportError::Scratch {
                path: destination_file.to_path_buf(),
                source,
            })?;
        total += read as u64;
    }

    output.flush().map_err(|source| ImportError::Scratch {
        path: destination_file.to_path_buf(),
        source,
    })?;

    tracing::info!("✓ Decompressed {} bytes of SQL", total);
    Ok(total)
}

/// Extracts every entry of a zip archive below `destination_dir`.
///
/// Entries whose names would escape the destination are rejected. Returns
/// the number of files written.
pub fn extract_zip(archive_path: &Path, destination_dir: &Path) -> Result<usize> {
    tracing::debug!(
        "Extracting zip archive {} to {}",
        archive_path.display(),
        destination_dir.display()
    );

    let archive_file = File::open(archive_path).map_err(|e| corrupt(archive_path, e))?;
    let mut archive = ZipArchive::new(archive_file).map_err(|e| corrupt(archive_path, e))?;

    fs::create_dir_all(destination_dir).map_err(|source| ImportError::Scratch {
        path: destination_dir.to_path_buf(),
        source,
    })?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(|e| corrupt(archive_path, e))?;
        let relative = entry
            .enclosed_name()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| ImportError::CorruptArchive {
                path: archive_path.to_path_buf(),
                reason: format!("entry '{}' escapes the extraction directory", entry.name()),
            })?;
        let outpath = destination_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath).map_err(|source| ImportError::Scratch {
                path: outpath.clone(),
                source,
            })?;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent).map_err(|source| ImportError::Scratch {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let mut output = File::create(&outpath).map_err(|source| ImportError::Scratch {
            path: outpath.clone(),
            source,
        })?;
        io::copy(&mut entry, &mut output).map_err(|e| corrupt(archive_path, e))?;
    }

    let files = WalkDir::new(destination_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .count();
    tracing::info!("✓ Extracted {} file(s) from zip archive", files);
    Ok(files)
}

fn corrupt(archive_path: &Path, err: impl std::fmt::Display) -> ImportError {
    ImportError::CorruptArchive {
        path: archive_path.to_path_buf(),
        reason: err.to_string(),
    }
}
