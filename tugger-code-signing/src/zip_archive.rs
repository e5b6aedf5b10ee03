// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Extraction and creation of zip archives backed by directories.

use {
    crate::error::SigningError,
    log::debug,
    std::{
        io::{Read, Seek, Write},
        path::Path,
    },
    tugger_file_matcher::relative_path_string,
    zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter},
};

/// Extract all entries of a zip archive into a directory.
///
/// Entries whose names would resolve outside `dest_dir` are rejected.
pub fn extract_zip<R: Read + Seek>(reader: R, dest_dir: &Path) -> Result<(), SigningError> {
    let mut za = ZipArchive::new(reader)?;

    for i in 0..za.len() {
        let mut zf = za.by_index(i)?;

        let relative = zf
            .enclosed_name()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| SigningError::ArchiveEntryEscapes(zf.name().to_string()))?;

        let dest_path = dest_dir.join(relative);

        if zf.is_dir() {
            std::fs::create_dir_all(&dest_path)?;
            continue;
        }

        if let Some(parent) = dest_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut fh = std::fs::File::create(&dest_path)?;
        std::io::copy(&mut zf, &mut fh)?;
    }

    Ok(())
}

/// Extract a zip file on disk into a directory.
pub fn extract_zip_file(path: &Path, dest_dir: &Path) -> Result<(), SigningError> {
    let fh = std::fs::File::open(path)?;
    extract_zip(std::io::BufReader::new(fh), dest_dir)
}

/// Write the content of a directory as a zip archive.
///
/// Entries are written in sorted order with `/` separated names. Empty
/// directories are preserved as directory entries.
pub fn write_directory_zip<W: Write + Seek>(source_dir: &Path, writer: W) -> Result<W, SigningError> {
    let mut zf = ZipWriter::new(writer);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in walkdir::WalkDir::new(source_dir)
        .min_depth(1)
        .sort_by_file_name()
    {
        let entry = entry?;

        let relative = match entry.path().strip_prefix(source_dir) {
            Ok(p) => relative_path_string(p),
            Err(_) => continue,
        };

        if entry.file_type().is_dir() {
            if std::fs::read_dir(entry.path())?.next().is_none() {
                zf.add_directory(relative, options)?;
            }
        } else if entry.file_type().is_file() {
            debug!("adding {} to zip", relative);
            zf.start_file(relative, options)?;
            std::io::copy(&mut std::fs::File::open(entry.path())?, &mut zf)?;
        }
    }

    Ok(zf.finish()?)
}

/// Write the content of a directory to a zip file on disk.
pub fn write_directory_zip_file(source_dir: &Path, dest: &Path) -> Result<(), SigningError> {
    let fh = std::fs::File::create(dest)?;
    let mut writer = write_directory_zip(source_dir, std::io::BufWriter::new(fh))?;
    writer.flush()?;

    Ok(())
}

/// Names of the entries in a zip file, in archive order.
pub fn zip_entry_names(path: &Path) -> Result<Vec<String>, SigningError> {
    let za = ZipArchive::new(std::io::BufReader::new(std::fs::File::open(path)?))?;

    Ok(za.file_names().map(|s| s.to_string()).collect())
}
