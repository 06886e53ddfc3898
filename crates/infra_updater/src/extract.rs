//! Extract step
//!
//! `.zip` archives are unpacked entry by entry, `.gz` files are
//! decompressed to a single file. Entries whose paths would land outside
//! the target directory fail the extraction.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use zip::ZipArchive;

use crate::error::{UpdaterError, UpdaterResult};

/// Unpacks `archive` into `target`, returning the files written
///
/// Blocking; run it on the blocking pool.
pub fn extract_archive(archive: &Path, target: &Path) -> UpdaterResult<Vec<PathBuf>> {
    fs::create_dir_all(target)?;
    let name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    if name.ends_with(".zip") {
        extract_zip(archive, target)
    } else if name.ends_with(".gz") {
        extract_gzip(archive, target)
    } else {
        Err(UpdaterError::Extract(format!(
            "unsupported archive format: {}",
            archive.display()
        )))
    }
}

fn extract_zip(archive: &Path, target: &Path) -> UpdaterResult<Vec<PathBuf>> {
    let mut zip = ZipArchive::new(File::open(archive)?)?;
    let mut written = Vec::new();

    for index in 0..zip.len() {
        let mut entry = zip.by_index(index)?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            UpdaterError::Extract(format!("entry '{}' escapes the target directory", entry.name()))
        })?;
        let path = target.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&path)?;
            continue;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut output = File::create(&path)?;
        io::copy(&mut entry, &mut output)?;
        written.push(path);
    }

    Ok(written)
}

fn extract_gzip(archive: &Path, target: &Path) -> UpdaterResult<Vec<PathBuf>> {
    let stem = archive
        .file_stem()
        .ok_or_else(|| UpdaterError::Extract(format!("no file name: {}", archive.display())))?;
    let path = target.join(stem);

    let mut decoder = GzDecoder::new(File::open(archive)?);
    let mut output = File::create(&path)?;
    io::copy(&mut decoder, &mut output)
        .map_err(|e| UpdaterError::Extract(format!("{}: {}", archive.display(), e)))?;

    Ok(vec![path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn write_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut writer = ZipWriter::new(File::create(path).unwrap());
        for (name, content) in entries {
            writer.start_file(*name, SimpleFileOptions::default()).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_zip_extraction_keeps_directories() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("data.zip");
        write_zip(&archive, &[("a.csv", "x,y\n1,2\n"), ("nested/b.csv", "z\n3\n")]);

        let out = dir.path().join("out");
        let mut files = extract_archive(&archive, &out).unwrap();
        files.sort();

        assert_eq!(files, vec![out.join("a.csv"), out.join("nested").join("b.csv")]);
        assert_eq!(fs::read_to_string(out.join("nested/b.csv")).unwrap(), "z\n3\n");
    }

    #[test]
    fn test_zip_slip_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        write_zip(&archive, &[("../escaped.txt", "gotcha")]);

        let result = extract_archive(&archive, &dir.path().join("out"));
        assert!(matches!(result, Err(UpdaterError::Extract(_))));
        assert!(!dir.path().join("escaped.txt").exists());
    }

    #[test]
    fn test_gzip_extraction() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("VEHICLE.csv.gz");
        let mut encoder = GzEncoder::new(File::create(&archive).unwrap(), Compression::default());
        encoder.write_all(b"id,name\n1,Corolla\n").unwrap();
        encoder.finish().unwrap();

        let files = extract_archive(&archive, &dir.path().join("out")).unwrap();
        assert_eq!(files, vec![dir.path().join("out").join("VEHICLE.csv")]);
    }

    #[test]
    fn test_unknown_format() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("data.rar");
        fs::write(&archive, b"?").unwrap();
        assert!(extract_archive(&archive, &dir.path().join("out")).is_err());
    }
}
