//! `.bak` copies of converted PDFs and cleanup of export directories

use crate::PdfError;
use std::fs;
use std::path::{Path, PathBuf};

/// `<file>.bak` for a given file
pub fn backup_path<P: AsRef<Path>>(path: P) -> PathBuf {
    let mut name = path.as_ref().as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

/// Back up `path` before it is modified.
///
/// An existing backup is treated as the pristine original and copied over
/// `path`, so repeated conversions always start from the same input.
pub fn backup<P: AsRef<Path>>(path: P) -> Result<(), PdfError> {
    let path = path.as_ref();
    let bak = backup_path(path);
    if bak.is_file() {
        log::info!("Found backup pdf. Using the bak as input instead.");
        fs::copy(&bak, path)?;
    } else {
        fs::copy(path, &bak)?;
    }
    Ok(())
}

/// Move `<path>.bak` back over `path`; returns whether a backup existed
pub fn restore<P: AsRef<Path>>(path: P) -> Result<bool, PdfError> {
    let path = path.as_ref();
    let bak = backup_path(path);
    if !bak.is_file() {
        log::info!("Bak file for '{}' does not exist.", path.display());
        return Ok(false);
    }
    fs::rename(&bak, path)?;
    Ok(true)
}

/// Restore from a path that is itself the `.bak` file
pub fn restore_from_bak<P: AsRef<Path>>(bak_path: P) -> Result<bool, PdfError> {
    let bak_path = bak_path.as_ref();
    if !bak_path.is_file() || bak_path.extension().map_or(true, |e| e != "bak") {
        return Ok(false);
    }
    fs::rename(bak_path, bak_path.with_extension(""))?;
    Ok(true)
}

/// Delete the backup of `path`; returns whether one was removed
pub fn clean_up<P: AsRef<Path>>(path: P) -> Result<bool, PdfError> {
    let bak = backup_path(path);
    if bak.is_file() {
        log::debug!("Deleting {}", bak.display());
        fs::remove_file(&bak)?;
        return Ok(true);
    }
    Ok(false)
}

/// Delete the export directory that sits next to a PDF
pub fn remove_annotation_dir<P: AsRef<Path>>(pdf_path: P) -> Result<bool, PdfError> {
    let dir = pdf_path.as_ref().with_extension("");
    if dir.is_dir() {
        log::debug!("Deleting annot dir {}", dir.display());
        fs::remove_dir_all(&dir)?;
        return Ok(true);
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_restore_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        fs::write(&pdf, b"original").unwrap();

        backup(&pdf).unwrap();
        assert_eq!(fs::read(backup_path(&pdf)).unwrap(), b"original");

        // A second backup reuses the pristine copy as input
        fs::write(&pdf, b"annotated").unwrap();
        backup(&pdf).unwrap();
        assert_eq!(fs::read(&pdf).unwrap(), b"original");

        fs::write(&pdf, b"annotated").unwrap();
        assert!(restore(&pdf).unwrap());
        assert_eq!(fs::read(&pdf).unwrap(), b"original");
        assert!(!restore(&pdf).unwrap());
    }

    #[test]
    fn test_restore_from_bak_and_clean() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        fs::write(&pdf, b"new").unwrap();
        fs::write(backup_path(&pdf), b"old").unwrap();

        assert!(restore_from_bak(backup_path(&pdf)).unwrap());
        assert_eq!(fs::read(&pdf).unwrap(), b"old");

        fs::write(backup_path(&pdf), b"old").unwrap();
        assert!(clean_up(&pdf).unwrap());
        assert!(!backup_path(&pdf).exists());
        assert!(!clean_up(&pdf).unwrap());
    }

    #[test]
    fn test_remove_annotation_dir() {
        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("book.pdf");
        fs::create_dir(dir.path().join("book")).unwrap();
        fs::write(dir.path().join("book/book-annotation.txt"), b"x").unwrap();
        assert!(remove_annotation_dir(&pdf).unwrap());
        assert!(!dir.path().join("book").exists());
    }
}
