//! Zip packaging of pipeline output folders.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive source is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("zip error: {0}")]
    Zip(String),
}

/// Build a zip archive from the contents of a directory, recursively.
/// Entry names are relative to `src_dir`, with forward slashes.
pub fn zip_directory(src_dir: &Path, archive_path: &Path) -> Result<(), ArchiveError> {
    if !src_dir.is_dir() {
        return Err(ArchiveError::NotADirectory(src_dir.to_path_buf()));
    }

    let file = File::create(archive_path)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut pending = vec![src_dir.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
                continue;
            }
            let name = entry_name(src_dir, &path)?;
            zip.start_file(name, options)
                .map_err(|err| ArchiveError::Zip(err.to_string()))?;
            let mut source = File::open(&path)?;
            io::copy(&mut source, &mut zip)?;
        }
    }

    zip.finish()
        .map_err(|err| ArchiveError::Zip(err.to_string()))?;
    Ok(())
}

fn entry_name(root: &Path, path: &Path) -> Result<String, ArchiveError> {
    let relative = path.strip_prefix(root).map_err(|_| {
        ArchiveError::Zip(format!("entry {} escapes archive root", path.display()))
    })?;
    let mut name = String::new();
    for component in relative.components() {
        if !name.is_empty() {
            name.push('/');
        }
        name.push_str(&component.as_os_str().to_string_lossy());
    }
    Ok(name)
}
