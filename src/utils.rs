//! Utility functions for file handling and common operations

use crate::{VarcaError, VarcaResult};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// Check if a file is gzip compressed
pub fn is_gzipped<P: AsRef<Path>>(path: P) -> VarcaResult<bool> {
    let mut file = File::open(path)?;
    let mut buffer = [0; 2];

    match file.read_exact(&mut buffer) {
        Ok(()) => Ok(buffer == [0x1f, 0x8b]),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(VarcaError::Io(e)),
    }
}

/// Open a text file for reading, transparently decompressing gzip input
pub fn open_text_reader<P: AsRef<Path>>(path: P) -> VarcaResult<Box<dyn BufRead>> {
    let file = File::open(&path)
        .map_err(|_| VarcaError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

    let reader: Box<dyn BufRead> = if is_gzipped(&path)? {
        Box::new(BufReader::new(MultiGzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    Ok(reader)
}

/// Validate file paths and check if they exist
pub fn validate_file_exists<P: AsRef<Path>>(path: P) -> VarcaResult<()> {
    if !path.as_ref().exists() {
        return Err(VarcaError::FileNotFound(
            path.as_ref().to_string_lossy().to_string(),
        ));
    }
    Ok(())
}

/// Validate that a file is readable
pub fn validate_file_readable<P: AsRef<Path>>(path: P) -> VarcaResult<()> {
    validate_file_exists(&path)?;

    File::open(&path)
        .map_err(|_| VarcaError::FileNotFound(path.as_ref().to_string_lossy().to_string()))?;

    Ok(())
}

/// Check if a path has a specific extension
pub fn has_extension<P: AsRef<Path>>(path: P, extension: &str) -> bool {
    path.as_ref()
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case(extension))
        .unwrap_or(false)
}

/// Create parent directories if they don't exist
pub fn ensure_parent_dirs<P: AsRef<Path>>(path: P) -> VarcaResult<()> {
    if let Some(parent) = path.as_ref().parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Remove an output file left behind by a failed write
pub fn discard_partial_output<P: AsRef<Path>>(path: P) {
    let path = path.as_ref();
    if path.exists() {
        match std::fs::remove_file(path) {
            Ok(()) => log::debug!("Removed incomplete output {:?}", path),
            Err(e) => log::warn!("Could not remove incomplete output {:?}: {}", path, e),
        }
    }
}

/// Format a file size in bytes to a human-readable string
pub fn format_file_size(size: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = size as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    format!("{:.2} {}", size, UNITS[unit_index])
}

/// Timer utility for measuring execution time
pub struct Timer {
    start: std::time::Instant,
    name: String,
}

impl Timer {
    pub fn new(name: &str) -> Self {
        log::info!("Starting timer: {}", name);
        Timer {
            start: std::time::Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start.elapsed()
    }

    pub fn log_elapsed(&self) {
        log::info!("Timer '{}' elapsed: {:.2?}", self.name, self.elapsed());
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.log_elapsed();
    }
}
