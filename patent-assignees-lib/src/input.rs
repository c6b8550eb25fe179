//! Reading the identifier list.

use crate::error::FetchError;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Read identifiers from a newline-delimited file.
///
/// Lines are trimmed. Blank lines and lines starting with `#` are skipped;
/// every other line is taken verbatim as one identifier, duplicates
/// included.
///
/// # Errors
///
/// Returns `FetchError::File` if the file cannot be opened or read.
pub fn read_identifiers<P: AsRef<Path>>(path: P) -> Result<Vec<String>, FetchError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        FetchError::file_error(
            path.to_string_lossy(),
            format!("Failed to open identifier file: {}", e),
        )
    })?;

    parse_identifiers(BufReader::new(file)).map_err(|e| match e {
        FetchError::File { message, .. } => FetchError::file_error(path.to_string_lossy(), message),
        other => other,
    })
}

/// Parse identifiers from any buffered reader. See [`read_identifiers`].
pub fn parse_identifiers<R: BufRead>(reader: R) -> Result<Vec<String>, FetchError> {
    let mut identifiers = Vec::new();

    for (line_num, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| {
            FetchError::file_error("<input>", format!("line {}: {}", line_num + 1, e))
        })?;
        let trimmed = line.trim();

        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        identifiers.push(trimmed.to_string());
    }

    Ok(identifiers)
}
