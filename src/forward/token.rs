//! Bearer token loading and validation.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

/// Errors raised while reading or validating a bearer token.
#[derive(Debug, Error)]
pub enum TokenError {
    /// The token source has no first line at all.
    #[error("first line of bearer token source is empty")]
    EmptySource,

    /// The token is blank after trimming or contains non-ASCII bytes.
    #[error("bearer token must be non-empty ASCII")]
    InvalidToken,

    #[error("failed to read bearer token: {0}")]
    Io(#[from] std::io::Error),
}

/// Read the first line of `reader` as raw token material.
///
/// Returns [`TokenError::EmptySource`] when the source holds no bytes. A
/// present but blank first line is returned as-is and rejected later by
/// [`validate_token`].
pub fn read_bearer_token<R: BufRead>(mut reader: R) -> Result<String, TokenError> {
    let mut line = Vec::new();
    if reader.read_until(b'\n', &mut line)? == 0 {
        return Err(TokenError::EmptySource);
    }
    let line = line.strip_suffix(b"\n").unwrap_or(&line);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    // Invalid UTF-8 turns into replacement characters, which fail the ASCII check.
    Ok(String::from_utf8_lossy(line).into_owned())
}

/// Read raw token material from the file at `path`.
pub fn read_bearer_file(path: &Path) -> Result<String, TokenError> {
    let file = File::open(path)?;
    read_bearer_token(BufReader::new(file))
}

/// Trim `raw` and check it can be sent as a bearer credential.
pub fn validate_token(raw: &str) -> Result<String, TokenError> {
    let token = raw.trim();
    if token.is_empty() || !token.is_ascii() {
        return Err(TokenError::InvalidToken);
    }
    Ok(token.to_string())
}
