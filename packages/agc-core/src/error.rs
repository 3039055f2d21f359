//! Boot-time error taxonomy (spec.md §7.1). Recoverable in-flight conditions
//! (parity fail, hardware alarms) are never `Result`s — they are state
//! transitions handled by [`crate::engine::alarms`].

use thiserror::Error;

/// Errors that can occur while loading a rope image.
#[derive(Debug, Error)]
pub enum RomLoadError {
    #[error("rope image not found: {0}")]
    NotFound(std::io::Error),
    #[error("rope image size {0} bytes is odd; expected whole 16-bit words")]
    OddSize(usize),
    #[error("rope image holds {words} words, exceeding the {max} words of fixed memory")]
    TooLarge { words: usize, max: usize },
    #[error("error reading rope image: {0}")]
    Read(std::io::Error),
}

/// Errors that can occur while loading an optional core-dump.
#[derive(Debug, Error)]
pub enum DumpLoadError {
    #[error("core-dump file not found: {0}")]
    NotFound(std::io::Error),
    #[error("error reading core-dump: {0}")]
    Read(std::io::Error),
    #[error("core-dump truncated: expected at least {expected} octal words, found {found}")]
    Truncated { expected: usize, found: usize },
    #[error("core-dump contains a token that is not a valid octal word: {0:?}")]
    BadOctal(String),
}
