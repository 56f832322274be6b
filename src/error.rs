//! Error types for topology synthesis.
//!
//! All core errors are deterministic and reproducible given the same
//! inputs. None of them are recovered locally: silent recovery would
//! produce an inconsistent topology, so the first failure aborts the
//! whole synthesis run.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the synthesis engine.
#[derive(Debug, Error)]
pub enum TopoError {
    /// Invalid parameters, guardrail violation, bad CIDR, unknown
    /// template or device. Raised before any object is created.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An address pool cursor ran out of space. Fatal for the run.
    #[error("address space exhausted: {0}")]
    AddressExhausted(String),

    /// A remote controller call failed (live mode only). No retry,
    /// no rollback of objects created so far.
    #[error("controller transport error: {0}")]
    Transport(String),

    /// The offline output path already exists and overwriting was not
    /// permitted.
    #[error("refusing to overwrite existing file: {0} (pass --overwrite to replace it)")]
    OutputConflict(PathBuf),

    /// Filesystem error while writing the offline document.
    #[error("output i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TopoError>;
