//! Disassembles and reassembles Intel OpenCL GPU device binaries
//!
//! The `disasm` pipeline unpacks an ELF program binary into a dump
//! directory: compiler options, IR, per kernel heaps and a line oriented
//! textual rendering of the patch token structure (`PTM.txt`). The `asm`
//! pipeline turns such a dump directory back into a program binary,
//! recomputing patch list sizes, ISA padding and per kernel checksums.

pub mod asm;
pub mod disasm;
pub mod iga;
pub mod schema;

use std::path::Path;

/// Processing failures surfaced to the CLI
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Magic mismatch, bounds violation or inconsistent layout in the input
    #[error("Invalid binary: {0}")]
    InvalidBinary(String),
    /// A required file could not be read or written
    #[error("{path}: {source}")]
    Io {
        /// The offending path
        path: String,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
    /// Assembler failure, malformed PTM input or unsupported field width
    #[error("{0}")]
    Internal(String),
}

impl CodecError {
    /// Ties an [`std::io::Error`] to the path it occurred on
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
