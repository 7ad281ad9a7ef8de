// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Error kinds of the dumper engine. Phases are independent: only core
/// creation and the initial program-header import are fatal to the dump as
/// a whole, everything else is logged and skipped by the caller.
#[derive(Debug, Error)]
pub enum DumpError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{op} failed: {source}")]
    Io {
        op: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("ELF parse failure: {0}")]
    ElfParse(String),
    #[error("symbol not found: {0}")]
    SymbolNotFound(String),
    #[error("dump data version mismatch: found {found}, expected {expected}")]
    VersionMismatch { found: i32, expected: i32 },
    #[error("no vma covers address {addr:#x}")]
    NoVma { addr: u64 },
}

impl DumpError {
    pub(crate) fn io(op: &'static str, source: std::io::Error) -> Self {
        DumpError::Io { op, source }
    }
}

impl From<goblin::error::Error> for DumpError {
    fn from(err: goblin::error::Error) -> Self {
        DumpError::ElfParse(err.to_string())
    }
}
