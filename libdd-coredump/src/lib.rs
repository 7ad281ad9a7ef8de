// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

//! Core-pattern handler engine: reads one ELF core from the kernel, writes
//! a stripped sparse core plus selective memory extracts, and exits. The
//! companion injector reverses the extraction.

pub mod buffers;
pub mod config;
pub mod context;
pub mod dump_data;
pub mod dumper;
pub mod elfcore;
pub mod error;
pub mod inject;
pub mod log;
pub mod maps;
pub mod mem;
pub mod procfs;
pub mod solib;
pub mod symbol_map;
pub mod symbols;
pub mod threads;

pub use config::{Config, Receipt};
pub use context::{DumpContext, DumpRequest};
pub use dump_data::descriptor::DUMP_DATA_VERSION;
pub use dumper::{run_dump, DumpOutcome};
pub use error::DumpError;
