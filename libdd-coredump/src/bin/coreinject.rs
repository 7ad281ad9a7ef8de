// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Injects binary data dumped by the handler back into a stripped core.
//! Required inputs: the core, its `symbol.map`, and the binary dump files.

use clap::Parser;
use libdd_coredump::inject::inject_all;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "coreinject")]
struct Cli {
    core: PathBuf,
    symbol_map: PathBuf,
    #[arg(required = true)]
    binary_dumps: Vec<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match inject_all(&cli.core, &cli.symbol_map, &cli.binary_dumps) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
