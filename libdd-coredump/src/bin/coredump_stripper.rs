// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0
#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]

//! Kernel core-pattern handler. Install as
//! `|/usr/sbin/coredump-stripper %p %u %g %s %t %h %e [config]` and the
//! kernel streams the full core on stdin; everything this process reports
//! goes to syslog because there is no usable stderr under that protocol.

use clap::Parser;
use libdd_coredump::{context, log, run_dump, DumpRequest};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "coredump-stripper", disable_help_flag = true)]
struct Cli {
    pid: libc::pid_t,
    uid: u32,
    gid: u32,
    signum: i32,
    timestamp: u64,
    hostname: String,
    comm: String,
    /// Overrides the default configuration file path.
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    log::init_syslog_tracing();
    context::restrict_umask();
    // prevent memory paging to swap while the crash is handled
    context::lock_process_memory();

    let argv: Vec<String> = std::env::args().collect();
    tracing::info!("argv: {}", argv.join(" "));

    let cli = match Cli::try_parse_from(argv.clone()) {
        Ok(cli) => cli,
        Err(_) => {
            tracing::error!(
                "FATAL ERROR: wrong amount of command line parameters, check /proc/sys/kernel/core_pattern"
            );
            return ExitCode::FAILURE;
        }
    };

    let request = DumpRequest {
        pid: cli.pid,
        uid: cli.uid,
        gid: cli.gid,
        signum: cli.signum,
        timestamp: cli.timestamp,
        hostname: cli.hostname,
        comm: cli.comm,
        config_path: cli.config,
    };

    let code = match run_dump(&request, &mut std::io::stdin().lock()) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("FATAL ERROR: {e:#}");
            ExitCode::FAILURE
        }
    };

    log::close_syslog();
    context::unlock_process_memory();
    code
}
