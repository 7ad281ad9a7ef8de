// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! One-shot dump sequencing: receipt resolution, core import, then the
//! independent capture phases. Only core creation and the header import are
//! fatal; every other phase logs its failures and the dump carries on.

use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::context::{DumpContext, DumpRequest};
use crate::elfcore::importer::import_source_core;
use crate::{buffers, dump_data, maps, procfs, solib, threads};
use anyhow::Context;
use std::io::Read;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DumpOutcome {
    Completed,
    /// No watch entry matched the dying process; nothing was written.
    NoReceipt,
}

pub fn run_dump(request: &DumpRequest, src: &mut impl Read) -> anyhow::Result<DumpOutcome> {
    let config_path = request
        .config_path
        .clone()
        .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_PATH).to_path_buf());
    if request.config_path.is_some() {
        tracing::info!("using own cfg: {}", config_path.display());
    }
    let config = Config::load(&config_path).context("unable to init config")?;

    let exe = std::fs::read_link(format!("/proc/{}/exe", request.pid))
        .with_context(|| format!("readlink on /proc/{}/exe failed", request.pid))?;

    tracing::info!("comm: {}", request.comm);
    tracing::info!("exe: {}", exe.display());

    let Some(recept) = config.select_receipt(&request.comm, &exe.to_string_lossy()) else {
        tracing::info!(
            "no watch for comm={} exe={}",
            request.comm,
            exe.display()
        );
        return Ok(DumpOutcome::NoReceipt);
    };
    tracing::info!("recept: {recept:?}");

    let mut ctx = DumpContext::new(request, exe, recept.clone(), &config.base_dir)?;
    ctx.init_debug_log();

    // dump up until the first vma
    import_source_core(&mut ctx, src).context("unable to initialize core")?;
    ctx.log_vmas();

    if ctx.recept.write_proc_info {
        procfs::write_proc_info(&ctx.dst_dir, ctx.pid, &ctx.tasks);
    }

    // needed for every symbol lookup below; also dumps the auxv chains
    // when configured
    solib::load_shared_objects(&mut ctx);

    if ctx.recept.stack.dump_stacks {
        threads::stacks::dump_stacks(&mut ctx);
    }

    if ctx.recept.dump_pthread_list {
        threads::pthread::dump_pthread_list(&mut ctx);
    }

    if ctx.recept.dump_robust_mutex_list {
        threads::robust::dump_robust_mutex_list(&mut ctx);
    }

    if !ctx.recept.maps.name_globs.is_empty() {
        maps::dump_maps(&mut ctx);
    }

    buffers::dump_interesting_buffers(&mut ctx);

    if let Err(e) = dump_data::dump_registered_data(&mut ctx) {
        tracing::info!("registered application data not dumped: {e}");
    }

    if ctx.recept.dump_fat_core {
        ctx.dump_fat_core();
    }

    if ctx.recept.live_dumper {
        // the notification bus is an external collaborator; nothing is
        // compiled in here
        tracing::info!("live dumper notification requested, no bus available");
    }

    Ok(DumpOutcome::Completed)
}
