// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Streams the head of the kernel-delivered core to disk until its program
//! headers parse, then turns the output into a sparse file spanning all
//! loadable segments.

use crate::context::DumpContext;
use crate::elfcore::vma::parse_layout;
use anyhow::Context;
use std::io::Read;
use std::os::unix::fs::FileExt;

/// Parse attempts before giving up on the input: two pages are imported per
/// attempt, so headers must appear within the first twenty pages.
const MAX_PARSE_TRIES: usize = 10;

/// Import the source core from `src`:
///
/// 1. copy two pages to the output (and the fat core, when enabled),
/// 2. try to parse program headers from what is on disk so far,
/// 3. on failure read two more pages and retry, up to ten times,
/// 4. on success extend the output to `max(p_offset + p_filesz)` by writing
///    one zero byte at the end (the filesystem provides the hole), then copy
///    any remaining pre-segment bytes so the prefix matches the input.
pub fn import_source_core(
    ctx: &mut DumpContext,
    src: &mut impl Read,
) -> anyhow::Result<()> {
    let page = ctx.page_size;
    let mut pagebuf = vec![0u8; page];
    let mut eof = false;
    let mut parsed = false;

    for _ in 0..MAX_PARSE_TRIES {
        for _ in 0..2 {
            let n = read_full(src, &mut pagebuf).context("unable to read source core file")?;
            if n > 0 {
                write_out(ctx, &pagebuf[..n]).context("unable to write core file")?;
            }
            if n < page {
                eof = true;
                break;
            }
        }

        match parse_layout(&ctx.prefix) {
            Ok(layout) => {
                ctx.vmas = layout.vmas;
                ctx.vma_start = layout.first_offset;
                ctx.vma_end = layout.end_offset;
                parsed = true;
            }
            Err(e) => tracing::info!("source core not parsable yet: {e}"),
        }

        if parsed || eof {
            break;
        }
    }

    anyhow::ensure!(parsed, "unable to parse program headers from source core");

    // make the core big enough to fit all vma areas
    let pos = ctx.prefix.len() as u64;
    if ctx.vma_end > pos {
        if let Err(e) = ctx.core.write_all_at(&[0], ctx.vma_end - 1) {
            tracing::warn!("failed to set core size: {} bytes: {e}", ctx.vma_end);
        }
    }

    // copy the rest of the pre-segment prefix from the input
    while !eof && (ctx.prefix.len() as u64) < ctx.vma_start {
        let want = (ctx.vma_start - ctx.prefix.len() as u64).min(page as u64) as usize;
        let n = match read_full(src, &mut pagebuf[..want]) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("read source core failed at {:#x}: {e}", ctx.prefix.len());
                break;
            }
        };
        write_out(ctx, &pagebuf[..n]).context("unable to write core file")?;
        if n < want {
            break;
        }
    }

    Ok(())
}

/// Read until the buffer is full or the stream ends.
fn read_full(src: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match src.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Append imported bytes to the output core (and the fat core) and to the
/// in-memory prefix used for header parsing.
fn write_out(ctx: &mut DumpContext, data: &[u8]) -> std::io::Result<()> {
    let at = ctx.prefix.len() as u64;
    ctx.core.write_all_at(data, at)?;
    if let Some(fatcore) = &ctx.fatcore {
        if let Err(e) = fatcore.write_all_at(data, at) {
            tracing::warn!("unable to write fatcore: {e}");
        }
    }
    ctx.prefix.extend_from_slice(data);
    Ok(())
}
