// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Mapped-file capture: readable `/proc/<pid>/maps` entries whose pathname
//! matches a receipt glob are dumped whole.

use crate::config::glob_match;
use crate::context::DumpContext;

pub fn dump_maps(ctx: &mut DumpContext) {
    let maps = match std::fs::read_to_string(format!("/proc/{}/maps", ctx.pid)) {
        Ok(maps) => maps,
        Err(e) => {
            tracing::warn!("unable to read maps for {}: {e}", ctx.pid);
            return;
        }
    };

    for line in maps.lines() {
        let Some((start, end, name)) = parse_readable_entry(line) else {
            continue;
        };
        if !ctx.recept.maps.name_globs.iter().any(|g| glob_match(g, name)) {
            continue;
        }
        let name = name.to_string();
        ctx.dump_vma(start, end - start, 0, &name);
    }
}

/// `(start, end, pathname)` of a readable maps entry with a pathname; the
/// pathname is the tail of the line (it may contain spaces).
fn parse_readable_entry(line: &str) -> Option<(u64, u64, &str)> {
    let (range, rest) = line.split_once(' ')?;
    let (start, end) = range.split_once('-')?;
    let start = u64::from_str_radix(start, 16).ok()?;
    let end = u64::from_str_radix(end, 16).ok()?;

    let mut fields = rest.splitn(5, ' ');
    let perms = fields.next()?;
    if !perms.starts_with('r') {
        return None;
    }
    fields.next()?; // offset
    fields.next()?; // dev
    fields.next()?; // inode
    let name = fields.next()?.trim_start_matches(' ').trim_end_matches(['\r', '\n']);
    if name.is_empty() {
        return None;
    }

    Some((start, end, name))
}
