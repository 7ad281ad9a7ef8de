// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `PT_NOTE` scan locating the first `NT_PRSTATUS` record: its `pr_pid`
//! identifies the crashing thread of the streamed core.

use crate::elfcore::phdr::{walk_phdrs, PhdrAction};
use crate::error::DumpError;
use goblin::elf::program_header::PT_NOTE;
use std::mem::offset_of;

pub const NT_PRSTATUS: u32 = 1;

/// Leading fields of `struct elf_prstatus`; only `pr_pid` is consumed.
#[repr(C)]
struct PrStatusPrefix {
    pr_info: [i32; 3],
    pr_cursig: i16,
    pr_sigpend: u64,
    pr_sighold: u64,
    pr_pid: i32,
}

const PR_PID_OFFSET: usize = offset_of!(PrStatusPrefix, pr_pid);

/// Scan the note segments of the core prefix for the first `NT_PRSTATUS`
/// and return its `pr_pid`, or `None` if the core carries none.
pub fn first_prstatus_pid(data: &[u8]) -> Result<Option<i32>, DumpError> {
    let mut found = None;

    walk_phdrs(data, PT_NOTE, 0, |phdr| {
        let start = phdr.p_offset as usize;
        let end = start + phdr.p_filesz as usize;
        let Some(segment) = data.get(start..end) else {
            tracing::warn!("note segment {start:#x}..{end:#x} is outside the core prefix");
            return Ok(PhdrAction::Continue);
        };
        if let Some(pid) = scan_note_records(segment) {
            found = Some(pid);
            return Ok(PhdrAction::Stop);
        }
        Ok(PhdrAction::Continue)
    })?;

    Ok(found)
}

fn scan_note_records(segment: &[u8]) -> Option<i32> {
    let align4 = |n: usize| (n + 3) & !3;
    let mut off = 0usize;

    while off + 12 <= segment.len() {
        let word = |at: usize| {
            u32::from_ne_bytes([
                segment[at],
                segment[at + 1],
                segment[at + 2],
                segment[at + 3],
            ])
        };
        let namesz = word(off) as usize;
        let descsz = word(off + 4) as usize;
        let n_type = word(off + 8);

        let desc_start = off + 12 + align4(namesz);
        let desc_end = desc_start.checked_add(descsz)?;
        if desc_end > segment.len() {
            return None;
        }

        if n_type == NT_PRSTATUS && descsz >= PR_PID_OFFSET + 4 {
            let at = desc_start + PR_PID_OFFSET;
            return Some(i32::from_ne_bytes([
                segment[at],
                segment[at + 1],
                segment[at + 2],
                segment[at + 3],
            ]));
        }

        off = desc_start + align4(descsz);
    }

    None
}
