// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The VMA model of the core: one entry per readable loadable segment.
//! Every selective write into the sparse core resolves through this table.

use crate::elfcore::phdr::{walk_phdrs, PhdrAction};
use crate::error::DumpError;
use goblin::elf::program_header::{PF_R, PT_LOAD};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreVma {
    /// Start virtual address in the target.
    pub start: u64,
    /// `start + p_filesz`; bytes past this have no backing in the core file.
    pub file_end: u64,
    /// `start + p_memsz`.
    pub mem_end: u64,
    /// File offset of the segment within the core.
    pub file_off: u64,
    pub flags: u32,
}

/// VMA table plus the file-offset span of all loadable segments.
#[derive(Debug, Clone)]
pub struct CoreLayout {
    pub vmas: Vec<CoreVma>,
    /// Lowest `p_offset`: everything before it is header/note prefix that is
    /// copied verbatim from the source core.
    pub first_offset: u64,
    /// Highest `p_offset + p_filesz`: the size of the sparse core.
    pub end_offset: u64,
}

/// Parse the readable loadable segments out of a (possibly partial) core
/// image. Fails if no usable segment is present yet.
pub fn parse_layout(data: &[u8]) -> Result<CoreLayout, DumpError> {
    let mut vmas = Vec::new();

    walk_phdrs(data, PT_LOAD, PF_R, |phdr| {
        vmas.push(CoreVma {
            start: phdr.p_vaddr,
            file_end: phdr.p_vaddr + phdr.p_filesz,
            mem_end: phdr.p_vaddr + phdr.p_memsz,
            file_off: phdr.p_offset,
            flags: phdr.p_flags,
        });
        Ok(PhdrAction::Continue)
    })?;

    let first_offset = vmas.iter().map(|v| v.file_off).min();
    let end_offset = vmas
        .iter()
        .map(|v| v.file_off + (v.file_end - v.start))
        .max();

    match (first_offset, end_offset) {
        (Some(first_offset), Some(end_offset)) if end_offset > 0 => Ok(CoreLayout {
            vmas,
            first_offset,
            end_offset,
        }),
        _ => Err(DumpError::ElfParse(
            "no readable loadable segments".into(),
        )),
    }
}

/// At most one VMA satisfies `start <= addr < mem_end`.
pub fn find_vma(vmas: &[CoreVma], addr: u64) -> Option<&CoreVma> {
    vmas.iter().find(|v| addr >= v.start && addr < v.mem_end)
}

/// File offset inside the core backing the given target address.
pub fn core_pos(vmas: &[CoreVma], addr: u64) -> Option<u64> {
    find_vma(vmas, addr).map(|v| v.file_off + (addr - v.start))
}

/// Apply the balloon expansion and clip the range to the part of the VMA
/// that is backed by the core file. Returns the final `[start, end)`.
pub(crate) fn clip_to_vma(
    vma: &CoreVma,
    start: u64,
    len: u64,
    balloon: u64,
) -> Option<(u64, u64)> {
    let mut s = start;
    let mut e = start + len;

    if balloon > 0 {
        s = s.saturating_sub(balloon);
        e = e.saturating_add(balloon);
    }

    s = s.max(vma.start);
    e = e.min(vma.file_end);

    (s < e).then_some((s, e))
}
