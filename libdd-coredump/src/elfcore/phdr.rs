// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Program-header walk over the (possibly still partial) on-disk core.

use crate::error::DumpError;
use goblin::elf::{Elf, ProgramHeader};

/// Visitor verdict for [`walk_phdrs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhdrAction {
    Continue,
    Stop,
}

/// Iterate program headers matching `p_type` exactly and carrying at least
/// the `p_flags` bits (0 matches any flags). Returns whether a visitor
/// stopped the walk early.
pub fn walk_phdrs<F>(
    data: &[u8],
    p_type: u32,
    p_flags: u32,
    mut visit: F,
) -> Result<bool, DumpError>
where
    F: FnMut(&ProgramHeader) -> Result<PhdrAction, DumpError>,
{
    let elf = Elf::parse(data)?;

    if elf.program_headers.is_empty() {
        return Err(DumpError::ElfParse("no program headers".into()));
    }

    for phdr in &elf.program_headers {
        if phdr.p_type != p_type {
            continue;
        }
        if p_flags != 0 && (phdr.p_flags & p_flags) != p_flags {
            continue;
        }
        if visit(phdr)? == PhdrAction::Stop {
            return Ok(true);
        }
    }

    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elfcore::vma::test_support::synthetic_core;
    use goblin::elf::program_header::{PF_R, PT_LOAD};

    #[test]
    fn walk_filters_by_type_and_flags() {
        let core = synthetic_core(&[
            (0x40_0000, 0x1000, 0x1000, PF_R),
            (0x60_0000, 0x2000, 0x2000, PF_R | goblin::elf::program_header::PF_W),
        ]);
        let mut seen = Vec::new();
        let stopped = walk_phdrs(&core, PT_LOAD, PF_R, |phdr| {
            seen.push(phdr.p_vaddr);
            Ok(PhdrAction::Continue)
        })
        .expect("walk");
        assert!(!stopped);
        assert_eq!(seen, vec![0x40_0000, 0x60_0000]);
    }

    #[test]
    fn walk_stops_on_request() {
        let core = synthetic_core(&[
            (0x40_0000, 0x1000, 0x1000, PF_R),
            (0x60_0000, 0x2000, 0x2000, PF_R),
        ]);
        let mut seen = 0;
        let stopped = walk_phdrs(&core, PT_LOAD, PF_R, |_| {
            seen += 1;
            Ok(PhdrAction::Stop)
        })
        .expect("walk");
        assert!(stopped);
        assert_eq!(seen, 1);
    }

    #[test]
    fn truncated_header_is_a_parse_error() {
        let core = synthetic_core(&[(0x40_0000, 0x1000, 0x1000, PF_R)]);
        let result = walk_phdrs(&core[..70], PT_LOAD, 0, |_| Ok(PhdrAction::Continue));
        assert!(result.is_err());
    }
}
