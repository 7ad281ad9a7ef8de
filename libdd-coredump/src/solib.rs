// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Shared-object discovery: `/proc/<pid>/auxv` gives the target's program
//! headers, `DT_DEBUG` gives `r_debug`, and the `link_map` chain names every
//! loaded object. Each object feeds the symbol registry; optionally every
//! byte examined along the way is also dumped so a debugger can chase the
//! same chains inside the stripped core.

use crate::context::DumpContext;
use crate::error::DumpError;
use std::mem::offset_of;
use std::path::Path;

/// glibc's `struct link_map`, public prefix.
#[repr(C)]
struct LinkMap {
    l_addr: u64,
    l_name: u64,
    l_ld: u64,
    l_next: u64,
    l_prev: u64,
}

/// glibc's `struct r_debug`.
#[repr(C)]
struct RDebug {
    r_version: i32,
    r_map: u64,
    r_brk: u64,
    r_state: i32,
    r_ldbase: u64,
}

const PHDR_SIZE: u64 = 56; // Elf64_Phdr
const PHDR_TYPE_OFFSET: u64 = 0;
const PHDR_VADDR_OFFSET: u64 = 16;
const DYN_SIZE: u64 = 16; // Elf64_Dyn
const DYN_VAL_OFFSET: u64 = 8;

const PT_PHDR: u32 = 6;
const PT_DYNAMIC: u32 = 2;
const DT_NULL: u32 = 0;
const DT_DEBUG: u32 = 21;

/// Register the executable and every shared object in the target's
/// `link_map` chain with the symbol registry. Failures leave the registry
/// partially filled; later symbol lookups simply miss.
pub fn load_shared_objects(ctx: &mut DumpContext) {
    if let Err(e) = discover(ctx) {
        tracing::warn!("shared object discovery failed: {e}");
    }
}

fn discover(ctx: &mut DumpContext) -> Result<(), DumpError> {
    // The executable itself resolves at load base 0.
    let exe = ctx.exe.clone();
    if let Err(e) = ctx.symbols.register_file(&exe, 0) {
        tracing::warn!("unable to read executable symbols: {e}");
    }

    let auxv = std::fs::read(format!("/proc/{}/auxv", ctx.pid))
        .map_err(|e| DumpError::io("read auxv", e))?;

    let debug_ptr = r_debug_from_auxv(ctx, &auxv)?;
    if debug_ptr == 0 {
        return Ok(());
    }

    if ctx.recept.dump_auxv_so_list {
        ctx.dump_vma(debug_ptr, size_of::<RDebug>() as u64, 0, "auxv r_debug");
    }

    let mut map_ptr = ctx
        .mem
        .read_u64(debug_ptr + offset_of!(RDebug, r_map) as u64)?;

    while map_ptr != 0 {
        if ctx.recept.dump_auxv_so_list {
            ctx.dump_vma(map_ptr, size_of::<LinkMap>() as u64, 0, "auxv link_map");
        }

        let name_ptr = ctx
            .mem
            .read_u64(map_ptr + offset_of!(LinkMap, l_name) as u64)?;

        if let Ok(name) = ctx.mem.read_string(name_ptr) {
            let name = name.to_string_lossy().into_owned();
            if ctx.recept.dump_auxv_so_list && !name.is_empty() {
                // terminator not dumped: sparse core data is already 0
                ctx.dump_vma(
                    name_ptr,
                    name.len() as u64,
                    0,
                    &format!("auxv link_map name ({name})"),
                );
            }
            if !name.is_empty() {
                let load_base = ctx
                    .mem
                    .read_u64(map_ptr + offset_of!(LinkMap, l_addr) as u64)?;
                if let Err(e) = ctx.symbols.register_file(Path::new(&name), load_base) {
                    tracing::warn!("skipping shared object {name}: {e}");
                }
            }
        }

        map_ptr = ctx
            .mem
            .read_u64(map_ptr + offset_of!(LinkMap, l_next) as u64)?;
    }

    Ok(())
}

/// Locate the `r_debug` pointer: find `PT_PHDR` (for the executable's
/// relocation) and `PT_DYNAMIC` among the target's program headers, then
/// walk the dynamic section to `DT_DEBUG`.
fn r_debug_from_auxv(ctx: &mut DumpContext, auxv: &[u8]) -> Result<u64, DumpError> {
    let phdr_addr = auxv_value(auxv, libc::AT_PHDR);
    let phnum = auxv_value(auxv, libc::AT_PHNUM).unwrap_or(0);

    let Some(phdr_addr) = phdr_addr.filter(|a| *a != 0) else {
        return Err(DumpError::ElfParse("auxv carries no AT_PHDR".into()));
    };

    let mut relocation = None;
    let mut dyn_vaddr = None;

    for i in 0..phnum {
        let entry = phdr_addr + i * PHDR_SIZE;
        let p_type = ctx.mem.read_u32(entry + PHDR_TYPE_OFFSET)?;
        if ctx.recept.dump_auxv_so_list {
            ctx.dump_vma(entry + PHDR_TYPE_OFFSET, 4, 0, "auxv phdr type");
        }

        if p_type == PT_PHDR {
            let vaddr = ctx.mem.read_u64(entry + PHDR_VADDR_OFFSET)?;
            if ctx.recept.dump_auxv_so_list {
                ctx.dump_vma(entry + PHDR_VADDR_OFFSET, 8, 0, "auxv relocation");
            }
            relocation = Some(phdr_addr - vaddr);
        } else if p_type == PT_DYNAMIC {
            let vaddr = ctx.mem.read_u64(entry + PHDR_VADDR_OFFSET)?;
            if ctx.recept.dump_auxv_so_list {
                ctx.dump_vma(entry + PHDR_VADDR_OFFSET, 8, 0, "auxv dynamic");
            }
            dyn_vaddr = Some(vaddr);
            break;
        }
    }

    let (Some(relocation), Some(dyn_vaddr)) = (relocation, dyn_vaddr) else {
        return Err(DumpError::ElfParse(
            "target carries no PT_PHDR/PT_DYNAMIC pair".into(),
        ));
    };
    if dyn_vaddr == 0 {
        return Err(DumpError::ElfParse("empty PT_DYNAMIC".into()));
    }

    let dyn_addr = dyn_vaddr.wrapping_add(relocation);
    for i in 0.. {
        let entry = dyn_addr + i * DYN_SIZE;
        let d_tag = ctx.mem.read_u32(entry)?;
        if ctx.recept.dump_auxv_so_list {
            ctx.dump_vma(entry, 4, 0, "auxv dtag");
        }

        if d_tag == DT_NULL {
            break;
        }
        if d_tag == DT_DEBUG {
            let debug_ptr = ctx.mem.read_u64(entry + DYN_VAL_OFFSET)?;
            if ctx.recept.dump_auxv_so_list {
                ctx.dump_vma(entry + DYN_VAL_OFFSET, 8, 0, "auxv debug ptr");
            }
            return Ok(debug_ptr);
        }
    }

    Err(DumpError::ElfParse("dynamic section carries no DT_DEBUG".into()))
}

fn auxv_value(auxv: &[u8], a_type: u64) -> Option<u64> {
    for pair in auxv.chunks_exact(16) {
        let key = u64::from_ne_bytes(pair[..8].try_into().ok()?);
        if key == 0 {
            break; // AT_NULL
        }
        if key == a_type {
            return Some(u64::from_ne_bytes(pair[8..].try_into().ok()?));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::self_context;

    #[test]
    fn auxv_value_scans_pairs() {
        let mut auxv = Vec::new();
        for (k, v) in [(3u64, 0x1000u64), (5, 9), (0, 0), (3, 0xdead)] {
            auxv.extend_from_slice(&k.to_ne_bytes());
            auxv.extend_from_slice(&v.to_ne_bytes());
        }
        assert_eq!(auxv_value(&auxv, 3), Some(0x1000));
        assert_eq!(auxv_value(&auxv, 5), Some(9));
        // entries past AT_NULL are ignored
        assert_eq!(auxv_value(&auxv, 7), None);
    }

    #[test]
    fn struct_offsets_match_glibc() {
        assert_eq!(offset_of!(RDebug, r_map), 8);
        assert_eq!(offset_of!(LinkMap, l_name), 8);
        assert_eq!(offset_of!(LinkMap, l_next), 24);
        assert_eq!(size_of::<LinkMap>(), 40);
    }

    /// The test process is its own target: chase our auxv through the
    /// dynamic section and the live link_map chain.
    #[test]
    fn discovers_own_link_map_chain() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = tempfile::tempfile().expect("core");
        let mut ctx = self_context(dir.path(), core, Vec::new());

        discover(&mut ctx).expect("discover");
        assert!(!ctx.symbols.is_empty());
    }
}
