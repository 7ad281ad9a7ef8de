// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Application-registered dump data. The target exposes a versioned,
//! singly-linked list of descriptors; each one either enriches the sparse
//! core in place or produces a named artifact under `dumps/`.

pub mod descriptor;
pub mod format;

use crate::context::DumpContext;
use crate::error::DumpError;
use crate::symbol_map::{self, MapEntry, MapEntryKind};
use descriptor::{
    resolve_elem, Descriptor, RawDumpDesc, DUMP_DATA_VERSION, MCD_TYPE_BIN,
};
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::DirBuilderExt;

/// Walk the target's registered dump descriptors. Bails out of the phase on
/// a missing contract symbol or a version mismatch; a failing descriptor is
/// logged and skipped.
pub fn dump_registered_data(ctx: &mut DumpContext) -> Result<(), DumpError> {
    let Some(version_addr) = ctx.symbols.lookup("mcd_dump_data_version") else {
        tracing::info!("no dump data version found");
        return Err(DumpError::SymbolNotFound("mcd_dump_data_version".into()));
    };
    let version = ctx.mem.read_i32(version_addr)?;
    if version != DUMP_DATA_VERSION {
        tracing::info!(
            "dump data version mismatch: found {version}, expected {DUMP_DATA_VERSION}"
        );
        return Err(DumpError::VersionMismatch {
            found: version,
            expected: DUMP_DATA_VERSION,
        });
    }

    let Some(head_addr) = ctx.symbols.lookup("mcd_dump_data_head") else {
        tracing::info!("no dump data found");
        return Err(DumpError::SymbolNotFound("mcd_dump_data_head".into()));
    };
    let mut desc_addr = ctx.mem.read_u64(head_addr)?;
    if desc_addr == 0 {
        tracing::info!("no registered variables");
        return Ok(());
    }

    tracing::info!("found registered variables");

    while desc_addr != 0 {
        let raw: RawDumpDesc = match ctx.mem.read_pod(desc_addr) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!("unreadable dump descriptor at {desc_addr:#x}: {e}");
                break;
            }
        };
        let this_addr = desc_addr;
        desc_addr = raw.next;

        // abort if we should ignore this dump
        if raw.dump_scope > ctx.recept.dump_scope {
            continue;
        }

        let desc = match Descriptor::fetch(ctx, &raw) {
            Ok(desc) => desc,
            Err(e) => {
                tracing::warn!("skipping dump descriptor at {this_addr:#x}: {e}");
                continue;
            }
        };

        let result = match &desc.ident {
            Some(ident) => dump_to_file(ctx, &desc, &ident.clone()),
            None => dump_to_core(ctx, &desc),
        };
        if let Err(e) = result {
            tracing::warn!("dump descriptor at {this_addr:#x} failed: {e}");
        }
    }

    Ok(())
}

/// A descriptor without an identifier enriches the core itself: each
/// element's bytes land at their home addresses, and captured indirection
/// pointers land in their slots.
fn dump_to_core(ctx: &mut DumpContext, desc: &Descriptor) -> Result<(), DumpError> {
    for elem in &desc.elems {
        let (slot, addr, length) = resolve_elem(ctx, elem)?;

        if let Some(slot) = slot {
            ctx.dump_vma(slot, size_of::<u64>() as u64, 0, "data pointer");
        }
        ctx.dump_vma(addr, length, 0, "data");
    }
    Ok(())
}

/// A descriptor with an identifier appends to `dumps/<ident>`, binary or
/// text depending on its type.
fn dump_to_file(ctx: &mut DumpContext, desc: &Descriptor, ident: &str) -> Result<(), DumpError> {
    let dumps_dir = ctx.dst_dir.join("dumps");
    let _ = std::fs::DirBuilder::new().mode(0o700).create(&dumps_dir);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dumps_dir.join(ident))
        .map_err(|e| DumpError::io("open dump file", e))?;

    if desc.dump_type == MCD_TYPE_BIN {
        write_binary_dump(ctx, &mut file, desc, ident)
    } else {
        let Some(fmt) = &desc.fmt else {
            return Err(DumpError::io(
                "text dump without format",
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            ));
        };
        format::write_text_dump(ctx, &mut file, fmt, &desc.elems)
    }
}

/// Binary dumps carry a single element. Layout of the artifact: when the
/// data pointer is indirect, the captured pointer value (native width)
/// precedes the payload. Symbol-map rows record where the same bytes live
/// in the core so the injector can put edited values back.
fn write_binary_dump(
    ctx: &mut DumpContext,
    file: &mut std::fs::File,
    desc: &Descriptor,
    ident: &str,
) -> Result<(), DumpError> {
    let Some(elem) = desc.elems.first() else {
        tracing::warn!("binary dump '{ident}' carries no element");
        return Ok(());
    };

    let (slot, addr, length) = resolve_elem(ctx, elem)?;
    let data = ctx.mem.read_bytes(addr, length as usize)?;
    let write_err = |e| DumpError::io("write binary dump", e);

    if let Some(slot) = slot {
        file.write_all(&addr.to_ne_bytes()).map_err(write_err)?;
        if let Some(core_offset) = ctx.get_core_pos(slot) {
            append_map_entry(
                ctx,
                MapEntry {
                    core_offset,
                    size: size_of::<u64>() as u64,
                    kind: MapEntryKind::Indirect,
                    ident: ident.to_string(),
                },
            );
        }
    }

    file.write_all(&data).map_err(write_err)?;
    if let Some(core_offset) = ctx.get_core_pos(addr) {
        append_map_entry(
            ctx,
            MapEntry {
                core_offset,
                size: length,
                kind: MapEntryKind::Direct,
                ident: ident.to_string(),
            },
        );
    }

    Ok(())
}

fn append_map_entry(ctx: &DumpContext, entry: MapEntry) {
    if let Err(e) = symbol_map::append_entry(&ctx.dst_dir, &entry) {
        tracing::warn!("unable to append symbol map entry for '{}': {e}", entry.ident);
    }
}
