// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Operator-selected buffers: each receipt entry names a symbol and a
//! length; `follow_ptr` additionally dereferences the symbol as a pointer
//! and captures what it points at.

use crate::context::DumpContext;

pub fn dump_interesting_buffers(ctx: &mut DumpContext) {
    for spec in ctx.recept.buffers.clone() {
        let Some(addr) = ctx.symbols.lookup(&spec.symname) else {
            tracing::warn!("unable to find recept symbol: {}", spec.symname);
            continue;
        };
        tracing::info!("found symbol: {} @ {addr:#x}", spec.symname);

        if spec.follow_ptr {
            ctx.dump_vma(
                addr,
                size_of::<u64>() as u64,
                0,
                &format!("data pointer ({})", spec.symname),
            );
            if let Ok(target) = ctx.mem.read_u64(addr) {
                ctx.dump_vma(target, spec.data_len, 0, &format!("data ({})", spec.symname));
            }
        } else {
            ctx.dump_vma(addr, spec.data_len, 0, &format!("data ({})", spec.symname));
        }
    }
}
