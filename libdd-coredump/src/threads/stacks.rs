// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-thread stack capture. Stacks grow down, so the lived portion of a
//! stack is `[sp, vma.file_end)`.

use crate::context::DumpContext;
use crate::elfcore::note::first_prstatus_pid;
use crate::elfcore::vma::find_vma;
use crate::procfs;

pub fn dump_stacks(ctx: &mut DumpContext) {
    if ctx.recept.stack.first_thread_only {
        match first_prstatus_pid(&ctx.prefix) {
            Ok(Some(pid)) => ctx.first_pid = pid,
            Ok(None) => {}
            Err(e) => tracing::warn!("NT_PRSTATUS scan failed: {e}"),
        }
    }

    if ctx.first_pid != 0 {
        tracing::info!("first thread: {}", ctx.first_pid);
    }

    for i in 0..ctx.tasks.len() {
        let tid = ctx.tasks[i];

        // restrict to the crashing thread when requested and known
        if ctx.first_pid != 0 && ctx.first_pid != tid {
            continue;
        }

        let sp = match procfs::stack_pointer(ctx.pid, tid) {
            Ok(sp) => sp,
            Err(_) => {
                tracing::warn!("unable to find thread #{}'s ({tid}) stack pointer", i + 1);
                continue;
            }
        };

        let Some(file_end) = find_vma(&ctx.vmas, sp).map(|v| v.file_end) else {
            tracing::warn!("unable to find thread #{}'s ({tid}) stack", i + 1);
            continue;
        };

        let len = lived_stack_len(sp, file_end, ctx.recept.stack.max_stack_size, tid);
        ctx.dump_vma(sp, len, 0, &format!("stack[{tid}]"));
    }
}

/// Length of the in-use stack region, truncated to `max_len` when set.
fn lived_stack_len(sp: u64, file_end: u64, max_len: u64, tid: libc::pid_t) -> u64 {
    let len = file_end.saturating_sub(sp);
    if max_len > 0 && len > max_len {
        tracing::warn!("stack[{tid}] is too large ({len} bytes), truncating to {max_len} bytes");
        return max_len;
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::self_context;
    use std::os::unix::fs::FileExt;

    #[test]
    fn lived_stack_is_sp_to_file_end() {
        assert_eq!(lived_stack_len(0x7f00_0008_0000, 0x7f00_0010_0000, 0, 1), 0x8_0000);
        // sp past file_end (stack bytes not in the core) yields nothing
        assert_eq!(lived_stack_len(0x7f00_0010_0000, 0x7f00_000f_0000, 0, 1), 0);
    }

    #[test]
    fn lived_stack_truncates_to_max() {
        assert_eq!(lived_stack_len(0x7f00_0008_0000, 0x7f00_0010_0000, 0x1000, 1), 0x1000);
        // limit larger than the lived range leaves it alone
        assert_eq!(
            lived_stack_len(0x7f00_0008_0000, 0x7f00_0010_0000, 0x10_0000, 1),
            0x8_0000
        );
    }

    /// A stack whose pointer lies in no known VMA is skipped; the kernel
    /// masks kstkesp to 0 for processes that are not coredumping, so the
    /// test process's own threads always take this path.
    #[test]
    fn skips_threads_with_unmapped_stacks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = tempfile::tempfile().expect("core");
        let mut ctx = self_context(dir.path(), core, Vec::new());

        dump_stacks(&mut ctx);

        assert_eq!(ctx.core.metadata().expect("meta").len(), 0);
    }

    /// Synthetic sp exercise of the full capture path: pick an address
    /// inside a buffer-backed VMA and dump from it.
    #[test]
    fn capture_writes_lived_range() {
        static STACKISH: [u8; 4096] = [0x5a; 4096];
        let dir = tempfile::tempdir().expect("tempdir");
        let core = tempfile::tempfile().expect("core");
        let vmas = crate::context::test_support::vma_over(&STACKISH, 0);
        let mut ctx = self_context(dir.path(), core, vmas);

        let sp = STACKISH.as_ptr() as u64 + 0x800;
        let len = lived_stack_len(sp, STACKISH.as_ptr() as u64 + 4096, 0, 1);
        ctx.dump_vma(sp, len, 0, "stack[1]");

        assert_eq!(ctx.core.metadata().expect("meta").len(), 4096);
        let mut buf = [0u8; 0x800];
        ctx.core.read_exact_at(&mut buf, 0x800).expect("read back");
        assert!(buf.iter().all(|b| *b == 0x5a));
    }
}
