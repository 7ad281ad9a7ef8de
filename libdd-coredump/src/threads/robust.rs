// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Robust-futex list capture. `SYS_get_robust_list` yields the head the
//! target registered; the nodes form a circular list walked until it wraps
//! back to the first entry.

use crate::context::DumpContext;
use std::mem::offset_of;

/// Kernel's `struct robust_list`.
#[repr(C)]
struct RobustList {
    next: u64,
}

/// Kernel's `struct robust_list_head`.
#[repr(C)]
struct RobustListHead {
    list: RobustList,
    futex_offset: i64,
    list_op_pending: u64,
}

/// Defense against a corrupted list that cycles without revisiting the
/// first node.
const MAX_ROBUST_NODES: usize = 2048;

pub fn dump_robust_mutex_list(ctx: &mut DumpContext) {
    let mut head: u64 = 0;
    let mut len: usize = 0;
    let ret = unsafe {
        libc::syscall(
            libc::SYS_get_robust_list,
            ctx.pid as libc::c_long,
            &mut head as *mut u64,
            &mut len as *mut usize,
        )
    };
    if ret != 0 || len != size_of::<RobustListHead>() {
        tracing::info!("get_robust_list failed for {}: ret={ret} len={len}", ctx.pid);
        return;
    }

    // no robust list registered
    if head == 0 {
        return;
    }

    ctx.dump_vma(
        head,
        size_of::<RobustListHead>() as u64,
        0,
        "robust mutex head",
    );

    let start = match ctx
        .mem
        .read_u64(head + offset_of!(RobustListHead, list) as u64)
    {
        Ok(addr) => addr,
        Err(_) => return,
    };

    let mut node = start;
    for visited in 1.. {
        ctx.dump_vma(node, size_of::<RobustList>() as u64, 0, "robust mutex");

        if visited >= MAX_ROBUST_NODES {
            tracing::warn!("robust mutex list did not terminate after {visited} nodes");
            break;
        }

        node = match ctx.mem.read_u64(node + offset_of!(RobustList, next) as u64) {
            Ok(next) => next,
            Err(_) => return,
        };
        if node == start {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::self_context;

    #[test]
    fn head_struct_matches_kernel_abi() {
        assert_eq!(size_of::<RobustListHead>(), 24);
        assert_eq!(offset_of!(RobustListHead, list), 0);
    }

    /// glibc registers a robust list for every thread, so querying our own
    /// pid must succeed with the expected structure size.
    #[test]
    fn own_robust_list_is_queryable() {
        let mut head: u64 = 0;
        let mut len: usize = 0;
        let ret = unsafe {
            libc::syscall(
                libc::SYS_get_robust_list,
                std::process::id() as libc::c_long,
                &mut head as *mut u64,
                &mut len as *mut usize,
            )
        };
        assert_eq!(ret, 0);
        assert_eq!(len, size_of::<RobustListHead>());
        assert_ne!(head, 0);
    }

    /// Walking our own (empty) robust list terminates: the head's next
    /// pointer refers back to the head itself.
    #[test]
    fn walk_terminates_on_own_list() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = tempfile::tempfile().expect("core");
        let mut ctx = self_context(dir.path(), core, Vec::new());
        dump_robust_mutex_list(&mut ctx);
    }
}
