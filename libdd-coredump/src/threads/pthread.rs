// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pthread structure capture. The thread-debug agent path lets
//! libthread_db walk the thread list; every remote read it performs lands
//! in the core as a side effect. When no thread library is present in the
//! target, a symbol-scan fallback follows the glibc thread lists directly.

use crate::context::DumpContext;
use crate::threads::thread_db::{
    ps_prochandle, td_ta_delete, td_ta_new, td_ta_thr_iter, td_thragent_t, td_thrhandle_t, TD_NOLIBTHREAD, TD_OK,
    TD_THR_ANY_STATE, TD_THR_ANY_USER_FLAGS, TD_THR_LOWEST_PRIORITY,
};
use libc::{c_int, c_void};
use std::ptr;

unsafe extern "C" fn find_pthreads_cb(_th: *const td_thrhandle_t, _cbdata: *mut c_void) -> c_int {
    TD_OK
}

pub fn dump_pthread_list(ctx: &mut DumpContext) {
    let mut ph = ps_prochandle {
        ctx: ptr::from_mut(ctx),
    };
    let mut ta: *mut td_thragent_t = ptr::null_mut();

    let mut err = unsafe { td_ta_new(&mut ph, &mut ta) };
    if err == TD_OK {
        err = unsafe {
            td_ta_thr_iter(
                ta,
                find_pthreads_cb,
                ptr::null_mut(),
                TD_THR_ANY_STATE,
                TD_THR_LOWEST_PRIORITY,
                ptr::null_mut(),
                TD_THR_ANY_USER_FLAGS,
            )
        };
        unsafe { td_ta_delete(ta) };
    }

    if err == TD_NOLIBTHREAD {
        tracing::info!("target does not appear to be multi-threaded");
    } else if err != TD_OK {
        tracing::warn!("libthread_db not usable, using fallback");
        dump_pthread_list_fallback(ctx);
    }
}

/// Without libthread_db the thread structures are found by following the
/// doubly-linked lists rooted at glibc's `stack_used` and `__stack_user`.
fn dump_pthread_list_fallback(ctx: &mut DumpContext) {
    let mut pthread_size: u32 = 0;
    if let Some(addr) = ctx.symbols.lookup("_thread_db_sizeof_pthread") {
        pthread_size = ctx.mem.read_u32(addr).unwrap_or(0);
    }
    if pthread_size == 0 {
        pthread_size = ctx.page_size as u32;
        tracing::info!("guessing sizeof(struct pthread): {pthread_size} bytes");
    } else {
        tracing::info!("sizeof(struct pthread): {pthread_size} bytes");
    }

    if let Some(addr) = ctx.symbols.lookup("stack_used") {
        walk_thread_list(ctx, "stack_used pthread", addr, u64::from(pthread_size));
    }
    if let Some(addr) = ctx.symbols.lookup("__stack_user") {
        walk_thread_list(ctx, "__stack_user pthread", addr, u64::from(pthread_size));
    }
}

/// The list head's offset within `struct pthread` is unknown, so every node
/// is dumped with a balloon of the whole structure size. Terminates on a
/// null next pointer or on wrapping back to the head.
fn walk_thread_list(ctx: &mut DumpContext, desc: &str, head: u64, pthread_size: u64) {
    let mut addr = head;
    loop {
        ctx.dump_vma(addr, 0, pthread_size, desc);

        let next = match ctx.mem.read_u64(addr) {
            Ok(next) => next,
            Err(_) => break,
        };
        if next == 0 || next == head {
            break;
        }
        addr = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{self_context, vma_over};
    use std::os::unix::fs::FileExt;

    /// Circular list of three nodes embedded in one arena; the walk must
    /// visit each node once and stop when it wraps to the head.
    #[test]
    fn walk_visits_each_node_once() {
        // node stride 32 bytes: link word followed by a marker word
        let mut arena = Box::new([0u64; 12]);
        let base = arena.as_ptr() as u64;
        arena[0] = base + 32;
        arena[1] = 0x11;
        arena[4] = base + 64;
        arena[5] = 0x22;
        arena[8] = base;
        arena[9] = 0x33;

        let arena_bytes =
            unsafe { std::slice::from_raw_parts(arena.as_ptr() as *const u8, 96) };
        let dir = tempfile::tempdir().expect("tempdir");
        let core = tempfile::tempfile().expect("core");
        let vmas = vma_over(arena_bytes, 0);
        let mut ctx = self_context(dir.path(), core, vmas);

        walk_thread_list(&mut ctx, "pthread", base, 16);

        let mut out = vec![0u8; 96];
        ctx.core.read_exact_at(&mut out, 0).expect("read back");
        assert_eq!(out[8], 0x11);
        assert_eq!(out[40], 0x22);
        assert_eq!(out[72], 0x33);
    }

    #[test]
    fn walk_stops_on_null_next() {
        static NODE: [u8; 16] = [0u8; 16]; // next == 0
        let dir = tempfile::tempdir().expect("tempdir");
        let core = tempfile::tempfile().expect("core");
        let vmas = vma_over(&NODE, 0);
        let mut ctx = self_context(dir.path(), core, vmas);

        walk_thread_list(&mut ctx, "pthread", NODE.as_ptr() as u64, 4);
        assert!(ctx.core.metadata().expect("meta").len() > 0);
    }

    /// The agent path degrades to the fallback when the registry knows no
    /// thread symbols; it must come back without touching the core.
    #[test]
    fn agent_failure_falls_back_cleanly() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = tempfile::tempfile().expect("core");
        let mut ctx = self_context(dir.path(), core, Vec::new());

        dump_pthread_list(&mut ctx);

        assert_eq!(ctx.core.metadata().expect("meta").len(), 0);
    }
}
