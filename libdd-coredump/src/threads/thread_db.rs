// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! FFI surface of libthread_db. The library resolves its proc_service
//! callbacks (`ps_*`) against our exported symbols at runtime, so the
//! callback names and signatures below are ABI, not style.

#![allow(non_camel_case_types)]

use crate::context::DumpContext;
use libc::{c_char, c_int, c_uint, c_void, pid_t, size_t};
use std::ffi::CStr;

pub type psaddr_t = *mut c_void;
pub type lwpid_t = pid_t;

#[repr(C)]
pub struct td_thragent_t {
    _opaque: [u8; 0],
}

#[repr(C)]
pub struct td_thrhandle_t {
    pub th_ta_p: *mut td_thragent_t,
    pub th_unique: psaddr_t,
}

// td_err_e
pub const TD_OK: c_int = 0;
pub const TD_NOLIBTHREAD: c_int = 12;

// td_ta_thr_iter arguments
pub const TD_THR_ANY_STATE: c_int = 0;
pub const TD_THR_LOWEST_PRIORITY: c_int = -20;
pub const TD_THR_ANY_USER_FLAGS: c_uint = 0xffff_ffff;

// ps_err_e
pub const PS_OK: c_int = 0;
pub const PS_ERR: c_int = 1;
pub const PS_NOSYM: c_int = 5;

pub type td_thr_iter_f =
    unsafe extern "C" fn(th: *const td_thrhandle_t, cbdata: *mut c_void) -> c_int;

extern "C" {
    pub fn td_ta_new(ps: *mut ps_prochandle, ta: *mut *mut td_thragent_t) -> c_int;
    pub fn td_ta_delete(ta: *mut td_thragent_t) -> c_int;
    pub fn td_ta_thr_iter(
        ta: *const td_thragent_t,
        callback: td_thr_iter_f,
        cbdata_p: *mut c_void,
        state: c_int,
        ti_pri: c_int,
        ti_sigmask_p: *mut c_void,
        ti_user_flags: c_uint,
    ) -> c_int;
}

/// The process handle libthread_db hands back to every callback. Holds a
/// raw context pointer because the callbacks cross an FFI boundary; the
/// dumper is single-threaded and the pointer never outlives the dump.
#[repr(C)]
pub struct ps_prochandle {
    pub ctx: *mut DumpContext,
}

unsafe fn context<'a>(ph: *mut ps_prochandle) -> &'a mut DumpContext {
    &mut *(*ph).ctx
}

/// Remote read for libthread_db. Whatever the thread iteration examines is
/// simultaneously dumped to the core, which is the entire point of driving
/// the agent.
#[no_mangle]
pub unsafe extern "C" fn ps_pdread(
    ph: *mut ps_prochandle,
    addr: psaddr_t,
    buf: *mut c_void,
    size: size_t,
) -> c_int {
    let ctx = context(ph);
    let out = std::slice::from_raw_parts_mut(buf as *mut u8, size);
    if ctx.mem.read_exact(addr as u64, out).is_err() {
        return PS_ERR;
    }
    ctx.dump_vma(addr as u64, size as u64, 0, "pthread data");
    PS_OK
}

#[no_mangle]
pub unsafe extern "C" fn ps_pdwrite(
    _ph: *mut ps_prochandle,
    _addr: psaddr_t,
    _buf: *const c_void,
    _size: size_t,
) -> c_int {
    PS_OK
}

#[no_mangle]
pub unsafe extern "C" fn ps_lgetregs(
    _ph: *mut ps_prochandle,
    _lwpid: lwpid_t,
    _regset: *mut c_void,
) -> c_int {
    PS_OK
}

#[no_mangle]
pub unsafe extern "C" fn ps_lsetregs(
    _ph: *mut ps_prochandle,
    _lwpid: lwpid_t,
    _regset: *const c_void,
) -> c_int {
    PS_OK
}

#[no_mangle]
pub unsafe extern "C" fn ps_lgetfpregs(
    _ph: *mut ps_prochandle,
    _lwpid: lwpid_t,
    _fpregset: *mut c_void,
) -> c_int {
    PS_OK
}

#[no_mangle]
pub unsafe extern "C" fn ps_lsetfpregs(
    _ph: *mut ps_prochandle,
    _lwpid: lwpid_t,
    _fpregset: *const c_void,
) -> c_int {
    PS_OK
}

#[no_mangle]
pub unsafe extern "C" fn ps_getpid(ph: *mut ps_prochandle) -> pid_t {
    context(ph).pid
}

#[no_mangle]
pub unsafe extern "C" fn ps_pglobal_lookup(
    ph: *mut ps_prochandle,
    _object_name: *const c_char,
    sym_name: *const c_char,
    sym_addr: *mut psaddr_t,
) -> c_int {
    let ctx = context(ph);
    let Ok(name) = CStr::from_ptr(sym_name).to_str() else {
        return PS_ERR;
    };
    match ctx.symbols.lookup(name) {
        Some(addr) => {
            *sym_addr = addr as psaddr_t;
            PS_OK
        }
        None => PS_NOSYM,
    }
}
