// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Wire layout of application-registered dump descriptors. The layout is a
//! fixed contract with the instrumentation library loaded by the target;
//! both sides are native 64-bit.

use crate::context::DumpContext;
use crate::error::DumpError;
use std::ffi::CString;

/// Expected value of the target's `mcd_dump_data_version`.
pub const DUMP_DATA_VERSION: i32 = 1;

/// The element's data pointer holds the address of the data, not the data.
pub const MCD_DATA_PTR_INDIRECT: u64 = 1 << 0;
/// The element's length field holds the address of the length.
pub const MCD_LENGTH_INDIRECT: u64 = 1 << 1;

pub const MCD_TYPE_BIN: i32 = 0;
pub const MCD_TYPE_TEXT: i32 = 1;

/// In-target descriptor record (`mcd_dump_data`).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawDumpDesc {
    pub ident: u64,
    pub fmt: u64,
    pub es: u64,
    pub es_n: u32,
    pub dump_type: i32,
    pub dump_scope: u64,
    pub next: u64,
}

/// In-target element record (`dump_data_elem`).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawDumpElem {
    pub data_ptr: u64,
    /// Length, or the address of the length when `MCD_LENGTH_INDIRECT`.
    pub length: u64,
    pub flags: u64,
    /// glibc `printf.h` PA_* encoding for the text formatter.
    pub fmt_type: i32,
}

/// Argument kind for one format directive, decoded from `fmt_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FmtKind {
    Int,
    Short,
    Long,
    LongLong,
    Char,
    Pointer,
    Float,
    Double,
    LongDouble,
    String,
    /// Unknown tag: the token renders with no argument.
    None,
}

// glibc printf.h PA_* encoding
const PA_INT: i32 = 0;
const PA_CHAR: i32 = 1;
const PA_STRING: i32 = 3;
const PA_POINTER: i32 = 5;
const PA_FLOAT: i32 = 6;
const PA_DOUBLE: i32 = 7;
const PA_FLAG_LONG_LONG: i32 = 1 << 8;
const PA_FLAG_LONG: i32 = 1 << 9;
const PA_FLAG_SHORT: i32 = 1 << 10;

impl FmtKind {
    pub fn decode(fmt_type: i32) -> Self {
        match fmt_type {
            PA_INT => FmtKind::Int,
            PA_CHAR => FmtKind::Char,
            PA_STRING => FmtKind::String,
            PA_POINTER => FmtKind::Pointer,
            PA_FLOAT => FmtKind::Float,
            PA_DOUBLE => FmtKind::Double,
            t if t == PA_INT | PA_FLAG_SHORT => FmtKind::Short,
            t if t == PA_INT | PA_FLAG_LONG => FmtKind::Long,
            t if t == PA_INT | PA_FLAG_LONG_LONG => FmtKind::LongLong,
            t if t == PA_DOUBLE | PA_FLAG_LONG_LONG => FmtKind::LongDouble,
            _ => FmtKind::None,
        }
    }

    /// Bytes the kind needs from the element's fetched buffer.
    pub fn required_len(self) -> usize {
        match self {
            FmtKind::Char => 1,
            FmtKind::Short => 2,
            FmtKind::Int | FmtKind::Float => 4,
            FmtKind::Long | FmtKind::LongLong | FmtKind::Double => 8,
            FmtKind::Pointer | FmtKind::String => 8,
            FmtKind::LongDouble => 10,
            FmtKind::None => 0,
        }
    }
}

/// A descriptor pulled out of the target, strings and element array
/// resolved. Scoped to a single walk iteration.
pub struct Descriptor {
    pub ident: Option<String>,
    pub fmt: Option<CString>,
    pub elems: Vec<RawDumpElem>,
    pub dump_type: i32,
}

impl Descriptor {
    /// Fetch the variable-size parts of a raw descriptor record.
    pub fn fetch(ctx: &DumpContext, raw: &RawDumpDesc) -> Result<Self, DumpError> {
        let ident = if raw.ident != 0 {
            Some(
                ctx.mem
                    .read_string(raw.ident)?
                    .to_string_lossy()
                    .into_owned(),
            )
        } else {
            None
        };

        let fmt = if raw.fmt != 0 {
            Some(ctx.mem.read_string(raw.fmt)?)
        } else {
            None
        };

        let mut elems = Vec::with_capacity(raw.es_n as usize);
        for i in 0..raw.es_n as u64 {
            let elem: RawDumpElem = ctx
                .mem
                .read_pod(raw.es + i * size_of::<RawDumpElem>() as u64)?;
            elems.push(elem);
        }

        Ok(Self {
            ident,
            fmt,
            elems,
            dump_type: raw.dump_type,
        })
    }
}

/// Resolve an element's indirections: `(indirection slot, data address,
/// length)`. The slot is `Some` only when the data pointer was indirect.
pub fn resolve_elem(
    ctx: &DumpContext,
    elem: &RawDumpElem,
) -> Result<(Option<u64>, u64, u64), DumpError> {
    let (slot, addr) = if elem.flags & MCD_DATA_PTR_INDIRECT != 0 {
        (Some(elem.data_ptr), ctx.mem.read_u64(elem.data_ptr)?)
    } else {
        (None, elem.data_ptr)
    };

    let length = if elem.flags & MCD_LENGTH_INDIRECT != 0 {
        ctx.mem.read_u64(elem.length)?
    } else {
        elem.length
    };

    Ok((slot, addr, length))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::self_context;

    #[test]
    fn struct_sizes_are_abi_stable() {
        assert_eq!(size_of::<RawDumpDesc>(), 48);
        assert_eq!(size_of::<RawDumpElem>(), 32);
    }

    #[test]
    fn fmt_kind_decoding() {
        assert_eq!(FmtKind::decode(0), FmtKind::Int);
        assert_eq!(FmtKind::decode(1), FmtKind::Char);
        assert_eq!(FmtKind::decode(3), FmtKind::String);
        assert_eq!(FmtKind::decode(5), FmtKind::Pointer);
        assert_eq!(FmtKind::decode(6), FmtKind::Float);
        assert_eq!(FmtKind::decode(7), FmtKind::Double);
        assert_eq!(FmtKind::decode(0x400), FmtKind::Short);
        assert_eq!(FmtKind::decode(0x200), FmtKind::Long);
        assert_eq!(FmtKind::decode(0x100), FmtKind::LongLong);
        assert_eq!(FmtKind::decode(0x107), FmtKind::LongDouble);
        assert_eq!(FmtKind::decode(0x800), FmtKind::None);
        assert_eq!(FmtKind::decode(-1), FmtKind::None);
    }

    #[test]
    fn resolve_direct_and_indirect() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = tempfile::tempfile().expect("core");
        let ctx = self_context(dir.path(), core, Vec::new());

        let payload: u64 = 0x1122_3344;
        let payload_addr = &payload as *const u64 as u64;
        let cell: u64 = payload_addr;
        let cell_addr = &cell as *const u64 as u64;
        let length: u64 = 16;
        let length_addr = &length as *const u64 as u64;

        let direct = RawDumpElem {
            data_ptr: payload_addr,
            length: 8,
            flags: 0,
            fmt_type: 0,
        };
        assert_eq!(
            resolve_elem(&ctx, &direct).expect("direct"),
            (None, payload_addr, 8)
        );

        let indirect = RawDumpElem {
            data_ptr: cell_addr,
            length: length_addr,
            flags: MCD_DATA_PTR_INDIRECT | MCD_LENGTH_INDIRECT,
            fmt_type: 0,
        };
        assert_eq!(
            resolve_elem(&ctx, &indirect).expect("indirect"),
            (Some(cell_addr), payload_addr, 16)
        );
    }

    #[test]
    fn fetch_reads_strings_and_elements() {
        let dir = tempfile::tempdir().expect("tempdir");
        let core = tempfile::tempfile().expect("core");
        let ctx = self_context(dir.path(), core, Vec::new());

        let ident = b"my_dump\0";
        let fmt = b"v=%d\0";
        let elems = [RawDumpElem {
            data_ptr: 0x1000,
            length: 4,
            flags: 0,
            fmt_type: 0,
        }];

        let raw = RawDumpDesc {
            ident: ident.as_ptr() as u64,
            fmt: fmt.as_ptr() as u64,
            es: elems.as_ptr() as u64,
            es_n: 1,
            dump_type: MCD_TYPE_TEXT,
            dump_scope: 0,
            next: 0,
        };

        let desc = Descriptor::fetch(&ctx, &raw).expect("fetch");
        assert_eq!(desc.ident.as_deref(), Some("my_dump"));
        assert_eq!(desc.fmt.as_deref(), Some(c"v=%d"));
        assert_eq!(desc.elems.len(), 1);
        assert_eq!(desc.elems[0].length, 4);
    }
}
