// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! In-band printf interpreter for text dumps. The format string is opaque
//! to the dumper: each token (a directive plus its trailing literal text)
//! is handed to the host's `snprintf(3)` with exactly one argument fetched
//! from the target, so the source's flags, width, and precision survive
//! unchanged.

use crate::context::DumpContext;
use crate::dump_data::descriptor::{FmtKind, RawDumpElem};
use crate::error::DumpError;
use std::ffi::{CStr, CString};
use std::io::Write;

/// Render a token through the host formatter; two passes, size then fill.
macro_rules! host_snprintf {
    ($fmt:expr $(, $arg:expr)* $(,)?) => {{
        let fmt: &CStr = $fmt;
        let needed =
            unsafe { libc::snprintf(std::ptr::null_mut(), 0, fmt.as_ptr() $(, $arg)*) };
        if needed < 0 {
            None
        } else {
            let mut buf = vec![0u8; needed as usize + 1];
            unsafe {
                libc::snprintf(
                    buf.as_mut_ptr() as *mut libc::c_char,
                    buf.len(),
                    fmt.as_ptr() $(, $arg)*,
                )
            };
            buf.pop(); // drop the terminator
            Some(buf)
        }
    }};
}

/// Interpret a text descriptor's format string against its element array.
/// Tokens are delimited by unescaped `%`; the first token carries no
/// directive, every later token consumes exactly one element in order.
pub fn write_text_dump(
    ctx: &DumpContext,
    out: &mut impl Write,
    fmt: &CStr,
    elems: &[RawDumpElem],
) -> Result<(), DumpError> {
    let bytes = fmt.to_bytes();
    let mut es_index: isize = -1;
    let mut start = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] == b'%' && bytes.get(i + 1) == Some(&b'%') {
            // escaped '%' stays inside the current token
            i += 2;
            continue;
        }
        if bytes[i] == b'%' {
            render_token(ctx, out, &bytes[start..i], es_index, elems)?;
            es_index += 1;
            start = i;
        }
        i += 1;
    }

    render_token(ctx, out, &bytes[start..], es_index, elems)
}

fn render_token(
    ctx: &DumpContext,
    out: &mut impl Write,
    token: &[u8],
    es_index: isize,
    elems: &[RawDumpElem],
) -> Result<(), DumpError> {
    let write_err = |e| DumpError::io("write text dump", e);

    if token.is_empty() {
        return Ok(());
    }

    // leading token: literal text, "%%" escapes and all
    if es_index < 0 {
        let Ok(tok) = CString::new(token) else {
            return Ok(());
        };
        if let Some(bytes) = host_snprintf!(&tok) {
            out.write_all(&bytes).map_err(write_err)?;
        }
        return Ok(());
    }

    // no element available for this directive: the raw token is emitted
    if es_index as usize >= elems.len() {
        return out.write_all(token).map_err(write_err);
    }

    let elem = &elems[es_index as usize];
    if elem.length == 0 {
        // bogus variable, write raw text
        return out.write_all(token).map_err(write_err);
    }

    let Ok(data) = ctx.mem.read_bytes(elem.data_ptr, elem.length as usize) else {
        return Ok(());
    };

    let kind = FmtKind::decode(elem.fmt_type);
    if data.len() < kind.required_len() {
        return out.write_all(token).map_err(write_err);
    }

    let Ok(tok) = CString::new(token) else {
        return Ok(());
    };

    let le8 = |d: &[u8]| u64::from_ne_bytes([d[0], d[1], d[2], d[3], d[4], d[5], d[6], d[7]]);

    let rendered = match kind {
        FmtKind::Int => host_snprintf!(
            &tok,
            i32::from_ne_bytes([data[0], data[1], data[2], data[3]]) as libc::c_int
        ),
        FmtKind::Short => host_snprintf!(
            &tok,
            i16::from_ne_bytes([data[0], data[1]]) as libc::c_int
        ),
        FmtKind::Char => host_snprintf!(&tok, data[0] as libc::c_int),
        FmtKind::Long => host_snprintf!(&tok, le8(&data) as i64 as libc::c_long),
        FmtKind::LongLong => host_snprintf!(&tok, le8(&data) as i64 as libc::c_longlong),
        FmtKind::Pointer => host_snprintf!(&tok, le8(&data) as *const libc::c_void),
        FmtKind::Float => host_snprintf!(
            &tok,
            f32::from_ne_bytes([data[0], data[1], data[2], data[3]]) as libc::c_double
        ),
        FmtKind::Double => host_snprintf!(&tok, f64::from_bits(le8(&data))),
        FmtKind::LongDouble => {
            // no long double in Rust: convert the 80-bit value and drop the
            // L modifier before handing the token to the host formatter
            let value = x87_extended_to_f64(&data[..10]);
            let Ok(tok) = CString::new(strip_long_double_modifier(token)) else {
                return Ok(());
            };
            host_snprintf!(&tok, value)
        }
        FmtKind::String => {
            // the element holds a pointer; the string lives behind it
            let Ok(s) = ctx.mem.read_string(le8(&data)) else {
                return Ok(());
            };
            host_snprintf!(&tok, s.as_ptr())
        }
        // unknown tag: no argument can be guessed at, keep the raw token
        FmtKind::None => return out.write_all(token).map_err(write_err),
    };

    if let Some(bytes) = rendered {
        out.write_all(&bytes).map_err(write_err)?;
    }
    Ok(())
}

/// Remove `L` length modifiers from the directive at the head of a token,
/// leaving any literal text after the conversion character untouched.
fn strip_long_double_modifier(token: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(token.len());
    let mut in_directive = false;
    for &b in token {
        if !in_directive {
            out.push(b);
            if b == b'%' {
                in_directive = true;
            }
            continue;
        }
        if b == b'L' {
            continue;
        }
        if b.is_ascii_alphabetic() {
            in_directive = false;
        }
        out.push(b);
    }
    out
}

/// x86-64 80-bit extended float to f64. The mantissa carries an explicit
/// integer bit (bit 63).
fn x87_extended_to_f64(bytes: &[u8]) -> f64 {
    let mantissa = u64::from_le_bytes([
        bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
    ]);
    let se = u16::from_le_bytes([bytes[8], bytes[9]]);
    let sign = if se & 0x8000 != 0 { -1.0 } else { 1.0 };
    let exp = (se & 0x7fff) as i32;

    if exp == 0x7fff {
        return if mantissa << 1 == 0 {
            sign * f64::INFINITY
        } else {
            f64::NAN
        };
    }
    if exp == 0 && mantissa == 0 {
        return sign * 0.0;
    }

    let e = if exp == 0 { -16382 } else { exp - 16383 };
    sign * (mantissa as f64) * 2f64.powi(e - 63)
}
