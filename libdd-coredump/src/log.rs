// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Diagnostics plumbing. The kernel core-pattern protocol gives the handler
//! no usable stderr, so the tracing subscriber forwards everything to
//! syslog(3). A per-dump `debug.txt` mirror is handled by [`DebugLog`].

use std::ffi::CString;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crate::elfcore::vma::CoreVma;

const SYSLOG_IDENT: &std::ffi::CStr = c"coredump-stripper";

/// An `io::Write` that emits each line via `syslog(3)`.
pub struct SyslogWriter;

impl Write for SyslogWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for line in buf.split(|b| *b == b'\n') {
            if line.is_empty() {
                continue;
            }
            if let Ok(msg) = CString::new(line.to_vec()) {
                unsafe {
                    libc::syslog(libc::LOG_ERR | libc::LOG_USER, c"%s".as_ptr(), msg.as_ptr());
                }
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Open syslog and install a tracing subscriber writing to it. Called once
/// by the handler binary before anything can fail.
pub fn init_syslog_tracing() {
    unsafe {
        libc::openlog(SYSLOG_IDENT.as_ptr(), libc::LOG_NDELAY, libc::LOG_USER);
    }
    tracing_subscriber::fmt()
        .with_writer(|| SyslogWriter)
        .with_ansi(false)
        .without_time()
        .with_target(false)
        .with_max_level(tracing::Level::INFO)
        .init();
}

pub fn close_syslog() {
    unsafe { libc::closelog() };
}

/// Optional human-readable log written next to the core.
pub struct DebugLog {
    file: BufWriter<File>,
}

impl DebugLog {
    pub fn create(dst_dir: &Path, exe: &Path, pid: i32, uid: u32, gid: u32) -> io::Result<Self> {
        let file = File::create(dst_dir.join("debug.txt"))?;
        let mut log = Self {
            file: BufWriter::new(file),
        };
        writeln!(log.file, "Core Dump Log")?;
        writeln!(log.file, "-------------")?;
        writeln!(log.file, "Program: {}", exe.display())?;
        writeln!(log.file, "PID: {pid} UID: {uid} GID: {gid}")?;
        Ok(log)
    }

    pub fn log_vmas(&mut self, vmas: &[CoreVma]) {
        let _ = writeln!(self.file, "VMA list:");
        for vma in vmas {
            let _ = writeln!(
                self.file,
                "start: {:#x} end: {:#x} len: {:#x} core offset: {:#x}",
                vma.start,
                vma.file_end,
                vma.file_end - vma.start,
                vma.file_off
            );
        }
        let _ = writeln!(self.file);
    }

    pub fn note(&mut self, msg: &str) {
        let _ = writeln!(self.file, "{msg}");
    }
}

impl Drop for DebugLog {
    fn drop(&mut self) {
        let _ = self.file.flush();
    }
}
