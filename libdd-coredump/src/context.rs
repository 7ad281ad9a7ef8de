// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-scoped dump state: one [`DumpContext`] is created per delivered
//! core and owns the output directory, the open files, the VMA table, and
//! the symbol registry for the lifetime of the dump.

use crate::config::Receipt;
use crate::elfcore::vma::{clip_to_vma, core_pos, find_vma, CoreVma};
use crate::log::DebugLog;
use crate::mem::RemoteMem;
use crate::symbols::SymbolRegistry;
use anyhow::Context;
use std::fs::File;
use std::os::unix::fs::{DirBuilderExt, FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};

/// The kernel core-pattern argv, parsed.
#[derive(Debug, Clone)]
pub struct DumpRequest {
    pub pid: libc::pid_t,
    pub uid: u32,
    pub gid: u32,
    pub signum: i32,
    pub timestamp: u64,
    pub hostname: String,
    pub comm: String,
    pub config_path: Option<PathBuf>,
}

pub struct DumpContext {
    pub pid: libc::pid_t,
    pub uid: u32,
    pub gid: u32,
    pub signum: i32,
    pub timestamp: u64,
    pub hostname: String,
    pub comm: String,
    pub exe: PathBuf,
    pub recept: Receipt,
    pub dst_dir: PathBuf,
    pub core: File,
    pub fatcore: Option<File>,
    pub mem: RemoteMem,
    /// Crashing thread, learned from the first NT_PRSTATUS; 0 while unknown.
    pub first_pid: libc::pid_t,
    pub tasks: Vec<libc::pid_t>,
    pub symbols: SymbolRegistry,
    pub vmas: Vec<CoreVma>,
    /// Bytes of the core preceding the first loadable segment, as written
    /// to disk. Later phases re-parse headers and notes from here.
    pub prefix: Vec<u8>,
    /// Lowest loadable-segment file offset.
    pub vma_start: u64,
    /// `max(p_offset + p_filesz)`: the size of the sparse core.
    pub vma_end: u64,
    pub debug_log: Option<DebugLog>,
    pub page_size: usize,
}

impl DumpContext {
    pub fn new(
        request: &DumpRequest,
        exe: PathBuf,
        recept: Receipt,
        base_dir: &Path,
    ) -> anyhow::Result<Self> {
        let pid = request.pid;

        // basename of comm for the directory name
        let comm_base = request
            .comm
            .rsplit('/')
            .next()
            .unwrap_or(request.comm.as_str());
        let dst_dir = base_dir.join(format!(
            "{comm_base}.{}.{}",
            request.timestamp, request.pid
        ));

        std::fs::DirBuilder::new()
            .mode(0o700)
            .create(&dst_dir)
            .with_context(|| format!("unable to create directory '{}'", dst_dir.display()))?;

        let tasks = crate::procfs::task_list(pid).context("unable to read task list")?;

        let core_path = dst_dir.join("core");
        let core = open_output(&core_path)
            .with_context(|| format!("unable to create core '{}'", core_path.display()))?;
        tracing::info!("core path: {}", core_path.display());

        let fatcore = if recept.dump_fat_core {
            let path = dst_dir.join("fatcore");
            Some(
                open_output(&path)
                    .with_context(|| format!("unable to create fatcore '{}'", path.display()))?,
            )
        } else {
            None
        };

        let mem = RemoteMem::open(pid).context("unable to open target mem")?;

        Ok(Self {
            pid,
            uid: request.uid,
            gid: request.gid,
            signum: request.signum,
            timestamp: request.timestamp,
            hostname: request.hostname.clone(),
            comm: request.comm.clone(),
            exe,
            recept,
            dst_dir,
            core,
            fatcore,
            mem,
            first_pid: 0,
            tasks,
            symbols: SymbolRegistry::new(),
            vmas: Vec::new(),
            prefix: Vec::new(),
            vma_start: 0,
            vma_end: 0,
            debug_log: None,
            page_size: page_size::get(),
        })
    }

    pub fn init_debug_log(&mut self) {
        if !self.recept.write_debug_log {
            return;
        }
        match DebugLog::create(&self.dst_dir, &self.exe, self.pid, self.uid, self.gid) {
            Ok(log) => self.debug_log = Some(log),
            Err(e) => tracing::warn!("failed to init debug log: {e}"),
        }
    }

    /// Log a per-dump message to syslog and, when enabled, to `debug.txt`.
    pub fn note(&mut self, msg: &str) {
        tracing::info!("{msg}");
        if let Some(log) = &mut self.debug_log {
            log.note(msg);
        }
    }

    pub fn log_vmas(&mut self) {
        if let Some(log) = &mut self.debug_log {
            log.log_vmas(&self.vmas);
        }
    }

    /// File offset inside the output core backing a target address.
    pub fn get_core_pos(&self, addr: u64) -> Option<u64> {
        core_pos(&self.vmas, addr)
    }

    /// Copy `[start, start + len)` of target memory into the sparse core at
    /// the covering segment's file offset. `balloon` expands the range on
    /// both sides before clipping (used when the true extent of an opaque
    /// structure is unknown). Writes outside the segment's file-backed part
    /// are silently truncated; a missing VMA is logged and skipped.
    pub fn dump_vma(&mut self, start: u64, len: u64, balloon: u64, desc: &str) {
        let Some(vma) = find_vma(&self.vmas, start).cloned() else {
            tracing::warn!("vma not found start={start:#x}! bad recept or internal bug!");
            return;
        };

        let Some((from, to)) = clip_to_vma(&vma, start, len, balloon) else {
            return;
        };

        let total = to - from;
        self.note(&format!("dump: {desc}: {total} bytes @ {from:#x}"));

        let file_off = vma.file_off + (from - vma.start);
        let mut buf = vec![0u8; self.page_size.min(total as usize)];
        let mut done = 0u64;
        while done < total {
            let chunk = buf.len().min((total - done) as usize);
            if self
                .mem
                .read_exact(from + done, &mut buf[..chunk])
                .is_err()
            {
                // read failure aborts this dump; the core stays sparse here
                return;
            }
            if let Err(e) = self.core.write_all_at(&buf[..chunk], file_off + done) {
                tracing::warn!("write core failed at {:#x}: {e}", file_off + done);
            }
            done += chunk as u64;
        }
    }

    /// Copy every readable loadable segment in full into the fat core.
    pub fn dump_fat_core(&mut self) {
        let Some(fatcore) = self.fatcore.as_ref() else {
            return;
        };
        let mut buf = vec![0u8; self.page_size];

        for vma in &self.vmas {
            let total = vma.file_end - vma.start;
            let mut done = 0u64;
            while done < total {
                let chunk = buf.len().min((total - done) as usize);
                if self
                    .mem
                    .read_exact(vma.start + done, &mut buf[..chunk])
                    .is_err()
                {
                    break;
                }
                if let Err(e) = fatcore.write_all_at(&buf[..chunk], vma.file_off + done) {
                    tracing::warn!("write fatcore failed at {:#x}: {e}", vma.file_off + done);
                }
                done += chunk as u64;
            }
        }
    }
}

fn open_output(path: &Path) -> std::io::Result<File> {
    File::options()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o600)
        .open(path)
}

/// Prevent the handler's own allocations from paging out while the crash is
/// being sampled. The lock covers future mappings; see DESIGN.md for the
/// deviation from the original flag pair.
pub fn lock_process_memory() {
    if let Err(e) = nix::sys::mman::mlockall(nix::sys::mman::MlockAllFlags::MCL_FUTURE) {
        tracing::warn!("mlockall failed: {e}");
    }
}

pub fn unlock_process_memory() {
    let _ = nix::sys::mman::munlockall();
}

/// All artifacts are owner-only.
pub fn restrict_umask() {
    use nix::sys::stat::{umask, Mode};
    umask(Mode::from_bits_truncate(0o077));
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::Receipt;

    /// A context whose "target" is the test process itself, with a caller
    /// provided VMA table and core file.
    pub(crate) fn self_context(dir: &Path, core: File, vmas: Vec<CoreVma>) -> DumpContext {
        let pid = std::process::id() as libc::pid_t;
        DumpContext {
            pid,
            uid: 0,
            gid: 0,
            signum: libc::SIGABRT,
            timestamp: 1,
            hostname: "testhost".into(),
            comm: "test".into(),
            exe: PathBuf::from("/proc/self/exe"),
            recept: Receipt::default(),
            dst_dir: dir.to_path_buf(),
            core,
            fatcore: None,
            mem: RemoteMem::open_self(),
            first_pid: 0,
            tasks: vec![pid],
            symbols: SymbolRegistry::new(),
            vmas,
            prefix: Vec::new(),
            vma_start: 0,
            vma_end: 0,
            debug_log: None,
            page_size: page_size::get(),
        }
    }

    /// A VMA table with one entry exactly covering `buf`, mapped at file
    /// offset `file_off` in the core.
    pub(crate) fn vma_over(buf: &[u8], file_off: u64) -> Vec<CoreVma> {
        let start = buf.as_ptr() as u64;
        vec![CoreVma {
            start,
            file_end: start + buf.len() as u64,
            mem_end: start + buf.len() as u64,
            file_off,
            flags: goblin::elf::program_header::PF_R,
        }]
    }
}
