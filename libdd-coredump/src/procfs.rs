// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! `/proc/<pid>` plumbing: stable task enumeration, per-task stack
//! pointers, and the proc-file copier.

use crate::error::DumpError;
use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;

/// Integer-named entries of `/proc/<pid>/task`, in directory order. The
/// directory is read twice; a count change between the passes means the
/// kernel reaped or spawned a task mid-read and the caller must fail rather
/// than work with an unstable list.
pub fn task_list(pid: libc::pid_t) -> Result<Vec<libc::pid_t>, DumpError> {
    let path = format!("/proc/{pid}/task");

    let count = read_task_entries(&path)?.len();
    let tasks = read_task_entries(&path)?;

    if tasks.len() != count || tasks.is_empty() {
        return Err(DumpError::io(
            "task list changed while reading",
            std::io::Error::from(std::io::ErrorKind::Other),
        ));
    }

    Ok(tasks)
}

fn read_task_entries(path: &str) -> Result<Vec<libc::pid_t>, DumpError> {
    let mut tasks = Vec::new();
    let dir = fs::read_dir(path).map_err(|e| DumpError::io("open task dir", e))?;
    for entry in dir {
        let entry = entry.map_err(|e| DumpError::io("read task dir", e))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') {
            continue;
        }
        let tid = name.parse::<libc::pid_t>().map_err(|_| {
            DumpError::io(
                "parse task entry",
                std::io::Error::from(std::io::ErrorKind::InvalidData),
            )
        })?;
        tasks.push(tid);
    }
    Ok(tasks)
}

/// Current stack pointer of a task: field 29 (`kstkesp`) of
/// `/proc/<pid>/task/<tid>/stat`.
pub fn stack_pointer(pid: libc::pid_t, tid: libc::pid_t) -> Result<u64, DumpError> {
    let line = fs::read_to_string(format!("/proc/{pid}/task/{tid}/stat"))
        .map_err(|e| DumpError::io("read task stat", e))?;
    parse_stat_stack_pointer(&line).ok_or_else(|| {
        DumpError::io(
            "parse task stat",
            std::io::Error::from(std::io::ErrorKind::InvalidData),
        )
    })
}

/// The comm field is parenthesized and may itself contain spaces, so fields
/// are counted from the closing paren, not from the line start.
pub(crate) fn parse_stat_stack_pointer(line: &str) -> Option<u64> {
    let after_comm = &line[line.rfind(')')? + 1..];
    // kstkesp is field 29 overall; pid and comm precede the paren.
    after_comm.split_whitespace().nth(26)?.parse().ok()
}

const PROC_DIR_MODE: u32 = 0o700;

fn make_dir(path: &Path) {
    let _ = fs::DirBuilder::new()
        .recursive(true)
        .mode(PROC_DIR_MODE)
        .create(path);
}

fn copy_regular_file(dst: &Path, src: &Path) {
    let Ok(meta) = fs::metadata(src) else { return };
    if !meta.is_file() {
        return;
    }
    let (Ok(mut from), Ok(mut to)) = (fs::File::open(src), fs::File::create(dst)) else {
        return;
    };
    let _ = std::io::copy(&mut from, &mut to);
}

fn copy_symlink(dst: &Path, src: &Path) {
    let Ok(target) = fs::read_link(src) else { return };
    if target.as_os_str().is_empty() {
        return;
    }
    let _ = std::os::unix::fs::symlink(target, dst);
}

/// Replicate one `/proc/<pid>` entry under `<dst_dir>/proc/<pid>`,
/// optionally per task, optionally as a symlink. The `fd` entry is special:
/// the directory is recreated and each symlink inside is replicated.
fn copy_proc_files(
    dst_dir: &Path,
    pid: libc::pid_t,
    tasks: &[libc::pid_t],
    name: &str,
    per_task: bool,
    link: bool,
) {
    let proc_root = dst_dir.join("proc").join(pid.to_string());
    make_dir(&proc_root);

    if !per_task {
        let src = format!("/proc/{pid}/{name}");
        copy_regular_file(&proc_root.join(name), Path::new(&src));
        return;
    }

    for tid in tasks {
        let task_dst = proc_root.join("task").join(tid.to_string());
        make_dir(&task_dst);
        let src = format!("/proc/{pid}/task/{tid}/{name}");
        let src = Path::new(&src);

        if name == "fd" {
            let fd_dst = task_dst.join("fd");
            make_dir(&fd_dst);
            let Ok(dir) = fs::read_dir(src) else { continue };
            for entry in dir.flatten() {
                let fd_name = entry.file_name();
                if fd_name.to_string_lossy().starts_with('.') {
                    continue;
                }
                copy_symlink(&fd_dst.join(&fd_name), &entry.path());
            }
        } else if link {
            copy_symlink(&task_dst.join(name), src);
        } else {
            copy_regular_file(&task_dst.join(name), src);
        }
    }
}

/// Copy the fixed set of interesting `/proc/<pid>` files into the output
/// directory. Everything is best effort; a vanished file is skipped.
pub fn write_proc_info(dst_dir: &Path, pid: libc::pid_t, tasks: &[libc::pid_t]) {
    copy_proc_files(dst_dir, pid, tasks, "cmdline", false, false);
    copy_proc_files(dst_dir, pid, tasks, "environ", false, false);
    copy_proc_files(dst_dir, pid, tasks, "io", true, false);
    copy_proc_files(dst_dir, pid, tasks, "maps", true, false);
    copy_proc_files(dst_dir, pid, tasks, "smaps", true, false);
    copy_proc_files(dst_dir, pid, tasks, "stack", true, false);
    copy_proc_files(dst_dir, pid, tasks, "stat", true, false);
    copy_proc_files(dst_dir, pid, tasks, "statm", true, false);
    copy_proc_files(dst_dir, pid, tasks, "cwd", true, true);
    copy_proc_files(dst_dir, pid, tasks, "fd", true, true);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn own_task_list_contains_main_thread() {
        let pid = std::process::id() as libc::pid_t;
        let tasks = task_list(pid).expect("task list");
        assert!(tasks.contains(&pid));
    }

    #[test]
    fn own_stack_pointer_parses() {
        let pid = std::process::id() as libc::pid_t;
        // the kernel masks kstkesp to 0 for processes that are not
        // coredumping; only the parse path is checked here
        stack_pointer(pid, pid).expect("stack pointer");
    }

    #[test]
    fn stat_parse_handles_spaces_in_comm() {
        let mut line = String::from("123 (a weird) comm) R ");
        for i in 0..25 {
            line.push_str(&i.to_string());
            line.push(' ');
        }
        line.push_str("140737354131456 more fields");
        assert_eq!(parse_stat_stack_pointer(&line), Some(140_737_354_131_456));
    }

    #[test]
    fn stat_parse_rejects_short_line() {
        assert_eq!(parse_stat_stack_pointer("123 (x) R 1 2 3"), None);
    }

    #[test]
    fn proc_info_copies_own_files() {
        let pid = std::process::id() as libc::pid_t;
        let tasks = task_list(pid).expect("task list");
        let tmp = tempfile::tempdir().expect("tempdir");

        write_proc_info(tmp.path(), pid, &tasks);

        let root = tmp.path().join("proc").join(pid.to_string());
        assert!(root.join("cmdline").is_file());
        let task = root.join("task").join(pid.to_string());
        assert!(task.join("stat").is_file());
        assert!(task.join("cwd").symlink_metadata().expect("cwd").file_type().is_symlink());
        assert!(task.join("fd").is_dir());
    }
}
