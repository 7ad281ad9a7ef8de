// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The injector: merges binary dump artifacts back into a stripped core at
//! the offsets recorded in `symbol.map`, yielding a core a debugger can
//! load as if the full image had been captured.

use crate::symbol_map::{parse_line, MapEntry, MapEntryKind};
use anyhow::Context;
use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::path::Path;

/// Inject every binary dump into the core. Per-file failures are reported
/// and do not stop the remaining files; returns whether all succeeded.
pub fn inject_all(core: &Path, symbol_map: &Path, binary_dumps: &[impl AsRef<Path>]) -> anyhow::Result<bool> {
    anyhow::ensure!(core.exists(), "failed to stat {}", core.display());

    let core = OpenOptions::new()
        .read(true)
        .write(true)
        .open(core)
        .with_context(|| format!("failed to open {} for writing", core.display()))?;
    let map_text = std::fs::read_to_string(symbol_map)
        .with_context(|| format!("failed to open {}", symbol_map.display()))?;

    let mut all_ok = true;
    for dump in binary_dumps {
        if let Err(e) = inject_file(&core, &map_text, dump.as_ref()) {
            eprintln!("error: {e:#}");
            all_ok = false;
        }
    }
    Ok(all_ok)
}

/// Inject one binary dump. The dump's identifier is its basename; its
/// layout is `[indirection pointer][payload]` when an `I` row exists,
/// plain payload otherwise.
pub fn inject_file(core: &File, map_text: &str, dump_path: &Path) -> anyhow::Result<()> {
    let ident = dump_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    anyhow::ensure!(!ident.is_empty(), "no identifier in {}", dump_path.display());

    let (direct, indirect) = collect_rows(map_text, &ident);
    let dump = File::open(dump_path)
        .with_context(|| format!("failed to open {}", dump_path.display()))?;

    // indirect data sits at the head of the dump file; direct payload follows
    let direct_offset = indirect.as_ref().map(|row| row.size).unwrap_or(0);

    let mut result = Ok(());
    if let Some(row) = direct {
        result = write_section(core, &dump, &row, direct_offset, "direct");
    }
    if let Some(row) = indirect {
        if let Err(e) = write_section(core, &dump, &row, 0, "indirect") {
            result = Err(e);
        }
    }
    result
}

/// Scan the map for this identifier, keeping at most one `D` and one `I`
/// row; later rows overwrite earlier ones.
fn collect_rows(map_text: &str, ident: &str) -> (Option<MapEntry>, Option<MapEntry>) {
    let mut direct = None;
    let mut indirect = None;

    for entry in map_text.lines().filter_map(parse_line) {
        if entry.ident != ident {
            continue;
        }
        match entry.kind {
            MapEntryKind::Direct => direct = Some(entry),
            MapEntryKind::Indirect => indirect = Some(entry),
        }
    }

    (direct, indirect)
}

fn write_section(
    core: &File,
    dump: &File,
    row: &MapEntry,
    dump_offset: u64,
    what: &str,
) -> anyhow::Result<()> {
    let mut buf = vec![0u8; row.size as usize];
    dump.read_exact_at(&mut buf, dump_offset).with_context(|| {
        format!(
            "failed to read {:#x} bytes from dump for symbol {}",
            row.size, row.ident
        )
    })?;
    core.write_all_at(&buf, row.core_offset).with_context(|| {
        format!(
            "failed to write to position {:#x} for symbol {} in core",
            row.core_offset, row.ident
        )
    })?;

    println!("injected: {}, {} bytes, {what}", row.ident, row.size);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn setup(core_len: usize) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().expect("tempdir");
        let core_path = dir.path().join("core");
        std::fs::write(&core_path, vec![0u8; core_len]).expect("core");
        (dir, core_path)
    }

    fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = File::create(&path).expect("create");
        f.write_all(bytes).expect("write");
        path
    }

    #[test]
    fn direct_payload_round_trip() {
        let (dir, core_path) = setup(0x100);
        let payload: Vec<u8> = (0u8..16).collect();
        let dump = write_file(dir.path(), "buf", &payload);
        let map = write_file(dir.path(), "symbol.map", b"10 10 D buf\n");

        let ok = inject_all(&core_path, &map, &[&dump]).expect("inject");
        assert!(ok);

        let core = std::fs::read(&core_path).expect("read core");
        assert_eq!(&core[0x10..0x20], &payload[..]);
        assert!(core[..0x10].iter().all(|b| *b == 0));
    }

    #[test]
    fn indirect_layout_splits_pointer_and_payload() {
        let (dir, core_path) = setup(0x100);
        let pointer = 0x7f00_1234u64.to_ne_bytes();
        let payload = [0xabu8; 4];
        let mut dump_bytes = pointer.to_vec();
        dump_bytes.extend_from_slice(&payload);
        let dump = write_file(dir.path(), "ring", &dump_bytes);
        let map = write_file(dir.path(), "symbol.map", b"40 8 I ring\n20 4 D ring\n");

        assert!(inject_all(&core_path, &map, &[&dump]).expect("inject"));

        let core = std::fs::read(&core_path).expect("read core");
        assert_eq!(&core[0x40..0x48], &pointer);
        assert_eq!(&core[0x20..0x24], &payload);
    }

    #[test]
    fn last_duplicate_row_wins() {
        let (dir, core_path) = setup(0x100);
        let dump = write_file(dir.path(), "buf", &[0x7u8; 4]);
        let map = write_file(
            dir.path(),
            "symbol.map",
            b"90 4 D buf\nnot a map line\n30 4 D buf\n",
        );

        assert!(inject_all(&core_path, &map, &[&dump]).expect("inject"));

        let core = std::fs::read(&core_path).expect("read core");
        assert_eq!(&core[0x30..0x34], &[0x7u8; 4]);
        assert!(core[0x90..0x94].iter().all(|b| *b == 0));
    }

    #[test]
    fn injection_is_idempotent() {
        let (dir, core_path) = setup(0x100);
        let dump = write_file(dir.path(), "buf", &[0x42u8; 8]);
        let map = write_file(dir.path(), "symbol.map", b"8 8 D buf\n");

        assert!(inject_all(&core_path, &map, &[&dump]).expect("first"));
        let first = std::fs::read(&core_path).expect("read");
        assert!(inject_all(&core_path, &map, &[&dump]).expect("second"));
        let second = std::fs::read(&core_path).expect("read");
        assert_eq!(first, second);
    }

    #[test]
    fn missing_dump_file_fails_but_continues() {
        let (dir, core_path) = setup(0x100);
        let present = write_file(dir.path(), "buf", &[1u8; 2]);
        let map = write_file(dir.path(), "symbol.map", b"10 2 D buf\n");
        let missing = dir.path().join("missing");

        let ok = inject_all(&core_path, &map, &[&missing, &present]).expect("inject");
        assert!(!ok);

        let core = std::fs::read(&core_path).expect("read");
        assert_eq!(&core[0x10..0x12], &[1u8, 1u8]);
    }

    #[test]
    fn missing_core_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let map = write_file(dir.path(), "symbol.map", b"");
        let dump = write_file(dir.path(), "buf", &[0u8]);
        assert!(inject_all(&dir.path().join("nope"), &map, &[&dump]).is_err());
    }

    #[test]
    fn undersized_dump_file_reports_error() {
        let (dir, core_path) = setup(0x100);
        let dump = write_file(dir.path(), "buf", &[1u8; 2]);
        let map = write_file(dir.path(), "symbol.map", b"10 8 D buf\n");

        let ok = inject_all(&core_path, &map, &[&dump]).expect("inject");
        assert!(!ok);
    }
}
