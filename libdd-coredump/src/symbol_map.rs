// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The per-dump `symbol.map`: one ASCII line per injectable blob,
//! `<hex-core-offset> <hex-size> <D|I> <identifier>`. The dumper appends,
//! the injector scans; lines that do not match the grammar are ignored and
//! the last entry wins for a given `(identifier, type)`.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapEntryKind {
    /// Payload bytes stored in the core.
    Direct,
    /// An indirection pointer stored in the core.
    Indirect,
}

impl MapEntryKind {
    fn letter(self) -> char {
        match self {
            MapEntryKind::Direct => 'D',
            MapEntryKind::Indirect => 'I',
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapEntry {
    pub core_offset: u64,
    pub size: u64,
    pub kind: MapEntryKind,
    pub ident: String,
}

/// Append one entry to `<dst_dir>/symbol.map`, creating it on first use.
pub fn append_entry(dst_dir: &Path, entry: &MapEntry) -> io::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dst_dir.join("symbol.map"))?;
    writeln!(
        file,
        "{:x} {:x} {} {}",
        entry.core_offset,
        entry.size,
        entry.kind.letter(),
        entry.ident
    )
}

/// Parse one symbol-map line; `None` for anything not matching the grammar.
pub fn parse_line(line: &str) -> Option<MapEntry> {
    let line = line.trim_end_matches(['\r', '\n']);
    let mut parts = line.splitn(4, ' ');

    let core_offset = u64::from_str_radix(parts.next()?, 16).ok()?;
    let size = u64::from_str_radix(parts.next()?, 16).ok()?;
    let kind = match parts.next()? {
        "D" => MapEntryKind::Direct,
        "I" => MapEntryKind::Indirect,
        _ => return None,
    };
    let ident = parts.next()?;
    if ident.is_empty() {
        return None;
    }

    Some(MapEntry {
        core_offset,
        size,
        kind,
        ident: ident.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_then_parse_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let entry = MapEntry {
            core_offset: 0x1100,
            size: 0x10,
            kind: MapEntryKind::Direct,
            ident: "buf".into(),
        };
        append_entry(dir.path(), &entry).expect("append");
        append_entry(dir.path(), &entry).expect("append again");

        let text = std::fs::read_to_string(dir.path().join("symbol.map")).expect("read");
        assert_eq!(text, "1100 10 D buf\n1100 10 D buf\n");
        assert_eq!(parse_line(text.lines().next().expect("line")), Some(entry));
    }

    #[test]
    fn parse_accepts_idents_with_spaces() {
        let entry = parse_line("10 8 I my odd ident\n").expect("entry");
        assert_eq!(entry.ident, "my odd ident");
        assert_eq!(entry.kind, MapEntryKind::Indirect);
        assert_eq!(entry.core_offset, 0x10);
        assert_eq!(entry.size, 8);
    }

    #[test]
    fn parse_ignores_invalid_lines() {
        assert_eq!(parse_line(""), None);
        assert_eq!(parse_line("not a map line"), None);
        assert_eq!(parse_line("zz 10 D buf"), None);
        assert_eq!(parse_line("10 zz D buf"), None);
        assert_eq!(parse_line("10 10 X buf"), None);
        assert_eq!(parse_line("10 10 D"), None);
    }
}
