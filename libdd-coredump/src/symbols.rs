// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Name→address resolution across the target's loaded objects. Each object
//! contributes its `SHT_SYMTAB` (dynamic symbols are deliberately not
//! consulted: receipts name internal symbols, which only the full symbol
//! table carries).

use crate::error::DumpError;
use std::path::Path;

pub struct SymbolObject {
    /// Relocation of the object in the target (`link_map.l_addr`; 0 for the
    /// executable).
    pub load_base: u64,
    syms: Vec<(String, u64)>,
}

#[derive(Default)]
pub struct SymbolRegistry {
    objects: Vec<SymbolObject>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_base(&self, load_base: u64) -> bool {
        self.objects.iter().any(|o| o.load_base == load_base)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Parse the object on disk and retain its symbol table. An object whose
    /// load base is already registered is skipped; an object without a
    /// symbol table registers empty (lookups simply pass over it).
    pub fn register_file(&mut self, path: &Path, load_base: u64) -> Result<(), DumpError> {
        if self.has_base(load_base) {
            return Ok(());
        }

        let data = std::fs::read(path).map_err(|e| DumpError::io("read object", e))?;
        let elf = goblin::elf::Elf::parse(&data)?;

        let mut syms = Vec::with_capacity(elf.syms.len());
        for sym in elf.syms.iter() {
            if let Some(name) = elf.strtab.get_at(sym.st_name) {
                if !name.is_empty() {
                    syms.push((name.to_string(), sym.st_value));
                }
            }
        }

        tracing::info!(
            "registered {} symbols from {} at base {load_base:#x}",
            syms.len(),
            path.display()
        );

        self.objects.push(SymbolObject { load_base, syms });
        Ok(())
    }

    /// Register one synthetic symbol directly, bypassing the on-disk parse.
    #[cfg(test)]
    pub(crate) fn insert_for_test(&mut self, name: &str, addr: u64) {
        self.objects.push(SymbolObject {
            load_base: 0,
            syms: vec![(name.to_string(), addr)],
        });
    }

    /// Linear first-match scan across all registered objects.
    pub fn lookup(&self, name: &str) -> Option<u64> {
        for object in &self.objects {
            for (sym, value) in &object.syms {
                if sym == name {
                    return Some(object.load_base + value);
                }
            }
        }
        None
    }
}
