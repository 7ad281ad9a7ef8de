// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! JSON configuration: a required output root plus a `watch` list mapping
//! the dying process's `comm`/`exe` to a per-program receipt. No matching
//! watch entry means the handler has nothing to do for this process.

use crate::error::DumpError;
use serde::Deserialize;
use std::ffi::CString;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/minicoredumper/minicoredumper.cfg.json";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub base_dir: PathBuf,
    #[serde(default)]
    pub watch: Vec<WatchEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchEntry {
    /// Shell glob matched against the kernel-reported command name.
    #[serde(default)]
    pub comm: Option<String>,
    /// Shell glob matched against the resolved executable path.
    #[serde(default)]
    pub exe: Option<String>,
    #[serde(default)]
    pub recept: Receipt,
}

/// Per-program dump selection. Every field has a conservative default so an
/// empty receipt means "strip the core, dump stacks, nothing else".
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Receipt {
    pub dump_scope: u64,
    pub write_debug_log: bool,
    pub write_proc_info: bool,
    pub dump_fat_core: bool,
    pub dump_auxv_so_list: bool,
    pub dump_pthread_list: bool,
    pub dump_robust_mutex_list: bool,
    pub live_dumper: bool,
    pub stack: StackConfig,
    pub maps: MapsConfig,
    pub buffers: Vec<BufferSpec>,
}

impl Default for Receipt {
    fn default() -> Self {
        Self {
            dump_scope: 0,
            write_debug_log: false,
            write_proc_info: false,
            dump_fat_core: false,
            dump_auxv_so_list: false,
            dump_pthread_list: false,
            dump_robust_mutex_list: false,
            live_dumper: false,
            stack: StackConfig::default(),
            maps: MapsConfig::default(),
            buffers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StackConfig {
    pub dump_stacks: bool,
    pub first_thread_only: bool,
    /// 0 means unlimited.
    pub max_stack_size: u64,
}

impl Default for StackConfig {
    fn default() -> Self {
        Self {
            dump_stacks: true,
            first_thread_only: false,
            max_stack_size: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default)]
pub struct MapsConfig {
    pub name_globs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BufferSpec {
    pub symname: String,
    pub data_len: u64,
    #[serde(default)]
    pub follow_ptr: bool,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, DumpError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| DumpError::Config(format!("{}: {e}", path.display())))?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, DumpError> {
        let config: Config =
            serde_json::from_str(text).map_err(|e| DumpError::Config(e.to_string()))?;
        if config.base_dir.as_os_str().is_empty() {
            return Err(DumpError::Config("no base_dir set in config file".into()));
        }
        Ok(config)
    }

    /// First watch entry whose globs match wins; `None` means no receipt and
    /// the dump is a clean no-op.
    pub fn select_receipt(&self, comm: &str, exe: &str) -> Option<&Receipt> {
        self.watch
            .iter()
            .find(|entry| {
                entry.comm.as_deref().is_none_or(|pat| glob_match(pat, comm))
                    && entry.exe.as_deref().is_none_or(|pat| glob_match(pat, exe))
            })
            .map(|entry| &entry.recept)
    }
}

/// Shell-style glob match via fnmatch(3).
pub(crate) fn glob_match(pattern: &str, name: &str) -> bool {
    let (Ok(pattern), Ok(name)) = (CString::new(pattern), CString::new(name)) else {
        return false;
    };
    unsafe { libc::fnmatch(pattern.as_ptr(), name.as_ptr(), 0) == 0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal() {
        let config = Config::parse(r#"{ "base_dir": "/var/crash" }"#).expect("parse");
        assert_eq!(config.base_dir, PathBuf::from("/var/crash"));
        assert!(config.watch.is_empty());
    }

    #[test]
    fn missing_base_dir_is_invalid() {
        assert!(Config::parse(r#"{ "watch": [] }"#).is_err());
        assert!(Config::parse(r#"{ "base_dir": "" }"#).is_err());
    }

    #[test]
    fn receipt_defaults() {
        let config = Config::parse(
            r#"{ "base_dir": "/var/crash", "watch": [ { "comm": "myapp" } ] }"#,
        )
        .expect("parse");
        let recept = config.select_receipt("myapp", "/usr/bin/myapp").expect("receipt");
        assert!(recept.stack.dump_stacks);
        assert!(!recept.write_debug_log);
        assert_eq!(recept.dump_scope, 0);
        assert_eq!(recept.stack.max_stack_size, 0);
    }

    #[test]
    fn no_matching_watch_means_no_receipt() {
        let config = Config::parse(
            r#"{ "base_dir": "/var/crash", "watch": [ { "comm": "other" } ] }"#,
        )
        .expect("parse");
        assert!(config.select_receipt("myapp", "/usr/bin/myapp").is_none());
    }

    #[test]
    fn globs_select_receipts() {
        let config = Config::parse(
            r#"{
                "base_dir": "/var/crash",
                "watch": [
                    { "exe": "/opt/*", "recept": { "dump_scope": 7 } },
                    { "comm": "*", "recept": { "dump_fat_core": true } }
                ]
            }"#,
        )
        .expect("parse");

        let first = config.select_receipt("tool", "/opt/bin/tool").expect("first");
        assert_eq!(first.dump_scope, 7);
        assert!(!first.dump_fat_core);

        let second = config.select_receipt("tool", "/usr/bin/tool").expect("second");
        assert!(second.dump_fat_core);
    }

    #[test]
    fn buffers_and_maps_parse() {
        let config = Config::parse(
            r#"{
                "base_dir": "/var/crash",
                "watch": [ {
                    "recept": {
                        "maps": { "name_globs": ["*libfoo*"] },
                        "buffers": [
                            { "symname": "g_state", "data_len": 64 },
                            { "symname": "g_ring", "data_len": 4096, "follow_ptr": true }
                        ]
                    }
                } ]
            }"#,
        )
        .expect("parse");
        let recept = config.select_receipt("x", "/x").expect("receipt");
        assert_eq!(recept.maps.name_globs, vec!["*libfoo*".to_string()]);
        assert_eq!(recept.buffers.len(), 2);
        assert!(!recept.buffers[0].follow_ptr);
        assert!(recept.buffers[1].follow_ptr);
    }

    #[test]
    fn glob_match_basics() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("/usr/bin/*", "/usr/bin/myapp"));
        assert!(!glob_match("/usr/bin/*", "/opt/myapp"));
        assert!(glob_match("my?pp", "myapp"));
    }
}
