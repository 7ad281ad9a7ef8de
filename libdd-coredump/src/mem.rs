// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Positional byte reads against `/proc/<pid>/mem`. The primitive shared by
//! every phase that chases pointers through the target's address space.

use crate::error::DumpError;
use std::ffi::CString;
use std::fs::File;
use std::os::unix::fs::FileExt;

/// Longest remote C string we are willing to fetch, terminator included.
pub const REMOTE_STRING_MAX: usize = 4096;

pub struct RemoteMem {
    file: File,
}

impl RemoteMem {
    pub fn open(pid: libc::pid_t) -> Result<Self, DumpError> {
        let file = File::open(format!("/proc/{pid}/mem"))
            .map_err(|e| DumpError::io("open target mem", e))?;
        Ok(Self { file })
    }

    #[cfg(test)]
    pub(crate) fn open_self() -> Self {
        Self {
            file: File::open("/proc/self/mem").expect("open /proc/self/mem"),
        }
    }

    pub fn read_exact(&self, addr: u64, buf: &mut [u8]) -> Result<(), DumpError> {
        self.file.read_exact_at(buf, addr).map_err(|e| {
            tracing::warn!(
                "remote read failed: len={}, addr={:#x}: {e}",
                buf.len(),
                addr
            );
            DumpError::io("remote read", e)
        })
    }

    pub fn read_bytes(&self, addr: u64, len: usize) -> Result<Vec<u8>, DumpError> {
        let mut buf = vec![0u8; len];
        self.read_exact(addr, &mut buf)?;
        Ok(buf)
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64, DumpError> {
        let mut buf = [0u8; 8];
        self.read_exact(addr, &mut buf)?;
        Ok(u64::from_ne_bytes(buf))
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32, DumpError> {
        let mut buf = [0u8; 4];
        self.read_exact(addr, &mut buf)?;
        Ok(u32::from_ne_bytes(buf))
    }

    pub fn read_i32(&self, addr: u64) -> Result<i32, DumpError> {
        let mut buf = [0u8; 4];
        self.read_exact(addr, &mut buf)?;
        Ok(i32::from_ne_bytes(buf))
    }

    /// Read a `#[repr(C)]` plain-data struct out of the target.
    ///
    /// SAFETY: callers instantiate this only with field-by-field plain-old-data
    /// structs for which any bit pattern is a valid value.
    pub fn read_pod<T: Copy>(&self, addr: u64) -> Result<T, DumpError> {
        let mut value = std::mem::MaybeUninit::<T>::zeroed();
        let buf = unsafe {
            std::slice::from_raw_parts_mut(
                value.as_mut_ptr() as *mut u8,
                std::mem::size_of::<T>(),
            )
        };
        self.read_exact(addr, buf)?;
        Ok(unsafe { value.assume_init() })
    }

    /// Fetch a NUL-terminated string from the target, one byte at a time, up
    /// to a cap of [`REMOTE_STRING_MAX`] - 1 payload bytes. A null address is
    /// rejected rather than read.
    pub fn read_string(&self, addr: u64) -> Result<CString, DumpError> {
        if addr == 0 {
            return Err(DumpError::io(
                "remote string read",
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            ));
        }

        let mut bytes = Vec::new();
        for i in 0..REMOTE_STRING_MAX - 1 {
            let mut b = [0u8; 1];
            self.read_exact(addr + i as u64, &mut b)?;
            if b[0] == 0 {
                break;
            }
            bytes.push(b[0]);
        }

        // bytes holds no interior NUL by construction
        CString::new(bytes).map_err(|_| {
            DumpError::io(
                "remote string read",
                std::io::Error::from(std::io::ErrorKind::InvalidData),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_own_static_buffer() {
        static DATA: [u8; 8] = [1, 2, 3, 4, 5, 6, 7, 8];
        let mem = RemoteMem::open_self();
        let got = mem.read_bytes(DATA.as_ptr() as u64, 8).expect("read self");
        assert_eq!(got, DATA);
    }

    #[test]
    fn read_own_u64() {
        static VALUE: u64 = 0xdead_beef_cafe_f00d;
        let mem = RemoteMem::open_self();
        let got = mem.read_u64(&VALUE as *const u64 as u64).expect("read u64");
        assert_eq!(got, VALUE);
    }

    #[test]
    fn read_string_stops_at_nul() {
        static S: &[u8] = b"hello world\0trailing";
        let mem = RemoteMem::open_self();
        let got = mem.read_string(S.as_ptr() as u64).expect("read string");
        assert_eq!(got.as_bytes(), b"hello world");
    }

    #[test]
    fn read_string_rejects_null() {
        let mem = RemoteMem::open_self();
        assert!(mem.read_string(0).is_err());
    }
}
