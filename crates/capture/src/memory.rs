//! Live memory access for image snapshots
//!
//! Images with no readable backing file are captured from the address
//! space instead. The capture code only needs `read_at`, so tests and
//! foreign hosts can supply their own source.

use std::io;

/// Something that can copy bytes out of a traced address space
pub trait MemorySource: Send {
    /// Fill `buf` with the bytes mapped at `addr`
    ///
    /// Must either fill the whole buffer or fail.
    fn read_at(&mut self, addr: u64, buf: &mut [u8]) -> io::Result<()>;
}

/// The current process's address space, read through `/proc/self/mem`
///
/// The file is opened on first use.
#[derive(Debug, Default)]
pub struct ProcessMemory {
    #[cfg(target_os = "linux")]
    mem: Option<std::fs::File>,
}

impl ProcessMemory {
    /// Create a handle; no file is opened yet
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(target_os = "linux")]
impl MemorySource for ProcessMemory {
    fn read_at(&mut self, addr: u64, buf: &mut [u8]) -> io::Result<()> {
        use std::os::unix::fs::FileExt;

        let mem = match &mut self.mem {
            Some(file) => file,
            slot => slot.insert(std::fs::File::open("/proc/self/mem")?),
        };
        mem.read_exact_at(buf, addr)
    }
}

#[cfg(not(target_os = "linux"))]
impl MemorySource for ProcessMemory {
    fn read_at(&mut self, _addr: u64, _buf: &mut [u8]) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "process memory snapshots require /proc/self/mem",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_reads_own_heap() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let mut out = vec![0u8; data.len()];

        let mut mem = ProcessMemory::new();
        mem.read_at(data.as_ptr() as u64, &mut out).unwrap();
        assert_eq!(out, data);

        // Second read reuses the open handle
        let mut head = [0u8; 4];
        mem.read_at(data.as_ptr() as u64 + 1, &mut head).unwrap();
        assert_eq!(head, [1, 2, 3, 4]);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_unmapped_address_fails() {
        let mut mem = ProcessMemory::new();
        let mut buf = [0u8; 16];
        assert!(mem.read_at(0, &mut buf).is_err());
    }
}
