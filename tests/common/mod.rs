//! Shared helpers for the integration suites.
//!
//! Import via `mod common;`.

#![allow(dead_code)]

use brtrace::{
    Branch, BranchType, CaptureConfig, CaptureSession, MemorySource, TraceFile, TraceHost,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::{self, Cursor};
use std::path::Path;

/// One host callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    pub branch: Branch,
    pub taken: bool,
}

impl Event {
    pub fn new(inst_addr: u64, targ_addr: u64, len: u32, ty: BranchType, taken: bool) -> Self {
        Event {
            branch: Branch::new(inst_addr, targ_addr, len, ty),
            taken,
        }
    }
}

/// Memory source that refuses every read
pub struct NoMemory;

impl MemorySource for NoMemory {
    fn read_at(&mut self, _addr: u64, _buf: &mut [u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "no memory"))
    }
}

/// Address space backed by one byte vector mapped at `base`
pub struct FakeMemory {
    pub base: u64,
    pub bytes: Vec<u8>,
}

impl MemorySource for FakeMemory {
    fn read_at(&mut self, addr: u64, buf: &mut [u8]) -> io::Result<()> {
        let off = addr
            .checked_sub(self.base)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "unmapped"))? as usize;
        let src = self
            .bytes
            .get(off..off + buf.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "unmapped"))?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

fn record_all<H: TraceHost>(host: &mut H, events: &[Event]) {
    for e in events {
        let b = e.branch;
        host.record_branch(b.inst_addr, b.targ_addr, b.inst_length, b.branch_type, e.taken)
            .unwrap();
    }
}

/// Capture `events` into an in-memory trace
pub fn capture_to_vec(events: &[Event], config: CaptureConfig) -> Vec<u8> {
    let mut session = CaptureSession::new(Cursor::new(Vec::new()), config)
        .unwrap()
        .with_memory_source(NoMemory);
    record_all(&mut session, events);
    session.finish_into_inner().unwrap().0.into_inner()
}

/// Capture `events` into a trace file at `path`
pub fn capture_to_file(path: &Path, events: &[Event], config: CaptureConfig) {
    let mut session = CaptureSession::create(path, config)
        .unwrap()
        .with_memory_source(NoMemory);
    record_all(&mut session, events);
    session.finish().unwrap();
}

/// Decode every entry back into `(branch, taken)` pairs
pub fn decode(trace: &TraceFile) -> Vec<Event> {
    let branches = trace.branches();
    trace
        .entries()
        .unwrap()
        .map(|entry| {
            let entry = entry.unwrap();
            Event {
                branch: branches.get(entry.branch_index()).unwrap(),
                taken: entry.taken(),
            }
        })
        .collect()
}

/// Deterministic pseudo-random workload drawn from `distinct` branch sites
pub fn workload(seed: u64, len: usize, distinct: u64) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..len)
        .map(|_| {
            let site = rng.gen_range(0..distinct);
            let ty = BranchType::ALL[(site % BranchType::COUNT as u64) as usize];
            Event::new(
                0x40_0000 + site * 16,
                0x50_0000 + site * 64,
                (site % 15) as u32 + 1,
                ty,
                rng.gen_bool(0.6),
            )
        })
        .collect()
}
