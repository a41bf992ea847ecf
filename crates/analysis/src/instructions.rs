//! Executed instruction counting
//!
//! Captured images are parsed as object files and their code sections
//! disassembled, giving every instruction a sequential index. Between two
//! consecutive taken branches execution falls straight through, so the
//! instructions run in that stretch are the index distance from the
//! previous taken branch's target to the current branch, inclusive.
//!
//! ```text
//! taken branch A ──> target T ... fallthrough ... taken branch B
//!                    index(T)                     index(B)
//!                    executed += index(B) - index(T) + 1
//! ```

use crate::error::{TraceReadError, TraceResult};
use crate::reader::TraceFile;
use brtrace_core::{Branch, Entry};
use capstone::prelude::*;
use object::{Architecture, Object, ObjectSection, ObjectSegment, SectionKind};
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;

const PAGE_SIZE: u64 = 4096;

/// Runtime instruction address to sequential instruction index
#[derive(Debug, Default)]
pub struct InstructionMap {
    index: FxHashMap<u64, u64>,
    next: u64,
    images_mapped: usize,
}

impl InstructionMap {
    /// Empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Map the code of every captured image in `trace`
    ///
    /// Images that do not parse as an object file, or whose architecture
    /// has no disassembler, are skipped.
    pub fn from_trace(trace: &TraceFile) -> TraceResult<Self> {
        let mut map = Self::new();
        for image in trace.images().iter() {
            if let Some(data) = trace.image_data(&image) {
                map.add_image(image.start, data)?;
            }
        }
        debug!(
            images = map.images_mapped,
            instructions = map.len(),
            "Built instruction map"
        );
        Ok(map)
    }

    /// Disassemble the code sections of an object file loaded at `load_addr`
    ///
    /// Returns whether the image contributed to the map.
    pub fn add_image(&mut self, load_addr: u64, data: &[u8]) -> TraceResult<bool> {
        let file = match object::File::parse(data) {
            Ok(file) => file,
            Err(err) => {
                debug!(load_addr, error = %err, "Image is not an object file, skipping");
                return Ok(false);
            }
        };
        let cs = match disassembler(file.architecture())? {
            Some(cs) => cs,
            None => {
                debug!(load_addr, architecture = ?file.architecture(), "No disassembler, skipping");
                return Ok(false);
            }
        };

        // Lowest file-backed segment is what the loader places at load_addr
        let linked_base = file
            .segments()
            .filter(|segment| segment.file_range().1 > 0)
            .map(|segment| segment.address())
            .min()
            .unwrap_or(0)
            & !(PAGE_SIZE - 1);
        let bias = load_addr.wrapping_sub(linked_base);

        for section in file.sections() {
            if section.kind() != SectionKind::Text {
                continue;
            }
            let code = match section.data() {
                Ok(code) => code,
                Err(err) => {
                    debug!(load_addr, error = %err, "Unreadable code section");
                    continue;
                }
            };
            let insns = cs
                .disasm_all(code, section.address().wrapping_add(bias))
                .map_err(|err| TraceReadError::disassembly(err.to_string()))?;
            for insn in insns.iter() {
                self.index.entry(insn.address()).or_insert(self.next);
                self.next += 1;
            }
        }
        self.images_mapped += 1;
        Ok(true)
    }

    /// Index of the instruction starting at `addr`
    pub fn index_of(&self, addr: u64) -> Option<u64> {
        self.index.get(&addr).copied()
    }

    /// Number of mapped instructions
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Images that contributed code
    pub fn images_mapped(&self) -> usize {
        self.images_mapped
    }
}

fn disassembler(architecture: Architecture) -> TraceResult<Option<Capstone>> {
    let built = match architecture {
        Architecture::X86_64 => Capstone::new()
            .x86()
            .mode(arch::x86::ArchMode::Mode64)
            .build(),
        Architecture::I386 => Capstone::new()
            .x86()
            .mode(arch::x86::ArchMode::Mode32)
            .build(),
        Architecture::Aarch64 => Capstone::new()
            .arm64()
            .mode(arch::arm64::ArchMode::Arm)
            .build(),
        _ => return Ok(None),
    };
    built
        .map(Some)
        .map_err(|err| TraceReadError::disassembly(err.to_string()))
}

/// Instruction count result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InstructionCount {
    /// Instructions executed between the first and last taken branch
    pub executed: u64,
    /// Stretches skipped because an endpoint was not in mapped code
    pub unresolved: u64,
    /// Size of the instruction map the count was made against
    pub mapped_instructions: u64,
}

/// Streaming instruction counter over decoded entries
#[derive(Debug)]
pub struct InstructionCounter {
    // (branch instruction index, target index) per branch
    sites: Vec<(Option<u64>, Option<u64>)>,
    started: bool,
    last_target: Option<u64>,
    count: InstructionCount,
}

impl InstructionCounter {
    /// Resolve every branch of the table against `map`
    pub fn new<I>(map: &InstructionMap, branches: I) -> Self
    where
        I: IntoIterator<Item = Branch>,
    {
        let sites = branches
            .into_iter()
            .map(|b| (map.index_of(b.inst_addr), map.index_of(b.targ_addr)))
            .collect();
        InstructionCounter {
            sites,
            started: false,
            last_target: None,
            count: InstructionCount {
                mapped_instructions: map.len() as u64,
                ..Default::default()
            },
        }
    }

    /// Account for one entry; not-taken branches fall through and cost nothing extra
    pub fn record(&mut self, entry: Entry) {
        if !entry.taken() {
            return;
        }
        let (pc, target) = self
            .sites
            .get(entry.branch_index() as usize)
            .copied()
            .unwrap_or((None, None));

        if self.started {
            match (self.last_target, pc) {
                (Some(from), Some(to)) if to >= from => self.count.executed += to - from + 1,
                _ => self.count.unresolved += 1,
            }
        }
        self.started = true;
        self.last_target = target;
    }

    /// Counts so far
    pub fn count(&self) -> InstructionCount {
        self.count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use brtrace_core::BranchType;
    use object::write;
    use object::{BinaryFormat, Endianness};

    // 0x0 push rbp; 0x1 mov rbp, rsp; 0x4 nop; 0x5 nop; 0x6 jmp 0xa;
    // 0x8 nop; 0x9 nop; 0xa ret
    const CODE: &[u8] = &[
        0x55, 0x48, 0x89, 0xe5, 0x90, 0x90, 0xeb, 0x02, 0x90, 0x90, 0xc3,
    ];
    const LOAD: u64 = 0x40_0000;

    fn elf_with_code(code: &[u8]) -> Vec<u8> {
        let mut obj = write::Object::new(
            BinaryFormat::Elf,
            Architecture::X86_64,
            Endianness::Little,
        );
        let text = obj.add_section(Vec::new(), b".text".to_vec(), SectionKind::Text);
        obj.append_section_data(text, code, 16);
        obj.write().unwrap()
    }

    fn taken(index: u32) -> Entry {
        Entry::new(index, true).unwrap()
    }

    #[test]
    fn test_map_indexes_every_instruction() {
        let mut map = InstructionMap::new();
        assert!(map.add_image(LOAD, &elf_with_code(CODE)).unwrap());

        assert_eq!(map.len(), 8);
        assert_eq!(map.images_mapped(), 1);
        assert_eq!(map.index_of(LOAD), Some(0));
        assert_eq!(map.index_of(LOAD + 0x4), Some(2));
        assert_eq!(map.index_of(LOAD + 0xa), Some(7));
        // Middle of the mov
        assert_eq!(map.index_of(LOAD + 0x2), None);
    }

    #[test]
    fn test_non_object_image_is_skipped() {
        let mut map = InstructionMap::new();
        assert!(!map.add_image(0x7f00_0000, b"anonymous jit bytes").unwrap());
        assert!(!map.add_image(0x7f00_0000, &[]).unwrap());
        assert!(map.is_empty());
        assert_eq!(map.images_mapped(), 0);
    }

    #[test]
    fn test_counts_fallthrough_between_taken_branches() {
        let mut map = InstructionMap::new();
        map.add_image(LOAD, &elf_with_code(CODE)).unwrap();

        let branches = vec![
            Branch::new(LOAD + 0x6, LOAD + 0xa, 2, BranchType::DirectJump),
            Branch::new(LOAD + 0xa, LOAD + 0x1, 1, BranchType::Return),
        ];
        let mut counter = InstructionCounter::new(&map, branches);

        counter.record(taken(0)); // start: nothing before the first taken branch
        counter.record(taken(1)); // ret right at the jmp target: 1
        counter.record(Entry::new(0, false).unwrap()); // not taken, ignored
        counter.record(taken(0)); // mov, nop, nop, jmp: 4

        let count = counter.count();
        assert_eq!(count.executed, 5);
        assert_eq!(count.unresolved, 0);
        assert_eq!(count.mapped_instructions, 8);
    }

    #[test]
    fn test_unmapped_endpoints_are_unresolved() {
        let mut map = InstructionMap::new();
        map.add_image(LOAD, &elf_with_code(CODE)).unwrap();

        let branches = vec![
            Branch::new(LOAD + 0x6, LOAD + 0xa, 2, BranchType::DirectJump),
            Branch::new(0x9000_0000, LOAD, 5, BranchType::IndirectCall),
        ];
        let mut counter = InstructionCounter::new(&map, branches);

        counter.record(taken(0));
        counter.record(taken(1)); // call site outside any image
        counter.record(taken(0)); // push .. jmp from LOAD: 5

        let count = counter.count();
        assert_eq!(count.executed, 5);
        assert_eq!(count.unresolved, 1);
    }

    #[test]
    fn test_empty_map_counts_nothing() {
        let map = InstructionMap::new();
        let branches = vec![Branch::new(0x10, 0x20, 2, BranchType::DirectJump)];
        let mut counter = InstructionCounter::new(&map, branches);
        for _ in 0..3 {
            counter.record(taken(0));
        }
        assert_eq!(counter.count().executed, 0);
        assert_eq!(counter.count().unresolved, 2);
    }
}
