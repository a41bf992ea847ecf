//! Static branch identity
//!
//! # Record Layout (24 bytes, little-endian)
//!
//! ```text
//! inst_addr(8) + targ_addr(8) + inst_length(4) + type_tag(4) = 24 bytes
//! ```
//!
//! Two dynamic executions belong to the same branch iff all four fields match.

use crate::error::{FormatError, FormatResult};
use crate::{le_u32, le_u64};
use serde::Serialize;
use std::fmt;

/// Size of one packed branch record
pub const BRANCH_RECORD_SIZE: usize = 24;

/// Control-flow instruction classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum BranchType {
    /// `jmp imm`
    DirectJump,
    /// `jmp reg`
    IndirectJump,
    /// `call imm`
    DirectCall,
    /// `call reg`
    IndirectCall,
    /// `ret`
    Return,
    /// `jcc imm`
    ConditionalDirectJump,
}

impl BranchType {
    /// Number of branch types
    pub const COUNT: usize = 6;

    /// All branch types in tag order
    pub const ALL: [BranchType; Self::COUNT] = [
        BranchType::DirectJump,
        BranchType::IndirectJump,
        BranchType::DirectCall,
        BranchType::IndirectCall,
        BranchType::Return,
        BranchType::ConditionalDirectJump,
    ];

    /// On-disk tag
    pub fn tag(self) -> u32 {
        match self {
            BranchType::DirectJump => 0,
            BranchType::IndirectJump => 1,
            BranchType::DirectCall => 2,
            BranchType::IndirectCall => 3,
            BranchType::Return => 4,
            BranchType::ConditionalDirectJump => 5,
        }
    }

    /// Decode an on-disk tag
    pub fn from_tag(tag: u32) -> Option<Self> {
        Self::ALL.get(tag as usize).copied()
    }

    /// Dense index, usable for per-type arrays
    pub fn index(self) -> usize {
        self.tag() as usize
    }

    /// Human-readable label
    pub fn label(self) -> &'static str {
        match self {
            BranchType::DirectJump => "direct jump",
            BranchType::IndirectJump => "indirect jump",
            BranchType::DirectCall => "direct call",
            BranchType::IndirectCall => "indirect call",
            BranchType::Return => "return",
            BranchType::ConditionalDirectJump => "conditional direct jump",
        }
    }

    /// Whether executions of this type can be not-taken
    pub fn is_conditional(self) -> bool {
        matches!(self, BranchType::ConditionalDirectJump)
    }
}

impl fmt::Display for BranchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A static branch, identified by address, target, length and type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Branch {
    /// Address of the branch instruction
    pub inst_addr: u64,
    /// Branch target address
    pub targ_addr: u64,
    /// Instruction length in bytes
    pub inst_length: u32,
    /// Classification
    pub branch_type: BranchType,
}

impl Branch {
    /// Create a new branch identity
    pub fn new(inst_addr: u64, targ_addr: u64, inst_length: u32, branch_type: BranchType) -> Self {
        Branch {
            inst_addr,
            targ_addr,
            inst_length,
            branch_type,
        }
    }

    /// Address of the next sequential instruction
    pub fn fallthrough_addr(&self) -> u64 {
        self.inst_addr.wrapping_add(u64::from(self.inst_length))
    }

    /// Serialize to the packed record
    pub fn to_bytes(&self) -> [u8; BRANCH_RECORD_SIZE] {
        let mut bytes = [0u8; BRANCH_RECORD_SIZE];
        bytes[0..8].copy_from_slice(&self.inst_addr.to_le_bytes());
        bytes[8..16].copy_from_slice(&self.targ_addr.to_le_bytes());
        bytes[16..20].copy_from_slice(&self.inst_length.to_le_bytes());
        bytes[20..24].copy_from_slice(&self.branch_type.tag().to_le_bytes());
        bytes
    }

    /// Parse a packed record from the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> FormatResult<Self> {
        if bytes.len() < BRANCH_RECORD_SIZE {
            return Err(FormatError::truncated(
                "branch",
                BRANCH_RECORD_SIZE,
                bytes.len(),
            ));
        }
        let tag = le_u32(bytes, 20);
        let branch_type = BranchType::from_tag(tag).ok_or(FormatError::InvalidBranchType(tag))?;
        Ok(Branch {
            inst_addr: le_u64(bytes, 0),
            targ_addr: le_u64(bytes, 8),
            inst_length: le_u32(bytes, 16),
            branch_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_order_is_stable() {
        for (i, ty) in BranchType::ALL.iter().enumerate() {
            assert_eq!(ty.tag() as usize, i);
            assert_eq!(BranchType::from_tag(i as u32), Some(*ty));
        }
        assert_eq!(BranchType::from_tag(6), None);
        assert_eq!(BranchType::from_tag(u32::MAX), None);
    }

    #[test]
    fn test_branch_record_layout() {
        let br = Branch::new(0x401000, 0x401234, 5, BranchType::DirectCall);
        let bytes = br.to_bytes();

        assert_eq!(u64::from_le_bytes(bytes[0..8].try_into().unwrap()), 0x401000);
        assert_eq!(u64::from_le_bytes(bytes[8..16].try_into().unwrap()), 0x401234);
        assert_eq!(u32::from_le_bytes(bytes[16..20].try_into().unwrap()), 5);
        assert_eq!(u32::from_le_bytes(bytes[20..24].try_into().unwrap()), 2);

        assert_eq!(Branch::from_bytes(&bytes).unwrap(), br);
    }

    #[test]
    fn test_from_bytes_rejects_bad_tag() {
        let mut bytes = Branch::new(1, 2, 2, BranchType::Return).to_bytes();
        bytes[20..24].copy_from_slice(&6u32.to_le_bytes());
        assert_eq!(
            Branch::from_bytes(&bytes),
            Err(FormatError::InvalidBranchType(6))
        );
    }

    #[test]
    fn test_from_bytes_rejects_short_input() {
        let err = Branch::from_bytes(&[0u8; 23]).unwrap_err();
        assert!(matches!(
            err,
            FormatError::Truncated {
                expected: 24,
                actual: 23,
                ..
            }
        ));
    }

    #[test]
    fn test_identity_includes_all_fields() {
        let a = Branch::new(0x10, 0x20, 2, BranchType::ConditionalDirectJump);
        assert_ne!(a, Branch { inst_length: 6, ..a });
        assert_ne!(a, Branch { targ_addr: 0x30, ..a });
        assert_ne!(
            a,
            Branch {
                branch_type: BranchType::DirectJump,
                ..a
            }
        );
    }

    #[test]
    fn test_labels_and_display() {
        assert_eq!(BranchType::ConditionalDirectJump.label(), "conditional direct jump");
        assert_eq!(BranchType::IndirectCall.to_string(), "IndirectCall");
        assert!(BranchType::ConditionalDirectJump.is_conditional());
        assert!(!BranchType::Return.is_conditional());
        assert_eq!(Branch::new(0x100, 0, 6, BranchType::DirectJump).fallthrough_addr(), 0x106);
    }

    #[test]
    fn test_serializes_by_field_name() {
        let br = Branch::new(0x10, 0x20, 2, BranchType::ConditionalDirectJump);
        let json = serde_json::to_value(br).unwrap();
        assert_eq!(json["inst_addr"], 0x10);
        assert_eq!(json["branch_type"], "ConditionalDirectJump");
    }
}
