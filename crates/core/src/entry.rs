//! Dynamic branch execution record
//!
//! One entry is a little-endian `u32`: the low 31 bits hold the branch index,
//! the top bit holds the taken flag.

use crate::error::{FormatError, FormatResult};

/// Size of one packed entry
pub const ENTRY_SIZE: usize = 4;

/// Taken flag
const TAKEN_BIT: u32 = 1 << 31;

/// Branch index mask
const INDEX_MASK: u32 = TAKEN_BIT - 1;

/// Largest number of distinct branches an entry can address
pub const MAX_BRANCHES: u64 = 1 << 31;

/// One dynamic occurrence of a branch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Entry(u32);

impl Entry {
    /// Pack a branch index and taken flag
    pub fn new(branch_index: u32, taken: bool) -> FormatResult<Self> {
        if branch_index & TAKEN_BIT != 0 {
            return Err(FormatError::BranchIndexTooLarge {
                index: u64::from(branch_index),
                max: MAX_BRANCHES - 1,
            });
        }
        Ok(Entry(branch_index | if taken { TAKEN_BIT } else { 0 }))
    }

    /// Index into the branch table
    pub fn branch_index(self) -> u32 {
        self.0 & INDEX_MASK
    }

    /// Whether the branch was taken
    pub fn taken(self) -> bool {
        self.0 & TAKEN_BIT != 0
    }

    /// Raw packed value
    pub fn to_bits(self) -> u32 {
        self.0
    }

    /// Reinterpret a raw packed value
    pub fn from_bits(bits: u32) -> Self {
        Entry(bits)
    }

    /// Serialize to bytes
    pub fn to_bytes(self) -> [u8; ENTRY_SIZE] {
        self.0.to_le_bytes()
    }

    /// Parse from bytes
    pub fn from_bytes(bytes: [u8; ENTRY_SIZE]) -> Self {
        Entry(u32::from_le_bytes(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack() {
        let e = Entry::new(12345, true).unwrap();
        assert_eq!(e.branch_index(), 12345);
        assert!(e.taken());

        let e = Entry::new(12345, false).unwrap();
        assert_eq!(e.branch_index(), 12345);
        assert!(!e.taken());
    }

    #[test]
    fn test_taken_bit_is_msb() {
        let e = Entry::new(1, true).unwrap();
        assert_eq!(e.to_bits(), 0x8000_0001);
        assert_eq!(e.to_bytes(), [0x01, 0x00, 0x00, 0x80]);
        assert_eq!(Entry::from_bytes(e.to_bytes()), e);
    }

    #[test]
    fn test_largest_index() {
        let max = (MAX_BRANCHES - 1) as u32;
        let e = Entry::new(max, false).unwrap();
        assert_eq!(e.branch_index(), max);
        assert!(!e.taken());
    }

    #[test]
    fn test_index_overflowing_into_taken_bit_is_rejected() {
        let err = Entry::new(1 << 31, false).unwrap_err();
        assert!(matches!(err, FormatError::BranchIndexTooLarge { .. }));
    }

    proptest::proptest! {
        #[test]
        fn prop_index_and_flag_survive_packing(index in 0u32..(1 << 31), taken in proptest::bool::ANY) {
            let e = Entry::from_bytes(Entry::new(index, taken).unwrap().to_bytes());
            proptest::prop_assert_eq!(e.branch_index(), index);
            proptest::prop_assert_eq!(e.taken(), taken);
        }
    }
}
