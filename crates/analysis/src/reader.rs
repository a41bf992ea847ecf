//! Trace file reader
//!
//! Opening a trace validates everything that can be checked without
//! decompressing: header magic and version, that every section lies inside
//! the file, that every branch and image record decodes, and that every
//! image's captured bytes lie inside the file. After that the branch and
//! image tables are served as views over the mapped bytes; entries are
//! decompressed lazily, and afresh for each call to `entries`.

use crate::entries::EntryIter;
use crate::error::{TraceReadError, TraceResult};
use brtrace_core::{
    Branch, BranchType, FileHeader, ImageRef, BRANCH_RECORD_SIZE, HEADER_SIZE, IMAGE_RECORD_SIZE,
};
use memmap2::Mmap;
use std::fs::File;
use std::ops::Range;
use std::path::Path;
use tracing::debug;

/// Backing storage for a trace: owned bytes or a read-only mapping
enum TraceData {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl TraceData {
    fn as_bytes(&self) -> &[u8] {
        match self {
            TraceData::Owned(v) => v,
            TraceData::Mmap(m) => m,
        }
    }
}

/// A validated trace file
pub struct TraceFile {
    data: TraceData,
    header: FileHeader,
    entries: Range<usize>,
    branches: Range<usize>,
    images: Range<usize>,
}

impl TraceFile {
    /// Map and validate the trace at `path`
    pub fn open(path: impl AsRef<Path>) -> TraceResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let size = file.metadata()?.len();
        if size < HEADER_SIZE as u64 {
            return Err(TraceReadError::FileTooSmall {
                size,
                minimum: HEADER_SIZE as u64,
            });
        }
        // SAFETY: the mapping is read-only and traces are never modified
        // after their final rename.
        let mmap = unsafe { Mmap::map(&file)? };
        let trace = Self::validate_and_create(TraceData::Mmap(mmap))?;
        debug!(
            path = %path.display(),
            num_entries = trace.header.num_entries,
            num_branches = trace.header.num_branches,
            num_images = trace.header.num_images,
            "Opened trace"
        );
        Ok(trace)
    }

    /// Validate a trace held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> TraceResult<Self> {
        Self::validate_and_create(TraceData::Owned(bytes))
    }

    fn validate_and_create(data: TraceData) -> TraceResult<Self> {
        let bytes = data.as_bytes();
        let file_size = bytes.len() as u64;
        if bytes.len() < HEADER_SIZE {
            return Err(TraceReadError::FileTooSmall {
                size: file_size,
                minimum: HEADER_SIZE as u64,
            });
        }

        let header = FileHeader::from_bytes(bytes)?;
        header.validate().map_err(TraceReadError::from_header)?;

        let entries = section(
            "entries",
            header.entries_offset,
            Some(header.entries_size),
            file_size,
        )?;
        let branches = section(
            "branches",
            header.branches_offset,
            header.branches_size(),
            file_size,
        )?;
        let images = section(
            "images",
            header.images_offset,
            header.images_size(),
            file_size,
        )?;

        for record in bytes[branches.clone()].chunks_exact(BRANCH_RECORD_SIZE) {
            Branch::from_bytes(record)?;
        }
        for (index, record) in bytes[images.clone()]
            .chunks_exact(IMAGE_RECORD_SIZE)
            .enumerate()
        {
            let image = ImageRef::from_bytes(record)?;
            let in_bounds = image
                .data_offset
                .checked_add(image.data_size)
                .map_or(false, |end| end <= file_size);
            if !in_bounds {
                return Err(TraceReadError::ImageDataOutOfBounds {
                    index,
                    offset: image.data_offset,
                    size: image.data_size,
                    file_size,
                });
            }
        }

        Ok(TraceFile {
            data,
            header,
            entries,
            branches,
            images,
        })
    }

    fn bytes(&self) -> &[u8] {
        self.data.as_bytes()
    }

    /// The validated header
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Entries declared by the header
    pub fn num_entries(&self) -> u64 {
        self.header.num_entries
    }

    /// Distinct branches
    pub fn num_branches(&self) -> u64 {
        self.header.num_branches
    }

    /// Captured images
    pub fn num_images(&self) -> u64 {
        self.header.num_images
    }

    /// Total file size in bytes
    pub fn file_size(&self) -> u64 {
        self.bytes().len() as u64
    }

    /// Decode the entry stream from the start
    pub fn entries(&self) -> TraceResult<EntryIter<'_>> {
        EntryIter::new(
            &self.bytes()[self.entries.clone()],
            self.header.num_branches,
            self.header.num_entries,
        )
    }

    /// The compressed entry span
    pub fn entries_span(&self) -> &[u8] {
        &self.bytes()[self.entries.clone()]
    }

    /// Branch table view
    pub fn branches(&self) -> BranchView<'_> {
        BranchView {
            bytes: &self.bytes()[self.branches.clone()],
        }
    }

    /// Image table view
    pub fn images(&self) -> ImageView<'_> {
        ImageView {
            bytes: &self.bytes()[self.images.clone()],
        }
    }

    /// Captured bytes of `image`, if they lie inside this file
    pub fn image_data(&self, image: &ImageRef<'_>) -> Option<&[u8]> {
        let start = usize::try_from(image.data_offset).ok()?;
        let len = usize::try_from(image.data_size).ok()?;
        self.bytes().get(start..start.checked_add(len)?)
    }

    /// Describe `addr` as `<image>:0x<offset>`, or `unknown:0x<addr>`
    pub fn locate(&self, addr: u64) -> String {
        match self.images().iter().find(|image| image.contains(addr)) {
            Some(image) => format!("{}:0x{:x}", image.filename, addr - image.start),
            None => format!("unknown:0x{:x}", addr),
        }
    }

    /// Distinct branches per type, indexed by `BranchType::index`
    pub fn static_type_counts(&self) -> [u64; BranchType::COUNT] {
        let mut counts = [0u64; BranchType::COUNT];
        for branch in self.branches().iter() {
            counts[branch.branch_type.index()] += 1;
        }
        counts
    }

    /// Whole-file bits per recorded entry, `None` for an empty trace
    pub fn bits_per_entry(&self) -> Option<f64> {
        if self.header.num_entries == 0 {
            return None;
        }
        Some(self.file_size() as f64 * 8.0 / self.header.num_entries as f64)
    }
}

impl std::fmt::Debug for TraceFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backing = match self.data {
            TraceData::Owned(_) => "owned",
            TraceData::Mmap(_) => "mmap",
        };
        f.debug_struct("TraceFile")
            .field("backing", &backing)
            .field("header", &self.header)
            .finish()
    }
}

/// Checked `[offset, offset + len)` inside a file of `file_size` bytes
fn section(
    name: &'static str,
    offset: u64,
    len: Option<u64>,
    file_size: u64,
) -> TraceResult<Range<usize>> {
    let out_of_bounds = || TraceReadError::SectionOutOfBounds {
        section: name,
        offset,
        len: len.unwrap_or(u64::MAX),
        file_size,
    };
    let len = len.ok_or_else(out_of_bounds)?;
    let end = offset.checked_add(len).ok_or_else(out_of_bounds)?;
    if end > file_size {
        return Err(out_of_bounds());
    }
    // Both fit: end <= file_size, which came from a slice length
    Ok(offset as usize..end as usize)
}

/// Zero-copy view over the packed branch records
#[derive(Debug, Clone, Copy)]
pub struct BranchView<'a> {
    bytes: &'a [u8],
}

impl<'a> BranchView<'a> {
    /// Number of branches
    pub fn len(&self) -> usize {
        self.bytes.len() / BRANCH_RECORD_SIZE
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Branch at `index`
    pub fn get(&self, index: u32) -> Option<Branch> {
        let start = (index as usize).checked_mul(BRANCH_RECORD_SIZE)?;
        let record = self.bytes.get(start..start + BRANCH_RECORD_SIZE)?;
        Branch::from_bytes(record).ok()
    }

    /// Branches in index order
    pub fn iter(&self) -> impl Iterator<Item = Branch> + 'a {
        self.bytes
            .chunks_exact(BRANCH_RECORD_SIZE)
            .filter_map(|record| Branch::from_bytes(record).ok())
    }
}

/// Zero-copy view over the packed image records
#[derive(Debug, Clone, Copy)]
pub struct ImageView<'a> {
    bytes: &'a [u8],
}

impl<'a> ImageView<'a> {
    /// Number of images
    pub fn len(&self) -> usize {
        self.bytes.len() / IMAGE_RECORD_SIZE
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Image at `index`, filename borrowed from the file
    pub fn get(&self, index: usize) -> Option<ImageRef<'a>> {
        let start = index.checked_mul(IMAGE_RECORD_SIZE)?;
        let record = self.bytes.get(start..start + IMAGE_RECORD_SIZE)?;
        ImageRef::from_bytes(record).ok()
    }

    /// Images in registration order
    pub fn iter(&self) -> impl Iterator<Item = ImageRef<'a>> + 'a {
        self.bytes
            .chunks_exact(IMAGE_RECORD_SIZE)
            .filter_map(|record| ImageRef::from_bytes(record).ok())
    }
}
