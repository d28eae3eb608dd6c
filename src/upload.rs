//! A device-agnostic upload arena implementing the [`Uploader`] staging
//! contract.
//!
//! Staged bytes and buffer-to-buffer copies land in one device-visible
//! backing buffer, sub-allocated linearly. The arena records the work as
//! pending write/copy operations for the encoder to flush; it never talks
//! to a device itself.

use bytemuck::Pod;

use crate::arena::ByteArena;
use crate::error::StageError;
use crate::finalize::{StagedSlice, Uploader};
use crate::resource::Resource;

pub struct UploadArenaDescriptor {
    /// Capacity of the backing buffer, before per-allocation padding.
    pub capacity: u64,
    /// Minimum alignment applied to every allocation, on top of whatever a
    /// caller requests.
    pub default_alignment: u64,
}

impl Default for UploadArenaDescriptor {
    fn default() -> Self {
        Self {
            capacity: 4 * 1024 * 1024,
            default_alignment: 4,
        }
    }
}

/// A byte write the encoder still has to flush into the backing buffer.
#[derive(Debug)]
pub struct PendingWrite {
    pub offset: u64,
    pub bytes: Vec<u8>,
}

/// A buffer-to-buffer copy the encoder still has to execute.
#[derive(Debug)]
pub struct PendingCopy {
    pub dst_offset: u64,
    pub src: Resource,
    pub src_offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UploadStats {
    pub bytes_written: u64,
    pub bytes_copied: u64,
}

impl UploadStats {
    pub fn bytes_total(&self) -> u64 {
        self.bytes_written + self.bytes_copied
    }
}

pub struct UploadArena {
    backing: Resource,
    arena: ByteArena,
    default_alignment: u64,
    writes: Vec<PendingWrite>,
    copies: Vec<PendingCopy>,
    mapped: bool,
    stats: UploadStats,
}

impl UploadArena {
    pub fn new(desc: UploadArenaDescriptor) -> Self {
        Self {
            backing: Resource::new_buffer(desc.capacity),
            arena: ByteArena::new(desc.capacity),
            default_alignment: desc.default_alignment.max(1),
            writes: Vec::new(),
            copies: Vec::new(),
            mapped: false,
            stats: UploadStats::default(),
        }
    }

    /// The backing buffer every staged slice points into.
    pub fn backing(&self) -> &Resource {
        &self.backing
    }

    pub fn stats(&self) -> UploadStats {
        self.stats
    }

    /// Whether a staging region is currently write-mapped.
    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Reclaim the whole arena for a new frame.
    ///
    /// Pending work must have been drained (and the previous pass closed)
    /// first.
    pub fn reset(&mut self) {
        debug_assert!(
            !self.mapped,
            "reset called with the staging region still mapped; end_pass must run first"
        );
        debug_assert!(
            self.writes.is_empty() && self.copies.is_empty(),
            "reset called with pending upload work still queued"
        );
        self.arena.reset();
        self.stats = UploadStats::default();
    }

    /// Drain the byte writes queued since the last drain.
    pub fn take_pending_writes(&mut self) -> Vec<PendingWrite> {
        std::mem::take(&mut self.writes)
    }

    /// Drain the buffer copies queued since the last drain.
    pub fn take_pending_copies(&mut self) -> Vec<PendingCopy> {
        std::mem::take(&mut self.copies)
    }

    /// Stage a single POD value.
    pub fn stage_pod<T: Pod>(&mut self, value: &T) -> Result<StagedSlice, StageError> {
        let alignment = std::mem::align_of::<T>() as u64;
        self.stage(alignment, bytemuck::bytes_of(value))
    }

    fn alloc(&mut self, size: u64, alignment: u64) -> Result<u64, StageError> {
        let alignment = alignment.max(self.default_alignment);
        self.arena
            .alloc(size, alignment)
            .ok_or(StageError::OutOfSpace {
                requested: size,
                alignment,
                remaining: self.arena.remaining(),
                capacity: self.arena.capacity(),
            })
    }
}

impl Uploader for UploadArena {
    fn stage(&mut self, alignment: u64, data: &[u8]) -> Result<StagedSlice, StageError> {
        let size = data.len() as u64;
        let offset = self.alloc(size, alignment)?;

        self.writes.push(PendingWrite {
            offset,
            bytes: data.to_vec(),
        });
        self.stats.bytes_written += size;
        self.mapped = true;

        Ok(StagedSlice {
            resource: self.backing.clone(),
            offset,
        })
    }

    fn stage_from_buffer(
        &mut self,
        alignment: u64,
        offset: u64,
        size: u64,
        src: &Resource,
    ) -> Result<StagedSlice, StageError> {
        assert!(src.is_buffer(), "staging from a non-buffer resource");
        let end = offset.checked_add(size).ok_or(StageError::TooLarge {
            requested: u64::MAX,
            max: src.buffer_size(),
        })?;
        if end > src.buffer_size() {
            return Err(StageError::TooLarge {
                requested: end,
                max: src.buffer_size(),
            });
        }

        let dst_offset = self.alloc(size, alignment)?;

        self.copies.push(PendingCopy {
            dst_offset,
            src: src.clone(),
            src_offset: offset,
            size,
        });
        self.stats.bytes_copied += size;
        self.mapped = true;

        Ok(StagedSlice {
            resource: self.backing.clone(),
            offset: dst_offset,
        })
    }

    fn end_pass(&mut self) {
        self.mapped = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staged_slices_share_the_backing_buffer() {
        let mut arena = UploadArena::new(UploadArenaDescriptor::default());

        let a = arena.stage(4, &[1, 2, 3, 4]).unwrap();
        let b = arena.stage(4, &[5, 6, 7, 8]).unwrap();

        assert!(a.resource.same_as(arena.backing()));
        assert!(b.resource.same_as(arena.backing()));
        assert_ne!(a.offset, b.offset);
    }

    #[test]
    fn stage_records_a_pending_write() {
        let mut arena = UploadArena::new(UploadArenaDescriptor::default());
        let staged = arena.stage(16, &[7u8; 32]).unwrap();
        assert!(arena.is_mapped());

        arena.end_pass();
        assert!(!arena.is_mapped());

        let writes = arena.take_pending_writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].offset, staged.offset);
        assert_eq!(writes[0].bytes, vec![7u8; 32]);
        assert_eq!(arena.stats().bytes_written, 32);
    }

    #[test]
    fn stage_from_buffer_records_a_pending_copy() {
        let mut arena = UploadArena::new(UploadArenaDescriptor::default());
        let src = Resource::new_buffer(1024);

        let staged = arena.stage_from_buffer(4, 16, 64, &src).unwrap();
        arena.end_pass();

        let copies = arena.take_pending_copies();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].dst_offset, staged.offset);
        assert_eq!(copies[0].src_offset, 16);
        assert_eq!(copies[0].size, 64);
        assert!(copies[0].src.same_as(&src));
    }

    #[test]
    fn stage_from_buffer_rejects_out_of_bounds_ranges() {
        let mut arena = UploadArena::new(UploadArenaDescriptor::default());
        let src = Resource::new_buffer(64);

        let err = arena.stage_from_buffer(4, 32, 64, &src).unwrap_err();
        assert!(matches!(err, StageError::TooLarge { .. }));
    }

    #[test]
    fn exhaustion_is_reported_not_fatal() {
        let mut arena = UploadArena::new(UploadArenaDescriptor {
            capacity: 64,
            default_alignment: 4,
        });

        arena.stage(4, &[0u8; 60]).unwrap();
        let err = arena.stage(4, &[0u8; 16]).unwrap_err();
        assert!(matches!(err, StageError::OutOfSpace { .. }));
    }

    #[test]
    fn reset_reclaims_space() {
        let mut arena = UploadArena::new(UploadArenaDescriptor {
            capacity: 64,
            default_alignment: 4,
        });

        arena.stage(4, &[0u8; 64]).unwrap();
        arena.end_pass();
        arena.take_pending_writes();
        arena.reset();

        assert!(arena.stage(4, &[0u8; 64]).is_ok());
    }

    #[test]
    fn stage_pod_uses_the_value_layout() {
        let mut arena = UploadArena::new(UploadArenaDescriptor::default());
        let staged = arena.stage_pod(&[1.0f32, 2.0, 3.0, 4.0]).unwrap();
        arena.end_pass();

        let writes = arena.take_pending_writes();
        assert_eq!(writes[0].offset, staged.offset);
        assert_eq!(writes[0].bytes.len(), 16);
    }
}
