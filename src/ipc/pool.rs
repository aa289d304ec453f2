//! Fixed-block storage for message payloads.
//!
//! Every message queue copies its payloads into blocks of this kernel-wide
//! pool. A block is handed out whole, whatever the payload length; an
//! exhausted pool makes `send` fail.

use crate::config::{MSG_BLOCK_SIZE, MSG_POOL_BLOCKS};

/// Index of an allocated pool block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BlockId(usize);

pub struct MessagePool {
    blocks: [[u8; MSG_BLOCK_SIZE]; MSG_POOL_BLOCKS],
    in_use: [bool; MSG_POOL_BLOCKS],
}

impl MessagePool {
    pub const fn new() -> Self {
        Self {
            blocks: [[0; MSG_BLOCK_SIZE]; MSG_POOL_BLOCKS],
            in_use: [false; MSG_POOL_BLOCKS],
        }
    }

    /// Claim a free block and copy `payload` into it.
    ///
    /// Returns `None` if the payload does not fit a block or every block is
    /// taken.
    pub fn alloc(&mut self, payload: &[u8]) -> Option<BlockId> {
        if payload.len() > MSG_BLOCK_SIZE {
            return None;
        }
        let index = self.in_use.iter().position(|used| !used)?;
        self.in_use[index] = true;
        self.blocks[index][..payload.len()].copy_from_slice(payload);
        Some(BlockId(index))
    }

    /// The first `len` bytes stored in `block`.
    pub fn data(&self, block: BlockId, len: usize) -> &[u8] {
        &self.blocks[block.0][..len]
    }

    /// Return `block` to the pool.
    pub fn free(&mut self, block: BlockId) {
        self.in_use[block.0] = false;
    }

    /// Number of free blocks.
    pub fn available(&self) -> usize {
        self.in_use.iter().filter(|used| !**used).count()
    }
}

impl Default for MessagePool {
    fn default() -> Self {
        MessagePool::new()
    }
}
