// SPDX-License-Identifier: GPL-3.0-only

//! Fixed arena of preview buffers
//!
//! Buffers are allocated in a batch and identified by a [`BufferSlot`]
//! (arena index plus allocation generation). The memory itself moves by value
//! between three owners:
//!
//! ```text
//!            allocate / recycle
//!   Pool ───────────────────────▶ Device
//!    ▲                              │ frame written
//!    │ park / reclaim               ▼
//!    └──────────────────────────── Relay ── forward to sink
//! ```
//!
//! The pool only tracks who holds each slot. A buffer from an older
//! generation (returned after the pool was reallocated or released) is stale
//! and gets dropped instead of re-entering circulation.

use std::fmt;
use tracing::debug;

/// Identity of one buffer in the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferSlot {
    index: usize,
    generation: u64,
}

/// Current holder of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferOwner {
    /// Idle inside the pool
    Pool,
    /// Loaned to the device as a receive target
    Device,
    /// Being validated and forwarded
    Relay,
}

/// A fixed-size block of frame memory, owned by whoever holds the value
pub struct FrameBuffer {
    slot: BufferSlot,
    data: Box<[u8]>,
}

impl FrameBuffer {
    pub fn slot(&self) -> BufferSlot {
        self.slot
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Writable view for the device filling the buffer
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl fmt::Debug for FrameBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FrameBuffer(slot {} gen {}, {} bytes)",
            self.slot.index,
            self.slot.generation,
            self.data.len()
        )
    }
}

/// Ownership violations detected by the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Buffer belongs to an older allocation
    Stale(BufferSlot),
    /// Slot index outside the arena
    UnknownSlot(BufferSlot),
    /// Buffer handed over by someone who does not hold it
    WrongOwner {
        slot: BufferSlot,
        expected: BufferOwner,
        actual: BufferOwner,
    },
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::Stale(slot) => write!(
                f,
                "stale buffer (slot {}, generation {})",
                slot.index, slot.generation
            ),
            PoolError::UnknownSlot(slot) => write!(f, "unknown buffer slot {}", slot.index),
            PoolError::WrongOwner {
                slot,
                expected,
                actual,
            } => write!(
                f,
                "buffer slot {} held by {:?}, expected {:?}",
                slot.index, actual, expected
            ),
        }
    }
}

impl std::error::Error for PoolError {}

struct SlotEntry {
    owner: BufferOwner,
    /// Memory of an idle buffer
    parked: Option<Box<[u8]>>,
}

/// Arena of same-size preview buffers
#[derive(Default)]
pub struct BufferPool {
    slots: Vec<SlotEntry>,
    generation: u64,
    buffer_size: usize,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate `count` buffers of `size` bytes, all loaned to the device.
    ///
    /// Any buffers from a previous allocation become stale.
    pub fn allocate(&mut self, count: usize, size: usize) -> Vec<FrameBuffer> {
        self.generation += 1;
        self.buffer_size = size;
        self.slots = (0..count)
            .map(|_| SlotEntry {
                owner: BufferOwner::Device,
                parked: None,
            })
            .collect();

        debug!(
            count,
            size,
            generation = self.generation,
            "Allocated preview buffers"
        );

        (0..count)
            .map(|index| FrameBuffer {
                slot: BufferSlot {
                    index,
                    generation: self.generation,
                },
                data: vec![0u8; size].into_boxed_slice(),
            })
            .collect()
    }

    /// Device hands a written buffer to the relay
    pub fn check_in(&mut self, buffer: &FrameBuffer) -> Result<(), PoolError> {
        self.transfer(buffer.slot, BufferOwner::Device, BufferOwner::Relay)
    }

    /// Relay gives a forwarded buffer back to the device as a new receive target
    pub fn recycle(&mut self, buffer: FrameBuffer) -> Result<FrameBuffer, PoolError> {
        self.transfer(buffer.slot, BufferOwner::Relay, BufferOwner::Device)?;
        Ok(buffer)
    }

    /// Relay returns a buffer it will not forward to the idle set
    pub fn park(&mut self, buffer: FrameBuffer) -> Result<(), PoolError> {
        let slot = buffer.slot;
        self.transfer(slot, BufferOwner::Relay, BufferOwner::Pool)?;
        self.slots[slot.index].parked = Some(buffer.data);
        Ok(())
    }

    /// Take back buffers the device still held when its callback was unregistered.
    ///
    /// Returns how many were accepted; stale or foreign buffers are dropped.
    pub fn reclaim(&mut self, buffers: Vec<FrameBuffer>) -> usize {
        let mut accepted = 0;
        for buffer in buffers {
            let slot = buffer.slot;
            match self.transfer(slot, BufferOwner::Device, BufferOwner::Pool) {
                Ok(()) => {
                    self.slots[slot.index].parked = Some(buffer.data);
                    accepted += 1;
                }
                Err(e) => debug!(error = %e, "Dropping buffer on reclaim"),
            }
        }
        accepted
    }

    /// Loan every idle buffer to the device again
    pub fn lend_idle(&mut self) -> Vec<FrameBuffer> {
        let generation = self.generation;
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(index, entry)| {
                let data = entry.parked.take()?;
                entry.owner = BufferOwner::Device;
                Some(FrameBuffer {
                    slot: BufferSlot { index, generation },
                    data,
                })
            })
            .collect()
    }

    /// Drop all buffers. Anything still outstanding becomes stale.
    pub fn release(&mut self) {
        if !self.slots.is_empty() {
            debug!(generation = self.generation, "Releasing preview buffers");
        }
        self.slots.clear();
        self.generation += 1;
        self.buffer_size = 0;
    }

    pub fn owner(&self, slot: BufferSlot) -> Option<BufferOwner> {
        if slot.generation != self.generation {
            return None;
        }
        self.slots.get(slot.index).map(|entry| entry.owner)
    }

    pub fn count_owned_by(&self, owner: BufferOwner) -> usize {
        self.slots.iter().filter(|entry| entry.owner == owner).count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    fn transfer(
        &mut self,
        slot: BufferSlot,
        from: BufferOwner,
        to: BufferOwner,
    ) -> Result<(), PoolError> {
        if slot.generation != self.generation {
            return Err(PoolError::Stale(slot));
        }
        let entry = self
            .slots
            .get_mut(slot.index)
            .ok_or(PoolError::UnknownSlot(slot))?;
        if entry.owner != from {
            return Err(PoolError::WrongOwner {
                slot,
                expected: from,
                actual: entry.owner,
            });
        }
        entry.owner = to;
        Ok(())
    }
}

impl fmt::Debug for BufferPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPool")
            .field("generation", &self.generation)
            .field("buffer_size", &self.buffer_size)
            .field("pool", &self.count_owned_by(BufferOwner::Pool))
            .field("device", &self.count_owned_by(BufferOwner::Device))
            .field("relay", &self.count_owned_by(BufferOwner::Relay))
            .finish()
    }
}
