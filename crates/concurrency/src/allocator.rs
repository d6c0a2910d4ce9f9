//! Hi/lo identifier allocation
//!
//! Each entity type has one shared counter row in the store. An allocator
//! reserves a block of [`RESERVATION_SIZE`] identifiers from that row, then
//! hands them out locally without further store access. The reserved counter
//! value becomes the hi field of every identifier in the block and the local
//! offset becomes the lo field.
//!
//! ## Reservation
//!
//! ```text
//! loop {
//!     V = read counter
//!     V must exist and be a multiple of RESERVATION_SIZE   (else configuration error)
//!     V + RESERVATION_SIZE must not exceed HI_LIMIT       (else id space exhausted)
//!     UPDATE counter SET value = V + RESERVATION_SIZE WHERE value = V
//!     1 row affected  -> ids (tag, V, 0..RESERVATION_SIZE) are ours
//!     0 rows affected -> another allocator won, retry
//! }
//! ```
//!
//! The loop is the only place where allocators in different processes race.
//! It has no bound other than contention resolution. Inside one process a
//! per-entity-type mutex ensures only one reservation is in flight per type.
//!
//! Blocks are never returned: identifiers left in a block when the process
//! stops are burned.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;

use chronicle_core::{EntityRegistry, EntityTag, Error, ObjectId, Result, HI_LIMIT, RESERVATION_SIZE};
use chronicle_storage::Store;

/// Locally reserved block of identifiers
#[derive(Debug)]
struct Block {
    /// Counter value reserved for the block, used as the hi field
    base: u64,
    /// Next offset to hand out; RESERVATION_SIZE means the block is used up
    next_lo: u64,
}

impl Block {
    fn exhausted() -> Self {
        Block {
            base: 0,
            next_lo: RESERVATION_SIZE,
        }
    }
}

/// Allocates unique ObjectIds per entity type
///
/// Thread-safe; share one instance per process through an `Arc`.
pub struct IdentifierAllocator {
    store: Arc<dyn Store>,
    registry: Arc<EntityRegistry>,
    blocks: DashMap<EntityTag, Arc<Mutex<Block>>>,
    /// Successful reservations (one store round trip each, plus retries)
    reservations: AtomicU64,
    /// Conditional updates that affected zero rows
    contended: AtomicU64,
}

impl IdentifierAllocator {
    /// Create an allocator with no reserved blocks
    pub fn new(store: Arc<dyn Store>, registry: Arc<EntityRegistry>) -> Self {
        IdentifierAllocator {
            store,
            registry,
            blocks: DashMap::new(),
            reservations: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        }
    }

    /// Allocate the next ObjectId for an entity type
    ///
    /// # Errors
    /// - `UnknownEntity` if the tag is not registered
    /// - `CounterMissing` / `CounterMisaligned` if the counter row is unusable
    /// - `IdSpaceExhausted` if every hi block has been reserved
    pub fn allocate(&self, tag: EntityTag) -> Result<ObjectId> {
        let entity = &self.registry.descriptor(tag)?.name;

        // Clone the Arc out so the DashMap shard is not held across the store round trip.
        let block = self
            .blocks
            .entry(tag)
            .or_insert_with(|| Arc::new(Mutex::new(Block::exhausted())))
            .clone();
        let mut block = block.lock();

        if block.next_lo >= RESERVATION_SIZE {
            block.base = self.reserve(tag, entity)?;
            block.next_lo = 0;
        }

        let lo = block.next_lo as u8;
        block.next_lo += 1;
        ObjectId::from_parts(tag, block.base, lo).ok_or_else(|| Error::IdSpaceExhausted {
            tag,
            entity: entity.clone(),
        })
    }

    /// Allocate the next ObjectId for an entity type given by name
    pub fn allocate_for_name(&self, name: &str) -> Result<ObjectId> {
        let tag = self.registry.tag_of(name)?;
        self.allocate(tag)
    }

    /// Number of blocks reserved so far
    pub fn reservations(&self) -> u64 {
        self.reservations.load(Ordering::Relaxed)
    }

    /// Number of reservation attempts lost to a competing allocator
    pub fn contended(&self) -> u64 {
        self.contended.load(Ordering::Relaxed)
    }

    /// Reserve a fresh block from the shared counter row
    fn reserve(&self, tag: EntityTag, entity: &str) -> Result<u64> {
        loop {
            let current = self.store.read_counter(tag)?.ok_or_else(|| Error::CounterMissing {
                tag,
                entity: entity.to_string(),
            })?;

            if current % RESERVATION_SIZE != 0 {
                return Err(Error::CounterMisaligned {
                    tag,
                    entity: entity.to_string(),
                    value: current,
                });
            }
            if current + RESERVATION_SIZE > HI_LIMIT {
                return Err(Error::IdSpaceExhausted {
                    tag,
                    entity: entity.to_string(),
                });
            }

            match self.store.update_counter_if(tag, current, current + RESERVATION_SIZE)? {
                1 => {
                    self.reservations.fetch_add(1, Ordering::Relaxed);
                    debug!(target: "chronicle::alloc", entity, base = current, "Reserved identifier block");
                    return Ok(current);
                }
                0 => {
                    self.contended.fetch_add(1, Ordering::Relaxed);
                    debug!(target: "chronicle::alloc", entity, expected = current, "Counter moved, retrying reservation");
                }
                rows => {
                    return Err(Error::Storage(format!(
                        "conditional counter update for {} affected {} rows",
                        entity, rows
                    )));
                }
            }
        }
    }
}

impl std::fmt::Debug for IdentifierAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentifierAllocator")
            .field("entity_types", &self.blocks.len())
            .field("reservations", &self.reservations())
            .field("contended", &self.contended())
            .finish()
    }
}
