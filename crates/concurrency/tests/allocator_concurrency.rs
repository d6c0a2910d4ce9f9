//! Multi-threaded tests for the identifier allocator
//!
//! These tests exercise the reservation loop under real races:
//!
//! 1. **Uniqueness** - no ObjectId is ever handed out twice
//! 2. **Cross-allocator contention** - independent allocators sharing one store
//! 3. **Reservation accounting** - every counter update is one block
//!
//! ```bash
//! cargo test -p chronicle-concurrency --test allocator_concurrency
//! ```

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use chronicle_concurrency::IdentifierAllocator;
use chronicle_core::{EntityDescriptor, EntityRegistry, EntityTag, ObjectId, RESERVATION_SIZE};
use chronicle_storage::MemoryStore;
use proptest::prelude::*;
use rand::Rng;

fn registry() -> Arc<EntityRegistry> {
    Arc::new(
        EntityRegistry::builder()
            .register(EntityDescriptor::new(EntityTag(7), "Order"))
            .register(EntityDescriptor::new(EntityTag(8), "OrderLine"))
            .build()
            .unwrap(),
    )
}

fn run_threads(
    allocators: Vec<Arc<IdentifierAllocator>>,
    threads_per_allocator: usize,
    per_thread: usize,
) -> Vec<ObjectId> {
    let total = allocators.len() * threads_per_allocator;
    let barrier = Arc::new(Barrier::new(total));

    let handles: Vec<_> = allocators
        .iter()
        .flat_map(|a| std::iter::repeat(a.clone()).take(threads_per_allocator))
        .map(|allocator| {
            let barrier = barrier.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                barrier.wait();
                (0..per_thread)
                    .map(|_| {
                        let tag = if rng.gen_bool(0.5) { EntityTag(7) } else { EntityTag(8) };
                        allocator.allocate(tag).unwrap()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
}

mod uniqueness {
    use super::*;

    #[test]
    fn test_threads_sharing_one_allocator() {
        let registry = registry();
        let store = Arc::new(MemoryStore::with_counters(&registry));
        let allocator = Arc::new(IdentifierAllocator::new(store, registry));

        let ids = run_threads(vec![allocator], 8, 500);
        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_independent_allocators_on_one_store() {
        let registry = registry();
        let store = Arc::new(MemoryStore::with_counters(&registry));
        let allocators: Vec<_> = (0..4)
            .map(|_| Arc::new(IdentifierAllocator::new(store.clone(), registry.clone())))
            .collect();

        let ids = run_threads(allocators.clone(), 3, 400);
        let unique: HashSet<_> = ids.iter().copied().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(ids.len(), 4 * 3 * 400);

        let reserved: u64 = allocators.iter().map(|a| a.reservations()).sum();
        assert_eq!(store.counter_updates(), reserved);
        assert!(reserved * RESERVATION_SIZE >= ids.len() as u64);
    }

    #[test]
    fn test_ids_carry_their_entity_tag() {
        let registry = registry();
        let store = Arc::new(MemoryStore::with_counters(&registry));
        let allocator = Arc::new(IdentifierAllocator::new(store, registry));

        for id in run_threads(vec![allocator], 4, 100) {
            assert!(id.entity_tag() == EntityTag(7) || id.entity_tag() == EntityTag(8));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any interleaving of allocations across two allocators yields distinct ids
    #[test]
    fn interleaved_allocations_are_unique(picks in prop::collection::vec((any::<bool>(), any::<bool>()), 1..1200)) {
        let registry = registry();
        let store = Arc::new(MemoryStore::with_counters(&registry));
        let a = IdentifierAllocator::new(store.clone(), registry.clone());
        let b = IdentifierAllocator::new(store, registry);

        let mut seen = HashSet::new();
        for (use_a, order) in picks {
            let allocator = if use_a { &a } else { &b };
            let tag = if order { EntityTag(7) } else { EntityTag(8) };
            let id = allocator.allocate(tag).unwrap();
            prop_assert!(seen.insert(id));
            prop_assert_eq!(id.entity_tag(), tag);
        }
    }
}
