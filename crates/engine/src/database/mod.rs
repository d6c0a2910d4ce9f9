//! Chronicle handle and unit-of-work API
//!
//! `Chronicle` is the entry point. It holds everything shared by the units of
//! work of one process:
//! - the static entity registry
//! - the relational store
//! - the identifier allocator (one reservation in flight per entity type)
//! - the codec registry (one codec per entity descriptor)
//! - configuration and lifecycle metrics
//!
//! ## Unit-of-Work API
//!
//! 1. **Closure API** (recommended): `chronicle.unit_of_work(options, |uow| { ... })`
//!    - Commit on success, abort on error
//!    - Returns the closure's value and the commit outcome
//!
//! 2. **Manual API**: `begin()` + `UnitOfWork::commit()` / `abort()`
//!    - For callers that control commit timing themselves

pub mod config;

pub use config::{ChronicleConfig, CONFIG_FILE_NAME};

use std::sync::Arc;

use tracing::info;

use chronicle_concurrency::IdentifierAllocator;
use chronicle_core::{AuditLogRow, CommitLogEntry, EntityRegistry, ObjectId, Result, Tid};
use chronicle_durability::{CodecRegistry, Delta};
use chronicle_storage::Store;

use crate::commit::CommitOutcome;
use crate::coordinator::{UnitOfWorkCoordinator, UnitOfWorkMetrics};
use crate::unit_of_work::{UnitOfWork, UnitOfWorkOptions};

/// Shared handle to one audited object store
///
/// Cheap to clone; every clone shares the same allocator, codecs and metrics.
///
/// # Example
///
/// ```text
/// use chronicle::{Chronicle, ChronicleConfig, UnitOfWorkOptions};
///
/// let chronicle = Chronicle::open(registry, store, ChronicleConfig::default())?;
/// let (order, outcome) = chronicle.unit_of_work(UnitOfWorkOptions::new(), |uow| {
///     let order = uow.create(ORDER)?;
///     uow.set(order, "number", Value::Text("A-1".into()))?;
///     Ok(order)
/// })?;
/// ```
#[derive(Clone)]
pub struct Chronicle {
    registry: Arc<EntityRegistry>,
    store: Arc<dyn Store>,
    allocator: Arc<IdentifierAllocator>,
    codecs: Arc<CodecRegistry>,
    config: Arc<ChronicleConfig>,
    coordinator: Arc<UnitOfWorkCoordinator>,
}

impl Chronicle {
    /// Open a handle over a store
    ///
    /// # Errors
    /// Returns a configuration error if `config` fails validation.
    pub fn open(registry: EntityRegistry, store: Arc<dyn Store>, config: ChronicleConfig) -> Result<Self> {
        config.validate()?;
        let registry = Arc::new(registry);
        let codecs = Arc::new(CodecRegistry::new(&registry));
        let allocator = Arc::new(IdentifierAllocator::new(Arc::clone(&store), Arc::clone(&registry)));

        info!(
            target: "chronicle::commit",
            entities = registry.len(),
            audit_batch_size = config.audit_batch_size,
            rollback_batch_size = config.rollback_batch_size,
            strict_update_locks = config.strict_update_locks,
            "Chronicle opened"
        );

        Ok(Chronicle {
            registry,
            store,
            allocator,
            codecs,
            config: Arc::new(config),
            coordinator: Arc::new(UnitOfWorkCoordinator::new()),
        })
    }

    /// Begin a unit of work
    pub fn begin(&self, options: UnitOfWorkOptions) -> UnitOfWork {
        UnitOfWork::new(self.clone(), options)
    }

    /// Run a closure in a unit of work
    ///
    /// Commits if the closure returns Ok, aborts otherwise.
    ///
    /// # Returns
    /// * `Ok((T, CommitOutcome))` - Closure result and commit outcome
    /// * `Err` - Closure error or commit failure
    pub fn unit_of_work<F, T>(&self, options: UnitOfWorkOptions, f: F) -> Result<(T, CommitOutcome)>
    where
        F: FnOnce(&mut UnitOfWork) -> Result<T>,
    {
        let mut uow = self.begin(options);
        match f(&mut uow) {
            Ok(value) => {
                let outcome = uow.commit()?;
                Ok((value, outcome))
            }
            Err(e) => {
                uow.abort();
                Err(e)
            }
        }
    }

    /// Every audited version of an object, oldest first, with its decoded delta
    pub fn history(&self, id: ObjectId) -> Result<Vec<(AuditLogRow, Delta)>> {
        self.store
            .audit_history(id)?
            .into_iter()
            .map(|row| -> Result<(AuditLogRow, Delta)> {
                let delta = self.codecs.decode_delta(&row.object_delta)?;
                Ok((row, delta))
            })
            .collect()
    }

    /// Commit log entry by Tid
    pub fn commit_log_entry(&self, tid: Tid) -> Result<Option<CommitLogEntry>> {
        self.store.commit_log_entry(tid)
    }

    /// Unit-of-work lifecycle metrics
    pub fn metrics(&self) -> UnitOfWorkMetrics {
        self.coordinator.metrics()
    }

    /// Entity registry
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Relational store
    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    /// Identifier allocator
    pub fn allocator(&self) -> &IdentifierAllocator {
        &self.allocator
    }

    /// Codec registry
    pub fn codecs(&self) -> &CodecRegistry {
        &self.codecs
    }

    /// Configuration
    pub fn config(&self) -> &ChronicleConfig {
        &self.config
    }

    pub(crate) fn coordinator(&self) -> &UnitOfWorkCoordinator {
        &self.coordinator
    }
}

impl std::fmt::Debug for Chronicle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chronicle")
            .field("entities", &self.registry.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
