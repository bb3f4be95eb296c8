//! Slave-to-master transaction commit
//!
//! The traits here are the boundary to the rest of a replica: master
//! discovery ([`Broker`]), the remote commit endpoint ([`Master`]), the local
//! transaction manager and the replica's own bookkeeping
//! ([`SlaveDatabaseOperations`]).

pub mod context;
pub mod extractor;
pub mod generator;
pub mod master;
pub mod response;

pub use context::{SlaveContext, Tx};
pub use extractor::{DataSource, PreparedTransactionExtractor, TxExtractor};
pub use generator::{SlaveTxIdGenerator, SlaveTxIdGeneratorFactory, TxIdGenerator};
pub use master::LocalMaster;
pub use response::{CommittedTransaction, Response};

use crate::common::{Error, Result};
use std::sync::Arc;

pub type MachineId = u32;

/// A cluster member as seen by master discovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Machine {
    pub machine_id: MachineId,
    pub address: String,
}

impl Machine {
    pub fn new(machine_id: MachineId, address: impl Into<String>) -> Self {
        Self {
            machine_id,
            address: address.into(),
        }
    }
}

/// Commit endpoint of the current master
pub trait Master: Send + Sync {
    /// Apply one prepared transaction, pulling its bytes from `extractor`,
    /// and return its global id. `context` holds only the record for
    /// `resource`.
    fn commit_single_resource_transaction(
        &self,
        context: SlaveContext,
        resource: &str,
        extractor: &dyn TxExtractor,
    ) -> Result<Response<u64>>;
}

/// Master discovery. Answers may change between calls.
pub trait Broker: Send + Sync {
    /// Current master, or [`Error::NoMaster`] during an election
    fn master(&self) -> Result<(Arc<dyn Master>, Machine)>;

    fn my_machine_id(&self) -> MachineId;
}

pub trait TransactionManager: Send + Sync {
    /// Identifier of the transaction running on the calling thread
    fn event_identifier(&self) -> u32;
}

/// The replica's own view of its transactional position
pub trait SlaveDatabaseOperations: Send + Sync {
    fn slave_context(&self, event_identifier: u32) -> Result<SlaveContext>;

    /// Apply the piggybacked transactions, then unwrap the value
    fn receive<T>(&self, response: Response<T>) -> Result<T>;

    /// Recovery hook for failed commits
    fn exception_happened(&self, error: &Error);
}
