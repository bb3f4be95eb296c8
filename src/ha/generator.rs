//! Slave side of transaction id assignment
//!
//! A slave never numbers its own transactions. Each prepared transaction is
//! shipped to the current master, which applies it and hands back the global
//! id together with whatever the slave has missed for that data source.

use crate::common::Result;
use crate::ha::extractor::{DataSource, PreparedTransactionExtractor};
use crate::ha::{Broker, MachineId, SlaveDatabaseOperations, TransactionManager};
use std::sync::Arc;

/// Assigns global transaction ids to locally prepared transactions
pub trait TxIdGenerator: Send + Sync {
    fn generate(&self, data_source: &dyn DataSource, identifier: i32) -> Result<u64>;

    fn current_master_id(&self) -> Result<MachineId>;

    fn my_id(&self) -> MachineId;
}

/// Builds one generator per transaction manager
pub struct SlaveTxIdGeneratorFactory<O> {
    broker: Arc<dyn Broker>,
    operations: Arc<O>,
}

impl<O: SlaveDatabaseOperations> SlaveTxIdGeneratorFactory<O> {
    pub fn new(broker: Arc<dyn Broker>, operations: Arc<O>) -> Self {
        Self { broker, operations }
    }

    pub fn create(&self, tx_manager: Arc<dyn TransactionManager>) -> SlaveTxIdGenerator<O> {
        SlaveTxIdGenerator::new(self.broker.clone(), self.operations.clone(), tx_manager)
    }
}

pub struct SlaveTxIdGenerator<O> {
    broker: Arc<dyn Broker>,
    operations: Arc<O>,
    tx_manager: Arc<dyn TransactionManager>,
}

impl<O: SlaveDatabaseOperations> SlaveTxIdGenerator<O> {
    pub fn new(
        broker: Arc<dyn Broker>,
        operations: Arc<O>,
        tx_manager: Arc<dyn TransactionManager>,
    ) -> Self {
        Self {
            broker,
            operations,
            tx_manager,
        }
    }

    fn commit(&self, data_source: &dyn DataSource, identifier: i32) -> Result<u64> {
        let event_identifier = self.tx_manager.event_identifier();
        let context = self
            .operations
            .slave_context(event_identifier)?
            .only_for_data_source(data_source.name())?;

        // Resolved per call: the master may have changed since the last one.
        let (master, machine) = self.broker.master()?;
        tracing::debug!(
            data_source = data_source.name(),
            identifier,
            event_identifier,
            master = machine.machine_id,
            "committing prepared transaction on master"
        );

        let extractor = PreparedTransactionExtractor::new(data_source, identifier);
        let response =
            master.commit_single_resource_transaction(context, data_source.name(), &extractor)?;
        let tx_id = self.operations.receive(response)?;

        tracing::debug!(data_source = data_source.name(), tx_id, "transaction id assigned");
        Ok(tx_id)
    }
}

impl<O: SlaveDatabaseOperations> TxIdGenerator for SlaveTxIdGenerator<O> {
    /// Failures reach the recovery hook first and are then returned
    /// unchanged; nothing is retried here.
    fn generate(&self, data_source: &dyn DataSource, identifier: i32) -> Result<u64> {
        self.commit(data_source, identifier).map_err(|error| {
            tracing::warn!(
                data_source = data_source.name(),
                identifier,
                "slave commit failed: {}",
                error
            );
            self.operations.exception_happened(&error);
            error
        })
    }

    fn current_master_id(&self) -> Result<MachineId> {
        Ok(self.broker.master()?.1.machine_id)
    }

    fn my_id(&self) -> MachineId {
        self.broker.my_machine_id()
    }
}
