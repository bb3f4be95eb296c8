//! Slave transactional position

use crate::common::{Error, Result};
use crate::ha::MachineId;
use serde::{Deserialize, Serialize};

/// Last transaction a slave has applied for one data source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tx {
    pub data_source_name: String,
    pub tx_id: u64,
    pub checksum: u64,
}

impl Tx {
    pub fn new(data_source_name: impl Into<String>, tx_id: u64, checksum: u64) -> Self {
        Self {
            data_source_name: data_source_name.into(),
            tx_id,
            checksum,
        }
    }
}

/// Snapshot of where a slave stands, sent along with every commit request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaveContext {
    session_id: u64,
    machine_id: MachineId,
    event_identifier: u32,
    last_applied_transactions: Vec<Tx>,
    master_id: MachineId,
    checksum: u64,
}

impl SlaveContext {
    pub fn new(
        session_id: u64,
        machine_id: MachineId,
        event_identifier: u32,
        last_applied_transactions: Vec<Tx>,
        master_id: MachineId,
        checksum: u64,
    ) -> Self {
        Self {
            session_id,
            machine_id,
            event_identifier,
            last_applied_transactions,
            master_id,
            checksum,
        }
    }

    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    pub fn machine_id(&self) -> MachineId {
        self.machine_id
    }

    pub fn event_identifier(&self) -> u32 {
        self.event_identifier
    }

    pub fn last_applied_transactions(&self) -> &[Tx] {
        &self.last_applied_transactions
    }

    pub fn master_id(&self) -> MachineId {
        self.master_id
    }

    pub fn checksum(&self) -> u64 {
        self.checksum
    }

    pub fn last_applied(&self, data_source: &str) -> Option<&Tx> {
        self.last_applied_transactions
            .iter()
            .find(|tx| tx.data_source_name == data_source)
    }

    /// Copy of this context holding only the record for `data_source`.
    ///
    /// A missing record means the transaction manager and the snapshot
    /// disagree, which is reported as a protocol violation.
    pub fn only_for_data_source(&self, data_source: &str) -> Result<SlaveContext> {
        let tx = self.last_applied(data_source).cloned().ok_or_else(|| {
            Error::ProtocolViolation(format!(
                "slave context {:?} has no record for data source {} being committed",
                self, data_source
            ))
        })?;

        Ok(SlaveContext {
            last_applied_transactions: vec![tx],
            ..self.clone()
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Internal(format!("Serialize error: {}", e)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes)
            .map_err(|e| Error::ProtocolViolation(format!("Corrupted slave context: {}", e)))
    }
}
