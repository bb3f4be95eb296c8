//! In-process master

use crate::common::utils::lock;
use crate::common::{crc32, Error, Result};
use crate::ha::context::SlaveContext;
use crate::ha::extractor::TxExtractor;
use crate::ha::response::{CommittedTransaction, Response};
use crate::ha::{MachineId, Master};
use bytes::Bytes;
use std::collections::BTreeMap;
use std::io::Read;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct DataSourceLog {
    /// Id of the last transaction committed before this log began
    base: u64,
    entries: Vec<CommittedTransaction>,
}

impl DataSourceLog {
    fn last_tx_id(&self) -> u64 {
        self.entries.last().map(|tx| tx.tx_id).unwrap_or(self.base)
    }
}

/// A master that keeps one append-only log per data source in memory.
///
/// Ids are assigned under the log lock, so they are strictly increasing per
/// data source however many slaves commit concurrently.
pub struct LocalMaster {
    machine_id: MachineId,
    logs: Mutex<BTreeMap<String, DataSourceLog>>,
}

impl LocalMaster {
    pub fn new(machine_id: MachineId) -> Self {
        Self {
            machine_id,
            logs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Accept commits for `name`, continuing after `last_committed`
    pub fn with_data_source(self, name: impl Into<String>, last_committed: u64) -> Self {
        lock(&self.logs).insert(
            name.into(),
            DataSourceLog {
                base: last_committed,
                entries: Vec::new(),
            },
        );
        self
    }

    pub fn machine_id(&self) -> MachineId {
        self.machine_id
    }

    pub fn last_committed_tx_id(&self, data_source: &str) -> Option<u64> {
        lock(&self.logs).get(data_source).map(DataSourceLog::last_tx_id)
    }

    /// Every transaction committed through this master for `data_source`
    pub fn committed(&self, data_source: &str) -> Vec<CommittedTransaction> {
        lock(&self.logs)
            .get(data_source)
            .map(|log| log.entries.clone())
            .unwrap_or_default()
    }

    fn rejected(&self, reason: String) -> Error {
        Error::CommitFailed {
            master: self.machine_id,
            reason,
        }
    }
}

impl Master for LocalMaster {
    fn commit_single_resource_transaction(
        &self,
        context: SlaveContext,
        resource: &str,
        extractor: &dyn TxExtractor,
    ) -> Result<Response<u64>> {
        let mut data = Vec::new();
        extractor.extract()?.read_to_end(&mut data)?;
        let checksum = crc32(&data);

        let slave_applied = context
            .last_applied(resource)
            .map(|tx| tx.tx_id)
            .ok_or_else(|| self.rejected(format!("request carries no record for {}", resource)))?;

        let mut logs = lock(&self.logs);
        let log = logs
            .get_mut(resource)
            .ok_or_else(|| self.rejected(format!("unknown data source {}", resource)))?;

        let last = log.last_tx_id();
        if slave_applied > last {
            return Err(self.rejected(format!(
                "slave {} applied {} on {} but master is at {}",
                context.machine_id(),
                slave_applied,
                resource,
                last
            )));
        }

        let tx_id = last + 1;
        let missing: Vec<CommittedTransaction> = log
            .entries
            .iter()
            .filter(|tx| tx.tx_id > slave_applied)
            .cloned()
            .collect();

        log.entries.push(CommittedTransaction {
            data_source: resource.to_string(),
            tx_id,
            checksum,
            data: Bytes::from(data),
        });

        tracing::debug!(
            master = self.machine_id,
            slave = context.machine_id(),
            resource,
            tx_id,
            piggybacked = missing.len(),
            "committed slave transaction"
        );
        Ok(Response::new(tx_id, missing))
    }
}
