//! Master replies with piggybacked transactions

use crate::common::Result;
use bytes::Bytes;

/// A transaction committed on the master that a slave may not have yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransaction {
    pub data_source: String,
    pub tx_id: u64,
    pub checksum: u32,
    pub data: Bytes,
}

/// A value plus the transactions the slave must apply before using it
#[derive(Debug, Clone)]
pub struct Response<T> {
    value: T,
    transactions: Vec<CommittedTransaction>,
}

impl<T> Response<T> {
    pub fn new(value: T, transactions: Vec<CommittedTransaction>) -> Self {
        Self {
            value,
            transactions,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    /// Piggybacked transactions, oldest first
    pub fn transactions(&self) -> &[CommittedTransaction] {
        &self.transactions
    }

    pub fn into_parts(self) -> (T, Vec<CommittedTransaction>) {
        (self.value, self.transactions)
    }

    /// Apply every piggybacked transaction in order, then hand out the value.
    /// Stops at the first failure.
    pub fn apply<F>(self, mut apply: F) -> Result<T>
    where
        F: FnMut(&CommittedTransaction) -> Result<()>,
    {
        for tx in &self.transactions {
            apply(tx)?;
        }
        Ok(self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Error;

    fn tx(id: u64) -> CommittedTransaction {
        CommittedTransaction {
            data_source: "nioneodb".into(),
            tx_id: id,
            checksum: 0,
            data: Bytes::from_static(b"tx"),
        }
    }

    #[test]
    fn test_apply_in_order() {
        let mut applied = Vec::new();
        let value = Response::new(9u64, vec![tx(7), tx(8)])
            .apply(|tx| {
                applied.push(tx.tx_id);
                Ok(())
            })
            .unwrap();
        assert_eq!(value, 9);
        assert_eq!(applied, vec![7, 8]);
    }

    #[test]
    fn test_apply_stops_on_failure() {
        let mut applied = Vec::new();
        let result = Response::new(9u64, vec![tx(7), tx(8)]).apply(|tx| {
            applied.push(tx.tx_id);
            Err(Error::Internal("disk full".into()))
        });
        assert!(result.is_err());
        assert_eq!(applied, vec![7]);
    }
}
