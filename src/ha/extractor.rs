//! Lazy access to prepared transaction bytes

use crate::common::Result;
use bytes::BytesMut;
use std::io::{self, Read};

/// Source of one transaction's bytes, pulled by the master while it handles
/// the commit request.
pub trait TxExtractor {
    /// Push form: append the bytes to `buffer`
    fn extract_into(&self, buffer: &mut BytesMut) -> Result<()>;

    /// Pull form
    fn extract(&self) -> Result<Box<dyn Read + Send + '_>>;
}

/// A named resource holding locally prepared transactions
pub trait DataSource: Send + Sync {
    fn name(&self) -> &str;

    fn write_prepared_transaction(&self, identifier: i32, buffer: &mut BytesMut) -> io::Result<()>;

    fn read_prepared_transaction(&self, identifier: i32) -> io::Result<Box<dyn Read + Send>>;
}

/// Extractor for one prepared transaction of one data source. Nothing is
/// read until the master asks.
pub struct PreparedTransactionExtractor<'a> {
    data_source: &'a dyn DataSource,
    identifier: i32,
}

impl<'a> PreparedTransactionExtractor<'a> {
    pub fn new(data_source: &'a dyn DataSource, identifier: i32) -> Self {
        Self {
            data_source,
            identifier,
        }
    }
}

impl TxExtractor for PreparedTransactionExtractor<'_> {
    fn extract_into(&self, buffer: &mut BytesMut) -> Result<()> {
        self.data_source
            .write_prepared_transaction(self.identifier, buffer)?;
        Ok(())
    }

    fn extract(&self) -> Result<Box<dyn Read + Send + '_>> {
        Ok(self.data_source.read_prepared_transaction(self.identifier)?)
    }
}
