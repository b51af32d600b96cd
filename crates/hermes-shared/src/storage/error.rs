//! Durable store error surface.

use thiserror::Error;

/// Errors from the durable key-value stores
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Store connection failed: {0}")]
    Connection(String),

    #[error("Read failed for {table}: {reason}")]
    Read { table: String, reason: String },

    #[error("Write failed for {table}: {reason}")]
    Write { table: String, reason: String },

    #[error("Corrupt record in {table}: {reason}")]
    Corrupt { table: String, reason: String },
}

impl StorageError {
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection(reason.into())
    }

    pub fn read(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Read {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn write(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Write {
            table: table.into(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(table: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Corrupt {
            table: table.into(),
            reason: reason.into(),
        }
    }
}
