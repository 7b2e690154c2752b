use migration::MigrationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupted preferences: {0}")]
    Corruption(String),
    #[error("migration `{name}` failed: {source}")]
    Migration {
        name: String,
        #[source]
        source: MigrationError,
    },
    #[error("edit rejected: {0}")]
    Edit(String),
    #[error("invalid store name `{0}`")]
    InvalidName(String),
    #[error("model error: {0}")]
    Model(#[from] models::errors::ModelError),
}

impl StoreError {
    /// I/O failures while reading are transient: observers fall back to an
    /// empty snapshot instead of failing.
    pub fn is_recoverable_read(&self) -> bool {
        match self {
            StoreError::Io(_) => true,
            StoreError::Migration { source, .. } => source.is_io(),
            _ => false,
        }
    }

    pub fn edit(msg: impl Into<String>) -> Self {
        Self::Edit(msg.into())
    }
}
