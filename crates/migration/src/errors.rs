use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("legacy preferences parse error: {0}")]
    Parse(String),
}

impl MigrationError {
    pub fn is_io(&self) -> bool {
        matches!(self, MigrationError::Io(_))
    }
}
