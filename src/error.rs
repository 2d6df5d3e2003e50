use crate::schema::StructureDiscrepancy;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetNetError {
    #[error("Structural error: no {role} sheet found (expected a sheet name ending in '{suffix}')")]
    MissingSheet { role: String, suffix: String },

    #[error("Structural error: sheet '{0}' does not exist in the workbook")]
    UnknownSheet(String),

    #[error("Refusing to overwrite formula cell {0}")]
    FormulaCellProtected(String),

    #[error("Only literal values can be written to {0}")]
    LiteralRequired(String),

    #[error("Merge aborted: {} blocking structural discrepancies", .discrepancies.len())]
    BlockingDiscrepancies {
        discrepancies: Vec<StructureDiscrepancy>,
    },

    #[error("Backup to {path} failed: {source}")]
    BackupFailure {
        path: PathBuf,
        #[source]
        source: Box<NetNetError>,
    },

    #[error("Invalid cell reference: {0}")]
    InvalidCellReference(String),

    #[error("Date calculation error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl NetNetError {
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            NetNetError::MissingSheet { .. } | NetNetError::UnknownSheet(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, NetNetError>;
