use thiserror::Error;

use crate::CourseId;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt event row {seq}: {reason}")]
    Corrupt { seq: i64, reason: String },

    #[error("course id {0} does not fit in a database integer")]
    CourseIdOverflow(CourseId),
}

pub type Result<T> = std::result::Result<T, Error>;
