//! Policy error types.

use thiserror::Error;

use crate::{Identity, Role};

/// Policy errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The caller does not hold the role the action requires.
    #[error("unauthorized account {caller}: only the {required} may perform this action")]
    Unauthorized { caller: Identity, required: Role },

    /// An identity string was empty or blank.
    #[error("invalid identity: {0:?}")]
    InvalidIdentity(String),
}

pub type Result<T> = std::result::Result<T, Error>;
