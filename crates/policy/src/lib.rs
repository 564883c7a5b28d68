//! Role-based authorization for the course registry.
//!
//! Core principle: **every mutation names its caller, and the caller must hold
//! the role the action requires.**
//!
//! Two roles exist. The registry [`Role::Owner`] creates courses; the
//! [`Role::Instructor`] of a course enrolls students into it and posts their
//! grades. Holding one role grants nothing of the other: the owner cannot
//! grade a course it does not teach.
//!
//! # Example
//!
//! ```
//! use policy::{authorize, Action, Grants, Identity};
//!
//! let owner: Identity = "0xadmin".parse()?;
//! let prof: Identity = "0xprof".parse()?;
//! let grants = Grants::for_course(&owner, &prof);
//!
//! assert!(authorize(Action::PostGrade, &prof, &grants).is_allowed());
//! assert!(!authorize(Action::PostGrade, &owner, &grants).is_allowed());
//! # Ok::<(), policy::Error>(())
//! ```

mod error;
mod identity;
mod policy;

pub use error::{Error, Result};
pub use identity::Identity;
pub use policy::{Action, Decision, Grants, Role, authorize};
