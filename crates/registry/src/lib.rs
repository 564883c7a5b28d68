//! CRID registry — courses, enrollments, and grades under a two-tier policy.
//!
//! The registry owner creates courses and assigns each one an instructor.
//! Only that instructor may enroll students into the course and post their
//! grades. Everything else is a read.
//!
//! # Overview
//!
//! - **Registry**: the single-threaded state machine. Each mutation takes the
//!   caller's identity explicitly, is authorized by [`policy::authorize`],
//!   and on success appends exactly one event to the registry's journal.
//! - **Ledger**: a `Registry` behind a reader-writer lock, optionally backed
//!   by a [`storage::EventStore`] and publishing committed events to
//!   subscribers. Reopening a store replays its journal.
//!
//! # Example
//!
//! ```
//! use registry::{Identity, Ledger};
//!
//! let owner: Identity = "0xadmin".parse()?;
//! let prof: Identity = "0xprof".parse()?;
//! let alice: Identity = "0xalice".parse()?;
//!
//! let ledger = Ledger::in_memory(owner.clone());
//! let course = ledger.create_course(&owner, "Programacao Avancada", &prof)?;
//! ledger.enroll_student(&prof, course, &alice)?;
//! ledger.post_grade(&prof, course, &alice, 95)?;
//!
//! assert_eq!(ledger.grade_value(course, &alice)?, 95);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod course;
mod error;
mod ledger;
mod registry;

pub use course::{Course, Enrollment, Grade};
pub use error::{Error, ErrorKind, Result};
pub use ledger::{EVENT_CHANNEL_CAPACITY, Ledger};
pub use registry::Registry;

// Re-exported so callers need only this crate for the common types.
pub use policy::{Identity, Role};
pub use storage::{CourseId, Event, EventKind, EventStore};
