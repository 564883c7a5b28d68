//! SQLite-backed event journal for the course registry.
//!
//! This crate provides persistent storage for the registry's journal: the
//! ordered record of every successful mutation. The registry state is the
//! fold of its journal, so the journal doubles as the audit trail ("who
//! created this course, who posted this grade, and when?") and as the
//! durable record set.
//!
//! # Core Concepts
//!
//! ## EventStore
//!
//! The [`EventStore`] wraps a SQLite database. It only appends; rows are
//! never updated or deleted. Events load back in append order.
//!
//! Several processes may share one database file. A writer that must not
//! interleave with others takes the write lock with
//! [`EventStore::begin_append`], reads what it has not seen yet, and appends
//! inside the same [`AppendTx`].
//!
//! ## Event
//!
//! An [`Event`] has a unique ID, a timestamp, and an [`EventKind`]:
//! - `RegistryOpened` — the genesis entry fixing the registry owner
//! - `CourseCreated` — the owner created a course
//! - `StudentEnrolled` — an instructor enrolled a student
//! - `GradePosted` — an instructor posted a grade
//!
//! ## CourseId
//!
//! A [`CourseId`] is the dense, 0-based sequence number of a course.
//!
//! # Example
//!
//! ```no_run
//! use storage::{CourseId, Event, EventKind, EventStore};
//!
//! let store = EventStore::open("registry.db")?;
//! store.append(&Event::new(EventKind::RegistryOpened {
//!     owner: "0xadmin".parse().unwrap(),
//! }))?;
//!
//! for event in store.load_course(CourseId(0))? {
//!     println!("{}: {}", event.timestamp, event.kind.name());
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod error;
mod event;
mod store;

pub use error::{Error, Result};
pub use event::{CourseId, Event, EventKind};
pub use store::{AppendTx, BUSY_TIMEOUT, EventStore};
