//! Event types for the registry journal.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use policy::Identity;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A sequential, 0-based course identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CourseId(pub u64);

impl CourseId {
    /// The id that follows this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for CourseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CourseId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Self)
    }
}

impl From<u64> for CourseId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// What happened to the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventKind {
    /// The registry was constructed; always the first event of a journal.
    RegistryOpened { owner: Identity },
    /// The owner created a course.
    CourseCreated {
        course_id: CourseId,
        name: String,
        instructor: Identity,
    },
    /// An instructor enrolled a student.
    StudentEnrolled {
        course_id: CourseId,
        student: Identity,
    },
    /// An instructor posted (or overwrote) a grade.
    GradePosted {
        course_id: CourseId,
        student: Identity,
        value: u8,
    },
}

impl EventKind {
    /// Stable short name, used as the `kind` column and for filtering.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::RegistryOpened { .. } => "registry_opened",
            EventKind::CourseCreated { .. } => "course_created",
            EventKind::StudentEnrolled { .. } => "student_enrolled",
            EventKind::GradePosted { .. } => "grade_posted",
        }
    }

    /// The course this event concerns, if any.
    pub fn course_id(&self) -> Option<CourseId> {
        match self {
            EventKind::RegistryOpened { .. } => None,
            EventKind::CourseCreated { course_id, .. }
            | EventKind::StudentEnrolled { course_id, .. }
            | EventKind::GradePosted { course_id, .. } => Some(*course_id),
        }
    }
}

/// An entry in the registry journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
        }
    }
}
