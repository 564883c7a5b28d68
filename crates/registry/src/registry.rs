//! The registry state machine.

use std::collections::{BTreeSet, HashMap};

use policy::{Action, Grants, Identity};
use storage::{CourseId, Event, EventKind};

use crate::{Course, Enrollment, Error, Grade, Result};

const NOT_ENROLLED: &str = "student is not enrolled in this course";

#[derive(Debug, Clone)]
struct CourseRecord {
    course: Course,
    students: BTreeSet<Identity>,
    grades: HashMap<Identity, Grade>,
}

/// Courses, enrollments, and grades, guarded by the owner/instructor policy.
///
/// Every successful mutation appends exactly one [`Event`] to the journal
/// returned by [`Registry::events`]. A failed mutation changes nothing.
#[derive(Debug, Clone)]
pub struct Registry {
    owner: Identity,
    courses: Vec<CourseRecord>,
    events: Vec<Event>,
}

impl Registry {
    /// Create an empty registry owned by `owner`.
    ///
    /// The journal starts with a `RegistryOpened` entry recording the owner.
    pub fn new(owner: Identity) -> Self {
        let genesis = Event::new(EventKind::RegistryOpened {
            owner: owner.clone(),
        });
        Self {
            owner,
            courses: Vec::new(),
            events: vec![genesis],
        }
    }

    /// Rebuild a registry from its journal.
    ///
    /// Entries are checked for structural consistency (dense ids, existing
    /// courses, grades only for enrolled students) but not re-authorized.
    pub fn replay(events: impl IntoIterator<Item = Event>) -> Result<Self> {
        let mut events = events.into_iter();
        let genesis = events.next().ok_or(Error::NotInitialized)?;
        let EventKind::RegistryOpened { owner } = &genesis.kind else {
            return Err(Error::CorruptJournal(format!(
                "journal starts with {} instead of registry_opened",
                genesis.kind.name()
            )));
        };

        let mut registry = Self {
            owner: owner.clone(),
            courses: Vec::new(),
            events: Vec::new(),
        };
        registry.events.push(genesis);

        for event in events {
            registry.apply(&event.kind)?;
            registry.events.push(event);
        }

        tracing::debug!(
            owner = %registry.owner,
            events = registry.events.len(),
            courses = registry.courses.len(),
            "journal replayed"
        );
        Ok(registry)
    }

    /// Create a course. Owner only.
    pub fn create_course(
        &mut self,
        caller: &Identity,
        name: &str,
        instructor: &Identity,
    ) -> Result<CourseId> {
        let (kind, course_id) = self.plan_create_course(caller, name, instructor)?;
        self.commit(Event::new(kind))?;
        Ok(course_id)
    }

    /// Enroll `student` in a course. Course instructor only.
    ///
    /// Enrolling an already-enrolled student succeeds without changing state.
    pub fn enroll_student(
        &mut self,
        caller: &Identity,
        course_id: CourseId,
        student: &Identity,
    ) -> Result<()> {
        let kind = self.plan_enroll_student(caller, course_id, student)?;
        self.commit(Event::new(kind))
    }

    /// Post or overwrite a grade. Course instructor only, enrolled students only.
    pub fn post_grade(
        &mut self,
        caller: &Identity,
        course_id: CourseId,
        student: &Identity,
        value: i64,
    ) -> Result<()> {
        let kind = self.plan_post_grade(caller, course_id, student, value)?;
        self.commit(Event::new(kind))
    }

    pub fn owner(&self) -> &Identity {
        &self.owner
    }

    pub fn course(&self, course_id: CourseId) -> Result<&Course> {
        self.record(course_id).map(|r| &r.course)
    }

    /// All courses in id order.
    pub fn courses(&self) -> impl Iterator<Item = &Course> {
        self.courses.iter().map(|r| &r.course)
    }

    pub fn course_count(&self) -> usize {
        self.courses.len()
    }

    /// The id the next created course will receive.
    pub fn next_course_id(&self) -> CourseId {
        CourseId(self.courses.len() as u64)
    }

    pub fn is_enrolled(&self, course_id: CourseId, student: &Identity) -> bool {
        self.record(course_id)
            .is_ok_and(|r| r.students.contains(student))
    }

    pub fn enrollment(&self, course_id: CourseId, student: &Identity) -> Enrollment {
        Enrollment {
            course_id,
            student: student.clone(),
            enrolled: self.is_enrolled(course_id, student),
        }
    }

    /// Enrolled students of a course, sorted.
    pub fn roster(&self, course_id: CourseId) -> Result<Vec<Identity>> {
        Ok(self.record(course_id)?.students.iter().cloned().collect())
    }

    /// The posted grade, or `None` if no grade was ever posted.
    pub fn grade(&self, course_id: CourseId, student: &Identity) -> Option<Grade> {
        self.record(course_id)
            .ok()
            .and_then(|r| r.grades.get(student).copied())
    }

    /// The posted grade value, with `0` standing in for "never graded".
    pub fn grade_value(&self, course_id: CourseId, student: &Identity) -> u8 {
        self.grade(course_id, student).map_or(0, Grade::value)
    }

    /// The journal, oldest first.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub(crate) fn plan_create_course(
        &self,
        caller: &Identity,
        name: &str,
        instructor: &Identity,
    ) -> Result<(EventKind, CourseId)> {
        self.authorize(Action::CreateCourse, caller, None)?;

        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument("course name must not be empty".into()));
        }

        let course_id = self.next_course_id();
        let kind = EventKind::CourseCreated {
            course_id,
            name: name.to_string(),
            instructor: instructor.clone(),
        };
        Ok((kind, course_id))
    }

    pub(crate) fn plan_enroll_student(
        &self,
        caller: &Identity,
        course_id: CourseId,
        student: &Identity,
    ) -> Result<EventKind> {
        let record = self.record(course_id)?;
        self.authorize(
            Action::EnrollStudent,
            caller,
            Some(&record.course.instructor),
        )?;

        Ok(EventKind::StudentEnrolled {
            course_id,
            student: student.clone(),
        })
    }

    pub(crate) fn plan_post_grade(
        &self,
        caller: &Identity,
        course_id: CourseId,
        student: &Identity,
        value: i64,
    ) -> Result<EventKind> {
        let record = self.record(course_id)?;
        self.authorize(Action::PostGrade, caller, Some(&record.course.instructor))?;

        if !record.students.contains(student) {
            return Err(Error::InvalidState(NOT_ENROLLED.into()));
        }
        let grade = Grade::new(value)?;

        Ok(EventKind::GradePosted {
            course_id,
            student: student.clone(),
            value: grade.value(),
        })
    }

    /// Apply an event and append it to the journal.
    pub(crate) fn commit(&mut self, event: Event) -> Result<()> {
        self.apply(&event.kind)?;
        tracing::info!(
            kind = event.kind.name(),
            course_id = ?event.kind.course_id(),
            "event committed"
        );
        self.events.push(event);
        Ok(())
    }

    fn apply(&mut self, kind: &EventKind) -> Result<()> {
        match kind {
            EventKind::RegistryOpened { .. } => Err(Error::CorruptJournal(
                "registry_opened after the first entry".into(),
            )),
            EventKind::CourseCreated {
                course_id,
                name,
                instructor,
            } => {
                let expected = self.next_course_id();
                if *course_id != expected {
                    return Err(Error::CorruptJournal(format!(
                        "course {course_id} created where {expected} was next"
                    )));
                }
                self.courses.push(CourseRecord {
                    course: Course {
                        id: *course_id,
                        name: name.clone(),
                        instructor: instructor.clone(),
                    },
                    students: BTreeSet::new(),
                    grades: HashMap::new(),
                });
                Ok(())
            }
            EventKind::StudentEnrolled { course_id, student } => {
                let record = self.known_course_mut(*course_id)?;
                record.students.insert(student.clone());
                Ok(())
            }
            EventKind::GradePosted {
                course_id,
                student,
                value,
            } => {
                let grade = Grade::new(i64::from(*value))
                    .map_err(|e| Error::CorruptJournal(e.to_string()))?;
                let record = self.known_course_mut(*course_id)?;
                if !record.students.contains(student) {
                    return Err(Error::CorruptJournal(format!(
                        "grade for {student} in course {course_id}: {NOT_ENROLLED}"
                    )));
                }
                record.grades.insert(student.clone(), grade);
                Ok(())
            }
        }
    }

    fn authorize(
        &self,
        action: Action,
        caller: &Identity,
        instructor: Option<&Identity>,
    ) -> Result<()> {
        let grants = Grants {
            owner: &self.owner,
            instructor,
        };
        let decision = policy::authorize(action, caller, &grants);
        if let policy::Decision::Deny { required } = decision {
            tracing::warn!(%caller, ?action, %required, "authorization denied");
        }
        Ok(decision.require(caller)?)
    }

    fn known_course_mut(&mut self, course_id: CourseId) -> Result<&mut CourseRecord> {
        self.record_mut(course_id)
            .map_err(|_| Error::CorruptJournal(format!("event for unknown course {course_id}")))
    }

    fn record(&self, course_id: CourseId) -> Result<&CourseRecord> {
        usize::try_from(course_id.0)
            .ok()
            .and_then(|i| self.courses.get(i))
            .ok_or(Error::NotFound(course_id))
    }

    fn record_mut(&mut self, course_id: CourseId) -> Result<&mut CourseRecord> {
        usize::try_from(course_id.0)
            .ok()
            .and_then(|i| self.courses.get_mut(i))
            .ok_or(Error::NotFound(course_id))
    }
}
