//! Thread-safe, journal-backed registry handle.

use std::sync::{Mutex, RwLock, RwLockReadGuard};

use policy::Identity;
use storage::{AppendTx, CourseId, Event, EventKind, EventStore};
use tokio::sync::broadcast;

use crate::{Course, Error, Grade, Registry, Result};

/// Capacity of the event broadcast channel. Slow subscribers lag; they
/// never block writers.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A [`Registry`] shared between threads, optionally persisted to an
/// [`EventStore`], publishing each committed event to subscribers.
///
/// Mutations hold the write lock for the whole call, so they are atomic and
/// totally ordered. Queries hold the read lock and run concurrently.
#[derive(Debug)]
pub struct Ledger {
    registry: RwLock<Registry>,
    store: Option<Mutex<EventStore>>,
    events: broadcast::Sender<Event>,
}

impl Ledger {
    /// A ledger that lives only in memory.
    pub fn in_memory(owner: Identity) -> Self {
        Self::from_parts(Registry::new(owner), None)
    }

    /// Start a new registry in an empty store.
    ///
    /// The emptiness check and the genesis write happen under one database
    /// write lock, so two racing `init` calls cannot both succeed.
    pub fn init(mut store: EventStore, owner: Identity) -> Result<Self> {
        let registry = Registry::new(owner);
        {
            let tx = store.begin_append()?;
            if tx.count()? > 0 {
                return Err(Error::AlreadyInitialized);
            }
            for event in registry.events() {
                tx.append(event)?;
            }
            tx.commit()?;
        }
        tracing::info!(owner = %registry.owner(), "registry initialized");

        Ok(Self::from_parts(registry, Some(store)))
    }

    /// Reopen a registry by replaying the store's journal.
    pub fn open(store: EventStore) -> Result<Self> {
        let registry = Registry::replay(store.load_all()?)?;
        Ok(Self::from_parts(registry, Some(store)))
    }

    fn from_parts(registry: Registry, store: Option<EventStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: RwLock::new(registry),
            store: store.map(Mutex::new),
            events,
        }
    }

    /// Pull in events other handles appended to the same store.
    ///
    /// Returns how many events were absorbed. Mutations do this on their
    /// own; call it before reads that must see other writers.
    pub fn refresh(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let mut registry = self.registry.write().map_err(|_| Error::Poisoned)?;
        let mut store = store.lock().map_err(|_| Error::Poisoned)?;
        let tx = store.begin_append()?;
        self.catch_up(&mut *registry, &tx)
    }

    /// Receive every event committed after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.events.subscribe()
    }

    pub fn create_course(
        &self,
        caller: &Identity,
        name: &str,
        instructor: &Identity,
    ) -> Result<CourseId> {
        self.mutate(|r| r.plan_create_course(caller, name, instructor))
    }

    pub fn enroll_student(
        &self,
        caller: &Identity,
        course_id: CourseId,
        student: &Identity,
    ) -> Result<()> {
        self.mutate(|r| Ok((r.plan_enroll_student(caller, course_id, student)?, ())))
    }

    pub fn post_grade(
        &self,
        caller: &Identity,
        course_id: CourseId,
        student: &Identity,
        value: i64,
    ) -> Result<()> {
        self.mutate(|r| Ok((r.plan_post_grade(caller, course_id, student, value)?, ())))
    }

    /// Run `f` against one consistent snapshot of the registry.
    pub fn read<T>(&self, f: impl FnOnce(&Registry) -> T) -> Result<T> {
        Ok(f(&*self.read_guard()?))
    }

    pub fn owner(&self) -> Result<Identity> {
        self.read(|r| r.owner().clone())
    }

    pub fn course(&self, course_id: CourseId) -> Result<Course> {
        self.read(|r| r.course(course_id).cloned())?
    }

    pub fn courses(&self) -> Result<Vec<Course>> {
        self.read(|r| r.courses().cloned().collect())
    }

    pub fn is_enrolled(&self, course_id: CourseId, student: &Identity) -> Result<bool> {
        self.read(|r| r.is_enrolled(course_id, student))
    }

    pub fn roster(&self, course_id: CourseId) -> Result<Vec<Identity>> {
        self.read(|r| r.roster(course_id))?
    }

    pub fn grade(&self, course_id: CourseId, student: &Identity) -> Result<Option<Grade>> {
        self.read(|r| r.grade(course_id, student))
    }

    pub fn grade_value(&self, course_id: CourseId, student: &Identity) -> Result<u8> {
        self.read(|r| r.grade_value(course_id, student))
    }

    pub fn events(&self) -> Result<Vec<Event>> {
        self.read(|r| r.events().to_vec())
    }

    /// Plan against the current state, persist, then apply and publish.
    ///
    /// With a store, the whole call runs under the database write lock:
    /// events appended by other handles are absorbed first, so plans never
    /// reuse an id. Nothing is applied unless the append commits.
    fn mutate<T>(&self, plan: impl FnOnce(&Registry) -> Result<(EventKind, T)>) -> Result<T> {
        let mut registry = self.registry.write().map_err(|_| Error::Poisoned)?;

        let Some(store) = &self.store else {
            let (kind, output) = plan(&*registry)?;
            let event = Event::new(kind);
            registry.commit(event.clone())?;
            self.publish(event);
            return Ok(output);
        };

        let mut store = store.lock().map_err(|_| Error::Poisoned)?;
        let tx = store.begin_append()?;
        self.catch_up(&mut *registry, &tx)?;

        let (kind, output) = plan(&*registry)?;
        let event = Event::new(kind);
        tx.append(&event)?;
        tx.commit()?;

        registry.commit(event.clone())?;
        self.publish(event);
        Ok(output)
    }

    fn catch_up(&self, registry: &mut Registry, tx: &AppendTx<'_>) -> Result<usize> {
        let known = registry.events().len() as u64;
        let stored = tx.count()?;
        if stored < known {
            return Err(Error::CorruptJournal(format!(
                "store holds {stored} events but this ledger has seen {known}"
            )));
        }

        let fresh = tx.load_since(known)?;
        let absorbed = fresh.len();
        for event in fresh {
            registry.commit(event.clone())?;
            self.publish(event);
        }
        if absorbed > 0 {
            tracing::debug!(absorbed, "caught up with journal");
        }
        Ok(absorbed)
    }

    fn publish(&self, event: Event) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    fn read_guard(&self) -> Result<RwLockReadGuard<'_, Registry>> {
        self.registry.read().map_err(|_| Error::Poisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tokio::sync::broadcast::error::TryRecvError;

    fn id(s: &str) -> Identity {
        s.parse().unwrap()
    }

    #[test]
    fn test_init_persists_genesis() {
        let owner = id("0xowner");
        let ledger = Ledger::init(EventStore::in_memory().unwrap(), owner.clone()).unwrap();

        assert_eq!(ledger.owner().unwrap(), owner);
        let events = ledger.events().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventKind::RegistryOpened { owner });
    }

    #[test]
    fn test_init_refuses_used_store() {
        let store = EventStore::in_memory().unwrap();
        store
            .append(&Event::new(EventKind::RegistryOpened {
                owner: id("0xfirst"),
            }))
            .unwrap();

        assert!(matches!(
            Ledger::init(store, id("0xsecond")),
            Err(Error::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_open_empty_store() {
        let store = EventStore::in_memory().unwrap();
        assert!(matches!(Ledger::open(store), Err(Error::NotInitialized)));
    }

    #[test]
    fn test_subscribers_see_each_mutation_once() {
        let owner = id("0xowner");
        let prof = id("0xprof");
        let alice = id("0xalice");
        let ledger = Ledger::in_memory(owner.clone());
        let mut rx = ledger.subscribe();

        let course = ledger.create_course(&owner, "Calculo I", &prof).unwrap();
        ledger.enroll_student(&prof, course, &alice).unwrap();
        assert!(ledger.post_grade(&prof, course, &alice, 101).is_err());
        ledger.post_grade(&prof, course, &alice, 95).unwrap();

        let kinds: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind.name())
            .collect();
        assert_eq!(kinds, ["course_created", "student_enrolled", "grade_posted"]);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[test]
    fn test_failed_mutation_leaves_state() {
        let owner = id("0xowner");
        let prof = id("0xprof");
        let ledger = Ledger::in_memory(owner.clone());
        ledger.create_course(&owner, "Calculo I", &prof).unwrap();
        let before = ledger.events().unwrap();

        let err = ledger
            .enroll_student(&owner, CourseId(0), &id("0xalice"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert_eq!(ledger.events().unwrap(), before);
    }

    #[test]
    fn test_queries_on_missing_course() {
        let ledger = Ledger::in_memory(id("0xowner"));
        let alice = id("0xalice");

        assert!(matches!(ledger.course(CourseId(0)), Err(Error::NotFound(_))));
        assert!(matches!(ledger.roster(CourseId(0)), Err(Error::NotFound(_))));
        assert!(!ledger.is_enrolled(CourseId(0), &alice).unwrap());
        assert_eq!(ledger.grade(CourseId(0), &alice).unwrap(), None);
    }
    #[test]
    fn test_rejected_append_leaves_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.db");
        let owner = id("0xowner");
        let prof = id("0xprof");
        let ledger = Ledger::init(EventStore::open(&path).unwrap(), owner.clone()).unwrap();
        let mut rx = ledger.subscribe();

        let admin = rusqlite::Connection::open(&path).unwrap();
        admin
            .execute_batch(
                "CREATE TRIGGER reject_writes BEFORE INSERT ON events
                 BEGIN SELECT RAISE(ABORT, 'journal is read-only'); END;",
            )
            .unwrap();

        let err = ledger
            .create_course(&owner, "Calculo I", &prof)
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert_eq!(ledger.events().unwrap().len(), 1);
        assert_eq!(ledger.read(|r| r.course_count()).unwrap(), 0);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        admin.execute_batch("DROP TRIGGER reject_writes;").unwrap();

        // The failed call did not consume an id.
        let course = ledger.create_course(&owner, "Calculo I", &prof).unwrap();
        assert_eq!(course, CourseId(0));
        assert_eq!(rx.try_recv().unwrap().kind.name(), "course_created");
    }

    #[test]
    fn test_refresh_without_store() {
        let ledger = Ledger::in_memory(id("0xowner"));
        assert_eq!(ledger.refresh().unwrap(), 0);
    }
}
