use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};

use registry::{CourseId, ErrorKind, EventKind, EventStore, Identity, Ledger, Registry};

fn id(s: &str) -> Identity {
    s.parse().unwrap()
}

fn temp_db() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("registry.db");
    (dir, path)
}

#[test]
fn test_enroll_and_grade_walkthrough() {
    let owner = id("0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
    let prof = id("0x70997970C51812dc3A010C7d01b50e0d17dc79C8");
    let aluno1 = id("0x3C44CdDdB6a900fa2b585dd299e03d12FA4293BC");

    let mut registry = Registry::new(owner.clone());

    let course = registry
        .create_course(&owner, "Programacao Avancada", &prof)
        .unwrap();
    assert_eq!(course, CourseId(0));

    registry.enroll_student(&prof, course, &aluno1).unwrap();
    registry.post_grade(&prof, course, &aluno1, 95).unwrap();

    assert_eq!(registry.grade_value(course, &aluno1), 95);
    assert_eq!(
        registry.events().last().map(|e| &e.kind),
        Some(&EventKind::GradePosted {
            course_id: CourseId(0),
            student: aluno1,
            value: 95,
        })
    );
}

#[test]
fn test_unenrolled_grade_stays_unset() {
    let owner = id("0xowner");
    let prof = id("0xprof");
    let aluno2 = id("0xaluno2");
    let ledger = Ledger::in_memory(owner.clone());
    let course = ledger.create_course(&owner, "Calculo I", &prof).unwrap();

    let err = ledger.post_grade(&prof, course, &aluno2, 80).unwrap_err();

    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(ledger.grade(course, &aluno2).unwrap(), None);
    assert_eq!(ledger.grade_value(course, &aluno2).unwrap(), 0);
}

#[test]
fn test_every_non_owner_is_rejected() {
    let owner = id("0xowner");
    let ledger = Ledger::in_memory(owner);

    for caller in ["0xprof", "0xaluno1", "0xaluno2", "0xother"] {
        let caller = id(caller);
        let err = ledger
            .create_course(&caller, "Fisica I", &id("0xprof"))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(err.to_string().contains(caller.as_str()));
    }
    assert!(ledger.courses().unwrap().is_empty());
}

#[test]
fn test_reopen_store_restores_state() {
    let (_dir, path) = temp_db();
    let owner = id("0xowner");
    let prof = id("0xprof");
    let alice = id("0xalice");

    {
        let ledger = Ledger::init(EventStore::open(&path).unwrap(), owner.clone()).unwrap();
        let course = ledger.create_course(&owner, "Calculo I", &prof).unwrap();
        ledger.enroll_student(&prof, course, &alice).unwrap();
        ledger.post_grade(&prof, course, &alice, 72).unwrap();
        ledger.post_grade(&prof, course, &alice, 88).unwrap();
    }

    let ledger = Ledger::open(EventStore::open(&path).unwrap()).unwrap();
    assert_eq!(ledger.owner().unwrap(), owner);
    assert_eq!(ledger.course(CourseId(0)).unwrap().instructor, prof);
    assert!(ledger.is_enrolled(CourseId(0), &alice).unwrap());
    assert_eq!(ledger.grade_value(CourseId(0), &alice).unwrap(), 88);

    // Ids keep counting from the replayed state.
    let next = ledger.create_course(&owner, "Calculo II", &prof).unwrap();
    assert_eq!(next, CourseId(1));

    let store = EventStore::open(&path).unwrap();
    assert_eq!(store.count().unwrap(), 6);
}

#[test]
fn test_init_twice_fails() {
    let (_dir, path) = temp_db();
    Ledger::init(EventStore::open(&path).unwrap(), id("0xowner")).unwrap();

    let err = Ledger::init(EventStore::open(&path).unwrap(), id("0xintruder")).unwrap_err();
    assert!(matches!(err, registry::Error::AlreadyInitialized));
}

#[test]
fn test_readers_never_see_grade_without_enrollment() {
    let owner = id("0xowner");
    let prof = id("0xprof");
    let ledger = Ledger::in_memory(owner.clone());
    let course = ledger.create_course(&owner, "Calculo I", &prof).unwrap();
    let students: Vec<Identity> = (0..50).map(|i| id(&format!("0xstudent{i}"))).collect();
    let done = AtomicBool::new(false);

    std::thread::scope(|s| {
        for _ in 0..4 {
            s.spawn(|| {
                while !done.load(Ordering::Acquire) {
                    ledger
                        .read(|r| {
                            for student in &students {
                                if r.grade(course, student).is_some() {
                                    assert!(r.is_enrolled(course, student));
                                }
                            }
                        })
                        .unwrap();
                }
            });
        }

        for (i, student) in students.iter().enumerate() {
            ledger.enroll_student(&prof, course, student).unwrap();
            ledger
                .post_grade(&prof, course, student, (i % 101) as i64)
                .unwrap();
        }
        done.store(true, Ordering::Release);
    });

    assert_eq!(ledger.roster(course).unwrap().len(), students.len());
    // genesis + course + one enrollment and one grade per student
    assert_eq!(ledger.events().unwrap().len(), 2 + 2 * students.len());
}

#[test]
fn test_concurrent_course_creation_is_gapless() {
    let owner = id("0xowner");
    let prof = id("0xprof");
    let ledger = Ledger::in_memory(owner.clone());

    let mut ids: Vec<u64> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let (ledger, owner, prof) = (&ledger, &owner, &prof);
                s.spawn(move || {
                    (0..10)
                        .map(|i| {
                            ledger
                                .create_course(owner, &format!("Course {t}-{i}"), prof)
                                .unwrap()
                                .0
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    ids.sort_unstable();
    assert_eq!(ids, (0..80).collect::<Vec<_>>());
}

#[test]
fn test_two_handles_share_one_journal() {
    let (_dir, path) = temp_db();
    let owner = id("0xowner");
    let prof = id("0xprof");
    let alice = id("0xalice");

    Ledger::init(EventStore::open(&path).unwrap(), owner.clone()).unwrap();
    let a = Ledger::open(EventStore::open(&path).unwrap()).unwrap();
    let b = Ledger::open(EventStore::open(&path).unwrap()).unwrap();
    let mut b_events = b.subscribe();

    assert_eq!(a.create_course(&owner, "Calculo I", &prof).unwrap(), CourseId(0));
    // b absorbs course 0 before planning, so it cannot hand out id 0 again.
    assert_eq!(b.create_course(&owner, "Fisica I", &prof).unwrap(), CourseId(1));
    assert_eq!(b.course(CourseId(0)).unwrap().name, "Calculo I");

    assert_eq!(
        a.course(CourseId(1)).unwrap_err().kind(),
        ErrorKind::NotFound
    );
    assert_eq!(a.refresh().unwrap(), 1);
    assert_eq!(a.course(CourseId(1)).unwrap().name, "Fisica I");
    assert_eq!(a.refresh().unwrap(), 0);

    a.enroll_student(&prof, CourseId(1), &alice).unwrap();
    b.post_grade(&prof, CourseId(1), &alice, 77).unwrap();

    let seen: Vec<_> = std::iter::from_fn(|| b_events.try_recv().ok())
        .map(|e| e.kind.name())
        .collect();
    assert_eq!(
        seen,
        ["course_created", "course_created", "student_enrolled", "grade_posted"]
    );

    let reopened = Ledger::open(EventStore::open(&path).unwrap()).unwrap();
    assert_eq!(reopened.courses().unwrap().len(), 2);
    assert_eq!(reopened.grade_value(CourseId(1), &alice).unwrap(), 77);
    assert_eq!(EventStore::open(&path).unwrap().count().unwrap(), 5);
}

#[test]
fn test_handles_on_one_file_issue_gapless_ids() {
    let (_dir, path) = temp_db();
    let owner = id("0xowner");
    let prof = id("0xprof");
    Ledger::init(EventStore::open(&path).unwrap(), owner.clone()).unwrap();

    let mut ids: Vec<u64> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let (path, owner, prof) = (&path, &owner, &prof);
                s.spawn(move || {
                    let ledger = Ledger::open(EventStore::open(path).unwrap()).unwrap();
                    (0..10)
                        .map(|i| {
                            ledger
                                .create_course(owner, &format!("Course {t}-{i}"), prof)
                                .unwrap()
                                .0
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect()
    });

    ids.sort_unstable();
    assert_eq!(ids, (0..40).collect::<Vec<_>>());

    let ledger = Ledger::open(EventStore::open(&path).unwrap()).unwrap();
    assert_eq!(ledger.read(|r| r.course_count()).unwrap(), 40);
}
