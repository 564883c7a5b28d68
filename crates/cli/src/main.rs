mod config;
mod error;

use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use clap::{Parser, Subcommand};
use policy::Identity;
use registry::{Course, CourseId, Ledger};
use storage::{Event, EventKind, EventStore};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use config::Config;
use error::{Error, Result};

const CONFIG_FILE: &str = "crid.toml";
const DB_FILE: &str = "registry.db";

#[derive(Parser)]
#[command(name = "crid")]
#[command(about = "Course registry with instructor-delegated grading", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the config file
    #[arg(long, global = true, default_value = CONFIG_FILE)]
    config: PathBuf,

    /// Path to the registry database (overrides storage.path)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a new registry owned by the given identity
    Init {
        /// Registry owner (defaults to registry.owner from config)
        #[arg(long)]
        owner: Option<Identity>,
    },
    /// Create a course (registry owner only)
    CreateCourse {
        /// Identity performing the call
        #[arg(long = "as", value_name = "CALLER")]
        caller: Identity,
        name: String,
        instructor: Identity,
    },
    /// Enroll a student in a course (course instructor only)
    Enroll {
        #[arg(long = "as", value_name = "CALLER")]
        caller: Identity,
        course: CourseId,
        student: Identity,
    },
    /// Post a grade between 0 and 100 (course instructor only)
    PostGrade {
        #[arg(long = "as", value_name = "CALLER")]
        caller: Identity,
        course: CourseId,
        student: Identity,
        #[arg(allow_hyphen_values = true)]
        value: i64,
    },
    /// Show one course
    Course { course: CourseId },
    /// List all courses
    Courses,
    /// Show a student's grade
    Grade { course: CourseId, student: Identity },
    /// Show whether a student is enrolled
    Enrollment { course: CourseId, student: Identity },
    /// List the students enrolled in a course
    Roster { course: CourseId },
    /// Show the event journal
    Logs {
        /// Filter by event kind (course_created, student_enrolled, grade_posted)
        #[arg(short, long)]
        kind: Option<String>,
        /// Only events for this course
        #[arg(short, long, conflicts_with = "kind")]
        course: Option<CourseId>,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config)?;
    init_tracing(&config.log.filter);

    let db_path = match cli.db.or(config.storage.path) {
        Some(path) => path,
        None => dirs_data_dir().ok_or(Error::NoDataDir)?.join(DB_FILE),
    };
    tracing::debug!(db = %db_path.display(), "using registry database");

    match cli.command {
        Commands::Init { owner } => {
            let owner = owner.or(config.registry.owner).ok_or(Error::MissingOwner)?;
            cmd_init(&db_path, owner)
        }
        Commands::CreateCourse {
            caller,
            name,
            instructor,
        } => {
            let ledger = open_ledger(&db_path)?;
            let course_id = ledger.create_course(&caller, &name, &instructor)?;
            println!("Created course {course_id}: {name} (instructor {instructor})");
            Ok(())
        }
        Commands::Enroll {
            caller,
            course,
            student,
        } => {
            let ledger = open_ledger(&db_path)?;
            ledger.enroll_student(&caller, course, &student)?;
            println!("Enrolled {student} in course {course}");
            Ok(())
        }
        Commands::PostGrade {
            caller,
            course,
            student,
            value,
        } => {
            let ledger = open_ledger(&db_path)?;
            ledger.post_grade(&caller, course, &student, value)?;
            println!("Posted grade {value} for {student} in course {course}");
            Ok(())
        }
        Commands::Course { course } => {
            let ledger = open_ledger(&db_path)?;
            print_courses(&[ledger.course(course)?]);
            Ok(())
        }
        Commands::Courses => {
            let ledger = open_ledger(&db_path)?;
            let courses = ledger.courses()?;
            if courses.is_empty() {
                println!("No courses found.");
            } else {
                print_courses(&courses);
            }
            Ok(())
        }
        Commands::Grade { course, student } => {
            let ledger = open_ledger(&db_path)?;
            ledger.course(course)?;
            match ledger.grade(course, &student)? {
                Some(grade) => println!("{grade}"),
                None => println!("no grade posted"),
            }
            Ok(())
        }
        Commands::Enrollment { course, student } => {
            let ledger = open_ledger(&db_path)?;
            ledger.course(course)?;
            println!("{}", ledger.is_enrolled(course, &student)?);
            Ok(())
        }
        Commands::Roster { course } => {
            let ledger = open_ledger(&db_path)?;
            let students = ledger.roster(course)?;
            if students.is_empty() {
                println!("No students enrolled in course {course}.");
            }
            for student in students {
                let grade = ledger
                    .grade(course, &student)?
                    .map_or_else(|| "-".to_string(), |g| g.to_string());
                println!("{student:<44}  {grade:>5}");
            }
            Ok(())
        }
        Commands::Logs { kind, course } => cmd_logs(&db_path, kind.as_deref(), course),
    }
}

fn init_tracing(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

fn cmd_init(db_path: &Path, owner: Identity) -> Result<()> {
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let store = EventStore::open(db_path)?;
    Ledger::init(store, owner.clone())?;

    println!("Registry initialized at: {}", db_path.display());
    println!("Owner: {owner}");
    Ok(())
}

fn cmd_logs(db_path: &Path, kind_filter: Option<&str>, course: Option<CourseId>) -> Result<()> {
    let store = open_store(db_path)?;
    let events = match course {
        Some(course_id) => store.load_course(course_id)?,
        None => store.load_events(kind_filter)?,
    };

    if events.is_empty() {
        println!("No events found.");
        return Ok(());
    }

    for event in events {
        print_event(&event);
    }
    Ok(())
}

fn print_courses(courses: &[Course]) {
    println!("{:<6}  {:<32}  INSTRUCTOR", "ID", "NAME");
    println!("{}", "-".repeat(84));
    for course in courses {
        println!("{:<6}  {:<32}  {}", course.id, course.name, course.instructor);
    }
}

fn print_event(event: &Event) {
    let time = Local
        .from_utc_datetime(&event.timestamp.naive_utc())
        .format("%Y-%m-%d %H:%M:%S");

    match &event.kind {
        EventKind::RegistryOpened { owner } => {
            println!("[{time}] === Registry opened by {owner} ===");
        }
        EventKind::CourseCreated {
            course_id,
            name,
            instructor,
        } => {
            println!("[{time}] COURSE {course_id} CREATED: {name} (instructor {instructor})");
        }
        EventKind::StudentEnrolled { course_id, student } => {
            println!("[{time}] ENROLLED: {student} in course {course_id}");
        }
        EventKind::GradePosted {
            course_id,
            student,
            value,
        } => {
            println!("[{time}] GRADE: {student} in course {course_id} = {value}");
        }
    }
}

fn open_store(db_path: &Path) -> Result<EventStore> {
    if !db_path.exists() {
        return Err(Error::DatabaseNotFound {
            path: db_path.to_path_buf(),
        });
    }
    Ok(EventStore::open(db_path)?)
}

fn open_ledger(db_path: &Path) -> Result<Ledger> {
    Ok(Ledger::open(open_store(db_path)?)?)
}

fn dirs_data_dir() -> Option<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share/crid"))
    }
    #[cfg(target_os = "linux")]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".local/share")))
            .map(|p| p.join("crid"))
    }
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|h| PathBuf::from(h).join("crid"))
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        None
    }
}
