use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_USER: &str = "user";
pub const STATUS_PENDING: &str = "pending";

/// Registered person who can own tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub uid: String,
    pub full_name: String,
    pub email: String,
    pub role: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl User {
    pub fn new(uid: impl Into<String>, full_name: impl Into<String>, email: impl Into<String>) -> Self {
        User {
            uid: uid.into(),
            full_name: full_name.into(),
            email: email.into(),
            role: ROLE_USER.to_string(),
            created_at: None,
            updated_at: None,
        }
    }

    /// Builder pattern: role
    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = role.into();
        self
    }

    pub fn is_admin(&self) -> bool {
        self.role == ROLE_ADMIN
    }
}

/// Task row as handed to the storage layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub id: String,
    pub title: String,
    pub responsible: String,
    pub responsible_id: String,
    pub due_date: NaiveDate,
    pub notes: String,
    pub recurring: bool,
    pub frequency: String,
    /// Store the dedupe hash so repeats are rejected
    pub dedupe: bool,
}

impl NewTask {
    /// Deduplication key over (title, due date, owner)
    /// NOTE: identity is `id` (UUID); this hash only detects repeats
    pub fn dedupe_hash(&self) -> String {
        dedupe_hash(&self.title, self.due_date, &self.responsible_id)
    }
}

pub fn dedupe_hash(title: &str, due_date: NaiveDate, owner_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}|{}|{}", title, due_date.format("%Y-%m-%d"), owner_id));
    format!("{:x}", hasher.finalize())
}

/// Stored task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub responsible: String,
    pub responsible_id: String,
    pub due_date: NaiveDate,
    pub notes: String,
    pub status: String,
    pub recurring: bool,
    pub frequency: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Result of a task insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateTask {
    Created(String),
    /// Same (title, due date, owner) already stored
    Duplicate,
}

/// Metadata of an uploaded attachment (contents live elsewhere)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: i64,
    pub filename: String,
    pub original_name: String,
    pub file_path: String,
    pub mime_type: String,
    pub size: i64,
    pub task_id: String,
    pub uploaded_by: String,
    pub upload_date: DateTime<Utc>,
    pub download_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFile {
    pub filename: String,
    pub original_name: String,
    pub file_path: String,
    pub mime_type: String,
    pub size: i64,
    pub task_id: String,
    pub uploaded_by: String,
}

/// Audit trail entry ("every change is an event")
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityLog {
    pub id: i64,
    pub user_id: String,
    pub user_email: String,
    pub action: String,
    pub task_id: Option<String>,
    pub task_title: Option<String>,
    pub details: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ActivityLog {
    pub fn new(user_id: &str, user_email: &str, action: &str, details: serde_json::Value) -> Self {
        ActivityLog {
            id: 0,
            user_id: user_id.to_string(),
            user_email: user_email.to_string(),
            action: action.to_string(),
            task_id: None,
            task_title: None,
            details,
            timestamp: Utc::now(),
        }
    }

    /// Builder pattern: attach the task the action touched
    pub fn for_task(mut self, task_id: &str, task_title: &str) -> Self {
        self.task_id = Some(task_id.to_string());
        self.task_title = Some(task_title.to_string());
        self
    }
}

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS users (
            uid TEXT PRIMARY KEY,
            full_name TEXT NOT NULL,
            email TEXT UNIQUE NOT NULL COLLATE NOCASE,
            role TEXT NOT NULL DEFAULT 'user',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    // ==========================================================================
    // Tasks Table (dedupe_hash is NULL for hand-made tasks)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            responsible TEXT NOT NULL,
            responsible_id TEXT NOT NULL,
            due_date TEXT NOT NULL,
            notes TEXT,
            status TEXT NOT NULL DEFAULT 'pending',
            recurring INTEGER NOT NULL DEFAULT 0,
            frequency TEXT NOT NULL DEFAULT 'monthly',
            dedupe_hash TEXT UNIQUE,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            filename TEXT NOT NULL,
            original_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            mime_type TEXT,
            size INTEGER NOT NULL DEFAULT 0,
            task_id TEXT NOT NULL,
            uploaded_by TEXT NOT NULL,
            upload_date TEXT NOT NULL,
            download_count INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE
        )",
        [],
    )?;

    // ==========================================================================
    // Audit trail
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS activity_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            user_email TEXT NOT NULL,
            action TEXT NOT NULL,
            task_id TEXT,
            task_title TEXT,
            details TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS file_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id INTEGER NOT NULL,
            action TEXT NOT NULL,
            user_id TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_tasks_owner_date ON tasks(responsible_id, due_date)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_files_task ON files(task_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_activity_user ON activity_logs(user_id, timestamp)",
        [],
    )?;

    Ok(())
}

fn parse_timestamp(raw: Option<String>) -> Option<DateTime<Utc>> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

fn conversion_error<E>(index: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(index, rusqlite::types::Type::Text, Box::new(err))
}

/// UNIQUE failure on the dedupe hash; an id collision is a real error
fn is_dedupe_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("tasks.dedupe_hash")
    )
}

// ============================================================================
// USERS
// ============================================================================

const USER_COLUMNS: &str = "uid, full_name, email, role, created_at, updated_at";

fn user_from_row(row: &Row) -> rusqlite::Result<User> {
    Ok(User {
        uid: row.get(0)?,
        full_name: row.get(1)?,
        email: row.get(2)?,
        role: row.get(3)?,
        created_at: parse_timestamp(row.get(4)?),
        updated_at: parse_timestamp(row.get(5)?),
    })
}

/// Insert or update a user keyed by uid
pub fn upsert_user(conn: &Connection, user: &User) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO users (uid, full_name, email, role, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5)
         ON CONFLICT(uid) DO UPDATE SET
            full_name = excluded.full_name,
            email = excluded.email,
            role = excluded.role,
            updated_at = excluded.updated_at",
        params![user.uid, user.full_name, user.email, user.role, now],
    )
    .with_context(|| format!("Failed to save user {}", user.email))?;

    Ok(())
}

pub fn get_user_by_uid(conn: &Connection, uid: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE uid = ?1", USER_COLUMNS),
            [uid],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

pub fn get_user_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE email = ?1 COLLATE NOCASE", USER_COLUMNS),
            [email.trim()],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// All users ordered by name
pub fn get_all_users(conn: &Connection) -> Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users ORDER BY full_name, uid",
        USER_COLUMNS
    ))?;

    let users = stmt
        .query_map([], user_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(users)
}

pub fn delete_user(conn: &Connection, uid: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM users WHERE uid = ?1", [uid])?;
    Ok(deleted > 0)
}

// ============================================================================
// TASKS
// ============================================================================

const TASK_COLUMNS: &str = "id, title, responsible, responsible_id, due_date, notes, status,
                            recurring, frequency, created_at, updated_at";

fn task_from_row(row: &Row) -> rusqlite::Result<Task> {
    let due_date: String = row.get(4)?;
    Ok(Task {
        id: row.get(0)?,
        title: row.get(1)?,
        responsible: row.get(2)?,
        responsible_id: row.get(3)?,
        due_date: NaiveDate::parse_from_str(&due_date, "%Y-%m-%d")
            .map_err(|e| conversion_error(4, e))?,
        notes: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
        status: row.get(6)?,
        recurring: row.get(7)?,
        frequency: row.get(8)?,
        created_at: parse_timestamp(row.get(9)?),
        updated_at: parse_timestamp(row.get(10)?),
    })
}

/// Insert a task; a repeated (title, due date, owner) yields `Duplicate`
pub fn create_task(conn: &Connection, task: &NewTask) -> Result<CreateTask> {
    let now = Utc::now().to_rfc3339();

    let result = conn.execute(
        "INSERT INTO tasks (
            id, title, responsible, responsible_id, due_date, notes,
            status, recurring, frequency, dedupe_hash, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            task.id,
            task.title,
            task.responsible,
            task.responsible_id,
            task.due_date.format("%Y-%m-%d").to_string(),
            task.notes,
            STATUS_PENDING,
            task.recurring,
            task.frequency,
            task.dedupe.then(|| task.dedupe_hash()),
            now,
        ],
    );

    match result {
        Ok(_) => Ok(CreateTask::Created(task.id.clone())),
        Err(e) if task.dedupe && is_dedupe_violation(&e) => Ok(CreateTask::Duplicate),
        Err(e) => Err(e).with_context(|| format!("Failed to insert task {}", task.title)),
    }
}

pub fn get_task_by_id(conn: &Connection, id: &str) -> Result<Option<Task>> {
    let task = conn
        .query_row(
            &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
            [id],
            task_from_row,
        )
        .optional()?;
    Ok(task)
}

pub fn get_all_tasks(conn: &Connection) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tasks ORDER BY due_date, title",
        TASK_COLUMNS
    ))?;

    let tasks = stmt
        .query_map([], task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tasks)
}

pub fn get_tasks_by_user(conn: &Connection, user_id: &str) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM tasks WHERE responsible_id = ?1 ORDER BY due_date, title",
        TASK_COLUMNS
    ))?;

    let tasks = stmt
        .query_map([user_id], task_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(tasks)
}

pub fn update_task_status(conn: &Connection, id: &str, status: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE tasks SET status = ?1, updated_at = ?2 WHERE id = ?3",
        params![status, Utc::now().to_rfc3339(), id],
    )?;
    Ok(updated > 0)
}

pub fn delete_task(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?;
    Ok(deleted > 0)
}

pub fn task_exists(conn: &Connection, title: &str, due_date: NaiveDate, owner_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM tasks WHERE title = ?1 AND due_date = ?2 AND responsible_id = ?3
         )",
        params![title, due_date.format("%Y-%m-%d").to_string(), owner_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub fn count_tasks(conn: &Connection) -> Result<i64> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM tasks", [], |row| row.get(0))?;
    Ok(count)
}

// ============================================================================
// FILES
// ============================================================================

const FILE_COLUMNS: &str = "id, filename, original_name, file_path, mime_type, size,
                            task_id, uploaded_by, upload_date, download_count";

fn file_from_row(row: &Row) -> rusqlite::Result<FileRecord> {
    let upload_date: String = row.get(8)?;
    Ok(FileRecord {
        id: row.get(0)?,
        filename: row.get(1)?,
        original_name: row.get(2)?,
        file_path: row.get(3)?,
        mime_type: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
        size: row.get(5)?,
        task_id: row.get(6)?,
        uploaded_by: row.get(7)?,
        upload_date: DateTime::parse_from_rfc3339(&upload_date)
            .map_err(|e| conversion_error(8, e))?
            .with_timezone(&Utc),
        download_count: row.get(9)?,
    })
}

/// Record an uploaded file; returns its id
pub fn insert_file(conn: &Connection, file: &NewFile) -> Result<i64> {
    conn.execute(
        "INSERT INTO files (
            filename, original_name, file_path, mime_type, size, task_id, uploaded_by, upload_date
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            file.filename,
            file.original_name,
            file.file_path,
            file.mime_type,
            file.size,
            file.task_id,
            file.uploaded_by,
            Utc::now().to_rfc3339(),
        ],
    )
    .with_context(|| format!("Failed to record file {}", file.original_name))?;

    let id = conn.last_insert_rowid();
    log_file_activity(conn, id, "upload", &file.uploaded_by)?;
    Ok(id)
}

pub fn get_files_by_task(conn: &Connection, task_id: &str) -> Result<Vec<FileRecord>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM files WHERE task_id = ?1 ORDER BY upload_date DESC, id DESC",
        FILE_COLUMNS
    ))?;

    let files = stmt
        .query_map([task_id], file_from_row)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(files)
}

pub fn get_file_by_id(conn: &Connection, id: i64) -> Result<Option<FileRecord>> {
    let file = conn
        .query_row(
            &format!("SELECT {} FROM files WHERE id = ?1", FILE_COLUMNS),
            [id],
            file_from_row,
        )
        .optional()?;
    Ok(file)
}

pub fn delete_file(conn: &Connection, id: i64, user_id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM files WHERE id = ?1", [id])?;
    if deleted > 0 {
        log_file_activity(conn, id, "delete", user_id)?;
    }
    Ok(deleted > 0)
}

pub fn increment_download_count(conn: &Connection, id: i64, user_id: &str) -> Result<bool> {
    let updated = conn.execute(
        "UPDATE files SET download_count = download_count + 1 WHERE id = ?1",
        [id],
    )?;
    if updated > 0 {
        log_file_activity(conn, id, "download", user_id)?;
    }
    Ok(updated > 0)
}

pub fn log_file_activity(conn: &Connection, file_id: i64, action: &str, user_id: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO file_logs (file_id, action, user_id, timestamp) VALUES (?1, ?2, ?3, ?4)",
        params![file_id, action, user_id, Utc::now().to_rfc3339()],
    )?;
    Ok(())
}

pub fn count_file_logs(conn: &Connection, file_id: i64) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM file_logs WHERE file_id = ?1",
        [file_id],
        |row| row.get(0),
    )?;
    Ok(count)
}

// ============================================================================
// ACTIVITY LOGS
// ============================================================================

/// Insert an entry into the audit trail
pub fn insert_activity_log(conn: &Connection, log: &ActivityLog) -> Result<i64> {
    let details_json = serde_json::to_string(&log.details)?;

    conn.execute(
        "INSERT INTO activity_logs (
            user_id, user_email, action, task_id, task_title, details, timestamp
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            log.user_id,
            log.user_email,
            log.action,
            log.task_id,
            log.task_title,
            details_json,
            log.timestamp.to_rfc3339(),
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Most recent entries first, optionally for one user
pub fn get_activity_logs(conn: &Connection, user_id: Option<&str>, limit: usize) -> Result<Vec<ActivityLog>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, user_email, action, task_id, task_title, details, timestamp
         FROM activity_logs
         WHERE ?1 IS NULL OR user_id = ?1
         ORDER BY timestamp DESC, id DESC
         LIMIT ?2",
    )?;

    let logs = stmt
        .query_map(params![user_id, limit as i64], |row| {
            let details_json: String = row.get(6)?;
            let timestamp: String = row.get(7)?;

            Ok(ActivityLog {
                id: row.get(0)?,
                user_id: row.get(1)?,
                user_email: row.get(2)?,
                action: row.get(3)?,
                task_id: row.get(4)?,
                task_title: row.get(5)?,
                details: serde_json::from_str(&details_json).map_err(|e| conversion_error(6, e))?,
                timestamp: DateTime::parse_from_rfc3339(&timestamp)
                    .map_err(|e| conversion_error(7, e))?
                    .with_timezone(&Utc),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(logs)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

/// Shared handle used by the materializer's worker threads
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    pub fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    /// Exclusive access to the underlying connection
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert a task and record a `task_created` entry in the audit trail
    pub fn create_task_logged(&self, task: &NewTask) -> Result<CreateTask> {
        let conn = self.conn();
        let outcome = create_task(&conn, task)?;

        if let CreateTask::Created(id) = &outcome {
            let entry = ActivityLog::new(
                &task.responsible_id,
                &task.responsible,
                "task_created",
                serde_json::json!({
                    "due_date": task.due_date.format("%Y-%m-%d").to_string(),
                    "recurring": task.recurring,
                    "frequency": task.frequency,
                }),
            )
            .for_task(id, &task.title);

            if let Err(e) = insert_activity_log(&conn, &entry) {
                log::warn!("event=activity_log_failed task_id={} error={:#}", id, e);
            }
        }

        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn create_test_task(title: &str, due: NaiveDate, owner: &User) -> NewTask {
        NewTask {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            responsible: owner.email.clone(),
            responsible_id: owner.uid.clone(),
            due_date: due,
            notes: "Vencimento original: 20/01/2025".to_string(),
            recurring: true,
            frequency: "monthly".to_string(),
            dedupe: true,
        }
    }

    fn setup() -> (Connection, User) {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        let owner = User::new("u-1", "Ana Contadora", "ana@escritorio.com.br");
        upsert_user(&conn, &owner).unwrap();
        (conn, owner)
    }

    #[test]
    fn test_setup_is_idempotent() {
        let (conn, _) = setup();
        setup_database(&conn).unwrap();
        assert_eq!(count_tasks(&conn).unwrap(), 0);
    }

    #[test]
    fn test_user_crud() {
        let (conn, owner) = setup();

        let admin = User::new("u-0", "Bruno Admin", "admin@escritorio.com.br").with_role(ROLE_ADMIN);
        upsert_user(&conn, &admin).unwrap();

        let found = get_user_by_email(&conn, "ANA@escritorio.com.br").unwrap().unwrap();
        assert_eq!(found.uid, owner.uid);
        assert!(found.created_at.is_some());
        assert!(get_user_by_uid(&conn, "u-0").unwrap().unwrap().is_admin());

        // Upsert updates in place
        upsert_user(&conn, &owner.clone().with_role(ROLE_ADMIN)).unwrap();
        let users = get_all_users(&conn).unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].full_name, "Ana Contadora");
        assert!(users[0].is_admin());

        assert!(delete_user(&conn, "u-0").unwrap());
        assert!(!delete_user(&conn, "u-0").unwrap());
        assert!(get_user_by_email(&conn, "nobody@example.com").unwrap().is_none());
    }

    #[test]
    fn test_email_is_unique_ignoring_case() {
        let (conn, _) = setup();

        let shouting = User::new("u-2", "Ana Outra", "ANA@Escritorio.com.br");
        assert!(upsert_user(&conn, &shouting).is_err());
        assert_eq!(get_all_users(&conn).unwrap().len(), 1);
    }

    #[test]
    fn test_duplicate_task_is_reported() {
        let (conn, owner) = setup();
        let task = create_test_task("DCTFWeb", date(2025, 1, 20), &owner);

        let first = create_task(&conn, &task).unwrap();
        assert_eq!(first, CreateTask::Created(task.id.clone()));
        assert!(task_exists(&conn, "DCTFWeb", date(2025, 1, 20), &owner.uid).unwrap());

        // Same title/date/owner under a new id
        let again = create_test_task("DCTFWeb", date(2025, 1, 20), &owner);
        assert_eq!(create_task(&conn, &again).unwrap(), CreateTask::Duplicate);
        assert_eq!(count_tasks(&conn).unwrap(), 1);

        let other_day = create_test_task("DCTFWeb", date(2025, 2, 20), &owner);
        assert!(matches!(create_task(&conn, &other_day).unwrap(), CreateTask::Created(_)));
        assert_eq!(count_tasks(&conn).unwrap(), 2);

        // Without a dedupe hash the repeat is stored
        let forced = NewTask { dedupe: false, ..create_test_task("DCTFWeb", date(2025, 1, 20), &owner) };
        assert!(matches!(create_task(&conn, &forced).unwrap(), CreateTask::Created(_)));
        assert_eq!(count_tasks(&conn).unwrap(), 3);
    }

    #[test]
    fn test_id_collision_is_an_error() {
        let (conn, owner) = setup();
        let task = NewTask { dedupe: false, ..create_test_task("DCTFWeb", date(2025, 1, 20), &owner) };
        create_task(&conn, &task).unwrap();

        let same_id = NewTask { title: "GPS".to_string(), ..task.clone() };
        assert!(create_task(&conn, &same_id).is_err());

        // Reusing an id is not mistaken for a repeat even when hashing
        let hashed = NewTask { dedupe: true, ..same_id };
        assert!(create_task(&conn, &hashed).is_err());
        assert_eq!(count_tasks(&conn).unwrap(), 1);
    }

    #[test]
    fn test_task_queries_and_status() {
        let (conn, owner) = setup();
        let task = create_test_task("GPS", date(2025, 3, 20), &owner);
        create_task(&conn, &task).unwrap();

        let stored = get_task_by_id(&conn, &task.id).unwrap().unwrap();
        assert_eq!(stored.status, STATUS_PENDING);
        assert_eq!(stored.due_date, date(2025, 3, 20));
        assert!(stored.recurring);

        assert!(update_task_status(&conn, &task.id, "done").unwrap());
        assert_eq!(get_task_by_id(&conn, &task.id).unwrap().unwrap().status, "done");

        assert_eq!(get_tasks_by_user(&conn, &owner.uid).unwrap().len(), 1);
        assert!(get_tasks_by_user(&conn, "someone-else").unwrap().is_empty());
        assert_eq!(get_all_tasks(&conn).unwrap().len(), 1);

        assert!(delete_task(&conn, &task.id).unwrap());
        assert!(get_task_by_id(&conn, &task.id).unwrap().is_none());
    }

    #[test]
    fn test_dedupe_hash() {
        let hash1 = dedupe_hash("DAS", date(2025, 1, 20), "u-1");
        let hash2 = dedupe_hash("DAS", date(2025, 1, 20), "u-1");
        let hash3 = dedupe_hash("DAS", date(2025, 1, 20), "u-2");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 64, "SHA-256 hash should be 64 hex characters");
    }

    #[test]
    fn test_file_metadata() {
        let (conn, owner) = setup();
        let task = create_test_task("ECD", date(2025, 4, 30), &owner);
        create_task(&conn, &task).unwrap();

        let id = insert_file(
            &conn,
            &NewFile {
                filename: "1700000000-recibo.pdf".to_string(),
                original_name: "recibo.pdf".to_string(),
                file_path: "uploads/1700000000-recibo.pdf".to_string(),
                mime_type: "application/pdf".to_string(),
                size: 2048,
                task_id: task.id.clone(),
                uploaded_by: owner.uid.clone(),
            },
        )
        .unwrap();

        assert!(increment_download_count(&conn, id, &owner.uid).unwrap());
        let file = get_file_by_id(&conn, id).unwrap().unwrap();
        assert_eq!(file.download_count, 1);
        assert_eq!(get_files_by_task(&conn, &task.id).unwrap().len(), 1);
        assert_eq!(count_file_logs(&conn, id).unwrap(), 2);

        assert!(delete_file(&conn, id, &owner.uid).unwrap());
        assert!(get_file_by_id(&conn, id).unwrap().is_none());
        assert_eq!(count_file_logs(&conn, id).unwrap(), 3);
    }

    #[test]
    fn test_activity_log() {
        let (conn, owner) = setup();

        let entry = ActivityLog::new(&owner.uid, &owner.email, "login", serde_json::json!({"ip": "127.0.0.1"}));
        insert_activity_log(&conn, &entry).unwrap();
        insert_activity_log(&conn, &ActivityLog::new("u-2", "b@x.com", "login", serde_json::json!({}))).unwrap();

        let mine = get_activity_logs(&conn, Some(&owner.uid), 10).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].action, "login");
        assert_eq!(mine[0].details["ip"], "127.0.0.1");

        assert_eq!(get_activity_logs(&conn, None, 10).unwrap().len(), 2);
        assert_eq!(get_activity_logs(&conn, None, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_store_logs_task_creation() {
        let store = SqliteStore::open_in_memory().unwrap();
        let owner = User::new("u-1", "Ana Contadora", "ana@escritorio.com.br");
        upsert_user(&store.conn(), &owner).unwrap();

        let task = create_test_task("DIRF", date(2025, 2, 28), &owner);
        assert!(matches!(store.create_task_logged(&task).unwrap(), CreateTask::Created(_)));

        let repeat = NewTask { id: uuid::Uuid::new_v4().to_string(), ..task.clone() };
        assert_eq!(store.create_task_logged(&repeat).unwrap(), CreateTask::Duplicate);

        let logs = get_activity_logs(&store.conn(), Some(&owner.uid), 10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, "task_created");
        assert_eq!(logs[0].task_title.as_deref(), Some("DIRF"));
    }
}
