// Agenda Tributária - Core Library
// Exposes all modules for use in the CLI and tests

pub mod error;
pub mod config;
pub mod logging;
pub mod catalog;        // Obligation Catalog (static tables by year)
pub mod holidays;       // Holiday Lookup
pub mod business_day;   // Business-Day Adjuster
pub mod source;         // Remote refresh: cache + JSON backup
pub mod db;             // Storage Layer (SQLite + WAL)
pub mod materializer;   // Task Materializer

// Re-export commonly used types
pub use error::AgendaError;
pub use config::AgendaConfig;
pub use logging::init_logging;
pub use catalog::{
    Catalog, ObligationTemplate, static_catalog, month_label,
    SIMPLES_NACIONAL, LUCRO_REAL, LUCRO_PRESUMIDO,
};
pub use holidays::{
    HolidaySet, HolidayProvider, FixedHolidays, BrasilApiHolidays, FallbackHolidays,
    holiday_key,
};
pub use business_day::{
    Adjustment, adjust, is_business_day, is_leap_year, last_day_of_month, nominal_due_date,
    MAX_ADJUST_ATTEMPTS,
};
pub use source::{
    ObligationSource, ReceitaFederalSource, CatalogRefresher, CachedCatalog,
    BackupFile, RefreshOutcome, RefreshOrigin,
    parse_month_page, load_backup, write_backup, backup_path,
};
pub use db::{
    User, Task, NewTask, CreateTask, FileRecord, NewFile, ActivityLog, SqliteStore,
    setup_database, upsert_user, get_user_by_uid, get_user_by_email, get_all_users, delete_user,
    create_task, get_task_by_id, get_all_tasks, get_tasks_by_user, update_task_status,
    delete_task, task_exists, count_tasks,
    insert_file, get_files_by_task, get_file_by_id, delete_file, increment_download_count,
    log_file_activity, insert_activity_log, get_activity_logs,
};
pub use materializer::{
    TaskStore, Materializer, MaterializeRequest, MaterializeOutcome, MaterializedTask,
    Frequency, YearSummary, next_month,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
