// 🗓️ Task Materializer - Catalog + holidays → stored tasks for a month
// Fail fast on bad input or missing owner; per-item failures are collected

use crate::business_day::{adjust, nominal_due_date, Adjustment, MAX_ADJUST_ATTEMPTS};
use crate::catalog::{Catalog, ObligationTemplate};
use crate::db::{self, CreateTask, NewTask, SqliteStore, User};
use crate::error::AgendaError;
use crate::holidays::{HolidayProvider, HolidaySet};
use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

pub const MIN_YEAR: i32 = 2000;

// ============================================================================
// STORE COLLABORATOR
// ============================================================================

/// User/task storage as seen by the materializer
pub trait TaskStore: Send + Sync {
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    fn list_users(&self) -> Result<Vec<User>>;
    fn create_task(&self, task: &NewTask) -> Result<CreateTask>;
    fn task_exists(&self, title: &str, due_date: NaiveDate, owner_id: &str) -> Result<bool>;
}

impl TaskStore for SqliteStore {
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        db::get_user_by_email(&self.conn(), email)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        db::get_all_users(&self.conn())
    }

    fn create_task(&self, task: &NewTask) -> Result<CreateTask> {
        self.create_task_logged(task)
    }

    fn task_exists(&self, title: &str, due_date: NaiveDate, owner_id: &str) -> Result<bool> {
        db::task_exists(&self.conn(), title, due_date, owner_id)
    }
}

impl<T: TaskStore + ?Sized> TaskStore for &T {
    fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        (**self).find_user_by_email(email)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        (**self).list_users()
    }

    fn create_task(&self, task: &NewTask) -> Result<CreateTask> {
        (**self).create_task(task)
    }

    fn task_exists(&self, title: &str, due_date: NaiveDate, owner_id: &str) -> Result<bool> {
        (**self).task_exists(title, due_date, owner_id)
    }
}

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Monthly => "monthly",
        }
    }
}

/// A template instantiated for a concrete month and owner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializedTask {
    pub id: String,
    pub title: String,
    /// Owner email
    pub responsible: String,
    pub responsible_id: String,
    pub original_due_day: u32,
    pub nominal_due_date: NaiveDate,
    pub adjusted_due_date: NaiveDate,
    pub notes: String,
    pub recurring: bool,
    pub frequency: Frequency,
    pub adjustment_exhausted: bool,
}

impl MaterializedTask {
    fn to_new_task(&self, dedupe: bool) -> NewTask {
        NewTask {
            id: self.id.clone(),
            title: self.title.clone(),
            responsible: self.responsible.clone(),
            responsible_id: self.responsible_id.clone(),
            due_date: self.adjusted_due_date,
            notes: self.notes.clone(),
            recurring: self.recurring,
            frequency: self.frequency.as_str().to_string(),
            dedupe,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterializeRequest {
    pub year: i32,
    pub month: u32,
    pub responsible_email: Option<String>,
    pub regime: Option<String>,
    /// Check for an existing (title, date, owner) before inserting
    pub skip_duplicates: bool,
}

impl MaterializeRequest {
    pub fn new(year: i32, month: u32) -> Self {
        MaterializeRequest {
            year,
            month,
            responsible_email: None,
            regime: None,
            skip_duplicates: true,
        }
    }

    pub fn with_responsible(mut self, email: impl Into<String>) -> Self {
        self.responsible_email = Some(email.into());
        self
    }

    pub fn with_regime(mut self, regime: impl Into<String>) -> Self {
        self.regime = Some(regime.into());
        self
    }

    pub fn allow_duplicates(mut self) -> Self {
        self.skip_duplicates = false;
        self
    }

    fn for_month(&self, month: u32) -> Self {
        MaterializeRequest { month, ..self.clone() }
    }
}

/// Structured summary of one month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaterializeOutcome {
    pub success: bool,
    pub year: i32,
    pub month: u32,
    /// Owner email, when one was resolved
    pub responsible: Option<String>,
    pub created: usize,
    pub failed: usize,
    pub errors: Vec<String>,
    /// Titles skipped because the task already existed
    pub duplicates_skipped: Vec<String>,
    /// Created tasks, in catalog order
    pub tasks: Vec<MaterializedTask>,
    /// Titles whose adjustment hit the attempt bound
    pub flagged: Vec<String>,
}

impl MaterializeOutcome {
    fn empty(year: i32, month: u32) -> Self {
        MaterializeOutcome {
            success: true,
            year,
            month,
            responsible: None,
            created: 0,
            failed: 0,
            errors: Vec::new(),
            duplicates_skipped: Vec::new(),
            tasks: Vec::new(),
            flagged: Vec::new(),
        }
    }

    /// Outcome for a month that could not run at all
    pub fn failure(year: i32, month: u32, message: impl Into<String>) -> Self {
        MaterializeOutcome {
            success: false,
            errors: vec![message.into()],
            ..MaterializeOutcome::empty(year, month)
        }
    }
}

/// Totals over a batch of months
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearSummary {
    pub months_ok: usize,
    pub months_failed: usize,
    pub tasks_created: usize,
    pub duplicates_skipped: usize,
}

impl YearSummary {
    pub fn from_outcomes(outcomes: &[MaterializeOutcome]) -> Self {
        outcomes.iter().fold(YearSummary::default(), |mut acc, o| {
            if o.success {
                acc.months_ok += 1;
            } else {
                acc.months_failed += 1;
            }
            acc.tasks_created += o.created;
            acc.duplicates_skipped += o.duplicates_skipped.len();
            acc
        })
    }
}

enum Persisted {
    Created(MaterializedTask),
    Duplicate(String),
    Failed(String),
}

// ============================================================================
// MATERIALIZER
// ============================================================================

pub struct Materializer<S, H> {
    store: S,
    holidays: H,
    current_year: i32,
    month_delay: Duration,
    task_backup_dir: Option<PathBuf>,
}

impl<S: TaskStore, H: HolidayProvider> Materializer<S, H> {
    pub fn new(store: S, holidays: H) -> Self {
        Materializer {
            store,
            holidays,
            current_year: Utc::now().year(),
            month_delay: Duration::from_millis(100),
            task_backup_dir: None,
        }
    }

    /// Pin the reference year used for validation
    pub fn with_current_year(mut self, year: i32) -> Self {
        self.current_year = year;
        self
    }

    pub fn with_month_delay(mut self, delay: Duration) -> Self {
        self.month_delay = delay;
        self
    }

    /// Write `tasks-<year>-<month>.json` after each month with created tasks
    pub fn with_task_backup_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.task_backup_dir = Some(dir.into());
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn validate(&self, request: &MaterializeRequest) -> Result<(), AgendaError> {
        let max = self.current_year + 1;
        if !(MIN_YEAR..=max).contains(&request.year) {
            return Err(AgendaError::InvalidYear { year: request.year, min: MIN_YEAR, max });
        }
        if !(1..=12).contains(&request.month) {
            return Err(AgendaError::InvalidMonth(request.month));
        }
        Ok(())
    }

    /// Email lookup first, then the first administrator
    fn resolve_owner(&self, email: Option<&str>) -> Result<Option<User>> {
        if let Some(email) = email.filter(|e| !e.trim().is_empty()) {
            if let Some(user) = self.store.find_user_by_email(email)? {
                return Ok(Some(user));
            }
            log::warn!("event=responsible_not_found email={} fallback=admin", email);
        }

        Ok(self.store.list_users()?.into_iter().find(User::is_admin))
    }

    fn holidays_for(&self, year: i32) -> HolidaySet {
        self.holidays.holidays(year).unwrap_or_else(|e| {
            log::warn!("event=holidays_unavailable year={} error={:#}", year, e);
            HolidaySet::new(year)
        })
    }

    /// Materialize one month of obligations into stored tasks
    ///
    /// # Errors
    /// Only the fail-fast cases: invalid year or month, a month without
    /// obligations in the catalog, or no responsible party. Storage problems
    /// are reported inside the outcome.
    pub fn materialize(
        &self,
        request: &MaterializeRequest,
        catalog: &Catalog,
    ) -> Result<MaterializeOutcome, AgendaError> {
        self.validate(request)?;
        let (year, month) = (request.year, request.month);

        if catalog.for_month(month).is_empty() {
            return Err(AgendaError::EmptyMonth(month));
        }
        if catalog.year != year {
            log::warn!("event=catalog_year_mismatch catalog={} requested={}", catalog.year, year);
        }

        let owner = match self.resolve_owner(request.responsible_email.as_deref()) {
            Ok(Some(owner)) => owner,
            Ok(None) => return Err(AgendaError::NoResponsibleParty),
            Err(e) => {
                log::error!("event=owner_lookup_failed year={} month={} error={:#}", year, month, e);
                return Ok(MaterializeOutcome::failure(
                    year,
                    month,
                    format!("responsible lookup failed: {:#}", e),
                ));
            }
        };

        let templates = catalog.filtered(month, request.regime.as_deref());
        let mut holidays = self.holidays_for(year);
        if month == 12 {
            // late December deadlines can roll into January
            holidays.merge(self.holidays_for(year + 1));
        }
        let generated_on = Utc::now().date_naive();

        log::info!(
            "event=materialize_start year={} month={} owner={} templates={} regime={}",
            year,
            month,
            owner.email,
            templates.len(),
            request.regime.as_deref().unwrap_or("all")
        );

        let mut outcome = MaterializeOutcome {
            responsible: Some(owner.email.clone()),
            ..MaterializeOutcome::empty(year, month)
        };

        let mut pending = Vec::with_capacity(templates.len());
        for template in &templates {
            match build_task(template, year, month, &owner, &holidays, generated_on) {
                Some(task) => {
                    if task.adjustment_exhausted {
                        outcome.flagged.push(task.title.clone());
                    }
                    pending.push(task);
                }
                None => {
                    outcome.failed += 1;
                    outcome.errors.push(format!(
                        "{}: invalid due day {} for {:02}/{}",
                        template.title, template.due_day, month, year
                    ));
                }
            }
        }

        // One independent attempt per task; results come back in catalog order
        let results: Vec<Persisted> = thread::scope(|scope| {
            let handles: Vec<_> = pending
                .into_iter()
                .map(|task| {
                    let title = task.title.clone();
                    let handle = scope.spawn(move || self.persist(task, request.skip_duplicates));
                    (title, handle)
                })
                .collect();

            handles
                .into_iter()
                .map(|(title, handle)| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Persisted::Failed(format!("{}: worker panicked", title)))
                })
                .collect()
        });

        for result in results {
            match result {
                Persisted::Created(task) => {
                    outcome.created += 1;
                    outcome.tasks.push(task);
                }
                Persisted::Duplicate(title) => outcome.duplicates_skipped.push(title),
                Persisted::Failed(message) => {
                    outcome.failed += 1;
                    outcome.errors.push(message);
                }
            }
        }
        outcome.success = outcome.failed == 0;

        if let Some(dir) = &self.task_backup_dir {
            if !outcome.tasks.is_empty() {
                match write_task_backup(dir, year, month, &outcome.tasks) {
                    Ok(path) => log::debug!("event=task_backup_written path={}", path.display()),
                    Err(e) => log::warn!("event=task_backup_failed error={:#}", e),
                }
            }
        }

        log::info!(
            "event=materialize_done year={} month={} created={} duplicates={} failed={}",
            year,
            month,
            outcome.created,
            outcome.duplicates_skipped.len(),
            outcome.failed
        );

        Ok(outcome)
    }

    fn persist(&self, task: MaterializedTask, skip_duplicates: bool) -> Persisted {
        if skip_duplicates {
            match self
                .store
                .task_exists(&task.title, task.adjusted_due_date, &task.responsible_id)
            {
                Ok(true) => return Persisted::Duplicate(task.title),
                Ok(false) => {}
                Err(e) => return Persisted::Failed(format!("{}: {:#}", task.title, e)),
            }
        }

        match self.store.create_task(&task.to_new_task(skip_duplicates)) {
            Ok(CreateTask::Created(_)) => Persisted::Created(task),
            Ok(CreateTask::Duplicate) => Persisted::Duplicate(task.title),
            Err(e) => {
                log::warn!("event=task_create_failed title={} error={:#}", task.title, e);
                Persisted::Failed(format!("{}: {:#}", task.title, e))
            }
        }
    }

    /// Months one after another with a fixed pause in between
    ///
    /// A month that fails fast becomes a failed outcome; the batch goes on.
    pub fn materialize_months(
        &self,
        base: &MaterializeRequest,
        months: &[u32],
        catalog: &Catalog,
    ) -> Vec<MaterializeOutcome> {
        let mut outcomes = Vec::with_capacity(months.len());

        for (i, &month) in months.iter().enumerate() {
            if i > 0 && !self.month_delay.is_zero() {
                thread::sleep(self.month_delay);
            }

            let request = base.for_month(month);
            let outcome = self
                .materialize(&request, catalog)
                .unwrap_or_else(|e| MaterializeOutcome::failure(request.year, month, e.to_string()));
            outcomes.push(outcome);
        }

        outcomes
    }

    pub fn materialize_year(
        &self,
        base: &MaterializeRequest,
        catalog: &Catalog,
    ) -> (Vec<MaterializeOutcome>, YearSummary) {
        let months: Vec<u32> = (1..=12).collect();
        let outcomes = self.materialize_months(base, &months, catalog);
        let summary = YearSummary::from_outcomes(&outcomes);
        (outcomes, summary)
    }
}

fn build_task(
    template: &ObligationTemplate,
    year: i32,
    month: u32,
    owner: &User,
    holidays: &HolidaySet,
    generated_on: NaiveDate,
) -> Option<MaterializedTask> {
    let nominal = nominal_due_date(year, month, template.due_day)?;
    let adjustment = adjust(nominal, holidays);

    Some(MaterializedTask {
        id: uuid::Uuid::new_v4().to_string(),
        title: template.title.clone(),
        responsible: owner.email.clone(),
        responsible_id: owner.uid.clone(),
        original_due_day: template.due_day,
        nominal_due_date: nominal,
        adjusted_due_date: adjustment.date,
        notes: build_notes(template, &adjustment, generated_on),
        recurring: true,
        frequency: Frequency::Monthly,
        adjustment_exhausted: adjustment.exhausted,
    })
}

fn br_date(date: NaiveDate) -> String {
    date.format("%d/%m/%Y").to_string()
}

/// Task description with both dates and provenance
pub fn build_notes(template: &ObligationTemplate, adjustment: &Adjustment, generated_on: NaiveDate) -> String {
    let mut lines = Vec::new();

    if !template.notes.trim().is_empty() {
        lines.push(template.notes.trim().to_string());
        lines.push(String::new());
    }

    lines.push(format!("Vencimento original: {}", br_date(adjustment.original)));
    if adjustment.moved() {
        lines.push(format!(
            "Vencimento ajustado: {} (próximo dia útil)",
            br_date(adjustment.date)
        ));
    }
    if !adjustment.skipped_holidays.is_empty() {
        lines.push(format!("Feriados considerados: {}", adjustment.skipped_holidays.join(", ")));
    }
    if let Some(code) = &template.code {
        lines.push(format!("Código: {}", code));
    }
    if let Some(period) = &template.period {
        lines.push(format!("Período: {}", period));
    }
    if !template.source.is_empty() {
        lines.push(format!("Fonte: {}", template.source));
    }
    lines.push(format!("Gerado em: {}", br_date(generated_on)));

    if adjustment.exhausted {
        lines.push(format!(
            "⚠️ Ajuste interrompido após {} dias sem encontrar dia útil; confira a data.",
            MAX_ADJUST_ATTEMPTS
        ));
    }

    lines.join("\n")
}

fn write_task_backup(dir: &Path, year: i32, month: u32, tasks: &[MaterializedTask]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create task backup directory {}", dir.display()))?;

    let path = dir.join(format!("tasks-{}-{:02}.json", year, month));
    let json = serde_json::to_string_pretty(tasks)?;
    fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(path)
}

/// (year, month) after the month containing `today`
pub fn next_month(today: NaiveDate) -> (i32, u32) {
    if today.month() == 12 {
        (today.year() + 1, 1)
    } else {
        (today.year(), today.month() + 1)
    }
}

// ============================================================================
// TESTS
// ============================================================================
