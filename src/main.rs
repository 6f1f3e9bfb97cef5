use anyhow::{anyhow, bail, Context, Result};
use chrono::{Datelike, Utc};
use std::env;
use std::str::FromStr;

use agenda_tributaria::db::ROLE_ADMIN;
use agenda_tributaria::{
    get_all_tasks, get_tasks_by_user, get_user_by_email, init_logging, next_month, upsert_user,
    AgendaConfig, BrasilApiHolidays, Catalog, CatalogRefresher, FallbackHolidays,
    MaterializeOutcome, MaterializeRequest, Materializer, ReceitaFederalSource, SqliteStore, User,
};

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let config = AgendaConfig::from_env()?;
    init_logging(&config.log_level)?;

    let command = args.get(1).map(String::as_str).unwrap_or("help");
    let rest = args.get(2..).unwrap_or(&[]);

    match command {
        "month" => run_month(&config, rest),
        "year" => run_year(&config, rest),
        "next-month" => run_next_month(&config, rest),
        "refresh" => run_refresh(&config, rest),
        "clear-cache" => run_clear_cache(&config, rest),
        "seed-admin" => run_seed_admin(&config, rest),
        "tasks" => run_list_tasks(&config, rest),
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("❌ Unknown command: {}", other);
            print_usage();
            std::process::exit(2);
        }
    }
}

fn print_usage() {
    println!("🗓️  Agenda Tributária v{}", agenda_tributaria::VERSION);
    println!("{}", RULE);
    println!("Usage: agenda <command> [args]\n");
    println!("  month <year> <month> [email] [regime]   Create tasks for one month");
    println!("  year <year> [email] [regime]            Create tasks for all 12 months");
    println!("  next-month [email] [regime]             Create tasks for next month");
    println!("  refresh [year]                          Refresh the obligation catalog");
    println!("  clear-cache [year]                      Drop cached catalog and backup");
    println!("  seed-admin <email> <name>               Register an administrator");
    println!("  tasks [email]                           List stored tasks");
    println!("\nEnvironment: AGENDA_DB_PATH, AGENDA_BACKUP_DIR, AGENDA_LOG, ...");
}

fn parse_arg<T: FromStr>(args: &[String], index: usize, name: &str) -> Result<T> {
    let raw = args
        .get(index)
        .ok_or_else(|| anyhow!("missing argument <{}>", name))?;
    raw.parse::<T>()
        .map_err(|_| anyhow!("invalid <{}>: {}", name, raw))
}

fn optional_arg(args: &[String], index: usize) -> Option<String> {
    args.get(index).filter(|s| !s.trim().is_empty()).cloned()
}

fn build_refresher(config: &AgendaConfig) -> Result<CatalogRefresher<ReceitaFederalSource>> {
    let source = ReceitaFederalSource::new(&config.catalog_url, config.catalog_timeout)?;
    Ok(CatalogRefresher::new(
        source,
        &config.backup_dir,
        config.cache_ttl,
        config.backup_max_age,
    ))
}

fn load_catalog(config: &AgendaConfig, year: i32) -> Result<Catalog> {
    let mut refresher = build_refresher(config)?;
    let outcome = refresher.refresh(year, Utc::now());

    println!(
        "📚 Catalog {}: {} obligations in {} months (origin: {})",
        year,
        outcome.catalog.obligation_count(),
        outcome.catalog.month_count(),
        outcome.origin
    );
    for warning in &outcome.warnings {
        println!("   ⚠️  {}", warning);
    }

    Ok(outcome.catalog)
}

fn build_request(year: i32, month: u32, email: Option<String>, regime: Option<String>) -> MaterializeRequest {
    let mut request = MaterializeRequest::new(year, month);
    request.responsible_email = email;
    request.regime = regime;
    request
}

fn with_materializer<T>(
    config: &AgendaConfig,
    f: impl FnOnce(&Materializer<&SqliteStore, FallbackHolidays<BrasilApiHolidays>>) -> Result<T>,
) -> Result<T> {
    let store = SqliteStore::open(&config.database_path)?;
    let holidays = FallbackHolidays::new(BrasilApiHolidays::new(
        &config.holiday_api_url,
        config.holiday_timeout,
    )?);
    let materializer = Materializer::new(&store, holidays)
        .with_month_delay(config.month_delay)
        .with_task_backup_dir(&config.backup_dir);

    f(&materializer)
}

fn print_outcome(outcome: &MaterializeOutcome) {
    let icon = if outcome.success { "✅" } else { "❌" };
    println!(
        "{} {:02}/{}: {} created, {} duplicates skipped, {} failed",
        icon,
        outcome.month,
        outcome.year,
        outcome.created,
        outcome.duplicates_skipped.len(),
        outcome.failed
    );
    if let Some(owner) = &outcome.responsible {
        println!("   👤 Responsible: {}", owner);
    }
    for task in &outcome.tasks {
        let moved = if task.adjusted_due_date != task.nominal_due_date {
            format!(" (was {})", task.nominal_due_date.format("%d/%m"))
        } else {
            String::new()
        };
        println!("   📌 {}{}  {}", task.adjusted_due_date.format("%d/%m/%Y"), moved, task.title);
    }
    for title in &outcome.flagged {
        println!("   ⚠️  Check due date manually: {}", title);
    }
    for error in &outcome.errors {
        println!("   ❌ {}", error);
    }
}

fn run_month(config: &AgendaConfig, args: &[String]) -> Result<()> {
    let year: i32 = parse_arg(args, 0, "year")?;
    let month: u32 = parse_arg(args, 1, "month")?;
    let request = build_request(year, month, optional_arg(args, 2), optional_arg(args, 3));

    println!("🗓️  Materializing {:02}/{}", month, year);
    println!("{}", RULE);

    let catalog = load_catalog(config, year)?;
    let outcome = with_materializer(config, |m| Ok(m.materialize(&request, &catalog)?))?;
    print_outcome(&outcome);

    if !outcome.success {
        std::process::exit(1);
    }
    Ok(())
}

fn run_year(config: &AgendaConfig, args: &[String]) -> Result<()> {
    let year: i32 = parse_arg(args, 0, "year")?;
    let base = build_request(year, 1, optional_arg(args, 1), optional_arg(args, 2));

    println!("🗓️  Materializing all of {}", year);
    println!("{}", RULE);

    let catalog = load_catalog(config, year)?;
    let (outcomes, summary) = with_materializer(config, |m| Ok(m.materialize_year(&base, &catalog)))?;

    for outcome in &outcomes {
        print_outcome(outcome);
    }

    println!("\n{}", RULE);
    println!("✓ Months OK: {}", summary.months_ok);
    println!("✓ Months failed: {}", summary.months_failed);
    println!("✓ Tasks created: {}", summary.tasks_created);
    println!("✓ Duplicates skipped: {}", summary.duplicates_skipped);

    if summary.months_failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_next_month(config: &AgendaConfig, args: &[String]) -> Result<()> {
    let (year, month) = next_month(Utc::now().date_naive());
    let forwarded: Vec<String> = [year.to_string(), month.to_string()]
        .into_iter()
        .chain(args.iter().cloned())
        .collect();
    run_month(config, &forwarded)
}

fn run_refresh(config: &AgendaConfig, args: &[String]) -> Result<()> {
    let year = optional_arg(args, 0)
        .map(|y| y.parse::<i32>().with_context(|| format!("invalid <year>: {}", y)))
        .transpose()?
        .unwrap_or_else(|| Utc::now().year());

    println!("🔄 Refreshing obligation catalog for {}", year);
    println!("{}", RULE);
    let catalog = load_catalog(config, year)?;

    for (month, templates) in &catalog.months {
        println!("   {:>2}: {} obligations", month, templates.len());
    }
    Ok(())
}

fn run_clear_cache(config: &AgendaConfig, args: &[String]) -> Result<()> {
    let year = optional_arg(args, 0)
        .map(|y| y.parse::<i32>().with_context(|| format!("invalid <year>: {}", y)))
        .transpose()?
        .unwrap_or_else(|| Utc::now().year());

    let mut refresher = build_refresher(config)?;
    refresher.clear_cache();

    if refresher.remove_backup(year)? {
        println!("🧹 Removed catalog backup for {}", year);
    } else {
        println!("🧹 No catalog backup for {}", year);
    }
    Ok(())
}

fn run_seed_admin(config: &AgendaConfig, args: &[String]) -> Result<()> {
    let email: String = parse_arg(args, 0, "email")?;
    if args.len() < 2 {
        bail!("missing argument <name>");
    }
    let name = args[1..].join(" ");

    let store = SqliteStore::open(&config.database_path)?;
    let conn = store.conn();

    let uid = match get_user_by_email(&conn, &email)? {
        Some(existing) => existing.uid,
        None => uuid::Uuid::new_v4().to_string(),
    };
    upsert_user(&conn, &User::new(uid, name, email.clone()).with_role(ROLE_ADMIN))?;

    println!("👤 Administrator registered: {}", email);
    Ok(())
}

fn run_list_tasks(config: &AgendaConfig, args: &[String]) -> Result<()> {
    let store = SqliteStore::open(&config.database_path)?;
    let conn = store.conn();

    let tasks = match optional_arg(args, 0) {
        Some(email) => {
            let user = get_user_by_email(&conn, &email)?
                .ok_or_else(|| anyhow!("user not found: {}", email))?;
            get_tasks_by_user(&conn, &user.uid)?
        }
        None => get_all_tasks(&conn)?,
    };

    println!("📋 {} tasks", tasks.len());
    println!("{}", RULE);
    for task in &tasks {
        println!(
            "📌 {}  [{}]  {}  ({})",
            task.due_date.format("%d/%m/%Y"),
            task.status,
            task.title,
            task.responsible
        );
    }
    Ok(())
}
