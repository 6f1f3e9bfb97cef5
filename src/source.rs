// 🌐 Obligation Source - Remote refresh of the catalog
// Remote page → in-memory cache (TTL) → JSON backup (max age) → static table

use crate::catalog::{month_label, static_catalog, Catalog, ObligationTemplate};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{
    HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, DNT, UPGRADE_INSECURE_REQUESTS, USER_AGENT,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

pub const REMOTE_SOURCE_LABEL: &str = "Receita Federal";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36";

/// Month names as they appear in agenda URLs and dates, accents folded
const MONTH_SLUGS: [&str; 12] = [
    "janeiro", "fevereiro", "marco", "abril", "maio", "junho",
    "julho", "agosto", "setembro", "outubro", "novembro", "dezembro",
];

const HEADER_WORDS: [&str; 3] = ["tabela", "item", "data"];

// ============================================================================
// SOURCE TRAIT
// ============================================================================

/// Remote provider of a full year's catalog
pub trait ObligationSource: Send + Sync {
    fn name(&self) -> &str;
    fn fetch(&self, year: i32) -> Result<Catalog>;
}

/// Agenda tributária pages on gov.br
pub struct ReceitaFederalSource {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl ReceitaFederalSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .default_headers(browser_headers())
            .build()
            .context("Failed to build catalog HTTP client")?;

        Ok(ReceitaFederalSource {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn get_text(&self, url: &str) -> Result<String> {
        self.client
            .get(url)
            .send()
            .with_context(|| format!("Request failed: {}", url))?
            .error_for_status()
            .with_context(|| format!("Unexpected status: {}", url))?
            .text()
            .with_context(|| format!("Failed to read body: {}", url))
    }
}

fn browser_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("pt-BR,pt;q=0.9,en;q=0.8"));
    headers.insert(DNT, HeaderValue::from_static("1"));
    headers.insert(UPGRADE_INSECURE_REQUESTS, HeaderValue::from_static("1"));
    headers
}

impl ObligationSource for ReceitaFederalSource {
    fn name(&self) -> &str {
        REMOTE_SOURCE_LABEL
    }

    fn fetch(&self, year: i32) -> Result<Catalog> {
        let index_url = format!("{}/{}", self.base_url, year);
        log::info!("event=catalog_fetch url={}", index_url);

        let index = self.get_text(&index_url)?;
        let mut links = find_month_links(&index, year, &index_url);

        if links.is_empty() {
            log::warn!("event=catalog_no_month_links url={}", index_url);
            links = (1..=12u32)
                .map(|m| (m, format!("{}/{}", index_url, MONTH_SLUGS[(m - 1) as usize])))
                .collect();
        }

        let mut catalog = Catalog::new(year);
        for (month, url) in links {
            match self.get_text(&url) {
                Ok(html) => {
                    let templates = parse_month_page(&html, year, month);
                    log::debug!(
                        "event=catalog_month_parsed month={} obligations={}",
                        month,
                        templates.len()
                    );
                    for template in templates {
                        catalog.push(month, template);
                    }
                }
                Err(e) => log::warn!("event=catalog_month_failed month={} error={:#}", month, e),
            }
        }

        Ok(catalog)
    }
}

// ============================================================================
// PAGE PARSING
// ============================================================================

static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid tag regex"));
static ROW_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<tr[^>]*>(.*?)</tr>").expect("valid row regex"));
static CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<td[^>]*>(.*?)</td>").expect("valid cell regex"));
static ITEM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<li[^>]*>(.*?)</li>").expect("valid list item regex"));
// "20/março/2025", "1º a 10/janeiro/2025"
static DEADLINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})º?(?:\s+a\s+(\d{1,2})º?)?\s*/\s*([^\s/<\d]+)\s*/\s*(\d{4})")
        .expect("valid deadline regex")
});
static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="([^"]*/agenda-tributaria/(\d{4})/([^"/#?]+))[^"]*""#).expect("valid link regex")
});

/// Lowercase and strip Portuguese accents
pub fn fold_accents(s: &str) -> String {
    s.chars()
        .flat_map(char::to_lowercase)
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

/// Month number from a Portuguese month name ("março", "Marco", "MARÇO")
pub fn month_from_name(name: &str) -> Option<u32> {
    let folded = fold_accents(name.trim());
    MONTH_SLUGS
        .iter()
        .position(|slug| *slug == folded)
        .map(|i| i as u32 + 1)
}

/// Visible text of an HTML fragment, whitespace collapsed
fn html_text(fragment: &str) -> String {
    let stripped = TAG_RE.replace_all(fragment, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
        .replace("&ordm;", "º")
        .replace("&#186;", "º");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Title normalized for duplicate detection
fn normalize_title(title: &str) -> String {
    fold_accents(title).split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Due day of the first deadline in `text` that falls in (year, month)
fn deadline_day(text: &str, year: i32, month: u32) -> Option<(u32, usize)> {
    DEADLINE_RE.captures_iter(text).find_map(|caps| {
        let first: u32 = caps.get(1)?.as_str().parse().ok()?;
        let day = match caps.get(2) {
            Some(end) => end.as_str().parse().ok()?,
            None => first,
        };
        let found_month = month_from_name(caps.get(3)?.as_str())?;
        let found_year: i32 = caps.get(4)?.as_str().parse().ok()?;

        let in_range = found_month == month && found_year == year && (1..=31).contains(&day);
        in_range.then(|| (day, caps.get(0).map_or(0, |m| m.start())))
    })
}

fn acceptable_title(title: &str) -> bool {
    if title.chars().count() < 6 {
        return false;
    }
    let folded = fold_accents(title);
    let first_word = folded.split_whitespace().next().unwrap_or("");
    !HEADER_WORDS.contains(&first_word)
}

fn remote_template(title: &str, day: u32, year: i32, month: u32) -> ObligationTemplate {
    ObligationTemplate::new(
        title,
        day,
        format!(
            "Obrigação extraída da agenda tributária da Receita Federal ({}).",
            month_label(year, month)
        ),
    )
    .with_source(REMOTE_SOURCE_LABEL)
}

/// Parse one month page of the agenda into templates
///
/// Reads table rows (code, title, period, deadline) and list items
/// ("Title - 20/março/2025"). Only deadlines in the requested month and year
/// are kept, and entries are deduplicated by normalized title and day.
pub fn parse_month_page(html: &str, year: i32, month: u32) -> Vec<ObligationTemplate> {
    let mut seen: HashSet<(String, u32)> = HashSet::new();
    let mut templates = Vec::new();

    for row in ROW_RE.captures_iter(html) {
        let cells: Vec<String> = CELL_RE
            .captures_iter(&row[1])
            .map(|c| html_text(&c[1]))
            .collect();
        if cells.len() < 4 {
            continue;
        }

        let (code, title, period, deadline) = (&cells[0], &cells[1], &cells[2], &cells[3]);
        let Some((day, _)) = deadline_day(deadline, year, month) else {
            continue;
        };
        if !acceptable_title(title) || !seen.insert((normalize_title(title), day)) {
            continue;
        }

        templates.push(
            remote_template(title, day, year, month)
                .with_code(code.as_str())
                .with_period(period.as_str()),
        );
    }

    for item in ITEM_RE.captures_iter(html) {
        let text = html_text(&item[1]);
        let Some((day, at)) = deadline_day(&text, year, month) else {
            continue;
        };

        let title = text[..at]
            .trim_end_matches(|c: char| c.is_whitespace() || matches!(c, '-' | ':' | '–'))
            .trim();
        if !acceptable_title(title) || !seen.insert((normalize_title(title), day)) {
            continue;
        }

        templates.push(remote_template(title, day, year, month));
    }

    templates
}

/// Month page links on the agenda index, resolved against `index_url`
fn find_month_links(html: &str, year: i32, index_url: &str) -> Vec<(u32, String)> {
    let base = reqwest::Url::parse(index_url).ok();
    let mut links: BTreeMap<u32, String> = BTreeMap::new();

    for caps in LINK_RE.captures_iter(html) {
        if caps[2].parse::<i32>().ok() != Some(year) {
            continue;
        }
        let Some(month) = month_from_name(&caps[3]) else {
            continue;
        };

        let href = &caps[1];
        let url = match &base {
            Some(base) => base.join(href).map(|u| u.to_string()).unwrap_or_else(|_| href.to_string()),
            None => href.to_string(),
        };
        links.entry(month).or_insert(url);
    }

    links.into_iter().collect()
}

// ============================================================================
// CACHE & BACKUP
// ============================================================================

/// A refreshed catalog with its expiry
#[derive(Debug, Clone)]
pub struct CachedCatalog {
    pub catalog: Catalog,
    pub expires_at: DateTime<Utc>,
}

impl CachedCatalog {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// On-disk JSON backup of a refreshed catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupFile {
    pub obligations: Catalog,
    pub generated_at: DateTime<Utc>,
    pub source: String,
}

pub fn backup_path(dir: &Path, year: i32) -> PathBuf {
    dir.join(format!("obligations-{}.json", year))
}

pub fn write_backup(dir: &Path, backup: &BackupFile) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create backup directory {}", dir.display()))?;

    let path = backup_path(dir, backup.obligations.year);
    let json = serde_json::to_string_pretty(backup)?;
    fs::write(&path, json).with_context(|| format!("Failed to write backup {}", path.display()))?;

    Ok(path)
}

/// Read a backup, returning it only when it is no older than `max_age`
pub fn load_backup(path: &Path, max_age: Duration, now: DateTime<Utc>) -> Result<Option<BackupFile>> {
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read backup {}", path.display()))?;
    let backup: BackupFile = serde_json::from_str(&raw)
        .with_context(|| format!("Malformed backup {}", path.display()))?;

    let max_age = chrono::Duration::from_std(max_age).context("Backup max age out of range")?;
    if now.signed_duration_since(backup.generated_at) > max_age {
        log::info!(
            "event=backup_expired path={} generated_at={}",
            path.display(),
            backup.generated_at
        );
        return Ok(None);
    }

    Ok(Some(backup))
}

// ============================================================================
// REFRESHER
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOrigin {
    Cache,
    Remote,
    Backup,
    Static,
}

impl fmt::Display for RefreshOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RefreshOrigin::Cache => "cache",
            RefreshOrigin::Remote => "remote",
            RefreshOrigin::Backup => "backup",
            RefreshOrigin::Static => "static",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone)]
pub struct RefreshOutcome {
    pub catalog: Catalog,
    pub origin: RefreshOrigin,
    /// Recovered problems (remote failure, unreadable backup, ...)
    pub warnings: Vec<String>,
}

/// Owns the remote source, the per-year cache and the backup directory
pub struct CatalogRefresher<S: ObligationSource> {
    source: S,
    backup_dir: PathBuf,
    cache_ttl: Duration,
    backup_max_age: Duration,
    cache: HashMap<i32, CachedCatalog>,
}

impl<S: ObligationSource> CatalogRefresher<S> {
    pub fn new(source: S, backup_dir: impl Into<PathBuf>, cache_ttl: Duration, backup_max_age: Duration) -> Self {
        CatalogRefresher {
            source,
            backup_dir: backup_dir.into(),
            cache_ttl,
            backup_max_age,
            cache: HashMap::new(),
        }
    }

    /// Best catalog available for `year`; never fails
    pub fn refresh(&mut self, year: i32, now: DateTime<Utc>) -> RefreshOutcome {
        if let Some(cached) = self.cache.get(&year).filter(|c| c.is_fresh(now)) {
            log::debug!("event=catalog_cache_hit year={}", year);
            return RefreshOutcome {
                catalog: cached.catalog.clone(),
                origin: RefreshOrigin::Cache,
                warnings: Vec::new(),
            };
        }

        let mut warnings = Vec::new();

        match self.source.fetch(year) {
            Ok(catalog) if !catalog.is_empty() => {
                log::info!(
                    "event=catalog_refreshed source={} year={} obligations={}",
                    self.source.name(),
                    year,
                    catalog.obligation_count()
                );
                self.store(year, &catalog, now, &mut warnings);
                return RefreshOutcome { catalog, origin: RefreshOrigin::Remote, warnings };
            }
            Ok(_) => warnings.push(format!("{} returned no obligations for {}", self.source.name(), year)),
            Err(e) => warnings.push(format!("{} unavailable: {:#}", self.source.name(), e)),
        }

        let path = backup_path(&self.backup_dir, year);
        match load_backup(&path, self.backup_max_age, now) {
            Ok(Some(backup)) if backup.obligations.year == year && !backup.obligations.is_empty() => {
                log::warn!(
                    "event=catalog_from_backup year={} generated_at={}",
                    year,
                    backup.generated_at
                );
                return RefreshOutcome {
                    catalog: backup.obligations,
                    origin: RefreshOrigin::Backup,
                    warnings,
                };
            }
            Ok(_) => {}
            Err(e) => warnings.push(format!("backup unusable: {:#}", e)),
        }

        log::warn!("event=catalog_static_fallback year={} warnings={}", year, warnings.len());
        RefreshOutcome {
            catalog: static_catalog(year),
            origin: RefreshOrigin::Static,
            warnings,
        }
    }

    fn store(&mut self, year: i32, catalog: &Catalog, now: DateTime<Utc>, warnings: &mut Vec<String>) {
        let ttl = chrono::Duration::from_std(self.cache_ttl).unwrap_or_else(|_| chrono::Duration::hours(24));
        self.cache.insert(
            year,
            CachedCatalog { catalog: catalog.clone(), expires_at: now + ttl },
        );

        let backup = BackupFile {
            obligations: catalog.clone(),
            generated_at: now,
            source: self.source.name().to_string(),
        };
        match write_backup(&self.backup_dir, &backup) {
            Ok(path) => log::debug!("event=backup_written path={}", path.display()),
            Err(e) => warnings.push(format!("backup not written: {:#}", e)),
        }
    }

    /// Catalog to materialize from without touching the network
    pub fn current(&self, year: i32, now: DateTime<Utc>) -> Catalog {
        self.cache
            .get(&year)
            .filter(|c| c.is_fresh(now))
            .map(|c| c.catalog.clone())
            .unwrap_or_else(|| static_catalog(year))
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
        log::info!("event=catalog_cache_cleared");
    }

    /// Delete the on-disk backup; Ok(false) when there was none
    pub fn remove_backup(&self, year: i32) -> Result<bool> {
        let path = backup_path(&self.backup_dir, year);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(&path).with_context(|| format!("Failed to remove backup {}", path.display()))?;
        Ok(true)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    /// Serves a fixed catalog, or fails while `down` is set
    struct FakeSource {
        catalog: Catalog,
        down: Arc<AtomicBool>,
        calls: Arc<AtomicUsize>,
    }

    impl ObligationSource for FakeSource {
        fn name(&self) -> &str {
            "fake"
        }

        fn fetch(&self, _year: i32) -> Result<Catalog> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                Err(anyhow!("timeout"))
            } else {
                Ok(self.catalog.clone())
            }
        }
    }

    fn remote_catalog() -> Catalog {
        let mut catalog = Catalog::new(2025);
        catalog.push(3, remote_template("DCTFWeb mensal", 20, 2025, 3));
        catalog
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).unwrap()
    }

    const MONTH_PAGE: &str = r#"
        <table>
          <tr><th>Código</th><th>Descrição</th><th>Período</th><th>Prazo</th></tr>
          <tr><td>0561</td><td>IRRF - Rendimentos do Trabalho</td><td>Fevereiro/2025</td><td>20/março/2025</td></tr>
          <tr><td>5629</td><td>PIS/COFINS   Faturamento</td><td>Fevereiro/2025</td><td>25/Marco/2025</td></tr>
          <tr><td>N/A</td><td>Tabela</td><td>-</td><td>10/março/2025</td></tr>
          <tr><td>1234</td><td>Obrigação de outro mês</td><td>-</td><td>10/abril/2025</td></tr>
          <tr><td>1</td><td>Curta</td></tr>
        </table>
        <ul>
          <li>Entrega da <b>EFD-Reinf</b> - 14/março/2025</li>
          <li>IRRF - Rendimentos do Trabalho - 20/março/2025</li>
          <li>Parcelamento especial: 1º a 31/março/2025</li>
          <li>Sem data alguma aqui</li>
        </ul>
    "#;

    #[test]
    fn test_parse_month_page() {
        let templates = parse_month_page(MONTH_PAGE, 2025, 3);
        let titles: Vec<&str> = templates.iter().map(|t| t.title.as_str()).collect();

        assert_eq!(
            titles,
            vec![
                "IRRF - Rendimentos do Trabalho",
                "PIS/COFINS Faturamento",
                "Entrega da EFD-Reinf",
                "Parcelamento especial",
            ]
        );

        let irrf = &templates[0];
        assert_eq!(irrf.due_day, 20);
        assert_eq!(irrf.code.as_deref(), Some("0561"));
        assert_eq!(irrf.period.as_deref(), Some("Fevereiro/2025"));
        assert_eq!(irrf.source, REMOTE_SOURCE_LABEL);
        assert!(irrf.regimes.is_empty());

        assert_eq!(templates[1].due_day, 25);
        assert_eq!(templates[2].due_day, 14);
        assert_eq!(templates[3].due_day, 31);
    }

    #[test]
    fn test_parse_other_month_yields_nothing() {
        assert!(parse_month_page(MONTH_PAGE, 2025, 5).is_empty());
        assert!(parse_month_page(MONTH_PAGE, 2024, 3).is_empty());
    }

    #[test]
    fn test_month_names() {
        assert_eq!(month_from_name("março"), Some(3));
        assert_eq!(month_from_name("MARÇO"), Some(3));
        assert_eq!(month_from_name("Dezembro"), Some(12));
        assert_eq!(month_from_name("march"), None);
        assert_eq!(fold_accents("Ação São"), "acao sao");
    }

    #[test]
    fn test_find_month_links() {
        let index = r#"
            <a href="/receitafederal/pt-br/assuntos/agenda-tributaria/2025/marco">Março</a>
            <a href="https://www.gov.br/receitafederal/pt-br/assuntos/agenda-tributaria/2025/janeiro">Jan</a>
            <a href="/receitafederal/pt-br/assuntos/agenda-tributaria/2024/marco">Antigo</a>
        "#;
        let links = find_month_links(index, 2025, "https://www.gov.br/receitafederal/pt-br/assuntos/agenda-tributaria/2025");

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].0, 1);
        assert_eq!(links[1].0, 3);
        assert_eq!(
            links[1].1,
            "https://www.gov.br/receitafederal/pt-br/assuntos/agenda-tributaria/2025/marco"
        );
    }

    #[test]
    fn test_backup_age_limit() {
        let dir = tempfile::tempdir().unwrap();
        let backup = BackupFile {
            obligations: remote_catalog(),
            generated_at: now(),
            source: "fake".to_string(),
        };
        let path = write_backup(dir.path(), &backup).unwrap();
        assert_eq!(path, backup_path(dir.path(), 2025));

        let six_days = now() + chrono::Duration::days(6);
        let eight_days = now() + chrono::Duration::days(8);

        assert!(load_backup(&path, 7 * DAY, six_days).unwrap().is_some());
        assert!(load_backup(&path, 7 * DAY, eight_days).unwrap().is_none());
        assert!(load_backup(&dir.path().join("missing.json"), 7 * DAY, now()).unwrap().is_none());

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"generatedAt\""));
        assert!(raw.contains("\"obligations\""));
    }

    #[test]
    fn test_failing_source_without_backup_uses_static() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource {
            catalog: remote_catalog(),
            down: Arc::new(AtomicBool::new(true)),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let mut refresher = CatalogRefresher::new(source, dir.path(), DAY, 7 * DAY);

        let outcome = refresher.refresh(2025, now());

        assert_eq!(outcome.origin, RefreshOrigin::Static);
        assert_eq!(outcome.catalog, static_catalog(2025));
        assert_eq!(outcome.warnings.len(), 1);
        for template in outcome.catalog.for_month(3) {
            assert!(!template.title.is_empty());
            assert!(template.due_day >= 1);
            assert!(!template.notes.is_empty());
        }
    }

    #[test]
    fn test_refresh_chain() {
        let dir = tempfile::tempdir().unwrap();
        let down = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));
        let source = FakeSource {
            catalog: remote_catalog(),
            down: Arc::clone(&down),
            calls: Arc::clone(&calls),
        };
        let mut refresher = CatalogRefresher::new(source, dir.path(), DAY, 7 * DAY);

        // Remote success fills the cache and writes the backup
        let first = refresher.refresh(2025, now());
        assert_eq!(first.origin, RefreshOrigin::Remote);
        assert!(backup_path(dir.path(), 2025).exists());

        let second = refresher.refresh(2025, now() + chrono::Duration::hours(1));
        assert_eq!(second.origin, RefreshOrigin::Cache);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(refresher.current(2025, now()), remote_catalog());

        // Expired cache + remote down → backup
        down.store(true, Ordering::SeqCst);
        let later = now() + chrono::Duration::hours(25);
        let third = refresher.refresh(2025, later);
        assert_eq!(third.origin, RefreshOrigin::Backup);
        assert_eq!(third.catalog, remote_catalog());
        assert_eq!(refresher.current(2025, later), static_catalog(2025));

        // No backup left → static
        assert!(refresher.remove_backup(2025).unwrap());
        assert!(!refresher.remove_backup(2025).unwrap());
        refresher.clear_cache();
        assert_eq!(refresher.refresh(2025, now()).origin, RefreshOrigin::Static);
    }

    #[test]
    fn test_empty_remote_result_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let source = FakeSource {
            catalog: Catalog::new(2025),
            down: Arc::new(AtomicBool::new(false)),
            calls: Arc::new(AtomicUsize::new(0)),
        };
        let mut refresher = CatalogRefresher::new(source, dir.path(), DAY, 7 * DAY);

        let outcome = refresher.refresh(2025, now());
        assert_eq!(outcome.origin, RefreshOrigin::Static);
        assert!(!backup_path(dir.path(), 2025).exists());
    }
}
