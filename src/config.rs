use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context};
use cron::Schedule;

use crate::cli::SyncArgs;
use crate::source::http::Credentials;

/// Per-request timeout for the HIE and ingest servers.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Validated configuration for the `sync` command.
pub struct Config {
    pub hie_url: String,
    pub credentials: Option<Credentials>,
    pub ingest_url: String,
    pub subjects: Vec<String>,
    pub formats: Vec<String>,
    pub db_path: PathBuf,
    pub copy_dir: Option<PathBuf>,
    pub watch_with_interval: Option<u64>,
    pub schedule: Option<Schedule>,
    pub concurrency: usize,
    pub now: bool,
    pub no_progress_bar: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("hie_url", &self.hie_url)
            .field(
                "user",
                &self.credentials.as_ref().map(|c| c.user.as_str()),
            )
            .field("password", &"<redacted>")
            .field("ingest_url", &self.ingest_url)
            .field("subjects", &self.subjects.len())
            .field("formats", &self.formats)
            .field("db_path", &self.db_path)
            .field("copy_dir", &self.copy_dir)
            .field("watch_with_interval", &self.watch_with_interval)
            .field("schedule", &self.schedule)
            .finish_non_exhaustive()
    }
}

pub(crate) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

/// `":8080"` is shorthand for `http://localhost:8080`.
fn normalize_url(url: &str) -> String {
    let url = url.trim();
    if url.starts_with(':') {
        format!("http://localhost{url}")
    } else {
        url.to_string()
    }
}

fn split_formats(formats: &str) -> Vec<String> {
    formats
        .split(',')
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

/// One EE number per line; blank lines and `#` comments are skipped.
fn parse_subjects_file(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// Drop repeats, keeping first-seen order. The same subject must never be
/// synchronized twice in one pass.
fn dedup_subjects(subjects: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    subjects
        .into_iter()
        .filter(|s| seen.insert(s.clone()))
        .collect()
}

/// An unset or blank expression means no schedule.
fn parse_schedule(expression: Option<&str>) -> anyhow::Result<Option<Schedule>> {
    let Some(expression) = expression.map(str::trim).filter(|e| !e.is_empty()) else {
        return Ok(None);
    };
    match Schedule::from_str(expression) {
        Ok(schedule) => Ok(Some(schedule)),
        Err(e) => bail!("Invalid cron expression {:?}: {}", expression, e),
    }
}

impl Config {
    /// Whether passes repeat until shutdown, rather than running once.
    pub fn is_repeating(&self) -> bool {
        self.watch_with_interval.is_some() || self.schedule.is_some()
    }

    pub fn from_args(args: SyncArgs) -> anyhow::Result<Self> {
        let schedule = parse_schedule(args.cron.as_deref())?;
        if !args.now && args.watch_with_interval.is_none() && schedule.is_none() {
            bail!("Nothing to do: pass --now to sync once, or --cron / --watch-with-interval to sync repeatedly");
        }
        if args.watch_with_interval == Some(0) {
            bail!("--watch-with-interval must be at least 1 second");
        }

        let subjects = match &args.ee_file {
            Some(file) => {
                let path = expand_tilde(file);
                let contents = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read EE file {}", path.display()))?;
                parse_subjects_file(&contents)
            }
            None => args
                .ee
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        };
        let subjects = dedup_subjects(subjects);
        if subjects.is_empty() {
            bail!("No EE numbers given: pass --ee or --ee-file");
        }

        let formats = split_formats(&args.formats);
        if formats.is_empty() {
            bail!("No supported formats given");
        }

        let credentials = args
            .user
            .filter(|u| !u.is_empty())
            .map(|user| Credentials {
                user,
                password: args.password,
            });

        Ok(Self {
            hie_url: normalize_url(&args.hie_url),
            credentials,
            ingest_url: normalize_url(&args.ingest_url),
            subjects,
            formats,
            db_path: expand_tilde(&args.db),
            copy_dir: args.copy_dir.as_deref().map(expand_tilde),
            watch_with_interval: args.watch_with_interval,
            schedule,
            concurrency: usize::from(args.concurrency),
            now: args.now,
            no_progress_bar: args.no_progress_bar,
        })
    }
}
