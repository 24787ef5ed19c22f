//! Run driver: one pass synchronizes every configured subject with bounded
//! concurrency; a cron schedule or fixed interval repeats passes until
//! shutdown.

use std::io::IsTerminal;
use std::time::{Duration, Instant};

use chrono::{DateTime, Local};
use cron::Schedule;
use futures_util::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::state::{SqliteLogStore, StateError, SyncRunStats};
use crate::sync::{SyncEngine, SyncReport};

/// Subset of application config consumed by a sync pass.
#[derive(Debug, Clone)]
pub struct PassConfig {
    pub subjects: Vec<String>,
    pub formats: Vec<String>,
    pub concurrency: usize,
    pub no_progress_bar: bool,
}

impl From<&Config> for PassConfig {
    fn from(config: &Config) -> Self {
        Self {
            subjects: config.subjects.clone(),
            formats: config.formats.clone(),
            concurrency: config.concurrency,
            no_progress_bar: config.no_progress_bar,
        }
    }
}

fn create_progress_bar(no_progress_bar: bool, total: u64) -> ProgressBar {
    if no_progress_bar || !std::io::stdout().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    match ProgressStyle::with_template(
        "[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
    ) {
        Ok(style) => pb.set_style(style.progress_chars("=> ")),
        Err(e) => tracing::debug!("Invalid progress bar template: {}", e),
    }
    pb
}

fn format_duration(d: Duration) -> String {
    let total_secs = d.as_secs();
    let hours = total_secs / 3600;
    let mins = (total_secs % 3600) / 60;
    let secs = total_secs % 60;

    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, mins, secs)
    } else if mins > 0 {
        format!("{}m {:02}s", mins, secs)
    } else {
        format!("{}s", secs)
    }
}

fn record(stats: &mut SyncRunStats, report: &SyncReport) {
    stats.subjects_synced += 1;
    stats.documents_discovered += report.discovered;
    stats.documents_copied += report.copied + report.recovered;
    stats.documents_failed += report.failed;
}

/// Synchronize every subject once and record the pass in `sync_runs`.
///
/// A subject's fatal error is logged and counted; it does not stop the
/// others. After cancellation no new subject is started, but subjects
/// already in flight run to completion.
pub async fn run_pass(
    engine: &SyncEngine,
    store: &SqliteLogStore,
    config: &PassConfig,
    shutdown_token: &CancellationToken,
) -> Result<SyncRunStats, StateError> {
    let run_id = store.start_sync_run().await?;
    let started = Instant::now();
    let pb = create_progress_bar(config.no_progress_bar, config.subjects.len() as u64);
    let mut stats = SyncRunStats::default();

    let results = stream::iter(&config.subjects)
        .take_while(|_| std::future::ready(!shutdown_token.is_cancelled()))
        .map(|subject| async move {
            let result = engine.synchronize(subject, &config.formats).await;
            (subject, result)
        })
        .buffer_unordered(config.concurrency.max(1));
    tokio::pin!(results);

    while let Some((subject, result)) = results.next().await {
        pb.set_message(subject.clone());
        match result {
            Ok(report) => record(&mut stats, &report),
            Err(e) => {
                stats.subjects_failed += 1;
                // indicatif needs `suspend` so log lines don't garble the bar.
                pb.suspend(|| tracing::error!("{}", e));
            }
        }
        pb.inc(1);
    }
    pb.finish_and_clear();

    stats.interrupted = shutdown_token.is_cancelled();
    if let Err(e) = store.complete_sync_run(run_id, &stats).await {
        tracing::warn!("Failed to record sync run: {}", e);
    }

    tracing::info!("── Summary ──");
    tracing::info!(
        "  {} EE numbers synchronized, {} failed, {} total",
        stats.subjects_synced,
        stats.subjects_failed,
        config.subjects.len()
    );
    tracing::info!(
        "  {} new documents, {} copied, {} failed",
        stats.documents_discovered,
        stats.documents_copied,
        stats.documents_failed
    );
    tracing::info!("  elapsed: {}", format_duration(started.elapsed()));
    if stats.interrupted {
        tracing::info!("  pass interrupted by shutdown");
    }

    Ok(stats)
}

/// How long to wait before the next pass, measured from `now`.
///
/// A cron schedule wins over a fixed interval. `None` when neither is set or
/// the schedule has no future occurrence.
fn delay_until_next_pass(
    schedule: Option<&Schedule>,
    interval: Option<u64>,
    now: DateTime<Local>,
) -> Option<Duration> {
    match schedule {
        Some(schedule) => {
            let next = schedule.after(&now).next()?;
            Some((next - now).to_std().unwrap_or(Duration::ZERO))
        }
        None => interval.map(Duration::from_secs),
    }
}

/// Sleep until the next scheduled pass; `false` if shutdown came first or no
/// pass is left to run.
async fn wait_for_next_pass(config: &Config, shutdown_token: &CancellationToken) -> bool {
    let Some(delay) =
        delay_until_next_pass(config.schedule.as_ref(), config.watch_with_interval, Local::now())
    else {
        tracing::info!("Cron schedule has no upcoming runs, exiting...");
        return false;
    };
    tracing::info!("Next pass in {}", format_duration(delay));
    tokio::select! {
        _ = tokio::time::sleep(delay) => true,
        _ = shutdown_token.cancelled() => {
            tracing::info!("Shutdown during wait, exiting...");
            false
        }
    }
}

/// Run passes per the `--now`, `--cron` and `--watch-with-interval` settings.
///
/// Without `--now`, a repeating run waits for its first scheduled pass. A
/// single pass fails if any subject failed fatally, so the exit status
/// reflects it. Per-document failures do not, since they are retried on the
/// next run.
pub async fn run(
    engine: &SyncEngine,
    store: &SqliteLogStore,
    config: &Config,
    shutdown_token: &CancellationToken,
) -> anyhow::Result<()> {
    let pass_config = PassConfig::from(config);

    if !config.now && !wait_for_next_pass(config, shutdown_token).await {
        return Ok(());
    }

    loop {
        let stats = run_pass(engine, store, &pass_config, shutdown_token).await?;

        if !config.is_repeating() {
            if stats.subjects_failed > 0 {
                anyhow::bail!(
                    "{} of {} EE numbers failed to synchronize",
                    stats.subjects_failed,
                    pass_config.subjects.len()
                );
            }
            return Ok(());
        }

        if shutdown_token.is_cancelled() {
            tracing::info!("Shutdown requested, exiting...");
            return Ok(());
        }
        if !wait_for_next_pass(config, shutdown_token).await {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;

    use super::*;
    use crate::state::LogStore;
    use crate::sync::testutil::{at, descriptor, response, FakeSink, FakeSource};

    struct Harness {
        source: Arc<FakeSource>,
        sink: Arc<FakeSink>,
        store: Arc<SqliteLogStore>,
        engine: SyncEngine,
    }

    fn harness() -> Harness {
        let source = Arc::new(FakeSource::default());
        let sink = Arc::new(FakeSink::default());
        let store = Arc::new(SqliteLogStore::open_in_memory().unwrap());
        let engine = SyncEngine::new(source.clone(), sink.clone(), store.clone());
        Harness {
            source,
            sink,
            store,
            engine,
        }
    }

    fn pass_config(subjects: &[&str], concurrency: usize) -> PassConfig {
        PassConfig {
            subjects: subjects.iter().map(|s| s.to_string()).collect(),
            formats: vec!["A".to_string()],
            concurrency,
            no_progress_bar: true,
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h 02m 05s");
    }

    fn local(h: u32, min: u32, sec: u32) -> DateTime<Local> {
        use chrono::TimeZone;
        Local.with_ymd_and_hms(2024, 1, 15, h, min, sec).unwrap()
    }

    #[test]
    fn test_delay_until_daily_cron_time() {
        let schedule = Schedule::from_str("0 0 20 * * *").unwrap();
        assert_eq!(
            delay_until_next_pass(Some(&schedule), None, local(19, 0, 0)),
            Some(Duration::from_secs(3600))
        );
        assert_eq!(
            delay_until_next_pass(Some(&schedule), None, local(20, 0, 0)),
            Some(Duration::from_secs(24 * 3600))
        );
    }

    #[test]
    fn test_delay_prefers_schedule_over_interval() {
        let schedule = Schedule::from_str("0 30 * * * *").unwrap();
        assert_eq!(
            delay_until_next_pass(Some(&schedule), Some(5), local(10, 29, 0)),
            Some(Duration::from_secs(60))
        );
        assert_eq!(
            delay_until_next_pass(None, Some(5), local(10, 29, 0)),
            Some(Duration::from_secs(5))
        );
        assert_eq!(delay_until_next_pass(None, None, local(10, 29, 0)), None);
    }

    #[test]
    fn test_exhausted_schedule_has_no_delay() {
        let schedule = Schedule::from_str("0 0 0 1 1 * 2000").unwrap();
        assert_eq!(delay_until_next_pass(Some(&schedule), None, local(0, 0, 0)), None);
    }

    #[tokio::test]
    async fn test_pass_synchronizes_every_subject() {
        let h = harness();
        h.source.set_response(response(
            at(2016, 6, 8, 0, 0, 0),
            vec![descriptor("1", "A"), descriptor("2", "A")],
        ));
        h.source.add_document("1", "text/xml", b"<one/>");

        let stats = run_pass(
            &h.engine,
            &h.store,
            &pass_config(&["111", "222", "333"], 2),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(stats.subjects_synced, 3);
        assert_eq!(stats.subjects_failed, 0);
        assert_eq!(stats.documents_discovered, 6);
        assert_eq!(stats.documents_copied, 3);
        assert_eq!(stats.documents_failed, 3);
        assert!(!stats.interrupted);
        assert_eq!(h.sink.delivered().len(), 3);
        for subject in ["111", "222", "333"] {
            assert_eq!(h.store.find_by_subject(subject).await.unwrap().len(), 2);
        }

        let summary = h.store.summary().await.unwrap();
        assert_eq!(summary.total_entries, 6);
        assert_eq!(summary.failing, 3);
        assert!(summary.last_sync_completed.is_some());
    }

    #[tokio::test]
    async fn test_subject_failure_is_counted_not_propagated() {
        let h = harness();
        h.source.fail_queries();

        let stats = run_pass(
            &h.engine,
            &h.store,
            &pass_config(&["111", "222"], 1),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(stats.subjects_synced, 0);
        assert_eq!(stats.subjects_failed, 2);
    }

    #[tokio::test]
    async fn test_cancelled_pass_starts_no_subjects() {
        let h = harness();
        h.source.set_response(response(at(2016, 6, 8, 0, 0, 0), vec![]));
        let token = CancellationToken::new();
        token.cancel();

        let stats = run_pass(&h.engine, &h.store, &pass_config(&["111", "222"], 1), &token)
            .await
            .unwrap();

        assert!(stats.interrupted);
        assert_eq!(stats.subjects_synced, 0);
        assert!(h.source.queries().is_empty());
    }
}
