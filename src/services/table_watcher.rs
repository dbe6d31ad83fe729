//! Periodic reconciliation between the windows the OS reports and the tables
//! the manager knows about.
//!
//! A tick is split in two: [`observe`] queries the platform and [`diff`] compares
//! the result with the known tables. The polling task only drives the clock and
//! calls back into the manager.

use crate::models::Table;
use crate::platform::{WindowHandle, WindowInfo, WindowProvider};
use crate::{Result, TableManagerError};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{self, JoinHandle};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Title patterns that decide whether a window is a table
#[derive(Debug, Clone, Default)]
pub struct TableCriteria {
    patterns: Vec<Regex>,
}

impl TableCriteria {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|err| {
                    TableManagerError::ConfigurationError(format!(
                        "Invalid title pattern '{}': {}",
                        pattern, err
                    ))
                })
            })
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// Without patterns every window is a table
    pub fn matches(&self, title: &str) -> bool {
        self.patterns.is_empty() || self.patterns.iter().any(|re| re.is_match(title))
    }
}

/// Windows seen during one enumeration
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub tables: Vec<WindowInfo>,
    /// Windows whose query failed; their state is unknown this tick
    pub skipped: Vec<WindowHandle>,
}

/// Enumerate the matching windows. Only a failure of the enumeration itself is an error.
pub fn observe(provider: &dyn WindowProvider, criteria: &TableCriteria) -> Result<Observation> {
    let mut observation = Observation::default();

    for handle in provider.list_windows()? {
        match provider.window_info(handle) {
            Ok(Some(info)) if criteria.matches(&info.title) => observation.tables.push(info),
            Ok(Some(_)) => {}
            Ok(None) => debug!(window = %handle, "Window closed during enumeration"),
            Err(err) => {
                debug!(window = %handle, error = %err, "Skipping window");
                observation.skipped.push(handle);
            }
        }
    }

    Ok(observation)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WindowDiff {
    pub opened: Vec<WindowInfo>,
    pub closed: Vec<WindowHandle>,
    pub updated: Vec<WindowInfo>,
}

impl WindowDiff {
    pub fn is_empty(&self) -> bool {
        self.opened.is_empty() && self.closed.is_empty() && self.updated.is_empty()
    }
}

/// Compare known tables with an observation. Placeholders never close and skipped
/// windows keep their current state.
pub fn diff(known: &[Arc<Table>], observation: &Observation) -> WindowDiff {
    let known_by_handle: HashMap<WindowHandle, &Arc<Table>> =
        known.iter().map(|table| (table.handle(), table)).collect();
    let seen: HashSet<WindowHandle> = observation
        .tables
        .iter()
        .map(|info| info.handle)
        .chain(observation.skipped.iter().copied())
        .collect();

    let mut result = WindowDiff::default();

    for info in &observation.tables {
        match known_by_handle.get(&info.handle) {
            None => result.opened.push(info.clone()),
            Some(table) if table.is_virtual() => {}
            Some(table) => {
                if table.title() != info.title || table.frame() != info.frame {
                    result.updated.push(info.clone());
                }
            }
        }
    }

    result.closed = known
        .iter()
        .filter(|table| !table.is_virtual() && !seen.contains(&table.handle()))
        .map(|table| table.handle())
        .collect();

    result
}

/// Running polling task
#[derive(Debug)]
pub struct WatcherHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    /// Signal shutdown and wait up to `grace` for the in-flight tick.
    /// Returns `false` when the task had to be aborted; a tick that is still
    /// running then finishes on the blocking pool without further ticks.
    pub async fn stop(mut self, grace: Duration) -> bool {
        let _ = self.shutdown.send(true);

        match time::timeout(grace, &mut self.task).await {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                warn!(error = %err, "Watcher task ended abnormally");
                false
            }
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "Watcher did not stop in time, aborting");
                self.task.abort();
                false
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Run `tick` every `period` on the blocking pool of the current runtime, so a slow
/// platform query never stalls a runtime worker. The first tick fires immediately;
/// ticks missed while one is still running are skipped.
pub fn spawn<F>(period: Duration, tick: F) -> WatcherHandle
where
    F: Fn() + Send + Sync + 'static,
{
    let (shutdown, mut shutdown_rx) = watch::channel(false);
    let tick = Arc::new(tick);

    let task = tokio::spawn(async move {
        let mut ticker = time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_ms = period.as_millis() as u64, "Table watcher started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let job = Arc::clone(&tick);
                    if let Err(err) = task::spawn_blocking(move || job()).await {
                        warn!(error = %err, "Watcher tick failed");
                    }
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Table watcher stopped");
    });

    WatcherHandle { shutdown, task }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ActivityUse;
    use crate::platform::{InMemoryWindowProvider, Rect};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn window(id: u64, title: &str) -> WindowInfo {
        WindowInfo::new(WindowHandle(id), title, Rect::new(0, 0, 800, 600))
    }

    fn known(info: &WindowInfo) -> Arc<Table> {
        Arc::new(Table::new(info, ActivityUse::Inactive))
    }

    #[test]
    fn criteria_match_any_pattern() {
        let criteria =
            TableCriteria::new(&["^Table \\d+".to_string(), "Hold'em".to_string()]).unwrap();
        assert!(criteria.matches("Table 12 - 2/4"));
        assert!(criteria.matches("Rush Hold'em"));
        assert!(!criteria.matches("Lobby"));

        assert!(TableCriteria::default().matches("anything"));
        assert!(TableCriteria::new(&["(".to_string()]).is_err());
    }

    #[test]
    fn observe_skips_failing_windows_and_filters_titles() {
        let provider = InMemoryWindowProvider::new_with(vec![
            window(1, "Table 1"),
            window(2, "Lobby"),
            window(3, "Table 3"),
        ]);
        provider.break_window(WindowHandle(3));
        let criteria = TableCriteria::new(&["^Table".to_string()]).unwrap();

        let observation = observe(&provider, &criteria).unwrap();

        assert_eq!(observation.tables, vec![window(1, "Table 1")]);
        assert_eq!(observation.skipped, vec![WindowHandle(3)]);
    }

    #[test]
    fn observe_fails_when_enumeration_fails() {
        let provider = InMemoryWindowProvider::default();
        provider.set_enumeration_failure(true);
        assert!(observe(&provider, &TableCriteria::default()).is_err());
    }

    #[test]
    fn diff_reports_opened_closed_and_updated() {
        let stays = window(1, "Table 1");
        let closes = window(2, "Table 2");
        let tables = vec![known(&stays), known(&closes)];

        let observation = Observation {
            tables: vec![window(1, "Table 1 - Final"), window(4, "Table 4")],
            skipped: Vec::new(),
        };
        let result = diff(&tables, &observation);

        assert_eq!(result.opened, vec![window(4, "Table 4")]);
        assert_eq!(result.closed, vec![WindowHandle(2)]);
        assert_eq!(result.updated, vec![window(1, "Table 1 - Final")]);
    }

    #[test]
    fn skipped_windows_and_placeholders_are_not_closed() {
        let tables = vec![
            known(&window(1, "Table 1")),
            Arc::new(Table::placeholder(WindowHandle(9), "Reserved", ActivityUse::Active)),
        ];
        let observation = Observation {
            tables: Vec::new(),
            skipped: vec![WindowHandle(1)],
        };

        assert!(diff(&tables, &observation).is_empty());
    }

    #[tokio::test]
    async fn polling_task_ticks_until_stopped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();

        let handle = spawn(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(handle.stop(Duration::from_millis(100)).await);
        let after_stop = ticks.load(Ordering::SeqCst);
        assert!(after_stop >= 2);

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn slow_tick_does_not_hold_shutdown_past_the_grace_period() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();

        let handle = spawn(Duration::from_millis(10), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(400));
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(started.load(Ordering::SeqCst) <= 1);

        let stopping = std::time::Instant::now();
        assert!(!handle.stop(Duration::from_millis(100)).await);
        assert!(stopping.elapsed() < Duration::from_millis(300));
    }
}
