//! The polling loop.
//!
//! One cycle: fetch the three stations, archive what came in, analyze,
//! decide, emit a status line and, if the decision says so, dispatch. The
//! notification state advances only when the dispatch succeeded.

use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{error, info, warn};

use crate::alert::staleness::{age_minutes, is_stale_at};
use crate::alert::{decide, DecisionPolicy, LocalSignal, UpstreamStep};
use crate::analysis::{analyze, is_receding, step_trend};
use crate::archive::{compare_with_years, HistoricalLevel, ReadingArchive};
use crate::config::Config;
use crate::dispatch::{DispatchContext, Dispatcher};
use crate::ingest::TelemetrySource;
use crate::logging::log_fetch_summary;
use crate::model::{Decision, NotificationState, Reading, Trigger, TrendResult};
use crate::risk::{flooded_count, street_risk};
use crate::state::StateStore;
use crate::stations;

/// Target of the once-per-cycle status line.
pub const STATUS_TARGET: &str = "floodwatch::status";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The local station returned nothing; no decision was made.
    NoLocalData,
    /// Decided not to notify (stable, or rate-gated).
    Held,
    Delivered,
    /// Decided (or was told) to notify but a required channel failed. State
    /// is unchanged, so the next cycle tries again.
    DispatchFailed,
}

impl CycleOutcome {
    fn label(&self) -> &'static str {
        match self {
            CycleOutcome::NoLocalData => "skipped",
            CycleOutcome::Held => "held",
            CycleOutcome::Delivered => "notified",
            CycleOutcome::DispatchFailed => "dispatch failed",
        }
    }
}

/// Summary of one cycle, for the status line and for tests.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub at: DateTime<Utc>,
    pub local: Option<Reading>,
    pub trend_label: String,
    pub velocity_cm_per_hour: Option<f64>,
    pub stale: bool,
    pub receding: bool,
    /// Street segments under water at the local level.
    pub flooded_streets: usize,
    pub decision: Option<Decision>,
    pub outcome: CycleOutcome,
    /// Stations that returned at least one reading.
    pub stations_with_data: usize,
}

impl CycleReport {
    fn no_local_data(at: DateTime<Utc>, stations_with_data: usize) -> Self {
        Self {
            at,
            local: None,
            trend_label: String::new(),
            velocity_cm_per_hour: None,
            stale: false,
            receding: false,
            flooded_streets: 0,
            decision: None,
            outcome: CycleOutcome::NoLocalData,
            stations_with_data,
        }
    }

    /// One human-readable line, e.g.
    /// `Timóteo (56696000) 812cm rising (+12cm) v=+30.0cm/h 5 streets flooded | critical: rapid local rise (+30.0cm/h) | notified`.
    pub fn status_line(&self) -> String {
        let Some(local) = &self.local else {
            return format!(
                "no local data ({}/3 stations answered) | {}",
                self.stations_with_data,
                self.outcome.label()
            );
        };

        let velocity = match self.velocity_cm_per_hour {
            Some(v) => format!("v={:+.1}cm/h", v),
            None => "v=?".to_string(),
        };
        let mut flags = String::new();
        if self.flooded_streets > 0 {
            flags.push_str(&format!(" {} streets flooded", self.flooded_streets));
        }
        if self.stale {
            flags.push_str(" [stale]");
        }
        if self.receding {
            flags.push_str(" [receding]");
        }
        let decision = match &self.decision {
            Some(d) => format!("{}: {}", d.severity, d.reason),
            None => "no decision".to_string(),
        };

        format!(
            "{} {:.0}cm {} {}{} | {} | {}",
            stations::display_name(&local.station_id),
            local.level_cm,
            self.trend_label,
            velocity,
            flags,
            decision,
            self.outcome.label()
        )
    }
}

/// What one round of fetching and analysis produced.
struct Observation {
    signal: LocalSignal,
    short_step: Option<UpstreamStep>,
    long_trend: Option<TrendResult>,
    stale: bool,
    receding: bool,
    trend_label: String,
    stations_with_data: usize,
}

pub struct Monitor {
    config: Config,
    policy: DecisionPolicy,
    source: Box<dyn TelemetrySource>,
    store: Box<dyn StateStore>,
    dispatcher: Box<dyn Dispatcher>,
    archive: Option<Box<dyn ReadingArchive>>,
}

impl Monitor {
    pub fn new(
        config: Config,
        source: Box<dyn TelemetrySource>,
        store: Box<dyn StateStore>,
        dispatcher: Box<dyn Dispatcher>,
    ) -> Self {
        let policy = DecisionPolicy::from_config(&config);
        Self {
            config,
            policy,
            source,
            store,
            dispatcher,
            archive: None,
        }
    }

    pub fn with_archive(mut self, archive: Box<dyn ReadingArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let report = match self.observe(now) {
            Ok(observation) => {
                let state = self.store.load();
                let decision = decide(
                    &observation.signal,
                    observation.short_step.as_ref(),
                    observation.long_trend.as_ref(),
                    &state,
                    now,
                    &self.policy,
                );
                let outcome = if decision.should_notify {
                    self.deliver(&decision, &observation, &state, false, now)
                } else {
                    CycleOutcome::Held
                };
                Self::report(now, observation, decision, outcome)
            }
            Err(report) => report,
        };
        info!(target: STATUS_TARGET, "{}", report.status_line());
        report
    }

    /// Post a bulletin now, whatever the rate gate says.
    ///
    /// Severity and reason come from the cascade on the current readings.
    /// With `force_cleanup` the poster is told to clear the oldest post
    /// first even below the cap. State advances only on a successful
    /// dispatch, exactly as for a scheduled notification.
    pub fn post_now(&mut self, now: DateTime<Utc>, force_cleanup: bool) -> CycleReport {
        let report = match self.observe(now) {
            Ok(observation) => {
                let state = self.store.load();
                let assessed = decide(
                    &observation.signal,
                    observation.short_step.as_ref(),
                    observation.long_trend.as_ref(),
                    &state,
                    now,
                    &self.policy,
                );
                let decision = Decision {
                    should_notify: true,
                    trigger: Trigger::Manual,
                    reason: format!("manual post ({})", assessed.reason),
                    ..assessed
                };
                let outcome = self.deliver(&decision, &observation, &state, force_cleanup, now);
                Self::report(now, observation, decision, outcome)
            }
            Err(report) => report,
        };
        info!(target: STATUS_TARGET, "{}", report.status_line());
        report
    }

    /// Cycle, sleep, repeat. Nothing inside a cycle is fatal.
    pub fn run_forever(&mut self) -> ! {
        let interval = StdDuration::from_secs(self.config.polling.interval_minutes * 60);
        info!(
            interval_minutes = self.config.polling.interval_minutes,
            local = %stations::display_name(&self.config.stations.local),
            "monitor started"
        );
        loop {
            self.run_cycle(Utc::now());
            thread::sleep(interval);
        }
    }

    /// Fetch, archive and analyze. `Err` carries the report for a cycle
    /// without local data.
    fn observe(&mut self, now: DateTime<Utc>) -> Result<Observation, CycleReport> {
        let from = now - Duration::hours(self.config.polling.lookback_hours);
        let stations = &self.config.stations;

        let local = self.source.fetch(&stations.local, from, now);
        let short = self.source.fetch(&stations.upstream_short, from, now);
        let long = self.source.fetch(&stations.upstream_long, from, now);

        let stations_with_data = [&local, &short, &long].iter().filter(|r| !r.is_empty()).count();
        log_fetch_summary(3, stations_with_data);
        self.archive_readings(&[&local, &short, &long]);

        let Some(signal) = LocalSignal::from_readings(&local) else {
            return Err(CycleReport::no_local_data(now, stations_with_data));
        };

        let stale = is_stale_at(&signal.latest, self.config.polling.stale_after_minutes, now);
        if stale {
            warn!(
                station = %signal.latest.station_id,
                age_minutes = age_minutes(&signal.latest, now),
                "local reading is stale"
            );
        }

        Ok(Observation {
            short_step: UpstreamStep::from_readings(&short),
            long_trend: (!long.is_empty()).then(|| analyze(&long)),
            stale,
            receding: is_receding(&local, self.config.analysis.recession_floor_cm),
            trend_label: step_trend(&local),
            signal,
            stations_with_data,
        })
    }

    /// Dispatch and, on success, persist the advanced state.
    fn deliver(
        &mut self,
        decision: &Decision,
        observation: &Observation,
        state: &NotificationState,
        force_cleanup: bool,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        let stories_per_post = self.config.state.stories_per_post;
        let (next_state, cleanup_requested) = if force_cleanup {
            (state.record_delivery_with_cleanup(now, stories_per_post), true)
        } else {
            state.record_delivery(now, self.config.state.story_cap, stories_per_post)
        };

        let latest = &observation.signal.latest;
        let context = DispatchContext {
            trend_label: observation.trend_label.clone(),
            receding: observation.receding,
            stale: observation.stale,
            cleanup_requested,
            upstream_short_delta_cm: observation.short_step.as_ref().map(|s| s.delta_cm),
            upstream_long_velocity_cm_h: observation.long_trend.as_ref().and_then(|t| t.velocity_cm_per_hour),
            streets: street_risk(latest.level_cm),
            history: self.history(latest, now),
        };

        if !self.dispatcher.dispatch(decision, latest, &context) {
            return CycleOutcome::DispatchFailed;
        }
        if let Err(e) = self.store.save(&next_state) {
            // Delivered but not recorded: the next cycle may repeat it.
            error!(error = %e, "failed to persist notification state");
        }
        CycleOutcome::Delivered
    }

    fn report(
        now: DateTime<Utc>,
        observation: Observation,
        decision: Decision,
        outcome: CycleOutcome,
    ) -> CycleReport {
        let latest = observation.signal.latest;
        CycleReport {
            at: now,
            velocity_cm_per_hour: observation.signal.trend.velocity_cm_per_hour,
            flooded_streets: flooded_count(latest.level_cm),
            local: Some(latest),
            trend_label: observation.trend_label,
            stale: observation.stale,
            receding: observation.receding,
            decision: Some(decision),
            outcome,
            stations_with_data: observation.stations_with_data,
        }
    }

    fn archive_readings(&mut self, batches: &[&Vec<Reading>]) {
        let Some(archive) = self.archive.as_mut() else {
            return;
        };
        for batch in batches.iter().filter(|b| !b.is_empty()) {
            if let Err(e) = archive.record(batch) {
                warn!(station = %batch[0].station_id, error = %e, "archiving readings failed");
            }
        }
    }

    fn history(&mut self, latest: &Reading, now: DateTime<Utc>) -> Vec<HistoricalLevel> {
        match self.archive.as_mut() {
            Some(archive) => compare_with_years(
                &mut **archive,
                &latest.station_id,
                now,
                &self.config.archive.comparison_years,
            ),
            None => Vec::new(),
        }
    }
}
