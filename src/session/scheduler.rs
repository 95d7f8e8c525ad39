// =============================================================================
// Market-hours scheduler — canonical session state on the IST clock
// =============================================================================
//
// Fixed timings (IST):
//   08:50  feed auto-start (ingest opens ahead of pre-open)
//   09:00  pre-open begins
//   09:15  regular trading begins
//   15:30  regular trading ends (15:30:00 is still MARKET_OPEN)
//   15:35  feed auto-stop
//
// The scheduler is the only component allowed to drive session transitions.
// `session_state_at` and `next_transition` are pure over (now, holidays);
// the `Scheduler` struct adds only the memory needed to turn the desired feed
// state into open/close/noop commands.
// =============================================================================

use chrono::{DateTime, Duration as ChronoDuration, FixedOffset, NaiveTime, Timelike};
use serde::Serialize;

use crate::session::holidays::HolidayTable;
use crate::types::SessionState;

const FEED_START: (u32, u32) = (8, 50);
const PRE_OPEN: (u32, u32) = (9, 0);
const MARKET_OPEN: (u32, u32) = (9, 15);
const MARKET_CLOSE: (u32, u32) = (15, 30);
const FEED_STOP: (u32, u32) = (15, 35);

fn secs_of_day(h: u32, m: u32) -> u32 {
    h * 3600 + m * 60
}

/// Command issued to the ingest supervisor on each scheduler tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedCommand {
    Open,
    Close,
    Noop,
}

/// Session snapshot published to diagnostics and the decision engine.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SessionInfo {
    pub state: SessionState,
    /// Epoch millis of the most recent observed state change.
    pub last_transition_ts: i64,
    /// Epoch millis of the next scheduled state change.
    pub next_transition_ts: i64,
}

/// Pure session-state function of the IST wall clock and the holiday table.
pub fn session_state_at(now: DateTime<FixedOffset>, holidays: &HolidayTable) -> SessionState {
    let date = now.date_naive();
    if !holidays.is_trading_day(date) {
        return if holidays.is_holiday(date) {
            SessionState::Holiday
        } else {
            SessionState::Closed
        };
    }

    let t = now.num_seconds_from_midnight();
    if t < secs_of_day(PRE_OPEN.0, PRE_OPEN.1) {
        SessionState::Closed
    } else if t < secs_of_day(MARKET_OPEN.0, MARKET_OPEN.1) {
        SessionState::PreOpen
    } else if t <= secs_of_day(MARKET_CLOSE.0, MARKET_CLOSE.1) {
        // 15:30:00 inclusive; AFTER_HOURS starts at 15:30:01.
        SessionState::MarketOpen
    } else {
        SessionState::AfterHours
    }
}

/// Whether the upstream feed should be held open at `now`.
pub fn feed_should_be_live(now: DateTime<FixedOffset>, holidays: &HolidayTable) -> bool {
    if !holidays.is_trading_day(now.date_naive()) {
        return false;
    }
    let t = now.num_seconds_from_midnight();
    t >= secs_of_day(FEED_START.0, FEED_START.1) && t < secs_of_day(FEED_STOP.0, FEED_STOP.1)
}

/// The next instant at which the session state changes. Pure.
pub fn next_transition(now: DateTime<FixedOffset>, holidays: &HolidayTable) -> DateTime<FixedOffset> {
    let date = now.date_naive();
    if holidays.is_trading_day(date) {
        let t = now.num_seconds_from_midnight();
        let boundaries = [
            (secs_of_day(PRE_OPEN.0, PRE_OPEN.1), NaiveTime::from_hms_opt(9, 0, 0)),
            (secs_of_day(MARKET_OPEN.0, MARKET_OPEN.1), NaiveTime::from_hms_opt(9, 15, 0)),
            // MARKET_OPEN ends after 15:30:00, so the transition lands on :01.
            (secs_of_day(MARKET_CLOSE.0, MARKET_CLOSE.1) + 1, NaiveTime::from_hms_opt(15, 30, 1)),
        ];
        for (boundary, time) in boundaries {
            if t < boundary {
                if let Some(time) = time {
                    if let Some(dt) = date.and_time(time).and_local_timezone(*now.offset()).single()
                    {
                        return dt;
                    }
                }
            }
        }
    }

    // After hours, weekend, or holiday: next trading day at 09:00.
    let mut probe = date + ChronoDuration::days(1);
    for _ in 0..30 {
        if holidays.is_trading_day(probe) {
            if let Some(time) = NaiveTime::from_hms_opt(9, 0, 0) {
                if let Some(dt) = probe.and_time(time).and_local_timezone(*now.offset()).single() {
                    return dt;
                }
            }
        }
        probe += ChronoDuration::days(1);
    }
    // Degenerate holiday table; report a day out rather than panic.
    now + ChronoDuration::days(1)
}

// =============================================================================
// Scheduler
// =============================================================================

/// Drives the session state and the ingest feed on a 60-second tick.
pub struct Scheduler {
    holidays: HolidayTable,
    /// Development override: pin the session to MARKET_OPEN and keep the feed
    /// open.
    pinned_open: bool,
    last_feed_live: Option<bool>,
    last_state: Option<SessionState>,
    last_transition_ts: i64,
}

impl Scheduler {
    pub fn new(holidays: HolidayTable, pinned_open: bool) -> Self {
        Self {
            holidays,
            pinned_open,
            last_feed_live: None,
            last_state: None,
            last_transition_ts: 0,
        }
    }

    /// Evaluate one scheduler tick. Returns the session snapshot and the
    /// command (if any) for the ingest supervisor. No blocking I/O.
    pub fn tick(&mut self, now: DateTime<FixedOffset>) -> (SessionInfo, FeedCommand) {
        let (state, feed_live, next_ts) = if self.pinned_open {
            (SessionState::MarketOpen, true, now.timestamp_millis() + 60_000)
        } else {
            (
                session_state_at(now, &self.holidays),
                feed_should_be_live(now, &self.holidays),
                next_transition(now, &self.holidays).timestamp_millis(),
            )
        };

        if self.last_state != Some(state) {
            self.last_state = Some(state);
            self.last_transition_ts = now.timestamp_millis();
        }

        let command = match self.last_feed_live {
            Some(prev) if prev == feed_live => FeedCommand::Noop,
            _ => {
                self.last_feed_live = Some(feed_live);
                if feed_live {
                    FeedCommand::Open
                } else {
                    FeedCommand::Close
                }
            }
        };

        let info = SessionInfo {
            state,
            last_transition_ts: self.last_transition_ts,
            next_transition_ts: next_ts,
        };
        (info, command)
    }
}
