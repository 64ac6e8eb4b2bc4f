//! In-game calendar shared by the server scheduler and clients.
//!
//! A year is four seasons of 28 days. The scheduler advances the clock in
//! fixed minute increments; every unit boundary crossed during one advance is
//! reported back as a [`Rollover`] so callers can run their hooks.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const MINUTES_PER_HOUR: u8 = 60;
pub const HOURS_PER_DAY: u8 = 24;
pub const DAYS_PER_SEASON: u8 = 28;
pub const DEFAULT_INCREMENT_MINUTES: u8 = 10;
/// Floor for the real wait between ticks, however high the time scale
pub const MIN_TICK_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Spring,
    Summer,
    Fall,
    Winter,
}

impl Season {
    pub const CYCLE: [Season; 4] = [Season::Spring, Season::Summer, Season::Fall, Season::Winter];

    pub fn next(self) -> Self {
        match self {
            Season::Spring => Season::Summer,
            Season::Summer => Season::Fall,
            Season::Fall => Season::Winter,
            Season::Winter => Season::Spring,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Fall => "fall",
            Season::Winter => "winter",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Season::CYCLE
            .iter()
            .copied()
            .find(|season| season.as_str() == s)
            .ok_or_else(|| format!("unknown season '{}'", s))
    }
}

/// Unit boundaries crossed by a single [`GameClock::advance`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rollover {
    pub hour: bool,
    pub day: bool,
    pub season: bool,
    pub year: bool,
}

/// Process-wide world time
///
/// Only the scheduler tick mutates the persisted clock; everyone else works
/// with snapshots read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameClock {
    pub year: u32,
    pub season: Season,
    /// 1..=28
    pub day: u8,
    /// 0..24
    pub hour: u8,
    /// 0..60, always a multiple of the tick increment
    pub minute: u8,
    pub paused: bool,
    /// Real-time speed multiplier, 1.0 = normal speed
    pub time_scale: f64,
}

impl Default for GameClock {
    fn default() -> Self {
        Self {
            year: 1,
            season: Season::Spring,
            day: 1,
            hour: 6,
            minute: 0,
            paused: false,
            time_scale: 1.0,
        }
    }
}

impl GameClock {
    /// Moves the clock forward by `increment` minutes, applying the rollover
    /// rules in order: minute, hour, day, season.
    ///
    /// Pausing is the caller's concern; this always advances.
    pub fn advance(&mut self, increment: u8) -> Rollover {
        let mut rollover = Rollover::default();

        self.minute = self.minute.saturating_add(increment);
        if self.minute >= MINUTES_PER_HOUR {
            self.minute = 0;
            self.hour = self.hour.saturating_add(1);
            rollover.hour = true;
        }

        if self.hour >= HOURS_PER_DAY {
            self.hour = 0;
            self.day = self.day.saturating_add(1);
            rollover.day = true;
        }

        if self.day > DAYS_PER_SEASON {
            self.day = 1;
            self.season = self.season.next();
            rollover.season = true;

            // The year turns over exactly when winter gives way to spring
            if self.season == Season::Spring {
                self.year = self.year.saturating_add(1);
                rollover.year = true;
            }
        }

        rollover
    }

    pub fn is_on_the_hour(&self) -> bool {
        self.minute == 0
    }

    /// Real time to wait before the next tick at this clock's time scale
    ///
    /// A non-positive or non-finite scale, or one whose period does not fit a
    /// `Duration`, falls back to `base`. The result is never shorter than
    /// [`MIN_TICK_PERIOD`].
    pub fn tick_period(&self, base: Duration) -> Duration {
        if !(self.time_scale.is_finite() && self.time_scale > 0.0) {
            return base;
        }
        Duration::try_from_secs_f64(base.as_secs_f64() / self.time_scale)
            .unwrap_or(base)
            .max(MIN_TICK_PERIOD)
    }

    /// Minutes since year 1, spring, day 1, 00:00
    pub fn total_minutes(&self) -> u64 {
        let season_index = Season::CYCLE
            .iter()
            .position(|s| *s == self.season)
            .unwrap_or(0) as u64;
        let days = (self.year.saturating_sub(1) as u64 * 4 + season_index)
            * DAYS_PER_SEASON as u64
            + (self.day.saturating_sub(1)) as u64;

        (days * HOURS_PER_DAY as u64 + self.hour as u64) * MINUTES_PER_HOUR as u64
            + self.minute as u64
    }

    pub fn is_valid(&self) -> bool {
        self.hour < HOURS_PER_DAY
            && self.minute < MINUTES_PER_HOUR
            && (1..=DAYS_PER_SEASON).contains(&self.day)
            && self.year >= 1
    }
}
