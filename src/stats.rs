use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Local};

use crate::profile::DelayProfile;
use crate::sim::SimulationSession;

/// `(words / elapsed seconds) * 60`; zero when no time has elapsed.
pub fn words_per_minute(words: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    (words as f64 / secs) * 60.0
}

/// Typos per letter typed, as a percentage.
pub fn error_rate_percent(typos: usize, letters: usize) -> f64 {
    if letters == 0 {
        return 0.0;
    }
    typos as f64 / letters as f64 * 100.0
}

/// Rough run length: every character at the profile's mean delay.
pub fn estimated_duration(text: &str, profile: &DelayProfile) -> Duration {
    let secs = text.chars().count() as f64 * profile.mean_delay();
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

pub fn estimated_end_time(text: &str, profile: &DelayProfile) -> DateTime<Local> {
    let estimate = chrono::Duration::from_std(estimated_duration(text, profile))
        .unwrap_or_else(|_| chrono::Duration::zero());
    Local::now() + estimate
}

/// Post-run report.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionStats {
    pub elapsed: Duration,
    pub letters_typed: usize,
    pub words_typed: usize,
    pub wpm: f64,
    pub typo_count: usize,
    pub error_rate: f64,
    pub avg_correction_delay: Option<Duration>,
    pub cancelled: bool,
}

impl SessionStats {
    pub fn from_session(session: &SimulationSession) -> Self {
        let elapsed = session.elapsed();
        let delays = session.correction_delays();
        let avg_correction_delay = (!delays.is_empty()).then(|| {
            let total: Duration = delays.iter().sum();
            total / delays.len() as u32
        });

        Self {
            elapsed,
            letters_typed: session.letters_typed(),
            words_typed: session.words_typed(),
            wpm: words_per_minute(session.words_typed(), elapsed),
            typo_count: session.typo_count(),
            error_rate: error_rate_percent(session.typo_count(), session.letters_typed()),
            avg_correction_delay,
            cancelled: session.was_cancelled(),
        }
    }
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Typing Session Summary")?;
        writeln!(f, "----------------------")?;
        if self.cancelled {
            writeln!(f, "Run was cancelled before the end of the text.")?;
        }
        writeln!(f, "Time taken: {:.2} seconds", self.elapsed.as_secs_f64())?;
        writeln!(f, "Letters typed: {}", self.letters_typed)?;
        writeln!(f, "Words typed: {}", self.words_typed)?;
        writeln!(f, "Words per minute (WPM): {:.2}", self.wpm)?;
        writeln!(f, "Typos: {}", self.typo_count)?;
        writeln!(f, "Error rate: {:.2}%", self.error_rate)?;
        match self.avg_correction_delay {
            Some(d) => write!(f, "Average correction delay: {:.2}s", d.as_secs_f64()),
            None => write!(f, "Average correction delay: n/a"),
        }
    }
}
