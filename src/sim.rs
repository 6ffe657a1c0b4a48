use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{ErrorRecord, FeatureVector};
use crate::playback::{sleep_interruptible, InputInjector, StopSignal};
use crate::predictor::DelayPredictor;
use crate::profile::DelayProfile;
use crate::typo::{inject_and_correct, TypoKind};

/// Chance of a hesitation after any character, independent of the profile.
pub const THINKING_PAUSE_PROBABILITY: f64 = 0.05;

/// Bounds of a hesitation pause, in seconds.
pub const THINKING_PAUSE_SECS: (f64, f64) = (0.5, 2.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("simulation cancelled")]
pub struct Cancelled;

/// Seconds to `Duration`; negative or non-finite input becomes zero.
pub(crate) fn secs(s: f64) -> Duration {
    Duration::try_from_secs_f64(s).unwrap_or(Duration::ZERO)
}

/// Where the simulator suspends between keystrokes.
///
/// Every pause is a cancellation point.
pub trait Pacer {
    fn now(&self) -> Instant;

    fn pause(&mut self, duration: Duration) -> Result<(), Cancelled>;
}

/// Sleeps for real, waking early when the stop signal is raised.
#[derive(Debug, Clone)]
pub struct RealtimePacer {
    stop: StopSignal,
}

impl RealtimePacer {
    pub fn new(stop: StopSignal) -> Self {
        Self { stop }
    }
}

impl Pacer for RealtimePacer {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn pause(&mut self, duration: Duration) -> Result<(), Cancelled> {
        if sleep_interruptible(&self.stop, duration) {
            Ok(())
        } else {
            Err(Cancelled)
        }
    }
}

/// Virtual clock: pauses return immediately and advance `now`.
#[derive(Debug, Clone)]
pub struct ManualPacer {
    origin: Instant,
    elapsed: Duration,
    pauses: Vec<Duration>,
    cancel_after: Option<usize>,
}

impl ManualPacer {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Duration::ZERO,
            pauses: Vec::new(),
            cancel_after: None,
        }
    }

    /// Report cancellation from the `n`th pause on (zero-based).
    pub fn cancel_after(mut self, n: usize) -> Self {
        self.cancel_after = Some(n);
        self
    }

    pub fn pauses(&self) -> &[Duration] {
        &self.pauses
    }
}

impl Default for ManualPacer {
    fn default() -> Self {
        Self::new()
    }
}

impl Pacer for ManualPacer {
    fn now(&self) -> Instant {
        self.origin + self.elapsed
    }

    fn pause(&mut self, duration: Duration) -> Result<(), Cancelled> {
        if self.cancel_after.is_some_and(|n| self.pauses.len() >= n) {
            return Err(Cancelled);
        }
        self.pauses.push(duration);
        self.elapsed += duration;
        Ok(())
    }
}

/// Everything one `simulate` call produced.
///
/// Owned by the running simulation; callers only ever see the finished value.
#[derive(Debug, Clone)]
pub struct SimulationSession {
    pub(crate) typed_output: Vec<char>,
    pub(crate) typo_count: usize,
    pub(crate) error_history: Vec<ErrorRecord>,
    pub(crate) correction_delays: Vec<Duration>,
    letters_typed: usize,
    words_typed: usize,
    started_at: Instant,
    finished_at: Instant,
    cancelled: bool,
}

impl SimulationSession {
    fn start(at: Instant) -> Self {
        Self {
            typed_output: Vec::new(),
            typo_count: 0,
            error_history: Vec::new(),
            correction_delays: Vec::new(),
            letters_typed: 0,
            words_typed: 0,
            started_at: at,
            finished_at: at,
            cancelled: false,
        }
    }

    pub fn typed_output(&self) -> &[char] {
        &self.typed_output
    }

    pub fn typed_text(&self) -> String {
        self.typed_output.iter().collect()
    }

    pub fn typo_count(&self) -> usize {
        self.typo_count
    }

    pub fn error_history(&self) -> &[ErrorRecord] {
        &self.error_history
    }

    pub fn correction_delays(&self) -> &[Duration] {
        &self.correction_delays
    }

    /// Source characters that were successfully emitted (spaces excluded).
    pub fn letters_typed(&self) -> usize {
        self.letters_typed
    }

    /// Words with at least one successfully emitted character.
    pub fn words_typed(&self) -> usize {
        self.words_typed
    }

    pub fn elapsed(&self) -> Duration {
        self.finished_at.saturating_duration_since(self.started_at)
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }
}

/// Drives one typing run: pacing, emission, typos and hesitation.
pub struct Simulator<I, P, D> {
    injector: I,
    pacer: P,
    model: D,
    rng: StdRng,
}

impl<I, P, D> Simulator<I, P, D>
where
    I: InputInjector,
    P: Pacer,
    D: DelayPredictor,
{
    pub fn new(injector: I, pacer: P, model: D, rng: StdRng) -> Self {
        Self {
            injector,
            pacer,
            model,
            rng,
        }
    }

    pub fn injector(&self) -> &I {
        &self.injector
    }

    pub fn pacer(&self) -> &P {
        &self.pacer
    }

    /// Type `text` word by word with `profile`'s timing and typo rate.
    ///
    /// An invalid profile fails before anything is typed. Once typing has
    /// started, failures only skip the affected keystroke; a raised stop
    /// signal ends the run early with [`SimulationSession::was_cancelled`] set.
    pub fn simulate(&mut self, text: &str, profile: &DelayProfile) -> Result<SimulationSession> {
        profile
            .validate()
            .context("refusing to simulate with an invalid profile")?;

        info!(profile = %profile.name, chars = text.chars().count(), "started typing simulation");
        let mut session = SimulationSession::start(self.pacer.now());

        if self.type_words(text, profile, &mut session).is_err() {
            warn!("typing simulation cancelled");
            session.cancelled = true;
        }

        session.finished_at = self.pacer.now();
        info!(
            typos = session.typo_count,
            elapsed_secs = session.elapsed().as_secs_f64(),
            "finished typing simulation"
        );
        Ok(session)
    }

    fn type_words(
        &mut self,
        text: &str,
        profile: &DelayProfile,
        session: &mut SimulationSession,
    ) -> Result<(), Cancelled> {
        for (word_index, word) in text.split_whitespace().enumerate() {
            let chars: Vec<char> = word.chars().collect();
            let mut emitted_any = false;

            for (char_index, &c) in chars.iter().enumerate() {
                let features = FeatureVector::new(word_index, chars.len(), char_index);
                let delay = self.model.predict(features, profile, &mut self.rng);
                self.pacer.pause(secs(delay))?;

                if let Err(err) = self.injector.type_char(c) {
                    warn!(%err, ch = %c, word_index, char_index, "failed to type character, skipping");
                    continue;
                }
                session.typed_output.push(c);
                session.letters_typed += 1;
                if !emitted_any {
                    session.words_typed += 1;
                    emitted_any = true;
                }
                debug!(ch = %c, delay, "typed character");

                if self.rng.gen_bool(profile.typo_probability) {
                    let kind = TypoKind::choose(&mut self.rng);
                    inject_and_correct(
                        c,
                        kind,
                        &mut self.injector,
                        &mut self.pacer,
                        session,
                        &mut self.rng,
                    )?;
                }

                if self.rng.gen_bool(THINKING_PAUSE_PROBABILITY) {
                    let (lo, hi) = THINKING_PAUSE_SECS;
                    let pause = self.rng.gen_range(lo..=hi);
                    debug!(pause, "pausing to simulate thinking");
                    self.pacer.pause(secs(pause))?;
                }
            }

            match self.injector.type_char(' ') {
                Ok(()) => session.typed_output.push(' '),
                Err(err) => warn!(%err, word_index, "failed to type word delimiter"),
            }
        }

        Ok(())
    }
}
