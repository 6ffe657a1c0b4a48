//! Typo injection and self-correction.
//!
//! A typo is entered right after a character `c` has been emitted and sits at
//! the tail of the typed output. The machine walks
//! `Clean -> Injected -> Corrected`: it corrupts the tail in one of three ways,
//! waits a short correction delay, then deletes everything past `c`'s
//! position and types `c` again.

use rand::Rng;
use tracing::{debug, warn};

use crate::keyboard::typo_substitute;
use crate::model::ErrorRecord;
use crate::playback::InputInjector;
use crate::sim::{secs, Cancelled, Pacer, SimulationSession};

/// Bounds of the pause before a typo is corrected, in seconds.
pub const CORRECTION_DELAY_SECS: (f64, f64) = (0.2, 0.5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypoKind {
    /// Replace `c` with a neighbouring key.
    Substitute,
    /// Drop `c` entirely.
    Omit,
    /// Type `c` twice.
    Repeat,
}

impl TypoKind {
    pub const ALL: [TypoKind; 3] = [TypoKind::Substitute, TypoKind::Omit, TypoKind::Repeat];

    pub fn choose(rng: &mut impl Rng) -> Self {
        Self::ALL[rng.gen_range(0..Self::ALL.len())]
    }

    /// Text that occupies `c`'s position while the typo is live.
    pub fn injected_text(self, c: char) -> String {
        match self {
            TypoKind::Substitute => typo_substitute(c).to_string(),
            TypoKind::Omit => String::new(),
            TypoKind::Repeat => [c, c].iter().collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypoState {
    Clean,
    Injected(ErrorRecord),
    Corrected,
}

/// Inject a `kind` typo for the just-typed `c`, then correct it.
///
/// The correction always runs, even when the stop signal cuts the correction
/// delay short, so the output never keeps a live typo. Cancellation is
/// reported after the buffer has been restored.
pub(crate) fn inject_and_correct<I, P, R>(
    c: char,
    kind: TypoKind,
    injector: &mut I,
    pacer: &mut P,
    session: &mut SimulationSession,
    rng: &mut R,
) -> Result<(), Cancelled>
where
    I: InputInjector + ?Sized,
    P: Pacer + ?Sized,
    R: Rng,
{
    let mut cancelled = None;
    let mut state = TypoState::Clean;

    loop {
        state = match state {
            TypoState::Clean => TypoState::Injected(inject(c, kind, injector, session)),
            TypoState::Injected(record) => {
                let (lo, hi) = CORRECTION_DELAY_SECS;
                let delay = secs(rng.gen_range(lo..=hi));
                match pacer.pause(delay) {
                    Ok(()) => session.correction_delays.push(delay),
                    Err(err) => cancelled = Some(err),
                }
                correct(&record, injector, session);
                TypoState::Corrected
            }
            TypoState::Corrected => break,
        };
    }

    cancelled.map_or(Ok(()), Err)
}

fn inject<I: InputInjector + ?Sized>(
    c: char,
    kind: TypoKind,
    injector: &mut I,
    session: &mut SimulationSession,
) -> ErrorRecord {
    let position = session.typed_output.len().saturating_sub(1);

    match kind {
        TypoKind::Substitute => {
            let sub = typo_substitute(c);
            if backspace(injector, session) {
                type_char(injector, session, sub);
            }
        }
        TypoKind::Omit => {
            backspace(injector, session);
        }
        TypoKind::Repeat => {
            type_char(injector, session, c);
        }
    }

    let record = ErrorRecord {
        position,
        original: c,
        injected: kind.injected_text(c),
    };
    debug!(?kind, position, original = %c, injected = %record.injected, "injected typo");

    session.typo_count += 1;
    session.error_history.push(record.clone());
    record
}

fn correct<I: InputInjector + ?Sized>(
    record: &ErrorRecord,
    injector: &mut I,
    session: &mut SimulationSession,
) {
    while session.typed_output.len() > record.position {
        if !backspace(injector, session) {
            break;
        }
    }
    if session.typed_output.len() == record.position {
        type_char(injector, session, record.original);
    }
    debug!(position = record.position, original = %record.original, "corrected typo");
}

fn backspace<I: InputInjector + ?Sized>(injector: &mut I, session: &mut SimulationSession) -> bool {
    match injector.backspace() {
        Ok(()) => {
            session.typed_output.pop();
            true
        }
        Err(err) => {
            warn!(%err, "backspace failed");
            false
        }
    }
}

fn type_char<I: InputInjector + ?Sized>(
    injector: &mut I,
    session: &mut SimulationSession,
    c: char,
) -> bool {
    match injector.type_char(c) {
        Ok(()) => {
            session.typed_output.push(c);
            true
        }
        Err(err) => {
            warn!(%err, ch = %c, "failed to type character");
            false
        }
    }
}
