use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};

/// Cooperative stop flag shared by playback and capture.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Raise this signal on Ctrl+C.
    ///
    /// `ctrlc` allows a single handler per process. Commands call this once,
    /// after their interactive prompts.
    pub fn raise_on_ctrlc(&self) -> Result<()> {
        let stop = self.clone();
        ctrlc::set_handler(move || stop.raise()).context("failed to install Ctrl+C handler")
    }
}

/// Sleep in short slices so a raised `stop` is noticed promptly.
///
/// Returns `false` if the sleep was cut short.
pub fn sleep_interruptible(stop: &StopSignal, duration: Duration) -> bool {
    const SLICE: Duration = Duration::from_millis(50);

    let mut remaining = duration;
    while !remaining.is_zero() {
        if stop.is_raised() {
            return false;
        }
        let step = remaining.min(SLICE);
        std::thread::sleep(step);
        remaining -= step;
    }
    !stop.is_raised()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raised_signal_cuts_sleep_short() {
        let stop = StopSignal::new();
        stop.raise();
        assert!(!sleep_interruptible(&stop, Duration::from_secs(10)));
    }

    #[test]
    fn clones_share_state() {
        let stop = StopSignal::new();
        let other = stop.clone();
        other.raise();
        assert!(stop.is_raised());
        assert!(sleep_interruptible(&StopSignal::new(), Duration::from_millis(1)));
    }

    #[test]
    fn ctrlc_handler_installs_once() {
        let stop = StopSignal::new();
        assert!(!stop.is_raised());
        stop.raise_on_ctrlc().unwrap();
        assert!(!stop.is_raised());

        let err = StopSignal::new().raise_on_ctrlc().unwrap_err();
        assert!(format!("{err:#}").contains("Ctrl+C handler"), "{err:#}");
    }
}
