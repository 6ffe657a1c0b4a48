//! Keystroke capture for training the delay model.
//!
//! A [`KeySource`] wraps an OS-level key hook. The [`Recorder`] runs it on a
//! dedicated thread, timestamps every press against a monotonic clock, and
//! hands the events back over a channel once the stop key is seen.

#[cfg(feature = "x11")]
pub mod x11;

use std::fs;
use std::io::ErrorKind;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use directories::ProjectDirs;
use tracing::{debug, info};

use crate::model::KeystrokeEvent;
use crate::playback::StopSignal;

pub const DEFAULT_STOP_KEY: &str = "esc";

/// A system-wide source of key presses.
///
/// `run` blocks, calling `on_key` with each pressed key's recorded name, and
/// returns once `on_key` breaks or the source is exhausted. Whatever hook the
/// source holds must be released before `run` returns, on error paths too.
pub trait KeySource: Send {
    fn run(self: Box<Self>, on_key: &mut dyn FnMut(String) -> ControlFlow<()>) -> Result<()>;
}

/// Captures keystrokes until the stop key is pressed.
#[derive(Debug, Clone)]
pub struct Recorder {
    stop_key: String,
    stop: StopSignal,
}

impl Recorder {
    /// `stop` ends the capture at the next key event even without the stop key.
    pub fn new(stop_key: impl Into<String>, stop: StopSignal) -> Self {
        Self {
            stop_key: stop_key.into(),
            stop,
        }
    }

    pub fn stop_key(&self) -> &str {
        &self.stop_key
    }

    /// Run `source` on a capture thread and block until it finishes.
    ///
    /// The stop key itself is not recorded.
    pub fn record(&self, source: Box<dyn KeySource>) -> Result<Vec<KeystrokeEvent>> {
        let (tx, rx) = mpsc::channel();
        let stop_key = self.stop_key.clone();
        let stop = self.stop.clone();

        let handle = thread::Builder::new()
            .name("keystroke-capture".to_string())
            .spawn(move || {
                let start = Instant::now();
                source.run(&mut |key| {
                    if key == stop_key || stop.is_raised() {
                        return ControlFlow::Break(());
                    }
                    let timestamp = start.elapsed().as_secs_f64();
                    debug!(%key, timestamp, "key pressed");
                    match tx.send(KeystrokeEvent { key, timestamp }) {
                        Ok(()) => ControlFlow::Continue(()),
                        Err(_) => ControlFlow::Break(()),
                    }
                })
            })
            .context("failed to spawn keystroke capture thread")?;

        let events: Vec<KeystrokeEvent> = rx.iter().collect();
        handle
            .join()
            .map_err(|_| anyhow!("keystroke capture thread panicked"))?
            .context("keystroke capture failed")?;

        info!(events = events.len(), "keystroke capture finished");
        Ok(events)
    }
}

/// The platform key source for this session.
pub fn open_key_source() -> Result<Box<dyn KeySource>> {
    #[cfg(feature = "x11")]
    {
        if std::env::var_os("DISPLAY").is_some_and(|v| !v.is_empty()) {
            return Ok(Box::new(x11::X11KeySource::connect()?));
        }
        Err(anyhow!(
            "keystroke capture needs an X11 display (DISPLAY is not set)"
        ))
    }

    #[cfg(not(feature = "x11"))]
    {
        Err(anyhow!(
            "keystroke capture is disabled in this build (rebuild with `--features x11`)."
        ))
    }
}

pub fn default_keystroke_path() -> PathBuf {
    ProjectDirs::from("", "", "typist")
        .map(|pd| pd.data_dir().join("keystroke_data.json"))
        .unwrap_or_else(|| PathBuf::from("keystroke_data.json"))
}

pub fn save_keystrokes(path: &Path, events: &[KeystrokeEvent]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string(events).context("failed to serialize keystrokes")?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    info!(path = %path.display(), events = events.len(), "keystroke data saved");
    Ok(())
}

/// `Ok(None)` when no keystroke file exists yet.
pub fn load_keystrokes(path: &Path) -> Result<Option<Vec<KeystrokeEvent>>> {
    let json = match fs::read_to_string(path) {
        Ok(json) => json,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("failed to read {}", path.display())),
    };
    let events = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(Some(events))
}
