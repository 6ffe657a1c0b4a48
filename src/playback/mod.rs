pub mod backends;
mod buffer;
mod util;

use anyhow::{anyhow, Result};
use tracing::info;

pub use buffer::BufferInjector;
pub use util::{sleep_interruptible, StopSignal};

/// Sends keystrokes to whatever currently holds input focus.
///
/// Each call is independent: a failure affects only that keystroke.
pub trait InputInjector {
    fn type_char(&mut self, c: char) -> Result<()>;

    fn backspace(&mut self) -> Result<()>;
}

impl<T: InputInjector + ?Sized> InputInjector for Box<T> {
    fn type_char(&mut self, c: char) -> Result<()> {
        (**self).type_char(c)
    }

    fn backspace(&mut self) -> Result<()> {
        (**self).backspace()
    }
}

impl<T: InputInjector + ?Sized> InputInjector for &mut T {
    fn type_char(&mut self, c: char) -> Result<()> {
        (**self).type_char(c)
    }

    fn backspace(&mut self) -> Result<()> {
        (**self).backspace()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackBackend {
    Auto,
    X11,
    /// Type into an in-memory buffer instead of the desktop.
    DryRun,
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn auto_backend() -> PlaybackBackend {
    // Under Wayland, DISPLAY usually points at Xwayland; XTEST then reaches X11 clients only.
    match env_value("DISPLAY") {
        Some(_) => PlaybackBackend::X11,
        None => PlaybackBackend::Auto,
    }
}

/// Describe the display session for error messages.
fn session_summary() -> String {
    let detected: Vec<String> = ["WAYLAND_DISPLAY", "DISPLAY"]
        .into_iter()
        .filter(|name| env_value(name).is_some())
        .map(|name| format!("{name} is set"))
        .chain(env_value("XDG_SESSION_TYPE").map(|t| format!("XDG_SESSION_TYPE={t}")))
        .collect();

    if detected.is_empty() {
        "No display session detected (expected DISPLAY for X11).".to_string()
    } else {
        format!("Detected environment: {}", detected.join(", "))
    }
}

fn require_supported_backend(selected: PlaybackBackend, resolved: PlaybackBackend) -> Result<()> {
    match resolved {
        PlaybackBackend::DryRun => Ok(()),
        PlaybackBackend::X11 => {
            if cfg!(feature = "x11") {
                Ok(())
            } else {
                let how = match selected {
                    PlaybackBackend::Auto => "detected",
                    _ => "requested",
                };
                Err(anyhow!(
                    "X11 backend {how} but is disabled in this build. (Rebuild with `--features x11`.) {details}",
                    details = session_summary()
                ))
            }
        }
        PlaybackBackend::Auto => Err(anyhow!(
            "No supported playback backend detected. {details}\n\
             Use `--backend dry-run` to type into an in-memory buffer instead.",
            details = session_summary(),
        )),
    }
}

pub fn resolve_backend(requested: PlaybackBackend) -> Result<PlaybackBackend> {
    let resolved = match requested {
        PlaybackBackend::Auto => auto_backend(),
        other => other,
    };

    require_supported_backend(requested, resolved)?;
    Ok(resolved)
}

/// Connect the injector for `backend`.
///
/// Setup failures (no display, missing extension, no focus) surface here,
/// before any character is typed.
pub fn open_injector(backend: PlaybackBackend) -> Result<Box<dyn InputInjector>> {
    let backend = resolve_backend(backend)?;
    info!(?backend, "opening input injector");

    match backend {
        PlaybackBackend::DryRun => Ok(Box::new(BufferInjector::new())),
        PlaybackBackend::X11 => {
            #[cfg(feature = "x11")]
            {
                Ok(Box::new(backends::x11::X11Injector::connect()?))
            }

            #[cfg(not(feature = "x11"))]
            {
                Err(anyhow!(
                    "X11 backend is disabled in this build (rebuild with `--features x11`)."
                ))
            }
        }
        PlaybackBackend::Auto => Err(anyhow!("no backend resolved")),
    }
}
