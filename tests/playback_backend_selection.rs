use std::ffi::OsString;
use std::sync::{Mutex, OnceLock};

use typist::playback::{open_injector, resolve_backend, InputInjector, PlaybackBackend};

const SESSION_VARS: [&str; 2] = ["DISPLAY", "WAYLAND_DISPLAY"];

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

/// Run `f` with the display variables set as given, restoring them afterwards.
fn with_session_env(display: Option<&str>, wayland_display: Option<&str>, f: impl FnOnce()) {
    let _guard = env_lock().lock().unwrap_or_else(|e| e.into_inner());
    let saved: Vec<(&str, Option<OsString>)> = SESSION_VARS
        .iter()
        .map(|name| (*name, std::env::var_os(name)))
        .collect();

    for (name, value) in SESSION_VARS.into_iter().zip([display, wayland_display]) {
        put(name, value.map(OsString::from));
    }

    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));

    for (name, value) in saved {
        put(name, value);
    }
    if let Err(panic) = outcome {
        std::panic::resume_unwind(panic);
    }
}

fn put(name: &str, value: Option<OsString>) {
    // SAFETY: every caller holds the `env_lock()` mutex, so no other test
    // thread reads or writes the environment concurrently.
    match value {
        Some(v) => unsafe { std::env::set_var(name, v) },
        None => unsafe { std::env::remove_var(name) },
    }
}

#[test]
fn auto_picks_x11_when_display_is_set() {
    with_session_env(Some(":0"), None, || {
        let result = resolve_backend(PlaybackBackend::Auto);

        #[cfg(feature = "x11")]
        assert_eq!(result.unwrap(), PlaybackBackend::X11);

        #[cfg(not(feature = "x11"))]
        {
            let msg = format!("{:#}", result.unwrap_err());
            assert!(msg.contains("disabled"), "got: {msg}");
            assert!(msg.contains("DISPLAY is set"), "got: {msg}");
        }
    });
}

#[test]
fn auto_without_display_points_at_dry_run() {
    with_session_env(None, Some("wayland-1"), || {
        let msg = format!("{:#}", resolve_backend(PlaybackBackend::Auto).unwrap_err());
        assert!(
            msg.contains("No supported playback backend detected"),
            "got: {msg}"
        );
        assert!(msg.contains("WAYLAND_DISPLAY is set"), "got: {msg}");
        assert!(msg.contains("--backend dry-run"), "got: {msg}");
    });
}

#[test]
fn explicit_x11_does_not_consult_the_environment() {
    with_session_env(None, None, || {
        let result = resolve_backend(PlaybackBackend::X11);

        #[cfg(feature = "x11")]
        assert_eq!(result.unwrap(), PlaybackBackend::X11);

        #[cfg(not(feature = "x11"))]
        assert!(format!("{:#}", result.unwrap_err()).contains("disabled"));
    });
}

#[test]
fn dry_run_opens_anywhere() {
    with_session_env(None, None, || {
        assert_eq!(
            resolve_backend(PlaybackBackend::DryRun).unwrap(),
            PlaybackBackend::DryRun
        );

        let mut injector = open_injector(PlaybackBackend::DryRun).unwrap();
        injector.type_char('x').unwrap();
        injector.backspace().unwrap();
    });
}
