use anyhow::{anyhow, Context, Result};
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{self, ConnectionExt as _};
use x11rb::protocol::xtest::{self, ConnectionExt as _};
use x11rb::rust_connection::RustConnection;

use super::COMMON_MODIFIER_KEYCODES;
use crate::keyboard::{keystroke_for_char, KeyStroke, KEY_BACKSPACE, KEY_LEFTSHIFT};
use crate::playback::InputInjector;

// X11 special focus value: the focused window follows the pointer.
const POINTER_ROOT: xproto::Window = 1;

/// On most Linux Xorg setups, X11 keycodes are evdev + 8.
pub(crate) fn evdev_to_x11_keycode(evdev_keycode: u32) -> Result<u8> {
    let x11 = evdev_keycode
        .checked_add(8)
        .ok_or_else(|| anyhow!("evdev keycode overflow"))?;
    u8::try_from(x11).map_err(|_| anyhow!("evdev keycode {evdev_keycode} out of range for X11"))
}

pub(crate) fn x11_to_evdev_keycode(x11_keycode: u8) -> u32 {
    u32::from(x11_keycode).saturating_sub(8)
}

fn query_xtest(conn: &impl Connection) -> Result<()> {
    let ext = conn
        .extension_information(xtest::X11_EXTENSION_NAME)
        .context("failed to query X11 extension info")?;

    if ext.is_none() {
        return Err(anyhow!(
            "X11 backend requires the XTEST extension (not present on this X server)"
        ));
    }

    Ok(())
}

fn keysyms_for_keycode(conn: &impl Connection, keycode: u8) -> Result<(u32, u32)> {
    let reply = conn
        .get_keyboard_mapping(keycode, 1)
        .context("failed to request keyboard mapping")?
        .reply()
        .context("failed to read keyboard mapping")?;

    if reply.keysyms_per_keycode == 0 {
        return Err(anyhow!("X server returned 0 keysyms per keycode"));
    }

    let at = |i: usize| reply.keysyms.get(i).copied().unwrap_or(x11rb::NO_SYMBOL);
    Ok((at(0), at(1)))
}

/// Check a handful of keys against the US layout that `keystroke_for_char` assumes.
///
/// For Latin-1, X11 keysyms equal the character code.
fn validate_us_keymap(conn: &impl Connection) -> Result<()> {
    for (lower, upper) in [('a', 'A'), ('q', 'Q'), ('1', '!'), ('-', '_'), ('\'', '"'), ('[', '{')] {
        let Some(KeyStroke { keycode, .. }) = keystroke_for_char(lower) else {
            continue;
        };
        let x11_keycode = evdev_to_x11_keycode(keycode)?;
        let (got0, got1) = keysyms_for_keycode(conn, x11_keycode)?;

        if got0 == x11rb::NO_SYMBOL || got1 == x11rb::NO_SYMBOL {
            return Err(anyhow!(
                "X11 backend could not validate the X server keymap (keycode {x11_keycode} returned NoSymbol). \
                 This backend assumes X11 keycodes are evdev+8 and requires a US keymap."
            ));
        }

        if got0 != lower as u32 || got1 != upper as u32 {
            return Err(anyhow!(
                "X11 backend requires a US keyboard layout, but the X server keymap does not match \
                 (keycode {x11_keycode}: got {got0:#x}/{got1:#x}). Try `setxkbmap us`."
            ));
        }
    }

    Ok(())
}

/// Keystroke injection through the XTEST extension.
///
/// Common modifiers are released on connect and again on drop.
pub struct X11Injector {
    conn: RustConnection,
    root: xproto::Window,
}

impl X11Injector {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None).context("failed to connect to X11")?;
        query_xtest(&conn)?;
        validate_us_keymap(&conn)?;

        let root = conn
            .setup()
            .roots
            .get(screen_num)
            .ok_or_else(|| anyhow!("invalid X11 screen index"))?
            .root;

        let focus = conn
            .get_input_focus()
            .context("failed to request input focus")?
            .reply()
            .context("failed to read input focus reply")?;
        if focus.focus == x11rb::NONE {
            return Err(anyhow!(
                "no X11 input focus detected; click into the target window before starting"
            ));
        }
        if focus.focus == POINTER_ROOT {
            return Err(anyhow!(
                "X11 input focus is set to PointerRoot; click into the target window to give it explicit focus"
            ));
        }

        let injector = Self { conn, root };
        injector.release_modifiers_best_effort();
        debug!(focus = focus.focus, "X11 injector ready");
        Ok(injector)
    }

    fn send(&self, evdev_keycode: u32, event_type: u8) -> Result<()> {
        let keycode = evdev_to_x11_keycode(evdev_keycode)?;
        // deviceid 0 is the core keyboard; XTEST accepts CURRENT_TIME.
        self.conn
            .xtest_fake_input(event_type, keycode, x11rb::CURRENT_TIME, self.root, 0, 0, 0)
            .context("failed to send XTEST fake input")?;
        Ok(())
    }

    fn tap(&self, stroke: KeyStroke) -> Result<()> {
        if stroke.shift {
            self.send(KEY_LEFTSHIFT, xproto::KEY_PRESS_EVENT)?;
        }
        let tapped = self
            .send(stroke.keycode, xproto::KEY_PRESS_EVENT)
            .and_then(|()| self.send(stroke.keycode, xproto::KEY_RELEASE_EVENT));
        if stroke.shift {
            self.send(KEY_LEFTSHIFT, xproto::KEY_RELEASE_EVENT)?;
        }
        tapped?;
        self.conn.flush().context("failed to flush X11 connection")?;
        Ok(())
    }

    fn release_modifiers_best_effort(&self) {
        for keycode in COMMON_MODIFIER_KEYCODES {
            if let Err(err) = self.send(keycode, xproto::KEY_RELEASE_EVENT) {
                warn!(keycode, %err, "failed to release modifier");
            }
        }
        let _ = self.conn.flush();
    }
}

impl InputInjector for X11Injector {
    fn type_char(&mut self, c: char) -> Result<()> {
        let stroke = keystroke_for_char(c)
            .ok_or_else(|| anyhow!("no US keyboard keystroke produces {c:?}"))?;
        self.tap(stroke)
    }

    fn backspace(&mut self) -> Result<()> {
        self.tap(KeyStroke {
            keycode: KEY_BACKSPACE,
            shift: false,
        })
    }
}

impl Drop for X11Injector {
    fn drop(&mut self) {
        self.release_modifiers_best_effort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keycode_offset_round_trips() {
        let x11 = evdev_to_x11_keycode(crate::keyboard::KEY_A).unwrap();
        assert_eq!(x11, 38);
        assert_eq!(x11_to_evdev_keycode(x11), crate::keyboard::KEY_A);
        assert!(evdev_to_x11_keycode(300).is_err());
    }
}
