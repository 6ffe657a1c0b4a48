use anyhow::{anyhow, Result};
use xkbcommon::xkb;

use crate::keyboard::{char_for_keystroke, is_shift, special_key_name, KeyStroke};

/// Offset between evdev keycodes and XKB keycodes.
const XKB_KEYCODE_OFFSET: u32 = 8;

/// Turns raw key transitions into recorded key names.
///
/// Printable keys decode to the character they produce under the current
/// modifier state of a US QWERTY keymap; other keys decode to a stable
/// lowercase symbolic name.
pub struct KeyDecoder {
    state: xkb::State,
    shift_down: bool,
}

impl KeyDecoder {
    pub fn us_qwerty() -> Result<Self> {
        let context = xkb::Context::new(xkb::CONTEXT_NO_FLAGS);

        let keymap = xkb::Keymap::new_from_names(
            &context,
            "evdev",
            "pc105",
            "us",
            "",
            None,
            xkb::KEYMAP_COMPILE_NO_FLAGS,
        )
        .ok_or_else(|| anyhow!("failed to build xkb keymap for us/pc105"))?;

        Ok(Self {
            state: xkb::State::new(&keymap),
            shift_down: false,
        })
    }

    /// Feed one transition. Returns the key name for presses, `None` for releases.
    pub fn key_event(&mut self, evdev_keycode: u32, pressed: bool) -> Option<String> {
        let code = xkb::Keycode::new(evdev_keycode + XKB_KEYCODE_OFFSET);
        let name = pressed.then(|| self.name_for(evdev_keycode, code));

        let direction = if pressed {
            xkb::KeyDirection::Down
        } else {
            xkb::KeyDirection::Up
        };
        self.state.update_key(code, direction);
        if is_shift(evdev_keycode) {
            self.shift_down = pressed;
        }

        name
    }

    fn name_for(&self, evdev_keycode: u32, code: xkb::Keycode) -> String {
        if let Some(name) = special_key_name(evdev_keycode) {
            return name.to_string();
        }

        let utf8 = self.state.key_get_utf8(code);
        let mut chars = utf8.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            if !c.is_control() {
                return c.to_string();
            }
        }

        let stroke = KeyStroke {
            keycode: evdev_keycode,
            shift: self.shift_down,
        };
        if let Some(c) = char_for_keystroke(stroke) {
            return c.to_string();
        }

        let sym_name = xkb::keysym_get_name(self.state.key_get_one_sym(code));
        if sym_name.is_empty() || sym_name == "NoSymbol" {
            format!("keycode_{evdev_keycode}")
        } else {
            sym_name.to_lowercase()
        }
    }
}
