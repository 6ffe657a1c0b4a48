#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyStroke {
    pub keycode: u32,
    pub shift: bool,
}

// Linux evdev keycodes (see linux/input-event-codes.h)
pub const KEY_ESC: u32 = 1;

pub const KEY_1: u32 = 2;
pub const KEY_2: u32 = 3;
pub const KEY_3: u32 = 4;
pub const KEY_4: u32 = 5;
pub const KEY_5: u32 = 6;
pub const KEY_6: u32 = 7;
pub const KEY_7: u32 = 8;
pub const KEY_8: u32 = 9;
pub const KEY_9: u32 = 10;
pub const KEY_0: u32 = 11;

pub const KEY_MINUS: u32 = 12;
pub const KEY_EQUAL: u32 = 13;
pub const KEY_BACKSPACE: u32 = 14;
pub const KEY_TAB: u32 = 15;

pub const KEY_Q: u32 = 16;
pub const KEY_W: u32 = 17;
pub const KEY_E: u32 = 18;
pub const KEY_R: u32 = 19;
pub const KEY_T: u32 = 20;
pub const KEY_Y: u32 = 21;
pub const KEY_U: u32 = 22;
pub const KEY_I: u32 = 23;
pub const KEY_O: u32 = 24;
pub const KEY_P: u32 = 25;

pub const KEY_LEFTBRACE: u32 = 26;
pub const KEY_RIGHTBRACE: u32 = 27;
pub const KEY_ENTER: u32 = 28;

pub const KEY_LEFTCTRL: u32 = 29;

pub const KEY_A: u32 = 30;
pub const KEY_S: u32 = 31;
pub const KEY_D: u32 = 32;
pub const KEY_F: u32 = 33;
pub const KEY_G: u32 = 34;
pub const KEY_H: u32 = 35;
pub const KEY_J: u32 = 36;
pub const KEY_K: u32 = 37;
pub const KEY_L: u32 = 38;

pub const KEY_SEMICOLON: u32 = 39;
pub const KEY_APOSTROPHE: u32 = 40;
pub const KEY_GRAVE: u32 = 41;

pub const KEY_LEFTSHIFT: u32 = 42;

pub const KEY_BACKSLASH: u32 = 43;

pub const KEY_Z: u32 = 44;
pub const KEY_X: u32 = 45;
pub const KEY_C: u32 = 46;
pub const KEY_V: u32 = 47;
pub const KEY_B: u32 = 48;
pub const KEY_N: u32 = 49;
pub const KEY_M: u32 = 50;

pub const KEY_COMMA: u32 = 51;
pub const KEY_DOT: u32 = 52;
pub const KEY_SLASH: u32 = 53;

pub const KEY_RIGHTSHIFT: u32 = 54;

pub const KEY_LEFTALT: u32 = 56;
pub const KEY_SPACE: u32 = 57;
pub const KEY_CAPSLOCK: u32 = 58;

pub const KEY_RIGHTCTRL: u32 = 97;
pub const KEY_RIGHTALT: u32 = 100;

pub const KEY_HOME: u32 = 102;
pub const KEY_UP: u32 = 103;
pub const KEY_LEFT: u32 = 105;
pub const KEY_RIGHT: u32 = 106;
pub const KEY_END: u32 = 107;
pub const KEY_DOWN: u32 = 108;
pub const KEY_DELETE: u32 = 111;

pub const KEY_LEFTMETA: u32 = 125;
pub const KEY_RIGHTMETA: u32 = 126;

/// US QWERTY keys that produce a character: (keycode, unshifted, shifted).
const US_QWERTY: [(u32, char, char); 47] = [
    (KEY_GRAVE, '`', '~'),
    (KEY_1, '1', '!'),
    (KEY_2, '2', '@'),
    (KEY_3, '3', '#'),
    (KEY_4, '4', '$'),
    (KEY_5, '5', '%'),
    (KEY_6, '6', '^'),
    (KEY_7, '7', '&'),
    (KEY_8, '8', '*'),
    (KEY_9, '9', '('),
    (KEY_0, '0', ')'),
    (KEY_MINUS, '-', '_'),
    (KEY_EQUAL, '=', '+'),
    (KEY_Q, 'q', 'Q'),
    (KEY_W, 'w', 'W'),
    (KEY_E, 'e', 'E'),
    (KEY_R, 'r', 'R'),
    (KEY_T, 't', 'T'),
    (KEY_Y, 'y', 'Y'),
    (KEY_U, 'u', 'U'),
    (KEY_I, 'i', 'I'),
    (KEY_O, 'o', 'O'),
    (KEY_P, 'p', 'P'),
    (KEY_LEFTBRACE, '[', '{'),
    (KEY_RIGHTBRACE, ']', '}'),
    (KEY_BACKSLASH, '\\', '|'),
    (KEY_A, 'a', 'A'),
    (KEY_S, 's', 'S'),
    (KEY_D, 'd', 'D'),
    (KEY_F, 'f', 'F'),
    (KEY_G, 'g', 'G'),
    (KEY_H, 'h', 'H'),
    (KEY_J, 'j', 'J'),
    (KEY_K, 'k', 'K'),
    (KEY_L, 'l', 'L'),
    (KEY_SEMICOLON, ';', ':'),
    (KEY_APOSTROPHE, '\'', '"'),
    (KEY_Z, 'z', 'Z'),
    (KEY_X, 'x', 'X'),
    (KEY_C, 'c', 'C'),
    (KEY_V, 'v', 'V'),
    (KEY_B, 'b', 'B'),
    (KEY_N, 'n', 'N'),
    (KEY_M, 'm', 'M'),
    (KEY_COMMA, ',', '<'),
    (KEY_DOT, '.', '>'),
    (KEY_SLASH, '/', '?'),
];

/// Keystroke that produces `c` on a US QWERTY layout.
///
/// Space, tab and newline map to their keys. Smart quotes fall back to the
/// ASCII key. Anything else outside printable ASCII has no keystroke.
pub fn keystroke_for_char(c: char) -> Option<KeyStroke> {
    let plain = |keycode| {
        Some(KeyStroke {
            keycode,
            shift: false,
        })
    };
    match c {
        ' ' => return plain(KEY_SPACE),
        '\n' => return plain(KEY_ENTER),
        '\t' => return plain(KEY_TAB),
        '’' | '‘' => return plain(KEY_APOSTROPHE),
        '”' | '“' => {
            return Some(KeyStroke {
                keycode: KEY_APOSTROPHE,
                shift: true,
            })
        }
        _ => {}
    }

    US_QWERTY.iter().find_map(|&(keycode, lower, upper)| {
        if c == lower {
            Some(KeyStroke {
                keycode,
                shift: false,
            })
        } else if c == upper {
            Some(KeyStroke {
                keycode,
                shift: true,
            })
        } else {
            None
        }
    })
}

/// Character a US QWERTY keystroke produces, if any.
pub fn char_for_keystroke(stroke: KeyStroke) -> Option<char> {
    if stroke.keycode == KEY_SPACE {
        return Some(' ');
    }
    US_QWERTY
        .iter()
        .find(|(keycode, _, _)| *keycode == stroke.keycode)
        .map(|&(_, lower, upper)| if stroke.shift { upper } else { lower })
}

/// Stable symbolic name for keys that do not produce a printable character.
pub fn special_key_name(keycode: u32) -> Option<&'static str> {
    let name = match keycode {
        KEY_ESC => "esc",
        KEY_BACKSPACE => "backspace",
        KEY_TAB => "tab",
        KEY_ENTER => "enter",
        KEY_SPACE => "space",
        KEY_CAPSLOCK => "caps_lock",
        KEY_LEFTSHIFT => "shift",
        KEY_RIGHTSHIFT => "shift_r",
        KEY_LEFTCTRL => "ctrl_l",
        KEY_RIGHTCTRL => "ctrl_r",
        KEY_LEFTALT => "alt_l",
        KEY_RIGHTALT => "alt_r",
        KEY_LEFTMETA => "cmd",
        KEY_RIGHTMETA => "cmd_r",
        KEY_HOME => "home",
        KEY_END => "end",
        KEY_UP => "up",
        KEY_DOWN => "down",
        KEY_LEFT => "left",
        KEY_RIGHT => "right",
        KEY_DELETE => "delete",
        _ => return None,
    };
    Some(name)
}

pub fn is_shift(keycode: u32) -> bool {
    keycode == KEY_LEFTSHIFT || keycode == KEY_RIGHTSHIFT
}

/// Fixed typo substitution: a neighbouring key, a shifted partner, or the
/// unaccented base letter. Characters without an entry map to themselves.
pub fn typo_substitute(c: char) -> char {
    match c {
        'a' => 's',
        's' => 'a',
        'd' => 'f',
        'f' => 'd',
        'g' => 'h',
        'h' => 'g',
        'j' => 'k',
        'k' => 'j',
        'l' => 'k',
        'q' => 'w',
        'w' => 'q',
        'e' => 'r',
        'r' => 'e',
        't' => 'y',
        'y' => 't',
        'u' => 'i',
        'i' => 'u',
        'o' => 'p',
        'p' => 'o',
        'z' => 'x',
        'x' => 'z',
        'c' => 'v',
        'v' => 'c',
        'b' => 'n',
        'n' => 'm',
        'm' => 'n',
        'A'..='Z' => typo_substitute(c.to_ascii_lowercase()).to_ascii_uppercase(),
        '0' => '9',
        '1' => '2',
        '2' => '1',
        '3' => '4',
        '4' => '3',
        '5' => '6',
        '6' => '5',
        '7' => '8',
        '8' => '7',
        '9' => '0',
        '!' => '@',
        '@' => '!',
        '#' => '$',
        '$' => '#',
        '%' => '^',
        '^' => '%',
        '&' => '*',
        '*' => '&',
        '(' => ')',
        ')' => '(',
        '_' => '-',
        '-' => '_',
        '+' => '=',
        '=' => '+',
        '[' => ']',
        ']' => '[',
        '{' => '}',
        '}' => '{',
        ';' => '\'',
        '\'' => ';',
        ':' => '"',
        '"' => ':',
        ',' => '.',
        '.' => ',',
        '<' => '>',
        '>' => '<',
        '?' => '/',
        '/' => '?',
        'á' | 'å' | 'æ' => 'a',
        'é' => 'e',
        'í' => 'i',
        'ó' | 'ø' | 'œ' => 'o',
        'ú' | 'ü' => 'u',
        'ñ' => 'n',
        'ç' => 'c',
        'ß' => 's',
        'ð' => 'd',
        other => other,
    }
}
