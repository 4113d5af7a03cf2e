use evdev::KeyCode as Key;

/// Modifier groups, matching either the left or the right key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Shift,
    Control,
    Alt,
    Windows,
}

impl Modifier {
    pub fn from_name(name: &str) -> Option<Modifier> {
        match name.trim().to_lowercase().as_str() {
            "shift" => Some(Modifier::Shift),
            "ctrl" | "control" => Some(Modifier::Control),
            "alt" => Some(Modifier::Alt),
            "win" | "windows" | "super" | "meta" => Some(Modifier::Windows),
            _ => None,
        }
    }

    pub fn keys(self) -> [Key; 2] {
        match self {
            Modifier::Shift => [Key::KEY_LEFTSHIFT, Key::KEY_RIGHTSHIFT],
            Modifier::Control => [Key::KEY_LEFTCTRL, Key::KEY_RIGHTCTRL],
            Modifier::Alt => [Key::KEY_LEFTALT, Key::KEY_RIGHTALT],
            Modifier::Windows => [Key::KEY_LEFTMETA, Key::KEY_RIGHTMETA],
        }
    }
}

pub fn parse_key(input: &str) -> Result<Key, String> {
    let name = input.trim().to_lowercase();
    if let Some(key) = named_key(&name) {
        return Ok(key);
    }
    let mut chars = name.chars();
    if let (Some(c), None) = (chars.next(), chars.next()) {
        if let Some(key) = char_to_key(c) {
            return Ok(key);
        }
    }
    Err(format!("unknown key: {input:?}"))
}

fn named_key(name: &str) -> Option<Key> {
    let key = match name {
        "enter" | "return" => Key::KEY_ENTER,
        "tab" => Key::KEY_TAB,
        "space" => Key::KEY_SPACE,
        "backspace" | "bs" => Key::KEY_BACKSPACE,
        "delete" | "del" => Key::KEY_DELETE,
        "insert" | "ins" => Key::KEY_INSERT,
        "escape" | "esc" => Key::KEY_ESC,
        "capslock" => Key::KEY_CAPSLOCK,
        "up" => Key::KEY_UP,
        "down" => Key::KEY_DOWN,
        "left" => Key::KEY_LEFT,
        "right" => Key::KEY_RIGHT,
        "home" => Key::KEY_HOME,
        "end" => Key::KEY_END,
        "pgup" | "pageup" => Key::KEY_PAGEUP,
        "pgdn" | "pagedown" => Key::KEY_PAGEDOWN,
        "shift" | "lshift" => Key::KEY_LEFTSHIFT,
        "rshift" => Key::KEY_RIGHTSHIFT,
        "ctrl" | "lctrl" => Key::KEY_LEFTCTRL,
        "rctrl" => Key::KEY_RIGHTCTRL,
        "alt" | "lalt" => Key::KEY_LEFTALT,
        "ralt" => Key::KEY_RIGHTALT,
        "meta" | "lmeta" | "win" => Key::KEY_LEFTMETA,
        "rmeta" => Key::KEY_RIGHTMETA,
        "f1" => Key::KEY_F1,
        "f2" => Key::KEY_F2,
        "f3" => Key::KEY_F3,
        "f4" => Key::KEY_F4,
        "f5" => Key::KEY_F5,
        "f6" => Key::KEY_F6,
        "f7" => Key::KEY_F7,
        "f8" => Key::KEY_F8,
        "f9" => Key::KEY_F9,
        "f10" => Key::KEY_F10,
        "f11" => Key::KEY_F11,
        "f12" => Key::KEY_F12,
        _ => return None,
    };
    Some(key)
}

fn char_to_key(c: char) -> Option<Key> {
    let key = match c {
        'a' => Key::KEY_A,
        'b' => Key::KEY_B,
        'c' => Key::KEY_C,
        'd' => Key::KEY_D,
        'e' => Key::KEY_E,
        'f' => Key::KEY_F,
        'g' => Key::KEY_G,
        'h' => Key::KEY_H,
        'i' => Key::KEY_I,
        'j' => Key::KEY_J,
        'k' => Key::KEY_K,
        'l' => Key::KEY_L,
        'm' => Key::KEY_M,
        'n' => Key::KEY_N,
        'o' => Key::KEY_O,
        'p' => Key::KEY_P,
        'q' => Key::KEY_Q,
        'r' => Key::KEY_R,
        's' => Key::KEY_S,
        't' => Key::KEY_T,
        'u' => Key::KEY_U,
        'v' => Key::KEY_V,
        'w' => Key::KEY_W,
        'x' => Key::KEY_X,
        'y' => Key::KEY_Y,
        'z' => Key::KEY_Z,
        '0' => Key::KEY_0,
        '1' => Key::KEY_1,
        '2' => Key::KEY_2,
        '3' => Key::KEY_3,
        '4' => Key::KEY_4,
        '5' => Key::KEY_5,
        '6' => Key::KEY_6,
        '7' => Key::KEY_7,
        '8' => Key::KEY_8,
        '9' => Key::KEY_9,
        ' ' => Key::KEY_SPACE,
        ';' => Key::KEY_SEMICOLON,
        ',' => Key::KEY_COMMA,
        '.' => Key::KEY_DOT,
        '/' => Key::KEY_SLASH,
        '\'' => Key::KEY_APOSTROPHE,
        '-' => Key::KEY_MINUS,
        '=' => Key::KEY_EQUAL,
        '[' => Key::KEY_LEFTBRACE,
        ']' => Key::KEY_RIGHTBRACE,
        '\\' => Key::KEY_BACKSLASH,
        '`' => Key::KEY_GRAVE,
        _ => return None,
    };
    Some(key)
}
