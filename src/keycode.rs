//! Fixed table between macOS virtual key codes and selector characters

pub const KEY_TAB: u16 = 48;
pub const KEY_ESCAPE: u16 = 53;
pub const KEY_SHIFT_LEFT: u16 = 56;
pub const KEY_SHIFT_RIGHT: u16 = 60;

const TABLE_SIZE: usize = 128;

const KEYS: [(u16, char); 48] = [
    (0, 'a'),
    (1, 's'),
    (2, 'd'),
    (3, 'f'),
    (4, 'h'),
    (5, 'g'),
    (6, 'z'),
    (7, 'x'),
    (8, 'c'),
    (9, 'v'),
    (11, 'b'),
    (12, 'q'),
    (13, 'w'),
    (14, 'e'),
    (15, 'r'),
    (16, 'y'),
    (17, 't'),
    (18, '1'),
    (19, '2'),
    (20, '3'),
    (21, '4'),
    (22, '6'),
    (23, '5'),
    (24, '='),
    (25, '9'),
    (26, '7'),
    (27, '-'),
    (28, '8'),
    (29, '0'),
    (30, ']'),
    (31, 'o'),
    (32, 'u'),
    (33, '['),
    (34, 'i'),
    (35, 'p'),
    (37, 'l'),
    (38, 'j'),
    (39, '\''),
    (40, 'k'),
    (41, ';'),
    (42, '\\'),
    (43, ','),
    (44, '/'),
    (45, 'n'),
    (46, 'm'),
    (47, '.'),
    (49, ' '),
    (50, '`'),
];

static BY_CODE: [Option<char>; TABLE_SIZE] = build_by_code();
static BY_CHAR: [Option<u16>; TABLE_SIZE] = build_by_char();

const fn build_by_code() -> [Option<char>; TABLE_SIZE] {
    let mut table = [None; TABLE_SIZE];
    let mut i = 0;
    while i < KEYS.len() {
        table[KEYS[i].0 as usize] = Some(KEYS[i].1);
        i += 1;
    }
    table
}

const fn build_by_char() -> [Option<u16>; TABLE_SIZE] {
    let mut table = [None; TABLE_SIZE];
    let mut i = 0;
    while i < KEYS.len() {
        table[KEYS[i].1 as usize] = Some(KEYS[i].0);
        i += 1;
    }
    table
}

/// Character produced by `key_code` on an unshifted US layout.
pub fn character_for(key_code: u16) -> Option<char> {
    BY_CODE.get(usize::from(key_code)).copied().flatten()
}

/// Key code that types `c`. Uppercase letters map to their lowercase key.
pub fn key_code_for(c: char) -> Option<u16> {
    let c = c.to_ascii_lowercase();
    if !c.is_ascii() {
        return None;
    }
    BY_CHAR[c as usize]
}

/// Label shown for a selector character in listings.
pub fn display_name(c: char) -> String {
    let label = match c {
        ' ' => "Space",
        '-' => "Minus",
        '=' => "Equal",
        '[' => "Left Bracket",
        ']' => "Right Bracket",
        '\\' => "Backslash",
        ';' => "Semicolon",
        '\'' => "Quote",
        ',' => "Comma",
        '.' => "Period",
        '/' => "Slash",
        '`' => "Backtick",
        _ => return c.to_uppercase().collect(),
    };
    label.to_string()
}

pub fn is_shift(key_code: u16) -> bool {
    key_code == KEY_SHIFT_LEFT || key_code == KEY_SHIFT_RIGHT
}
