//! Key codes and the logical key identity table
//!
//! Raw codes are Linux evdev scancodes. A handful of keys get a name; every
//! other code resolves to [`LogicalKey::Custom`].

use super::ModifierFlags;
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::LazyLock;

/// Represents a physical key code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u16);

impl KeyCode {
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub const fn as_u16(&self) -> u16 {
        self.0
    }
}

impl From<u16> for KeyCode {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl fmt::Display for KeyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identity of a monitored key.
///
/// Two keys are equal when their raw codes are equal, so aliases such as
/// [`LogicalKey::Function`] and [`LogicalKey::Globe`] compare (and hash) the
/// same, and `Custom(464)` equals `Function`.
#[derive(Debug, Clone, Copy)]
pub enum LogicalKey {
    /// The secondary function key
    Function,
    /// Globe key; shares its scancode with `Function`
    Globe,
    LeftShift,
    RightShift,
    Control,
    /// Alt, labelled Option on Apple keyboards
    Alt,
    /// Meta, labelled Command or Super depending on the keyboard
    Meta,
    CapsLock,
    Escape,
    Tab,
    /// Any other key, identified by its raw code
    Custom(KeyCode),
}

/// One row of the named key table
struct NamedKey {
    key: LogicalKey,
    code: KeyCode,
    name: &'static str,
    flag: Option<ModifierFlags>,
}

impl NamedKey {
    const fn new(
        key: LogicalKey,
        code: u16,
        name: &'static str,
        flag: Option<ModifierFlags>,
    ) -> Self {
        Self {
            key,
            code: KeyCode(code),
            name,
            flag,
        }
    }
}

/// Named keys in resolution order. When two rows share a code, the first wins.
static NAMED_KEYS: [NamedKey; 10] = [
    NamedKey::new(LogicalKey::Function, 464, "Function", Some(ModifierFlags::FUNCTION)),
    NamedKey::new(LogicalKey::Globe, 464, "Globe", Some(ModifierFlags::FUNCTION)),
    NamedKey::new(LogicalKey::LeftShift, 42, "LeftShift", Some(ModifierFlags::LEFT_SHIFT)),
    NamedKey::new(LogicalKey::RightShift, 54, "RightShift", Some(ModifierFlags::RIGHT_SHIFT)),
    NamedKey::new(LogicalKey::Control, 29, "Control", Some(ModifierFlags::CONTROL)),
    NamedKey::new(LogicalKey::Alt, 56, "Alt", Some(ModifierFlags::ALT)),
    NamedKey::new(LogicalKey::Meta, 125, "Meta", Some(ModifierFlags::META)),
    NamedKey::new(LogicalKey::CapsLock, 58, "CapsLock", Some(ModifierFlags::CAPS_LOCK)),
    NamedKey::new(LogicalKey::Escape, 1, "Escape", None),
    NamedKey::new(LogicalKey::Tab, 15, "Tab", None),
];

/// Reverse lookup from raw code to the first named key listed for it
static BY_CODE: LazyLock<HashMap<KeyCode, LogicalKey>> = LazyLock::new(|| {
    let mut map = HashMap::new();
    for row in &NAMED_KEYS {
        map.entry(row.code).or_insert(row.key);
    }
    map
});

fn named_row(key: &LogicalKey) -> Option<&'static NamedKey> {
    if matches!(key, LogicalKey::Custom(_)) {
        return None;
    }
    NAMED_KEYS
        .iter()
        .find(|row| std::mem::discriminant(&row.key) == std::mem::discriminant(key))
}

/// Resolve a raw code to a logical key. Unknown codes become `Custom`.
pub fn resolve(code: KeyCode) -> LogicalKey {
    BY_CODE.get(&code).copied().unwrap_or(LogicalKey::Custom(code))
}

/// Raw code of a logical key
pub fn raw_code(key: LogicalKey) -> KeyCode {
    key.code()
}

impl LogicalKey {
    /// Raw code this key is bound to
    pub fn code(&self) -> KeyCode {
        match self {
            LogicalKey::Custom(code) => *code,
            named => named_row(named).map(|row| row.code).unwrap_or(KeyCode(0)),
        }
    }

    /// Stable identity of the key, suitable for logs and reports
    pub fn id(&self) -> u16 {
        self.code().as_u16()
    }

    /// Name of the key, `None` for codes outside the table
    pub fn name(&self) -> Option<&'static str> {
        match self {
            LogicalKey::Custom(code) => match resolve(*code) {
                LogicalKey::Custom(_) => None,
                named => named.name(),
            },
            named => named_row(named).map(|row| row.name),
        }
    }

    /// Modifier bit that reports this key in flag-change events
    pub fn modifier_flag(&self) -> Option<ModifierFlags> {
        match self {
            LogicalKey::Custom(code) => match resolve(*code) {
                LogicalKey::Custom(_) => None,
                named => named.modifier_flag(),
            },
            named => named_row(named).and_then(|row| row.flag),
        }
    }

    /// Whether this key is reported through modifier flags
    pub fn is_modifier(&self) -> bool {
        self.modifier_flag().is_some()
    }

    /// All named keys in table order
    pub fn named() -> impl Iterator<Item = LogicalKey> {
        NAMED_KEYS.iter().map(|row| row.key)
    }
}

impl PartialEq for LogicalKey {
    fn eq(&self, other: &Self) -> bool {
        self.code() == other.code()
    }
}

impl Eq for LogicalKey {}

impl Hash for LogicalKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.code().hash(state);
    }
}

impl From<KeyCode> for LogicalKey {
    fn from(code: KeyCode) -> Self {
        resolve(code)
    }
}

impl fmt::Display for LogicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Custom({})", self.code()),
        }
    }
}

/// Error returned when a key spec is neither a known name nor a number
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown key '{0}'")]
pub struct ParseKeyError(pub String);

impl FromStr for LogicalKey {
    type Err = ParseKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let spec = s.trim();
        let lower = spec.to_ascii_lowercase().replace(['_', '-', ' '], "");

        let key = match lower.as_str() {
            "fn" | "function" => LogicalKey::Function,
            "globe" => LogicalKey::Globe,
            "shift" | "lshift" | "leftshift" => LogicalKey::LeftShift,
            "rshift" | "rightshift" => LogicalKey::RightShift,
            "ctrl" | "control" => LogicalKey::Control,
            "alt" | "option" | "opt" => LogicalKey::Alt,
            "meta" | "cmd" | "command" | "super" => LogicalKey::Meta,
            "caps" | "capslock" => LogicalKey::CapsLock,
            "esc" | "escape" => LogicalKey::Escape,
            "tab" => LogicalKey::Tab,
            _ => {
                let code = match lower.strip_prefix("0x") {
                    Some(hex) => u16::from_str_radix(hex, 16),
                    None => lower.parse::<u16>(),
                }
                .map_err(|_| ParseKeyError(spec.to_string()))?;
                resolve(KeyCode(code))
            }
        };
        Ok(key)
    }
}

/// Map a `device_query` key to its evdev scancode
#[cfg(feature = "device-query")]
pub fn from_device_query(keycode: device_query::Keycode) -> Option<KeyCode> {
    use device_query::Keycode as DK;
    let code = match keycode {
        DK::Escape => 1,
        DK::Backspace => 14,
        DK::Tab => 15,
        DK::Enter => 28,
        DK::LControl => 29,
        DK::LShift => 42,
        DK::RShift => 54,
        DK::LAlt => 56,
        DK::Space => 57,
        DK::CapsLock => 58,
        DK::F1 => 59,
        DK::F2 => 60,
        DK::F3 => 61,
        DK::F4 => 62,
        DK::F5 => 63,
        DK::F6 => 64,
        DK::F7 => 65,
        DK::F8 => 66,
        DK::F9 => 67,
        DK::F10 => 68,
        DK::F11 => 87,
        DK::F12 => 88,
        DK::RControl => 97,
        DK::RAlt => 100,
        DK::LMeta => 125,
        DK::RMeta => 126,
        _ => return None,
    };
    Some(KeyCode(code))
}
