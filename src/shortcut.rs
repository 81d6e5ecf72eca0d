use crate::hotkey::{ActivationHandler, RegistrationError, ShortcutRegistrar, UnregistrationError};
use global_hotkey::{
    GlobalHotKeyManager,
    hotkey::{Code, HotKey, Modifiers},
};
use std::collections::HashMap;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ShortcutError {
    #[error("shortcut cannot be empty")]
    Empty,
    #[error("unsupported key '{0}'")]
    UnsupportedKey(String),
    #[error("shortcut '{0}' has more than one key")]
    MultipleKeys(String),
    #[error("shortcut '{0}' is missing a key")]
    MissingKey(String),
}

pub fn normalize_descriptor(input: &str) -> Result<String, ShortcutError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ShortcutError::Empty);
    }
    Ok(trimmed.to_string())
}

pub fn parse_hotkey(combo: &str) -> Result<HotKey, ShortcutError> {
    let parts: Vec<&str> = combo
        .split('+')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.is_empty() {
        return Err(ShortcutError::Empty);
    }

    let mut modifiers = Modifiers::empty();
    let mut code: Option<Code> = None;

    for part in parts {
        match part.to_lowercase().as_str() {
            "cmd" | "command" | "meta" | "super" | "win" => modifiers |= Modifiers::META,
            "shift" => modifiers |= Modifiers::SHIFT,
            "alt" | "option" => modifiers |= Modifiers::ALT,
            "ctrl" | "control" => modifiers |= Modifiers::CONTROL,
            key => {
                if code.is_some() {
                    return Err(ShortcutError::MultipleKeys(combo.to_string()));
                }
                code = Some(
                    code_from_key(key).ok_or_else(|| ShortcutError::UnsupportedKey(part.to_string()))?,
                );
            }
        }
    }

    let code = code.ok_or_else(|| ShortcutError::MissingKey(combo.to_string()))?;
    let modifiers = (!modifiers.is_empty()).then_some(modifiers);
    Ok(HotKey::new(modifiers, code))
}

fn code_from_key(key: &str) -> Option<Code> {
    if key.len() == 1 {
        let ch = key.chars().next()?;
        if ch.is_ascii_alphabetic() {
            return Some(match ch.to_ascii_uppercase() {
                'A' => Code::KeyA,
                'B' => Code::KeyB,
                'C' => Code::KeyC,
                'D' => Code::KeyD,
                'E' => Code::KeyE,
                'F' => Code::KeyF,
                'G' => Code::KeyG,
                'H' => Code::KeyH,
                'I' => Code::KeyI,
                'J' => Code::KeyJ,
                'K' => Code::KeyK,
                'L' => Code::KeyL,
                'M' => Code::KeyM,
                'N' => Code::KeyN,
                'O' => Code::KeyO,
                'P' => Code::KeyP,
                'Q' => Code::KeyQ,
                'R' => Code::KeyR,
                'S' => Code::KeyS,
                'T' => Code::KeyT,
                'U' => Code::KeyU,
                'V' => Code::KeyV,
                'W' => Code::KeyW,
                'X' => Code::KeyX,
                'Y' => Code::KeyY,
                'Z' => Code::KeyZ,
                _ => return None,
            });
        }
        if ch.is_ascii_digit() {
            return Some(match ch {
                '0' => Code::Digit0,
                '1' => Code::Digit1,
                '2' => Code::Digit2,
                '3' => Code::Digit3,
                '4' => Code::Digit4,
                '5' => Code::Digit5,
                '6' => Code::Digit6,
                '7' => Code::Digit7,
                '8' => Code::Digit8,
                '9' => Code::Digit9,
                _ => return None,
            });
        }
    }

    match key {
        "space" => Some(Code::Space),
        "tab" => Some(Code::Tab),
        "enter" | "return" => Some(Code::Enter),
        "esc" | "escape" => Some(Code::Escape),
        "backspace" => Some(Code::Backspace),
        "delete" => Some(Code::Delete),
        "insert" => Some(Code::Insert),
        "up" | "arrowup" => Some(Code::ArrowUp),
        "down" | "arrowdown" => Some(Code::ArrowDown),
        "left" | "arrowleft" => Some(Code::ArrowLeft),
        "right" | "arrowright" => Some(Code::ArrowRight),
        "home" => Some(Code::Home),
        "end" => Some(Code::End),
        "pageup" => Some(Code::PageUp),
        "pagedown" => Some(Code::PageDown),
        "f1" => Some(Code::F1),
        "f2" => Some(Code::F2),
        "f3" => Some(Code::F3),
        "f4" => Some(Code::F4),
        "f5" => Some(Code::F5),
        "f6" => Some(Code::F6),
        "f7" => Some(Code::F7),
        "f8" => Some(Code::F8),
        "f9" => Some(Code::F9),
        "f10" => Some(Code::F10),
        "f11" => Some(Code::F11),
        "f12" => Some(Code::F12),
        "`" | "backquote" | "grave" => Some(Code::Backquote),
        "-" | "minus" => Some(Code::Minus),
        "=" | "equal" | "equals" => Some(Code::Equal),
        "[" | "bracketleft" => Some(Code::BracketLeft),
        "]" | "bracketright" => Some(Code::BracketRight),
        "\\" | "backslash" => Some(Code::Backslash),
        ";" | "semicolon" => Some(Code::Semicolon),
        "'" | "quote" => Some(Code::Quote),
        "," | "comma" => Some(Code::Comma),
        "." | "period" => Some(Code::Period),
        "/" | "slash" => Some(Code::Slash),
        _ => None,
    }
}

/// [`ShortcutRegistrar`] backed by the OS through `global-hotkey`.
///
/// Must be created on the main thread. Fired hotkeys arrive on
/// `GlobalHotKeyEvent::receiver()` and are routed back with [`dispatch`].
///
/// [`dispatch`]: GlobalRegistrar::dispatch
pub struct GlobalRegistrar {
    manager: GlobalHotKeyManager,
    bound: HashMap<String, HotKey>,
    handlers: HashMap<u32, ActivationHandler>,
}

impl GlobalRegistrar {
    pub fn new() -> Result<Self, global_hotkey::Error> {
        Ok(Self {
            manager: GlobalHotKeyManager::new()?,
            bound: HashMap::new(),
            handlers: HashMap::new(),
        })
    }

    /// Runs the handler bound to `id`. Returns false for unknown ids.
    pub fn dispatch(&self, id: u32) -> bool {
        match self.handlers.get(&id) {
            Some(handler) => {
                handler();
                true
            }
            None => false,
        }
    }
}

impl ShortcutRegistrar for GlobalRegistrar {
    fn register(
        &mut self,
        shortcut: &str,
        handler: ActivationHandler,
    ) -> Result<(), RegistrationError> {
        let hotkey = parse_hotkey(shortcut).map_err(|err| RegistrationError::Invalid {
            shortcut: shortcut.to_string(),
            reason: err.to_string(),
        })?;
        // Two descriptors can spell the same chord ("Alt+P" / "option+p").
        if self.handlers.contains_key(&hotkey.id()) {
            return Err(RegistrationError::Conflict(shortcut.to_string()));
        }
        self.manager
            .register(hotkey)
            .map_err(|err| registration_error(shortcut, err))?;
        self.bound.insert(shortcut.to_string(), hotkey);
        self.handlers.insert(hotkey.id(), handler);
        Ok(())
    }

    fn unregister(&mut self, shortcut: &str) -> Result<(), UnregistrationError> {
        let Some(hotkey) = self.bound.get(shortcut).copied() else {
            return Err(UnregistrationError::NotRegistered(shortcut.to_string()));
        };
        self.manager
            .unregister(hotkey)
            .map_err(|err| UnregistrationError::Platform {
                shortcut: shortcut.to_string(),
                reason: err.to_string(),
            })?;
        self.bound.remove(shortcut);
        self.handlers.remove(&hotkey.id());
        Ok(())
    }
}

fn registration_error(shortcut: &str, err: global_hotkey::Error) -> RegistrationError {
    match err {
        global_hotkey::Error::AlreadyRegistered(_) => {
            RegistrationError::Conflict(shortcut.to_string())
        }
        global_hotkey::Error::FailedToRegister(reason) => RegistrationError::Platform {
            shortcut: shortcut.to_string(),
            reason,
        },
        other => RegistrationError::Platform {
            shortcut: shortcut.to_string(),
            reason: other.to_string(),
        },
    }
}
