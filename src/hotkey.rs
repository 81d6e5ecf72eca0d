//! Swapping the launcher's global activation shortcut.
//!
//! The new shortcut is always registered before the old one is released, so a
//! failed rebind leaves the previous shortcut bound and usable. Both failure
//! kinds come back as data on [`RebindOutcome`]; nothing here returns `Err`.

use std::fmt;
use std::sync::Arc;

pub const DEFAULT_HOTKEY: &str = "Alt+Space";

/// Callback fired when the bound shortcut is pressed.
pub type ActivationHandler = Arc<dyn Fn() + Send + Sync>;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("invalid shortcut '{shortcut}': {reason}")]
    Invalid { shortcut: String, reason: String },
    #[error("shortcut '{0}' is already in use")]
    Conflict(String),
    #[error("failed to register shortcut '{shortcut}': {reason}")]
    Platform { shortcut: String, reason: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum UnregistrationError {
    #[error("shortcut '{0}' is not registered")]
    NotRegistered(String),
    #[error("failed to release shortcut '{shortcut}': {reason}")]
    Platform { shortcut: String, reason: String },
}

/// OS-level shortcut registration, injected by the host.
pub trait ShortcutRegistrar {
    fn register(
        &mut self,
        shortcut: &str,
        handler: ActivationHandler,
    ) -> Result<(), RegistrationError>;

    fn unregister(&mut self, shortcut: &str) -> Result<(), UnregistrationError>;
}

impl<R: ShortcutRegistrar + ?Sized> ShortcutRegistrar for &mut R {
    fn register(
        &mut self,
        shortcut: &str,
        handler: ActivationHandler,
    ) -> Result<(), RegistrationError> {
        (**self).register(shortcut, handler)
    }

    fn unregister(&mut self, shortcut: &str) -> Result<(), UnregistrationError> {
        (**self).unregister(shortcut)
    }
}

/// Adapts a pair of closures into a [`ShortcutRegistrar`].
pub struct FnRegistrar<Reg, Unreg> {
    register: Reg,
    unregister: Unreg,
}

impl<Reg, Unreg> FnRegistrar<Reg, Unreg>
where
    Reg: FnMut(&str, ActivationHandler) -> Result<(), RegistrationError>,
    Unreg: FnMut(&str) -> Result<(), UnregistrationError>,
{
    pub fn new(register: Reg, unregister: Unreg) -> Self {
        Self {
            register,
            unregister,
        }
    }
}

impl<Reg, Unreg> ShortcutRegistrar for FnRegistrar<Reg, Unreg>
where
    Reg: FnMut(&str, ActivationHandler) -> Result<(), RegistrationError>,
    Unreg: FnMut(&str) -> Result<(), UnregistrationError>,
{
    fn register(
        &mut self,
        shortcut: &str,
        handler: ActivationHandler,
    ) -> Result<(), RegistrationError> {
        (self.register)(shortcut, handler)
    }

    fn unregister(&mut self, shortcut: &str) -> Result<(), UnregistrationError> {
        (self.unregister)(shortcut)
    }
}

pub struct RebindRequest<'a> {
    /// Descriptor believed to be registered right now; `None` on first run.
    pub current: Option<&'a str>,
    pub next: &'a str,
    pub handler: ActivationHandler,
}

impl fmt::Debug for RebindRequest<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RebindRequest")
            .field("current", &self.current)
            .field("next", &self.next)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebindPhase {
    /// `next` equalled `current`; nothing was touched.
    Unchanged,
    /// Registering `next` failed; `current` is still bound.
    Aborted,
    /// `next` is bound and `current` (if any) was released.
    Done,
    /// `next` is bound but `current` could not be released.
    DoneWithLeak,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebindOutcome {
    pub resulting_shortcut: Option<String>,
    pub registration_error: Option<RegistrationError>,
    pub registered: bool,
    pub unregistered: bool,
    pub unregistration_error: Option<UnregistrationError>,
}

impl RebindOutcome {
    fn unchanged(current: Option<&str>) -> Self {
        Self {
            resulting_shortcut: current.map(str::to_string),
            registration_error: None,
            registered: false,
            unregistered: false,
            unregistration_error: None,
        }
    }

    pub fn phase(&self) -> RebindPhase {
        if self.registration_error.is_some() {
            RebindPhase::Aborted
        } else if self.unregistration_error.is_some() {
            RebindPhase::DoneWithLeak
        } else if self.registered {
            RebindPhase::Done
        } else {
            RebindPhase::Unchanged
        }
    }

    /// True when the caller should persist `resulting_shortcut`.
    pub fn succeeded(&self) -> bool {
        self.registration_error.is_none()
    }
}

/// Moves the activation binding from `request.current` to `request.next`.
///
/// `register(next)` runs strictly before `unregister(current)`, and the two
/// never overlap. A registration failure aborts without calling `unregister`.
pub fn rebind<R>(registrar: &mut R, request: RebindRequest<'_>) -> RebindOutcome
where
    R: ShortcutRegistrar + ?Sized,
{
    let RebindRequest {
        current,
        next,
        handler,
    } = request;

    if current == Some(next) {
        return RebindOutcome::unchanged(current);
    }

    if let Err(err) = registrar.register(next, handler) {
        return RebindOutcome {
            resulting_shortcut: current.map(str::to_string),
            registration_error: Some(err),
            registered: false,
            unregistered: false,
            unregistration_error: None,
        };
    }

    let Some(previous) = current else {
        return RebindOutcome {
            resulting_shortcut: Some(next.to_string()),
            registration_error: None,
            registered: true,
            unregistered: false,
            unregistration_error: None,
        };
    };

    let unregistration_error = registrar.unregister(previous).err();
    RebindOutcome {
        resulting_shortcut: Some(next.to_string()),
        registration_error: None,
        registered: true,
        unregistered: unregistration_error.is_none(),
        unregistration_error,
    }
}

/// Owns the registrar plus the descriptor it currently holds for the launcher.
///
/// Rebinds take `&mut self`, so one instance never runs two at once.
pub struct LauncherHotkey<R> {
    registrar: R,
    current: Option<String>,
}

impl<R: ShortcutRegistrar> LauncherHotkey<R> {
    pub fn new(registrar: R) -> Self {
        Self {
            registrar,
            current: None,
        }
    }

    pub fn current(&self) -> Option<&str> {
        self.current.as_deref()
    }

    pub fn registrar(&self) -> &R {
        &self.registrar
    }

    pub fn rebind(&mut self, next: &str, handler: ActivationHandler) -> RebindOutcome {
        let outcome = rebind(
            &mut self.registrar,
            RebindRequest {
                current: self.current.as_deref(),
                next,
                handler,
            },
        );
        log_outcome(self.current.as_deref(), next, &outcome);
        self.current = outcome.resulting_shortcut.clone();
        outcome
    }

    /// First registration at startup. Falls back to `fallback` when the
    /// configured shortcut cannot be bound.
    pub fn bind_initial(
        &mut self,
        configured: &str,
        fallback: &str,
        handler: ActivationHandler,
    ) -> RebindOutcome {
        let outcome = self.rebind(configured, handler.clone());
        if outcome.succeeded() || configured == fallback {
            return outcome;
        }
        tracing::warn!(
            event_type = "hotkey",
            configured,
            fallback,
            "configured hotkey unavailable, trying default"
        );
        self.rebind(fallback, handler)
    }
}

fn log_outcome(current: Option<&str>, next: &str, outcome: &RebindOutcome) {
    let from = current.unwrap_or("<none>");
    match outcome.phase() {
        RebindPhase::Unchanged => {
            tracing::debug!(event_type = "hotkey", shortcut = next, "hotkey unchanged");
        }
        RebindPhase::Aborted => {
            if let Some(err) = &outcome.registration_error {
                tracing::error!(
                    event_type = "hotkey",
                    from,
                    to = next,
                    error = %err,
                    "hotkey rebind aborted"
                );
            }
        }
        RebindPhase::Done => {
            tracing::info!(event_type = "hotkey", from, to = next, "hotkey rebound");
        }
        RebindPhase::DoneWithLeak => {
            if let Some(err) = &outcome.unregistration_error {
                tracing::warn!(
                    event_type = "hotkey",
                    from,
                    to = next,
                    error = %err,
                    "hotkey rebound but previous binding leaked"
                );
            }
        }
    }
}
