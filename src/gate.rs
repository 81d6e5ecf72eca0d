use std::time::{Duration, Instant};

pub const TOGGLE_DEBOUNCE: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Proceed,
    Debounced,
    /// The panel UI has not loaded yet; it will be shown once it reports ready.
    DeferShow,
}

/// Decides when the launcher panel may be shown or toggled.
#[derive(Debug, Default)]
pub struct LauncherGate {
    ui_ready: bool,
    pending_show: bool,
    last_toggle_at: Option<Instant>,
}

impl LauncherGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ui_ready
    }

    /// Returns true when the panel can be shown now.
    pub fn request_show(&mut self) -> bool {
        if self.ui_ready {
            return true;
        }
        self.pending_show = true;
        false
    }

    /// Marks the UI ready. Returns true if a show was deferred and should happen now.
    pub fn set_ui_ready(&mut self) -> bool {
        self.ui_ready = true;
        std::mem::take(&mut self.pending_show)
    }

    pub fn allow_toggle(&mut self, now: Instant) -> GateDecision {
        if !self.ui_ready {
            self.pending_show = true;
            return GateDecision::DeferShow;
        }
        if let Some(last) = self.last_toggle_at
            && now.saturating_duration_since(last) < TOGGLE_DEBOUNCE
        {
            return GateDecision::Debounced;
        }
        self.last_toggle_at = Some(now);
        GateDecision::Proceed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn show_is_deferred_until_ready() {
        let mut gate = LauncherGate::new();
        assert!(!gate.request_show());
        assert!(gate.set_ui_ready());
        assert!(!gate.set_ui_ready());
    }

    #[test]
    fn show_is_immediate_once_ready() {
        let mut gate = LauncherGate::new();
        assert!(!gate.set_ui_ready());
        assert!(gate.request_show());
    }

    #[test]
    fn toggles_inside_window_are_debounced() {
        let mut gate = LauncherGate::new();
        gate.set_ui_ready();
        let start = Instant::now();
        assert_eq!(gate.allow_toggle(start), GateDecision::Proceed);
        assert_eq!(
            gate.allow_toggle(start + Duration::from_millis(100)),
            GateDecision::Debounced
        );
        assert_eq!(
            gate.allow_toggle(start + Duration::from_millis(400)),
            GateDecision::Proceed
        );
    }

    #[test]
    fn toggle_before_ready_defers_show() {
        let mut gate = LauncherGate::new();
        assert_eq!(gate.allow_toggle(Instant::now()), GateDecision::DeferShow);
        assert!(gate.set_ui_ready());
    }
}
