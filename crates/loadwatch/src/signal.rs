//! Derivation of the single "is loading" signal from the two watched flags

/// Loading flag: no wrapped call is running
pub const FLAG_IDLE: u8 = 0;
/// Loading flag: inside a wrapped call
pub const FLAG_BUSY: u8 = 1;
/// Loading flag: left by the frontend path, which may be gameplay or a modal
pub const FLAG_AMBIGUOUS: u8 = 2;

/// Pure combinator over (loading flag, modal flag)
pub fn is_loading(loading: u8, modal: u8) -> bool {
    if loading == FLAG_AMBIGUOUS {
        modal != 0
    } else {
        loading != FLAG_IDLE
    }
}

/// Tracks both inputs and reports when the derived signal changes
///
/// Either input changing re-evaluates the combinator against the other
/// input's latest value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSignal {
    loading: u8,
    modal: u8,
    current: bool,
}

impl LoadSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> bool {
        self.current
    }

    /// Record a new loading flag value; returns the signal if it changed
    pub fn set_loading(&mut self, value: u8) -> Option<bool> {
        self.loading = value;
        self.recompute()
    }

    /// Record a new modal flag value; returns the signal if it changed
    pub fn set_modal(&mut self, value: u8) -> Option<bool> {
        self.modal = value;
        self.recompute()
    }

    fn recompute(&mut self) -> Option<bool> {
        let next = is_loading(self.loading, self.modal);
        if next == self.current {
            return None;
        }
        self.current = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_combinator_table() {
        assert!(!is_loading(0, 0));
        assert!(is_loading(1, 0));
        assert!(!is_loading(2, 0));
        assert!(is_loading(2, 1));
        assert!(!is_loading(0, 1));
        assert!(is_loading(1, 1));
    }

    #[test]
    fn test_modal_change_matters_only_when_ambiguous() {
        let mut signal = LoadSignal::new();
        assert_eq!(signal.set_modal(1), None);
        assert_eq!(signal.set_loading(FLAG_AMBIGUOUS), Some(true));
        assert_eq!(signal.set_modal(0), Some(false));
        assert_eq!(signal.set_modal(3), Some(true));
        assert_eq!(signal.set_loading(FLAG_IDLE), Some(false));
        assert_eq!(signal.set_modal(0), None);
    }

    #[test]
    fn test_only_changes_are_reported() {
        let mut signal = LoadSignal::new();
        assert_eq!(signal.set_loading(FLAG_BUSY), Some(true));
        assert_eq!(signal.set_loading(FLAG_BUSY), None);
        assert_eq!(signal.set_loading(FLAG_AMBIGUOUS), Some(false));
        assert_eq!(signal.set_loading(FLAG_IDLE), None);
        assert!(!signal.current());
    }
}
