//! Event Relay: found/lost notifications from output presence.

use super::interfaces::AnchorEventKind;

/// Emits `Found` on the empty → non-empty transition and `Lost` on the
/// reverse. Unchanged presence emits nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventRelay {
    present: bool,
}

impl EventRelay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe the current output size.
    pub fn observe(&mut self, count: usize) -> Option<AnchorEventKind> {
        let present = count > 0;
        if present == self.present {
            return None;
        }
        self.present = present;
        Some(if present {
            AnchorEventKind::Found
        } else {
            AnchorEventKind::Lost
        })
    }

    pub fn is_present(&self) -> bool {
        self.present
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions() {
        let mut relay = EventRelay::new();
        let counts = [0, 0, 5, 5, 0, 0, 3, 0];

        let events: Vec<_> = counts
            .iter()
            .enumerate()
            .filter_map(|(i, &n)| relay.observe(n).map(|e| (i, e)))
            .collect();

        assert_eq!(
            events,
            vec![
                (2, AnchorEventKind::Found),
                (4, AnchorEventKind::Lost),
                (6, AnchorEventKind::Found),
                (7, AnchorEventKind::Lost),
            ]
        );
    }

    #[test]
    fn test_count_change_without_transition() {
        let mut relay = EventRelay::new();
        assert_eq!(relay.observe(2), Some(AnchorEventKind::Found));
        assert_eq!(relay.observe(7), None);
        assert!(relay.is_present());
    }
}
