//! Slot-drop detection.
//!
//! A "drop" is the interval during which a previously-unavailable slot
//! reappears. It opens on an unavailable-to-available transition and
//! closes when the slot goes unavailable again. A slot seen for the first
//! time opens nothing; we only care about inventory that came back.

/// What the current observation means for the drop record, given the
/// previous recorded availability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropTransition {
    /// Slot came back: open a drop window.
    Opened,
    /// Slot went away: close any open drop window.
    Closed,
    /// No state change, or first observation.
    Unchanged,
}

pub fn classify(previous: Option<bool>, current: bool) -> DropTransition {
    match (previous, current) {
        (Some(false), true) => DropTransition::Opened,
        (Some(true), false) => DropTransition::Closed,
        _ => DropTransition::Unchanged,
    }
}
