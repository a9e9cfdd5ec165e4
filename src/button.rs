use std::time::{Duration, Instant};

use crate::gpio::InputSource;
use crate::registry::Registry;

/// Hold time from which a press/release pair counts as a long click.
pub const LONG_CLICK_HOLD: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Click,
    LongClick,
}

impl Gesture {
    /// Classify a press/release pair by how long the button was held.
    pub fn classify(held: Duration) -> Gesture {
        if held < LONG_CLICK_HOLD {
            Gesture::Click
        } else {
            Gesture::LongClick
        }
    }
}

/// One `<gesture>=<command>` line of the config, attached to its button.
pub struct Binding {
    pub gesture: Gesture,
    pub action: String,
}

/// A physical push-button on one GPIO pin.
///
/// Owns its driver handle for the life of the process; the handle closes the
/// pin when the button is dropped at shutdown.
pub struct Button {
    pin: u32,
    pressed_at: Instant,
    bindings: Vec<Binding>,
    source: Box<dyn InputSource>,
}

impl Button {
    pub fn new(pin: u32, source: Box<dyn InputSource>) -> Button {
        Button {
            pin,
            pressed_at: Instant::now(),
            bindings: Vec::new(),
            source,
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    pub fn bind(&mut self, binding: Binding) {
        self.bindings.push(binding);
    }

    pub fn bindings(&self) -> &[Binding] {
        &self.bindings
    }

    /// Record a press (or, at setup, a synthetic one so that a release with
    /// no observed press classifies as a short click).
    pub fn press(&mut self, now: Instant) {
        self.pressed_at = now;
    }

    pub fn held_for(&self, now: Instant) -> Duration {
        now.duration_since(self.pressed_at)
    }

    pub fn source_mut(&mut self) -> &mut dyn InputSource {
        &mut *self.source
    }
}

/// Stable handle to a button in the owning [`ButtonSet`] arena.
///
/// Both runtime indexes (by pin, by poll descriptor) store ids, never
/// references, so reissuing a descriptor never leaves either index aliasing
/// a dead entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonId(usize);

/// The owning store of every configured button, indexed by pin.
pub struct ButtonSet {
    arena: Vec<Button>,
    by_pin: Registry<ButtonId>,
}

impl std::fmt::Debug for ButtonSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ButtonSet")
            .field("len", &self.arena.len())
            .finish()
    }
}

impl ButtonSet {
    pub fn new() -> ButtonSet {
        ButtonSet {
            arena: Vec::new(),
            by_pin: Registry::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    pub fn lookup_pin(&self, pin: u32) -> Option<ButtonId> {
        self.by_pin.get(pin as u64).copied()
    }

    /// Add a button for a pin not yet in the set.
    pub fn insert(&mut self, button: Button) -> ButtonId {
        let id = ButtonId(self.arena.len());
        self.by_pin.upsert(button.pin() as u64, id);
        self.arena.push(button);
        id
    }

    pub fn get(&self, id: ButtonId) -> &Button {
        &self.arena[id.0]
    }

    pub fn get_mut(&mut self, id: ButtonId) -> &mut Button {
        &mut self.arena[id.0]
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ButtonId, &mut Button)> {
        self.arena
            .iter_mut()
            .enumerate()
            .map(|(idx, button)| (ButtonId(idx), button))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpio::{Edge, Level, PollTarget};
    use anyhow::Result;

    struct NullInput;

    impl InputSource for NullInput {
        fn set_edge(&mut self, _edge: Edge) -> Result<()> {
            Ok(())
        }
        fn poll_target(&mut self) -> Result<PollTarget> {
            Ok(PollTarget { fd: -1, events: 0 })
        }
        fn level(&mut self) -> Result<Level> {
            Ok(Level::Low)
        }
    }

    #[test]
    fn test_classify_boundary() {
        // Both sides of the 2 s threshold.
        assert_eq!(
            Gesture::classify(Duration::from_millis(1999)),
            Gesture::Click
        );
        assert_eq!(
            Gesture::classify(Duration::from_millis(2000)),
            Gesture::LongClick
        );
        assert_eq!(Gesture::classify(Duration::from_secs(30)), Gesture::LongClick);
        assert_eq!(Gesture::classify(Duration::ZERO), Gesture::Click);
    }

    #[test]
    fn test_press_updates_held_time() {
        let mut button = Button::new(4, Box::new(NullInput));
        let t0 = Instant::now();
        button.press(t0);
        assert_eq!(button.held_for(t0 + Duration::from_millis(500)), Duration::from_millis(500));
        // A later press overwrites the stamp.
        let t1 = t0 + Duration::from_secs(10);
        button.press(t1);
        assert_eq!(button.held_for(t1 + Duration::from_secs(3)), Duration::from_secs(3));
    }

    #[test]
    fn test_button_set_resolves_by_pin() {
        let mut set = ButtonSet::new();
        let a = set.insert(Button::new(4, Box::new(NullInput)));
        let b = set.insert(Button::new(17, Box::new(NullInput)));
        assert_eq!(set.len(), 2);
        assert_eq!(set.lookup_pin(4), Some(a));
        assert_eq!(set.lookup_pin(17), Some(b));
        assert_eq!(set.lookup_pin(5), None);
        assert_eq!(set.get(a).pin(), 4);
        assert_eq!(set.get(b).pin(), 17);
    }

    #[test]
    fn test_bindings_keep_file_order() {
        let mut button = Button::new(4, Box::new(NullInput));
        button.bind(Binding {
            gesture: Gesture::Click,
            action: "echo a".into(),
        });
        button.bind(Binding {
            gesture: Gesture::LongClick,
            action: "echo b".into(),
        });
        button.bind(Binding {
            gesture: Gesture::Click,
            action: "echo c".into(),
        });
        let actions: Vec<&str> = button.bindings().iter().map(|b| b.action.as_str()).collect();
        assert_eq!(actions, vec!["echo a", "echo b", "echo c"]);
    }
}
