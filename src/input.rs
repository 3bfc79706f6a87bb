//! Platform-neutral input events and the scene key bindings.

use std::collections::HashSet;

use crate::scene::SceneIndex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Left,
    Right,
    Escape,
    /// Any other key, by platform key code.
    Other(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Press,
    Repeat,
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Modifiers {
    pub shift: bool,
    pub ctrl: bool,
    pub alt: bool,
    pub logo: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    Key {
        key: Key,
        scancode: u32,
        action: KeyAction,
        modifiers: Modifiers,
    },
    Resized {
        width: u32,
        height: u32,
    },
    CloseRequested,
}

/// Tracks held keys by scancode so a second press without a release in
/// between is reported as a repeat.
#[derive(Debug, Default)]
pub struct KeyTracker {
    down: HashSet<u32>,
}

impl KeyTracker {
    pub fn press(&mut self, scancode: u32) -> KeyAction {
        if self.down.insert(scancode) {
            KeyAction::Press
        } else {
            KeyAction::Repeat
        }
    }

    pub fn release(&mut self, scancode: u32) -> KeyAction {
        self.down.remove(&scancode);
        KeyAction::Release
    }

    /// Forgets every held key. Releases that happen while the window is
    /// unfocused are never delivered.
    pub fn clear(&mut self) {
        self.down.clear();
    }

    pub fn is_down(&self, scancode: u32) -> bool {
        self.down.contains(&scancode)
    }
}

/// Result of feeding one key event to the scene selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub scene: SceneIndex,
    pub close: bool,
}

/// Left/Right step through scenes, Escape asks to close. Only the press
/// edge counts; repeats and releases leave everything untouched.
pub fn handle_key(scene: SceneIndex, key: Key, action: KeyAction) -> Transition {
    let unchanged = Transition {
        scene,
        close: false,
    };
    if action != KeyAction::Press {
        return unchanged;
    }

    match key {
        Key::Left => Transition {
            scene: scene.previous(),
            close: false,
        },
        Key::Right => Transition {
            scene: scene.next(),
            close: false,
        },
        Key::Escape => Transition { scene, close: true },
        Key::Other(_) => unchanged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(i: usize) -> SceneIndex {
        SceneIndex::new(i).unwrap()
    }

    #[test]
    fn right_press_advances() {
        let t = handle_key(s(0), Key::Right, KeyAction::Press);
        assert_eq!(t, Transition { scene: s(1), close: false });
    }

    #[test]
    fn left_press_goes_back() {
        assert_eq!(handle_key(s(2), Key::Left, KeyAction::Press).scene, s(1));
    }

    #[test]
    fn boundaries_are_no_ops() {
        assert_eq!(handle_key(s(0), Key::Left, KeyAction::Press).scene, s(0));
        assert_eq!(handle_key(s(2), Key::Right, KeyAction::Press).scene, s(2));
    }

    #[test]
    fn repeat_and_release_are_ignored() {
        for action in [KeyAction::Repeat, KeyAction::Release].iter() {
            assert_eq!(handle_key(s(1), Key::Right, *action).scene, s(1));
            assert!(!handle_key(s(1), Key::Escape, *action).close);
        }
    }

    #[test]
    fn escape_requests_close_without_moving() {
        let t = handle_key(s(1), Key::Escape, KeyAction::Press);
        assert!(t.close);
        assert_eq!(t.scene, s(1));
    }

    #[test]
    fn other_keys_do_nothing() {
        let t = handle_key(s(1), Key::Other(42), KeyAction::Press);
        assert_eq!(t, Transition { scene: s(1), close: false });
    }

    #[test]
    fn tracker_reports_press_repeat_release() {
        let mut keys = KeyTracker::default();
        assert_eq!(keys.press(106), KeyAction::Press);
        assert_eq!(keys.press(106), KeyAction::Repeat);
        assert!(keys.is_down(106));
        assert_eq!(keys.release(106), KeyAction::Release);
        assert!(!keys.is_down(106));
        assert_eq!(keys.press(106), KeyAction::Press);
    }

    #[test]
    fn cleared_tracker_treats_next_press_as_new() {
        let mut keys = KeyTracker::default();
        keys.press(106);
        keys.clear();
        assert_eq!(keys.press(106), KeyAction::Press);
    }
}
