//! Keyboard polling for the demo controls.
//!
//! Input is sampled once per frame rather than reacted to per event, so a key
//! held across several frames keeps firing its action (`Held`) unless the
//! handler is configured for edge-triggered reloads (`Press`).

use std::collections::HashSet;

use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::types::ReloadTrigger;

pub const CLOSE_KEY: KeyCode = KeyCode::Escape;
pub const RELOAD_KEY: KeyCode = KeyCode::Space;

/// Read-only view of which keys are currently down.
pub trait KeyStateSource {
    fn is_down(&self, key: KeyCode) -> bool;
}

/// Actions the input handler can trigger on the running demo.
pub trait FrameControl {
    fn request_close(&mut self);
    fn reload_program(&mut self);
}

/// Key state tracked from winit keyboard events.
#[derive(Debug, Default)]
pub struct KeyboardState {
    down: HashSet<KeyCode>,
}

impl KeyboardState {
    /// Returns `true` when the event changed the tracked state.
    pub fn handle_event(&mut self, event: &KeyEvent) -> bool {
        let PhysicalKey::Code(code) = event.physical_key else {
            return false;
        };
        self.set(code, event.state == ElementState::Pressed)
    }

    pub fn set(&mut self, key: KeyCode, down: bool) -> bool {
        if down {
            self.down.insert(key)
        } else {
            self.down.remove(&key)
        }
    }

    /// Forget every key, e.g. when the window loses focus and release events
    /// will not arrive.
    pub fn clear(&mut self) {
        self.down.clear();
    }
}

impl KeyStateSource for KeyboardState {
    fn is_down(&self, key: KeyCode) -> bool {
        self.down.contains(&key)
    }
}

/// Maps the current key state to demo actions.
#[derive(Debug, Default)]
pub struct InputHandler {
    trigger: ReloadTrigger,
    reload_was_down: bool,
}

impl InputHandler {
    pub fn new(trigger: ReloadTrigger) -> Self {
        Self {
            trigger,
            reload_was_down: false,
        }
    }

    /// Samples `keys` once and issues the matching actions on `control`.
    pub fn poll<K, C>(&mut self, keys: &K, control: &mut C)
    where
        K: KeyStateSource + ?Sized,
        C: FrameControl + ?Sized,
    {
        if keys.is_down(CLOSE_KEY) {
            control.request_close();
        }

        let reload_down = keys.is_down(RELOAD_KEY);
        let fire = match self.trigger {
            ReloadTrigger::Held => reload_down,
            ReloadTrigger::Press => reload_down && !self.reload_was_down,
        };
        self.reload_was_down = reload_down;

        if fire {
            control.reload_program();
        }
    }
}

/// Drawable region of the surface in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    /// Covers the whole surface; no aspect correction.
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Keys(HashSet<KeyCode>);

    impl Keys {
        fn with(keys: &[KeyCode]) -> Self {
            Self(keys.iter().copied().collect())
        }
    }

    impl KeyStateSource for Keys {
        fn is_down(&self, key: KeyCode) -> bool {
            self.0.contains(&key)
        }
    }

    #[derive(Default)]
    struct Recorder {
        closes: usize,
        reloads: usize,
    }

    impl FrameControl for Recorder {
        fn request_close(&mut self) {
            self.closes += 1;
        }

        fn reload_program(&mut self) {
            self.reloads += 1;
        }
    }

    #[test]
    fn escape_requests_close() {
        let mut handler = InputHandler::default();
        let mut recorder = Recorder::default();
        handler.poll(&Keys::with(&[KeyCode::Escape]), &mut recorder);
        assert_eq!(recorder.closes, 1);
        assert_eq!(recorder.reloads, 0);
    }

    #[test]
    fn held_space_reloads_every_poll() {
        let mut handler = InputHandler::new(ReloadTrigger::Held);
        let mut recorder = Recorder::default();
        let keys = Keys::with(&[KeyCode::Space]);
        for _ in 0..3 {
            handler.poll(&keys, &mut recorder);
        }
        assert_eq!(recorder.reloads, 3);
        assert_eq!(recorder.closes, 0);
    }

    #[test]
    fn press_trigger_fires_once_per_press() {
        let mut handler = InputHandler::new(ReloadTrigger::Press);
        let mut recorder = Recorder::default();
        let held = Keys::with(&[KeyCode::Space]);
        let released = Keys::default();

        handler.poll(&held, &mut recorder);
        handler.poll(&held, &mut recorder);
        assert_eq!(recorder.reloads, 1);

        handler.poll(&released, &mut recorder);
        handler.poll(&held, &mut recorder);
        assert_eq!(recorder.reloads, 2);
    }

    #[test]
    fn idle_keyboard_does_nothing() {
        let mut handler = InputHandler::default();
        let mut recorder = Recorder::default();
        handler.poll(&Keys::with(&[KeyCode::KeyA]), &mut recorder);
        assert_eq!((recorder.closes, recorder.reloads), (0, 0));
    }

    #[test]
    fn keyboard_state_tracks_presses_and_clears() {
        let mut keyboard = KeyboardState::default();
        assert!(keyboard.set(KeyCode::Space, true));
        assert!(!keyboard.set(KeyCode::Space, true));
        assert!(keyboard.is_down(KeyCode::Space));
        keyboard.clear();
        assert!(!keyboard.is_down(KeyCode::Space));
    }

    #[test]
    fn viewport_matches_new_size_exactly() {
        let viewport = Viewport::from_size(1024, 300);
        assert_eq!(
            viewport,
            Viewport {
                x: 0,
                y: 0,
                width: 1024,
                height: 300
            }
        );
        assert!(Viewport::from_size(0, 480).is_empty());
    }
}
