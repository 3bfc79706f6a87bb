//! winit-backed `Platform`.
//!
//! winit drives its own loop; `poll_events` pumps it with `run_return` until
//! the queue is empty so the frame loop can pull events once per iteration.

use std::fmt;

use winit::dpi::{PhysicalSize, Size};
use log::debug;
use winit::event::{ElementState, Event, KeyboardInput, VirtualKeyCode, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::platform::desktop::EventLoopExtDesktop;
use winit::window::{Window, WindowBuilder};

use crate::app::Platform;
use crate::config::Config;
use crate::input::{InputEvent, Key, KeyTracker, Modifiers};

#[derive(Debug)]
pub struct ContextError(String);

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cannot create window: {}", self.0)
    }
}

impl std::error::Error for ContextError {}

pub struct WinitPlatform {
    event_loop: EventLoop<()>,
    window: Window,
    keys: KeyTracker,
    close_requested: bool,
}

impl WinitPlatform {
    pub fn open(config: &Config) -> Result<Self, ContextError> {
        let event_loop = EventLoop::new();
        let window = WindowBuilder::new()
            .with_title(config.title.as_str())
            .with_inner_size(Size::Physical(PhysicalSize::new(config.width, config.height)))
            .with_min_inner_size(Size::Physical(PhysicalSize::new(64, 64)))
            .build(&event_loop)
            .map_err(|err| ContextError(err.to_string()))?;

        Ok(WinitPlatform {
            event_loop,
            window,
            keys: KeyTracker::default(),
            close_requested: false,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn inner_size(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }
}

impl Platform for WinitPlatform {
    fn should_close(&self) -> bool {
        self.close_requested
    }

    fn request_close(&mut self) {
        self.close_requested = true;
    }

    fn poll_events(&mut self) -> Vec<InputEvent> {
        let mut events = Vec::new();
        let keys = &mut self.keys;
        let pending = &mut events;

        self.event_loop.run_return(|event, _, control_flow| {
            *control_flow = ControlFlow::Poll;
            match event {
                Event::WindowEvent { event, .. } => {
                    if let Some(ev) = translate(event, keys) {
                        pending.push(ev);
                    }
                }
                Event::MainEventsCleared => *control_flow = ControlFlow::Exit,
                _ => {}
            }
        });

        events
    }
}

fn translate(event: WindowEvent, keys: &mut KeyTracker) -> Option<InputEvent> {
    match event {
        WindowEvent::CloseRequested => Some(InputEvent::CloseRequested),
        WindowEvent::Resized(size) => Some(InputEvent::Resized {
            width: size.width,
            height: size.height,
        }),
        WindowEvent::KeyboardInput { input, .. } => Some(translate_key(input, keys)),
        WindowEvent::Focused(false) => {
            debug!("focus lost, forgetting held keys");
            keys.clear();
            None
        }
        _ => None,
    }
}

#[allow(deprecated)]
fn translate_key(input: KeyboardInput, keys: &mut KeyTracker) -> InputEvent {
    let action = match input.state {
        ElementState::Pressed => keys.press(input.scancode),
        ElementState::Released => keys.release(input.scancode),
    };

    let key = match input.virtual_keycode {
        Some(VirtualKeyCode::Left) => Key::Left,
        Some(VirtualKeyCode::Right) => Key::Right,
        Some(VirtualKeyCode::Escape) => Key::Escape,
        Some(other) => Key::Other(other as u32),
        None => Key::Other(input.scancode),
    };

    let m = input.modifiers;
    InputEvent::Key {
        key,
        scancode: input.scancode,
        action,
        modifiers: Modifiers {
            shift: m.shift(),
            ctrl: m.ctrl(),
            alt: m.alt(),
            logo: m.logo(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::KeyAction;
    use winit::event::ModifiersState;

    const RIGHT: u32 = 106;

    #[allow(deprecated)]
    fn right(state: ElementState) -> KeyboardInput {
        KeyboardInput {
            scancode: RIGHT,
            state,
            virtual_keycode: Some(VirtualKeyCode::Right),
            modifiers: ModifiersState::empty(),
        }
    }

    fn action_of(event: InputEvent) -> KeyAction {
        match event {
            InputEvent::Key { key, action, .. } => {
                assert_eq!(key, Key::Right);
                action
            }
            other => panic!("expected a key event, got {:?}", other),
        }
    }

    #[test]
    fn first_press_is_a_press() {
        let mut keys = KeyTracker::default();
        let event = translate_key(right(ElementState::Pressed), &mut keys);
        assert_eq!(action_of(event), KeyAction::Press);
        assert!(keys.is_down(RIGHT));
    }

    #[test]
    fn held_press_is_a_repeat() {
        let mut keys = KeyTracker::default();
        translate_key(right(ElementState::Pressed), &mut keys);
        let event = translate_key(right(ElementState::Pressed), &mut keys);
        assert_eq!(action_of(event), KeyAction::Repeat);
    }

    #[test]
    fn release_frees_the_key() {
        let mut keys = KeyTracker::default();
        translate_key(right(ElementState::Pressed), &mut keys);
        let event = translate_key(right(ElementState::Released), &mut keys);
        assert_eq!(action_of(event), KeyAction::Release);
        let event = translate_key(right(ElementState::Pressed), &mut keys);
        assert_eq!(action_of(event), KeyAction::Press);
    }

    #[test]
    fn press_after_focus_loss_is_a_press() {
        let mut keys = KeyTracker::default();
        translate_key(right(ElementState::Pressed), &mut keys);

        // The release happens in another window and never arrives.
        assert_eq!(translate(WindowEvent::Focused(false), &mut keys), None);
        assert!(!keys.is_down(RIGHT));

        let event = translate_key(right(ElementState::Pressed), &mut keys);
        assert_eq!(action_of(event), KeyAction::Press);
    }

    #[test]
    fn modifiers_are_carried_over() {
        let mut keys = KeyTracker::default();
        #[allow(deprecated)]
        let input = KeyboardInput {
            modifiers: ModifiersState::SHIFT,
            ..right(ElementState::Pressed)
        };
        match translate_key(input, &mut keys) {
            InputEvent::Key { modifiers, .. } => {
                assert!(modifiers.shift);
                assert!(!modifiers.ctrl);
            }
            other => panic!("expected a key event, got {:?}", other),
        }
    }
}
