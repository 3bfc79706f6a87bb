//! Application state and the frame loop.
//!
//! The loop only talks to a `Platform` (window + event source) and a
//! `Canvas` (whatever turns a `Frame` into pixels), so it runs the same
//! against winit/gfx-hal and against test doubles.

use std::fmt;
use std::time::Instant;

use fps_counter::FPSCounter;
use log::{debug, error, info, trace};

use crate::input::{handle_key, InputEvent};
use crate::scene::{pulse, SceneIndex};
use crate::assets::Assets;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = -1;

/// Window and event source.
pub trait Platform {
    fn should_close(&self) -> bool;
    fn request_close(&mut self);
    /// Drains everything that arrived since the last call.
    fn poll_events(&mut self) -> Vec<InputEvent>;
}

/// Draw target. `render` clears, draws and presents one frame.
pub trait Canvas {
    type Error: fmt::Display;

    fn resize(&mut self, width: u32, height: u32);
    fn render(&mut self, frame: &Frame) -> Result<(), Self::Error>;
}

/// Everything needed to draw one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub scene: SceneIndex,
    pub clear: [f32; 4],
    pub color: [f32; 4],
    pub vertex_count: u32,
    /// False when the scene's program failed; only the clear happens.
    pub drawable: bool,
}

#[derive(Debug)]
pub struct AppState {
    scene: SceneIndex,
    pulse: bool,
    started: Instant,
}

impl AppState {
    pub fn new(pulse: bool) -> Self {
        AppState {
            scene: SceneIndex::FIRST,
            pulse,
            started: Instant::now(),
        }
    }

    pub fn with_scene(mut self, scene: SceneIndex) -> Self {
        self.scene = scene;
        self
    }

    pub fn scene(&self) -> SceneIndex {
        self.scene
    }

    pub fn frame(&self, assets: &Assets) -> Frame {
        let prepared = assets.get(self.scene);
        let color = if self.pulse {
            pulse(self.started.elapsed())
        } else {
            let [r, g, b] = prepared.color;
            [r, g, b, 1.0]
        };
        Frame {
            scene: self.scene,
            clear: self.scene.background(),
            color,
            vertex_count: prepared.data.vertex_count,
            drawable: prepared.drawable(),
        }
    }

    /// Applies one input event. Scene keys move the selection, close
    /// requests go to the platform and resizes to the canvas.
    pub fn handle_event<P, C>(&mut self, event: InputEvent, platform: &mut P, canvas: &mut C)
    where
        P: Platform,
        C: Canvas,
    {
        match event {
            InputEvent::Key { key, action, .. } => {
                let transition = handle_key(self.scene, key, action);
                if transition.scene != self.scene {
                    info!("scene {}", transition.scene);
                } else {
                    debug!("key {:?} {:?} leaves scene {}", key, action, self.scene);
                }
                self.scene = transition.scene;
                if transition.close {
                    platform.request_close();
                }
            }
            InputEvent::Resized { width, height } => {
                if width > 0 && height > 0 {
                    canvas.resize(width, height);
                }
            }
            InputEvent::CloseRequested => platform.request_close(),
        }
    }
}

/// Runs until the platform reports it should close. Returns the number of
/// frames presented.
pub fn run_frames<P, C>(
    platform: &mut P,
    canvas: &mut C,
    state: &mut AppState,
    assets: &Assets,
) -> Result<u64, C::Error>
where
    P: Platform,
    C: Canvas,
{
    let mut fps = FPSCounter::new();
    let mut frames = 0;

    while !platform.should_close() {
        let frame = state.frame(assets);
        canvas.render(&frame)?;
        frames += 1;
        trace!("fps: {}", fps.tick());

        for event in platform.poll_events() {
            state.handle_event(event, platform, canvas);
        }
    }

    info!("closing after {} frames", frames);
    Ok(frames)
}

/// Opens the platform and hands it to `drive`. Returns the process exit
/// code: `EXIT_FAILURE` if either step fails, `EXIT_OK` otherwise.
pub fn launch<P, O, D, E1, E2>(open: O, drive: D) -> i32
where
    O: FnOnce() -> Result<P, E1>,
    D: FnOnce(&mut P) -> Result<(), E2>,
    E1: fmt::Display,
    E2: fmt::Display,
{
    let mut platform = match open() {
        Ok(platform) => platform,
        Err(err) => {
            error!("failed to create window: {:#}", err);
            return EXIT_FAILURE;
        }
    };

    match drive(&mut platform) {
        Ok(()) => EXIT_OK,
        Err(err) => {
            error!("{:#}", err);
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{Key, KeyAction, Modifiers};
    use crate::shader::ShaderRef;
    use crate::shape::SceneTable;

    #[derive(Default)]
    struct NullCanvas {
        sizes: Vec<(u32, u32)>,
    }

    impl Canvas for NullCanvas {
        type Error = String;

        fn resize(&mut self, width: u32, height: u32) {
            self.sizes.push((width, height));
        }

        fn render(&mut self, _frame: &Frame) -> Result<(), String> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Flag {
        closed: bool,
    }

    impl Platform for Flag {
        fn should_close(&self) -> bool {
            self.closed
        }
        fn request_close(&mut self) {
            self.closed = true;
        }
        fn poll_events(&mut self) -> Vec<InputEvent> {
            Vec::new()
        }
    }

    fn press(key: Key) -> InputEvent {
        InputEvent::Key {
            key,
            scancode: 0,
            action: KeyAction::Press,
            modifiers: Modifiers::default(),
        }
    }

    #[test]
    fn frame_uses_shape_and_background() {
        let assets = Assets::prepare(&SceneTable::builtin(ShaderRef::Embedded, None)).unwrap();
        let state = AppState::new(false).with_scene(SceneIndex::LAST);
        let frame = state.frame(&assets);
        assert_eq!(frame.clear, [0.0, 1.0, 0.655, 1.0]);
        assert_eq!(frame.color, [0.0, 0.0, 0.98, 1.0]);
        assert_eq!(frame.vertex_count, 9);
        assert!(frame.drawable);
    }

    #[test]
    fn escape_closes_the_platform() {
        let mut state = AppState::new(false);
        let mut platform = Flag::default();
        let mut canvas = NullCanvas::default();
        state.handle_event(press(Key::Escape), &mut platform, &mut canvas);
        assert!(platform.closed);
        assert_eq!(state.scene(), SceneIndex::FIRST);
    }

    #[test]
    fn zero_sized_resize_is_ignored() {
        let mut state = AppState::new(false);
        let mut platform = Flag::default();
        let mut canvas = NullCanvas::default();
        let resize = |width, height| InputEvent::Resized { width, height };
        state.handle_event(resize(0, 0), &mut platform, &mut canvas);
        state.handle_event(resize(640, 480), &mut platform, &mut canvas);
        assert_eq!(canvas.sizes, vec![(640, 480)]);
    }

    #[test]
    fn launch_reports_open_failure() {
        let code = launch(|| Err::<Flag, _>("no display"), |_: &mut Flag| Ok::<(), String>(()));
        assert_eq!(code, EXIT_FAILURE);
    }

    #[test]
    fn launch_reports_drive_failure() {
        let code = launch(|| Ok::<_, String>(Flag::default()), |_| Err("device lost"));
        assert_eq!(code, EXIT_FAILURE);
    }

    #[test]
    fn launch_succeeds() {
        let code = launch(|| Ok::<_, String>(Flag::default()), |_| Ok::<(), String>(()));
        assert_eq!(code, EXIT_OK);
    }
}
