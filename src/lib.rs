//! Three switchable scenes drawn through gfx-hal: flat-colour shapes, with
//! an optional textured quad in place of the rectangle.
//!
//! The GPU-free half of the crate (scene selection, shape table, shader
//! assembly, texture decoding, frame loop) is usable on its own;
//! `renderer` and `platform` plug it into a real window and device.

pub mod app;
pub mod assets;
pub mod config;
pub mod input;
pub mod logging;
pub mod platform;
pub mod renderer;
pub mod scene;
pub mod shader;
pub mod shape;
pub mod texture;

pub use app::{launch, run_frames, AppState, Canvas, Frame, Platform};
pub use config::Config;
pub use scene::SceneIndex;
