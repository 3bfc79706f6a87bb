#[cfg(feature = "metal")]
use gfx_backend_metal as back;

#[cfg(feature = "vulkan")]
use gfx_backend_vulkan as back;

use anyhow::{anyhow, Context};
use gfx_hal::{prelude::*, window, Backend, Features};
use log::{error, info};

use shape_scenes::assets::Assets;
use shape_scenes::config::Config;
use shape_scenes::logging::{init_logging, LoggingConfig};
use shape_scenes::platform::WinitPlatform;
use shape_scenes::renderer::Renderer;
use shape_scenes::shader::ShaderRef;
use shape_scenes::shape::SceneTable;
use shape_scenes::{app, AppState};

const APP_NAME: &str = "shape-scenes";

type BackendSurface = <back::Backend as Backend>::Surface;

fn main() {
    let config = Config::from_env();
    init_logging(&LoggingConfig {
        filter: config.as_ref().ok().and_then(|c| c.log_filter.clone()),
    });

    let config = match config {
        Ok(config) => config,
        Err(err) => {
            error!("bad configuration: {}", err);
            std::process::exit(app::EXIT_FAILURE);
        }
    };

    let code = app::launch(
        || WinitPlatform::open(&config),
        |platform| run(platform, &config),
    );
    std::process::exit(code);
}

fn run(platform: &mut WinitPlatform, config: &Config) -> anyhow::Result<()> {
    let instance = back::Instance::create(APP_NAME, 1)
        .map_err(|_| anyhow!("graphics backend is not supported on this system"))?;
    let mut surface = unsafe { instance.create_surface(platform.window()) }
        .map_err(|err| anyhow!("cannot create surface: {:?}", err))?;

    let result = drive(&instance, &mut surface, platform, config);

    unsafe {
        instance.destroy_surface(surface);
    }
    result
}

fn drive(
    instance: &back::Instance,
    surface: &mut BackendSurface,
    platform: &mut WinitPlatform,
    config: &Config,
) -> anyhow::Result<()> {
    let mut adapters = instance.enumerate_adapters();
    if adapters.is_empty() {
        return Err(anyhow!("no graphics adapter found"));
    }
    let adapter = adapters.remove(0);
    info!("using adapter {}", adapter.info.name);

    let family = adapter
        .queue_families
        .iter()
        .find(|family| {
            surface.supports_queue_family(family) && family.queue_type().supports_graphics()
        })
        .ok_or_else(|| anyhow!("no queue family can draw to the window"))?;
    let mut gpu = unsafe {
        adapter
            .physical_device
            .open(&[(family, &[1.0])], Features::empty())
    }
    .map_err(|err| anyhow!("cannot open device: {:?}", err))?;

    let queue_group = gpu
        .queue_groups
        .pop()
        .ok_or_else(|| anyhow!("device has no queues"))?;
    let device = gpu.device;

    let table = SceneTable::builtin(
        ShaderRef::from_dir(config.shader_dir.as_deref()),
        config.texture_source(),
    );
    let assets = Assets::prepare(&table).context("cannot load scenes")?;

    let (width, height) = platform.inner_size();
    let mut renderer = Renderer::new(
        surface,
        &adapter,
        &device,
        queue_group,
        window::Extent2D { width, height },
        &assets,
        config.frames_in_flight,
    )
    .context("cannot set up renderer")?;

    let mut state = AppState::new(config.pulse);
    app::run_frames(platform, &mut renderer, &mut state, &assets).context("rendering stopped")?;
    Ok(())
}
