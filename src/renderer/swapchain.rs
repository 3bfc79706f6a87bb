//! Surface configuration. The swapchain is only marked stale when it
//! needs rebuilding; the next frame rebuilds it, and skips drawing while
//! the surface has no area.

use gfx_hal::{adapter::Adapter, format as f, prelude::*, pso, window, Backend};
use log::debug;

use super::RenderError;

const FALLBACK_FORMAT: f::Format = f::Format::Rgba8Srgb;

/// First sRGB format the surface offers, else its first format, else
/// `Rgba8Srgb` when the surface has no preference or lists nothing.
pub fn pick_format(formats: Option<Vec<f::Format>>) -> f::Format {
    let formats = formats.unwrap_or_default();
    formats
        .iter()
        .find(|format| format.base_format().1 == f::ChannelType::Srgb)
        .or_else(|| formats.first())
        .copied()
        .unwrap_or(FALLBACK_FORMAT)
}

/// The extent to configure for, or `None` while the surface (or, if the
/// surface leaves it to us, the requested size) is zero in either axis.
pub fn usable_extent(
    current: Option<window::Extent2D>,
    requested: window::Extent2D,
) -> Option<window::Extent2D> {
    let extent = current.unwrap_or(requested);
    if extent.width == 0 || extent.height == 0 {
        None
    } else {
        Some(extent)
    }
}

pub struct Swapchain<'a, B: Backend> {
    device: &'a B::Device,
    adapter: &'a Adapter<B>,
    pub surface: &'a mut B::Surface,
    pub format: f::Format,
    /// Window size last reported; the surface may clamp it.
    requested: window::Extent2D,
    pub extent: window::Extent2D,
    pub viewport: pso::Viewport,
    stale: bool,
}

impl<'a, B: Backend> Swapchain<'a, B> {
    /// Picks a format and configures the surface. A zero-sized window
    /// leaves the swapchain stale instead of failing.
    pub fn new(
        device: &'a B::Device,
        surface: &'a mut B::Surface,
        adapter: &'a Adapter<B>,
        requested: window::Extent2D,
    ) -> Result<Self, RenderError> {
        let format = pick_format(surface.supported_formats(&adapter.physical_device));
        debug!("surface format {:?}", format);

        let mut swapchain = Swapchain {
            device,
            adapter,
            surface,
            format,
            requested,
            extent: requested,
            viewport: viewport_for(requested),
            stale: true,
        };
        swapchain.configure()?;
        Ok(swapchain)
    }

    pub fn is_stale(&self) -> bool {
        self.stale
    }

    /// Marks the swapchain for rebuilding at the next frame.
    pub fn invalidate(&mut self) {
        self.stale = true;
    }

    pub fn resize(&mut self, requested: window::Extent2D) {
        self.requested = requested;
        self.invalidate();
    }

    /// Rebuilds the swapchain for the current surface size. `Ok(false)`
    /// means the surface has no area yet and the swapchain stays stale.
    pub fn configure(&mut self) -> Result<bool, RenderError> {
        let caps = self.surface.capabilities(&self.adapter.physical_device);
        let extent = match usable_extent(caps.current_extent, self.requested) {
            Some(extent) => extent,
            None => {
                debug!("surface has no area, swapchain left stale");
                self.stale = true;
                return Ok(false);
            }
        };

        let mut config = window::SwapchainConfig::from_caps(&caps, self.format, extent);
        config.present_mode = window::PresentMode::FIFO;
        let configured = config.extent;
        unsafe { self.surface.configure_swapchain(self.device, config) }
            .map_err(|err| RenderError::Swapchain(format!("{:?}", err)))?;

        debug!("swapchain {}x{}", configured.width, configured.height);
        self.extent = configured;
        self.viewport = viewport_for(configured);
        self.stale = false;
        Ok(true)
    }
}

fn viewport_for(extent: window::Extent2D) -> pso::Viewport {
    pso::Viewport {
        rect: pso::Rect {
            x: 0,
            y: 0,
            w: extent.width as _,
            h: extent.height as _,
        },
        depth: 0.0..1.0,
    }
}

impl<'a, B: Backend> Drop for Swapchain<'a, B> {
    fn drop(&mut self) {
        unsafe { self.surface.unconfigure_swapchain(self.device) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> window::Extent2D {
        window::Extent2D { width, height }
    }

    #[test]
    fn srgb_format_is_preferred() {
        let formats = vec![f::Format::Bgra8Unorm, f::Format::Bgra8Srgb];
        assert_eq!(pick_format(Some(formats)), f::Format::Bgra8Srgb);
    }

    #[test]
    fn first_format_when_none_is_srgb() {
        let formats = vec![f::Format::Bgra8Unorm, f::Format::Rgba8Unorm];
        assert_eq!(pick_format(Some(formats)), f::Format::Bgra8Unorm);
    }

    #[test]
    fn empty_or_missing_list_falls_back() {
        assert_eq!(pick_format(Some(Vec::new())), f::Format::Rgba8Srgb);
        assert_eq!(pick_format(None), f::Format::Rgba8Srgb);
    }

    #[test]
    fn minimised_surface_has_no_usable_extent() {
        assert_eq!(usable_extent(Some(extent(0, 0)), extent(800, 600)), None);
        assert_eq!(usable_extent(Some(extent(800, 0)), extent(800, 600)), None);
        assert_eq!(usable_extent(None, extent(0, 600)), None);
    }

    #[test]
    fn surface_extent_wins_over_request() {
        assert_eq!(
            usable_extent(Some(extent(1024, 768)), extent(800, 600)),
            Some(extent(1024, 768))
        );
        assert_eq!(usable_extent(None, extent(800, 600)), Some(extent(800, 600)));
    }
}
