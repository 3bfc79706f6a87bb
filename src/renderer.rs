//! gfx-hal implementation of `Canvas`.
//!
//! Every scene's geometry, texture and pipeline are built once in
//! `Renderer::new`; `render` only records one command buffer per frame and
//! presents it. Losing the swapchain costs frames, never the process.

use gfx_hal::{
    adapter, buffer as b, command, format as f, image as i, pass, pool,
    prelude::*,
    pso,
    queue::{QueueGroup, Submission},
    window, Backend, IndexType, Limits,
};

use log::{debug, error, info, warn};
use std::borrow::Borrow;
use std::fmt;
use std::iter;
use std::mem::ManuallyDrop;
use std::ptr;

mod buffer;
mod descriptor_set;
mod memory;
mod pipeline;
mod swapchain;
mod texture;

pub use memory::UploadError;

use descriptor_set::DescriptorSet;
use memory::Memory;
use pipeline::Pipeline;
use swapchain::Swapchain;
use texture::Texture;

use crate::app::{Canvas, Frame};
use crate::assets::{Assets, PreparedScene};
use crate::scene::SceneIndex;

#[derive(Debug)]
pub enum RenderError {
    Upload {
        scene: SceneIndex,
        source: UploadError,
    },
    Swapchain(String),
    Device(String),
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::Upload { scene, source } => write!(f, "scene {} upload: {}", scene, source),
            RenderError::Swapchain(e) => write!(f, "swapchain: {}", e),
            RenderError::Device(e) => write!(f, "device: {}", e),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RenderError::Upload { source, .. } => Some(source),
            _ => None,
        }
    }
}

fn device_error<E: fmt::Debug>(what: &str) -> impl FnOnce(E) -> RenderError + '_ {
    move |err| RenderError::Device(format!("{}: {:?}", what, err))
}

/// Sampled texture and the descriptor set pointing at it.
struct TextureBinding<'a, B: Backend> {
    descriptors: DescriptorSet<'a, B>,
    texture: Texture<'a, B>,
}

/// GPU resources owned by one scene. `pipeline` is `None` when the program
/// failed to assemble or build; the scene then only clears.
struct SceneResources<'a, B: Backend> {
    pipeline: Option<Pipeline<'a, B>>,
    binding: Option<TextureBinding<'a, B>>,
    vertices: Memory<'a, B>,
    indices: Option<Memory<'a, B>>,
    draw_count: u32,
}

pub struct Renderer<'a, B: Backend> {
    frame: usize,
    device: &'a B::Device,
    queue_group: QueueGroup<B>,
    frames_in_flight: usize,
    command_pools: Vec<B::CommandPool>,
    command_buffers: Vec<B::CommandBuffer>,
    submission_complete_semaphores: Vec<B::Semaphore>,
    submission_complete_fences: Vec<B::Fence>,
    framebuffers: Vec<Option<B::Framebuffer>>,
    scenes: Vec<SceneResources<'a, B>>,
    swapchain: ManuallyDrop<Swapchain<'a, B>>,
    render_pass: ManuallyDrop<B::RenderPass>,
}

impl<'a, B> Renderer<'a, B>
where
    B: Backend,
{
    /// Builds the swapchain, per-frame objects and every scene's GPU
    /// resources. The renderer is assembled before anything fallible runs
    /// past the render pass, so an error drops it and its `Drop` releases
    /// whatever was already created.
    pub fn new(
        surface: &'a mut B::Surface,
        adapter: &'a adapter::Adapter<B>,
        device: &'a B::Device,
        queue_group: QueueGroup<B>,
        init_dims: window::Extent2D,
        assets: &Assets,
        frames_in_flight: usize,
    ) -> Result<Self, RenderError> {
        let swapchain = Swapchain::new(device, surface, adapter, init_dims)?;
        let render_pass = Self::create_render_pass(device, swapchain.format)?;

        let frames_in_flight = frames_in_flight.max(1);
        let mut renderer = Renderer {
            frame: 0,
            device,
            queue_group,
            frames_in_flight,
            command_pools: Vec::with_capacity(frames_in_flight),
            command_buffers: Vec::with_capacity(frames_in_flight),
            submission_complete_semaphores: Vec::with_capacity(frames_in_flight),
            submission_complete_fences: Vec::with_capacity(frames_in_flight),
            framebuffers: (0..frames_in_flight).map(|_| None).collect(),
            scenes: Vec::new(),
            swapchain: ManuallyDrop::new(swapchain),
            render_pass,
        };

        renderer.create_frame_objects()?;

        let memory_types = adapter.physical_device.memory_properties().memory_types;
        let limits = adapter.physical_device.limits();
        for prepared in assets.iter() {
            let resources = renderer.load_scene(prepared, &memory_types, &limits)?;
            renderer.scenes.push(resources);
        }
        info!(
            "{} scenes on the GPU, {} drawable",
            renderer.scenes.len(),
            renderer.scenes.iter().filter(|s| s.pipeline.is_some()).count()
        );

        Ok(renderer)
    }

    fn create_frame_objects(&mut self) -> Result<(), RenderError> {
        let device = self.device;
        for _ in 0..self.frames_in_flight {
            let mut pool = unsafe {
                device.create_command_pool(
                    self.queue_group.family,
                    pool::CommandPoolCreateFlags::empty(),
                )
            }
            .map_err(device_error("command pool"))?;
            self.command_buffers
                .push(unsafe { pool.allocate_one(command::Level::Primary) });
            self.command_pools.push(pool);
            self.submission_complete_semaphores
                .push(device.create_semaphore().map_err(device_error("semaphore"))?);
            self.submission_complete_fences
                .push(device.create_fence(true).map_err(device_error("fence"))?);
        }
        Ok(())
    }

    /// Uploads one scene. Geometry and texture upload failures are fatal;
    /// a pipeline that cannot be built only makes the scene undrawable.
    fn load_scene(
        &mut self,
        prepared: &PreparedScene,
        memory_types: &[adapter::MemoryType],
        limits: &Limits,
    ) -> Result<SceneResources<'a, B>, RenderError> {
        let device = self.device;
        let scene = prepared.scene;
        let upload = |source| RenderError::Upload { scene, source };
        let data = &prepared.data;

        let vertices = Memory::upload(device, &data.bytes, b::Usage::VERTEX, memory_types, limits)
            .map_err(upload)?;
        let indices = if data.is_indexed() {
            Some(
                Memory::upload(device, data.index_bytes(), b::Usage::INDEX, memory_types, limits)
                    .map_err(upload)?,
            )
        } else {
            None
        };

        let binding = match &prepared.texture {
            Some(pixels) => {
                let texture = Texture::upload(
                    device,
                    pixels,
                    memory_types,
                    limits,
                    &mut self.command_pools[0],
                    &mut self.queue_group.queues[0],
                )
                .map_err(upload)?;
                let mut descriptors = DescriptorSet::new(device)?;
                descriptors.write_texture(&*texture.view, &*texture.sampler);
                Some(TextureBinding {
                    descriptors,
                    texture,
                })
            }
            None => None,
        };

        let pipeline = match &prepared.program {
            Some(program) => {
                let set_layout = binding.as_ref().map(|bound| &*bound.descriptors.set_layout);
                match Pipeline::new(device, program, data.layout, set_layout, &*self.render_pass) {
                    Ok(pipeline) => Some(pipeline),
                    Err(err) => {
                        error!("scene {}: {}", scene, err);
                        None
                    }
                }
            }
            None => None,
        };

        Ok(SceneResources {
            pipeline,
            binding,
            vertices,
            indices,
            draw_count: data.vertex_count,
        })
    }

    fn create_render_pass(
        device: &B::Device,
        format: f::Format,
    ) -> Result<ManuallyDrop<B::RenderPass>, RenderError> {
        let attachment = pass::Attachment {
            format: Some(format),
            samples: 1,
            ops: pass::AttachmentOps::new(
                pass::AttachmentLoadOp::Clear,
                pass::AttachmentStoreOp::Store,
            ),
            stencil_ops: pass::AttachmentOps::DONT_CARE,
            layouts: i::Layout::Undefined..i::Layout::Present,
        };

        let subpass = pass::SubpassDesc {
            colors: &[(0, i::Layout::ColorAttachmentOptimal)],
            depth_stencil: None,
            inputs: &[],
            resolves: &[],
            preserves: &[],
        };

        unsafe { device.create_render_pass(&[attachment], &[subpass], &[]) }
            .map(ManuallyDrop::new)
            .map_err(device_error("render pass"))
    }

    /// Brings a stale swapchain back. `false` means this frame is skipped:
    /// the surface has no area or rebuilding failed and will be retried.
    fn ensure_swapchain(&mut self) -> bool {
        if !self.swapchain.is_stale() {
            return true;
        }
        match self.swapchain.configure() {
            Ok(ready) => ready,
            Err(err) => {
                warn!("skipping frame, cannot rebuild swapchain: {}", err);
                false
            }
        }
    }

    fn draw(&mut self, frame: &Frame) -> Result<(), RenderError> {
        if !self.ensure_swapchain() {
            return Ok(());
        }

        let surface_image = unsafe {
            match self.swapchain.surface.acquire_image(!0) {
                Ok((image, _)) => image,
                Err(err) => {
                    debug!("acquire failed ({:?}), rebuilding swapchain next frame", err);
                    self.swapchain.invalidate();
                    return Ok(());
                }
            }
        };

        let frame_idx = self.frame % self.frames_in_flight;

        unsafe {
            let fence = &self.submission_complete_fences[frame_idx];
            self.device
                .wait_for_fence(fence, !0)
                .map_err(device_error("wait for fence"))?;
            self.device
                .reset_fence(fence)
                .map_err(device_error("reset fence"))?;
            if let Some(old) = self.framebuffers[frame_idx].take() {
                self.device.destroy_framebuffer(old);
            }
            self.command_pools[frame_idx].reset(false);
        }

        let extent = self.swapchain.extent;
        let framebuffer = unsafe {
            self.device.create_framebuffer(
                &self.render_pass,
                iter::once(surface_image.borrow()),
                i::Extent {
                    width: extent.width,
                    height: extent.height,
                    depth: 1,
                },
            )
        }
        .map_err(device_error("framebuffer"))?;

        let resources = &self.scenes[frame.scene.get()];
        let cmd_buffer = &mut self.command_buffers[frame_idx];
        unsafe {
            cmd_buffer.begin_primary(command::CommandBufferFlags::ONE_TIME_SUBMIT);
            cmd_buffer.set_viewports(0, &[self.swapchain.viewport.clone()]);
            cmd_buffer.set_scissors(0, &[self.swapchain.viewport.rect]);
            cmd_buffer.begin_render_pass(
                &self.render_pass,
                &framebuffer,
                self.swapchain.viewport.rect,
                &[command::ClearValue {
                    color: command::ClearColor {
                        float32: frame.clear,
                    },
                }],
                command::SubpassContents::Inline,
            );
            match &resources.pipeline {
                Some(pipeline) if frame.drawable => {
                    let tint: [u32; 4] = bytemuck::cast(frame.color);
                    cmd_buffer.bind_graphics_pipeline(&pipeline.pipeline);
                    if let Some(binding) = &resources.binding {
                        cmd_buffer.bind_graphics_descriptor_sets(
                            &pipeline.pipeline_layout,
                            0,
                            iter::once(&binding.descriptors.set),
                            &[],
                        );
                    }
                    cmd_buffer.push_graphics_constants(
                        &pipeline.pipeline_layout,
                        pso::ShaderStageFlags::FRAGMENT,
                        0,
                        &tint,
                    );
                    cmd_buffer.bind_vertex_buffers(
                        0,
                        iter::once((&*resources.vertices.buffer.buf, b::SubRange::WHOLE)),
                    );
                    let count = frame.vertex_count.min(resources.draw_count);
                    match &resources.indices {
                        Some(indices) => {
                            cmd_buffer.bind_index_buffer(b::IndexBufferView {
                                buffer: &*indices.buffer.buf,
                                range: b::SubRange::WHOLE,
                                index_type: IndexType::U32,
                            });
                            cmd_buffer.draw_indexed(0..count, 0, 0..1);
                        }
                        None => cmd_buffer.draw(0..count, 0..1),
                    }
                }
                _ => {}
            }
            cmd_buffer.end_render_pass();
            cmd_buffer.finish();

            let submission = Submission {
                command_buffers: iter::once(&*cmd_buffer),
                wait_semaphores: None,
                signal_semaphores: iter::once(&self.submission_complete_semaphores[frame_idx]),
            };

            let queue = &mut self.queue_group.queues[0];
            queue.submit(
                submission,
                Some(&self.submission_complete_fences[frame_idx]),
            );

            let result = queue.present_surface(
                &mut *self.swapchain.surface,
                surface_image,
                Some(&self.submission_complete_semaphores[frame_idx]),
            );

            if let Err(err) = result {
                debug!("present failed ({:?}), rebuilding swapchain next frame", err);
                self.swapchain.invalidate();
            }
        }

        self.framebuffers[frame_idx] = Some(framebuffer);
        self.frame += 1;
        Ok(())
    }
}

impl<'a, B: Backend> Canvas for Renderer<'a, B> {
    type Error = RenderError;

    fn resize(&mut self, width: u32, height: u32) {
        self.swapchain.resize(window::Extent2D { width, height });
    }

    fn render(&mut self, frame: &Frame) -> Result<(), RenderError> {
        self.draw(frame)
    }
}

impl<'a, B: Backend> Drop for Renderer<'a, B> {
    fn drop(&mut self) {
        let device = self.device;
        if let Err(err) = device.wait_idle() {
            warn!("wait_idle failed during teardown: {:?}", err);
        }
        unsafe {
            for fb in self.framebuffers.drain(..).flatten() {
                device.destroy_framebuffer(fb);
            }
            self.command_buffers.clear();
            for pool in self.command_pools.drain(..) {
                device.destroy_command_pool(pool);
            }
            for s in self.submission_complete_semaphores.drain(..) {
                device.destroy_semaphore(s);
            }
            for f in self.submission_complete_fences.drain(..) {
                device.destroy_fence(f);
            }

            self.scenes.clear();
            device.destroy_render_pass(ManuallyDrop::into_inner(ptr::read(&self.render_pass)));
            ManuallyDrop::drop(&mut self.swapchain);
        }
    }
}
