use gfx_hal::{
    adapter::MemoryType, buffer, command, format as f, image as i, memory as m, prelude::*,
    pso::PipelineStage, Backend, Limits,
};
use std::fmt;
use std::iter;
use std::mem::ManuallyDrop;
use std::ptr;

use super::memory::{memory_type, Memory, UploadError};
use crate::texture::{TextureImage, TEXEL_BYTES};

const FORMAT: f::Format = f::Format::Rgba8Srgb;

const COLOR_RANGE: i::SubresourceRange = i::SubresourceRange {
    aspects: f::Aspects::COLOR,
    levels: 0..1,
    layers: 0..1,
};

fn image_error<E: fmt::Debug>(what: &str) -> impl FnOnce(E) -> UploadError + '_ {
    move |err| UploadError::Image(format!("{}: {:?}", what, err))
}

/// Image plus the device-local memory bound to it.
struct ImageAllocation<'a, B: Backend> {
    device: &'a B::Device,
    image: ManuallyDrop<B::Image>,
    memory: ManuallyDrop<B::Memory>,
}

impl<'a, B: Backend> ImageAllocation<'a, B> {
    fn new(
        device: &'a B::Device,
        width: u32,
        height: u32,
        memory_types: &[MemoryType],
    ) -> Result<Self, UploadError> {
        let mut image = unsafe {
            device.create_image(
                i::Kind::D2(width, height, 1, 1),
                1,
                FORMAT,
                i::Tiling::Optimal,
                i::Usage::TRANSFER_DST | i::Usage::SAMPLED,
                i::ViewCapabilities::empty(),
            )
        }
        .map_err(image_error("create image"))?;

        let bound = unsafe {
            let req = device.get_image_requirements(&image);
            match memory_type(memory_types, &req, m::Properties::DEVICE_LOCAL) {
                None => Err(UploadError::NoDeviceLocalMemory),
                Some(type_id) => match device.allocate_memory(type_id, req.size) {
                    Err(err) => Err(UploadError::Allocation(format!("{:?}", err))),
                    Ok(memory) => match device.bind_image_memory(&memory, 0, &mut image) {
                        Ok(()) => Ok(memory),
                        Err(err) => {
                            device.free_memory(memory);
                            Err(UploadError::Bind(format!("{:?}", err)))
                        }
                    },
                },
            }
        };

        match bound {
            Ok(memory) => Ok(ImageAllocation {
                device,
                image: ManuallyDrop::new(image),
                memory: ManuallyDrop::new(memory),
            }),
            Err(err) => {
                unsafe { device.destroy_image(image) };
                Err(err)
            }
        }
    }

    /// Records and submits the staging copy, including the layout
    /// transitions into `ShaderReadOnlyOptimal`, then waits for it.
    fn copy_from(
        &self,
        staging: &Memory<'a, B>,
        pixels: &TextureImage,
        row_pitch: u32,
        command_pool: &mut B::CommandPool,
        queue: &mut B::CommandQueue,
    ) -> Result<(), UploadError> {
        let device = self.device;
        let fence = device.create_fence(false).map_err(image_error("copy fence"))?;

        unsafe {
            let mut cmd_buffer = command_pool.allocate_one(command::Level::Primary);
            cmd_buffer.begin_primary(command::CommandBufferFlags::ONE_TIME_SUBMIT);

            cmd_buffer.pipeline_barrier(
                PipelineStage::TOP_OF_PIPE..PipelineStage::TRANSFER,
                m::Dependencies::empty(),
                &[m::Barrier::Image {
                    states: (i::Access::empty(), i::Layout::Undefined)
                        ..(i::Access::TRANSFER_WRITE, i::Layout::TransferDstOptimal),
                    target: &*self.image,
                    families: None,
                    range: COLOR_RANGE.clone(),
                }],
            );
            cmd_buffer.copy_buffer_to_image(
                &staging.buffer.buf,
                &self.image,
                i::Layout::TransferDstOptimal,
                &[command::BufferImageCopy {
                    buffer_offset: 0,
                    buffer_width: row_pitch / TEXEL_BYTES,
                    buffer_height: pixels.height,
                    image_layers: i::SubresourceLayers {
                        aspects: f::Aspects::COLOR,
                        level: 0,
                        layers: 0..1,
                    },
                    image_offset: i::Offset { x: 0, y: 0, z: 0 },
                    image_extent: i::Extent {
                        width: pixels.width,
                        height: pixels.height,
                        depth: 1,
                    },
                }],
            );
            cmd_buffer.pipeline_barrier(
                PipelineStage::TRANSFER..PipelineStage::FRAGMENT_SHADER,
                m::Dependencies::empty(),
                &[m::Barrier::Image {
                    states: (i::Access::TRANSFER_WRITE, i::Layout::TransferDstOptimal)
                        ..(i::Access::SHADER_READ, i::Layout::ShaderReadOnlyOptimal),
                    target: &*self.image,
                    families: None,
                    range: COLOR_RANGE.clone(),
                }],
            );
            cmd_buffer.finish();

            queue.submit_without_semaphores(iter::once(&cmd_buffer), Some(&fence));
            let waited = device.wait_for_fence(&fence, !0);

            device.destroy_fence(fence);
            command_pool.free(iter::once(cmd_buffer));
            waited.map(|_| ()).map_err(image_error("wait for texture copy"))
        }
    }
}

impl<'a, B: Backend> Drop for ImageAllocation<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_image(ManuallyDrop::into_inner(ptr::read(&self.image)));
            self.device
                .free_memory(ManuallyDrop::into_inner(ptr::read(&self.memory)));
        }
    }
}

/// A sampled RGBA texture in device-local memory, with its view and a
/// repeating linear sampler.
pub struct Texture<'a, B: Backend> {
    pub view: ManuallyDrop<B::ImageView>,
    pub sampler: ManuallyDrop<B::Sampler>,
    allocation: ImageAllocation<'a, B>,
}

impl<'a, B: Backend> Texture<'a, B> {
    /// Creates the image and copies `pixels` into it through a staging
    /// buffer. Blocks until the copy has finished on `queue`.
    pub fn upload(
        device: &'a B::Device,
        pixels: &TextureImage,
        memory_types: &[MemoryType],
        limits: &Limits,
        command_pool: &mut B::CommandPool,
        queue: &mut B::CommandQueue,
    ) -> Result<Self, UploadError> {
        let pitch_alignment = limits.optimal_buffer_copy_pitch_alignment as u32;
        let staging = Memory::upload(
            device,
            &pixels.padded_rows(pitch_alignment),
            buffer::Usage::TRANSFER_SRC,
            memory_types,
            limits,
        )?;

        let allocation = ImageAllocation::new(device, pixels.width, pixels.height, memory_types)?;
        allocation.copy_from(
            &staging,
            pixels,
            pixels.row_pitch(pitch_alignment),
            command_pool,
            queue,
        )?;

        let view = unsafe {
            device.create_image_view(
                &allocation.image,
                i::ViewKind::D2,
                FORMAT,
                f::Swizzle::NO,
                COLOR_RANGE.clone(),
            )
        }
        .map_err(image_error("image view"))?;

        let sampler = unsafe {
            device.create_sampler(&i::SamplerDesc::new(i::Filter::Linear, i::WrapMode::Tile))
        };
        match sampler {
            Ok(sampler) => Ok(Texture {
                view: ManuallyDrop::new(view),
                sampler: ManuallyDrop::new(sampler),
                allocation,
            }),
            Err(err) => {
                unsafe { device.destroy_image_view(view) };
                Err(image_error("sampler")(err))
            }
        }
    }
}

impl<'a, B: Backend> Drop for Texture<'a, B> {
    fn drop(&mut self) {
        let device = self.allocation.device;
        unsafe {
            device.destroy_sampler(ManuallyDrop::into_inner(ptr::read(&self.sampler)));
            device.destroy_image_view(ManuallyDrop::into_inner(ptr::read(&self.view)));
        }
    }
}
