use gfx_hal::{image as i, prelude::*, pso, Backend};
use std::mem::ManuallyDrop;
use std::ptr;

use super::{device_error, RenderError};

/// Binding 0 holds the sampled image, binding 1 the sampler, both read by
/// the fragment stage.
pub struct DescriptorSet<'a, B: Backend> {
    device: &'a B::Device,
    pub set_layout: ManuallyDrop<B::DescriptorSetLayout>,
    pool: ManuallyDrop<B::DescriptorPool>,
    pub set: B::DescriptorSet,
}

impl<'a, B: Backend> DescriptorSet<'a, B> {
    pub fn new(device: &'a B::Device) -> Result<Self, RenderError> {
        let set_layout = Self::create_descriptor_set_layout(device)?;
        let mut pool = match Self::create_descriptor_pool(device) {
            Ok(pool) => pool,
            Err(err) => {
                unsafe { device.destroy_descriptor_set_layout(set_layout) };
                return Err(err);
            }
        };

        match unsafe { pool.allocate_set(&set_layout) } {
            Ok(set) => Ok(DescriptorSet {
                device,
                set_layout: ManuallyDrop::new(set_layout),
                pool: ManuallyDrop::new(pool),
                set,
            }),
            Err(err) => {
                unsafe {
                    device.destroy_descriptor_pool(pool);
                    device.destroy_descriptor_set_layout(set_layout);
                }
                Err(device_error("descriptor set")(err))
            }
        }
    }

    fn texture_bindings() -> [pso::DescriptorSetLayoutBinding; 2] {
        [
            pso::DescriptorSetLayoutBinding {
                binding: 0,
                ty: pso::DescriptorType::Image {
                    ty: pso::ImageDescriptorType::Sampled {
                        with_sampler: false,
                    },
                },
                count: 1,
                stage_flags: pso::ShaderStageFlags::FRAGMENT,
                immutable_samplers: false,
            },
            pso::DescriptorSetLayoutBinding {
                binding: 1,
                ty: pso::DescriptorType::Sampler,
                count: 1,
                stage_flags: pso::ShaderStageFlags::FRAGMENT,
                immutable_samplers: false,
            },
        ]
    }

    fn create_descriptor_set_layout(
        device: &B::Device,
    ) -> Result<B::DescriptorSetLayout, RenderError> {
        unsafe { device.create_descriptor_set_layout(&Self::texture_bindings(), &[]) }
            .map_err(device_error("descriptor set layout"))
    }

    fn create_descriptor_pool(device: &B::Device) -> Result<B::DescriptorPool, RenderError> {
        let ranges: Vec<pso::DescriptorRangeDesc> = Self::texture_bindings()
            .iter()
            .map(|binding| pso::DescriptorRangeDesc {
                ty: binding.ty.clone(),
                count: binding.count,
            })
            .collect();
        unsafe {
            device.create_descriptor_pool(1, &ranges, pso::DescriptorPoolCreateFlags::empty())
        }
        .map_err(device_error("descriptor pool"))
    }

    /// Points both bindings at `view` and `sampler`.
    pub fn write_texture(&mut self, view: &B::ImageView, sampler: &B::Sampler) {
        unsafe {
            self.device.write_descriptor_sets(vec![
                pso::DescriptorSetWrite {
                    set: &self.set,
                    binding: 0,
                    array_offset: 0,
                    descriptors: Some(pso::Descriptor::Image(
                        view,
                        i::Layout::ShaderReadOnlyOptimal,
                    )),
                },
                pso::DescriptorSetWrite {
                    set: &self.set,
                    binding: 1,
                    array_offset: 0,
                    descriptors: Some(pso::Descriptor::Sampler(sampler)),
                },
            ]);
        }
    }
}

impl<'a, B: Backend> Drop for DescriptorSet<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_descriptor_set_layout(ManuallyDrop::into_inner(ptr::read(
                    &self.set_layout,
                )));
            self.device
                .destroy_descriptor_pool(ManuallyDrop::into_inner(ptr::read(&self.pool)));
        }
    }
}
