use gfx_hal::{format as f, pass::Subpass, prelude::*, pso, Backend};
use std::mem::{self, ManuallyDrop};
use std::ptr;

use crate::shader::{ProgramBinary, ShaderError, ENTRY_NAME};
use crate::shape::VertexLayout;

/// Size of the fragment tint push constant: one RGBA vec4.
pub const TINT_BYTES: u32 = mem::size_of::<[f32; 4]>() as u32;

/// The GPU half of a shader program: a graphics pipeline built from a
/// linked vertex/fragment pair.
pub struct Pipeline<'a, B: Backend> {
    device: &'a B::Device,
    pub pipeline: ManuallyDrop<B::GraphicsPipeline>,
    pub pipeline_layout: ManuallyDrop<B::PipelineLayout>,
}

impl<'a, B: Backend> Pipeline<'a, B> {
    pub fn new(
        device: &'a B::Device,
        program: &ProgramBinary,
        layout: VertexLayout,
        set_layout: Option<&B::DescriptorSetLayout>,
        render_pass: &B::RenderPass,
    ) -> Result<Self, ShaderError> {
        let attributes = attribute_descs(layout)?;

        let pipeline_layout = unsafe {
            device.create_pipeline_layout(
                set_layout,
                &[(pso::ShaderStageFlags::FRAGMENT, 0..TINT_BYTES)],
            )
        }
        .map_err(|err| link_error("pipeline layout", err))?;

        let modules = Self::load_modules(device, program);
        let (vs_module, fs_module) = match modules {
            Ok(modules) => modules,
            Err(err) => {
                unsafe { device.destroy_pipeline_layout(pipeline_layout) };
                return Err(err);
            }
        };

        let created = {
            let shader_entries = pso::GraphicsShaderSet {
                vertex: pso::EntryPoint {
                    entry: ENTRY_NAME,
                    module: &vs_module,
                    specialization: pso::Specialization::default(),
                },
                hull: None,
                domain: None,
                geometry: None,
                fragment: Some(pso::EntryPoint {
                    entry: ENTRY_NAME,
                    module: &fs_module,
                    specialization: pso::Specialization::default(),
                }),
            };

            let subpass = Subpass {
                index: 0,
                main_pass: render_pass,
            };

            let mut pipeline_desc = pso::GraphicsPipelineDesc::new(
                shader_entries,
                pso::Primitive::TriangleList,
                pso::Rasterizer::FILL,
                &pipeline_layout,
                subpass,
            );
            pipeline_desc.blender.targets.push(pso::ColorBlendDesc {
                mask: pso::ColorMask::ALL,
                blend: Some(pso::BlendState::ALPHA),
            });
            pipeline_desc.vertex_buffers.push(pso::VertexBufferDesc {
                binding: 0,
                stride: layout.stride,
                rate: pso::VertexInputRate::Vertex,
            });
            pipeline_desc.attributes.extend(attributes);

            unsafe { device.create_graphics_pipeline(&pipeline_desc, None) }
        };

        // The pipeline keeps what it needs; the stage modules go either way.
        unsafe {
            device.destroy_shader_module(vs_module);
            device.destroy_shader_module(fs_module);
        }

        match created {
            Ok(pipeline) => Ok(Pipeline {
                device,
                pipeline: ManuallyDrop::new(pipeline),
                pipeline_layout: ManuallyDrop::new(pipeline_layout),
            }),
            Err(err) => {
                unsafe { device.destroy_pipeline_layout(pipeline_layout) };
                Err(link_error("graphics pipeline", err))
            }
        }
    }

    fn load_modules(
        device: &B::Device,
        program: &ProgramBinary,
    ) -> Result<(B::ShaderModule, B::ShaderModule), ShaderError> {
        let vs = unsafe { device.create_shader_module(&program.vertex.spirv) }
            .map_err(|err| link_error("vertex module", err))?;
        match unsafe { device.create_shader_module(&program.fragment.spirv) } {
            Ok(fs) => Ok((vs, fs)),
            Err(err) => {
                unsafe { device.destroy_shader_module(vs) };
                Err(link_error("fragment module", err))
            }
        }
    }
}

/// Float vector format for an attribute of `components` 32-bit floats.
fn float_format(components: u32) -> Option<f::Format> {
    match components {
        1 => Some(f::Format::R32Sfloat),
        2 => Some(f::Format::Rg32Sfloat),
        3 => Some(f::Format::Rgb32Sfloat),
        4 => Some(f::Format::Rgba32Sfloat),
        _ => None,
    }
}

/// Attribute descriptions for vertex buffer binding 0.
fn attribute_descs(layout: VertexLayout) -> Result<Vec<pso::AttributeDesc>, ShaderError> {
    layout
        .attributes
        .iter()
        .map(|attribute| {
            let format = float_format(attribute.components).ok_or_else(|| ShaderError::Link {
                log: format!(
                    "attribute {} has {} components",
                    attribute.location, attribute.components
                ),
            })?;
            Ok(pso::AttributeDesc {
                location: attribute.location,
                binding: 0,
                element: pso::Element {
                    format,
                    offset: attribute.offset,
                },
            })
        })
        .collect()
}

fn link_error<E: std::fmt::Debug>(what: &str, err: E) -> ShaderError {
    ShaderError::Link {
        log: format!("{}: {:?}", what, err),
    }
}

impl<'a, B: Backend> Drop for Pipeline<'a, B> {
    fn drop(&mut self) {
        unsafe {
            self.device
                .destroy_graphics_pipeline(ManuallyDrop::into_inner(ptr::read(&self.pipeline)));
            self.device
                .destroy_pipeline_layout(ManuallyDrop::into_inner(ptr::read(
                    &self.pipeline_layout,
                )));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::{Attribute, TEXTURED_LAYOUT, VERTEX_LAYOUT};

    #[test]
    fn position_attribute_is_rgb32() {
        let descs = attribute_descs(VERTEX_LAYOUT).unwrap();
        assert_eq!(descs.len(), 1);
        assert_eq!(descs[0].location, 0);
        assert_eq!(descs[0].element.format, f::Format::Rgb32Sfloat);
        assert_eq!(descs[0].element.offset, 0);
    }

    #[test]
    fn textured_attributes_follow_component_counts() {
        let formats: Vec<(u32, f::Format, u32)> = attribute_descs(TEXTURED_LAYOUT)
            .unwrap()
            .iter()
            .map(|d| (d.location, d.element.format, d.element.offset))
            .collect();
        assert_eq!(
            formats,
            vec![
                (0, f::Format::Rgb32Sfloat, 0),
                (1, f::Format::Rgb32Sfloat, 12),
                (2, f::Format::Rg32Sfloat, 24),
            ]
        );
    }

    #[test]
    fn unsupported_component_count_is_rejected() {
        const WIDE: VertexLayout = VertexLayout {
            stride: 20,
            attributes: &[Attribute {
                location: 3,
                components: 5,
                offset: 0,
            }],
        };
        match attribute_descs(WIDE).unwrap_err() {
            ShaderError::Link { log } => assert!(log.contains("attribute 3"), "{}", log),
            other => panic!("expected link error, got {:?}", other),
        }
    }
}
