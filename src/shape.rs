//! Shape table and the CPU side of geometry upload.

use std::fmt;
use std::mem;

use bytemuck::{Pod, Zeroable};

use crate::scene::{SceneIndex, SCENE_COUNT};
use crate::shader::{ProgramKind, ShaderRef};
use crate::texture::TextureSource;

#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    pub position: [f32; 3],
}

const fn v(x: f32, y: f32, z: f32) -> Vertex {
    Vertex {
        position: [x, y, z],
    }
}

const TRIANGLE: [Vertex; 3] = [v(-0.5, -0.5, 0.0), v(0.5, -0.5, 0.0), v(0.0, 0.5, 0.0)];

const RECTANGLE: [Vertex; 6] = [
    v(0.5, 0.5, 0.0),
    v(0.5, -0.5, 0.0),
    v(-0.5, 0.5, 0.0),
    v(0.5, -0.5, 0.0),
    v(-0.5, -0.5, 0.0),
    v(-0.5, 0.5, 0.0),
];

// Body plus roof.
const HOUSE: [Vertex; 9] = [
    v(0.3, 0.2, 0.0),
    v(0.2, -0.3, 0.0),
    v(-0.3, 0.2, 0.0),
    v(0.2, -0.3, 0.0),
    v(-0.2, -0.3, 0.0),
    v(-0.3, 0.2, 0.0),
    v(0.0, 0.5, 0.0),
    v(-0.3, 0.2, 0.0),
    v(0.3, 0.2, 0.0),
];

const ORANGE: [f32; 3] = [1.0, 0.5, 0.2];
const BLUE: [f32; 3] = [0.0, 0.0, 0.98];
const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// Position, per-vertex colour and texture coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct TexturedVertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub uv: [f32; 2],
}

const fn tv(position: [f32; 3], color: [f32; 3], uv: [f32; 2]) -> TexturedVertex {
    TexturedVertex {
        position,
        color,
        uv,
    }
}

const QUAD: [TexturedVertex; 4] = [
    tv([0.5, 0.5, 0.0], [1.0, 0.0, 0.0], [1.0, 1.0]),
    tv([0.5, -0.5, 0.0], [0.0, 1.0, 0.0], [1.0, 0.0]),
    tv([-0.5, -0.5, 0.0], [0.0, 0.0, 1.0], [0.0, 0.0]),
    tv([-0.5, 0.5, 0.0], [1.0, 1.0, 0.0], [0.0, 1.0]),
];

const QUAD_INDICES: [u32; 6] = [0, 1, 3, 1, 2, 3];

/// One vertex attribute: `components` packed 32-bit floats at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute {
    pub location: u32,
    pub components: u32,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    pub stride: u32,
    pub attributes: &'static [Attribute],
}

/// `Vertex`: attribute 0, three packed floats, no padding.
pub const VERTEX_LAYOUT: VertexLayout = VertexLayout {
    stride: mem::size_of::<Vertex>() as u32,
    attributes: &[Attribute {
        location: 0,
        components: 3,
        offset: 0,
    }],
};

/// `TexturedVertex`: position, colour, uv at locations 0, 1, 2.
pub const TEXTURED_LAYOUT: VertexLayout = VertexLayout {
    stride: mem::size_of::<TexturedVertex>() as u32,
    attributes: &[
        Attribute {
            location: 0,
            components: 3,
            offset: 0,
        },
        Attribute {
            location: 1,
            components: 3,
            offset: 12,
        },
        Attribute {
            location: 2,
            components: 2,
            offset: 24,
        },
    ],
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    Empty,
    /// Vertex (or index) count is not a whole number of triangles.
    Ragged { vertices: usize },
    IndexOutOfRange { index: u32, vertices: usize },
}

impl fmt::Display for GeometryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeometryError::Empty => write!(f, "shape has no vertices"),
            GeometryError::Ragged { vertices } => {
                write!(f, "{} vertices do not form whole triangles", vertices)
            }
            GeometryError::IndexOutOfRange { index, vertices } => write!(
                f,
                "index {} is out of range for {} vertices",
                index, vertices
            ),
        }
    }
}

impl std::error::Error for GeometryError {}

#[derive(Debug, Clone, PartialEq)]
pub struct Shape {
    pub vertices: Vec<Vertex>,
    pub color: [f32; 3],
}

impl Shape {
    pub fn new(vertices: &[Vertex], color: [f32; 3]) -> Self {
        Shape {
            vertices: vertices.to_vec(),
            color,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }

    pub fn vertex_count(&self) -> u32 {
        (self.triangle_count() * 3) as u32
    }

    /// Packs the vertices for upload. The bytes never change afterwards;
    /// a new upload means staging again.
    pub fn stage(&self) -> Result<VertexData, GeometryError> {
        if self.vertices.is_empty() {
            return Err(GeometryError::Empty);
        }
        if self.vertices.len() % 3 != 0 {
            return Err(GeometryError::Ragged {
                vertices: self.vertices.len(),
            });
        }

        Ok(VertexData {
            bytes: bytemuck::cast_slice::<Vertex, u8>(&self.vertices).to_vec(),
            indices: Vec::new(),
            vertex_count: self.vertex_count(),
            layout: VERTEX_LAYOUT,
        })
    }
}

/// Indexed quad sampled from a texture and tinted by its vertex colours.
#[derive(Debug, Clone, PartialEq)]
pub struct TexturedQuad {
    pub vertices: Vec<TexturedVertex>,
    pub indices: Vec<u32>,
    pub texture: TextureSource,
}

impl TexturedQuad {
    pub fn new(texture: TextureSource) -> Self {
        TexturedQuad {
            vertices: QUAD.to_vec(),
            indices: QUAD_INDICES.to_vec(),
            texture,
        }
    }

    pub fn stage(&self) -> Result<VertexData, GeometryError> {
        if self.vertices.is_empty() || self.indices.is_empty() {
            return Err(GeometryError::Empty);
        }
        if self.indices.len() % 3 != 0 {
            return Err(GeometryError::Ragged {
                vertices: self.indices.len(),
            });
        }
        if let Some(&index) = self
            .indices
            .iter()
            .find(|&&i| i as usize >= self.vertices.len())
        {
            return Err(GeometryError::IndexOutOfRange {
                index,
                vertices: self.vertices.len(),
            });
        }

        Ok(VertexData {
            bytes: bytemuck::cast_slice::<TexturedVertex, u8>(&self.vertices).to_vec(),
            indices: self.indices.clone(),
            vertex_count: self.indices.len() as u32,
            layout: TEXTURED_LAYOUT,
        })
    }
}

/// Packed vertex bytes ready to be copied into a GPU buffer, plus the
/// index list for indexed meshes.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexData {
    pub bytes: Vec<u8>,
    /// Empty for non-indexed meshes.
    pub indices: Vec<u32>,
    /// Vertices (or indices) consumed by one draw.
    pub vertex_count: u32,
    pub layout: VertexLayout,
}

impl VertexData {
    pub fn len(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_indexed(&self) -> bool {
        !self.indices.is_empty()
    }

    pub fn index_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.indices)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mesh {
    Flat(Shape),
    Textured(TexturedQuad),
}

impl Mesh {
    pub fn stage(&self) -> Result<VertexData, GeometryError> {
        match self {
            Mesh::Flat(shape) => shape.stage(),
            Mesh::Textured(quad) => quad.stage(),
        }
    }

    /// Draw colour; textured meshes take theirs from the vertices.
    pub fn color(&self) -> [f32; 3] {
        match self {
            Mesh::Flat(shape) => shape.color,
            Mesh::Textured(_) => WHITE,
        }
    }

    pub fn program(&self) -> ProgramKind {
        match self {
            Mesh::Flat(_) => ProgramKind::Flat,
            Mesh::Textured(_) => ProgramKind::Textured,
        }
    }

    pub fn texture(&self) -> Option<&TextureSource> {
        match self {
            Mesh::Flat(_) => None,
            Mesh::Textured(quad) => Some(&quad.texture),
        }
    }
}

/// What one scene draws.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneEntry {
    pub mesh: Mesh,
    pub shaders: ShaderRef,
}

/// The fixed scene table, built once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneTable {
    entries: Vec<SceneEntry>,
}

impl SceneTable {
    /// Triangle, rectangle and house, in that order. With a texture the
    /// rectangle becomes the textured quad.
    pub fn builtin(shaders: ShaderRef, texture: Option<TextureSource>) -> Self {
        let second = match texture {
            Some(texture) => Mesh::Textured(TexturedQuad::new(texture)),
            None => Mesh::Flat(Shape::new(&RECTANGLE, BLUE)),
        };
        let entries = vec![
            SceneEntry {
                mesh: Mesh::Flat(Shape::new(&TRIANGLE, ORANGE)),
                shaders: shaders.clone(),
            },
            SceneEntry {
                mesh: second,
                shaders: shaders.clone(),
            },
            SceneEntry {
                mesh: Mesh::Flat(Shape::new(&HOUSE, BLUE)),
                shaders,
            },
        ];
        debug_assert_eq!(entries.len(), SCENE_COUNT);
        SceneTable { entries }
    }

    pub fn get(&self, scene: SceneIndex) -> &SceneEntry {
        &self.entries[scene.get()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (SceneIndex, &SceneEntry)> {
        SceneIndex::all().zip(self.entries.iter())
    }
}
