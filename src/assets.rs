//! Everything a scene needs before the GPU gets involved: staged geometry,
//! an assembled program and decoded texture pixels.
//!
//! Shader and texture problems are logged and absorbed here so the scene
//! stays selectable; only bad geometry is fatal.

use std::fmt;

use log::{error, info, warn};

use crate::scene::SceneIndex;
use crate::shader::{self, ProgramBinary};
use crate::shape::{GeometryError, SceneTable, VertexData};
use crate::texture::{TextureImage, TextureSource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetError {
    pub scene: SceneIndex,
    pub source: GeometryError,
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scene {} geometry: {}", self.scene, self.source)
    }
}

impl std::error::Error for AssetError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

#[derive(Debug, Clone)]
pub struct PreparedScene {
    pub scene: SceneIndex,
    pub data: VertexData,
    pub color: [f32; 3],
    /// `None` when the shaders failed; the scene then renders background
    /// only.
    pub program: Option<ProgramBinary>,
    pub texture: Option<TextureImage>,
}

impl PreparedScene {
    pub fn drawable(&self) -> bool {
        self.program.is_some()
    }
}

/// The scene table after loading, one entry per scene.
#[derive(Debug, Clone)]
pub struct Assets {
    scenes: Vec<PreparedScene>,
}

impl Assets {
    pub fn prepare(table: &SceneTable) -> Result<Self, AssetError> {
        let mut scenes = Vec::new();
        for (scene, entry) in table.iter() {
            let data = entry
                .mesh
                .stage()
                .map_err(|source| AssetError { scene, source })?;

            let kind = entry.mesh.program();
            let program = match shader::load_and_assemble(&entry.shaders, kind) {
                Ok(program) => Some(program),
                Err(err) => {
                    error!("scene {} ({} program): {}", scene, kind, err);
                    None
                }
            };
            let texture = entry.mesh.texture().map(|source| load_texture(scene, source));

            scenes.push(PreparedScene {
                scene,
                data,
                color: entry.mesh.color(),
                program,
                texture,
            });
        }

        let assets = Assets { scenes };
        info!(
            "{} scenes loaded, {} drawable",
            assets.scenes.len(),
            assets.drawable_count()
        );
        Ok(assets)
    }

    pub fn get(&self, scene: SceneIndex) -> &PreparedScene {
        &self.scenes[scene.get()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &PreparedScene> {
        self.scenes.iter()
    }

    pub fn drawable_count(&self) -> usize {
        self.scenes.iter().filter(|s| s.drawable()).count()
    }
}

/// An unreadable texture file falls back to the generated pattern.
fn load_texture(scene: SceneIndex, source: &TextureSource) -> TextureImage {
    source.load().unwrap_or_else(|err| {
        warn!("scene {}: {}, using the checker pattern", scene, err);
        crate::texture::checker_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader::ShaderRef;
    use std::path::PathBuf;

    #[test]
    fn embedded_scenes_are_all_drawable() {
        let assets = Assets::prepare(&SceneTable::builtin(ShaderRef::Embedded, None)).unwrap();
        assert_eq!(assets.drawable_count(), 3);
        assert!(assets.iter().all(|s| s.texture.is_none()));
        assert_eq!(assets.get(SceneIndex::LAST).data.vertex_count, 9);
    }

    #[test]
    fn missing_shader_directory_leaves_scenes_undrawable() {
        let shaders = ShaderRef::Directory(PathBuf::from("/definitely/not/here"));
        let assets = Assets::prepare(&SceneTable::builtin(shaders, None)).unwrap();
        assert_eq!(assets.drawable_count(), 0);
        assert_eq!(assets.get(SceneIndex::FIRST).color, [1.0, 0.5, 0.2]);
    }

    #[test]
    fn unreadable_texture_uses_the_checker() {
        let table = SceneTable::builtin(
            ShaderRef::Embedded,
            Some(TextureSource::File(PathBuf::from("/definitely/not/wall.jpg"))),
        );
        let assets = Assets::prepare(&table).unwrap();
        let quad = assets.get(SceneIndex::new(1).unwrap());
        assert!(quad.drawable());
        assert_eq!(quad.texture, Some(crate::texture::checker_default()));
        assert!(quad.data.is_indexed());
    }
}
