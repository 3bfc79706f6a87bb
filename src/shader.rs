//! Shader program assembly: GLSL text in, linked SPIR-V pair out.
//!
//! Each stage is compiled on its own and its compiler log is kept as the
//! diagnostic. Linking checks that both modules expose a `main` entry point
//! of the right execution model; the GPU pipeline built from the pair is
//! the last step and lives in `renderer::pipeline`.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use gfx_hal::pso;
use glsl_to_spirv::ShaderType;

pub const ENTRY_NAME: &str = "main";


const SPIRV_MAGIC: u32 = 0x0723_0203;
const SPIRV_HEADER_WORDS: usize = 5;
const OP_ENTRY_POINT: u32 = 15;
const EXECUTION_MODEL_VERTEX: u32 = 0;
const EXECUTION_MODEL_FRAGMENT: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
}

impl Stage {
    fn execution_model(self) -> u32 {
        match self {
            Stage::Vertex => EXECUTION_MODEL_VERTEX,
            Stage::Fragment => EXECUTION_MODEL_FRAGMENT,
        }
    }

    fn shader_type(self) -> ShaderType {
        match self {
            Stage::Vertex => ShaderType::Vertex,
            Stage::Fragment => ShaderType::Fragment,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Vertex => write!(f, "vertex"),
            Stage::Fragment => write!(f, "fragment"),
        }
    }
}

/// Which program a mesh needs. Each kind has its own pair of sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramKind {
    Flat,
    Textured,
}

impl ProgramKind {
    fn file_stem(self) -> &'static str {
        match self {
            ProgramKind::Flat => "shape",
            ProgramKind::Textured => "textured",
        }
    }

    fn embedded(self) -> SourcePair {
        let (vertex, fragment) = match self {
            ProgramKind::Flat => (
                include_str!("data/shape.vert"),
                include_str!("data/shape.frag"),
            ),
            ProgramKind::Textured => (
                include_str!("data/textured.vert"),
                include_str!("data/textured.frag"),
            ),
        };
        SourcePair {
            vertex: vertex.to_owned(),
            fragment: fragment.to_owned(),
        }
    }
}

impl fmt::Display for ProgramKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_stem())
    }
}

#[derive(Debug)]
pub enum ShaderError {
    Io { path: PathBuf, source: io::Error },
    Compile { stage: Stage, log: String },
    Link { log: String },
}

impl ShaderError {
    /// Compiler or linker output, if any.
    pub fn log(&self) -> Option<&str> {
        match self {
            ShaderError::Io { .. } => None,
            ShaderError::Compile { log, .. } | ShaderError::Link { log } => Some(log),
        }
    }
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::Io { path, source } => {
                write!(f, "cannot read shader {}: {}", path.display(), source)
            }
            ShaderError::Compile { stage, log } => {
                write!(f, "{} shader failed to compile:\n{}", stage, log)
            }
            ShaderError::Link { log } => write!(f, "shader program failed to link:\n{}", log),
        }
    }
}

impl std::error::Error for ShaderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ShaderError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Where a scene's shader text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShaderRef {
    Embedded,
    /// A directory holding `<stem>.vert` and `<stem>.frag`, where the stem
    /// is `shape` or `textured`.
    Directory(PathBuf),
}

impl ShaderRef {
    pub fn from_dir(dir: Option<&Path>) -> Self {
        match dir {
            Some(dir) => ShaderRef::Directory(dir.to_path_buf()),
            None => ShaderRef::Embedded,
        }
    }

    pub fn load(&self, kind: ProgramKind) -> Result<SourcePair, ShaderError> {
        match self {
            ShaderRef::Embedded => Ok(kind.embedded()),
            ShaderRef::Directory(dir) => {
                let stem = kind.file_stem();
                Ok(SourcePair {
                    vertex: read_source(&dir.join(format!("{}.vert", stem)))?,
                    fragment: read_source(&dir.join(format!("{}.frag", stem)))?,
                })
            }
        }
    }
}

fn read_source(path: &Path) -> Result<String, ShaderError> {
    fs::read_to_string(path).map_err(|source| ShaderError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePair {
    pub vertex: String,
    pub fragment: String,
}

/// One compiled stage as SPIR-V words.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledStage {
    pub stage: Stage,
    pub spirv: Vec<u32>,
}

/// A linked vertex + fragment pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramBinary {
    pub vertex: CompiledStage,
    pub fragment: CompiledStage,
}

pub fn compile_stage(stage: Stage, source: &str) -> Result<CompiledStage, ShaderError> {
    let file = glsl_to_spirv::compile(source, stage.shader_type()).map_err(|log| {
        ShaderError::Compile {
            stage,
            log: non_empty(log, "compiler gave no output"),
        }
    })?;
    let spirv = pso::read_spirv(file).map_err(|err| ShaderError::Compile {
        stage,
        log: format!("unreadable SPIR-V: {}", err),
    })?;
    Ok(CompiledStage { stage, spirv })
}

pub fn link(vertex: CompiledStage, fragment: CompiledStage) -> Result<ProgramBinary, ShaderError> {
    let mut problems = Vec::new();
    for (expected, compiled) in [(Stage::Vertex, &vertex), (Stage::Fragment, &fragment)].iter() {
        if let Err(problem) = check_entry_point(*expected, compiled) {
            problems.push(problem);
        }
    }

    if problems.is_empty() {
        Ok(ProgramBinary { vertex, fragment })
    } else {
        Err(ShaderError::Link {
            log: problems.join("\n"),
        })
    }
}

/// Compiles both stages and links them.
pub fn assemble(sources: &SourcePair) -> Result<ProgramBinary, ShaderError> {
    let vertex = compile_stage(Stage::Vertex, &sources.vertex)?;
    let fragment = compile_stage(Stage::Fragment, &sources.fragment)?;
    link(vertex, fragment)
}

/// Reads the sources for `kind` and assembles them. Nothing here touches
/// the GPU.
pub fn load_and_assemble(
    shaders: &ShaderRef,
    kind: ProgramKind,
) -> Result<ProgramBinary, ShaderError> {
    let sources = shaders.load(kind)?;
    assemble(&sources)
}

fn check_entry_point(expected: Stage, compiled: &CompiledStage) -> Result<(), String> {
    if compiled.stage != expected {
        return Err(format!(
            "{} slot holds a {} stage",
            expected, compiled.stage
        ));
    }
    let entries = entry_points(&compiled.spirv)
        .map_err(|problem| format!("{} stage: {}", expected, problem))?;
    let found = entries
        .iter()
        .any(|(model, name)| *model == expected.execution_model() && name == ENTRY_NAME);
    if found {
        Ok(())
    } else {
        Err(format!(
            "{} stage has no {} entry point named `{}`",
            expected, expected, ENTRY_NAME
        ))
    }
}

/// Lists `(execution model, name)` for every OpEntryPoint in a module.
fn entry_points(words: &[u32]) -> Result<Vec<(u32, String)>, String> {
    if words.len() < SPIRV_HEADER_WORDS || words[0] != SPIRV_MAGIC {
        return Err("not a SPIR-V module".to_owned());
    }

    let mut entries = Vec::new();
    let mut at = SPIRV_HEADER_WORDS;
    while at < words.len() {
        let opcode = words[at] & 0xffff;
        let count = (words[at] >> 16) as usize;
        if count == 0 || at + count > words.len() {
            return Err(format!("malformed instruction at word {}", at));
        }
        if opcode == OP_ENTRY_POINT && count >= 4 {
            let model = words[at + 1];
            let name = literal_string(&words[at + 3..at + count]);
            entries.push((model, name));
        }
        at += count;
    }
    Ok(entries)
}

fn literal_string(words: &[u32]) -> String {
    let bytes: Vec<u8> = words
        .iter()
        .flat_map(|w| w.to_le_bytes().to_vec())
        .take_while(|b| *b != 0)
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn non_empty(log: String, fallback: &str) -> String {
    if log.trim().is_empty() {
        fallback.to_owned()
    } else {
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BROKEN_VERTEX: &str = "#version 450\n\
        layout(location = 0) in vec3 a_pos;\n\
        void main() {\n\
            gl_Position = vec4(a_pos, 1.0)\n\
        }\n";

    fn embedded() -> SourcePair {
        ShaderRef::Embedded.load(ProgramKind::Flat).unwrap()
    }

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "shape-scenes-shaders-{}-{}",
            name,
            std::process::id()
        ));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn embedded_pair_assembles() {
        let program = assemble(&embedded()).unwrap();
        assert_eq!(program.vertex.stage, Stage::Vertex);
        assert_eq!(program.fragment.stage, Stage::Fragment);
        assert_eq!(program.vertex.spirv[0], SPIRV_MAGIC);
    }

    #[test]
    fn missing_semicolon_fails_with_log() {
        let sources = SourcePair {
            vertex: BROKEN_VERTEX.to_owned(),
            fragment: embedded().fragment,
        };
        let err = assemble(&sources).unwrap_err();
        match &err {
            ShaderError::Compile { stage, log } => {
                assert_eq!(*stage, Stage::Vertex);
                assert!(!log.trim().is_empty());
            }
            other => panic!("expected compile error, got {:?}", other),
        }
        assert!(err.log().is_some());
    }

    #[test]
    fn linking_two_vertex_stages_fails() {
        let sources = embedded();
        let vs = compile_stage(Stage::Vertex, &sources.vertex).unwrap();
        let err = link(vs.clone(), vs).unwrap_err();
        match err {
            ShaderError::Link { log } => assert!(log.contains("fragment"), "{}", log),
            other => panic!("expected link error, got {:?}", other),
        }
    }

    #[test]
    fn entry_point_is_found_in_compiled_module() {
        let vs = compile_stage(Stage::Vertex, &embedded().vertex).unwrap();
        let entries = entry_points(&vs.spirv).unwrap();
        assert!(entries.contains(&(EXECUTION_MODEL_VERTEX, "main".to_owned())));
    }

    #[test]
    fn garbage_words_are_not_spirv() {
        assert!(entry_points(&[1, 2, 3, 4, 5, 6]).is_err());
        let truncated = [SPIRV_MAGIC, 0, 0, 0, 0, 0x0004_000f];
        assert!(entry_points(&truncated).is_err());
    }

    #[test]
    fn missing_directory_is_io_error() {
        let err = ShaderRef::Directory(PathBuf::from("/definitely/not/here"))
            .load(ProgramKind::Flat)
            .unwrap_err();
        match err {
            ShaderError::Io { path, .. } => assert!(path.ends_with("shape.vert")),
            other => panic!("expected io error, got {:?}", other),
        }
    }

    #[test]
    fn from_dir_picks_source() {
        assert_eq!(ShaderRef::from_dir(None), ShaderRef::Embedded);
        assert_eq!(
            ShaderRef::from_dir(Some(Path::new("shaders"))),
            ShaderRef::Directory(PathBuf::from("shaders"))
        );
    }

    #[test]
    fn embedded_textured_pair_assembles() {
        let program = load_and_assemble(&ShaderRef::Embedded, ProgramKind::Textured).unwrap();
        let entries = entry_points(&program.fragment.spirv).unwrap();
        assert!(entries.contains(&(EXECUTION_MODEL_FRAGMENT, "main".to_owned())));
    }

    #[test]
    fn directory_sources_assemble() {
        let dir = scratch_dir("good");
        let sources = embedded();
        fs::write(dir.join("shape.vert"), &sources.vertex).unwrap();
        fs::write(dir.join("shape.frag"), &sources.fragment).unwrap();

        let program = load_and_assemble(&ShaderRef::Directory(dir), ProgramKind::Flat).unwrap();
        assert_eq!(program.vertex.stage, Stage::Vertex);
    }

    #[test]
    fn broken_directory_sources_fail_with_compiler_log() {
        let dir = scratch_dir("broken");
        fs::write(dir.join("shape.vert"), BROKEN_VERTEX).unwrap();
        fs::write(dir.join("shape.frag"), embedded().fragment).unwrap();

        let err = load_and_assemble(&ShaderRef::Directory(dir), ProgramKind::Flat).unwrap_err();
        match err {
            ShaderError::Compile { stage, log } => {
                assert_eq!(stage, Stage::Vertex);
                assert!(!log.trim().is_empty());
            }
            other => panic!("expected compile error, got {:?}", other),
        }
    }

    #[test]
    fn directory_without_textured_sources_is_io_error() {
        let dir = scratch_dir("flat-only");
        fs::write(dir.join("shape.vert"), embedded().vertex).unwrap();
        fs::write(dir.join("shape.frag"), embedded().fragment).unwrap();

        match load_and_assemble(&ShaderRef::Directory(dir), ProgramKind::Textured).unwrap_err() {
            ShaderError::Io { path, .. } => assert!(path.ends_with("textured.vert")),
            other => panic!("expected io error, got {:?}", other),
        }
    }
}
