//! CPU side of the textured quad: decoding, the fallback pattern and the
//! row layout used for the staging copy.

use std::fmt;
use std::path::{Path, PathBuf};

/// Bytes per RGBA8 texel.
pub const TEXEL_BYTES: u32 = 4;

const CHECKER_SIZE: u32 = 64;
const CHECKER_CELL: u32 = 8;
const CHECKER_LIGHT: [u8; 4] = [0xd8, 0xc8, 0xb0, 0xff];
const CHECKER_DARK: [u8; 4] = [0x8a, 0x4b, 0x32, 0xff];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSource {
    File(PathBuf),
    /// Generated brick-coloured checkerboard.
    Checker,
}

impl TextureSource {
    pub fn from_path(path: Option<&Path>) -> Self {
        match path {
            Some(path) => TextureSource::File(path.to_path_buf()),
            None => TextureSource::Checker,
        }
    }

    pub fn load(&self) -> Result<TextureImage, TextureError> {
        match self {
            TextureSource::Checker => Ok(checker_default()),
            TextureSource::File(path) => {
                let decoded = image::open(path).map_err(|err| TextureError::Decode {
                    path: path.clone(),
                    message: err.to_string(),
                })?;
                let rgba = decoded.to_rgba();
                let (width, height) = rgba.dimensions();
                if width == 0 || height == 0 {
                    return Err(TextureError::Empty { path: path.clone() });
                }
                Ok(TextureImage {
                    width,
                    height,
                    pixels: rgba.into_raw(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureError {
    Decode { path: PathBuf, message: String },
    Empty { path: PathBuf },
}

impl fmt::Display for TextureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureError::Decode { path, message } => {
                write!(f, "cannot load texture {}: {}", path.display(), message)
            }
            TextureError::Empty { path } => write!(f, "texture {} has no pixels", path.display()),
        }
    }
}

impl std::error::Error for TextureError {}

/// Tightly packed RGBA8 pixels, top row first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl TextureImage {
    /// Bytes per row once each row is padded to `alignment` (a power of
    /// two, or 0/1 for none).
    pub fn row_pitch(&self, alignment: u32) -> u32 {
        let row = self.width * TEXEL_BYTES;
        let mask = alignment.max(1) - 1;
        (row + mask) & !mask
    }

    /// Copies the pixels into a buffer laid out with `row_pitch` bytes per
    /// row, ready for a buffer-to-image copy.
    pub fn padded_rows(&self, alignment: u32) -> Vec<u8> {
        let pitch = self.row_pitch(alignment) as usize;
        let row = (self.width * TEXEL_BYTES) as usize;
        let mut staged = vec![0; pitch * self.height as usize];
        for (src, dst) in self.pixels.chunks(row).zip(staged.chunks_mut(pitch)) {
            dst[..row].copy_from_slice(src);
        }
        staged
    }
}

/// The pattern used when no texture file is configured or it fails to load.
pub fn checker_default() -> TextureImage {
    checker(CHECKER_SIZE, CHECKER_CELL)
}

/// Square checkerboard with `cell`-texel squares.
pub fn checker(size: u32, cell: u32) -> TextureImage {
    let cell = cell.max(1);
    let pixels: Vec<u8> = (0..size)
        .flat_map(|y| (0..size).map(move |x| (x, y)))
        .flat_map(|(x, y)| {
            let texel = if (x / cell + y / cell) % 2 == 0 {
                CHECKER_LIGHT
            } else {
                CHECKER_DARK
            };
            texel.to_vec()
        })
        .collect();
    TextureImage {
        width: size,
        height: size,
        pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("shape-scenes-texture-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn checker_alternates_cells() {
        let image = checker(4, 2);
        assert_eq!(image.pixels.len(), 4 * 4 * 4);
        let texel = |x: usize, y: usize| &image.pixels[(y * 4 + x) * 4..(y * 4 + x) * 4 + 4];
        assert_eq!(texel(0, 0), &CHECKER_LIGHT);
        assert_eq!(texel(2, 0), &CHECKER_DARK);
        assert_eq!(texel(2, 2), &CHECKER_LIGHT);
    }

    #[test]
    fn rows_are_padded_to_the_copy_pitch() {
        let image = TextureImage {
            width: 3,
            height: 2,
            pixels: (0..24).collect(),
        };
        assert_eq!(image.row_pitch(1), 12);
        assert_eq!(image.row_pitch(16), 16);

        let staged = image.padded_rows(16);
        assert_eq!(staged.len(), 32);
        assert_eq!(&staged[..12], &image.pixels[..12]);
        assert_eq!(&staged[12..16], &[0, 0, 0, 0]);
        assert_eq!(&staged[16..28], &image.pixels[12..]);
    }

    #[test]
    fn png_file_decodes_to_rgba() {
        let path = scratch("two-by-one.png");
        let rgb = [255u8, 0, 0, 0, 0, 255];
        image::save_buffer(&path, &rgb, 2, 1, image::ColorType::RGB(8)).unwrap();

        let image = TextureSource::File(path).load().unwrap();
        assert_eq!((image.width, image.height), (2, 1));
        assert_eq!(image.pixels, vec![255, 0, 0, 255, 0, 0, 255, 255]);
    }

    #[test]
    fn garbage_file_is_a_decode_error() {
        let path = scratch("wall.jpg");
        fs::write(&path, b"not a jpeg").unwrap();
        match TextureSource::File(path.clone()).load().unwrap_err() {
            TextureError::Decode { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected decode error, got {:?}", other),
        }
    }

    #[test]
    fn missing_path_falls_back_to_checker_source() {
        assert_eq!(TextureSource::from_path(None), TextureSource::Checker);
        let image = TextureSource::Checker.load().unwrap();
        assert_eq!((image.width, image.height), (CHECKER_SIZE, CHECKER_SIZE));
    }
}
