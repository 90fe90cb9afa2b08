// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}

/// Reads a compiled SPIR-V module. The bytes are not validated here.
pub fn load_spirv(path: impl AsRef<Path>) -> Result<Vec<u8>, AssetError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| AssetError::Io {
        path: path.to_owned(),
        source,
    })?;
    debug!("loaded {} bytes of SPIR-V from {}", bytes.len(), path.display());
    Ok(bytes)
}

/// Tightly packed RGBA8 pixels, row-major from the top-left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl DecodedImage {
    /// Two-tone checkerboard with square cells of `cell` pixels.
    pub fn checkerboard(width: u32, height: u32, cell: u32) -> Self {
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity(width as usize * height as usize * 4);
        for y in 0..height {
            for x in 0..width {
                let light = ((x / cell) + (y / cell)) % 2 == 0;
                let v = if light { 0xe0 } else { 0x30 };
                pixels.extend_from_slice(&[v, v, v, 0xff]);
            }
        }
        Self {
            width,
            height,
            pixels,
        }
    }
}

/// Decodes any format the `image` crate is built with into RGBA8.
pub fn load_rgba8(path: impl AsRef<Path>) -> Result<DecodedImage, AssetError> {
    let path = path.as_ref();
    let decoded = image::open(path)
        .map_err(|source| match source {
            image::ImageError::IoError(source) => AssetError::Io {
                path: path.to_owned(),
                source,
            },
            source => AssetError::Decode {
                path: path.to_owned(),
                source,
            },
        })?
        .to_rgba8();
    let (width, height) = decoded.dimensions();
    info!("loaded texture {} ({width}x{height})", path.display());
    Ok(DecodedImage {
        width,
        height,
        pixels: decoded.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("keel-assets-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn checkerboard_alternates_cells() {
        let img = DecodedImage::checkerboard(4, 2, 2);
        assert_eq!(img.pixels.len(), 4 * 2 * 4);
        let px = |x: usize, y: usize| img.pixels[(y * 4 + x) * 4];
        assert_eq!(px(0, 0), px(1, 1));
        assert_ne!(px(0, 0), px(2, 0));
        assert!(img.pixels.chunks(4).all(|p| p[3] == 0xff));
    }

    #[test]
    fn zero_cell_is_treated_as_one() {
        let img = DecodedImage::checkerboard(2, 1, 0);
        assert_ne!(img.pixels[0], img.pixels[4]);
    }

    #[test]
    fn spirv_bytes_are_returned_verbatim() {
        let path = scratch("quad.spv");
        let bytes = [0x03, 0x02, 0x23, 0x07, 1, 2, 3, 4];
        fs::write(&path, bytes).unwrap();
        assert_eq!(load_spirv(&path).unwrap(), bytes);
    }

    #[test]
    fn missing_files_report_their_path() {
        let path = scratch("does-not-exist.spv");
        let err = load_spirv(&path).unwrap_err();
        assert!(matches!(&err, AssetError::Io { path: p, .. } if *p == path));
        assert!(err.to_string().contains("does-not-exist.spv"));

        assert!(matches!(
            load_rgba8(scratch("does-not-exist.png")),
            Err(AssetError::Io { .. })
        ));
    }

    #[test]
    fn png_decodes_to_rgba8() {
        let path = scratch("rgb.png");
        let rgb = image::RgbImage::from_raw(2, 1, vec![255, 0, 0, 0, 0, 255]).unwrap();
        rgb.save(&path).unwrap();

        let img = load_rgba8(&path).unwrap();
        assert_eq!((img.width, img.height), (2, 1));
        assert_eq!(img.pixels, vec![255, 0, 0, 255, 0, 0, 255, 255]);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let path = scratch("garbage.png");
        fs::write(&path, b"not a png").unwrap();
        assert!(matches!(load_rgba8(&path), Err(AssetError::Decode { .. })));
    }
}
