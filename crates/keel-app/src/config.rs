// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderCfg,
    #[serde(default)]
    pub assets: AssetCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct WindowCfg {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct RenderCfg {
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    #[serde(default)]
    pub validation: bool,
    #[serde(default)]
    pub vsync_mode: VsyncMode,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VsyncMode {
    Fifo,
    #[default]
    Mailbox,
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq, Eq)]
pub struct AssetCfg {
    /// Directory holding `quad.vert.spv` and `quad.frag.spv`. Unused when the
    /// shaders are embedded at build time.
    #[serde(default)]
    pub shader_dir: Option<PathBuf>,
    /// Texture for the quad. A generated checkerboard is used when unset.
    #[serde(default)]
    pub texture: Option<PathBuf>,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: default_clear(),
            validation: false,
            vsync_mode: VsyncMode::Mailbox,
        }
    }
}

impl From<VsyncMode> for keel_render_vk::VsyncMode {
    fn from(mode: VsyncMode) -> Self {
        match mode {
            VsyncMode::Fifo => keel_render_vk::VsyncMode::Fifo,
            VsyncMode::Mailbox => keel_render_vk::VsyncMode::Mailbox,
        }
    }
}

fn default_title() -> String {
    "keel".to_owned()
}
fn default_width() -> u32 {
    800
}
fn default_height() -> u32 {
    600
}
fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}

impl AppCfg {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Reads `path`, or returns the defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => {
                Self::parse(&text).with_context(|| format!("parsing {}", path.display()))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!("{} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_all_defaults() {
        let cfg = AppCfg::parse("").unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert_eq!(cfg.window.title, "keel");
        assert_eq!((cfg.window.width, cfg.window.height), (800, 600));
        assert_eq!(cfg.render.clear_color, [0.02, 0.02, 0.04, 1.0]);
        assert_eq!(cfg.render.vsync_mode, VsyncMode::Mailbox);
        assert!(!cfg.render.validation);
    }

    #[test]
    fn partial_sections_keep_remaining_defaults() {
        let cfg = AppCfg::parse(
            r#"
            [window]
            width = 1280

            [render]
            vsync_mode = "fifo"

            [assets]
            texture = "textures/crate.png"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.width, 1280);
        assert_eq!(cfg.window.height, 600);
        assert_eq!(cfg.render.vsync_mode, VsyncMode::Fifo);
        assert_eq!(cfg.render.clear_color, default_clear());
        assert_eq!(cfg.assets.texture, Some(PathBuf::from("textures/crate.png")));
        assert_eq!(cfg.assets.shader_dir, None);
    }

    #[test]
    fn unknown_vsync_mode_is_rejected() {
        assert!(AppCfg::parse("[render]\nvsync_mode = \"immediate\"").is_err());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = AppCfg::load(Path::new("definitely/not/here/keel.toml")).unwrap();
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn vsync_mode_maps_onto_the_swapchain_setting() {
        assert_eq!(
            keel_render_vk::VsyncMode::from(VsyncMode::Fifo),
            keel_render_vk::VsyncMode::Fifo
        );
    }
}
