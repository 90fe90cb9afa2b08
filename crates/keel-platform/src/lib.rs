// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
//! Windowing provider. Re-exports `winit` so dependents share one version.

use std::sync::Arc;

use keel_render::RenderSize;
use tracing::info;
pub use winit;
use winit::dpi::LogicalSize;
use winit::error::OsError;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

/// Fixed-size window; the swapchain is never recreated, so the drawable
/// must keep its creation-time extent.
pub fn window_attributes(title: &str, width: u32, height: u32) -> WindowAttributes {
    Window::default_attributes()
        .with_title(title)
        .with_inner_size(LogicalSize::new(width, height))
        .with_resizable(false)
}

/// Opens a window shared between the app and the surface that presents to it.
pub fn create_window(
    event_loop: &ActiveEventLoop,
    attributes: WindowAttributes,
) -> Result<Arc<Window>, OsError> {
    let window = event_loop.create_window(attributes)?;
    let size = drawable_size(&window);
    info!("window created ({}x{})", size.width, size.height);
    Ok(Arc::new(window))
}

/// Size of the window's drawable area in physical pixels.
pub fn drawable_size(window: &Window) -> RenderSize {
    let size = window.inner_size();
    RenderSize::new(size.width, size.height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::Size;

    #[test]
    fn attributes_describe_a_fixed_size_window() {
        let attrs = window_attributes("keel", 800, 600);
        assert_eq!(attrs.title, "keel");
        assert_eq!(
            attrs.inner_size,
            Some(Size::Logical(LogicalSize::new(800.0, 600.0)))
        );
        assert!(!attrs.resizable);
    }
}
