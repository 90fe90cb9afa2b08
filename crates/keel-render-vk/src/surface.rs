// SPDX-License-Identifier: CEPL-1.0
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use tracing::debug;

use crate::error::{Checked, Result};
use crate::instance::Instance;

/// Presentation target bound to a window.
///
/// The surface keeps the window alive, so the window is released only
/// after every GPU object that presents to it.
pub struct Surface {
    instance: Arc<Instance>,
    handle: vk::SurfaceKHR,
    _window: Arc<dyn Any + Send + Sync>,
}

impl Surface {
    pub fn new<W>(instance: &Arc<Instance>, window: Arc<W>) -> Result<Arc<Self>>
    where
        W: HasWindowHandle + HasDisplayHandle + Send + Sync + 'static,
    {
        let display = window.display_handle()?.as_raw();
        let raw_window = window.window_handle()?.as_raw();
        // SAFETY: `window` is retained below, so its handles stay valid for
        // the life of the surface.
        let handle = unsafe { instance.driver().create_surface(display, raw_window) }
            .check("vkCreateSurfaceKHR")?;
        Ok(Arc::new(Self {
            instance: Arc::clone(instance),
            handle,
            _window: window,
        }))
    }

    pub fn instance(&self) -> &Arc<Instance> {
        &self.instance
    }

    pub fn raw_surface(&self) -> vk::SurfaceKHR {
        self.handle
    }
}

impl fmt::Debug for Surface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Surface")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        debug!("Dropping surface {:?}", self.handle);
        // SAFETY: the device and swapchain hold `Arc<Surface>`, so nothing
        // presents to this surface any more.
        unsafe { self.instance.driver().destroy_surface(self.handle) };
    }
}
