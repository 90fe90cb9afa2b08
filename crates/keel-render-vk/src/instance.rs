// SPDX-License-Identifier: CEPL-1.0
use std::fmt;
use std::sync::Arc;

use ash::vk;
use raw_window_handle::HasDisplayHandle;
use tracing::debug;

use crate::driver::ash::AshInstance;
use crate::driver::InstanceDriver;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceConfig {
    pub app_name: String,
    /// Enables `VK_LAYER_KHRONOS_validation` and routes its messages into
    /// `tracing`. Creation fails if the layer is not installed.
    pub validation: bool,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            app_name: "keel".to_owned(),
            validation: cfg!(debug_assertions),
        }
    }
}

/// The API instance. Root of the ownership graph.
pub struct Instance {
    driver: Box<dyn InstanceDriver>,
    validation: bool,
}

impl Instance {
    /// Loads the system Vulkan library and creates an instance with the
    /// extensions the display's windowing system needs.
    pub fn new(config: &InstanceConfig, display: &impl HasDisplayHandle) -> Result<Arc<Self>> {
        let display = display.display_handle()?.as_raw();
        let driver = AshInstance::new(&config.app_name, config.validation, display)?;
        Ok(Self::from_driver(Box::new(driver), config.validation))
    }

    /// Wraps an already-created driver instance.
    pub fn from_driver(driver: Box<dyn InstanceDriver>, validation: bool) -> Arc<Self> {
        Arc::new(Self { driver, validation })
    }

    pub fn driver(&self) -> &dyn InstanceDriver {
        self.driver.as_ref()
    }

    pub fn raw_instance(&self) -> vk::Instance {
        self.driver.raw_instance()
    }

    pub fn validation_enabled(&self) -> bool {
        self.validation
    }

    pub fn extensions(&self) -> &[String] {
        self.driver.extensions()
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("handle", &self.raw_instance())
            .field("validation", &self.validation)
            .finish_non_exhaustive()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        debug!("Dropping instance");
        // SAFETY: every child holds an `Arc<Instance>`, so none are alive.
        unsafe { self.driver.destroy_instance() };
    }
}
