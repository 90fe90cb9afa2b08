// SPDX-License-Identifier: CEPL-1.0
//! Descriptor set layouts, pools, and per-image descriptor sets.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::buffer::UniformBuffer;
use crate::device::Device;
use crate::driver::{DescriptorBinding, DescriptorWrite};
use crate::error::{check_index, Checked, Result};
use crate::image::Image;
use crate::pipeline::GraphicsPipeline;

pub struct DescriptorSetLayout {
    device: Arc<Device>,
    handle: vk::DescriptorSetLayout,
    bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayout {
    pub fn new(device: &Arc<Device>, bindings: &[DescriptorBinding]) -> Result<Arc<Self>> {
        // SAFETY: plain create call on a live device.
        let handle = unsafe { device.driver().create_descriptor_set_layout(bindings) }
            .check("vkCreateDescriptorSetLayout")?;
        Ok(Arc::new(Self {
            device: Arc::clone(device),
            handle,
            bindings: bindings.to_vec(),
        }))
    }

    pub fn raw_layout(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }
}

impl fmt::Debug for DescriptorSetLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorSetLayout")
            .field("handle", &self.handle)
            .field("bindings", &self.bindings.len())
            .finish_non_exhaustive()
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        debug!("Dropping descriptor set layout {:?}", self.handle);
        // SAFETY: pipeline layouts holding this layout keep an Arc.
        unsafe {
            self.device
                .driver()
                .destroy_descriptor_set_layout(self.handle)
        };
    }
}

pub struct DescriptorSetPool {
    device: Arc<Device>,
    handle: vk::DescriptorPool,
    max_sets: u32,
}

impl DescriptorSetPool {
    pub fn new(
        device: &Arc<Device>,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> Result<Arc<Self>> {
        // SAFETY: plain create call on a live device.
        let handle = unsafe { device.driver().create_descriptor_pool(max_sets, sizes) }
            .check("vkCreateDescriptorPool")?;
        Ok(Arc::new(Self {
            device: Arc::clone(device),
            handle,
            max_sets,
        }))
    }

    /// Room for `count` sets of one uniform buffer plus one combined image
    /// sampler each.
    pub fn for_frames(device: &Arc<Device>, count: u32) -> Result<Arc<Self>> {
        let sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: count,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: count,
            },
        ];
        Self::new(device, count, &sizes)
    }

    pub fn raw_pool(&self) -> vk::DescriptorPool {
        self.handle
    }

    pub fn max_sets(&self) -> u32 {
        self.max_sets
    }
}

impl fmt::Debug for DescriptorSetPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorSetPool")
            .field("handle", &self.handle)
            .field("max_sets", &self.max_sets)
            .finish_non_exhaustive()
    }
}

impl Drop for DescriptorSetPool {
    fn drop(&mut self) {
        debug!("Dropping descriptor pool {:?}", self.handle);
        // SAFETY: sets allocated from the pool hold an Arc to it and are
        // freed implicitly here.
        unsafe { self.device.driver().destroy_descriptor_pool(self.handle) };
    }
}

/// A resource written into a descriptor set. The set keeps it alive.
#[derive(Clone)]
pub enum BoundResource {
    Uniform {
        binding: u32,
        buffer: Arc<UniformBuffer>,
    },
    Texture {
        binding: u32,
        image: Arc<Image>,
    },
}

impl BoundResource {
    fn write(&self) -> DescriptorWrite {
        match self {
            BoundResource::Uniform { binding, buffer } => buffer.descriptor_write(*binding),
            BoundResource::Texture { binding, image } => image.descriptor_write(*binding),
        }
    }

    fn keep_alive(&self) -> Arc<dyn Any + Send + Sync> {
        match self {
            BoundResource::Uniform { buffer, .. } => Arc::clone(buffer) as _,
            BoundResource::Texture { image, .. } => Arc::clone(image) as _,
        }
    }
}

/// One descriptor set per swapchain image, all with the pipeline's set
/// layout.
pub struct DescriptorSets {
    pool: Arc<DescriptorSetPool>,
    pipeline: Arc<GraphicsPipeline>,
    sets: Vec<vk::DescriptorSet>,
    retained: Vec<Vec<Arc<dyn Any + Send + Sync>>>,
}

impl DescriptorSets {
    pub fn new(
        pool: &Arc<DescriptorSetPool>,
        pipeline: &Arc<GraphicsPipeline>,
        count: usize,
    ) -> Result<Self> {
        let layouts = vec![pipeline.descriptor_set_layout().raw_layout(); count];
        // SAFETY: pool and layout are alive and owned by the same device.
        let sets = unsafe {
            pool.device
                .driver()
                .allocate_descriptor_sets(pool.raw_pool(), &layouts)
        }
        .check("vkAllocateDescriptorSets")?;
        info!("Allocated {count} descriptor sets");
        Ok(Self {
            pool: Arc::clone(pool),
            pipeline: Arc::clone(pipeline),
            sets,
            retained: vec![Vec::new(); count],
        })
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn raw_set(&self, index: usize) -> Result<vk::DescriptorSet> {
        check_index("descriptor set", index, self.sets.len())?;
        Ok(self.sets[index])
    }

    pub fn pipeline(&self) -> &Arc<GraphicsPipeline> {
        &self.pipeline
    }

    /// Writes `uniform` at binding 0 and `texture` at binding 1 of set
    /// `index`.
    pub fn update(
        &mut self,
        index: usize,
        uniform: &Arc<UniformBuffer>,
        texture: &Arc<Image>,
    ) -> Result<()> {
        self.bind(
            index,
            &[
                BoundResource::Uniform {
                    binding: 0,
                    buffer: Arc::clone(uniform),
                },
                BoundResource::Texture {
                    binding: 1,
                    image: Arc::clone(texture),
                },
            ],
        )
    }

    pub fn bind(&mut self, index: usize, resources: &[BoundResource]) -> Result<()> {
        check_index("descriptor set", index, self.sets.len())?;
        let writes: Vec<_> = resources.iter().map(BoundResource::write).collect();
        // SAFETY: the set is not bound in any pending command buffer while
        // it is updated; the resources are retained below.
        unsafe {
            self.pool
                .device
                .driver()
                .update_descriptor_set(self.sets[index], &writes)
        };
        self.retained[index].extend(resources.iter().map(BoundResource::keep_alive));
        Ok(())
    }
}

impl fmt::Debug for DescriptorSets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorSets")
            .field("sets", &self.sets)
            .finish_non_exhaustive()
    }
}
