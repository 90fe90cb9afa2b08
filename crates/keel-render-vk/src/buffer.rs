// SPDX-License-Identifier: CEPL-1.0
//! Buffers with dedicated memory, and the vertex/index/uniform flavours.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use tracing::debug;

use crate::command::CommandPool;
use crate::device::Device;
use crate::driver::{DescriptorBinding, DescriptorResource, DescriptorWrite};
use crate::error::{Checked, Error, Result};
use crate::memory::{self, MemoryUsage};
use crate::scoped::Scoped;

pub struct Buffer {
    device: Arc<Device>,
    handle: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    memory_usage: MemoryUsage,
}

impl Buffer {
    pub fn new(
        device: &Arc<Device>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        memory_usage: MemoryUsage,
    ) -> Result<Self> {
        if size == 0 {
            return Err(Error::ZeroSize { what: "buffer" });
        }
        let driver = device.driver();
        // SAFETY: plain create call on a live device.
        let buffer = Scoped::new(
            driver,
            unsafe { driver.create_buffer(size, usage) }.check("vkCreateBuffer")?,
        );
        // SAFETY: `buffer` is alive.
        let requirements = unsafe { driver.buffer_memory_requirements(buffer.get()) };
        let memory = memory::allocate(device, requirements, memory_usage)?;
        // SAFETY: fresh buffer, fresh allocation of the required size.
        unsafe { driver.bind_buffer_memory(buffer.get(), memory.get()) }
            .check("vkBindBufferMemory")?;

        Ok(Self {
            device: Arc::clone(device),
            memory: memory.release(),
            handle: buffer.release(),
            size,
            usage,
            memory_usage,
        })
    }

    pub fn raw_buffer(&self) -> vk::Buffer {
        self.handle
    }

    pub fn raw_memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    pub fn memory_usage(&self) -> MemoryUsage {
        self.memory_usage
    }

    fn map(&self) -> Result<*mut u8> {
        if !self.memory_usage.is_host_visible() {
            return Err(Error::NotHostVisible);
        }
        // SAFETY: host-visible memory owned by this buffer, not mapped elsewhere.
        let ptr = unsafe { self.device.driver().map_memory(self.memory, self.size) }
            .check("vkMapMemory")?;
        Ok(ptr.cast())
    }

    fn unmap(&self) {
        // SAFETY: paired with a successful `map`.
        unsafe { self.device.driver().unmap_memory(self.memory) };
    }

    /// Copies exactly `size()` bytes from `src` into the buffer.
    ///
    /// # Safety
    /// `src` must be valid for reads of `size()` bytes.
    pub unsafe fn fill_from(&self, src: *const u8) -> Result<()> {
        let dst = self.map()?;
        // SAFETY: `dst` maps `size` bytes; the caller vouches for `src`.
        unsafe { std::ptr::copy_nonoverlapping(src, dst, self.size as usize) };
        self.unmap();
        Ok(())
    }

    /// Copies `bytes` to the start of the buffer.
    pub fn fill(&self, bytes: &[u8]) -> Result<()> {
        if bytes.len() as vk::DeviceSize > self.size {
            return Err(Error::FillTooLarge {
                len: bytes.len(),
                capacity: self.size,
            });
        }
        let dst = self.map()?;
        // SAFETY: length checked against the mapped size above.
        unsafe { std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, bytes.len()) };
        self.unmap();
        Ok(())
    }

    pub fn fill_pod<T: Pod>(&self, value: &T) -> Result<()> {
        self.fill(bytemuck::bytes_of(value))
    }

    pub fn fill_slice<T: Pod>(&self, values: &[T]) -> Result<()> {
        self.fill(bytemuck::cast_slice(values))
    }

    /// Reads the whole buffer back to the host.
    pub fn read_back(&self) -> Result<Vec<u8>> {
        let src = self.map()?;
        let mut out = vec![0u8; self.size as usize];
        // SAFETY: `src` maps `size` bytes, `out` has the same length.
        unsafe { std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), out.len()) };
        self.unmap();
        Ok(out)
    }

    /// Copies all of `src` into `dst` with a one-shot submission and waits
    /// for the graphics queue to drain.
    pub fn copy(pool: &Arc<CommandPool>, src: &Buffer, dst: &Buffer) -> Result<()> {
        if src.size > dst.size {
            return Err(Error::FillTooLarge {
                len: src.size as usize,
                capacity: dst.size,
            });
        }
        CommandPool::submit_once(pool, |commands| commands.copy_buffer(0, src, dst, src.size))
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("handle", &self.handle)
            .field("size", &self.size)
            .field("usage", &self.usage)
            .finish_non_exhaustive()
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        debug!("Dropping buffer {:?} ({} bytes)", self.handle, self.size);
        let driver = self.device.driver();
        // SAFETY: command buffers and descriptor sets that use this buffer
        // retain an Arc to it.
        unsafe {
            driver.destroy_buffer(self.handle);
            driver.free_memory(self.memory);
        }
    }
}

/// Host-visible staging copy of `bytes`, moved into a device-local buffer
/// with `usage | TRANSFER_DST`.
fn upload_device_local(
    device: &Arc<Device>,
    pool: &Arc<CommandPool>,
    bytes: &[u8],
    usage: vk::BufferUsageFlags,
) -> Result<Buffer> {
    let size = bytes.len() as vk::DeviceSize;
    let staging = Buffer::new(
        device,
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryUsage::HostVisible,
    )?;
    staging.fill(bytes)?;
    let buffer = Buffer::new(
        device,
        size,
        usage | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryUsage::DeviceLocal,
    )?;
    Buffer::copy(pool, &staging, &buffer)?;
    Ok(buffer)
}

macro_rules! buffer_newtype {
    ($(#[$meta:meta])* $name:ident, $usage:expr) => {
        $(#[$meta])*
        pub struct $name(Buffer);

        impl $name {
            /// Host-visible, coherent buffer of `size` bytes.
            pub fn new(device: &Arc<Device>, size: vk::DeviceSize) -> Result<Arc<Self>> {
                Ok(Arc::new(Self(Buffer::new(
                    device,
                    size,
                    $usage,
                    MemoryUsage::HostVisible,
                )?)))
            }
        }

        impl Deref for $name {
            type Target = Buffer;

            fn deref(&self) -> &Buffer {
                &self.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name)).field(&self.0).finish()
            }
        }
    };
}

buffer_newtype!(VertexBuffer, vk::BufferUsageFlags::VERTEX_BUFFER);
buffer_newtype!(IndexBuffer, vk::BufferUsageFlags::INDEX_BUFFER);
buffer_newtype!(UniformBuffer, vk::BufferUsageFlags::UNIFORM_BUFFER);

impl VertexBuffer {
    /// Host-visible buffer holding `vertices`.
    pub fn with_data<T: Pod>(device: &Arc<Device>, vertices: &[T]) -> Result<Arc<Self>> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let buffer = Self::new(device, bytes.len() as vk::DeviceSize)?;
        buffer.fill(bytes)?;
        Ok(buffer)
    }

    /// Device-local buffer holding `vertices`, uploaded through staging.
    pub fn device_local<T: Pod>(
        device: &Arc<Device>,
        pool: &Arc<CommandPool>,
        vertices: &[T],
    ) -> Result<Arc<Self>> {
        let buffer = upload_device_local(
            device,
            pool,
            bytemuck::cast_slice(vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        Ok(Arc::new(Self(buffer)))
    }
}

impl IndexBuffer {
    pub fn with_data<T: Pod>(device: &Arc<Device>, indices: &[T]) -> Result<Arc<Self>> {
        let bytes: &[u8] = bytemuck::cast_slice(indices);
        let buffer = Self::new(device, bytes.len() as vk::DeviceSize)?;
        buffer.fill(bytes)?;
        Ok(buffer)
    }

    pub fn device_local<T: Pod>(
        device: &Arc<Device>,
        pool: &Arc<CommandPool>,
        indices: &[T],
    ) -> Result<Arc<Self>> {
        let buffer = upload_device_local(
            device,
            pool,
            bytemuck::cast_slice(indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;
        Ok(Arc::new(Self(buffer)))
    }
}

impl UniformBuffer {
    /// Layout slot for a uniform block read by the vertex stage.
    pub fn layout_binding(binding: u32) -> DescriptorBinding {
        DescriptorBinding {
            binding,
            descriptor_type: vk::DescriptorType::UNIFORM_BUFFER,
            count: 1,
            stage_flags: vk::ShaderStageFlags::VERTEX,
        }
    }

    pub fn descriptor_write(&self, binding: u32) -> DescriptorWrite {
        DescriptorWrite {
            binding,
            resource: DescriptorResource::UniformBuffer {
                buffer: self.raw_buffer(),
                range: self.size(),
            },
        }
    }
}
