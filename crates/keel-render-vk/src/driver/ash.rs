// SPDX-License-Identifier: CEPL-1.0
//! Driver implementation backed by the system Vulkan loader.

use std::ffi::{c_void, CStr, CString};
use std::slice;

use ash::ext::debug_utils;
use ash::khr::{surface, swapchain};
use ash::prelude::VkResult;
use ash::vk;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use tracing::{debug, error, info, trace, warn};

use super::{
    AdapterInfo, DescriptorBinding, DescriptorResource, DescriptorWrite, DeviceDesc,
    DeviceDriver, FramebufferDesc, GraphicsPipelineDesc, ImageBarrier, ImageDesc, ImageViewDesc,
    InstanceDriver, QueueFamilyInfo, RenderPassBegin, RenderPassDesc, SamplerDesc, SubmitDesc,
    SurfaceSupport, SwapchainDesc,
};
use crate::error::{Checked, Error, Result};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENTRY_POINT: &CStr = c"main";

fn bool32(b: bool) -> vk::Bool32 {
    if b {
        vk::TRUE
    } else {
        vk::FALSE
    }
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() {
        return vk::FALSE;
    }
    // SAFETY: the loader passes a valid callback-data struct for the
    // duration of the call; `p_message` is null or NUL-terminated.
    let message = unsafe {
        let p_message = (*data).p_message;
        if p_message.is_null() {
            return vk::FALSE;
        }
        CStr::from_ptr(p_message).to_string_lossy()
    };
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{message}");
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", "{message}");
    } else {
        trace!(target: "vulkan", "{message}");
    }
    vk::FALSE
}

/// Instance created through `ash`, with the surface extension loaded and an
/// optional validation messenger routed into `tracing`.
pub struct AshInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    surface: surface::Instance,
    debug: Option<(debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    extensions: Vec<String>,
}

impl AshInstance {
    pub fn new(app_name: &str, validation: bool, display: RawDisplayHandle) -> Result<Self> {
        // SAFETY: the loaded library stays alive inside `entry` for as long
        // as any function pointer taken from it.
        let entry = unsafe { ash::Entry::load() }?;

        let mut extension_ptrs = ash_window::enumerate_required_extensions(display)
            .check("vkEnumerateInstanceExtensionProperties")?
            .to_vec();
        if validation {
            // SAFETY: plain global query on a loaded entry.
            let layers = unsafe { entry.enumerate_instance_layer_properties() }
                .check("vkEnumerateInstanceLayerProperties")?;
            let available = layers
                .iter()
                .any(|l| l.layer_name_as_c_str().is_ok_and(|n| n == VALIDATION_LAYER));
            if !available {
                return Err(Error::ValidationUnavailable);
            }
            extension_ptrs.push(debug_utils::NAME.as_ptr());
        }
        let extensions = extension_ptrs
            .iter()
            // SAFETY: every pointer comes from a static extension-name constant.
            .map(|&p| unsafe { CStr::from_ptr(p) }.to_string_lossy().into_owned())
            .collect::<Vec<_>>();

        let app = CString::new(app_name).unwrap_or_else(|_| CString::from(c"keel"));
        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: app.as_ptr(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            p_engine_name: c"Keel".as_ptr(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_0,
            ..Default::default()
        };
        let layer_ptrs = [VALIDATION_LAYER.as_ptr()];
        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_application_info: &app_info,
            enabled_extension_count: extension_ptrs.len() as u32,
            pp_enabled_extension_names: extension_ptrs.as_ptr(),
            enabled_layer_count: if validation { 1 } else { 0 },
            pp_enabled_layer_names: layer_ptrs.as_ptr(),
            ..Default::default()
        };
        // SAFETY: every pointer in `create_info` outlives this call.
        let instance = unsafe { entry.create_instance(&create_info, None) }
            .check("vkCreateInstance")?;

        let debug = if validation {
            let loader = debug_utils::Instance::new(&entry, &instance);
            let ci = vk::DebugUtilsMessengerCreateInfoEXT {
                s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
                message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                pfn_user_callback: Some(debug_callback),
                ..Default::default()
            };
            // SAFETY: `instance` was created with the debug-utils extension.
            match unsafe { loader.create_debug_utils_messenger(&ci, None) } {
                Ok(messenger) => Some((loader, messenger)),
                Err(result) => {
                    // SAFETY: nothing else was created from the instance yet.
                    unsafe { instance.destroy_instance(None) };
                    return Err(Error::vulkan("vkCreateDebugUtilsMessengerEXT", result));
                }
            }
        } else {
            None
        };

        let surface = surface::Instance::new(&entry, &instance);
        info!(
            "Vulkan instance created (validation: {validation}, extensions: {})",
            extensions.join(", ")
        );
        Ok(Self {
            entry,
            instance,
            surface,
            debug,
            extensions,
        })
    }
}

impl InstanceDriver for AshInstance {
    fn raw_instance(&self) -> vk::Instance {
        self.instance.handle()
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    unsafe fn destroy_instance(&self) {
        unsafe {
            if let Some((loader, messenger)) = &self.debug {
                loader.destroy_debug_utils_messenger(*messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }

    unsafe fn create_surface(
        &self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> VkResult<vk::SurfaceKHR> {
        unsafe { ash_window::create_surface(&self.entry, &self.instance, display, window, None) }
    }

    unsafe fn destroy_surface(&self, surface: vk::SurfaceKHR) {
        unsafe { self.surface.destroy_surface(surface, None) }
    }

    unsafe fn enumerate_adapters(&self, surface: vk::SurfaceKHR) -> VkResult<Vec<AdapterInfo>> {
        let physical_devices = unsafe { self.instance.enumerate_physical_devices() }?;
        let mut adapters = Vec::with_capacity(physical_devices.len());
        for pd in physical_devices {
            let props = unsafe { self.instance.get_physical_device_properties(pd) };
            let features = unsafe { self.instance.get_physical_device_features(pd) };
            let families =
                unsafe { self.instance.get_physical_device_queue_family_properties(pd) };
            let mut queue_families = Vec::with_capacity(families.len());
            for (index, family) in families.iter().enumerate() {
                let present_support = unsafe {
                    self.surface
                        .get_physical_device_surface_support(pd, index as u32, surface)
                }?;
                queue_families.push(QueueFamilyInfo {
                    flags: family.queue_flags,
                    queue_count: family.queue_count,
                    present_support,
                });
            }
            let extensions = unsafe { self.instance.enumerate_device_extension_properties(pd) }?;
            let swapchain_extension = extensions
                .iter()
                .any(|e| e.extension_name_as_c_str().is_ok_and(|n| n == swapchain::NAME));
            let surface_format_count = unsafe {
                self.surface.get_physical_device_surface_formats(pd, surface)
            }?
            .len();
            let present_mode_count = unsafe {
                self.surface
                    .get_physical_device_surface_present_modes(pd, surface)
            }?
            .len();
            adapters.push(AdapterInfo {
                physical_device: pd,
                name: props
                    .device_name_as_c_str()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                device_type: props.device_type,
                queue_families,
                swapchain_extension,
                surface_format_count,
                present_mode_count,
                memory_properties: unsafe {
                    self.instance.get_physical_device_memory_properties(pd)
                },
                sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
                max_sampler_anisotropy: props.limits.max_sampler_anisotropy,
            });
        }
        Ok(adapters)
    }

    unsafe fn surface_support(
        &self,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> VkResult<SurfaceSupport> {
        unsafe {
            Ok(SurfaceSupport {
                capabilities: self
                    .surface
                    .get_physical_device_surface_capabilities(physical_device, surface)?,
                formats: self
                    .surface
                    .get_physical_device_surface_formats(physical_device, surface)?,
                present_modes: self
                    .surface
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            })
        }
    }

    unsafe fn create_device(
        &self,
        adapter: &AdapterInfo,
        desc: &DeviceDesc,
    ) -> VkResult<Box<dyn DeviceDriver>> {
        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = desc
            .queue_families
            .iter()
            .map(|&family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();
        let features = vk::PhysicalDeviceFeatures {
            sampler_anisotropy: bool32(desc.sampler_anisotropy),
            ..Default::default()
        };
        let extensions = [swapchain::NAME.as_ptr()];
        let create_info = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_extension_count: extensions.len() as u32,
            pp_enabled_extension_names: extensions.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };
        let device = unsafe {
            self.instance
                .create_device(adapter.physical_device, &create_info, None)
        }?;
        let swapchain = swapchain::Device::new(&self.instance, &device);
        Ok(Box::new(AshDevice { device, swapchain }))
    }
}

/// Logical device plus the swapchain extension loader.
pub struct AshDevice {
    device: ash::Device,
    swapchain: swapchain::Device,
}

impl DeviceDriver for AshDevice {
    fn raw_device(&self) -> vk::Device {
        self.device.handle()
    }

    unsafe fn destroy_device(&self) {
        unsafe { self.device.destroy_device(None) }
    }

    unsafe fn get_queue(&self, family: u32, index: u32) -> vk::Queue {
        unsafe { self.device.get_device_queue(family, index) }
    }

    unsafe fn device_wait_idle(&self) -> VkResult<()> {
        unsafe { self.device.device_wait_idle() }
    }

    unsafe fn queue_wait_idle(&self, queue: vk::Queue) -> VkResult<()> {
        unsafe { self.device.queue_wait_idle(queue) }
    }

    unsafe fn queue_submit(&self, queue: vk::Queue, submit: &SubmitDesc) -> VkResult<()> {
        let command_buffers = [submit.command_buffer];
        let (wait_semaphores, wait_stages): (Vec<_>, Vec<_>) = submit.wait.into_iter().unzip();
        let signal_semaphores: Vec<_> = submit.signal.into_iter().collect();
        let info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            self.device
                .queue_submit(queue, slice::from_ref(&info), vk::Fence::null())
        }
    }

    unsafe fn create_swapchain(&self, desc: &SwapchainDesc) -> VkResult<vk::SwapchainKHR> {
        let concurrent = desc.queue_family_indices.len() > 1;
        let create_info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: desc.surface,
            min_image_count: desc.min_image_count,
            image_format: desc.format.format,
            image_color_space: desc.format.color_space,
            image_extent: desc.extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: if concurrent {
                vk::SharingMode::CONCURRENT
            } else {
                vk::SharingMode::EXCLUSIVE
            },
            queue_family_index_count: if concurrent {
                desc.queue_family_indices.len() as u32
            } else {
                0
            },
            p_queue_family_indices: desc.queue_family_indices.as_ptr(),
            pre_transform: desc.pre_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: desc.present_mode,
            clipped: vk::TRUE,
            old_swapchain: vk::SwapchainKHR::null(),
            ..Default::default()
        };
        unsafe { self.swapchain.create_swapchain(&create_info, None) }
    }

    unsafe fn swapchain_images(&self, swapchain: vk::SwapchainKHR) -> VkResult<Vec<vk::Image>> {
        unsafe { self.swapchain.get_swapchain_images(swapchain) }
    }

    unsafe fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain.destroy_swapchain(swapchain, None) }
    }

    unsafe fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        timeout: u64,
        signal: vk::Semaphore,
    ) -> VkResult<(u32, bool)> {
        unsafe {
            self.swapchain
                .acquire_next_image(swapchain, timeout, signal, vk::Fence::null())
        }
    }

    unsafe fn queue_present(
        &self,
        queue: vk::Queue,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VkResult<bool> {
        let waits = [wait];
        let swapchains = [swapchain];
        let indices = [image_index];
        let info = vk::PresentInfoKHR::default()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices);
        unsafe { self.swapchain.queue_present(queue, &info) }
    }

    unsafe fn create_image_view(&self, desc: &ImageViewDesc) -> VkResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo {
            s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
            image: desc.image,
            view_type: vk::ImageViewType::TYPE_2D,
            format: desc.format,
            components: vk::ComponentMapping::default(),
            subresource_range: color_subresource_range(),
            ..Default::default()
        };
        unsafe { self.device.create_image_view(&create_info, None) }
    }

    unsafe fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) }
    }

    unsafe fn create_render_pass(&self, desc: &RenderPassDesc) -> VkResult<vk::RenderPass> {
        let attachment = vk::AttachmentDescription {
            format: desc.color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: desc.load_op,
            store_op: desc.store_op,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: desc.initial_layout,
            final_layout: desc.final_layout,
            ..Default::default()
        };
        let color_ref = vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        };
        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(slice::from_ref(&color_ref));
        let dependency = vk::SubpassDependency {
            src_subpass: vk::SUBPASS_EXTERNAL,
            dst_subpass: 0,
            src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
            src_access_mask: vk::AccessFlags::empty(),
            dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
            ..Default::default()
        };
        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(slice::from_ref(&attachment))
            .subpasses(slice::from_ref(&subpass))
            .dependencies(slice::from_ref(&dependency));
        unsafe { self.device.create_render_pass(&create_info, None) }
    }

    unsafe fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        unsafe { self.device.destroy_render_pass(render_pass, None) }
    }

    unsafe fn create_framebuffer(&self, desc: &FramebufferDesc) -> VkResult<vk::Framebuffer> {
        let attachments = [desc.attachment];
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(desc.render_pass)
            .attachments(&attachments)
            .width(desc.extent.width)
            .height(desc.extent.height)
            .layers(1);
        unsafe { self.device.create_framebuffer(&create_info, None) }
    }

    unsafe fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        unsafe { self.device.destroy_framebuffer(framebuffer, None) }
    }

    unsafe fn create_shader_module(&self, code: &[u32]) -> VkResult<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        unsafe { self.device.create_shader_module(&create_info, None) }
    }

    unsafe fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.device.destroy_shader_module(module, None) }
    }

    unsafe fn create_descriptor_set_layout(
        &self,
        bindings: &[DescriptorBinding],
    ) -> VkResult<vk::DescriptorSetLayout> {
        let vk_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|b| vk::DescriptorSetLayoutBinding {
                binding: b.binding,
                descriptor_type: b.descriptor_type,
                descriptor_count: b.count,
                stage_flags: b.stage_flags,
                ..Default::default()
            })
            .collect();
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&vk_bindings);
        unsafe { self.device.create_descriptor_set_layout(&create_info, None) }
    }

    unsafe fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) }
    }

    unsafe fn create_pipeline_layout(
        &self,
        set_layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<vk::PipelineLayout> {
        let create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(set_layouts);
        unsafe { self.device.create_pipeline_layout(&create_info, None) }
    }

    unsafe fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device.destroy_pipeline_layout(layout, None) }
    }

    unsafe fn create_graphics_pipeline(
        &self,
        desc: &GraphicsPipelineDesc<'_>,
    ) -> VkResult<vk::Pipeline> {
        let state = desc.state;
        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(desc.vertex_shader)
                .name(ENTRY_POINT),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(desc.fragment_shader)
                .name(ENTRY_POINT),
        ];

        let bindings: Vec<vk::VertexInputBindingDescription> = state
            .vertex_input
            .bindings
            .iter()
            .map(|b| vk::VertexInputBindingDescription {
                binding: b.binding,
                stride: b.stride,
                input_rate: b.input_rate,
            })
            .collect();
        let attributes: Vec<vk::VertexInputAttributeDescription> = state
            .vertex_input
            .attributes
            .iter()
            .map(|a| vk::VertexInputAttributeDescription {
                location: a.location,
                binding: a.binding,
                format: a.format,
                offset: a.offset,
            })
            .collect();
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&bindings)
            .vertex_attribute_descriptions(&attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: state.input_assembly.topology,
            primitive_restart_enable: bool32(state.input_assembly.primitive_restart),
            ..Default::default()
        };

        let vp = &state.viewport.viewport;
        let viewport = vk::Viewport {
            x: vp.x,
            y: vp.y,
            width: vp.width,
            height: vp.height,
            min_depth: vp.min_depth,
            max_depth: vp.max_depth,
        };
        let sc = &state.viewport.scissor;
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: sc.x, y: sc.y },
            extent: vk::Extent2D {
                width: sc.width,
                height: sc.height,
            },
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(slice::from_ref(&viewport))
            .scissors(slice::from_ref(&scissor));

        let raster = &state.rasterization;
        let rasterization = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            depth_clamp_enable: bool32(raster.depth_clamp),
            rasterizer_discard_enable: bool32(raster.rasterizer_discard),
            polygon_mode: raster.polygon_mode,
            cull_mode: raster.cull_mode,
            front_face: raster.front_face,
            depth_bias_enable: vk::FALSE,
            line_width: raster.line_width,
            ..Default::default()
        };

        let ms = &state.multisample;
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: ms.samples,
            sample_shading_enable: bool32(ms.sample_shading),
            min_sample_shading: ms.min_sample_shading,
            alpha_to_coverage_enable: bool32(ms.alpha_to_coverage),
            alpha_to_one_enable: bool32(ms.alpha_to_one),
            ..Default::default()
        };

        let blend = &state.color_blend;
        let blend_attachment = vk::PipelineColorBlendAttachmentState {
            blend_enable: bool32(blend.blend_enable),
            src_color_blend_factor: blend.src_color_factor,
            dst_color_blend_factor: blend.dst_color_factor,
            color_blend_op: blend.color_op,
            src_alpha_blend_factor: blend.src_alpha_factor,
            dst_alpha_blend_factor: blend.dst_alpha_factor,
            alpha_blend_op: blend.alpha_op,
            color_write_mask: blend.write_mask,
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(blend.logic_op.is_some())
            .logic_op(blend.logic_op.unwrap_or(vk::LogicOp::COPY))
            .attachments(slice::from_ref(&blend_attachment))
            .blend_constants(blend.blend_constants);

        let dynamic =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&state.dynamic_states);

        let mut create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .color_blend_state(&color_blend)
            .layout(desc.layout)
            .render_pass(desc.render_pass)
            .subpass(0)
            .base_pipeline_index(-1);
        if !state.dynamic_states.is_empty() {
            create_info = create_info.dynamic_state(&dynamic);
        }

        let pipelines = unsafe {
            self.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                slice::from_ref(&create_info),
                None,
            )
        }
        .map_err(|(_, result)| result)?;
        Ok(pipelines[0])
    }

    unsafe fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device.destroy_pipeline(pipeline, None) }
    }

    unsafe fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> VkResult<vk::Buffer> {
        let create_info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        unsafe { self.device.create_buffer(&create_info, None) }
    }

    unsafe fn destroy_buffer(&self, buffer: vk::Buffer) {
        unsafe { self.device.destroy_buffer(buffer, None) }
    }

    unsafe fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.device.get_buffer_memory_requirements(buffer) }
    }

    unsafe fn bind_buffer_memory(
        &self,
        buffer: vk::Buffer,
        memory: vk::DeviceMemory,
    ) -> VkResult<()> {
        unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }
    }

    unsafe fn create_image(&self, desc: &ImageDesc) -> VkResult<vk::Image> {
        let create_info = vk::ImageCreateInfo {
            s_type: vk::StructureType::IMAGE_CREATE_INFO,
            image_type: vk::ImageType::TYPE_2D,
            format: desc.format,
            extent: vk::Extent3D {
                width: desc.width,
                height: desc.height,
                depth: 1,
            },
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            tiling: desc.tiling,
            usage: desc.usage,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            ..Default::default()
        };
        unsafe { self.device.create_image(&create_info, None) }
    }

    unsafe fn destroy_image(&self, image: vk::Image) {
        unsafe { self.device.destroy_image(image, None) }
    }

    unsafe fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.device.get_image_memory_requirements(image) }
    }

    unsafe fn bind_image_memory(
        &self,
        image: vk::Image,
        memory: vk::DeviceMemory,
    ) -> VkResult<()> {
        unsafe { self.device.bind_image_memory(image, memory, 0) }
    }

    unsafe fn allocate_memory(
        &self,
        size: vk::DeviceSize,
        memory_type_index: u32,
    ) -> VkResult<vk::DeviceMemory> {
        let allocate_info = vk::MemoryAllocateInfo {
            s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
            allocation_size: size,
            memory_type_index,
            ..Default::default()
        };
        unsafe { self.device.allocate_memory(&allocate_info, None) }
    }

    unsafe fn free_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.free_memory(memory, None) }
    }

    unsafe fn map_memory(
        &self,
        memory: vk::DeviceMemory,
        size: vk::DeviceSize,
    ) -> VkResult<*mut c_void> {
        unsafe {
            self.device
                .map_memory(memory, 0, size, vk::MemoryMapFlags::empty())
        }
    }

    unsafe fn unmap_memory(&self, memory: vk::DeviceMemory) {
        unsafe { self.device.unmap_memory(memory) }
    }

    unsafe fn create_sampler(&self, desc: &SamplerDesc) -> VkResult<vk::Sampler> {
        let create_info = vk::SamplerCreateInfo {
            s_type: vk::StructureType::SAMPLER_CREATE_INFO,
            mag_filter: desc.mag_filter,
            min_filter: desc.min_filter,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: desc.address_mode,
            address_mode_v: desc.address_mode,
            address_mode_w: desc.address_mode,
            mip_lod_bias: 0.0,
            anisotropy_enable: bool32(desc.max_anisotropy.is_some()),
            max_anisotropy: desc.max_anisotropy.unwrap_or(1.0),
            compare_enable: vk::FALSE,
            compare_op: vk::CompareOp::ALWAYS,
            min_lod: 0.0,
            max_lod: 0.0,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            unnormalized_coordinates: vk::FALSE,
            ..Default::default()
        };
        unsafe { self.device.create_sampler(&create_info, None) }
    }

    unsafe fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) }
    }

    unsafe fn create_command_pool(&self, queue_family: u32) -> VkResult<vk::CommandPool> {
        let create_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: queue_family,
            ..Default::default()
        };
        unsafe { self.device.create_command_pool(&create_info, None) }
    }

    unsafe fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) }
    }

    unsafe fn allocate_command_buffers(
        &self,
        pool: vk::CommandPool,
        count: u32,
    ) -> VkResult<Vec<vk::CommandBuffer>> {
        let allocate_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: count,
            ..Default::default()
        };
        unsafe { self.device.allocate_command_buffers(&allocate_info) }
    }

    unsafe fn free_command_buffers(&self, pool: vk::CommandPool, buffers: &[vk::CommandBuffer]) {
        unsafe { self.device.free_command_buffers(pool, buffers) }
    }

    unsafe fn begin_command_buffer(&self, cb: vk::CommandBuffer, one_time: bool) -> VkResult<()> {
        let begin_info = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: if one_time {
                vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
            } else {
                vk::CommandBufferUsageFlags::empty()
            },
            ..Default::default()
        };
        unsafe { self.device.begin_command_buffer(cb, &begin_info) }
    }

    unsafe fn end_command_buffer(&self, cb: vk::CommandBuffer) -> VkResult<()> {
        unsafe { self.device.end_command_buffer(cb) }
    }

    unsafe fn cmd_begin_render_pass(&self, cb: vk::CommandBuffer, begin: &RenderPassBegin) {
        let clear = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: begin.clear_color,
            },
        };
        let begin_info = vk::RenderPassBeginInfo::default()
            .render_pass(begin.render_pass)
            .framebuffer(begin.framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent: begin.extent,
            })
            .clear_values(slice::from_ref(&clear));
        unsafe {
            self.device
                .cmd_begin_render_pass(cb, &begin_info, vk::SubpassContents::INLINE)
        }
    }

    unsafe fn cmd_end_render_pass(&self, cb: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_render_pass(cb) }
    }

    unsafe fn cmd_bind_pipeline(&self, cb: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(cb, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    unsafe fn cmd_bind_vertex_buffer(&self, cb: vk::CommandBuffer, binding: u32, buffer: vk::Buffer) {
        unsafe { self.device.cmd_bind_vertex_buffers(cb, binding, &[buffer], &[0]) }
    }

    unsafe fn cmd_bind_index_buffer(
        &self,
        cb: vk::CommandBuffer,
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    ) {
        unsafe { self.device.cmd_bind_index_buffer(cb, buffer, 0, index_type) }
    }

    unsafe fn cmd_bind_descriptor_set(
        &self,
        cb: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                cb,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            )
        }
    }

    unsafe fn cmd_draw_indexed(
        &self,
        cb: vk::CommandBuffer,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.cmd_draw_indexed(
                cb,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        }
    }

    unsafe fn cmd_copy_buffer(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe { self.device.cmd_copy_buffer(cb, src, dst, &[region]) }
    }

    unsafe fn cmd_copy_buffer_to_image(
        &self,
        cb: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Image,
        extent: vk::Extent2D,
    ) {
        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
        };
        unsafe {
            self.device.cmd_copy_buffer_to_image(
                cb,
                src,
                dst,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            )
        }
    }

    unsafe fn cmd_pipeline_barrier(&self, cb: vk::CommandBuffer, barrier: &ImageBarrier) {
        let image_barrier = vk::ImageMemoryBarrier {
            s_type: vk::StructureType::IMAGE_MEMORY_BARRIER,
            src_access_mask: barrier.src_access,
            dst_access_mask: barrier.dst_access,
            old_layout: barrier.old_layout,
            new_layout: barrier.new_layout,
            src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
            image: barrier.image,
            subresource_range: color_subresource_range(),
            ..Default::default()
        };
        unsafe {
            self.device.cmd_pipeline_barrier(
                cb,
                barrier.src_stage,
                barrier.dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[image_barrier],
            )
        }
    }

    unsafe fn create_semaphore(&self) -> VkResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::default();
        unsafe { self.device.create_semaphore(&create_info, None) }
    }

    unsafe fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) }
    }

    unsafe fn create_descriptor_pool(
        &self,
        max_sets: u32,
        sizes: &[vk::DescriptorPoolSize],
    ) -> VkResult<vk::DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(max_sets)
            .pool_sizes(sizes);
        unsafe { self.device.create_descriptor_pool(&create_info, None) }
    }

    unsafe fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) }
    }

    unsafe fn allocate_descriptor_sets(
        &self,
        pool: vk::DescriptorPool,
        layouts: &[vk::DescriptorSetLayout],
    ) -> VkResult<Vec<vk::DescriptorSet>> {
        let allocate_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(layouts);
        unsafe { self.device.allocate_descriptor_sets(&allocate_info) }
    }

    unsafe fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        // Info structs are collected up front so the writes can borrow them.
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        for write in writes {
            match write.resource {
                DescriptorResource::UniformBuffer { buffer, range } => {
                    buffer_infos.push(vk::DescriptorBufferInfo {
                        buffer,
                        offset: 0,
                        range,
                    })
                }
                DescriptorResource::CombinedImageSampler {
                    view,
                    sampler,
                    layout,
                } => image_infos.push(vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: layout,
                }),
            }
        }

        let (mut next_buffer, mut next_image) = (0, 0);
        let mut vk_writes = Vec::with_capacity(writes.len());
        for write in writes {
            let base = vk::WriteDescriptorSet::default()
                .dst_set(set)
                .dst_binding(write.binding)
                .dst_array_element(0)
                .descriptor_type(write.descriptor_type());
            let vk_write = match write.resource {
                DescriptorResource::UniformBuffer { .. } => {
                    let info = &buffer_infos[next_buffer..=next_buffer];
                    next_buffer += 1;
                    base.buffer_info(info)
                }
                DescriptorResource::CombinedImageSampler { .. } => {
                    let info = &image_infos[next_image..=next_image];
                    next_image += 1;
                    base.image_info(info)
                }
            };
            vk_writes.push(vk_write);
        }
        unsafe { self.device.update_descriptor_sets(&vk_writes, &[]) }
    }
}
