//! Recording test doubles for the device and presentation seams

use ash::vk::{self, Handle};
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::config::RendererConfig;
use crate::foundation::time::{Clock, MonotonicClock};
use crate::renderer::{DeviceState, PipelineKind};
use crate::vulkan::{
    AcquireOutcome, DeviceRef, GpuDevice, ImageBarrier, PresentOutcome, PresentationEngine, QueueSubmission,
    VulkanError, VulkanResult, SPIRV_MAGIC,
};

/// Device state over `mock` with every shader registered
pub fn device_state(mock: &Rc<MockDevice>) -> Rc<DeviceState> {
    device_state_with_clock(mock, RendererConfig::default(), Rc::new(MonotonicClock::new()))
}

/// Device state over `mock` with the given config and clock, every shader registered
pub fn device_state_with_clock(mock: &Rc<MockDevice>, config: RendererConfig, clock: Rc<dyn Clock>) -> Rc<DeviceState> {
    let state = DeviceState::with_clock(mock.device(), config, clock).unwrap();
    for kind in PipelineKind::ALL {
        for name in kind.shader_names() {
            state.shaders().insert_spirv(name, &[SPIRV_MAGIC]).unwrap();
        }
    }
    state
}

/// A queue submission as seen by the mock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub wait: Option<vk::Semaphore>,
    pub signal: Option<vk::Semaphore>,
    pub fence: Option<vk::Fence>,
}

/// Device calls in the order they were made
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    AllocateMemory { memory: vk::DeviceMemory, size: vk::DeviceSize, memory_type_index: u32 },
    FreeMemory(vk::DeviceMemory),
    CreateBuffer(vk::Buffer),
    DestroyBuffer(vk::Buffer),
    BindBufferMemory { buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize },
    CreateImage(vk::Image),
    DestroyImage(vk::Image),
    BindImageMemory { image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize },
    CreateImageView(vk::ImageView),
    DestroyImageView(vk::ImageView),
    CreateSampler(vk::Sampler),
    DestroySampler(vk::Sampler),
    CreateSemaphore(vk::Semaphore),
    DestroySemaphore(vk::Semaphore),
    CreateFence(vk::Fence),
    DestroyFence(vk::Fence),
    WaitForFence(vk::Fence),
    ResetFence(vk::Fence),
    AllocateCommandBuffer(vk::CommandBuffer),
    FreeCommandBuffer(vk::CommandBuffer),
    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    BeginRenderPass { render_pass: vk::RenderPass, framebuffer: vk::Framebuffer, area: vk::Rect2D, clear: bool },
    EndRenderPass,
    ClearColour(vk::Rect2D),
    SetViewport(vk::Rect2D),
    SetScissor(vk::Rect2D),
    BindPipeline(vk::Pipeline),
    BindDescriptorSet { layout: vk::PipelineLayout, set: vk::DescriptorSet },
    PushConstants { stages: vk::ShaderStageFlags, data: Vec<u8> },
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    Draw { vertex_count: u32 },
    DrawIndexed { index_count: u32 },
    ImageBarrier { image: vk::Image, old_layout: vk::ImageLayout, new_layout: vk::ImageLayout },
    CopyBufferToImage { buffer: vk::Buffer, image: vk::Image },
    CopyImageToBuffer { image: vk::Image, buffer: vk::Buffer },
    CopyBuffer { src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize },
    CreateRenderPass(vk::RenderPass),
    DestroyRenderPass(vk::RenderPass),
    CreateFramebuffer(vk::Framebuffer),
    DestroyFramebuffer(vk::Framebuffer),
    CreateShaderModule(vk::ShaderModule),
    DestroyShaderModule(vk::ShaderModule),
    CreateDescriptorSetLayout(vk::DescriptorSetLayout),
    DestroyDescriptorSetLayout(vk::DescriptorSetLayout),
    CreateDescriptorPool(vk::DescriptorPool),
    DestroyDescriptorPool(vk::DescriptorPool),
    AllocateDescriptorSet(vk::DescriptorSet),
    FreeDescriptorSet(vk::DescriptorSet),
    UpdateImageDescriptor { set: vk::DescriptorSet, view: vk::ImageView, sampler: vk::Sampler },
    CreatePipelineLayout(vk::PipelineLayout),
    DestroyPipelineLayout(vk::PipelineLayout),
    CreatePipeline(vk::Pipeline),
    DestroyPipeline(vk::Pipeline),
    Submit(RecordedSubmission),
    FailedSubmit,
    WaitIdle,
}

#[derive(Default)]
struct MockState {
    next_handle: u64,
    calls: Vec<Call>,
    memory: HashMap<u64, Option<Box<[u8]>>>,
    buffer_sizes: HashMap<u64, vk::DeviceSize>,
    image_sizes: HashMap<u64, vk::DeviceSize>,
    fences: HashMap<u64, bool>,
}

impl MockState {
    fn handle<T: Handle>(&mut self) -> T {
        self.next_handle += 1;
        T::from_raw(self.next_handle)
    }
}

/// A [`GpuDevice`] that executes nothing and records every call
///
/// Host-visible allocations are backed by real heap memory so mapped writes
/// can be read back. Submissions with a fence signal it immediately unless
/// [`set_fences_never_signal`](Self::set_fences_never_signal) is on.
#[derive(Default)]
pub struct MockDevice {
    state: RefCell<MockState>,
    fences_never_signal: Cell<bool>,
    fail_next_submit: Cell<bool>,
}

impl MockDevice {
    /// Device local only
    pub const DEVICE_LOCAL_TYPE: u32 = 0;
    /// Host visible and coherent
    pub const HOST_VISIBLE_TYPE: u32 = 1;
    /// Device local, host visible and coherent
    pub const SHARED_TYPE: u32 = 2;

    const BUFFER_ALIGNMENT: vk::DeviceSize = 16;
    const IMAGE_ALIGNMENT: vk::DeviceSize = 256;

    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn device(self: &Rc<Self>) -> DeviceRef {
        self.clone()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| predicate(c)).count()
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::Submit(s) => Some(s.clone()),
                _ => None,
            })
            .collect()
    }

    /// Device memory allocations not yet freed
    pub fn live_allocations(&self) -> usize {
        self.state.borrow().memory.len()
    }

    /// Make every fence wait time out and every fence query report unsignaled
    pub fn set_fences_never_signal(&self, never: bool) {
        self.fences_never_signal.set(never);
    }

    /// Fail the next queue submission with `ERROR_DEVICE_LOST`
    pub fn fail_next_submit(&self) {
        self.fail_next_submit.set(true);
    }

    fn record(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    fn create<T: Handle + Copy>(&self, call: impl FnOnce(T) -> Call) -> T {
        let mut state = self.state.borrow_mut();
        let handle = state.handle::<T>();
        state.calls.push(call(handle));
        handle
    }

    fn fence_state(&self, fence: vk::Fence) -> bool {
        !self.fences_never_signal.get() && self.state.borrow().fences.get(&fence.as_raw()).copied().unwrap_or(false)
    }
}

fn round_up(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    size.div_ceil(alignment) * alignment
}

impl GpuDevice for MockDevice {
    fn memory_properties(&self) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: 3,
            memory_heap_count: 1,
            ..Default::default()
        };
        props.memory_types[0].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
        props.memory_types[1].property_flags =
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_types[2].property_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL
            | vk::MemoryPropertyFlags::HOST_VISIBLE
            | vk::MemoryPropertyFlags::HOST_COHERENT;
        props.memory_heaps[0].size = 1 << 32;
        props
    }

    fn allocate_memory(&self, size: vk::DeviceSize, memory_type_index: u32) -> VulkanResult<vk::DeviceMemory> {
        let host_visible = memory_type_index != Self::DEVICE_LOCAL_TYPE;
        let mut state = self.state.borrow_mut();
        let memory: vk::DeviceMemory = state.handle();
        let backing = host_visible.then(|| vec![0u8; size as usize].into_boxed_slice());
        state.memory.insert(memory.as_raw(), backing);
        state.calls.push(Call::AllocateMemory { memory, size, memory_type_index });
        Ok(memory)
    }

    fn free_memory(&self, memory: vk::DeviceMemory) {
        let mut state = self.state.borrow_mut();
        state.memory.remove(&memory.as_raw());
        state.calls.push(Call::FreeMemory(memory));
    }

    fn map_memory(&self, memory: vk::DeviceMemory, _size: vk::DeviceSize) -> VulkanResult<*mut u8> {
        let mut state = self.state.borrow_mut();
        match state.memory.get_mut(&memory.as_raw()) {
            Some(Some(bytes)) => Ok(bytes.as_mut_ptr()),
            _ => Err(VulkanError::Api(vk::Result::ERROR_MEMORY_MAP_FAILED)),
        }
    }

    fn unmap_memory(&self, _memory: vk::DeviceMemory) {}

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> VulkanResult<vk::Buffer> {
        let buffer = self.create(Call::CreateBuffer);
        self.state.borrow_mut().buffer_sizes.insert(buffer.as_raw(), info.size);
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.record(Call::DestroyBuffer(buffer));
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self.state.borrow().buffer_sizes.get(&buffer.as_raw()).copied().unwrap_or(0);
        vk::MemoryRequirements {
            size: round_up(size, Self::BUFFER_ALIGNMENT),
            alignment: Self::BUFFER_ALIGNMENT,
            memory_type_bits: 0b111,
        }
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VulkanResult<()> {
        self.record(Call::BindBufferMemory { buffer, memory, offset });
        Ok(())
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> VulkanResult<vk::Image> {
        let image = self.create(Call::CreateImage);
        let bytes = u64::from(info.extent.width) * u64::from(info.extent.height) * 4;
        self.state.borrow_mut().image_sizes.insert(image.as_raw(), bytes);
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        self.record(Call::DestroyImage(image));
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let size = self.state.borrow().image_sizes.get(&image.as_raw()).copied().unwrap_or(0);
        vk::MemoryRequirements {
            size: round_up(size, Self::IMAGE_ALIGNMENT),
            alignment: Self::IMAGE_ALIGNMENT,
            memory_type_bits: 0b111,
        }
    }

    fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> VulkanResult<()> {
        self.record(Call::BindImageMemory { image, memory, offset });
        Ok(())
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> VulkanResult<vk::ImageView> {
        Ok(self.create(Call::CreateImageView))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.record(Call::DestroyImageView(view));
    }

    fn create_sampler(&self, _info: &vk::SamplerCreateInfo) -> VulkanResult<vk::Sampler> {
        Ok(self.create(Call::CreateSampler))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.record(Call::DestroySampler(sampler));
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        Ok(self.create(Call::CreateSemaphore))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.record(Call::DestroySemaphore(semaphore));
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let fence = self.create(Call::CreateFence);
        self.state.borrow_mut().fences.insert(fence.as_raw(), signaled);
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.borrow_mut();
        state.fences.remove(&fence.as_raw());
        state.calls.push(Call::DestroyFence(fence));
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VulkanResult<bool> {
        self.record(Call::WaitForFence(fence));
        Ok(self.fence_state(fence))
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        let mut state = self.state.borrow_mut();
        state.fences.insert(fence.as_raw(), false);
        state.calls.push(Call::ResetFence(fence));
        Ok(())
    }

    fn fence_signaled(&self, fence: vk::Fence) -> VulkanResult<bool> {
        Ok(self.fence_state(fence))
    }

    fn allocate_command_buffer(&self) -> VulkanResult<vk::CommandBuffer> {
        Ok(self.create(Call::AllocateCommandBuffer))
    }

    fn free_command_buffer(&self, command_buffer: vk::CommandBuffer) {
        self.record(Call::FreeCommandBuffer(command_buffer));
    }

    fn reset_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.record(Call::ResetCommandBuffer(command_buffer));
        Ok(())
    }

    fn begin_command_buffer(&self, command_buffer: vk::CommandBuffer, _one_time_submit: bool) -> VulkanResult<()> {
        self.record(Call::BeginCommandBuffer(command_buffer));
        Ok(())
    }

    fn end_command_buffer(&self, command_buffer: vk::CommandBuffer) -> VulkanResult<()> {
        self.record(Call::EndCommandBuffer(command_buffer));
        Ok(())
    }

    fn cmd_begin_render_pass(
        &self,
        _command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        area: vk::Rect2D,
        clear: Option<[f32; 4]>,
    ) {
        self.record(Call::BeginRenderPass { render_pass, framebuffer, area, clear: clear.is_some() });
    }

    fn cmd_end_render_pass(&self, _command_buffer: vk::CommandBuffer) {
        self.record(Call::EndRenderPass);
    }

    fn cmd_clear_colour(&self, _command_buffer: vk::CommandBuffer, area: vk::Rect2D, _colour: [f32; 4]) {
        self.record(Call::ClearColour(area));
    }

    fn cmd_set_viewport(&self, _command_buffer: vk::CommandBuffer, area: vk::Rect2D) {
        self.record(Call::SetViewport(area));
    }

    fn cmd_set_scissor(&self, _command_buffer: vk::CommandBuffer, area: vk::Rect2D) {
        self.record(Call::SetScissor(area));
    }

    fn cmd_bind_pipeline(&self, _command_buffer: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(Call::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_set(&self, _command_buffer: vk::CommandBuffer, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        self.record(Call::BindDescriptorSet { layout, set });
    }

    fn cmd_push_constants(
        &self,
        _command_buffer: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        _offset: u32,
        data: &[u8],
    ) {
        self.record(Call::PushConstants { stages, data: data.to_vec() });
    }

    fn cmd_bind_vertex_buffer(&self, _command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        self.record(Call::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(&self, _command_buffer: vk::CommandBuffer, buffer: vk::Buffer) {
        self.record(Call::BindIndexBuffer(buffer));
    }

    fn cmd_draw(&self, _command_buffer: vk::CommandBuffer, vertex_count: u32) {
        self.record(Call::Draw { vertex_count });
    }

    fn cmd_draw_indexed(&self, _command_buffer: vk::CommandBuffer, index_count: u32) {
        self.record(Call::DrawIndexed { index_count });
    }

    fn cmd_image_barrier(&self, _command_buffer: vk::CommandBuffer, barrier: &ImageBarrier) {
        self.record(Call::ImageBarrier {
            image: barrier.image,
            old_layout: barrier.old_layout,
            new_layout: barrier.new_layout,
        });
    }

    fn cmd_copy_buffer_to_image(&self, _command_buffer: vk::CommandBuffer, buffer: vk::Buffer, image: vk::Image, _extent: vk::Extent2D) {
        self.record(Call::CopyBufferToImage { buffer, image });
    }

    fn cmd_copy_image_to_buffer(&self, _command_buffer: vk::CommandBuffer, image: vk::Image, buffer: vk::Buffer, _extent: vk::Extent2D) {
        self.record(Call::CopyImageToBuffer { image, buffer });
    }

    fn cmd_copy_buffer(&self, _command_buffer: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        self.record(Call::CopyBuffer { src, dst, size });
    }

    fn create_render_pass(&self, _info: &vk::RenderPassCreateInfo) -> VulkanResult<vk::RenderPass> {
        Ok(self.create(Call::CreateRenderPass))
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.record(Call::DestroyRenderPass(render_pass));
    }

    fn create_framebuffer(&self, _info: &vk::FramebufferCreateInfo) -> VulkanResult<vk::Framebuffer> {
        Ok(self.create(Call::CreateFramebuffer))
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.record(Call::DestroyFramebuffer(framebuffer));
    }

    fn create_shader_module(&self, _code: &[u32]) -> VulkanResult<vk::ShaderModule> {
        Ok(self.create(Call::CreateShaderModule))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.record(Call::DestroyShaderModule(module));
    }

    fn create_descriptor_set_layout(&self, _info: &vk::DescriptorSetLayoutCreateInfo) -> VulkanResult<vk::DescriptorSetLayout> {
        Ok(self.create(Call::CreateDescriptorSetLayout))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.record(Call::DestroyDescriptorSetLayout(layout));
    }

    fn create_descriptor_pool(&self, _info: &vk::DescriptorPoolCreateInfo) -> VulkanResult<vk::DescriptorPool> {
        Ok(self.create(Call::CreateDescriptorPool))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.record(Call::DestroyDescriptorPool(pool));
    }

    fn allocate_descriptor_set(&self, _pool: vk::DescriptorPool, _layout: vk::DescriptorSetLayout) -> VulkanResult<vk::DescriptorSet> {
        Ok(self.create(Call::AllocateDescriptorSet))
    }

    fn free_descriptor_set(&self, _pool: vk::DescriptorPool, set: vk::DescriptorSet) {
        self.record(Call::FreeDescriptorSet(set));
    }

    fn update_image_descriptor(&self, set: vk::DescriptorSet, view: vk::ImageView, sampler: vk::Sampler) {
        self.record(Call::UpdateImageDescriptor { set, view, sampler });
    }

    fn create_pipeline_layout(&self, _info: &vk::PipelineLayoutCreateInfo) -> VulkanResult<vk::PipelineLayout> {
        Ok(self.create(Call::CreatePipelineLayout))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.record(Call::DestroyPipelineLayout(layout));
    }

    fn create_graphics_pipeline(&self, _info: &vk::GraphicsPipelineCreateInfo) -> VulkanResult<vk::Pipeline> {
        Ok(self.create(Call::CreatePipeline))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.record(Call::DestroyPipeline(pipeline));
    }

    fn queue_submit(&self, submission: &QueueSubmission<'_>) -> VulkanResult<()> {
        if self.fail_next_submit.replace(false) {
            self.record(Call::FailedSubmit);
            return Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST));
        }

        let mut state = self.state.borrow_mut();
        if let Some(fence) = submission.fence {
            if !self.fences_never_signal.get() {
                state.fences.insert(fence.as_raw(), true);
            }
        }
        state.calls.push(Call::Submit(RecordedSubmission {
            command_buffers: submission.command_buffers.to_vec(),
            wait: submission.wait.map(|(semaphore, _)| semaphore),
            signal: submission.signal,
            fence: submission.fence,
        }));
        Ok(())
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        self.record(Call::WaitIdle);
        Ok(())
    }
}

/// Presentation calls in the order they were made
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenterCall {
    Acquire { signal: vk::Semaphore },
    Present { image_index: u32, wait: vk::Semaphore },
}

/// A [`PresentationEngine`] replaying scripted outcomes
///
/// With an empty script, acquisition cycles through the images and every
/// present succeeds.
pub struct MockPresenter {
    extent: vk::Extent2D,
    image_views: Vec<vk::ImageView>,
    next_image: u32,
    acquire_script: VecDeque<AcquireOutcome>,
    present_script: VecDeque<PresentOutcome>,
    calls: Vec<PresenterCall>,
}

impl MockPresenter {
    pub fn new(width: u32, height: u32, image_count: u32) -> Self {
        Self {
            extent: vk::Extent2D { width, height },
            image_views: (0..image_count).map(|i| vk::ImageView::from_raw(0xF000 + u64::from(i))).collect(),
            next_image: 0,
            acquire_script: VecDeque::new(),
            present_script: VecDeque::new(),
            calls: Vec::new(),
        }
    }

    pub fn script_acquire(&mut self, outcome: AcquireOutcome) {
        self.acquire_script.push_back(outcome);
    }

    pub fn script_present(&mut self, outcome: PresentOutcome) {
        self.present_script.push_back(outcome);
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.extent = vk::Extent2D { width, height };
    }

    pub fn calls(&self) -> &[PresenterCall] {
        &self.calls
    }
}

impl PresentationEngine for MockPresenter {
    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn format(&self) -> vk::Format {
        vk::Format::B8G8R8A8_UNORM
    }

    fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn acquire_next_image(&mut self, signal: vk::Semaphore, _timeout_ns: u64) -> AcquireOutcome {
        self.calls.push(PresenterCall::Acquire { signal });
        self.acquire_script.pop_front().unwrap_or_else(|| {
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_views.len().max(1) as u32;
            AcquireOutcome::Ready(index)
        })
    }

    fn present(&mut self, image_index: u32, wait: vk::Semaphore) -> PresentOutcome {
        self.calls.push(PresenterCall::Present { image_index, wait });
        self.present_script.pop_front().unwrap_or(PresentOutcome::Presented)
    }

    fn recreate(&mut self) -> VulkanResult<()> {
        Ok(())
    }
}
