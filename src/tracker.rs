//! The per-context state aggregate: binding mutators and resource-change
//! propagation.
//!
//! One `StateTracker` exists per logical rendering context and is mutated
//! only by the thread driving that context. Every mutator raises its
//! category's dirty bit unconditionally; there is no value-equality
//! short-circuiting anywhere in this layer. The encoder clears bits after
//! consuming state; nothing here ever does.

use std::sync::Arc;

use tracing::trace;

use crate::dirty::DirtyState;
use crate::resource::{Resource, SamplerView, SoTarget, Surface};
use crate::slots::SlotArray;
use crate::state::{
    BlendColor, BlendState, BufferView, ClipState, ConstantBufferInput, ConstantBufferSet,
    DepthStencilAlphaState, FramebufferState, IndexBufferInput, IndexBufferState, PolyStipple,
    RasterizerState, Sampler, Scissor, Shader, ShaderStage, StencilRef, StreamOutputSet,
    VertexBuffer, VertexBufferSet, VertexElements, Viewport, ViewportSet, CONSTANT_ELEMENT_FORMAT,
    MAX_COLOR_TARGETS, MAX_COMPUTE_RESOURCES, MAX_CONSTANT_BUFFERS, MAX_GLOBAL_BINDINGS,
    MAX_SAMPLERS, MAX_SAMPLER_VIEWS, MAX_SHADER_RESOURCES, MAX_VERTEX_BUFFERS, MAX_VIEWPORTS,
};

pub struct StateTracker {
    pub(crate) dirty: DirtyState,

    pub(crate) blend: Option<Arc<BlendState>>,
    pub(crate) rasterizer: Option<Arc<RasterizerState>>,
    pub(crate) depth_stencil_alpha: Option<Arc<DepthStencilAlphaState>>,

    pub(crate) vs: Option<Shader>,
    pub(crate) gs: Option<Shader>,
    pub(crate) fs: Option<Shader>,
    pub(crate) cs: Option<Shader>,

    pub(crate) samplers: [SlotArray<Sampler, MAX_SAMPLERS>; 4],
    pub(crate) views: [SlotArray<SamplerView, MAX_SAMPLER_VIEWS>; 4],
    pub(crate) cbufs: [ConstantBufferSet; 4],

    pub(crate) fb: FramebufferState,
    pub(crate) vb: VertexBufferSet,
    pub(crate) ve: Option<VertexElements>,
    pub(crate) ib: IndexBufferState,

    pub(crate) viewports: ViewportSet,
    pub(crate) scissors: [Scissor; MAX_VIEWPORTS],
    pub(crate) blend_color: BlendColor,
    pub(crate) stencil_ref: StencilRef,
    pub(crate) sample_mask: u32,
    pub(crate) clip: ClipState,
    pub(crate) poly_stipple: PolyStipple,

    pub(crate) shader_resources: SlotArray<Surface, MAX_SHADER_RESOURCES>,
    pub(crate) so: StreamOutputSet,
    pub(crate) compute_resources: SlotArray<Surface, MAX_COMPUTE_RESOURCES>,
    pub(crate) global_bindings: SlotArray<Resource, MAX_GLOBAL_BINDINGS>,
}

impl StateTracker {
    /// A fresh context starts with every category dirty so the first draw
    /// emits complete hardware state.
    pub fn new() -> Self {
        Self {
            dirty: DirtyState::all(),
            blend: None,
            rasterizer: None,
            depth_stencil_alpha: None,
            vs: None,
            gs: None,
            fs: None,
            cs: None,
            samplers: std::array::from_fn(|_| SlotArray::new()),
            views: std::array::from_fn(|_| SlotArray::new()),
            cbufs: std::array::from_fn(|_| ConstantBufferSet::new()),
            fb: FramebufferState {
                colors: Vec::new(),
                depth_stencil: None,
                num_samples: 1,
            },
            vb: VertexBufferSet::new(),
            ve: None,
            ib: IndexBufferState::default(),
            viewports: ViewportSet::new(),
            scissors: [Scissor::default(); MAX_VIEWPORTS],
            blend_color: BlendColor::default(),
            stencil_ref: StencilRef::default(),
            sample_mask: !0,
            clip: ClipState::default(),
            poly_stipple: PolyStipple::default(),
            shader_resources: SlotArray::new(),
            so: StreamOutputSet::new(),
            compute_resources: SlotArray::new(),
            global_bindings: SlotArray::new(),
        }
    }

    pub fn dirty(&self) -> DirtyState {
        self.dirty
    }

    /// Clear bits the encoder has consumed. This is the encoder's hook only;
    /// no mutator or finalize path in this crate clears bits.
    pub fn clear_dirty_for_encoder(&mut self, consumed: DirtyState) {
        self.dirty &= !consumed;
    }

    pub(crate) fn mark(&mut self, bits: DirtyState) {
        self.dirty |= bits;
    }

    // CSO binds.

    pub fn bind_blend_state(&mut self, blend: Option<Arc<BlendState>>) {
        self.blend = blend;
        self.mark(DirtyState::BLEND);
    }

    pub fn bind_rasterizer_state(&mut self, rasterizer: Option<Arc<RasterizerState>>) {
        self.rasterizer = rasterizer;
        self.mark(DirtyState::RASTERIZER);
    }

    pub fn bind_depth_stencil_alpha_state(&mut self, dsa: Option<Arc<DepthStencilAlphaState>>) {
        self.depth_stencil_alpha = dsa;
        self.mark(DirtyState::DEPTH_STENCIL_ALPHA);
    }

    pub fn blend(&self) -> Option<&BlendState> {
        self.blend.as_deref()
    }

    pub fn rasterizer(&self) -> Option<&RasterizerState> {
        self.rasterizer.as_deref()
    }

    pub fn depth_stencil_alpha(&self) -> Option<&DepthStencilAlphaState> {
        self.depth_stencil_alpha.as_deref()
    }

    // Shader binds.

    fn bind_shader(&mut self, stage: ShaderStage, shader: Option<Shader>) {
        if let Some(shader) = &shader {
            assert_eq!(shader.stage(), stage, "shader bound to the wrong stage");
        }
        match stage {
            ShaderStage::Vertex => self.vs = shader,
            ShaderStage::Geometry => self.gs = shader,
            ShaderStage::Fragment => self.fs = shader,
            ShaderStage::Compute => self.cs = shader,
        }
        self.mark(DirtyState::shader_bit(stage));
    }

    pub fn bind_vertex_shader(&mut self, shader: Option<Shader>) {
        self.bind_shader(ShaderStage::Vertex, shader);
    }

    pub fn bind_geometry_shader(&mut self, shader: Option<Shader>) {
        self.bind_shader(ShaderStage::Geometry, shader);
    }

    pub fn bind_fragment_shader(&mut self, shader: Option<Shader>) {
        self.bind_shader(ShaderStage::Fragment, shader);
    }

    pub fn bind_compute_state(&mut self, shader: Option<Shader>) {
        self.bind_shader(ShaderStage::Compute, shader);
    }

    pub fn shader(&self, stage: ShaderStage) -> Option<&Shader> {
        match stage {
            ShaderStage::Vertex => self.vs.as_ref(),
            ShaderStage::Geometry => self.gs.as_ref(),
            ShaderStage::Fragment => self.fs.as_ref(),
            ShaderStage::Compute => self.cs.as_ref(),
        }
    }

    // Samplers. Graphics stages rebind their sampler set as a unit; the
    // compute stage updates an explicit sub-range.

    fn bind_stage_samplers(&mut self, stage: ShaderStage, samplers: Option<&[Sampler]>) {
        let count = samplers.map_or(0, |s| s.len());
        self.samplers[stage.index()].replace_range(0, count, samplers);
        self.mark(DirtyState::sampler_bit(stage));
    }

    pub fn bind_vertex_samplers(&mut self, samplers: Option<&[Sampler]>) {
        self.bind_stage_samplers(ShaderStage::Vertex, samplers);
    }

    pub fn bind_geometry_samplers(&mut self, samplers: Option<&[Sampler]>) {
        self.bind_stage_samplers(ShaderStage::Geometry, samplers);
    }

    pub fn bind_fragment_samplers(&mut self, samplers: Option<&[Sampler]>) {
        self.bind_stage_samplers(ShaderStage::Fragment, samplers);
    }

    pub fn bind_compute_samplers(&mut self, start: usize, count: usize, samplers: Option<&[Sampler]>) {
        self.samplers[ShaderStage::Compute.index()].sparse_update(start, count, samplers);
        self.mark(DirtyState::COMPUTE_SAMPLERS);
    }

    pub fn samplers(&self, stage: ShaderStage) -> &SlotArray<Sampler, MAX_SAMPLERS> {
        &self.samplers[stage.index()]
    }

    // Sampler views, same split as samplers.

    fn set_stage_sampler_views(&mut self, stage: ShaderStage, views: Option<&[SamplerView]>) {
        let count = views.map_or(0, |v| v.len());
        self.views[stage.index()].replace_range(0, count, views);
        self.mark(DirtyState::sampler_view_bit(stage));
    }

    pub fn set_vertex_sampler_views(&mut self, views: Option<&[SamplerView]>) {
        self.set_stage_sampler_views(ShaderStage::Vertex, views);
    }

    pub fn set_geometry_sampler_views(&mut self, views: Option<&[SamplerView]>) {
        self.set_stage_sampler_views(ShaderStage::Geometry, views);
    }

    pub fn set_fragment_sampler_views(&mut self, views: Option<&[SamplerView]>) {
        self.set_stage_sampler_views(ShaderStage::Fragment, views);
    }

    pub fn set_compute_sampler_views(&mut self, start: usize, count: usize, views: Option<&[SamplerView]>) {
        self.views[ShaderStage::Compute.index()].sparse_update(start, count, views);
        self.mark(DirtyState::COMPUTE_SAMPLER_VIEWS);
    }

    pub fn sampler_views(&self, stage: ShaderStage) -> &SlotArray<SamplerView, MAX_SAMPLER_VIEWS> {
        &self.views[stage.index()]
    }

    // Constant buffers.

    pub fn set_constant_buffer(
        &mut self,
        stage: ShaderStage,
        index: usize,
        input: Option<ConstantBufferInput<'_>>,
    ) {
        assert!(
            index < MAX_CONSTANT_BUFFERS,
            "constant buffer slot {} exceeds capacity {}",
            index,
            MAX_CONSTANT_BUFFERS
        );

        let set = &mut self.cbufs[stage.index()];
        let slot = &mut set.slots[index];

        match input {
            Some(ConstantBufferInput::Buffer { buffer, offset, size }) => {
                debug_assert!(buffer.is_buffer());
                slot.view = Some(BufferView {
                    offset,
                    size,
                    stride: CONSTANT_ELEMENT_FORMAT.blocksize(),
                    format: CONSTANT_ELEMENT_FORMAT,
                });
                slot.resource = Some(buffer);
                slot.pending = None;
                set.enabled_mask |= 1 << index;
            }
            Some(ConstantBufferInput::User(data)) => {
                // The byte offset of a committed binding does not apply to
                // client data; the staged copy starts at the span.
                slot.resource = None;
                slot.view = None;
                slot.pending = Some(data.to_vec());
                set.enabled_mask |= 1 << index;
            }
            None => {
                slot.clear();
                set.enabled_mask &= !(1 << index);
            }
        }

        self.mark(DirtyState::CONSTANT_BUFFER);
    }

    pub fn constant_buffers(&self, stage: ShaderStage) -> &ConstantBufferSet {
        &self.cbufs[stage.index()]
    }

    // Framebuffer.

    pub fn set_framebuffer(&mut self, colors: &[Surface], depth_stencil: Option<&Surface>) {
        assert!(
            colors.len() <= MAX_COLOR_TARGETS,
            "{} color targets exceeds capacity {}",
            colors.len(),
            MAX_COLOR_TARGETS
        );

        self.fb.colors = colors.to_vec();
        self.fb.depth_stencil = depth_stencil.cloned();

        let num_samples = if let Some(first) = colors.first() {
            first.resource().desc().nr_samples
        } else if let Some(zs) = depth_stencil {
            zs.resource().desc().nr_samples
        } else {
            1
        };
        self.fb.num_samples = num_samples.max(1);

        self.mark(DirtyState::FRAMEBUFFER);
    }

    pub fn framebuffer(&self) -> &FramebufferState {
        &self.fb
    }

    // Vertex state.

    pub fn set_vertex_buffers(
        &mut self,
        start: usize,
        count: usize,
        buffers: Option<&[Option<VertexBuffer>]>,
    ) {
        assert!(
            start + count <= MAX_VERTEX_BUFFERS,
            "vertex buffer range {}..{} exceeds capacity {}",
            start,
            start + count,
            MAX_VERTEX_BUFFERS
        );

        match buffers {
            Some(list) => {
                assert_eq!(list.len(), count, "vertex buffer list length mismatch");
                for (i, binding) in list.iter().enumerate() {
                    let slot = start + i;
                    match binding {
                        Some(vb) => {
                            debug_assert!(vb.buffer.is_buffer());
                            self.vb.slots[slot] = Some(vb.clone());
                            self.vb.enabled_mask |= 1 << slot;
                        }
                        None => {
                            self.vb.slots[slot] = None;
                            self.vb.enabled_mask &= !(1 << slot);
                        }
                    }
                }
            }
            None => {
                for slot in start..start + count {
                    self.vb.slots[slot] = None;
                    self.vb.enabled_mask &= !(1 << slot);
                }
            }
        }

        self.mark(DirtyState::VERTEX_BUFFERS);
    }

    pub fn vertex_buffers(&self) -> &VertexBufferSet {
        &self.vb
    }

    pub fn bind_vertex_elements(&mut self, elements: Option<VertexElements>) {
        self.ve = elements;
        self.mark(DirtyState::VERTEX_ELEMENTS);
    }

    pub fn vertex_elements(&self) -> Option<&VertexElements> {
        self.ve.as_ref()
    }

    pub fn set_index_buffer(&mut self, input: Option<IndexBufferInput<'_>>) {
        match input {
            Some(IndexBufferInput::Buffer { buffer, offset, index_size }) => {
                assert!(
                    matches!(index_size, 1 | 2 | 4),
                    "unsupported index size {index_size}"
                );
                debug_assert!(buffer.is_buffer());

                // The resolved form starts out pointing at the bound buffer;
                // finalize replaces it when the offset needs re-basing.
                self.ib.resolved = Some(buffer.clone());
                self.ib.draw_start_offset = i64::from(offset / index_size);

                self.ib.buffer = Some(buffer);
                self.ib.offset = offset;
                self.ib.index_size = index_size;
                self.ib.pending = None;
            }
            Some(IndexBufferInput::User { data, index_size }) => {
                assert!(
                    matches!(index_size, 1 | 2 | 4),
                    "unsupported index size {index_size}"
                );

                // The byte offset of a committed binding does not apply to
                // client data.
                self.ib.buffer = None;
                self.ib.offset = 0;
                self.ib.index_size = index_size;
                self.ib.pending = Some(data.to_vec());

                self.ib.resolved = None;
                self.ib.draw_start_offset = 0;
            }
            None => {
                self.ib = IndexBufferState::default();
            }
        }

        self.mark(DirtyState::INDEX_BUFFER);
    }

    pub fn index_buffer(&self) -> &IndexBufferState {
        &self.ib
    }

    // Fixed-function scalars and small structs.

    pub fn set_viewports(&mut self, start: usize, count: usize, viewports: Option<&[Viewport]>) {
        assert!(
            start + count <= MAX_VIEWPORTS,
            "viewport range {}..{} exceeds capacity {}",
            start,
            start + count,
            MAX_VIEWPORTS
        );

        match viewports {
            Some(list) => {
                assert_eq!(list.len(), count, "viewport list length mismatch");
                self.viewports.slots[start..start + count].copy_from_slice(list);

                if self.viewports.count < start + count {
                    self.viewports.count = start + count;
                }

                if start == 0 && count > 0 {
                    self.viewports.viewport0 = list[0];
                }
            }
            None => {
                if self.viewports.count <= start + count && self.viewports.count > start {
                    self.viewports.count = start;
                }
            }
        }

        self.mark(DirtyState::VIEWPORT);
    }

    pub fn viewports(&self) -> &ViewportSet {
        &self.viewports
    }

    pub fn set_scissors(&mut self, start: usize, scissors: &[Scissor]) {
        assert!(
            start + scissors.len() <= MAX_VIEWPORTS,
            "scissor range {}..{} exceeds capacity {}",
            start,
            start + scissors.len(),
            MAX_VIEWPORTS
        );
        self.scissors[start..start + scissors.len()].copy_from_slice(scissors);
        self.mark(DirtyState::SCISSOR);
    }

    pub fn scissor(&self, slot: usize) -> &Scissor {
        &self.scissors[slot]
    }

    pub fn set_blend_color(&mut self, color: BlendColor) {
        self.blend_color = color;
        self.mark(DirtyState::BLEND_COLOR);
    }

    pub fn blend_color(&self) -> &BlendColor {
        &self.blend_color
    }

    pub fn set_stencil_ref(&mut self, stencil_ref: StencilRef) {
        self.stencil_ref = stencil_ref;
        self.mark(DirtyState::STENCIL_REF);
    }

    pub fn stencil_ref(&self) -> &StencilRef {
        &self.stencil_ref
    }

    pub fn set_sample_mask(&mut self, mask: u32) {
        self.sample_mask = mask;
        self.mark(DirtyState::SAMPLE_MASK);
    }

    pub fn sample_mask(&self) -> u32 {
        self.sample_mask
    }

    pub fn set_clip_state(&mut self, clip: ClipState) {
        self.clip = clip;
        self.mark(DirtyState::CLIP);
    }

    pub fn clip_state(&self) -> &ClipState {
        &self.clip
    }

    pub fn set_polygon_stipple(&mut self, stipple: PolyStipple) {
        self.poly_stipple = stipple;
        self.mark(DirtyState::POLY_STIPPLE);
    }

    pub fn polygon_stipple(&self) -> &PolyStipple {
        &self.poly_stipple
    }

    // Image/surface resources and stream output.

    pub fn set_shader_resources(&mut self, start: usize, count: usize, surfaces: Option<&[Surface]>) {
        self.shader_resources.sparse_update(start, count, surfaces);
        self.mark(DirtyState::SHADER_RESOURCES);
    }

    pub fn shader_resources(&self) -> &SlotArray<Surface, MAX_SHADER_RESOURCES> {
        &self.shader_resources
    }

    pub fn set_stream_output_targets(&mut self, targets: Option<&[SoTarget]>, append_bitmask: u32) {
        let count = targets.map_or(0, |t| t.len());
        self.so.targets.replace_range(0, count, targets);
        self.so.append_bitmask = append_bitmask;
        self.so.enabled = self.so.targets.count() > 0;
        self.mark(DirtyState::STREAM_OUTPUT_TARGETS);
    }

    pub fn stream_output(&self) -> &StreamOutputSet {
        &self.so
    }

    pub fn set_compute_resources(&mut self, start: usize, count: usize, surfaces: Option<&[Surface]>) {
        self.compute_resources.sparse_update(start, count, surfaces);
        self.mark(DirtyState::COMPUTE_RESOURCES);
    }

    pub fn compute_resources(&self) -> &SlotArray<Surface, MAX_COMPUTE_RESOURCES> {
        &self.compute_resources
    }

    pub fn set_global_bindings(&mut self, start: usize, count: usize, resources: Option<&[Resource]>) {
        self.global_bindings.sparse_update(start, count, resources);
        self.mark(DirtyState::GLOBAL_BINDING);
    }

    pub fn global_bindings(&self) -> &SlotArray<Resource, MAX_GLOBAL_BINDINGS> {
        &self.global_bindings
    }

    /// Mark every category that references `res` dirty.
    ///
    /// The resource-invalidation path must call this whenever a resource's
    /// backing storage changes identity (free, reallocation, rewrite); it is
    /// the only way a pending draw learns that a handle it holds went stale.
    /// Each matching category's bit is raised once, however many slots
    /// matched.
    pub fn mark_states_with_resource_dirty(&mut self, res: &Resource) {
        let mut states = DirtyState::empty();

        if res.is_buffer() {
            let mut vb_mask = self.vb.enabled_mask;
            while vb_mask != 0 {
                let idx = vb_mask.trailing_zeros() as usize;
                vb_mask &= vb_mask - 1;

                if self.vb.slots[idx]
                    .as_ref()
                    .is_some_and(|vb| vb.buffer.same_as(res))
                {
                    states |= DirtyState::VERTEX_BUFFERS;
                    break;
                }
            }

            if self.ib.buffer.as_ref().is_some_and(|b| b.same_as(res)) {
                states |= DirtyState::INDEX_BUFFER;
            }

            for (_, target) in self.so.targets.iter_bound() {
                if target.buffer().same_as(res) {
                    states |= DirtyState::STREAM_OUTPUT_TARGETS;
                    break;
                }
            }
        }

        for stage in ShaderStage::ALL {
            // Views match on the underlying resource, not view identity.
            for (_, view) in self.views[stage.index()].iter_bound() {
                if view.resource().same_as(res) {
                    states |= DirtyState::sampler_view_bit(stage);
                    break;
                }
            }

            if res.is_buffer() {
                for slot in &self.cbufs[stage.index()].slots {
                    if slot.resource.as_ref().is_some_and(|b| b.same_as(res)) {
                        states |= DirtyState::CONSTANT_BUFFER;
                        break;
                    }
                }
            }
        }

        for (_, surface) in self.shader_resources.iter_bound() {
            if surface.resource().same_as(res) {
                states |= DirtyState::SHADER_RESOURCES;
                break;
            }
        }

        // Framebuffer attachments are texture-backed only; buffer-backed
        // attachments are not tracked here. Known limitation.
        if !res.is_buffer() {
            for color in &self.fb.colors {
                if color.resource().same_as(res) {
                    states |= DirtyState::FRAMEBUFFER;
                    break;
                }
            }

            if self
                .fb
                .depth_stencil
                .as_ref()
                .is_some_and(|zs| zs.resource().same_as(res))
            {
                states |= DirtyState::FRAMEBUFFER;
            }
        }

        for (_, surface) in self.compute_resources.iter_bound() {
            if surface.resource().same_as(res) {
                states |= DirtyState::COMPUTE_RESOURCES;
                break;
            }
        }

        for (_, bound) in self.global_bindings.iter_bound() {
            if bound.same_as(res) {
                states |= DirtyState::GLOBAL_BINDING;
                break;
            }
        }

        if !states.is_empty() {
            trace!(resource = res.id(), ?states, "resource change marks states dirty");
        }

        self.mark(states);
    }
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}
