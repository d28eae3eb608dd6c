//! Pipeline state descriptors and per-category binding containers.
//!
//! Descriptor structs are "semantic" types, independent of any front-end
//! API's raw constants. The binding containers in the second half of the
//! file carry the bookkeeping (enabled masks, occupancy counts, pending
//! client data) the finalizer and the encoder read.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::format::Format;
use crate::resource::{Resource, Surface};

/// Sampler units per shader stage.
pub const MAX_SAMPLERS: usize = 16;
/// Sampler-view units per shader stage.
pub const MAX_SAMPLER_VIEWS: usize = 16;
/// Constant-buffer slots per shader stage. Must stay within the width of the
/// per-stage enabled mask.
pub const MAX_CONSTANT_BUFFERS: usize = 16;
/// Vertex-buffer slots. Must stay within the width of the enabled mask.
pub const MAX_VERTEX_BUFFERS: usize = 32;
pub const MAX_SHADER_RESOURCES: usize = 16;
pub const MAX_COMPUTE_RESOURCES: usize = 16;
pub const MAX_GLOBAL_BINDINGS: usize = 16;
pub const MAX_STREAM_OUTPUT_TARGETS: usize = 4;
pub const MAX_VIEWPORTS: usize = 16;
pub const MAX_COLOR_TARGETS: usize = 8;

/// Constant buffers are always viewed as arrays of 4-component 32-bit float
/// elements.
pub const CONSTANT_ELEMENT_FORMAT: Format = Format::R32G32B32A32Float;

/// Shader stages tracked by the context.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub const ALL: [ShaderStage; 4] = [
        ShaderStage::Vertex,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
        ShaderStage::Compute,
    ];

    /// The graphics stages, in pipeline order.
    pub const GRAPHICS: [ShaderStage; 3] = [
        ShaderStage::Vertex,
        ShaderStage::Geometry,
        ShaderStage::Fragment,
    ];

    pub fn index(self) -> usize {
        match self {
            ShaderStage::Vertex => 0,
            ShaderStage::Geometry => 1,
            ShaderStage::Fragment => 2,
            ShaderStage::Compute => 3,
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Geometry => "geometry",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        };
        f.write_str(s)
    }
}

static NEXT_SHADER_ID: AtomicU64 = AtomicU64::new(1);

struct ShaderInner {
    id: u64,
    stage: ShaderStage,
}

/// A compiled-shader handle.
///
/// The kernel-selection backend owns everything about the shader's
/// hardware-executable forms; this handle only carries identity and the
/// stage it was created for.
#[derive(Clone)]
pub struct Shader {
    inner: Arc<ShaderInner>,
}

impl Shader {
    pub fn new(stage: ShaderStage) -> Self {
        Self {
            inner: Arc::new(ShaderInner {
                id: NEXT_SHADER_ID.fetch_add(1, Ordering::Relaxed),
                stage,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn stage(&self) -> ShaderStage {
        self.inner.stage
    }

    pub fn same_as(&self, other: &Shader) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Shader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shader")
            .field("id", &self.inner.id)
            .field("stage", &self.inner.stage)
            .finish()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum CompareFunc {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    #[default]
    Always,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum BlendFactor {
    #[default]
    One,
    Zero,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DstColor,
    InvDstColor,
    DstAlpha,
    InvDstAlpha,
    Constant,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum BlendOp {
    #[default]
    Add,
    Subtract,
    RevSubtract,
    Min,
    Max,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrSat,
    DecrSat,
    Invert,
    Incr,
    Decr,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlendState {
    pub blend_enable: bool,
    pub src_factor: BlendFactor,
    pub dst_factor: BlendFactor,
    pub op: BlendOp,
    pub src_alpha_factor: BlendFactor,
    pub dst_alpha_factor: BlendFactor,
    pub alpha_op: BlendOp,
    pub color_write_mask: u8,
    pub independent_blend_enable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub flat_shade: bool,
    pub light_twoside: bool,
    pub sprite_coord_enable: u32,
    pub scissor_enable: bool,
    pub poly_stipple_enable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StencilFace {
    pub func: CompareFunc,
    pub fail_op: StencilOp,
    pub depth_fail_op: StencilOp,
    pub pass_op: StencilOp,
    pub read_mask: u8,
    pub write_mask: u8,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DepthStencilAlphaState {
    pub depth_enable: bool,
    pub depth_write_enable: bool,
    pub depth_func: CompareFunc,
    pub stencil_enable: bool,
    pub stencil_front: StencilFace,
    pub stencil_back: StencilFace,
    pub alpha_enable: bool,
    pub alpha_func: CompareFunc,
    pub alpha_ref: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    #[default]
    Nearest,
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WrapMode {
    #[default]
    Repeat,
    ClampToEdge,
    MirrorRepeat,
    ClampToBorder,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SamplerDesc {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: Filter,
    pub wrap_u: WrapMode,
    pub wrap_v: WrapMode,
    pub wrap_w: WrapMode,
    pub lod_bias: f32,
    pub compare: Option<CompareFunc>,
}

/// An immutable sampler-state object, bound by handle into sampler slots.
#[derive(Clone)]
pub struct Sampler {
    inner: Arc<SamplerDesc>,
}

impl Sampler {
    pub fn new(desc: SamplerDesc) -> Self {
        Self { inner: Arc::new(desc) }
    }

    pub fn desc(&self) -> &SamplerDesc {
        &self.inner
    }

    pub fn same_as(&self, other: &Sampler) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexElement {
    pub src_offset: u32,
    pub vertex_buffer_index: u32,
    pub src_format: Format,
    pub instance_divisor: u32,
}

/// An immutable vertex-element layout object.
#[derive(Clone)]
pub struct VertexElements {
    inner: Arc<Vec<VertexElement>>,
}

impl VertexElements {
    pub fn new(elements: Vec<VertexElement>) -> Self {
        Self {
            inner: Arc::new(elements),
        }
    }

    pub fn elements(&self) -> &[VertexElement] {
        &self.inner
    }
}

impl fmt::Debug for VertexElements {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.inner.iter()).finish()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scissor {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BlendColor {
    pub color: [f32; 4],
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StencilRef {
    pub front: u8,
    pub back: u8,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipState {
    pub user_planes: [[f32; 4]; 8],
}

impl Default for ClipState {
    fn default() -> Self {
        Self {
            user_planes: [[0.0; 4]; 8],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolyStipple {
    pub pattern: [u32; 32],
}

impl Default for PolyStipple {
    fn default() -> Self {
        Self { pattern: [0; 32] }
    }
}

/// One vertex-buffer slot binding.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexBuffer {
    pub buffer: Resource,
    pub offset: u32,
    pub stride: u32,
}

/// Vertex-buffer slots with a per-slot enabled mask.
#[derive(Debug)]
pub struct VertexBufferSet {
    pub(crate) slots: [Option<VertexBuffer>; MAX_VERTEX_BUFFERS],
    pub(crate) enabled_mask: u32,
}

impl VertexBufferSet {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
            enabled_mask: 0,
        }
    }

    pub fn enabled_mask(&self) -> u32 {
        self.enabled_mask
    }

    pub fn get(&self, slot: usize) -> Option<&VertexBuffer> {
        self.slots.get(slot).and_then(|s| s.as_ref())
    }
}

/// The precomputed view descriptor over a constant-buffer range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView {
    pub offset: u64,
    pub size: u64,
    pub stride: u32,
    pub format: Format,
}

/// One constant-buffer slot: either a committed device buffer with its view,
/// or client bytes waiting to be staged at the next finalize. The two are
/// mutually exclusive.
#[derive(Debug, Default, Clone)]
pub struct ConstantBufferSlot {
    pub(crate) resource: Option<Resource>,
    pub(crate) view: Option<BufferView>,
    pub(crate) pending: Option<Vec<u8>>,
}

impl ConstantBufferSlot {
    pub fn resource(&self) -> Option<&Resource> {
        self.resource.as_ref()
    }

    pub fn view(&self) -> Option<&BufferView> {
        self.view.as_ref()
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.resource = None;
        self.view = None;
        self.pending = None;
    }
}

/// Per-stage constant-buffer slots plus the enabled mask and occupancy
/// count. The count is recomputed from the mask by each finalize pass that
/// touches constant buffers.
#[derive(Debug)]
pub struct ConstantBufferSet {
    pub(crate) slots: [ConstantBufferSlot; MAX_CONSTANT_BUFFERS],
    pub(crate) enabled_mask: u32,
    pub(crate) count: usize,
}

impl ConstantBufferSet {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| ConstantBufferSlot::default()),
            enabled_mask: 0,
            count: 0,
        }
    }

    pub fn enabled_mask(&self) -> u32 {
        self.enabled_mask
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn slot(&self, index: usize) -> &ConstantBufferSlot {
        &self.slots[index]
    }
}

/// What a constant-buffer slot is bound to.
#[derive(Debug)]
pub enum ConstantBufferInput<'a> {
    /// A committed device buffer range.
    Buffer {
        buffer: Resource,
        offset: u64,
        size: u64,
    },
    /// Client bytes; copied now, staged into device memory at finalize.
    User(&'a [u8]),
}

/// What the index-buffer binding points at.
#[derive(Debug)]
pub enum IndexBufferInput<'a> {
    Buffer {
        buffer: Resource,
        offset: u32,
        index_size: u32,
    },
    User {
        data: &'a [u8],
        index_size: u32,
    },
}

/// The persistent index-buffer descriptor plus its finalized form.
///
/// `resolved`/`draw_start_offset` are only valid after a finalize pass; the
/// persistent half survives across draws.
#[derive(Debug, Default)]
pub struct IndexBufferState {
    pub(crate) buffer: Option<Resource>,
    pub(crate) offset: u32,
    pub(crate) index_size: u32,
    pub(crate) pending: Option<Vec<u8>>,

    pub(crate) resolved: Option<Resource>,
    /// Correction in elements, added to the draw's own start by the encoder.
    /// Negative values are legal.
    pub(crate) draw_start_offset: i64,
}

impl IndexBufferState {
    pub fn buffer(&self) -> Option<&Resource> {
        self.buffer.as_ref()
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn index_size(&self) -> u32 {
        self.index_size
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn resolved(&self) -> Option<&Resource> {
        self.resolved.as_ref()
    }

    pub fn draw_start_offset(&self) -> i64 {
        self.draw_start_offset
    }
}

/// Framebuffer attachments plus the derived sample count.
#[derive(Debug, Default)]
pub struct FramebufferState {
    pub(crate) colors: Vec<Surface>,
    pub(crate) depth_stencil: Option<Surface>,
    pub(crate) num_samples: u32,
}

impl FramebufferState {
    pub fn colors(&self) -> &[Surface] {
        &self.colors
    }

    pub fn depth_stencil(&self) -> Option<&Surface> {
        self.depth_stencil.as_ref()
    }

    pub fn num_samples(&self) -> u32 {
        self.num_samples
    }
}

/// Viewport slots. Slot 0 is additionally retained separately for internal
/// blit-style consumers that need to restore it.
#[derive(Debug)]
pub struct ViewportSet {
    pub(crate) slots: [Viewport; MAX_VIEWPORTS],
    pub(crate) count: usize,
    pub(crate) viewport0: Viewport,
}

impl ViewportSet {
    pub(crate) fn new() -> Self {
        Self {
            slots: [Viewport::default(); MAX_VIEWPORTS],
            count: 0,
            viewport0: Viewport::default(),
        }
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn get(&self, slot: usize) -> &Viewport {
        &self.slots[slot]
    }

    pub fn viewport0(&self) -> &Viewport {
        &self.viewport0
    }
}

/// Stream-output target bindings.
#[derive(Debug)]
pub struct StreamOutputSet {
    pub(crate) targets: crate::slots::SlotArray<crate::resource::SoTarget, MAX_STREAM_OUTPUT_TARGETS>,
    pub(crate) append_bitmask: u32,
    pub(crate) enabled: bool,
}

impl StreamOutputSet {
    pub(crate) fn new() -> Self {
        Self {
            targets: crate::slots::SlotArray::new(),
            append_bitmask: 0,
            enabled: false,
        }
    }

    pub fn targets(&self) -> &crate::slots::SlotArray<crate::resource::SoTarget, MAX_STREAM_OUTPUT_TARGETS> {
        &self.targets
    }

    pub fn append_bitmask(&self) -> u32 {
        self.append_bitmask
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}
