//! `aero-pipe-state` is the state-tracking core of a GPU command-producing
//! layer: it sits between a generic rendering front end and hardware command
//! generation.
//!
//! Front-end code installs many independent pieces of pipeline configuration
//! (shaders, blend/rasterizer/depth-stencil objects, buffers, sampler views,
//! viewports, stream-output targets, compute resources). Some of that state
//! is incomplete until combined with other state, so this crate provides:
//!
//! - per-category dirty tracking ([`DirtyState`]), accumulated by every
//!   mutator and cleared only by the hardware encoder;
//! - bounded, trimmable per-slot binding arrays ([`SlotArray`]);
//! - resource-invalidation propagation
//!   ([`StateTracker::mark_states_with_resource_dirty`]);
//! - once-per-draw deferred finalization ([`StateTracker::finalize_draw`]),
//!   which resolves shader kernels and stages client data through an
//!   [`Uploader`] such as [`UploadArena`].
//!
//! Kernel selection, memory allocation policy and the hardware wire format
//! all live behind the collaborator traits; nothing here touches a device.

mod arena;
mod dirty;
mod error;
mod finalize;
mod format;
mod resource;
mod slots;
mod state;
mod tracker;
mod upload;

pub use dirty::DirtyState;
pub use error::{FinalizeError, StageError};
pub use finalize::{DrawInfo, KernelSelector, StagedSlice, Uploader};
pub use format::{mip_dim, Format};
pub use resource::{Resource, ResourceDesc, ResourceKind, SamplerView, SoTarget, Surface, ViewRange};
pub use slots::SlotArray;
pub use state::{
    BlendColor, BlendFactor, BlendOp, BlendState, BufferView, ClipState, CompareFunc,
    ConstantBufferInput, ConstantBufferSet, ConstantBufferSlot, CullMode, DepthStencilAlphaState,
    Filter, FramebufferState, IndexBufferInput, IndexBufferState, PolyStipple, RasterizerState,
    Sampler, SamplerDesc, Scissor, Shader, ShaderStage, StencilFace, StencilOp, StencilRef,
    StreamOutputSet, VertexBuffer, VertexBufferSet, VertexElement, VertexElements, Viewport,
    ViewportSet, WrapMode, CONSTANT_ELEMENT_FORMAT, MAX_COLOR_TARGETS, MAX_COMPUTE_RESOURCES,
    MAX_CONSTANT_BUFFERS, MAX_GLOBAL_BINDINGS, MAX_SAMPLERS, MAX_SAMPLER_VIEWS,
    MAX_SHADER_RESOURCES, MAX_STREAM_OUTPUT_TARGETS, MAX_VERTEX_BUFFERS, MAX_VIEWPORTS,
};
pub use tracker::StateTracker;
pub use upload::{PendingCopy, PendingWrite, UploadArena, UploadArenaDescriptor, UploadStats};
