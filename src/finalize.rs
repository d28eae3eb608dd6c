//! Per-draw finalization.
//!
//! Some state is incomplete or invalid until combined with other state: the
//! hardware kernel for a shader depends on what else is bound, client
//! constant data has to reach device-visible memory, and an index buffer
//! whose byte offset is not element-aligned must be re-based before the
//! hardware will accept it. `StateTracker::finalize_draw` resolves all of
//! that exactly once per draw, before the encoder consumes state.
//!
//! Three phases run in a fixed order: shader resolution, constant-buffer
//! resolution, index-buffer resolution. Shader resolution is the only phase
//! that raises dirty bits consumed within the same pass, so it must run
//! first.

use tracing::{debug, trace};

use crate::dirty::DirtyState;
use crate::error::{FinalizeError, StageError};
use crate::resource::Resource;
use crate::state::{BufferView, RasterizerState, Shader, ShaderStage, CONSTANT_ELEMENT_FORMAT};
use crate::tracker::StateTracker;

/// Parameters of one draw, supplied fresh per call and not retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawInfo {
    pub indexed: bool,
    pub start: u32,
    pub count: u32,
}

/// The shader-compiler backend, consumed as an opaque kernel chooser.
pub trait KernelSelector {
    /// Select (possibly compiling) the kernel for `shader` appropriate to
    /// the state categories named in `dirty`. Returns whether a different
    /// kernel than before was selected.
    fn select_kernel(&mut self, shader: &Shader, ctx: &StateTracker, dirty: DirtyState) -> bool;

    /// Resolve attribute routing between the fragment shader and its active
    /// upstream stage. Returns whether the routing changed.
    fn select_routing(
        &mut self,
        shader: &Shader,
        upstream: &Shader,
        rasterizer: Option<&RasterizerState>,
    ) -> bool;
}

/// A staged allocation: device-visible memory holding a copy of the
/// requested bytes.
#[derive(Debug, Clone)]
pub struct StagedSlice {
    pub resource: Resource,
    pub offset: u64,
}

/// The upload/staging service.
///
/// Any `stage*` call implicitly opens a write-mapped staging region;
/// [`Uploader::end_pass`] closes it. The finalizer calls `end_pass` exactly
/// once per pass, whether or not anything was staged and whether or not a
/// staging call failed.
pub trait Uploader {
    fn stage(&mut self, alignment: u64, data: &[u8]) -> Result<StagedSlice, StageError>;

    fn stage_from_buffer(
        &mut self,
        alignment: u64,
        offset: u64,
        size: u64,
        src: &Resource,
    ) -> Result<StagedSlice, StageError>;

    fn end_pass(&mut self);
}

impl StateTracker {
    /// Finalize all state for one draw or dispatch.
    ///
    /// Callers must issue every binding mutation for the draw before this,
    /// and must not hand state to the encoder if this fails.
    pub fn finalize_draw(
        &mut self,
        draw: &DrawInfo,
        kernels: &mut dyn KernelSelector,
        uploader: &mut dyn Uploader,
    ) -> Result<(), FinalizeError> {
        self.finalize_shader_states(kernels);

        let result = self
            .finalize_constant_buffers(uploader)
            .map_err(FinalizeError::ConstantBufferStage)
            .and_then(|()| {
                self.finalize_index_buffer(draw, uploader)
                    .map_err(FinalizeError::IndexBufferStage)
            });

        // The staging region must close exactly once per pass, error or not.
        uploader.end_pass();

        result
    }

    fn finalize_shader_states(&mut self, kernels: &mut dyn KernelSelector) {
        for stage in ShaderStage::GRAPHICS {
            let bit = DirtyState::shader_bit(stage);
            let Some(shader) = self.shader(stage).cloned() else {
                continue;
            };

            if self.dirty.contains(bit) {
                // The shader itself changed; reselect against everything it
                // could depend on.
                kernels.select_kernel(&shader, self, DirtyState::all());
            } else if kernels.select_kernel(&shader, self, self.dirty) {
                // A new kernel is a state change the encoder must see.
                debug!(stage = %stage, shader = shader.id(), "kernel swap marks stage dirty");
                self.mark(bit);
            }

            // Attribute routing for the fragment stage depends on whichever
            // of geometry/vertex feeds it, and on the rasterizer.
            if stage == ShaderStage::Fragment
                && self
                    .dirty
                    .intersects(bit | DirtyState::GS | DirtyState::VS | DirtyState::RASTERIZER)
            {
                let upstream = self.gs.clone().or_else(|| self.vs.clone());
                if let Some(upstream) = upstream {
                    if kernels.select_routing(&shader, &upstream, self.rasterizer.as_deref()) {
                        self.mark(bit);
                    }
                }
            }
        }
    }

    fn finalize_constant_buffers(&mut self, uploader: &mut dyn Uploader) -> Result<(), StageError> {
        if !self.dirty.contains(DirtyState::CONSTANT_BUFFER) {
            return Ok(());
        }

        let alignment = u64::from(CONSTANT_ELEMENT_FORMAT.blocksize());

        for stage in ShaderStage::ALL {
            let set = &mut self.cbufs[stage.index()];

            let mut enabled = set.enabled_mask;
            while enabled != 0 {
                let index = enabled.trailing_zeros() as usize;
                enabled &= enabled - 1;

                let slot = &mut set.slots[index];
                if let Some(bytes) = slot.pending.as_deref() {
                    let size = bytes.len() as u64;
                    let staged = uploader.stage(alignment, bytes)?;

                    slot.view = Some(BufferView {
                        offset: staged.offset,
                        size,
                        stride: CONSTANT_ELEMENT_FORMAT.blocksize(),
                        format: CONSTANT_ELEMENT_FORMAT,
                    });
                    slot.resource = Some(staged.resource);
                    slot.pending = None;
                }
            }

            set.count = (u32::BITS - set.enabled_mask.leading_zeros()) as usize;
        }

        Ok(())
    }

    fn finalize_index_buffer(
        &mut self,
        draw: &DrawInfo,
        uploader: &mut dyn Uploader,
    ) -> Result<(), StageError> {
        if !draw.indexed {
            return Ok(());
        }

        assert!(
            self.ib.index_size != 0,
            "indexed draw without an index buffer bound"
        );
        let index_size = u64::from(self.ib.index_size);

        let window_offset = index_size * u64::from(draw.start);
        let window_size = index_size * u64::from(draw.count);

        let staged = if let Some(bytes) = self.ib.pending.as_deref() {
            let window = bytes
                .get(window_offset as usize..(window_offset + window_size) as usize)
                .expect("indexed draw range exceeds the bound client index data");
            Some(uploader.stage(index_size, window)?)
        } else if u64::from(self.ib.offset) % index_size != 0 {
            // Hardware requires the index-buffer base to be element-aligned.
            // Restage the whole logical buffer from its bound offset to get
            // an aligned copy; a windowed stage would leave later draws over
            // the same binding misaligned again.
            let buffer = self
                .ib
                .buffer
                .clone()
                .expect("index binding has neither a buffer nor client data");
            let size = buffer.buffer_size() - u64::from(self.ib.offset);

            trace!(
                offset = self.ib.offset,
                index_size,
                size,
                "misaligned index buffer, restaging whole buffer"
            );
            Some(uploader.stage_from_buffer(index_size, u64::from(self.ib.offset), size, &buffer)?)
        } else {
            None
        };

        if let Some(staged) = staged {
            debug_assert_eq!(staged.offset % index_size, 0);

            self.ib.resolved = Some(staged.resource);
            // A correction added to the draw's own start, so it may be
            // negative.
            self.ib.draw_start_offset = (staged.offset / index_size) as i64 - i64::from(draw.start);

            self.mark(DirtyState::INDEX_BUFFER);
        }

        Ok(())
    }
}
