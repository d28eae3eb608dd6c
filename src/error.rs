use thiserror::Error;

/// Failure while staging client data into device-visible memory.
///
/// These are runtime conditions (allocation exhaustion in the upload
/// service), not caller bugs; slot-range violations and other contract
/// breaches are fatal assertions instead.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("upload arena out of space: requested {requested} bytes (alignment {alignment}), remaining {remaining} bytes (capacity {capacity} bytes)")]
    OutOfSpace {
        requested: u64,
        alignment: u64,
        remaining: u64,
        capacity: u64,
    },
    #[error("staging request too large: {requested} bytes, max {max} bytes")]
    TooLarge { requested: u64, max: u64 },
}

/// A draw failed to finalize. The caller must not hand the state off to the
/// encoder; there is no retry within this crate.
#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("constant buffer staging failed")]
    ConstantBufferStage(#[source] StageError),
    #[error("index buffer staging failed")]
    IndexBufferStage(#[source] StageError),
}
