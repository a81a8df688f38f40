use thiserror::Error;

/// I/O errors that can occur when talking to remote or local storage
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from S3 or S3-compatible storage
    #[error("S3 error: {0}")]
    S3(String),

    /// Network or connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),

    /// Error reading or writing the local filesystem
    #[error("Local storage error: {0}")]
    Local(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        IoError::Local(err.to_string())
    }
}

/// Errors raised while making a remote resource available on local storage.
///
/// Cloneable so that a single failed transfer can be broadcast to every
/// caller waiting on it.
#[derive(Debug, Clone, Error)]
pub enum MaterializeError {
    /// The object does not exist in the remote store
    #[error("Remote object not found: {0}")]
    NotFound(String),

    /// The resource id or variant is not a plain path component
    #[error("Invalid resource name: {0:?}")]
    InvalidName(String),

    /// The transfer started but did not complete
    #[error("Transfer of {key} failed: {reason}")]
    TransferFailed { key: String, reason: String },
}

/// Errors raised by an image decoder.
#[derive(Debug, Clone, Error)]
pub enum SlideError {
    /// The file could not be opened or is not a decodable image
    #[error("Failed to open slide {path}: {message}")]
    Open { path: String, message: String },

    /// A native pyramid level was requested that the image does not have
    #[error("Native level {level} does not exist (image has {levels} levels)")]
    NoSuchLevel { level: usize, levels: usize },

    /// Reading a region from an opened image failed
    #[error("Failed to read region: {0}")]
    Read(String),
}

/// Errors that can occur while serving a tile or a tile descriptor.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Slide is unknown or not owned by the caller
    #[error("Slide not found: {slide_id}")]
    SlideNotFound { slide_id: u64 },

    /// Deep Zoom level outside the pyramid
    #[error("Invalid level {level}: pyramid has {levels} levels")]
    InvalidLevel { level: usize, levels: usize },

    /// Tile origin lies outside the level
    #[error("Tile ({col}, {row}) at level {level} is out of bounds for {width}x{height}")]
    TileOutOfBounds {
        level: usize,
        col: u32,
        row: u32,
        width: u32,
        height: u32,
    },

    /// The slide file could not be materialized locally
    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    /// The slide file could not be decoded
    #[error(transparent)]
    Slide(#[from] SlideError),

    /// Encoding the tile failed
    #[error("Failed to encode tile: {message}")]
    EncodeError { message: String },

    /// The record store failed
    #[error("Record store error: {0}")]
    Store(String),

    /// A background worker failed unexpectedly
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors from the persistence collaborator.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Record store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt record data: {0}")]
    Corrupt(String),
}

/// Errors from calls to the external compute service.
#[derive(Debug, Clone, Error)]
pub enum ComputeError {
    /// The request did not complete within its deadline
    #[error("Compute service timed out during {operation}")]
    Timeout { operation: &'static str },

    /// The service answered with a non-success status
    #[error("Compute service returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Connection-level failure
    #[error("Compute service unreachable: {0}")]
    Transport(String),

    /// The response body could not be understood
    #[error("Unexpected compute service response: {0}")]
    InvalidResponse(String),
}

/// Errors surfaced by the job lifecycle tracker.
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Task or slide absent, or not owned by the caller
    #[error("{0}")]
    NotFound(String),

    /// Missing or mismatched shared secret
    #[error("Unauthorized")]
    Unauthorized,

    /// Unknown state name, or an operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid confidence {0}: must be between 0.0 and 0.9")]
    InvalidConfidence(f64),

    /// Compute service did not answer in time; no local change was made
    #[error("Compute service timed out during {operation}")]
    UpstreamTimeout { operation: &'static str },

    /// Compute service failed; no local change was made
    #[error("Compute service error: {0}")]
    UpstreamError(String),

    #[error("Record store error: {0}")]
    Store(String),

    /// Prediction results exist but cannot be parsed
    #[error("Invalid prediction results: {0}")]
    Predictions(String),

    #[error(transparent)]
    Materialize(#[from] MaterializeError),

    #[error(transparent)]
    Tile(#[from] TileError),
}

impl From<ComputeError> for JobError {
    fn from(err: ComputeError) -> Self {
        match err {
            ComputeError::Timeout { operation } => JobError::UpstreamTimeout { operation },
            other => JobError::UpstreamError(other.to_string()),
        }
    }
}

impl From<StoreError> for JobError {
    fn from(err: StoreError) -> Self {
        JobError::Store(err.to_string())
    }
}

impl From<StoreError> for TileError {
    fn from(err: StoreError) -> Self {
        TileError::Store(err.to_string())
    }
}
