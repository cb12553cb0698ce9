//! Error taxonomy for the core. Each concern gets its own `thiserror` enum,
//! mirroring the original `ImageKitError` pattern but split per §7 of the spec
//! so that HTTP status mapping stays a pure, total function of the error kind.

use thiserror::Error;

/// Errors from parsing a raw transform string (§4.2). Maps to HTTP 400.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamError {
    #[error("unknown parameter: {0}")]
    InvalidParameter(String),
    #[error("empty value for parameter: {0}")]
    EmptyValue(String),
    #[error("invalid width")]
    InvalidWidth,
    #[error("invalid height")]
    InvalidHeight,
    #[error("invalid quality")]
    InvalidQuality,
    #[error("invalid format")]
    InvalidFormat,
    #[error("invalid fit")]
    InvalidFit,
    #[error("invalid gravity")]
    InvalidGravity,
    #[error("invalid sharpen")]
    InvalidSharpen,
    #[error("invalid blur")]
    InvalidBlur,
    #[error("invalid dpr")]
    InvalidDpr,
    #[error("invalid rotate")]
    InvalidRotate,
    #[error("invalid flip")]
    InvalidFlip,
    #[error("invalid brightness")]
    InvalidBrightness,
    #[error("invalid contrast")]
    InvalidContrast,
    #[error("invalid saturation")]
    InvalidSaturation,
    #[error("invalid gamma")]
    InvalidGamma,
    #[error("invalid background")]
    InvalidBackground,
    #[error("invalid metadata policy")]
    InvalidMetadata,
    #[error("invalid trim")]
    InvalidTrim,
    #[error("invalid animation mode")]
    InvalidAnim,
    #[error("invalid frame")]
    InvalidFrame,
}

/// Errors from `validate()` once parsing has already succeeded (§4.2). Maps to HTTP 422.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("width out of range")]
    Width,
    #[error("height out of range")]
    Height,
    #[error("quality out of range")]
    Quality,
    #[error("sharpen out of range")]
    Sharpen,
    #[error("blur out of range")]
    Blur,
    #[error("dpr out of range")]
    Dpr,
    #[error("brightness out of range")]
    Brightness,
    #[error("contrast out of range")]
    Contrast,
    #[error("saturation out of range")]
    Saturation,
    #[error("gamma out of range")]
    Gamma,
    #[error("trim out of range")]
    Trim,
    #[error("frame out of range")]
    Frame,
    #[error("no resize dimensions supplied for requested fit mode")]
    NoResizeDimensions,
    #[error("rotate must be one of 0, 90, 180, 270")]
    Rotate,
}

/// Errors surfaced by an origin fetcher (§4.6). Mapped explicitly in the dispatcher.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("origin object not found")]
    NotFound,
    #[error("origin request timed out")]
    Timeout,
    #[error("origin response exceeded size limit")]
    ResponseTooLarge,
    #[error("origin connection failed: {0}")]
    ConnectionFailed(String),
    #[error("origin returned an error: {0}")]
    ServerError(String),
}

/// Pipeline-internal errors (§4.4). Codec failures recover locally in the
/// dispatcher (original bytes are served); `NoResizeDimensions` is a logic
/// error that should never reach a client as anything but a 500.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PipelineError {
    #[error("operation failed: {0}")]
    OperationFailed(String),
    #[error("no resize dimensions supplied")]
    NoResizeDimensions,
}

/// Cache backend errors. Most cache operations are best-effort and swallow
/// errors per §4.5; this type exists for the backends that can legitimately
/// fail (object store I/O).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache backend I/O error: {0}")]
    Io(String),
}

/// Top-level error the dispatcher turns into an HTTP response body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error("internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// HTTP status code per the taxonomy in §7.
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::Param(_) => 400,
            DispatchError::Validation(_) => 422,
            DispatchError::Fetch(FetchError::NotFound) => 404,
            DispatchError::Fetch(FetchError::Timeout) => 504,
            DispatchError::Fetch(FetchError::ResponseTooLarge) => 413,
            DispatchError::Fetch(_) => 502,
            DispatchError::Pipeline(_) => 500,
            DispatchError::Internal(_) => 500,
        }
    }

    /// Short machine phrase for the error body (not the detail).
    pub fn phrase(&self) -> &'static str {
        match self {
            DispatchError::Param(_) => "invalid transform parameters",
            DispatchError::Validation(_) => "transform parameters out of range",
            DispatchError::Fetch(FetchError::NotFound) => "not found",
            DispatchError::Fetch(FetchError::Timeout) => "gateway timeout",
            DispatchError::Fetch(FetchError::ResponseTooLarge) => "payload too large",
            DispatchError::Fetch(_) => "bad gateway",
            DispatchError::Pipeline(_) => "internal server error",
            DispatchError::Internal(_) => "internal server error",
        }
    }
}
