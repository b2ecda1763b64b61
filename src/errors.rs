use thiserror::Error;

pub type Result<T, E = ShapeStreamError> = std::result::Result<T, E>;

/// Errors surfaced by the feature access layer.
///
/// "No more data" is not an error: iteration entry points return
/// `Ok(None)` on true exhaustion and reserve `Err` for driver failures.
#[derive(Clone, PartialEq, Debug, Error)]
pub enum ShapeStreamError {
    /// A source could not be opened, or a named layer, tile item or
    /// schema element was not found. Never retried internally.
    #[error("resource error: {0}")]
    Resource(String),

    /// An unsupported geometry tag was encountered while flattening.
    /// Fatal to the single feature being converted; the partially
    /// filled shape must be treated as unusable.
    #[error("geometry type `{0}` not supported")]
    UnsupportedGeometry(&'static str),

    /// A directly addressed feature whose geometry cannot be coerced to
    /// the layer kind. Skipped silently during sequential iteration,
    /// but a hard error for direct fetches.
    #[error("requested feature is incompatible with layer kind")]
    IncompatibleFeature,

    /// The driver rejected a spatial or attribute filter, or query
    /// construction failed.
    #[error("filter error: {0}")]
    Filter(String),

    #[error("invalid field name: `{field_name}`")]
    InvalidFieldName { field_name: String },

    #[error("invalid field index: {index}")]
    InvalidFieldIndex { index: usize },

    #[error("failed to parse WKT: {0}")]
    Wkt(String),
}
