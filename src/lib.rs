//! Uniform feature access over vector data sources.
//!
//! The crate turns driver-specific vector data into a normalized shape
//! stream: geometries are flattened to the point, line or polygon form
//! a layer asks for, attribute and spatial filters are pushed down to
//! the driver where the driver can honor them, tiled datasets are
//! chained behind a single cursor, and per-feature style descriptors
//! are resolved into render-ready style layers.
//!
//! The main entry points are [`FeatureCursor`] for a single dataset,
//! [`TileChain`] for tile-indexed ones, and [`style::derive_style`] for
//! feature styles.
//!
//! Underlying drivers are not assumed reentrant; all driver access is
//! serialized behind a process-wide lock, and open connections are
//! shared through a reference-counted pool.

pub mod cursor;
pub mod driver;
pub mod errors;
pub mod field;
pub mod filter;
pub mod flatten;
pub mod geometry;
pub mod memory;
pub mod options;
pub mod pool;
pub mod shape;
pub mod style;
pub mod tile;

pub use cursor::{FeatureCursor, QueryFilters};
pub use errors::{Result, ShapeStreamError};
pub use field::{FieldDefn, FieldType, FieldValue};
pub use filter::{AttributePredicate, SortBy, SortOrder};
pub use flatten::{flatten, LayerKind};
pub use geometry::{shape_from_wkt, shape_to_wkt};
pub use options::{OpenOptions, PageContext};
pub use shape::{Bounds, Shape, ShapeKind};
pub use style::{derive_style, derive_style_from_string, StyleSet};
pub use tile::{ShapeAddress, TileChain, TileTarget};
