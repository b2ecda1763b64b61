//! Consumed driver interfaces and the process-wide driver lock.
//!
//! The underlying vector drivers are not assumed reentrant: every
//! operation that touches a driver (open, query, filter, fetch, close)
//! must run while holding [`lock`]. The guard doubles as access to the
//! driver registry. The lock must never be held across a connection
//! pool release, because the deferred close re-takes it (see
//! [`crate::pool`]).

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use geo_types::Geometry;

use crate::errors::{Result, ShapeStreamError};
use crate::field::{FieldDefn, FieldValue};
use crate::memory::MemoryDriver;
use crate::shape::Bounds;

/// One raw feature as handed over by a driver. Geometry, when present,
/// is already linearized.
#[derive(Clone, Debug)]
pub struct SourceFeature {
    pub fid: i64,
    pub geometry: Option<Geometry<f64>>,
    pub values: Vec<FieldValue>,
    /// Feature style descriptor string, when the source carries one.
    pub style: Option<String>,
}

/// A single layer of an open source, with its own read position.
pub trait SourceLayer: Send {
    fn name(&self) -> &str;

    /// Ordered field schema.
    fn defn(&self) -> Vec<FieldDefn>;

    /// Name of the geometry column, when the driver knows it.
    fn geometry_column(&self) -> Option<String>;

    fn set_spatial_filter(&mut self, geometry: Option<Geometry<f64>>);

    fn set_attribute_filter(&mut self, predicate: Option<&str>) -> Result<()>;

    fn reset_reading(&mut self);

    /// Next feature passing the active filters; `Ok(None)` on true
    /// exhaustion, `Err` on driver failure.
    fn next_feature(&mut self) -> Result<Option<SourceFeature>>;

    /// Direct fetch by stable id, ignoring filters and read position.
    fn feature_by_id(&mut self, fid: i64) -> Result<SourceFeature>;

    fn extent(&mut self) -> Result<Bounds>;
}

/// An open data source handle, shared between cursors through the
/// connection pool.
pub trait VectorSource: Send + Sync {
    fn layer_count(&self) -> usize;

    fn layer_by_index(&self, index: usize) -> Option<Box<dyn SourceLayer>>;

    fn layer_by_name(&self, name: &str) -> Option<Box<dyn SourceLayer>>;

    /// Execute a query, yielding an owned result-set layer.
    fn execute_sql(&self, query: &str) -> Result<Box<dyn SourceLayer>>;
}

pub trait Driver: Send {
    fn name(&self) -> &str;

    fn open(&self, locator: &Path) -> Result<Arc<dyn VectorSource>>;
}

/// The driver registry, only reachable through [`lock`].
#[derive(Default)]
pub struct DriverRegistry {
    initialized: bool,
    drivers: Vec<Box<dyn Driver>>,
}

impl DriverRegistry {
    pub fn register(&mut self, driver: Box<dyn Driver>) {
        log::debug!("registering driver `{}`", driver.name());
        self.drivers.push(driver);
    }

    /// Open a locator with the first driver that accepts it.
    pub fn open(&self, locator: &Path) -> Result<Arc<dyn VectorSource>> {
        let mut last_error = None;
        for driver in &self.drivers {
            match driver.open(locator) {
                Ok(source) => return Ok(source),
                Err(e) => last_error = Some(e),
            }
        }
        Err(last_error.unwrap_or_else(|| {
            ShapeStreamError::Resource(format!(
                "no driver available for `{}`",
                locator.display()
            ))
        }))
    }
}

static REGISTRY: OnceLock<Mutex<DriverRegistry>> = OnceLock::new();

/// Acquire the process-wide driver lock and with it the registry.
pub fn lock() -> MutexGuard<'static, DriverRegistry> {
    REGISTRY
        .get_or_init(|| Mutex::new(DriverRegistry::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One-time registration of the built-in drivers. Idempotent; callers
/// already hold the driver lock.
pub fn ensure_initialized(registry: &mut DriverRegistry) {
    if !registry.initialized {
        registry.register(Box::new(MemoryDriver));
        registry.initialized = true;
    }
}
