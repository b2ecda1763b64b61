//! Open-time configuration and the page/ground scale context used when
//! style parameters are converted to pixels.

use std::path::{Path, PathBuf};

/// Options applied when a cursor opens a data source.
#[derive(Clone, Debug, Default)]
pub struct OpenOptions {
    /// Base directory against which relative dataset locators are
    /// resolved. When the resolved path does not exist the literal
    /// locator is handed to the driver unchanged (it may be a remote
    /// or virtual locator the driver understands).
    pub base_path: Option<PathBuf>,
}

impl OpenOptions {
    pub fn resolve_locator(&self, locator: &str) -> PathBuf {
        if let Some(base) = &self.base_path {
            let candidate = Path::new(locator);
            if candidate.is_relative() {
                let joined = base.join(candidate);
                if joined.exists() {
                    return joined;
                }
            }
        }
        PathBuf::from(locator)
    }
}

/// Rendering scale context: style parameter strings carry their own
/// units, and converting them to pixels needs to know both the device
/// resolution and the ground size of one pixel.
#[derive(Clone, Copy, Debug)]
pub struct PageContext {
    /// Ground units covered by one pixel.
    pub cell_size: f64,
    /// Output resolution in dots per inch.
    pub resolution: f64,
    /// Resolution the map's sizes were authored at.
    pub def_resolution: f64,
}

impl Default for PageContext {
    fn default() -> PageContext {
        PageContext {
            cell_size: 1.0,
            resolution: 72.0,
            def_resolution: 72.0,
        }
    }
}

impl PageContext {
    /// Device scale: 1.0 when rendering at the authored resolution.
    pub fn device_scale(&self) -> f64 {
        self.resolution / self.def_resolution
    }

    /// Pixels covered by `value` ground units.
    pub fn ground_to_pixels(&self, value: f64) -> f64 {
        value / self.cell_size
    }

    /// Pixels for one paper inch at the current device scale.
    pub fn inch_to_pixels(&self, value: f64) -> f64 {
        value * 72.0 * self.device_scale()
    }
}
