//! Construction context shared by every device of one harness.

use seqtest_core::config::HarnessConfig;
use seqtest_core::encoding::ImageGeometry;
use seqtest_core::logger::SettingLogger;
use seqtest_core::pipeline::ImagePipeline;
use std::fmt;
use std::sync::Arc;

/// Everything a device needs besides its name.
///
/// All devices built from clones of one context share a single
/// [`SettingLogger`], so their mutations are totally ordered.
#[derive(Clone)]
pub struct DeviceContext {
    pub logger: Arc<SettingLogger>,
    pub pipeline: Arc<dyn ImagePipeline>,
    pub geometry: ImageGeometry,
    pub steps_per_um: f64,
}

impl DeviceContext {
    pub fn new(logger: Arc<SettingLogger>, pipeline: Arc<dyn ImagePipeline>) -> Self {
        Self {
            logger,
            pipeline,
            geometry: ImageGeometry::default(),
            steps_per_um: 10.0,
        }
    }

    /// Context using the camera geometry and stage resolution of `config`.
    pub fn from_config(
        config: &HarnessConfig,
        logger: Arc<SettingLogger>,
        pipeline: Arc<dyn ImagePipeline>,
    ) -> Self {
        Self {
            logger,
            pipeline,
            geometry: config.camera.geometry(),
            steps_per_um: config.stage.steps_per_um,
        }
    }

    pub fn with_geometry(mut self, geometry: ImageGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    pub fn with_steps_per_um(mut self, steps_per_um: f64) -> Self {
        self.steps_per_um = steps_per_um;
        self
    }
}

impl fmt::Debug for DeviceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceContext")
            .field("geometry", &self.geometry)
            .field("steps_per_um", &self.steps_per_um)
            .finish_non_exhaustive()
    }
}
