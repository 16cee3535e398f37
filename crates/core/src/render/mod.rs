use serde::{Deserialize, Serialize};

use crate::config::Geometry;

/// Fixed rendering parameters of one playback slot. Higher layers are drawn
/// on top of lower ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderParams {
    pub layer: u32,
    pub geometry: Geometry,
    /// Opacity a freshly opened player starts with.
    pub initial_alpha: u8,
}

impl RenderParams {
    pub fn new(layer: u32, geometry: Geometry) -> Self {
        Self {
            layer,
            geometry,
            initial_alpha: 0,
        }
    }

    /// `WxH+X+Y`, the window geometry notation most players accept.
    pub fn window_spec(&self) -> String {
        let Geometry {
            x,
            y,
            width,
            height,
        } = self.geometry;
        format!("{width}x{height}{x:+}{y:+}")
    }
}
