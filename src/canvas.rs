//! Canvas coordinate model shared by every pipeline stage
//!
//! Regions are axis-aligned rectangles in canvas pixel space covering
//! `[x, x + width) × [y, y + height)`. Every mask and image produced for one
//! request has exactly the resolved `CanvasSize`.

use crate::{
    config::RegionPolicy,
    error::{Result, RoomcraftError},
};
use serde::{Deserialize, Serialize};

/// A furniture placement or erasure target in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    #[must_use]
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Parse a JSON array of `{x, y, width, height}` objects
    ///
    /// A blank string is an empty list. Extra keys on each object are ignored.
    ///
    /// # Errors
    /// Returns `RoomcraftError::InvalidRegion` for malformed JSON, missing keys,
    /// negative or fractional values
    pub fn parse_list(json: &str) -> Result<Vec<Region>> {
        if json.trim().is_empty() {
            return Ok(Vec::new());
        }
        serde_json::from_str(json)
            .map_err(|e| RoomcraftError::invalid_region(format!("Malformed region list: {}", e)))
    }

    /// Exclusive right edge
    #[must_use]
    pub fn right(&self) -> u64 {
        u64::from(self.x) + u64::from(self.width)
    }

    /// Exclusive bottom edge
    #[must_use]
    pub fn bottom(&self) -> u64 {
        u64::from(self.y) + u64::from(self.height)
    }

    /// Check the region against a canvas and apply the policy
    ///
    /// # Errors
    /// - Zero width or height
    /// - Origin outside the canvas
    /// - Far edge outside the canvas under `RegionPolicy::Reject`
    pub fn fit_to(&self, canvas: CanvasSize, policy: RegionPolicy) -> Result<Region> {
        if self.width == 0 || self.height == 0 {
            return Err(RoomcraftError::invalid_region(format!(
                "Region {} has non-positive size",
                self
            )));
        }
        if self.x >= canvas.width || self.y >= canvas.height {
            return Err(RoomcraftError::invalid_region(format!(
                "Region {} starts outside the {} canvas",
                self, canvas
            )));
        }

        let fits = self.right() <= u64::from(canvas.width)
            && self.bottom() <= u64::from(canvas.height);
        match (fits, policy) {
            (true, _) => Ok(*self),
            (false, RegionPolicy::Reject) => Err(RoomcraftError::invalid_region(format!(
                "Region {} extends past the {} canvas",
                self, canvas
            ))),
            (false, RegionPolicy::Clamp) => Ok(Region {
                width: self.width.min(canvas.width - self.x),
                height: self.height.min(canvas.height - self.y),
                ..*self
            }),
        }
    }
}

impl std::fmt::Display for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}+{}+{}",
            self.width, self.height, self.x, self.y
        )
    }
}

/// Validate a region list in order, returning the fitted regions
///
/// # Errors
/// Returns the first region failure, tagged with its index
pub fn fit_regions(
    regions: &[Region],
    canvas: CanvasSize,
    policy: RegionPolicy,
) -> Result<Vec<Region>> {
    regions
        .iter()
        .enumerate()
        .map(|(index, region)| {
            region.fit_to(canvas, policy).map_err(|e| match e {
                RoomcraftError::InvalidRegion(msg) => {
                    RoomcraftError::invalid_region(format!("region #{}: {}", index, msg))
                },
                other => other,
            })
        })
        .collect()
}

/// Pixel dimensions of every buffer in one request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    /// Create a canvas size, rejecting zero dimensions
    ///
    /// # Errors
    /// Returns `RoomcraftError::InvalidCanvas` when either dimension is zero
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(RoomcraftError::invalid_canvas(format!(
                "Canvas must be positive in both dimensions, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    #[must_use]
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl std::fmt::Display for CanvasSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Canvas size as supplied by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanvasRequest {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

impl CanvasRequest {
    #[must_use]
    pub fn new(width: Option<u32>, height: Option<u32>) -> Self {
        Self { width, height }
    }

    /// Canvas fixed to an explicit size
    #[must_use]
    pub fn exact(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }

    /// Resolve against the decoded image's native size
    ///
    /// Only a complete `width`+`height` pair overrides the native size; a lone
    /// dimension is treated as unset so the image is never stretched on one axis.
    ///
    /// # Errors
    /// Returns `RoomcraftError::InvalidCanvas` for zero or oversized dimensions
    pub fn resolve(&self, native: CanvasSize, max_dimension: u32) -> Result<CanvasSize> {
        let canvas = match (self.width, self.height) {
            (Some(width), Some(height)) => CanvasSize::new(width, height)?,
            (None, None) => native,
            (width, height) => {
                log::debug!(
                    "Ignoring partial canvas request (width={:?}, height={:?}), using native {}",
                    width,
                    height,
                    native
                );
                native
            },
        };

        if canvas.width > max_dimension || canvas.height > max_dimension {
            return Err(RoomcraftError::invalid_canvas(format!(
                "Canvas {} exceeds the maximum dimension {}",
                canvas, max_dimension
            )));
        }
        Ok(canvas)
    }
}
