use pathex_core::{Dimensions, Format, Quality};
use std::fmt;

/// Granularity of [`Cost`]. Semaphore permits are `u32`, so costs are counted in KiB.
pub const COST_UNIT_BYTES: u64 = 1024;

/// Estimated memory footprint of a render, in [`COST_UNIT_BYTES`] units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Cost(u32);

impl Cost {
    pub const ZERO: Cost = Cost(0);

    pub fn from_units(units: u32) -> Self {
        Cost(units)
    }

    /// Rounds up to whole units and saturates at `u32::MAX` units.
    pub fn from_bytes(bytes: u64) -> Self {
        let units = bytes.div_ceil(COST_UNIT_BYTES);
        Cost(u32::try_from(units).unwrap_or(u32::MAX))
    }

    pub fn from_mib(mib: u64) -> Self {
        Self::from_bytes(mib.saturating_mul(1024 * 1024))
    }

    pub fn units(self) -> u32 {
        self.0
    }

    pub fn bytes(self) -> u64 {
        u64::from(self.0) * COST_UNIT_BYTES
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for Cost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}KiB", self.0)
    }
}

/// Tunables of the cost estimate; all come from configuration.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CostModel {
    /// Bytes held per rendered pixel (4 for RGBA buffers).
    pub bytes_per_pixel: u32,
    /// Scale factor contributed by each quality step; quality `q` renders at `q * scale`.
    pub scale_per_quality: f64,
    /// Charged when the engine cannot report the layout size.
    pub unknown_size_bytes: u64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            bytes_per_pixel: 4,
            scale_per_quality: 0.2,
            unknown_size_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Maps declared dimensions and requested quality to a [`Cost`]. Pure and deterministic.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CostEstimator {
    model: CostModel,
}

impl CostEstimator {
    pub fn new(model: CostModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &CostModel {
        &self.model
    }

    /// Vector output is exempt: its memory use does not scale with quality, so it costs nothing.
    pub fn estimate(
        &self,
        format: Format,
        dimensions: Option<Dimensions>,
        quality: Quality,
    ) -> Cost {
        if !format.is_pixel_bounded() {
            return Cost::ZERO;
        }
        let Some(dimensions) = dimensions else {
            return Cost::from_bytes(self.model.unknown_size_bytes);
        };

        let scale = (f64::from(quality.get()) * self.model.scale_per_quality).max(0.0);
        let width = (f64::from(dimensions.width) * scale).ceil();
        let height = (f64::from(dimensions.height) * scale).ceil();
        // Float-to-int casts saturate, so absurd layouts clamp instead of wrapping.
        let bytes = (width * height * f64::from(self.model.bytes_per_pixel)) as u64;
        Cost::from_bytes(bytes)
    }
}
