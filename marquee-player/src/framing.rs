//! Viewport-dependent zoom that crops letterboxing.
//!
//! Trailer sources rarely match the viewport aspect ratio. Scaling the video
//! layer up slightly hides the black bars; the wider the viewport gets past
//! the reference ratio, the less zoom is needed, down to a floor.

use marquee_core::TrailerConfig;

/// Scale factor for the video layer at the given viewport aspect ratio.
///
/// Returns the baseline zoom at and below the reference ratio, then decays
/// proportionally with the ratio, never dropping under the configured
/// minimum. Recomputed on every viewport resize.
pub fn scale_factor(viewport_ratio: f32, config: &TrailerConfig) -> f32 {
    let baseline = config.framing_baseline_zoom;
    let reference = config.framing_reference_ratio;
    let floor = config.framing_min_zoom;

    if !viewport_ratio.is_finite() || viewport_ratio <= 0.0 {
        return baseline;
    }
    if viewport_ratio <= reference {
        return baseline;
    }
    (baseline * reference / viewport_ratio).max(floor)
}

/// Convenience wrapper over pixel dimensions.
pub fn scale_for_viewport(width: u32, height: u32, config: &TrailerConfig) -> f32 {
    if height == 0 {
        return config.framing_baseline_zoom;
    }
    scale_factor(width as f32 / height as f32, config)
}
