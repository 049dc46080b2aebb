//! Built-in shader sources.

/// WGSL source of the distortion shader (vertex stage plus one fragment
/// entry point per [`DistortionMode`](crate::post_processing::DistortionMode)).
pub static DISTORTION_SRC: &str = include_str!("distortion.wgsl");
