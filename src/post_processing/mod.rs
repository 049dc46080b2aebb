//! Post-processing effects and the contract used to drive them.

pub use crate::post_processing::distortion::{Distortion, DistortionMode, DistortionParams};
pub use crate::post_processing::distortion_cpu::distort_image;
pub use crate::post_processing::post_processing_effect::{
    PostProcessingContext, PostProcessingEffect,
};

mod distortion;
mod distortion_cpu;
mod post_processing_effect;
