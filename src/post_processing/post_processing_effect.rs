//! Trait implemented by post-processing effects.

use crate::resource::RenderTarget;

/// Per-frame wgpu state handed to an effect by the host's render loop.
pub struct PostProcessingContext<'a> {
    /// The command encoder recording the current frame.
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// The view the effect renders into (the next pass's input, or the
    /// surface itself for the last pass).
    pub output_view: &'a wgpu::TextureView,
}

/// Trait implemented by post-processing effects.
///
/// The host calls `update` once per frame before rendering, then `draw`
/// with the render target holding the rendered scene.
pub trait PostProcessingEffect {
    /// Updates the time-dependent state of the effect.
    fn update(&mut self, dt: f32, w: f32, h: f32, znear: f32, zfar: f32);

    /// Encodes the effect: reads the render target's color attachment and
    /// writes the output view.
    fn draw(&mut self, target: &RenderTarget, context: &mut PostProcessingContext);
}
