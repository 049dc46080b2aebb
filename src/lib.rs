/*!
# distort3d

A masked, noise-driven screen-space distortion post-processing effect for
[wgpu](https://docs.rs/wgpu)-based renderers.

The effect displaces each pixel of a rendered frame by a 2-channel noise
sample, scaled by a global factor and gated per pixel by a mask texture:
heat haze behind an exhaust, shockwaves, rippling water, cloaking
shimmers — anywhere a portion of the screen should wobble and the rest
stay put.

The crate plugs into a host render loop through a small contract:

* the host renders its scene into a [`resource::RenderTarget`],
* then calls [`post_processing::PostProcessingEffect::draw`] with a command
  encoder and the view to write into.

Any wgpu renderer that owns a frame loop can drive it; the host keeps
ownership of the surface, the frame scheduling and resource teardown.

```no_run
use distort3d::context::Context;
use distort3d::post_processing::{Distortion, PostProcessingContext, PostProcessingEffect};
use distort3d::resource::{FramebufferManager, Texture, TextureWrapping};

pollster::block_on(Context::init_headless(wgpu::TextureFormat::Rgba8Unorm));

let noise = Texture::from_file("noise.png".as_ref(), TextureWrapping::Repeat);
let mask = Texture::from_file("mask.png".as_ref(), TextureWrapping::ClampToEdge);
let mut effect = Distortion::new(noise, mask);

let fbs = FramebufferManager::new();
let target = fbs.new_render_target(1280, 720, true);
// ... render the scene into `target`, then in the frame encoder:
let ctxt = Context::get();
let mut encoder = ctxt.create_command_encoder(Some("frame"));
let output = fbs.new_render_target(1280, 720, false);
if let Some(output_view) = output.color_view() {
    let mut pp = PostProcessingContext {
        encoder: &mut encoder,
        output_view,
    };
    effect.update(0.016, 1280.0, 720.0, 0.1, 1000.0);
    effect.draw(&target, &mut pp);
}
ctxt.submit(std::iter::once(encoder.finish()));
```

A CPU reference of the same computation is available as
[`post_processing::distort_image`] for golden images and headless checks.

## Modes

[`post_processing::DistortionMode`] selects one of three pipeline variants
at construction time (no per-pixel branching): the distortion itself, a
pass-through bypass, and a mask-strength visualization for tuning mask
textures.
*/
#![allow(clippy::module_inception)]

pub use glamx;

pub mod builtin;
pub mod context;
pub mod post_processing;
pub mod resource;

pub mod prelude {
    pub use crate::context::*;
    pub use crate::post_processing::*;
    pub use crate::resource::*;
    pub use glamx::Vec2;
    pub use std::sync::Arc;
}
