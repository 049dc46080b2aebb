//! GPU resource managers

pub use crate::resource::framebuffer_manager::{
    FramebufferManager, OffscreenBuffers, RenderTarget,
};
pub use crate::resource::texture_manager::{Texture, TextureManager, TextureWrapping};

mod framebuffer_manager;
mod texture_manager;
