//! A resource manager to load and upload textures.

use image::{self, DynamicImage, GenericImageView};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::context::Context;

/// Wrapping parameters for a texture.
#[derive(Copy, Clone, Debug, Hash, PartialEq, Eq)]
pub enum TextureWrapping {
    /// Repeats the texture when a texture coordinate is out of bounds.
    Repeat,
    /// Repeats the mirrored texture when a texture coordinate is out of bounds.
    MirroredRepeat,
    /// Repeats the nearest edge point texture color when a texture coordinate is out of bounds.
    ClampToEdge,
}

impl From<TextureWrapping> for wgpu::AddressMode {
    #[inline]
    fn from(val: TextureWrapping) -> Self {
        match val {
            TextureWrapping::Repeat => wgpu::AddressMode::Repeat,
            TextureWrapping::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
            TextureWrapping::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        }
    }
}

/// GPU half of a texture, created on first use.
struct GpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

/// A texture authored on the CPU and uploaded lazily to the device.
///
/// The pixel data lives on the CPU from construction; the wgpu texture,
/// view and sampler are created the first time the texture is bound. A
/// `needs_upload` flag requests a fresh upload of the pixel data before the
/// next use, so textures can be created (and passes configured with them)
/// before a rendering context exists.
pub struct Texture {
    pixels: Vec<u8>, // RGBA8, row-major
    width: u32,
    height: u32,
    wrapping: TextureWrapping,
    gpu: OnceLock<GpuTexture>,
    needs_upload: AtomicBool,
}

impl Texture {
    /// Creates a texture from raw RGBA8 pixel data.
    ///
    /// # Panics
    /// Panics if `pixels.len() != width * height * 4`.
    pub fn from_pixels(
        width: u32,
        height: u32,
        pixels: Vec<u8>,
        wrapping: TextureWrapping,
    ) -> Arc<Texture> {
        assert_eq!(
            pixels.len(),
            (width * height * 4) as usize,
            "pixel buffer size does not match texture dimensions"
        );

        Arc::new(Texture {
            pixels,
            width,
            height,
            wrapping,
            gpu: OnceLock::new(),
            needs_upload: AtomicBool::new(false),
        })
    }

    /// Creates a texture from a `DynamicImage`, converting it to RGBA8.
    pub fn from_image(image: DynamicImage, wrapping: TextureWrapping) -> Arc<Texture> {
        let (width, height) = image.dimensions();
        let rgba_image = image.to_rgba8();
        Self::from_pixels(width, height, rgba_image.into_raw(), wrapping)
    }

    /// Creates a texture by decoding an image from a bytes array.
    ///
    /// # Panics
    /// Panics if the bytes cannot be decoded as an image.
    pub fn from_memory(image_data: &[u8], wrapping: TextureWrapping) -> Arc<Texture> {
        Self::from_image(
            image::load_from_memory(image_data).expect("Invalid data"),
            wrapping,
        )
    }

    /// Creates a texture by loading an image from a file.
    ///
    /// # Panics
    /// Panics if the file cannot be read or decoded.
    pub fn from_file(path: &Path, wrapping: TextureWrapping) -> Arc<Texture> {
        let image = image::open(path)
            .unwrap_or_else(|e| panic!("Unable to load texture from file {:?}: {:?}", path, e));
        Self::from_image(image, wrapping)
    }

    /// Creates a default white 1x1 texture.
    pub fn new_default() -> Arc<Texture> {
        Self::from_pixels(1, 1, vec![255, 255, 255, 255], TextureWrapping::Repeat)
    }

    /// Texture dimensions (width, height).
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// The CPU-side RGBA8 pixel data.
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// The wrapping mode of this texture's sampler.
    pub fn wrapping(&self) -> TextureWrapping {
        self.wrapping
    }

    /// Requests a fresh upload of the pixel data before the texture is next
    /// sampled.
    pub fn mark_needs_upload(&self) {
        self.needs_upload.store(true, Ordering::Relaxed);
    }

    /// Whether an upload has been requested and not yet performed.
    pub fn needs_upload(&self) -> bool {
        self.needs_upload.load(Ordering::Relaxed)
    }

    /// Sends the pixel data to the device if an upload is pending.
    ///
    /// Creating the GPU texture uploads the data as part of initialization,
    /// so a pending request is only re-sent for an already-created texture.
    ///
    /// # Panics
    /// Panics if the rendering context is not initialized.
    pub fn upload_if_needed(&self) {
        let already_created = self.gpu.get().is_some();
        let gpu = self.gpu_state();

        if self.needs_upload.swap(false, Ordering::Relaxed) && already_created {
            let ctxt = Context::get();
            Self::write_pixels(&ctxt, &gpu.texture, &self.pixels, self.width, self.height);
        }
    }

    /// The texture view for binding.
    ///
    /// # Panics
    /// Panics if the rendering context is not initialized.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.gpu_state().view
    }

    /// The sampler for binding.
    ///
    /// # Panics
    /// Panics if the rendering context is not initialized.
    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.gpu_state().sampler
    }

    fn gpu_state(&self) -> &GpuTexture {
        self.gpu.get_or_init(|| {
            let ctxt = Context::get();

            // Linear format: noise offsets and mask weights are data, not
            // display colors.
            let texture = ctxt.create_texture(&wgpu::TextureDescriptor {
                label: Some("texture"),
                size: wgpu::Extent3d {
                    width: self.width,
                    height: self.height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            });

            Self::write_pixels(&ctxt, &texture, &self.pixels, self.width, self.height);

            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

            let address_mode = self.wrapping.into();
            let sampler = ctxt.create_sampler(&wgpu::SamplerDescriptor {
                label: Some("texture_sampler"),
                address_mode_u: address_mode,
                address_mode_v: address_mode,
                address_mode_w: address_mode,
                mag_filter: wgpu::FilterMode::Linear,
                min_filter: wgpu::FilterMode::Linear,
                mipmap_filter: wgpu::FilterMode::Nearest,
                ..Default::default()
            });

            GpuTexture {
                texture,
                view,
                sampler,
            }
        })
    }

    fn write_pixels(ctxt: &Context, texture: &wgpu::Texture, data: &[u8], width: u32, height: u32) {
        ctxt.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(width * 4),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// The texture manager.
///
/// It keeps a cache of already-loaded textures, and can load new textures.
pub struct TextureManager {
    default_texture: Arc<Texture>,
    textures: HashMap<String, Arc<Texture>>,
}

impl Default for TextureManager {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureManager {
    /// Creates a new texture manager.
    pub fn new() -> TextureManager {
        TextureManager {
            textures: HashMap::new(),
            default_texture: Texture::new_default(),
        }
    }

    /// Gets the default, completely white, texture.
    pub fn get_default(&self) -> Arc<Texture> {
        self.default_texture.clone()
    }

    /// Get a texture with the specified name. Returns `None` if the texture is not registered.
    pub fn get(&mut self, name: &str) -> Option<Arc<Texture>> {
        self.textures.get(name).cloned()
    }

    /// Get a texture (and its size) with the specified name. Returns `None` if the texture is not registered.
    pub fn get_with_size(&mut self, name: &str) -> Option<(Arc<Texture>, (u32, u32))> {
        self.textures.get(name).map(|t| (t.clone(), t.size()))
    }

    /// Allocates a new texture that is not yet configured.
    ///
    /// If a texture with same name exists, nothing is created and the old texture is returned.
    pub fn add_empty(&mut self, name: &str) -> Arc<Texture> {
        match self.textures.entry(name.to_string()) {
            Entry::Occupied(entry) => entry.into_mut().clone(),
            Entry::Vacant(entry) => entry.insert(Texture::new_default()).clone(),
        }
    }

    /// Allocates a new texture read from a `DynamicImage` object.
    ///
    /// If a texture with same name exists, nothing is created and the old texture is returned.
    pub fn add_image(&mut self, image: DynamicImage, name: &str) -> Arc<Texture> {
        self.add_image_with_wrapping(image, TextureWrapping::ClampToEdge, name)
    }

    /// Allocates a new texture read from a `DynamicImage` object, with the
    /// given wrapping mode.
    ///
    /// If a texture with same name exists, nothing is created and the old texture is returned.
    pub fn add_image_with_wrapping(
        &mut self,
        image: DynamicImage,
        wrapping: TextureWrapping,
        name: &str,
    ) -> Arc<Texture> {
        self.textures
            .entry(name.to_string())
            .or_insert_with(|| Texture::from_image(image, wrapping))
            .clone()
    }

    /// Allocates a new texture and tries to decode it from bytes array
    /// Panics if unable to do so
    /// If a texture with same name exists, nothing is created and the old texture is returned.
    pub fn add_image_from_memory(&mut self, image_data: &[u8], name: &str) -> Arc<Texture> {
        self.textures
            .entry(name.to_string())
            .or_insert_with(|| Texture::from_memory(image_data, TextureWrapping::ClampToEdge))
            .clone()
    }

    /// Allocates a new texture read from a file.
    ///
    /// If a texture with same name exists, nothing is created and the old texture is returned.
    pub fn add_texture(&mut self, path: &Path, name: &str) -> Arc<Texture> {
        self.textures
            .entry(name.to_string())
            .or_insert_with(|| Texture::from_file(path, TextureWrapping::ClampToEdge))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_texture_is_white_1x1() {
        let texture = Texture::new_default();
        assert_eq!(texture.size(), (1, 1));
        assert_eq!(texture.pixels(), &[255, 255, 255, 255]);
    }

    #[test]
    fn upload_flag_starts_clear_and_is_sticky_until_consumed() {
        let texture = Texture::from_pixels(2, 2, vec![0; 16], TextureWrapping::Repeat);
        assert!(!texture.needs_upload());

        texture.mark_needs_upload();
        assert!(texture.needs_upload());
        // Still pending: nothing consumed it.
        assert!(texture.needs_upload());
    }

    #[test]
    #[should_panic(expected = "pixel buffer size")]
    fn mismatched_pixel_buffer_is_rejected() {
        let _ = Texture::from_pixels(2, 2, vec![0; 15], TextureWrapping::Repeat);
    }

    #[test]
    fn wrapping_maps_to_address_modes() {
        assert_eq!(
            wgpu::AddressMode::from(TextureWrapping::Repeat),
            wgpu::AddressMode::Repeat
        );
        assert_eq!(
            wgpu::AddressMode::from(TextureWrapping::MirroredRepeat),
            wgpu::AddressMode::MirrorRepeat
        );
        assert_eq!(
            wgpu::AddressMode::from(TextureWrapping::ClampToEdge),
            wgpu::AddressMode::ClampToEdge
        );
    }

    #[test]
    fn from_image_converts_to_rgba8() {
        let image = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(3, 2, image::Luma([7])));
        let texture = Texture::from_image(image, TextureWrapping::ClampToEdge);
        assert_eq!(texture.size(), (3, 2));
        assert_eq!(texture.pixels().len(), 3 * 2 * 4);
        assert_eq!(&texture.pixels()[0..4], &[7, 7, 7, 255]);
    }

    #[test]
    fn manager_caches_by_name() {
        let mut manager = TextureManager::new();
        let image = DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
            1,
            1,
            image::Rgba([1, 2, 3, 4]),
        ));
        let first = manager.add_image(image.clone(), "noise");
        let second = manager.add_image(image, "noise");
        assert!(Arc::ptr_eq(&first, &second));
        assert!(manager.get("noise").is_some());
        assert!(manager.get("mask").is_none());
    }
}
