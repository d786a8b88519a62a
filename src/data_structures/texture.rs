//! Textures: decoded images referenced by materials, and GPU render targets.
//!
//! [`Texture`] is the material-facing image with its own [`GpuHandle`]. It is
//! shared between materials through `Rc`, and releasing it is idempotent.
//! [`GpuTexture`] wraps the wgpu objects the backend renders into (depth buffer).

use std::rc::Rc;

use anyhow::*;
use image::{GenericImageView, ImageFormat, load_from_memory_with_format};

use crate::data_structures::{
    color::Color,
    handle::{GpuHandle, ResourceId, ResourceKind, ResourceTracker},
};

/// How a texture is projected when sampled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TextureMapping {
    #[default]
    Uv,
    EquirectangularReflection,
}

#[derive(Debug)]
pub struct Texture {
    pub name: String,
    pub mapping: TextureMapping,
    pixels: image::RgbaImage,
    handle: GpuHandle,
}

impl Texture {
    pub fn from_pixels(tracker: &Rc<ResourceTracker>, name: &str, pixels: image::RgbaImage) -> Self {
        Self {
            name: name.to_string(),
            mapping: TextureMapping::Uv,
            pixels,
            handle: tracker.allocate(ResourceKind::Texture, name),
        }
    }

    /// Decode a texture from raw image file contents.
    ///
    /// * `format` is an optional file extension hint (e.g. "png"). If None, auto-detect.
    pub fn from_bytes(
        tracker: &Rc<ResourceTracker>,
        bytes: &[u8],
        name: &str,
        format: Option<&str>,
    ) -> Result<Self> {
        let pixels = decode_rgba(bytes, format)?;
        Ok(Self::from_pixels(tracker, name, pixels))
    }

    pub fn id(&self) -> ResourceId {
        self.handle.id()
    }

    pub fn handle(&self) -> &GpuHandle {
        &self.handle
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &image::RgbaImage {
        &self.pixels
    }

    /// Average colour of all pixels, black for an empty image.
    pub fn mean_color(&self) -> Color {
        let count = self.pixels.width() as f64 * self.pixels.height() as f64;
        if count == 0.0 {
            return Color::BLACK;
        }
        let mut sum = [0.0f64; 3];
        for pixel in self.pixels.pixels() {
            for (acc, channel) in sum.iter_mut().zip(pixel.0) {
                *acc += channel as f64;
            }
        }
        let channel = |total: f64| (total / count / 255.0) as f32;
        Color::new(channel(sum[0]), channel(sum[1]), channel(sum[2]))
    }
}

/// Decodes image file contents to RGBA8.
pub fn decode_rgba(bytes: &[u8], format: Option<&str>) -> Result<image::RgbaImage> {
    let img = match format.and_then(ImageFormat::from_extension) {
        None => image::load_from_memory(bytes)?,
        Some(fmt) => load_from_memory_with_format(bytes, fmt)?,
    };
    let (width, height) = img.dimensions();
    log::trace!("decoded {}x{} image", width, height);
    Ok(img.to_rgba8())
}

/// A GPU texture with a view and optional sampler.
#[derive(Clone, Debug)]
pub struct GpuTexture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: Option<wgpu::Sampler>,
}

impl GpuTexture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// * `size` is [width, height] of the texture in pixels
    /// * `label` is used as a debug label for the GPU resource
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let desc = wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[Self::DEPTH_FORMAT],
        };
        let texture = device.create_texture(&desc);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = Some(device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 100.0,
            ..Default::default()
        }));

        Self {
            texture,
            view,
            sampler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbaImage::from_pixel(2, 3, image::Rgba([10, 20, 30, 255]));
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, ImageFormat::Png).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn decodes_with_and_without_hint() {
        let tracker = ResourceTracker::new();
        let bytes = png_bytes();
        let guessed = Texture::from_bytes(&tracker, &bytes, "guessed", None).unwrap();
        let hinted = Texture::from_bytes(&tracker, &bytes, "hinted", Some("png")).unwrap();
        assert_eq!(guessed.dimensions(), (2, 3));
        assert_eq!(hinted.pixels().get_pixel(1, 2).0, [10, 20, 30, 255]);
        assert_eq!(tracker.live_count(), 2);
    }

    #[test]
    fn mean_color_averages_every_pixel() {
        let tracker = ResourceTracker::new();
        let mut pixels = image::RgbaImage::from_pixel(2, 1, image::Rgba([255, 0, 51, 255]));
        pixels.put_pixel(1, 0, image::Rgba([0, 0, 153, 255]));
        let mean = Texture::from_pixels(&tracker, "split", pixels).mean_color();
        assert!((mean.r - 0.5).abs() < 1e-6);
        assert_eq!(mean.g, 0.0);
        assert!((mean.b - 0.4).abs() < 1e-6);

        let empty = Texture::from_pixels(&tracker, "empty", image::RgbaImage::new(0, 0));
        assert_eq!(empty.mean_color(), Color::BLACK);
    }

    #[test]
    fn garbage_fails_to_decode() {
        let tracker = ResourceTracker::new();
        assert!(Texture::from_bytes(&tracker, b"not an image", "broken", None).is_err());
        assert_eq!(tracker.live_count(), 0);
    }
}
