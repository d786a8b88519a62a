use anyhow::Context;

use crate::{
    data_structures::texture::decode_rgba,
    resources::{ImageData, extension, load_binary},
};

/// Loads an equirectangular environment map. Radiance `.hdr` is tone-clamped
/// to RGBA8 by the decoder.
pub async fn load_environment(locator: &str) -> anyhow::Result<ImageData> {
    let data = load_binary(locator)
        .await
        .with_context(|| format!("failed to read environment map '{}'", locator))?;
    let format = extension(locator).unwrap_or_else(|| "hdr".to_string());
    let pixels = decode_rgba(&data, Some(&format))
        .with_context(|| format!("failed to decode environment map '{}'", locator))?;
    Ok(ImageData {
        name: locator.to_string(),
        pixels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_radiance_hdr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sky.hdr");
        let mut file = std::fs::File::create(&path).unwrap();
        let pixels = vec![image::Rgb([0.5f32, 1.0, 2.0]); 4];
        image::codecs::hdr::HdrEncoder::new(&mut file)
            .encode(&pixels, 2, 2)
            .unwrap();
        drop(file);

        let env = futures::executor::block_on(load_environment(path.to_str().unwrap())).unwrap();
        assert_eq!(env.pixels.dimensions(), (2, 2));
    }

    #[test]
    fn rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sky.hdr");
        std::fs::write(&path, b"not an image").unwrap();
        assert!(futures::executor::block_on(load_environment(path.to_str().unwrap())).is_err());
    }
}
