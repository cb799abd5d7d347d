use anyhow::{anyhow, Context, Result};
use img_hash::{HashAlg, Hasher, HasherConfig, ImageHash};
use std::path::Path;

/// Average hash (aHash): downscale to `size x size` grayscale, one bit per
/// pixel set by comparison against the mean brightness.
pub struct AverageHasher {
    hasher: Hasher,
}

impl AverageHasher {
    pub fn new(size: u32) -> Self {
        let size = size.max(2);
        let hasher = HasherConfig::new().hash_alg(HashAlg::Mean).hash_size(size, size).to_hasher();
        Self { hasher }
    }

    /// Decodes by sniffing the content, not the extension.
    pub fn hash_path(&self, path: &Path) -> Result<ImageHash> {
        let img = image::ImageReader::open(path)
            .context(format!("open {}", path.display()))?
            .with_guessed_format()?
            .decode()
            .context(format!("decode {}", path.display()))?;
        self.hash_decoded(img)
    }

    pub fn hash_bytes(&self, bytes: &[u8]) -> Result<ImageHash> {
        let img = image::load_from_memory(bytes)?;
        self.hash_decoded(img)
    }

    /// The `image` re-exported by `img_hash` has no codecs; decode here and
    /// hand it raw RGBA.
    fn hash_decoded(&self, img: image::DynamicImage) -> Result<ImageHash> {
        let rgba = img.to_rgba8();
        let (w, h) = rgba.dimensions();
        let buf = img_hash::image::RgbaImage::from_raw(w, h, rgba.into_raw())
            .ok_or_else(|| anyhow!("pixel buffer does not match {w}x{h}"))?;
        Ok(self.hasher.hash_image(&img_hash::image::DynamicImage::ImageRgba8(buf)))
    }
}

impl Default for AverageHasher {
    fn default() -> Self { Self::new(8) }
}

/// Hamming distance between two hashes of the same size.
pub fn distance(a: &ImageHash, b: &ImageHash) -> u32 {
    a.dist(b)
}

#[cfg(test)]
pub(crate) mod fixtures {
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    /// Left half dark, right half bright.
    pub fn split_vertical(shift: u8) -> RgbImage {
        RgbImage::from_fn(64, 64, |x, _| {
            let v = if x < 32 { 20 } else { 220 };
            Rgb([v + shift, v + shift, v + shift])
        })
    }

    /// Top half dark, bottom half bright.
    pub fn split_horizontal() -> RgbImage {
        RgbImage::from_fn(64, 64, |_, y| {
            let v = if y < 32 { 20 } else { 220 };
            Rgb([v, v, v])
        })
    }

    pub fn png_bytes(img: &RgbImage) -> Vec<u8> {
        let mut buf = Vec::new();
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }
}
