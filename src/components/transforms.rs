//! Crop geometry applied to each sample before the image transforms.
//!
//! Images are handled as dimensions only. A crop reports the resized and
//! cropped size together with the crop offsets, which SDXL feeds back to the
//! model as microconditioning.

use anyhow::ensure;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// SDXL aspect ratio buckets as `(height, width)`, all close to 1024².
pub const SDXL_BUCKETS: [(u32, u32); 40] = [
    (512, 2048),
    (512, 1984),
    (512, 1920),
    (512, 1856),
    (576, 1792),
    (576, 1728),
    (576, 1664),
    (640, 1600),
    (640, 1536),
    (704, 1472),
    (704, 1408),
    (704, 1344),
    (768, 1344),
    (768, 1280),
    (832, 1216),
    (832, 1152),
    (896, 1152),
    (896, 1088),
    (960, 1088),
    (960, 1024),
    (1024, 1024),
    (1024, 960),
    (1088, 960),
    (1088, 896),
    (1152, 896),
    (1152, 832),
    (1216, 832),
    (1280, 768),
    (1344, 768),
    (1408, 704),
    (1472, 704),
    (1536, 640),
    (1600, 640),
    (1664, 576),
    (1728, 576),
    (1792, 576),
    (1856, 512),
    (1920, 512),
    (1984, 512),
    (2048, 512),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Scale so the shorter side equals `size`, keeping the aspect ratio.
    fn resize_shorter_side(self, size: u32) -> Self {
        let (w, h) = (u64::from(self.width), u64::from(self.height));
        let size64 = u64::from(size);
        if w <= h {
            Self::new(size, (size64 * h / w) as u32)
        } else {
            Self::new((size64 * w / h) as u32, size)
        }
    }
}

/// Crop applied before the image transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Crop {
    LargestCenterSquare(u32),
    RandomCropSquare(u32),
    RandomCropAspectRatio,
}

/// Result of cropping one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cropped {
    pub size: ImageSize,
    pub top: u32,
    pub left: u32,
}

impl Crop {
    pub fn apply<R: Rng + ?Sized>(&self, image: ImageSize, rng: &mut R) -> anyhow::Result<Cropped> {
        ensure!(
            image.width > 0 && image.height > 0,
            "cannot crop an empty {}x{} image",
            image.width,
            image.height
        );
        match *self {
            Crop::LargestCenterSquare(size) => {
                let resized = image.resize_shorter_side(size);
                Ok(Cropped {
                    size: ImageSize::new(size, size),
                    top: (resized.height - size) / 2,
                    left: (resized.width - size) / 2,
                })
            }
            Crop::RandomCropSquare(size) => {
                let resized = image.resize_shorter_side(size);
                Ok(random_crop(resized, ImageSize::new(size, size), rng))
            }
            Crop::RandomCropAspectRatio => {
                let (height, width) = nearest_bucket(image);
                let bucket = ImageSize::new(width, height);
                Ok(random_crop(resize_to_cover(image, bucket), bucket, rng))
            }
        }
    }
}

/// First bucket whose height/width ratio is closest to the image's.
pub fn nearest_bucket(image: ImageSize) -> (u32, u32) {
    let ratio = f64::from(image.height) / f64::from(image.width);
    let mut best = SDXL_BUCKETS[0];
    let mut best_gap = f64::INFINITY;
    for (h, w) in SDXL_BUCKETS {
        let gap = (f64::from(h) / f64::from(w) - ratio).abs();
        if gap < best_gap {
            best = (h, w);
            best_gap = gap;
        }
    }
    best
}

/// Smallest resize of `image` that covers `bucket` on both axes.
fn resize_to_cover(image: ImageSize, bucket: ImageSize) -> ImageSize {
    let ratio = f64::from(image.height) / f64::from(image.width);
    let bucket_ratio = f64::from(bucket.height) / f64::from(bucket.width);
    if ratio > bucket_ratio {
        let scale = f64::from(bucket.width) / f64::from(image.width);
        ImageSize::new(bucket.width, (scale * f64::from(image.height)).round() as u32)
    } else if ratio < bucket_ratio {
        let scale = f64::from(bucket.height) / f64::from(image.height);
        ImageSize::new((scale * f64::from(image.width)).round() as u32, bucket.height)
    } else {
        bucket
    }
}

fn random_crop<R: Rng + ?Sized>(image: ImageSize, out: ImageSize, rng: &mut R) -> Cropped {
    let top = rng.gen_range(0..=image.height.saturating_sub(out.height));
    let left = rng.gen_range(0..=image.width.saturating_sub(out.width));
    Cropped { size: out, top, left }
}
