use crate::error::{ChannelPackerError, Result};
use crate::group::Group;
use crate::model::PackSpec;
use image::{DynamicImage, GrayImage, ImageBuffer, ImageReader, Luma, Pixel};
use std::borrow::Cow;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Single 16-bit plane, as found in 16-bit grayscale/RGB sources (height maps, depth).
pub type Gray16Image = ImageBuffer<Luma<u16>, Vec<u16>>;

/// One grayscale plane split out of a decoded image.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelBand {
    L8(GrayImage),
    L16(Gray16Image),
}

impl ChannelBand {
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Self::L8(b) => b.dimensions(),
            Self::L16(b) => b.dimensions(),
        }
    }

    /// True if the plane stores more than 8 bits per sample.
    pub fn is_wide(&self) -> bool {
        matches!(self, Self::L16(_))
    }

    /// 8-bit view of the plane; wide samples are shifted down by 8 bits.
    pub fn to_luma8(&self) -> Cow<'_, GrayImage> {
        match self {
            Self::L8(b) => Cow::Borrowed(b),
            Self::L16(b) => Cow::Owned(downshift(b)),
        }
    }

    pub fn into_luma8(self) -> GrayImage {
        match self {
            Self::L8(b) => b,
            Self::L16(b) => downshift(&b),
        }
    }
}

fn downshift(wide: &Gray16Image) -> GrayImage {
    let (w, h) = wide.dimensions();
    GrayImage::from_fn(w, h, |x, y| Luma([(wide.get_pixel(x, y)[0] >> 8) as u8]))
}

fn split_planes<P: Pixel>(
    img: &ImageBuffer<P, Vec<P::Subpixel>>,
) -> Vec<ImageBuffer<Luma<P::Subpixel>, Vec<P::Subpixel>>> {
    let (w, h) = img.dimensions();
    (0..P::CHANNEL_COUNT as usize)
        .map(|c| ImageBuffer::from_fn(w, h, |x, y| Luma([img.get_pixel(x, y).channels()[c]])))
        .collect()
}

/// Splits `img` into its ordered channel planes (L, LA, RGB or RGBA).
///
/// 16-bit layouts keep their depth; float layouts are converted to 8 bits first.
pub fn split_channels(img: &DynamicImage) -> Vec<ChannelBand> {
    match img {
        DynamicImage::ImageLuma8(b) => vec![ChannelBand::L8(b.clone())],
        DynamicImage::ImageLumaA8(b) => split_planes(b).into_iter().map(ChannelBand::L8).collect(),
        DynamicImage::ImageRgb8(b) => split_planes(b).into_iter().map(ChannelBand::L8).collect(),
        DynamicImage::ImageRgba8(b) => split_planes(b).into_iter().map(ChannelBand::L8).collect(),
        DynamicImage::ImageLuma16(b) => vec![ChannelBand::L16(b.clone())],
        DynamicImage::ImageLumaA16(b) => {
            split_planes(b).into_iter().map(ChannelBand::L16).collect()
        }
        DynamicImage::ImageRgb16(b) => split_planes(b).into_iter().map(ChannelBand::L16).collect(),
        DynamicImage::ImageRgba16(b) => {
            split_planes(b).into_iter().map(ChannelBand::L16).collect()
        }
        DynamicImage::ImageRgb32F(_) => split_planes(&img.to_rgb8())
            .into_iter()
            .map(ChannelBand::L8)
            .collect(),
        _ => split_planes(&img.to_rgba8())
            .into_iter()
            .map(ChannelBand::L8)
            .collect(),
    }
}

/// Decodes a source image. Implementations must be shareable across worker threads.
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DynamicImage>;
}

/// Reads images from disk, guessing the format from content.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDecoder;

impl ImageDecoder for FileDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage> {
        let wrap = |source: image::ImageError| ChannelPackerError::ImageDecode {
            path: path.to_path_buf(),
            source,
        };
        ImageReader::open(path)
            .map_err(|e| wrap(image::ImageError::IoError(e)))?
            .with_guessed_format()
            .map_err(|e| wrap(image::ImageError::IoError(e)))?
            .decode()
            .map_err(wrap)
    }
}

/// Decoder over images already in memory, keyed by path.
#[derive(Debug, Clone, Default)]
pub struct MemoryDecoder {
    images: HashMap<PathBuf, DynamicImage>,
}

impl MemoryDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, image: DynamicImage) {
        self.images.insert(path.into(), image);
    }

    pub fn with(mut self, path: impl Into<PathBuf>, image: DynamicImage) -> Self {
        self.insert(path, image);
        self
    }
}

impl ImageDecoder for MemoryDecoder {
    fn decode(&self, path: &Path) -> Result<DynamicImage> {
        self.images
            .get(path)
            .cloned()
            .ok_or_else(|| ChannelPackerError::ImageDecode {
                path: path.to_path_buf(),
                source: image::ImageError::IoError(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "image not registered",
                )),
            })
    }
}

/// Per-group band cache: role -> planes, or `None` when the role has no usable source.
#[derive(Debug, Clone, Default)]
pub struct RoleBands {
    entries: Vec<(String, Option<Vec<ChannelBand>>)>,
}

impl RoleBands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records bands for `role`, replacing an earlier record in place.
    pub fn insert(&mut self, role: impl Into<String>, bands: Option<Vec<ChannelBand>>) {
        let role = role.into();
        match self.entries.iter_mut().find(|(r, _)| *r == role) {
            Some(slot) => slot.1 = bands,
            None => self.entries.push((role, bands)),
        }
    }

    pub fn with(mut self, role: impl Into<String>, bands: Option<Vec<ChannelBand>>) -> Self {
        self.insert(role, bands);
        self
    }

    /// Planes for `role`; `None` both for unrecorded and for null roles.
    pub fn get(&self, role: &str) -> Option<&[ChannelBand]> {
        self.entries
            .iter()
            .find(|(r, _)| r == role)
            .and_then(|(_, b)| b.as_deref())
    }

    /// True if `role` was recorded, even as null.
    pub fn contains(&self, role: &str) -> bool {
        self.entries.iter().any(|(r, _)| r == role)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&[ChannelBand]>)> {
        self.entries.iter().map(|(r, b)| (r.as_str(), b.as_deref()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the first band of the first role that has any. Fallback canvas for
    /// targets that read no plane of their own.
    pub fn canvas_size(&self) -> Option<(u32, u32)> {
        self.entries
            .iter()
            .filter_map(|(_, b)| b.as_ref())
            .find_map(|b| b.first())
            .map(ChannelBand::dimensions)
    }
}

/// A role whose source could not be decoded.
#[derive(Debug)]
pub struct DecodeFailure {
    pub role: String,
    pub path: PathBuf,
    pub error: ChannelPackerError,
}

/// Loads every role `spec` references, decoding each source of `group` once.
///
/// Roles missing from the group and roles whose decode failed are recorded as null.
/// Wide planes are normalised to 8 bits here.
pub fn load_bands(
    group: &Group,
    spec: &PackSpec,
    decoder: &dyn ImageDecoder,
) -> (RoleBands, Vec<DecodeFailure>) {
    let mut bands = RoleBands::new();
    let mut failures = Vec::new();
    for role in spec.referenced_roles() {
        let Some(path) = group.member(role) else {
            debug!(group = group.key(), role, "role not present");
            bands.insert(role, None);
            continue;
        };
        match decoder.decode(path) {
            Ok(img) => {
                let planes: Vec<ChannelBand> = split_channels(&img)
                    .into_iter()
                    .map(|b| ChannelBand::L8(b.into_luma8()))
                    .collect();
                debug!(group = group.key(), role, channels = planes.len(), "loaded");
                bands.insert(role, Some(planes));
            }
            Err(error) => {
                warn!(path = %path.display(), role, error = %error, "image not loaded");
                bands.insert(role, None);
                failures.push(DecodeFailure {
                    role: role.to_string(),
                    path: path.to_path_buf(),
                    error,
                });
            }
        }
    }
    (bands, failures)
}
