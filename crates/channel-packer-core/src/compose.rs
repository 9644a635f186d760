use crate::bands::RoleBands;
use crate::error::{ChannelPackerError, Result};
use crate::model::PackingRule;
use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use std::borrow::Cow;

/// Per-pixel complement (`255 - v`).
pub fn invert_band(band: &GrayImage) -> GrayImage {
    let mut out = band.clone();
    image::imageops::invert(&mut out);
    out
}

/// Merges 1, 3 or 4 equally sized planes into a grayscale, RGB or RGBA image.
pub fn merge_channels(channels: &[&GrayImage]) -> Result<DynamicImage> {
    let Some(first) = channels.first() else {
        return Err(ChannelPackerError::UnsupportedChannelCount(0));
    };
    let (w, h) = first.dimensions();
    for c in channels {
        if c.dimensions() != (w, h) {
            return Err(ChannelPackerError::ChannelSizeMismatch {
                expected: (w, h),
                actual: c.dimensions(),
            });
        }
    }
    let px = |i: usize, x: u32, y: u32| channels[i].get_pixel(x, y)[0];
    match channels.len() {
        1 => Ok(DynamicImage::ImageLuma8(GrayImage::from_fn(w, h, |x, y| {
            Luma([px(0, x, y)])
        }))),
        3 => Ok(DynamicImage::ImageRgb8(RgbImage::from_fn(w, h, |x, y| {
            Rgb([px(0, x, y), px(1, x, y), px(2, x, y)])
        }))),
        4 => Ok(DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            Rgba([px(0, x, y), px(1, x, y), px(2, x, y), px(3, x, y)])
        }))),
        n => Err(ChannelPackerError::UnsupportedChannelCount(n)),
    }
}

/// Builds one packed texture from `bands` following `rules`.
///
/// Returns `Ok(None)` when nothing can be built: no roles were loaded at all, or
/// none of the rules picks an existing plane. A rule whose role or channel is
/// missing contributes a black plane sized like the first plane this target uses
/// (or [`RoleBands::canvas_size`] if it uses none). Roles the target does not
/// reference never constrain its size. Planes are not resampled, so picked planes
/// of different sizes fail the target with `ChannelSizeMismatch`.
/// Two accumulated channels collapse to one, as two-channel outputs are not written.
pub fn compose(bands: &RoleBands, rules: &[PackingRule]) -> Result<Option<DynamicImage>> {
    if bands.is_empty() {
        return Ok(None);
    }

    let picked: Vec<Option<Cow<'_, GrayImage>>> = rules
        .iter()
        .map(|rule| {
            bands
                .get(&rule.source)
                .and_then(|planes| planes.get(rule.channel.index()))
                .map(|band| {
                    let plane = band.to_luma8();
                    if rule.invert {
                        Cow::Owned(invert_band(&plane))
                    } else {
                        plane
                    }
                })
        })
        .collect();

    let Some((w, h)) = picked
        .iter()
        .flatten()
        .map(|p| p.dimensions())
        .next()
        .or_else(|| bands.canvas_size())
    else {
        return Ok(None);
    };
    if picked.iter().all(Option::is_none) {
        return Ok(None);
    }
    let black = GrayImage::new(w, h);

    let mut channels: Vec<&GrayImage> = picked
        .iter()
        .map(|p| p.as_deref().unwrap_or(&black))
        .collect();
    if channels.len() == 2 {
        channels.pop();
    }
    merge_channels(&channels).map(Some)
}
