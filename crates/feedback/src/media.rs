use crate::error::{FeedbackError, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, Rgb, RgbImage};

const JPEG_QUALITY: u8 = 85;

/// Encode an uploaded image as an opaque-JPEG data URL for the
/// completion payload.
///
/// Alpha channels are flattened onto a white background first; the
/// service only accepts opaque images and transparent regions should
/// read as paper, not black.
pub fn encode_image_payload(bytes: &[u8]) -> Result<String> {
    let decoded = image::load_from_memory(bytes)
        .map_err(|e| FeedbackError::Image(format!("Failed to decode image: {e}")))?;
    let flattened = flatten_onto_white(&decoded);

    let mut jpeg = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY);
    flattened
        .write_with_encoder(encoder)
        .map_err(|e| FeedbackError::Image(format!("Failed to encode JPEG: {e}")))?;

    Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(&jpeg)))
}

fn flatten_onto_white(decoded: &DynamicImage) -> RgbImage {
    if !decoded.color().has_alpha() {
        return decoded.to_rgb8();
    }

    let rgba = decoded.to_rgba8();
    let mut flat = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = f32::from(pixel[3]) / 255.0;
        let blend = |channel: u8| -> u8 {
            let value = f32::from(channel).mul_add(alpha, 255.0 * (1.0 - alpha));
            value.round().clamp(0.0, 255.0) as u8
        };
        flat.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flat
}
