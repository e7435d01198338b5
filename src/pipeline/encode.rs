//! Image encoding for the two consumers of page rasters.
//!
//! * The VLM wants the whole page as a base64 PNG data payload: lossless, so
//!   text edges stay crisp for the model.
//! * Image assets cropped out of a page are written to disk as JPEG, which
//!   keeps the `images/` directory small. JPEG has no alpha channel, so the
//!   crop is flattened to RGB first.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a base64 PNG ready for the VLM API.
///
/// `detail: "high"` lets GPT-4-class models tile the full image instead of
/// downsampling to a single overview tile.
pub fn encode_page(img: &DynamicImage) -> Result<ImageData, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded page → {} bytes base64", b64.len());

    Ok(ImageData::new(b64, "image/png").with_detail("high"))
}

/// Crop `bbox` (pixel coordinates `[x0, y0, x1, y1]`) out of a page raster
/// and encode it as JPEG.
///
/// The box is clamped to the image; an empty intersection yields `None`.
pub fn crop_to_jpeg(
    page: &DynamicImage,
    bbox: [f32; 4],
) -> Result<Option<Vec<u8>>, image::ImageError> {
    let (w, h) = (page.width() as f32, page.height() as f32);
    let x0 = bbox[0].clamp(0.0, w).floor() as u32;
    let y0 = bbox[1].clamp(0.0, h).floor() as u32;
    let x1 = bbox[2].clamp(0.0, w).ceil() as u32;
    let y1 = bbox[3].clamp(0.0, h).ceil() as u32;
    if x1 <= x0 || y1 <= y0 {
        return Ok(None);
    }

    let crop = page.crop_imm(x0, y0, x1 - x0, y1 - y0);
    let rgb = DynamicImage::ImageRgb8(crop.to_rgb8());
    let mut buf = Vec::new();
    rgb.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Jpeg)?;
    Ok(Some(buf))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn red_page(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([255, 0, 0, 255])))
    }

    #[test]
    fn encode_small_image() {
        let data = encode_page(&red_page(10, 10)).expect("encode should succeed");
        assert_eq!(data.mime_type, "image/png");
        let decoded = STANDARD.decode(&data.data).expect("valid base64");
        assert!(decoded.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn crop_produces_jpeg_of_clamped_region() {
        let page = red_page(100, 50);
        let jpeg = crop_to_jpeg(&page, [80.0, 10.0, 140.0, 30.0])
            .unwrap()
            .expect("non-empty crop");
        assert!(jpeg.starts_with(&[0xFF, 0xD8]), "JPEG SOI marker");
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 20));
    }

    #[test]
    fn crop_outside_page_is_none() {
        let page = red_page(10, 10);
        assert!(crop_to_jpeg(&page, [20.0, 20.0, 30.0, 30.0]).unwrap().is_none());
    }
}
