//! Raster image handling: JPEG encoding of rendered pages and wrapping a
//! single image into a one-page PDF.

use crate::error::DocConvError;
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageError, Rgb, RgbImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::path::Path;
use tracing::debug;

/// Encode an image as baseline JPEG. Alpha is flattened onto white first.
pub fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImageError> {
    let rgb = flatten_alpha(img);
    let mut buf = Vec::new();
    rgb.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, quality))?;
    debug!(
        "Encoded {}x{} page → {} bytes JPEG (q={})",
        rgb.width(),
        rgb.height(),
        buf.len(),
        quality
    );
    Ok(buf)
}

/// Composite onto an opaque white background and drop the alpha channel.
pub fn flatten_alpha(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    let mut out = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, px) in rgba.enumerate_pixels() {
        let [r, g, b, a] = px.0;
        let a = a as u16;
        let blend = |c: u8| ((c as u16 * a + 255 * (255 - a) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([blend(r), blend(g), blend(b)]));
    }
    out
}

/// Decode an image file, mapping decoder failures onto the input.
pub fn decode(path: &Path) -> Result<DynamicImage, DocConvError> {
    image::open(path).map_err(|e| match e {
        ImageError::IoError(source) => DocConvError::storage(path, source),
        other => DocConvError::CorruptInput {
            path: path.to_path_buf(),
            detail: other.to_string(),
        },
    })
}

/// Build a one-page PDF showing the image at `dpi`: the page is exactly the
/// image's physical size, so a 300 DPI scan keeps its paper dimensions.
pub fn image_to_pdf_document(path: &Path, dpi: f32) -> Result<Document, DocConvError> {
    let rgb = flatten_alpha(&decode(path)?);
    let (w_px, h_px) = rgb.dimensions();
    let width = w_px as f32 * 72.0 / dpi;
    let height = h_px as f32 * 72.0 / dpi;

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let mut image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => w_px as i64,
            "Height" => h_px as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        },
        rgb.into_raw(),
    );
    image
        .compress()
        .map_err(|e| DocConvError::CorruptInput {
            path: path.to_path_buf(),
            detail: format!("could not compress image data: {}", e),
        })?;
    let image_id = doc.add_object(image);

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec!["Im0".into()]),
            Operation::new("Q", vec![]),
        ],
    };
    let bytes = content.encode().map_err(|e| DocConvError::Internal(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, bytes));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
        "Contents" => content_id,
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    Ok(doc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn transparent_pixels_become_white() {
        let mut img = RgbaImage::from_pixel(2, 1, Rgba([0, 0, 0, 0]));
        img.put_pixel(1, 0, Rgba([255, 0, 0, 255]));
        let flat = flatten_alpha(&DynamicImage::ImageRgba8(img));
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn jpeg_has_soi_marker() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 8, Rgba([10, 20, 30, 128])));
        let jpeg = encode_jpeg(&img, 85).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let back = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((back.width(), back.height()), (16, 8));
    }

    #[test]
    fn page_matches_physical_size() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("scan.png");
        RgbImage::from_pixel(300, 600, Rgb([200, 200, 200]))
            .save(&path)
            .unwrap();

        let doc = image_to_pdf_document(&path, 150.0).unwrap();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 1);
        let page = doc.get_dictionary(pages[&1]).unwrap();
        let media_box = page.get(b"MediaBox").unwrap().as_array().unwrap();
        let height = media_box[3].as_float().unwrap();
        assert!((height - 288.0).abs() < 0.01, "{height}");
    }

    #[test]
    fn undecodable_image_is_corrupt_input() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        std::fs::write(&path, b"definitely not a png").unwrap();
        assert!(matches!(
            image_to_pdf_document(&path, 96.0),
            Err(DocConvError::CorruptInput { .. })
        ));
    }
}
