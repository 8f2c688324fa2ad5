//! Raster media to PDF image XObjects

use crate::annotation::MediaPayload;
use crate::error::{AnnotatorError, Result};
use flate2::write::ZlibEncoder;
use flate2::Compression;
use lopdf::{dictionary, Document, ObjectId, Stream};
use std::io::Write;

/// 8-bit RGB pixels with an optional separate alpha plane
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
    pub alpha: Option<Vec<u8>>,
}

/// Decode a `data:image/png;base64,...` payload
pub fn decode_media(media: &MediaPayload) -> Result<RasterImage> {
    let decoded = media.decode()?;
    match decoded.mime.as_str() {
        "image/png" => decode_png(&decoded.bytes),
        other => Err(AnnotatorError::MalformedMedia(format!(
            "unsupported image type '{}'",
            other
        ))),
    }
}

pub fn decode_png(bytes: &[u8]) -> Result<RasterImage> {
    let mut decoder = png::Decoder::new(bytes);
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder
        .read_info()
        .map_err(|e| AnnotatorError::MalformedMedia(format!("PNG header: {}", e)))?;
    let mut buf = vec![0; reader.output_buffer_size()];
    let info = reader
        .next_frame(&mut buf)
        .map_err(|e| AnnotatorError::MalformedMedia(format!("PNG data: {}", e)))?;
    let data = &buf[..info.buffer_size()];

    let pixels = (info.width as usize) * (info.height as usize);
    let mut rgb = Vec::with_capacity(pixels * 3);
    let mut alpha = None;
    match info.color_type {
        png::ColorType::Rgb => rgb.extend_from_slice(data),
        png::ColorType::Rgba => {
            let mut a = Vec::with_capacity(pixels);
            for px in data.chunks_exact(4) {
                rgb.extend_from_slice(&px[..3]);
                a.push(px[3]);
            }
            alpha = Some(a);
        }
        png::ColorType::Grayscale => {
            for &g in data {
                rgb.extend_from_slice(&[g, g, g]);
            }
        }
        png::ColorType::GrayscaleAlpha => {
            let mut a = Vec::with_capacity(pixels);
            for px in data.chunks_exact(2) {
                rgb.extend_from_slice(&[px[0], px[0], px[0]]);
                a.push(px[1]);
            }
            alpha = Some(a);
        }
        png::ColorType::Indexed => {
            return Err(AnnotatorError::MalformedMedia(
                "palette image was not expanded".to_string(),
            ))
        }
    }

    if rgb.len() != pixels * 3 {
        return Err(AnnotatorError::MalformedMedia(format!(
            "expected {} RGB bytes, decoded {}",
            pixels * 3,
            rgb.len()
        )));
    }

    // A fully opaque alpha plane adds nothing
    if alpha.as_ref().is_some_and(|a| a.iter().all(|&v| v == 255)) {
        alpha = None;
    }

    Ok(RasterImage {
        width: info.width,
        height: info.height,
        rgb,
        alpha,
    })
}

fn deflate(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| AnnotatorError::OperationError(e.to_string()))?;
    encoder
        .finish()
        .map_err(|e| AnnotatorError::OperationError(e.to_string()))
}

/// Add the image (and its soft mask) to the document, returning the XObject id
pub fn add_image_xobject(doc: &mut Document, image: &RasterImage) -> Result<ObjectId> {
    let width = i64::from(image.width);
    let height = i64::from(image.height);

    let mut dict = dictionary! {
        "Type" => "XObject",
        "Subtype" => "Image",
        "Width" => width,
        "Height" => height,
        "ColorSpace" => "DeviceRGB",
        "BitsPerComponent" => 8,
        "Filter" => "FlateDecode",
    };

    if let Some(alpha) = &image.alpha {
        let smask = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => width,
                "Height" => height,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
                "Filter" => "FlateDecode",
            },
            deflate(alpha)?,
        );
        let smask_id = doc.add_object(smask);
        dict.set("SMask", smask_id);
    }

    let stream = Stream::new(dict, deflate(&image.rgb)?);
    Ok(doc.add_object(stream))
}
