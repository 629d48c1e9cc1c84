//! Burn detection boxes into recorded segments.
//!
//! Each segment is decoded to a still, the boxes of a `DetectionSet` snapshot are
//! stroked onto it, and the result is re-encoded as PNG. Decoding is the only
//! step expected to fail on real input (partial container chunks are not
//! images); callers keep the raw segment in that case.

use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use crate::detect::{BoundingBox, DetectionSet};
use crate::ingest::encoder::{MediaSegment, MIME_PNG};

/// Stroke colour for composited boxes.
pub const BOX_COLOR: Rgba<u8> = Rgba([255, 0, 0, 255]);

/// Stroke width in pixels.
pub const BOX_LINE_WIDTH: u32 = 2;

/// Decode `segment`, composite `detections`, and re-encode.
pub fn annotate_segment(segment: &MediaSegment, detections: &DetectionSet) -> Result<MediaSegment> {
    let decoded = image::load_from_memory(segment.data())
        .with_context(|| format!("decode {} segment ({} bytes)", segment.mime, segment.size()))?;
    let mut canvas = decoded.to_rgba8();
    for detection in detections.iter() {
        stroke_rect(&mut canvas, &detection.bbox, BOX_COLOR, BOX_LINE_WIDTH);
    }
    let encoded = encode_png(canvas)?;
    Ok(MediaSegment::annotated_from(segment, encoded, MIME_PNG))
}

/// Encode an RGB or RGBA image as PNG.
pub fn encode_png(image: impl Into<DynamicImage>) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    image
        .into()
        .write_to(&mut out, ImageFormat::Png)
        .context("encode PNG")?;
    Ok(out.into_inner())
}

/// Stroke the outline of `bbox`, `line_width` pixels thick, growing inward.
///
/// Coordinates are rounded to whole pixels and clipped to the canvas.
fn stroke_rect(canvas: &mut RgbaImage, bbox: &BoundingBox, color: Rgba<u8>, line_width: u32) {
    let (cw, ch) = (canvas.width() as i64, canvas.height() as i64);
    let x0 = bbox.x.round() as i64;
    let y0 = bbox.y.round() as i64;
    let x1 = (bbox.x + bbox.width).round() as i64;
    let y1 = (bbox.y + bbox.height).round() as i64;
    if x1 <= x0 || y1 <= y0 || x1 <= 0 || y1 <= 0 || x0 >= cw || y0 >= ch {
        return;
    }
    let lw = line_width as i64;

    let mut fill = |xa: i64, ya: i64, xb: i64, yb: i64| {
        for y in ya.max(0)..yb.min(ch) {
            for x in xa.max(0)..xb.min(cw) {
                canvas.put_pixel(x as u32, y as u32, color);
            }
        }
    };
    fill(x0, y0, x1, (y0 + lw).min(y1));
    fill(x0, (y1 - lw).max(y0), x1, y1);
    fill(x0, y0, (x0 + lw).min(x1), y1);
    fill((x1 - lw).max(x0), y0, x1, y1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, RawDetection};
    use image::{Rgb, RgbImage};

    fn png_segment(w: u32, h: u32) -> MediaSegment {
        let image = RgbImage::from_pixel(w, h, Rgb([0, 0, 255]));
        MediaSegment::new(encode_png(image).unwrap(), MIME_PNG, 42)
    }

    fn set_with(bbox: BoundingBox) -> DetectionSet {
        DetectionSet::from_raw(1, 0, vec![RawDetection::new("cat", 0.9, bbox)])
    }

    #[test]
    fn annotated_segment_has_red_outline_and_untouched_interior() -> Result<()> {
        let segment = png_segment(20, 20);
        let out = annotate_segment(&segment, &set_with(BoundingBox::new(2.0, 3.0, 10.0, 8.0)))?;
        assert!(out.annotated);
        assert_eq!(out.captured_at_ms, 42);
        assert_eq!(out.mime, MIME_PNG);

        let img = image::load_from_memory(out.data())?.to_rgba8();
        assert_eq!(*img.get_pixel(2, 3), BOX_COLOR);
        assert_eq!(*img.get_pixel(3, 4), BOX_COLOR);
        assert_eq!(*img.get_pixel(11, 10), BOX_COLOR);
        assert_eq!(*img.get_pixel(7, 7), Rgba([0, 0, 255, 255]));
        assert_eq!(*img.get_pixel(0, 0), Rgba([0, 0, 255, 255]));
        Ok(())
    }

    #[test]
    fn boxes_past_the_edge_are_clipped() -> Result<()> {
        let segment = png_segment(8, 8);
        let out = annotate_segment(&segment, &set_with(BoundingBox::new(-4.0, 5.0, 40.0, 40.0)))?;
        let img = image::load_from_memory(out.data())?.to_rgba8();
        assert_eq!(*img.get_pixel(0, 5), BOX_COLOR);
        assert_eq!(*img.get_pixel(7, 6), BOX_COLOR);
        Ok(())
    }

    #[test]
    fn empty_set_still_reencodes() -> Result<()> {
        let segment = png_segment(4, 4);
        let out = annotate_segment(&segment, &DetectionSet::empty())?;
        assert!(out.annotated);
        let img = image::load_from_memory(out.data())?.to_rgba8();
        assert!(img.pixels().all(|p| *p == Rgba([0, 0, 255, 255])));
        Ok(())
    }

    #[test]
    fn undecodable_segment_is_an_error() {
        let segment = MediaSegment::new(vec![0x1a, 0x45, 0xdf, 0xa3, 0, 1], "video/webm", 0);
        assert!(annotate_segment(&segment, &DetectionSet::empty()).is_err());
    }
}
