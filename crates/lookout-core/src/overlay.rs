//! Draw detection boxes and identity labels onto a display frame.

use crate::types::{Detection, FaceBox, Frame};
use ab_glyph::{FontArc, PxScale};
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

/// Box and label colour for matched faces.
pub const KNOWN_COLOR: Rgb<u8> = Rgb([200, 0, 0]);
/// Box and label colour for faces that matched nobody.
pub const UNKNOWN_COLOR: Rgb<u8> = Rgb([128, 128, 128]);
pub const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
pub const LINE_WIDTH: u32 = 4;
pub const FONT_SCALE: f32 = 24.0;
const LABEL_PADDING: u32 = 3;

/// DejaVu Sans Mono, used for labels unless another font is configured.
static BUNDLED_FONT: &[u8] = include_bytes!("../assets/DejaVuSansMono.ttf");

/// The font shipped with the crate.
pub fn bundled_font() -> Option<FontArc> {
    match FontArc::try_from_slice(BUNDLED_FONT) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(error = %e, "bundled overlay font is unreadable");
            None
        }
    }
}

/// Fixed visual style for the overlay.
#[derive(Clone)]
pub struct OverlayStyle {
    pub known_color: Rgb<u8>,
    pub unknown_color: Rgb<u8>,
    pub text_color: Rgb<u8>,
    pub line_width: u32,
    pub font_scale: f32,
    /// Label font. `None` draws bars without glyphs.
    pub font: Option<FontArc>,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            known_color: KNOWN_COLOR,
            unknown_color: UNKNOWN_COLOR,
            text_color: TEXT_COLOR,
            line_width: LINE_WIDTH,
            font_scale: FONT_SCALE,
            font: bundled_font(),
        }
    }
}

impl OverlayStyle {
    pub fn with_font(mut self, font: FontArc) -> Self {
        self.font = Some(font);
        self
    }

    /// Load a TTF/OTF font file for label text.
    pub fn load_font(path: &std::path::Path) -> std::io::Result<FontArc> {
        let bytes = std::fs::read(path)?;
        FontArc::try_from_vec(bytes)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }
}

/// Render `detections` over a colour copy of `frame`.
///
/// Boxes are in native frame coordinates and are clipped to the canvas.
/// A frame whose buffer does not match its dimensions renders as black.
pub fn render(frame: &Frame, detections: &[Detection], style: &OverlayStyle) -> RgbImage {
    let mut canvas = match frame.to_luma() {
        Some(gray) => DynamicImage::ImageLuma8(gray).to_rgb8(),
        None => RgbImage::new(frame.width, frame.height),
    };

    for detection in detections {
        let color = if detection.identity.is_known() {
            style.known_color
        } else {
            style.unknown_color
        };
        draw_box(&mut canvas, &detection.bbox, color, style.line_width);
        draw_label(&mut canvas, &detection.bbox, detection.identity.as_str(), color, style);
    }

    canvas
}

fn draw_box(canvas: &mut RgbImage, bbox: &FaceBox, color: Rgb<u8>, line_width: u32) {
    let x = bbox.x1.round() as i32;
    let y = bbox.y1.round() as i32;
    let w = bbox.width().round().max(1.0) as u32;
    let h = bbox.height().round().max(1.0) as u32;

    // Thickness grows inward from the box edge.
    for i in 0..line_width.max(1) {
        if w <= 2 * i || h <= 2 * i {
            break;
        }
        let rect = Rect::at(x + i as i32, y + i as i32).of_size(w - 2 * i, h - 2 * i);
        draw_hollow_rect_mut(canvas, rect, color);
    }
}

/// Filled bar with the label, above the box or inside its top edge when
/// there is no room above.
fn draw_label(canvas: &mut RgbImage, bbox: &FaceBox, label: &str, color: Rgb<u8>, style: &OverlayStyle) {
    let scale = PxScale::from(style.font_scale);
    let (text_w, text_h) = match &style.font {
        Some(font) => text_size(scale, font, label),
        None => (
            (label.chars().count() as f32 * style.font_scale * 0.6).round() as u32,
            style.font_scale.round() as u32,
        ),
    };
    let bar_w = text_w + 2 * LABEL_PADDING;
    let bar_h = text_h.max(1) + 2 * LABEL_PADDING;

    let x = bbox.x1.round() as i32;
    let above = bbox.y1.round() as i32 - bar_h as i32;
    let y = if above >= 0 { above } else { bbox.y1.round() as i32 };

    draw_filled_rect_mut(canvas, Rect::at(x, y).of_size(bar_w.max(1), bar_h), color);
    if let Some(font) = &style.font {
        let pad = LABEL_PADDING as i32;
        draw_text_mut(canvas, style.text_color, x + pad, y + pad, scale, font, label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Identity;

    fn detection(x1: f32, y1: f32, x2: f32, y2: f32, identity: Identity) -> Detection {
        Detection {
            bbox: FaceBox { x1, y1, x2, y2 },
            identity,
            distance: 0.2,
            scale: 0.5,
        }
    }

    fn gray_frame() -> Frame {
        Frame::new(vec![90u8; 200 * 150], 200, 150, 0)
    }

    #[test]
    fn test_render_keeps_native_size() {
        let canvas = render(&gray_frame(), &[], &OverlayStyle::default());
        assert_eq!(canvas.dimensions(), (200, 150));
        assert_eq!(*canvas.get_pixel(10, 10), Rgb([90, 90, 90]));
    }

    #[test]
    fn test_render_draws_box_edges_only() {
        let dets = [detection(50.0, 60.0, 120.0, 140.0, Identity::Known("alice".into()))];
        let canvas = render(&gray_frame(), &dets, &OverlayStyle::default());

        assert_eq!(*canvas.get_pixel(50, 100), KNOWN_COLOR);
        assert_eq!(*canvas.get_pixel(53, 100), KNOWN_COLOR);
        assert_eq!(*canvas.get_pixel(85, 100), Rgb([90, 90, 90]));
        // Label bar sits above the box.
        assert_eq!(*canvas.get_pixel(52, 58), KNOWN_COLOR);
    }

    #[test]
    fn test_unknown_faces_use_unknown_color() {
        let dets = [detection(50.0, 60.0, 120.0, 140.0, Identity::Unknown)];
        let canvas = render(&gray_frame(), &dets, &OverlayStyle::default());
        assert_eq!(*canvas.get_pixel(50, 100), UNKNOWN_COLOR);
    }

    #[test]
    fn test_label_moves_inside_box_at_top_edge() {
        let dets = [detection(20.0, 0.0, 100.0, 80.0, Identity::Known("bob".into()))];
        let canvas = render(&gray_frame(), &dets, &OverlayStyle::default());
        assert_eq!(*canvas.get_pixel(21, 10), KNOWN_COLOR);
    }

    /// Pixels inside the label bar that carry glyph ink rather than bar colour.
    fn glyph_pixels(canvas: &RgbImage, x: u32, y: u32, w: u32, h: u32) -> usize {
        let mut n = 0;
        for py in y..y + h {
            for px in x..x + w {
                let Rgb([_, g, _]) = *canvas.get_pixel(px, py);
                if g > 160 {
                    n += 1;
                }
            }
        }
        n
    }

    #[test]
    fn test_default_style_draws_label_text() {
        let style = OverlayStyle::default();
        assert!(style.font.is_some());

        let frame = Frame::new(vec![0u8; 200 * 150], 200, 150, 0);
        let dets = [detection(40.0, 60.0, 140.0, 140.0, Identity::Known("alice".into()))];
        let canvas = render(&frame, &dets, &style);
        // Bar spans y in [60 - bar_h, 60); the text sits inside it.
        assert!(glyph_pixels(&canvas, 40, 30, 90, 30) > 20);
    }

    #[test]
    fn test_unknown_label_text_is_drawn() {
        let frame = Frame::new(vec![0u8; 200 * 150], 200, 150, 0);
        let dets = [detection(40.0, 60.0, 140.0, 140.0, Identity::Unknown)];
        let style = OverlayStyle::default();
        let canvas = render(&frame, &dets, &style);
        assert!(glyph_pixels(&canvas, 40, 30, 120, 30) > 20);

        // Without a font only the bar is drawn.
        let bare = OverlayStyle {
            font: None,
            ..style
        };
        let canvas = render(&frame, &dets, &bare);
        assert_eq!(glyph_pixels(&canvas, 40, 30, 120, 30), 0);
    }

    #[test]
    fn test_out_of_bounds_boxes_are_clipped() {
        let dets = [
            detection(-40.0, -40.0, 20.0, 20.0, Identity::Unknown),
            detection(180.0, 140.0, 400.0, 400.0, Identity::Known("carol".into())),
            detection(10.0, 10.0, 10.5, 10.5, Identity::Unknown),
        ];
        let canvas = render(&gray_frame(), &dets, &OverlayStyle::default());
        assert_eq!(canvas.dimensions(), (200, 150));
    }

    #[test]
    fn test_malformed_frame_renders_black() {
        let frame = Frame::new(vec![1, 2, 3], 20, 10, 0);
        let canvas = render(&frame, &[], &OverlayStyle::default());
        assert_eq!(canvas.dimensions(), (20, 10));
        assert_eq!(*canvas.get_pixel(5, 5), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_missing_font_file() {
        assert!(OverlayStyle::load_font(std::path::Path::new("/nonexistent/font.ttf")).is_err());
    }
}
