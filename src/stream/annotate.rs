use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use crate::error::Error;
use crate::sort::TrackedDetection;

const PALLETE: (u64, u64, u64) = (2047, 32767, 1048575);

/// A stable colour per track identity.
pub fn color_for_track(track_id: u64) -> Rgb<u8> {
    let c = track_id.wrapping_mul(track_id).wrapping_sub(track_id).wrapping_add(1);

    Rgb([
        (PALLETE.0.wrapping_mul(c) % 255) as u8,
        (PALLETE.1.wrapping_mul(c) % 255) as u8,
        (PALLETE.2.wrapping_mul(c) % 255) as u8,
    ])
}

/// Draws `#<id> <label>` captions above boxes.
pub struct Labeler {
    font: FontVec,
    scale: PxScale,
}

impl Labeler {
    pub const DEFAULT_SCALE: f32 = 14.0;

    pub fn new(font: FontVec) -> Self {
        Self { font, scale: PxScale::from(Self::DEFAULT_SCALE) }
    }

    /// Load a TrueType or OpenType font from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref();
        let data = std::fs::read(path)?;
        let font = FontVec::try_from_vec(data)
            .map_err(|err| Error::InvalidConfig(format!("{}: {}", path.display(), err)))?;

        Ok(Self::new(font))
    }

    pub fn with_scale(mut self, scale: f32) -> Self {
        self.scale = PxScale::from(scale);
        self
    }

    fn draw(&self, image: &mut RgbImage, rect: Rect, color: Rgb<u8>, text: &str) {
        let (w, h) = text_size(self.scale, &self.font, text);
        if w == 0 || h == 0 {
            return;
        }

        let top = if rect.top() >= h as i32 + 2 { rect.top() - h as i32 - 2 } else { rect.top() };

        draw_filled_rect_mut(image, Rect::at(rect.left(), top).of_size(w + 4, h + 2), color);
        draw_text_mut(image, Rgb([255, 255, 255]), rect.left() + 2, top + 1, self.scale, &self.font, text);
    }
}

/// Draw every tracked box and its motion trace onto `image`, with a caption
/// per box when a labeler is given.
pub fn annotate(image: &mut RgbImage, tracked: &[TrackedDetection], labeler: Option<&Labeler>) {
    for det in tracked {
        let color = color_for_track(det.track_id);

        if let Some(rect) = clip_rect(image, det) {
            draw_hollow_rect_mut(image, rect, color);

            if rect.width() > 2 && rect.height() > 2 {
                let inner = Rect::at(rect.left() + 1, rect.top() + 1)
                    .of_size(rect.width() - 2, rect.height() - 2);
                draw_hollow_rect_mut(image, inner, color);
            }

            if let Some(labeler) = labeler {
                labeler.draw(image, rect, color, &format!("#{} {}", det.track_id, det.label));
            }
        }

        for pair in det.trace.windows(2) {
            draw_line_segment_mut(image, pair[0], pair[1], color);
        }
    }
}

fn clip_rect(image: &RgbImage, det: &TrackedDetection) -> Option<Rect> {
    let (w, h) = (image.width() as f32, image.height() as f32);

    let left = det.bbox.left().max(0.0).min(w - 1.0);
    let top = det.bbox.top().max(0.0).min(h - 1.0);
    let right = det.bbox.right().max(0.0).min(w - 1.0);
    let bottom = det.bbox.bottom().max(0.0).min(h - 1.0);

    if !(right > left && bottom > top) {
        return None;
    }

    Some(Rect::at(left as i32, top as i32).of_size((right - left) as u32 + 1, (bottom - top) as u32 + 1))
}
