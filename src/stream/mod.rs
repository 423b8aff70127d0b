pub mod annotate;
pub mod driver;
pub mod source;

pub use annotate::Labeler;
pub use driver::{Stream, StreamEvent};
pub use source::{live_feed, ImageSequenceSource, IterSource, LiveFeed, LiveSource};

use image::RgbImage;

/// One decoded image together with its position in the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Zero-based position of the frame in its source.
    pub index: u64,
    pub image: RgbImage,
}

impl Frame {
    #[inline]
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// An ordered, possibly endless, sequence of frames.
///
/// `None` from `next_frame` means end of stream: the source ran out or a
/// frame could not be read. `release` frees the underlying device or files
/// and may be called any number of times; a released source yields nothing.
pub trait FrameSource {
    fn next_frame(&mut self) -> Option<Frame>;

    fn release(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    #[inline]
    fn next_frame(&mut self) -> Option<Frame> {
        (**self).next_frame()
    }

    #[inline]
    fn release(&mut self) {
        (**self).release()
    }
}
