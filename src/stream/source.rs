use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crossbeam_channel::{Receiver, Sender, TrySendError};
use image::{ImageFormat, RgbImage};
use crate::error::Error;
use crate::stream::{Frame, FrameSource};

/// Frames from any in-memory iterator of images, numbered in order.
pub struct IterSource<I> {
    iter: Option<I>,
    next_index: u64,
}

impl<I: Iterator<Item = RgbImage>> IterSource<I> {
    pub fn new<T: IntoIterator<IntoIter = I, Item = RgbImage>>(images: T) -> Self {
        Self {
            iter: Some(images.into_iter()),
            next_index: 0,
        }
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.iter.is_none()
    }
}

impl<I: Iterator<Item = RgbImage>> FrameSource for IterSource<I> {
    fn next_frame(&mut self) -> Option<Frame> {
        let image = self.iter.as_mut()?.next()?;
        let frame = Frame::new(self.next_index, image);
        self.next_index += 1;

        Some(frame)
    }

    fn release(&mut self) {
        self.iter = None;
    }
}

/// A recorded clip stored as numbered still images in one directory.
///
/// Files are read in lexicographic order of their names; anything that is
/// not a recognised image format is ignored. A file that fails to decode ends
/// the stream.
pub struct ImageSequenceSource {
    paths: VecDeque<PathBuf>,
    next_index: u64,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, Error> {
        let mut paths = Vec::new();

        for entry in std::fs::read_dir(dir.as_ref())? {
            let path = entry?.path();

            if path.is_file() && ImageFormat::from_path(&path).is_ok() {
                paths.push(path);
            }
        }

        paths.sort();

        tracing::info!(dir = %dir.as_ref().display(), frames = paths.len(), "opened image sequence");

        Ok(Self::from_paths(paths))
    }

    pub fn from_paths<I: IntoIterator<Item = PathBuf>>(paths: I) -> Self {
        Self {
            paths: paths.into_iter().collect(),
            next_index: 0,
        }
    }

    /// Frames not yet read.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Option<Frame> {
        let path = self.paths.pop_front()?;

        match image::open(&path) {
            Ok(image) => {
                let frame = Frame::new(self.next_index, image.to_rgb8());
                self.next_index += 1;

                Some(frame)
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "failed to read frame, ending stream");
                self.release();

                None
            }
        }
    }

    fn release(&mut self) {
        self.paths.clear();
    }
}

/// Create a bounded hand-off between a capture callback and a [`LiveSource`].
///
/// `capacity` frames may be queued before [`LiveFeed::push`] blocks.
pub fn live_feed(capacity: usize) -> (LiveFeed, LiveSource) {
    let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));

    (
        LiveFeed { tx },
        LiveSource { rx: Some(rx), next_index: 0 },
    )
}

/// Producer half of a live stream, handed to the capture callback. Cloneable.
#[derive(Clone)]
pub struct LiveFeed {
    tx: Sender<RgbImage>,
}

impl LiveFeed {
    /// Queue a captured image, waiting for room. Returns `false` once the
    /// consuming source has been released.
    pub fn push(&self, image: RgbImage) -> bool {
        self.tx.send(image).is_ok()
    }

    /// Queue a captured image unless the queue is full. Returns `false` when the
    /// frame was dropped or the consuming source has been released.
    pub fn try_push(&self, image: RgbImage) -> bool {
        match self.tx.try_send(image) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::debug!("live feed full, dropping frame");
                false
            }
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Consumer half of a live stream. Ends when every [`LiveFeed`] is dropped.
pub struct LiveSource {
    rx: Option<Receiver<RgbImage>>,
    next_index: u64,
}

impl FrameSource for LiveSource {
    fn next_frame(&mut self) -> Option<Frame> {
        let image = self.rx.as_ref()?.recv().ok()?;
        let frame = Frame::new(self.next_index, image);
        self.next_index += 1;

        Some(frame)
    }

    fn release(&mut self) {
        self.rx = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iter_source_numbers_frames_and_releases() {
        let mut source = IterSource::new(vec![RgbImage::new(2, 2); 3]);

        assert_eq!(source.next_frame().map(|f| f.index), Some(0));
        assert_eq!(source.next_frame().map(|f| f.index), Some(1));

        source.release();
        source.release();
        assert!(source.is_released());
        assert!(source.next_frame().is_none());
    }

    #[test]
    fn live_source_ends_when_feed_is_dropped() {
        let (feed, mut source) = live_feed(4);

        let producer = std::thread::spawn(move || {
            for _ in 0..3 {
                assert!(feed.push(RgbImage::new(2, 2)));
            }
        });

        let mut indices = vec![];
        while let Some(frame) = source.next_frame() {
            indices.push(frame.index);
        }
        producer.join().unwrap();

        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn released_live_source_rejects_frames() {
        let (feed, mut source) = live_feed(1);

        source.release();

        assert!(!feed.push(RgbImage::new(2, 2)));
        assert!(source.next_frame().is_none());
    }

    #[test]
    fn unreadable_file_ends_image_sequence() -> anyhow::Result<()> {
        let dir = std::env::temp_dir().join(format!("till-audit-seq-{}", std::process::id()));
        std::fs::create_dir_all(&dir)?;

        RgbImage::new(3, 3).save(dir.join("000.png"))?;
        std::fs::write(dir.join("001.png"), b"not a png")?;
        RgbImage::new(3, 3).save(dir.join("002.png"))?;
        std::fs::write(dir.join("notes.txt"), b"ignored")?;

        let mut source = ImageSequenceSource::open(&dir)?;
        assert_eq!(source.remaining(), 3);

        assert!(source.next_frame().is_some());
        assert!(source.next_frame().is_none());
        assert!(source.next_frame().is_none());

        std::fs::remove_dir_all(&dir)?;
        Ok(())
    }
}
