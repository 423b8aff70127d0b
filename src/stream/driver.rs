use crate::detector::Detector;
use crate::error::Error;
use crate::session::{ProcessedFrame, Session, Summary};
use crate::stream::{Frame, FrameSource};

/// What the driver hands back for each frame it pulls.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// The frame went through detection, tracking and aggregation.
    Processed(ProcessedFrame),
    /// The frame fell between strides and is returned exactly as read.
    Skipped(Frame),
}

impl StreamEvent {
    /// The frame to display, annotated or not.
    #[inline]
    pub fn frame(&self) -> &Frame {
        match self {
            StreamEvent::Processed(processed) => &processed.frame,
            StreamEvent::Skipped(frame) => frame,
        }
    }

    #[inline]
    pub fn is_skipped(&self) -> bool {
        matches!(self, StreamEvent::Skipped(_))
    }
}

/// Pull-based driver over one stream.
///
/// Created by [`Session::stream`], which resets the session first. Each call
/// to `next` reads one frame and runs it to completion before returning. The
/// source is released when it runs dry, when a frame fails to process, or
/// when the stream is dropped.
pub struct Stream<'s, D: Detector, S: FrameSource> {
    session: &'s mut Session<D>,
    source: S,
    stride: u64,
    position: u64,
    finished: bool,
}

impl<'s, D: Detector, S: FrameSource> Stream<'s, D, S> {
    pub(crate) fn new(session: &'s mut Session<D>, source: S) -> Self {
        session.reset();

        let stride = u64::from(session.config().frame_stride.max(1));
        tracing::info!(stride, "stream started");

        Self {
            session,
            source,
            stride,
            position: 0,
            finished: false,
        }
    }

    /// Frames pulled from the source so far, skipped ones included.
    #[inline]
    pub fn position(&self) -> u64 {
        self.position
    }

    #[inline]
    pub fn session(&self) -> &Session<D> {
        &*self.session
    }

    /// Stop pulling and release the source. Idempotent.
    pub fn release(&mut self) {
        if !self.finished {
            tracing::info!(
                frames = self.position,
                processed = self.session.aggregator().frame_count(),
                "stream finished"
            );
        }

        self.finished = true;
        self.source.release();
    }

    /// Drain what is left of the stream and return the session summary.
    pub fn finish(mut self) -> Result<Summary, Error> {
        while let Some(event) = self.next() {
            event?;
        }

        Ok(self.session.final_summary())
    }

    // One out of every `stride` frames is processed: the last of each group.
    #[inline]
    fn should_process(&self, position: u64) -> bool {
        (position + 1) % self.stride == 0
    }
}

impl<'s, D: Detector, S: FrameSource> Iterator for Stream<'s, D, S> {
    type Item = Result<StreamEvent, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let frame = match self.source.next_frame() {
            Some(frame) => frame,
            None => {
                self.release();
                return None;
            }
        };

        let position = self.position;
        self.position += 1;

        if !self.should_process(position) {
            return Some(Ok(StreamEvent::Skipped(frame)));
        }

        match self.session.process_frame(frame) {
            Ok(processed) => Some(Ok(StreamEvent::Processed(processed))),
            Err(err) => {
                tracing::warn!(error = %err, "frame processing failed, stopping stream");
                self.release();
                Some(Err(err))
            }
        }
    }
}

impl<'s, D: Detector, S: FrameSource> Drop for Stream<'s, D, S> {
    fn drop(&mut self) {
        self.release();
    }
}
