//! The image reassembly component.
//!
//! Owns the single in-flight [`ImageBuffer`]. Completed frames are published
//! as [`DecodedEvent::ImageReady`] and offered to persistence listeners on a
//! separate channel.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace};

use crate::event::DecodedEvent;
use crate::fanout::Broadcaster;
use crate::image::{CompletedImage, ImageBuffer};

/// Accumulates image chunks and emits finished frames.
#[derive(Clone)]
pub struct ImageReassembler {
    buffer: Arc<Mutex<ImageBuffer>>,
    broadcaster: Broadcaster,
    images_tx: broadcast::Sender<CompletedImage>,
    completed: Arc<AtomicU64>,
}

impl ImageReassembler {
    /// Create a reassembler for frames of `expected` bytes.
    pub fn new(expected: usize, broadcaster: Broadcaster) -> Self {
        let (images_tx, _) = broadcast::channel(8);

        Self {
            buffer: Arc::new(Mutex::new(ImageBuffer::new(expected))),
            broadcaster,
            images_tx,
            completed: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append a chunk; publishes `ImageReady` when it completes a frame.
    ///
    /// Returns the finished frame, if any.
    pub fn append(&self, chunk: &[u8]) -> Option<CompletedImage> {
        let completed = {
            let mut buffer = self.buffer.lock();
            let completed = buffer.append(chunk);
            if completed.is_none() {
                trace!(
                    "Receiving image: {}/{} bytes",
                    buffer.len(),
                    buffer.expected()
                );
            }
            completed
        };

        let image = completed?;
        let count = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        info!(
            "Full image received ({} bytes, {} discarded), #{}",
            image.len(),
            image.discarded(),
            count
        );

        self.broadcaster.publish(DecodedEvent::ImageReady {
            bytes: image.pixels().clone(),
        });
        let _ = self.images_tx.send(image.clone());

        Some(image)
    }

    /// Discard the frame in flight without emitting anything.
    pub fn reset(&self) {
        let mut buffer = self.buffer.lock();
        if !buffer.is_empty() {
            debug!(
                "Discarding partial image ({}/{} bytes)",
                buffer.len(),
                buffer.expected()
            );
        }
        buffer.reset();
    }

    /// `(received, expected)` for the frame in flight.
    pub fn progress(&self) -> (usize, usize) {
        let buffer = self.buffer.lock();
        (buffer.len(), buffer.expected())
    }

    /// Number of frames completed since creation.
    pub fn completed_count(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Subscribe to finished frames, e.g. to persist them.
    pub fn subscribe(&self) -> broadcast::Receiver<CompletedImage> {
        self.images_tx.subscribe()
    }
}

impl std::fmt::Debug for ImageReassembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (received, expected) = self.progress();
        f.debug_struct("ImageReassembler")
            .field("received", &received)
            .field("expected", &expected)
            .field("completed", &self.completed_count())
            .finish()
    }
}
