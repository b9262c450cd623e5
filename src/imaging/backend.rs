//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the thumbnail
//! pipeline needs: identify (read intrinsic dimensions) and thumbnail
//! (decode, cover-resize, center-crop, encode). Both work on in-memory bytes;
//! reading sources and writing artifacts is the caller's business.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::ThumbnailParams;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image processing backends.
///
/// Implementations must be shareable across request workers.
pub trait ImageBackend: Send + Sync {
    /// Get image dimensions without a full decode where the codec allows it.
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError>;

    /// Produce an encoded thumbnail of exactly `params.width × params.height`.
    fn thumbnail(&self, source: &[u8], params: &ThumbnailParams)
    -> Result<Vec<u8>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::imaging::{OutputFormat, Quality};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Mock backend that records operations without touching pixels.
    ///
    /// Uses Mutex and atomics (not RefCell) so it is Sync and can be shared
    /// by concurrent request workers. `thumbnails()` doubles as the
    /// generation counter.
    #[derive(Default)]
    pub struct MockBackend {
        pub dimensions: Option<Dimensions>,
        pub fail_decode: bool,
        pub fail_encode: bool,
        pub delay: Duration,
        pub identify_calls: AtomicUsize,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify { source_len: usize },
        Thumbnail {
            source_len: usize,
            width: u32,
            height: u32,
            format: OutputFormat,
            quality: u32,
        },
    }

    impl MockBackend {
        pub fn with_dimensions(width: u32, height: u32) -> Self {
            Self {
                dimensions: Some(Dimensions { width, height }),
                ..Self::default()
            }
        }

        /// Sleep inside `thumbnail` to widen race windows in concurrency tests.
        pub fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn failing_decode(mut self) -> Self {
            self.fail_decode = true;
            self
        }

        pub fn failing_encode(mut self) -> Self {
            self.fail_encode = true;
            self
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn thumbnails(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Thumbnail { .. }))
                .count()
        }

        pub fn identifies(&self) -> usize {
            self.identify_calls.load(Ordering::SeqCst)
        }

        /// Deterministic artifact content for a given parameter set.
        pub fn expected_bytes(params: &ThumbnailParams) -> Vec<u8> {
            format!(
                "{}x{}.{}@{}",
                params.width,
                params.height,
                params.format.extension(),
                params.quality.value()
            )
            .into_bytes()
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError> {
            self.identify_calls.fetch_add(1, Ordering::SeqCst);
            self.operations.lock().unwrap().push(RecordedOp::Identify {
                source_len: source.len(),
            });
            self.dimensions
                .ok_or_else(|| BackendError::Decode("No mock dimensions".to_string()))
        }

        fn thumbnail(
            &self,
            source: &[u8],
            params: &ThumbnailParams,
        ) -> Result<Vec<u8>, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Thumbnail {
                source_len: source.len(),
                width: params.width,
                height: params.height,
                format: params.format,
                quality: params.quality.value(),
            });
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            if self.fail_decode {
                return Err(BackendError::Decode("mock decode failure".to_string()));
            }
            if self.fail_encode {
                return Err(BackendError::Encode("mock encode failure".to_string()));
            }
            Ok(Self::expected_bytes(params))
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_dimensions(800, 600);

        let result = backend.identify(b"abc").unwrap();
        assert_eq!(result, Dimensions { width: 800, height: 600 });
        assert_eq!(backend.identifies(), 1);
        assert_eq!(
            backend.get_operations(),
            vec![RecordedOp::Identify { source_len: 3 }]
        );
    }

    #[test]
    fn mock_without_dimensions_fails_identify() {
        let backend = MockBackend::default();
        assert!(matches!(
            backend.identify(b""),
            Err(BackendError::Decode(_))
        ));
    }

    #[test]
    fn mock_records_thumbnail() {
        let backend = MockBackend::with_dimensions(10, 10);
        let params = ThumbnailParams {
            width: 400,
            height: 500,
            format: OutputFormat::WebP,
            quality: Quality::new(85),
        };

        let bytes = backend.thumbnail(b"src", &params).unwrap();
        assert_eq!(bytes, b"400x500.webp@85".to_vec());
        assert_eq!(backend.thumbnails(), 1);
        assert!(matches!(
            &backend.get_operations()[0],
            RecordedOp::Thumbnail {
                width: 400,
                height: 500,
                format: OutputFormat::WebP,
                quality: 85,
                ..
            }
        ));
    }

    #[test]
    fn mock_failing_decode_still_counts_attempt() {
        let backend = MockBackend::with_dimensions(10, 10).failing_decode();
        let params = ThumbnailParams {
            width: 1,
            height: 1,
            format: OutputFormat::Png,
            quality: Quality::default(),
        };
        assert!(backend.thumbnail(b"src", &params).is_err());
        assert_eq!(backend.thumbnails(), 1);
    }
}
