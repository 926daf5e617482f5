//! Progress reporting for uploads

use std::sync::Arc;

/// Progress update information
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    /// Total file size
    pub total_size: u64,
    /// Total bytes acknowledged by the upload servers
    pub uploaded: u64,
    /// Progress percentage (0.0 - 1.0)
    pub progress: f64,
    /// Slice that was just acknowledged
    pub current_slice: Option<u64>,
    /// Number of acknowledged slices
    pub completed_slices: usize,
    /// Total number of slices
    pub total_slices: usize,
}

impl ProgressUpdate {
    /// Create a new progress update
    pub fn new(
        total_size: u64,
        uploaded: u64,
        current_slice: Option<u64>,
        completed_slices: usize,
        total_slices: usize,
    ) -> Self {
        let progress = if total_size > 0 {
            uploaded as f64 / total_size as f64
        } else {
            1.0
        };

        Self {
            total_size,
            uploaded,
            progress,
            current_slice,
            completed_slices,
            total_slices,
        }
    }
}

/// Trait for receiving progress updates
pub trait ProgressCallback: Send + Sync {
    /// Called when upload progress changes
    fn on_progress(&self, update: ProgressUpdate);
}

/// No-op progress callback implementation
pub struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _update: ProgressUpdate) {}
}

/// Closure-based progress callback
pub struct FnProgress<F>(pub F);

impl<F> ProgressCallback for FnProgress<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn on_progress(&self, update: ProgressUpdate) {
        (self.0)(update)
    }
}

/// Arc wrapper for progress callbacks
impl<T: ProgressCallback> ProgressCallback for Arc<T> {
    fn on_progress(&self, update: ProgressUpdate) {
        (**self).on_progress(update)
    }
}
