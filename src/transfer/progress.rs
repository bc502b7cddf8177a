//! Progress reporting seam.
//!
//! The transfer engine pushes `(name, percent)` updates through this trait;
//! the multi-row terminal renderer (or anything else) lives on the other
//! side. Implementations must tolerate being called from several worker
//! tasks at once.

/// Sink for per-file progress updates, `percent` in `0.0..=100.0`.
pub trait ProgressSink: Send + Sync {
    fn update(&self, name: &str, percent: f32);
}

/// Discards every update. Batch workers use this when running quiet.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn update(&self, _name: &str, _percent: f32) {}
}

impl<F> ProgressSink for F
where
    F: Fn(&str, f32) + Send + Sync,
{
    fn update(&self, name: &str, percent: f32) {
        self(name, percent)
    }
}
