use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Divider position shown whenever either displayed image changes.
pub const RESET_PERCENT: f64 = 50.0;

/// Horizontal extent of the comparison container in pointer
/// coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub left: f64,
    pub width: f64,
}

/// Tracks the divider of a two-layer before/after image stack. The
/// upper (generated) image is clipped to the left `percent()` of the
/// container; dragging the divider updates the percentage from global
/// pointer coordinates.
///
/// Pointer tracking is only live while a [`DragGuard`] is alive.
/// Dropping the guard releases the drag on every exit path, including
/// teardown of whatever owns the comparator, so a drag can never leak
/// past the component that started it.
#[derive(Debug)]
pub struct Comparator {
    percent: f64,
    dragging: Arc<AtomicBool>,
}

/// Scoped drag subscription returned by [`Comparator::begin_drag`].
#[derive(Debug)]
pub struct DragGuard {
    dragging: Arc<AtomicBool>,
}

impl Drop for DragGuard {
    fn drop(&mut self) {
        self.dragging.store(false, Ordering::SeqCst);
    }
}

impl Comparator {
    pub fn new() -> Self {
        Self {
            percent: RESET_PERCENT,
            dragging: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn percent(&self) -> f64 {
        self.percent
    }

    /// Inset applied to the right edge of the upper image, so that only
    /// the left `percent` of it is revealed.
    pub fn reveal_inset(&self) -> f64 {
        100.0 - self.percent
    }

    /// Call when either displayed image changes; the divider snaps back
    /// to the midpoint.
    pub fn reset(&mut self) {
        self.percent = RESET_PERCENT;
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging.load(Ordering::SeqCst)
    }

    /// Starts a drag (pointer-down on the divider handle). Tracking
    /// stays live until the returned guard is dropped (pointer-up or
    /// teardown).
    pub fn begin_drag(&mut self) -> DragGuard {
        self.dragging.store(true, Ordering::SeqCst);
        DragGuard {
            dragging: Arc::clone(&self.dragging),
        }
    }

    /// Feeds one global pointer-move event. Ignored unless a drag is in
    /// progress or the frame is degenerate. Returns the (possibly
    /// unchanged) divider percentage.
    pub fn track(&mut self, pointer_x: f64, frame: Frame) -> f64 {
        if !self.is_dragging() || frame.width <= 0.0 {
            return self.percent;
        }
        self.percent = clamp_percent((pointer_x - frame.left) / frame.width * 100.0);
        self.percent
    }
}

impl Default for Comparator {
    fn default() -> Self {
        Self::new()
    }
}

pub fn clamp_percent(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}
