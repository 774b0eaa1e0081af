//! Drag-resize of block column widths.
//!
//! The pointer math is a pure function of container width and a start/current
//! coordinate pair. A [`ResizeTracker`] holds the one resize session that can
//! be active at a time; the editor feeds it pointer moves and decides what to
//! persist on release.

use kila_types::{BlockKey, GRID_COLUMNS, clamp_width};

/// Column delta for a horizontal pointer movement.
///
/// Returns `None` while the container has no measurable width.
pub fn column_delta(container_width: f64, start_x: f64, current_x: f64) -> Option<i64> {
    if container_width.is_nan() || container_width <= 0.0 {
        return None;
    }
    let column_width = container_width / GRID_COLUMNS as f64;
    Some(((current_x - start_x) / column_width).round() as i64)
}

/// Width after dragging from `start_width` by a pointer movement.
pub fn resized_width(start_width: u8, container_width: f64, start_x: f64, current_x: f64) -> Option<u8> {
    column_delta(container_width, start_x, current_x)
        .map(|delta| clamp_width((start_width as i64).saturating_add(delta)))
}

/// An active resize session.
#[derive(Clone, Debug, PartialEq)]
pub struct ResizeSession {
    pub key: BlockKey,
    pub start_x: f64,
    pub start_width: u8,
    /// Width shown while dragging; not persisted until release.
    pub live_width: u8,
}

/// Outcome of releasing the pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeRelease {
    pub key: BlockKey,
    pub start_width: u8,
    pub width: u8,
}

impl ResizeRelease {
    pub fn changed(&self) -> bool {
        self.start_width != self.width
    }
}

/// Holds at most one resize session.
#[derive(Debug, Default)]
pub struct ResizeTracker {
    session: Option<ResizeSession>,
}

impl ResizeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start resizing a block. Replaces any session left dangling.
    pub fn begin(&mut self, key: BlockKey, start_x: f64, start_width: u8) {
        self.session = Some(ResizeSession {
            key,
            start_x,
            start_width,
            live_width: start_width,
        });
    }

    /// Feed a pointer move; returns the new live width if it changed.
    pub fn update(&mut self, container_width: f64, current_x: f64) -> Option<(BlockKey, u8)> {
        let session = self.session.as_mut()?;
        let width = resized_width(session.start_width, container_width, session.start_x, current_x)?;
        if width == session.live_width {
            return None;
        }
        session.live_width = width;
        Some((session.key, width))
    }

    /// End the session. Always clears it.
    pub fn release(&mut self) -> Option<ResizeRelease> {
        self.session.take().map(|s| ResizeRelease {
            key: s.key,
            start_width: s.start_width,
            width: s.live_width,
        })
    }

    pub fn active(&self) -> Option<&ResizeSession> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }
}
