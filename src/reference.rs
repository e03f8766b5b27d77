use crate::rotation::{compose, inverse};
use crate::types::{Position, Quaternion};

/// Zero offset for one device: raw samples are rebased onto the orientation
/// (and position) captured by the last `set_zero`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceFrame {
    orientation: Option<Quaternion>,
    position: Option<Position>,
}

impl ReferenceFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture `raw_orientation` (and `raw_position`, if any) as the new zero.
    /// Overwrites any previous offset. A `None` position keeps the previous
    /// position offset.
    pub fn set_zero(&mut self, raw_orientation: Quaternion, raw_position: Option<Position>) {
        self.set_orientation_zero(raw_orientation);
        if let Some(p) = raw_position {
            self.set_position_zero(p);
        }
    }

    pub fn set_orientation_zero(&mut self, raw: Quaternion) {
        log::debug!("orientation zero set to {}", raw);
        self.orientation = Some(raw);
    }

    pub fn set_position_zero(&mut self, raw: Position) {
        log::debug!("position zero set to {}", raw);
        self.position = Some(raw);
    }

    /// Forget both offsets.
    pub fn clear(&mut self) {
        self.orientation = None;
        self.position = None;
    }

    pub fn orientation_offset(&self) -> Option<Quaternion> {
        self.orientation
    }

    pub fn position_offset(&self) -> Option<Position> {
        self.position
    }

    /// Raw orientation expressed relative to the zero orientation.
    pub fn apply(&self, raw: &Quaternion) -> Quaternion {
        match &self.orientation {
            Some(offset) => compose(&inverse(offset), raw),
            None => *raw,
        }
    }

    pub fn apply_position(&self, raw: &Position) -> Position {
        match &self.position {
            Some(offset) => *raw - *offset,
            None => *raw,
        }
    }
}
