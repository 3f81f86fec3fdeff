use super::base::{BoundingVolume, RecordLink};

/// Bounding volume collision attached to an AV object through its collision link.
#[derive(Debug, Clone, PartialEq)]
pub struct NiCollisionData {
    pub target: RecordLink,
    pub propagation_mode: u32,
    pub collision_mode: u32,
    pub bounding_volume: Option<BoundingVolume>,
}

impl Default for NiCollisionData {
    fn default() -> Self {
        Self {
            target: RecordLink::Null,
            propagation_mode: 1,
            collision_mode: 2,
            bounding_volume: None,
        }
    }
}
