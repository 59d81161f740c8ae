//! Queue family scoring and role assignment.
//!
//! The engine submits work on four logical queues: graphics-adjacent compute,
//! dedicated compute (transforms), filter-stage work and transfer. Families are
//! described by [`QueueFamily`] so the selection policy stays independent of
//! the backend that reports them.

use std::collections::VecDeque;

/// Number of compute-capable families at which device selection stops looking.
pub const ENOUGH_COMPUTE_FAMILIES: usize = 3;

/// Capabilities advertised by one queue family of an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamily {
    pub index: u32,
    pub queue_count: u32,
    pub compute: bool,
    pub graphics: bool,
    pub transfer: bool,
}

impl QueueFamily {
    /// The single universal family a wgpu adapter exposes.
    pub fn universal(compute: bool) -> Self {
        Self {
            index: 0,
            queue_count: 1,
            compute,
            graphics: true,
            transfer: true,
        }
    }

    pub fn is_compute_capable(&self) -> bool {
        self.compute && self.queue_count > 0
    }

    fn is_transfer_capable(&self) -> bool {
        self.transfer && self.queue_count > 0
    }
}

/// Logical queue a submission is issued on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    /// Graphics-adjacent compute.
    Graphics,
    /// Dedicated compute: transforms and mask derivation.
    Compute,
    /// Multiply and reduce stages of the filter.
    Filter,
    /// Uploads and downloads.
    Transfer,
}

impl QueueRole {
    pub fn name(&self) -> &'static str {
        match self {
            QueueRole::Graphics => "graphics",
            QueueRole::Compute => "compute",
            QueueRole::Filter => "filter",
            QueueRole::Transfer => "transfer",
        }
    }
}

/// Family index chosen for each role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRoles {
    pub graphics: u32,
    pub compute: u32,
    pub transfer: u32,
}

impl QueueRoles {
    /// Family backing a logical role. Filter work shares the graphics-adjacent family.
    pub fn family(&self, role: QueueRole) -> u32 {
        match role {
            QueueRole::Graphics | QueueRole::Filter => self.graphics,
            QueueRole::Compute => self.compute,
            QueueRole::Transfer => self.transfer,
        }
    }
}

pub fn count_compute_families(families: &[QueueFamily]) -> usize {
    families.iter().filter(|f| f.is_compute_capable()).count()
}

/// Pick the candidate with the most compute-capable families.
///
/// Ties keep the first candidate seen; scanning stops as soon as a candidate
/// reaches [`ENOUGH_COMPUTE_FAMILIES`]. Returns `None` when no candidate has any.
pub fn select_device<I>(compute_counts: I) -> Option<usize>
where
    I: IntoIterator<Item = usize>,
{
    let mut best = 0;
    let mut selected = None;
    for (idx, count) in compute_counts.into_iter().enumerate() {
        if count > best {
            best = count;
            selected = Some(idx);
            if best >= ENOUGH_COMPUTE_FAMILIES {
                break;
            }
        }
    }
    selected
}

/// Assign families to roles.
///
/// Compute-only families go to the front of the candidate list and families
/// that also do graphics to the back; the front becomes the dedicated compute
/// family and the back the graphics-adjacent one. Transfer takes a family not
/// claimed by either when one exists, otherwise the last transfer-capable family.
pub fn assign_queue_roles(families: &[QueueFamily]) -> Option<QueueRoles> {
    let mut candidates = VecDeque::new();
    for family in families.iter().filter(|f| f.is_compute_capable()) {
        if family.graphics {
            candidates.push_back(family.index);
        } else {
            candidates.push_front(family.index);
        }
    }
    let graphics = *candidates.back()?;
    let compute = *candidates.front()?;

    let mut transfer = None;
    for family in families.iter().filter(|f| f.is_transfer_capable()) {
        transfer = Some(family.index);
        if !candidates.contains(&family.index) {
            break;
        }
    }

    Some(QueueRoles {
        graphics,
        compute,
        // Compute families can always service copies.
        transfer: transfer.unwrap_or(compute),
    })
}
