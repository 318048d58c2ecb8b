//! Moving objects and their generational arena.

use std::fmt;

use doomsday_core::{Aabb2, SectorId};
use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use super::node_pile::NodeIndex;

/// Handle to a mobj. Stale handles are detected by generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MobjId {
    index: u32,
    generation: u32,
}

impl MobjId {
    #[inline]
    pub const fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub const fn generation(self) -> u32 {
        self.generation
    }

    #[cfg(test)]
    pub(crate) const fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }
}

impl fmt::Display for MobjId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Parameters for a new mobj.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MobjSpawn {
    pub origin: DVec3,
    pub radius: f64,
    pub height: f64,
}

impl MobjSpawn {
    pub const fn new(origin: DVec3, radius: f64, height: f64) -> Self {
        Self {
            origin,
            radius,
            height,
        }
    }
}

/// Linkage bookkeeping, only touched by `WorldLinkage`.
#[derive(Clone, Debug)]
pub(crate) struct MobjLinks {
    /// Sector whose ring currently holds the mobj.
    pub ring_sector: Option<SectorId>,
    pub s_prev: Option<MobjId>,
    pub s_next: Option<MobjId>,
    /// Root of this mobj's line ring.
    pub line_root: NodeIndex,
    /// Position the mobj was inserted into the blockmap at.
    pub blockmap_pos: Option<DVec2>,
    pub lines_linked: bool,
}

/// A simulated moving object.
#[derive(Clone, Debug)]
pub struct Mobj {
    pub origin: DVec3,
    pub radius: f64,
    pub height: f64,
    /// Sector containing the origin as of the last link.
    pub sector: Option<SectorId>,
    pub(crate) links: MobjLinks,
}

impl Mobj {
    pub(crate) fn new(spawn: MobjSpawn, line_root: NodeIndex) -> Self {
        Self {
            origin: spawn.origin,
            radius: spawn.radius,
            height: spawn.height,
            sector: None,
            links: MobjLinks {
                ring_sector: None,
                s_prev: None,
                s_next: None,
                line_root,
                blockmap_pos: None,
                lines_linked: false,
            },
        }
    }

    /// Origin projected onto the map plane.
    #[inline]
    pub fn position(&self) -> DVec2 {
        self.origin.truncate()
    }

    /// Axis-aligned box of origin ± radius.
    #[inline]
    pub fn bounds(&self) -> Aabb2 {
        Aabb2::from_center(self.position(), self.radius)
    }

    /// Height of the top of the mobj.
    #[inline]
    pub fn top(&self) -> f64 {
        self.origin.z + self.height
    }
}

#[derive(Clone, Debug)]
struct Slot {
    generation: u32,
    mobj: Option<Mobj>,
}

/// Generational arena of mobjs with slot reuse.
#[derive(Clone, Debug, Default)]
pub(crate) struct MobjArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl MobjArena {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            free: Vec::new(),
            live: 0,
        }
    }

    pub fn insert(&mut self, mobj: Mobj) -> MobjId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.mobj = Some(mobj);
            return MobjId {
                index,
                generation: slot.generation,
            };
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            mobj: Some(mobj),
        });
        MobjId {
            index,
            generation: 0,
        }
    }

    pub fn remove(&mut self, id: MobjId) -> Option<Mobj> {
        let slot = self.slots.get_mut(id.index())?;
        if slot.generation != id.generation {
            return None;
        }
        let mobj = slot.mobj.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(mobj)
    }

    #[inline]
    pub fn get(&self, id: MobjId) -> Option<&Mobj> {
        self.slots
            .get(id.index())
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.mobj.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, id: MobjId) -> Option<&mut Mobj> {
        self.slots
            .get_mut(id.index())
            .filter(|s| s.generation == id.generation)
            .and_then(|s| s.mobj.as_mut())
    }

    pub const fn len(&self) -> usize {
        self.live
    }

    pub fn iter(&self) -> impl Iterator<Item = (MobjId, &Mobj)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.mobj.as_ref().map(|mobj| {
                (
                    MobjId {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    mobj,
                )
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spawn() -> Mobj {
        Mobj::new(MobjSpawn::new(DVec3::ZERO, 16.0, 56.0), NodeIndex(0))
    }

    #[test]
    fn stale_ids_are_rejected() {
        let mut arena = MobjArena::default();
        let a = arena.insert(spawn());
        assert!(arena.remove(a).is_some());
        let b = arena.insert(spawn());
        assert_eq!(a.index(), b.index());
        assert_ne!(a, b);
        assert!(arena.get(a).is_none());
        assert!(arena.get(b).is_some());
        assert!(arena.remove(a).is_none());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn bounds_follow_radius() {
        let mut mobj = spawn();
        mobj.origin = DVec3::new(100.0, 50.0, 0.0);
        let b = mobj.bounds();
        assert_eq!(b.min, DVec2::new(84.0, 34.0));
        assert_eq!(b.max, DVec2::new(116.0, 66.0));
        assert_eq!(mobj.top(), 56.0);
    }
}
