//! Sector rings, line rings and coarse-grid membership of mobjs.

use doomsday_core::{BoxSide, LineId, SectorId};
use glam::DVec3;
use tracing::trace;

use super::blockmap::{LineBlockmap, MobjBlockmap, MobjGrid};
use super::mobj::{Mobj, MobjArena, MobjId, MobjSpawn};
use super::node_pile::{NodeIndex, NodePile};
use super::{LinkFlags, LinkState, LinkageConfig};
use crate::bsp::SectorLocator;
use crate::error::{Result, WorldError};
use crate::map::Map;
use crate::valid_count::ValidCount;

/// Node in a mobj's line ring.
#[derive(Clone, Copy, Debug)]
struct LineLink {
    line: LineId,
    /// Matching node in the line's mobj ring.
    partner: NodeIndex,
}

/// Node in a line's mobj ring.
#[derive(Clone, Copy, Debug)]
struct MobjLink {
    mobj: MobjId,
}

/// Owns every mobj of a map and its memberships.
///
/// Iteration functions copy the members they will visit into a scratch
/// buffer before calling back, so callbacks may freely link, unlink or
/// despawn. The callback gets the linkage back as its first argument and
/// returns false to stop; the iteration then returns `Ok(false)`.
pub struct WorldLinkage<B: MobjBlockmap = MobjGrid> {
    config: LinkageConfig,
    mobjs: MobjArena,
    sector_heads: Vec<Option<MobjId>>,
    /// Sectors on each side of every line, front first.
    line_sectors: Vec<[Option<SectorId>; 2]>,
    sector_lines: Vec<Vec<LineId>>,
    mobj_nodes: NodePile<LineLink>,
    line_nodes: NodePile<MobjLink>,
    line_roots: Vec<NodeIndex>,
    line_grid: LineBlockmap,
    blockmap: B,
    line_scan: ValidCount,
    visited: ValidCount,
    scratch_mobjs: Vec<MobjId>,
    scratch_lines: Vec<LineId>,
    scratch_sectors: Vec<SectorId>,
}

impl WorldLinkage<MobjGrid> {
    /// Linkage for `map` using the default sparse mobj grid.
    ///
    /// Fails if the configured cell size is unusable.
    pub fn new(map: &Map, config: LinkageConfig) -> Result<Self> {
        let origin = if map.bounds().is_empty() {
            glam::DVec2::ZERO
        } else {
            map.bounds().min
        };
        let grid = MobjGrid::new(origin, config.blockmap_cell_size)?;
        Self::with_blockmap(map, config, grid)
    }
}

impl<B: MobjBlockmap> WorldLinkage<B> {
    /// Linkage for `map` using a caller-supplied coarse grid.
    pub fn with_blockmap(map: &Map, config: LinkageConfig, blockmap: B) -> Result<Self> {
        let mut line_nodes = NodePile::with_capacity(map.line_count() + config.expected_mobjs);
        let line_roots = (0..map.line_count()).map(|_| line_nodes.new_root()).collect();
        let line_sectors = map.lines().iter().map(|l| [l.front, l.back]).collect();
        let sector_lines = (0..map.sector_count())
            .map(|s| map.sector_lines(SectorId::from(s)).to_vec())
            .collect();

        let line_grid = LineBlockmap::build(map, config.blockmap_cell_size)?;
        Ok(Self {
            mobjs: MobjArena::with_capacity(config.expected_mobjs),
            sector_heads: vec![None; map.sector_count()],
            line_sectors,
            sector_lines,
            mobj_nodes: NodePile::with_capacity(config.expected_mobjs * 2),
            line_nodes,
            line_roots,
            line_grid,
            blockmap,
            line_scan: ValidCount::new(map.line_count()),
            visited: ValidCount::new(config.expected_mobjs.max(map.sector_count())),
            scratch_mobjs: Vec::new(),
            scratch_lines: Vec::new(),
            scratch_sectors: Vec::new(),
            config,
        })
    }

    pub const fn config(&self) -> &LinkageConfig {
        &self.config
    }

    pub const fn blockmap(&self) -> &B {
        &self.blockmap
    }

    pub fn blockmap_mut(&mut self) -> &mut B {
        &mut self.blockmap
    }

    /// Create an unlinked mobj.
    pub fn spawn(&mut self, spawn: MobjSpawn) -> MobjId {
        let root = self.mobj_nodes.new_root();
        self.mobjs.insert(Mobj::new(spawn, root))
    }

    /// Unlink and destroy a mobj. Returns what `unlink` reported.
    pub fn despawn(&mut self, id: MobjId) -> Result<LinkFlags> {
        let flags = self.unlink(id)?;
        if let Some(mobj) = self.mobjs.remove(id) {
            self.mobj_nodes.dismiss(mobj.links.line_root);
        }
        Ok(flags)
    }

    pub fn mobj(&self, id: MobjId) -> Option<&Mobj> {
        self.mobjs.get(id)
    }

    fn mobj_ref(&self, id: MobjId) -> Result<&Mobj> {
        self.mobjs
            .get(id)
            .ok_or_else(|| WorldError::UnknownMobj(id.to_string()))
    }

    fn mobj_mut(&mut self, id: MobjId) -> Result<&mut Mobj> {
        self.mobjs
            .get_mut(id)
            .ok_or_else(|| WorldError::UnknownMobj(id.to_string()))
    }

    /// All live mobjs.
    pub fn mobjs(&self) -> impl Iterator<Item = (MobjId, &Mobj)> {
        self.mobjs.iter()
    }

    pub const fn mobj_count(&self) -> usize {
        self.mobjs.len()
    }

    /// Move a mobj without touching its links.
    pub fn set_origin(&mut self, id: MobjId, origin: DVec3) -> Result<()> {
        self.mobj_mut(id)?.origin = origin;
        Ok(())
    }

    /// Link a mobj at its current origin.
    ///
    /// The mobj's sector is always refreshed from `locator`. `SECTOR` and
    /// `BLOCKMAP` rebuild those memberships; line rings are rebuilt unless
    /// `NO_LINE` is given.
    #[cfg_attr(feature = "profiling-tracy", tracing::instrument(level = "trace", skip_all))]
    pub fn link(
        &mut self,
        map: &Map,
        locator: &impl SectorLocator,
        id: MobjId,
        flags: LinkFlags,
    ) -> Result<()> {
        let position = self.mobj_ref(id)?.position();
        let sector = locator.sector_at(position);
        if let Some(s) = sector {
            if s.index() >= self.sector_heads.len() {
                return Err(WorldError::UnknownSector(s));
            }
        }
        self.mobj_mut(id)?.sector = sector;

        if flags.contains(LinkFlags::SECTOR) {
            self.unlink_sector(id);
            if let Some(s) = sector {
                self.link_sector(id, s);
            }
        }

        if flags.contains(LinkFlags::BLOCKMAP) {
            self.unlink_blockmap(id);
            self.blockmap.insert(id, position);
            self.mobj_mut(id)?.links.blockmap_pos = Some(position);
        }

        if !flags.contains(LinkFlags::NO_LINE) {
            self.unlink_lines(id);
            self.link_lines(map, id);
        }
        Ok(())
    }

    /// Remove every membership, reporting which ones existed.
    ///
    /// `SECTOR` and `BLOCKMAP` are set for memberships that were removed;
    /// `NO_LINE` is set if the mobj had not been linked to lines.
    pub fn unlink(&mut self, id: MobjId) -> Result<LinkFlags> {
        self.mobj_ref(id)?;
        let mut flags = LinkFlags::empty();
        if self.unlink_sector(id) {
            flags |= LinkFlags::SECTOR;
        }
        if self.unlink_blockmap(id) {
            flags |= LinkFlags::BLOCKMAP;
        }
        if !self.unlink_lines(id) {
            flags |= LinkFlags::NO_LINE;
        }
        Ok(flags)
    }

    /// Unlink then link with every membership.
    pub fn relink(&mut self, map: &Map, locator: &impl SectorLocator, id: MobjId) -> Result<()> {
        self.unlink(id)?;
        self.link(map, locator, id, LinkFlags::SECTOR | LinkFlags::BLOCKMAP)
    }

    /// Current linkage state of a mobj.
    pub fn link_state(&self, id: MobjId) -> Result<LinkState> {
        let links = &self.mobj_ref(id)?.links;
        let sector = links.ring_sector.is_some();
        let blockmap = links.blockmap_pos.is_some();
        let lines = links.lines_linked;

        Ok(match (sector, blockmap, lines) {
            (false, false, false) => LinkState::Unlinked,
            (true, false, false) => LinkState::SectorOnly,
            (true, false, true) => LinkState::SectorAndLines,
            (true, true, true) => LinkState::SectorBlockmapLines,
            _ => {
                let mut flags = LinkFlags::empty();
                flags.set(LinkFlags::SECTOR, sector);
                flags.set(LinkFlags::BLOCKMAP, blockmap);
                flags.set(LinkFlags::NO_LINE, !lines);
                LinkState::Partial(flags)
            }
        })
    }

    fn link_sector(&mut self, id: MobjId, sector: SectorId) {
        let head = self.sector_heads[sector.index()];
        if let Some(next) = head {
            if let Some(n) = self.mobjs.get_mut(next) {
                n.links.s_prev = Some(id);
            }
        }
        if let Some(mobj) = self.mobjs.get_mut(id) {
            mobj.links.s_prev = None;
            mobj.links.s_next = head;
            mobj.links.ring_sector = Some(sector);
        }
        self.sector_heads[sector.index()] = Some(id);
    }

    fn unlink_sector(&mut self, id: MobjId) -> bool {
        let Some(mobj) = self.mobjs.get_mut(id) else {
            return false;
        };
        let Some(sector) = mobj.links.ring_sector.take() else {
            return false;
        };
        let prev = mobj.links.s_prev.take();
        let next = mobj.links.s_next.take();

        match prev {
            Some(p) => {
                if let Some(p) = self.mobjs.get_mut(p) {
                    p.links.s_next = next;
                }
            }
            None => self.sector_heads[sector.index()] = next,
        }
        if let Some(n) = next.and_then(|n| self.mobjs.get_mut(n)) {
            n.links.s_prev = prev;
        }
        true
    }

    fn unlink_blockmap(&mut self, id: MobjId) -> bool {
        let Some(position) = self.mobjs.get_mut(id).and_then(|m| m.links.blockmap_pos.take()) else {
            return false;
        };
        self.blockmap.remove(id, position)
    }

    fn link_lines(&mut self, map: &Map, id: MobjId) {
        let Some(mobj) = self.mobjs.get(id) else {
            return;
        };
        let bounds = mobj.bounds();
        let root = mobj.links.line_root;
        let known_lines = self.line_roots.len();

        let mut targets = std::mem::take(&mut self.scratch_lines);
        targets.clear();
        self.line_grid
            .for_each_line_in_box(bounds, &mut self.line_scan, |line| {
                if line.index() < known_lines
                    && map.line(line).is_two_sided()
                    && map.line_bounds(line).overlaps(&bounds)
                    && map.line_div(line).box_on_side(&bounds) == BoxSide::Crossing
                {
                    targets.push(line);
                }
                true
            });

        for &line in &targets {
            let line_node = self.line_nodes.new_node(MobjLink { mobj: id });
            let mobj_node = self.mobj_nodes.new_node(LineLink {
                line,
                partner: line_node,
            });
            self.mobj_nodes.link(mobj_node, root);
            self.line_nodes.link(line_node, self.line_roots[line.index()]);
        }
        trace!(mobj = %id, lines = targets.len(), "Linked to lines");

        self.scratch_lines = targets;
        if let Some(mobj) = self.mobjs.get_mut(id) {
            mobj.links.lines_linked = true;
        }
    }

    /// Drop every line membership. Returns false if there were none to drop.
    fn unlink_lines(&mut self, id: MobjId) -> bool {
        let Some(mobj) = self.mobjs.get_mut(id) else {
            return false;
        };
        if !std::mem::take(&mut mobj.links.lines_linked) {
            return false;
        }
        let root = mobj.links.line_root;

        loop {
            let node = self.mobj_nodes.next(root);
            if node == root {
                break;
            }
            if let Some(link) = self.mobj_nodes.data(node) {
                self.line_nodes.unlink(link.partner);
                self.line_nodes.dismiss(link.partner);
            }
            self.mobj_nodes.unlink(node);
            self.mobj_nodes.dismiss(node);
        }
        true
    }

    /// Number of lines a mobj is linked to.
    pub fn mobj_line_count(&self, id: MobjId) -> usize {
        self.mobjs
            .get(id)
            .map_or(0, |m| self.mobj_nodes.ring_len(m.links.line_root))
    }

    /// Number of mobjs linked to a line.
    pub fn line_mobj_count(&self, line: LineId) -> usize {
        self.line_roots
            .get(line.index())
            .map_or(0, |&root| self.line_nodes.ring_len(root))
    }

    /// Visit the lines a mobj is linked to.
    pub fn lines_touching(
        &mut self,
        id: MobjId,
        mut f: impl FnMut(&mut Self, LineId) -> bool,
    ) -> Result<bool> {
        let root = self.mobj_ref(id)?.links.line_root;
        let mut snapshot = std::mem::take(&mut self.scratch_lines);
        snapshot.clear();
        snapshot.extend(self.mobj_nodes.ring(root).map(|(_, link)| link.line));

        let completed = snapshot.iter().all(|&line| f(self, line));
        self.scratch_lines = snapshot;
        Ok(completed)
    }

    /// Visit the sector a mobj is in, then the sectors on both sides of each
    /// line it is linked to, each once.
    pub fn sectors_touching(
        &mut self,
        id: MobjId,
        mut f: impl FnMut(&mut Self, SectorId) -> bool,
    ) -> Result<bool> {
        let mobj = self.mobj_ref(id)?;
        let own = mobj.links.ring_sector;
        let root = mobj.links.line_root;

        let mut snapshot = std::mem::take(&mut self.scratch_sectors);
        snapshot.clear();
        self.visited.begin();
        if let Some(sector) = own {
            if self.visited.mark(sector.index()) {
                snapshot.push(sector);
            }
        }
        for (_, link) in self.mobj_nodes.ring(root) {
            for sector in self.line_sectors[link.line.index()].into_iter().flatten() {
                if self.visited.mark(sector.index()) {
                    snapshot.push(sector);
                }
            }
        }

        let completed = snapshot.iter().all(|&sector| f(self, sector));
        self.scratch_sectors = snapshot;
        Ok(completed)
    }

    /// Visit the mobjs linked to a line.
    pub fn mobjs_touching_line(
        &mut self,
        line: LineId,
        mut f: impl FnMut(&mut Self, MobjId) -> bool,
    ) -> Result<bool> {
        let root = *self
            .line_roots
            .get(line.index())
            .ok_or(WorldError::UnknownLine(line))?;
        let mut snapshot = std::mem::take(&mut self.scratch_mobjs);
        snapshot.clear();
        snapshot.extend(self.line_nodes.ring(root).map(|(_, link)| link.mobj));

        let completed = self.visit_mobjs(&snapshot, &mut f);
        self.scratch_mobjs = snapshot;
        Ok(completed)
    }

    /// Visit the mobjs in a sector's ring, then those linked to the
    /// sector's lines, each once.
    pub fn mobjs_touching_sector(
        &mut self,
        sector: SectorId,
        mut f: impl FnMut(&mut Self, MobjId) -> bool,
    ) -> Result<bool> {
        let head = *self
            .sector_heads
            .get(sector.index())
            .ok_or(WorldError::UnknownSector(sector))?;

        let mut snapshot = std::mem::take(&mut self.scratch_mobjs);
        snapshot.clear();
        self.visited.begin();

        let mut at = head;
        while let Some(id) = at {
            if self.visited.mark(id.index()) {
                snapshot.push(id);
            }
            at = self.mobjs.get(id).and_then(|m| m.links.s_next);
        }
        for &line in &self.sector_lines[sector.index()] {
            for (_, link) in self.line_nodes.ring(self.line_roots[line.index()]) {
                if self.visited.mark(link.mobj.index()) {
                    snapshot.push(link.mobj);
                }
            }
        }

        let completed = self.visit_mobjs(&snapshot, &mut f);
        self.scratch_mobjs = snapshot;
        Ok(completed)
    }

    /// Call back for each snapshotted mobj still alive.
    fn visit_mobjs(
        &mut self,
        snapshot: &[MobjId],
        f: &mut impl FnMut(&mut Self, MobjId) -> bool,
    ) -> bool {
        for &id in snapshot {
            if self.mobjs.get(id).is_none() {
                continue;
            }
            if !f(self, id) {
                return false;
            }
        }
        true
    }
}
