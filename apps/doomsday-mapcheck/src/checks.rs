//! The individual check stages.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context};
use doomsday_gl::{DeferredConfig, DeferredGl, PixelFormat, TextureContent};
use doomsday_test::{room_grid, RecordingDriver};
use doomsday_world::{
    check_sight, BspBuilder, BspConfig, BspTree, LinkFlags, LinkageConfig, Map, MobjSpawn,
    ValidCount, WorldLinkage,
};
use glam::{DVec2, DVec3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

const MOBJ_RADIUS: f64 = 20.0;
const MOBJ_HEIGHT: f64 = 56.0;
const EYE_HEIGHT: f64 = 41.0;
const MOVE_SPEED: f64 = 8.0;

/// Check parameters (from CLI or defaults).
#[derive(Debug, Clone)]
pub struct CheckParams {
    pub rooms: usize,
    pub split_cost_factor: i32,
    pub mobjs: usize,
    pub ticks: usize,
    pub tasks: usize,
    pub budget: Duration,
}

impl Default for CheckParams {
    fn default() -> Self {
        Self {
            rooms: 8,
            split_cost_factor: 7,
            mobjs: 500,
            ticks: 35,
            tasks: 256,
            budget: Duration::from_millis(2),
        }
    }
}

impl CheckParams {
    /// Parse parameters from command line arguments.
    pub fn from_args() -> Self {
        let mut params = Self::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            let value = args.get(i + 1).and_then(|v| v.parse::<u64>().ok());
            let mut consumed = true;
            match (args[i].as_str(), value) {
                ("--rooms", Some(v)) => params.rooms = (v as usize).max(1),
                ("--factor", Some(v)) => params.split_cost_factor = v as i32,
                ("--mobjs", Some(v)) => params.mobjs = v as usize,
                ("--ticks", Some(v)) => params.ticks = v as usize,
                ("--tasks", Some(v)) => params.tasks = v as usize,
                ("--budget-ms", Some(v)) => params.budget = Duration::from_millis(v),
                (arg, _) => {
                    if arg.starts_with('-') {
                        warn!(arg, "Ignoring unknown or incomplete option");
                    }
                    consumed = false;
                }
            }
            i += if consumed { 2 } else { 1 };
        }

        params
    }
}

/// A partitioned map.
pub struct World {
    pub map: Map,
    pub tree: BspTree,
}

impl World {
    fn size(&self) -> f64 {
        self.map.bounds().width()
    }
}

pub fn build_world(params: &CheckParams) -> anyhow::Result<World> {
    let map = room_grid(params.rooms);
    let builder =
        BspBuilder::new(BspConfig::default().with_split_cost_factor(params.split_cost_factor));
    let out = builder.build(&map).context("BSP build failed")?;
    info!(
        lines = map.line_count(),
        sectors = map.sector_count(),
        depth = out.tree.depth(),
        split_vertices = out.vertices.len() - map.vertices().len(),
        "Map partitioned"
    );
    Ok(World {
        map,
        tree: out.tree,
    })
}

/// Deterministic scatter in `[0, 1)`.
fn scatter(i: usize, salt: f64) -> f64 {
    ((i as f64 + 1.0) * (0.618_033_988_749_895 + salt)).fract()
}

/// Spawn the crowd, walk it for the configured tics and return where
/// everyone ended up.
pub fn run_linkage(world: &World, params: &CheckParams) -> anyhow::Result<Vec<DVec3>> {
    let size = world.size();
    let lo = MOBJ_RADIUS + 1.0;
    let hi = size - MOBJ_RADIUS - 1.0;
    let config = LinkageConfig::default().with_expected_mobjs(params.mobjs);
    let mut linkage = WorldLinkage::new(&world.map, config).context("Linkage setup failed")?;

    let mut crowd = Vec::with_capacity(params.mobjs);
    for i in 0..params.mobjs {
        let origin = DVec3::new(
            lo + scatter(i, 0.0) * (hi - lo),
            lo + scatter(i, 0.1) * (hi - lo),
            0.0,
        );
        let angle = scatter(i, 0.2) * std::f64::consts::TAU;
        let velocity = DVec2::from_angle(angle) * MOVE_SPEED;
        let id = linkage.spawn(MobjSpawn::new(origin, MOBJ_RADIUS, MOBJ_HEIGHT));
        linkage.link(
            &world.map,
            &world.tree,
            id,
            LinkFlags::SECTOR | LinkFlags::BLOCKMAP,
        )?;
        crowd.push((id, velocity));
    }

    let started = Instant::now();
    for tic in 0..params.ticks {
        for (id, velocity) in &mut crowd {
            let (position, z) = linkage
                .mobj(*id)
                .map(|m| (m.position(), m.origin.z))
                .ok_or_else(|| anyhow!("mobj {id} vanished"))?;
            let mut next = position + *velocity;
            // Bounce off the outer walls.
            if !(lo..=hi).contains(&next.x) {
                velocity.x = -velocity.x;
                next.x = next.x.clamp(lo, hi);
            }
            if !(lo..=hi).contains(&next.y) {
                velocity.y = -velocity.y;
                next.y = next.y.clamp(lo, hi);
            }
            linkage.set_origin(*id, next.extend(z))?;
            linkage.relink(&world.map, &world.tree, *id)?;
        }
        if tic % 10 == 0 {
            let line_links: usize = crowd
                .iter()
                .map(|(id, _)| linkage.mobj_line_count(*id))
                .sum();
            debug!(tic, line_links, "Tic simulated");
        }
    }

    let elapsed = started.elapsed();
    let crossing = crowd
        .iter()
        .filter(|(id, _)| linkage.mobj_line_count(*id) > 0)
        .count();
    info!(
        mobjs = linkage.mobj_count(),
        ticks = params.ticks,
        crossing,
        us_per_tic = elapsed.as_micros() as u64 / params.ticks.max(1) as u64,
        "Linkage simulated"
    );

    crowd
        .iter()
        .map(|(id, _)| {
            linkage
                .mobj(*id)
                .map(|m| m.origin)
                .ok_or_else(|| anyhow!("mobj {id} vanished"))
        })
        .collect()
}

/// Trace a sight line from every mobj to another one, in parallel.
pub fn run_sight(world: &World, positions: &[DVec3]) {
    if positions.is_empty() {
        return;
    }
    let pairs: Vec<(DVec3, DVec3)> = (0..positions.len())
        .map(|i| (positions[i], positions[(i * 7 + 3) % positions.len()]))
        .collect();

    let started = Instant::now();
    let line_count = world.map.line_count();
    let visible = pairs
        .par_iter()
        .map_init(
            || ValidCount::new(line_count),
            |valid, &(from, to)| {
                check_sight(
                    &world.map,
                    &world.tree,
                    valid,
                    from + DVec3::Z * EYE_HEIGHT,
                    to,
                    MOBJ_HEIGHT,
                )
            },
        )
        .filter(|&seen| seen)
        .count();

    info!(
        traces = pairs.len(),
        visible,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "Sight lines traced"
    );
}

/// Feed texture uploads from a worker thread while this thread drains the
/// queue frame by frame.
pub fn run_deferred_gl(params: &CheckParams) -> anyhow::Result<()> {
    let gl = DeferredGl::new(DeferredConfig::default());
    gl.init()?;
    let mut driver = RecordingDriver::new();
    let worker_done = AtomicBool::new(false);
    let tasks = params.tasks;

    let mut frames = 0usize;
    let started = Instant::now();
    let taken = crossbeam::scope(|s| {
        let (gl, worker_done) = (&gl, &worker_done);
        let worker = s.spawn(move |_| {
            let result = (|| -> doomsday_gl::Result<usize> {
                for i in 0..tasks {
                    let name = gl.take_reserved_name()?;
                    let texel = [i as u32; 4];
                    let content =
                        TextureContent::from_pixels(name, PixelFormat::Rgba, 2, 2, &texel[..])
                            .with_mipmaps(i % 2 == 0);
                    gl.enqueue_texture_upload(&content)?;
                }
                Ok(tasks)
            })();
            worker_done.store(true, Ordering::Release);
            result
        });

        loop {
            gl.drain(&mut driver, params.budget)?;
            frames += 1;
            if worker_done.load(Ordering::Acquire) && gl.pending_count() == 0 {
                break;
            }
            std::thread::yield_now();
        }

        worker
            .join()
            .map_err(|_| anyhow!("GL worker panicked"))?
            .map_err(anyhow::Error::from)
    })
    .map_err(|_| anyhow!("GL worker scope panicked"))??;

    gl.shutdown(&mut driver)?;
    info!(
        uploads = driver.uploads().len(),
        names_taken = taken,
        names_generated = driver.generated_count(),
        frames,
        elapsed_ms = started.elapsed().as_secs_f64() * 1000.0,
        "Deferred GL queue drained"
    );
    Ok(())
}
