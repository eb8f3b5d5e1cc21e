//! Bubble Orbit - headless driver
//!
//! Builds a small lattice around the core, fires seeded projectiles at it
//! while the group turns, and logs what the effect seam receives.
//!
//! Usage: `bubble-orbit [settings.json] [seed]`

use bubble_orbit::consts::{MAX_SUBSTEPS, SIM_DT};
use bubble_orbit::sim::{
    BubbleColor, CellCoord, Effect, LatticeGeometry, LatticeGroup, TickInput, tick,
};
use bubble_orbit::{GameSettings, cartesian_to_polar, polar_to_cartesian};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg32;

/// Frame time of the simulated host (deliberately not a multiple of SIM_DT)
const FRAME_DT: f32 = 1.0 / 50.0;
/// Seconds between projectiles
const SPAWN_INTERVAL: f32 = 0.5;
/// Projectile launch speed
const SHOT_SPEED: f32 = 6.0;
/// Colors in play
const COLOR_COUNT: usize = 4;
/// Lattice turn rate in radians per second
const TURN_RATE: f32 = 0.35;
/// How long to run
const RUN_SECONDS: f32 = 30.0;

struct Demo {
    group: LatticeGroup,
    rng: Pcg32,
    input: TickInput,
    accumulator: f32,
    spawn_timer: f32,
    elapsed: f32,
    shots: u32,
    missed: usize,
    best_combo: usize,
}

impl Demo {
    fn new(settings: GameSettings, seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let mut group = LatticeGroup::new(settings);
        if let Err(e) = group.seed_core() {
            log::error!("Failed to place core: {e}");
        }

        // Two rings of random colors around the core
        let mut ring = group.geometry().adjacent_cells(CellCoord::new(0, 0));
        let outer: Vec<CellCoord> = ring
            .iter()
            .flat_map(|cell| group.geometry().adjacent_cells(*cell))
            .collect();
        ring.extend(outer);
        for cell in ring {
            if group.index().is_occupied(cell) {
                continue;
            }
            let color = BubbleColor::random(&mut rng, COLOR_COUNT);
            if let Err(e) = group.seed_bubble(cell, color) {
                log::warn!("Skipping seed cell {cell}: {e}");
            }
        }
        log::info!(
            "Seeded {} bubbles, radius {:.2}",
            group.attached_count(),
            group.radius()
        );

        Self {
            group,
            rng,
            input: TickInput::default(),
            accumulator: 0.0,
            spawn_timer: 0.0,
            elapsed: 0.0,
            shots: 0,
            missed: 0,
            best_combo: 0,
        }
    }

    /// Fire a projectile from just outside the lattice toward the pivot
    fn spawn_projectile(&mut self) {
        let center = self.group.transform().center;
        let distance = self.group.radius() + 4.0;
        let theta = self.rng.random_range(-std::f32::consts::PI..std::f32::consts::PI);
        let pos = center + polar_to_cartesian(distance, theta);
        let aim = (center - pos).normalize_or_zero();
        let color = BubbleColor::random(&mut self.rng, COLOR_COUNT);
        let id = self.group.spawn_free_bubble(pos, color, aim * SHOT_SPEED);
        self.shots += 1;
        log::debug!("Shot {} ({id}) from angle {theta:.2}", self.shots);
    }

    /// Run simulation ticks for one host frame
    fn update(&mut self, dt: f32) {
        let dt = dt.min(0.1);
        self.accumulator += dt;
        self.elapsed += dt;

        self.spawn_timer += dt;
        if self.spawn_timer >= SPAWN_INTERVAL {
            self.spawn_timer -= SPAWN_INTERVAL;
            self.spawn_projectile();
        }

        self.input.target_rotation = Some(self.elapsed * TURN_RATE);

        let mut substeps = 0;
        while self.accumulator >= SIM_DT && substeps < MAX_SUBSTEPS {
            let report = tick(&mut self.group, &self.input, SIM_DT);
            self.accumulator -= SIM_DT;
            substeps += 1;

            self.missed += report.despawned.len();
            for outcome in &report.matches {
                self.best_combo = self.best_combo.max(outcome.combo);
            }
        }

        self.drain_effects();
    }

    /// Stand-in for a presentation layer
    fn drain_effects(&mut self) {
        for effect in self.group.services.effects.drain() {
            match effect {
                Effect::Match { centroid, combo } => {
                    let (r, theta) = cartesian_to_polar(centroid - self.group.transform().center);
                    log::info!("Match! combo {combo} at r={r:.2} theta={theta:.2}");
                }
                Effect::Stick { position, magnitude } => {
                    log::debug!("Stick at {position} (force {magnitude:.2})");
                }
                Effect::CameraImpulse { velocity } => {
                    log::debug!("Camera impulse {velocity}");
                }
            }
        }
    }
}

fn main() {
    env_logger::init();
    log::info!("Bubble Orbit (headless) starting...");

    let mut args = std::env::args().skip(1);
    let settings = match args.next() {
        Some(path) => GameSettings::load_or_default(path),
        None => GameSettings::default(),
    };
    let seed = args
        .next()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(12345);
    log::info!("Seed: {seed}");

    let mut demo = Demo::new(settings, seed);
    let frames = (RUN_SECONDS / FRAME_DT) as u32;
    for _ in 0..frames {
        demo.update(FRAME_DT);
    }

    log::info!(
        "Done after {:.1}s ({} ticks): {} shots ({} missed), {} attached, best combo {}, {} pooled instances released",
        demo.group.time(),
        demo.group.time_ticks(),
        demo.shots,
        demo.missed,
        demo.group.attached_count(),
        demo.best_combo,
        demo.group.services.pool.released(),
    );
    if !demo.group.lattice_consistent() {
        log::error!("Lattice index out of sync with attached bubbles");
    }
}
