//! The bounded, time-evolving particle field.
//!
//! A [`ParticleField`] owns every live particle of one surface. The render
//! loop drives it: `tick` on the spawn cadence, `snapshot` + `advance` on the
//! frame cadence. Pointer presses call `hit_test`, which removes at most one
//! particle.
//!
//! ## Capacity
//!
//! `len() <= capacity()` holds at every observation point. Lowering the
//! capacity below the current count never truncates; spawning simply stops
//! until particles expire.
//!
//! ## Hit testing
//!
//! The linear scan is the reference behavior. With many particles the field
//! builds a [`SpatialIndex`] over the hit boxes and only checks the
//! candidates it returns; the winning particle is always the first one in
//! field order, so both paths remove the same particle.

use ciallo_common::{ParticleId, Rect};
use tracing::{debug, trace, warn};

use crate::content::ContentSource;
use crate::particle::{Particle, ParticleView};
use crate::quadtree::{IndexStats, SpatialIndex, DEFAULT_NODE_CAPACITY};
use crate::surface::TextMeasure;

/// Default field capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default particles spawned per tick.
pub const DEFAULT_SPAWN_BATCH: usize = 10;

/// Free slots below which new particles get [`SPEED_PENALTY`].
pub const LOW_WATER_MARK: usize = 40;

/// Extra speed for particles spawned while the field is nearly full.
pub const SPEED_PENALTY: u32 = 4;

/// Particle count from which `HitStrategy::Auto` uses the spatial index.
pub const DEFAULT_INDEX_THRESHOLD: usize = 64;

/// Slack around the probe point when querying the index.
const PROBE_SLACK: f32 = 1.0;

/// How pointer hits are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitStrategy {
    /// Always scan every particle.
    Linear,
    /// Always query the spatial index.
    Indexed,
    /// Use the index once the field holds at least `threshold` particles.
    Auto {
        /// Particle count at which the index takes over.
        threshold: usize,
    },
}

impl Default for HitStrategy {
    fn default() -> Self {
        Self::Auto {
            threshold: DEFAULT_INDEX_THRESHOLD,
        }
    }
}

/// Spatial index over the current particle order.
struct HitIndex {
    tree: SpatialIndex<usize>,
    /// Particles the tree refused (non-finite geometry).
    overflow: Vec<usize>,
}

/// Bounded collection of live particles.
pub struct ParticleField {
    particles: Vec<Particle>,
    capacity: usize,
    spawn_batch_size: usize,
    width: f32,
    height: f32,
    content: ContentSource,
    strategy: HitStrategy,
    /// Built lazily on hit tests, dropped whenever geometry changes.
    index: Option<HitIndex>,
}

impl ParticleField {
    /// Creates an empty field.
    ///
    /// Zero capacity or batch size fall back to the defaults.
    #[must_use]
    pub fn new(capacity: usize, spawn_batch_size: usize, width: f32, height: f32) -> Self {
        let mut field = Self {
            particles: Vec::new(),
            capacity: DEFAULT_CAPACITY,
            spawn_batch_size: DEFAULT_SPAWN_BATCH,
            width: 0.0,
            height: 0.0,
            content: ContentSource::new(),
            strategy: HitStrategy::default(),
            index: None,
        };
        field.configure(capacity, spawn_batch_size);
        field.resize(width, height);
        field
    }

    /// Replaces the content source (e.g. with a seeded one).
    #[must_use]
    pub fn with_content_source(mut self, content: ContentSource) -> Self {
        self.content = content;
        self
    }

    /// Sets the hit-test strategy.
    #[must_use]
    pub fn with_hit_strategy(mut self, strategy: HitStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Updates capacity and batch size.
    ///
    /// Zero values are ignored and the previous value kept. Existing
    /// particles are never discarded. Returns `false` if anything was
    /// rejected.
    pub fn configure(&mut self, capacity: usize, spawn_batch_size: usize) -> bool {
        let mut accepted = true;
        if capacity > 0 {
            self.capacity = capacity;
        } else {
            warn!("Ignoring non-positive capacity, keeping {}", self.capacity);
            accepted = false;
        }
        if spawn_batch_size > 0 {
            self.spawn_batch_size = spawn_batch_size;
        } else {
            warn!("Ignoring non-positive spawn batch size, keeping {}", self.spawn_batch_size);
            accepted = false;
        }
        debug!(
            capacity = self.capacity,
            batch = self.spawn_batch_size,
            live = self.particles.len(),
            "Field configured"
        );
        accepted
    }

    /// Updates the surface size used for future spawns.
    ///
    /// Existing particles are not repositioned. Negative or non-finite sizes
    /// are ignored.
    pub fn resize(&mut self, width: f32, height: f32) -> bool {
        if !(width.is_finite() && height.is_finite()) || width < 0.0 || height < 0.0 {
            warn!("Ignoring invalid surface size {width}x{height}");
            return false;
        }
        self.width = width;
        self.height = height;
        true
    }

    /// Maximum number of live particles.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Particles added per tick.
    #[must_use]
    pub const fn spawn_batch_size(&self) -> usize {
        self.spawn_batch_size
    }

    /// Surface size used for spawning.
    #[must_use]
    pub const fn surface_size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    /// Number of live particles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.particles.len()
    }

    /// Returns true if there are no live particles.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Live particles in spawn order.
    #[must_use]
    pub fn particles(&self) -> &[Particle] {
        &self.particles
    }

    /// Adds a pre-built particle, refusing it when the field is full.
    pub fn push(&mut self, particle: Particle) -> bool {
        if self.particles.len() >= self.capacity {
            return false;
        }
        self.particles.push(particle);
        self.index = None;
        true
    }

    /// Spawn tick.
    ///
    /// Retries measurement of any particle whose earlier measurement failed,
    /// then spawns up to one batch at the right edge without exceeding the
    /// capacity. Returns the number of particles spawned.
    pub fn tick(&mut self, measure: &dyn TextMeasure) -> usize {
        self.remeasure(measure);

        let mut spawned = 0;
        while spawned < self.spawn_batch_size && self.particles.len() < self.capacity {
            self.spawn_one(measure);
            spawned += 1;
        }

        if spawned > 0 {
            self.index = None;
            trace!(spawned, live = self.particles.len(), "Spawn tick");
        }
        spawned
    }

    fn spawn_one(&mut self, measure: &dyn TextMeasure) {
        let mut style = self.content.next_style();
        if self.capacity - self.particles.len() < LOW_WATER_MARK {
            style.speed += SPEED_PENALTY;
        }
        let y = self.content.next_unit() * self.height;
        let margin = self.content.next_margin();

        let mut particle = Particle::new(style, self.width, y).with_top_margin(margin);
        if let Err(e) = particle.measure(measure) {
            debug!("Deferring measurement of {}: {e}", particle.id());
        }
        self.particles.push(particle);
    }

    fn remeasure(&mut self, measure: &dyn TextMeasure) {
        for particle in self.particles.iter_mut().filter(|p| !p.is_measured()) {
            match particle.measure(measure) {
                Ok(true) => self.index = None,
                Ok(false) => {},
                Err(e) => trace!("Measurement of {} still failing: {e}", particle.id()),
            }
        }
    }

    /// Frame update: moves every particle, then drops the expired ones.
    ///
    /// Survivors keep their relative order.
    pub fn advance(&mut self) {
        for particle in &mut self.particles {
            particle.advance();
        }
        let before = self.particles.len();
        self.particles.retain(|p| !p.is_expired());
        self.index = None;

        let expired = before - self.particles.len();
        if expired > 0 {
            trace!(expired, live = self.particles.len(), "Particles expired");
        }
    }

    /// Copies the drawable state of every live particle.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ParticleView> {
        self.particles.iter().map(Particle::view).collect()
    }

    /// Removes the first particle hit by the pointer at `(px, py)`.
    ///
    /// At most one particle is removed per call.
    pub fn hit_test(&mut self, px: f32, py: f32) -> Option<ParticleId> {
        let use_index = match self.strategy {
            HitStrategy::Linear => false,
            HitStrategy::Indexed => true,
            HitStrategy::Auto { threshold } => self.particles.len() >= threshold,
        };
        if use_index {
            self.hit_test_indexed(px, py)
        } else {
            self.hit_test_linear(px, py)
        }
    }

    /// Hit test by scanning every particle.
    pub fn hit_test_linear(&mut self, px: f32, py: f32) -> Option<ParticleId> {
        let found = self.particles.iter().position(|p| p.is_hit(px, py))?;
        Some(self.remove_at(found))
    }

    /// Hit test through the spatial index.
    pub fn hit_test_indexed(&mut self, px: f32, py: f32) -> Option<ParticleId> {
        let found = self.find_indexed(px, py)?;
        Some(self.remove_at(found))
    }

    fn find_indexed(&mut self, px: f32, py: f32) -> Option<usize> {
        if self.index.is_none() {
            self.index = Some(self.build_index());
        }
        let index = self.index.as_ref()?;
        let probe = Rect::point(px, py).inflate(PROBE_SLACK);

        index
            .tree
            .query(probe)
            .into_iter()
            .chain(index.overflow.iter())
            .copied()
            .filter(|&i| self.particles[i].is_hit(px, py))
            .min()
    }

    fn build_index(&self) -> HitIndex {
        let boundary = self
            .particles
            .iter()
            .map(Particle::hit_rect)
            .filter(|r| r.x.is_finite() && r.y.is_finite())
            .reduce(|a, b| a.union(&b))
            .unwrap_or_default()
            .inflate(PROBE_SLACK);

        let mut tree = SpatialIndex::new(boundary, DEFAULT_NODE_CAPACITY);
        let mut overflow = Vec::new();
        for (i, particle) in self.particles.iter().enumerate() {
            if !tree.insert(particle.hit_rect(), i) {
                overflow.push(i);
            }
        }
        trace!(entries = self.particles.len(), overflow = overflow.len(), "Hit index rebuilt");
        HitIndex { tree, overflow }
    }

    fn remove_at(&mut self, index: usize) -> ParticleId {
        let particle = self.particles.remove(index);
        self.index = None;
        debug!(id = %particle.id(), live = self.particles.len(), "Particle hit");
        particle.id()
    }

    /// Statistics of the current spatial index, if one is built.
    #[must_use]
    pub fn index_stats(&self) -> Option<IndexStats> {
        self.index.as_ref().map(|index| index.tree.stats())
    }
}

impl std::fmt::Debug for ParticleField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParticleField")
            .field("live", &self.particles.len())
            .field("capacity", &self.capacity)
            .field("spawn_batch_size", &self.spawn_batch_size)
            .field("surface", &(self.width, self.height))
            .field("strategy", &self.strategy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ParticleStyle;
    use crate::particle::TextBounds;
    use crate::surface::TextMetrics;
    use ciallo_common::SurfaceError;
    use proptest::prelude::*;
    use std::cell::Cell;

    /// Measures every text as 60x20.
    struct FixedMeasure;

    impl TextMeasure for FixedMeasure {
        fn measure_text(&self, _: &str, _: &str, _: u32) -> Result<TextMetrics, SurfaceError> {
            Ok(TextMetrics {
                width: 60.0,
                ascent: 16.0,
                descent: 4.0,
            })
        }
    }

    /// Fails the first `failures` measurements.
    struct FlakyMeasure {
        failures: Cell<usize>,
    }

    impl TextMeasure for FlakyMeasure {
        fn measure_text(&self, t: &str, f: &str, s: u32) -> Result<TextMetrics, SurfaceError> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(SurfaceError::ContextLost);
            }
            FixedMeasure.measure_text(t, f, s)
        }
    }

    fn field(capacity: usize, batch: usize) -> ParticleField {
        ParticleField::new(capacity, batch, 800.0, 600.0).with_content_source(ContentSource::with_seed(1))
    }

    fn style(speed: u32) -> ParticleStyle {
        ParticleStyle {
            content: "Ciallo".into(),
            color: "#abcdef".into(),
            font: "Georgia, serif".into(),
            size: 16,
            speed,
        }
    }

    fn placed(x: f32, y: f32, w: f32, h: f32) -> Particle {
        Particle::new(style(1), x, y).with_bounds(TextBounds::new(w, h))
    }

    #[test]
    fn test_capacity_scenario() {
        let mut field = field(100, 10);
        assert_eq!(field.tick(&FixedMeasure), 10);
        assert_eq!(field.len(), 10);

        for _ in 0..9 {
            field.tick(&FixedMeasure);
        }
        assert_eq!(field.len(), 100);

        assert_eq!(field.tick(&FixedMeasure), 0);
        assert_eq!(field.len(), 100);
    }

    #[test]
    fn test_partial_batch_at_capacity() {
        let mut field = field(25, 10);
        assert_eq!(field.tick(&FixedMeasure), 10);
        assert_eq!(field.tick(&FixedMeasure), 10);
        assert_eq!(field.tick(&FixedMeasure), 5);
        assert_eq!(field.len(), 25);
    }

    #[test]
    fn test_spawn_placement() {
        let mut field = field(100, 50);
        field.tick(&FixedMeasure);
        for p in field.particles() {
            assert!((p.x() - 800.0).abs() < f32::EPSILON);
            assert!(p.y() >= 20.0);
            assert!(p.y() <= 600.0);
            assert!(p.is_measured());
        }
    }

    #[test]
    fn test_speed_penalty_near_capacity() {
        // Free slots start below the low-water mark
        let mut field = field(30, 30);
        field.tick(&FixedMeasure);
        assert!(field.particles().iter().all(|p| p.speed() > SPEED_PENALTY));

        // 100 free slots: the first 60 spawns are unpenalised
        let mut field = self::field(100, 60);
        field.tick(&FixedMeasure);
        assert!(field.particles().iter().all(|p| p.speed() <= 9));
    }

    #[test]
    fn test_configure_rejects_zero() {
        let mut field = field(100, 10);
        assert!(!field.configure(0, 5));
        assert_eq!(field.capacity(), 100);
        assert_eq!(field.spawn_batch_size(), 5);

        assert!(!field.configure(50, 0));
        assert_eq!(field.capacity(), 50);
        assert_eq!(field.spawn_batch_size(), 5);
    }

    #[test]
    fn test_shrinking_capacity_does_not_truncate() {
        let mut field = field(100, 50);
        field.tick(&FixedMeasure);
        assert_eq!(field.len(), 50);

        field.configure(20, 10);
        assert_eq!(field.len(), 50);
        assert_eq!(field.tick(&FixedMeasure), 0);
        assert_eq!(field.len(), 50);
    }

    #[test]
    fn test_resize_affects_future_spawns_only() {
        let mut field = field(100, 5);
        field.tick(&FixedMeasure);
        assert!(field.resize(300.0, 200.0));
        assert!(!field.resize(-1.0, 10.0));
        assert!(!field.resize(f32::NAN, 10.0));
        field.tick(&FixedMeasure);

        let xs: Vec<f32> = field.particles().iter().map(Particle::x).collect();
        assert!(xs[..5].iter().all(|&x| (x - 800.0).abs() < f32::EPSILON));
        assert!(xs[5..].iter().all(|&x| (x - 300.0).abs() < f32::EPSILON));
    }

    #[test]
    fn test_advance_expiry_scenario() {
        let mut field = field(10, 1);
        assert!(field.push(Particle::new(style(10), 50.0, 100.0).with_bounds(TextBounds::new(40.0, 20.0))));

        for _ in 0..9 {
            field.advance();
        }
        assert_eq!(field.len(), 1);
        assert!((field.particles()[0].x() - -40.0).abs() < f32::EPSILON);

        field.advance();
        assert!(field.is_empty());
    }

    #[test]
    fn test_advance_is_stable_filter() {
        let mut field = field(10, 1);
        let keep_a = placed(500.0, 100.0, 10.0, 10.0);
        let drop = placed(-20.0, 100.0, 10.0, 10.0);
        let keep_b = placed(300.0, 100.0, 10.0, 10.0);
        let ids = [keep_a.id(), keep_b.id()];
        field.push(keep_a);
        field.push(drop);
        field.push(keep_b);

        field.advance();
        let remaining: Vec<ParticleId> = field.particles().iter().map(Particle::id).collect();
        assert_eq!(remaining, ids);
    }

    #[test]
    fn test_measurement_failure_is_retried() {
        let mut field = field(10, 3);
        let flaky = FlakyMeasure { failures: Cell::new(3) };
        assert_eq!(field.tick(&flaky), 3);
        assert!(field.particles().iter().all(|p| !p.is_measured()));

        field.configure(3, 3);
        assert_eq!(field.tick(&flaky), 0);
        assert!(field.particles().iter().all(Particle::is_measured));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let mut field = field(10, 3);
        field.tick(&FixedMeasure);
        let mut snapshot = field.snapshot();
        snapshot[0].x = -9999.0;
        snapshot.clear();
        assert_eq!(field.len(), 3);
        assert!((field.particles()[0].x() - 800.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_hit_inside_and_outside() {
        let mut field = field(10, 1);
        field.push(placed(100.0, 200.0, 80.0, 20.0));

        assert_eq!(field.hit_test(10.0, 10.0), None);
        assert_eq!(field.len(), 1);

        assert!(field.hit_test(140.0, 190.0).is_some());
        assert!(field.is_empty());
    }

    #[test]
    fn test_hit_removes_at_most_one() {
        let mut field = field(10, 1);
        let first = placed(100.0, 200.0, 80.0, 20.0);
        let first_id = first.id();
        field.push(first);
        field.push(placed(100.0, 200.0, 80.0, 20.0));
        field.push(placed(110.0, 205.0, 80.0, 20.0));

        assert_eq!(field.hit_test(140.0, 190.0), Some(first_id));
        assert_eq!(field.len(), 2);
    }

    #[test]
    fn test_indexed_matches_linear_on_dense_field() {
        let mut linear = field(500, 100).with_hit_strategy(HitStrategy::Linear);
        for _ in 0..5 {
            linear.tick(&FixedMeasure);
        }
        let mut indexed = ParticleField::new(500, 100, 800.0, 600.0).with_hit_strategy(HitStrategy::Indexed);
        for p in linear.particles() {
            indexed.push(p.clone());
        }

        for i in 0..400 {
            let px = 700.0 + (i % 20) as f32 * 8.0;
            let py = (i / 20) as f32 * 30.0;
            assert_eq!(linear.hit_test(px, py), indexed.hit_test(px, py));
        }
        assert_eq!(linear.len(), indexed.len());
        assert!(indexed.index_stats().is_some());
    }

    #[test]
    fn test_auto_strategy_switches() {
        let mut field = field(200, 100).with_hit_strategy(HitStrategy::Auto { threshold: 50 });
        field.tick(&FixedMeasure);
        field.hit_test(-1000.0, -1000.0);
        assert!(field.index_stats().is_some());

        let mut small = self::field(200, 10).with_hit_strategy(HitStrategy::Auto { threshold: 50 });
        small.tick(&FixedMeasure);
        small.hit_test(-1000.0, -1000.0);
        assert!(small.index_stats().is_none());
    }

    fn arb_particle() -> impl Strategy<Value = (f32, f32, f32, f32)> {
        (-100.0f32..900.0, 0.0f32..700.0, 0.0f32..200.0, 0.0f32..60.0)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(1000))]

        #[test]
        fn prop_index_matches_linear_scan(
            particles in prop::collection::vec(arb_particle(), 0..120),
            probes in prop::collection::vec((-120.0f32..920.0, -80.0f32..720.0), 1..24),
        ) {
            let mut linear = ParticleField::new(1000, 1, 800.0, 600.0).with_hit_strategy(HitStrategy::Linear);
            let mut indexed = ParticleField::new(1000, 1, 800.0, 600.0).with_hit_strategy(HitStrategy::Indexed);
            for (x, y, w, h) in particles {
                let p = placed(x, y, w, h);
                linear.push(p.clone());
                indexed.push(p);
            }

            for (px, py) in probes {
                let before = linear.len();
                let a = linear.hit_test(px, py);
                let b = indexed.hit_test(px, py);
                prop_assert_eq!(a, b);
                prop_assert_eq!(linear.len(), indexed.len());
                prop_assert!(before - linear.len() <= 1);
                prop_assert_eq!(a.is_some(), before - linear.len() == 1);
            }
        }

        #[test]
        fn prop_capacity_and_monotonic_expiry(
            capacity in 1usize..150,
            batch in 1usize..40,
            ops in prop::collection::vec(any::<bool>(), 1..80),
        ) {
            let mut field = ParticleField::new(capacity, batch, 800.0, 600.0)
                .with_content_source(ContentSource::with_seed(capacity as u64));
            let mut removed = std::collections::HashSet::new();

            for tick in ops {
                if tick {
                    field.tick(&FixedMeasure);
                } else {
                    let before: std::collections::HashMap<ParticleId, f32> =
                        field.particles().iter().map(|p| (p.id(), p.x())).collect();
                    field.advance();
                    let after: std::collections::HashSet<ParticleId> =
                        field.particles().iter().map(Particle::id).collect();
                    for p in field.particles() {
                        prop_assert!(p.x() < before[&p.id()]);
                    }
                    removed.extend(before.keys().filter(|id| !after.contains(*id)).copied());
                }
                prop_assert!(field.len() <= capacity);
                prop_assert!(field.particles().iter().all(|p| !removed.contains(&p.id())));
            }
        }
    }
}
