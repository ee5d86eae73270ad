//! World simulation core for the Slither arena gameserver.
//!
//! The core advances autonomous snakes frame by frame on a toroidal
//! playfield: kinematics, food economy, spatial indices, and the two-phase
//! parallel step that resolves kills symmetrically. Bot decision logic and
//! event consumers stay outside; the core talks to them through the
//! [`BotBrain`] and [`UpdateTracker`] seams only.

use rand::{Rng, SeedableRng, rngs::SmallRng};
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use slotmap::{SecondaryMap, SlotMap, new_key_type};
use std::collections::VecDeque;
use std::fmt;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};
use std::time::{Duration, Instant};
use thiserror::Error;

pub use slither_index::{IndexError, SpatialItem, SpatialMap};

new_key_type! {
    /// Stable handle for bots backed by a generational slot map.
    pub struct BotId;
}

/// Simulation clock (frames processed since boot).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Frame(pub u64);

impl Frame {
    /// Returns the next sequential frame.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the frame counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Identifier assigned to every food item, unique within a field.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FoodId(pub u64);

// ---------------------------------------------------------------------------
// Geometry
// ---------------------------------------------------------------------------

/// 2D vector in world units.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Unit vector for an angle in radians.
    #[inline]
    #[must_use]
    pub fn from_angle(radians: f32) -> Self {
        Self {
            x: radians.cos(),
            y: radians.sin(),
        }
    }

    #[inline]
    #[must_use]
    pub fn length(&self) -> f32 {
        self.length_sq().sqrt()
    }

    #[inline]
    #[must_use]
    pub fn length_sq(&self) -> f32 {
        self.x * self.x + self.y * self.y
    }
}

impl Add for Vec2 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl Sub for Vec2 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self {
            x: self.x * rhs,
            y: self.y * rhs,
        }
    }
}

impl Neg for Vec2 {
    type Output = Self;
    fn neg(self) -> Self {
        Self {
            x: -self.x,
            y: -self.y,
        }
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, rhs: Self) {
        self.x -= rhs.x;
        self.y -= rhs.y;
    }
}

impl MulAssign<f32> for Vec2 {
    fn mul_assign(&mut self, rhs: f32) {
        self.x *= rhs;
        self.y *= rhs;
    }
}

/// Normalise an angle in degrees into `(-180, 180]`.
#[must_use]
pub fn normalize_angle_deg(angle: f32) -> f32 {
    let wrapped = angle.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

/// Toroidal world geometry: both axes wrap modulo the extent.
///
/// This is a plain value; snakes receive it by reference instead of holding a
/// back-reference to the field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Torus {
    width: f32,
    height: f32,
}

impl Torus {
    #[must_use]
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub const fn width(&self) -> f32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> f32 {
        self.height
    }

    /// World extent as a vector.
    #[must_use]
    pub const fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    #[inline]
    fn wrap_axis(value: f32, extent: f32) -> f32 {
        // rem_euclid handles arbitrary inputs; the guard catches the float
        // edge where a tiny negative rounds up to the full extent.
        let wrapped = value.rem_euclid(extent);
        if wrapped >= extent { wrapped - extent } else { wrapped }
    }

    #[inline]
    fn unwrap_axis(delta: f32, extent: f32) -> f32 {
        let wrapped = delta.rem_euclid(extent);
        if wrapped > extent / 2.0 {
            wrapped - extent
        } else {
            wrapped
        }
    }

    /// Canonical representative of `v` in `[0, W) x [0, H)`.
    #[must_use]
    pub fn wrap(&self, v: Vec2) -> Vec2 {
        Vec2::new(
            Self::wrap_axis(v.x, self.width),
            Self::wrap_axis(v.y, self.height),
        )
    }

    /// Wrap a displacement into `(-W/2, W/2] x (-H/2, H/2]`.
    #[must_use]
    pub fn unwrap_relative(&self, d: Vec2) -> Vec2 {
        Vec2::new(
            Self::unwrap_axis(d.x, self.width),
            Self::unwrap_axis(d.y, self.height),
        )
    }

    /// Representative of `v` nearest to `reference`, modulo world size.
    #[must_use]
    pub fn unwrap(&self, v: Vec2, reference: Vec2) -> Vec2 {
        reference + self.unwrap_relative(v - reference)
    }

    /// Whether `v` is already canonical.
    #[must_use]
    pub fn contains(&self, v: Vec2) -> bool {
        (0.0..self.width).contains(&v.x) && (0.0..self.height).contains(&v.y)
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the field.
#[derive(Debug, Error)]
pub enum FieldError {
    /// A configuration value cannot be used. Fatal at startup only.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The spatial index rejected the world dimensions.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// The worker pool could not be constructed.
    #[error("worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    /// A brain refused to initialise; the bot was not admitted.
    #[error("bot init failed: {0}")]
    BotInitFailed(String),
    /// A snake ended a tick in an impossible state; the tick was aborted.
    #[error("internal invariant violated: {0}")]
    InvariantViolated(String),
}

/// Error returned by [`BotBrain::init`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct BrainInitError(pub String);

impl From<&str> for BrainInitError {
    fn from(message: &str) -> Self {
        Self(message.to_owned())
    }
}

impl From<String> for BrainInitError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Static configuration for an arena field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaConfig {
    /// World width in world units.
    pub world_width: f32,
    /// World height in world units.
    pub world_height: f32,
    /// Target number of static (regenerating) food items.
    pub static_food_count: usize,
    /// Frames a food item lives before decaying.
    pub food_lifetime_ticks: u32,
    /// Mean of the Gaussian food value distribution.
    pub food_size_mean: f32,
    /// Standard deviation of the food value distribution.
    pub food_size_stddev: f32,
    /// Floor applied to sampled food values (truncation policy).
    pub food_value_min: f32,
    /// Frames during which dropped food cannot be eaten by its hunter.
    pub food_hunter_grace_ticks: u32,
    /// Mass assigned to newly admitted snakes.
    pub snake_start_mass: f32,
    /// Head travel per movement sub-step.
    pub snake_distance_per_step: f32,
    /// Movement sub-steps taken during a boosted tick.
    pub snake_boost_steps: u32,
    /// Fraction of mass shed as food after a boosted tick.
    pub snake_boost_loss_factor: f32,
    /// Mass below which a boosting snake dies.
    pub snake_self_kill_mass_threshold: f32,
    /// Pull-together smoothing factor in `[0, 1]`.
    pub snake_pull_factor: f32,
    /// Consume radius as a multiple of the segment radius.
    pub snake_consume_range: f32,
    /// Factor in the target segment distance formula.
    pub snake_segment_distance_factor: f32,
    /// Exponent in the target segment distance formula.
    pub snake_segment_distance_exponent: f32,
    /// Fraction of a dead snake's mass converted to food.
    pub snake_conversion_factor: f32,
    /// Killer must outweigh the victim by this ratio (strictly greater, > 1).
    pub killer_min_mass_ratio: f32,
    /// Radius of the bot-local view handed to brains.
    pub view_radius: f32,
    /// Per-cell capacity reserved in the spatial maps.
    pub spatial_map_reserve_count: usize,
    /// Worker threads for the two-phase step; 0 uses hardware parallelism.
    pub worker_threads: usize,
    /// Soft per-decision budget in milliseconds; 0 disables the check.
    pub brain_decision_budget_ms: u64,
    /// Frames between `botStats` emissions; 0 disables them.
    pub stats_interval: u32,
    /// Maximum banked log messages per bot; credit refills one per frame.
    pub log_credit_max: u32,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            world_width: 512.0,
            world_height: 512.0,
            static_food_count: 1_000,
            food_lifetime_ticks: 1_800,
            food_size_mean: 3.5,
            food_size_stddev: 2.0,
            food_value_min: 0.25,
            food_hunter_grace_ticks: 30,
            snake_start_mass: 10.0,
            snake_distance_per_step: 1.0,
            snake_boost_steps: 3,
            snake_boost_loss_factor: 0.05,
            snake_self_kill_mass_threshold: 4.0,
            snake_pull_factor: 0.1,
            snake_consume_range: 2.0,
            snake_segment_distance_factor: 0.2,
            snake_segment_distance_exponent: 0.3,
            snake_conversion_factor: 0.5,
            killer_min_mass_ratio: 1.5,
            view_radius: 50.0,
            spatial_map_reserve_count: 4,
            worker_threads: 0,
            brain_decision_budget_ms: 0,
            stats_interval: 60,
            log_credit_max: 10,
            rng_seed: None,
        }
    }
}

impl ArenaConfig {
    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), FieldError> {
        if !self.world_width.is_finite()
            || !self.world_height.is_finite()
            || self.world_width <= 0.0
            || self.world_height <= 0.0
        {
            return Err(FieldError::InvalidConfig(
                "world dimensions must be positive and finite",
            ));
        }
        if self.food_lifetime_ticks == 0 {
            return Err(FieldError::InvalidConfig(
                "food_lifetime_ticks must be at least 1",
            ));
        }
        if self.food_size_mean <= 0.0 || self.food_size_stddev < 0.0 {
            return Err(FieldError::InvalidConfig(
                "food size distribution parameters must be positive",
            ));
        }
        if self.food_value_min <= 0.0 || self.food_value_min > self.food_size_mean {
            return Err(FieldError::InvalidConfig(
                "food_value_min must be positive and not exceed food_size_mean",
            ));
        }
        if self.snake_start_mass <= 0.0 {
            return Err(FieldError::InvalidConfig(
                "snake_start_mass must be positive",
            ));
        }
        if self.snake_distance_per_step <= 0.0 {
            return Err(FieldError::InvalidConfig(
                "snake_distance_per_step must be positive",
            ));
        }
        if self.snake_boost_steps == 0 {
            return Err(FieldError::InvalidConfig(
                "snake_boost_steps must be at least 1",
            ));
        }
        if !(0.0..1.0).contains(&self.snake_boost_loss_factor) {
            return Err(FieldError::InvalidConfig(
                "snake_boost_loss_factor must lie in [0, 1)",
            ));
        }
        if !(0.0..=1.0).contains(&self.snake_pull_factor) {
            return Err(FieldError::InvalidConfig(
                "snake_pull_factor must lie in [0, 1]",
            ));
        }
        if self.snake_consume_range <= 0.0 {
            return Err(FieldError::InvalidConfig(
                "snake_consume_range must be positive",
            ));
        }
        if self.snake_segment_distance_factor <= 0.0 || self.snake_segment_distance_exponent <= 0.0
        {
            return Err(FieldError::InvalidConfig(
                "segment distance parameters must be positive",
            ));
        }
        if self.snake_conversion_factor <= 0.0 || self.snake_conversion_factor > 1.0 {
            return Err(FieldError::InvalidConfig(
                "snake_conversion_factor must lie in (0, 1]",
            ));
        }
        if self.killer_min_mass_ratio <= 1.0 {
            return Err(FieldError::InvalidConfig(
                "killer_min_mass_ratio must exceed 1",
            ));
        }
        if self.view_radius <= 0.0 {
            return Err(FieldError::InvalidConfig("view_radius must be positive"));
        }
        Ok(())
    }

    /// Returns the configured RNG, seeding from entropy when no seed is set.
    fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    fn torus(&self) -> Torus {
        Torus::new(self.world_width, self.world_height)
    }

    fn decision_budget(&self) -> Option<Duration> {
        (self.brain_decision_budget_ms > 0)
            .then(|| Duration::from_millis(self.brain_decision_budget_ms))
    }
}

// ---------------------------------------------------------------------------
// Update tracking
// ---------------------------------------------------------------------------

/// Per-bot statistics payload for [`UpdateTracker::bot_stats`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct BotStats {
    pub mass: f32,
    pub segment_count: usize,
    pub consumed_food_value: f32,
}

/// Event sink fed by the field. All calls are fire-and-forget; implementations
/// may buffer, batch, or drop, and the core never depends on their effects.
#[allow(unused_variables)]
pub trait UpdateTracker: Send {
    /// A new frame started.
    fn tick(&mut self, frame: Frame) {}
    /// A food item entered the world.
    fn food_spawned(&mut self, food: &Food) {}
    /// A food item expired.
    fn food_decayed(&mut self, food: &Food) {}
    /// A food item was eaten.
    fn food_consumed(&mut self, food: &Food, by: BotId) {}
    /// A bot was admitted to the field.
    fn bot_spawned(&mut self, bot: BotId) {}
    /// A bot completed its movement for the frame.
    fn bot_moved(&mut self, bot: BotId, steps: usize) {}
    /// A bot died. `killer == victim` for self-kills.
    fn bot_killed(&mut self, killer: BotId, victim: BotId) {}
    /// A diagnostic line for the bot's viewer.
    fn bot_log_message(&mut self, viewer_key: u64, message: &str) {}
    /// Periodic statistics snapshot.
    fn bot_stats(&mut self, bot: BotId, stats: &BotStats) {}
}

/// Tracker that discards every event.
#[derive(Debug, Default)]
pub struct NullTracker;

impl UpdateTracker for NullTracker {}

// ---------------------------------------------------------------------------
// Brain seam
// ---------------------------------------------------------------------------

/// Steering output produced by a brain each frame.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Decision {
    /// Desired heading in degrees.
    pub target_angle: f32,
    /// Whether to boost this frame.
    pub boost: bool,
}

/// A food item visible to a bot, relative to its head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodSighting {
    /// Short-path offset from the head.
    pub offset: Vec2,
    pub value: f32,
}

/// A foreign snake segment visible to a bot, relative to its head.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentSighting {
    /// Short-path offset from the head.
    pub offset: Vec2,
    pub radius: f32,
    pub bot: BotId,
}

/// Read-only local view handed to [`BotBrain::decide`]. Built from the prior
/// frame's spatial maps; offsets are already unwrapped across the seam.
#[derive(Debug, Clone)]
pub struct BotView {
    pub head: Vec2,
    pub heading: f32,
    pub mass: f32,
    pub segment_radius: f32,
    /// World extent, for brains that want absolute coordinates.
    pub world: Vec2,
    pub frame: Frame,
    pub food: Vec<FoodSighting>,
    pub snakes: Vec<SegmentSighting>,
}

/// Decision logic attached to a bot. Implementations live outside the core.
pub trait BotBrain: Send {
    /// One-time setup; failure prevents admission.
    fn init(&mut self) -> Result<(), BrainInitError> {
        Ok(())
    }

    /// Produce the steering decision for this frame.
    fn decide(&mut self, view: &BotView) -> Decision;

    /// Drain pending log lines. Emission is throttled by the log credit.
    fn log_messages(&mut self) -> Vec<String> {
        Vec::new()
    }
}

// ---------------------------------------------------------------------------
// Food
// ---------------------------------------------------------------------------

/// A piece of food on the playfield.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Food {
    id: FoodId,
    pos: Vec2,
    value: f32,
    is_static: bool,
    hunter: Option<BotId>,
    life: u32,
    spawned_at: Frame,
    removed: bool,
}

impl Food {
    fn new(
        id: FoodId,
        pos: Vec2,
        value: f32,
        is_static: bool,
        hunter: Option<BotId>,
        life: u32,
        spawned_at: Frame,
    ) -> Self {
        Self {
            id,
            pos,
            value,
            is_static,
            hunter,
            life,
            spawned_at,
            removed: false,
        }
    }

    #[must_use]
    pub const fn id(&self) -> FoodId {
        self.id
    }

    #[must_use]
    pub const fn pos(&self) -> Vec2 {
        self.pos
    }

    #[must_use]
    pub const fn value(&self) -> f32 {
        self.value
    }

    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.is_static
    }

    /// The bot credited with dropping this piece, if any.
    #[must_use]
    pub const fn hunter(&self) -> Option<BotId> {
        self.hunter
    }

    #[must_use]
    pub const fn spawned_at(&self) -> Frame {
        self.spawned_at
    }

    /// Whether the quota system replaces this item when it disappears.
    #[must_use]
    pub const fn shall_regenerate(&self) -> bool {
        self.is_static
    }

    /// Age one frame. Returns true exactly once, when the item expires.
    fn decay(&mut self) -> bool {
        if self.removed {
            return false;
        }
        self.life = self.life.saturating_sub(1);
        if self.life == 0 {
            self.removed = true;
            true
        } else {
            false
        }
    }

    /// Flag for the next sweep. Marked items are ignored by consume queries.
    pub fn mark_for_removal(&mut self) {
        self.removed = true;
    }

    #[must_use]
    pub const fn is_marked_for_removal(&self) -> bool {
        self.removed
    }
}

impl SpatialItem for Food {
    fn position(&self) -> (f32, f32) {
        (self.pos.x, self.pos.y)
    }
}

/// Owns food identity and the sampling policy for spawned values.
///
/// Values are drawn from a Gaussian and truncated to `food_value_min`
/// (truncation, not rejection: deterministic sample count under a fixed
/// seed). Dynamic scatter clamps every piece to the remaining value, so a
/// kill conversion emits exactly the converted mass.
struct FoodPool {
    next_id: u64,
    size_distribution: Normal<f32>,
    mean: f32,
    value_floor: f32,
}

impl FoodPool {
    fn new(config: &ArenaConfig) -> Result<Self, FieldError> {
        let size_distribution = Normal::new(config.food_size_mean, config.food_size_stddev)
            .map_err(|_| FieldError::InvalidConfig("food size distribution parameters"))?;
        Ok(Self {
            next_id: 0,
            size_distribution,
            mean: config.food_size_mean,
            value_floor: config.food_value_min,
        })
    }

    fn next_id(&mut self) -> FoodId {
        self.next_id += 1;
        FoodId(self.next_id)
    }

    fn sample_value(&self, rng: &mut SmallRng) -> f32 {
        self.size_distribution.sample(rng).max(self.value_floor)
    }

    /// A regenerable item at a uniformly random position.
    fn spawn_static(
        &mut self,
        rng: &mut SmallRng,
        torus: &Torus,
        life: u32,
        frame: Frame,
    ) -> Food {
        let value = self.sample_value(rng);
        let pos = Vec2::new(
            rng.random_range(0.0..torus.width()),
            rng.random_range(0.0..torus.height()),
        );
        Food::new(self.next_id(), pos, value, true, None, life, frame)
    }

    /// Scatter `total` value around `center` as non-regenerable pieces.
    #[allow(clippy::too_many_arguments)]
    fn scatter_dynamic(
        &mut self,
        rng: &mut SmallRng,
        total: f32,
        center: Vec2,
        scatter_radius: f32,
        hunter: Option<BotId>,
        torus: &Torus,
        life: u32,
        frame: Frame,
    ) -> Vec<Food> {
        let mut pieces = Vec::new();
        let mut remaining = total;
        while remaining > 0.0 {
            let value = if remaining > self.mean {
                self.sample_value(rng).min(remaining)
            } else {
                remaining
            };
            let distance = scatter_radius * rng.random_range(0.0..1.0f32);
            let angle = rng.random_range(-180.0..180.0f32).to_radians();
            let pos = torus.wrap(center + Vec2::from_angle(angle) * distance);
            pieces.push(Food::new(
                self.next_id(),
                pos,
                value,
                false,
                hunter,
                life,
                frame,
            ));
            remaining -= value;
        }
        pieces
    }
}

// ---------------------------------------------------------------------------
// Snake
// ---------------------------------------------------------------------------

/// Per-agent body state and kinematics.
///
/// The body is a double-ended list of segment positions, head at index 0,
/// never fewer than two segments. Growth is driven by mass changes, not by
/// movement: a tick's movement produces new head segments but the length is
/// forced back, so tail segments are replaced one-for-one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Snake {
    mass: f32,
    heading: f32,
    segments: VecDeque<Vec2>,
    target_segment_distance: f32,
    segment_radius: f32,
    moved_since_last_spawn: f32,
    boosted_last_move: bool,
}

impl Snake {
    /// Create a snake at `start` with the given mass and heading (degrees).
    #[must_use]
    pub fn new(start: Vec2, mass: f32, heading: f32, config: &ArenaConfig) -> Self {
        let mut snake = Self {
            mass,
            heading: normalize_angle_deg(heading),
            segments: VecDeque::from([start]),
            target_segment_distance: 0.0,
            segment_radius: 0.0,
            moved_since_last_spawn: 0.0,
            boosted_last_move: false,
        };
        snake.ensure_size_matches_mass(config);
        snake
    }

    #[must_use]
    pub const fn mass(&self) -> f32 {
        self.mass
    }

    /// Heading in degrees, `(-180, 180]`.
    #[must_use]
    pub const fn heading(&self) -> f32 {
        self.heading
    }

    #[must_use]
    pub const fn segment_radius(&self) -> f32 {
        self.segment_radius
    }

    #[must_use]
    pub const fn target_segment_distance(&self) -> f32 {
        self.target_segment_distance
    }

    #[must_use]
    pub const fn boosted_last_move(&self) -> bool {
        self.boosted_last_move
    }

    /// Head position (segment 0).
    #[must_use]
    pub fn head(&self) -> Vec2 {
        self.segments.front().copied().unwrap_or(Vec2::ZERO)
    }

    #[must_use]
    pub const fn segments(&self) -> &VecDeque<Vec2> {
        &self.segments
    }

    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    /// Maximum heading change per movement sub-step, degrees.
    #[must_use]
    pub fn max_rotation_per_step(&self) -> f32 {
        10.0 / (self.segment_radius / 10.0 + 1.0)
    }

    /// Radius within which food can be eaten.
    #[must_use]
    pub fn consume_radius(&self, config: &ArenaConfig) -> f32 {
        self.segment_radius * config.snake_consume_range
    }

    /// Re-derive segment spacing, segment count, and radius from the mass.
    /// Appends copies of the tail when growing; truncates the tail when
    /// shrinking. Never drops below two segments.
    pub fn ensure_size_matches_mass(&mut self, config: &ArenaConfig) {
        self.target_segment_distance = (self.mass * config.snake_segment_distance_factor)
            .powf(config.snake_segment_distance_exponent);

        let current = self.segments.len();
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let target = ((self.mass / self.target_segment_distance / 5.0).max(0.0) as usize).max(2);

        if current < target {
            if let Some(&tail) = self.segments.back() {
                for _ in 0..(target - current) {
                    self.segments.push_back(tail);
                }
            }
        } else if current > target {
            self.segments.truncate(target);
        }

        self.segment_radius = self.mass.sqrt() / 2.0;
    }

    /// Range test against a food item, short-path across the seam.
    #[must_use]
    pub fn can_consume(&self, food: &Food, torus: &Torus, config: &ArenaConfig) -> bool {
        let head = self.head();
        let food_pos = torus.unwrap(food.pos(), head);
        let range = self.consume_radius(config);
        (head - food_pos).length_sq() < range * range
    }

    /// Absorb a food item's value and grow to match.
    pub fn consume(&mut self, food: &Food, config: &ArenaConfig) {
        self.mass += food.value();
        self.ensure_size_matches_mass(config);
    }

    /// Shed mass (boost loss). The body is resized by the caller afterwards.
    pub fn reduce_mass(&mut self, amount: f32) {
        self.mass = (self.mass - amount).max(0.0);
    }

    /// Per-segment food drops for a kill conversion: each segment yields
    /// `mass / len * conversion_factor` at its position.
    pub fn convert_to_food<'a>(
        &'a self,
        config: &ArenaConfig,
    ) -> impl Iterator<Item = (Vec2, f32)> + 'a {
        let per_segment =
            self.mass / self.segments.len() as f32 * config.snake_conversion_factor;
        self.segments.iter().map(move |seg| (*seg, per_segment))
    }

    /// Advance one frame toward `target_angle` (degrees), optionally boosted.
    ///
    /// Returns the number of new head-side segments produced. The segment
    /// count is unchanged across the call; growth happens only through
    /// [`Self::ensure_size_matches_mass`].
    pub fn advance(
        &mut self,
        target_angle: f32,
        boost: bool,
        torus: &Torus,
        config: &ArenaConfig,
    ) -> usize {
        let mut delta = normalize_angle_deg(target_angle - self.heading);
        let max_delta = self.max_rotation_per_step();
        delta = delta.clamp(-max_delta, max_delta);

        let old_len = self.segments.len();

        // Unwrap every segment relative to its predecessor so the polyline is
        // locally continuous across the seam.
        {
            let segments = self.segments.make_contiguous();
            let mut reference = segments[0];
            for seg in segments.iter_mut() {
                *seg = torus.unwrap(*seg, reference);
                reference = *seg;
            }
        }

        let Some(mut head) = self.segments.pop_front() else {
            return 0;
        };

        let steps = if boost { config.snake_boost_steps } else { 1 };
        let mut segments_added = 0usize;

        for _ in 0..steps {
            // Rotation accumulates across boost sub-steps.
            self.heading += delta;
            head += Vec2::from_angle(self.heading.to_radians()) * config.snake_distance_per_step;
            self.moved_since_last_spawn += config.snake_distance_per_step;

            while self.moved_since_last_spawn > self.target_segment_distance {
                let front = self.segments.front().copied().unwrap_or(head);
                let toward = head - front;
                let length = toward.length();
                if length <= f32::EPSILON {
                    break;
                }
                self.moved_since_last_spawn -= self.target_segment_distance;
                self.segments
                    .push_front(front + toward * (self.target_segment_distance / length));
                segments_added += 1;
            }
        }

        self.segments.push_front(head);
        self.heading = normalize_angle_deg(self.heading);

        // Growth-rate limiter: new head segments displace tail segments.
        self.segments.truncate(old_len);

        // Pull-together smoothing over interior segments, in place.
        let alpha = config.snake_pull_factor;
        if self.segments.len() >= 3 && alpha > 0.0 {
            let segments = self.segments.make_contiguous();
            for i in 1..segments.len() - 1 {
                let midpoint = (segments[i - 1] + segments[i + 1]) * 0.5;
                segments[i] = segments[i] * (1.0 - alpha) + midpoint * alpha;
            }
        }

        for seg in self.segments.iter_mut() {
            *seg = torus.wrap(*seg);
        }

        self.boosted_last_move = boost;
        segments_added
    }
}

/// A snake segment as stored in the segment map.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentInfo {
    pub pos: Vec2,
    pub bot: BotId,
    pub radius: f32,
}

impl SpatialItem for SegmentInfo {
    fn position(&self) -> (f32, f32) {
        (self.pos.x, self.pos.y)
    }
}

// ---------------------------------------------------------------------------
// Bot executor
// ---------------------------------------------------------------------------

/// Phase tag carried by a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Move,
    CollisionCheck,
}

/// Per-bot work record for one tick. Jobs own their output slots exclusively;
/// the controller reads them only after the phase barrier.
#[derive(Debug, Clone, Copy)]
pub struct BotJob {
    pub bot: BotId,
    pub kind: JobKind,
    /// New head segments produced by the move phase.
    pub steps: usize,
    /// Killer candidate recorded by the collision phase.
    pub killer: Option<BotId>,
    /// The decision overran its budget and the previous one was reused.
    pub timed_out: bool,
}

impl BotJob {
    fn new(bot: BotId) -> Self {
        Self {
            bot,
            kind: JobKind::Move,
            steps: 0,
            killer: None,
            timed_out: false,
        }
    }
}

/// Fixed-size worker pool dispatching per-bot jobs.
///
/// A phase is one [`Self::run`] call: every job is processed on the pool and
/// the call returns only when all of them completed, which is the barrier
/// between the move and collision phases. Jobs never touch another bot's
/// state; structural mutation stays on the controller.
pub struct BotExecutor {
    pool: rayon::ThreadPool,
}

impl BotExecutor {
    /// Build a pool with `threads` workers (0 = hardware parallelism).
    pub fn new(threads: usize) -> Result<Self, FieldError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("slither-worker-{index}"))
            .build()?;
        Ok(Self { pool })
    }

    /// Number of workers in the pool.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Process every job, blocking until the last one completed.
    pub fn run<J, F>(&self, jobs: &mut [J], op: F)
    where
        J: Send,
        F: Fn(&mut J) + Sync,
    {
        self.pool.install(|| {
            jobs.par_iter_mut().for_each(|job| op(job));
        });
    }
}

impl fmt::Debug for BotExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotExecutor")
            .field("workers", &self.worker_count())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Bots and admissions
// ---------------------------------------------------------------------------

/// A snake paired with its external decision logic.
pub struct Bot {
    name: String,
    viewer_key: u64,
    snake: Snake,
    brain: Box<dyn BotBrain>,
    last_decision: Decision,
    log_credit: u32,
    consumed_food_value: f32,
}

impl Bot {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque key identifying the bot's viewer stream in log events.
    #[must_use]
    pub const fn viewer_key(&self) -> u64 {
        self.viewer_key
    }

    #[must_use]
    pub const fn snake(&self) -> &Snake {
        &self.snake
    }

    /// Total food value consumed since admission.
    #[must_use]
    pub const fn consumed_food_value(&self) -> f32 {
        self.consumed_food_value
    }

    fn stats(&self) -> BotStats {
        BotStats {
            mass: self.snake.mass(),
            segment_count: self.snake.segment_count(),
            consumed_food_value: self.consumed_food_value,
        }
    }
}

impl fmt::Debug for Bot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bot")
            .field("name", &self.name)
            .field("mass", &self.snake.mass())
            .field("segments", &self.snake.segment_count())
            .finish()
    }
}

struct PendingBot {
    name: String,
    brain: Box<dyn BotBrain>,
}

/// Queue of bots scheduled for admission. Kill callbacks may push here; the
/// field commits the queue at the start of the next tick, so the bot set is
/// never mutated while a kill is being resolved.
#[derive(Default)]
pub struct Admissions {
    pending: Vec<PendingBot>,
}

impl Admissions {
    /// Schedule a bot for admission before the next tick.
    pub fn schedule(&mut self, name: impl Into<String>, brain: Box<dyn BotBrain>) {
        self.pending.push(PendingBot {
            name: name.into(),
            brain,
        });
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn drain(&mut self) -> Vec<PendingBot> {
        std::mem::take(&mut self.pending)
    }
}

impl fmt::Debug for Admissions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Admissions")
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Invoked synchronously during kill resolution. Respawns go through the
/// admission queue, never into the live bot set.
pub type BotKilledCallback = Box<dyn FnMut(&mut Admissions, BotId, BotId) + Send>;

// ---------------------------------------------------------------------------
// Field
// ---------------------------------------------------------------------------

/// Summary of one completed tick.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct FrameReport {
    pub frame: Frame,
    pub bots_alive: usize,
    pub food_items: usize,
    pub kills: usize,
    pub food_consumed: usize,
    pub food_decayed: usize,
}

#[derive(Clone, Copy)]
struct HeadProbe {
    head: Vec2,
    radius: f32,
    mass: f32,
}

/// Owns the world: bots, food, spatial indices, RNG, and the tick pipeline.
pub struct Field {
    config: ArenaConfig,
    torus: Torus,
    frame: Frame,
    rng: SmallRng,
    bots: SlotMap<BotId, Bot>,
    food_map: SpatialMap<Food>,
    segment_map: SpatialMap<SegmentInfo>,
    food_pool: FoodPool,
    executor: BotExecutor,
    tracker: Box<dyn UpdateTracker>,
    kill_callbacks: Vec<BotKilledCallback>,
    admissions: Admissions,
    max_segment_radius: f32,
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("frame", &self.frame)
            .field("bots", &self.bots.len())
            .field("food", &self.food_map.len())
            .field("world", &self.torus)
            .finish()
    }
}

impl Field {
    /// Build a field from a validated configuration and seed the static food.
    pub fn new(config: ArenaConfig, tracker: Box<dyn UpdateTracker>) -> Result<Self, FieldError> {
        config.validate()?;
        let torus = config.torus();
        let food_map = SpatialMap::new(
            config.world_width,
            config.world_height,
            config.spatial_map_reserve_count,
        )?;
        let segment_map = SpatialMap::new(
            config.world_width,
            config.world_height,
            config.spatial_map_reserve_count,
        )?;
        let food_pool = FoodPool::new(&config)?;
        let executor = BotExecutor::new(config.worker_threads)?;
        let rng = config.seeded_rng();

        let mut field = Self {
            torus,
            frame: Frame::zero(),
            rng,
            bots: SlotMap::with_key(),
            food_map,
            segment_map,
            food_pool,
            executor,
            tracker,
            kill_callbacks: Vec::new(),
            admissions: Admissions::default(),
            max_segment_radius: 0.0,
            config,
        };
        field.create_static_food(field.config.static_food_count);
        Ok(field)
    }

    #[must_use]
    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    #[must_use]
    pub const fn frame(&self) -> Frame {
        self.frame
    }

    #[must_use]
    pub const fn torus(&self) -> Torus {
        self.torus
    }

    #[must_use]
    pub fn bot_count(&self) -> usize {
        self.bots.len()
    }

    /// Iterate over live bots.
    pub fn bots(&self) -> impl Iterator<Item = (BotId, &Bot)> {
        self.bots.iter()
    }

    #[must_use]
    pub fn bot(&self, id: BotId) -> Option<&Bot> {
        self.bots.get(id)
    }

    /// Convenience accessor for a bot's snake.
    #[must_use]
    pub fn snake(&self, id: BotId) -> Option<&Snake> {
        self.bots.get(id).map(Bot::snake)
    }

    #[must_use]
    pub fn food_count(&self) -> usize {
        self.food_map.len()
    }

    /// Iterate over live food items.
    pub fn food(&self) -> impl Iterator<Item = &Food> {
        self.food_map.iter()
    }

    /// Number of segments currently indexed in the segment map.
    #[must_use]
    pub fn indexed_segment_count(&self) -> usize {
        self.segment_map.len()
    }

    /// Largest live segment radius, refreshed each tick.
    #[must_use]
    pub const fn max_segment_radius(&self) -> f32 {
        self.max_segment_radius
    }

    /// Register a callback invoked after every kill.
    pub fn add_kill_callback(&mut self, callback: BotKilledCallback) {
        self.kill_callbacks.push(callback);
    }

    /// Admit a bot at a random position and heading.
    pub fn admit_bot(
        &mut self,
        name: impl Into<String>,
        brain: Box<dyn BotBrain>,
    ) -> Result<BotId, FieldError> {
        let position = Vec2::new(
            self.rng.random_range(0.0..self.config.world_width),
            self.rng.random_range(0.0..self.config.world_height),
        );
        let heading = self.rng.random_range(-180.0..180.0f32);
        let mass = self.config.snake_start_mass;
        self.admit_bot_at(name, brain, position, heading, mass)
    }

    /// Admit a bot at an exact position, heading, and mass. Intended for
    /// scripted scenarios and tests; the random variant delegates here.
    pub fn admit_bot_at(
        &mut self,
        name: impl Into<String>,
        mut brain: Box<dyn BotBrain>,
        position: Vec2,
        heading: f32,
        mass: f32,
    ) -> Result<BotId, FieldError> {
        let name = name.into();
        let viewer_key = self.rng.random::<u64>();
        if let Err(error) = brain.init() {
            self.tracker
                .bot_log_message(viewer_key, &format!("cannot start bot {name}: {error}"));
            return Err(FieldError::BotInitFailed(error.to_string()));
        }

        let snake = Snake::new(self.torus.wrap(position), mass, heading, &self.config);
        let heading = snake.heading();
        let bot = Bot {
            name,
            viewer_key,
            snake,
            brain,
            last_decision: Decision {
                target_angle: heading,
                boost: false,
            },
            log_credit: self.config.log_credit_max,
            consumed_food_value: 0.0,
        };
        let id = self.bots.insert(bot);
        self.tracker.bot_log_message(viewer_key, "starting bot");
        self.tracker.bot_spawned(id);
        Ok(id)
    }

    /// Place a non-regenerating food item at an exact position. Intended for
    /// scripted scenarios and tests.
    pub fn spawn_food_at(&mut self, position: Vec2, value: f32) -> FoodId {
        let food = Food::new(
            self.food_pool.next_id(),
            self.torus.wrap(position),
            value,
            false,
            None,
            self.config.food_lifetime_ticks,
            self.frame,
        );
        let id = food.id();
        self.tracker.food_spawned(&food);
        self.food_map.insert(food);
        id
    }

    /// Run one complete tick of the pipeline.
    pub fn step(&mut self) -> Result<FrameReport, FieldError> {
        self.stage_admissions();

        self.frame = self.frame.next();
        self.tracker.tick(self.frame);

        let food_decayed = self.stage_decay_food();
        let food_consumed = self.stage_consume_food();
        let kills = self.stage_move_bots();
        self.stage_rebuild_segment_map();
        self.stage_logs();
        self.stage_stats();
        self.check_invariants()?;

        Ok(FrameReport {
            frame: self.frame,
            bots_alive: self.bots.len(),
            food_items: self.food_map.len(),
            kills,
            food_consumed,
            food_decayed,
        })
    }

    fn stage_admissions(&mut self) {
        if self.admissions.is_empty() {
            return;
        }
        for pending in self.admissions.drain() {
            // Init failures already emitted a diagnostic; the respawn is lost.
            let _ = self.admit_bot(pending.name, pending.brain);
        }
    }

    fn stage_decay_food(&mut self) -> usize {
        let mut decayed = 0usize;
        let mut regenerate = 0usize;
        {
            let tracker = &mut self.tracker;
            self.food_map.for_each_mut(|food| {
                if food.decay() {
                    decayed += 1;
                    tracker.food_decayed(food);
                    if food.shall_regenerate() {
                        regenerate += 1;
                    }
                }
            });
        }
        self.remove_marked_food();
        // Respawns strictly after the purge; the map is never grown mid-walk.
        self.create_static_food(regenerate);
        decayed
    }

    fn stage_consume_food(&mut self) -> usize {
        let ids: Vec<BotId> = self.bots.keys().collect();
        let mut consumed = 0usize;
        let mut regenerate = 0usize;
        {
            let bots = &mut self.bots;
            let food_map = &mut self.food_map;
            let tracker = &mut self.tracker;
            let torus = self.torus;
            let config = &self.config;
            let frame = self.frame;
            let grace = u64::from(config.food_hunter_grace_ticks);

            for id in ids {
                let Some(bot) = bots.get_mut(id) else { continue };
                let head = bot.snake.head();
                let radius = bot.snake.consume_radius(config);
                food_map.for_each_in_region_mut((head.x, head.y), radius, |food| {
                    if food.is_marked_for_removal() {
                        return;
                    }
                    if food.hunter() == Some(id)
                        && frame.0.saturating_sub(food.spawned_at().0) < grace
                    {
                        return;
                    }
                    if bot.snake.can_consume(food, &torus, config) {
                        bot.snake.consume(food, config);
                        bot.consumed_food_value += food.value();
                        tracker.food_consumed(food, id);
                        food.mark_for_removal();
                        consumed += 1;
                        if food.shall_regenerate() {
                            regenerate += 1;
                        }
                    }
                });
                bot.snake.ensure_size_matches_mass(config);
            }
        }
        self.remove_marked_food();
        self.create_static_food(regenerate);
        self.update_max_segment_radius();
        consumed
    }

    fn stage_move_bots(&mut self) -> usize {
        if self.bots.is_empty() {
            return 0;
        }

        let mut jobs: Vec<BotJob> = self.bots.keys().map(BotJob::new).collect();

        // Phase 1: move. Each job owns exactly one bot; reads go to the prior
        // frame's maps only.
        {
            let torus = self.torus;
            let config = &self.config;
            let frame = self.frame;
            let food_map = &self.food_map;
            let segment_map = &self.segment_map;
            let budget = config.decision_budget();
            let mut work: Vec<(&mut BotJob, &mut Bot)> =
                jobs.iter_mut().zip(self.bots.values_mut()).collect();
            self.executor.run(&mut work, |item| {
                let (job, bot) = item;
                let view = local_view(
                    job.bot,
                    &bot.snake,
                    frame,
                    torus,
                    config,
                    food_map,
                    segment_map,
                );
                let started = Instant::now();
                let fresh = bot.brain.decide(&view);
                let decision = match budget {
                    Some(limit) if started.elapsed() > limit => {
                        job.timed_out = true;
                        bot.last_decision
                    }
                    _ => {
                        bot.last_decision = fresh;
                        fresh
                    }
                };
                job.steps = bot
                    .snake
                    .advance(decision.target_angle, decision.boost, &torus, config);
            });
        }

        // Phase 2: collision check over immutable snapshots. Movement is
        // complete, so mutual kills resolve from the same geometry.
        let mut masses: SecondaryMap<BotId, f32> = SecondaryMap::new();
        for (id, bot) in &self.bots {
            masses.insert(id, bot.snake.mass());
        }
        {
            let torus = self.torus;
            let ratio = self.config.killer_min_mass_ratio;
            let segment_map = &self.segment_map;
            let reach_bound = self.max_segment_radius;
            let masses = &masses;
            let mut work: Vec<(&mut BotJob, HeadProbe)> = jobs
                .iter_mut()
                .zip(self.bots.values())
                .map(|(job, bot)| {
                    job.kind = JobKind::CollisionCheck;
                    let probe = HeadProbe {
                        head: bot.snake.head(),
                        radius: bot.snake.segment_radius(),
                        mass: bot.snake.mass(),
                    };
                    (job, probe)
                })
                .collect();
            self.executor.run(&mut work, |item| {
                let (job, probe) = item;
                segment_map.for_each_in_region(
                    (probe.head.x, probe.head.y),
                    probe.radius + reach_bound,
                    |info| {
                        if job.killer.is_some() || info.bot == job.bot {
                            return;
                        }
                        let other = torus.unwrap(info.pos, probe.head);
                        let reach = probe.radius + info.radius;
                        if (other - probe.head).length_sq() < reach * reach
                            && masses.get(info.bot).copied().unwrap_or(0.0) > probe.mass * ratio
                        {
                            job.killer = Some(info.bot);
                        }
                    },
                );
            });
        }

        // Kill resolution, single-threaded, in submission order.
        let boost_loss = self.config.snake_boost_loss_factor;
        let self_kill_threshold = self.config.snake_self_kill_mass_threshold;
        let min_ratio = self.config.killer_min_mass_ratio;
        let mut kills = 0usize;

        for job in &jobs {
            let victim = job.bot;
            if let Some(killer) = job.killer {
                let killer_mass = masses.get(killer).copied().unwrap_or(0.0);
                let victim_mass = masses.get(victim).copied().unwrap_or(0.0);
                if killer_mass > victim_mass * min_ratio {
                    self.kill_bot(victim, killer);
                    kills += 1;
                    continue;
                }
            }

            // Still alive: report the move, settle boost costs.
            self.tracker.bot_moved(victim, job.steps);
            if job.timed_out {
                if let Some(bot) = self.bots.get(victim) {
                    let viewer_key = bot.viewer_key;
                    self.tracker.bot_log_message(
                        viewer_key,
                        "decision exceeded budget; reusing previous steering",
                    );
                }
            }

            let mut boost_drop: Option<(f32, Vec2, f32)> = None;
            let mut self_kill = false;
            if let Some(bot) = self.bots.get_mut(victim) {
                if bot.snake.boosted_last_move() {
                    let loss = boost_loss * bot.snake.mass();
                    bot.snake.reduce_mass(loss);
                    boost_drop = Some((loss, bot.snake.head(), bot.snake.segment_radius()));
                    self_kill = bot.snake.mass() < self_kill_threshold;
                }
                if !self_kill {
                    bot.snake.ensure_size_matches_mass(&self.config);
                }
            }
            if let Some((loss, head, radius)) = boost_drop {
                self.create_dynamic_food(loss, head, radius, Some(victim));
            }
            if self_kill {
                self.kill_bot(victim, victim);
                kills += 1;
            }
        }

        kills
    }

    /// Clear and rebuild the segment map from the surviving bots. This is the
    /// authoritative index for the next frame.
    fn stage_rebuild_segment_map(&mut self) {
        let segment_map = &mut self.segment_map;
        segment_map.clear();
        for (id, bot) in &self.bots {
            let radius = bot.snake.segment_radius();
            for seg in bot.snake.segments() {
                segment_map.insert(SegmentInfo {
                    pos: *seg,
                    bot: id,
                    radius,
                });
            }
        }
    }

    fn stage_logs(&mut self) {
        let credit_max = self.config.log_credit_max;
        let tracker = &mut self.tracker;
        for bot in self.bots.values_mut() {
            for message in bot.brain.log_messages() {
                if bot.log_credit == 0 {
                    break;
                }
                bot.log_credit -= 1;
                tracker.bot_log_message(bot.viewer_key, &message);
            }
            bot.log_credit = (bot.log_credit + 1).min(credit_max);
        }
    }

    fn stage_stats(&mut self) {
        let interval = self.config.stats_interval;
        if interval == 0 || !self.frame.0.is_multiple_of(u64::from(interval)) {
            return;
        }
        let tracker = &mut self.tracker;
        for (id, bot) in &self.bots {
            tracker.bot_stats(id, &bot.stats());
        }
    }

    fn check_invariants(&self) -> Result<(), FieldError> {
        for (id, bot) in &self.bots {
            let snake = &bot.snake;
            if snake.segment_count() < 2 {
                return Err(FieldError::InvariantViolated(format!(
                    "bot {id:?} ended the tick with {} segments",
                    snake.segment_count()
                )));
            }
            if snake.heading().abs() > 180.0 {
                return Err(FieldError::InvariantViolated(format!(
                    "bot {id:?} heading {} out of range",
                    snake.heading()
                )));
            }
            for seg in snake.segments() {
                if !self.torus.contains(*seg) {
                    return Err(FieldError::InvariantViolated(format!(
                        "bot {id:?} has a non-canonical segment at ({}, {})",
                        seg.x, seg.y
                    )));
                }
            }
        }
        Ok(())
    }

    fn kill_bot(&mut self, victim: BotId, killer: BotId) {
        let Some(bot) = self.bots.remove(victim) else {
            return;
        };
        let scatter_radius = bot.snake.segment_radius();
        let drops: Vec<(Vec2, f32)> = bot.snake.convert_to_food(&self.config).collect();
        for (position, value) in drops {
            self.create_dynamic_food(value, position, scatter_radius, Some(killer));
        }
        self.tracker.bot_killed(killer, victim);

        // Callbacks may schedule respawns; they take effect next tick.
        let mut callbacks = std::mem::take(&mut self.kill_callbacks);
        for callback in &mut callbacks {
            callback(&mut self.admissions, victim, killer);
        }
        self.kill_callbacks = callbacks;
    }

    fn create_static_food(&mut self, count: usize) {
        for _ in 0..count {
            let food = self.food_pool.spawn_static(
                &mut self.rng,
                &self.torus,
                self.config.food_lifetime_ticks,
                self.frame,
            );
            self.tracker.food_spawned(&food);
            self.food_map.insert(food);
        }
    }

    fn create_dynamic_food(
        &mut self,
        total_value: f32,
        center: Vec2,
        scatter_radius: f32,
        hunter: Option<BotId>,
    ) {
        let pieces = self.food_pool.scatter_dynamic(
            &mut self.rng,
            total_value,
            center,
            scatter_radius,
            hunter,
            &self.torus,
            self.config.food_lifetime_ticks,
            self.frame,
        );
        for food in pieces {
            self.tracker.food_spawned(&food);
            self.food_map.insert(food);
        }
    }

    fn remove_marked_food(&mut self) {
        self.food_map.erase_if(Food::is_marked_for_removal);
    }

    fn update_max_segment_radius(&mut self) {
        let mut max_radius = 0.0f32;
        for bot in self.bots.values() {
            max_radius = max_radius.max(bot.snake.segment_radius());
        }
        self.max_segment_radius = max_radius;
    }
}

/// Assemble the read-only neighbourhood view for one bot from the prior
/// frame's maps.
#[allow(clippy::too_many_arguments)]
fn local_view(
    id: BotId,
    snake: &Snake,
    frame: Frame,
    torus: Torus,
    config: &ArenaConfig,
    food_map: &SpatialMap<Food>,
    segment_map: &SpatialMap<SegmentInfo>,
) -> BotView {
    let head = snake.head();
    let radius = config.view_radius;
    let radius_sq = radius * radius;

    let mut food = Vec::new();
    food_map.for_each_in_region((head.x, head.y), radius, |item| {
        if item.is_marked_for_removal() {
            return;
        }
        let offset = torus.unwrap_relative(item.pos() - head);
        if offset.length_sq() <= radius_sq {
            food.push(FoodSighting {
                offset,
                value: item.value(),
            });
        }
    });

    let mut snakes = Vec::new();
    segment_map.for_each_in_region((head.x, head.y), radius, |info| {
        if info.bot == id {
            return;
        }
        let offset = torus.unwrap_relative(info.pos - head);
        if offset.length_sq() <= radius_sq {
            snakes.push(SegmentSighting {
                offset,
                radius: info.radius,
                bot: info.bot,
            });
        }
    });

    BotView {
        head,
        heading: snake.heading(),
        mass: snake.mass(),
        segment_radius: snake.segment_radius(),
        world: torus.size(),
        frame,
        food,
        snakes,
    }
}
