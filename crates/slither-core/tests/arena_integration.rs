//! End-to-end scenarios driven through the public `Field` API.

use slither_core::{
    ArenaConfig, BotBrain, BotId, BotView, Decision, Field, FoodId, UpdateTracker, Vec2,
};
use std::sync::{Arc, Mutex};

/// Steers toward a fixed heading, optionally boosting every frame.
struct CruiserBrain {
    angle: f32,
    boost: bool,
}

impl CruiserBrain {
    fn ahead(angle: f32) -> Box<Self> {
        Box::new(Self {
            angle,
            boost: false,
        })
    }

    fn boosting(angle: f32) -> Box<Self> {
        Box::new(Self { angle, boost: true })
    }
}

impl BotBrain for CruiserBrain {
    fn decide(&mut self, _view: &BotView) -> Decision {
        Decision {
            target_angle: self.angle,
            boost: self.boost,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SpawnedFood {
    value: f32,
    pos: Vec2,
    is_static: bool,
}

#[derive(Clone, Default)]
struct SpyTracker {
    spawned: Arc<Mutex<Vec<SpawnedFood>>>,
    consumed: Arc<Mutex<Vec<(FoodId, BotId)>>>,
    killed: Arc<Mutex<Vec<(BotId, BotId)>>>,
    moved: Arc<Mutex<usize>>,
}

impl UpdateTracker for SpyTracker {
    fn food_spawned(&mut self, food: &slither_core::Food) {
        self.spawned.lock().unwrap().push(SpawnedFood {
            value: food.value(),
            pos: food.pos(),
            is_static: food.is_static(),
        });
    }

    fn food_consumed(&mut self, food: &slither_core::Food, by: BotId) {
        self.consumed.lock().unwrap().push((food.id(), by));
    }

    fn bot_killed(&mut self, killer: BotId, victim: BotId) {
        self.killed.lock().unwrap().push((killer, victim));
    }

    fn bot_moved(&mut self, _bot: BotId, _steps: usize) {
        *self.moved.lock().unwrap() += 1;
    }
}

fn arena_config(width: f32, height: f32) -> ArenaConfig {
    ArenaConfig {
        world_width: width,
        world_height: height,
        static_food_count: 0,
        food_lifetime_ticks: 5_000,
        snake_consume_range: 1.5,
        stats_interval: 0,
        worker_threads: 2,
        rng_seed: Some(0x51AB),
        ..ArenaConfig::default()
    }
}

#[test]
fn single_bot_cruises_in_a_straight_line() {
    let config = arena_config(60.0, 60.0);
    let step = config.snake_distance_per_step;
    let mut field = Field::new(config, Box::new(SpyTracker::default())).expect("field");
    let id = field
        .admit_bot_at("cruiser", CruiserBrain::ahead(0.0), Vec2::new(10.0, 30.0), 0.0, 1.0)
        .expect("admit");

    for _ in 0..100 {
        field.step().expect("step");
    }

    let snake = field.snake(id).expect("snake");
    assert!((snake.mass() - 1.0).abs() < 1e-6, "mass must not change");
    assert_eq!(snake.segment_count(), 2);
    let head = snake.head();
    // 100 steps straight along +x, wrapped into the 60-unit world.
    let expected_x = (10.0 + 100.0 * step).rem_euclid(60.0);
    assert!((head.x - expected_x).abs() < 1e-2, "head at {head:?}");
    assert!((head.y - 30.0).abs() < 1e-2, "head at {head:?}");
}

#[test]
fn straight_line_food_collection() {
    let spy = SpyTracker::default();
    let consumed = spy.consumed.clone();
    let mut field = Field::new(arena_config(60.0, 60.0), Box::new(spy)).expect("field");
    let id = field
        .admit_bot_at("eater", CruiserBrain::ahead(0.0), Vec2::new(0.0, 0.0), 0.0, 1.0)
        .expect("admit");
    for i in 1..=5 {
        field.spawn_food_at(Vec2::new(5.0 * i as f32, 0.0), 1.0);
    }

    for _ in 0..40 {
        field.step().expect("step");
    }

    let snake = field.snake(id).expect("snake");
    assert!((snake.mass() - 6.0).abs() < 1e-4, "mass is {}", snake.mass());
    assert_eq!(field.food_count(), 0, "all five items must be gone");
    let consumed = consumed.lock().unwrap();
    assert_eq!(consumed.len(), 5);
    assert!(consumed.iter().all(|&(_, by)| by == id));
}

#[test]
fn food_is_consumed_across_the_seam() {
    let spy = SpyTracker::default();
    let consumed = spy.consumed.clone();
    let mut field = Field::new(arena_config(10.0, 10.0), Box::new(spy)).expect("field");
    let id = field
        .admit_bot_at("seam", CruiserBrain::ahead(0.0), Vec2::new(9.5, 5.0), 0.0, 1.0)
        .expect("admit");
    field.spawn_food_at(Vec2::new(0.5, 5.0), 1.0);

    for _ in 0..5 {
        field.step().expect("step");
    }

    let snake = field.snake(id).expect("snake");
    assert!((snake.mass() - 2.0).abs() < 1e-4, "food across the seam not eaten");
    assert_eq!(field.food_count(), 0);
    assert_eq!(consumed.lock().unwrap().len(), 1);
}

#[test]
fn larger_snake_kills_smaller_on_body_contact() {
    let spy = SpyTracker::default();
    let killed = spy.killed.clone();
    let spawned = spy.spawned.clone();
    let mut field = Field::new(arena_config(60.0, 60.0), Box::new(spy)).expect("field");
    let hunter = field
        .admit_bot_at("hunter", CruiserBrain::ahead(0.0), Vec2::new(10.0, 10.0), 0.0, 10.0)
        .expect("admit");
    let prey = field
        .admit_bot_at("prey", CruiserBrain::ahead(0.0), Vec2::new(9.6, 10.3), 0.0, 2.0)
        .expect("admit");

    for _ in 0..5 {
        field.step().expect("step");
        if !killed.lock().unwrap().is_empty() {
            break;
        }
    }

    let kills = killed.lock().unwrap();
    assert_eq!(kills.as_slice(), &[(hunter, prey)]);
    assert_eq!(field.bot_count(), 1);

    // The kill itself must not change the killer's mass.
    let snake = field.snake(hunter).expect("snake");
    assert!((snake.mass() - 10.0).abs() < 1e-4);

    // The victim's mass times the conversion factor lands as dynamic food
    // near its former body.
    let config = field.config();
    let expected = 2.0 * config.snake_conversion_factor;
    let drops: Vec<SpawnedFood> = spawned.lock().unwrap().clone();
    assert!(drops.iter().all(|f| !f.is_static));
    let total: f32 = drops.iter().map(|f| f.value).sum();
    assert!((total - expected).abs() < 1e-3, "dropped {total}, expected {expected}");
    for drop in &drops {
        assert!((7.0..16.0).contains(&drop.pos.x), "drop strayed to {:?}", drop.pos);
        assert!((8.0..13.0).contains(&drop.pos.y), "drop strayed to {:?}", drop.pos);
    }

    // The segment map holds exactly the survivors' segments.
    assert_eq!(
        field.indexed_segment_count(),
        field.snake(hunter).expect("snake").segment_count()
    );
}

#[test]
fn kill_is_rejected_below_the_mass_ratio() {
    let spy = SpyTracker::default();
    let killed = spy.killed.clone();
    let mut field = Field::new(arena_config(60.0, 60.0), Box::new(spy)).expect("field");
    field
        .admit_bot_at("barely", CruiserBrain::ahead(0.0), Vec2::new(10.0, 10.0), 0.0, 2.5)
        .expect("admit");
    field
        .admit_bot_at("peer", CruiserBrain::ahead(0.0), Vec2::new(9.8, 10.2), 0.0, 2.0)
        .expect("admit");

    for _ in 0..4 {
        field.step().expect("step");
    }

    // 2.5 > 2.0 * 1.5 is false, so contact never kills.
    assert!(killed.lock().unwrap().is_empty());
    assert_eq!(field.bot_count(), 2);
}

#[test]
fn boost_starvation_is_a_self_kill() {
    let spy = SpyTracker::default();
    let killed = spy.killed.clone();
    let spawned = spy.spawned.clone();
    let config = arena_config(60.0, 60.0);
    let loss_factor = config.snake_boost_loss_factor;
    let conversion = config.snake_conversion_factor;
    let mut field = Field::new(config, Box::new(spy)).expect("field");
    let id = field
        .admit_bot_at("burnout", CruiserBrain::boosting(0.0), Vec2::new(30.0, 30.0), 0.0, 4.1)
        .expect("admit");

    field.step().expect("step");

    let kills = killed.lock().unwrap();
    assert_eq!(kills.as_slice(), &[(id, id)], "killer must equal victim");
    assert_eq!(field.bot_count(), 0);

    // Shed boost mass plus the converted remainder all land as food.
    let loss = loss_factor * 4.1;
    let expected = loss + (4.1 - loss) * conversion;
    let total: f32 = spawned.lock().unwrap().iter().map(|f| f.value).sum();
    assert!((total - expected).abs() < 1e-3, "dropped {total}, expected {expected}");
}

#[test]
fn every_surviving_bot_reports_movement_each_tick() {
    let spy = SpyTracker::default();
    let moved = spy.moved.clone();
    let mut field = Field::new(arena_config(60.0, 60.0), Box::new(spy)).expect("field");
    field
        .admit_bot_at("a", CruiserBrain::ahead(0.0), Vec2::new(10.0, 10.0), 0.0, 1.0)
        .expect("admit");
    field
        .admit_bot_at("b", CruiserBrain::ahead(90.0), Vec2::new(40.0, 40.0), 90.0, 1.0)
        .expect("admit");

    for _ in 0..10 {
        field.step().expect("step");
    }

    assert_eq!(*moved.lock().unwrap(), 20);
}
