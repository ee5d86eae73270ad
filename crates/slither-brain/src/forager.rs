//! Greedy forager: chases the most rewarding food, runs from bigger snakes.

use slither_core::{BotBrain, BotView, Decision, Vec2};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Cruising,
    Foraging,
    Fleeing,
}

/// Steers toward the highest-scoring food sighting; when a segment of a
/// larger snake comes too close, turns away from it and boosts.
#[derive(Debug, Clone)]
pub struct ForagerBrain {
    /// Multiple of the combined radii at which a larger segment counts as a
    /// threat.
    avoid_factor: f32,
    mode: Mode,
    pending_logs: Vec<String>,
}

impl Default for ForagerBrain {
    fn default() -> Self {
        Self::new(4.0)
    }
}

impl ForagerBrain {
    #[must_use]
    pub fn new(avoid_factor: f32) -> Self {
        Self {
            avoid_factor,
            mode: Mode::Cruising,
            pending_logs: Vec::new(),
        }
    }

    fn enter(&mut self, mode: Mode) {
        if self.mode != mode {
            self.mode = mode;
            self.pending_logs.push(format!("mode: {mode:?}"));
        }
    }

    fn angle_of(offset: Vec2) -> f32 {
        offset.y.atan2(offset.x).to_degrees()
    }

    fn nearest_threat(&self, view: &BotView) -> Option<Vec2> {
        let mut threat: Option<Vec2> = None;
        let mut closest = f32::INFINITY;
        for segment in &view.snakes {
            if segment.radius <= view.segment_radius {
                continue;
            }
            let danger_zone = (segment.radius + view.segment_radius) * self.avoid_factor;
            let distance = segment.offset.length();
            if distance < danger_zone && distance < closest {
                closest = distance;
                threat = Some(segment.offset);
            }
        }
        threat
    }

    fn best_food(view: &BotView) -> Option<Vec2> {
        let mut best: Option<(f32, Vec2)> = None;
        for sighting in &view.food {
            let score = sighting.value / (sighting.offset.length() + 1.0);
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, sighting.offset));
            }
        }
        best.map(|(_, offset)| offset)
    }
}

impl BotBrain for ForagerBrain {
    fn decide(&mut self, view: &BotView) -> Decision {
        if let Some(threat) = self.nearest_threat(view) {
            self.enter(Mode::Fleeing);
            return Decision {
                target_angle: Self::angle_of(-threat),
                boost: true,
            };
        }

        if let Some(target) = Self::best_food(view) {
            self.enter(Mode::Foraging);
            return Decision {
                target_angle: Self::angle_of(target),
                boost: false,
            };
        }

        self.enter(Mode::Cruising);
        Decision {
            target_angle: view.heading,
            boost: false,
        }
    }

    fn log_messages(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slither_core::{BotId, FoodSighting, Frame, SegmentSighting};

    fn base_view() -> BotView {
        BotView {
            head: Vec2::new(30.0, 30.0),
            heading: 10.0,
            mass: 4.0,
            segment_radius: 1.0,
            world: Vec2::new(60.0, 60.0),
            frame: Frame::zero(),
            food: Vec::new(),
            snakes: Vec::new(),
        }
    }

    #[test]
    fn keeps_heading_when_nothing_is_visible() {
        let mut brain = ForagerBrain::default();
        let decision = brain.decide(&base_view());
        assert_eq!(decision.target_angle, 10.0);
        assert!(!decision.boost);
    }

    #[test]
    fn steers_toward_the_best_food() {
        let mut view = base_view();
        view.food.push(FoodSighting {
            offset: Vec2::new(10.0, 0.0),
            value: 1.0,
        });
        view.food.push(FoodSighting {
            offset: Vec2::new(0.0, 2.0),
            value: 1.0,
        });
        let mut brain = ForagerBrain::default();
        let decision = brain.decide(&view);
        // Same value, but the second item is closer: steer straight up.
        assert!((decision.target_angle - 90.0).abs() < 1e-3);
        assert!(!decision.boost);
    }

    #[test]
    fn flees_larger_segments_and_boosts() {
        let mut view = base_view();
        view.food.push(FoodSighting {
            offset: Vec2::new(5.0, 0.0),
            value: 3.0,
        });
        view.snakes.push(SegmentSighting {
            offset: Vec2::new(3.0, 0.0),
            radius: 4.0,
            bot: BotId::default(),
        });
        let mut brain = ForagerBrain::default();
        let decision = brain.decide(&view);
        assert!(decision.boost);
        // Away from the threat on +x means steering toward 180 degrees.
        assert!((decision.target_angle.abs() - 180.0).abs() < 1e-3);
    }

    #[test]
    fn ignores_smaller_segments() {
        let mut view = base_view();
        view.snakes.push(SegmentSighting {
            offset: Vec2::new(2.0, 0.0),
            radius: 0.5,
            bot: BotId::default(),
        });
        let mut brain = ForagerBrain::default();
        let decision = brain.decide(&view);
        assert!(!decision.boost);
    }

    #[test]
    fn logs_mode_transitions_once() {
        let mut view = base_view();
        view.food.push(FoodSighting {
            offset: Vec2::new(5.0, 0.0),
            value: 1.0,
        });
        let mut brain = ForagerBrain::default();
        brain.decide(&view);
        brain.decide(&view);
        let logs = brain.log_messages();
        assert_eq!(logs.len(), 1);
        assert!(logs[0].contains("Foraging"));
        assert!(brain.log_messages().is_empty());
    }
}
