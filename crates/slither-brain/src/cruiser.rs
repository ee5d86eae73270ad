//! Fixed-heading brain, mostly useful as a predictable opponent.

use slither_core::{BotBrain, BotView, Decision};

/// Holds a constant course; never reacts to the surroundings.
#[derive(Debug, Clone)]
pub struct CruiserBrain {
    target_angle: f32,
    boost: bool,
}

impl CruiserBrain {
    /// Cruise toward `target_angle` degrees without boosting.
    #[must_use]
    pub fn new(target_angle: f32) -> Self {
        Self {
            target_angle,
            boost: false,
        }
    }

    /// Same course, but boost every frame.
    #[must_use]
    pub fn boosting(target_angle: f32) -> Self {
        Self {
            target_angle,
            boost: true,
        }
    }
}

impl BotBrain for CruiserBrain {
    fn decide(&mut self, _view: &BotView) -> Decision {
        Decision {
            target_angle: self.target_angle,
            boost: self.boost,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slither_core::{Frame, Vec2};

    fn empty_view() -> BotView {
        BotView {
            head: Vec2::new(10.0, 10.0),
            heading: 45.0,
            mass: 1.0,
            segment_radius: 0.5,
            world: Vec2::new(60.0, 60.0),
            frame: Frame::zero(),
            food: Vec::new(),
            snakes: Vec::new(),
        }
    }

    #[test]
    fn holds_its_course() {
        let mut brain = CruiserBrain::new(30.0);
        let decision = brain.decide(&empty_view());
        assert_eq!(decision.target_angle, 30.0);
        assert!(!decision.boost);

        let mut brain = CruiserBrain::boosting(-90.0);
        assert!(brain.decide(&empty_view()).boost);
    }
}
