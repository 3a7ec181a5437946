use std::f32::consts::TAU;

use glam::Vec2;

const SPEED: f32 = 90.0;
const PAUSE_EVERY: f32 = 6.0;
const PAUSE_FOR: f32 = 1.5;

/// Scripted local avatar: walks a circle and stops now and then so idle
/// animation changes reach the server too.
#[derive(Debug, Clone)]
pub struct CircleWalk {
    radius: f32,
    angle: f32,
    elapsed: f32,
}

impl CircleWalk {
    pub fn new(radius: f32) -> Self {
        Self {
            radius: radius.max(1.0),
            angle: 0.0,
            elapsed: 0.0,
        }
    }

    pub fn step(&mut self, dt: f32) -> (Vec2, &'static str) {
        self.elapsed += dt;

        let cycle = self.elapsed % (PAUSE_EVERY + PAUSE_FOR);
        let animation = if cycle < PAUSE_EVERY {
            self.angle = (self.angle + SPEED * dt / self.radius) % TAU;
            "walk"
        } else {
            "idle"
        };

        (Vec2::from_angle(self.angle) * self.radius, animation)
    }
}
