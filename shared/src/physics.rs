//! Ball kinematics for the duel field.
//!
//! Everything here is a pure function of its inputs: a ball goes in, a new
//! ball comes out. Randomness (launch and bounce angles) is drawn from the
//! caller's RNG so server and client can share a seed.

use crate::config::GameConfig;
use crate::side::Side;
use rand::Rng;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "protocol/")]
pub struct Ball {
    pub position: Vec2,
    pub velocity: Velocity,
    pub radius: f64,
    /// Nominal horizontal speed for the level the ball was launched at
    pub speed: f64,
}

impl Ball {
    /// Same ball with both velocity components scaled.
    pub fn scaled(&self, factor: f64) -> Ball {
        Ball {
            velocity: Velocity {
                vx: self.velocity.vx * factor,
                vy: self.velocity.vy * factor,
            },
            ..*self
        }
    }

    /// Side whose wall the ball is currently heading for.
    pub fn heading(&self) -> Option<Side> {
        if self.velocity.vx < 0.0 {
            Some(Side::One)
        } else if self.velocity.vx > 0.0 {
            Some(Side::Two)
        } else {
            None
        }
    }
}

/// Vertical velocity for a random launch angle, clamped to the configured cap.
fn launch_vy(config: &GameConfig, horizontal_speed: f64, rng: &mut impl Rng) -> f64 {
    let max_angle = config.launch_angle_deg;
    let angle = if max_angle > 0.0 {
        rng.gen_range(-max_angle..=max_angle).to_radians()
    } else {
        0.0
    };
    let vy = angle.tan() * horizontal_speed;
    vy.clamp(-config.max_vertical_velocity, config.max_vertical_velocity)
}

/// Fresh ball at the center of the field heading for `target`'s wall.
pub fn init_ball(config: &GameConfig, level: u32, target: Side, rng: &mut impl Rng) -> Ball {
    let speed = config.speed(level);
    Ball {
        position: Vec2 {
            x: config.canvas_width / 2.0,
            y: config.center_y,
        },
        velocity: Velocity {
            vx: target.direction() * speed,
            vy: launch_vy(config, speed, rng),
        },
        radius: config.ball_radius,
        speed,
    }
}

/// Integrate one step of `dt` seconds, reflecting off the top and bottom edges.
pub fn step(config: &GameConfig, ball: &Ball, dt: f64) -> Ball {
    let mut velocity = ball.velocity;
    let mut position = Vec2 {
        x: ball.position.x + velocity.vx * dt,
        y: ball.position.y + velocity.vy * dt,
    };

    if config.gravity != 0.0 {
        position.y += 0.5 * config.gravity * dt * dt;
        velocity.vy += config.gravity * dt;
    }

    let min_y = ball.radius;
    let max_y = config.canvas_height - ball.radius;
    if position.y < min_y {
        position.y = min_y;
        velocity.vy *= -config.bounce_damping;
    } else if position.y > max_y {
        position.y = max_y;
        velocity.vy *= -config.bounce_damping;
    }

    Ball {
        position,
        velocity,
        ..*ball
    }
}

/// The side whose wall the ball's leading edge has reached, if any.
pub fn wall_hit(config: &GameConfig, ball: &Ball) -> Option<Side> {
    if ball.position.x - ball.radius <= config.left_wall_face() {
        Some(Side::One)
    } else if ball.position.x + ball.radius >= config.right_wall_face() {
        Some(Side::Two)
    } else {
        None
    }
}

/// Seconds until the ball's edge reaches `side`'s wall, or infinity when
/// it is moving away from (or parallel to) that wall.
pub fn time_to_wall(config: &GameConfig, ball: &Ball, side: Side) -> f64 {
    let vx = ball.velocity.vx;
    match side {
        Side::One => {
            if vx >= 0.0 {
                return f64::INFINITY;
            }
            let distance = ball.position.x - ball.radius - config.left_wall_face();
            (distance / -vx).max(0.0)
        }
        Side::Two => {
            if vx <= 0.0 {
                return f64::INFINITY;
            }
            let distance = config.right_wall_face() - (ball.position.x + ball.radius);
            (distance / vx).max(0.0)
        }
    }
}

/// Send the ball back the other way at `level` speed with a fresh angle.
///
/// The vertical component is re-drawn rather than reflected.
pub fn bounce(config: &GameConfig, ball: &Ball, level: u32, rng: &mut impl Rng) -> Ball {
    let speed = config.speed(level);
    let direction = if ball.velocity.vx > 0.0 { -1.0 } else { 1.0 };
    Ball {
        velocity: Velocity {
            vx: direction * speed,
            vy: launch_vy(config, speed, rng),
        },
        speed,
        ..*ball
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn test_rng() -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(7)
    }

    fn ball_at(x: f64, vx: f64) -> Ball {
        Ball {
            position: Vec2 { x, y: 300.0 },
            velocity: Velocity { vx, vy: 0.0 },
            radius: 7.5,
            speed: vx.abs(),
        }
    }

    #[test]
    fn init_ball_heads_for_target_wall() {
        let config = GameConfig::default();
        let mut rng = test_rng();
        let left = init_ball(&config, 1, Side::One, &mut rng);
        let right = init_ball(&config, 1, Side::Two, &mut rng);
        assert!(left.velocity.vx < 0.0);
        assert!(right.velocity.vx > 0.0);
        assert_eq!(left.position, Vec2 { x: 600.0, y: 300.0 });
        assert!((right.velocity.vx - config.speed(1)).abs() < 1e-9);
    }

    #[test]
    fn launch_angle_stays_within_twenty_degrees() {
        let config = GameConfig::default();
        let mut rng = test_rng();
        let limit = 20f64.to_radians().tan() * config.speed(4) + 1e-9;
        for _ in 0..500 {
            let ball = init_ball(&config, 4, Side::Two, &mut rng);
            assert!(ball.velocity.vy.abs() <= limit);
        }
    }

    #[test]
    fn vertical_velocity_is_clamped() {
        let config = GameConfig {
            max_vertical_velocity: 10.0,
            ..Default::default()
        };
        let mut rng = test_rng();
        for _ in 0..200 {
            let ball = init_ball(&config, 30, Side::One, &mut rng);
            assert!(ball.velocity.vy.abs() <= 10.0);
        }
    }

    #[test]
    fn step_integrates_linearly() {
        let config = GameConfig::default();
        let mut ball = ball_at(600.0, 100.0);
        ball.velocity.vy = -40.0;
        let next = step(&config, &ball, 0.5);
        assert!((next.position.x - 650.0).abs() < 1e-9);
        assert!((next.position.y - 280.0).abs() < 1e-9);
        assert_eq!(next.velocity, ball.velocity);
    }

    #[test]
    fn step_reflects_off_top_edge() {
        let config = GameConfig::default();
        let mut ball = ball_at(600.0, 100.0);
        ball.position.y = 10.0;
        ball.velocity.vy = -100.0;
        let next = step(&config, &ball, 0.1);
        assert_eq!(next.position.y, ball.radius);
        assert_eq!(next.velocity.vy, 100.0);
    }

    #[test]
    fn step_reflects_off_bottom_edge_with_damping() {
        let config = GameConfig {
            bounce_damping: 0.5,
            ..Default::default()
        };
        let mut ball = ball_at(600.0, 100.0);
        ball.position.y = 590.0;
        ball.velocity.vy = 100.0;
        let next = step(&config, &ball, 0.1);
        assert_eq!(next.position.y, 600.0 - ball.radius);
        assert_eq!(next.velocity.vy, -50.0);
    }

    #[test]
    fn wall_hit_uses_ball_edge() {
        let config = GameConfig::default();
        // left face is at 50, right face at 1150
        assert_eq!(wall_hit(&config, &ball_at(57.6, -1.0)), None);
        assert_eq!(wall_hit(&config, &ball_at(57.5, -1.0)), Some(Side::One));
        assert_eq!(wall_hit(&config, &ball_at(1142.4, 1.0)), None);
        assert_eq!(wall_hit(&config, &ball_at(1142.5, 1.0)), Some(Side::Two));
    }

    #[test]
    fn wall_hit_fires_on_first_crossing_tick() {
        let config = GameConfig::default();
        let mut ball = ball_at(600.0, -165.0);
        let mut ticks = 0;
        loop {
            let next = step(&config, &ball, 0.05);
            ticks += 1;
            if next.position.x - next.radius <= config.left_wall_face() {
                assert_eq!(wall_hit(&config, &next), Some(Side::One));
                break;
            }
            assert_eq!(wall_hit(&config, &next), None);
            ball = next;
        }
        assert!(ticks > 1);
    }

    #[test]
    fn time_to_wall_is_infinite_when_moving_away() {
        let config = GameConfig::default();
        let ball = ball_at(600.0, 100.0);
        assert!(time_to_wall(&config, &ball, Side::One).is_infinite());
        let expected = (1150.0 - 607.5) / 100.0;
        assert!((time_to_wall(&config, &ball, Side::Two) - expected).abs() < 1e-9);
    }

    #[test]
    fn bounce_reverses_and_resets_speed() {
        let config = GameConfig::default();
        let mut rng = test_rng();
        let zoomed = ball_at(100.0, -165.0 * 3.5);
        let bounced = bounce(&config, &zoomed, 2, &mut rng);
        assert!(bounced.velocity.vx > 0.0);
        assert!((bounced.velocity.vx - config.speed(2)).abs() < 1e-9);
        assert_eq!(bounced.position, zoomed.position);
    }

    proptest! {
        #[test]
        fn speed_strictly_increases_with_level(level in 1u32..200) {
            let config = GameConfig::default();
            prop_assert!(config.speed(level + 1) > config.speed(level));
            let expected = config.base_speed * config.acceleration.powi(level as i32 - 1);
            prop_assert!((config.speed(level) - expected).abs() < 1e-6);
        }

        #[test]
        fn bounce_always_flips_vx(vx in prop_oneof![-2000.0f64..-0.1, 0.1f64..2000.0], level in 1u32..60, seed in any::<u64>()) {
            let config = GameConfig::default();
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let ball = ball_at(600.0, vx);
            let bounced = bounce(&config, &ball, level, &mut rng);
            prop_assert!(bounced.velocity.vx.signum() == -vx.signum());
            prop_assert!((bounced.velocity.vx.abs() - config.speed(level)).abs() < 1e-9);
        }

        #[test]
        fn no_wall_hit_strictly_between_faces(x in 57.6f64..1142.4) {
            let config = GameConfig::default();
            prop_assert_eq!(wall_hit(&config, &ball_at(x, 1.0)), None);
        }
    }
}
