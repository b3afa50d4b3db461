use crate::words::Difficulty;

/// Immutable tuning parameters for the duel simulation.
///
/// Distances are in canvas pixels, speeds in pixels per second and
/// durations in milliseconds unless the name says otherwise.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GameConfig {
    /// Horizontal ball speed at level 1
    pub base_speed: f64,
    /// Speed multiplier applied per level
    pub acceleration: f64,
    pub ball_radius: f64,
    /// Velocity scale-up while the ball returns to the wall after a solved word
    pub zoom_multiplier: f64,
    pub max_vertical_velocity: f64,
    /// Launch angles are drawn from [-launch_angle_deg, launch_angle_deg]
    pub launch_angle_deg: f64,
    /// Nominal time for the ball to cross the field at level 1
    pub ball_travel_time_ms: f64,
    /// Lowest fraction of `ball_travel_time_ms` reachable at high levels
    pub travel_time_floor: f64,
    pub travel_time_step_per_level: f64,
    /// Grace period past the expected wall arrival before a forced timeout
    pub time_buffer_ms: f64,
    pub canvas_width: f64,
    pub canvas_height: f64,
    pub wall_thickness: f64,
    /// Center line of player 1's wall (left)
    pub p1_wall_x: f64,
    /// Center line of player 2's wall (right)
    pub p2_wall_x: f64,
    pub center_y: f64,
    pub gravity: f64,
    /// 1.0 = perfectly elastic vertical bounce
    pub bounce_damping: f64,
    /// Extra gap kept between ball edge and wall face after a bounce
    pub wall_clearance: f64,
    /// Combined volleys needed to advance one level
    pub volleys_per_level: u32,
    /// How many recent target words to avoid repeating
    pub recent_word_memory: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            base_speed: 165.0,
            acceleration: 1.05,
            ball_radius: 7.5,
            zoom_multiplier: 3.5,
            max_vertical_velocity: 250.0,
            launch_angle_deg: 20.0,
            ball_travel_time_ms: 3000.0,
            travel_time_floor: 0.65,
            travel_time_step_per_level: 0.01,
            time_buffer_ms: 500.0,
            canvas_width: 1200.0,
            canvas_height: 600.0,
            wall_thickness: 20.0,
            p1_wall_x: 40.0,
            p2_wall_x: 1160.0,
            center_y: 300.0,
            gravity: 0.0,
            bounce_damping: 1.0,
            wall_clearance: 5.0,
            volleys_per_level: 2,
            recent_word_memory: 10,
        }
    }
}

impl GameConfig {
    /// Parse a config from JSON. Missing fields take their default value.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn validate(&self) -> Result<(), String> {
        if !self.base_speed.is_finite() || self.base_speed <= 0.0 {
            return Err("base_speed must be finite and > 0".to_string());
        }
        if !self.acceleration.is_finite() || self.acceleration <= 1.0 {
            return Err("acceleration must be finite and > 1".to_string());
        }
        if !self.ball_radius.is_finite() || self.ball_radius <= 0.0 {
            return Err("ball_radius must be finite and > 0".to_string());
        }
        if !self.zoom_multiplier.is_finite() || self.zoom_multiplier < 1.0 {
            return Err("zoom_multiplier must be finite and >= 1".to_string());
        }
        if !self.max_vertical_velocity.is_finite() || self.max_vertical_velocity < 0.0 {
            return Err("max_vertical_velocity must be finite and >= 0".to_string());
        }
        if !(0.0..90.0).contains(&self.launch_angle_deg) {
            return Err("launch_angle_deg must be in [0, 90)".to_string());
        }
        if !(0.0..=1.0).contains(&self.travel_time_floor) || self.travel_time_floor == 0.0 {
            return Err("travel_time_floor must be in (0, 1]".to_string());
        }
        if self.left_wall_face() + 2.0 * self.ball_radius >= self.right_wall_face() {
            return Err("walls leave no room for the ball".to_string());
        }
        if self.canvas_height <= 2.0 * self.ball_radius {
            return Err("canvas_height must exceed the ball diameter".to_string());
        }
        if !(0.0..=1.0).contains(&self.bounce_damping) {
            return Err("bounce_damping must be in [0, 1]".to_string());
        }
        if self.volleys_per_level == 0 {
            return Err("volleys_per_level must be >= 1".to_string());
        }
        Ok(())
    }

    /// Inner face of player 1's wall; the ball's left edge must stay right of it.
    pub fn left_wall_face(&self) -> f64 {
        self.p1_wall_x + self.wall_thickness / 2.0
    }

    /// Inner face of player 2's wall.
    pub fn right_wall_face(&self) -> f64 {
        self.p2_wall_x - self.wall_thickness / 2.0
    }

    /// `base_speed * acceleration^(level-1)`
    pub fn speed(&self, level: u32) -> f64 {
        let exponent = level.max(1) - 1;
        self.base_speed * self.acceleration.powi(exponent as i32)
    }

    /// Expected crossing time for `level`, shrinking 1% per level down to the floor.
    pub fn ball_travel_time(&self, level: u32) -> f64 {
        let steps = (level.max(1) - 1) as f64;
        let reduction = (1.0 - steps * self.travel_time_step_per_level).max(self.travel_time_floor);
        self.ball_travel_time_ms * reduction
    }

    pub fn difficulty(&self, level: u32) -> Difficulty {
        Difficulty::for_level(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_game_config_is_valid() {
        assert!(GameConfig::default().validate().is_ok());
    }

    #[test]
    fn speed_at_level_one_is_base_speed() {
        let config = GameConfig::default();
        assert!((config.speed(1) - 165.0).abs() < 1e-9);
        assert!((config.speed(3) - 165.0 * 1.05 * 1.05).abs() < 1e-9);
    }

    #[test]
    fn travel_time_bottoms_out_at_floor() {
        let config = GameConfig::default();
        assert!((config.ball_travel_time(1) - 3000.0).abs() < 1e-9);
        assert!((config.ball_travel_time(11) - 2700.0).abs() < 1e-9);
        assert!((config.ball_travel_time(36) - 1950.0).abs() < 1e-9);
        assert!((config.ball_travel_time(500) - 1950.0).abs() < 1e-9);
    }

    #[test]
    fn wall_faces_use_half_thickness() {
        let config = GameConfig::default();
        assert_eq!(config.left_wall_face(), 50.0);
        assert_eq!(config.right_wall_face(), 1150.0);
    }

    #[test]
    fn overlapping_walls_invalid() {
        let config = GameConfig {
            p1_wall_x: 600.0,
            p2_wall_x: 610.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_accelerating_ball_invalid() {
        let config = GameConfig {
            acceleration: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config = GameConfig::from_json(r#"{"baseSpeed": 200.0, "zoomMultiplier": 2.0}"#).unwrap();
        assert_eq!(config.base_speed, 200.0);
        assert_eq!(config.zoom_multiplier, 2.0);
        assert_eq!(config.canvas_width, 1200.0);
    }
}
