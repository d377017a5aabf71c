//! Curve-based mouse controller
//!
//! Moves the pointer along an eased path instead of teleporting, which keeps
//! hover states and drag targets behaving the way they do for a human hand.
//! Mouse handlers and vision clicks use this as the smooth-movement default.

use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::driver::{DriverError, MouseButton, PlatformDriver};

/// Smooth pointer movement over a [`PlatformDriver`]
pub struct MouseController {
    driver: Arc<dyn PlatformDriver>,
    steps: u32,
    step_delay: Duration,
    jitter_px: f64,
}

impl MouseController {
    pub fn new(driver: Arc<dyn PlatformDriver>) -> Self {
        Self {
            driver,
            steps: 24,
            step_delay: Duration::from_millis(8),
            jitter_px: 1.5,
        }
    }

    /// Number of interpolation steps per move
    pub fn with_steps(mut self, steps: u32) -> Self {
        self.steps = steps.max(1);
        self
    }

    /// Delay between interpolation steps
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    /// Maximum perpendicular jitter applied to intermediate points
    pub fn with_jitter(mut self, jitter_px: f64) -> Self {
        self.jitter_px = jitter_px;
        self
    }

    /// Move the pointer to `(x, y)` along an eased path.
    ///
    /// Intermediate points carry a little jitter; the final point is exact.
    pub async fn move_smooth(&self, x: i32, y: i32) -> Result<(), DriverError> {
        let (sx, sy) = self.driver.mouse_position().await?;
        debug!(from_x = sx, from_y = sy, to_x = x, to_y = y, steps = self.steps, "move_smooth");

        if (sx, sy) == (x, y) {
            return Ok(());
        }

        for step in 1..self.steps {
            let t = step as f64 / self.steps as f64;
            // smoothstep easing: slow in, slow out
            let eased = t * t * (3.0 - 2.0 * t);
            let (jx, jy): (f64, f64) = {
                let mut rng = rand::rng();
                (
                    rng.random_range(-self.jitter_px..=self.jitter_px),
                    rng.random_range(-self.jitter_px..=self.jitter_px),
                )
            };
            let px = sx as f64 + (x - sx) as f64 * eased + jx;
            let py = sy as f64 + (y - sy) as f64 * eased + jy;
            self.driver.mouse_move(px.round() as i32, py.round() as i32).await?;
            tokio::time::sleep(self.step_delay).await;
        }

        self.driver.mouse_move(x, y).await
    }

    /// Instant move, bypassing the curve
    pub async fn move_direct(&self, x: i32, y: i32) -> Result<(), DriverError> {
        self.driver.mouse_move(x, y).await
    }

    /// Smooth-move to `(x, y)` and click there
    pub async fn click_at(&self, x: i32, y: i32, button: MouseButton) -> Result<(), DriverError> {
        self.move_smooth(x, y).await?;
        self.driver.click(button).await
    }

    /// Smooth-move to `(x, y)` and double-click there
    pub async fn double_click_at(&self, x: i32, y: i32, button: MouseButton) -> Result<(), DriverError> {
        self.move_smooth(x, y).await?;
        self.driver.double_click(button).await
    }

    /// Press at the start point, sweep to the end point, release
    pub async fn drag(&self, from: (i32, i32), to: (i32, i32), button: MouseButton) -> Result<(), DriverError> {
        self.move_smooth(from.0, from.1).await?;
        self.driver.mouse_down(button).await?;
        self.move_smooth(to.0, to.1).await?;
        self.driver.mouse_up(button).await
    }
}
