/// Vertical offset that keeps the newest text inside the viewport.
///
/// The offset climbs toward its target by at most `rate` pixels per tick and
/// drops straight to the target when content shrinks below it. A step too
/// small to change the offset at its float precision lands on the target.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrollController {
    current: f32,
    target: f32,
    rate: f32,
}

impl ScrollController {
    pub fn new(rate: f32) -> Self {
        Self {
            current: 0.0,
            target: 0.0,
            rate: rate.max(f32::EPSILON),
        }
    }

    pub fn set_rate(&mut self, rate: f32) {
        self.rate = rate.max(f32::EPSILON);
    }

    pub fn reset(&mut self) {
        self.current = 0.0;
        self.target = 0.0;
    }

    /// Recomputes the target from the laid-out height and moves one tick.
    pub fn update(&mut self, content_height: f32, available_height: f32) -> f32 {
        self.target = (content_height - available_height).max(0.0);
        if self.current < self.target {
            let next = (self.current + self.rate).min(self.target);
            self.current = if next > self.current { next } else { self.target };
        } else {
            self.current = self.target;
        }
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn rate(&self) -> f32 {
        self.rate
    }

    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }
}
