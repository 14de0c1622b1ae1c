use engine::{clamp_to_extent, InputAction, InputSnapshot, Rect, Vec2, Viewport};

pub(crate) const PLAYER_SPAWN: Vec2 = Vec2 { x: 100.0, y: 100.0 };
pub(crate) const PLAYER_WIDTH: f32 = 40.0;
pub(crate) const PLAYER_HEIGHT: f32 = 60.0;
/// Pixels per simulation tick.
pub(crate) const PLAYER_SPEED: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Facing {
    Front,
    Back,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Player {
    pub(crate) position: Vec2,
    pub(crate) width: f32,
    pub(crate) height: f32,
    pub(crate) speed: f32,
    pub(crate) facing: Facing,
}

impl Default for Player {
    fn default() -> Self {
        Self {
            position: PLAYER_SPAWN,
            width: PLAYER_WIDTH,
            height: PLAYER_HEIGHT,
            speed: PLAYER_SPEED,
            facing: Facing::Front,
        }
    }
}

impl Player {
    pub(crate) fn bounds(&self) -> Rect {
        Rect::new(self.position.x, self.position.y, self.width, self.height)
    }

    /// One tick of movement. Directions apply in the order up, down, left,
    /// right; diagonals are not normalized.
    pub(crate) fn step(&mut self, input: &InputSnapshot, canvas: Viewport) {
        if input.is_down(InputAction::MoveUp) {
            self.position.y -= self.speed;
            self.facing = Facing::Back;
        }
        if input.is_down(InputAction::MoveDown) {
            self.position.y += self.speed;
            self.facing = Facing::Front;
        }
        if input.is_down(InputAction::MoveLeft) {
            self.position.x -= self.speed;
        }
        if input.is_down(InputAction::MoveRight) {
            self.position.x += self.speed;
        }
        self.clamp_to(canvas);
    }

    pub(crate) fn clamp_to(&mut self, canvas: Viewport) {
        self.position.x = clamp_to_extent(self.position.x, canvas.width as f32 - self.width);
        self.position.y = clamp_to_extent(self.position.y, canvas.height as f32 - self.height);
    }
}
