use std::f64::consts::FRAC_PI_4;

/// Absolute world coordinate. Compared exactly; there is no implicit tolerance.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn distance_to(self, other: Position) -> f64 {
        (other.x - self.x).hypot(other.y - self.y)
    }

    /// Scalar used for back-to-front ordering. Larger keys are drawn first.
    pub fn depth_key(self) -> f64 {
        self.x + self.y
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

pub fn cartesian_to_isometric(cartesian: Position, tile_size: f64) -> Position {
    Position {
        x: (cartesian.x - cartesian.y) * (tile_size / 2.0),
        y: (cartesian.x + cartesian.y) * (tile_size / 4.0),
    }
}

pub fn isometric_to_cartesian(isometric: Position, tile_size: f64) -> Position {
    let half = tile_size / 2.0;
    let quarter = tile_size / 4.0;
    if half == 0.0 {
        return Position::new(f64::NAN, f64::NAN);
    }
    let difference = isometric.x / half;
    let sum = isometric.y / quarter;
    Position {
        x: (sum + difference) / 2.0,
        y: (sum - difference) / 2.0,
    }
}

/// Unit-length steps from `from` towards `to`, see [`DelayedPositions`].
pub fn delayed_positions(from: Position, to: Position) -> DelayedPositions {
    DelayedPositions::new(from, to)
}

/// Lazy, finite walk that turns one position jump into per-frame steps.
///
/// Each step moves the current point by a vector of length one towards the
/// target and rounds both axes to the nearest integer. The walk ends once the
/// remaining distance is at most one world unit, so `from == to` yields
/// nothing.
#[derive(Debug, Clone)]
pub struct DelayedPositions {
    current: Position,
    target: Position,
    steps_left: usize,
}

impl DelayedPositions {
    pub fn new(from: Position, to: Position) -> Self {
        let distance = from.distance_to(to);
        let steps_left = if distance.is_finite() {
            (distance.ceil() as usize).saturating_mul(2).saturating_add(2)
        } else {
            0
        };
        Self {
            current: from,
            target: to,
            steps_left,
        }
    }
}

impl Iterator for DelayedPositions {
    type Item = Position;

    fn next(&mut self) -> Option<Self::Item> {
        if self.steps_left == 0 {
            return None;
        }
        let dx = self.target.x - self.current.x;
        let dy = self.target.y - self.current.y;
        let distance = dx.hypot(dy);
        if distance == 0.0 || distance <= 1.0 {
            self.steps_left = 0;
            return None;
        }

        let k = distance.recip();
        self.current = Position {
            x: (self.current.x + dx * k).round(),
            y: (self.current.y + dy * k).round(),
        };
        self.steps_left -= 1;
        Some(self.current)
    }
}

impl std::iter::FusedIterator for DelayedPositions {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Right,
    UpRight,
    Up,
    UpLeft,
    Left,
    DownLeft,
    Down,
    DownRight,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::Right,
        Direction::UpRight,
        Direction::Up,
        Direction::UpLeft,
        Direction::Left,
        Direction::DownLeft,
        Direction::Down,
        Direction::DownRight,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Right => "right",
            Direction::UpRight => "up_right",
            Direction::Up => "up",
            Direction::UpLeft => "up_left",
            Direction::Left => "left",
            Direction::DownLeft => "down_left",
            Direction::Down => "down",
            Direction::DownRight => "down_right",
        }
    }
}

/// Eight-way facing for a movement from `previous` to `next`.
pub fn animation_direction(previous: Position, next: Position) -> Direction {
    let angle = (next.y - previous.y).atan2(next.x - previous.x);
    let sector = (angle / FRAC_PI_4).round() as i64;
    Direction::ALL[sector.rem_euclid(8) as usize]
}
