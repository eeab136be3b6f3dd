use crate::position::Position;

/// 2x3 affine matrix. `apply` maps `(x, y)` to
/// `(a*x + b*y + tx, c*x + d*y + ty)`.
///
/// The `then_*` builders append an operation: `m.then_scale(2.0, 2.0)` first
/// applies `m` and scales the result.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine2 {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for Affine2 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine2 {
    pub const IDENTITY: Affine2 = Affine2 {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub fn translation(tx: f64, ty: f64) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    /// Returns the transform that applies `self`, then `next`.
    pub fn then(self, next: Affine2) -> Self {
        Self {
            a: next.a * self.a + next.b * self.c,
            b: next.a * self.b + next.b * self.d,
            c: next.c * self.a + next.d * self.c,
            d: next.c * self.b + next.d * self.d,
            tx: next.a * self.tx + next.b * self.ty + next.tx,
            ty: next.c * self.tx + next.d * self.ty + next.ty,
        }
    }

    pub fn then_translate(self, tx: f64, ty: f64) -> Self {
        self.then(Self::translation(tx, ty))
    }

    pub fn then_scale(self, sx: f64, sy: f64) -> Self {
        self.then(Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        })
    }

    pub fn then_rotate(self, radians: f64) -> Self {
        let (sin, cos) = radians.sin_cos();
        self.then(Self {
            a: cos,
            b: -sin,
            c: sin,
            d: cos,
            tx: 0.0,
            ty: 0.0,
        })
    }

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.b * y + self.tx,
            self.c * x + self.d * y + self.ty,
        )
    }

    pub fn determinant(&self) -> f64 {
        self.a * self.d - self.b * self.c
    }

    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det != 0.0
    }

    pub fn inverted(&self) -> Option<Self> {
        if !self.is_invertible() {
            return None;
        }
        let det = self.determinant();
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Self {
            a,
            b,
            c,
            d,
            tx: -(a * self.tx + b * self.ty),
            ty: -(c * self.tx + d * self.ty),
        })
    }
}

/// Axis-aligned world rectangle, inclusive on every edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Rect {
    pub fn around(center: Position, half_width: f64, half_height: f64) -> Self {
        Self {
            min_x: center.x - half_width,
            min_y: center.y - half_height,
            max_x: center.x + half_width,
            max_y: center.y + half_height,
        }
    }

    pub fn contains(&self, point: Position) -> bool {
        point.x >= self.min_x
            && point.x <= self.max_x
            && point.y >= self.min_y
            && point.y <= self.max_y
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }
}

/// Convex polygon anchored at `position`; vertices are relative to it and
/// listed in winding order.
#[derive(Debug, Clone, PartialEq)]
pub struct ConvexPolygon {
    position: Position,
    points: Vec<Position>,
}

impl ConvexPolygon {
    pub fn new(position: Position, points: Vec<Position>) -> Self {
        Self { position, points }
    }

    pub fn rectangle(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self::new(
            Position::new(x, y),
            vec![
                Position::new(0.0, 0.0),
                Position::new(width, 0.0),
                Position::new(width, height),
                Position::new(0.0, height),
            ],
        )
    }

    /// Isometric diamond inscribed in half of a `tile_width` x `tile_height`
    /// tile, matching the footprint of placed map tiles.
    pub fn tile_diamond(position: Position, tile_width: u32, tile_height: u32) -> Self {
        let half_w = (tile_width / 2) as f64;
        let half_h = (tile_height / 2) as f64;
        Self::new(
            position,
            vec![
                Position::new(half_w / 2.0, 0.0),
                Position::new(half_w, half_h / 2.0),
                Position::new(half_w / 2.0, half_h),
                Position::new(0.0, half_h / 2.0),
            ],
        )
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn set_position(&mut self, position: Position) {
        self.position = position;
    }

    pub fn world_points(&self) -> impl Iterator<Item = Position> + '_ {
        self.points.iter().map(|point| Position {
            x: self.position.x + point.x,
            y: self.position.y + point.y,
        })
    }

    pub fn bounds(&self) -> Rect {
        let mut bounds = Rect {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        };
        for point in self.world_points() {
            bounds.min_x = bounds.min_x.min(point.x);
            bounds.min_y = bounds.min_y.min(point.y);
            bounds.max_x = bounds.max_x.max(point.x);
            bounds.max_y = bounds.max_y.max(point.y);
        }
        if self.points.is_empty() {
            return Rect::around(self.position, 0.0, 0.0);
        }
        bounds
    }

    pub fn distance_to(&self, other: &ConvexPolygon) -> f64 {
        self.position.distance_to(other.position)
    }

    /// Separating-axis test. Touching edges count as intersecting.
    pub fn is_intersecting(&self, other: &ConvexPolygon) -> bool {
        if self.points.len() < 2 || other.points.len() < 2 {
            return false;
        }
        !has_separating_axis(self, other) && !has_separating_axis(other, self)
    }
}

fn has_separating_axis(edges_of: &ConvexPolygon, against: &ConvexPolygon) -> bool {
    let points: Vec<Position> = edges_of.world_points().collect();
    for (index, start) in points.iter().enumerate() {
        let end = points[(index + 1) % points.len()];
        let axis = Position::new(-(end.y - start.y), end.x - start.x);
        if axis.x == 0.0 && axis.y == 0.0 {
            continue;
        }
        let (min_a, max_a) = project(edges_of, axis);
        let (min_b, max_b) = project(against, axis);
        if max_a < min_b || max_b < min_a {
            return true;
        }
    }
    false
}

fn project(polygon: &ConvexPolygon, axis: Position) -> (f64, f64) {
    polygon
        .world_points()
        .map(|point| point.x * axis.x + point.y * axis.y)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), value| {
            (min.min(value), max.max(value))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: (f64, f64), right: (f64, f64)) -> bool {
        (left.0 - right.0).abs() < 1e-9 && (left.1 - right.1).abs() < 1e-9
    }

    #[test]
    fn then_applies_operations_in_append_order() {
        let m = Affine2::IDENTITY
            .then_translate(1.0, 0.0)
            .then_scale(2.0, 2.0);
        assert!(approx_eq(m.apply(1.0, 1.0), (4.0, 2.0)));

        let r = Affine2::IDENTITY
            .then_scale(2.0, 2.0)
            .then_translate(1.0, 0.0);
        assert!(approx_eq(r.apply(1.0, 1.0), (3.0, 2.0)));
    }

    #[test]
    fn quarter_turn_rotates_x_axis_onto_y_axis() {
        let m = Affine2::IDENTITY.then_rotate(std::f64::consts::FRAC_PI_2);
        assert!(approx_eq(m.apply(1.0, 0.0), (0.0, 1.0)));
    }

    #[test]
    fn inverse_undoes_composed_transform() {
        let m = Affine2::IDENTITY
            .then_translate(-30.0, 12.0)
            .then_scale(1.5, 1.5)
            .then_rotate(0.7)
            .then_translate(320.0, 180.0);
        let inverse = m.inverted().expect("invertible");
        let (sx, sy) = m.apply(17.0, -4.0);
        assert!(approx_eq(inverse.apply(sx, sy), (17.0, -4.0)));
    }

    #[test]
    fn zero_scale_is_not_invertible() {
        let m = Affine2::IDENTITY.then_scale(0.0, 0.0);
        assert!(m.inverted().is_none());
    }

    #[test]
    fn overlapping_rectangles_intersect() {
        let a = ConvexPolygon::rectangle(0.0, 0.0, 10.0, 10.0);
        let b = ConvexPolygon::rectangle(5.0, 5.0, 10.0, 10.0);
        let c = ConvexPolygon::rectangle(20.0, 0.0, 5.0, 5.0);
        assert!(a.is_intersecting(&b));
        assert!(b.is_intersecting(&a));
        assert!(!a.is_intersecting(&c));
    }

    #[test]
    fn diamond_corner_gap_is_not_an_intersection() {
        let diamond = ConvexPolygon::tile_diamond(Position::new(0.0, 0.0), 64, 32);
        // Top-left corner of the diamond's bounding box lies outside the diamond.
        let probe = ConvexPolygon::rectangle(0.0, 0.0, 2.0, 2.0);
        assert!(!diamond.is_intersecting(&probe));

        let centered = ConvexPolygon::rectangle(15.0, 7.0, 2.0, 2.0);
        assert!(diamond.is_intersecting(&centered));
    }

    #[test]
    fn bounds_cover_all_vertices() {
        let diamond = ConvexPolygon::tile_diamond(Position::new(10.0, 20.0), 64, 32);
        let bounds = diamond.bounds();
        assert_eq!(bounds.min_x, 10.0);
        assert_eq!(bounds.max_x, 42.0);
        assert_eq!(bounds.min_y, 20.0);
        assert_eq!(bounds.max_y, 36.0);
        assert_eq!(bounds.width(), 32.0);
        assert_eq!(bounds.height(), 16.0);
    }

    #[test]
    fn rect_contains_is_inclusive() {
        let rect = Rect::around(Position::new(0.0, 0.0), 5.0, 5.0);
        assert!(rect.contains(Position::new(5.0, -5.0)));
        assert!(!rect.contains(Position::new(5.1, 0.0)));
    }
}
