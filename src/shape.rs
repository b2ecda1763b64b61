use geo_types::Coord;

/// Kind of a normalized shape.
///
/// `None` means no part was ever appended, or the source geometry was
/// incompatible with the requested layer kind.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum ShapeKind {
    #[default]
    None,
    Point,
    Line,
    Polygon,
}

/// Axis-aligned bounding rectangle, tracked incrementally as points are
/// appended to a shape.
#[derive(Clone, Copy, PartialEq, Debug, Default)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Bounds {
        Bounds {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    /// A rectangle covering exactly one point.
    pub fn point(x: f64, y: f64) -> Bounds {
        Bounds::new(x, y, x, y)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, c: Coord<f64>) -> bool {
        c.x >= self.min_x && c.x <= self.max_x && c.y >= self.min_y && c.y <= self.max_y
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        self.min_x <= other.max_x
            && self.max_x >= other.min_x
            && self.min_y <= other.max_y
            && self.max_y >= other.min_y
    }

    /// Shrink this rectangle to its intersection with `other`.
    pub fn intersect(&mut self, other: &Bounds) {
        self.min_x = self.min_x.max(other.min_x);
        self.min_y = self.min_y.max(other.min_y);
        self.max_x = self.max_x.min(other.max_x);
        self.max_y = self.max_y.min(other.max_y);
    }

    fn expand(&mut self, c: Coord<f64>) {
        if c.x < self.min_x {
            self.min_x = c.x;
        }
        if c.x > self.max_x {
            self.max_x = c.x;
        }
        if c.y < self.min_y {
            self.min_y = c.y;
        }
        if c.y > self.max_y {
            self.max_y = c.y;
        }
    }
}

/// A normalized geometry: a kind, an ordered sequence of parts (each an
/// ordered point sequence) and a bounding box maintained as points are
/// appended, plus the attribute values and addressing metadata filled in
/// by the cursor that produced it.
#[derive(Clone, PartialEq, Debug)]
pub struct Shape {
    pub kind: ShapeKind,
    parts: Vec<Vec<Coord<f64>>>,
    bounds: Bounds,
    /// Attribute values parallel to the cursor's requested field list.
    pub values: Vec<String>,
    /// Source-assigned stable identifier.
    pub fid: i64,
    /// 0-based offset within the current filtered result set, or `None`
    /// for direct-by-id fetches.
    pub result_index: Option<usize>,
    /// Stable id of the tile this shape came from; 0 for non-tiled
    /// sources.
    pub tile_id: i64,
}

impl Default for Shape {
    fn default() -> Shape {
        Shape::new()
    }
}

impl Shape {
    pub fn new() -> Shape {
        Shape {
            kind: ShapeKind::None,
            parts: Vec::new(),
            bounds: Bounds::default(),
            values: Vec::new(),
            fid: -1,
            result_index: None,
            tile_id: 0,
        }
    }

    pub fn parts(&self) -> &[Vec<Coord<f64>>] {
        &self.parts
    }

    /// Bounding box of all points across all parts. Meaningless while
    /// the shape is empty.
    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn is_empty(&self) -> bool {
        self.parts.iter().all(|p| p.is_empty())
    }

    /// Start a new, empty part and return its index.
    pub fn add_part(&mut self) -> usize {
        self.parts.push(Vec::new());
        self.parts.len() - 1
    }

    /// Append a whole point sequence as a new part, folding every point
    /// into the bounding box.
    pub fn add_part_from(&mut self, points: Vec<Coord<f64>>) {
        let part = self.add_part();
        for c in points {
            self.push_point(part, c);
        }
    }

    /// Append one point to an existing part. The very first point of the
    /// shape initializes both bounding box corners; every later point
    /// expands them by plain comparison.
    pub fn push_point(&mut self, part: usize, c: Coord<f64>) {
        if self.is_empty() {
            self.bounds = Bounds::point(c.x, c.y);
        } else {
            self.bounds.expand(c);
        }
        self.parts[part].push(c);
    }

    /// Index of the last part, creating one if the shape has none yet.
    pub fn last_part(&mut self) -> usize {
        if self.parts.is_empty() {
            self.add_part()
        } else {
            self.parts.len() - 1
        }
    }

    /// Drop all geometry and values, returning the shape to its
    /// freshly-created state. Called before each new fetch.
    pub fn reset(&mut self) {
        *self = Shape::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_track_every_append() {
        let mut shape = Shape::new();
        let part = shape.add_part();
        shape.push_point(part, Coord { x: 3.0, y: 4.0 });
        assert_eq!(shape.bounds(), Bounds::new(3.0, 4.0, 3.0, 4.0));

        shape.push_point(part, Coord { x: -1.0, y: 10.0 });
        assert_eq!(shape.bounds(), Bounds::new(-1.0, 4.0, 3.0, 10.0));

        let part2 = shape.add_part();
        shape.push_point(part2, Coord { x: 5.0, y: -2.0 });
        let b = shape.bounds();
        assert_eq!(b, Bounds::new(-1.0, -2.0, 5.0, 10.0));

        for p in shape.parts() {
            for c in p {
                assert!(b.min_x <= c.x && c.x <= b.max_x);
                assert!(b.min_y <= c.y && c.y <= b.max_y);
            }
        }
    }

    #[test]
    fn test_bounds_intersection() {
        let mut a = Bounds::new(0.0, 0.0, 10.0, 10.0);
        let b = Bounds::new(5.0, -5.0, 20.0, 8.0);
        assert!(a.intersects(&b));
        a.intersect(&b);
        assert_eq!(a, Bounds::new(5.0, 0.0, 10.0, 8.0));
    }

    #[test]
    fn test_empty_parts_do_not_initialize_bounds() {
        let mut shape = Shape::new();
        shape.add_part();
        shape.add_part();
        assert!(shape.is_empty());
        let part = shape.last_part();
        shape.push_point(part, Coord { x: 7.0, y: 7.0 });
        assert_eq!(shape.bounds(), Bounds::point(7.0, 7.0));
    }
}
