//! Geometry construction helpers: the degeneracy-aware spatial filter
//! builder and well-known-text conversion for [`Shape`]s.

use geo_types::{
    Coord, Geometry, GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon,
    Point, Polygon,
};

use crate::errors::{Result, ShapeStreamError};
use crate::flatten::{flatten, LayerKind};
use crate::shape::{Bounds, Shape, ShapeKind};

/// Build the geometry handed to the driver's spatial predicate for a
/// search rectangle.
///
/// The predicate is intersection based, so degenerate rectangles must
/// still intersect coincident features: a zero-width, zero-height
/// rectangle becomes a point, a rectangle flat in exactly one dimension
/// becomes a two-point line, and anything else a closed rectangular
/// ring.
pub fn spatial_filter_geometry(rect: &Bounds) -> Geometry<f64> {
    if rect.min_x == rect.max_x && rect.min_y == rect.max_y {
        Geometry::Point(Point::new(rect.min_x, rect.min_y))
    } else if rect.min_x == rect.max_x || rect.min_y == rect.max_y {
        Geometry::LineString(LineString::new(vec![
            Coord {
                x: rect.min_x,
                y: rect.min_y,
            },
            Coord {
                x: rect.max_x,
                y: rect.max_y,
            },
        ]))
    } else {
        let ring = LineString::new(vec![
            Coord {
                x: rect.min_x,
                y: rect.min_y,
            },
            Coord {
                x: rect.max_x,
                y: rect.min_y,
            },
            Coord {
                x: rect.max_x,
                y: rect.max_y,
            },
            Coord {
                x: rect.min_x,
                y: rect.max_y,
            },
            Coord {
                x: rect.min_x,
                y: rect.min_y,
            },
        ]);
        Geometry::Polygon(Polygon::new(ring, vec![]))
    }
}

/// Bounding box of an arbitrary geometry, or `None` when it has no
/// coordinates at all.
pub fn geometry_bounds(geometry: &Geometry<f64>) -> Option<Bounds> {
    fn fold(bounds: &mut Option<Bounds>, c: Coord<f64>) {
        match bounds {
            None => *bounds = Some(Bounds::point(c.x, c.y)),
            Some(b) => {
                b.min_x = b.min_x.min(c.x);
                b.min_y = b.min_y.min(c.y);
                b.max_x = b.max_x.max(c.x);
                b.max_y = b.max_y.max(c.y);
            }
        }
    }

    fn visit(geometry: &Geometry<f64>, bounds: &mut Option<Bounds>) {
        match geometry {
            Geometry::Point(p) => fold(bounds, p.0),
            Geometry::Line(l) => {
                fold(bounds, l.start);
                fold(bounds, l.end);
            }
            Geometry::LineString(ls) => ls.0.iter().for_each(|c| fold(bounds, *c)),
            Geometry::Polygon(p) => {
                p.exterior().0.iter().for_each(|c| fold(bounds, *c));
                for ring in p.interiors() {
                    ring.0.iter().for_each(|c| fold(bounds, *c));
                }
            }
            Geometry::MultiPoint(mp) => mp.iter().for_each(|p| fold(bounds, p.0)),
            Geometry::MultiLineString(mls) => {
                for ls in mls {
                    ls.0.iter().for_each(|c| fold(bounds, *c));
                }
            }
            Geometry::MultiPolygon(mp) => {
                for p in mp {
                    visit(&Geometry::Polygon(p.clone()), bounds);
                }
            }
            Geometry::GeometryCollection(gc) => gc.iter().for_each(|g| visit(g, bounds)),
            Geometry::Rect(r) => {
                fold(bounds, r.min());
                fold(bounds, r.max());
            }
            Geometry::Triangle(t) => {
                fold(bounds, t.0);
                fold(bounds, t.1);
                fold(bounds, t.2);
            }
        }
    }

    let mut bounds = None;
    visit(geometry, &mut bounds);
    bounds
}

fn push_coords(out: &mut String, points: &[Coord<f64>]) {
    for (i, c) in points.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format!("{} {}", c.x, c.y));
    }
}

/// Serialize a shape to well-known text.
///
/// A one-point POINT shape becomes `POINT`, a multi-point one
/// `MULTIPOINT`; LINE shapes become `LINESTRING` or `MULTILINESTRING`
/// by part count; POLYGON shapes emit every part as a ring of a single
/// `POLYGON` (there is no reliable way to tell interior rings from
/// additional exterior ones). Other shapes are an error.
pub fn shape_to_wkt(shape: &Shape) -> Result<String> {
    let parts = shape.parts();
    match shape.kind {
        ShapeKind::Point if parts.len() == 1 && parts[0].len() == 1 => {
            let c = parts[0][0];
            Ok(format!("POINT ({} {})", c.x, c.y))
        }
        ShapeKind::Point if parts.len() == 1 && parts[0].len() > 1 => {
            let mut out = String::from("MULTIPOINT (");
            for (i, c) in parts[0].iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&format!("({} {})", c.x, c.y));
            }
            out.push(')');
            Ok(out)
        }
        ShapeKind::Line if parts.len() == 1 => {
            let mut out = String::from("LINESTRING (");
            push_coords(&mut out, &parts[0]);
            out.push(')');
            Ok(out)
        }
        ShapeKind::Line if parts.len() > 1 => {
            let mut out = String::from("MULTILINESTRING (");
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('(');
                push_coords(&mut out, part);
                out.push(')');
            }
            out.push(')');
            Ok(out)
        }
        ShapeKind::Polygon => {
            let mut out = String::from("POLYGON (");
            for (i, part) in parts.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('(');
                push_coords(&mut out, part);
                out.push(')');
            }
            out.push(')');
            Ok(out)
        }
        _ => Err(ShapeStreamError::Wkt(
            "shape cannot be represented as WKT".to_owned(),
        )),
    }
}

/// Parse well-known text and flatten the result by the geometry's own
/// kind: point-ish input yields a POINT shape, polygons a POLYGON (with
/// ring closing), everything else a LINE.
pub fn shape_from_wkt(text: &str) -> Result<Shape> {
    let geometry = parse_wkt(text)?;
    let kind = match geometry {
        Geometry::Point(_) | Geometry::MultiPoint(_) => LayerKind::Point,
        Geometry::Polygon(_) | Geometry::MultiPolygon(_) => LayerKind::Polygon,
        _ => LayerKind::Line,
    };
    let mut shape = Shape::new();
    flatten(&geometry, kind, &mut shape)?;
    Ok(shape)
}

/// A small recursive-descent WKT reader covering the 2D geometry types
/// this crate produces and consumes.
pub fn parse_wkt(text: &str) -> Result<Geometry<f64>> {
    let mut p = WktParser { rest: text };
    let geometry = p.geometry()?;
    p.skip_ws();
    if !p.rest.is_empty() {
        return Err(ShapeStreamError::Wkt(format!(
            "trailing input after geometry: `{}`",
            p.rest
        )));
    }
    Ok(geometry)
}

struct WktParser<'a> {
    rest: &'a str,
}

impl<'a> WktParser<'a> {
    fn skip_ws(&mut self) {
        self.rest = self.rest.trim_start();
    }

    fn keyword(&mut self) -> Result<String> {
        self.skip_ws();
        let end = self
            .rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(self.rest.len());
        if end == 0 {
            return Err(ShapeStreamError::Wkt(format!(
                "expected geometry keyword at `{}`",
                self.rest
            )));
        }
        let word = self.rest[..end].to_ascii_uppercase();
        self.rest = &self.rest[end..];
        Ok(word)
    }

    fn consume(&mut self, token: char) -> Result<()> {
        self.skip_ws();
        if self.rest.starts_with(token) {
            self.rest = &self.rest[token.len_utf8()..];
            Ok(())
        } else {
            Err(ShapeStreamError::Wkt(format!(
                "expected `{token}` at `{}`",
                self.rest
            )))
        }
    }

    fn peek(&mut self, token: char) -> bool {
        self.skip_ws();
        self.rest.starts_with(token)
    }

    /// True (and consumed) when the next keyword is EMPTY.
    fn empty(&mut self) -> bool {
        self.skip_ws();
        let upper = self.rest.get(..5).map(|s| s.to_ascii_uppercase());
        if upper.as_deref() == Some("EMPTY") {
            self.rest = &self.rest[5..];
            true
        } else {
            false
        }
    }

    fn number(&mut self) -> Result<f64> {
        self.skip_ws();
        let end = self
            .rest
            .find(|c: char| !matches!(c, '0'..='9' | '-' | '+' | '.' | 'e' | 'E'))
            .unwrap_or(self.rest.len());
        let value = self.rest[..end]
            .parse::<f64>()
            .map_err(|_| ShapeStreamError::Wkt(format!("expected number at `{}`", self.rest)))?;
        self.rest = &self.rest[end..];
        Ok(value)
    }

    fn coord(&mut self) -> Result<Coord<f64>> {
        let x = self.number()?;
        let y = self.number()?;
        Ok(Coord { x, y })
    }

    /// `( x y, x y, ... )`
    fn coord_seq(&mut self) -> Result<Vec<Coord<f64>>> {
        if self.empty() {
            return Ok(Vec::new());
        }
        self.consume('(')?;
        let mut coords = vec![self.coord()?];
        while self.peek(',') {
            self.consume(',')?;
            coords.push(self.coord()?);
        }
        self.consume(')')?;
        Ok(coords)
    }

    /// `( (seq), (seq), ... )`
    fn seq_list(&mut self) -> Result<Vec<Vec<Coord<f64>>>> {
        if self.empty() {
            return Ok(Vec::new());
        }
        self.consume('(')?;
        let mut seqs = vec![self.coord_seq()?];
        while self.peek(',') {
            self.consume(',')?;
            seqs.push(self.coord_seq()?);
        }
        self.consume(')')?;
        Ok(seqs)
    }

    fn polygon(&mut self) -> Result<Polygon<f64>> {
        let mut rings = self.seq_list()?.into_iter().map(LineString::new);
        let exterior = rings.next().unwrap_or_else(|| LineString::new(Vec::new()));
        Ok(Polygon::new(exterior, rings.collect()))
    }

    fn geometry(&mut self) -> Result<Geometry<f64>> {
        let keyword = self.keyword()?;
        match keyword.as_str() {
            "POINT" => {
                if self.empty() {
                    return Err(ShapeStreamError::Wkt("empty point".to_owned()));
                }
                self.consume('(')?;
                let c = self.coord()?;
                self.consume(')')?;
                Ok(Geometry::Point(Point::from(c)))
            }
            "MULTIPOINT" => {
                // Accept both `(1 2,3 4)` and `((1 2),(3 4))`.
                if self.empty() {
                    return Ok(Geometry::MultiPoint(MultiPoint::new(Vec::new())));
                }
                self.consume('(')?;
                let mut points = Vec::new();
                loop {
                    let c = if self.peek('(') {
                        self.consume('(')?;
                        let c = self.coord()?;
                        self.consume(')')?;
                        c
                    } else {
                        self.coord()?
                    };
                    points.push(Point::from(c));
                    if self.peek(',') {
                        self.consume(',')?;
                    } else {
                        break;
                    }
                }
                self.consume(')')?;
                Ok(Geometry::MultiPoint(MultiPoint::new(points)))
            }
            "LINESTRING" => Ok(Geometry::LineString(LineString::new(self.coord_seq()?))),
            "MULTILINESTRING" => Ok(Geometry::MultiLineString(MultiLineString::new(
                self.seq_list()?.into_iter().map(LineString::new).collect(),
            ))),
            "POLYGON" => Ok(Geometry::Polygon(self.polygon()?)),
            "MULTIPOLYGON" => {
                if self.empty() {
                    return Ok(Geometry::MultiPolygon(MultiPolygon::new(Vec::new())));
                }
                self.consume('(')?;
                let mut polygons = vec![self.polygon()?];
                while self.peek(',') {
                    self.consume(',')?;
                    polygons.push(self.polygon()?);
                }
                self.consume(')')?;
                Ok(Geometry::MultiPolygon(MultiPolygon::new(polygons)))
            }
            "GEOMETRYCOLLECTION" => {
                if self.empty() {
                    return Ok(Geometry::GeometryCollection(GeometryCollection::default()));
                }
                self.consume('(')?;
                let mut members = vec![self.geometry()?];
                while self.peek(',') {
                    self.consume(',')?;
                    members.push(self.geometry()?);
                }
                self.consume(')')?;
                Ok(Geometry::GeometryCollection(GeometryCollection(members)))
            }
            other => Err(ShapeStreamError::Wkt(format!(
                "unsupported geometry keyword `{other}`"
            ))),
        }
    }
}
