//! Conversion of arbitrarily nested source geometries into flat
//! [`Shape`]s, honoring the coercion rules of the owning layer kind.

use geo_types::{Geometry, LineString};

use crate::errors::{Result, ShapeStreamError};
use crate::shape::{Shape, ShapeKind};

/// The geometry coercion a layer applies to the features it produces.
///
/// `Auto` is used by layers that report the real feature kind instead of
/// forcing one (charting and query layers): point-ish leaves flatten as
/// points, everything else flattens as lines with the resulting kind
/// decided by the traversal.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LayerKind {
    Point,
    Line,
    Polygon,
    Auto,
}

fn geometry_name(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}

/// Append every leaf vertex of `geometry` to a single growing part.
///
/// Containers are visited recursively; any leaf that is not a point,
/// multipoint or line/ring is a hard error.
fn flatten_points(geometry: &Geometry<f64>, shape: &mut Shape) -> Result<()> {
    match geometry {
        Geometry::GeometryCollection(gc) => {
            for g in gc {
                flatten_points(g, shape)?;
            }
            return Ok(());
        }
        Geometry::MultiLineString(mls) => {
            for ls in mls {
                flatten_points(&Geometry::LineString(ls.clone()), shape)?;
            }
            return Ok(());
        }
        Geometry::MultiPolygon(mp) => {
            for p in mp {
                flatten_points(&Geometry::Polygon(p.clone()), shape)?;
            }
            return Ok(());
        }
        Geometry::Polygon(p) => {
            // Treat the polygon as a collection of rings.
            flatten_points(&Geometry::LineString(p.exterior().clone()), shape)?;
            for ring in p.interiors() {
                flatten_points(&Geometry::LineString(ring.clone()), shape)?;
            }
            return Ok(());
        }
        Geometry::Point(_) | Geometry::MultiPoint(_) | Geometry::LineString(_) => {}
        other => {
            return Err(ShapeStreamError::UnsupportedGeometry(geometry_name(other)));
        }
    }

    let part = shape.last_part();
    let mut appended = false;
    match geometry {
        Geometry::Point(p) => {
            shape.push_point(part, p.0);
            appended = true;
        }
        Geometry::MultiPoint(mp) => {
            for p in mp {
                shape.push_point(part, p.0);
                appended = true;
            }
        }
        Geometry::LineString(ls) => {
            for c in &ls.0 {
                shape.push_point(part, *c);
                appended = true;
            }
        }
        _ => unreachable!(),
    }
    if appended {
        shape.kind = ShapeKind::Point;
    }
    Ok(())
}

fn flatten_ring(ls: &LineString<f64>, shape: &mut Shape, close_rings: bool) {
    // Degenerate rings (fewer than 2 vertices) are silently skipped.
    if ls.0.len() < 2 {
        return;
    }
    if shape.kind == ShapeKind::None {
        shape.kind = ShapeKind::Line;
    }
    let part = shape.add_part();
    for c in &ls.0 {
        shape.push_point(part, *c);
    }
    if close_rings {
        let first = ls.0[0];
        let last = ls.0[ls.0.len() - 1];
        if first.x != last.x || first.y != last.y {
            shape.push_point(part, first);
        }
    }
}

/// Append each leaf line/ring of `geometry` as its own part.
///
/// Points and multipoints are dropped without error. Encountering a
/// polygon marks the shape as a polygon when nothing decided its kind
/// yet; the rings themselves are extracted the same way in either case.
fn flatten_lines(geometry: &Geometry<f64>, shape: &mut Shape, close_rings: bool) -> Result<()> {
    match geometry {
        Geometry::Polygon(p) => {
            if shape.kind == ShapeKind::None {
                shape.kind = ShapeKind::Polygon;
            }
            flatten_ring(p.exterior(), shape, close_rings);
            for ring in p.interiors() {
                flatten_ring(ring, shape, close_rings);
            }
        }
        Geometry::GeometryCollection(gc) => {
            for g in gc {
                flatten_lines(g, shape, close_rings)?;
            }
        }
        Geometry::MultiLineString(mls) => {
            for ls in mls {
                flatten_ring(ls, shape, close_rings);
            }
        }
        Geometry::MultiPolygon(mp) => {
            for p in mp {
                flatten_lines(&Geometry::Polygon(p.clone()), shape, close_rings)?;
            }
        }
        // A point when we're drawing lines/polygons... just drop it.
        Geometry::Point(_) | Geometry::MultiPoint(_) => {}
        Geometry::LineString(ls) => flatten_ring(ls, shape, close_rings),
        other => {
            return Err(ShapeStreamError::UnsupportedGeometry(geometry_name(other)));
        }
    }
    Ok(())
}

/// Flatten `geometry` into `shape` according to the target layer kind.
///
/// On success the shape's kind is either compatible with the layer kind
/// or `None` (incompatible geometry for this layer; the caller drops or
/// rejects the feature). On error the partial shape state is unusable.
pub fn flatten(geometry: &Geometry<f64>, kind: LayerKind, shape: &mut Shape) -> Result<()> {
    match kind {
        LayerKind::Point => flatten_points(geometry, shape)?,
        LayerKind::Line => {
            flatten_lines(geometry, shape, false)?;
            if shape.kind != ShapeKind::Line && shape.kind != ShapeKind::Polygon {
                shape.kind = ShapeKind::None;
            }
        }
        LayerKind::Polygon => {
            flatten_lines(geometry, shape, true)?;
            if shape.kind != ShapeKind::Polygon {
                shape.kind = ShapeKind::None;
            }
        }
        LayerKind::Auto => match geometry {
            Geometry::Point(_) | Geometry::MultiPoint(_) => flatten_points(geometry, shape)?,
            // Non-point geometry: the traversal decides the shape kind.
            _ => flatten_lines(geometry, shape, false)?,
        },
    }
    Ok(())
}
