//! In-memory vector source. Doubles as the test double for the cursor
//! and tile machinery and as a small usable driver: sources are
//! registered process-wide under a locator and opened through the
//! normal driver registry.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, OnceLock};

use geo_types::Geometry;

use crate::driver::{Driver, SourceFeature, SourceLayer, VectorSource};
use crate::errors::{Result, ShapeStreamError};
use crate::field::{FieldDefn, FieldValue};
use crate::geometry::geometry_bounds;
use crate::shape::Bounds;

/// Backing data of one in-memory layer, shared by every cursor opened
/// on it. `reset_count` counts `reset_reading` calls across all of
/// them, which makes seek behavior observable in tests.
pub struct MemoryLayerData {
    pub name: String,
    pub defn: Vec<FieldDefn>,
    pub geometry_column: Option<String>,
    pub features: Vec<SourceFeature>,
    pub reset_count: AtomicUsize,
}

impl MemoryLayerData {
    pub fn new(name: &str, defn: Vec<FieldDefn>, features: Vec<SourceFeature>) -> MemoryLayerData {
        MemoryLayerData {
            name: name.to_owned(),
            defn,
            geometry_column: Some("geometry".to_owned()),
            features,
            reset_count: AtomicUsize::new(0),
        }
    }

    pub fn resets(&self) -> usize {
        self.reset_count.load(AtomicOrdering::Relaxed)
    }
}

static SOURCES: OnceLock<Mutex<HashMap<String, Vec<Arc<MemoryLayerData>>>>> = OnceLock::new();

fn sources() -> &'static Mutex<HashMap<String, Vec<Arc<MemoryLayerData>>>> {
    SOURCES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Register (or replace) a named in-memory source.
pub fn register_source(locator: &str, layers: Vec<Arc<MemoryLayerData>>) {
    sources()
        .lock()
        .unwrap_or_else(|p| p.into_inner())
        .insert(locator.to_owned(), layers);
}

pub struct MemoryDriver;

impl Driver for MemoryDriver {
    fn name(&self) -> &str {
        "memory"
    }

    fn open(&self, locator: &Path) -> Result<Arc<dyn VectorSource>> {
        let key = locator.to_string_lossy();
        let layers = sources()
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(key.as_ref())
            .cloned()
            .ok_or_else(|| {
                ShapeStreamError::Resource(format!("memory source `{key}` not found"))
            })?;
        Ok(Arc::new(MemorySource { layers }))
    }
}

struct MemorySource {
    layers: Vec<Arc<MemoryLayerData>>,
}

impl VectorSource for MemorySource {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn layer_by_index(&self, index: usize) -> Option<Box<dyn SourceLayer>> {
        self.layers
            .get(index)
            .map(|data| Box::new(MemoryLayer::scan(Arc::clone(data))) as Box<dyn SourceLayer>)
    }

    fn layer_by_name(&self, name: &str) -> Option<Box<dyn SourceLayer>> {
        self.layers
            .iter()
            .find(|data| data.name.eq_ignore_ascii_case(name))
            .map(|data| Box::new(MemoryLayer::scan(Arc::clone(data))) as Box<dyn SourceLayer>)
    }

    fn execute_sql(&self, query: &str) -> Result<Box<dyn SourceLayer>> {
        let parsed = ParsedQuery::parse(query)?;
        let data = self
            .layers
            .iter()
            .find(|data| data.name.eq_ignore_ascii_case(&parsed.table))
            .ok_or_else(|| {
                ShapeStreamError::Filter(format!("unknown table `{}`", parsed.table))
            })?;

        let mut order: Vec<usize> = (0..data.features.len()).collect();
        if let Some(text) = &parsed.where_clause {
            let predicate = Predicate::parse(text)?;
            order.retain(|&i| predicate.matches(&data.defn, &data.features[i]));
        }
        for (field, ascending) in parsed.order_by.iter().rev() {
            let index = field_index(&data.defn, field).ok_or_else(|| {
                ShapeStreamError::Filter(format!("unknown ORDER BY field `{field}`"))
            })?;
            order.sort_by(|&a, &b| {
                let ord = compare_values(
                    &data.features[a].values[index],
                    &data.features[b].values[index],
                );
                if *ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }

        Ok(Box::new(MemoryLayer {
            data: Arc::clone(data),
            order,
            position: 0,
            spatial: None,
            predicate: None,
        }))
    }
}

struct MemoryLayer {
    data: Arc<MemoryLayerData>,
    /// Feature visit order; identity for plain scans, filtered and
    /// sorted for result-set layers.
    order: Vec<usize>,
    position: usize,
    spatial: Option<Bounds>,
    predicate: Option<Predicate>,
}

impl MemoryLayer {
    fn scan(data: Arc<MemoryLayerData>) -> MemoryLayer {
        let order = (0..data.features.len()).collect();
        MemoryLayer {
            data,
            order,
            position: 0,
            spatial: None,
            predicate: None,
        }
    }

    fn passes(&self, feature: &SourceFeature) -> bool {
        if let Some(rect) = &self.spatial {
            match feature.geometry.as_ref().and_then(geometry_bounds) {
                Some(b) if b.intersects(rect) => {}
                _ => return false,
            }
        }
        if let Some(predicate) = &self.predicate {
            if !predicate.matches(&self.data.defn, feature) {
                return false;
            }
        }
        true
    }
}

impl SourceLayer for MemoryLayer {
    fn name(&self) -> &str {
        &self.data.name
    }

    fn defn(&self) -> Vec<FieldDefn> {
        self.data.defn.clone()
    }

    fn geometry_column(&self) -> Option<String> {
        self.data.geometry_column.clone()
    }

    fn set_spatial_filter(&mut self, geometry: Option<Geometry<f64>>) {
        self.spatial = geometry.as_ref().and_then(geometry_bounds);
    }

    fn set_attribute_filter(&mut self, predicate: Option<&str>) -> Result<()> {
        self.predicate = match predicate {
            Some(text) => Some(Predicate::parse(text)?),
            None => None,
        };
        Ok(())
    }

    fn reset_reading(&mut self) {
        self.position = 0;
        self.data.reset_count.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn next_feature(&mut self) -> Result<Option<SourceFeature>> {
        while let Some(&index) = self.order.get(self.position) {
            self.position += 1;
            let feature = &self.data.features[index];
            if self.passes(feature) {
                return Ok(Some(feature.clone()));
            }
        }
        Ok(None)
    }

    fn feature_by_id(&mut self, fid: i64) -> Result<SourceFeature> {
        self.data
            .features
            .iter()
            .find(|f| f.fid == fid)
            .cloned()
            .ok_or_else(|| ShapeStreamError::Resource(format!("no feature with id {fid}")))
    }

    fn extent(&mut self) -> Result<Bounds> {
        let mut extent: Option<Bounds> = None;
        for feature in &self.data.features {
            if let Some(b) = feature.geometry.as_ref().and_then(geometry_bounds) {
                match &mut extent {
                    None => extent = Some(b),
                    Some(e) => {
                        e.min_x = e.min_x.min(b.min_x);
                        e.min_y = e.min_y.min(b.min_y);
                        e.max_x = e.max_x.max(b.max_x);
                        e.max_y = e.max_y.max(b.max_y);
                    }
                }
            }
        }
        extent.ok_or_else(|| {
            ShapeStreamError::Resource(format!("layer `{}` has no extent", self.data.name))
        })
    }
}

fn field_index(defn: &[FieldDefn], name: &str) -> Option<usize> {
    defn.iter().position(|f| f.name.eq_ignore_ascii_case(name))
}

fn numeric(value: &FieldValue) -> Option<f64> {
    match value {
        FieldValue::Integer(v) => Some(*v as f64),
        FieldValue::Real(v) => Some(*v),
        FieldValue::String(v) => v.parse().ok(),
        _ => None,
    }
}

fn compare_values(a: &FieldValue, b: &FieldValue) -> Ordering {
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => a.as_string().cmp(&b.as_string()),
    }
}

/// The modest query subset this driver understands:
/// `SELECT ... FROM "table" [WHERE <comparison>] [ORDER BY "f" [DESC], ...]`.
struct ParsedQuery {
    table: String,
    where_clause: Option<String>,
    order_by: Vec<(String, bool)>,
}

impl ParsedQuery {
    fn parse(query: &str) -> Result<ParsedQuery> {
        let lower = query.to_ascii_lowercase();
        let from = lower
            .find(" from ")
            .ok_or_else(|| ShapeStreamError::Filter(format!("unsupported query `{query}`")))?;
        let after_from = &query[from + " from ".len()..];
        let lower_after = &lower[from + " from ".len()..];

        let where_pos = lower_after.find(" where ");
        let order_pos = lower_after.find(" order by ");

        let table_end = where_pos.or(order_pos).unwrap_or(after_from.len());
        let table = unquote_identifier(after_from[..table_end].trim());

        let where_clause = where_pos.map(|w| {
            let end = order_pos.unwrap_or(after_from.len());
            after_from[w + " where ".len()..end].trim().to_owned()
        });

        let mut order_by = Vec::new();
        if let Some(o) = order_pos {
            for piece in after_from[o + " order by ".len()..].split(',') {
                let piece = piece.trim();
                let (name, ascending) = if let Some(rest) = strip_suffix_ci(piece, " desc") {
                    (rest, false)
                } else if let Some(rest) = strip_suffix_ci(piece, " asc") {
                    (rest, true)
                } else {
                    (piece, true)
                };
                order_by.push((unquote_identifier(name.trim()), ascending));
            }
        }

        Ok(ParsedQuery {
            table,
            where_clause,
            order_by,
        })
    }
}

fn strip_suffix_ci<'a>(text: &'a str, suffix: &str) -> Option<&'a str> {
    let split = text.len().checked_sub(suffix.len())?;
    let head = text.get(..split)?;
    text.get(split..)?
        .eq_ignore_ascii_case(suffix)
        .then_some(head)
}

fn unquote_identifier(text: &str) -> String {
    text.strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(text)
        .to_owned()
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum PredicateOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

enum PredicateValue {
    Number(f64),
    Text(String),
}

/// A single-comparison attribute predicate. Anything fancier is
/// rejected, which models a driver refusing a filter.
struct Predicate {
    field: String,
    op: PredicateOp,
    value: PredicateValue,
}

impl Predicate {
    fn parse(text: &str) -> Result<Predicate> {
        let mut text = text.trim();
        while text.starts_with('(') && text.ends_with(')') {
            text = text[1..text.len() - 1].trim();
        }
        const OPS: &[(&str, PredicateOp)] = &[
            ("!=", PredicateOp::Ne),
            ("<>", PredicateOp::Ne),
            ("<=", PredicateOp::Le),
            (">=", PredicateOp::Ge),
            ("=", PredicateOp::Eq),
            ("<", PredicateOp::Lt),
            (">", PredicateOp::Gt),
        ];
        for (symbol, op) in OPS {
            if let Some(pos) = text.find(symbol) {
                let lhs = text[..pos].trim();
                let rhs = text[pos + symbol.len()..].trim();
                return Ok(Predicate {
                    field: parse_field_reference(lhs),
                    op: *op,
                    value: parse_literal(rhs)?,
                });
            }
        }
        Err(ShapeStreamError::Filter(format!(
            "unsupported predicate `{text}`"
        )))
    }

    fn matches(&self, defn: &[FieldDefn], feature: &SourceFeature) -> bool {
        let Some(index) = field_index(defn, &self.field) else {
            return false;
        };
        let Some(value) = feature.values.get(index) else {
            return false;
        };
        let ordering = match &self.value {
            PredicateValue::Number(n) => match numeric(value) {
                Some(v) => v.partial_cmp(n),
                None => None,
            },
            PredicateValue::Text(t) => Some(value.as_string().as_str().cmp(t.as_str())),
        };
        match ordering {
            None => false,
            Some(ord) => match self.op {
                PredicateOp::Eq => ord == Ordering::Equal,
                PredicateOp::Ne => ord != Ordering::Equal,
                PredicateOp::Lt => ord == Ordering::Less,
                PredicateOp::Le => ord != Ordering::Greater,
                PredicateOp::Gt => ord == Ordering::Greater,
                PredicateOp::Ge => ord != Ordering::Less,
            },
        }
    }
}

fn parse_field_reference(lhs: &str) -> String {
    let lhs = lhs.trim();
    // Unwrap the CAST("name" AS CHARACTER) form used for string fields.
    let inner = if lhs
        .get(..5)
        .is_some_and(|p| p.eq_ignore_ascii_case("cast("))
        && lhs.ends_with(')')
    {
        let body = &lhs[5..lhs.len() - 1];
        match body.to_ascii_lowercase().find(" as ") {
            Some(pos) => body[..pos].trim(),
            None => body.trim(),
        }
    } else {
        lhs
    };
    unquote_identifier(inner)
}

fn parse_literal(rhs: &str) -> Result<PredicateValue> {
    if let Some(inner) = rhs.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Ok(PredicateValue::Text(inner.replace("''", "'")));
    }
    rhs.parse::<f64>()
        .map(PredicateValue::Number)
        .map_err(|_| ShapeStreamError::Filter(format!("unsupported literal `{rhs}`")))
}
