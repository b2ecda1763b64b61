//! Sequential and random-access feature cursor over one open
//! source+layer pair.

use std::sync::Arc;

use crate::driver::{self, SourceFeature, VectorSource};
use crate::errors::{Result, ShapeStreamError};
use crate::field::{materialize, resolve_fields, style_item_names, FieldDefn, FieldDescriptor};
use crate::filter::{
    append_order_by, build_sorted_query, combine_predicates, translate, AttributePredicate,
    SortBy,
};
use crate::flatten::{flatten, LayerKind};
use crate::geometry::spatial_filter_geometry;
use crate::options::{OpenOptions, PageContext};
use crate::pool;
use crate::shape::{Bounds, Shape, ShapeKind};

/// Filters applied together by [`FeatureCursor::set_filters`].
#[derive(Clone, Debug, Default)]
pub struct QueryFilters {
    pub rect: Option<Bounds>,
    /// Host filter expression, push-down attempted.
    pub predicate: Option<AttributePredicate>,
    /// Raw native query text, handed to the driver untouched.
    pub native: Option<String>,
    pub sort: Option<SortBy>,
}

/// A cursor over a single layer of an open vector source.
///
/// Connections are shared through the pool; all driver access happens
/// under the process-wide driver lock.
pub struct FeatureCursor {
    pool_key: String,
    source: Arc<dyn VectorSource>,
    layer: Box<dyn crate::driver::SourceLayer>,
    /// The query text when the layer is an owned result set, `None`
    /// for plain layers.
    layer_def: Option<String>,
    kind: LayerKind,
    page: PageContext,
    rect: Option<Bounds>,
    items: Vec<String>,
    descriptors: Vec<FieldDescriptor>,
    /// −1 means the read position is unknown and must be reset before
    /// positional access.
    last_record_index_read: i64,
    last_feature: Option<SourceFeature>,
}

impl FeatureCursor {
    /// Open `connection` (`<dataset-locator>[,<layer-selector>]`): the
    /// selector is a `SELECT ...` query, a layer name or a numeric
    /// index, defaulting to layer 0.
    pub fn open(connection: &str, kind: LayerKind, options: &OpenOptions) -> Result<FeatureCursor> {
        let (locator, selector) = match connection.split_once(',') {
            Some((locator, selector)) => (locator.trim(), selector.trim()),
            None => (connection.trim(), "0"),
        };
        let resolved = options.resolve_locator(locator);
        let pool_key = resolved.to_string_lossy().into_owned();

        let mut registry = driver::lock();
        driver::ensure_initialized(&mut registry);
        let source = pool::acquire(&pool_key, || registry.open(&resolved))?;

        let selected: Result<(Box<dyn crate::driver::SourceLayer>, Option<String>)> =
            if selector
                .get(..7)
                .is_some_and(|prefix| prefix.eq_ignore_ascii_case("select "))
            {
                source
                    .execute_sql(selector)
                    .map(|layer| (layer, Some(selector.to_owned())))
            } else if let Ok(index) = selector.parse::<usize>() {
                source
                    .layer_by_index(index)
                    .map(|layer| (layer, None))
                    .ok_or_else(|| {
                        ShapeStreamError::Resource(format!(
                            "layer index {index} out of range for `{pool_key}`"
                        ))
                    })
            } else {
                source
                    .layer_by_name(selector)
                    .map(|layer| (layer, None))
                    .ok_or_else(|| {
                        ShapeStreamError::Resource(format!(
                            "no layer named `{selector}` in `{pool_key}`"
                        ))
                    })
            };

        let (layer, layer_def) = match selected {
            Ok(selection) => selection,
            Err(e) => {
                // Give the connection back before failing the open.
                drop(registry);
                pool::release(&pool_key);
                return Err(e);
            }
        };

        log::debug!("opened `{pool_key}` layer `{}`", layer.name());
        Ok(FeatureCursor {
            pool_key,
            source,
            layer,
            layer_def,
            kind,
            page: PageContext::default(),
            rect: None,
            items: Vec::new(),
            descriptors: Vec::new(),
            last_record_index_read: -1,
            last_feature: None,
        })
    }

    pub fn set_page_context(&mut self, page: PageContext) {
        self.page = page;
    }

    pub fn layer_kind(&self) -> LayerKind {
        self.kind
    }

    /// The spatial rectangle currently applied, if any.
    pub fn active_rect(&self) -> Option<Bounds> {
        self.rect
    }

    /// Apply spatial, attribute and sort filters, resetting the read
    /// position.
    ///
    /// Returns `true` when the host predicate (if any) was fully pushed
    /// down to the driver; `false` means the caller must evaluate the
    /// whole expression against fetched shapes itself.
    pub fn set_filters(&mut self, filters: &QueryFilters) -> Result<bool> {
        let mut rect = filters.rect;
        let mut pushed_down = true;
        let mut translated = None;
        if let Some(predicate) = &filters.predicate {
            let t = translate(predicate);
            if let Some(r) = t.rect {
                match &mut rect {
                    Some(active) => active.intersect(&r),
                    None => rect = Some(r),
                }
            }
            pushed_down = t.sql.is_some();
            // A purely spatial expression translates to an empty string;
            // there is nothing to hand to the driver then.
            translated = t.sql.filter(|s| !s.is_empty());
        }
        let mut combined = combine_predicates(filters.native.as_deref(), translated.as_deref());

        let _lock = driver::lock();

        if let Some(sort) = filters.sort.as_ref().filter(|s| !s.properties.is_empty()) {
            let order_by = sort.order_by_clause();
            let query = match &self.layer_def {
                Some(def) => append_order_by(def, &order_by),
                None => {
                    let table = self.layer.name().to_owned();
                    let geometry_column = self.layer.geometry_column();
                    let query = build_sorted_query(
                        &self.items,
                        geometry_column.as_deref(),
                        &table,
                        combined.as_deref(),
                        &order_by,
                    );
                    // The filter is baked into the query's WHERE clause.
                    combined = None;
                    query
                }
            };
            log::debug!("re-executing layer as sorted query: {query}");
            self.layer = self.source.execute_sql(&query)?;
            self.layer_def = Some(query);
        }

        if let Some(r) = &rect {
            log::debug!(
                "spatial filter {} {} {} {}",
                r.min_x,
                r.min_y,
                r.max_x,
                r.max_y
            );
            self.layer
                .set_spatial_filter(Some(spatial_filter_geometry(r)));
        } else {
            self.layer.set_spatial_filter(None);
        }
        self.rect = rect;

        self.layer.set_attribute_filter(combined.as_deref())?;
        self.layer.reset_reading();
        self.last_record_index_read = -1;
        Ok(pushed_down)
    }

    /// Next shape matching the active filters, skipping features whose
    /// geometry is incompatible with the layer kind. `Ok(None)` on true
    /// exhaustion only; driver failures surface as errors.
    pub fn next(&mut self) -> Result<Option<Shape>> {
        let _lock = driver::lock();
        loop {
            let Some(feature) = self.layer.next_feature()? else {
                self.last_record_index_read = -1;
                return Ok(None);
            };
            self.last_record_index_read += 1;
            let values = materialize(&feature, &self.descriptors, &self.page)?;

            let mut shape = Shape::new();
            if let Some(geometry) = &feature.geometry {
                flatten(geometry, self.kind, &mut shape)?;
            }
            if shape.kind == ShapeKind::None {
                log::trace!(
                    "skipping feature {} with geometry incompatible with layer kind",
                    feature.fid
                );
                continue;
            }

            shape.values = values;
            shape.fid = feature.fid;
            shape.result_index = Some(self.last_record_index_read as usize);
            self.last_feature = Some(feature);
            return Ok(Some(shape));
        }
    }

    /// Fetch the feature at a 0-based position within the current
    /// result set. There is no reverse-seek primitive: going backwards
    /// (or starting from an unknown position) resets to the beginning
    /// and scans forward, O(position).
    pub fn get_by_position(&mut self, position: usize) -> Result<Shape> {
        let _lock = driver::lock();
        if position as i64 <= self.last_record_index_read || self.last_record_index_read == -1 {
            self.layer.reset_reading();
            self.last_record_index_read = -1;
        }
        let mut feature = None;
        while self.last_record_index_read < position as i64 {
            feature = Some(self.layer.next_feature()?.ok_or_else(|| {
                ShapeStreamError::Resource(format!("no feature at result position {position}"))
            })?);
            self.last_record_index_read += 1;
        }
        let feature = feature.ok_or_else(|| {
            ShapeStreamError::Resource(format!("no feature at result position {position}"))
        })?;
        self.materialize_direct(feature, Some(position))
    }

    /// Fetch directly by stable id. Does not touch the sequential read
    /// position; the shape's result position is unknown.
    pub fn get_by_fid(&mut self, fid: i64) -> Result<Shape> {
        let _lock = driver::lock();
        let feature = self.layer.feature_by_id(fid)?;
        self.materialize_direct(feature, None)
    }

    /// Directly addressed features must convert; incompatibility is a
    /// hard error here, unlike during iteration.
    fn materialize_direct(
        &mut self,
        feature: SourceFeature,
        result_index: Option<usize>,
    ) -> Result<Shape> {
        let mut shape = Shape::new();
        if let Some(geometry) = &feature.geometry {
            flatten(geometry, self.kind, &mut shape)?;
        }
        if shape.kind == ShapeKind::None {
            return Err(ShapeStreamError::IncompatibleFeature);
        }
        shape.values = materialize(&feature, &self.descriptors, &self.page)?;
        shape.fid = feature.fid;
        shape.result_index = result_index;
        self.last_feature = Some(feature);
        Ok(shape)
    }

    /// The source schema's field names, optionally followed by the
    /// well-known label pseudo-field names.
    pub fn get_items(&mut self, include_style_items: bool) -> Vec<String> {
        let _lock = driver::lock();
        let mut items: Vec<String> = self.layer.defn().into_iter().map(|f| f.name).collect();
        if include_style_items {
            items.extend(style_item_names().into_iter().map(str::to_owned));
        }
        items
    }

    /// Set the requested item list, resolving field descriptors against
    /// the layer schema.
    pub fn set_items(&mut self, items: &[String]) -> Result<()> {
        let _lock = driver::lock();
        let defn = self.layer.defn();
        self.descriptors = resolve_fields(&defn, items)?;
        self.items = items.to_vec();
        Ok(())
    }

    pub fn schema(&mut self) -> Vec<FieldDefn> {
        let _lock = driver::lock();
        self.layer.defn()
    }

    /// Full extent of the layer as reported by the driver.
    pub fn extent(&mut self) -> Result<Bounds> {
        let _lock = driver::lock();
        self.layer.extent()
    }

    /// Style descriptor of the most recently fetched feature, for
    /// on-demand style derivation.
    pub fn style_descriptor(&self) -> Option<&str> {
        self.last_feature.as_ref().and_then(|f| f.style.as_deref())
    }

    // Raw row access for the tile index scan: no geometry conversion,
    // no projection.

    pub(crate) fn next_raw(&mut self) -> Result<Option<SourceFeature>> {
        let _lock = driver::lock();
        self.layer.next_feature()
    }

    pub(crate) fn raw_by_id(&mut self, fid: i64) -> Result<SourceFeature> {
        let _lock = driver::lock();
        self.layer.feature_by_id(fid)
    }

    pub(crate) fn reset_raw(&mut self) {
        let _lock = driver::lock();
        self.layer.reset_reading();
        self.last_record_index_read = -1;
    }
}

impl Drop for FeatureCursor {
    fn drop(&mut self) {
        {
            let _lock = driver::lock();
            self.last_feature = None;
        }
        // The deferred close re-takes the driver lock, so it must be
        // free here.
        pool::release(&self.pool_key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldType, FieldValue};
    use crate::filter::{CompareOp, SortOrder, Token};
    use crate::memory::{register_source, MemoryLayerData};
    use geo_types::{point, polygon, Geometry};
    use std::sync::Arc;

    fn city(fid: i64, name: &str, pop: i64, x: f64, y: f64) -> SourceFeature {
        SourceFeature {
            fid,
            geometry: Some(Geometry::Point(point!(x: x, y: y))),
            values: vec![
                FieldValue::String(name.to_owned()),
                FieldValue::Integer(pop),
            ],
            style: Some("PEN(c:#112233,w:2px)".to_owned()),
        }
    }

    fn cities() -> Arc<MemoryLayerData> {
        Arc::new(MemoryLayerData::new(
            "cities",
            vec![
                FieldDefn::new("name", FieldType::String),
                FieldDefn::new("pop", FieldType::Integer),
            ],
            vec![
                city(10, "adak", 300, 0.0, 0.0),
                city(11, "basel", 175_000, 10.0, 10.0),
                city(12, "cairo", 9_500_000, 20.0, 20.0),
                city(13, "dhaka", 10_200_000, 30.0, 30.0),
                city(14, "essen", 580_000, 40.0, 40.0),
                city(15, "fargo", 125_000, 50.0, 50.0),
            ],
        ))
    }

    #[test]
    fn test_open_by_name_index_and_query() {
        register_source("cursor-open", vec![cities()]);
        assert!(FeatureCursor::open("cursor-open", LayerKind::Point, &OpenOptions::default())
            .is_ok());
        assert!(FeatureCursor::open(
            "cursor-open,CITIES",
            LayerKind::Point,
            &OpenOptions::default()
        )
        .is_ok());
        assert!(FeatureCursor::open(
            "cursor-open,SELECT \"name\" FROM \"cities\" ORDER BY \"name\"",
            LayerKind::Point,
            &OpenOptions::default()
        )
        .is_ok());
        assert!(FeatureCursor::open(
            "cursor-open,nowhere",
            LayerKind::Point,
            &OpenOptions::default()
        )
        .is_err());
        assert!(
            FeatureCursor::open("cursor-open,3", LayerKind::Point, &OpenOptions::default())
                .is_err()
        );
    }

    #[test]
    fn test_next_iterates_and_stamps_result_positions() {
        register_source("cursor-next", vec![cities()]);
        let mut cursor =
            FeatureCursor::open("cursor-next", LayerKind::Point, &OpenOptions::default()).unwrap();
        cursor
            .set_items(&["name".to_owned(), "pop".to_owned()])
            .unwrap();

        let first = cursor.next().unwrap().unwrap();
        assert_eq!(first.fid, 10);
        assert_eq!(first.result_index, Some(0));
        assert_eq!(first.values, vec!["adak", "300"]);

        let second = cursor.next().unwrap().unwrap();
        assert_eq!(second.result_index, Some(1));
    }

    #[test]
    fn test_incompatible_geometry_skipped_in_iteration_fatal_when_direct() {
        // A point cannot be coerced to a polygon, so it flattens to
        // nothing on a polygon layer.
        let area = |fid: i64, name: &str, origin: f64| SourceFeature {
            fid,
            geometry: Some(Geometry::Polygon(polygon![
                (x: origin, y: origin),
                (x: origin + 1.0, y: origin),
                (x: origin + 1.0, y: origin + 1.0),
                (x: origin, y: origin + 1.0),
            ])),
            values: vec![FieldValue::String(name.to_owned())],
            style: None,
        };
        let data = Arc::new(MemoryLayerData::new(
            "mixed",
            vec![FieldDefn::new("name", FieldType::String)],
            vec![
                area(1, "a parcel", 0.0),
                SourceFeature {
                    fid: 2,
                    geometry: Some(Geometry::Point(point!(x: 5.0, y: 5.0))),
                    values: vec![FieldValue::String("a survey marker".to_owned())],
                    style: None,
                },
                area(3, "another parcel", 2.0),
            ],
        ));
        register_source("cursor-mixed", vec![data]);
        let mut cursor =
            FeatureCursor::open("cursor-mixed", LayerKind::Polygon, &OpenOptions::default())
                .unwrap();

        let fids: Vec<i64> = std::iter::from_fn(|| cursor.next().unwrap())
            .map(|s| s.fid)
            .collect();
        assert_eq!(fids, vec![1, 3]);

        assert_eq!(
            cursor.get_by_fid(2).unwrap_err(),
            ShapeStreamError::IncompatibleFeature
        );
    }

    #[test]
    fn test_position_seek_resets_and_rescans() {
        let data = cities();
        register_source("cursor-seek", vec![Arc::clone(&data)]);
        let mut cursor =
            FeatureCursor::open("cursor-seek", LayerKind::Point, &OpenOptions::default()).unwrap();

        let baseline = data.resets();
        let fifth = cursor.get_by_position(5).unwrap();
        assert_eq!(fifth.fid, 15);
        assert_eq!(fifth.result_index, Some(5));
        let second = cursor.get_by_position(2).unwrap();
        assert_eq!(second.fid, 12);
        assert_eq!(data.resets() - baseline, 2);

        // A forward seek continues without resetting.
        let fourth = cursor.get_by_position(4).unwrap();
        assert_eq!(fourth.fid, 14);
        assert_eq!(data.resets() - baseline, 2);

        assert!(cursor.get_by_position(99).is_err());
    }

    #[test]
    fn test_fid_fetch_does_not_disturb_bookkeeping() {
        let data = cities();
        register_source("cursor-fid", vec![Arc::clone(&data)]);
        let mut cursor =
            FeatureCursor::open("cursor-fid", LayerKind::Point, &OpenOptions::default()).unwrap();

        cursor.get_by_position(3).unwrap();
        let baseline = data.resets();

        let direct = cursor.get_by_fid(11).unwrap();
        assert_eq!(direct.result_index, None);
        assert_eq!(direct.fid, 11);

        // Forward seek after the direct fetch still continues in place.
        cursor.get_by_position(4).unwrap();
        assert_eq!(data.resets(), baseline);
    }

    #[test]
    fn test_filters_with_sort_and_predicate() {
        register_source("cursor-sort", vec![cities()]);
        let mut cursor =
            FeatureCursor::open("cursor-sort", LayerKind::Point, &OpenOptions::default()).unwrap();
        cursor
            .set_items(&["name".to_owned(), "pop".to_owned()])
            .unwrap();

        let filters = QueryFilters {
            rect: Some(Bounds::new(-100.0, -100.0, 100.0, 100.0)),
            predicate: Some(AttributePredicate::new(vec![
                Token::Field {
                    name: "pop".to_owned(),
                    is_string: false,
                },
                Token::Compare(CompareOp::Ge),
                Token::Number(500_000.0),
            ])),
            native: None,
            sort: Some(SortBy {
                properties: vec![("pop".to_owned(), SortOrder::Descending)],
            }),
        };
        assert!(cursor.set_filters(&filters).unwrap());

        let names: Vec<String> = std::iter::from_fn(|| cursor.next().unwrap())
            .map(|s| s.values[0].clone())
            .collect();
        assert_eq!(names, vec!["dhaka", "cairo", "essen"]);
    }

    #[test]
    fn test_spatial_rect_narrowed_by_intersects_term() {
        register_source("cursor-rect", vec![cities()]);
        let mut cursor =
            FeatureCursor::open("cursor-rect", LayerKind::Point, &OpenOptions::default()).unwrap();

        let mut rectangle = Shape::new();
        rectangle.kind = ShapeKind::Polygon;
        rectangle.add_part_from(vec![
            geo_types::Coord { x: 5.0, y: 5.0 },
            geo_types::Coord { x: 5.0, y: 25.0 },
            geo_types::Coord { x: 25.0, y: 25.0 },
            geo_types::Coord { x: 25.0, y: 5.0 },
            geo_types::Coord { x: 5.0, y: 5.0 },
        ]);
        let filters = QueryFilters {
            rect: Some(Bounds::new(0.0, 0.0, 22.0, 22.0)),
            predicate: Some(AttributePredicate::new(vec![
                Token::Intersects,
                Token::OpenParen,
                Token::ShapeBinding,
                Token::Comma,
                Token::ShapeLiteral(rectangle),
                Token::CloseParen,
                Token::Compare(CompareOp::Eq),
                Token::Boolean(true),
            ])),
            native: None,
            sort: None,
        };
        assert!(cursor.set_filters(&filters).unwrap());
        assert_eq!(cursor.active_rect(), Some(Bounds::new(5.0, 5.0, 22.0, 22.0)));

        let fids: Vec<i64> = std::iter::from_fn(|| cursor.next().unwrap())
            .map(|s| s.fid)
            .collect();
        assert_eq!(fids, vec![11, 12]);
    }

    #[test]
    fn test_get_items_with_style_pseudo_fields() {
        register_source("cursor-items", vec![cities()]);
        let mut cursor =
            FeatureCursor::open("cursor-items", LayerKind::Point, &OpenOptions::default())
                .unwrap();
        let plain = cursor.get_items(false);
        assert_eq!(plain, vec!["name", "pop"]);
        let all = cursor.get_items(true);
        assert_eq!(all.len(), 2 + 21);
        assert!(all.contains(&"Style:LabelText".to_owned()));
    }

    #[test]
    fn test_extent_and_style_descriptor() {
        register_source("cursor-extent", vec![cities()]);
        let mut cursor =
            FeatureCursor::open("cursor-extent", LayerKind::Point, &OpenOptions::default())
                .unwrap();
        assert_eq!(cursor.extent().unwrap(), Bounds::new(0.0, 0.0, 50.0, 50.0));

        assert_eq!(cursor.style_descriptor(), None);
        cursor.next().unwrap().unwrap();
        assert_eq!(cursor.style_descriptor(), Some("PEN(c:#112233,w:2px)"));
    }
}
