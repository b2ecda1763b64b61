//! Tile chaining: a cursor over a tile index layer whose rows name the
//! per-tile datasets, presented as one continuous feature stream.

use crate::cursor::{FeatureCursor, QueryFilters};
use crate::errors::{Result, ShapeStreamError};
use crate::flatten::LayerKind;
use crate::options::{OpenOptions, PageContext};
use crate::shape::{Bounds, Shape};

/// Which tile to move to.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TileTarget {
    /// The next index row, skipping tiles that fail to open.
    Next,
    /// Restart the index scan, then behave like `Next`.
    Rewind,
    /// The index row with this id; failure to open is fatal here.
    Id(i64),
}

/// How to address a feature within a tile.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ShapeAddress {
    Position(usize),
    Id(i64),
}

/// A feature stream chained across the tiles of a tile index layer.
///
/// The index cursor is scanned raw (no geometry conversion); each row's
/// tile item names the connection of the dataset to open next. Shapes
/// carry the id of the index row they came from, so direct addressing
/// can find its way back to the right tile.
pub struct TileChain {
    index: FeatureCursor,
    /// Position of the connection field within the index schema.
    tile_item: usize,
    kind: LayerKind,
    options: OpenOptions,
    page: PageContext,
    items: Vec<String>,
    /// Filters every opened tile inherits.
    filters: Option<QueryFilters>,
    current: Option<(i64, FeatureCursor)>,
}

impl TileChain {
    /// Open the tile index `connection` and resolve `tile_item`, the
    /// name of the index field holding per-tile connections. A missing
    /// tile item is a hard error.
    pub fn open(
        connection: &str,
        tile_item: &str,
        kind: LayerKind,
        options: &OpenOptions,
    ) -> Result<TileChain> {
        let mut index = FeatureCursor::open(connection, LayerKind::Auto, options)?;
        let tile_item_index = index
            .schema()
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(tile_item))
            .ok_or_else(|| ShapeStreamError::InvalidFieldName {
                field_name: tile_item.to_owned(),
            })?;
        Ok(TileChain {
            index,
            tile_item: tile_item_index,
            kind,
            options: options.clone(),
            page: PageContext::default(),
            items: Vec::new(),
            filters: None,
            current: None,
        })
    }

    pub fn set_page_context(&mut self, page: PageContext) {
        self.page = page;
        if let Some((_, cursor)) = &mut self.current {
            cursor.set_page_context(page);
        }
    }

    /// Item list applied to every tile as it opens. The index schema is
    /// not required to carry these fields, only the tiles are.
    pub fn set_items(&mut self, items: &[String]) -> Result<()> {
        if let Some((_, cursor)) = &mut self.current {
            cursor.set_items(items)?;
        }
        self.items = items.to_vec();
        Ok(())
    }

    /// Apply filters and position on the first readable tile. Only the
    /// spatial rectangle applies to the index itself (its geometries
    /// are tile footprints); the full filter set goes to each tile.
    pub fn which_shapes(&mut self, filters: &QueryFilters) -> Result<()> {
        let index_filters = QueryFilters {
            rect: filters.rect,
            ..QueryFilters::default()
        };
        self.index.set_filters(&index_filters)?;
        self.filters = Some(filters.clone());
        self.read_tile(TileTarget::Next)?;
        Ok(())
    }

    /// Move to another tile, closing the current one first. Returns
    /// `false` when a `Next`/`Rewind` scan runs off the end of the
    /// index.
    pub fn read_tile(&mut self, target: TileTarget) -> Result<bool> {
        self.current = None;
        if target == TileTarget::Rewind {
            self.index.reset_raw();
        }
        loop {
            let row = match target {
                TileTarget::Id(fid) => self.index.raw_by_id(fid)?,
                TileTarget::Next | TileTarget::Rewind => match self.index.next_raw()? {
                    Some(row) => row,
                    None => return Ok(false),
                },
            };
            let connection = row
                .values
                .get(self.tile_item)
                .ok_or(ShapeStreamError::InvalidFieldIndex {
                    index: self.tile_item,
                })?
                .as_string();

            let mut cursor = match FeatureCursor::open(&connection, self.kind, &self.options) {
                Ok(cursor) => cursor,
                Err(e) if !matches!(target, TileTarget::Id(_)) => {
                    log::warn!("skipping unreadable tile `{connection}`: {e}");
                    continue;
                }
                Err(e) => return Err(e),
            };
            cursor.set_page_context(self.page);
            if !self.items.is_empty() {
                cursor.set_items(&self.items)?;
            }
            if let Some(filters) = &self.filters {
                cursor.set_filters(filters)?;
            }
            log::debug!("tile {} open: `{connection}`", row.fid);
            self.current = Some((row.fid, cursor));
            return Ok(true);
        }
    }

    /// Next shape across tile boundaries, stamped with the id of the
    /// index row it came from.
    pub fn next_shape(&mut self) -> Result<Option<Shape>> {
        loop {
            let Some((tile_id, cursor)) = self.current.as_mut() else {
                return Ok(None);
            };
            match cursor.next()? {
                Some(mut shape) => {
                    shape.tile_id = *tile_id;
                    return Ok(Some(shape));
                }
                None => {
                    if !self.read_tile(TileTarget::Next)? {
                        return Ok(None);
                    }
                }
            }
        }
    }

    /// Direct access to a feature of a specific tile, switching tiles
    /// if needed. An unreadable tile is fatal here.
    pub fn get_shape(&mut self, tile_id: i64, address: ShapeAddress) -> Result<Shape> {
        let on_tile = matches!(&self.current, Some((id, _)) if *id == tile_id);
        if !on_tile && !self.read_tile(TileTarget::Id(tile_id))? {
            return Err(ShapeStreamError::Resource(format!(
                "tile {tile_id} not found in index"
            )));
        }
        let (id, cursor) = match &mut self.current {
            Some(current) => current,
            None => {
                return Err(ShapeStreamError::Resource(format!(
                    "tile {tile_id} not found in index"
                )))
            }
        };
        let mut shape = match address {
            ShapeAddress::Position(position) => cursor.get_by_position(position)?,
            ShapeAddress::Id(fid) => cursor.get_by_fid(fid)?,
        };
        shape.tile_id = *id;
        Ok(shape)
    }

    /// Item names come from a tile's schema, not the index's. Opens the
    /// first tile when none is open yet.
    pub fn get_items(&mut self, include_style_items: bool) -> Result<Vec<String>> {
        if self.current.is_none() && !self.read_tile(TileTarget::Rewind)? {
            return Err(ShapeStreamError::Resource(
                "tile index has no readable tile".to_owned(),
            ));
        }
        match &mut self.current {
            Some((_, cursor)) => Ok(cursor.get_items(include_style_items)),
            None => Err(ShapeStreamError::Resource(
                "tile index has no readable tile".to_owned(),
            )),
        }
    }

    /// The extent of the index layer, which covers all tiles.
    pub fn extent(&mut self) -> Result<Bounds> {
        self.index.extent()
    }

    /// Style descriptor of the shape last fetched from the open tile.
    pub fn style_descriptor(&self) -> Option<&str> {
        self.current
            .as_ref()
            .and_then(|(_, cursor)| cursor.style_descriptor())
    }

    pub fn current_tile(&self) -> Option<i64> {
        self.current.as_ref().map(|(id, _)| *id)
    }
}
