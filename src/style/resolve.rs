//! Resolution of parsed style tools into render-ready style layers and
//! label settings.

use super::parser::{parse_style, StyleTool, ToolKind};
use super::Rgba;
use crate::cursor::FeatureCursor;
use crate::flatten::LayerKind;
use crate::options::PageContext;

/// Name looked up when a symbol id matches nothing in the symbol set.
const DEFAULT_SYMBOL_NAME: &str = "default-marker";

/// Label size used by OGR when a descriptor omits it.
const DEFAULT_LABEL_SIZE: f64 = 10.0;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum LineCap {
    Butt,
    #[default]
    Round,
    Square,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LineJoin {
    Miter,
    Round,
    Bevel,
}

/// Label text size: a pixel height when a scalable font was resolved,
/// the medium bitmap size otherwise.
#[derive(Clone, Copy, PartialEq, Debug)]
pub enum LabelSize {
    Pixels(f64),
    Medium,
}

/// Label placement relative to its anchor point.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum LabelPosition {
    UpperLeft,
    UpperCenter,
    #[default]
    UpperRight,
    CenterLeft,
    Center,
    CenterRight,
    LowerLeft,
    LowerCenter,
    LowerRight,
}

/// One render-ready style layer, the unit a renderer draws with.
#[derive(Clone, PartialEq, Debug)]
pub struct StyleLayer {
    pub color: Option<Rgba>,
    pub outline_color: Option<Rgba>,
    pub background_color: Option<Rgba>,
    pub width: f64,
    pub size: Option<f64>,
    pub angle: f64,
    /// Index into the symbol set; 0 is the built-in default.
    pub symbol: usize,
    pub dash: Vec<f64>,
    pub cap: LineCap,
    pub join: Option<LineJoin>,
    pub offset: f64,
    pub single_sided: bool,
    /// Spacing between repeated brush symbols, 0 when unset.
    pub gap: f64,
}

impl Default for StyleLayer {
    fn default() -> StyleLayer {
        StyleLayer {
            color: None,
            outline_color: None,
            background_color: None,
            width: 1.0,
            size: None,
            angle: 0.0,
            symbol: 0,
            dash: Vec::new(),
            cap: LineCap::default(),
            join: None,
            offset: 0.0,
            single_sided: false,
            gap: 0.0,
        }
    }
}

#[derive(Clone, PartialEq, Debug)]
pub struct LabelStyle {
    pub text: Option<String>,
    pub angle: f64,
    pub size: LabelSize,
    pub position: LabelPosition,
    pub color: Option<Rgba>,
    pub halo_color: Option<Rgba>,
    pub outline_color: Option<Rgba>,
    pub font: Option<String>,
}

impl Default for LabelStyle {
    fn default() -> LabelStyle {
        LabelStyle {
            text: None,
            angle: 0.0,
            size: LabelSize::Medium,
            position: LabelPosition::default(),
            color: None,
            halo_color: None,
            outline_color: None,
            font: None,
        }
    }
}

/// The style derived from one feature's descriptor.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct StyleSet {
    pub layers: Vec<StyleLayer>,
    pub label: Option<LabelStyle>,
}

/// The symbols known to the renderer, addressed by index. Remote image
/// symbols can be appended on the fly when enabled.
#[derive(Clone, Debug, Default)]
pub struct SymbolSet {
    names: Vec<String>,
}

impl SymbolSet {
    pub fn new(names: Vec<String>) -> SymbolSet {
        SymbolSet { names }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n.eq_ignore_ascii_case(name))
    }

    /// Resolve a descriptor symbol id: a comma-separated preference
    /// list, first known name wins. Unresolvable ids fall back to
    /// `default_name` when given and known, otherwise to symbol 0.
    pub fn resolve(&mut self, id: &str, default_name: Option<&str>, allow_remote: bool) -> usize {
        for candidate in id.split(',') {
            let candidate = candidate.trim();
            if candidate.is_empty() {
                continue;
            }
            if let Some(index) = self.index_of(candidate) {
                return index;
            }
            if allow_remote
                && (candidate.starts_with("http://") || candidate.starts_with("https://"))
            {
                log::debug!("adding remote symbol `{candidate}`");
                self.names.push(candidate.to_owned());
                return self.names.len() - 1;
            }
        }
        default_name
            .and_then(|name| self.index_of(name))
            .unwrap_or(0)
    }
}

/// The fonts available for labels, by name.
#[derive(Clone, Debug, Default)]
pub struct FontSet {
    names: Vec<String>,
}

impl FontSet {
    pub fn new(names: Vec<String>) -> FontSet {
        FontSet { names }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.iter().any(|n| n.eq_ignore_ascii_case(name))
    }
}

/// Everything style resolution needs from the surrounding render setup.
pub struct ResolveContext<'a> {
    pub layer_kind: LayerKind,
    pub page: PageContext,
    pub symbols: &'a mut SymbolSet,
    pub fonts: &'a FontSet,
    pub allow_remote_symbols: bool,
}

/// Derive the style of the shape most recently fetched from `cursor`,
/// replacing whatever `set` held. A cursor with no fetched feature or
/// no style descriptor yields an empty set.
pub fn derive_style(set: &mut StyleSet, cursor: &FeatureCursor, ctx: &mut ResolveContext) {
    let text = cursor.style_descriptor().unwrap_or("").to_owned();
    derive_style_from_string(set, &text, ctx);
}

/// Derive a style from a raw descriptor string.
pub fn derive_style_from_string(set: &mut StyleSet, text: &str, ctx: &mut ResolveContext) {
    set.layers.clear();
    set.label = None;
    let tools = parse_style(text);
    if tools.is_empty() {
        return;
    }
    if is_pen_brush_only(&tools) {
        apply_legacy_slots(set, &tools, ctx);
    } else {
        apply_prioritized(set, &tools, ctx);
    }
}

/// The compatibility case: exactly one pen and one brush, no symbols,
/// and neither carries an explicit render priority. These map onto the
/// classic two-slot layout (fill below outline) instead of the general
/// priority ordering.
fn is_pen_brush_only(tools: &[StyleTool]) -> bool {
    let mut pens = 0;
    let mut brushes = 0;
    for tool in tools {
        match tool.kind {
            ToolKind::Pen => pens += 1,
            ToolKind::Brush => brushes += 1,
            ToolKind::Symbol => return false,
            ToolKind::Label => {}
        }
        if matches!(tool.kind, ToolKind::Pen | ToolKind::Brush) && tool.priority().is_some() {
            return false;
        }
    }
    pens == 1 && brushes == 1
}

fn slot(set: &mut StyleSet, index: usize) -> &mut StyleLayer {
    while set.layers.len() <= index {
        set.layers.push(StyleLayer::default());
    }
    &mut set.layers[index]
}

fn apply_legacy_slots(set: &mut StyleSet, tools: &[StyleTool], ctx: &mut ResolveContext) {
    let mut brush_seen = false;
    for tool in tools {
        match tool.kind {
            ToolKind::Brush => {
                if update_brush(slot(set, 0), tool, ctx) {
                    brush_seen = true;
                }
            }
            ToolKind::Pen => {
                // The outline goes above the fill once the fill exists;
                // polygon layers always reserve slot 0 for it.
                let index = if brush_seen || ctx.layer_kind == LayerKind::Polygon {
                    1
                } else {
                    0
                };
                update_pen(slot(set, index), tool, ctx, brush_seen);
            }
            ToolKind::Symbol => {}
            ToolKind::Label => update_label(set, tool, ctx),
        }
    }
}

fn apply_prioritized(set: &mut StyleSet, tools: &[StyleTool], ctx: &mut ResolveContext) {
    let mut brush_seen = false;
    let mut drawn: Vec<(i64, StyleLayer)> = Vec::new();
    for tool in tools {
        if tool.kind == ToolKind::Label {
            update_label(set, tool, ctx);
            continue;
        }
        let mut layer = StyleLayer::default();
        match tool.kind {
            ToolKind::Pen => update_pen(&mut layer, tool, ctx, brush_seen),
            ToolKind::Brush => {
                if update_brush(&mut layer, tool, ctx) {
                    brush_seen = true;
                }
            }
            ToolKind::Symbol => update_symbol(&mut layer, tool, ctx),
            ToolKind::Label => unreachable!(),
        }
        // Tools without an explicit priority draw below all that have
        // one; parse order breaks ties.
        drawn.push((tool.priority().unwrap_or(i64::MIN), layer));
    }
    drawn.sort_by_key(|(priority, _)| *priority);
    set.layers.extend(drawn.into_iter().map(|(_, layer)| layer));
}

fn update_pen(
    layer: &mut StyleLayer,
    tool: &StyleTool,
    ctx: &mut ResolveContext,
    brush_seen: bool,
) {
    // The well-known invisible pen suppresses the stroke color only;
    // width, dash and the other geometry parameters still apply.
    let mut invisible = false;
    if let Some(id) = tool.raw("id") {
        if id.contains("ogr-pen-1") {
            invisible = true;
        } else {
            layer.symbol = ctx.symbols.resolve(id, None, false);
        }
    }
    if let Some(color) = tool.color("c").filter(|_| !invisible) {
        if brush_seen || ctx.layer_kind == LayerKind::Polygon {
            layer.outline_color = Some(color);
        } else {
            layer.color = Some(color);
        }
    }
    if let Some(width) = tool.pixels("w", &ctx.page) {
        layer.width = width;
    }
    if let Some(pattern) = tool.raw("p") {
        layer.dash = parse_dash_pattern(pattern);
    }
    layer.cap = match tool.raw("cap") {
        Some("b") => LineCap::Butt,
        Some("r") => LineCap::Round,
        Some("p") => LineCap::Square,
        _ => LineCap::default(),
    };
    layer.join = match tool.raw("j") {
        Some("m") => Some(LineJoin::Miter),
        Some("r") => Some(LineJoin::Round),
        Some("b") => Some(LineJoin::Bevel),
        _ => None,
    };
    if let Some(offset) = tool.pixels("dp", &ctx.page) {
        if offset != 0.0 {
            layer.offset = offset;
            layer.single_sided = true;
        }
    }
}

/// A dash pattern is all-or-nothing: every entry must be a pixel value
/// and at least two are needed, otherwise the line stays solid.
fn parse_dash_pattern(pattern: &str) -> Vec<f64> {
    let mut dashes = Vec::new();
    for token in pattern.split_whitespace() {
        let Some(value) = token
            .strip_suffix("px")
            .and_then(|v| v.parse::<f64>().ok())
        else {
            return Vec::new();
        };
        dashes.push(value);
    }
    if dashes.len() < 2 {
        return Vec::new();
    }
    dashes
}

/// Returns whether the brush is visible; a transparent brush leaves the
/// layer untouched and does not count as a fill below later pens.
fn update_brush(layer: &mut StyleLayer, tool: &StyleTool, ctx: &mut ResolveContext) -> bool {
    if let Some(id) = tool.raw("id") {
        if id.contains("ogr-brush-1") {
            // The well-known transparent brush.
            return false;
        }
        if !id.starts_with("ogr-brush") {
            layer.symbol = ctx.symbols.resolve(id, None, false);
        }
    }
    if let Some(color) = tool.color("fc") {
        layer.color = Some(color);
    }
    if let Some(color) = tool.color("bc") {
        layer.background_color = Some(color);
    }
    if let Some(angle) = tool.num("a") {
        layer.angle = angle;
    }
    if let Some(size) = tool.pixels("s", &ctx.page) {
        layer.size = Some(size);
    }
    // Only a uniform spacing maps onto a gap.
    let dx = tool.pixels("dx", &ctx.page);
    let dy = tool.pixels("dy", &ctx.page);
    if let (Some(dx), Some(dy)) = (dx, dy) {
        if dx == dy {
            layer.gap = dx;
        }
    }
    true
}

fn update_symbol(layer: &mut StyleLayer, tool: &StyleTool, ctx: &mut ResolveContext) {
    if let Some(color) = tool.color("c") {
        layer.color = Some(color);
    }
    if let Some(color) = tool.color("o") {
        layer.outline_color = Some(color);
    }
    if let Some(angle) = tool.num("a") {
        layer.angle = angle;
    }
    if let Some(size) = tool.pixels("s", &ctx.page) {
        layer.size = Some(size);
    }
    layer.symbol = match tool.raw("id") {
        Some(id) => ctx
            .symbols
            .resolve(id, Some(DEFAULT_SYMBOL_NAME), ctx.allow_remote_symbols),
        None => ctx.symbols.resolve("", Some(DEFAULT_SYMBOL_NAME), false),
    };
}

fn update_label(set: &mut StyleSet, tool: &StyleTool, ctx: &ResolveContext) {
    let mut label = LabelStyle::default();

    label.text = tool.raw("t").filter(|t| !t.is_empty()).map(str::to_owned);
    if let Some(angle) = tool.num("a") {
        label.angle = angle;
    }
    label.position = match tool.num("p").map(|v| v as i64) {
        Some(2) => LabelPosition::UpperCenter,
        Some(3) => LabelPosition::UpperLeft,
        Some(4) => LabelPosition::CenterRight,
        Some(5) => LabelPosition::Center,
        Some(6) => LabelPosition::CenterLeft,
        Some(7) => LabelPosition::LowerRight,
        Some(8) => LabelPosition::LowerCenter,
        Some(9) => LabelPosition::LowerLeft,
        Some(10) => LabelPosition::UpperRight,
        Some(11) => LabelPosition::UpperCenter,
        Some(12) => LabelPosition::UpperLeft,
        _ => LabelPosition::UpperRight,
    };
    label.color = tool.color("c");
    label.halo_color = tool.color("h");
    label.outline_color = tool.color("o");

    label.font = resolve_font(tool, ctx.fonts);
    // Only a named font that resolves nowhere demotes the label to the
    // bitmap size; a descriptor without a font name keeps its pixel
    // size.
    let named_font = tool.raw("f").is_some_and(|f| !f.trim().is_empty());
    label.size = if named_font && label.font.is_none() {
        LabelSize::Medium
    } else {
        let size = tool
            .pixels("s", &ctx.page)
            .unwrap_or(DEFAULT_LABEL_SIZE)
            .max(1.0);
        LabelSize::Pixels(size)
    };

    set.label = Some(label);
}

/// Try the composed `family[-bold][-italic]` name first, then the plain
/// family, then `default`. Spaces in family names are dashed.
fn resolve_font(tool: &StyleTool, fonts: &FontSet) -> Option<String> {
    let family = tool.raw("f")?.trim().replace(' ', "-");
    if family.is_empty() {
        return None;
    }
    let mut composed = family.clone();
    if tool.flag("bo") {
        composed.push_str("-bold");
    }
    if tool.flag("it") {
        composed.push_str("-italic");
    }
    if fonts.contains(&composed) {
        Some(composed)
    } else if composed != family && fonts.contains(&family) {
        Some(family)
    } else if fonts.contains("default") {
        Some("default".to_owned())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context<'a>(
        kind: LayerKind,
        symbols: &'a mut SymbolSet,
        fonts: &'a FontSet,
    ) -> ResolveContext<'a> {
        ResolveContext {
            layer_kind: kind,
            page: PageContext::default(),
            symbols,
            fonts,
            allow_remote_symbols: false,
        }
    }

    fn derive(kind: LayerKind, text: &str) -> StyleSet {
        let mut symbols = SymbolSet::new(vec![
            "default-marker".to_owned(),
            "circle".to_owned(),
            "star".to_owned(),
        ]);
        let fonts = FontSet::new(vec![
            "default".to_owned(),
            "Noto-Sans".to_owned(),
            "Noto-Sans-bold".to_owned(),
        ]);
        let mut ctx = context(kind, &mut symbols, &fonts);
        let mut set = StyleSet::default();
        derive_style_from_string(&mut set, text, &mut ctx);
        set
    }

    #[test]
    fn test_pen_and_brush_use_the_two_slot_layout() {
        let set = derive(
            LayerKind::Polygon,
            "BRUSH(fc:#00FF00);PEN(c:#FF0000,w:3px)",
        );
        assert_eq!(set.layers.len(), 2);
        assert_eq!(set.layers[0].color, Some(Rgba::opaque(0, 255, 0)));
        assert_eq!(set.layers[1].outline_color, Some(Rgba::opaque(255, 0, 0)));
        assert_eq!(set.layers[1].width, 3.0);

        // Pen first on a polygon layer still lands above the fill.
        let set = derive(
            LayerKind::Polygon,
            "PEN(c:#FF0000);BRUSH(fc:#00FF00)",
        );
        assert_eq!(set.layers.len(), 2);
        assert_eq!(set.layers[0].color, Some(Rgba::opaque(0, 255, 0)));
        assert_eq!(set.layers[1].outline_color, Some(Rgba::opaque(255, 0, 0)));
    }

    #[test]
    fn test_pen_on_line_layer_draws_with_stroke_color() {
        let set = derive(LayerKind::Line, "PEN(c:#FF0000,w:2px);BRUSH(fc:#00FF00)");
        // Brush shares slot 0 when the pen came first on a line layer.
        assert_eq!(set.layers.len(), 1);
        assert_eq!(set.layers[0].color, Some(Rgba::opaque(0, 255, 0)));
        assert_eq!(set.layers[0].width, 2.0);
    }

    #[test]
    fn test_symbol_forces_priority_ordering() {
        let set = derive(
            LayerKind::Point,
            "PEN(c:#FF0000,l:2);BRUSH(fc:#00FF00,l:1);SYMBOL(id:circle,c:#0000FF)",
        );
        assert_eq!(set.layers.len(), 3);
        // No explicit priority sorts below all explicit ones.
        assert_eq!(set.layers[0].symbol, 1);
        assert_eq!(set.layers[0].color, Some(Rgba::opaque(0, 0, 255)));
        assert_eq!(set.layers[1].color, Some(Rgba::opaque(0, 255, 0)));
        assert_eq!(set.layers[2].color, Some(Rgba::opaque(255, 0, 0)));
    }

    #[test]
    fn test_equal_priorities_keep_parse_order() {
        let set = derive(
            LayerKind::Point,
            "SYMBOL(id:circle,l:1);SYMBOL(id:star,l:1)",
        );
        assert_eq!(set.layers[0].symbol, 1);
        assert_eq!(set.layers[1].symbol, 2);
    }

    #[test]
    fn test_invisible_pen_and_brush() {
        // An invisible pen loses its color but keeps its geometry.
        let set = derive(LayerKind::Line, r#"PEN(id:ogr-pen-1,c:#FF0000,w:5px,p:"4px 2px")"#);
        assert_eq!(set.layers.len(), 1);
        assert_eq!(set.layers[0].color, None);
        assert_eq!(set.layers[0].width, 5.0);
        assert_eq!(set.layers[0].dash, vec![4.0, 2.0]);

        let set = derive(
            LayerKind::Polygon,
            "BRUSH(id:ogr-brush-1,fc:#00FF00);PEN(c:#FF0000)",
        );
        assert_eq!(set.layers[0].color, None);
        assert_eq!(set.layers[1].outline_color, Some(Rgba::opaque(255, 0, 0)));

        // On a line layer a transparent brush does not push the pen to
        // the outline slot.
        let set = derive(
            LayerKind::Line,
            "BRUSH(id:ogr-brush-1,fc:#00FF00);PEN(c:#FF0000)",
        );
        assert_eq!(set.layers.len(), 1);
        assert_eq!(set.layers[0].color, Some(Rgba::opaque(255, 0, 0)));
        assert_eq!(set.layers[0].outline_color, None);
    }

    #[test]
    fn test_dash_pattern_is_all_or_nothing() {
        let set = derive(LayerKind::Line, r#"PEN(c:#000000,p:"10px 5px")"#);
        assert_eq!(set.layers[0].dash, vec![10.0, 5.0]);

        let set = derive(LayerKind::Line, r#"PEN(c:#000000,p:"10px 5")"#);
        assert!(set.layers[0].dash.is_empty());

        let set = derive(LayerKind::Line, r#"PEN(c:#000000,p:"10px")"#);
        assert!(set.layers[0].dash.is_empty());
    }

    #[test]
    fn test_pen_caps_joins_and_single_sided_offset() {
        let set = derive(LayerKind::Line, "PEN(c:#000000,cap:b,j:m,dp:4px)");
        let pen = &set.layers[0];
        assert_eq!(pen.cap, LineCap::Butt);
        assert_eq!(pen.join, Some(LineJoin::Miter));
        assert_eq!(pen.offset, 4.0);
        assert!(pen.single_sided);

        let set = derive(LayerKind::Line, "PEN(c:#000000)");
        assert_eq!(set.layers[0].cap, LineCap::Round);
        assert_eq!(set.layers[0].join, None);
        assert!(!set.layers[0].single_sided);
    }

    #[test]
    fn test_brush_gap_needs_uniform_spacing() {
        let set = derive(LayerKind::Polygon, "SYMBOL(id:star);BRUSH(fc:#112233,dx:6px,dy:6px)");
        let brush = set
            .layers
            .iter()
            .find(|l| l.color == Some(Rgba::opaque(0x11, 0x22, 0x33)))
            .unwrap();
        assert_eq!(brush.gap, 6.0);

        let set = derive(LayerKind::Polygon, "SYMBOL(id:star);BRUSH(fc:#112233,dx:6px,dy:8px)");
        let brush = set
            .layers
            .iter()
            .find(|l| l.color == Some(Rgba::opaque(0x11, 0x22, 0x33)))
            .unwrap();
        assert_eq!(brush.gap, 0.0);
    }

    #[test]
    fn test_symbol_id_resolution() {
        let mut symbols = SymbolSet::new(vec![
            "solid".to_owned(),
            "default-marker".to_owned(),
            "circle".to_owned(),
        ]);
        assert_eq!(symbols.resolve("star,circle", Some("default-marker"), false), 2);
        assert_eq!(
            symbols.resolve("nothing-known", Some("default-marker"), false),
            1
        );
        // Without a default name an unknown id lands on symbol 0.
        assert_eq!(symbols.resolve("nothing-known", None, false), 0);
        assert_eq!(symbols.resolve("http://example.com/pin.png", None, false), 0);
        assert_eq!(symbols.resolve("http://example.com/pin.png", None, true), 3);
        // Now known, resolves without appending again.
        assert_eq!(symbols.resolve("http://example.com/pin.png", None, true), 3);
    }

    #[test]
    fn test_pen_id_selects_a_stroke_symbol() {
        let set = derive(LayerKind::Line, "PEN(c:#000000,id:star)");
        assert_eq!(set.layers[0].symbol, 2);

        // Unknown pen ids draw with the plain line symbol, not the
        // default marker.
        let mut symbols = SymbolSet::new(vec![
            "solid".to_owned(),
            "default-marker".to_owned(),
        ]);
        let fonts = FontSet::default();
        let mut ctx = context(LayerKind::Line, &mut symbols, &fonts);
        let mut set = StyleSet::default();
        derive_style_from_string(&mut set, "PEN(c:#000000,id:ogr-pen-7)", &mut ctx);
        assert_eq!(set.layers[0].symbol, 0);
    }

    #[test]
    fn test_label_font_fallback_chain() {
        let set = derive(
            LayerKind::Point,
            r#"LABEL(f:"Noto Sans",bo:1,t:"Town",s:12px,p:5,c:#101010,h:#FFFFFF)"#,
        );
        let label = set.label.unwrap();
        assert_eq!(label.font.as_deref(), Some("Noto-Sans-bold"));
        assert_eq!(label.size, LabelSize::Pixels(12.0));
        assert_eq!(label.position, LabelPosition::Center);
        assert_eq!(label.text.as_deref(), Some("Town"));
        assert_eq!(label.halo_color, Some(Rgba::opaque(255, 255, 255)));

        // bold+italic falls back to the plain family.
        let set = derive(LayerKind::Point, r#"LABEL(f:"Noto Sans",bo:1,it:1,t:"x")"#);
        assert_eq!(set.label.unwrap().font.as_deref(), Some("Noto-Sans"));

        // Unknown family uses the default font.
        let set = derive(LayerKind::Point, r#"LABEL(f:"Comic",t:"x")"#);
        assert_eq!(set.label.unwrap().font.as_deref(), Some("default"));
    }

    #[test]
    fn test_label_size_floor_and_bitmap_fallback() {
        let set = derive(LayerKind::Point, r#"LABEL(f:"Noto Sans",t:"x",s:0.2px)"#);
        assert_eq!(set.label.unwrap().size, LabelSize::Pixels(1.0));

        let mut symbols = SymbolSet::default();
        let fonts = FontSet::default(); // no fonts at all
        let mut ctx = context(LayerKind::Point, &mut symbols, &fonts);
        let mut set = StyleSet::default();
        derive_style_from_string(&mut set, r#"LABEL(f:"Noto Sans",t:"x",s:12px)"#, &mut ctx);
        let label = set.label.unwrap();
        assert_eq!(label.font, None);
        assert_eq!(label.size, LabelSize::Medium);
    }

    #[test]
    fn test_label_without_font_name_keeps_pixel_size() {
        let set = derive(LayerKind::Point, r#"LABEL(t:"x",s:12px)"#);
        let label = set.label.unwrap();
        assert_eq!(label.font, None);
        assert_eq!(label.size, LabelSize::Pixels(12.0));

        let set = derive(LayerKind::Point, r#"LABEL(t:"x")"#);
        assert_eq!(set.label.unwrap().size, LabelSize::Pixels(10.0));
    }

    #[test]
    fn test_derivation_replaces_previous_style() {
        let mut symbols = SymbolSet::new(vec!["default-marker".to_owned()]);
        let fonts = FontSet::default();
        let mut ctx = context(LayerKind::Line, &mut symbols, &fonts);
        let mut set = StyleSet::default();
        derive_style_from_string(&mut set, "PEN(c:#FF0000);LABEL(t:\"x\")", &mut ctx);
        assert_eq!(set.layers.len(), 1);
        assert!(set.label.is_some());

        derive_style_from_string(&mut set, "PEN(c:#00FF00)", &mut ctx);
        assert_eq!(set.layers.len(), 1);
        assert_eq!(set.layers[0].color, Some(Rgba::opaque(0, 255, 0)));
        assert!(set.label.is_none());

        derive_style_from_string(&mut set, "", &mut ctx);
        assert!(set.layers.is_empty());
    }
}
