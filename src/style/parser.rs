//! Parsing of feature style descriptor strings.
//!
//! A descriptor is a `;`-separated list of tool fragments, each of the
//! form `TOOL(key:value,key:value,...)`. Values may be double-quoted
//! and may carry a unit suffix (`px`, `pt`, `in`, `mm`, `cm` or `g` for
//! ground units). Parsing is lenient: malformed fragments and unknown
//! tool names are skipped, never fatal.

use bitflags::bitflags;

use super::Rgba;
use crate::options::PageContext;

bitflags! {
    /// Which tool families a parsed descriptor carries.
    #[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
    pub struct ToolFamilies: u8 {
        const PEN = 0x01;
        const BRUSH = 0x02;
        const SYMBOL = 0x04;
        const LABEL = 0x08;
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ToolKind {
    Pen,
    Brush,
    Symbol,
    Label,
}

/// Canonical parameter order per family, used to address raw parameters
/// by number.
const PEN_PARAMS: &[&str] = &["c", "w", "p", "id", "cap", "j", "dp", "l"];
const BRUSH_PARAMS: &[&str] = &["fc", "bc", "id", "a", "s", "dx", "dy", "l"];
const SYMBOL_PARAMS: &[&str] = &["id", "a", "c", "o", "s", "dx", "dy", "l"];
const LABEL_PARAMS: &[&str] = &[
    "f", "s", "t", "a", "c", "b", "o", "h", "m", "p", "dx", "dy", "dp", "bo", "it", "un", "st",
    "w", "ah", "av", "l",
];

impl ToolKind {
    pub fn family(self) -> ToolFamilies {
        match self {
            ToolKind::Pen => ToolFamilies::PEN,
            ToolKind::Brush => ToolFamilies::BRUSH,
            ToolKind::Symbol => ToolFamilies::SYMBOL,
            ToolKind::Label => ToolFamilies::LABEL,
        }
    }

    pub fn param_keys(self) -> &'static [&'static str] {
        match self {
            ToolKind::Pen => PEN_PARAMS,
            ToolKind::Brush => BRUSH_PARAMS,
            ToolKind::Symbol => SYMBOL_PARAMS,
            ToolKind::Label => LABEL_PARAMS,
        }
    }
}

/// One parsed style fragment of exactly one family.
#[derive(Clone, PartialEq, Debug)]
pub struct StyleTool {
    pub kind: ToolKind,
    params: Vec<(String, String)>,
}

impl StyleTool {
    /// Raw value of a parameter, unit suffix and all.
    pub fn raw(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Raw value of the family's Nth parameter in canonical order.
    pub fn raw_param(&self, index: usize) -> Option<&str> {
        self.kind.param_keys().get(index).and_then(|k| self.raw(k))
    }

    /// Numeric value with any unit suffix ignored.
    pub fn num(&self, key: &str) -> Option<f64> {
        self.raw(key).and_then(|v| split_unit(v).map(|(n, _)| n))
    }

    /// Numeric value converted to pixels. A value without a suffix is
    /// taken as pixels.
    pub fn pixels(&self, key: &str, page: &PageContext) -> Option<f64> {
        let (value, unit) = split_unit(self.raw(key)?)?;
        let pixels = match unit {
            "" | "px" => value,
            "pt" => page.inch_to_pixels(value / 72.0),
            "in" => page.inch_to_pixels(value),
            "mm" => page.inch_to_pixels(value / 25.4),
            "cm" => page.inch_to_pixels(value / 2.54),
            "g" => page.ground_to_pixels(value),
            other => {
                log::debug!("unknown style unit `{other}` for param `{key}`");
                value
            }
        };
        Some(pixels)
    }

    /// A flag-style parameter: set and nonzero.
    pub fn flag(&self, key: &str) -> bool {
        self.num(key).map(|v| v != 0.0).unwrap_or(false)
    }

    pub fn color(&self, key: &str) -> Option<Rgba> {
        self.raw(key).and_then(Rgba::parse)
    }

    /// Explicit render priority (`l` parameter), when given.
    pub fn priority(&self) -> Option<i64> {
        self.num("l").map(|v| v as i64)
    }
}

fn split_unit(raw: &str) -> Option<(f64, &str)> {
    let raw = raw.trim();
    let end = raw
        .find(|c: char| !matches!(c, '0'..='9' | '-' | '+' | '.' | 'e' | 'E'))
        .unwrap_or(raw.len());
    let value = raw[..end].parse::<f64>().ok()?;
    Some((value, raw[end..].trim()))
}

fn unquote(raw: &str) -> String {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);
    // Unescape \" and \\ inside quoted values.
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Split `text` on `separator` at the top level, honoring double quotes
/// and backslash escapes.
fn split_quoted(text: &str, separator: char) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            in_quotes = !in_quotes;
        } else if c == separator && !in_quotes {
            pieces.push(&text[start..i]);
            start = i + separator.len_utf8();
        }
    }
    pieces.push(&text[start..]);
    pieces
}

/// Parse a whole style descriptor into its tool list, in parse order.
pub fn parse_style(text: &str) -> Vec<StyleTool> {
    let mut tools = Vec::new();
    for fragment in split_quoted(text, ';') {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            continue;
        }
        match parse_tool(fragment) {
            Some(tool) => tools.push(tool),
            None => log::debug!("skipping unparsable style fragment `{fragment}`"),
        }
    }
    tools
}

fn parse_tool(fragment: &str) -> Option<StyleTool> {
    let open = fragment.find('(')?;
    let close = fragment.rfind(')')?;
    if close < open {
        return None;
    }
    let kind = match fragment[..open].trim().to_ascii_uppercase().as_str() {
        "PEN" => ToolKind::Pen,
        "BRUSH" => ToolKind::Brush,
        "SYMBOL" => ToolKind::Symbol,
        "LABEL" => ToolKind::Label,
        _ => return None,
    };
    let mut params = Vec::new();
    for piece in split_quoted(&fragment[open + 1..close], ',') {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        let Some((key, value)) = piece.split_once(':') else {
            continue;
        };
        params.push((key.trim().to_ascii_lowercase(), unquote(value)));
    }
    Some(StyleTool { kind, params })
}

/// First tool of a family, in parse order.
pub fn first_of(tools: &[StyleTool], kind: ToolKind) -> Option<&StyleTool> {
    tools.iter().find(|t| t.kind == kind)
}

pub fn families(tools: &[StyleTool]) -> ToolFamilies {
    tools
        .iter()
        .fold(ToolFamilies::empty(), |acc, t| acc | t.kind.family())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_pen_and_brush() {
        let tools = parse_style("PEN(c:#FF0000,w:2px);BRUSH(fc:#00FF00)");
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].kind, ToolKind::Pen);
        assert_eq!(tools[0].color("c"), Some(Rgba::opaque(255, 0, 0)));
        assert_eq!(tools[0].num("w"), Some(2.0));
        assert_eq!(tools[1].kind, ToolKind::Brush);
        assert_eq!(
            families(&tools),
            ToolFamilies::PEN | ToolFamilies::BRUSH
        );
    }

    #[test]
    fn test_quoted_values_preserve_separators() {
        let tools = parse_style(r#"LABEL(f:"Noto Sans",t:"a;b, c",s:12pt)"#);
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].raw("t"), Some("a;b, c"));
        assert_eq!(tools[0].raw("f"), Some("Noto Sans"));
    }

    #[test]
    fn test_unit_conversion() {
        let page = PageContext::default();
        let tools = parse_style("PEN(w:2px,dp:3);SYMBOL(s:0.5in);BRUSH(s:10g)");
        assert_eq!(tools[0].pixels("w", &page), Some(2.0));
        assert_eq!(tools[0].pixels("dp", &page), Some(3.0));
        assert_eq!(tools[1].pixels("s", &page), Some(36.0));

        let ground = PageContext {
            cell_size: 2.0,
            ..PageContext::default()
        };
        assert_eq!(tools[2].pixels("s", &ground), Some(5.0));
    }

    #[test]
    fn test_raw_param_uses_canonical_order() {
        let tools = parse_style("PEN(w:3px,c:#102030,l:5)");
        let pen = &tools[0];
        assert_eq!(pen.raw_param(0), Some("#102030")); // c
        assert_eq!(pen.raw_param(1), Some("3px")); // w
        assert_eq!(pen.raw_param(2), None); // p, absent
        assert_eq!(pen.raw_param(7), Some("5")); // l
        assert_eq!(pen.priority(), Some(5));
    }

    #[test]
    fn test_malformed_fragments_are_skipped() {
        let tools = parse_style("WOBBLE(x:1);PEN(c:#000000);garbage");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].kind, ToolKind::Pen);
    }

    #[test]
    fn test_first_of_picks_parse_order() {
        let tools = parse_style("PEN(w:1);PEN(w:2)");
        assert_eq!(first_of(&tools, ToolKind::Pen).and_then(|t| t.num("w")), Some(1.0));
        assert_eq!(first_of(&tools, ToolKind::Brush), None);
    }
}
