//! Field schema types and the attribute projector: resolving requested
//! item names to schema indices or style pseudo-fields, and
//! materializing per-feature value arrays.

use chrono::NaiveDate;

use crate::driver::SourceFeature;
use crate::errors::{Result, ShapeStreamError};
use crate::options::PageContext;
use crate::style::parser::{first_of, parse_style, StyleTool, ToolKind};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldType {
    Integer,
    Real,
    String,
    Date,
}

/// One entry of a layer's ordered field schema.
#[derive(Clone, PartialEq, Debug)]
pub struct FieldDefn {
    pub name: String,
    pub field_type: FieldType,
    pub width: usize,
    pub precision: usize,
}

impl FieldDefn {
    pub fn new(name: &str, field_type: FieldType) -> FieldDefn {
        FieldDefn {
            name: name.to_owned(),
            field_type,
            width: 0,
            precision: 0,
        }
    }
}

/// A typed attribute value as produced by the driver.
#[derive(Clone, PartialEq, Debug)]
pub enum FieldValue {
    Integer(i64),
    Real(f64),
    String(String),
    Date(NaiveDate),
    Null,
}

impl FieldValue {
    pub fn as_string(&self) -> String {
        match self {
            FieldValue::Integer(v) => v.to_string(),
            FieldValue::Real(v) => v.to_string(),
            FieldValue::String(v) => v.clone(),
            FieldValue::Date(v) => v.format("%Y/%m/%d").to_string(),
            FieldValue::Null => String::new(),
        }
    }
}

/// The well-known label pseudo-fields, in the order `get_items` exposes
/// them.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LabelItem {
    FontName,
    Size,
    Text,
    Angle,
    FillColor,
    BackgroundColor,
    Placement,
    Anchor,
    Dx,
    Dy,
    PerpendicularOffset,
    Bold,
    Italic,
    Underline,
    Priority,
    Strikeout,
    Stretch,
    AdjustHorizontal,
    AdjustVertical,
    HaloColor,
    OutlineColor,
}

const LABEL_ITEMS: &[(&str, LabelItem)] = &[
    ("Style:LabelFont", LabelItem::FontName),
    ("Style:LabelSize", LabelItem::Size),
    ("Style:LabelText", LabelItem::Text),
    ("Style:LabelAngle", LabelItem::Angle),
    ("Style:LabelFColor", LabelItem::FillColor),
    ("Style:LabelBColor", LabelItem::BackgroundColor),
    ("Style:LabelPlacement", LabelItem::Placement),
    ("Style:LabelAnchor", LabelItem::Anchor),
    ("Style:LabelDx", LabelItem::Dx),
    ("Style:LabelDy", LabelItem::Dy),
    ("Style:LabelPerp", LabelItem::PerpendicularOffset),
    ("Style:LabelBold", LabelItem::Bold),
    ("Style:LabelItalic", LabelItem::Italic),
    ("Style:LabelUnderline", LabelItem::Underline),
    ("Style:LabelPriority", LabelItem::Priority),
    ("Style:LabelStrikeout", LabelItem::Strikeout),
    ("Style:LabelStretch", LabelItem::Stretch),
    ("Style:LabelAdjHor", LabelItem::AdjustHorizontal),
    ("Style:LabelAdjVert", LabelItem::AdjustVertical),
    ("Style:LabelHColor", LabelItem::HaloColor),
    ("Style:LabelOColor", LabelItem::OutlineColor),
];

const LABEL_PARAM_PREFIX: &str = "Style:LabelParam";
const BRUSH_PARAM_PREFIX: &str = "Style:BrushParam";
const PEN_PARAM_PREFIX: &str = "Style:PenParam";
const SYMBOL_PARAM_PREFIX: &str = "Style:SymbolParam";

/// Names of the 21 well-known label pseudo-fields.
pub fn style_item_names() -> Vec<&'static str> {
    LABEL_ITEMS.iter().map(|(name, _)| *name).collect()
}

impl LabelItem {
    /// Label tool parameter key carrying this item's value.
    fn param_key(self) -> &'static str {
        match self {
            LabelItem::FontName => "f",
            LabelItem::Size => "s",
            LabelItem::Text => "t",
            LabelItem::Angle => "a",
            LabelItem::FillColor => "c",
            LabelItem::BackgroundColor => "b",
            LabelItem::Placement => "m",
            LabelItem::Anchor => "p",
            LabelItem::Dx => "dx",
            LabelItem::Dy => "dy",
            LabelItem::PerpendicularOffset => "dp",
            LabelItem::Bold => "bo",
            LabelItem::Italic => "it",
            LabelItem::Underline => "un",
            LabelItem::Priority => "l",
            LabelItem::Strikeout => "st",
            LabelItem::Stretch => "w",
            LabelItem::AdjustHorizontal => "ah",
            LabelItem::AdjustVertical => "av",
            LabelItem::HaloColor => "h",
            LabelItem::OutlineColor => "o",
        }
    }
}

/// A requested item name resolved against the layer: either an index
/// into the source schema, or a pseudo-field drawn from the feature's
/// style descriptor.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum FieldDescriptor {
    Source(usize),
    LabelWellKnown(LabelItem),
    LabelParam(usize),
    BrushParam(usize),
    PenParam(usize),
    SymbolParam(usize),
}

impl FieldDescriptor {
    fn is_style(&self) -> bool {
        !matches!(self, FieldDescriptor::Source(_))
    }
}

fn param_suffix(name: &str, prefix: &str) -> Option<usize> {
    let head = name.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(name[prefix.len()..].parse().unwrap_or(0))
    } else {
        None
    }
}

/// Resolve requested item names to descriptors. Pseudo-field names are
/// matched first; anything else must name a schema field
/// (case-insensitively) or the whole resolution fails.
pub fn resolve_fields(defn: &[FieldDefn], names: &[String]) -> Result<Vec<FieldDescriptor>> {
    let mut descriptors = Vec::with_capacity(names.len());
    for name in names {
        if let Some((_, item)) = LABEL_ITEMS
            .iter()
            .find(|(item_name, _)| item_name.eq_ignore_ascii_case(name))
        {
            descriptors.push(FieldDescriptor::LabelWellKnown(*item));
        } else if let Some(n) = param_suffix(name, LABEL_PARAM_PREFIX) {
            descriptors.push(FieldDescriptor::LabelParam(n));
        } else if let Some(n) = param_suffix(name, BRUSH_PARAM_PREFIX) {
            descriptors.push(FieldDescriptor::BrushParam(n));
        } else if let Some(n) = param_suffix(name, PEN_PARAM_PREFIX) {
            descriptors.push(FieldDescriptor::PenParam(n));
        } else if let Some(n) = param_suffix(name, SYMBOL_PARAM_PREFIX) {
            descriptors.push(FieldDescriptor::SymbolParam(n));
        } else if let Some(i) = defn
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
        {
            descriptors.push(FieldDescriptor::Source(i));
        } else {
            return Err(ShapeStreamError::InvalidFieldName {
                field_name: name.clone(),
            });
        }
    }
    Ok(descriptors)
}

fn style_param_value(tool: Option<&StyleTool>, index: usize) -> String {
    tool.and_then(|t| t.raw_param(index))
        .unwrap_or("")
        .to_owned()
}

/// Materialize the value array for one feature.
///
/// The feature's style descriptor is parsed at most once, and only when
/// a style pseudo-field was actually requested; within it the first
/// tool of each family wins.
pub fn materialize(
    feature: &SourceFeature,
    descriptors: &[FieldDescriptor],
    page: &PageContext,
) -> Result<Vec<String>> {
    let tools = if descriptors.iter().any(FieldDescriptor::is_style) {
        feature.style.as_deref().map(parse_style).unwrap_or_default()
    } else {
        Vec::new()
    };
    let label = first_of(&tools, ToolKind::Label);

    let mut values = Vec::with_capacity(descriptors.len());
    for descriptor in descriptors {
        let value = match descriptor {
            FieldDescriptor::Source(i) => feature
                .values
                .get(*i)
                .ok_or(ShapeStreamError::InvalidFieldIndex { index: *i })?
                .as_string(),
            FieldDescriptor::LabelWellKnown(item) => match item {
                LabelItem::Size => label
                    .and_then(|t| t.pixels("s", page))
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                LabelItem::Angle => label
                    .and_then(|t| t.num("a"))
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
                other => label
                    .and_then(|t| t.raw(other.param_key()))
                    .unwrap_or("")
                    .to_owned(),
            },
            FieldDescriptor::LabelParam(n) => style_param_value(label, *n),
            FieldDescriptor::PenParam(n) => {
                style_param_value(first_of(&tools, ToolKind::Pen), *n)
            }
            FieldDescriptor::BrushParam(n) => {
                style_param_value(first_of(&tools, ToolKind::Brush), *n)
            }
            FieldDescriptor::SymbolParam(n) => {
                style_param_value(first_of(&tools, ToolKind::Symbol), *n)
            }
        };
        values.push(value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> Vec<FieldDefn> {
        vec![
            FieldDefn::new("name", FieldType::String),
            FieldDefn::new("POP", FieldType::Integer),
        ]
    }

    fn feature(style: &str) -> SourceFeature {
        SourceFeature {
            fid: 7,
            geometry: None,
            values: vec![
                FieldValue::String("Ottawa".to_owned()),
                FieldValue::Integer(934_243),
            ],
            style: Some(style.to_owned()),
        }
    }

    #[test]
    fn test_resolution_mixes_schema_and_pseudo_fields() {
        let names = vec![
            "pop".to_owned(), // case-insensitive schema match
            "Style:LabelText".to_owned(),
            "Style:PenParam1".to_owned(),
        ];
        let descriptors = resolve_fields(&schema(), &names).unwrap();
        assert_eq!(
            descriptors,
            vec![
                FieldDescriptor::Source(1),
                FieldDescriptor::LabelWellKnown(LabelItem::Text),
                FieldDescriptor::PenParam(1),
            ]
        );
    }

    #[test]
    fn test_unknown_ordinary_name_is_fatal() {
        let err = resolve_fields(&schema(), &["elevation".to_owned()]).unwrap_err();
        assert_eq!(
            err,
            ShapeStreamError::InvalidFieldName {
                field_name: "elevation".to_owned()
            }
        );
    }

    #[test]
    fn test_materialize_first_tool_of_family_wins() {
        let descriptors = vec![
            FieldDescriptor::Source(0),
            FieldDescriptor::LabelWellKnown(LabelItem::Text),
            FieldDescriptor::PenParam(1),
        ];
        let f = feature(r#"PEN(w:4px);LABEL(t:"Main St",s:10px);PEN(w:9px)"#);
        let values = materialize(&f, &descriptors, &PageContext::default()).unwrap();
        assert_eq!(values, vec!["Ottawa", "Main St", "4px"]);
    }

    #[test]
    fn test_materialize_without_style_descriptor_yields_empty_strings() {
        let descriptors = vec![FieldDescriptor::LabelWellKnown(LabelItem::FontName)];
        let f = SourceFeature {
            fid: 1,
            geometry: None,
            values: vec![],
            style: None,
        };
        let values = materialize(&f, &descriptors, &PageContext::default()).unwrap();
        assert_eq!(values, vec![""]);
    }

    #[test]
    fn test_label_size_is_converted_to_pixels() {
        let descriptors = vec![FieldDescriptor::LabelWellKnown(LabelItem::Size)];
        let f = feature("LABEL(t:\"x\",s:0.25in)");
        let values = materialize(&f, &descriptors, &PageContext::default()).unwrap();
        assert_eq!(values, vec!["18"]);
    }

    #[test]
    fn test_bad_source_index_is_fatal() {
        let descriptors = vec![FieldDescriptor::Source(9)];
        let f = feature("");
        let err = materialize(&f, &descriptors, &PageContext::default()).unwrap_err();
        assert_eq!(err, ShapeStreamError::InvalidFieldIndex { index: 9 });
    }

    #[test]
    fn test_date_value_formatting() {
        let date = FieldValue::Date(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(date.as_string(), "2024/03/09");
        assert_eq!(FieldValue::Null.as_string(), "");
    }
}
