//! Feature style handling: parsing per-feature style descriptor strings
//! into tool records, and resolving those tools into render-ready style
//! layers.

pub mod parser;
pub mod resolve;

pub use parser::{parse_style, StyleTool, ToolFamilies, ToolKind};
pub use resolve::{
    derive_style, derive_style_from_string, FontSet, LabelPosition, LabelSize, LabelStyle,
    LineCap, LineJoin, ResolveContext, StyleLayer, StyleSet, SymbolSet,
};

/// An RGBA color parsed from a `#RRGGBB` or `#RRGGBBAA` literal.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Rgba {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
    pub alpha: u8,
}

impl Rgba {
    pub fn new(red: u8, green: u8, blue: u8, alpha: u8) -> Rgba {
        Rgba {
            red,
            green,
            blue,
            alpha,
        }
    }

    pub fn opaque(red: u8, green: u8, blue: u8) -> Rgba {
        Rgba::new(red, green, blue, 255)
    }

    pub fn parse(text: &str) -> Option<Rgba> {
        let hex = text.trim().strip_prefix('#')?;
        if !hex.is_ascii() || (hex.len() != 6 && hex.len() != 8) {
            return None;
        }
        let byte = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        Some(Rgba {
            red: byte(0)?,
            green: byte(2)?,
            blue: byte(4)?,
            alpha: if hex.len() == 8 { byte(6)? } else { 255 },
        })
    }
}
