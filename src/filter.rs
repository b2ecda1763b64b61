//! Translation of host filter expressions into driver SQL, plus the
//! identifier escaping and ORDER BY query construction that go with it.
//!
//! Translation is all-or-nothing: if every token of the expression maps
//! onto the supported subset the predicate is pushed down to the
//! driver, otherwise the whole expression is left for the host to
//! evaluate after fetching.

use crate::shape::{Bounds, Shape, ShapeKind};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl CompareOp {
    fn sql(self) -> &'static str {
        match self {
            CompareOp::Eq => " = ",
            CompareOp::Ne => " != ",
            CompareOp::Gt => " > ",
            CompareOp::Ge => " >= ",
            CompareOp::Lt => " < ",
            CompareOp::Le => " <= ",
        }
    }
}

/// One token of a host filter expression.
#[derive(Clone, PartialEq, Debug)]
pub enum Token {
    Number(f64),
    String(String),
    /// A field binding; string-typed bindings need an explicit cast in
    /// the generated SQL.
    Field { name: String, is_string: bool },
    Compare(CompareOp),
    And,
    Or,
    Not,
    OpenParen,
    CloseParen,
    /// Spatial `intersects(shape, literal)` term head.
    Intersects,
    /// The layer's own geometry inside an intersects term.
    ShapeBinding,
    ShapeLiteral(Shape),
    Boolean(bool),
    Comma,
}

/// A host filter expression in token form.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct AttributePredicate {
    pub tokens: Vec<Token>,
}

impl AttributePredicate {
    pub fn new(tokens: Vec<Token>) -> AttributePredicate {
        AttributePredicate { tokens }
    }
}

/// Outcome of a translation attempt.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct Translation {
    /// Driver SQL for the whole expression, or `None` when the host
    /// must evaluate it itself.
    pub sql: Option<String>,
    /// Bounding rectangle extracted from a spatial intersects term, to
    /// be intersected into the active spatial filter either way.
    pub rect: Option<Bounds>,
}

/// True for the closed 5-point axis-aligned ring an
/// intersects-with-rectangle term carries.
fn is_rectangle(shape: &Shape) -> bool {
    if shape.kind != ShapeKind::Polygon || shape.parts().len() != 1 {
        return false;
    }
    let ring = &shape.parts()[0];
    ring.len() == 5
        && ring[0].x == ring[1].x
        && ring[0].y == ring[3].y
        && ring[2].x == ring[3].x
        && ring[1].y == ring[2].y
        && ring[0].x == ring[4].x
        && ring[0].y == ring[4].y
}

/// Try to translate a host expression to driver SQL.
///
/// Exactly one `intersects(shape, literal) = true` term is recognized;
/// its rectangle is reported separately. When the literal is not an
/// axis-aligned rectangle the predicate is not handed over (the spatial
/// part cannot be expressed as a rectangle filter alone) but the
/// bounding box is still usable. Any unrecognized token aborts the
/// whole translation.
pub fn translate(predicate: &AttributePredicate) -> Translation {
    let tokens = &predicate.tokens;
    let mut sql = String::new();
    let mut rect = None;
    let mut rect_is_rectangle = false;
    let mut i = 0;

    while i < tokens.len() {
        match &tokens[i] {
            Token::Number(v) => sql.push_str(&v.to_string()),
            Token::String(s) => {
                sql.push('\'');
                sql.push_str(&escape_string_literal(s));
                sql.push('\'');
            }
            Token::Field { name, is_string } => {
                let escaped = escape_property_name(name);
                let needs_cast = *is_string;
                if needs_cast {
                    sql.push_str(&format!("CAST(\"{escaped}\" AS CHARACTER)"));
                } else {
                    sql.push('"');
                    sql.push_str(&escaped);
                    sql.push('"');
                }
            }
            Token::Compare(op) => sql.push_str(op.sql()),
            Token::And => {
                // An AND that merely joins the spatial term to the rest
                // is dropped along with the term itself.
                if !matches!(tokens.get(i + 1), Some(Token::Intersects)) {
                    sql.push_str(" AND ");
                }
            }
            Token::Or => sql.push_str(" OR "),
            Token::Not => sql.push_str("NOT "),
            Token::OpenParen => sql.push('('),
            Token::CloseParen => sql.push(')'),
            Token::Intersects => {
                let shape = match (
                    tokens.get(i + 1),
                    tokens.get(i + 2),
                    tokens.get(i + 3),
                    tokens.get(i + 4),
                    tokens.get(i + 5),
                    tokens.get(i + 6),
                    tokens.get(i + 7),
                ) {
                    (
                        Some(Token::OpenParen),
                        Some(Token::ShapeBinding),
                        Some(Token::Comma),
                        Some(Token::ShapeLiteral(shape)),
                        Some(Token::CloseParen),
                        Some(Token::Compare(CompareOp::Eq)),
                        Some(Token::Boolean(true)),
                    ) => shape,
                    _ => return Translation::default(),
                };
                if !shape.is_empty() {
                    rect = Some(shape.bounds());
                    rect_is_rectangle = is_rectangle(shape);
                }
                i += 7;
                // A trailing AND joining the term to the rest drops too.
                if matches!(tokens.get(i + 1), Some(Token::And)) {
                    i += 1;
                }
            }
            Token::ShapeBinding
            | Token::ShapeLiteral(_)
            | Token::Boolean(_)
            | Token::Comma => return Translation::default(),
        }
        i += 1;
    }

    let fully_translated = rect.is_none() || rect_is_rectangle;
    if fully_translated {
        log::debug!("filter pushed down to driver: {sql}");
    }
    Translation {
        sql: fully_translated.then_some(sql),
        rect,
    }
}

/// Double single quotes for embedding in a driver string literal.
pub fn escape_string_literal(text: &str) -> String {
    text.replace('\'', "''")
}

/// Property names are not escaped but validated wholesale: anything
/// beyond `[A-Za-z0-9_]` and non-ASCII bytes makes the whole name
/// unusable and it is replaced with a fixed marker.
pub fn escape_property_name(name: &str) -> String {
    let valid = name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b > 127);
    if valid && !name.is_empty() {
        name.to_owned()
    } else {
        "invalid_property_name".to_owned()
    }
}

/// Combine the caller's raw native filter with a translated expression.
pub fn combine_predicates(native: Option<&str>, translated: Option<&str>) -> Option<String> {
    match (native, translated) {
        (Some(n), Some(t)) => Some(format!("({n})AND ({t})")),
        (Some(n), None) => Some(format!("({n})")),
        (None, Some(t)) => Some(format!("({t})")),
        (None, None) => None,
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A sort specification: properties in significance order.
#[derive(Clone, PartialEq, Debug, Default)]
pub struct SortBy {
    pub properties: Vec<(String, SortOrder)>,
}

impl SortBy {
    pub fn order_by_clause(&self) -> String {
        let mut clause = String::new();
        for (i, (name, order)) in self.properties.iter().enumerate() {
            if i > 0 {
                clause.push_str(", ");
            }
            clause.push('"');
            clause.push_str(name);
            clause.push_str(match order {
                SortOrder::Ascending => "\" ASC",
                SortOrder::Descending => "\" DESC",
            });
        }
        clause
    }
}

/// Build the explicit field-projecting query used to re-execute a plain
/// layer scan with an ORDER BY clause. Falls back to `*` when the
/// geometry column is unknown, so the geometry still has a chance of
/// coming through.
pub fn build_sorted_query(
    items: &[String],
    geometry_column: Option<&str>,
    table: &str,
    where_clause: Option<&str>,
    order_by: &str,
) -> String {
    let mut sql = String::from("SELECT ");
    for item in items {
        sql.push('"');
        sql.push_str(item);
        sql.push_str("\", ");
    }
    match geometry_column {
        Some(column) if !column.is_empty() => {
            sql.push('"');
            sql.push_str(column);
            sql.push('"');
        }
        _ => sql.push('*'),
    }
    sql.push_str(" FROM \"");
    sql.push_str(table);
    sql.push('"');
    if let Some(clause) = where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(order_by);
    sql
}

/// Extend an existing query with an ORDER BY clause, appending to a
/// clause it already has.
pub fn append_order_by(query: &str, order_by: &str) -> String {
    if query.to_ascii_lowercase().contains(" order by ") {
        format!("{query}, {order_by}")
    } else {
        format!("{query} ORDER BY {order_by}")
    }
}
