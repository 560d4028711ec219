//! Text encodings for structured values.
//!
//! These are the textual wire forms used for HSTORE, RANGE and array values
//! when a driver has no native representation for them, plus GeoJSON shape
//! checks for geometry values.

use std::collections::BTreeMap;

use crate::value::RangeValue;

/// Encodes an HSTORE map as `"k"=>"v", "k2"=>NULL`.
pub fn encode_hstore(map: &BTreeMap<String, Option<String>>) -> String {
    map.iter()
        .map(|(k, v)| match v {
            Some(v) => format!("{}=>{}", quote_element(k), quote_element(v)),
            None => format!("{}=>NULL", quote_element(k)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Parses HSTORE text back into a map.
pub fn parse_hstore(text: &str) -> Result<BTreeMap<String, Option<String>>, String> {
    let mut map = BTreeMap::new();
    let mut chars = text.chars().peekable();
    loop {
        skip_separators(&mut chars);
        if chars.peek().is_none() {
            return Ok(map);
        }
        let key = read_element(&mut chars)?.ok_or("hstore key cannot be NULL")?;
        skip_whitespace(&mut chars);
        if chars.next() != Some('=') || chars.next() != Some('>') {
            return Err(format!("expected '=>' after hstore key '{key}'"));
        }
        skip_whitespace(&mut chars);
        let value = read_element(&mut chars)?;
        map.insert(key, value);
    }
}

/// Encodes a range as `[lower,upper)`, with each bound rendered by `element`.
pub fn encode_range(range: &RangeValue, element: impl Fn(&crate::value::Value) -> String) -> String {
    let mut out = String::new();
    out.push(if range.lower_inclusive { '[' } else { '(' });
    if let Some(lower) = &range.lower {
        out.push_str(&quote_bound(&element(lower)));
    }
    out.push(',');
    if let Some(upper) = &range.upper {
        out.push_str(&quote_bound(&element(upper)));
    }
    out.push(if range.upper_inclusive { ']' } else { ')' });
    out
}

/// The pieces of a range literal before the bounds are typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRange {
    pub lower: Option<String>,
    pub upper: Option<String>,
    pub lower_inclusive: bool,
    pub upper_inclusive: bool,
}

/// Splits range text into its bounds. `empty` yields two missing,
/// exclusive bounds.
pub fn parse_range(text: &str) -> Result<RawRange, String> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("empty") {
        return Ok(RawRange {
            lower: None,
            upper: None,
            lower_inclusive: false,
            upper_inclusive: false,
        });
    }
    let lower_inclusive = match text.chars().next() {
        Some('[') => true,
        Some('(') => false,
        _ => return Err(format!("range '{text}' must start with '[' or '('")),
    };
    let upper_inclusive = match text.chars().last() {
        Some(']') => true,
        Some(')') => false,
        _ => return Err(format!("range '{text}' must end with ']' or ')'")),
    };
    let inner = &text[1..text.len() - 1];
    let mut chars = inner.chars().peekable();
    let lower = read_bound(&mut chars)?;
    if chars.next() != Some(',') {
        return Err(format!("range '{text}' must have exactly two bounds"));
    }
    let upper = read_bound(&mut chars)?;
    if chars.next().is_some() {
        return Err(format!("range '{text}' must have exactly two bounds"));
    }
    Ok(RawRange {
        lower,
        upper,
        lower_inclusive,
        upper_inclusive,
    })
}

/// One parsed element of a Postgres array literal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayElement {
    Null,
    Text(String),
    Nested(Vec<ArrayElement>),
}

/// Parses Postgres array text such as `{1,2,NULL}` or `{{a,b},{c,d}}`.
pub fn parse_array(text: &str) -> Result<Vec<ArrayElement>, String> {
    let mut chars = text.trim().chars().peekable();
    let parsed = read_array(&mut chars)?;
    if chars.next().is_some() {
        return Err(format!("trailing characters after array '{text}'"));
    }
    Ok(parsed)
}

const GEOMETRY_TYPES: [&str; 7] = [
    "Point",
    "LineString",
    "Polygon",
    "MultiPoint",
    "MultiLineString",
    "MultiPolygon",
    "GeometryCollection",
];

/// Checks that `json` is a GeoJSON geometry, of `subtype` when one is given.
pub fn validate_geojson(json: &serde_json::Value, subtype: Option<&str>) -> Result<(), String> {
    let obj = json.as_object().ok_or("geometry must be a GeoJSON object")?;
    let kind = obj
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or("geometry is missing a string 'type'")?;
    if !GEOMETRY_TYPES.contains(&kind) {
        return Err(format!("'{kind}' is not a GeoJSON geometry type"));
    }
    let member = if kind == "GeometryCollection" {
        "geometries"
    } else {
        "coordinates"
    };
    if !obj.get(member).is_some_and(serde_json::Value::is_array) {
        return Err(format!("{kind} geometry requires an array '{member}'"));
    }
    if let Some(expected) = subtype {
        if !kind.eq_ignore_ascii_case(expected) {
            return Err(format!("expected a {expected} geometry, got {kind}"));
        }
    }
    Ok(())
}

// ── Helpers ─────────────────────────────────────────────────────────────

type Chars<'a> = std::iter::Peekable<std::str::Chars<'a>>;

fn quote_element(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out.push('"');
    out
}

fn quote_bound(text: &str) -> String {
    let plain = !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '+');
    if plain {
        text.to_string()
    } else {
        quote_element(text)
    }
}

fn skip_whitespace(chars: &mut Chars<'_>) {
    while chars.peek().is_some_and(|c| c.is_whitespace()) {
        chars.next();
    }
}

fn skip_separators(chars: &mut Chars<'_>) {
    while chars.peek().is_some_and(|c| c.is_whitespace() || *c == ',') {
        chars.next();
    }
}

fn read_quoted(chars: &mut Chars<'_>) -> Result<String, String> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('\\') => out.push(chars.next().ok_or("dangling escape")?),
            Some('"') => return Ok(out),
            Some(c) => out.push(c),
            None => return Err("unterminated quoted element".into()),
        }
    }
}

/// Reads a quoted or bare element. A bare `NULL` is `None`.
fn read_element(chars: &mut Chars<'_>) -> Result<Option<String>, String> {
    if chars.peek() == Some(&'"') {
        chars.next();
        return read_quoted(chars).map(Some);
    }
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if c == ',' || c == '=' || c == '}' || c.is_whitespace() {
            break;
        }
        out.push(c);
        chars.next();
    }
    if out.is_empty() {
        return Err("expected an element".into());
    }
    Ok(if out.eq_ignore_ascii_case("NULL") {
        None
    } else {
        Some(out)
    })
}

fn read_bound(chars: &mut Chars<'_>) -> Result<Option<String>, String> {
    if chars.peek() == Some(&'"') {
        chars.next();
        return read_quoted(chars).map(Some);
    }
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if c == ',' {
            break;
        }
        out.push(c);
        chars.next();
    }
    let trimmed = out.trim();
    Ok(if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    })
}

fn read_array(chars: &mut Chars<'_>) -> Result<Vec<ArrayElement>, String> {
    if chars.next() != Some('{') {
        return Err("array must start with '{'".into());
    }
    let mut items = Vec::new();
    skip_whitespace(chars);
    if chars.peek() == Some(&'}') {
        chars.next();
        return Ok(items);
    }
    loop {
        skip_whitespace(chars);
        let item = match chars.peek() {
            Some('{') => ArrayElement::Nested(read_array(chars)?),
            Some(_) => match read_element(chars)? {
                Some(text) => ArrayElement::Text(text),
                None => ArrayElement::Null,
            },
            None => return Err("unterminated array".into()),
        };
        items.push(item);
        skip_whitespace(chars);
        match chars.next() {
            Some(',') => {}
            Some('}') => return Ok(items),
            _ => return Err("expected ',' or '}' in array".into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_hstore_encode_and_parse() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Some("1".to_string()));
        map.insert("quote\"d".to_string(), Some("back\\slash".to_string()));
        map.insert("gone".to_string(), None);
        let text = encode_hstore(&map);
        assert_eq!(
            text,
            r#""a"=>"1", "gone"=>NULL, "quote\"d"=>"back\\slash""#
        );
        assert_eq!(parse_hstore(&text).unwrap(), map);
    }

    #[test]
    fn test_hstore_parse_empty() {
        assert!(parse_hstore("").unwrap().is_empty());
        assert!(parse_hstore("\"a\" \"b\"").is_err());
    }

    #[test]
    fn test_range_encode() {
        let r = RangeValue::half_open(1_i64, 10_i64);
        assert_eq!(encode_range(&r, Value::to_string), "[1,10)");
        let unbounded = RangeValue {
            lower: None,
            upper: Some(Value::from("2024-01-01 00:00:00.000 +00:00")),
            lower_inclusive: false,
            upper_inclusive: true,
        };
        assert_eq!(
            encode_range(&unbounded, Value::to_string),
            "(,\"2024-01-01 00:00:00.000 +00:00\"]"
        );
    }

    #[test]
    fn test_range_parse() {
        let raw = parse_range("[1,10)").unwrap();
        assert_eq!(raw.lower.as_deref(), Some("1"));
        assert_eq!(raw.upper.as_deref(), Some("10"));
        assert!(raw.lower_inclusive);
        assert!(!raw.upper_inclusive);

        let quoted = parse_range("(\"2024-01-01 10:00:00+00\",)").unwrap();
        assert_eq!(quoted.lower.as_deref(), Some("2024-01-01 10:00:00+00"));
        assert_eq!(quoted.upper, None);

        assert!(parse_range("1,10").is_err());
        assert!(parse_range("[1,2,3]").is_err());
        assert_eq!(parse_range("empty").unwrap().lower, None);
    }

    #[test]
    fn test_parse_array() {
        assert_eq!(
            parse_array("{1,2,NULL}").unwrap(),
            vec![
                ArrayElement::Text("1".into()),
                ArrayElement::Text("2".into()),
                ArrayElement::Null,
            ]
        );
        assert_eq!(
            parse_array("{\"a,b\",c}").unwrap(),
            vec![ArrayElement::Text("a,b".into()), ArrayElement::Text("c".into())]
        );
        assert_eq!(
            parse_array("{{1},{2}}").unwrap(),
            vec![
                ArrayElement::Nested(vec![ArrayElement::Text("1".into())]),
                ArrayElement::Nested(vec![ArrayElement::Text("2".into())]),
            ]
        );
        assert!(parse_array("{}").unwrap().is_empty());
        assert!(parse_array("{1,2").is_err());
    }

    #[test]
    fn test_validate_geojson() {
        let point = serde_json::json!({"type": "Point", "coordinates": [1.0, 2.0]});
        assert!(validate_geojson(&point, None).is_ok());
        assert!(validate_geojson(&point, Some("POINT")).is_ok());
        assert!(validate_geojson(&point, Some("Polygon")).is_err());
        assert!(validate_geojson(&serde_json::json!({"type": "Circle"}), None).is_err());
        assert!(validate_geojson(&serde_json::json!({"type": "Point"}), None).is_err());
        assert!(validate_geojson(&serde_json::json!([1, 2]), None).is_err());
    }
}
