//! STEP Part 21 tokenizer.
//!
//! Scans the `DATA; … ENDSEC;` sections of an SPF file and splits them into
//! `#id = KEYWORD(args);` records. The scanner is quote-aware: SPF strings
//! escape `'` as `''` and may contain `;`, `(`, `)` and newlines, so naive
//! splitting on delimiters is not enough.

use anyhow::{anyhow, Result};
use regex::Regex;
use std::collections::HashMap;

// ============================================================================
// Value model
// ============================================================================

/// One attribute value of an SPF record.
#[derive(Debug, Clone, PartialEq)]
pub enum SpfValue {
    /// `#123` instance reference.
    Ref(u32),
    Str(String),
    /// `.NOTDEFINED.` style enumeration literal.
    Enum(String),
    /// `.T.` / `.F.`
    Bool(bool),
    Int(i64),
    Real(f64),
    /// `$`: attribute explicitly unset.
    Null,
    /// `*`: attribute derived, not stored.
    Omitted,
    List(Vec<SpfValue>),
    /// Typed wrapper, e.g. `IFCLABEL('Load bearing')`.
    Typed(String, Vec<SpfValue>),
}

impl SpfValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SpfValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<u32> {
        match self {
            SpfValue::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[SpfValue]> {
        match self {
            SpfValue::List(items) => Some(items),
            _ => None,
        }
    }
}

/// One `#id = KEYWORD(args);` record.
#[derive(Debug, Clone)]
pub struct SpfEntity {
    pub id: u32,
    /// STEP keyword, upper case, e.g. `IFCWALLSTANDARDCASE`.
    pub keyword: String,
    pub args: Vec<SpfValue>,
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse SPF text into an entity map keyed by instance id.
///
/// Only `DATA` sections are read; the header is not interesting to the
/// importer. Records that do not match the `#id = KEYWORD(...)` shape
/// (complex/multi-typed instances, scalar assignments) are skipped.
pub fn parse_spf(input: &str) -> Result<HashMap<u32, SpfEntity>> {
    let record_re = Regex::new(r"(?s)^#(\d+)\s*=\s*([A-Za-z0-9_]+)\s*\((.*)\)$")
        .expect("record regex is valid");
    let comment_re = Regex::new(r"(?s)/\*.*?\*/").expect("comment regex is valid");

    let mut entities = HashMap::new();
    let mut pos = 0;

    while let Some(start) = input[pos..].find("DATA;") {
        let start = pos + start + "DATA;".len();
        let Some(end_offset) = input[start..].find("ENDSEC;") else {
            break;
        };
        let end = start + end_offset;

        let section = comment_re.replace_all(&input[start..end], "");
        for record in split_records(&section) {
            if let Some(caps) = record_re.captures(record.trim()) {
                let id: u32 = match caps[1].parse() {
                    Ok(id) => id,
                    Err(_) => continue,
                };
                let keyword = caps[2].to_ascii_uppercase();
                let args = split_args(&caps[3]);
                entities.insert(id, SpfEntity { id, keyword, args });
            }
        }

        pos = end + "ENDSEC;".len();
    }

    if entities.is_empty() {
        return Err(anyhow!("no DATA section records found"));
    }

    Ok(entities)
}

/// Split a DATA section body into `;`-terminated records, honoring string
/// quoting and paren depth.
fn split_records(data: &str) -> Vec<String> {
    let mut records = Vec::new();
    let mut buf = String::new();
    let mut depth: i32 = 0;
    let mut chars = data.chars().peekable();
    let mut in_string = false;

    while let Some(ch) = chars.next() {
        if in_string {
            buf.push(ch);
            if ch == '\'' {
                // `''` is an escaped quote, not a terminator
                if chars.peek() == Some(&'\'') {
                    buf.push(chars.next().expect("peeked"));
                } else {
                    in_string = false;
                }
            }
            continue;
        }

        match ch {
            '\'' => {
                in_string = true;
                buf.push(ch);
            }
            '(' => {
                depth += 1;
                buf.push(ch);
            }
            ')' => {
                depth -= 1;
                buf.push(ch);
            }
            ';' if depth == 0 => {
                let record = buf.trim();
                if record.starts_with('#') {
                    records.push(record.replace(['\n', '\r'], " "));
                }
                buf.clear();
            }
            _ => buf.push(ch),
        }
    }

    records
}

/// Split an argument list on top-level commas, honoring quoting and nesting.
fn split_args(s: &str) -> Vec<SpfValue> {
    let mut args = Vec::new();
    let mut cur = String::new();
    let mut depth: i32 = 0;
    let mut chars = s.chars().peekable();
    let mut in_string = false;

    while let Some(ch) = chars.next() {
        if in_string {
            cur.push(ch);
            if ch == '\'' {
                if chars.peek() == Some(&'\'') {
                    cur.push(chars.next().expect("peeked"));
                } else {
                    in_string = false;
                }
            }
            continue;
        }

        match ch {
            '\'' => {
                in_string = true;
                cur.push(ch);
            }
            '(' => {
                depth += 1;
                cur.push(ch);
            }
            ')' => {
                depth -= 1;
                cur.push(ch);
            }
            ',' if depth == 0 => {
                args.push(parse_value(cur.trim()));
                cur.clear();
            }
            _ => cur.push(ch),
        }
    }
    if !cur.trim().is_empty() {
        args.push(parse_value(cur.trim()));
    }

    args
}

fn parse_value(s: &str) -> SpfValue {
    let s = s.trim();

    if let Some(rest) = s.strip_prefix('#') {
        if let Ok(id) = rest.parse::<u32>() {
            return SpfValue::Ref(id);
        }
    }
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        return SpfValue::Str(unescape_string(&s[1..s.len() - 1]));
    }
    if s == "$" {
        return SpfValue::Null;
    }
    if s == "*" {
        return SpfValue::Omitted;
    }
    if s.len() >= 3 && s.starts_with('.') && s.ends_with('.') {
        let inner = &s[1..s.len() - 1];
        return match inner {
            "T" => SpfValue::Bool(true),
            "F" => SpfValue::Bool(false),
            _ => SpfValue::Enum(inner.to_string()),
        };
    }
    if s.starts_with('(') && s.ends_with(')') {
        return SpfValue::List(split_args(&s[1..s.len() - 1]));
    }
    // Typed wrapper: KEYWORD(inner)
    if let Some(open) = s.find('(') {
        let keyword = &s[..open];
        if !keyword.is_empty()
            && keyword
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
            && s.ends_with(')')
        {
            let inner = &s[open + 1..s.len() - 1];
            return SpfValue::Typed(keyword.to_ascii_uppercase(), split_args(inner));
        }
    }
    if let Ok(n) = s.parse::<i64>() {
        return SpfValue::Int(n);
    }
    if let Ok(n) = s.parse::<f64>() {
        return SpfValue::Real(n);
    }

    SpfValue::Str(s.to_string())
}

fn unescape_string(s: &str) -> String {
    s.replace("''", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "ISO-10303-21;\n\
        HEADER;\n\
        FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');\n\
        FILE_NAME('box.ifc','2024-05-01T10:00:00',(''),(''),'','','');\n\
        FILE_SCHEMA(('IFC4'));\n\
        ENDSEC;\n\
        DATA;\n\
        #1=IFCWALL('3vB2YO$MX4xv5uCqZZG05x',#2,'Wall','A wall',$,$,$,'W-01',$);\n\
        #2=IFCOWNERHISTORY($,$,$,.ADDED.,$,$,$,1234567890);\n\
        #3=IFCCARTESIANPOINT((0.,0.,0.));\n\
        ENDSEC;\n\
        END-ISO-10303-21;\n";

    #[test]
    fn parses_data_section_records() {
        let entities = parse_spf(MINIMAL).unwrap();
        assert_eq!(entities.len(), 3);

        let wall = &entities[&1];
        assert_eq!(wall.keyword, "IFCWALL");
        assert_eq!(
            wall.args[0],
            SpfValue::Str("3vB2YO$MX4xv5uCqZZG05x".to_string())
        );
        assert_eq!(wall.args[1], SpfValue::Ref(2));
        assert_eq!(wall.args[7], SpfValue::Str("W-01".to_string()));
    }

    #[test]
    fn header_records_are_ignored() {
        let entities = parse_spf(MINIMAL).unwrap();
        assert!(entities.values().all(|e| e.keyword.starts_with("IFC")));
    }

    #[test]
    fn no_data_section_is_an_error() {
        assert!(parse_spf("ISO-10303-21;\nHEADER;\nENDSEC;\n").is_err());
        assert!(parse_spf("not a step file at all").is_err());
    }

    #[test]
    fn strings_may_contain_delimiters() {
        let input = "DATA;\n#1=IFCWALL('id_1',$,'Wall; with (delims), and ''quotes''',$);\nENDSEC;";
        let entities = parse_spf(input).unwrap();
        assert_eq!(
            entities[&1].args[2],
            SpfValue::Str("Wall; with (delims), and 'quotes'".to_string())
        );
    }

    #[test]
    fn comments_are_stripped() {
        let input = "DATA;\n/* #9=IFCWALL('dead',$); */\n#1=IFCSLAB('id_1',$,$,$,$,$,$,$,$);\nENDSEC;";
        let entities = parse_spf(input).unwrap();
        assert_eq!(entities.len(), 1);
        assert!(entities.contains_key(&1));
    }

    #[test]
    fn records_may_span_lines() {
        let input = "DATA;\n#1=IFCWALL('id_1',\n  $,\n  'Split record',$);\nENDSEC;";
        let entities = parse_spf(input).unwrap();
        assert_eq!(
            entities[&1].args[2],
            SpfValue::Str("Split record".to_string())
        );
    }

    #[test]
    fn value_parsing_covers_the_union() {
        assert_eq!(parse_value("#42"), SpfValue::Ref(42));
        assert_eq!(parse_value("$"), SpfValue::Null);
        assert_eq!(parse_value("*"), SpfValue::Omitted);
        assert_eq!(parse_value(".T."), SpfValue::Bool(true));
        assert_eq!(parse_value(".F."), SpfValue::Bool(false));
        assert_eq!(
            parse_value(".NOTDEFINED."),
            SpfValue::Enum("NOTDEFINED".to_string())
        );
        assert_eq!(parse_value("17"), SpfValue::Int(17));
        assert_eq!(parse_value("-3"), SpfValue::Int(-3));
        assert_eq!(parse_value("2.5E-1"), SpfValue::Real(0.25));
        assert_eq!(
            parse_value("(1,2)"),
            SpfValue::List(vec![SpfValue::Int(1), SpfValue::Int(2)])
        );
    }

    #[test]
    fn typed_wrappers_keep_their_payload() {
        let v = parse_value("IFCLABEL('Load bearing')");
        assert_eq!(
            v,
            SpfValue::Typed(
                "IFCLABEL".to_string(),
                vec![SpfValue::Str("Load bearing".to_string())]
            )
        );

        let v = parse_value("IFCTHERMALTRANSMITTANCEMEASURE(0.24)");
        assert_eq!(
            v,
            SpfValue::Typed(
                "IFCTHERMALTRANSMITTANCEMEASURE".to_string(),
                vec![SpfValue::Real(0.24)]
            )
        );
    }

    #[test]
    fn nested_lists_parse_recursively() {
        let v = parse_value("((0.,0.),(1.,1.))");
        let SpfValue::List(outer) = v else {
            panic!("expected list");
        };
        assert_eq!(outer.len(), 2);
        assert_eq!(
            outer[0],
            SpfValue::List(vec![SpfValue::Real(0.0), SpfValue::Real(0.0)])
        );
    }
}
