// Closed registry of input value types
//
// Each declared type tag maps to a parser that turns the caller's text into
// the source of one Python literal.

use std::fmt;

/// Declared type of an app input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    Integer,
    Float,
    Str,
    /// Multi-line text
    Text,
}

impl ValueType {
    /// Look up a declared type tag (`int`, `float`, `str`, `text` and aliases)
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "int" | "integer" => Some(ValueType::Integer),
            "float" | "number" => Some(ValueType::Float),
            "str" | "string" => Some(ValueType::Str),
            "text" => Some(ValueType::Text),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            ValueType::Integer => "int",
            ValueType::Float => "float",
            ValueType::Str => "str",
            ValueType::Text => "text",
        }
    }

    /// Render `raw` as a literal of this type
    ///
    /// Returns the reason on malformed input.
    pub fn literal(&self, raw: &str) -> Result<String, String> {
        match self {
            ValueType::Integer => integer_literal(raw),
            ValueType::Float => float_literal(raw),
            ValueType::Str => Ok(string_literal(raw)),
            ValueType::Text => Ok(text_literal(raw)),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

fn integer_literal(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    let (negative, digits) = match trimmed.as_bytes().first() {
        Some(b'-') => (true, &trimmed[1..]),
        Some(b'+') => (false, &trimmed[1..]),
        _ => (false, trimmed),
    };
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err("not an integer".to_string());
    }

    let significant = digits.trim_start_matches('0');
    Ok(match (significant.is_empty(), negative) {
        (true, _) => "0".to_string(),
        (false, true) => format!("-{}", significant),
        (false, false) => significant.to_string(),
    })
}

fn float_literal(raw: &str) -> Result<String, String> {
    let value: f64 = raw
        .trim()
        .parse()
        .map_err(|_| "not a number".to_string())?;
    Ok(if value.is_nan() {
        "float('nan')".to_string()
    } else if value.is_infinite() {
        if value > 0.0 {
            "float('inf')".to_string()
        } else {
            "float('-inf')".to_string()
        }
    } else {
        // Debug keeps a decimal point or exponent (`7.0`, `1e300`)
        format!("{:?}", value)
    })
}

fn push_escaped(out: &mut String, c: char) {
    match c {
        '\\' => out.push_str("\\\\"),
        '"' => out.push_str("\\\""),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\n' => out.push_str("\\n"),
        '\u{2028}' | '\u{2029}' => out.push_str(&format!("\\u{:04x}", c as u32)),
        c if c.is_control() => {
            let code = c as u32;
            if code <= 0xff {
                out.push_str(&format!("\\x{:02x}", code));
            } else {
                out.push_str(&format!("\\u{:04x}", code));
            }
        }
        c => out.push(c),
    }
}

/// One double-quoted literal on a single line
pub fn string_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 2);
    out.push('"');
    for c in raw.chars() {
        push_escaped(&mut out, c);
    }
    out.push('"');
    out
}

/// Triple-quoted literal that keeps line breaks
pub fn text_literal(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 6);
    out.push_str("\"\"\"");
    for c in raw.chars() {
        if c == '\n' {
            out.push('\n');
        } else {
            push_escaped(&mut out, c);
        }
    }
    out.push_str("\"\"\"");
    out
}

const PY_KEYWORDS: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global",
    "if", "import", "in", "is", "lambda", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield",
];

/// True if `name` can be assigned to in the injected cell
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric()) && !PY_KEYWORDS.contains(&name)
}
