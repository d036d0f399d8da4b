#![forbid(unsafe_code)]

//! Byte-exact JSON writer for integrity codes. Output must match the
//! browser's own JSON writer, which differs from serde_json in string escaping
//! and number layout.

use std::fmt::Write as _;

use crate::prefs::value::PrefValue;

/// Text fed to the HMAC for `value`. A top-level null is the empty string.
pub fn serialize_for_mac(value: &PrefValue) -> String {
    let mut out = String::new();
    if !value.is_null() {
        write_value(&mut out, value);
    }
    out
}

fn write_value(out: &mut String, value: &PrefValue) {
    match value {
        PrefValue::Null => out.push_str("null"),
        PrefValue::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        PrefValue::Int(i) => {
            let _ = write!(out, "{i}");
        }
        PrefValue::Double(d) => out.push_str(&format_double(*d)),
        PrefValue::String(s) => write_string(out, s),
        PrefValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        PrefValue::Object(map) => {
            out.push('{');
            for (i, (key, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

fn write_string(out: &mut String, s: &str) {
    out.push('"');
    for c in s.chars() {
        match c {
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '<' => out.push_str("\\u003C"),
            c if c as u32 == 0x2028 || c as u32 == 0x2029 || (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
}

/// Doubles always carry a fraction or exponent marker so they never read back
/// as integers.
fn format_double(d: f64) -> String {
    let mut text = ecma_number(d);
    if !text.contains(['.', 'e', 'E']) {
        text.push_str(".0");
    }
    text
}

/// Shortest round-trip digits laid out like ECMAScript `Number#toString`.
fn ecma_number(d: f64) -> String {
    if d == 0.0 {
        return "0".to_owned();
    }
    if d.is_nan() {
        return "NaN".to_owned();
    }
    if d.is_infinite() {
        return if d > 0.0 { "Infinity" } else { "-Infinity" }.to_owned();
    }

    let sci = format!("{:e}", d.abs());
    let (mantissa, exp) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();
    let k = digits.len() as i32;
    let n = exp.parse::<i32>().unwrap_or(0) + 1;

    let mut out = String::new();
    if d < 0.0 {
        out.push('-');
    }
    if k <= n && n <= 21 {
        out.push_str(&digits);
        out.extend(std::iter::repeat('0').take((n - k) as usize));
    } else if 0 < n && n <= 21 {
        let (int, frac) = digits.split_at(n as usize);
        out.push_str(int);
        out.push('.');
        out.push_str(frac);
    } else if -6 < n && n <= 0 {
        out.push_str("0.");
        out.extend(std::iter::repeat('0').take((-n) as usize));
        out.push_str(&digits);
    } else {
        let e = n - 1;
        let (lead, rest) = digits.split_at(1);
        out.push_str(lead);
        if !rest.is_empty() {
            out.push('.');
            out.push_str(rest);
        }
        let _ = write!(out, "e{}{}", if e >= 0 { '+' } else { '-' }, e.abs());
    }
    out
}
