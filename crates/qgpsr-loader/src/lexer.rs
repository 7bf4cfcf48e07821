//! Field splitting shared by the `.sca` and `.vec` readers.

use std::borrow::Cow;

/// Split a result-file line into fields.
///
/// Fields are separated by whitespace. A field starting with `"` runs to the
/// matching unescaped quote; `\"`, `\\`, `\n` and `\t` are unescaped.
pub(crate) fn tokenize(line: &str) -> Result<Vec<Cow<'_, str>>, String> {
    let mut fields = Vec::new();
    let mut rest = line.trim_start();

    while !rest.is_empty() {
        if let Some(quoted) = rest.strip_prefix('"') {
            let mut value = String::new();
            let mut end = None;
            let mut chars = quoted.char_indices();
            while let Some((idx, c)) = chars.next() {
                match c {
                    '\\' => match chars.next() {
                        Some((_, 'n')) => value.push('\n'),
                        Some((_, 't')) => value.push('\t'),
                        Some((_, other)) => value.push(other),
                        None => return Err("dangling escape in quoted field".to_string()),
                    },
                    '"' => {
                        end = Some(idx + 1);
                        break;
                    }
                    other => value.push(other),
                }
            }
            let end = end.ok_or_else(|| "unterminated quoted field".to_string())?;
            fields.push(Cow::Owned(value));
            rest = quoted[end..].trim_start();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            fields.push(Cow::Borrowed(&rest[..end]));
            rest = rest[end..].trim_start();
        }
    }

    Ok(fields)
}

/// Parse a numeric field as written by the simulator (`nan`, `inf`, `-inf`
/// and `-nan` included).
pub(crate) fn parse_number(text: &str) -> Option<f64> {
    match text {
        "nan" | "-nan" | "NaN" | "-NaN" => Some(f64::NAN),
        other => other.parse::<f64>().ok(),
    }
}

/// Whether the line is blank or a comment.
pub(crate) fn is_skippable(line: &str) -> bool {
    line.is_empty() || line.starts_with('#')
}
