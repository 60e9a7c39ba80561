// Copyright (c) 2025 ADBC Drivers Contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Parsing of the `hive_result_schema` field of `show_job` responses.
//!
//! The field is a JSON-encoded list of `[name, type]` pairs. Pig jobs may
//! report anonymous columns (e.g. the output of `COUNT`) with a bare `nil`
//! name, which is not valid JSON. For those, a small lenient parser accepts
//! the same two-level list shape with `nil`/`null` and unquoted words, and
//! the missing names become `_col{index}`.

use crate::error::{Error, Result};
use crate::types::{ColumnSchema, JobType};
use serde_json::Value;

/// Parse a raw result schema.
///
/// Returns `Ok(None)` for an empty schema. The lenient fallback only runs
/// for pig jobs whose schema text has no braces; in every other case a JSON
/// error is reported as [`Error::InvalidSchema`].
pub fn parse_result_schema(raw: &str, job_type: JobType) -> Result<Option<Vec<ColumnSchema>>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }

    let json_err = match serde_json::from_str::<Value>(raw) {
        Ok(value) => return columns_from_json(&value).map(Some),
        Err(e) => e,
    };

    if job_type != JobType::Pig || raw.contains(['{', '}']) {
        return Err(Error::InvalidSchema(json_err.to_string()));
    }

    tracing::debug!("Result schema is not valid JSON, trying lenient parse");
    let rows = parse_lenient(raw).map_err(|_| Error::InvalidSchema(json_err.to_string()))?;
    columns_from_rows(rows).map(Some)
}

fn columns_from_json(value: &Value) -> Result<Vec<ColumnSchema>> {
    let Value::Array(rows) = value else {
        return Err(Error::InvalidSchema(
            "expected a list of [name, type] pairs".to_string(),
        ));
    };
    let rows = rows
        .iter()
        .map(|row| match row {
            Value::Array(items) => items
                .iter()
                .map(|item| match item {
                    Value::Null => Ok(None),
                    Value::String(s) => Ok(Some(s.clone())),
                    other => Ok(Some(other.to_string())),
                })
                .collect::<Result<Vec<_>>>(),
            other => Err(Error::InvalidSchema(format!(
                "expected a [name, type] pair, got {}",
                other
            ))),
        })
        .collect::<Result<Vec<_>>>()?;
    columns_from_rows(rows)
}

fn columns_from_rows(rows: Vec<Vec<Option<String>>>) -> Result<Vec<ColumnSchema>> {
    rows.into_iter()
        .enumerate()
        .map(|(idx, row)| {
            let mut items = row.into_iter();
            let name = items.next().flatten();
            let type_name = items.next().flatten().ok_or_else(|| {
                Error::InvalidSchema(format!("column {} has no type", idx))
            })?;
            Ok(ColumnSchema {
                name: name.unwrap_or_else(|| format!("_col{}", idx)),
                type_name,
            })
        })
        .collect()
}

/// Parse the lenient two-level list grammar:
///
/// ```text
/// schema := '[' [row {',' row}] [','] ']'
/// row    := '[' [item {',' item}] [','] ']'
/// item   := quoted-string | 'nil' | 'null' | bare-word
/// ```
///
/// `nil` and `null` yield `None`. Nothing is evaluated.
pub fn parse_lenient(input: &str) -> Result<Vec<Vec<Option<String>>>> {
    let mut parser = LenientParser {
        input: input.as_bytes(),
        pos: 0,
    };
    let rows = parser.list(|p| p.list(|p| p.item()))?;
    parser.skip_ws();
    if parser.pos != parser.input.len() {
        return Err(parser.error("trailing characters"));
    }
    Ok(rows)
}

struct LenientParser<'a> {
    input: &'a [u8],
    pos: usize,
}

impl LenientParser<'_> {
    fn error(&self, msg: &str) -> Error {
        Error::InvalidSchema(format!("{} at offset {}", msg, self.pos))
    }

    fn skip_ws(&mut self) {
        while self
            .input
            .get(self.pos)
            .is_some_and(|b| b.is_ascii_whitespace())
        {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_ws();
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    fn list<T>(&mut self, mut element: impl FnMut(&mut Self) -> Result<T>) -> Result<Vec<T>> {
        self.expect(b'[')?;
        let mut out = Vec::new();
        loop {
            if self.peek() == Some(b']') {
                self.pos += 1;
                return Ok(out);
            }
            out.push(element(self)?);
            match self.peek() {
                Some(b',') => self.pos += 1,
                Some(b']') => {}
                _ => return Err(self.error("expected ',' or ']'")),
            }
        }
    }

    fn item(&mut self) -> Result<Option<String>> {
        match self.peek() {
            Some(quote @ (b'"' | b'\'')) => self.quoted(quote).map(Some),
            Some(b) if is_word_byte(b) => {
                let start = self.pos;
                while self.input.get(self.pos).copied().is_some_and(is_word_byte) {
                    self.pos += 1;
                }
                let word = String::from_utf8_lossy(&self.input[start..self.pos]);
                match word.as_ref() {
                    "nil" | "null" => Ok(None),
                    _ => Ok(Some(word.into_owned())),
                }
            }
            _ => Err(self.error("expected an item")),
        }
    }

    fn quoted(&mut self, quote: u8) -> Result<String> {
        self.pos += 1;
        let mut out = Vec::new();
        loop {
            let Some(&b) = self.input.get(self.pos) else {
                return Err(self.error("unterminated string"));
            };
            self.pos += 1;
            match b {
                b'\\' => {
                    let Some(&escaped) = self.input.get(self.pos) else {
                        return Err(self.error("unterminated escape"));
                    };
                    self.pos += 1;
                    out.push(match escaped {
                        b'n' => b'\n',
                        b't' => b'\t',
                        b'r' => b'\r',
                        other => other,
                    });
                }
                b if b == quote => break,
                b => out.push(b),
            }
        }
        String::from_utf8(out).map_err(|_| self.error("invalid UTF-8 in string"))
    }
}

fn is_word_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b':' | b'<' | b'>' | b'(' | b')' | b'-')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str, type_name: &str) -> ColumnSchema {
        ColumnSchema {
            name: name.to_string(),
            type_name: type_name.to_string(),
        }
    }

    #[test]
    fn test_empty_schema() {
        assert!(parse_result_schema("", JobType::Hive).unwrap().is_none());
        assert!(parse_result_schema("  ", JobType::Pig).unwrap().is_none());
    }

    #[test]
    fn test_valid_json_schema() {
        let cols = parse_result_schema(r#"[["id","bigint"],["name","string"]]"#, JobType::Hive)
            .unwrap()
            .unwrap();
        assert_eq!(cols, vec![col("id", "bigint"), col("name", "string")]);
    }

    #[test]
    fn test_pig_nil_names() {
        let cols = parse_result_schema(r#"[["group", "chararray"], [nil, "long"]]"#, JobType::Pig)
            .unwrap()
            .unwrap();
        assert_eq!(cols, vec![col("group", "chararray"), col("_col1", "long")]);
    }

    #[test]
    fn test_nil_rejected_for_non_pig() {
        let err = parse_result_schema(r#"[[nil, "long"]]"#, JobType::Hive).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[test]
    fn test_braces_skip_lenient_parse() {
        let err =
            parse_result_schema(r#"[[nil, "bag{tuple(x)}"]]"#, JobType::Pig).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[test]
    fn test_garbage_reports_json_error() {
        let err = parse_result_schema("[[nil, \"long\"", JobType::Pig).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
        let err = parse_result_schema("system('rm -rf /')", JobType::Pig).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }

    #[test]
    fn test_lenient_grammar() {
        let rows = parse_lenient(" [ [ 'a b' , nil ], [null, bare_word], [\"q\\\"x\"], ] ").unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Some("a b".to_string()), None],
                vec![None, Some("bare_word".to_string())],
                vec![Some("q\"x".to_string())],
            ]
        );
        assert!(parse_lenient("[]").unwrap().is_empty());
        assert!(parse_lenient("[[a]] x").is_err());
        assert!(parse_lenient("[[a b]]").is_err());
    }

    #[test]
    fn test_missing_type_is_error() {
        let err = parse_result_schema(r#"[["only_name"]]"#, JobType::Hive).unwrap_err();
        assert!(matches!(err, Error::InvalidSchema(_)));
    }
}
