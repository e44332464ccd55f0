//! `@@{ ... }` comment parser

use std::path::Path;

use crate::error::{GeneratorError, SourceLocation};
use crate::lexer::CommentBlock;

use super::value::{AnnotationMap, AnnotationValue};

/// Sentinel that opens an annotation inside a comment.
const SENTINEL: &str = "@@{";

/// One parsed annotation block with the location of its source comment.
#[derive(Debug, Clone)]
pub struct AnnotationBlock {
    pub entries: AnnotationMap,
    pub location: SourceLocation,
    /// Raw annotation text for diagnostics.
    pub raw: String,
}

/// Extract every annotation block from the given comments, in order.
/// Comments without the `@@{` sentinel are ignored.
pub fn extract_annotations(
    file: &Path,
    comments: &[CommentBlock],
) -> Result<Vec<AnnotationBlock>, GeneratorError> {
    let mut blocks = Vec::new();
    for comment in comments {
        let content = comment_content(&comment.text);
        let Some(start) = content.find(SENTINEL) else {
            continue;
        };
        let body_start = start + SENTINEL.len();
        let Some(rel_end) = content[body_start..].rfind('}') else {
            return Err(annotation_error(
                file,
                comment,
                &content,
                "annotation is missing its closing '}'",
            ));
        };
        let body = &content[body_start..body_start + rel_end];
        let raw = content[start..body_start + rel_end + 1].to_string();
        let entries = parse_entries(body).map_err(|message| {
            annotation_error(file, comment, &raw, &message)
        })?;
        blocks.push(AnnotationBlock {
            entries,
            location: SourceLocation::new(file, comment.line, 1, comment.offset),
            raw,
        });
    }
    Ok(blocks)
}

fn annotation_error(
    file: &Path,
    comment: &CommentBlock,
    raw: &str,
    message: &str,
) -> GeneratorError {
    GeneratorError::AnnotationError {
        location: SourceLocation::new(file, comment.line, 1, comment.offset),
        message: message.to_string(),
        annotation: raw.to_string(),
    }
}

/// Strip the comment introducer, leaving the payload text.
fn comment_content(text: &str) -> String {
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("--") {
        rest.trim().to_string()
    } else if let Some(rest) = trimmed.strip_prefix("/*") {
        rest.strip_suffix("*/").unwrap_or(rest).trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse `key=value, key2=[a,b], flag` entries.
fn parse_entries(body: &str) -> Result<AnnotationMap, String> {
    let mut map = AnnotationMap::new();
    let mut chars = body.char_indices().peekable();

    loop {
        skip_ws(&mut chars);
        if chars.peek().is_none() {
            break;
        }
        let key = scan_identifier(&mut chars)
            .ok_or_else(|| "expected an annotation key".to_string())?;
        skip_ws(&mut chars);

        let value = match chars.peek() {
            Some((_, '=')) => {
                chars.next();
                skip_ws(&mut chars);
                scan_value(&mut chars)?
            }
            _ => AnnotationValue::Bool(true),
        };

        if !map.insert(key.clone(), value) {
            return Err(format!("duplicate annotation key '{key}'"));
        }

        skip_ws(&mut chars);
        match chars.next() {
            Some((_, ',')) => continue,
            None => break,
            Some((_, other)) => {
                return Err(format!("unexpected character '{other}' after value of '{key}'"));
            }
        }
    }

    Ok(map)
}

fn skip_ws(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) {
    while matches!(chars.peek(), Some((_, c)) if c.is_whitespace()) {
        chars.next();
    }
}

fn scan_identifier(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> Option<String> {
    let mut ident = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || c == '_' {
            ident.push(c);
            chars.next();
        } else {
            break;
        }
    }
    if ident.is_empty() {
        None
    } else {
        Some(ident)
    }
}

fn scan_value(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
) -> Result<AnnotationValue, String> {
    match chars.peek() {
        Some((_, '[')) => {
            chars.next();
            let mut items = Vec::new();
            loop {
                skip_ws(chars);
                match chars.peek() {
                    Some((_, ']')) => {
                        chars.next();
                        break;
                    }
                    Some((_, '\'')) | Some((_, '"')) => {
                        let quote = chars.next().unwrap().1;
                        items.push(scan_quoted(chars, quote)?);
                    }
                    Some(_) => {
                        let atom = scan_atom(chars);
                        if atom.is_empty() {
                            return Err("empty list element".to_string());
                        }
                        items.push(atom);
                    }
                    None => return Err("unterminated list value".to_string()),
                }
                skip_ws(chars);
                match chars.peek() {
                    Some((_, ',')) => {
                        chars.next();
                    }
                    Some((_, ']')) => {}
                    Some((_, other)) => {
                        return Err(format!("unexpected character '{other}' in list"));
                    }
                    None => return Err("unterminated list value".to_string()),
                }
            }
            Ok(AnnotationValue::List(items))
        }
        Some((_, '\'')) | Some((_, '"')) => {
            let quote = chars.next().unwrap().1;
            Ok(AnnotationValue::Quoted(scan_quoted(chars, quote)?))
        }
        Some(_) => {
            let atom = scan_atom(chars);
            if atom.is_empty() {
                return Err("expected a value".to_string());
            }
            match atom.as_str() {
                "true" => Ok(AnnotationValue::Bool(true)),
                "false" => Ok(AnnotationValue::Bool(false)),
                _ => Ok(AnnotationValue::Atom(atom)),
            }
        }
        None => Err("expected a value".to_string()),
    }
}

/// Atoms cover identifiers, dotted fully-qualified names, `List<T>` generics
/// and `*` wildcards.
fn scan_atom(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> String {
    let mut atom = String::new();
    while let Some(&(_, c)) = chars.peek() {
        if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '<' | '>' | '*' | '$') {
            atom.push(c);
            chars.next();
        } else {
            break;
        }
    }
    atom
}

fn scan_quoted(
    chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
    quote: char,
) -> Result<String, String> {
    let mut out = String::new();
    while let Some((_, c)) = chars.next() {
        if c == quote {
            if matches!(chars.peek(), Some(&(_, next)) if next == quote) {
                chars.next();
                out.push(quote);
            } else {
                return Ok(out);
            }
        } else {
            out.push(c);
        }
    }
    Err("unterminated quoted value".to_string())
}
