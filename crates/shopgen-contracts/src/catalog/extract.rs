use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;

use super::product::{CatalogRow, Product};
use crate::error::AssetError;

const DECLARATION: &str = "export const PRODUCTS";

/// Returns the text between the brackets of `export const PRODUCTS ... = [ ... ];`.
pub fn extract_products_block(source: &str) -> Result<&str, AssetError> {
    for (start, _) in source.match_indices(DECLARATION) {
        let rest = &source[start + DECLARATION.len()..];
        if let Some(block) = block_after_declaration(rest) {
            return Ok(block);
        }
    }
    Err(AssetError::catalog(
        "could not locate `export const PRODUCTS` array",
    ))
}

fn block_after_declaration(rest: &str) -> Option<&str> {
    if rest.bytes().next().is_some_and(is_ident_byte) {
        return None;
    }
    let eq = rest.find('=')?;
    let annotation = rest[..eq].trim();
    if !annotation.is_empty() && !annotation.starts_with(':') {
        return None;
    }
    let value = &rest[eq + 1..];
    let open = value.len() - value.trim_start().len();
    if value.as_bytes().get(open) != Some(&b'[') {
        return None;
    }
    let close = matching_bracket(value.as_bytes(), open)?;
    let tail = value[close + 1..].trim_start_matches([' ', '\t']);
    if !(tail.is_empty() || tail.starts_with(';') || tail.starts_with(['\n', '\r'])) {
        return None;
    }
    Some(&value[open + 1..close])
}

fn matching_bracket(bytes: &[u8], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut idx = open;
    while idx < bytes.len() {
        match bytes[idx] {
            b'"' | b'\'' | b'`' => {
                idx = skip_string(bytes, idx)?;
                continue;
            }
            b'/' if bytes.get(idx + 1) == Some(&b'/') => {
                idx = bytes[idx..]
                    .iter()
                    .position(|byte| *byte == b'\n')
                    .map(|offset| idx + offset)
                    .unwrap_or(bytes.len());
                continue;
            }
            b'/' if bytes.get(idx + 1) == Some(&b'*') => {
                let offset = bytes[idx + 2..].windows(2).position(|pair| pair == b"*/")?;
                idx += offset + 4;
                continue;
            }
            b'[' => depth += 1,
            b']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx);
                }
            }
            _ => {}
        }
        idx += 1;
    }
    None
}

/// Index just past the closing quote of the string literal opening at `start`.
fn skip_string(bytes: &[u8], start: usize) -> Option<usize> {
    let quote = bytes[start];
    let mut idx = start + 1;
    while idx < bytes.len() {
        match bytes[idx] {
            b'\\' => idx += 2,
            byte if byte == quote => return Some(idx + 1),
            _ => idx += 1,
        }
    }
    None
}

/// Rewrites the object-literal entries of the PRODUCTS array as a JSON array.
///
/// Bare keys are quoted, trailing commas dropped, single-quoted strings
/// requoted and numeric separators removed. This is a token rewrite, not a
/// TypeScript parser: comments and template literals are rejected.
pub fn object_literal_to_json(text: &str) -> Result<String, AssetError> {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len() + 64);
    out.push('[');
    let mut idx = 0;
    while idx < bytes.len() {
        let byte = bytes[idx];
        match byte {
            b'"' | b'\'' => {
                let end = skip_string(bytes, idx).ok_or_else(|| {
                    AssetError::catalog(format!("unterminated string literal at byte {idx}"))
                })?;
                if byte == b'"' {
                    out.push_str(&text[idx..end]);
                } else {
                    out.push_str(&requote_single(&text[idx + 1..end - 1]));
                }
                idx = end;
            }
            b'`' => {
                return Err(AssetError::catalog(
                    "template literals are not supported in the PRODUCTS array",
                ));
            }
            b'/' if matches!(bytes.get(idx + 1), Some(b'/') | Some(b'*')) => {
                return Err(AssetError::catalog(
                    "comments are not supported in the PRODUCTS array",
                ));
            }
            b',' => {
                if !matches!(next_significant(bytes, idx + 1), None | Some(b'}') | Some(b']')) {
                    out.push(',');
                }
                idx += 1;
            }
            b'0'..=b'9' => {
                let end = scan_while(bytes, idx, |b| b.is_ascii_alphanumeric() || b == b'.' || b == b'_');
                out.extend(text[idx..end].chars().filter(|ch| *ch != '_'));
                idx = end;
            }
            _ if is_ident_start(byte) => {
                let end = scan_while(bytes, idx, is_ident_byte);
                let ident = &text[idx..end];
                if next_significant(bytes, end) == Some(b':') {
                    out.push('"');
                    out.push_str(ident);
                    out.push('"');
                } else {
                    out.push_str(ident);
                }
                idx = end;
            }
            _ => {
                let Some(ch) = text[idx..].chars().next() else {
                    break;
                };
                out.push(ch);
                idx += ch.len_utf8();
            }
        }
    }
    out.push(']');
    Ok(out)
}

pub fn parse_products(source: &str) -> Result<Vec<Product>, AssetError> {
    let block = extract_products_block(source)?;
    let json_text = object_literal_to_json(block)?;
    let rows: Vec<CatalogRow> = serde_json::from_str(&json_text)
        .map_err(|err| AssetError::catalog(format!("PRODUCTS entries are malformed: {err}")))?;
    let products: Vec<Product> = rows.into_iter().map(Product::from).collect();
    validate_ids(&products)?;
    Ok(products)
}

pub fn load_products(path: &Path) -> anyhow::Result<Vec<Product>> {
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("failed reading catalog {}", path.display()))?;
    Ok(parse_products(&source)?)
}

// Ids become image file stems, so they must be unique and path-safe.
fn validate_ids(products: &[Product]) -> Result<(), AssetError> {
    let mut seen = HashSet::new();
    for product in products {
        let id = product.id.as_str();
        if id.trim().is_empty() {
            return Err(AssetError::catalog("product with empty id"));
        }
        if id.contains(['/', '\\']) || id.contains("..") {
            return Err(AssetError::catalog(format!(
                "product id '{id}' cannot be used as a file name"
            )));
        }
        if !seen.insert(id) {
            return Err(AssetError::catalog(format!("duplicate product id '{id}'")));
        }
    }
    Ok(())
}

fn requote_single(inner: &str) -> String {
    let mut out = String::with_capacity(inner.len() + 2);
    out.push('"');
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some('\'') => out.push('\''),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push_str("\\\\"),
            },
            '"' => out.push_str("\\\""),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

fn next_significant(bytes: &[u8], from: usize) -> Option<u8> {
    bytes[from.min(bytes.len())..]
        .iter()
        .copied()
        .find(|byte| !byte.is_ascii_whitespace())
}

fn scan_while(bytes: &[u8], from: usize, keep: impl Fn(u8) -> bool) -> usize {
    bytes[from..]
        .iter()
        .position(|byte| !keep(*byte))
        .map(|offset| from + offset)
        .unwrap_or(bytes.len())
}

fn is_ident_start(byte: u8) -> bool {
    byte.is_ascii_alphabetic() || byte == b'_' || byte == b'$'
}

fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'$'
}
