//! MongoDB query semantics over owned BSON documents
//!
//! Covers the filter, sort and projection subset produced by the query
//! builder and the repositories:
//!
//! - top-level document is an implicit AND; `$and`, `$or`, `$nor` arrays
//! - `{ field: value }` is equality; arrays match when any element matches
//! - `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`
//! - `$regex` with an optional `$options` sibling (`i`, `m`, `s`, `x`)
//!
//! Comparisons only succeed inside one type bracket (numbers with numbers,
//! strings with strings, ...). A string operand is coerced to the stored type
//! when it parses, so uncast query-string values still compare numerically.

use std::cmp::Ordering;

use bson::{Bson, Document};
use regex::Regex;

use super::error::{StoreError, StoreOperation};

/// A filter, sort or projection document the matcher cannot interpret.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MatchError(pub String);

impl MatchError {
    pub(crate) fn into_store_error(self, operation: StoreOperation, collection: &str) -> StoreError {
        StoreError::invalid_query(operation, self.0).in_collection(collection)
    }
}

type MatchResult<T> = Result<T, MatchError>;

/// Does `doc` satisfy `filter`?
pub(crate) fn matches(doc: &Document, filter: &Document) -> MatchResult<bool> {
    for (key, condition) in filter {
        let satisfied = match key.as_str() {
            "$and" => {
                let mut all = true;
                for sub in sub_filters(key, condition)? {
                    if !matches(doc, sub)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => any_matches(doc, key, condition)?,
            "$nor" => !any_matches(doc, key, condition)?,
            k if k.starts_with('$') => {
                return Err(MatchError(format!("unknown top-level operator: {k}")));
            }
            field => field_matches(lookup(doc, field), condition)?,
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn any_matches(doc: &Document, key: &str, condition: &Bson) -> MatchResult<bool> {
    for sub in sub_filters(key, condition)? {
        if matches(doc, sub)? {
            return Ok(true);
        }
    }
    Ok(false)
}

fn sub_filters<'a>(key: &str, condition: &'a Bson) -> MatchResult<Vec<&'a Document>> {
    let items = match condition {
        Bson::Array(items) if !items.is_empty() => items,
        _ => return Err(MatchError(format!("{key} must be a nonempty array"))),
    };

    items
        .iter()
        .map(|item| match item {
            Bson::Document(sub) => Ok(sub),
            _ => Err(MatchError(format!("{key} entries must be documents"))),
        })
        .collect()
}

/// Resolve a dotted path through nested documents.
pub(crate) fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            _ => return None,
        };
    }
    Some(current)
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn field_matches(value: Option<&Bson>, condition: &Bson) -> MatchResult<bool> {
    match condition {
        Bson::Document(ops) if is_operator_document(ops) => operator_matches(value, ops),
        Bson::RegularExpression(re) => {
            let compiled = build_regex(&re.pattern, Some(&re.options))?;
            Ok(regex_matches(value, &compiled))
        }
        target => Ok(equals(value, target)),
    }
}

fn operator_matches(value: Option<&Bson>, ops: &Document) -> MatchResult<bool> {
    for (op, operand) in ops {
        let satisfied = match op.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |o| o == Ordering::Greater),
            "$gte" => compares(value, operand, |o| o != Ordering::Less),
            "$lt" => compares(value, operand, |o| o == Ordering::Less),
            "$lte" => compares(value, operand, |o| o != Ordering::Greater),
            "$in" => in_list(value, op, operand)?,
            "$nin" => !in_list(value, op, operand)?,
            "$exists" => value.is_some() == truthy(operand),
            "$regex" => {
                let pattern = match operand {
                    Bson::String(s) => s.as_str(),
                    Bson::RegularExpression(re) => re.pattern.as_str(),
                    _ => return Err(MatchError("$regex has to be a string".into())),
                };
                let options = match ops.get("$options") {
                    Some(Bson::String(o)) => Some(o.as_str()),
                    Some(_) => return Err(MatchError("$options has to be a string".into())),
                    None => None,
                };
                regex_matches(value, &build_regex(pattern, options)?)
            }
            "$options" => {
                if !ops.contains_key("$regex") {
                    return Err(MatchError("$options needs a $regex".into()));
                }
                true
            }
            other => return Err(MatchError(format!("unknown operator: {other}"))),
        };

        if !satisfied {
            return Ok(false);
        }
    }

    Ok(true)
}

fn in_list(value: Option<&Bson>, op: &str, operand: &Bson) -> MatchResult<bool> {
    match operand {
        Bson::Array(candidates) => Ok(candidates.iter().any(|c| equals(value, c))),
        _ => Err(MatchError(format!("{op} needs an array"))),
    }
}

fn build_regex(pattern: &str, options: Option<&str>) -> MatchResult<Regex> {
    let mut full = String::with_capacity(pattern.len() + 6);
    if let Some(opts) = options.filter(|o| !o.is_empty()) {
        full.push_str("(?");
        for ch in opts.chars() {
            match ch {
                'i' | 'm' | 's' | 'x' => full.push(ch),
                c => return Err(MatchError(format!("invalid flag in regex options: {c}"))),
            }
        }
        full.push(')');
    }
    full.push_str(pattern);

    Regex::new(&full).map_err(|e| MatchError(format!("invalid regex: {e}")))
}

fn regex_matches(value: Option<&Bson>, re: &Regex) -> bool {
    match value {
        Some(Bson::String(s)) => re.is_match(s),
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| matches!(item, Bson::String(s) if re.is_match(s))),
        _ => false,
    }
}

fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Int32(n) => *n != 0,
        Bson::Int64(n) => *n != 0,
        Bson::Double(n) => *n != 0.0,
        Bson::Null | Bson::Undefined => false,
        _ => true,
    }
}

/// Equality with array-element and null-matches-missing semantics.
fn equals(value: Option<&Bson>, target: &Bson) -> bool {
    match value {
        None | Some(Bson::Null) => matches!(target, Bson::Null),
        Some(Bson::Array(items)) => {
            values_equal(&Bson::Array(items.clone()), target)
                || items.iter().any(|item| values_equal(item, target))
        }
        Some(stored) => values_equal(stored, target),
    }
}

fn values_equal(stored: &Bson, target: &Bson) -> bool {
    compare_values(stored, target) == Some(Ordering::Equal) || stored == target
}

fn compares(value: Option<&Bson>, operand: &Bson, predicate: fn(Ordering) -> bool) -> bool {
    match value {
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare_values(item, operand).is_some_and(predicate)),
        Some(stored) => compare_values(stored, operand).is_some_and(predicate),
        None => false,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(n) => Some(f64::from(*n)),
        Bson::Int64(n) => Some(*n as f64),
        Bson::Double(n) => Some(*n),
        _ => None,
    }
}

/// Order a stored value against a query operand; `None` across type brackets.
fn compare_values(stored: &Bson, query: &Bson) -> Option<Ordering> {
    if let (Some(a), Some(b)) = (as_number(stored), as_number(query)) {
        return a.partial_cmp(&b);
    }

    match (stored, query) {
        (Bson::String(a), Bson::String(b)) => Some(a.cmp(b)),
        (Bson::Boolean(a), Bson::Boolean(b)) => Some(a.cmp(b)),
        (Bson::DateTime(a), Bson::DateTime(b)) => {
            Some(a.timestamp_millis().cmp(&b.timestamp_millis()))
        }
        (Bson::ObjectId(a), Bson::ObjectId(b)) => Some(a.bytes().cmp(&b.bytes())),
        (_, Bson::String(s)) => coerce_string(stored, s),
        _ => None,
    }
}

fn coerce_string(stored: &Bson, raw: &str) -> Option<Ordering> {
    match stored {
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => {
            let parsed = raw.trim().parse::<f64>().ok()?;
            as_number(stored)?.partial_cmp(&parsed)
        }
        Bson::Boolean(a) => raw.parse::<bool>().ok().map(|b| a.cmp(&b)),
        Bson::ObjectId(a) => Some(a.to_hex().as_str().cmp(raw)),
        Bson::DateTime(a) => bson::DateTime::parse_rfc3339_str(raw)
            .ok()
            .map(|b| a.timestamp_millis().cmp(&b.timestamp_millis())),
        _ => None,
    }
}

/// Sort documents in place by a `{ field: 1 | -1 }` specification (stable).
pub(crate) fn sort_documents(docs: &mut [Document], sort: &Document) -> MatchResult<()> {
    let keys = sort
        .iter()
        .map(|(field, direction)| {
            let ascending = match as_number(direction) {
                Some(d) if d == 1.0 => true,
                Some(d) if d == -1.0 => false,
                _ => {
                    return Err(MatchError(format!(
                        "bad sort specification for {field}: expected 1 or -1"
                    )))
                }
            };
            Ok((field.as_str(), ascending))
        })
        .collect::<MatchResult<Vec<_>>>()?;

    docs.sort_by(|a, b| {
        for (field, ascending) in &keys {
            let ordering = order_values(lookup(a, field), lookup(b, field));
            let ordering = if *ascending { ordering } else { ordering.reverse() };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    });

    Ok(())
}

fn type_rank(value: Option<&Bson>) -> u8 {
    match value {
        None | Some(Bson::Null) | Some(Bson::Undefined) => 1,
        Some(Bson::Int32(_)) | Some(Bson::Int64(_)) | Some(Bson::Double(_)) => 2,
        Some(Bson::String(_)) | Some(Bson::Symbol(_)) => 3,
        Some(Bson::Document(_)) => 4,
        Some(Bson::Array(_)) => 5,
        Some(Bson::Binary(_)) => 6,
        Some(Bson::ObjectId(_)) => 7,
        Some(Bson::Boolean(_)) => 8,
        Some(Bson::DateTime(_)) => 9,
        Some(Bson::Timestamp(_)) => 10,
        Some(Bson::RegularExpression(_)) => 11,
        Some(_) => 12,
    }
}

/// Total order across types, following MongoDB's BSON comparison order.
pub(crate) fn order_values(a: Option<&Bson>, b: Option<&Bson>) -> Ordering {
    let (rank_a, rank_b) = (type_rank(a), type_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }

    match (a, b) {
        (Some(x), Some(y)) => match (x, y) {
            (Bson::String(p), Bson::String(q)) => p.cmp(q),
            (Bson::ObjectId(p), Bson::ObjectId(q)) => p.bytes().cmp(&q.bytes()),
            (Bson::Boolean(p), Bson::Boolean(q)) => p.cmp(q),
            (Bson::DateTime(p), Bson::DateTime(q)) => {
                p.timestamp_millis().cmp(&q.timestamp_millis())
            }
            _ => match (as_number(x), as_number(y)) {
                (Some(p), Some(q)) => p.partial_cmp(&q).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            },
        },
        _ => Ordering::Equal,
    }
}

/// Write `value` at a dotted path, creating intermediate documents.
pub(crate) fn set_path(doc: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            doc.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(doc.get(head), Some(Bson::Document(_))) {
                doc.insert(head, Document::new());
            }
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                set_path(inner, rest, value);
            }
        }
    }
}

fn remove_path(doc: &mut Document, path: &str) {
    match path.split_once('.') {
        None => {
            doc.remove(path);
        }
        Some((head, rest)) => {
            if let Some(Bson::Document(inner)) = doc.get_mut(head) {
                remove_path(inner, rest);
            }
        }
    }
}

/// Shape a document with an inclusion or exclusion projection.
///
/// Dotted paths select or drop fields inside embedded documents.
pub(crate) fn project(doc: Document, projection: &Document) -> MatchResult<Document> {
    let include_id = projection.get("_id").map_or(true, truthy);

    let mut inclusion: Option<bool> = None;
    for (field, flag) in projection {
        if field == "_id" {
            continue;
        }
        let include = truthy(flag);
        match inclusion {
            None => inclusion = Some(include),
            Some(mode) if mode != include => {
                return Err(MatchError(format!(
                    "cannot mix inclusion and exclusion in projection (field {field})"
                )));
            }
            Some(_) => {}
        }
    }

    // `{ _id: 1 }` alone selects only the id
    let inclusion = inclusion.or(projection.get("_id").filter(|v| truthy(v)).map(|_| true));

    match inclusion {
        Some(true) => {
            let mut shaped = Document::new();
            if include_id {
                if let Some(id) = doc.get("_id") {
                    shaped.insert("_id", id.clone());
                }
            }
            for (field, flag) in projection {
                if field == "_id" || !truthy(flag) {
                    continue;
                }
                if let Some(value) = lookup(&doc, field) {
                    set_path(&mut shaped, field, value.clone());
                }
            }
            Ok(shaped)
        }
        _ => {
            let mut shaped = doc;
            for (field, flag) in projection {
                if field != "_id" && !truthy(flag) {
                    remove_path(&mut shaped, field);
                }
            }
            if !include_id {
                shaped.remove("_id");
            }
            Ok(shaped)
        }
    }
}
