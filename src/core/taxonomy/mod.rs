//! # Taxonomy Codec
//!
//! Depth-encoded flat-list ⇄ nested-element conversion for the hierarchical
//! classification metadata attached to books.
//!
//! The wire form is an ordered sequence of tab-separated records
//! `path-tokens..., node-id, leaf-count`, a flattened pre-order walk of a
//! tree where depth alone carries the structure: a record one level deeper
//! than its predecessor is a child, equal depth is a sibling, shallower
//! closes ancestors. Elements close in strict depth order matching each
//! depth decrease, so a single "previous depth" integer replaces an explicit
//! stack.

use crate::error::{Result, TaxonomyError};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One event of the nested-element output stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionEvent {
    /// Open a section element
    Open { id: String, count: u64 },
    /// Close the innermost open section element
    Close,
}

/// Convert the flat depth-encoded records into a balanced open/close
/// event stream. Empty input yields empty output.
pub fn encode<S: AsRef<str>>(lines: &[S]) -> Result<Vec<SectionEvent>> {
    let mut events = Vec::new();
    let mut prev_depth: Option<usize> = None;

    for (number, line) in lines.iter().enumerate() {
        let fields: Vec<&str> = line.as_ref().split('\t').collect();
        if fields.len() < 3 {
            return Err(TaxonomyError::TooFewFields { line: number + 1 }.into());
        }
        let count_field = fields[fields.len() - 1];
        let count: u64 = count_field
            .trim()
            .parse()
            .map_err(|_| TaxonomyError::BadLeafCount {
                line: number + 1,
                value: count_field.to_string(),
            })?;
        let id = fields[fields.len() - 2].to_string();
        let depth = fields.len() - 3;

        match prev_depth {
            // First record opens at its depth.
            None => {}
            // Sibling: close the element open at this depth.
            Some(previous) if depth == previous => events.push(SectionEvent::Close),
            // Child: nest without closing.
            Some(previous) if depth > previous => {}
            // Shallower: close every open element down to and including
            // this depth, then open a sibling.
            Some(previous) => {
                for _ in depth..=previous {
                    events.push(SectionEvent::Close);
                }
            }
        }
        events.push(SectionEvent::Open { id, count });
        prev_depth = Some(depth);
    }

    if let Some(previous) = prev_depth {
        for _ in 0..=previous {
            events.push(SectionEvent::Close);
        }
    }

    Ok(events)
}

/// Flatten an event stream back into `(depth, id, count)` tuples, the
/// inverse of [`encode`] minus the path tokens.
pub fn flatten(events: &[SectionEvent]) -> Result<Vec<(usize, String, u64)>> {
    let mut records = Vec::new();
    let mut depth: usize = 0;
    for event in events {
        match event {
            SectionEvent::Open { id, count } => {
                records.push((depth, id.clone(), *count));
                depth += 1;
            }
            SectionEvent::Close => {
                depth = depth
                    .checked_sub(1)
                    .ok_or(TaxonomyError::UnbalancedClose)?;
            }
        }
    }
    Ok(records)
}

/// Render the event stream as a nested JSON forest of
/// `{ "id", "count", "children" }` nodes.
pub fn to_json(events: &[SectionEvent]) -> Result<Value> {
    // (id, count, children) frames of the currently open elements
    let mut stack: Vec<(String, u64, Vec<Value>)> = Vec::new();
    let mut roots = Vec::new();

    for event in events {
        match event {
            SectionEvent::Open { id, count } => {
                stack.push((id.clone(), *count, Vec::new()));
            }
            SectionEvent::Close => {
                let (id, count, children) =
                    stack.pop().ok_or(TaxonomyError::UnbalancedClose)?;
                let mut node = json!({ "id": id, "count": count });
                if !children.is_empty() {
                    node["children"] = Value::Array(children);
                }
                match stack.last_mut() {
                    Some((_, _, siblings)) => siblings.push(node),
                    None => roots.push(node),
                }
            }
        }
    }

    Ok(Value::Array(roots))
}
