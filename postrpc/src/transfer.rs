//! Transferable buffer detection.
//!
//! Outgoing payloads are scanned for [`Buffer`]s so the port can hand their
//! ownership to the receiver instead of copying them. The resulting list is an
//! ownership hint only; delivery never depends on it.

use crate::{Buffer, Value};

/// Returns true if the value itself is a transferable buffer.
#[must_use]
pub fn is_transferable(value: &Value) -> bool {
    matches!(value, Value::Buffer(_))
}

/// Collects every buffer reachable from `value`, in discovery order.
///
/// Arrays are visited by index and objects by key order. A buffer reachable
/// through several paths is listed once per path.
#[must_use]
pub fn detect(value: &Value) -> Vec<Buffer> {
    let mut found = vec![];
    collect(value, &mut found);
    found
}

fn collect(value: &Value, found: &mut Vec<Buffer>) {
    match value {
        Value::Buffer(buf) => found.push(buf.clone()),
        Value::Array(items) => items.iter().for_each(|item| collect(item, found)),
        Value::Object(map) => map.values().for_each(|item| collect(item, found)),
        Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_) => {}
    }
}
