//! Canonical byte form of an application.
//!
//! Object keys are sorted recursively, there is no insignificant whitespace,
//! and non-ASCII text is written as UTF-8. The signature fields are never part
//! of the canonical form, so the bytes are exactly what gets signed.

use crate::error::AppResult;
use serde_json::Value;
use tenderwatch_types::ApplicationRecord;

/// Canonical bytes of the unsigned part of `record`.
pub fn canonical_bytes(record: &ApplicationRecord) -> AppResult<Vec<u8>> {
    let unsigned = ApplicationRecord {
        signature: None,
        signed_at: None,
        ..record.clone()
    };
    let value = serde_json::to_value(&unsigned)?;

    let mut out = Vec::new();
    write_value(&value, &mut out)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut Vec<u8>) -> AppResult<()> {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push(b'{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                serde_json::to_writer(&mut *out, key)?;
                out.push(b':');
                write_value(item, out)?;
            }
            out.push(b'}');
        }
        Value::Array(items) => {
            out.push(b'[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_value(item, out)?;
            }
            out.push(b']');
        }
        scalar => serde_json::to_writer(&mut *out, scalar)?,
    }
    Ok(())
}
