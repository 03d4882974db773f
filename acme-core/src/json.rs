use serde_json::Value;

use crate::Error;

/// Render `value` as canonical JSON: object members sorted by name, no insignificant
/// whitespace. RFC 7638 thumbprints are digests over this form.
pub fn canonical(value: &Value) -> Result<String, Error> {
    let mut out = String::new();
    render(value, &mut out)?;
    Ok(out)
}

fn render(value: &Value, out: &mut String) -> Result<(), Error> {
    match value {
        Value::Object(fields) => {
            let mut members: Vec<(&String, &Value)> = fields.iter().collect();
            members.sort_unstable_by(|(a, _), (b, _)| a.cmp(b));

            out.push('{');
            for (i, (name, member)) in members.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(name)?);
                out.push(':');
                render(member, out)?;
            }
            out.push('}');
        }
        Value::Array(elements) => {
            out.push('[');
            for (i, element) in elements.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render(element, out)?;
            }
            out.push(']');
        }
        // scalars already have exactly one JSON rendering
        leaf => out.push_str(&serde_json::to_string(leaf)?),
    }
    Ok(())
}
