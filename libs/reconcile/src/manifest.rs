//! Deployment manifest retargeting.

use serde_json::Value;

use crate::ReconcileError;

/// Manifest key holding the deployment name.
pub const NAME_KEY: &str = "name";

/// Manifest key holding the target workspace FQN.
pub const WORKSPACE_FQN_KEY: &str = "workspace_fqn";

/// Copy `manifest` with `name` and `workspace_fqn` overridden.
///
/// This is a shallow override; every other field is kept as-is.
pub fn retarget_manifest(
    manifest: &Value,
    name: &str,
    workspace_fqn: &str,
) -> Result<Value, ReconcileError> {
    let Value::Object(fields) = manifest else {
        return Err(ReconcileError::InvalidManifest(format!(
            "expected a JSON object, got {}",
            kind(manifest)
        )));
    };

    let mut fields = fields.clone();
    fields.insert(NAME_KEY.to_string(), Value::String(name.to_string()));
    fields.insert(
        WORKSPACE_FQN_KEY.to_string(),
        Value::String(workspace_fqn.to_string()),
    );
    Ok(Value::Object(fields))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
