//! Response envelope rules.
//!
//! Console endpoints wrap their payloads in a loose JSON envelope. A `200 OK`
//! can still carry an application error, signalled by a `traceback` field,
//! a non-zero `status`, or a `code` of 500 or 503.

use serde_json::Value;

/// Returns true if a successful response actually describes an error.
pub fn is_error_response(response: &Value) -> bool {
    let Some(fields) = response.as_object() else {
        return false;
    };

    fields.contains_key("traceback")
        || fields
            .get("status")
            .is_some_and(|status| status.as_f64() != Some(0.0))
        || matches!(
            fields.get("code").and_then(Value::as_i64),
            Some(500) | Some(503)
        )
}

/// Returns true if the envelope is a "not found" answer.
///
/// Endpoint wrappers flag missing entities with `notFound: true`; such
/// answers have `status: 0` and are cached like any other answer so that
/// repeated lookups of a missing table do not hit the backend.
pub fn is_not_found(response: &Value) -> bool {
    response.get("notFound").and_then(Value::as_bool) == Some(true)
        && response.get("status").and_then(Value::as_i64) == Some(0)
}

/// Returns true if the response must be treated as a failure.
pub fn is_failure(response: &Value) -> bool {
    is_error_response(response) && !is_not_found(response)
}

/// Cache condition shared by most metadata endpoints: `status == 0`.
pub fn generic_cache_condition(response: &Value) -> bool {
    response.get("status").and_then(Value::as_i64) == Some(0)
}

/// Returns true if an engine error means the entity simply does not exist.
///
/// Hive reports `[Error 10001]` (table not found); Impala reports an
/// `AnalysisException` when a path cannot be resolved.
pub fn is_missing_entity(response: &Value) -> bool {
    generic_cache_condition(response)
        && response.get("code").and_then(Value::as_i64) == Some(500)
        && response
            .get("error")
            .and_then(Value::as_str)
            .is_some_and(|error| error.contains("Error 10001") || error.contains("AnalysisException"))
}
