use super::*;
use serde_json::json;

#[test]
fn from_body_prefers_message() {
    let body = json!({ "message": "User not found", "code": "E_NOT_FOUND", "details": { "id": "u1" } });
    let err = ApiError::from_body(404, &body);
    assert_eq!(err.message, "User not found");
    assert_eq!(err.code.as_deref(), Some("E_NOT_FOUND"));
    assert_eq!(err.details, Some(json!({ "id": "u1" })));
}

#[test]
fn from_body_uses_error_description() {
    let body = json!({ "error": "invalid_grant", "error_description": "invalid_grant" });
    let err = ApiError::from_body(400, &body);
    assert_eq!(err.message, "invalid_grant");
    assert_eq!(err.code.as_deref(), Some("invalid_grant"));
    assert_eq!(err.details, None);
}

#[test]
fn from_body_falls_back_to_error_string() {
    let err = ApiError::from_body(403, &json!({ "error": "forbidden" }));
    assert_eq!(err.message, "forbidden");
}

#[test]
fn from_body_non_object_uses_status() {
    let err = ApiError::from_body(502, &Value::String("<html>bad gateway</html>".into()));
    assert_eq!(err.message, "Request failed with status 502");
    assert_eq!(err.code, None);
}

#[test]
fn from_body_ignores_null_details() {
    let err = ApiError::from_body(500, &json!({ "message": "boom", "details": null }));
    assert_eq!(err.details, None);
}

#[test]
fn auth_error_displays_bare_message() {
    let err = SessionError::Auth("invalid_grant".into());
    assert_eq!(err.to_string(), "invalid_grant");
    assert_eq!(err.error_code(), "E_AUTH");
}

#[test]
fn server_error_displays_normalized_message() {
    let err = SessionError::Server { status: 500, error: ApiError::new("exploded") };
    assert_eq!(err.to_string(), "exploded");
    assert_eq!(err.status(), Some(500));
}

#[test]
fn session_expired_exposes_cause_and_navigation() {
    let cause = SessionError::Server { status: 401, error: ApiError::new("refresh rejected") };
    let err = SessionError::SessionExpired {
        cause: Box::new(cause),
        navigation: Navigation::Redirect("/login".into()),
    };
    assert_eq!(err.navigation(), Some(&Navigation::Redirect("/login".into())));
    assert_eq!(err.status(), Some(401));
    assert_eq!(err.api_error().message, "refresh rejected");
    assert!(err.to_string().contains("refresh rejected"));
}

#[test]
fn api_error_for_local_kinds_carries_code() {
    let err = SessionError::Storage("disk full".into());
    let api = err.api_error();
    assert_eq!(api.message, "storage error: disk full");
    assert_eq!(api.code.as_deref(), Some("E_STORAGE"));
}

#[test]
fn api_error_serializes_without_empty_fields() {
    let json = serde_json::to_value(ApiError::new("nope")).unwrap();
    assert_eq!(json, json!({ "message": "nope" }));
}

#[test]
fn into_auth_rejection_maps_credential_statuses() {
    for status in [400, 401, 403] {
        let err = SessionError::Server { status, error: ApiError::new("invalid_grant") }.into_auth_rejection();
        assert!(matches!(err, SessionError::Auth(ref m) if m == "invalid_grant"), "status {status}");
    }
}

#[test]
fn into_auth_rejection_keeps_other_errors() {
    let err = SessionError::Server { status: 500, error: ApiError::new("down") }.into_auth_rejection();
    assert!(matches!(err, SessionError::Server { status: 500, .. }));
    let err = SessionError::Transport(ApiError::new("Network error")).into_auth_rejection();
    assert!(matches!(err, SessionError::Transport(_)));
}
