use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::state::AppState;

/// Axum middleware that requires the auth token, either as a bearer token
/// or as the password half of HTTP Basic auth (the username is ignored).
/// The latter exists because Terraform's native HTTP backend only ever
/// sends Basic credentials — it has no notion of bearer tokens.
///
/// Returns 401 for missing, malformed, or incorrect credentials. Applied
/// to every route except `/healthz`.
pub async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let authorized = match header {
        Some(h) => match h.strip_prefix("Bearer ") {
            Some(token) => token == state.auth_token.as_str(),
            None => h
                .strip_prefix("Basic ")
                .and_then(|encoded| BASE64.decode(encoded).ok())
                .and_then(|bytes| String::from_utf8(bytes).ok())
                .and_then(|decoded| decoded.split_once(':').map(|(_, pw)| pw.to_string()))
                .is_some_and(|pw| pw == state.auth_token.as_str()),
        },
        None => false,
    };

    if authorized {
        next.run(request).await
    } else {
        (StatusCode::UNAUTHORIZED, "Unauthorized\n").into_response()
    }
}
