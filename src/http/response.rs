//! Gateway-generated responses.
//!
//! Backend responses are relayed untouched; only responses the gateway
//! produces itself are built here or in [`crate::error::GatewayError`].

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Body of the response for requests no route matches.
pub const NOT_FOUND_BODY: &str = "404 page not found";

/// Plain-text 404 for unmatched requests.
pub fn not_found() -> Response {
    (StatusCode::NOT_FOUND, NOT_FOUND_BODY).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::header;

    #[test]
    fn not_found_is_plain_text() {
        let response = not_found();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response
            .headers()
            .get(header::CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));
    }
}
