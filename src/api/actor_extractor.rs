use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
    response::Json,
};

use crate::api::handlers::ErrorResponse;
use crate::model::ActorContext;

/// Axum extractor for ActorContext from request headers.
///
/// Mutating routes extract this before touching the store:
/// - X-Actor-Id: required actor identifier
/// - X-Actor-Email: optional email
/// - X-Actor-Name: optional display name
///
/// A request without X-Actor-Id is rejected; there is no implicit
/// default actor.
#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<ErrorResponse>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        match extract_header_value(headers, "x-actor-id") {
            Some(actor_id) if !actor_id.trim().is_empty() => Ok(ActorContext::with_details(
                actor_id,
                extract_header_value(headers, "x-actor-email"),
                extract_header_value(headers, "x-actor-name"),
            )),
            _ => Err((
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "write operations require an X-Actor-Id header".to_string(),
                }),
            )),
        }
    }
}

fn extract_header_value(headers: &HeaderMap, header_name: &str) -> Option<String> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderName, HeaderValue};

    #[test]
    fn header_values_are_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-actor-id"),
            HeaderValue::from_static("tech-17"),
        );
        headers.insert(
            HeaderName::from_static("x-actor-email"),
            HeaderValue::from_static("tech17@lab.example"),
        );

        assert_eq!(
            extract_header_value(&headers, "x-actor-id"),
            Some("tech-17".to_string())
        );
        assert_eq!(
            extract_header_value(&headers, "x-actor-email"),
            Some("tech17@lab.example".to_string())
        );
        assert_eq!(extract_header_value(&headers, "x-actor-name"), None);
    }
}
