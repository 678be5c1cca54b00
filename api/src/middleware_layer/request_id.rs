//! Honors an inbound `x-request-id`, generating a fresh opaque one when the
//! caller didn't send one, and stamps it on the response.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

fn ensure_request_id(request: &Request) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

pub async fn attach_request_id(mut request: Request, next: Next) -> Response {
    let request_id = ensure_request_id(&request);
    let header_name = HeaderName::from_static(REQUEST_ID_HEADER);
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        request.headers_mut().insert(header_name.clone(), value.clone());
        let mut response = next.run(request).await;
        response.headers_mut().insert(header_name, value);
        response
    } else {
        next.run(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Method;

    fn empty_request() -> Request {
        Request::builder()
            .method(Method::GET)
            .uri("/health")
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn generates_an_id_when_none_is_present() {
        let id = ensure_request_id(&empty_request());
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn honors_an_inbound_request_id() {
        let mut request = empty_request();
        request
            .headers_mut()
            .insert(REQUEST_ID_HEADER, HeaderValue::from_static("caller-supplied-id"));
        assert_eq!(ensure_request_id(&request), "caller-supplied-id");
    }

    #[test]
    fn treats_an_empty_header_as_absent() {
        let mut request = empty_request();
        request
            .headers_mut()
            .insert(REQUEST_ID_HEADER, HeaderValue::from_static(""));
        let id = ensure_request_id(&request);
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }
}
