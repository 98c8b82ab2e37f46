use std::time::Instant;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, HeaderName, Request},
    middleware::Next,
    response::Response,
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;
use crate::domain::quota::Identity;

const FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
const UNKNOWN_CLIENT: &str = "unknown";
const MAX_IDENTITY_LEN: usize = 256;

#[derive(Clone)]
pub struct RequestContext {
    pub request_id: String,
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let ctx = RequestContext {
        request_id: request_id.clone(),
    };
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    response.extensions_mut().insert(ctx);
    response
}

/// Maps request headers to the identity that quota is charged against.
///
/// The user header is only trustworthy behind the sign-in gateway, which must
/// strip it from client requests.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    user_header: HeaderName,
    client_header: HeaderName,
}

impl IdentityResolver {
    pub fn new(user_header: HeaderName, client_header: HeaderName) -> Self {
        Self {
            user_header,
            client_header,
        }
    }

    pub fn resolve(&self, headers: &HeaderMap) -> Identity {
        if let Some(user) = header_text(headers, &self.user_header) {
            return Identity::Authenticated(user);
        }
        let client = header_text(headers, &self.client_header)
            .or_else(|| {
                header_text(headers, &FORWARDED_FOR)
                    .and_then(|chain| chain.split(',').next().map(|hop| hop.trim().to_string()))
                    .filter(|hop| !hop.is_empty())
            })
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
        Identity::Anonymous(client)
    }
}

fn header_text(headers: &HeaderMap, name: &HeaderName) -> Option<String> {
    let value = headers.get(name)?.to_str().ok()?.trim();
    (!value.is_empty() && value.len() <= MAX_IDENTITY_LEN).then(|| value.to_string())
}

pub async fn resolve_identity(
    State(resolver): State<IdentityResolver>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let identity = resolver.resolve(request.headers());
    request.extensions_mut().insert(identity);
    next.run(request).await
}

pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();

    let request_id = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.request_id.clone())
        .unwrap_or_default();
    let identity = request
        .extensions()
        .get::<Identity>()
        .map(Identity::key)
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        let elapsed_ms = start.elapsed().as_millis();
        let report = response.extensions_mut().remove::<ErrorReport>();
        let (source, messages) = match report {
            Some(report) => (report.source, report.messages),
            None => ("unknown", Vec::new()),
        };
        let detail = messages
            .first()
            .cloned()
            .unwrap_or_else(|| "no diagnostic available".to_string());

        if status.is_server_error() {
            error!(
                target = "pagesmith::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                chain = ?messages,
                request_id = request_id,
                identity = identity,
                "request failed",
            );
        } else {
            warn!(
                target = "pagesmith::http::response",
                status = status.as_u16(),
                method = %method,
                path = %uri.path(),
                elapsed_ms = elapsed_ms,
                source = source,
                detail = %detail,
                request_id = request_id,
                identity = identity,
                "client request error",
            );
        }
    }

    response
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn resolver() -> IdentityResolver {
        IdentityResolver::new(
            HeaderName::from_static("x-authenticated-user"),
            HeaderName::from_static("x-client-id"),
        )
    }

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn gateway_user_wins_over_client_key() {
        let identity = resolver().resolve(&headers(&[
            ("x-authenticated-user", "alice"),
            ("x-client-id", "tab-1"),
        ]));
        assert_eq!(identity, Identity::Authenticated("alice".to_string()));
    }

    #[test]
    fn client_key_then_forwarded_for_then_unknown() {
        let resolver = resolver();
        assert_eq!(
            resolver.resolve(&headers(&[("x-client-id", " tab-1 ")])),
            Identity::Anonymous("tab-1".to_string())
        );
        assert_eq!(
            resolver.resolve(&headers(&[("x-forwarded-for", "203.0.113.9, 10.0.0.1")])),
            Identity::Anonymous("203.0.113.9".to_string())
        );
        assert_eq!(
            resolver.resolve(&HeaderMap::new()),
            Identity::Anonymous("unknown".to_string())
        );
    }

    #[test]
    fn blank_user_header_is_ignored() {
        let identity = resolver().resolve(&headers(&[("x-authenticated-user", "  ")]));
        assert_eq!(identity.class(), crate::domain::quota::IdentityClass::Anonymous);
    }
}
