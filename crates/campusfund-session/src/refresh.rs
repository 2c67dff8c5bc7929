//! The refresh call itself: trade a refresh token for a new access token.

use std::sync::Arc;

use campusfund_protocol::{ApiRequest, RefreshRequest, RefreshResponse};
use campusfund_transport::Transport;

use crate::RefreshError;

/// A successful refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Grant {
    pub(crate) access: String,
    /// Present only when the backend rotated the refresh token.
    pub(crate) refresh: Option<String>,
}

/// POSTs `{"refresh": …}` to `path` and interprets the answer.
///
/// The request is refresh-exempt, so even if it were routed back through
/// the session pipeline its own 401 could never start another refresh.
pub(crate) async fn request_grant<T: Transport>(
    transport: &T,
    path: &str,
    refresh_token: &str,
) -> Result<Grant, RefreshError> {
    let request = ApiRequest::post(path)
        .exempt()
        .with_json(&RefreshRequest {
            refresh: refresh_token.to_string(),
        })
        .map_err(|e| RefreshError::Malformed(e.to_string()))?;

    let response = transport
        .send(request)
        .await
        .map_err(|e| RefreshError::Transport(Arc::new(e)))?;

    if !response.is_success() {
        return Err(RefreshError::Rejected {
            status: response.status,
            body: response.text(),
        });
    }

    let body: RefreshResponse = response
        .json()
        .map_err(|e| RefreshError::Malformed(e.to_string()))?;

    let access = body
        .access
        .filter(|a| !a.is_empty())
        .ok_or(RefreshError::MissingAccessToken)?;

    Ok(Grant {
        access,
        refresh: body.refresh.filter(|r| !r.is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use campusfund_protocol::{ApiResponse, Method};
    use campusfund_transport::TransportError;

    /// Answers every request with a fixed response (or a refused
    /// connection for `None`) and records what it saw.
    struct Canned {
        reply: Option<ApiResponse>,
        seen: Mutex<Vec<ApiRequest>>,
    }

    impl Canned {
        fn new(reply: Option<ApiResponse>) -> Self {
            Self { reply, seen: Mutex::new(Vec::new()) }
        }
    }

    impl Transport for Canned {
        async fn send(
            &self,
            request: ApiRequest,
        ) -> Result<ApiResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            self.reply
                .clone()
                .ok_or_else(|| TransportError::ConnectionFailed("refused".into()))
        }
    }

    const PATH: &str = "/api/auth/token/refresh/";

    #[tokio::test]
    async fn test_request_grant_sends_exempt_json_post() {
        let t = Canned::new(Some(ApiResponse::new(200, r#"{"access":"A2"}"#)));
        let grant = request_grant(&t, PATH, "R1").await.unwrap();

        assert_eq!(grant, Grant { access: "A2".into(), refresh: None });

        let seen = t.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].method, Method::Post);
        assert_eq!(seen[0].path, PATH);
        assert!(seen[0].skip_auth_refresh);
        assert_eq!(seen[0].bearer_token(), None);
        assert_eq!(seen[0].body.as_deref(), Some(&br#"{"refresh":"R1"}"#[..]));
    }

    #[tokio::test]
    async fn test_request_grant_keeps_rotated_refresh_token() {
        let t = Canned::new(Some(ApiResponse::new(
            200,
            r#"{"access":"A2","refresh":"R2"}"#,
        )));
        let grant = request_grant(&t, PATH, "R1").await.unwrap();
        assert_eq!(grant.refresh.as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_request_grant_non_2xx_is_rejected() {
        let t = Canned::new(Some(ApiResponse::new(
            401,
            r#"{"detail":"Token is invalid or expired"}"#,
        )));
        let err = request_grant(&t, PATH, "R1").await.unwrap_err();
        assert!(
            matches!(&err, RefreshError::Rejected { status: 401, body } if body.contains("expired"))
        );
    }

    #[tokio::test]
    async fn test_request_grant_empty_access_is_missing() {
        let t = Canned::new(Some(ApiResponse::new(200, r#"{"access":""}"#)));
        let err = request_grant(&t, PATH, "R1").await.unwrap_err();
        assert!(matches!(err, RefreshError::MissingAccessToken));
    }

    #[tokio::test]
    async fn test_request_grant_non_json_body_is_malformed() {
        let t = Canned::new(Some(ApiResponse::new(200, "<html></html>")));
        let err = request_grant(&t, PATH, "R1").await.unwrap_err();
        assert!(matches!(err, RefreshError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_request_grant_transport_failure() {
        let t = Canned::new(None);
        let err = request_grant(&t, PATH, "R1").await.unwrap_err();
        assert!(matches!(err, RefreshError::Transport(_)));
    }
}
