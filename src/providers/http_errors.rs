use std::error::Error as StdError;
use std::io::ErrorKind;
use std::time::Duration;

use reqwest::Response;
use tracing::warn;

use crate::error::{ClientError, ProviderError};

fn error_chain_has_kind(
    err: &(dyn StdError + 'static),
    kind: ErrorKind,
    needle: &str,
) -> bool {
    let mut current: Option<&(dyn StdError + 'static)> = Some(err);
    while let Some(source) = current {
        if let Some(io_err) = source.downcast_ref::<std::io::Error>()
            && io_err.kind() == kind
        {
            return true;
        }

        if source.to_string().to_ascii_lowercase().contains(needle) {
            return true;
        }

        current = source.source();
    }

    false
}

fn error_chain_has_connection_refused(err: &(dyn StdError + 'static)) -> bool {
    error_chain_has_kind(err, ErrorKind::ConnectionRefused, "connection refused")
}

fn error_chain_has_timeout(err: &(dyn StdError + 'static)) -> bool {
    error_chain_has_kind(err, ErrorKind::TimedOut, "timed out")
}

/// Classifies a failed send into `Timeout` or `RequestFailed`.
pub(crate) fn request_error(err: reqwest::Error, api_url: &str, timeout: Duration) -> ClientError {
    warn!(api_url = %api_url, error = %err, "model request failed");

    if err.is_timeout() || error_chain_has_timeout(&err) {
        return ClientError::Timeout { after: timeout };
    }

    let url = api_url.to_string();
    if err.is_connect() {
        if error_chain_has_connection_refused(&err) {
            return ProviderError::ConnectionRefused { url, source: err }.into();
        }
        return ProviderError::Connect { url, source: err }.into();
    }

    ProviderError::Transport { url, source: err }.into()
}

/// Turns a non-success HTTP status into a provider error carrying the body.
pub(crate) async fn ensure_success(response: Response, api_url: &str) -> Result<Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read response body>".to_string());
    warn!(
        api_url = %api_url,
        status = %status,
        response_body_len = body.len(),
        "model API returned non-success status"
    );
    Err(ProviderError::Status { status, body }.into())
}

#[cfg(test)]
mod tests {
    use super::{error_chain_has_connection_refused, error_chain_has_timeout, request_error};
    use crate::error::{ClientError, ProviderError};
    use reqwest::Client;
    use std::net::TcpListener;
    use std::thread;
    use std::time::Duration;

    fn free_local_addr() -> std::net::SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        let addr = listener.local_addr().expect("address should be available");
        drop(listener);
        addr
    }

    #[tokio::test]
    async fn maps_connection_refused_errors_to_request_failed() {
        let addr = free_local_addr();
        let api_url = format!("http://{}/chat/completions", addr);
        let client = Client::builder()
            .timeout(Duration::from_millis(300))
            .build()
            .expect("client should build");

        let req_err = client
            .post(&api_url)
            .send()
            .await
            .expect_err("request should fail with connection-refused");
        let mapped = request_error(req_err, &api_url, Duration::from_secs(1));

        assert!(
            matches!(
                mapped,
                ClientError::RequestFailed(ProviderError::ConnectionRefused { .. })
            ),
            "unexpected error: {mapped:?}"
        );
        let msg = mapped.to_string();
        assert!(
            msg.contains("connection refused by model API"),
            "unexpected message: {msg}"
        );
    }

    #[tokio::test]
    async fn maps_timeout_errors_to_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind should succeed");
        let addr = listener.local_addr().expect("address should be available");
        let server = thread::spawn(move || {
            let (_stream, _) = listener.accept().expect("accept should succeed");
            thread::sleep(Duration::from_secs(1));
        });

        let api_url = format!("http://{}/chat/completions", addr);
        let client = Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("client should build");

        let req_err = client
            .post(&api_url)
            .send()
            .await
            .expect_err("request should fail with timeout");
        let mapped = request_error(req_err, &api_url, Duration::from_secs(2));

        match mapped {
            ClientError::Timeout { after } => assert_eq!(after, Duration::from_secs(2)),
            other => panic!("expected timeout, got {other:?}"),
        }

        server.join().expect("server thread should join");
    }

    #[test]
    fn detects_timeout_from_error_kind() {
        let err = std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out");
        assert!(error_chain_has_timeout(&err));
    }

    #[test]
    fn detects_connection_refused_from_message() {
        let err = std::io::Error::other("tcp connect error: Connection refused (os error 111)");
        assert!(error_chain_has_connection_refused(&err));
        assert!(!error_chain_has_timeout(&err));
    }
}
