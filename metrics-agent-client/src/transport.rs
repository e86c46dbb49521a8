use std::future::Future;
use std::time::Duration;

use http_body_util::{BodyExt, Collected, Full};
use hyper::body::Bytes;
use hyper::{Request, Response};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::error::TransportError;

/// Performs HTTP requests on behalf of the push client and the credential bootstrap.
///
/// The response body is read fully before returning, so callers never hold on to a connection.
pub trait HttpTransport {
    /// Sends `request` and returns the response with its collected body.
    fn request(
        &self,
        request: Request<Full<Bytes>>,
    ) -> impl Future<Output = Result<Response<Bytes>, TransportError>> + Send;
}

/// An [`HttpTransport`] backed by a `hyper` client, speaking HTTP/1 over plain TCP or TLS.
///
/// Every request, including reading its body, is bounded by a timeout. Idle connections are not
/// kept: sends are minutes apart, and intermediaries tend to reset connections that sit idle for
/// that long.
#[derive(Clone, Debug)]
pub struct HyperTransport {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl HyperTransport {
    /// Creates a new `HyperTransport` with the given per-request timeout.
    ///
    /// ## Errors
    ///
    /// If the native root certificates cannot be loaded, an error is returned.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_native_roots()
            .map_err(TransportError::Tls)?
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).pool_max_idle_per_host(0).build(https);

        Ok(Self { client, timeout })
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl HttpTransport for HyperTransport {
    async fn request(
        &self,
        request: Request<Full<Bytes>>,
    ) -> Result<Response<Bytes>, TransportError> {
        let exchange = async {
            let response = self.client.request(request).await?;
            let (parts, body) = response.into_parts();
            let body = body.collect().await.map(Collected::to_bytes)?;
            Ok::<_, TransportError>(Response::from_parts(parts, body))
        };

        match tokio::time::timeout(self.timeout, exchange).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        }
    }
}
