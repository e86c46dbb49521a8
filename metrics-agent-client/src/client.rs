use std::convert::TryFrom;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use hyper::{Method, Request, StatusCode, Uri};
use quanta::Clock;
use tracing::{debug, trace};

use crate::batch::Batch;
use crate::error::{BuildError, SendError, TransportError};
use crate::proto::DELIMITED_CONTENT_TYPE;
use crate::throttle::{Throttle, DEFAULT_MAX_JITTER};
use crate::transport::{HttpTransport, HyperTransport};

/// Response header carrying the number of seconds the server wants between pushes.
pub const PUSH_INTERVAL_HEADER: &str = "x-metric-push-interval";

/// Request header carrying the app key.
pub const AUTH_KEY_HEADER: &str = "x-auth-key";

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for a [`PushClient`].
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// URL that batches are pushed to.
    pub endpoint: String,

    /// App key used to authenticate pushes.
    pub app_key: String,

    /// Upper bound on a single push, from connecting to reading the response body.
    ///
    /// Defaults to 60 seconds.
    pub timeout: Duration,

    /// Exclusive upper bound of the random jitter added to the wait while backing off.
    ///
    /// Defaults to 15 seconds.
    pub max_backoff_jitter: Duration,
}

impl ClientConfig {
    /// Creates a configuration for the given endpoint and app key, with default settings.
    pub fn new<E, K>(endpoint: E, app_key: K) -> Self
    where
        E: Into<String>,
        K: Into<String>,
    {
        Self {
            endpoint: endpoint.into(),
            app_key: app_key.into(),
            timeout: DEFAULT_TIMEOUT,
            max_backoff_jitter: DEFAULT_MAX_JITTER,
        }
    }
}

/// Pushes batches to the ingestion endpoint, at the pace the server asks for.
///
/// After every successful push the server advises how long the client must wait before the next
/// one. Pushes attempted sooner are refused locally with [`SendError::TooFrequent`], without
/// touching the network. Failed pushes stretch the wait further; see [`Throttle`].
pub struct PushClient<T = HyperTransport> {
    transport: T,
    endpoint: Uri,
    app_key: HeaderValue,
    throttle: Throttle,
}

impl PushClient<HyperTransport> {
    /// Creates a new `PushClient` that sends over HTTP(S).
    ///
    /// ## Errors
    ///
    /// If the endpoint or app key are invalid, or the HTTP transport cannot be set up, an error
    /// variant will be returned describing the error.
    pub fn new(config: ClientConfig) -> Result<Self, BuildError> {
        let transport = HyperTransport::new(config.timeout)?;
        Self::with_transport(config, transport, Clock::new())
    }
}

impl<T: HttpTransport> PushClient<T> {
    /// Creates a new `PushClient` over the given transport, measuring time with `clock`.
    ///
    /// ## Errors
    ///
    /// If the endpoint cannot be parsed into a valid URI, or the app key is not a valid header
    /// value, an error variant will be returned describing the error.
    pub fn with_transport(
        config: ClientConfig,
        transport: T,
        clock: Clock,
    ) -> Result<Self, BuildError> {
        let endpoint = Uri::try_from(config.endpoint.as_str())
            .map_err(|e| BuildError::InvalidEndpoint(e.to_string()))?;
        let mut app_key =
            HeaderValue::from_str(&config.app_key).map_err(|_| BuildError::InvalidAppKey)?;
        app_key.set_sensitive(true);

        let throttle = Throttle::new(clock).with_max_jitter(config.max_backoff_jitter);

        Ok(Self { transport, endpoint, app_key, throttle })
    }

    /// Returns how long to wait before the next push will be accepted.
    pub fn wait_duration(&self) -> Duration {
        self.throttle.wait_duration()
    }

    /// Returns the throttle state of this client.
    pub fn throttle(&self) -> &Throttle {
        &self.throttle
    }

    /// Returns the push endpoint.
    pub fn endpoint(&self) -> &Uri {
        &self.endpoint
    }

    /// Name of this client, for diagnostics.
    pub fn name(&self) -> &'static str {
        "push-client"
    }

    /// Pushes a batch.
    ///
    /// Empty batches succeed without sending anything.
    ///
    /// ## Errors
    ///
    /// - [`SendError::TooFrequent`] if the wait since the previous push has not elapsed. Nothing is
    ///   sent and the client state is unchanged.
    /// - [`SendError::Serialization`] if the batch could not be encoded. Nothing is sent and the
    ///   client state is unchanged.
    /// - [`SendError::Transport`] or [`SendError::UnexpectedStatus`] if the push failed. The
    ///   failure counts towards backoff.
    pub async fn send_metrics(&mut self, batch: &Batch) -> Result<(), SendError> {
        let retry_in = self.throttle.wait_duration();
        if !retry_in.is_zero() {
            return Err(SendError::TooFrequent { retry_in });
        }

        if batch.is_empty() {
            trace!("Batch is empty, nothing to push.");
            return Ok(());
        }

        let body = batch.bytes()?;
        let body_len = body.len();

        // Stamp the attempt before going out, so a slow request cannot let a second push slip
        // through the throttle window.
        self.throttle.record_attempt();

        match self.push(body).await {
            Ok(advised_interval) => {
                self.throttle.record_success(advised_interval);
                debug!(
                    bytes = body_len,
                    datapoints = batch.len(),
                    wait_interval = ?self.throttle.wait_interval(),
                    "Pushed metrics."
                );
                Ok(())
            }
            Err(e) => {
                self.throttle.record_failure();
                debug!(
                    consecutive_failures = self.throttle.consecutive_failures(),
                    "Push failed."
                );
                Err(e)
            }
        }
    }

    async fn push(&self, body: Vec<u8>) -> Result<Option<Duration>, SendError> {
        let request = Request::builder()
            .method(Method::POST)
            .uri(self.endpoint.clone())
            .header(CONTENT_TYPE, DELIMITED_CONTENT_TYPE)
            .header(AUTH_KEY_HEADER, self.app_key.clone())
            .body(Full::new(Bytes::from(body)))
            .map_err(TransportError::from)?;

        let response = self.transport.request(request).await?;
        let status = response.status();
        if status != StatusCode::ACCEPTED {
            debug!(
                %status,
                body = %String::from_utf8_lossy(response.body()),
                "Unexpected status after pushing metrics."
            );
            return Err(SendError::UnexpectedStatus { status });
        }

        Ok(parse_push_interval(response.headers()))
    }
}

/// Reads the advised push interval from the response headers.
///
/// Negative values are clamped to zero. Returns `None` if the header is missing or is not an
/// integer number of seconds.
fn parse_push_interval(headers: &HeaderMap) -> Option<Duration> {
    let secs = headers.get(PUSH_INTERVAL_HEADER)?.to_str().ok()?.trim().parse::<i64>().ok()?;
    Some(Duration::from_secs(secs.max(0).unsigned_abs()))
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::future::Future;
    use std::sync::{Arc, Mutex};

    use http_body_util::{BodyExt, Collected};
    use hyper::Response;

    use super::*;
    use crate::definition::Definition;
    use crate::encoding::decode_delimited;
    use crate::throttle::{DEFAULT_WAIT_INTERVAL, MAX_WAIT_INTERVAL};

    const ENDPOINT: &str = "https://nyc3.ingest.example.com/v1/metrics/droplet_id/42";

    struct RecordedRequest {
        method: Method,
        uri: Uri,
        headers: HeaderMap,
        body: Bytes,
    }

    type Scripted = Result<Response<Bytes>, TransportError>;

    #[derive(Clone, Default)]
    struct FakeTransport {
        responses: Arc<Mutex<VecDeque<Scripted>>>,
        requests: Arc<Mutex<Vec<RecordedRequest>>>,
    }

    impl FakeTransport {
        fn respond(&self, response: Scripted) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn accept(&self, interval: Option<&str>) {
            let mut builder = Response::builder().status(StatusCode::ACCEPTED);
            if let Some(interval) = interval {
                builder = builder.header(PUSH_INTERVAL_HEADER, interval);
            }
            self.respond(Ok(builder.body(Bytes::new()).unwrap()));
        }

        fn fail(&self) {
            self.respond(Err(TransportError::Timeout(Duration::from_secs(1))));
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl HttpTransport for FakeTransport {
        async fn request(
            &self,
            request: Request<Full<Bytes>>,
        ) -> Result<Response<Bytes>, TransportError> {
            let (parts, body) = request.into_parts();
            let body = body.collect().await.map(Collected::to_bytes).unwrap();
            self.requests.lock().unwrap().push(RecordedRequest {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
            });

            self.responses.lock().unwrap().pop_front().expect("no scripted response left")
        }
    }

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap_or_else(|e| panic!("failed to create test runtime: {e:?}"))
            .block_on(future)
    }

    fn client() -> (PushClient<FakeTransport>, FakeTransport, Arc<quanta::Mock>) {
        let transport = FakeTransport::default();
        let (clock, mock) = Clock::mock();
        let mut config = ClientConfig::new(ENDPOINT, "app-key-123");
        config.max_backoff_jitter = Duration::ZERO;

        let client = PushClient::with_transport(config, transport.clone(), clock).unwrap();
        (client, transport, mock)
    }

    fn cpu_batch() -> Batch {
        let def = Definition::new("cpu").with_measured_labels(["cpu"]).shared();
        let mut batch = Batch::new();
        batch.add_metric(&def, 1.5, &["cpu1"]).unwrap();
        batch
    }

    #[test]
    fn test_empty_batch_is_not_sent() {
        let (mut client, transport, _mock) = client();

        block_on(client.send_metrics(&Batch::new())).unwrap();

        assert_eq!(transport.request_count(), 0);
        assert!(client.throttle().last_send().is_none());
        assert_eq!(client.throttle().consecutive_failures(), 0);
        assert_eq!(client.throttle().wait_interval(), DEFAULT_WAIT_INTERVAL);
        assert_eq!(client.wait_duration(), Duration::ZERO);
    }

    #[test]
    fn test_push_request() {
        let (mut client, transport, _mock) = client();
        transport.accept(None);

        let batch = cpu_batch();
        block_on(client.send_metrics(&batch)).unwrap();

        let requests = transport.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);

        let request = &requests[0];
        assert_eq!(request.method, Method::POST);
        assert_eq!(request.uri, ENDPOINT);
        assert_eq!(request.headers[CONTENT_TYPE], DELIMITED_CONTENT_TYPE);
        assert_eq!(request.headers[AUTH_KEY_HEADER], "app-key-123");
        assert!(request.headers[AUTH_KEY_HEADER].is_sensitive());

        let families = decode_delimited(&request.body).unwrap();
        assert_eq!(families, batch.metric_families());
    }

    #[test]
    fn test_second_send_is_too_frequent() {
        let (mut client, transport, mock) = client();
        transport.accept(Some("30"));

        block_on(client.send_metrics(&cpu_batch())).unwrap();
        let last_send = client.throttle().last_send();

        let err = block_on(client.send_metrics(&cpu_batch())).unwrap_err();
        match err {
            SendError::TooFrequent { retry_in } => assert_eq!(retry_in, Duration::from_secs(30)),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(transport.request_count(), 1);
        assert_eq!(client.throttle().last_send(), last_send);
        assert_eq!(client.throttle().consecutive_failures(), 0);

        mock.increment(Duration::from_secs(30));
        transport.accept(Some("30"));
        block_on(client.send_metrics(&cpu_batch())).unwrap();
        assert_eq!(transport.request_count(), 2);
    }

    #[test]
    fn test_too_frequent_applies_to_empty_batches() {
        let (mut client, transport, _mock) = client();
        transport.accept(None);

        block_on(client.send_metrics(&cpu_batch())).unwrap();
        let err = block_on(client.send_metrics(&Batch::new())).unwrap_err();
        assert!(matches!(err, SendError::TooFrequent { .. }));
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_advised_interval() {
        let cases = [
            (Some("30"), Duration::from_secs(30)),
            (Some(" 120 "), Duration::from_secs(120)),
            (Some("0"), Duration::ZERO),
            (Some("-5"), Duration::ZERO),
            (Some("abc"), DEFAULT_WAIT_INTERVAL),
            (Some("1.5"), DEFAULT_WAIT_INTERVAL),
            (Some(""), DEFAULT_WAIT_INTERVAL),
            (Some("86400"), MAX_WAIT_INTERVAL),
            (None, DEFAULT_WAIT_INTERVAL),
        ];

        for (header, expected) in cases {
            let (mut client, transport, _mock) = client();
            transport.accept(header);

            block_on(client.send_metrics(&cpu_batch())).unwrap();
            assert_eq!(client.throttle().wait_interval(), expected, "header {header:?}");
        }
    }

    #[test]
    fn test_transport_failure_backs_off() {
        let (mut client, transport, mock) = client();
        transport.accept(Some("30"));
        block_on(client.send_metrics(&cpu_batch())).unwrap();

        for failures in 1..=4u32 {
            mock.increment(MAX_WAIT_INTERVAL);
            transport.fail();

            let err = block_on(client.send_metrics(&cpu_batch())).unwrap_err();
            assert!(matches!(err, SendError::Transport(TransportError::Timeout(_))));
            assert!(err.is_send_failure());

            assert_eq!(client.throttle().consecutive_failures(), failures);
            assert_eq!(client.throttle().wait_interval(), Duration::from_secs(30));

            let wait = client.wait_duration();
            assert!(wait >= Duration::from_secs(30) * failures);
            assert!(wait <= MAX_WAIT_INTERVAL);
        }
        assert_eq!(transport.request_count(), 5);
    }

    #[test]
    fn test_backoff_never_exceeds_cap() {
        let (mut client, transport, mock) = client();

        for _ in 0..80 {
            mock.increment(MAX_WAIT_INTERVAL);
            transport.fail();
            let _ = block_on(client.send_metrics(&cpu_batch()));
        }

        assert_eq!(client.throttle().consecutive_failures(), 80);
        assert_eq!(client.wait_duration(), MAX_WAIT_INTERVAL);
    }

    #[test]
    fn test_unexpected_status() {
        let (mut client, transport, mock) = client();
        transport.accept(Some("30"));
        block_on(client.send_metrics(&cpu_batch())).unwrap();

        mock.increment(Duration::from_secs(30));
        for status in [StatusCode::OK, StatusCode::INTERNAL_SERVER_ERROR] {
            let response = Response::builder()
                .status(status)
                .header(PUSH_INTERVAL_HEADER, "5")
                .body(Bytes::from_static(b"nope"))
                .unwrap();
            transport.respond(Ok(response));
            mock.increment(MAX_WAIT_INTERVAL);

            let err = block_on(client.send_metrics(&cpu_batch())).unwrap_err();
            match err {
                SendError::UnexpectedStatus { status: actual } => assert_eq!(actual, status),
                other => panic!("unexpected error: {other:?}"),
            }
        }

        assert_eq!(client.throttle().consecutive_failures(), 2);
        assert_eq!(client.throttle().wait_interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_attempt_is_stamped_even_on_failure() {
        let (mut client, transport, _mock) = client();
        transport.fail();

        assert!(client.throttle().last_send().is_none());
        let _ = block_on(client.send_metrics(&cpu_batch()));
        assert!(client.throttle().last_send().is_some());
        assert!(client.wait_duration() >= DEFAULT_WAIT_INTERVAL);
    }

    #[test]
    fn test_recovery_after_failures() {
        let (mut client, transport, mock) = client();

        for _ in 0..3 {
            transport.fail();
            let _ = block_on(client.send_metrics(&cpu_batch()));
            mock.increment(MAX_WAIT_INTERVAL);
        }
        assert_eq!(client.throttle().consecutive_failures(), 3);

        transport.accept(Some("30"));
        block_on(client.send_metrics(&cpu_batch())).unwrap();
        assert_eq!(client.throttle().consecutive_failures(), 0);
        assert_eq!(client.throttle().wait_interval(), Duration::from_secs(30));
        assert_eq!(client.wait_duration(), Duration::from_secs(30));

        mock.increment(Duration::from_secs(30));
        transport.fail();
        let _ = block_on(client.send_metrics(&cpu_batch()));
        mock.increment(MAX_WAIT_INTERVAL);

        transport.accept(Some("abc"));
        block_on(client.send_metrics(&cpu_batch())).unwrap();
        assert_eq!(client.throttle().consecutive_failures(), 0);
        assert_eq!(client.throttle().wait_interval(), DEFAULT_WAIT_INTERVAL);
    }

    #[test]
    fn test_invalid_config() {
        let transport = FakeTransport::default();

        let config = ClientConfig::new("not a uri", "key");
        let result = PushClient::with_transport(config, transport.clone(), Clock::new());
        assert!(matches!(result, Err(BuildError::InvalidEndpoint(_))));

        let config = ClientConfig::new(ENDPOINT, "bad\nkey");
        let result = PushClient::with_transport(config, transport, Clock::new());
        assert!(matches!(result, Err(BuildError::InvalidAppKey)));
    }
}
