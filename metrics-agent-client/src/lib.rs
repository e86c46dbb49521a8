//! Batching, encoding and pushing of host metrics.
//!
//! Datapoints are collected into a [`Batch`], which keeps exactly one value per series: adding a
//! datapoint for a series already in the batch replaces the earlier value. A batch is then handed
//! to a [`PushClient`], which encodes it as a stream of length-delimited
//! `io.prometheus.client.MetricFamily` protobuf messages and POSTs it to the ingestion endpoint.
//!
//! The push client never sends faster than the server allows. Every successful push tells the
//! client how long to wait before the next one; pushes attempted sooner fail locally with
//! [`SendError::TooFrequent`]. Failed pushes stretch the wait additively, with jitter, up to one
//! hour.
//!
//! # Usage
//!
//! ```no_run
//! use metrics_agent_client::{Batch, ClientConfig, Definition, PushClient};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let cpu = Definition::new("sonar_cpu").with_measured_labels(["cpu", "mode"]).shared();
//!
//! let mut batch = Batch::new();
//! batch.add_metric(&cpu, 1234.5, &["cpu1", "idle"])?;
//!
//! let config = ClientConfig::new("https://nyc3.example.com/v1/metrics/droplet_id/1", "app-key");
//! let mut client = PushClient::new(config)?;
//! client.send_metrics(&batch).await?;
//!
//! tokio::time::sleep(client.wait_duration()).await;
//! # Ok(())
//! # }
//! ```
#![deny(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod auth;

mod batch;
pub use self::batch::Batch;

mod client;
pub use self::client::{
    ClientConfig, PushClient, AUTH_KEY_HEADER, DEFAULT_TIMEOUT, PUSH_INTERVAL_HEADER,
};

mod definition;
pub use self::definition::{Datapoint, Definition};

pub mod encoding;

mod error;
pub use self::error::{
    BatchError, BuildError, CredentialError, EncodeError, SendError, TransportError,
};

pub mod proto;

mod throttle;
pub use self::throttle::{Throttle, DEFAULT_MAX_JITTER, DEFAULT_WAIT_INTERVAL, MAX_WAIT_INTERVAL};

mod transport;
pub use self::transport::{HttpTransport, HyperTransport};
