use std::future::Future;

use migration_monitor_api_client::{MigrationClient, StartAck, TransportError};
use migration_monitor_api_types::RawStatusPayload;

/// The two remote calls the controller depends on.
///
/// Implementations perform one request per call and never retry.
pub trait StatusSource {
    fn request_start(&self) -> impl Future<Output = Result<StartAck, TransportError>> + Send;

    fn fetch_status(&self) -> impl Future<Output = Result<RawStatusPayload, TransportError>> + Send;
}

impl StatusSource for MigrationClient {
    fn request_start(&self) -> impl Future<Output = Result<StartAck, TransportError>> + Send {
        MigrationClient::request_start(self)
    }

    fn fetch_status(&self) -> impl Future<Output = Result<RawStatusPayload, TransportError>> + Send {
        MigrationClient::fetch_status(self)
    }
}
