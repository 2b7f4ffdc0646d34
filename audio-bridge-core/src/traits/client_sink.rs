/// Result of handing one chunk to a client transport.
#[derive(Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The transport cannot take more right now; the chunk is handed back.
    Busy(Vec<u8>),
    /// The client went away.
    Closed,
}

/// Outbound transport of one streaming client (an HTTP response body in the
/// server, an in-memory collector in tests).
///
/// Must not block indefinitely: a full transport reports [`Delivery::Busy`]
/// and the session loop retries with backoff.
pub trait ClientSink: Send {
    fn try_deliver(&mut self, chunk: Vec<u8>) -> Delivery;
}
