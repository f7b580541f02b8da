//! In-process request/response transport.
//!
//! Each endpoint is a bounded queue drained by a loop that runs one task per
//! request. Replies travel on a per-request handle, so a requester only ever
//! sees the reply to its own request.

pub mod endpoint;
pub mod error;

pub use endpoint::{EndpointHandle, Handler, Reply, RequestClient, serve};
pub use error::{HandlerError, TransportError};
