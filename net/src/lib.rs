//! Wire-level plumbing for the component bus.
//!
//! This crate owns everything that crosses a socket: the compact
//! [`EncodingKey`] used as a subscription prefix, the [`Envelope`] that wraps
//! every published payload, and the request/reply transport used by the
//! naming and topic services. Higher level routing lives in `component`.

pub mod envelope;
pub mod error;
pub mod frame;
pub mod key;
pub mod reqrep;

pub use envelope::{BusData, Envelope, Payload};
pub use error::NetError;
pub use key::{EncodingKey, ENCODING_SIZE};
pub use reqrep::{RequestClient, RequestHandler, RequestServer};
