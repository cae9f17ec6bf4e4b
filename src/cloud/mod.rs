//! Optional cloud mirror of the drop collection
//!
//! - `RemoteSource`: the port a cloud backend implements
//! - `NatsRemoteSource`: request/reply backend over NATS
//! - `CloudMirror`: optional wrapper that materializes fetched audio

pub mod messages;
pub mod mirror;
pub mod nats;
pub mod source;

pub use messages::{
    decode_record, decode_records, FetchPage, FetchRequest, RemoteDropRecord, SaveAck,
};
pub use mirror::CloudMirror;
pub use nats::NatsRemoteSource;
pub use source::{RemoteDrop, RemoteError, RemoteSource};
