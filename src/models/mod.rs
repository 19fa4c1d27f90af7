//! Request and Response models for the cache gateway
//!
//! DTOs used for serializing/deserializing HTTP request and response bodies.

pub mod requests;
pub mod responses;

pub use requests::{
    validate_key, BatchEntry, BatchSetRequest, KeysRequest, PatternRequest, SetRequest,
};
pub use responses::{
    BatchGetResponse, BatchSetResponse, ExistsResponse, GetResponse, HealthResponse,
    MessageResponse, RemovedResponse, StatsResponse,
};
