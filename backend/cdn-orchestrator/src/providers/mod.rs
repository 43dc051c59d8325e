//! Provider client contract and the default HTTP implementation

pub mod client;
pub mod http;

pub use client::{
    ProviderClient, ProviderClientFactory, PurgeRequest, UploadReceipt, UploadRequest,
};
pub use http::{HttpClientFactory, HttpProviderClient};
