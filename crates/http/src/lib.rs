//! HTTP dispatch for the tether auth client

pub mod client;
pub mod types;

pub use client::{
    AuthClient, AuthClientBuilder, ClientConfig, ClientError, Credential, Endpoints, FailureSink,
    Method, RequestOptions, ResponseBody, ServerCode, TokenKind, Transport,
};
