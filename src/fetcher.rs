//! Remote fetcher contract and adapters.
//!
//! The cache never talks to the network itself. A [`Fetcher`] performs one
//! round trip per call and must be safe to call repeatedly; per-call timeouts
//! are its concern.

use crate::error::FetchError;
use crate::types::ResourceKey;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;

/// Performs one fetch of a resource.
pub trait Fetcher<T>: Send + Sync + 'static {
    fn fetch(&self, key: &ResourceKey) -> Result<T, FetchError>;
}

impl<T, F> Fetcher<T> for F
where
    F: Fn(&ResourceKey) -> Result<T, FetchError> + Send + Sync + 'static,
{
    fn fetch(&self, key: &ResourceKey) -> Result<T, FetchError> {
        self(key)
    }
}

/// Raw response from a [`Transport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body: Vec<u8>,
}

impl Response {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self {
            status: 200,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Byte-level request capability, usually an HTTP client resolving the key to
/// an endpoint.
pub trait Transport: Send + Sync + 'static {
    fn get(&self, key: &ResourceKey) -> Result<Response, FetchError>;
}

/// Fetcher decoding JSON responses of a [`Transport`].
pub struct JsonFetcher<Tr, T> {
    transport: Tr,
    _value: PhantomData<fn() -> T>,
}

impl<Tr, T> JsonFetcher<Tr, T> {
    pub fn new(transport: Tr) -> Self {
        Self {
            transport,
            _value: PhantomData,
        }
    }
}

impl<Tr, T> Fetcher<T> for JsonFetcher<Tr, T>
where
    Tr: Transport,
    T: DeserializeOwned + 'static,
{
    fn fetch(&self, key: &ResourceKey) -> Result<T, FetchError> {
        let response = self.transport.get(key)?;

        if !response.is_success() {
            return Err(FetchError::Status {
                status: response.status,
                message: String::from_utf8_lossy(&response.body).into_owned(),
            });
        }

        Ok(serde_json::from_slice(&response.body)?)
    }
}
