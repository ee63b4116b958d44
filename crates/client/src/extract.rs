//! Ready-made handlers for common response shapes.
//!
//! - [`json`]: deserializes a 2xx body, any other status is a [`StatusError`]
//! - [`bytes`] and [`text`]: the whole body, whatever the status
//! - [`discard`]: drains the body and keeps only the status

use std::fmt;
use std::marker::PhantomData;

use async_trait::async_trait;
use bytes::Bytes;
use micro_fetch_http::protocol::{MethodExt, Status};
use serde::de::DeserializeOwned;

use crate::error::StatusError;
use crate::{ClientError, Handler, HandlerState};

pub struct Json<T> {
    _target: PhantomData<fn() -> T>,
}

#[must_use]
pub fn json<T: DeserializeOwned>() -> Json<T> {
    Json { _target: PhantomData }
}

#[async_trait]
impl<T> Handler for Json<T>
where
    T: DeserializeOwned + Send,
{
    type Output = T;

    async fn read_http(&self, state: &mut HandlerState) -> Result<T, ClientError> {
        if !state.status().is_success() {
            return Err(StatusError::new(state.status().clone(), state.url().clone()).into());
        }
        let bytes = state.body().bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl<T> fmt::Debug for Json<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Json")
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BytesHandler;

#[must_use]
pub fn bytes() -> BytesHandler {
    BytesHandler
}

#[async_trait]
impl Handler for BytesHandler {
    type Output = Bytes;

    async fn read_http(&self, state: &mut HandlerState) -> Result<Bytes, ClientError> {
        state.body().bytes().await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TextHandler;

#[must_use]
pub fn text() -> TextHandler {
    TextHandler
}

#[async_trait]
impl Handler for TextHandler {
    type Output = String;

    async fn read_http(&self, state: &mut HandlerState) -> Result<String, ClientError> {
        state.body().text().await
    }
}

#[derive(Debug, Clone, Copy)]
pub struct DiscardHandler;

/// Drains the body, so the connection can be reused, and returns the status.
#[must_use]
pub fn discard() -> DiscardHandler {
    DiscardHandler
}

#[async_trait]
impl Handler for DiscardHandler {
    type Output = Status;

    async fn read_http(&self, state: &mut HandlerState) -> Result<Status, ClientError> {
        if state.method().response_body_allowed() {
            state.body().drain().await?;
        }
        Ok(state.status().clone())
    }
}
