//! Backend contract.
//!
//! The controller and the polling coordinator only talk to the backend through
//! [`OrderBackend`], which keeps the HTTP details in one place and lets the
//! timer logic run against an in-memory backend.

mod http;
#[cfg(test)]
pub(crate) mod testing;

pub use http::HttpBackend;

use crate::error::ApiError;
use crate::model::{CreateOrder, Order, StatusReport};
use async_trait::async_trait;
use std::collections::BTreeMap;

#[async_trait]
pub trait OrderBackend: Send + Sync + 'static {
    async fn create(&self, req: &CreateOrder) -> Result<Order, ApiError>;
    /// Active orders, newest first.
    async fn list(&self) -> Result<Vec<Order>, ApiError>;
    /// Orders that are no longer active.
    async fn history(&self) -> Result<Vec<Order>, ApiError>;
    async fn balance(&self) -> Result<String, ApiError>;
    async fn status(&self, order_id: &str) -> Result<StatusReport, ApiError>;
    async fn request_again(&self, order_id: &str) -> Result<(), ApiError>;
    async fn cancel(&self, order_id: &str) -> Result<(), ApiError>;
    async fn remove(&self, order_id: &str) -> Result<(), ApiError>;
    async fn finish(&self, order_id: &str) -> Result<(), ApiError>;
    async fn services(&self) -> Result<BTreeMap<String, String>, ApiError>;
    async fn countries(&self) -> Result<BTreeMap<String, String>, ApiError>;
    /// Available prices for a service/country pair, cheapest first.
    async fn prices(&self, service: &str, country: &str) -> Result<Vec<f64>, ApiError>;
}
