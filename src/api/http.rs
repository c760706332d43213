use super::OrderBackend;
use crate::error::ApiError;
use crate::model::{CreateOrder, DashboardConfig, Order, StatusReport};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// `success`/`error` pair every mutating endpoint answers with.
#[derive(Debug, Deserialize)]
struct Ack {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<Value>,
}

impl Ack {
    fn into_result(self, fallback: &str) -> Result<(), ApiError> {
        if self.success {
            return Ok(());
        }
        Err(ApiError::declined(
            error_text(self.error).unwrap_or_else(|| fallback.to_string()),
        ))
    }
}

#[derive(Debug, Deserialize)]
struct CreateReply {
    #[serde(flatten)]
    ack: Ack,
    #[serde(default)]
    order: Option<Order>,
}

#[derive(Debug, Deserialize)]
struct OrdersReply {
    #[serde(flatten)]
    ack: Ack,
    #[serde(default)]
    orders: Vec<Order>,
}

#[derive(Debug, Deserialize)]
struct BalanceReply {
    #[serde(flatten)]
    ack: Ack,
    #[serde(default)]
    balance: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct PricesReply {
    #[serde(flatten)]
    ack: Ack,
    #[serde(default)]
    prices: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct StatusReply {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    sms: Option<String>,
}

#[derive(Debug, Serialize)]
struct PriceQuery<'a> {
    service: &'a str,
    country: &'a str,
}

#[derive(Debug, Serialize)]
struct EmptyBody {}

fn error_text(v: Option<Value>) -> Option<String> {
    match v? {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

/// HTTP client for the order backend.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: Url,
}

impl HttpBackend {
    pub fn new(cfg: &DashboardConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(cfg.user_agent.clone())
            .timeout(cfg.request_timeout)
            .build()
            .context("build HTTP client")?;
        let base_url = Url::parse(&cfg.base_url)
            .with_context(|| format!("invalid base URL {:?}", cfg.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("base URL {:?} cannot carry a path", cfg.base_url);
        }
        Ok(Self { http, base_url })
    }

    /// Append path segments to the base URL. Each segment is percent-encoded,
    /// so an order id can never change the route it is sent to.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ApiError> {
        let resp = self.http.get(self.url(segments)).send().await?;
        decode(resp).await
    }

    async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, ApiError> {
        let resp = self.http.post(self.url(segments)).json(body).send().await?;
        decode(resp).await
    }

    async fn order_action(
        &self,
        endpoint: &str,
        order_id: &str,
        fallback: &str,
    ) -> Result<(), ApiError> {
        let ack: Ack = self
            .post(&["api", endpoint, order_id], &EmptyBody {})
            .await?;
        ack.into_result(fallback)
    }
}

/// Read the body first so a non-JSON answer is reported as such instead of as a
/// transport failure.
async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, ApiError> {
    let status = resp.status();
    let body = resp.text().await?;
    match serde_json::from_str::<T>(&body) {
        Ok(v) => Ok(v),
        Err(_) if !status.is_success() => Err(ApiError::Status {
            status: status.as_u16(),
        }),
        Err(e) => Err(ApiError::Decode(e.to_string())),
    }
}

#[async_trait]
impl OrderBackend for HttpBackend {
    async fn create(&self, req: &CreateOrder) -> Result<Order, ApiError> {
        let reply: CreateReply = self.post(&["api", "create"], req).await?;
        reply.ack.into_result("failed to create order")?;
        reply
            .order
            .ok_or_else(|| ApiError::Decode("create response is missing the order".into()))
    }

    async fn list(&self) -> Result<Vec<Order>, ApiError> {
        let reply: OrdersReply = self.get(&["api", "orders"]).await?;
        reply.ack.into_result("failed to load orders")?;
        Ok(reply.orders)
    }

    async fn history(&self) -> Result<Vec<Order>, ApiError> {
        let reply: OrdersReply = self.get(&["api", "history"]).await?;
        reply.ack.into_result("failed to load history")?;
        Ok(reply.orders)
    }

    async fn balance(&self) -> Result<String, ApiError> {
        let reply: BalanceReply = self.get(&["api", "balance"]).await?;
        reply.ack.into_result("failed to get balance")?;
        match reply.balance {
            Some(Value::String(s)) => Ok(s),
            Some(Value::Null) | None => Err(ApiError::Decode("balance is missing".into())),
            Some(other) => Ok(other.to_string()),
        }
    }

    async fn status(&self, order_id: &str) -> Result<StatusReport, ApiError> {
        let reply: StatusReply = self.get(&["api", "status", order_id]).await?;
        Ok(StatusReport {
            status: reply.status.unwrap_or_default().into(),
            sms: reply.sms,
        })
    }

    async fn request_again(&self, order_id: &str) -> Result<(), ApiError> {
        self.order_action("request_again", order_id, "failed to request SMS again")
            .await
    }

    async fn cancel(&self, order_id: &str) -> Result<(), ApiError> {
        self.order_action("cancel", order_id, "failed to cancel order")
            .await
    }

    async fn remove(&self, order_id: &str) -> Result<(), ApiError> {
        self.order_action("remove_order", order_id, "failed to remove order")
            .await
    }

    async fn finish(&self, order_id: &str) -> Result<(), ApiError> {
        self.order_action("finish", order_id, "failed to finish order")
            .await
    }

    async fn services(&self) -> Result<BTreeMap<String, String>, ApiError> {
        self.get(&["api", "services"]).await
    }

    async fn countries(&self) -> Result<BTreeMap<String, String>, ApiError> {
        self.get(&["api", "countries"]).await
    }

    async fn prices(&self, service: &str, country: &str) -> Result<Vec<f64>, ApiError> {
        let reply: PricesReply = self
            .post(&["api", "prices"], &PriceQuery { service, country })
            .await?;
        reply.ack.into_result("failed to load prices")?;
        let mut prices = reply.prices;
        prices.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        Ok(prices)
    }
}
