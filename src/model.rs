use crate::render::RowView;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardConfig {
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub auto_refresh: Duration,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub default_service: String,
    pub default_country: String,
    #[serde(default)]
    pub max_price: Option<f64>,
    pub user_agent: String,
}

/// Lifecycle state reported by the backend.
///
/// The named variants are the values the backend stores for an order. Anything
/// else (provider codes such as `STATUS_WAIT_CODE`) is kept verbatim in `Other`
/// and shown exactly as received. Only `Completed` changes polling behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderStatus {
    Waiting,
    Completed,
    Cancelled,
    Finished,
    Timeout,
    Deleted,
    Other(String),
}

impl OrderStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, OrderStatus::Completed)
    }

    pub fn as_str(&self) -> &str {
        match self {
            OrderStatus::Waiting => "WAITING",
            OrderStatus::Completed => "COMPLETED",
            OrderStatus::Cancelled => "CANCELED",
            OrderStatus::Finished => "FINISHED",
            OrderStatus::Timeout => "TIMEOUT",
            OrderStatus::Deleted => "DELETED",
            OrderStatus::Other(s) => s,
        }
    }
}

impl From<String> for OrderStatus {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "WAITING" => OrderStatus::Waiting,
            "COMPLETED" => OrderStatus::Completed,
            "CANCELED" => OrderStatus::Cancelled,
            "FINISHED" => OrderStatus::Finished,
            "TIMEOUT" => OrderStatus::Timeout,
            "DELETED" => OrderStatus::Deleted,
            s if s.trim().is_empty() => OrderStatus::Other("UNKNOWN".into()),
            _ => OrderStatus::Other(raw),
        }
    }
}

impl From<&str> for OrderStatus {
    fn from(raw: &str) -> Self {
        OrderStatus::from(raw.to_string())
    }
}

impl From<OrderStatus> for String {
    fn from(status: OrderStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An SMS number reservation as the backend serialises it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub number: String,
    #[serde(default)]
    pub service: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub country: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_name: Option<String>,
    pub status: OrderStatus,
    #[serde(default)]
    pub sms: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl Order {
    /// SMS text if the backend sent a non-empty one.
    pub fn sms_text(&self) -> Option<&str> {
        self.sms.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn service_label(&self) -> &str {
        self.service_name.as_deref().unwrap_or(&self.service)
    }

    pub fn country_label(&self) -> &str {
        self.country_name.as_deref().unwrap_or(&self.country)
    }
}

fn string_or_number<'de, D>(de: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let v = serde_json::Value::deserialize(de)?;
    Ok(match v {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    })
}

/// Result of a single status check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: OrderStatus,
    #[serde(default)]
    pub sms: Option<String>,
}

#[cfg(test)]
impl StatusReport {
    pub fn new(status: impl Into<OrderStatus>, sms: Option<&str>) -> Self {
        Self {
            status: status.into(),
            sms: sms.map(str::to_string),
        }
    }
}

/// Parameters for a new order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CreateOrder {
    pub service: String,
    pub country: String,
    #[serde(rename = "maxPrice", skip_serializing_if = "Option::is_none")]
    pub max_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Balance {
    #[default]
    Unknown,
    Amount(String),
    Unavailable,
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Balance::Unknown => f.write_str("Balance: …"),
            Balance::Amount(v) => write!(f, "Balance: {v}"),
            Balance::Unavailable => f.write_str("Balance: Error"),
        }
    }
}

/// Services and countries offered by the backend, keyed by code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    pub services: BTreeMap<String, String>,
    pub countries: BTreeMap<String, String>,
}

impl Catalog {
    pub fn fallback_services() -> BTreeMap<String, String> {
        [
            ("go", "Google"),
            ("ni", "Gojek"),
            ("wa", "WhatsApp"),
            ("bnu", "Qpon"),
            ("tg", "Telegram"),
            ("eh", "Telegram 2.0"),
            ("ot", "Any Other"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    pub fn fallback_countries() -> BTreeMap<String, String> {
        [
            ("6", "Indonesia"),
            ("0", "Russia"),
            ("3", "China"),
            ("4", "Philippines"),
            ("10", "Vietnam"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self {
            services: Self::fallback_services(),
            countries: Self::fallback_countries(),
        }
    }
}

/// Everything a presentation layer needs to draw the orders table.
#[derive(Debug, Clone, Default)]
pub struct DashboardView {
    pub rows: Vec<RowView>,
    pub balance: Balance,
    pub create_in_flight: bool,
    pub polling: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Failure,
}

/// A message the user has to acknowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub text: String,
}

impl Notice {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Success,
            text: text.into(),
        }
    }

    pub fn failure(text: impl Into<String>) -> Self {
        Self {
            kind: NoticeKind::Failure,
            text: text.into(),
        }
    }
}

/// Events published by the controller for presentation layers.
#[derive(Debug, Clone)]
pub enum DashboardEvent {
    View(Box<DashboardView>),
    Notice(Notice),
    Info(String),
    Catalog(Catalog),
    History(Vec<Order>),
    Prices {
        service: String,
        country: String,
        prices: Vec<f64>,
    },
}
