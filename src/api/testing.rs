//! In-memory backend for exercising the controller and the poller without HTTP.

use super::OrderBackend;
use crate::error::ApiError;
use crate::model::{CreateOrder, Order, OrderStatus, StatusReport};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn order(id: &str, status: &str, sms: Option<&str>) -> Order {
    Order {
        id: id.to_string(),
        number: format!("62800{id}"),
        service: "wa".into(),
        service_name: None,
        country: "6".into(),
        country_name: None,
        status: OrderStatus::from(status),
        sms: sms.map(str::to_string),
        price: None,
        created_at: None,
        updated_at: None,
    }
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    pub orders: Mutex<Vec<Order>>,
    /// Scripted status answers per order; the last one repeats once the script runs out.
    pub statuses: Mutex<HashMap<String, VecDeque<Result<StatusReport, ApiError>>>>,
    pub status_calls: Mutex<HashMap<String, usize>>,
    pub create_result: Mutex<Option<Result<Order, ApiError>>>,
    pub action_error: Mutex<Option<ApiError>>,
    pub balance: Mutex<Option<Result<String, ApiError>>>,
    pub calls: Mutex<Vec<String>>,
    /// (n, delay): the n-th status check overall answers only after `delay`.
    pub stall: Mutex<Option<(usize, Duration)>>,
    pub total_status_calls: Mutex<usize>,
}

impl FakeBackend {
    pub fn with_orders(orders: Vec<Order>) -> Self {
        let fake = Self::default();
        *fake.orders.lock().unwrap() = orders;
        fake
    }

    pub fn script_status(&self, order_id: &str, answers: Vec<Result<StatusReport, ApiError>>) {
        self.statuses
            .lock()
            .unwrap()
            .insert(order_id.to_string(), answers.into());
    }

    pub fn stall_status(&self, nth: usize, delay: Duration) {
        *self.stall.lock().unwrap() = Some((nth, delay));
    }

    pub fn balance_calls(&self) -> usize {
        self.calls().iter().filter(|c| *c == "balance").count()
    }

    pub fn status_calls(&self, order_id: &str) -> usize {
        self.status_calls
            .lock()
            .unwrap()
            .get(order_id)
            .copied()
            .unwrap_or(0)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn action(&self, name: &str, order_id: &str) -> Result<(), ApiError> {
        self.record(format!("{name}:{order_id}"));
        match self.action_error.lock().unwrap().clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl OrderBackend for FakeBackend {
    async fn create(&self, req: &CreateOrder) -> Result<Order, ApiError> {
        self.record(format!("create:{}:{}", req.service, req.country));
        let result = self
            .create_result
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok(order("new", "WAITING", None)));
        if let Ok(o) = &result {
            self.orders.lock().unwrap().insert(0, o.clone());
        }
        result
    }

    async fn list(&self) -> Result<Vec<Order>, ApiError> {
        self.record("list".into());
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn history(&self) -> Result<Vec<Order>, ApiError> {
        self.record("history".into());
        Ok(vec![order("old", "CANCELED", None)])
    }

    async fn balance(&self) -> Result<String, ApiError> {
        self.record("balance".into());
        self.balance
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Ok("10.00".into()))
    }

    async fn status(&self, order_id: &str) -> Result<StatusReport, ApiError> {
        *self
            .status_calls
            .lock()
            .unwrap()
            .entry(order_id.to_string())
            .or_default() += 1;
        let nth = {
            let mut total = self.total_status_calls.lock().unwrap();
            *total += 1;
            *total
        };
        let answer = {
            let mut scripts = self.statuses.lock().unwrap();
            match scripts.get_mut(order_id) {
                Some(script) if script.len() > 1 => script.pop_front().unwrap(),
                Some(script) => script
                    .front()
                    .cloned()
                    .unwrap_or_else(|| Ok(StatusReport::new("WAITING", None))),
                None => Ok(StatusReport::new("WAITING", None)),
            }
        };
        let stall = *self.stall.lock().unwrap();
        if let Some((n, delay)) = stall {
            if n == nth {
                tokio::time::sleep(delay).await;
            }
        }
        answer
    }

    async fn request_again(&self, order_id: &str) -> Result<(), ApiError> {
        self.action("request_again", order_id)
    }

    async fn cancel(&self, order_id: &str) -> Result<(), ApiError> {
        self.action("cancel", order_id)
    }

    async fn remove(&self, order_id: &str) -> Result<(), ApiError> {
        self.action("remove", order_id)?;
        self.orders.lock().unwrap().retain(|o| o.id != order_id);
        Ok(())
    }

    async fn finish(&self, order_id: &str) -> Result<(), ApiError> {
        self.action("finish", order_id)
    }

    async fn services(&self) -> Result<BTreeMap<String, String>, ApiError> {
        Ok(BTreeMap::from([("wa".to_string(), "WhatsApp".to_string())]))
    }

    async fn countries(&self) -> Result<BTreeMap<String, String>, ApiError> {
        Err(ApiError::Transport("offline".into()))
    }

    async fn prices(&self, _service: &str, _country: &str) -> Result<Vec<f64>, ApiError> {
        Ok(vec![1.5, 2.0])
    }
}
