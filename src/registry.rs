//! In-memory table of the orders currently on screen.
//!
//! The registry is the single source of truth for row contents; the view is a
//! projection of it (see `render`).

use crate::model::{Order, StatusReport};

#[derive(Debug, Default, Clone)]
pub struct OrderRegistry {
    orders: Vec<Order>,
}

impl OrderRegistry {
    /// Replace every row with a fresh snapshot from the backend.
    ///
    /// Rows missing from the snapshot are dropped. Duplicate ids keep the first
    /// occurrence so each id maps to exactly one row.
    pub fn replace_all(&mut self, orders: Vec<Order>) {
        let mut fresh: Vec<Order> = Vec::with_capacity(orders.len());
        for order in orders {
            if !fresh.iter().any(|o| o.id == order.id) {
                fresh.push(order);
            }
        }
        self.orders = fresh;
    }

    /// Apply a single status observation to the matching row.
    ///
    /// SMS text is only replaced when the report carries one. Returns `false` if
    /// the order is not on screen.
    pub fn apply_status(&mut self, order_id: &str, report: &StatusReport) -> bool {
        let Some(order) = self.orders.iter_mut().find(|o| o.id == order_id) else {
            return false;
        };
        order.status = report.status.clone();
        if report.sms.as_deref().is_some_and(|s| !s.trim().is_empty()) {
            order.sms = report.sms.clone();
        }
        true
    }

    pub fn remove(&mut self, order_id: &str) -> Option<Order> {
        let idx = self.orders.iter().position(|o| o.id == order_id)?;
        Some(self.orders.remove(idx))
    }

    #[cfg(test)]
    pub fn get(&self, order_id: &str) -> Option<&Order> {
        self.orders.iter().find(|o| o.id == order_id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.orders.iter().map(|o| o.id.clone()).collect()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.orders.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.orders.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::order;
    use crate::model::OrderStatus;

    #[test]
    fn replace_all_drops_missing_rows_and_keeps_order() {
        let mut reg = OrderRegistry::default();
        reg.replace_all(vec![order("1", "WAITING", None), order("2", "WAITING", None)]);
        reg.replace_all(vec![
            order("3", "WAITING", None),
            order("1", "COMPLETED", Some("99")),
            order("3", "CANCELED", None),
        ]);
        assert_eq!(reg.ids(), vec!["3", "1"]);
        assert_eq!(reg.get("3").unwrap().status, OrderStatus::Waiting);
        assert!(reg.get("2").is_none());
    }

    #[test]
    fn apply_status_touches_only_the_target_row() {
        let mut reg = OrderRegistry::default();
        reg.replace_all(vec![order("1", "WAITING", None), order("2", "WAITING", None)]);
        assert!(reg.apply_status("2", &StatusReport::new("COMPLETED", Some("4321"))));
        assert_eq!(reg.get("2").unwrap().sms_text(), Some("4321"));
        assert_eq!(reg.get("1").unwrap().status, OrderStatus::Waiting);
        assert!(!reg.apply_status("9", &StatusReport::new("COMPLETED", None)));
    }

    #[test]
    fn status_without_sms_keeps_previous_text() {
        let mut reg = OrderRegistry::default();
        reg.replace_all(vec![order("1", "COMPLETED", Some("1111"))]);
        reg.apply_status("1", &StatusReport::new("WAITING", None));
        let row = reg.get("1").unwrap();
        assert_eq!(row.status, OrderStatus::Waiting);
        assert_eq!(row.sms_text(), Some("1111"));
    }

    #[test]
    fn remove_returns_the_row() {
        let mut reg = OrderRegistry::default();
        reg.replace_all(vec![order("1", "WAITING", None)]);
        assert_eq!(reg.remove("1").map(|o| o.id), Some("1".to_string()));
        assert!(reg.is_empty());
        assert!(reg.remove("1").is_none());
    }
}
