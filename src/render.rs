//! Projection of registry records into table rows.
//!
//! Full refresh and targeted updates share `render_row`, so a row looks the same
//! no matter which path produced it.

use crate::model::Order;
use crate::registry::OrderRegistry;
use serde::Serialize;

pub const WAITING_PLACEHOLDER: &str = "Waiting";
pub const EMPTY_PLACEHOLDER: &str = "-";

/// Per-row action. Each action is bound to the id of the row it was rendered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RowAction {
    RequestAgain,
    Cancel,
    Remove,
    Finish,
}

impl RowAction {
    pub fn label(self) -> &'static str {
        match self {
            RowAction::RequestAgain => "Request again",
            RowAction::Cancel => "Cancel",
            RowAction::Remove => "Remove",
            RowAction::Finish => "Finish",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RowView {
    pub order_id: String,
    pub number: String,
    pub service: String,
    pub country: String,
    pub status: String,
    pub sms: String,
    pub completed: bool,
    pub actions: Vec<RowAction>,
}

impl RowView {
    pub fn allows(&self, action: RowAction) -> bool {
        self.actions.contains(&action)
    }
}

pub fn render_row(order: &Order) -> RowView {
    let completed = order.status.is_completed();
    let sms = if completed {
        order.sms_text().unwrap_or(EMPTY_PLACEHOLDER).to_string()
    } else {
        WAITING_PLACEHOLDER.to_string()
    };
    let actions = if completed {
        vec![RowAction::RequestAgain, RowAction::Finish, RowAction::Remove]
    } else {
        vec![RowAction::Cancel, RowAction::Remove]
    };
    RowView {
        order_id: order.id.clone(),
        number: order.number.clone(),
        service: order.service_label().to_string(),
        country: order.country_label().to_string(),
        status: order.status.to_string(),
        sms,
        completed,
        actions,
    }
}

pub fn render(registry: &OrderRegistry) -> Vec<RowView> {
    registry.iter().map(render_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::order;
    use crate::model::StatusReport;

    #[test]
    fn sample_snapshot_renders_two_rows() {
        let mut reg = OrderRegistry::default();
        reg.replace_all(vec![
            order("1", "WAITING", None),
            order("2", "COMPLETED", Some("123456")),
        ]);
        let rows = render(&reg);
        assert_eq!(rows.len(), 2);

        let waiting = &rows[0];
        assert_eq!(waiting.order_id, "1");
        assert_eq!(waiting.sms, "Waiting");
        assert!(waiting.allows(RowAction::Cancel));
        assert!(waiting.allows(RowAction::Remove));
        assert!(!waiting.allows(RowAction::RequestAgain));

        let done = &rows[1];
        assert_eq!(done.order_id, "2");
        assert_eq!(done.sms, "123456");
        assert!(done.allows(RowAction::RequestAgain));
        assert!(done.allows(RowAction::Remove));
        assert!(!done.allows(RowAction::Cancel));
    }

    #[test]
    fn completed_without_sms_shows_dash() {
        let row = render_row(&order("5", "COMPLETED", Some("  ")));
        assert_eq!(row.sms, "-");
        assert_eq!(row.status, "COMPLETED");
    }

    #[test]
    fn targeted_update_matches_full_render() {
        let mut reg = OrderRegistry::default();
        reg.replace_all(vec![order("1", "WAITING", None), order("2", "WAITING", None)]);
        let before = render(&reg);
        reg.apply_status("1", &StatusReport::new("COMPLETED", Some("777")));
        let after = render(&reg);

        assert_eq!(after[1], before[1]);
        assert_eq!(after[0], render_row(&order("1", "COMPLETED", Some("777"))));
        assert_eq!(after[0].actions[0], RowAction::RequestAgain);
    }

    #[test]
    fn intermediate_status_is_shown_as_received() {
        let mut reg = OrderRegistry::default();
        reg.replace_all(vec![order("1", "WAITING", None), order("2", "CANCELLED", None)]);
        reg.apply_status("1", &StatusReport::new("STATUS_WAIT_CODE", None));
        let rows = render(&reg);
        assert_eq!(rows[0].status, "STATUS_WAIT_CODE");
        assert_eq!(rows[0].sms, "Waiting");
        assert_eq!(rows[1].status, "CANCELLED");
    }
}
