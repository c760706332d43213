use crate::model::{Catalog, DashboardEvent, DashboardView, Notice, Order};
use crate::render::RowView;
use ratatui::{
    style::Color,
    style::Style,
    text::{Line, Span},
};
use std::collections::VecDeque;

pub const TAB_ORDERS: usize = 0;
pub const TAB_HISTORY: usize = 1;
pub const TAB_HELP: usize = 2;

pub struct UiState {
    pub tab: usize,
    pub info: String,
    pub view: DashboardView,
    pub selected: usize,
    // Notices stay on screen until dismissed, oldest first
    pub notices: VecDeque<Notice>,
    pub catalog: Catalog,
    pub service: String,
    pub country: String,
    pub prices: Option<Vec<f64>>,
    pub history: Vec<Order>,
    pub history_selected: usize,
    pub history_loaded: bool,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            tab: TAB_ORDERS,
            info: String::new(),
            view: DashboardView::default(),
            selected: 0,
            notices: VecDeque::new(),
            catalog: Catalog::default(),
            service: "wa".into(),
            country: "6".into(),
            prices: None,
            history: Vec::new(),
            history_selected: 0,
            history_loaded: false,
        }
    }
}

impl UiState {
    pub fn apply_event(&mut self, ev: DashboardEvent) {
        match ev {
            DashboardEvent::View(view) => self.set_view(*view),
            DashboardEvent::Notice(notice) => self.notices.push_back(notice),
            DashboardEvent::Info(msg) => self.info = msg,
            DashboardEvent::Catalog(catalog) => {
                self.catalog = catalog;
                if !self.catalog.services.is_empty()
                    && !self.catalog.services.contains_key(&self.service)
                {
                    self.service = self.catalog.services.keys().next().cloned().unwrap_or_default();
                    self.prices = None;
                }
                if !self.catalog.countries.is_empty()
                    && !self.catalog.countries.contains_key(&self.country)
                {
                    self.country = self.catalog.countries.keys().next().cloned().unwrap_or_default();
                    self.prices = None;
                }
            }
            DashboardEvent::History(orders) => {
                self.history = orders;
                self.history_loaded = true;
                if self.history_selected >= self.history.len() {
                    self.history_selected = self.history.len().saturating_sub(1);
                }
            }
            DashboardEvent::Prices {
                service,
                country,
                prices,
            } => {
                // Ignore quotes for a selection the user already moved away from.
                if service == self.service && country == self.country {
                    self.prices = Some(prices);
                }
            }
        }
    }

    /// Swap in a new snapshot, keeping the cursor on the same order when it survives.
    fn set_view(&mut self, view: DashboardView) {
        let selected_id = self.selected_row().map(|r| r.order_id.clone());
        self.view = view;
        if let Some(id) = selected_id {
            if let Some(idx) = self.view.rows.iter().position(|r| r.order_id == id) {
                self.selected = idx;
                return;
            }
        }
        if self.selected >= self.view.rows.len() {
            self.selected = self.view.rows.len().saturating_sub(1);
        }
    }

    pub fn selected_row(&self) -> Option<&RowView> {
        self.view.rows.get(self.selected)
    }

    pub fn is_polling(&self, order_id: &str) -> bool {
        self.view.polling.iter().any(|id| id == order_id)
    }

    pub fn move_selection(&mut self, down: bool) {
        let (idx, len) = if self.tab == TAB_HISTORY {
            (&mut self.history_selected, self.history.len())
        } else {
            (&mut self.selected, self.view.rows.len())
        };
        if down {
            if *idx + 1 < len {
                *idx += 1;
            }
        } else {
            *idx = idx.saturating_sub(1);
        }
    }

    pub fn current_notice(&self) -> Option<&Notice> {
        self.notices.front()
    }

    pub fn dismiss_notice(&mut self) {
        self.notices.pop_front();
    }

    /// Step the selected service through the catalog. Returns true if it changed.
    pub fn cycle_service(&mut self, forward: bool) -> bool {
        match cycle(&self.catalog.services, &self.service, forward) {
            Some(next) if next != self.service => {
                self.service = next;
                self.prices = None;
                true
            }
            _ => false,
        }
    }

    pub fn cycle_country(&mut self, forward: bool) -> bool {
        match cycle(&self.catalog.countries, &self.country, forward) {
            Some(next) if next != self.country => {
                self.country = next;
                self.prices = None;
                true
            }
            _ => false,
        }
    }

    pub fn service_label(&self) -> String {
        label(&self.catalog.services, &self.service)
    }

    pub fn country_label(&self) -> String {
        label(&self.catalog.countries, &self.country)
    }

    pub fn create_form_line(&self) -> Line<'static> {
        let price = match self.prices.as_deref() {
            Some([cheapest, ..]) => format!("{cheapest:.2}"),
            Some([]) => "none".into(),
            None => "-".into(),
        };
        let action = if self.view.create_in_flight {
            Span::styled("Creating…", Style::default().fg(Color::DarkGray))
        } else {
            Span::styled("[n] Create order", Style::default().fg(Color::Green))
        };
        Line::from(vec![
            Span::styled("Service: ", Style::default().fg(Color::Gray)),
            Span::raw(self.service_label()),
            Span::raw("   "),
            Span::styled("Country: ", Style::default().fg(Color::Gray)),
            Span::raw(self.country_label()),
            Span::raw("   "),
            Span::styled("Price from: ", Style::default().fg(Color::Gray)),
            Span::raw(price),
            Span::raw("   "),
            action,
        ])
    }
}

fn cycle(
    options: &std::collections::BTreeMap<String, String>,
    current: &str,
    forward: bool,
) -> Option<String> {
    if options.is_empty() {
        return None;
    }
    let keys: Vec<&String> = options.keys().collect();
    let pos = keys.iter().position(|k| k.as_str() == current);
    let next = match (pos, forward) {
        (None, _) => 0,
        (Some(i), true) => (i + 1) % keys.len(),
        (Some(i), false) => (i + keys.len() - 1) % keys.len(),
    };
    Some(keys[next].clone())
}

fn label(options: &std::collections::BTreeMap<String, String>, code: &str) -> String {
    match options.get(code) {
        Some(name) => format!("{name} ({code})"),
        None => code.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::order;
    use crate::render::render_row;

    fn view(ids: &[&str]) -> DashboardEvent {
        DashboardEvent::View(Box::new(DashboardView {
            rows: ids
                .iter()
                .map(|id| render_row(&order(id, "WAITING", None)))
                .collect(),
            ..Default::default()
        }))
    }

    #[test]
    fn selection_follows_order_across_refresh() {
        let mut state = UiState::default();
        state.apply_event(view(&["1", "2", "3"]));
        state.move_selection(true);
        state.move_selection(true);
        assert_eq!(state.selected_row().unwrap().order_id, "3");

        state.apply_event(view(&["9", "3", "1"]));
        assert_eq!(state.selected_row().unwrap().order_id, "3");

        state.apply_event(view(&["9"]));
        assert_eq!(state.selected, 0);
        state.apply_event(view(&[]));
        assert!(state.selected_row().is_none());
    }

    #[test]
    fn notices_queue_until_dismissed() {
        let mut state = UiState::default();
        state.apply_event(DashboardEvent::Notice(Notice::success("a")));
        state.apply_event(DashboardEvent::Notice(Notice::failure("b")));
        assert_eq!(state.current_notice().unwrap().text, "a");
        state.dismiss_notice();
        assert_eq!(state.current_notice().unwrap().text, "b");
        state.dismiss_notice();
        assert!(state.current_notice().is_none());
    }

    #[test]
    fn cycling_wraps_and_clears_stale_prices() {
        let mut state = UiState {
            prices: Some(vec![1.0]),
            ..Default::default()
        };
        // Fallback services sorted: bnu, eh, go, ni, ot, tg, wa
        assert!(state.cycle_service(true));
        assert_eq!(state.service, "bnu");
        assert!(state.prices.is_none());
        assert!(state.cycle_service(false));
        assert_eq!(state.service, "wa");
        assert_eq!(state.service_label(), "WhatsApp (wa)");

        assert!(state.cycle_country(true));
        assert_eq!(state.country, "0");
    }

    #[test]
    fn stale_price_quotes_are_ignored() {
        let mut state = UiState::default();
        state.apply_event(DashboardEvent::Prices {
            service: "tg".into(),
            country: "6".into(),
            prices: vec![2.0],
        });
        assert!(state.prices.is_none());
        state.apply_event(DashboardEvent::Prices {
            service: "wa".into(),
            country: "6".into(),
            prices: vec![2.0],
        });
        assert_eq!(state.prices, Some(vec![2.0]));
    }
}
