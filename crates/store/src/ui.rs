use chrono::{DateTime, Utc};
use coinlab_core::*;
use serde::Serialize;

use crate::Reducer;

/// Layout, theme, language and the live notification queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UiState {
    sidebar_open: bool,
    theme: Theme,
    language: Language,
    loading: bool,
    notifications: Vec<Notification>,
}

impl Default for UiState {
    fn default() -> Self {
        Self::new(Theme::default(), Language::default())
    }
}

impl UiState {
    pub fn new(theme: Theme, language: Language) -> Self {
        Self {
            sidebar_open: true,
            theme,
            language,
            loading: false,
            notifications: Vec::new(),
        }
    }

    pub fn toggle_sidebar(&mut self) {
        self.sidebar_open = !self.sidebar_open;
    }

    pub fn set_sidebar_open(&mut self, open: bool) {
        self.sidebar_open = open;
    }

    pub fn set_theme(&mut self, theme: Theme) {
        self.theme = theme;
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    /// Enqueue a notification and return its id. Ids are the issuance time
    /// in epoch millis, suffixed when that id is already live.
    pub fn notify(&mut self, kind: NotificationKind, message: String, issued_at: DateTime<Utc>) -> String {
        let base = issued_at.timestamp_millis().to_string();
        let mut id = base.clone();
        let mut n = 1;
        while self.notifications.iter().any(|x| x.id == id) {
            id = format!("{base}-{n}");
            n += 1;
        }

        self.notifications.push(Notification {
            id: id.clone(),
            kind,
            message,
            timestamp: issued_at,
        });
        id
    }

    pub fn dismiss(&mut self, id: &str) {
        self.notifications.retain(|n| n.id != id);
    }

    pub fn clear_notifications(&mut self) {
        self.notifications.clear();
    }

    pub fn sidebar_open(&self) -> bool {
        self.sidebar_open
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }
}

impl Reducer for UiState {
    type Action = UiAction;

    fn apply(&mut self, action: UiAction) {
        match action {
            UiAction::ToggleSidebar => self.toggle_sidebar(),
            UiAction::SetSidebarOpen(open) => self.set_sidebar_open(open),
            UiAction::SetTheme(theme) => self.set_theme(theme),
            UiAction::SetLanguage(language) => self.set_language(language),
            UiAction::SetLoading(loading) => self.set_loading(loading),
            UiAction::Notify {
                kind,
                message,
                issued_at,
            } => {
                self.notify(kind, message, issued_at);
            }
            UiAction::Dismiss(id) => self.dismiss(&id),
            UiAction::ClearNotifications => self.clear_notifications(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_defaults() {
        let ui = UiState::default();
        assert!(ui.sidebar_open());
        assert_eq!(ui.theme(), Theme::Light);
        assert_eq!(ui.language(), Language::Ko);
        assert!(ui.notifications().is_empty());
    }

    #[test]
    fn test_toggle_sidebar() {
        let ui = UiState::default().reduce(UiAction::ToggleSidebar);
        assert!(!ui.sidebar_open());
        let ui = ui.reduce(UiAction::ToggleSidebar);
        assert!(ui.sidebar_open());
    }

    #[test]
    fn test_notification_ids_unique_at_same_instant() {
        let mut ui = UiState::default();
        let at = Utc.timestamp_millis_opt(1_714_564_800_123).unwrap();

        let a = ui.notify(NotificationKind::Info, "first".into(), at);
        let b = ui.notify(NotificationKind::Error, "second".into(), at);
        let c = ui.notify(NotificationKind::Success, "third".into(), at);

        assert_eq!(a, "1714564800123");
        assert_eq!(b, "1714564800123-1");
        assert_eq!(c, "1714564800123-2");
        assert_eq!(ui.notifications().len(), 3);
    }

    #[test]
    fn test_dismiss_and_clear() {
        let mut ui = UiState::default();
        let first = ui.notify(NotificationKind::Warning, "low balance".into(), Utc::now());
        ui.notify(NotificationKind::Info, "synced".into(), Utc::now());

        ui.dismiss(&first);
        ui.dismiss("unknown");
        assert_eq!(ui.notifications().len(), 1);
        assert_eq!(ui.notifications()[0].message, "synced");

        ui.clear_notifications();
        assert!(ui.notifications().is_empty());
    }
}
