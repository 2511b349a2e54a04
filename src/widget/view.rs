use crate::controller::ConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicIcon {
    Mic,
    MicOff,
}

/// Colour scheme of the mic button
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonTone {
    /// White button, grey icon
    Idle,
    /// Amber button while negotiating
    Connecting,
    /// Red button while a session is live
    Active,
}

impl ButtonTone {
    /// (background, border) colours
    pub fn colors(self) -> (&'static str, &'static str) {
        match self {
            ButtonTone::Idle => ("#ffffff", "#e5e7eb"),
            ButtonTone::Connecting => ("#f59e0b", "#d97706"),
            ButtonTone::Active => ("#ef4444", "#dc2626"),
        }
    }

    pub fn icon_color(self) -> &'static str {
        match self {
            ButtonTone::Idle => "#6b7280",
            ButtonTone::Connecting | ButtonTone::Active => "#ffffff",
        }
    }
}

/// Everything needed to draw the widget for one state
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetView {
    pub primary_text: &'static str,
    pub secondary_text: &'static str,
    pub icon: MicIcon,
    pub tone: ButtonTone,
    pub aria_label: &'static str,
    /// Button scale; grows on hover unless a connection is being set up
    pub scale: f32,
    /// Raised shadow while the pointer is over the container
    pub elevated: bool,
    pub menu_disabled: bool,
    pub show_device_selection: bool,
    pub class_name: String,
    pub background: String,
}

/// Pointer hover flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Hover {
    pub container: bool,
    pub mic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Appearance {
    pub show_device_selection: bool,
    pub class_name: String,
    pub background: String,
}

impl Default for Appearance {
    fn default() -> Self {
        Self {
            show_device_selection: true,
            class_name: String::new(),
            background: "#ffffff".to_string(),
        }
    }
}

impl WidgetView {
    pub fn render(state: ConnectionState, hover: Hover, appearance: &Appearance) -> Self {
        let (primary_text, secondary_text) = match state {
            ConnectionState::Connecting => ("Connecting...", "Please wait"),
            ConnectionState::Connected => ("Connected", "Click to disconnect"),
            ConnectionState::Idle => ("Voice Chat", "Click to start"),
        };

        let tone = match state {
            ConnectionState::Connected => ButtonTone::Active,
            ConnectionState::Connecting => ButtonTone::Connecting,
            ConnectionState::Idle => ButtonTone::Idle,
        };

        Self {
            primary_text,
            secondary_text,
            icon: if state.is_connected() {
                MicIcon::MicOff
            } else {
                MicIcon::Mic
            },
            tone,
            aria_label: if state.is_connected() {
                "Stop voice chat"
            } else {
                "Start voice chat"
            },
            scale: if hover.mic && !state.is_connecting() {
                1.05
            } else {
                1.0
            },
            elevated: hover.container,
            menu_disabled: state.is_connecting(),
            show_device_selection: appearance.show_device_selection,
            class_name: appearance.class_name.clone(),
            background: appearance.background.clone(),
        }
    }

    /// One-line text rendering for terminals
    pub fn to_line(&self) -> String {
        let icon = match self.icon {
            MicIcon::Mic => "[mic]",
            MicIcon::MicOff => "[mic off]",
        };
        format!("{} {} - {}", icon, self.primary_text, self.secondary_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_view() {
        let view = WidgetView::render(ConnectionState::Idle, Hover::default(), &Appearance::default());

        assert_eq!(view.primary_text, "Voice Chat");
        assert_eq!(view.secondary_text, "Click to start");
        assert_eq!(view.icon, MicIcon::Mic);
        assert_eq!(view.tone, ButtonTone::Idle);
        assert_eq!(view.aria_label, "Start voice chat");
        assert!(!view.menu_disabled);
    }

    #[test]
    fn test_connecting_view_disables_menu_and_hover() {
        let hover = Hover {
            container: true,
            mic: true,
        };
        let view = WidgetView::render(ConnectionState::Connecting, hover, &Appearance::default());

        assert_eq!(view.primary_text, "Connecting...");
        assert_eq!(view.secondary_text, "Please wait");
        assert_eq!(view.tone.colors().0, "#f59e0b");
        assert_eq!(view.scale, 1.0);
        assert!(view.elevated);
        assert!(view.menu_disabled);
    }

    #[test]
    fn test_connected_view() {
        let hover = Hover {
            container: false,
            mic: true,
        };
        let view = WidgetView::render(ConnectionState::Connected, hover, &Appearance::default());

        assert_eq!(view.primary_text, "Connected");
        assert_eq!(view.icon, MicIcon::MicOff);
        assert_eq!(view.tone, ButtonTone::Active);
        assert_eq!(view.aria_label, "Stop voice chat");
        assert_eq!(view.scale, 1.05);
        assert_eq!(view.to_line(), "[mic off] Connected - Click to disconnect");
    }
}
