//! Voice widget view models
//!
//! The widget is a mic toggle button with status text and an optional
//! device selection menu. It renders the controller's state and forwards the
//! two user intents, toggling the connection and changing a device, back to
//! the controller.

pub mod menu;
pub mod popover;
pub mod view;

pub use menu::{DeviceIntent, DeviceMenu, MenuItem, MenuSection};
pub use popover::{
    place, Horizontal, MenuPosition, Placement, PointerTarget, Popover, Rect, Vertical, Viewport,
};
pub use view::{Appearance, ButtonTone, Hover, MicIcon, WidgetView};

use crate::controller::{ConnectionCallback, ConnectionState, LogNotifier, VoiceController};
use crate::devices::{AudioConstraints, CpalMediaDevices, DeviceKind, DeviceList};
use crate::signaling::HttpSignalingClient;
use crate::transport::WebRtcTransportFactory;
use std::sync::Arc;
use tracing::info;

/// Options recognised by the widget
#[derive(Clone)]
pub struct WidgetOptions {
    /// Base URL of the signaling backend
    pub api_url: String,
    pub on_connection_change: Option<ConnectionCallback>,
    pub show_device_selection: bool,
    pub menu_position: MenuPosition,
    pub class_name: String,
    pub background: String,
}

impl WidgetOptions {
    pub fn new(api_url: impl Into<String>) -> Self {
        let appearance = Appearance::default();
        Self {
            api_url: api_url.into(),
            on_connection_change: None,
            show_device_selection: appearance.show_device_selection,
            menu_position: MenuPosition::default(),
            class_name: appearance.class_name,
            background: appearance.background,
        }
    }
}

/// Mic button, status text and device menu bound to a controller
pub struct VoiceWidget {
    controller: VoiceController,
    appearance: Appearance,
    hover: Hover,
    menu: DeviceMenu,
}

impl VoiceWidget {
    pub fn new(options: WidgetOptions, controller: VoiceController) -> Self {
        if let Some(callback) = options.on_connection_change {
            controller.set_on_connection_change(callback);
        }

        Self {
            controller,
            appearance: Appearance {
                show_device_selection: options.show_device_selection,
                class_name: options.class_name,
                background: options.background,
            },
            hover: Hover::default(),
            menu: DeviceMenu::new(options.menu_position),
        }
    }

    /// Widget wired to the native backends (HTTP signaling, cpal and webrtc)
    pub fn native(options: WidgetOptions, processing: AudioConstraints) -> Self {
        let controller = VoiceController::new(
            Arc::new(HttpSignalingClient::new(&options.api_url)),
            Arc::new(CpalMediaDevices::new()),
            Arc::new(WebRtcTransportFactory::new()),
            Arc::new(LogNotifier),
        )
        .with_processing(processing);
        Self::new(options, controller)
    }

    pub fn controller(&self) -> &VoiceController {
        &self.controller
    }

    /// Enumerate devices; call once when the widget is shown
    pub async fn mount(&mut self) -> DeviceList {
        let devices = self.controller.refresh_devices().await;
        self.refresh();
        devices
    }

    /// Tear down any live session
    pub async fn unmount(&mut self) {
        self.controller.close().await;
        self.refresh();
    }

    /// Mic button pressed
    pub async fn click_mic(&mut self) -> ConnectionState {
        let state = self.controller.toggle().await;
        self.refresh();
        state
    }

    /// Device chosen from the menu; false if the menu rejected it
    pub async fn choose_device(&mut self, kind: DeviceKind, device_id: &str) -> bool {
        let Some(intent) = self.menu.choose(kind, device_id) else {
            info!("Ignoring selection of {:?} device {}", kind, device_id);
            return false;
        };

        match intent.kind {
            DeviceKind::Input => self.controller.select_input_device(&intent.device_id),
            DeviceKind::Output => self.controller.select_output_device(&intent.device_id).await,
        }

        self.refresh();
        true
    }

    pub fn set_hover(&mut self, hover: Hover) {
        self.hover = hover;
    }

    /// Resync the menu with the controller's devices, selection and state
    pub fn refresh(&mut self) {
        self.menu.update(
            &self.controller.devices(),
            &self.controller.selection(),
            self.controller.state().is_connecting(),
        );
    }

    pub fn view(&self) -> WidgetView {
        WidgetView::render(self.controller.state(), self.hover, &self.appearance)
    }

    /// Device menu, or `None` when device selection is hidden
    pub fn menu(&self) -> Option<&DeviceMenu> {
        self.appearance.show_device_selection.then_some(&self.menu)
    }

    pub fn menu_mut(&mut self) -> Option<&mut DeviceMenu> {
        if self.appearance.show_device_selection {
            Some(&mut self.menu)
        } else {
            None
        }
    }
}
