mod common;

use common::{wait_for_state, Harness, MockMedia, MockSignaling};
use std::sync::{Arc, Mutex};
use voice_widget::devices::{AudioConstraints, DeviceKind, DeviceSelection};
use voice_widget::transport::TransportState;
use voice_widget::widget::{ButtonTone, MicIcon, PointerTarget, Rect, Viewport};
use voice_widget::{MenuPosition, VoiceWidget, WidgetOptions};

const VIEWPORT: Viewport = Viewport {
    width: 1280.0,
    height: 800.0,
};

fn widget(h: &Harness, options: WidgetOptions) -> VoiceWidget {
    VoiceWidget::new(options, h.controller.clone())
}

#[tokio::test]
async fn test_mount_populates_menu() {
    let h = Harness::new();
    let mut w = widget(&h, WidgetOptions::new("http://localhost:8000"));

    let devices = w.mount().await;
    assert_eq!(devices.inputs.len(), 2);
    assert_eq!(devices.outputs.len(), 2);

    let menu = w.menu().unwrap();
    assert_eq!(menu.sections[0].title, "Microphone");
    assert_eq!(menu.sections[1].title, "Speaker");
    assert_eq!(menu.sections[0].items[1].label, "Microphone in2");
    assert_eq!(menu.selected(DeviceKind::Input).unwrap().id, "in1");
    assert_eq!(menu.selected(DeviceKind::Output).unwrap().id, "out1");

    // The probe stream used for labels is released straight away
    assert_eq!(h.media.live_tracks(), 0);
}

#[tokio::test]
async fn test_mount_with_denied_microphone_shows_no_devices() {
    let h = Harness::with(MockSignaling::default(), MockMedia::denying());
    let mut w = widget(&h, WidgetOptions::new("http://localhost:8000"));

    let devices = w.mount().await;

    assert!(devices.is_empty());
    assert!(h.controller.devices().is_empty());
    assert_eq!(h.controller.selection(), DeviceSelection::default());
    assert_eq!(h.media.requests().len(), 1);
    assert!(h.notifier.alerts().is_empty());

    let menu = w.menu().unwrap();
    assert!(menu.sections.iter().all(|section| section.items.is_empty()));
    assert!(menu.selected(DeviceKind::Input).is_none());
}

#[tokio::test]
async fn test_native_widget_carries_processing_flags() {
    let processing = AudioConstraints {
        noise_suppression: false,
        auto_gain_control: false,
        ..AudioConstraints::default()
    };

    let w = VoiceWidget::native(WidgetOptions::new("http://localhost:8000"), processing.clone());

    assert_eq!(w.controller().processing(), processing);
    assert!(w.controller().state().is_idle());
}

#[tokio::test]
async fn test_choose_device_updates_selection() {
    let h = Harness::new();
    let mut w = widget(&h, WidgetOptions::new("http://localhost:8000"));
    w.mount().await;

    let trigger = Rect::new(1000.0, 700.0, 40.0, 40.0);
    w.menu_mut()
        .unwrap()
        .popover
        .on_pointer_down(PointerTarget::Trigger, trigger, 240.0, VIEWPORT);
    assert!(w.menu().unwrap().popover.is_open());

    assert!(w.choose_device(DeviceKind::Input, "in2").await);
    assert!(!w.menu().unwrap().popover.is_open());
    assert_eq!(w.menu().unwrap().selected(DeviceKind::Input).unwrap().id, "in2");
    assert_eq!(h.controller.selection().input.as_deref(), Some("in2"));

    assert!(!w.choose_device(DeviceKind::Output, "missing").await);
    assert_eq!(h.controller.selection().output.as_deref(), Some("out1"));
}

#[tokio::test]
async fn test_click_mic_renders_each_state() {
    let h = Harness::new();
    let mut states = h.controller.subscribe();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let mut options = WidgetOptions::new("http://localhost:8000");
    options.on_connection_change = Some(Arc::new(move |c| sink.lock().unwrap().push(c)));

    let mut w = widget(&h, options);
    w.mount().await;
    assert_eq!(w.view().to_line(), "[mic] Voice Chat - Click to start");

    w.click_mic().await;
    let view = w.view();
    assert_eq!(view.primary_text, "Connecting...");
    assert_eq!(view.tone, ButtonTone::Connecting);
    assert!(view.menu_disabled);
    assert!(w.menu().unwrap().disabled);
    assert!(!w.choose_device(DeviceKind::Input, "in2").await);

    h.transports.last().emit_state(TransportState::Connected);
    wait_for_state(&mut states, |s| s.is_connected()).await;
    w.refresh();

    let view = w.view();
    assert_eq!(view.icon, MicIcon::MicOff);
    assert_eq!(view.tone, ButtonTone::Active);
    assert!(!w.menu().unwrap().disabled);

    w.click_mic().await;
    assert_eq!(w.view().primary_text, "Voice Chat");
    assert_eq!(*seen.lock().unwrap(), vec![true, false]);
}

#[tokio::test]
async fn test_unmount_releases_session() {
    let h = Harness::new();
    let mut w = widget(&h, WidgetOptions::new("http://localhost:8000"));
    w.mount().await;

    w.click_mic().await;
    assert_eq!(h.media.live_tracks(), 1);

    w.unmount().await;

    assert!(h.controller.state().is_idle());
    assert_eq!(h.media.live_tracks(), 0);
    assert!(h.transports.last().is_closed());
}

#[tokio::test]
async fn test_hidden_device_selection() {
    let h = Harness::new();
    let mut options = WidgetOptions::new("http://localhost:8000");
    options.show_device_selection = false;
    options.menu_position = MenuPosition::TopLeft;
    options.class_name = "corner".to_string();
    options.background = "#111827".to_string();

    let mut w = widget(&h, options);
    w.mount().await;

    assert!(w.menu().is_none());
    assert!(w.menu_mut().is_none());

    let view = w.view();
    assert!(!view.show_device_selection);
    assert_eq!(view.class_name, "corner");
    assert_eq!(view.background, "#111827");
}
