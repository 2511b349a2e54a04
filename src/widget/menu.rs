use super::popover::{MenuPosition, Popover};
use crate::devices::{AudioDevice, DeviceKind, DeviceList, DeviceSelection};

/// A device picked from the menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIntent {
    pub kind: DeviceKind,
    pub device_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuItem {
    pub id: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MenuSection {
    pub kind: DeviceKind,
    pub title: &'static str,
    pub items: Vec<MenuItem>,
}

/// Device selection menu: a microphone section and a speaker section
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMenu {
    pub sections: Vec<MenuSection>,
    /// Menu cannot be opened while a connection is being set up
    pub disabled: bool,
    pub popover: Popover,
}

fn items(devices: &[AudioDevice], selected: Option<&str>) -> Vec<MenuItem> {
    devices
        .iter()
        .map(|device| MenuItem {
            id: device.id.clone(),
            label: if device.label.is_empty() {
                "Unknown Device".to_string()
            } else {
                device.label.clone()
            },
            selected: selected == Some(device.id.as_str()),
        })
        .collect()
}

impl DeviceMenu {
    pub fn new(position: MenuPosition) -> Self {
        Self {
            sections: Vec::new(),
            disabled: false,
            popover: Popover::new(position),
        }
    }

    /// Rebuild sections from the current devices and selection
    pub fn update(&mut self, devices: &DeviceList, selection: &DeviceSelection, disabled: bool) {
        self.sections = vec![
            MenuSection {
                kind: DeviceKind::Input,
                title: "Microphone",
                items: items(&devices.inputs, selection.input.as_deref()),
            },
            MenuSection {
                kind: DeviceKind::Output,
                title: "Speaker",
                items: items(&devices.outputs, selection.output.as_deref()),
            },
        ];

        self.disabled = disabled;
        if disabled {
            self.popover.close();
        }
    }

    /// Pick an item; closes the popover and yields the intent
    pub fn choose(&mut self, kind: DeviceKind, device_id: &str) -> Option<DeviceIntent> {
        if self.disabled {
            return None;
        }

        let known = self
            .sections
            .iter()
            .filter(|section| section.kind == kind)
            .flat_map(|section| &section.items)
            .any(|item| item.id == device_id);

        if !known {
            return None;
        }

        self.popover.close();
        Some(DeviceIntent {
            kind,
            device_id: device_id.to_string(),
        })
    }

    pub fn selected(&self, kind: DeviceKind) -> Option<&MenuItem> {
        self.sections
            .iter()
            .filter(|section| section.kind == kind)
            .flat_map(|section| &section.items)
            .find(|item| item.selected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::popover::{Rect, Viewport};

    fn devices() -> DeviceList {
        DeviceList {
            inputs: vec![
                AudioDevice {
                    id: "in1".to_string(),
                    label: "Built-in Mic".to_string(),
                },
                AudioDevice {
                    id: "in2".to_string(),
                    label: String::new(),
                },
            ],
            outputs: vec![AudioDevice {
                id: "out1".to_string(),
                label: "Speakers".to_string(),
            }],
        }
    }

    #[test]
    fn test_sections_mark_selection() {
        let selection = DeviceSelection {
            input: Some("in2".to_string()),
            output: Some("out1".to_string()),
        };
        let mut menu = DeviceMenu::new(MenuPosition::default());
        menu.update(&devices(), &selection, false);

        assert_eq!(menu.sections[0].title, "Microphone");
        assert_eq!(menu.sections[1].title, "Speaker");

        let input = menu.selected(DeviceKind::Input).unwrap();
        assert_eq!(input.id, "in2");
        assert_eq!(input.label, "Unknown Device");
        assert_eq!(menu.selected(DeviceKind::Output).unwrap().id, "out1");
    }

    #[test]
    fn test_choose_emits_intent_for_known_devices_only() {
        let mut menu = DeviceMenu::new(MenuPosition::default());
        menu.update(&devices(), &DeviceSelection::default(), false);

        assert_eq!(
            menu.choose(DeviceKind::Input, "in1"),
            Some(DeviceIntent {
                kind: DeviceKind::Input,
                device_id: "in1".to_string()
            })
        );
        assert_eq!(menu.choose(DeviceKind::Output, "in1"), None);
        assert_eq!(menu.choose(DeviceKind::Input, "missing"), None);
    }

    #[test]
    fn test_disabled_menu_closes_and_ignores_choices() {
        let mut menu = DeviceMenu::new(MenuPosition::default());
        menu.popover.open(
            Rect::new(0.0, 0.0, 20.0, 20.0),
            240.0,
            Viewport {
                width: 1024.0,
                height: 768.0,
            },
        );

        menu.update(&devices(), &DeviceSelection::default(), true);

        assert!(!menu.popover.is_open());
        assert_eq!(menu.choose(DeviceKind::Input, "in1"), None);
    }
}
