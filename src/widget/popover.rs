//! Positioned popover used by the device menu
//!
//! Placement is computed from the trigger's bounding box and the viewport.
//! Viewports at most `MOBILE_BREAKPOINT` wide use a centred layout that opens
//! towards whichever side has more room.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Distance between trigger and menu
pub const GAP: f64 = 4.0;
/// Minimum distance between menu and viewport edge on desktop
pub const EDGE_MARGIN: f64 = 8.0;
/// Minimum distance between menu and viewport edge on mobile
pub const MOBILE_MARGIN: f64 = 16.0;
pub const MOBILE_BREAKPOINT: f64 = 768.0;
pub const DEFAULT_MENU_WIDTH: f64 = 240.0;
pub const MAX_MENU_HEIGHT: f64 = 300.0;
pub const MIN_MENU_HEIGHT: f64 = 150.0;
/// Used to pick a direction on mobile before the menu has been measured
pub const ESTIMATED_MENU_HEIGHT: f64 = 200.0;

/// Anchor of the menu relative to its trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MenuPosition {
    Top,
    TopLeft,
    TopRight,
    Bottom,
    BottomLeft,
    #[default]
    BottomRight,
}

impl MenuPosition {
    pub const ALL: [MenuPosition; 6] = [
        MenuPosition::Top,
        MenuPosition::TopLeft,
        MenuPosition::TopRight,
        MenuPosition::Bottom,
        MenuPosition::BottomLeft,
        MenuPosition::BottomRight,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MenuPosition::Top => "top",
            MenuPosition::TopLeft => "top-left",
            MenuPosition::TopRight => "top-right",
            MenuPosition::Bottom => "bottom",
            MenuPosition::BottomLeft => "bottom-left",
            MenuPosition::BottomRight => "bottom-right",
        }
    }

    /// Whether the menu opens above the trigger
    pub fn is_top(self) -> bool {
        matches!(
            self,
            MenuPosition::Top | MenuPosition::TopLeft | MenuPosition::TopRight
        )
    }
}

impl fmt::Display for MenuPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MenuPosition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MenuPosition::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown menu position: {}", s))
    }
}

/// Axis-aligned box in viewport coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.left + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }

    pub fn center_x(&self) -> f64 {
        self.left + self.width / 2.0
    }

    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.left && x <= self.right() && y >= self.top && y <= self.bottom()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn is_mobile(&self) -> bool {
        self.width <= MOBILE_BREAKPOINT
    }
}

/// Horizontal offset of the menu
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Horizontal {
    /// Distance from the viewport's left edge to the menu's left edge
    Left(f64),
    /// Distance from the viewport's right edge to the menu's right edge
    Right(f64),
    /// Menu centred on this x coordinate
    Center(f64),
}

/// Vertical offset of the menu
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Vertical {
    /// Distance from the viewport's top edge to the menu's top edge
    Top(f64),
    /// Distance from the viewport's bottom edge to the menu's bottom edge
    Bottom(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub horizontal: Horizontal,
    pub vertical: Vertical,
    /// Fixed width; `None` keeps the menu's natural width
    pub width: Option<f64>,
    /// Height cap; content scrolls beyond it
    pub max_height: Option<f64>,
}

impl Placement {
    pub fn scrolls(&self) -> bool {
        self.max_height.is_some()
    }
}

/// Compute where the menu goes for a trigger at `trigger`
pub fn place(trigger: Rect, position: MenuPosition, menu_width: f64, viewport: Viewport) -> Placement {
    if viewport.is_mobile() {
        return place_mobile(trigger, menu_width, viewport);
    }

    let above = Vertical::Bottom(viewport.height - trigger.top + GAP);
    let below = Vertical::Top(trigger.bottom() + GAP);
    let align_left = Horizontal::Left(trigger.left.min(viewport.width - menu_width - EDGE_MARGIN));
    let align_right = Horizontal::Right((viewport.width - trigger.right()).max(EDGE_MARGIN));

    let (horizontal, vertical) = match position {
        MenuPosition::Top => (centered(trigger, menu_width, viewport), above),
        MenuPosition::TopLeft => (align_right, above),
        MenuPosition::TopRight => (align_left, above),
        MenuPosition::Bottom => (centered(trigger, menu_width, viewport), below),
        MenuPosition::BottomLeft => (align_right, below),
        MenuPosition::BottomRight => (align_left, below),
    };

    let available = if position.is_top() {
        trigger.top - GAP - EDGE_MARGIN
    } else {
        viewport.height - trigger.bottom() - GAP - EDGE_MARGIN
    };

    let max_height = (available < MAX_MENU_HEIGHT).then(|| available.max(MIN_MENU_HEIGHT));

    Placement {
        horizontal,
        vertical,
        width: None,
        max_height,
    }
}

/// Centre on the trigger unless that would cross a viewport edge
fn centered(trigger: Rect, menu_width: f64, viewport: Viewport) -> Horizontal {
    let desired = trigger.center_x() - menu_width / 2.0;
    let clamped = desired
        .min(viewport.width - menu_width - EDGE_MARGIN)
        .max(EDGE_MARGIN);

    if clamped == desired {
        Horizontal::Center(trigger.center_x())
    } else {
        Horizontal::Left(clamped)
    }
}

fn place_mobile(trigger: Rect, menu_width: f64, viewport: Viewport) -> Placement {
    let width = menu_width.min(viewport.width - 2.0 * MOBILE_MARGIN);
    let left = (trigger.center_x() - width / 2.0)
        .min(viewport.width - width - MOBILE_MARGIN)
        .max(MOBILE_MARGIN);

    let space_below = viewport.height - trigger.bottom();
    let space_above = trigger.top;

    let (vertical, space) = if space_below >= ESTIMATED_MENU_HEIGHT || space_below >= space_above {
        (Vertical::Top(trigger.bottom() + GAP), space_below)
    } else {
        (Vertical::Bottom(viewport.height - trigger.top + GAP), space_above)
    };

    Placement {
        horizontal: Horizontal::Left(left),
        vertical,
        width: Some(width),
        max_height: Some(MAX_MENU_HEIGHT.min(space - GAP - MOBILE_MARGIN)),
    }
}

/// Where a pointer press landed relative to the popover
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    Trigger,
    Content,
    Outside,
}

/// Open/closed state of a popover plus its last computed placement
#[derive(Debug, Clone, PartialEq)]
pub struct Popover {
    position: MenuPosition,
    placement: Option<Placement>,
}

impl Popover {
    pub fn new(position: MenuPosition) -> Self {
        Self {
            position,
            placement: None,
        }
    }

    pub fn position(&self) -> MenuPosition {
        self.position
    }

    pub fn is_open(&self) -> bool {
        self.placement.is_some()
    }

    pub fn placement(&self) -> Option<Placement> {
        self.placement
    }

    pub fn open(&mut self, trigger: Rect, menu_width: f64, viewport: Viewport) {
        self.placement = Some(place(trigger, self.position, menu_width, viewport));
    }

    pub fn close(&mut self) {
        self.placement = None;
    }

    /// Recompute placement after a resize or orientation change
    pub fn reposition(&mut self, trigger: Rect, menu_width: f64, viewport: Viewport) {
        if self.is_open() {
            self.open(trigger, menu_width, viewport);
        }
    }

    /// Handle a press; the trigger toggles, outside presses dismiss
    pub fn on_pointer_down(
        &mut self,
        target: PointerTarget,
        trigger: Rect,
        menu_width: f64,
        viewport: Viewport,
    ) {
        match target {
            PointerTarget::Trigger if self.is_open() => self.close(),
            PointerTarget::Trigger => self.open(trigger, menu_width, viewport),
            PointerTarget::Content => {}
            PointerTarget::Outside => self.close(),
        }
    }

    pub fn on_key(&mut self, key: &str) {
        if key == "Escape" {
            self.close();
        }
    }
}
