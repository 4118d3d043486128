//! Translates local pointer/keyboard events into the normalized remote-input
//! command protocol.
//!
//! All encoders are pure with respect to the connection: they take the raw
//! event, the current video geometry and screen resolution, and a
//! [`CommandSink`], and report whether a command went out. They never panic
//! and never retain the event. Commands attempted while the control channel
//! is closed are dropped; losing a few transient input samples is fine.

use crate::peer::types::ScreenResolution;
use serde::{Deserialize, Serialize};

/// Remote-input command, serialized as one JSON message per command.
/// Coordinates are always in the remote screen's native pixel space.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InputCommand {
    MouseMove {
        x: i32,
        y: i32,
    },
    MouseClick {
        button: MouseButton,
        double: bool,
        /// Absent for double-clicks; the agent treats those as one discrete
        /// action rather than a down/up pair.
        #[serde(skip_serializing_if = "Option::is_none")]
        down: Option<bool>,
    },
    Scroll {
        dx: f64,
        dy: f64,
    },
    KeyToggle {
        key: String,
        down: bool,
        modifiers: Vec<String>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
}

impl MouseButton {
    /// Secondary button maps to right; everything else is left.
    pub fn from_raw(button: i16) -> Self {
        if button == 2 {
            MouseButton::Right
        } else {
            MouseButton::Left
        }
    }
}

/// Where a command goes. The live implementation is the control channel;
/// tests substitute a recorder.
pub trait CommandSink {
    /// Returns false when the command was dropped (channel closed or send
    /// failed). Never blocks, never throws.
    fn try_send(&self, command: &InputCommand) -> bool;
}

/// Bounding box of the rendered video element, in local display pixels.
#[derive(Debug, Clone, Copy, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

/// Derived geometry of the displayed media inside the video element:
/// the letterboxed/pillarboxed rectangle plus the media's native size.
/// Recomputed by the consumer on resize or metadata load; never sent over
/// the wire.
#[derive(Debug, Clone, Copy, Default)]
pub struct VideoGeometry {
    pub display_width: f64,
    pub display_height: f64,
    pub offset_x: f64,
    pub offset_y: f64,
    pub source_width: f64,
    pub source_height: f64,
}

impl VideoGeometry {
    /// Fits the media's aspect ratio inside the container and centers it,
    /// mirroring what `object-fit: contain` renders. Returns `None` until
    /// both the container and the media report real dimensions.
    pub fn compute(container: Rect, source_width: f64, source_height: f64) -> Option<Self> {
        if container.width <= 0.0
            || container.height <= 0.0
            || source_width <= 0.0
            || source_height <= 0.0
        {
            return None;
        }

        let container_ratio = container.width / container.height;
        let video_ratio = source_width / source_height;

        let (display_width, display_height, offset_x, offset_y) = if video_ratio > container_ratio {
            let h = container.width / video_ratio;
            (container.width, h, 0.0, (container.height - h) / 2.0)
        } else {
            let w = container.height * video_ratio;
            (w, container.height, (container.width - w) / 2.0, 0.0)
        };

        Some(Self {
            display_width,
            display_height,
            offset_x,
            offset_y,
            source_width,
            source_height,
        })
    }

    fn is_known(&self) -> bool {
        self.display_width > 0.0 && self.source_width > 0.0
    }
}

/// Raw pointer event as the UI observed it, in client coordinates.
#[derive(Debug, Clone, Copy)]
pub struct PointerEvent {
    pub client_x: f64,
    pub client_y: f64,
    /// Platform button index; 2 is the secondary button.
    pub button: i16,
}

/// Raw wheel event; deltas pass through unmapped.
#[derive(Debug, Clone, Copy)]
pub struct WheelEvent {
    pub dx: f64,
    pub dy: f64,
}

/// Raw key event. `key` uses platform naming (`Control`, `a`, `Enter`, ...).
#[derive(Debug, Clone)]
pub struct KeyEvent {
    pub key: String,
}

/// True for keys whose default browser behavior the UI layer should
/// suppress. Local concern only; not part of the wire contract.
pub fn is_modifier_key(key: &str) -> bool {
    matches!(key, "Control" | "Alt" | "Shift" | "Meta")
}

/// Tracked modifier keys for the current input session. Mutated only by the
/// encoder's key handlers; reset when the engine reinitializes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ModifierState {
    pub control: bool,
    pub alt: bool,
    pub shift: bool,
    pub meta: bool,
}

impl ModifierState {
    fn apply(&mut self, key: &str, down: bool) {
        match key {
            "Control" => self.control = down,
            "Alt" => self.alt = down,
            "Shift" => self.shift = down,
            "Meta" => self.meta = down,
            _ => {}
        }
    }

    /// Active modifier names in wire form. `meta` goes out as `command`,
    /// which is what the agent's injector understands.
    fn active(&self) -> Vec<String> {
        let mut modifiers = Vec::new();
        if self.control {
            modifiers.push("control".to_string());
        }
        if self.alt {
            modifiers.push("alt".to_string());
        }
        if self.shift {
            modifiers.push("shift".to_string());
        }
        if self.meta {
            modifiers.push("command".to_string());
        }
        modifiers
    }
}

/// Stateful encoder for one input session.
#[derive(Debug, Default)]
pub struct InputEncoder {
    modifiers: ModifierState,
}

impl InputEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maps a pointer position into the displayed media rectangle and emits
    /// a `mouseMove` in remote native pixels. Positions outside the
    /// displayed rectangle emit nothing.
    ///
    /// Until geometry is known the event is normalized against the raw
    /// bounding box and scaled into the reported screen resolution instead;
    /// degraded, but the cursor still tracks.
    pub fn pointer_move(
        &self,
        event: &PointerEvent,
        rect: Rect,
        geometry: VideoGeometry,
        resolution: ScreenResolution,
        sink: &dyn CommandSink,
    ) -> bool {
        if !geometry.is_known() {
            if rect.width <= 0.0 || rect.height <= 0.0 {
                return false;
            }
            let x = (event.client_x - rect.x).clamp(0.0, rect.width);
            let y = (event.client_y - rect.y).clamp(0.0, rect.height);
            return sink.try_send(&InputCommand::MouseMove {
                x: (x / rect.width * resolution.width as f64).round() as i32,
                y: (y / rect.height * resolution.height as f64).round() as i32,
            });
        }

        let (remote_x, remote_y) = match map_into_source(event, rect, &geometry) {
            Some(point) => point,
            None => return false,
        };
        sink.try_send(&InputCommand::MouseMove {
            x: remote_x,
            y: remote_y,
        })
    }

    /// Button press. Down and up are separate commands; the agent composites
    /// them into clicks or drags.
    pub fn pointer_down(
        &self,
        event: &PointerEvent,
        rect: Rect,
        geometry: VideoGeometry,
        sink: &dyn CommandSink,
    ) -> bool {
        if map_into_source(event, rect, &geometry).is_none() {
            return false;
        }
        sink.try_send(&InputCommand::MouseClick {
            button: MouseButton::from_raw(event.button),
            double: false,
            down: Some(true),
        })
    }

    /// Button release. No containment check: a drag may legitimately end
    /// outside the video, and the agent still needs the up.
    pub fn pointer_up(&self, event: &PointerEvent, sink: &dyn CommandSink) -> bool {
        sink.try_send(&InputCommand::MouseClick {
            button: MouseButton::from_raw(event.button),
            double: false,
            down: Some(false),
        })
    }

    /// Discrete double-click action; no down/up pair.
    pub fn double_click(
        &self,
        event: &PointerEvent,
        rect: Rect,
        geometry: VideoGeometry,
        sink: &dyn CommandSink,
    ) -> bool {
        if map_into_source(event, rect, &geometry).is_none() {
            return false;
        }
        sink.try_send(&InputCommand::MouseClick {
            button: MouseButton::from_raw(event.button),
            double: true,
            down: None,
        })
    }

    /// Wheel deltas pass through unmapped; the remote cursor position was
    /// already set by the preceding move commands.
    pub fn wheel(&self, event: &WheelEvent, sink: &dyn CommandSink) -> bool {
        sink.try_send(&InputCommand::Scroll {
            dx: event.dx,
            dy: event.dy,
        })
    }

    /// Key press. Modifier keys update the tracked state before the command
    /// is built, so a modifier's own down includes itself in the set.
    pub fn key_down(&mut self, event: &KeyEvent, sink: &dyn CommandSink) -> bool {
        self.modifiers.apply(&event.key, true);
        sink.try_send(&InputCommand::KeyToggle {
            key: event.key.to_lowercase(),
            down: true,
            modifiers: self.modifiers.active(),
        })
    }

    /// Key release. The state updates first, so a modifier's own up no
    /// longer lists it.
    pub fn key_up(&mut self, event: &KeyEvent, sink: &dyn CommandSink) -> bool {
        self.modifiers.apply(&event.key, false);
        sink.try_send(&InputCommand::KeyToggle {
            key: event.key.to_lowercase(),
            down: false,
            modifiers: self.modifiers.active(),
        })
    }

    pub fn modifiers(&self) -> ModifierState {
        self.modifiers
    }

    /// Drops any held modifiers, e.g. when control is re-enabled after a
    /// reconnect and the real keyboard state is unknown.
    pub fn reset(&mut self) {
        self.modifiers = ModifierState::default();
    }
}

/// Position relative to the displayed rectangle, normalized against the
/// displayed dimensions and scaled into the media's native pixels. `None`
/// when the pointer sits in the letterbox bars or outside the element.
fn map_into_source(event: &PointerEvent, rect: Rect, geometry: &VideoGeometry) -> Option<(i32, i32)> {
    let relative_x = event.client_x - rect.x - geometry.offset_x;
    let relative_y = event.client_y - rect.y - geometry.offset_y;

    if relative_x < 0.0
        || relative_y < 0.0
        || relative_x > geometry.display_width
        || relative_y > geometry.display_height
    {
        return None;
    }

    let x = (relative_x / geometry.display_width * geometry.source_width).round() as i32;
    let y = (relative_y / geometry.display_height * geometry.source_height).round() as i32;
    Some((x, y))
}
