//! Hotkey recognition for the keyboard-driven switch.
//!
//! The trigger gesture is "press both Ctrl keys, then let go".  Holding a Meta
//! key while the Ctrls are down requests a reduced switch that skips the
//! optional devices.
//!
//! # State machine
//!
//! ```text
//!            both Ctrls down               Ctrls released
//!   Idle ─────────────────────► ComboHeld ─────────────────► Grabbed
//!    ▲                                       (SwitchToGuest)     │
//!    └───────────────────────────────────────────────────────────┘
//!                   grab probe succeeded (release_confirmed)
//! ```
//!
//! The tracker is pure: it never talks to a device or the switch engine.  The
//! hotkey monitor in the daemon feeds it events and acts on the
//! [`HotkeyAction`]s it returns.

use std::collections::HashMap;

pub mod codes;

/// One key transition read from a raw input device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    /// Linux input event code (`KEY_*` from `input-event-codes.h`).
    pub code: u16,
    /// `true` for press and autorepeat, `false` for release.
    pub pressed: bool,
}

impl KeyEvent {
    pub const fn press(code: u16) -> Self {
        Self {
            code,
            pressed: true,
        }
    }

    pub const fn release(code: u16) -> Self {
        Self {
            code,
            pressed: false,
        }
    }
}

/// Per-key pressed flags.
///
/// Entries are only ever toggled by events; the set is never bulk-cleared
/// while a device stays connected.
#[derive(Debug, Clone, Default)]
pub struct PressedKeySet {
    keys: HashMap<u16, bool>,
}

impl PressedKeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, code: u16, pressed: bool) {
        self.keys.insert(code, pressed);
    }

    /// Keys never seen are reported as released.
    pub fn is_pressed(&self, code: u16) -> bool {
        self.keys.get(&code).copied().unwrap_or(false)
    }

    fn any_pressed(&self, codes: &[u16]) -> bool {
        codes.iter().any(|c| self.is_pressed(*c))
    }

    fn all_pressed(&self, codes: &[u16]) -> bool {
        codes.iter().all(|c| self.is_pressed(*c))
    }
}

/// Observable state of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyState {
    /// No combo held and control is on the host.
    Idle,
    /// Both Ctrl keys are down; waiting for the release.
    ComboHeld,
    /// Control has been handed to the guest.
    Grabbed,
}

/// What the caller must do after feeding an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HotkeyAction {
    /// Move the peripherals to the guest.
    SwitchToGuest { skip_optional: bool },
}

/// Debounces key events into discrete switch triggers.
#[derive(Debug, Clone, Default)]
pub struct HotkeyTracker {
    pressed: PressedKeySet,
    triggered: bool,
    grabbed: bool,
    skip_optional: bool,
}

impl HotkeyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> HotkeyState {
        if self.grabbed {
            HotkeyState::Grabbed
        } else if self.triggered {
            HotkeyState::ComboHeld
        } else {
            HotkeyState::Idle
        }
    }

    pub fn pressed_keys(&self) -> &PressedKeySet {
        &self.pressed
    }

    /// Whether the monitor should keep probing for the guest's release.
    pub fn is_grabbed(&self) -> bool {
        self.grabbed
    }

    /// Feeds one key event.
    ///
    /// Returns [`HotkeyAction::SwitchToGuest`] exactly once per
    /// press-then-release of the Ctrl pair.  While grabbed, events only
    /// update the pressed-key set.
    pub fn handle_key(&mut self, event: KeyEvent) -> Option<HotkeyAction> {
        self.pressed.set(event.code, event.pressed);

        if self.grabbed {
            return None;
        }

        let combo_down = self.pressed.all_pressed(&codes::COMBO_KEYS);
        let meta_down = self.pressed.any_pressed(&codes::SKIP_OPTIONAL_KEYS);

        if combo_down {
            if !self.triggered {
                self.triggered = true;
                self.skip_optional = meta_down;
            } else if meta_down {
                // Latched: letting go of Meta before the Ctrls does not undo it.
                self.skip_optional = true;
            }
            None
        } else if self.triggered {
            self.triggered = false;
            self.grabbed = true;
            Some(HotkeyAction::SwitchToGuest {
                skip_optional: self.skip_optional,
            })
        } else {
            None
        }
    }

    /// Records that the guest gave the input device back.
    ///
    /// Returns `true` if the tracker was grabbed, i.e. the caller must now
    /// switch to the host.
    pub fn release_confirmed(&mut self) -> bool {
        std::mem::replace(&mut self.grabbed, false)
    }

    /// Forgets key state after the input device was reopened.
    ///
    /// A half-seen combo is dropped so a replug cannot fire a switch; the
    /// grabbed flag is kept because the guest may still own the peripherals.
    pub fn reset_after_reconnect(&mut self) {
        self.pressed = PressedKeySet::new();
        self.triggered = false;
        self.skip_optional = false;
    }
}
