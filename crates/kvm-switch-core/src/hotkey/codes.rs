//! Linux input event key codes used by the hotkey.
//!
//! Values from `linux/input-event-codes.h`.  They are the same on every
//! architecture, so they are spelled out here instead of pulling in an evdev
//! binding just for the constants.

pub const KEY_A: u16 = 30;
pub const KEY_LEFTCTRL: u16 = 29;
pub const KEY_RIGHTCTRL: u16 = 97;
pub const KEY_LEFTMETA: u16 = 125;
pub const KEY_RIGHTMETA: u16 = 126;

/// Both must be down for the combo to count.
pub const COMBO_KEYS: [u16; 2] = [KEY_LEFTCTRL, KEY_RIGHTCTRL];

/// Either one held during the combo requests an essential-only switch.
pub const SKIP_OPTIONAL_KEYS: [u16; 2] = [KEY_LEFTMETA, KEY_RIGHTMETA];
