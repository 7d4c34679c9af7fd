//! USB device identities and reconciliation planning.
//!
//! A [`DeviceIdentity`] names a *class* of USB device by its vendor and
//! product id.  The daemon is configured with a list of
//! [`DeviceRequirement`]s; a [`DeviceSelection`] wraps that list and answers
//! the two questions a switch needs:
//!
//! - Which devices are *desired* for this transition (all of them, or only the
//!   essential ones)?
//! - Given the devices the hypervisor reports as attached right now, which of
//!   them must be attached or detached to reach the target side?
//!
//! Planning always works against the live attached list, never against a
//! remembered state, which is what makes a switch idempotent.

use std::collections::BTreeSet;
use std::fmt;

/// Vendor/product pair identifying a USB device class.
///
/// Ordered so it can be used as a `BTreeSet` key, which keeps plans and log
/// output deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceIdentity {
    pub const fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    /// Formats as `vvvv:pppp`, the same notation `lsusb` prints.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)
    }
}

/// A configured device plus whether it must move on every switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceRequirement {
    pub identity: DeviceIdentity,
    /// Essential devices are switched even when optional devices are skipped.
    pub essential: bool,
}

/// The configured set of devices the daemon is allowed to manage.
///
/// Immutable after construction.  Duplicate identities collapse into one
/// entry; if any duplicate is essential the merged entry is essential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceSelection {
    all: BTreeSet<DeviceIdentity>,
    essential: BTreeSet<DeviceIdentity>,
}

impl DeviceSelection {
    pub fn new(requirements: impl IntoIterator<Item = DeviceRequirement>) -> Self {
        let mut selection = Self::default();
        for req in requirements {
            selection.all.insert(req.identity);
            if req.essential {
                selection.essential.insert(req.identity);
            }
        }
        selection
    }

    /// Returns the desired set for a transition.
    ///
    /// With `skip_optional` only the essential devices are returned.
    pub fn desired(&self, skip_optional: bool) -> &BTreeSet<DeviceIdentity> {
        if skip_optional {
            &self.essential
        } else {
            &self.all
        }
    }

    /// Number of configured devices.
    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    /// Devices that must be attached to the guest.
    ///
    /// Every desired identity that does not appear in `attached`, in
    /// identity order.  Devices already attached are left alone.
    pub fn plan_attach(
        &self,
        skip_optional: bool,
        attached: &[DeviceIdentity],
    ) -> Vec<DeviceIdentity> {
        let live: BTreeSet<&DeviceIdentity> = attached.iter().collect();
        self.desired(skip_optional)
            .iter()
            .filter(|id| !live.contains(id))
            .copied()
            .collect()
    }

    /// Devices that must be detached from the guest.
    ///
    /// Every entry of `attached` (in hypervisor order, duplicates included)
    /// whose identity is desired.  Attached devices outside the
    /// configuration are never returned.
    pub fn plan_detach(
        &self,
        skip_optional: bool,
        attached: &[DeviceIdentity],
    ) -> Vec<DeviceIdentity> {
        let desired = self.desired(skip_optional);
        attached
            .iter()
            .filter(|id| desired.contains(id))
            .copied()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEYBOARD: DeviceIdentity = DeviceIdentity::new(0x046d, 0xc52b);
    const MOUSE: DeviceIdentity = DeviceIdentity::new(0x1532, 0x0084);
    const WEBCAM: DeviceIdentity = DeviceIdentity::new(0x046d, 0x085e);
    const STRANGER: DeviceIdentity = DeviceIdentity::new(0xdead, 0xbeef);

    fn selection() -> DeviceSelection {
        DeviceSelection::new([
            DeviceRequirement {
                identity: KEYBOARD,
                essential: true,
            },
            DeviceRequirement {
                identity: MOUSE,
                essential: true,
            },
            DeviceRequirement {
                identity: WEBCAM,
                essential: false,
            },
        ])
    }

    #[test]
    fn test_identity_display_is_zero_padded_lowercase_hex() {
        assert_eq!(DeviceIdentity::new(0x1, 0xABCD).to_string(), "0001:abcd");
    }

    #[test]
    fn test_desired_full_set_contains_every_device() {
        let sel = selection();
        assert_eq!(sel.desired(false).len(), 3);
    }

    #[test]
    fn test_desired_skip_optional_contains_only_essential_devices() {
        let sel = selection();
        let desired = sel.desired(true);
        assert_eq!(desired.len(), 2);
        assert!(desired.contains(&KEYBOARD));
        assert!(desired.contains(&MOUSE));
        assert!(!desired.contains(&WEBCAM));
    }

    #[test]
    fn test_duplicate_requirements_collapse_and_essential_wins() {
        // Arrange
        let sel = DeviceSelection::new([
            DeviceRequirement {
                identity: WEBCAM,
                essential: false,
            },
            DeviceRequirement {
                identity: WEBCAM,
                essential: true,
            },
        ]);

        // Assert
        assert_eq!(sel.len(), 1);
        assert!(sel.desired(true).contains(&WEBCAM));
    }

    #[test]
    fn test_plan_attach_skips_devices_already_attached() {
        // Arrange
        let sel = selection();

        // Act
        let plan = sel.plan_attach(false, &[MOUSE, STRANGER]);

        // Assert
        assert_eq!(plan, vec![WEBCAM, KEYBOARD]);
    }

    #[test]
    fn test_plan_attach_is_empty_when_everything_is_attached() {
        let sel = selection();
        assert!(sel.plan_attach(false, &[KEYBOARD, MOUSE, WEBCAM]).is_empty());
    }

    #[test]
    fn test_plan_attach_skip_optional_never_includes_optional_devices() {
        let sel = selection();
        let plan = sel.plan_attach(true, &[]);
        assert_eq!(plan.len(), 2);
        assert!(!plan.contains(&WEBCAM));
    }

    #[test]
    fn test_plan_detach_ignores_devices_outside_configuration() {
        // Arrange
        let sel = selection();

        // Act
        let plan = sel.plan_detach(false, &[STRANGER, KEYBOARD, WEBCAM]);

        // Assert
        assert_eq!(plan, vec![KEYBOARD, WEBCAM]);
    }

    #[test]
    fn test_plan_detach_skip_optional_leaves_optional_devices_attached() {
        let sel = selection();
        let plan = sel.plan_detach(true, &[KEYBOARD, WEBCAM]);
        assert_eq!(plan, vec![KEYBOARD]);
    }

    #[test]
    fn test_plan_detach_keeps_duplicate_live_entries() {
        let sel = selection();
        let plan = sel.plan_detach(false, &[MOUSE, MOUSE]);
        assert_eq!(plan, vec![MOUSE, MOUSE]);
    }

    #[test]
    fn test_empty_selection_plans_nothing() {
        let sel = DeviceSelection::default();
        assert!(sel.is_empty());
        assert!(sel.plan_attach(false, &[]).is_empty());
        assert!(sel.plan_detach(false, &[KEYBOARD]).is_empty());
    }
}
