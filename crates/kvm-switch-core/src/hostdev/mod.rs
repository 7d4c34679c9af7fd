//! Hypervisor device descriptions for USB pass-through.
//!
//! libvirt describes a pass-through USB device ("hostdev") with a small XML
//! fragment:
//!
//! ```xml
//! <hostdev mode="subsystem" type="usb">
//!   <source>
//!     <vendor id="0x046d"/>
//!     <product id="0xc52b"/>
//!   </source>
//! </hostdev>
//! ```
//!
//! The same fragment is used to attach and to detach a device.  The list of
//! devices currently attached to a running domain is read from the domain's
//! full description document (`virsh dumpxml`), where the hostdevs live under
//! `<domain><devices>`.

use thiserror::Error;
use tracing::debug;

use crate::domain::device::DeviceIdentity;

/// Errors produced while reading a domain description document.
#[derive(Debug, Error)]
pub enum HostdevParseError {
    /// The document is not well-formed XML.
    #[error("malformed domain description: {0}")]
    Xml(#[from] roxmltree::Error),

    /// The root element is something other than `<domain>`.
    #[error("expected a <domain> root element, found <{0}>")]
    NotADomain(String),
}

/// Renders the attach/detach fragment for one USB device.
pub fn render_usb_hostdev(id: DeviceIdentity) -> String {
    format!(
        "<hostdev mode=\"subsystem\" type=\"usb\">\n  \
         <source>\n    \
         <vendor id=\"{:#06x}\"/>\n    \
         <product id=\"{:#06x}\"/>\n  \
         </source>\n\
         </hostdev>\n",
        id.vendor_id, id.product_id
    )
}

/// Extracts the identities of every USB hostdev attached to a domain.
///
/// Only `<hostdev type="usb">` entries are considered.  USB hostdevs that
/// are addressed by bus/device number instead of vendor/product id, or whose
/// ids are not valid 16-bit hex numbers, cannot be matched against the
/// configuration and are left out.  A domain without a `<devices>` section
/// has no hostdevs.
///
/// # Errors
///
/// Returns [`HostdevParseError`] if the document is not XML or is not a
/// domain description.
pub fn parse_attached_usb_devices(xml: &str) -> Result<Vec<DeviceIdentity>, HostdevParseError> {
    let doc = roxmltree::Document::parse(xml)?;
    let root = doc.root_element();
    if !root.has_tag_name("domain") {
        return Err(HostdevParseError::NotADomain(
            root.tag_name().name().to_string(),
        ));
    }

    let Some(devices) = child_element(root, "devices") else {
        return Ok(Vec::new());
    };

    let identities = devices
        .children()
        .filter(|n| n.is_element() && n.has_tag_name("hostdev"))
        .filter(|n| n.attribute("type") == Some("usb"))
        .filter_map(|hostdev| {
            let id = usb_hostdev_identity(hostdev);
            if id.is_none() {
                debug!("skipping usb hostdev without a usable vendor/product id");
            }
            id
        })
        .collect();
    Ok(identities)
}

fn usb_hostdev_identity(hostdev: roxmltree::Node<'_, '_>) -> Option<DeviceIdentity> {
    let source = child_element(hostdev, "source")?;
    let vendor = child_element(source, "vendor")?.attribute("id")?;
    let product = child_element(source, "product")?.attribute("id")?;
    Some(DeviceIdentity::new(parse_hex_u16(vendor)?, parse_hex_u16(product)?))
}

fn child_element<'a, 'input>(
    node: roxmltree::Node<'a, 'input>,
    name: &str,
) -> Option<roxmltree::Node<'a, 'input>> {
    node.children()
        .find(|n| n.is_element() && n.has_tag_name(name))
}

/// Parses `0x046d`, `0X046D` or bare `046d`.
fn parse_hex_u16(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u16::from_str_radix(digits, 16).ok()
}
