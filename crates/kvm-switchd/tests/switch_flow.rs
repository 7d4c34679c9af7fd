//! Full guest/host cycles through the dispatcher worker and the engine.

use std::sync::Arc;

use kvm_switch_core::{
    DeviceIdentity, DeviceRequirement, DeviceSelection, DisplayTarget, SwitchTarget,
};
use kvm_switchd::application::dispatcher::{spawn_switch_worker, SwitchHandle, Switcher};
use kvm_switchd::application::switch_engine::{SwitchEngine, SwitchError, SwitchProfile};
use kvm_switchd::infrastructure::commands::mock::MockCommandRunner;
use kvm_switchd::infrastructure::display::mock::MockDisplayController;
use kvm_switchd::infrastructure::hypervisor::mock::MockHypervisor;

const KEYBOARD: DeviceIdentity = DeviceIdentity::new(0x046d, 0xc52b);
const MOUSE: DeviceIdentity = DeviceIdentity::new(0x1532, 0x0084);
const HEADSET: DeviceIdentity = DeviceIdentity::new(0x1b1c, 0x0a51);
const GAMEPAD: DeviceIdentity = DeviceIdentity::new(0x045e, 0x028e);

struct Rig {
    handle: SwitchHandle,
    hypervisor: Arc<MockHypervisor>,
    displays: Arc<MockDisplayController>,
    commands: Arc<MockCommandRunner>,
}

fn rig(hypervisor: MockHypervisor) -> Rig {
    let hypervisor = Arc::new(hypervisor);
    let displays = Arc::new(MockDisplayController::default());
    let commands = Arc::new(MockCommandRunner::default());
    let profile = SwitchProfile {
        devices: DeviceSelection::new([
            DeviceRequirement {
                identity: KEYBOARD,
                essential: true,
            },
            DeviceRequirement {
                identity: MOUSE,
                essential: true,
            },
            DeviceRequirement {
                identity: HEADSET,
                essential: false,
            },
        ]),
        displays: vec![DisplayTarget {
            bus: 7,
            feature: 0x60,
            host_input: 0x0f,
            guest_input: 0x12,
        }],
        host_commands: vec!["systemctl --user start barrier".to_string()],
        guest_commands: vec!["systemctl --user stop barrier".to_string()],
    };
    let engine = SwitchEngine::new(
        profile,
        hypervisor.clone(),
        displays.clone(),
        commands.clone(),
    );
    let (handle, _worker) = spawn_switch_worker(engine);
    Rig {
        handle,
        hypervisor,
        displays,
        commands,
    }
}

#[tokio::test]
async fn test_guest_then_host_cycle_restores_original_state() {
    // Arrange: the guest already owns an unmanaged gamepad.
    let rig = rig(MockHypervisor::with_attached([GAMEPAD]));

    // Act
    let to_guest = rig.handle.switch_to(SwitchTarget::Guest, false).await.unwrap();
    let to_host = rig.handle.switch_to(SwitchTarget::Host, false).await.unwrap();

    // Assert
    assert_eq!(to_guest.attached.len(), 3);
    assert_eq!(to_host.detached.len(), 3);
    assert_eq!(rig.hypervisor.attached(), vec![GAMEPAD]);
    assert_eq!(
        *rig.displays.calls.lock().unwrap(),
        vec![(7, 0x12), (7, 0x0f)]
    );
    assert_eq!(
        *rig.commands.calls.lock().unwrap(),
        vec![
            "systemctl --user stop barrier".to_string(),
            "systemctl --user start barrier".to_string()
        ]
    );
}

#[tokio::test]
async fn test_reduced_guest_switch_then_full_switch_adds_only_the_rest() {
    // Arrange
    let rig = rig(MockHypervisor::default());
    rig.handle.switch_to(SwitchTarget::Guest, true).await.unwrap();

    // Act
    let report = rig.handle.switch_to(SwitchTarget::Guest, false).await.unwrap();

    // Assert
    assert_eq!(report.attached, vec![HEADSET]);
}

#[tokio::test]
async fn test_reduced_host_switch_leaves_optional_device_with_guest() {
    let rig = rig(MockHypervisor::default());
    rig.handle.switch_to(SwitchTarget::Guest, false).await.unwrap();

    rig.handle.switch_to(SwitchTarget::Host, true).await.unwrap();

    assert_eq!(rig.hypervisor.attached(), vec![HEADSET]);
}

#[tokio::test]
async fn test_failure_midway_keeps_moved_devices_and_retry_finishes() {
    // Arrange
    let rig = rig(MockHypervisor::failing_on(MOUSE));

    // Act
    let first = rig.handle.switch_to(SwitchTarget::Guest, false).await;
    rig.hypervisor.clear_failure();
    let retry = rig.handle.switch_to(SwitchTarget::Guest, false).await.unwrap();

    // Assert
    assert!(matches!(first, Err(SwitchError::Hypervisor(_))));
    assert_eq!(retry.attached, vec![MOUSE, HEADSET]);
    let mut live = rig.hypervisor.attached();
    live.sort();
    assert_eq!(live, vec![KEYBOARD, MOUSE, HEADSET]);
}
