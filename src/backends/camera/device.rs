// SPDX-License-Identifier: GPL-3.0-only

//! Exclusive ownership of capture devices
//!
//! Only one camera source per device may exist in the process. A source
//! holds a [`DeviceLease`] for its lifetime; dropping the source drops the
//! lease and makes the device available to the next session.

use super::types::{BackendError, BackendResult};
use std::collections::HashSet;
use std::sync::{LazyLock, Mutex, MutexGuard};
use tracing::debug;

static LEASED_DEVICES: LazyLock<Mutex<HashSet<String>>> =
    LazyLock::new(|| Mutex::new(HashSet::new()));

fn registry() -> MutexGuard<'static, HashSet<String>> {
    // A panic while holding the lock cannot leave the set half-updated
    LEASED_DEVICES
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn device_key(device: &str) -> String {
    if device.is_empty() {
        "default".to_string()
    } else {
        device.to_string()
    }
}

/// Proof of exclusive access to one capture device
#[derive(Debug)]
pub struct DeviceLease {
    device: String,
}

impl DeviceLease {
    /// Take the device, failing with `DeviceBusy` if another lease exists
    pub fn acquire(device: &str) -> BackendResult<Self> {
        let key = device_key(device);
        if !registry().insert(key.clone()) {
            return Err(BackendError::DeviceBusy(key));
        }
        debug!(device = %key, "Device leased");
        Ok(Self { device: key })
    }

    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        registry().remove(&self.device);
        debug!(device = %self.device, "Device released");
    }
}

/// Whether a device is currently leased
pub fn is_leased(device: &str) -> bool {
    registry().contains(&device_key(device))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_lease_is_busy() {
        let name = format!("/dev/test-{}", uuid::Uuid::new_v4());
        let lease = DeviceLease::acquire(&name).unwrap();
        assert!(matches!(
            DeviceLease::acquire(&name),
            Err(BackendError::DeviceBusy(_))
        ));
        assert!(is_leased(&name));
        drop(lease);
        assert!(!is_leased(&name));
        assert!(DeviceLease::acquire(&name).is_ok());
    }
}
