// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Device signals gating uploads. The host platform supplies them through
//! [`SystemInfoProvider`] and [`NetworkInfoProvider`].

use std::fmt::Debug;
use std::sync::RwLock;

/// Uploads are held back below this battery percentage unless charging.
pub const LOW_BATTERY_THRESHOLD: i32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemInfo {
    pub battery_full_or_charging: bool,
    /// Battery percentage, or `-1` when unknown.
    pub battery_level: i32,
    pub power_save_mode: bool,
    pub on_external_power_source: bool,
}

impl Default for SystemInfo {
    fn default() -> Self {
        Self {
            battery_full_or_charging: false,
            battery_level: -1,
            power_save_mode: false,
            on_external_power_source: true,
        }
    }
}

impl SystemInfo {
    pub fn is_ready_for_upload(&self) -> bool {
        let has_power = self.battery_full_or_charging
            || self.on_external_power_source
            || self.battery_level > LOW_BATTERY_THRESHOLD;
        has_power && !self.power_save_mode
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum NetworkConnectivity {
    NotConnected,
    Wifi,
    Ethernet,
    Cellular,
    #[default]
    Other,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct NetworkInfo {
    pub connectivity: NetworkConnectivity,
}

impl NetworkInfo {
    pub fn is_connected(&self) -> bool {
        self.connectivity != NetworkConnectivity::NotConnected
    }
}

pub trait SystemInfoProvider: Send + Sync + Debug {
    fn system_info(&self) -> SystemInfo;
}

pub trait NetworkInfoProvider: Send + Sync + Debug {
    fn network_info(&self) -> NetworkInfo;
}

/// Provider backed by a value the host updates when the platform reports changes.
#[derive(Debug, Default)]
pub struct StaticInfoProvider<T> {
    value: RwLock<T>,
}

impl<T: Copy> StaticInfoProvider<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: RwLock::new(value),
        }
    }

    #[allow(clippy::expect_used)]
    pub fn update(&self, value: T) {
        *self.value.write().expect("lock poisoned") = value;
    }

    #[allow(clippy::expect_used)]
    fn get(&self) -> T {
        *self.value.read().expect("lock poisoned")
    }
}

impl SystemInfoProvider for StaticInfoProvider<SystemInfo> {
    fn system_info(&self) -> SystemInfo {
        self.get()
    }
}

impl NetworkInfoProvider for StaticInfoProvider<NetworkInfo> {
    fn network_info(&self) -> NetworkInfo {
        self.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_system_is_ready() {
        assert!(SystemInfo::default().is_ready_for_upload());
    }

    #[test]
    fn test_low_battery_blocks_upload() {
        let info = SystemInfo {
            battery_full_or_charging: false,
            battery_level: LOW_BATTERY_THRESHOLD,
            power_save_mode: false,
            on_external_power_source: false,
        };
        assert!(!info.is_ready_for_upload());

        let info = SystemInfo {
            battery_level: LOW_BATTERY_THRESHOLD + 1,
            ..info
        };
        assert!(info.is_ready_for_upload());
    }

    #[test]
    fn test_charging_overrides_low_battery_but_not_power_save() {
        let info = SystemInfo {
            battery_full_or_charging: true,
            battery_level: 2,
            power_save_mode: false,
            on_external_power_source: false,
        };
        assert!(info.is_ready_for_upload());

        let info = SystemInfo {
            power_save_mode: true,
            ..info
        };
        assert!(!info.is_ready_for_upload());
    }

    #[test]
    fn test_static_provider_update() {
        let provider = StaticInfoProvider::new(NetworkInfo::default());
        assert!(provider.network_info().is_connected());

        provider.update(NetworkInfo {
            connectivity: NetworkConnectivity::NotConnected,
        });
        assert!(!provider.network_info().is_connected());
    }
}
