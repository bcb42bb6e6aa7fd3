// SPDX-License-Identifier: GPL-3.0-only

//! Flat camera property table
//!
//! The engine snapshots the device's properties on open and forwards writes
//! to the backend; it does not interpret the values.

use crate::backends::camera::{
    BackendResult, CameraProperty, CaptureBackend, DeviceHandle, PropertyInfo,
};
use tracing::{debug, warn};

/// Snapshot of a device's properties
#[derive(Debug, Clone, Default)]
pub struct PropertyTable {
    entries: Vec<PropertyInfo>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-read every property from the device
    pub fn refresh(&mut self, backend: &dyn CaptureBackend, device: DeviceHandle) -> BackendResult<()> {
        self.entries = backend.query_properties(device)?;
        debug!(count = self.entries.len(), "Property table refreshed");
        Ok(())
    }

    /// Write every property back to its default value
    ///
    /// With `as_auto`, properties that support automatic mode are switched
    /// to it. Individual failures are logged; the first one is returned once
    /// all properties were attempted.
    pub fn reset_to_default(
        &mut self,
        backend: &dyn CaptureBackend,
        device: DeviceHandle,
        as_auto: bool,
    ) -> BackendResult<()> {
        let mut first_error = None;
        for entry in &mut self.entries {
            let auto = as_auto && entry.supports_auto;
            match backend.set_property(device, entry.property, entry.default_value, auto) {
                Ok(()) => {
                    entry.value = entry.default_value;
                    entry.is_auto = auto;
                }
                Err(e) => {
                    warn!(property = entry.property.name(), error = %e, "Failed to reset property");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Write one property, clamped into its advertised range
    ///
    /// Properties missing from the snapshot are forwarded unclamped.
    pub fn set_value(
        &mut self,
        backend: &dyn CaptureBackend,
        device: DeviceHandle,
        property: CameraProperty,
        value: i32,
        is_auto: bool,
    ) -> BackendResult<()> {
        let entry = self.entries.iter_mut().find(|e| e.property == property);
        let value = entry.as_ref().map_or(value, |e| e.clamp(value));
        backend.set_property(device, property, value, is_auto)?;
        if let Some(entry) = entry {
            entry.value = value;
            entry.is_auto = is_auto && entry.supports_auto;
        }
        Ok(())
    }

    pub fn get(&self, property: CameraProperty) -> Option<&PropertyInfo> {
        self.entries.iter().find(|e| e.property == property)
    }

    pub fn entries(&self) -> &[PropertyInfo] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::camera::DeviceRef;
    use crate::backends::camera::virtual_camera::VirtualBackend;

    #[test]
    fn test_refresh_and_set() {
        let backend = VirtualBackend::with_demo_devices();
        let (device, _) = backend.bind_device(&DeviceRef::Index(0)).unwrap();

        let mut table = PropertyTable::new();
        table.refresh(&backend, device).unwrap();
        assert!(!table.is_empty());

        let brightness = table.get(CameraProperty::Brightness).unwrap().clone();
        table
            .set_value(&backend, device, CameraProperty::Brightness, brightness.maximum + 100, false)
            .unwrap();
        assert_eq!(table.get(CameraProperty::Brightness).unwrap().value, brightness.maximum);

        table.refresh(&backend, device).unwrap();
        assert_eq!(table.get(CameraProperty::Brightness).unwrap().value, brightness.maximum);
    }

    #[test]
    fn test_reset_to_default() {
        let backend = VirtualBackend::with_demo_devices();
        let (device, _) = backend.bind_device(&DeviceRef::Index(0)).unwrap();

        let mut table = PropertyTable::new();
        table.refresh(&backend, device).unwrap();
        table
            .set_value(&backend, device, CameraProperty::Contrast, 0, false)
            .unwrap();
        table.reset_to_default(&backend, device, true).unwrap();

        for entry in table.entries() {
            assert_eq!(entry.value, entry.default_value);
            assert_eq!(entry.is_auto, entry.supports_auto);
        }
    }
}
