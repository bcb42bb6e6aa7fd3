// SPDX-License-Identifier: GPL-3.0-only

//! V4L2 camera control interface
//!
//! Maps `CameraProperty` onto V4L2 control IDs and reads or writes them
//! with `VIDIOC_QUERYCTRL`, `VIDIOC_G_CTRL` and `VIDIOC_S_CTRL` on an open
//! device node.

use super::types::{CameraProperty, PropertyInfo};
use std::io;
use std::os::unix::io::AsRawFd;
use tracing::debug;

// ===== V4L2 Control Class Bases =====
const V4L2_CTRL_CLASS_USER: u32 = 0x00980000;
const V4L2_CTRL_CLASS_CAMERA: u32 = 0x009a0000;

const V4L2_CID_BASE: u32 = V4L2_CTRL_CLASS_USER | 0x900;
const V4L2_CID_CAMERA_CLASS_BASE: u32 = V4L2_CTRL_CLASS_CAMERA | 0x900;

// ===== V4L2 Control IDs (User Class) =====

pub const V4L2_CID_BRIGHTNESS: u32 = V4L2_CID_BASE;
pub const V4L2_CID_CONTRAST: u32 = V4L2_CID_BASE + 1;
pub const V4L2_CID_SATURATION: u32 = V4L2_CID_BASE + 2;
pub const V4L2_CID_HUE: u32 = V4L2_CID_BASE + 3;
/// Automatic white balance
pub const V4L2_CID_AUTO_WHITE_BALANCE: u32 = V4L2_CID_BASE + 12;
pub const V4L2_CID_GAMMA: u32 = V4L2_CID_BASE + 16;
/// Automatic gain control
pub const V4L2_CID_AUTOGAIN: u32 = V4L2_CID_BASE + 18;
pub const V4L2_CID_GAIN: u32 = V4L2_CID_BASE + 19;
/// White balance temperature in Kelvin
pub const V4L2_CID_WHITE_BALANCE_TEMPERATURE: u32 = V4L2_CID_BASE + 26;
pub const V4L2_CID_SHARPNESS: u32 = V4L2_CID_BASE + 27;
pub const V4L2_CID_BACKLIGHT_COMPENSATION: u32 = V4L2_CID_BASE + 28;

// ===== V4L2 Control IDs (Camera Class) =====

/// Exposure mode menu: Auto, Manual, Shutter Priority, Aperture Priority
pub const V4L2_CID_EXPOSURE_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 1;
/// Absolute exposure time in 100µs units
pub const V4L2_CID_EXPOSURE_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 2;
pub const V4L2_CID_PAN_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 8;
pub const V4L2_CID_TILT_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 9;
pub const V4L2_CID_FOCUS_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 10;
pub const V4L2_CID_FOCUS_AUTO: u32 = V4L2_CID_CAMERA_CLASS_BASE + 12;
pub const V4L2_CID_ZOOM_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 13;
pub const V4L2_CID_IRIS_ABSOLUTE: u32 = V4L2_CID_CAMERA_CLASS_BASE + 17;

// ===== V4L2 Exposure Auto Menu Values =====

/// Manual exposure time and iris
pub const V4L2_EXPOSURE_MANUAL: i32 = 1;
/// Auto exposure time, manual iris; the automatic mode UVC webcams report
pub const V4L2_EXPOSURE_APERTURE_PRIORITY: i32 = 3;

// ===== V4L2 Control Flags =====
const V4L2_CTRL_FLAG_DISABLED: u32 = 0x0001;

// ===== V4L2 ioctl Numbers =====
// Calculated as: (dir << 30) | (size << 16) | ('V' << 8) | nr
// where dir: 2=READ, 1=WRITE, 3=READ|WRITE

/// Get control value (v4l2_control: 8 bytes)
const VIDIOC_G_CTRL: libc::c_ulong = 0xC008561B;
/// Set control value (v4l2_control: 8 bytes)
const VIDIOC_S_CTRL: libc::c_ulong = 0xC008561C;
/// Query control info (v4l2_queryctrl: 68 bytes)
const VIDIOC_QUERYCTRL: libc::c_ulong = 0xC0445624;

// ===== V4L2 ioctl Structures =====

#[repr(C)]
struct V4l2Control {
    id: u32,
    value: i32,
}

#[repr(C)]
struct V4l2Queryctrl {
    id: u32,
    ctrl_type: u32,
    name: [u8; 32],
    minimum: i32,
    maximum: i32,
    step: i32,
    default_value: i32,
    flags: u32,
    reserved: [u32; 2],
}

/// Control range as reported by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRange {
    pub minimum: i32,
    pub maximum: i32,
    pub step: i32,
    pub default_value: i32,
}

/// How a property's automatic mode is switched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoControl {
    pub id: u32,
    /// Value written to enable automatic mode
    pub on: i32,
    /// Value written to return to manual mode
    pub off: i32,
}

/// Control IDs backing one property
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PropertyControls {
    pub value: u32,
    pub auto: Option<AutoControl>,
}

const fn toggle(id: u32) -> Option<AutoControl> {
    Some(AutoControl { id, on: 1, off: 0 })
}

/// V4L2 controls for a property; `None` where V4L2 has no equivalent
pub fn controls_for(property: CameraProperty) -> Option<PropertyControls> {
    let (value, auto) = match property {
        CameraProperty::Brightness => (V4L2_CID_BRIGHTNESS, None),
        CameraProperty::Contrast => (V4L2_CID_CONTRAST, None),
        CameraProperty::Hue => (V4L2_CID_HUE, None),
        CameraProperty::Saturation => (V4L2_CID_SATURATION, None),
        CameraProperty::Sharpness => (V4L2_CID_SHARPNESS, None),
        CameraProperty::Gamma => (V4L2_CID_GAMMA, None),
        CameraProperty::WhiteBalance => (
            V4L2_CID_WHITE_BALANCE_TEMPERATURE,
            toggle(V4L2_CID_AUTO_WHITE_BALANCE),
        ),
        CameraProperty::BacklightCompensation => (V4L2_CID_BACKLIGHT_COMPENSATION, None),
        CameraProperty::Gain => (V4L2_CID_GAIN, toggle(V4L2_CID_AUTOGAIN)),
        CameraProperty::Pan => (V4L2_CID_PAN_ABSOLUTE, None),
        CameraProperty::Tilt => (V4L2_CID_TILT_ABSOLUTE, None),
        CameraProperty::Roll => return None,
        CameraProperty::Zoom => (V4L2_CID_ZOOM_ABSOLUTE, None),
        CameraProperty::Exposure => (
            V4L2_CID_EXPOSURE_ABSOLUTE,
            Some(AutoControl {
                id: V4L2_CID_EXPOSURE_AUTO,
                on: V4L2_EXPOSURE_APERTURE_PRIORITY,
                off: V4L2_EXPOSURE_MANUAL,
            }),
        ),
        CameraProperty::Iris => (V4L2_CID_IRIS_ABSOLUTE, None),
        CameraProperty::Focus => (V4L2_CID_FOCUS_ABSOLUTE, toggle(V4L2_CID_FOCUS_AUTO)),
    };
    Some(PropertyControls { value, auto })
}

/// Query a control's range; `None` when missing or disabled
pub fn query_control(fd: &impl AsRawFd, control_id: u32) -> Option<ControlRange> {
    let mut qctrl = V4l2Queryctrl {
        id: control_id,
        ctrl_type: 0,
        name: [0; 32],
        minimum: 0,
        maximum: 0,
        step: 0,
        default_value: 0,
        flags: 0,
        reserved: [0; 2],
    };

    let result = unsafe {
        libc::ioctl(
            fd.as_raw_fd(),
            VIDIOC_QUERYCTRL,
            &mut qctrl as *mut V4l2Queryctrl,
        )
    };

    if result < 0 || qctrl.flags & V4L2_CTRL_FLAG_DISABLED != 0 {
        return None;
    }

    Some(ControlRange {
        minimum: qctrl.minimum,
        maximum: qctrl.maximum,
        step: qctrl.step,
        default_value: qctrl.default_value,
    })
}

/// Get current value of a control
pub fn get_control(fd: &impl AsRawFd, control_id: u32) -> io::Result<i32> {
    let mut ctrl = V4l2Control {
        id: control_id,
        value: 0,
    };

    let result = unsafe { libc::ioctl(fd.as_raw_fd(), VIDIOC_G_CTRL, &mut ctrl as *mut V4l2Control) };

    if result < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(ctrl.value)
}

/// Set value of a control
pub fn set_control(fd: &impl AsRawFd, control_id: u32, value: i32) -> io::Result<()> {
    let mut ctrl = V4l2Control {
        id: control_id,
        value,
    };

    let result = unsafe { libc::ioctl(fd.as_raw_fd(), VIDIOC_S_CTRL, &mut ctrl as *mut V4l2Control) };

    if result < 0 {
        return Err(io::Error::last_os_error());
    }

    if ctrl.value != value {
        debug!(
            control_id,
            requested = value,
            actual = ctrl.value,
            "V4L2 control value was clamped"
        );
    }
    Ok(())
}

/// Read one property table row; `None` when the device lacks the control
pub fn query_property(fd: &impl AsRawFd, property: CameraProperty) -> Option<PropertyInfo> {
    let controls = controls_for(property)?;
    let range = query_control(fd, controls.value)?;
    let value = get_control(fd, controls.value).unwrap_or(range.default_value);

    let auto = controls
        .auto
        .filter(|auto| query_control(fd, auto.id).is_some());
    let is_auto = auto
        .and_then(|auto| get_control(fd, auto.id).ok().map(|v| v == auto.on))
        .unwrap_or(false);

    Some(PropertyInfo {
        property,
        minimum: range.minimum,
        maximum: range.maximum,
        step: range.step.max(1),
        default_value: range.default_value,
        value,
        supports_auto: auto.is_some(),
        is_auto,
    })
}

/// Write a property, switching its automatic mode first
///
/// Drivers refuse manual values while automatic mode is on, so the value is
/// only written in manual mode.
pub fn set_property(
    fd: &impl AsRawFd,
    property: CameraProperty,
    value: i32,
    auto: bool,
) -> io::Result<()> {
    let controls = controls_for(property).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::Unsupported,
            format!("{} has no V4L2 control", property.name()),
        )
    })?;

    if let Some(auto_control) = controls.auto {
        let mode = if auto { auto_control.on } else { auto_control.off };
        set_control(fd, auto_control.id, mode)?;
        if auto {
            return Ok(());
        }
    }
    set_control(fd, controls.value, value)
}
