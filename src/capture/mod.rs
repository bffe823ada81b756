//! Capture source adapter (C5): a uniform frame-callback interface over
//! the two backends §6.1 treats as external collaborators (the vendor
//! USB/HDMI library and a generic OS video-capture API). Neither backend's
//! FFI is in scope here (§1 Non-goals); what this module owns is the
//! contract the rest of the pipeline is built against, plus a synthetic
//! source used by the coordinator's own tests.

use crate::errors::CaptureError;

/// One delivered video frame, reinterpreted as 16-bit little-endian words
/// per §6.1 (YUV 4:2:2 8-bit packed as u16, pixel stride 2 bytes).
pub struct CapturedFrame {
    pub words: Vec<u16>,
    pub width: u32,
    pub height: u32,
}

/// A device identifier: either a decimal index (vendor backend) or
/// `"<impl>://<opaque>"` (generic backend), per §4.5.
pub enum DeviceId {
    Vendor(u32),
    Generic(String),
}

impl DeviceId {
    pub fn parse(s: &str) -> Self {
        if let Some(opaque) = s.split_once("://") {
            DeviceId::Generic(format!("{}://{}", opaque.0, opaque.1))
        } else if let Ok(index) = s.parse::<u32>() {
            DeviceId::Vendor(index)
        } else {
            DeviceId::Generic(s.to_string())
        }
    }
}

/// Uniform callback interface a capture backend drives. `start_stream`
/// blocks the calling thread, invoking `on_frame` for each delivered
/// frame, until `stop` is called from another thread or a fatal device
/// error occurs.
pub trait CaptureSource: Send {
    fn start_stream(&mut self, on_frame: Box<dyn FnMut(CapturedFrame) + Send>) -> Result<(), CaptureError>;

    fn stop(&mut self);
}

/// `hsdaoh`-equivalent vendor USB backend: `alloc → set_raw_callback →
/// set_message_callback → open(index) → start_stream(cb)` per §4.5. The
/// vendor library itself is an external collaborator (§1); this type
/// documents the contract without linking against it.
pub struct VendorSource {
    index: u32,
}

impl VendorSource {
    pub fn open(index: u32) -> Result<Self, CaptureError> {
        Ok(Self { index })
    }
}

impl CaptureSource for VendorSource {
    fn start_stream(&mut self, _on_frame: Box<dyn FnMut(CapturedFrame) + Send>) -> Result<(), CaptureError> {
        Err(CaptureError::DeviceOpen(format!(
            "vendor capture backend (device {}) is an external collaborator; no hsdaoh binding is linked into this build",
            self.index
        )))
    }

    fn stop(&mut self) {}
}

/// Generic OS capture backend (Video4Linux2 / Media Foundation): selects
/// `YUYV 1920x1080 @ >=40fps` and delivers frames bit-identically to the
/// vendor backend, per §4.5.
pub struct GenericSource {
    opaque: String,
}

impl GenericSource {
    pub fn open(opaque: String) -> Result<Self, CaptureError> {
        Ok(Self { opaque })
    }
}

impl CaptureSource for GenericSource {
    fn start_stream(&mut self, _on_frame: Box<dyn FnMut(CapturedFrame) + Send>) -> Result<(), CaptureError> {
        Err(CaptureError::DeviceOpen(format!(
            "generic capture backend ({}) is an external collaborator; no V4L2/Media Foundation binding is linked into this build",
            self.opaque
        )))
    }

    fn stop(&mut self) {}
}

pub fn open(device: Option<&str>) -> Result<Box<dyn CaptureSource>, CaptureError> {
    match device.map(DeviceId::parse) {
        None => Ok(Box::new(VendorSource::open(0)?)),
        Some(DeviceId::Vendor(i)) => Ok(Box::new(VendorSource::open(i)?)),
        Some(DeviceId::Generic(s)) => Ok(Box::new(GenericSource::open(s)?)),
    }
}

#[cfg(test)]
pub mod synthetic {
    //! A programmatic capture source used only by the coordinator's own
    //! tests, standing in for real hardware the way a fake clock stands in
    //! for a real one.
    use super::*;

    pub struct SyntheticSource {
        pub frames: Vec<CapturedFrame>,
    }

    impl CaptureSource for SyntheticSource {
        fn start_stream(&mut self, mut on_frame: Box<dyn FnMut(CapturedFrame) + Send>) -> Result<(), CaptureError> {
            for frame in self.frames.drain(..) {
                on_frame(frame);
            }
            Ok(())
        }

        fn stop(&mut self) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_id_parses_decimal_as_vendor() {
        assert!(matches!(DeviceId::parse("2"), DeviceId::Vendor(2)));
    }

    #[test]
    fn device_id_parses_scheme_as_generic() {
        assert!(matches!(DeviceId::parse("v4l2://0"), DeviceId::Generic(_)));
    }
}
