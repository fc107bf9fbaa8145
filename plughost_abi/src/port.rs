//! Typed, extension-side port façade.
//!
//! A `Port<T>` bundles the four static attributes (name, direction, port
//! type, access policy) with a payload type at compile time and derives
//! `PayloadSize`/`TypeHash` from it. After `initialize`, a plugin binds each
//! of its ports to the host-provided [`HostServices`], which yields a
//! handle; direct ports additionally cache a typed pointer so reads/writes
//! become plain memory operations.

use crate::{AccessPolicy, HostServices, PayloadLayout, PortDescriptor, PortDirection, PortType, RawPortHandle};

pub struct Port<T> {
    name: &'static str,
    direction: PortDirection,
    port_type: PortType,
    access_policy: AccessPolicy,
    handle: RawPortHandle,
    direct_ptr: *mut T,
}

impl<T: PayloadLayout> Port<T> {
    pub const fn new(
        name: &'static str,
        direction: PortDirection,
        port_type: PortType,
        access_policy: AccessPolicy,
    ) -> Self {
        Self {
            name,
            direction,
            port_type,
            access_policy,
            handle: RawPortHandle::NULL,
            direct_ptr: std::ptr::null_mut(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The descriptor to return from `Plugin::port_descriptors`.
    pub fn descriptor(&self) -> PortDescriptor {
        PortDescriptor::for_payload::<T>(self.name, self.direction, self.port_type, self.access_policy)
    }

    /// Acquire this port's runtime handle. Call once, from `initialize`.
    pub fn bind(&mut self, services: &dyn HostServices) {
        self.handle = services.open_port(self.name);
        self.direct_ptr = if self.access_policy == AccessPolicy::Direct {
            self.handle.impl_ptr as *mut T
        } else {
            std::ptr::null_mut()
        };
    }

    /// Raw pointer access for Direct ports; null for Buffered ports or
    /// before `bind` has run.
    pub fn as_ptr(&self) -> *mut T {
        self.direct_ptr
    }

    fn is_direct(&self) -> bool {
        self.access_policy == AccessPolicy::Direct
    }
}

impl<T: PayloadLayout + Copy> Port<T> {
    /// Coerce to a value: in-place read for Direct ports, a buffered `Read`
    /// call otherwise. Returns `T::default`-less zero bytes on failure for
    /// types that implement `Default`; callers who need to distinguish
    /// failure should use [`Port::read`].
    pub fn get(&self, services: &dyn HostServices) -> Option<T> {
        if self.is_direct() {
            if self.direct_ptr.is_null() {
                return None;
            }
            return Some(unsafe { *self.direct_ptr });
        }
        let mut buf = vec![0u8; std::mem::size_of::<T>()];
        let (ok, n) = services.read(self.handle, &mut buf);
        if !ok || n != buf.len() {
            return None;
        }
        Some(unsafe { std::ptr::read_unaligned(buf.as_ptr() as *const T) })
    }

    /// Assignment sugar: in-place write for Direct ports, a buffered
    /// `Write` call otherwise. No-op (returns `false`) on an Input port.
    pub fn set(&self, services: &dyn HostServices, value: T) -> bool {
        if self.direction != PortDirection::Output {
            return false;
        }
        if self.is_direct() {
            if self.direct_ptr.is_null() {
                return false;
            }
            unsafe { *self.direct_ptr = value };
            return true;
        }
        let bytes = unsafe {
            std::slice::from_raw_parts(
                &value as *const T as *const u8,
                std::mem::size_of::<T>(),
            )
        };
        let (ok, n) = services.write(self.handle, bytes);
        ok && n == bytes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoServices;
    impl HostServices for NoServices {
        fn open_port(&self, _name: &str) -> RawPortHandle {
            RawPortHandle::NULL
        }
        fn read(&self, _handle: RawPortHandle, _dst: &mut [u8]) -> (bool, usize) {
            (false, 0)
        }
        fn write(&self, _handle: RawPortHandle, _src: &[u8]) -> (bool, usize) {
            (false, 0)
        }
    }

    #[test]
    fn descriptor_matches_payload() {
        let port = Port::<f32>::new(
            "out",
            PortDirection::Output,
            PortType::SharedMemory,
            AccessPolicy::Direct,
        );
        let d = port.descriptor();
        assert_eq!(d.name, "out");
        assert_eq!(d.payload_size, 4);
        assert_eq!(d.type_hash, f32::type_hash());
    }

    #[test]
    fn unbound_direct_port_reports_no_value() {
        let port = Port::<f32>::new(
            "out",
            PortDirection::Output,
            PortType::SharedMemory,
            AccessPolicy::Direct,
        );
        let services = NoServices;
        assert_eq!(port.get(&services), None);
        assert!(!port.set(&services, 1.0));
    }
}
