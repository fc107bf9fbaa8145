//! ABI shared between the `plughost` runtime and a dynamically loaded
//! extension. Kept in its own crate, separate from the host implementation,
//! so an extension binary only ever links against this small, stable
//! surface instead of the full host.
//!
//! Everything crossing the `dylib` boundary is `repr(C)`: enums as `u8`,
//! capability sets as explicit function-pointer vtables (per the host's
//! design note that virtual dispatch across an FFI boundary should be
//! re-expressed as a vtable, not language-level inheritance), and owned
//! strings copied across as `CStr` immediately on receipt.

use std::ffi::{c_char, c_void, CStr, CString};

pub mod port;

// ---------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input = 0,
    Output = 1,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortType {
    SharedMemory = 0,
    InternalMemory = 1,
    Socket = 2,
    Function = 3,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessPolicy {
    Direct = 0,
    Buffered = 1,
}

impl PortDirection {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Input),
            1 => Some(Self::Output),
            _ => None,
        }
    }
}

impl PortType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::SharedMemory),
            1 => Some(Self::InternalMemory),
            2 => Some(Self::Socket),
            3 => Some(Self::Function),
            _ => None,
        }
    }
}

impl AccessPolicy {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Direct),
            1 => Some(Self::Buffered),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------
// Stable type hash
// ---------------------------------------------------------------------

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over a canonical, hand-authored layout description. Deliberately
/// not a hash of a compiler-generated type name or mangled signature: those
/// vary across toolchain versions and compilation units, which is exactly
/// what the host needs two independently built extensions to agree despite.
pub const fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
        i += 1;
    }
    hash
}

/// Implemented by any payload type exchanged over a port. `LAYOUT` is a
/// canonical description of the type's fields (name, order, size) authored
/// once by the extension developer, not derived from `type_name::<T>()`.
pub trait PayloadLayout {
    const LAYOUT: &'static str;

    fn type_hash() -> u64 {
        fnv1a64(Self::LAYOUT.as_bytes())
    }
}

macro_rules! impl_payload_layout_for_primitive {
    ($($t:ty => $layout:literal),* $(,)?) => {
        $(
            impl PayloadLayout for $t {
                const LAYOUT: &'static str = $layout;
            }
        )*
    };
}

impl_payload_layout_for_primitive! {
    u8 => "u8",
    i8 => "i8",
    u16 => "u16",
    i16 => "i16",
    u32 => "u32",
    i32 => "i32",
    u64 => "u64",
    i64 => "i64",
    f32 => "f32",
    f64 => "f64",
    bool => "bool",
}

// ---------------------------------------------------------------------
// Port descriptor (owned, host-side ergonomic form)
// ---------------------------------------------------------------------

/// Owned counterpart of [`RawPortDescriptor`]; this is what `Plugin` impls
/// build in safe Rust, and what the host reconstructs after crossing the
/// FFI boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDescriptor {
    pub name: String,
    pub direction: PortDirection,
    pub port_type: PortType,
    pub access_policy: AccessPolicy,
    pub payload_size: usize,
    pub type_hash: u64,
}

impl PortDescriptor {
    pub fn for_payload<T: PayloadLayout>(
        name: impl Into<String>,
        direction: PortDirection,
        port_type: PortType,
        access_policy: AccessPolicy,
    ) -> Self {
        Self {
            name: name.into(),
            direction,
            port_type,
            access_policy,
            payload_size: std::mem::size_of::<T>(),
            type_hash: T::type_hash(),
        }
    }
}

/// `repr(C)` wire form of [`PortDescriptor`] returned across the ABI
/// boundary by `get_port_descriptors`. `name` is only valid for the
/// duration of that call; the host must copy it before returning.
#[repr(C)]
pub struct RawPortDescriptor {
    pub name: *const c_char,
    pub direction: PortDirection,
    pub port_type: PortType,
    pub access_policy: AccessPolicy,
    pub payload_size: usize,
    pub type_hash: u64,
}

impl RawPortDescriptor {
    /// # Safety
    /// `name` must point at a valid, NUL-terminated, UTF-8 string that
    /// outlives this call.
    pub unsafe fn to_owned_descriptor(&self) -> PortDescriptor {
        let name = CStr::from_ptr(self.name).to_string_lossy().into_owned();
        PortDescriptor {
            name,
            direction: self.direction,
            port_type: self.port_type,
            access_policy: self.access_policy,
            payload_size: self.payload_size,
            type_hash: self.type_hash,
        }
    }
}

// ---------------------------------------------------------------------
// Host services vtable (host -> extension, for OpenPort/Read/Write)
// ---------------------------------------------------------------------

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RawPortHandle {
    pub impl_ptr: *mut c_void,
}

impl RawPortHandle {
    pub const NULL: Self = Self {
        impl_ptr: std::ptr::null_mut(),
    };
}

#[repr(C)]
pub struct HostServicesVTable {
    pub open_port:
        unsafe extern "C" fn(ctx: *mut c_void, name: *const c_char) -> RawPortHandle,
    pub read: unsafe extern "C" fn(
        ctx: *mut c_void,
        handle: RawPortHandle,
        dst: *mut u8,
        len: usize,
        out_bytes: *mut usize,
    ) -> bool,
    pub write: unsafe extern "C" fn(
        ctx: *mut c_void,
        handle: RawPortHandle,
        src: *const u8,
        len: usize,
        out_bytes: *mut usize,
    ) -> bool,
}

/// What the host hands an extension's `initialize`: a vtable pointer plus
/// the opaque host context it must be called with. Both pointers are only
/// valid for the lifetime of the extension instance.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HostServicesHandle {
    pub vtable: *const HostServicesVTable,
    pub ctx: *mut c_void,
}

/// Safe, extension-side facade over [`HostServicesHandle`].
pub trait HostServices {
    fn open_port(&self, name: &str) -> RawPortHandle;
    fn read(&self, handle: RawPortHandle, dst: &mut [u8]) -> (bool, usize);
    fn write(&self, handle: RawPortHandle, src: &[u8]) -> (bool, usize);
}

impl HostServices for HostServicesHandle {
    fn open_port(&self, name: &str) -> RawPortHandle {
        let cname = match CString::new(name) {
            Ok(c) => c,
            Err(_) => return RawPortHandle::NULL,
        };
        unsafe { ((*self.vtable).open_port)(self.ctx, cname.as_ptr()) }
    }

    fn read(&self, handle: RawPortHandle, dst: &mut [u8]) -> (bool, usize) {
        let mut out = 0usize;
        let ok = unsafe {
            ((*self.vtable).read)(self.ctx, handle, dst.as_mut_ptr(), dst.len(), &mut out)
        };
        (ok, out)
    }

    fn write(&self, handle: RawPortHandle, src: &[u8]) -> (bool, usize) {
        let mut out = 0usize;
        let ok = unsafe {
            ((*self.vtable).write)(self.ctx, handle, src.as_ptr(), src.len(), &mut out)
        };
        (ok, out)
    }
}

// ---------------------------------------------------------------------
// Plugin vtable (the IPlugin capability set, extension -> host)
// ---------------------------------------------------------------------

#[repr(C)]
pub struct PluginVTable {
    pub get_port_descriptors:
        unsafe extern "C" fn(instance: *mut c_void, out_len: *mut usize) -> *const RawPortDescriptor,
    pub initialize: unsafe extern "C" fn(instance: *mut c_void, services: HostServicesHandle),
    pub run: unsafe extern "C" fn(instance: *mut c_void),
    pub shutdown: unsafe extern "C" fn(instance: *mut c_void),
}

/// Every value `CreatePlugin` returns begins with this header: the host
/// reads the vtable pointer out of the first field of whatever `IPlugin*`
/// it receives, exactly as a C++ vtable pointer sits at offset zero of a
/// polymorphic object.
#[repr(C)]
pub struct PluginHeader {
    pub vtable: *const PluginVTable,
}

/// Safe, extension-side trait. Implement this; `export_plugin!` generates
/// the `repr(C)` wrapper and the two exported ABI symbols around it.
pub trait Plugin: 'static {
    fn port_descriptors(&self) -> Vec<PortDescriptor>;
    /// `services` is valid for the lifetime of this instance (the host
    /// keeps its backing `ExtensionContext` alive through `shutdown`), so a
    /// plugin that needs I/O from `run` should store this value — it is
    /// `Copy` — rather than relying on receiving it again later.
    fn initialize(&mut self, services: HostServicesHandle);
    fn run(&mut self);
    fn shutdown(&mut self);
}

#[repr(C)]
struct Instance<P: Plugin> {
    header: PluginHeader,
    inner: P,
    // Keeps the CStrings backing the last `get_port_descriptors` call alive
    // for the (synchronous, single-threaded) duration the host reads them.
    name_storage: std::cell::RefCell<Vec<CString>>,
    raw_storage: std::cell::RefCell<Vec<RawPortDescriptor>>,
}

const fn vtable_for<P: Plugin>() -> PluginVTable {
    PluginVTable {
        get_port_descriptors: get_port_descriptors_trampoline::<P>,
        initialize: initialize_trampoline::<P>,
        run: run_trampoline::<P>,
        shutdown: shutdown_trampoline::<P>,
    }
}

unsafe extern "C" fn get_port_descriptors_trampoline<P: Plugin>(
    instance: *mut c_void,
    out_len: *mut usize,
) -> *const RawPortDescriptor {
    let inst = &*(instance as *const Instance<P>);
    let owned = inst.inner.port_descriptors();

    let mut names = inst.name_storage.borrow_mut();
    let mut raws = inst.raw_storage.borrow_mut();
    names.clear();
    raws.clear();

    for d in &owned {
        let cname = match CString::new(d.name.clone()) {
            Ok(c) => c,
            Err(_) => continue,
        };
        raws.push(RawPortDescriptor {
            name: cname.as_ptr(),
            direction: d.direction,
            port_type: d.port_type,
            access_policy: d.access_policy,
            payload_size: d.payload_size,
            type_hash: d.type_hash,
        });
        names.push(cname);
    }

    *out_len = raws.len();
    raws.as_ptr()
}

unsafe extern "C" fn initialize_trampoline<P: Plugin>(
    instance: *mut c_void,
    services: HostServicesHandle,
) {
    let inst = &mut *(instance as *mut Instance<P>);
    inst.inner.initialize(services);
}

unsafe extern "C" fn run_trampoline<P: Plugin>(instance: *mut c_void) {
    let inst = &mut *(instance as *mut Instance<P>);
    inst.inner.run();
}

unsafe extern "C" fn shutdown_trampoline<P: Plugin>(instance: *mut c_void) {
    let inst = &mut *(instance as *mut Instance<P>);
    inst.inner.shutdown();
}

/// Wraps `plugin` in the `repr(C)` header/vtable pair and leaks it onto the
/// heap; the returned pointer is the exact value an extension's
/// `CreatePlugin` export must return. Call only from `export_plugin!`.
pub fn create_plugin_instance<P: Plugin>(plugin: P) -> *mut c_void {
    let boxed = Box::new(Instance {
        header: PluginHeader {
            vtable: Box::leak(Box::new(vtable_for::<P>())),
        },
        inner: plugin,
        name_storage: std::cell::RefCell::new(Vec::new()),
        raw_storage: std::cell::RefCell::new(Vec::new()),
    });
    Box::into_raw(boxed) as *mut c_void
}

/// # Safety
/// `instance` must be a pointer previously returned by
/// `create_plugin_instance::<P>` for the same `P`, and must not be used
/// again afterwards.
pub unsafe fn destroy_plugin_instance<P: Plugin>(instance: *mut c_void) {
    drop(Box::from_raw(instance as *mut Instance<P>));
}

pub const CREATE_PLUGIN_SYMBOL: &[u8] = b"CreatePlugin\0";
pub const DESTROY_PLUGIN_SYMBOL: &[u8] = b"DestroyPlugin\0";

pub type CreatePluginFn = unsafe extern "C" fn() -> *mut c_void;
pub type DestroyPluginFn = unsafe extern "C" fn(*mut c_void);

/// Generates the two `extern "C"` exports (`CreatePlugin`/`DestroyPlugin`)
/// a plugin binary must have, wired to a [`Plugin`] value built by
/// `$make`.
#[macro_export]
macro_rules! export_plugin {
    ($plugin_ty:ty, $make:expr) => {
        #[no_mangle]
        pub extern "C" fn CreatePlugin() -> *mut ::std::ffi::c_void {
            let make: fn() -> $plugin_ty = $make;
            $crate::create_plugin_instance::<$plugin_ty>(make())
        }

        /// # Safety
        /// Called by the host exactly once, with the pointer `CreatePlugin`
        /// returned.
        #[no_mangle]
        pub unsafe extern "C" fn DestroyPlugin(instance: *mut ::std::ffi::c_void) {
            $crate::destroy_plugin_instance::<$plugin_ty>(instance)
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_hash_stable_for_same_layout() {
        assert_eq!(u32::type_hash(), u32::type_hash());
        assert_ne!(u32::type_hash(), f32::type_hash());
    }

    #[test]
    fn fnv1a_matches_known_vector() {
        // FNV-1a 64-bit of the empty string is the offset basis.
        assert_eq!(fnv1a64(b""), FNV_OFFSET_BASIS);
    }

    struct Noop;
    impl Plugin for Noop {
        fn port_descriptors(&self) -> Vec<PortDescriptor> {
            vec![PortDescriptor::for_payload::<u32>(
                "out",
                PortDirection::Output,
                PortType::InternalMemory,
                AccessPolicy::Buffered,
            )]
        }
        fn initialize(&mut self, _services: HostServicesHandle) {}
        fn run(&mut self) {}
        fn shutdown(&mut self) {}
    }

    #[test]
    fn round_trip_through_raw_vtable() {
        let instance = create_plugin_instance(Noop);
        unsafe {
            let header = &*(instance as *const PluginHeader);
            let mut len = 0usize;
            let raw = ((*header.vtable).get_port_descriptors)(instance, &mut len);
            assert_eq!(len, 1);
            let slice = std::slice::from_raw_parts(raw, len);
            let owned = slice[0].to_owned_descriptor();
            assert_eq!(owned.name, "out");
            assert_eq!(owned.payload_size, 4);

            destroy_plugin_instance::<Noop>(instance);
        }
    }
}
