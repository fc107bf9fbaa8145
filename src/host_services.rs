//! Host Services: what an extension uses at runtime to open a port by
//! name and read/write bytes through it. Also the home of the composite
//! port graph (registry + connection table) the host and every running
//! extension share.

use std::cell::RefCell;
use std::collections::HashSet;
use std::ffi::{c_char, c_void, CStr};
use std::rc::Rc;

use plughost_abi::{HostServicesHandle, HostServicesVTable, RawPortHandle};

use crate::connection::ConnectionTable;
use crate::error::{HostError, HostResult};
use crate::registry::{PortKey, PortRegistry, TransportSlot};

/// The registry and connection table combined: the live port graph. Kept
/// as one cell so `Connect`
/// (which must see both) and host-services calls (which need to resolve a
/// handle back to a connection) don't require two separate locks.
pub struct PortGraph {
    pub registry: PortRegistry,
    pub connections: ConnectionTable,
    direct_pointers: HashSet<usize>,
    handle_table: Vec<PortKey>,
}

impl Default for PortGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PortGraph {
    pub fn new() -> Self {
        Self {
            registry: PortRegistry::new(),
            connections: ConnectionTable::new(),
            direct_pointers: HashSet::new(),
            handle_table: Vec::new(),
        }
    }

    pub fn connect(&mut self, provider: PortKey, receiver: PortKey) -> HostResult<()> {
        self.connections.connect(&mut self.registry, provider, receiver)
    }

    /// Resets the graph to empty, for `LoadFromFile`'s all-or-nothing
    /// reconstruction and for test isolation.
    pub fn clear(&mut self) {
        self.registry.clear();
        self.connections.clear();
        self.direct_pointers.clear();
        self.handle_table.clear();
    }

    fn open_port(&mut self, extension: &str, port: &str) -> RawPortHandle {
        let key = PortKey::new(extension, port);
        let Some(record) = self.registry.get(&key) else {
            return RawPortHandle::NULL;
        };
        match &record.transport {
            TransportSlot::Direct(block) => {
                let ptr = block.as_mut_ptr();
                self.direct_pointers.insert(ptr as usize);
                RawPortHandle {
                    impl_ptr: ptr as *mut c_void,
                }
            }
            _ => {
                self.handle_table.push(key);
                let index = self.handle_table.len(); // 1-based; 0 means null
                RawPortHandle {
                    impl_ptr: index as *mut c_void,
                }
            }
        }
    }

    fn resolve_buffered(&self, handle: RawPortHandle) -> Result<&PortKey, HostError> {
        let addr = handle.impl_ptr as usize;
        if self.direct_pointers.contains(&addr) {
            return Err(HostError::DirectHandleIo);
        }
        if addr == 0 {
            return Err(HostError::NoConnectionForHandle);
        }
        self.handle_table
            .get(addr - 1)
            .ok_or(HostError::NoConnectionForHandle)
    }

    fn write(&mut self, handle: RawPortHandle, src: &[u8]) -> (bool, usize) {
        let key = match self.resolve_buffered(handle) {
            Ok(k) => k.clone(),
            Err(_) => return (false, 0),
        };
        let mut wrote_any = false;
        let mut last_n = 0usize;
        for conn in self.connections.connections_mut() {
            if conn.provider != key {
                continue;
            }
            if let Some(buf) = conn.buffer.as_mut() {
                let n = src.len().min(buf.len());
                buf[..n].copy_from_slice(&src[..n]);
                conn.has_data = true;
                last_n = n;
                wrote_any = true;
            }
        }
        (wrote_any, last_n)
    }

    fn read(&mut self, handle: RawPortHandle, dst: &mut [u8]) -> (bool, usize) {
        let key = match self.resolve_buffered(handle) {
            Ok(k) => k.clone(),
            Err(_) => return (false, 0),
        };
        let Some(conn) = self
            .connections
            .connections_mut()
            .iter_mut()
            .find(|c| c.receiver == key)
        else {
            return (false, 0);
        };
        if !conn.has_data {
            return (false, 0);
        }
        let Some(buf) = conn.buffer.as_ref() else {
            return (false, 0);
        };
        let n = dst.len().min(buf.len());
        dst[..n].copy_from_slice(&buf[..n]);
        // Sticky: reads are idempotent until the next write, so
        // `has_data` is left set.
        (true, n)
    }
}

/// Per-extension context: which extension is calling, and the shared
/// graph it calls into. Allocated on the heap so its address is stable for
/// the whole `initialize`/`run`/`shutdown` sequence; the extension is free
/// to keep the `HostServicesHandle` it receives and reuse it at any point
/// in that sequence.
pub struct ExtensionContext {
    extension: String,
    graph: Rc<RefCell<PortGraph>>,
}

impl ExtensionContext {
    pub fn new(extension: impl Into<String>, graph: Rc<RefCell<PortGraph>>) -> Box<Self> {
        Box::new(Self {
            extension: extension.into(),
            graph,
        })
    }

    pub fn handle(&self) -> HostServicesHandle {
        HostServicesHandle {
            vtable: &VTABLE,
            ctx: self as *const Self as *mut c_void,
        }
    }
}

static VTABLE: HostServicesVTable = HostServicesVTable {
    open_port: open_port_trampoline,
    read: read_trampoline,
    write: write_trampoline,
};

unsafe extern "C" fn open_port_trampoline(ctx: *mut c_void, name: *const c_char) -> RawPortHandle {
    let ctx = &*(ctx as *const ExtensionContext);
    let name = CStr::from_ptr(name).to_string_lossy().into_owned();
    ctx.graph.borrow_mut().open_port(&ctx.extension, &name)
}

unsafe extern "C" fn read_trampoline(
    ctx: *mut c_void,
    handle: RawPortHandle,
    dst: *mut u8,
    len: usize,
    out_bytes: *mut usize,
) -> bool {
    let ctx = &*(ctx as *const ExtensionContext);
    let dst = std::slice::from_raw_parts_mut(dst, len);
    let (ok, n) = ctx.graph.borrow_mut().read(handle, dst);
    *out_bytes = n;
    ok
}

unsafe extern "C" fn write_trampoline(
    ctx: *mut c_void,
    handle: RawPortHandle,
    src: *const u8,
    len: usize,
    out_bytes: *mut usize,
) -> bool {
    let ctx = &*(ctx as *const ExtensionContext);
    let src = std::slice::from_raw_parts(src, len);
    let (ok, n) = ctx.graph.borrow_mut().write(handle, src);
    *out_bytes = n;
    ok
}

#[cfg(test)]
mod tests {
    use super::*;
    use plughost_abi::{AccessPolicy, HostServices as _, PortDescriptor, PortDirection, PortType};

    fn setup(policy: AccessPolicy) -> (Rc<RefCell<PortGraph>>, PortKey, PortKey) {
        let graph = Rc::new(RefCell::new(PortGraph::new()));
        {
            let mut g = graph.borrow_mut();
            g.registry.begin_addon("A");
            g.registry
                .create_port(PortDescriptor {
                    name: "out".to_string(),
                    direction: PortDirection::Output,
                    port_type: PortType::SharedMemory,
                    access_policy: policy,
                    payload_size: 4,
                    type_hash: 1,
                })
                .unwrap();
            g.registry.begin_addon("B");
            g.registry
                .create_port(PortDescriptor {
                    name: "in".to_string(),
                    direction: PortDirection::Input,
                    port_type: PortType::SharedMemory,
                    access_policy: policy,
                    payload_size: 4,
                    type_hash: 1,
                })
                .unwrap();
            g.connect(PortKey::new("A", "out"), PortKey::new("B", "in"))
                .unwrap();
        }
        (graph, PortKey::new("A", "out"), PortKey::new("B", "in"))
    }

    #[test]
    fn buffered_write_then_read_round_trips() {
        let (graph, _prov, _recv) = setup(AccessPolicy::Buffered);
        let prov_ctx = ExtensionContext::new("A", graph.clone());
        let recv_ctx = ExtensionContext::new("B", graph.clone());

        let prov_handle = prov_ctx.handle().open_port("out");
        let recv_handle = recv_ctx.handle().open_port("in");

        let (ok, n) = prov_ctx.handle().write(prov_handle, &[1, 2, 3, 4]);
        assert!(ok);
        assert_eq!(n, 4);

        let mut dst = [0u8; 4];
        let (ok, n) = recv_ctx.handle().read(recv_handle, &mut dst);
        assert!(ok);
        assert_eq!(n, 4);
        assert_eq!(dst, [1, 2, 3, 4]);
    }

    #[test]
    fn buffered_read_is_sticky() {
        let (graph, _prov, _recv) = setup(AccessPolicy::Buffered);
        let prov_ctx = ExtensionContext::new("A", graph.clone());
        let recv_ctx = ExtensionContext::new("B", graph.clone());
        let prov_handle = prov_ctx.handle().open_port("out");
        let recv_handle = recv_ctx.handle().open_port("in");

        prov_ctx.handle().write(prov_handle, &[9, 9, 9, 9]);
        let mut dst = [0u8; 4];
        recv_ctx.handle().read(recv_handle, &mut dst);
        let mut dst2 = [0u8; 4];
        let (ok, _) = recv_ctx.handle().read(recv_handle, &mut dst2);
        assert!(ok);
        assert_eq!(dst2, [9, 9, 9, 9]);
    }

    #[test]
    fn read_before_any_write_fails() {
        let (graph, _prov, _recv) = setup(AccessPolicy::Buffered);
        let recv_ctx = ExtensionContext::new("B", graph.clone());
        let recv_handle = recv_ctx.handle().open_port("in");
        let mut dst = [0u8; 4];
        let (ok, n) = recv_ctx.handle().read(recv_handle, &mut dst);
        assert!(!ok);
        assert_eq!(n, 0);
    }

    #[test]
    fn direct_handle_rejects_read_and_write() {
        let (graph, _prov, _recv) = setup(AccessPolicy::Direct);
        let prov_ctx = ExtensionContext::new("A", graph.clone());
        let prov_handle = prov_ctx.handle().open_port("out");

        let (ok, _) = prov_ctx.handle().write(prov_handle, &[1, 2, 3, 4]);
        assert!(!ok);
        let mut dst = [0u8; 4];
        let (ok, _) = prov_ctx.handle().read(prov_handle, &mut dst);
        assert!(!ok);
    }

    #[test]
    fn direct_handle_pointer_is_shared_between_provider_and_receiver() {
        let (graph, _prov, _recv) = setup(AccessPolicy::Direct);
        let prov_ctx = ExtensionContext::new("A", graph.clone());
        let recv_ctx = ExtensionContext::new("B", graph.clone());
        let prov_handle = prov_ctx.handle().open_port("out");
        let recv_handle = recv_ctx.handle().open_port("in");
        assert_eq!(prov_handle.impl_ptr, recv_handle.impl_ptr);
    }

    #[test]
    fn buffered_write_broadcasts_to_every_connected_receiver() {
        let graph = Rc::new(RefCell::new(PortGraph::new()));
        {
            let mut g = graph.borrow_mut();
            g.registry.begin_addon("A");
            g.registry
                .create_port(PortDescriptor {
                    name: "out".to_string(),
                    direction: PortDirection::Output,
                    port_type: PortType::SharedMemory,
                    access_policy: AccessPolicy::Buffered,
                    payload_size: 4,
                    type_hash: 1,
                })
                .unwrap();
            for name in ["B", "C"] {
                g.registry.begin_addon(name);
                g.registry
                    .create_port(PortDescriptor {
                        name: "in".to_string(),
                        direction: PortDirection::Input,
                        port_type: PortType::SharedMemory,
                        access_policy: AccessPolicy::Buffered,
                        payload_size: 4,
                        type_hash: 1,
                    })
                    .unwrap();
                g.connect(PortKey::new("A", "out"), PortKey::new(name, "in"))
                    .unwrap();
            }
        }

        let prov_ctx = ExtensionContext::new("A", graph.clone());
        let recv_b_ctx = ExtensionContext::new("B", graph.clone());
        let recv_c_ctx = ExtensionContext::new("C", graph.clone());

        let prov_handle = prov_ctx.handle().open_port("out");
        let recv_b_handle = recv_b_ctx.handle().open_port("in");
        let recv_c_handle = recv_c_ctx.handle().open_port("in");

        let (ok, n) = prov_ctx.handle().write(prov_handle, &[7, 7, 7, 7]);
        assert!(ok);
        assert_eq!(n, 4);

        let mut dst_b = [0u8; 4];
        let (ok_b, n_b) = recv_b_ctx.handle().read(recv_b_handle, &mut dst_b);
        assert!(ok_b);
        assert_eq!(n_b, 4);
        assert_eq!(dst_b, [7, 7, 7, 7]);

        let mut dst_c = [0u8; 4];
        let (ok_c, n_c) = recv_c_ctx.handle().read(recv_c_handle, &mut dst_c);
        assert!(ok_c);
        assert_eq!(n_c, 4);
        assert_eq!(dst_c, [7, 7, 7, 7]);
    }
}
