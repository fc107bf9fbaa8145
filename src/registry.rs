//! Port Registry: maps `(extension, port)` to a port record, ordered
//! by that composite key so enumeration, printing (by the caller) and
//! persistence are all deterministic.

use std::collections::BTreeMap;
use std::rc::Rc;

use plughost_abi::PortDescriptor;

use crate::error::HostError;

/// Globally unique key for a port: `(extension-name, port-name)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortKey {
    pub extension: String,
    pub port: String,
}

impl PortKey {
    pub fn new(extension: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            extension: extension.into(),
            port: port.into(),
        }
    }
}

/// A fixed-size block of bytes shared by a Direct connection's provider and
/// all of its receivers. `Rc` gives every port record that shares this
/// block the same underlying storage; `as_mut_ptr()` is what gets handed to
/// an extension as its raw typed pointer.
pub struct SharedBlock {
    data: std::cell::UnsafeCell<Box<[u8]>>,
}

impl SharedBlock {
    pub fn new(size: usize) -> Rc<Self> {
        Rc::new(Self {
            data: std::cell::UnsafeCell::new(vec![0u8; size].into_boxed_slice()),
        })
    }

    pub fn len(&self) -> usize {
        unsafe { (*self.data.get()).len() }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_mut_ptr(&self) -> *mut u8 {
        unsafe { (*self.data.get()).as_mut_ptr() }
    }
}

/// Where a port's live transport lives.
#[derive(Clone)]
pub enum TransportSlot {
    /// Buffered receivers start here; so does every port before `Connect`.
    Null,
    /// Direct ports: the shared storage block, identical `Rc` for every
    /// port record that shares it.
    Direct(Rc<SharedBlock>),
    /// Buffered ports: the real payload lives on the `Connection`, this is
    /// just a marker that at least one connection touches this port.
    Buffered,
}

impl TransportSlot {
    pub fn same_block_as(&self, other: &TransportSlot) -> bool {
        match (self, other) {
            (TransportSlot::Direct(a), TransportSlot::Direct(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

pub struct PortRecord {
    pub key: PortKey,
    pub descriptor: PortDescriptor,
    pub transport: TransportSlot,
}

pub struct PortRegistry {
    ports: BTreeMap<PortKey, PortRecord>,
    current_addon: Option<String>,
}

impl Default for PortRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PortRegistry {
    pub fn new() -> Self {
        Self {
            ports: BTreeMap::new(),
            current_addon: None,
        }
    }

    /// Sets the implicit context subsequent `create_port` calls register
    /// into. This mutable scratch field is a known wart — callers that
    /// want a cleaner shape can call `create_port_for` directly instead.
    pub fn begin_addon(&mut self, name: impl Into<String>) {
        self.current_addon = Some(name.into());
    }

    pub fn create_port(&mut self, descriptor: PortDescriptor) -> Result<(), HostError> {
        let addon = self
            .current_addon
            .clone()
            .ok_or(HostError::NoCurrentAddon)?;
        self.create_port_for(&addon, descriptor)
    }

    /// Explicit-context variant of `create_port`, for callers that'd
    /// rather not rely on `begin_addon`'s implicit state.
    pub fn create_port_for(
        &mut self,
        extension: &str,
        descriptor: PortDescriptor,
    ) -> Result<(), HostError> {
        let key = PortKey::new(extension, descriptor.name.clone());
        if self.ports.contains_key(&key) {
            tracing::warn!(extension = %key.extension, port = %key.port, "duplicate port ignored");
            return Err(HostError::DuplicatePort {
                extension: key.extension,
                port: key.port,
            });
        }
        tracing::debug!(
            extension = %key.extension,
            port = %key.port,
            direction = ?descriptor.direction,
            "registered port"
        );
        self.ports.insert(
            key.clone(),
            PortRecord {
                key,
                descriptor,
                transport: TransportSlot::Null,
            },
        );
        Ok(())
    }

    pub fn get(&self, key: &PortKey) -> Option<&PortRecord> {
        self.ports.get(key)
    }

    pub fn get_mut(&mut self, key: &PortKey) -> Option<&mut PortRecord> {
        self.ports.get_mut(key)
    }

    pub fn contains(&self, key: &PortKey) -> bool {
        self.ports.contains_key(key)
    }

    /// Ascending `(extension, port)` order.
    pub fn ports(&self) -> impl Iterator<Item = &PortRecord> {
        self.ports.values()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }

    /// Clears all ports (and therefore invalidates every connection); used
    /// by `Graph Persistence`'s `LoadFromFile` before reconstructing ports.
    pub fn clear(&mut self) {
        self.ports.clear();
        self.current_addon = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plughost_abi::{AccessPolicy, PortDirection, PortType};

    fn descriptor(name: &str) -> PortDescriptor {
        PortDescriptor {
            name: name.to_string(),
            direction: PortDirection::Output,
            port_type: PortType::InternalMemory,
            access_policy: AccessPolicy::Buffered,
            payload_size: 4,
            type_hash: 0xdead_beef,
        }
    }

    #[test]
    fn create_port_without_begin_addon_fails() {
        let mut reg = PortRegistry::new();
        let err = reg.create_port(descriptor("out")).unwrap_err();
        assert!(matches!(err, HostError::NoCurrentAddon));
        assert!(reg.is_empty());
    }

    #[test]
    fn duplicate_port_key_is_rejected_first_wins() {
        let mut reg = PortRegistry::new();
        reg.begin_addon("A");
        reg.create_port(descriptor("out")).unwrap();
        let mut dup = descriptor("out");
        dup.payload_size = 8;
        let err = reg.create_port(dup).unwrap_err();
        assert!(matches!(err, HostError::DuplicatePort { .. }));
        assert_eq!(reg.len(), 1);
        assert_eq!(
            reg.get(&PortKey::new("A", "out")).unwrap().descriptor.payload_size,
            4
        );
    }

    #[test]
    fn ports_enumerate_in_ascending_key_order() {
        let mut reg = PortRegistry::new();
        reg.begin_addon("B");
        reg.create_port(descriptor("z")).unwrap();
        reg.create_port(descriptor("a")).unwrap();
        reg.begin_addon("A");
        reg.create_port(descriptor("m")).unwrap();

        let keys: Vec<_> = reg.ports().map(|p| (p.key.extension.clone(), p.key.port.clone())).collect();
        assert_eq!(
            keys,
            vec![
                ("A".to_string(), "m".to_string()),
                ("B".to_string(), "a".to_string()),
                ("B".to_string(), "z".to_string()),
            ]
        );
    }
}
