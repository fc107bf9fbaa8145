//! Connection Table: ordered directed edges between registered ports,
//! owning each edge's transport state.

use crate::error::HostError;
use crate::registry::{PortKey, PortRegistry, SharedBlock, TransportSlot};
use crate::validator::validate;

pub struct Connection {
    pub provider: PortKey,
    pub receiver: PortKey,
    /// `None` for Direct connections (the payload lives in the shared
    /// block referenced by both ports' transport slots instead).
    pub buffer: Option<Vec<u8>>,
    pub has_data: bool,
}

#[derive(Default)]
pub struct ConnectionTable {
    connections: Vec<Connection>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connections in insertion order.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn connections_mut(&mut self) -> &mut [Connection] {
        &mut self.connections
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn clear(&mut self) {
        self.connections.clear();
    }

    /// Appends a connection record without touching the registry or
    /// allocating a transport. Used only by `LoadFromFile`, which
    /// reconstructs the graph's shape but leaves transports to be
    /// re-materialized by a subsequent `Connect` call.
    pub fn push_inert(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    /// `Connect`: validates the pair, allocates (or reuses) the transport,
    /// and on success appends the edge. On any rejection, state is left
    /// untouched.
    pub fn connect(
        &mut self,
        registry: &mut PortRegistry,
        provider: PortKey,
        receiver: PortKey,
    ) -> Result<(), HostError> {
        let prov_desc = registry
            .get(&provider)
            .ok_or_else(|| HostError::UnknownPort {
                extension: provider.extension.clone(),
                port: provider.port.clone(),
            })?
            .descriptor
            .clone();
        let recv_desc = registry
            .get(&receiver)
            .ok_or_else(|| HostError::UnknownPort {
                extension: receiver.extension.clone(),
                port: receiver.port.clone(),
            })?
            .descriptor
            .clone();

        if let Err(reason) = validate(&prov_desc, &recv_desc) {
            tracing::warn!(
                reason,
                provider = %format!("{}::{}", provider.extension, provider.port),
                receiver = %format!("{}::{}", receiver.extension, receiver.port),
                "connect rejected"
            );
            return Err(HostError::ConnectRejected {
                reason,
                provider_extension: provider.extension,
                provider_port: provider.port,
                receiver_extension: receiver.extension,
                receiver_port: receiver.port,
            });
        }

        // A mismatched pair already failed `validate` above, so `recv_desc`
        // always shares `prov_desc.access_policy` here. Mixed Direct/Buffered
        // routing (the host copying on every provider write) is a possible
        // future extension, not supported at this revision.
        use plughost_abi::AccessPolicy;
        let buffer = match prov_desc.access_policy {
            AccessPolicy::Direct => {
                let block = match &registry.get(&provider).unwrap().transport {
                    TransportSlot::Direct(existing) => existing.clone(),
                    _ => SharedBlock::new(prov_desc.payload_size),
                };
                registry.get_mut(&provider).unwrap().transport = TransportSlot::Direct(block.clone());
                registry.get_mut(&receiver).unwrap().transport = TransportSlot::Direct(block);
                None
            }
            AccessPolicy::Buffered => {
                registry.get_mut(&provider).unwrap().transport = TransportSlot::Buffered;
                registry.get_mut(&receiver).unwrap().transport = TransportSlot::Buffered;
                Some(vec![0u8; prov_desc.payload_size])
            }
        };

        tracing::info!(
            provider = %format!("{}::{}", provider.extension, provider.port),
            receiver = %format!("{}::{}", receiver.extension, receiver.port),
            "connected"
        );

        self.connections.push(Connection {
            provider,
            receiver,
            buffer,
            has_data: false,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plughost_abi::{AccessPolicy, PortDescriptor, PortDirection, PortType};

    fn port_desc(
        direction: PortDirection,
        access_policy: AccessPolicy,
        payload_size: usize,
    ) -> PortDescriptor {
        PortDescriptor {
            name: "p".to_string(),
            direction,
            port_type: PortType::SharedMemory,
            access_policy,
            payload_size,
            type_hash: 7,
        }
    }

    fn wired(policy: AccessPolicy) -> (PortRegistry, ConnectionTable, PortKey, PortKey) {
        let mut reg = PortRegistry::new();
        reg.begin_addon("A");
        reg.create_port(PortDescriptor {
            name: "out".to_string(),
            ..port_desc(PortDirection::Output, policy, 8)
        })
        .unwrap();
        reg.begin_addon("B");
        reg.create_port(PortDescriptor {
            name: "in".to_string(),
            ..port_desc(PortDirection::Input, policy, 8)
        })
        .unwrap();
        (
            reg,
            ConnectionTable::new(),
            PortKey::new("A", "out"),
            PortKey::new("B", "in"),
        )
    }

    #[test]
    fn direct_connection_shares_one_block_pointer() {
        let (mut reg, mut table, prov, recv) = wired(AccessPolicy::Direct);
        table.connect(&mut reg, prov.clone(), recv.clone()).unwrap();
        let p_slot = reg.get(&prov).unwrap().transport.clone();
        let r_slot = reg.get(&recv).unwrap().transport.clone();
        assert!(p_slot.same_block_as(&r_slot));
    }

    #[test]
    fn buffered_connection_allocates_exact_payload_size_buffer() {
        let (mut reg, mut table, prov, recv) = wired(AccessPolicy::Buffered);
        table.connect(&mut reg, prov, recv).unwrap();
        assert_eq!(table.connections()[0].buffer.as_ref().unwrap().len(), 8);
        assert!(!table.connections()[0].has_data);
    }

    #[test]
    fn unknown_port_is_rejected() {
        let (mut reg, mut table, prov, _recv) = wired(AccessPolicy::Buffered);
        let bogus = PortKey::new("Nope", "nope");
        let err = table.connect(&mut reg, prov, bogus).unwrap_err();
        assert!(matches!(err, HostError::UnknownPort { .. }));
        assert!(table.is_empty());
    }

    #[test]
    fn validator_rejection_leaves_table_untouched() {
        let mut reg = PortRegistry::new();
        reg.begin_addon("A");
        reg.create_port(PortDescriptor {
            name: "out".to_string(),
            ..port_desc(PortDirection::Output, AccessPolicy::Direct, 8)
        })
        .unwrap();
        reg.begin_addon("B");
        reg.create_port(PortDescriptor {
            name: "in".to_string(),
            ..port_desc(PortDirection::Input, AccessPolicy::Buffered, 8)
        })
        .unwrap();
        let mut table = ConnectionTable::new();
        let err = table
            .connect(&mut reg, PortKey::new("A", "out"), PortKey::new("B", "in"))
            .unwrap_err();
        assert!(matches!(err, HostError::ConnectRejected { reason: "access policy mismatch", .. }));
        assert!(table.is_empty());
    }
}
