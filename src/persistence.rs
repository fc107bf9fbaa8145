//! Graph Persistence: line-oriented text serialization of ports and
//! connections. Validation and reconstruction are all-or-nothing: any
//! I/O or parse error leaves the graph in its pre-load state.

use std::fmt::Write as _;
use std::path::Path;

use plughost_abi::{AccessPolicy, PortDescriptor, PortDirection, PortType};

use crate::connection::Connection;
use crate::error::{HostError, HostResult};
use crate::host_services::PortGraph;
use crate::registry::PortKey;

const MAGIC: &str = "PMv1";

pub fn save_to_file(graph: &PortGraph, path: impl AsRef<Path>) -> HostResult<()> {
    let path = path.as_ref();
    let mut out = String::new();
    let ports: Vec<_> = graph.registry.ports().collect();
    let connections = graph.connections.connections();

    let _ = writeln!(out, "{MAGIC}");
    let _ = writeln!(out, "{} {}", ports.len(), connections.len());

    for record in &ports {
        let _ = writeln!(out, "{}", record.key.extension);
        let _ = writeln!(out, "{}", record.key.port);
        let d = &record.descriptor;
        let _ = writeln!(
            out,
            "{} {} {} {} {}",
            d.direction as u8, d.port_type as u8, d.access_policy as u8, d.payload_size, d.type_hash
        );
    }

    for conn in connections {
        let _ = writeln!(out, "{}", conn.provider.extension);
        let _ = writeln!(out, "{}", conn.provider.port);
        let _ = writeln!(out, "{}", conn.receiver.extension);
        let _ = writeln!(out, "{}", conn.receiver.port);
    }

    std::fs::write(path, out).map_err(|source| HostError::GraphIo {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_from_file(graph: &mut PortGraph, path: impl AsRef<Path>) -> HostResult<()> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| HostError::GraphIo {
        path: path.to_path_buf(),
        source,
    })?;

    let parsed = parse(&text).map_err(|reason| HostError::GraphParse {
        path: path.to_path_buf(),
        reason,
    })?;

    graph.clear();
    for (key, descriptor) in parsed.ports {
        graph
            .registry
            .create_port_for(&key.extension, descriptor)
            .expect("parse() already rejected duplicate keys");
    }
    for (provider, receiver) in parsed.connections {
        graph.connections.push_inert(Connection {
            provider,
            receiver,
            buffer: None,
            has_data: false,
        });
    }
    Ok(())
}

struct Parsed {
    ports: Vec<(PortKey, PortDescriptor)>,
    connections: Vec<(PortKey, PortKey)>,
}

fn parse(text: &str) -> Result<Parsed, String> {
    let mut lines = text.lines();

    let magic = lines.next().ok_or("empty file")?;
    if magic != MAGIC {
        return Err(format!("bad magic: expected {MAGIC}, got {magic}"));
    }

    let counts = lines.next().ok_or("missing port/connection counts")?;
    let mut counts = counts.split_whitespace();
    let n_ports: usize = counts
        .next()
        .ok_or("missing port count")?
        .parse()
        .map_err(|_| "port count is not an integer".to_string())?;
    let n_conns: usize = counts
        .next()
        .ok_or("missing connection count")?
        .parse()
        .map_err(|_| "connection count is not an integer".to_string())?;

    let mut ports = Vec::with_capacity(n_ports);
    let mut seen_keys = std::collections::HashSet::with_capacity(n_ports);
    for _ in 0..n_ports {
        let extension = lines.next().ok_or("truncated port: missing extension")?;
        let port = lines.next().ok_or("truncated port: missing port name")?;
        let fields = lines.next().ok_or("truncated port: missing fields")?;
        let mut fields = fields.split_whitespace();

        let direction: u8 = fields
            .next()
            .ok_or("missing direction field")?
            .parse()
            .map_err(|_| "direction is not an integer".to_string())?;
        let port_type: u8 = fields
            .next()
            .ok_or("missing type field")?
            .parse()
            .map_err(|_| "type is not an integer".to_string())?;
        let access_policy: u8 = fields
            .next()
            .ok_or("missing access policy field")?
            .parse()
            .map_err(|_| "access policy is not an integer".to_string())?;
        let payload_size: usize = fields
            .next()
            .ok_or("missing payload size field")?
            .parse()
            .map_err(|_| "payload size is not an integer".to_string())?;
        let type_hash: u64 = fields
            .next()
            .ok_or("missing type hash field")?
            .parse()
            .map_err(|_| "type hash is not an integer".to_string())?;

        let key = PortKey::new(extension, port);
        if !seen_keys.insert(key.clone()) {
            return Err(format!(
                "duplicate port key {}::{} in graph file",
                key.extension, key.port
            ));
        }
        let descriptor = PortDescriptor {
            name: key.port.clone(),
            direction: PortDirection::from_u8(direction).ok_or("invalid direction value")?,
            port_type: PortType::from_u8(port_type).ok_or("invalid type value")?,
            access_policy: AccessPolicy::from_u8(access_policy)
                .ok_or("invalid access policy value")?,
            payload_size,
            type_hash,
        };
        ports.push((key, descriptor));
    }

    let mut connections = Vec::with_capacity(n_conns);
    for _ in 0..n_conns {
        let prov_ext = lines.next().ok_or("truncated connection: provider extension")?;
        let prov_port = lines.next().ok_or("truncated connection: provider port")?;
        let recv_ext = lines.next().ok_or("truncated connection: receiver extension")?;
        let recv_port = lines.next().ok_or("truncated connection: receiver port")?;
        connections.push((
            PortKey::new(prov_ext, prov_port),
            PortKey::new(recv_ext, recv_port),
        ));
    }

    Ok(Parsed { ports, connections })
}
