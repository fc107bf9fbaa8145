//! Compatibility Validator: a pure function deciding whether an output
//! port may be connected to an input port. Every check is evaluated
//! top-to-bottom; the first failure wins. Name equality is not required.

use plughost_abi::PortDescriptor;

/// Returns `Ok(())` if `prov` may connect to `recv`, or the first
/// violated rule's reason otherwise.
pub fn validate(prov: &PortDescriptor, recv: &PortDescriptor) -> Result<(), &'static str> {
    use plughost_abi::PortDirection::{Input, Output};

    if prov.direction != Output {
        return Err("provider is not Output");
    }
    if recv.direction != Input {
        return Err("receiver is not Input");
    }
    if prov.port_type != recv.port_type {
        return Err("type mismatch");
    }
    if prov.payload_size != recv.payload_size {
        return Err("payload size mismatch");
    }
    if prov.type_hash != recv.type_hash {
        return Err("payload type mismatch");
    }
    if prov.access_policy != recv.access_policy {
        return Err("access policy mismatch");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use plughost_abi::{AccessPolicy, PortDirection, PortType};

    fn port(direction: PortDirection, access_policy: AccessPolicy) -> PortDescriptor {
        PortDescriptor {
            name: "p".to_string(),
            direction,
            port_type: PortType::SharedMemory,
            access_policy,
            payload_size: 8,
            type_hash: 42,
        }
    }

    #[test]
    fn accepts_matching_output_input_pair() {
        let prov = port(PortDirection::Output, AccessPolicy::Direct);
        let recv = port(PortDirection::Input, AccessPolicy::Direct);
        assert_eq!(validate(&prov, &recv), Ok(()));
    }

    #[test]
    fn rejects_provider_that_is_not_output() {
        let prov = port(PortDirection::Input, AccessPolicy::Direct);
        let recv = port(PortDirection::Input, AccessPolicy::Direct);
        assert_eq!(validate(&prov, &recv), Err("provider is not Output"));
    }

    #[test]
    fn rejects_receiver_that_is_not_input() {
        let prov = port(PortDirection::Output, AccessPolicy::Direct);
        let recv = port(PortDirection::Output, AccessPolicy::Direct);
        assert_eq!(validate(&prov, &recv), Err("receiver is not Input"));
    }

    #[test]
    fn rejects_mixed_access_policy() {
        let prov = port(PortDirection::Output, AccessPolicy::Direct);
        let recv = port(PortDirection::Input, AccessPolicy::Buffered);
        assert_eq!(validate(&prov, &recv), Err("access policy mismatch"));
    }

    #[test]
    fn rejects_payload_size_mismatch_before_access_policy() {
        let prov = PortDescriptor {
            payload_size: 4,
            ..port(PortDirection::Output, AccessPolicy::Direct)
        };
        let recv = PortDescriptor {
            payload_size: 8,
            access_policy: AccessPolicy::Buffered,
            ..port(PortDirection::Input, AccessPolicy::Direct)
        };
        assert_eq!(validate(&prov, &recv), Err("payload size mismatch"));
    }

    #[test]
    fn name_equality_is_not_required() {
        let prov = PortDescriptor {
            name: "out".to_string(),
            ..port(PortDirection::Output, AccessPolicy::Direct)
        };
        let recv = PortDescriptor {
            name: "totally_different".to_string(),
            ..port(PortDirection::Input, AccessPolicy::Direct)
        };
        assert_eq!(validate(&prov, &recv), Ok(()));
    }
}
