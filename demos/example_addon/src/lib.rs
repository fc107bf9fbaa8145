//! Minimal fixture extension used only by the host's own integration tests.
//! Not part of the distributable crate.

use plughost_abi::port::Port;
use plughost_abi::{
    export_plugin, AccessPolicy, HostServicesHandle, Plugin, PortDescriptor, PortDirection,
    PortType,
};

struct ExampleAddon {
    value: Port<f32>,
    services: Option<HostServicesHandle>,
}

impl ExampleAddon {
    fn new() -> Self {
        Self {
            value: Port::new(
                "value",
                PortDirection::Output,
                PortType::SharedMemory,
                AccessPolicy::Buffered,
            ),
            services: None,
        }
    }
}

impl Plugin for ExampleAddon {
    fn port_descriptors(&self) -> Vec<PortDescriptor> {
        vec![self.value.descriptor()]
    }

    fn initialize(&mut self, services: HostServicesHandle) {
        self.value.bind(&services);
        self.services = Some(services);
    }

    fn run(&mut self) {
        if let Some(services) = &self.services {
            self.value.set(services, 42.0);
        }
    }

    fn shutdown(&mut self) {}
}

export_plugin!(ExampleAddon, ExampleAddon::new);
