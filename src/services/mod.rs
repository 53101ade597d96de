pub mod discovery;
pub mod heartbeat;
pub mod registry;
pub mod resolver;

pub use discovery::{Discovery, DiscoveryError, generate_instance_id};
pub use heartbeat::{Heartbeat, HeartbeatHandle, ServiceRegistration, register_instance};
pub use registry::{InstanceRecord, MemoryRegistry, RegistryStats};
pub use resolver::{LoadBalanceStrategy, ResolveError, Resolver, ResolverConfig};
