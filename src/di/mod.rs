mod container;

pub use container::{ServiceContainer, ServiceInstance};
