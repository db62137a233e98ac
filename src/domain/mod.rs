// Domain layer: registry models, the deletion lifecycle and ports (interfaces).

pub mod lifecycle;
pub mod model;
pub mod ports;
