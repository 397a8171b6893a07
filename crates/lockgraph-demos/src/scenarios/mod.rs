pub mod entity_rotation;
pub mod heartbeat;
pub mod static_orders;
