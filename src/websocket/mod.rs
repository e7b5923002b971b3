pub mod handler;
pub mod msg_forward_handler;
pub mod msg_join_handler;
pub mod msg_ping_handler;
