pub mod listeners;
pub mod qr;
pub mod scope_guard;
