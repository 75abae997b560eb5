//! REST endpoints, one module per area of the fldigi surface.
//!
//! Every handler fails with 503 while the link is down, before any remote call.

pub mod connection;
pub mod modem;
pub mod rig;
pub mod settings;
pub mod txrx;
