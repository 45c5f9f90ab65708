//! Domain types and the ports the reconciler talks to.

pub mod callback;
pub mod outcome;
pub mod pending;
pub mod ports;
