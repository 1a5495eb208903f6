//! Controller event loop.

mod controller;

pub use controller::{
    ControllerDaemon, ControllerDaemonConfig, ControllerEvent, ControllerHandle, DaemonError,
};
