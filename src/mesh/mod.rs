//! Mesh ownership and lifecycle

pub mod manager;

pub use manager::{PeerMeshManager, SessionHandle};
