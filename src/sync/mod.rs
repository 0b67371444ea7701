// src/sync/mod.rs

//! Synchronization primitives
//!
//! The process subsystem blocks in exactly two places: a parent waiting for
//! its child to finish loading, and a parent waiting for its child to exit.
//! Both are one-shot events carrying a payload, modelled by [`OneShot`].

pub mod oneshot;

pub use oneshot::OneShot;
