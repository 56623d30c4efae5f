//! Face registration and verification engine.
//!
//! A user registers one reference face; later probes are matched against it
//! by Euclidean distance between dlib descriptors, or accepted unconditionally
//! in digest mode when no face model is available.

pub mod errors;
pub mod faces;
pub mod imaging;
