//! MongoDB Community CRD Definitions
//!
//! Kubernetes Custom Resource Definitions for the MongoDB Community operator.

pub mod mongodb_community;
pub mod references;

pub use mongodb_community::*;
pub use references::*;
