//! MongoDB Community Operator
//!
//! Startup orchestration for the MongoDBCommunity controller:
//! - Validates the required image configuration
//! - Resolves the watch scope (one namespace, or all namespaces with an
//!   optional label selector on MongoDBCommunity objects)
//! - Builds the manager, registers types and the reconciler
//! - Runs until SIGINT/SIGTERM
//!
//! Any startup failure is fatal and exits non-zero.

mod bootstrap;
mod cache;
mod config;
mod error;
mod lifecycle;
mod manager;
mod reconciler;
mod scheme;
mod scope;
mod selector;

#[cfg(test)]
mod test_utils;

use crate::bootstrap::{startup, InferredConnector};
use crate::cache::KubeCachePrimitive;
use crate::error::ControllerError;
use crate::lifecycle::{shutdown_token, Lifecycle};
use std::collections::HashMap;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Configure rustls crypto provider (required for rustls 0.23+)
    let _ = rustls::crypto::ring::default_provider().install_default();

    info!("Starting MongoDB Community Operator");

    let env: HashMap<String, String> = std::env::vars().collect();
    let manager = match startup(&env, &InferredConnector, &KubeCachePrimitive).await {
        Ok((scope, manager)) => {
            info!("Operator configured for {}", scope);
            manager
        }
        Err(e) => return fatal(&e),
    };

    let shutdown = match shutdown_token() {
        Ok(token) => token,
        Err(e) => return fatal(&e),
    };

    let mut lifecycle = Lifecycle::new();
    let result = lifecycle.run(manager, shutdown).await;
    info!("Operator lifecycle ended in state {:?}", lifecycle.state());
    if let Err(e) = result {
        return fatal(&e);
    }
    ExitCode::from(lifecycle.exit_code())
}

fn fatal(error: &ControllerError) -> ExitCode {
    error!("Fatal error in {}: {}", error.stage(), error);
    ExitCode::FAILURE
}
