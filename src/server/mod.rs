//! HTTP server for the federation layer.
//!
//! Exposes the [`ConfigurationService`](crate::service::ConfigurationService)
//! over REST.
//!
//! # Endpoints
//!
//! - `GET    /health`                              Liveness probe
//! - `GET    /graph/urls`                          Registered endpoints
//! - `POST   /graph/urls`                          Register an endpoint (admin)
//! - `GET    /graph/urls/:name`                    One registered endpoint
//! - `DELETE /graph/urls/:name`                    Remove an endpoint (admin)
//! - `POST   /graph/refresh`                       Re-fetch every endpoint
//! - `GET    /graph/status`                        Last refresh outcome
//! - `GET    /graph/schema`                        Federated schema
//! - `GET    /graph/operations`                    Union of operations
//! - `GET    /graph/operations/:name/supported`    Membership check
//! - `GET    /graph/filterFunctions[/:input_type]` Filter functions
//! - `GET    /graph/transformFunctions`            Transform functions
//! - `GET    /graph/generators`                    Generators
//! - `GET    /graph/storeTraits`                   Traits every endpoint shares
//! - `GET    /graph/serialisedFields/:type_name`   Serialised fields of a type
//!
//! Callers identify themselves with the `x-user-id` and `x-op-auths` headers.

pub mod routes;

pub use routes::{app_router, AppState};
