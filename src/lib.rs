// Library exports for agora
// This allows integration tests and the binary to share one router

pub mod auth;
pub mod comment_tree;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod oauth;
pub mod routes;
pub mod state;
pub mod validation;
