pub mod auth;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod steps;
pub mod storage;
pub mod types;
pub mod workflow;

#[cfg(test)]
pub mod testing;
