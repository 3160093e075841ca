//! Credit Analysis API Library
//!
//! Vehicle-financing credit analysis: encrypted queries to three credit
//! bureaus gated by subscription tier, score aggregation, audit logging of
//! every bureau call, persistence and dashboard data.
//!
//! # Modules
//!
//! - `api`: HTTP handlers, authentication and routes.
//! - `core`: Analysis workflow, models, dashboard and errors.
//! - `data`: Database, analysis repository and audit sink.
//! - `integrations`: Bureau clients, simulated payloads and Power BI.
//! - `crypto`: Transmission encryption for identity documents.
//! - `masking`: Redaction of CPF, CNPJ and card numbers.
//! - `circuit_breaker`: Breaker guarding audit writes.
//! - `config`: Configuration management.

pub mod api;
pub mod core;
pub mod data;
pub mod integrations;

// Re-export primary modules for shared use in tests and other binaries
pub mod analysis;
pub mod audit;
pub mod auth;
pub mod bureaus;
pub mod circuit_breaker;
pub mod config;
pub mod crypto;
pub mod dashboard;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod handlers;
pub mod masking;
pub mod models;
pub mod powerbi;
pub mod routes;
pub mod simulation;
