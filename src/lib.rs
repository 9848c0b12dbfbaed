//! Library root for the `agent_trust` crate
//! Causal chain analysis and trust scoring for autonomous agents

// Core error handling
pub mod api_errors;
pub mod errors;

// Agent records & registry
pub mod agent;
pub mod agent_registry;
pub mod agent_status;
pub mod agent_store;
pub mod agent_store_sled;
pub mod fixtures;

// Causal chain analysis
pub mod causal_chain;
pub mod chain_analyzer;
pub mod injection_patterns;
pub mod provenance;

// Trust evaluation
pub mod activity_log;
pub mod scope_policy;
pub mod threat_landscape;
pub mod trust_evaluator;
pub mod trust_linear;

// Request handling
pub mod input_validator;
pub mod narrative;
pub mod trust_service;

// Audit
pub mod audit;

// Configuration & CLI
pub mod cli;
pub mod config;
pub mod config_loader;

// Web server interface
pub mod app_state;
pub mod trustweb;


pub use chain_analyzer::{AnalysisResult, CausalChainAnalyzer};
pub use errors::{TrustError, TrustResult};
pub use trust_evaluator::{TrustEvaluation, TrustEvaluator};
