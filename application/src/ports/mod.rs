//! Port definitions (interfaces for external adapters)
//!
//! Ports define the contracts that infrastructure adapters must implement.

pub mod document_service;
pub mod llm_gateway;
pub mod progress;
pub mod provenance_ledger;
pub mod repository;
pub mod tool_invoker;
