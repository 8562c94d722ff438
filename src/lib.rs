//! # phrasegen
//!
//! Bulk phrase generation against a local LLM service.
//!
//! A run loads a ranked list of characters, subtracts the keys already
//! recorded in the processed log, and fans the remainder out to the
//! generation service with bounded parallelism. Results and completion
//! markers go through buffered append-only writers so an interrupted run
//! can be resumed without repeating finished work.

pub mod config;
pub mod engine;
pub mod error;
pub mod llm;
pub mod model;
pub mod source;
pub mod telemetry;
pub mod writer;
