#![allow(clippy::doc_markdown)] // Allow technical terms like ebXML, SOAPAction in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # MHS Core
//!
//! Rust core of a Message Handling Service (MHS) mediating between internal
//! health applications and the national Spine messaging backbone.
//!
//! ## Overview
//!
//! Client applications speak plain HTTP to the MHS; the backbone speaks
//! ebXML-over-SOAP with per-interaction routing and reliability contracts.
//! This crate implements the outbound side of that mediation: it wraps and
//! unwraps ebXML envelopes, classifies SOAP faults and ebXML errors,
//! resolves routing and reliability attributes from the Spine Directory
//! Service behind a TTL cache, drives one of four reliable-messaging
//! workflows per message, and tracks every message's lifecycle durably so
//! retries, acknowledgements and correlated asynchronous replies can be
//! reconciled.
//!
//! ## Module Organization
//!
//! - [`ebxml`] - Envelope value object, wire-form builders and parsers
//! - [`fault`] - SOAP fault / ebXML error classification and retriability
//! - [`routing`] - Routing and reliability resolution with TTL caching
//! - [`persistence`] - Keyed stores wrapped with uniform retry handling
//! - [`models`] - Durable work description and sync-async bridge records
//! - [`workflow`] - The four outbound messaging workflows
//! - [`resync`] - Sync-async resynchroniser for blocked synchronous callers
//! - [`registry`] - Static interaction definitions loaded at start-up
//! - [`transport`] - Outbound HTTPS client with mutual TLS
//! - [`config`] - Explicit process configuration
//! - [`error`] - Structured error handling
//!
//! ## Workflow Patterns
//!
//! Each supported interaction maps to one of four patterns: synchronous,
//! asynchronous express, asynchronous reliable and forward reliable. The
//! pattern decides whether the payload is wrapped in an ebXML envelope,
//! whether delivery failures are retried, and which terminal state the
//! message's work description reaches.

pub mod config;
pub mod constants;
pub mod ebxml;
pub mod error;
pub mod fault;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod registry;
pub mod resync;
pub mod routing;
pub mod transport;
pub mod workflow;

pub use config::MhsConfig;
pub use error::{MhsError, Result};
