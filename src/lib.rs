//! Token based process execution engine.
//!
//! A collaboration is described with the [`dsl`] types, compiled into an
//! immutable [`runtime::graph::ProcessGraph`] and executed by the
//! [`runtime::engine::Engine`], which moves tokens across nodes until every
//! process instance reaches a stable state.

pub mod compiler;
pub mod config;
pub mod dsl;
pub mod error;
pub mod nodes;
pub mod runtime;
pub mod services;
