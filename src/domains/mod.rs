//! Domains module containing business logic organized by bounded contexts.
//!
//! The server exposes a single domain, tools: the operational capabilities a
//! host can invoke through `call_tool`.

pub mod tools;
