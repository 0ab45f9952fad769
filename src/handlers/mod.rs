//! Directive handlers, one module per directive family.
//!
//! Each handler scans the block's fragment for its marker, consumes it, and
//! reports how many markers it resolved so the block loop can detect the
//! fixed point. Handlers never fetch data themselves; they queue jobs on the
//! block.

pub(crate) mod action;
pub(crate) mod attribute;
pub(crate) mod auth;
pub(crate) mod condition;
pub(crate) mod containers;
pub(crate) mod link;
pub(crate) mod relation;
pub(crate) mod trigger;
