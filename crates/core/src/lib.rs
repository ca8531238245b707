//! Marketplace Core - Domain types and pure checkout logic.
//!
//! This crate provides the types and rules shared by every marketplace component:
//! - `api` - HTTP service (checkout, orders, cart, catalog)
//! - `cli` - Command-line tools for migrations and operator tasks
//!
//! # Architecture
//!
//! The core crate contains only types and pure functions - no I/O, no database
//! access, no HTTP. Everything here is deterministic given its inputs, which is
//! what lets the checkout pipeline be tested without a database.
//!
//! # Modules
//!
//! - [`types`] - Newtype IDs, money, and status enums
//! - [`pricing`] - Platform fee and order total computation
//! - [`cart`] - Carts and the cart snapshot builder
//! - [`order`] - Orders, line item snapshots, and the status state machine
//! - [`pagination`] - Cursor pagination primitives

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cart;
pub mod order;
pub mod pagination;
pub mod pricing;
pub mod types;

pub use types::*;
