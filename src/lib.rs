//! Payslip Engine library crate.
//!
//! This crate exposes the payslip calculator for freelance delivery
//! drivers, the interpreter for daily reports sent over chat, and the
//! HTTP surface that wires them to their collaborators.  External
//! applications may call `engine::calculate_payslip` or
//! `report::interpret` directly, or embed the API via `api::router`.

pub mod models;
pub mod error;
pub mod tax;
pub mod registry;
pub mod engine;
pub mod report;
pub mod intake;
pub mod display;
pub mod store;
pub mod config;
pub mod api;
