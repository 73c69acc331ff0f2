//! Social Points Bot Library
//!
//! A Telegram bot that keeps one shared "Social Points" counter under a
//! single message. Any user may move it up or down once per day.
//!
//! This crate provides the core functionality for:
//! - Gating presses to one per user per calendar day
//! - Storing the counter with lost-update-free atomic deltas
//! - Rendering the counter keyboard and editing it in place
//! - Answering button presses via Telegram `MTProto`

pub mod callbacks;
pub mod config;
pub mod points;
pub mod storage;
pub mod telegram;
