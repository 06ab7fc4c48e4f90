// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Flowzap service wiring: webhook intake router and serve loop.
//!
//! Exposed as a library so integration tests can drive the HTTP surface
//! against a mock gateway.

pub mod http;
pub mod serve;
