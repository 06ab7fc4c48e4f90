// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Flowzap integration tests.

pub mod fixtures;
pub mod mock_gateway;

pub use fixtures::{funnel_of, media_step, step, waiting_step};
pub use mock_gateway::{MockGateway, RecordedSend};
