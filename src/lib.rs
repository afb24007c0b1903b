// SPDX-License-Identifier: GPL-3.0-only

pub mod backend;
pub mod config;
pub mod logger;
pub mod transport;
pub mod utils;
