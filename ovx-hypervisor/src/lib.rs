//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

#![warn(rust_2018_idioms)]
#![cfg_attr(
    feature = "testing",
    allow(dead_code, unused_variables, unused_imports)
)]

pub mod config;
pub mod debug;
pub mod discovery;
pub mod error;
pub mod hypervisor;
pub mod mapping;
pub mod network;
pub mod packet;
pub mod physical;
pub mod resilience;
pub mod routing;
pub mod southbound;
pub mod tasks;
