// SPDX-License-Identifier: MIT OR Apache-2.0

//! StatFlux core: normalization engine, property tables, bounded tracing
//! and consumer dispatch.

pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod properties;
pub mod trace;
