// SPDX-License-Identifier: MPL-2.0

//! Backend abstraction layer for frame capture
//!
//! - [`camera`]: Frame sources, raw frame types and format conversion
//!
//! Sources push frames into a sink on their own thread; everything
//! downstream of the sink lives in [`crate::pipeline`].

pub mod camera;
