//! Device integrations.
//!
//! Defines the two capabilities the control loop needs from the host:
//! - `FrameSource`: pixels for a screen region
//! - `GestureDispatcher`: synthetic taps at screen coordinates
//!
//! and provides an ADB-backed implementation of both for Android devices.

pub mod adb;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{GestureStep, RawFrame, Rect};

/// Supplies a frame for a region at the moment of the call.
///
/// Implementations may return the full screen; the coordinator crops to
/// `region` before analysis.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FrameSource: Send + Sync {
    async fn capture(&self, region: Rect) -> Result<RawFrame>;
}

/// Replays a tap and reports whether the host accepted it.
///
/// Resolves once the gesture has completed or been rejected.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GestureDispatcher: Send + Sync {
    async fn tap(&self, step: GestureStep) -> Result<()>;
}
