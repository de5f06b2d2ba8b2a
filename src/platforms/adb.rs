//! Android Debug Bridge integration.
//!
//! Captures the device screen with `adb exec-out screencap -p` and replays
//! taps with `adb shell input swipe`, using a zero-length swipe so that the
//! press duration can be controlled.
//!
//! Requires `adb` on the host and USB or TCP debugging enabled on the device.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use image::ImageFormat;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{FrameSource, GestureDispatcher};
use crate::config::DeviceConfig;
use crate::types::{GestureStep, RawFrame, Rect};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// A single attached device, addressed by serial when more than one is
/// connected.
#[derive(Debug, Clone)]
pub struct AdbDevice {
    adb_path: String,
    serial: Option<String>,
}

impl AdbDevice {
    pub fn new(adb_path: impl Into<String>, serial: Option<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            serial,
        }
    }

    pub fn from_config(cfg: &DeviceConfig) -> Self {
        Self::new(cfg.adb_path.clone(), cfg.serial.clone())
    }

    /// Base `adb` invocation with the device selector applied.
    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.adb_path);
        if let Some(serial) = &self.serial {
            cmd.arg("-s").arg(serial);
        }
        cmd.kill_on_drop(true);
        cmd
    }

    /// Run `adb <args>` and return stdout, failing on a non-zero exit.
    async fn run(&self, args: &[String]) -> Result<Vec<u8>> {
        let output = self
            .command()
            .args(args)
            .output()
            .await
            .with_context(|| format!("Failed to spawn {}", self.adb_path))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("adb {} exited with {}: {}", args.join(" "), output.status, stderr.trim());
        }
        Ok(output.stdout)
    }
}

/// Arguments for a press of `duration_ms` at a point.
pub fn tap_args(step: &GestureStep) -> Vec<String> {
    let (x, y) = (step.x.to_string(), step.y.to_string());
    vec![
        "shell".into(),
        "input".into(),
        "swipe".into(),
        x.clone(),
        y.clone(),
        x,
        y,
        step.duration_ms.to_string(),
    ]
}

/// Decode a `screencap -p` PNG into a frame for `region`.
pub fn decode_screencap(png: &[u8], region: Rect) -> Result<RawFrame> {
    if png.is_empty() {
        bail!("screencap returned no data");
    }
    let image = image::load_from_memory_with_format(png, ImageFormat::Png)
        .context("Failed to decode screencap PNG")?
        .to_rgba8();
    Ok(RawFrame::new(image, region))
}

/// `decode_screencap` on the blocking pool.
pub async fn decode_screencap_blocking(png: Vec<u8>, region: Rect) -> Result<RawFrame> {
    tokio::task::spawn_blocking(move || decode_screencap(&png, region))
        .await
        .context("Screencap decode task failed")?
}

#[async_trait]
impl FrameSource for AdbDevice {
    async fn capture(&self, region: Rect) -> Result<RawFrame> {
        let args = ["exec-out", "screencap", "-p"].map(String::from);
        let png = self.run(&args).await.context("Screen capture failed")?;
        let frame = decode_screencap_blocking(png, region).await?;
        debug!(
            width = frame.width(),
            height = frame.height(),
            region = %region,
            "Screen captured"
        );
        Ok(frame)
    }
}

#[async_trait]
impl GestureDispatcher for AdbDevice {
    async fn tap(&self, step: GestureStep) -> Result<()> {
        match self.run(&tap_args(&step)).await {
            Ok(_) => {
                debug!(x = step.x, y = step.y, duration_ms = step.duration_ms, "Tap dispatched");
                Ok(())
            }
            Err(e) => {
                warn!(x = step.x, y = step.y, error = %e, "Tap failed");
                Err(e)
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
