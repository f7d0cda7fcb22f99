//! Configuration for the fbcast service.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use fbcast_core::{Assets, BridgeConfig, BridgeError, PixelDepth};

/// Viewer page served when no override is configured.
const DEFAULT_PAGE: &[u8] = include_bytes!("../assets/index.html");
/// Icon served when no override is configured.
const DEFAULT_ICON: &[u8] = include_bytes!("../assets/favicon.ico");

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener and session limits.
    pub network: NetworkConfig,
    /// Canvas served to viewers.
    pub display: DisplayConfig,
    /// Deadlines.
    pub timeouts: TimeoutConfig,
    /// Canned page and icon overrides.
    pub assets: AssetConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address to bind the listener to.
    pub bind: String,
    /// TCP port for page requests and viewer sessions.
    pub port: u16,
    /// Maximum concurrent viewers.
    pub max_sessions: usize,
    /// Connections accepted but not yet handled.
    pub queue_capacity: usize,
    /// Number of request handler workers.
    pub handler_workers: usize,
}

/// Display configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u16,
    pub height: u16,
    /// Bits per pixel: 8, 16 or 32.
    pub color_depth: u8,
    /// Rows in the engine's partial draw buffer. Bounds the largest
    /// region a single flush carries.
    pub buffer_lines: u16,
}

/// Deadlines in milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long a new connection may take to send its first request.
    pub handshake_ms: u64,
    /// How long a single write to one viewer may take.
    pub write_ms: u64,
}

/// Paths overriding the built-in page and icon. Empty means built-in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AssetConfig {
    pub page: String,
    pub icon: String,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0".into(),
            port: 8080,
            max_sessions: 4,
            queue_capacity: 10,
            handler_workers: 1,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            color_depth: 16,
            buffer_lines: 30,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            handshake_ms: 1000,
            write_ms: 2000,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ServerConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    /// `bind:port` for the listener.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.network.bind, self.network.port)
    }

    /// Convert into the bridge's runtime parameters.
    ///
    /// The largest region is one full-width strip of the partial draw
    /// buffer, capped at the canvas. Range checks happen in
    /// [`BridgeConfig::validate`].
    pub fn to_bridge_config(&self) -> Result<BridgeConfig, BridgeError> {
        let display = &self.display;
        let lines = display.buffer_lines.min(display.height) as usize;
        Ok(BridgeConfig {
            canvas_width: display.width,
            canvas_height: display.height,
            pixel_depth: PixelDepth::from_bits(display.color_depth)?,
            max_region_pixels: display.width as usize * lines,
            max_sessions: self.network.max_sessions,
            queue_capacity: self.network.queue_capacity,
            handler_workers: self.network.handler_workers,
            handshake_timeout: Duration::from_millis(self.timeouts.handshake_ms),
            write_timeout: Duration::from_millis(self.timeouts.write_ms),
            ..BridgeConfig::default()
        })
    }
}

impl AssetConfig {
    /// Read the configured overrides, using the built-in files where
    /// no path is set.
    pub fn load(&self) -> std::io::Result<Assets> {
        let page = match self.page.as_str() {
            "" => DEFAULT_PAGE.to_vec(),
            path => std::fs::read(path)?,
        };
        let icon = match self.icon.as_str() {
            "" => DEFAULT_ICON.to_vec(),
            path => std::fs::read(path)?,
        };
        Ok(Assets::new(page, icon))
    }
}

// ── Tests ────────────────────────────────────────────────────────
