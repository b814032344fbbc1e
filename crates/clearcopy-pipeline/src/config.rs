//! Run configuration.

use std::path::PathBuf;

/// Settings for one pipeline run.
///
/// Format, extent and clear color are fixed; see [`crate::constants`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Application name reported to the driver.
    pub app_name: String,
    /// Request the Khronos validation layer.
    pub validation: bool,
    /// Fence wait timeout in nanoseconds.
    pub fence_timeout_ns: u64,
    /// Check every pixel of the readback surface, not only the first.
    pub verify_full_surface: bool,
    /// Write the readback surface to this PNG path.
    pub output: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            app_name: "clearcopy".to_string(),
            validation: cfg!(debug_assertions),
            fence_timeout_ns: u64::MAX,
            verify_full_surface: false,
            output: None,
        }
    }
}

impl PipelineConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable validation layers.
    #[must_use]
    pub const fn with_validation(mut self, enable: bool) -> Self {
        self.validation = enable;
        self
    }

    /// Set the fence wait timeout.
    #[must_use]
    pub const fn with_fence_timeout_ns(mut self, timeout_ns: u64) -> Self {
        self.fence_timeout_ns = timeout_ns;
        self
    }

    /// Check every pixel of the readback surface.
    #[must_use]
    pub const fn with_full_surface_check(mut self, enable: bool) -> Self {
        self.verify_full_surface = enable;
        self
    }

    /// Save the readback surface as an image file.
    #[must_use]
    pub fn with_output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    /// Parse from command line arguments.
    pub fn from_args() -> Self {
        let args: Vec<String> = std::env::args().collect();
        Self::parse_args(&args)
    }

    /// Parse from a slice of arguments (the first is the program name).
    ///
    /// Recognizes:
    /// - `--validation` / `--no-validation`
    /// - `--full-check`: verify every pixel
    /// - `-o` or `--output <PATH>`: save the readback surface
    /// - `--timeout-ms <N>`: fence wait timeout in milliseconds
    ///
    /// Unknown arguments and malformed values are ignored.
    pub fn parse_args(args: &[String]) -> Self {
        let mut config = Self::default();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--validation" => config.validation = true,
                "--no-validation" => config.validation = false,
                "--full-check" => config.verify_full_surface = true,
                "-o" | "--output" => {
                    if let Some(path) = args.get(i + 1) {
                        config.output = Some(PathBuf::from(path));
                        i += 1;
                    }
                }
                "--timeout-ms" => {
                    if let Some(value) = args.get(i + 1) {
                        if let Ok(ms) = value.parse::<u64>() {
                            config.fence_timeout_ns = ms.saturating_mul(1_000_000);
                        }
                        i += 1;
                    }
                }
                _ => {}
            }
            i += 1;
        }

        config
    }
}
