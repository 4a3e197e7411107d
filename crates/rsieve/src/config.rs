//! Engine configuration.
//!
//! Hosts either fill in [`SieveConfig`] directly or feed string settings
//! through [`SieveConfig::apply_setting`] using the `sieve_*` names.

use std::path::PathBuf;
use std::time::Duration;

/// Runtime trace granularity, coarsest to finest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum TraceLevel {
    #[default]
    None,
    Actions,
    Commands,
    Tests,
    Matching,
}

impl TraceLevel {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "none" | "" => Some(Self::None),
            "actions" => Some(Self::Actions),
            "commands" => Some(Self::Commands),
            "tests" => Some(Self::Tests),
            "matching" => Some(Self::Matching),
            _ => None,
        }
    }
}

/// Engine-wide knobs.
#[derive(Clone, Debug)]
pub struct SieveConfig {
    /// Space-separated extension enable list; `+name`/`-name` adjust the
    /// default set instead of replacing it. `None` enables everything
    /// registered.
    pub extensions: Option<String>,
    /// Maximum redirect actions per execution.
    pub max_redirects: u32,
    /// Maximum total actions per execution.
    pub max_actions: u32,
    /// Maximum script source size in bytes.
    pub max_script_size: u64,
    /// Optional CPU-time cap per execution.
    pub max_cpu_time: Option<Duration>,
    pub trace_level: TraceLevel,
    /// Directory for per-run trace files; `~` expands to the home
    /// directory.
    pub trace_dir: Option<PathBuf>,
    pub trace_debug: bool,
    pub trace_addresses: bool,
    /// Per-user log file for runtime warnings.
    pub user_log: Option<PathBuf>,
    /// Register deprecated extensions (`imapflags`) under their legacy
    /// names.
    pub allow_deprecated: bool,
}

impl Default for SieveConfig {
    fn default() -> Self {
        Self {
            extensions: None,
            max_redirects: 4,
            max_actions: 32,
            max_script_size: 1 << 20,
            max_cpu_time: None,
            trace_level: TraceLevel::None,
            trace_dir: None,
            trace_debug: false,
            trace_addresses: false,
            user_log: None,
            allow_deprecated: false,
        }
    }
}

impl SieveConfig {
    /// Apply one `sieve_*` string setting. Unknown names are ignored with
    /// a warning, matching the tolerant behaviour expected from mail
    /// server configuration.
    pub fn apply_setting(&mut self, name: &str, value: &str) {
        match name {
            "sieve_extensions" => self.extensions = Some(value.to_string()),
            "sieve_max_redirects" => match value.parse() {
                Ok(n) => self.max_redirects = n,
                Err(_) => tracing::warn!(%value, "invalid sieve_max_redirects, keeping default"),
            },
            "sieve_max_actions" => match value.parse() {
                Ok(n) => self.max_actions = n,
                Err(_) => tracing::warn!(%value, "invalid sieve_max_actions, keeping default"),
            },
            "sieve_max_script_size" => match parse_size(value) {
                Some(n) => self.max_script_size = n,
                None => {
                    tracing::warn!(%value, "invalid sieve_max_script_size, keeping default");
                }
            },
            "sieve_max_cpu_time" => match value.parse::<u64>() {
                Ok(0) => self.max_cpu_time = None,
                Ok(secs) => self.max_cpu_time = Some(Duration::from_secs(secs)),
                Err(_) => tracing::warn!(%value, "invalid sieve_max_cpu_time, keeping default"),
            },
            "sieve_trace_level" => match TraceLevel::parse(value) {
                Some(level) => self.trace_level = level,
                None => tracing::warn!(%value, "invalid sieve_trace_level, keeping default"),
            },
            "sieve_trace_dir" => {
                self.trace_dir = if value.is_empty() {
                    None
                } else {
                    Some(expand_tilde(value))
                };
            }
            "sieve_trace_debug" => self.trace_debug = parse_bool(value),
            "sieve_trace_addresses" => self.trace_addresses = parse_bool(value),
            "sieve_user_log" => {
                self.user_log = if value.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            other => tracing::warn!(setting = other, "ignoring unknown sieve setting"),
        }
    }

    /// Apply a batch of settings.
    pub fn apply_settings<'a>(&mut self, settings: impl IntoIterator<Item = (&'a str, &'a str)>) {
        for (name, value) in settings {
            self.apply_setting(name, value);
        }
    }
}

fn parse_bool(value: &str) -> bool {
    matches!(value, "yes" | "true" | "1" | "on")
}

/// Expand a leading `~` to the home directory.
fn expand_tilde(value: &str) -> PathBuf {
    if let Some(rest) = value.strip_prefix('~') {
        if let Some(home) = std::env::var_os("HOME") {
            let mut path = PathBuf::from(home);
            path.push(rest.trim_start_matches('/'));
            return path;
        }
    }
    PathBuf::from(value)
}

/// Size with optional K/M/G suffix.
fn parse_size(value: &str) -> Option<u64> {
    let value = value.trim();
    let (digits, mult) = match value.as_bytes().last()? {
        b'k' | b'K' => (&value[..value.len() - 1], 1u64 << 10),
        b'm' | b'M' => (&value[..value.len() - 1], 1u64 << 20),
        b'g' | b'G' => (&value[..value.len() - 1], 1u64 << 30),
        _ => (value, 1),
    };
    digits.parse::<u64>().ok()?.checked_mul(mult)
}
