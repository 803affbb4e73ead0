//! Container settings

use crate::error::{DiError, DiResult};
use crate::locator::Mode;
use crate::module::Priority;
use serde::{Deserialize, Serialize};

/// Prefix of the environment variables read by [`InjectionSettings::from_env`]
pub const ENV_PREFIX: &str = "INJECTION_";

/// Behaviour switches shared by a module and everything it creates.
///
/// # Examples
///
/// ```
/// use injection_core::{InjectionSettings, Mode};
///
/// let settings = InjectionSettings::from_toml_str(r#"default_mode = "override""#).unwrap();
/// assert_eq!(settings.default_mode, Mode::Override);
/// assert!(settings.detect_module_cycles);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectionSettings {
	/// Mode used by registration builders unless told otherwise
	#[serde(default)]
	pub default_mode: Mode,

	/// Priority used by `init_modules`
	#[serde(default)]
	pub default_priority: Priority,

	/// Lookups of a generic key also try its generic origin
	#[serde(default = "default_true")]
	pub resolve_generic_origin: bool,

	/// Reject indirect cycles in the module graph
	#[serde(default = "default_true")]
	pub detect_module_cycles: bool,

	/// Log applied events at debug level
	#[serde(default = "default_true")]
	pub log_events: bool,
}

fn default_true() -> bool {
	true
}

impl Default for InjectionSettings {
	fn default() -> Self {
		Self {
			default_mode: Mode::default(),
			default_priority: Priority::default(),
			resolve_generic_origin: true,
			detect_module_cycles: true,
			log_events: true,
		}
	}
}

impl InjectionSettings {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_default_mode(mut self, mode: Mode) -> Self {
		self.default_mode = mode;
		self
	}

	pub fn with_default_priority(mut self, priority: Priority) -> Self {
		self.default_priority = priority;
		self
	}

	pub fn with_generic_origin(mut self, enabled: bool) -> Self {
		self.resolve_generic_origin = enabled;
		self
	}

	pub fn with_module_cycle_detection(mut self, enabled: bool) -> Self {
		self.detect_module_cycles = enabled;
		self
	}

	pub fn with_event_logging(mut self, enabled: bool) -> Self {
		self.log_events = enabled;
		self
	}

	/// Parses settings from a TOML document; missing fields keep their defaults.
	pub fn from_toml_str(source: &str) -> DiResult<Self> {
		toml::from_str(source).map_err(|e| DiError::Settings(e.to_string()))
	}

	/// Loads settings from `INJECTION_*` environment variables.
	///
	/// Recognised variables: `INJECTION_DEFAULT_MODE`,
	/// `INJECTION_DEFAULT_PRIORITY`, `INJECTION_RESOLVE_GENERIC_ORIGIN`,
	/// `INJECTION_DETECT_MODULE_CYCLES` and `INJECTION_LOG_EVENTS`. Flags
	/// accept `true`, `false`, `1` or `0`.
	pub fn from_env() -> DiResult<Self> {
		Self::from_lookup(|name| std::env::var(name).ok())
	}

	/// Same as [`InjectionSettings::from_env`], reading variables through `lookup`.
	pub fn from_lookup<F>(lookup: F) -> DiResult<Self>
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut settings = Self::default();
		let var = |suffix: &str| lookup(&format!("{}{}", ENV_PREFIX, suffix));

		if let Some(mode) = var("DEFAULT_MODE") {
			settings.default_mode = mode.parse()?;
		}

		if let Some(priority) = var("DEFAULT_PRIORITY") {
			settings.default_priority = priority.parse()?;
		}

		if let Some(value) = var("RESOLVE_GENERIC_ORIGIN") {
			settings.resolve_generic_origin = parse_flag(&value)?;
		}

		if let Some(value) = var("DETECT_MODULE_CYCLES") {
			settings.detect_module_cycles = parse_flag(&value)?;
		}

		if let Some(value) = var("LOG_EVENTS") {
			settings.log_events = parse_flag(&value)?;
		}

		Ok(settings)
	}
}

fn parse_flag(value: &str) -> DiResult<bool> {
	match value.trim().to_ascii_lowercase().as_str() {
		"true" | "1" => Ok(true),
		"false" | "0" => Ok(false),
		other => Err(DiError::Settings(format!("invalid flag value `{}`", other))),
	}
}
