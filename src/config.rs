//! Configuration loading for roiseg
//!
//! The config file is optional. Anything missing falls back to built-in
//! defaults, and unreadable or unparsable files are reported as warnings on
//! the returned handle instead of failing startup.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::refine::RefinementParams;

const CONFIG_DIR: &str = "roiseg";
const CONFIG_FILENAMES: &[&str] = &["config.yaml", "config.yml"];

/// Loaded configuration together with where it came from
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    pub config: AppConfig,
    /// None when built-in defaults are in use
    pub source: Option<PathBuf>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub display: DisplayConfig,
    pub organ_colors: OrganColors,
    pub processing: ProcessingConfig,
}

/// Window/level in Hounsfield units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowPreset {
    pub center: i32,
    pub width: i32,
}

impl WindowPreset {
    /// Displayed intensity range
    pub fn range(&self) -> (f64, f64) {
        let half = f64::from(self.width) / 2.0;
        (f64::from(self.center) - half, f64::from(self.center) + half)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub default_window_center: i32,
    pub default_window_width: i32,
    pub auto_window_enabled: bool,
    pub presets: BTreeMap<String, WindowPreset>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            default_window_center: -600,
            default_window_width: 1500,
            auto_window_enabled: true,
            presets: BTreeMap::from([
                (
                    "lung".to_string(),
                    WindowPreset {
                        center: -600,
                        width: 1500,
                    },
                ),
                (
                    "mediastinum".to_string(),
                    WindowPreset {
                        center: 40,
                        width: 400,
                    },
                ),
            ]),
        }
    }
}

impl DisplayConfig {
    pub fn default_window(&self) -> WindowPreset {
        WindowPreset {
            center: self.default_window_center,
            width: self.default_window_width,
        }
    }
}

/// Overlay colour per organ key, with a `default` entry for unknown organs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganColors(BTreeMap<String, String>);

impl Default for OrganColors {
    fn default() -> Self {
        Self(BTreeMap::from([
            ("lung".to_string(), "lime".to_string()),
            ("liver".to_string(), "orange".to_string()),
            ("kidney".to_string(), "cyan".to_string()),
            ("default".to_string(), "red".to_string()),
        ]))
    }
}

impl OrganColors {
    pub fn get(&self, organ: &str) -> &str {
        self.0
            .get(organ)
            .or_else(|| self.0.get("default"))
            .map(String::as_str)
            .unwrap_or("red")
    }
}

/// Inclusive integer range with a default value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamRange {
    pub min: i64,
    pub max: i64,
    pub default: i64,
}

impl ParamRange {
    const fn new(min: i64, max: i64, default: i64) -> Self {
        Self { min, max, default }
    }

    fn check(&self, name: &'static str, value: i64) -> Result<(), WorkflowError> {
        if (self.min..=self.max).contains(&value) {
            Ok(())
        } else {
            Err(WorkflowError::ParameterOutOfRange {
                name,
                value,
                min: self.min,
                max: self.max,
            })
        }
    }

    /// Repair inverted bounds and pull the default inside them
    fn sanitize(&mut self, name: &str, warnings: &mut Vec<String>) {
        if self.min > self.max {
            warnings.push(format!(
                "parameter range {name} has min {} above max {}, swapping",
                self.min, self.max
            ));
            std::mem::swap(&mut self.min, &mut self.max);
        }
        let clamped = self.default.clamp(self.min, self.max);
        if clamped != self.default {
            warnings.push(format!(
                "default for {name} ({}) is outside [{}, {}], using {clamped}",
                self.default, self.min, self.max
            ));
            self.default = clamped;
        }
    }

    /// Fall back to `builtin` when the default cannot be represented as `T`
    fn require_default<T: TryFrom<i64>>(
        &mut self,
        name: &str,
        builtin: ParamRange,
        warnings: &mut Vec<String>,
    ) {
        if T::try_from(self.default).is_err() {
            warnings.push(format!(
                "default for {name} ({}) is not a usable value, using built-in range [{}, {}]",
                self.default, builtin.min, builtin.max
            ));
            *self = builtin;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParameterRanges {
    pub hu_min: ParamRange,
    pub hu_max: ParamRange,
    pub dilation_iter: ParamRange,
    pub closing_size: ParamRange,
}

impl Default for ParameterRanges {
    fn default() -> Self {
        Self {
            hu_min: ParamRange::new(-1200, -100, -1000),
            hu_max: ParamRange::new(-900, 100, -300),
            dilation_iter: ParamRange::new(0, 10, 2),
            closing_size: ParamRange::new(1, 10, 3),
        }
    }
}

impl ParameterRanges {
    /// Reject parameters outside the configured ranges or with an empty HU window
    pub fn validate(&self, params: &RefinementParams) -> Result<(), WorkflowError> {
        self.hu_min.check("hu_min", i64::from(params.hu_min))?;
        self.hu_max.check("hu_max", i64::from(params.hu_max))?;
        self.dilation_iter
            .check("dilation_iter", i64::from(params.dilation_iter))?;
        self.closing_size
            .check("closing_size", i64::from(params.closing_size))?;
        if params.hu_min >= params.hu_max {
            return Err(WorkflowError::Precondition(format!(
                "hu_min ({}) must be below hu_max ({})",
                params.hu_min, params.hu_max
            )));
        }
        Ok(())
    }

    /// Parameters built from each range's default.
    ///
    /// A default that does not fit the parameter's type is replaced by the
    /// built-in value.
    pub fn defaults(&self) -> RefinementParams {
        let builtin = RefinementParams::default();
        RefinementParams {
            hu_min: i32::try_from(self.hu_min.default).unwrap_or(builtin.hu_min),
            hu_max: i32::try_from(self.hu_max.default).unwrap_or(builtin.hu_max),
            dilation_iter: u32::try_from(self.dilation_iter.default)
                .unwrap_or(builtin.dilation_iter),
            closing_size: u32::try_from(self.closing_size.default).unwrap_or(builtin.closing_size),
            fill_holes: builtin.fill_holes,
        }
    }

    fn sanitize(&mut self, warnings: &mut Vec<String>) {
        let builtin = Self::default();
        self.hu_min.sanitize("hu_min", warnings);
        self.hu_min
            .require_default::<i32>("hu_min", builtin.hu_min, warnings);
        self.hu_max.sanitize("hu_max", warnings);
        self.hu_max
            .require_default::<i32>("hu_max", builtin.hu_max, warnings);
        self.dilation_iter.sanitize("dilation_iter", warnings);
        self.dilation_iter
            .require_default::<u32>("dilation_iter", builtin.dilation_iter, warnings);
        self.closing_size.sanitize("closing_size", warnings);
        self.closing_size
            .require_default::<u32>("closing_size", builtin.closing_size, warnings);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub presets: BTreeMap<String, RefinementParams>,
    pub parameter_ranges: ParameterRanges,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        let preset = |hu_min, hu_max, dilation_iter, closing_size| RefinementParams {
            hu_min,
            hu_max,
            dilation_iter,
            closing_size,
            fill_holes: true,
        };
        Self {
            presets: BTreeMap::from([
                ("conservative".to_string(), preset(-950, -350, 1, 3)),
                ("balanced".to_string(), preset(-1000, -300, 2, 3)),
                ("aggressive".to_string(), preset(-1100, -250, 4, 5)),
            ]),
            parameter_ranges: ParameterRanges::default(),
        }
    }
}

impl AppConfig {
    pub fn preset(&self, name: &str) -> Option<RefinementParams> {
        self.processing.presets.get(name).copied()
    }

    pub fn preset_names(&self) -> impl Iterator<Item = &str> {
        self.processing.presets.keys().map(String::as_str)
    }

    pub fn default_params(&self) -> RefinementParams {
        self.processing.parameter_ranges.defaults()
    }

    pub fn organ_color(&self, organ: &str) -> &str {
        self.organ_colors.get(organ)
    }

    /// Fix what can be fixed, dropping presets that violate the ranges
    fn sanitize(mut self, warnings: &mut Vec<String>) -> Self {
        if self.display.default_window_width <= 0 {
            warnings.push(format!(
                "default_window_width {} must be positive, using 1500",
                self.display.default_window_width
            ));
            self.display.default_window_width = 1500;
        }
        self.display.presets.retain(|name, preset| {
            let keep = preset.width > 0;
            if !keep {
                warnings.push(format!("window preset '{name}' has non-positive width, dropped"));
            }
            keep
        });

        let ranges = &mut self.processing.parameter_ranges;
        ranges.sanitize(warnings);
        let ranges = *ranges;
        self.processing.presets.retain(|name, params| match ranges.validate(params) {
            Ok(()) => true,
            Err(err) => {
                warnings.push(format!("processing preset '{name}' dropped: {err}"));
                false
            }
        });
        self
    }
}

/// Files tried in order: the explicit path, then the user config directory
fn config_candidates(custom_path: Option<&Path>) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Some(path) = custom_path {
        candidates.push(path.to_path_buf());
        return candidates;
    }
    if let Some(dir) = dirs::config_dir() {
        let dir = dir.join(CONFIG_DIR);
        candidates.extend(CONFIG_FILENAMES.iter().map(|name| dir.join(name)));
    }
    candidates
}

/// Parse a YAML document into a sanitized config
pub fn parse(contents: &str) -> Result<(AppConfig, Vec<String>), WorkflowError> {
    let config: AppConfig =
        serde_yaml::from_str(contents).map_err(|err| WorkflowError::ConfigLoad(err.to_string()))?;
    let mut warnings = Vec::new();
    let config = config.sanitize(&mut warnings);
    Ok((config, warnings))
}

/// Load the configuration, or return defaults if unavailable
pub fn load(custom_path: Option<&Path>) -> ConfigHandle {
    let mut warnings = Vec::new();

    for candidate in config_candidates(custom_path) {
        if !candidate.is_file() {
            if custom_path.is_some() {
                warnings.push(format!("config file {} not found", candidate.display()));
            }
            continue;
        }

        let contents = match fs::read_to_string(&candidate) {
            Ok(contents) => contents,
            Err(err) => {
                warnings.push(format!("failed to read {}: {err}", candidate.display()));
                continue;
            }
        };

        match parse(&contents) {
            Ok((config, mut parse_warnings)) => {
                warnings.append(&mut parse_warnings);
                for warning in &warnings {
                    log::warn!("Config: {warning}");
                }
                let source = fs::canonicalize(&candidate).unwrap_or(candidate);
                log::info!("Loaded config from {}", source.display());
                return ConfigHandle {
                    config,
                    source: Some(source),
                    warnings,
                };
            }
            Err(err) => warnings.push(format!("{}: {err}", candidate.display())),
        }
    }

    for warning in &warnings {
        log::warn!("Config: {warning}");
    }
    log::info!("Using built-in configuration defaults");
    ConfigHandle {
        config: AppConfig::default(),
        source: None,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.display.default_window().range(), (-1350.0, 150.0));
        assert_eq!(config.organ_color("liver"), "orange");
        assert_eq!(config.organ_color("spleen"), "red");
        assert_eq!(
            config.preset_names().collect::<Vec<_>>(),
            ["aggressive", "balanced", "conservative"]
        );
        assert_eq!(config.default_params(), config.preset("balanced").unwrap());
    }

    #[test]
    fn test_partial_yaml_keeps_other_defaults() {
        let (config, warnings) = parse(
            "display:\n  default_window_center: 40\norgan_colors:\n  lung: green\n  default: white\n",
        )
        .unwrap();
        assert!(warnings.is_empty());
        assert_eq!(config.display.default_window_center, 40);
        assert_eq!(config.display.default_window_width, 1500);
        assert_eq!(config.organ_color("lung"), "green");
        assert_eq!(config.organ_color("kidney"), "white");
        assert_eq!(config.processing, ProcessingConfig::default());
    }

    #[test]
    fn test_invalid_preset_dropped_with_warning() {
        let yaml = "processing:\n  presets:\n    wild:\n      hu_min: -5000\n      hu_max: 0\n      dilation_iter: 1\n      closing_size: 3\n      fill_holes: false\n";
        let (config, warnings) = parse(yaml).unwrap();
        assert!(config.preset("wild").is_none());
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("wild"));
    }

    #[test]
    fn test_inverted_range_is_swapped() {
        let yaml = "processing:\n  parameter_ranges:\n    dilation_iter: {min: 10, max: 0, default: 2}\n";
        let (config, warnings) = parse(yaml).unwrap();
        let range = config.processing.parameter_ranges.dilation_iter;
        assert_eq!((range.min, range.max), (0, 10));
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_default_outside_i32_falls_back_to_builtin_range() {
        let yaml = "processing:\n  parameter_ranges:\n    hu_min: {min: -5000000000, max: -100, default: -4000000000}\n";
        let (config, warnings) = parse(yaml).unwrap();
        let ranges = config.processing.parameter_ranges;
        assert_eq!(ranges.hu_min, ParameterRanges::default().hu_min);
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("hu_min"));
        assert_eq!(config.default_params().hu_min, -1000);
    }

    #[test]
    fn test_defaults_do_not_wrap() {
        let mut ranges = ParameterRanges::default();
        ranges.hu_max.default = i64::from(i32::MAX) + 1;
        ranges.dilation_iter.default = -1;
        let params = ranges.defaults();
        assert_eq!(params.hu_max, -300);
        assert_eq!(params.dilation_iter, 2);
    }

    #[test]
    fn test_validate_ranges() {
        let ranges = ParameterRanges::default();
        assert!(ranges.validate(&RefinementParams::default()).is_ok());

        let err = ranges
            .validate(&RefinementParams {
                dilation_iter: 11,
                ..RefinementParams::default()
            })
            .unwrap_err();
        assert_eq!(
            err,
            WorkflowError::ParameterOutOfRange {
                name: "dilation_iter",
                value: 11,
                min: 0,
                max: 10
            }
        );

        let inverted = RefinementParams {
            hu_min: -200,
            hu_max: -300,
            ..RefinementParams::default()
        };
        assert!(matches!(
            ranges.validate(&inverted),
            Err(WorkflowError::Precondition(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "display:\n  auto_window_enabled: false").unwrap();
        let handle = load(Some(file.path()));
        assert!(handle.source.is_some());
        assert!(!handle.config.display.auto_window_enabled);
    }

    #[test]
    fn test_load_missing_or_broken_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load(Some(&dir.path().join("nope.yaml")));
        assert!(missing.source.is_none());
        assert_eq!(missing.config, AppConfig::default());
        assert_eq!(missing.warnings.len(), 1);

        let broken = dir.path().join("broken.yaml");
        fs::write(&broken, "display: [unclosed").unwrap();
        let handle = load(Some(&broken));
        assert!(handle.source.is_none());
        assert_eq!(handle.warnings.len(), 1);
    }
}
