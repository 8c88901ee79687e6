use serde::{Deserialize, Deserializer, Serialize};

use crate::Error;

/// Core settings: cycle timing and the thresholds of every ban rule.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
pub struct Core {
    /// Seconds between two consecutive cycles.
    #[serde(default = "Core::default_interval")]
    pub interval: u64,

    /// Seconds to wait before the first cycle.
    #[serde(default)]
    pub start_delay: u64,

    /// Milliseconds to pause after each torrent so large swarms don't flood
    /// the Web UI with requests. `0` disables the pause.
    #[serde(default = "Core::default_sleep_time")]
    pub sleep_time: u64,

    /// Keep evaluating peers that report neither a client name nor a peer id
    /// client. When `false` those peers are ignored.
    #[serde(default = "Core::default_ignore_empty_peer")]
    pub ignore_empty_peer: bool,

    /// Ban `address:port` pairs instead of whole addresses for the rules
    /// that target a single connection. Only recent qBittorrent versions
    /// understand port scoped entries.
    #[serde(default)]
    pub port_scoped_bans: bool,

    /// Hard ceiling for the number of addresses kept in each history map.
    #[serde(default = "Core::default_max_tracked_entries")]
    pub max_tracked_entries: usize,

    /// How long bans last.
    #[serde(default)]
    pub ban_policy: BanPolicy,

    /// Ban peers whose cumulative upload does not match their progress.
    #[serde(default)]
    pub progress_check: ProgressCheck,

    /// Ban peers whose upload since the previous cycle does not match the
    /// progress they made in the same period. Disabled unless `enabled` is
    /// set, even when other fields of the table are given.
    #[serde(
        default = "Core::default_relative_progress_check",
        deserialize_with = "Core::deserialize_relative_progress_check"
    )]
    pub relative_progress_check: ProgressCheck,

    /// Ban addresses that receive too much upload across all torrents.
    #[serde(default)]
    pub ip_upload_check: IpUploadCheck,

    /// Ban addresses that connect from too many ports.
    #[serde(default)]
    pub port_check: PortCheck,
}

impl Default for Core {
    fn default() -> Self {
        Self {
            interval: Self::default_interval(),
            start_delay: 0,
            sleep_time: Self::default_sleep_time(),
            ignore_empty_peer: Self::default_ignore_empty_peer(),
            port_scoped_bans: false,
            max_tracked_entries: Self::default_max_tracked_entries(),
            ban_policy: BanPolicy::default(),
            progress_check: ProgressCheck::default(),
            relative_progress_check: Self::default_relative_progress_check(),
            ip_upload_check: IpUploadCheck::default(),
            port_check: PortCheck::default(),
        }
    }
}

impl Core {
    fn default_interval() -> u64 {
        6
    }

    fn default_sleep_time() -> u64 {
        20
    }

    fn default_ignore_empty_peer() -> bool {
        true
    }

    fn default_max_tracked_entries() -> usize {
        1_000_000
    }

    fn default_relative_progress_check() -> ProgressCheck {
        ProgressCheck {
            enabled: false,
            ..ProgressCheck::default()
        }
    }

    fn deserialize_relative_progress_check<'de, D>(deserializer: D) -> Result<ProgressCheck, D::Error>
    where
        D: Deserializer<'de>,
    {
        let table = PartialProgressCheck::deserialize(deserializer)?;
        let defaults = Self::default_relative_progress_check();

        Ok(ProgressCheck {
            enabled: table.enabled.unwrap_or(defaults.enabled),
            start_mb: table.start_mb.unwrap_or(defaults.start_mb),
            start_percent: table.start_percent.unwrap_or(defaults.start_percent),
            anti_error_ratio: table.anti_error_ratio.unwrap_or(defaults.anti_error_ratio),
        })
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.interval == 0 {
            return Err(invalid("core.interval", "must be greater than zero"));
        }

        if self.max_tracked_entries == 0 {
            return Err(invalid("core.max_tracked_entries", "must be greater than zero"));
        }

        if self.ban_policy.ban_time == 0 {
            return Err(invalid("core.ban_policy.ban_time", "must be greater than zero"));
        }

        if self.progress_check.enabled {
            self.progress_check.validate(
                "core.progress_check.start_percent",
                "core.progress_check.anti_error_ratio",
            )?;
        }

        if self.relative_progress_check.enabled {
            self.relative_progress_check.validate(
                "core.relative_progress_check.start_percent",
                "core.relative_progress_check.anti_error_ratio",
            )?;
        }

        if self.ip_upload_check.enabled {
            let ratio = self.ip_upload_check.per_torrent_ratio;
            if !ratio.is_finite() || ratio < 0.0 {
                return Err(invalid(
                    "core.ip_upload_check.per_torrent_ratio",
                    "must be a finite number greater than or equal to zero",
                ));
            }
        }

        Ok(())
    }
}

/// How long a banned address stays banned.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
pub struct BanPolicy {
    /// Seconds a ban lasts since the address was last seen while banned.
    #[serde(default = "BanPolicy::default_ban_time")]
    pub ban_time: u64,

    /// Minimum seconds between two sweeps of expired bans. `0` sweeps on
    /// every cycle.
    #[serde(default = "BanPolicy::default_clean_interval")]
    pub clean_interval: u64,
}

impl Default for BanPolicy {
    fn default() -> Self {
        Self {
            ban_time: Self::default_ban_time(),
            clean_interval: Self::default_clean_interval(),
        }
    }
}

impl BanPolicy {
    fn default_ban_time() -> u64 {
        86_400
    }

    fn default_clean_interval() -> u64 {
        3_600
    }
}

/// Thresholds for the progress/upload mismatch rules.
///
/// The same structure is used for the absolute rule (cumulative values) and
/// for the relative rule (values since the previous cycle).
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Copy)]
#[serde(default)]
pub struct ProgressCheck {
    pub enabled: bool,

    /// Minimum uploaded mebibytes before the rule is considered.
    pub start_mb: u64,

    /// Minimum uploaded share of the torrent size, in percent.
    pub start_percent: f64,

    /// Multiplier applied to the downloaded amount the peer reports, to
    /// tolerate pieces uploaded before the peer verified them.
    pub anti_error_ratio: f64,
}

impl Default for ProgressCheck {
    fn default() -> Self {
        Self {
            enabled: true,
            start_mb: 20,
            start_percent: 2.0,
            anti_error_ratio: 3.0,
        }
    }
}

/// A progress check table where every field may be missing.
#[derive(Deserialize)]
struct PartialProgressCheck {
    enabled: Option<bool>,
    start_mb: Option<u64>,
    start_percent: Option<f64>,
    anti_error_ratio: Option<f64>,
}

impl ProgressCheck {
    fn validate(&self, start_percent_field: &'static str, anti_error_ratio_field: &'static str) -> Result<(), Error> {
        if !(0.0..=100.0).contains(&self.start_percent) {
            return Err(invalid(start_percent_field, "must be between 0 and 100"));
        }

        if !self.anti_error_ratio.is_finite() || self.anti_error_ratio <= 0.0 {
            return Err(invalid(anti_error_ratio_field, "must be a finite number greater than zero"));
        }

        Ok(())
    }
}

/// Thresholds for the aggregate upload check per address.
#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Copy)]
#[serde(default)]
pub struct IpUploadCheck {
    pub enabled: bool,

    /// Seconds between two evaluations. Upload increments are measured over
    /// this window.
    pub interval: u64,

    /// Ban when the upload to one address over the window exceeds this many
    /// mebibytes, summed over all torrents. `0` disables this threshold.
    pub increment_mb: u64,

    /// Ban when the upload to one address on one torrent exceeds the torrent
    /// size times this ratio. `0` disables this threshold.
    pub per_torrent_ratio: f64,
}

impl Default for IpUploadCheck {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: 300,
            increment_mb: 38_000,
            per_torrent_ratio: 3.0,
        }
    }
}

impl IpUploadCheck {
    /// Whether any of the two thresholds is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.enabled && (self.increment_mb > 0 || self.per_torrent_ratio > 0.0)
    }
}

/// Thresholds for the distinct port count check per address.
#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone, Copy)]
#[serde(default)]
pub struct PortCheck {
    /// Ban addresses seen on more distinct ports than this within one
    /// window. `0` disables the check.
    pub max_ip_port_count: u32,

    /// Seconds between two evaluations (the window length).
    pub interval: u64,
}

impl Default for PortCheck {
    fn default() -> Self {
        Self {
            max_ip_port_count: 0,
            interval: 60,
        }
    }
}

impl PortCheck {
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.max_ip_port_count > 0
    }
}

fn invalid(field: &'static str, reason: &str) -> Error {
    Error::InvalidValue {
        field,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::policy::{Core, IpUploadCheck, ProgressCheck};
    use crate::Error;

    #[test]
    fn the_default_core_settings_should_be_valid() {
        assert!(Core::default().validate().is_ok());
    }

    #[test]
    fn the_relative_progress_check_should_be_disabled_by_default() {
        assert!(!Core::default().relative_progress_check.enabled);
        assert!(Core::default().progress_check.enabled);
    }

    #[test]
    fn a_partial_relative_progress_check_table_should_keep_the_rule_disabled() {
        let core: Core = toml::from_str("[relative_progress_check]\nstart_mb = 50\n").unwrap();

        assert!(!core.relative_progress_check.enabled);
        assert_eq!(core.relative_progress_check.start_mb, 50);
        assert!((core.relative_progress_check.anti_error_ratio - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn the_relative_progress_check_should_be_enabled_only_when_requested() {
        let core: Core = toml::from_str("[relative_progress_check]\nenabled = true\n").unwrap();

        assert!(core.relative_progress_check.enabled);
        assert_eq!(core.relative_progress_check.start_mb, 20);
    }

    #[test]
    fn a_partial_absolute_progress_check_table_should_keep_the_rule_enabled() {
        let core: Core = toml::from_str("[progress_check]\nstart_mb = 50\n").unwrap();

        assert!(core.progress_check.enabled);
    }

    #[test]
    fn it_should_reject_a_zero_cycle_interval() {
        let core = Core {
            interval: 0,
            ..Default::default()
        };

        assert!(matches!(core.validate(), Err(Error::InvalidValue { field: "core.interval", .. })));
    }

    #[test]
    fn it_should_ignore_the_thresholds_of_a_disabled_rule() {
        let core = Core {
            relative_progress_check: ProgressCheck {
                enabled: false,
                start_percent: 500.0,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(core.validate().is_ok());
    }

    #[test]
    fn it_should_reject_an_out_of_range_start_percent_for_an_enabled_rule() {
        let core = Core {
            relative_progress_check: ProgressCheck {
                enabled: true,
                start_percent: 500.0,
                ..Default::default()
            },
            ..Default::default()
        };

        assert!(matches!(
            core.validate(),
            Err(Error::InvalidValue {
                field: "core.relative_progress_check.start_percent",
                ..
            })
        ));
    }

    #[test]
    fn the_ip_upload_check_should_be_inactive_when_both_thresholds_are_zero() {
        let check = IpUploadCheck {
            enabled: true,
            increment_mb: 0,
            per_torrent_ratio: 0.0,
            ..Default::default()
        };

        assert!(!check.is_active());
    }
}
