use derive_more::Display;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Clone)]
pub struct Logging {
    /// Logging level. Possible values are: `Off`, `Error`, `Warn`, `Info`,
    /// `Debug` and `Trace`. Default is `Info`.
    #[serde(default = "Logging::default_threshold")]
    pub threshold: Threshold,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            threshold: Self::default_threshold(),
        }
    }
}

impl Logging {
    fn default_threshold() -> Threshold {
        Threshold::Info
    }
}

#[derive(Serialize, Deserialize, PartialEq, Eq, Debug, Hash, Clone, Copy, Display)]
#[serde(rename_all = "lowercase")]
pub enum Threshold {
    /// A threshold lower than all security levels.
    #[display("off")]
    Off,

    /// Corresponds to the `Error` security level.
    #[display("error")]
    Error,

    /// Corresponds to the `Warn` security level.
    #[display("warn")]
    Warn,

    /// Corresponds to the `Info` security level.
    #[display("info")]
    Info,

    /// Corresponds to the `Debug` security level.
    #[display("debug")]
    Debug,

    /// Corresponds to the `Trace` security level.
    #[display("trace")]
    Trace,
}
