use serde::Deserialize;

/// What a publish reports when a subscriber write fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanoutPolicy {
    /// Stop at the first failed subscriber and fail the whole publish.
    /// The message stays stored.
    #[default]
    Abort,
    /// Skip failed subscribers; the publish still succeeds.
    Isolate,
}

impl std::str::FromStr for FanoutPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(FanoutPolicy::Abort),
            "isolate" => Ok(FanoutPolicy::Isolate),
            other => Err(format!("unknown fanout policy '{other}'")),
        }
    }
}
