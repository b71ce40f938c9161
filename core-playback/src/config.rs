//! # Instream Configuration
//!
//! Options an instream caller supplies per episode, and per-item overrides
//! for multi-item secondary playlists. Field names on the wire follow the
//! host API (`controlbarseekable`, `skipoffset`, ...).

use serde::{Deserialize, Serialize};

use crate::error::{PlaybackError, Result};

/// When seeking is allowed inside an instream item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seekable {
    Never,
    Always,
    /// Only to a position before the current one.
    Backwards,
}

/// Control gating and presentation options for an instream episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstreamOptions {
    /// Default: never.
    #[serde(rename = "controlbarseekable", default = "default_seekable")]
    pub seekable: Seekable,

    /// Default: true.
    #[serde(rename = "controlbarpausable", default = "default_true")]
    pub pausable: bool,

    /// Default: true.
    #[serde(rename = "controlbarstoppable", default = "default_true")]
    pub stoppable: bool,

    /// Text shown while the item loads.
    ///
    /// Default: "Loading ad".
    #[serde(rename = "loadingmessage", default = "default_loading_message")]
    pub loading_message: String,

    /// Seconds after which the item may be skipped. `None` disables skipping;
    /// `Some(0.0)` makes the item skippable as soon as it starts.
    #[serde(rename = "skipoffset", default)]
    pub skip_offset: Option<f64>,

    /// Tag attached to every event of the episode.
    #[serde(default)]
    pub tag: Option<String>,
}

fn default_seekable() -> Seekable {
    Seekable::Never
}

fn default_true() -> bool {
    true
}

fn default_loading_message() -> String {
    "Loading ad".to_string()
}

impl Default for InstreamOptions {
    fn default() -> Self {
        Self {
            seekable: default_seekable(),
            pausable: default_true(),
            stoppable: default_true(),
            loading_message: default_loading_message(),
            skip_offset: None,
            tag: None,
        }
    }
}

impl InstreamOptions {
    /// Options in force before the first secondary item has loaded: no
    /// seeking, pausing or stopping.
    pub fn restrictive() -> Self {
        Self {
            seekable: Seekable::Never,
            pausable: false,
            stoppable: false,
            ..Self::default()
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_skip_offset(mut self, seconds: f64) -> Self {
        self.skip_offset = Some(seconds);
        self
    }

    pub fn with_seekable(mut self, seekable: Seekable) -> Self {
        self.seekable = seekable;
        self
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if let Some(offset) = self.skip_offset {
            if !offset.is_finite() || offset < 0.0 {
                return Err(PlaybackError::InvalidOptions(format!(
                    "skipoffset must be a non-negative number of seconds, got {}",
                    offset
                )));
            }
        }
        Ok(())
    }
}

/// Per-item override of [`InstreamOptions`]. Unset fields keep the base value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstreamItemOptions {
    #[serde(rename = "controlbarseekable", default)]
    pub seekable: Option<Seekable>,
    #[serde(rename = "controlbarpausable", default)]
    pub pausable: Option<bool>,
    #[serde(rename = "controlbarstoppable", default)]
    pub stoppable: Option<bool>,
    #[serde(rename = "loadingmessage", default)]
    pub loading_message: Option<String>,
    #[serde(rename = "skipoffset", default)]
    pub skip_offset: Option<f64>,
    #[serde(default)]
    pub tag: Option<String>,
}

impl InstreamItemOptions {
    pub fn merged_over(&self, base: &InstreamOptions) -> InstreamOptions {
        InstreamOptions {
            seekable: self.seekable.unwrap_or(base.seekable),
            pausable: self.pausable.unwrap_or(base.pausable),
            stoppable: self.stoppable.unwrap_or(base.stoppable),
            loading_message: self
                .loading_message
                .clone()
                .unwrap_or_else(|| base.loading_message.clone()),
            skip_offset: self.skip_offset.or(base.skip_offset),
            tag: self.tag.clone().or_else(|| base.tag.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = InstreamOptions::default();
        assert_eq!(options.seekable, Seekable::Never);
        assert!(options.pausable);
        assert!(options.stoppable);
        assert_eq!(options.loading_message, "Loading ad");
        assert_eq!(options.skip_offset, None);
        assert_eq!(options.tag, None);
    }

    #[test]
    fn test_restrictive_options() {
        let options = InstreamOptions::restrictive();
        assert_eq!(options.seekable, Seekable::Never);
        assert!(!options.pausable);
        assert!(!options.stoppable);
    }

    #[test]
    fn test_deserialize_host_names_with_defaults() {
        let options: InstreamOptions = serde_json::from_str(
            r#"{"controlbarseekable":"backwards","skipoffset":5,"tag":"vast-1"}"#,
        )
        .unwrap();
        assert_eq!(options.seekable, Seekable::Backwards);
        assert!(options.pausable);
        assert_eq!(options.skip_offset, Some(5.0));
        assert_eq!(options.tag.as_deref(), Some("vast-1"));
    }

    #[test]
    fn test_item_override_keeps_unset_fields() {
        let base = InstreamOptions::default().with_tag("pod");
        let item = InstreamItemOptions {
            pausable: Some(false),
            skip_offset: Some(3.0),
            ..Default::default()
        };

        let merged = item.merged_over(&base);
        assert!(!merged.pausable);
        assert!(merged.stoppable);
        assert_eq!(merged.skip_offset, Some(3.0));
        assert_eq!(merged.tag.as_deref(), Some("pod"));
    }

    #[test]
    fn test_validate_rejects_negative_skip_offset() {
        assert!(InstreamOptions::default().with_skip_offset(-1.0).validate().is_err());
        assert!(InstreamOptions::default().with_skip_offset(5.0).validate().is_ok());
    }
}
