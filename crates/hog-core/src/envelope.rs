//! JSON session envelopes
//!
//! Touch clients talk to the bridge with JSON text frames discriminated by a
//! `type` field. [`Envelope`] is what clients send, [`Notice`] is what the
//! bridge pushes back.

use serde::{Deserialize, Serialize};

use crate::control::PlaybackAction;
use crate::error::Result;

/// Inbound message from a touch client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Retarget the OSC destination. The port is kept as a raw JSON number so
    /// that out-of-range values can be reported back instead of dropped.
    OscConfig { host: String, port: f64 },

    ButtonStart { key: String },
    ButtonEnd { key: String },

    EncoderStart { encoder: u32 },
    EncoderEnd { encoder: u32 },
    /// Pre-scaled rotation delta
    Encoder { encoder: u32, delta: f64 },
    /// Raw wheel `deltaY` in pixels
    EncoderWheel { encoder: u32, displacement: f64 },
    /// Raw drag displacement in pixels, upward positive
    EncoderDrag { encoder: u32, displacement: f64 },
    /// Current held offset of an indirect rotation gesture
    EncoderHold { encoder: u32, offset: f64 },

    PlaybackFader { playback: u32, value: f64 },
    PlaybackFaderStart { playback: u32 },
    PlaybackFaderEnd { playback: u32 },

    Playback { playback: u32, action: PlaybackAction },

    /// One-shot press of a numbered control button
    Button { id: u32 },
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Wire name of this envelope's `type`
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::OscConfig { .. } => "osc_config",
            Envelope::ButtonStart { .. } => "button_start",
            Envelope::ButtonEnd { .. } => "button_end",
            Envelope::EncoderStart { .. } => "encoder_start",
            Envelope::EncoderEnd { .. } => "encoder_end",
            Envelope::Encoder { .. } => "encoder",
            Envelope::EncoderWheel { .. } => "encoder_wheel",
            Envelope::EncoderDrag { .. } => "encoder_drag",
            Envelope::EncoderHold { .. } => "encoder_hold",
            Envelope::PlaybackFader { .. } => "playback_fader",
            Envelope::PlaybackFaderStart { .. } => "playback_fader_start",
            Envelope::PlaybackFaderEnd { .. } => "playback_fader_end",
            Envelope::Playback { .. } => "playback",
            Envelope::Button { .. } => "button",
        }
    }
}

/// Outbound notice pushed to sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notice {
    Hello {
        message: String,
    },
    OscConfigOk {
        host: String,
        port: u16,
    },
    OscConfigError {
        message: String,
    },
    OscError {
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
        /// Destination host at the time of the fault
        #[serde(rename = "address")]
        host: String,
        port: u16,
    },
}

impl Notice {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_control_envelopes() {
        assert_eq!(
            Envelope::parse(r#"{"type":"button_start","key":"GO"}"#).unwrap(),
            Envelope::ButtonStart { key: "GO".to_string() }
        );
        assert_eq!(
            Envelope::parse(r#"{"type":"encoder","encoder":1,"delta":0.02}"#).unwrap(),
            Envelope::Encoder { encoder: 1, delta: 0.02 }
        );
        assert_eq!(
            Envelope::parse(r#"{"type":"playback_fader","playback":4,"value":0.5}"#).unwrap(),
            Envelope::PlaybackFader { playback: 4, value: 0.5 }
        );
        assert_eq!(
            Envelope::parse(r#"{"type":"playback","playback":4,"action":"go"}"#).unwrap(),
            Envelope::Playback { playback: 4, action: PlaybackAction::Go }
        );
        let button = Envelope::parse(r#"{"type":"button","id":12}"#).unwrap();
        assert_eq!(button, Envelope::Button { id: 12 });
        assert_eq!(button.kind(), "button");
    }

    #[test]
    fn test_osc_config_keeps_out_of_range_port() {
        let env = Envelope::parse(r#"{"type":"osc_config","host":"10.0.0.5","port":70000}"#)
            .unwrap();
        assert_eq!(
            env,
            Envelope::OscConfig { host: "10.0.0.5".to_string(), port: 70000.0 }
        );
        assert_eq!(env.kind(), "osc_config");
    }

    #[test]
    fn test_malformed_envelopes_rejected() {
        assert!(Envelope::parse("not json").is_err());
        assert!(Envelope::parse(r#"{"type":"keypress","key":"GO"}"#).is_err());
        assert!(Envelope::parse(r#"{"type":"encoder","encoder":1}"#).is_err());
        assert!(Envelope::parse(r#"{"type":"encoder_start","encoder":-1}"#).is_err());
        assert!(Envelope::parse(r#"{"type":"playback","playback":1,"action":"explode"}"#).is_err());
        assert!(Envelope::parse(r#"{"type":"button","id":"five"}"#).is_err());
    }

    #[test]
    fn test_osc_error_wire_shape() {
        let notice = Notice::OscError {
            message: "connection refused".to_string(),
            code: None,
            host: "10.0.0.5".to_string(),
            port: 7001,
        };
        let value: serde_json::Value = serde_json::from_str(&notice.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "osc_error",
                "message": "connection refused",
                "address": "10.0.0.5",
                "port": 7001
            })
        );
    }

    #[test]
    fn test_notice_round_trip_with_code() {
        let notice = Notice::OscError {
            message: "host unreachable".to_string(),
            code: Some("HostUnreachable".to_string()),
            host: "console".to_string(),
            port: 6600,
        };
        assert_eq!(Notice::parse(&notice.to_json().unwrap()).unwrap(), notice);

        let ok = Notice::parse(r#"{"type":"osc_config_ok","host":"h","port":1}"#).unwrap();
        assert_eq!(ok, Notice::OscConfigOk { host: "h".to_string(), port: 1 });
    }
}
