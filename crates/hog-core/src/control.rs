//! Physical control events
//!
//! A [`ControlEvent`] describes one tick of a user gesture on a console
//! control. Every control is identified by a [`ControlId`]; for each id the
//! phases must alternate `Start -> (Delta | Change)* -> End`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Kind of physical control
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    Button,
    Encoder,
    Fader,
}

/// Identity of a single control instance
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ControlId {
    /// Hardware key, lower-cased (e.g. `go`, `choose/3`)
    Button(String),
    /// 1-based encoder wheel index
    Encoder(u32),
    /// 1-based playback fader index
    Fader(u32),
}

impl ControlId {
    /// Build a validated button id. The key is trimmed and lower-cased.
    pub fn button(key: &str) -> Result<Self> {
        let key = key.trim();
        if key.is_empty() {
            return Err(Error::InvalidKey(key.to_string()));
        }
        Ok(ControlId::Button(key.to_lowercase()))
    }

    /// Build a validated encoder id
    pub fn encoder(index: u32) -> Result<Self> {
        check_index(index).map(ControlId::Encoder)
    }

    /// Build a validated fader id
    pub fn fader(index: u32) -> Result<Self> {
        check_index(index).map(ControlId::Fader)
    }

    pub fn kind(&self) -> ControlKind {
        match self {
            ControlId::Button(_) => ControlKind::Button,
            ControlId::Encoder(_) => ControlKind::Encoder,
            ControlId::Fader(_) => ControlKind::Fader,
        }
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlId::Button(key) => write!(f, "button:{}", key),
            ControlId::Encoder(index) => write!(f, "encoder:{}", index),
            ControlId::Fader(index) => write!(f, "fader:{}", index),
        }
    }
}

fn check_index(index: u32) -> Result<u32> {
    if index == 0 {
        Err(Error::InvalidIndex(index))
    } else {
        Ok(index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonPhase {
    Start,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EncoderPhase {
    Start,
    /// Relative rotation, unscaled
    Delta(f64),
    End,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FaderPhase {
    Start,
    /// Absolute position in `0.0..=1.0`
    Change(f64),
    End,
}

/// A typed, phased description of a user gesture
#[derive(Debug, Clone, PartialEq)]
pub enum ControlEvent {
    Button { key: String, phase: ButtonPhase },
    Encoder { index: u32, phase: EncoderPhase },
    Fader { index: u32, phase: FaderPhase },
}

impl ControlEvent {
    /// The control this event belongs to
    pub fn id(&self) -> ControlId {
        match self {
            ControlEvent::Button { key, .. } => ControlId::Button(key.clone()),
            ControlEvent::Encoder { index, .. } => ControlId::Encoder(*index),
            ControlEvent::Fader { index, .. } => ControlId::Fader(*index),
        }
    }

    /// Synthesize the `Start` event for a control
    pub fn start(id: &ControlId) -> Self {
        match id {
            ControlId::Button(key) => ControlEvent::Button {
                key: key.clone(),
                phase: ButtonPhase::Start,
            },
            ControlId::Encoder(index) => ControlEvent::Encoder {
                index: *index,
                phase: EncoderPhase::Start,
            },
            ControlId::Fader(index) => ControlEvent::Fader {
                index: *index,
                phase: FaderPhase::Start,
            },
        }
    }

    /// Synthesize the `End` event for a control
    pub fn end(id: &ControlId) -> Self {
        match id {
            ControlId::Button(key) => ControlEvent::Button {
                key: key.clone(),
                phase: ButtonPhase::End,
            },
            ControlId::Encoder(index) => ControlEvent::Encoder {
                index: *index,
                phase: EncoderPhase::End,
            },
            ControlId::Fader(index) => ControlEvent::Fader {
                index: *index,
                phase: FaderPhase::End,
            },
        }
    }

    pub fn is_start(&self) -> bool {
        matches!(
            self,
            ControlEvent::Button { phase: ButtonPhase::Start, .. }
                | ControlEvent::Encoder { phase: EncoderPhase::Start, .. }
                | ControlEvent::Fader { phase: FaderPhase::Start, .. }
        )
    }

    pub fn is_end(&self) -> bool {
        matches!(
            self,
            ControlEvent::Button { phase: ButtonPhase::End, .. }
                | ControlEvent::Encoder { phase: EncoderPhase::End, .. }
                | ControlEvent::Fader { phase: FaderPhase::End, .. }
        )
    }
}

/// One-shot playback trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackAction {
    Go,
    Back,
    Release,
    Flash,
}

impl PlaybackAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlaybackAction::Go => "go",
            PlaybackAction::Back => "back",
            PlaybackAction::Release => "release",
            PlaybackAction::Flash => "flash",
        }
    }
}
