//! OSC address encoder
//!
//! Stateless mapping from a [`ControlEvent`] to the OSC messages the console
//! expects. Input is assumed to be validated upstream (non-empty key, 1-based
//! index, finite values); encoding itself never fails.
//!
//! | Event   | Phase     | Messages                                              |
//! |---------|-----------|-------------------------------------------------------|
//! | Button  | Start     | `/hog/hardware/<key>/z [1]`, `/hog/hardware/<key> [1]` |
//! | Button  | End       | `/hog/hardware/<key> [0]`, `/hog/hardware/<key>/z [0]` |
//! | Encoder | Start/End | `/hog/hardware/encoderwheel/<n>/z [1]` / `[0]`         |
//! | Encoder | Delta     | `/hog/hardware/encoderwheel/<n> [floor(delta*300)]`    |
//! | Fader   | Change    | `/hog/hardware/fader/<n> [floor(255*value)]`           |

use crate::control::{ButtonPhase, ControlEvent, EncoderPhase, FaderPhase, PlaybackAction};
use crate::osc::OscMessage;
use crate::{ENCODER_DELTA_SCALE, FADER_SCALE, HARDWARE_PREFIX};

/// Encode one control event into the messages to send, in order
pub fn encode(event: &ControlEvent) -> Vec<OscMessage> {
    match event {
        ControlEvent::Button { key, phase } => {
            let base = format!("{}/{}", HARDWARE_PREFIX, key.to_lowercase());
            let touch = format!("{}/z", base);
            match phase {
                ButtonPhase::Start => vec![
                    OscMessage::float(touch, 1.0),
                    OscMessage::float(base, 1.0),
                ],
                ButtonPhase::End => vec![
                    OscMessage::float(base, 0.0),
                    OscMessage::float(touch, 0.0),
                ],
            }
        }
        ControlEvent::Encoder { index, phase } => {
            let base = format!("{}/encoderwheel/{}", HARDWARE_PREFIX, index);
            match phase {
                EncoderPhase::Start => vec![OscMessage::float(format!("{}/z", base), 1.0)],
                EncoderPhase::End => vec![OscMessage::float(format!("{}/z", base), 0.0)],
                EncoderPhase::Delta(delta) => {
                    vec![OscMessage::float(base, encoder_ticks(*delta))]
                }
            }
        }
        ControlEvent::Fader { index, phase } => match phase {
            FaderPhase::Change(value) => vec![OscMessage::float(
                format!("{}/fader/{}", HARDWARE_PREFIX, index),
                fader_level(*value),
            )],
            // The console has no fader touch address
            FaderPhase::Start | FaderPhase::End => Vec::new(),
        },
    }
}

/// Encode a one-shot playback trigger (`/hog/playback/<n>/<action>`, no args)
pub fn encode_playback(index: u32, action: PlaybackAction) -> OscMessage {
    OscMessage::new(
        format!("/hog/playback/{}/{}", index, action.as_str()),
        Vec::new(),
    )
}

/// Encode a numbered control button press (`/hog/control/button/<n>`, no args)
pub fn encode_button(id: u32) -> OscMessage {
    OscMessage::new(format!("/hog/control/button/{}", id), Vec::new())
}

/// `floor(delta * 300)`
pub fn encoder_ticks(delta: f64) -> f32 {
    (delta * ENCODER_DELTA_SCALE).floor() as f32
}

/// `floor(255 * value)` with value clamped to `[0, 1]`
pub fn fader_level(value: f64) -> f32 {
    (FADER_SCALE * value.clamp(0.0, 1.0)).floor() as f32
}
