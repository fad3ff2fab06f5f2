//! OSC message types and wire encoding

use bytes::Bytes;
use rosc::{OscPacket, OscType};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Typed OSC argument. The console only consumes floats.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum OscArg {
    #[serde(rename = "f")]
    Float(f32),
}

impl OscArg {
    pub fn tag(&self) -> char {
        match self {
            OscArg::Float(_) => 'f',
        }
    }

    pub fn as_f32(&self) -> f32 {
        match self {
            OscArg::Float(v) => *v,
        }
    }
}

/// One OSC message, carried by exactly one UDP datagram
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Message with a single float argument
    pub fn float(address: impl Into<String>, value: f32) -> Self {
        Self::new(address, vec![OscArg::Float(value)])
    }

    /// Convert to a `rosc` packet
    pub fn to_packet(&self) -> OscPacket {
        OscPacket::Message(rosc::OscMessage {
            addr: self.address.clone(),
            args: self
                .args
                .iter()
                .map(|arg| match arg {
                    OscArg::Float(v) => OscType::Float(*v),
                })
                .collect(),
        })
    }

    /// Encode as an OSC 1.0 datagram payload
    pub fn to_bytes(&self) -> Result<Bytes> {
        rosc::encoder::encode(&self.to_packet())
            .map(Bytes::from)
            .map_err(|e| Error::Encode(format!("{:?}", e)))
    }

    /// Decode a datagram holding a single message with float arguments
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let (_, packet) =
            rosc::decoder::decode_udp(data).map_err(|e| Error::Decode(format!("{:?}", e)))?;

        match packet {
            OscPacket::Message(msg) => {
                let args = msg
                    .args
                    .iter()
                    .map(|arg| match arg {
                        OscType::Float(v) => Ok(OscArg::Float(*v)),
                        other => Err(Error::Decode(format!("unsupported argument {:?}", other))),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self {
                    address: msg.addr,
                    args,
                })
            }
            OscPacket::Bundle(_) => Err(Error::Decode("unexpected bundle".to_string())),
        }
    }

    /// JSON rendering used in traffic logs
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| self.address.clone())
    }
}
