// SPDX-FileCopyrightText: 2026 Flowzap Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common identifier and wire types used across the Flowzap workspace.

use serde::{Deserialize, Serialize};

use crate::error::FlowzapError;

/// Length of the normalized contact key: the trailing digits of a phone number.
pub const CONTACT_KEY_LEN: usize = 8;

/// Country prefix assumed when a phone number arrives without one.
pub const COUNTRY_PREFIX: &str = "55";

/// Suffix of a WhatsApp-style delivery address.
const TARGET_SUFFIX: &str = "@s.whatsapp.net";

/// Normalized short identifier for one contact.
///
/// Derived from a phone number by stripping every non-digit character and
/// keeping the last [`CONTACT_KEY_LEN`] digits. This unifies the textual
/// representations of the same underlying number (with or without country
/// prefix, punctuation, spacing). All per-contact maps are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContactKey(String);

impl ContactKey {
    /// Derives the key from any textual phone representation.
    ///
    /// Fails with [`FlowzapError::Validation`] when fewer than
    /// [`CONTACT_KEY_LEN`] digits remain after stripping.
    pub fn from_phone(phone: &str) -> Result<Self, FlowzapError> {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        if digits.len() < CONTACT_KEY_LEN {
            return Err(FlowzapError::Validation(format!(
                "phone `{phone}` has fewer than {CONTACT_KEY_LEN} digits"
            )));
        }
        Ok(Self(digits[digits.len() - CONTACT_KEY_LEN..].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContactKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Outbound delivery address for one contact, in messaging-gateway format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryTarget(String);

impl DeliveryTarget {
    /// Builds the delivery address from a full phone number.
    ///
    /// The country prefix is added when absent; a 12-digit national number
    /// gets the mobile `9` inserted after the two-digit area code.
    pub fn from_phone(phone: &str) -> Self {
        let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
        let mut formatted = if digits.starts_with(COUNTRY_PREFIX) {
            digits
        } else {
            format!("{COUNTRY_PREFIX}{digits}")
        };
        if formatted.len() == 12 {
            let area = &formatted[2..4];
            let number = &formatted[4..];
            formatted = format!("{COUNTRY_PREFIX}{area}9{number}");
        }
        Self(format!("{formatted}{TARGET_SUFFIX}"))
    }

    /// The bare number portion, without the address suffix.
    pub fn number(&self) -> &str {
        self.0.strip_suffix(TARGET_SUFFIX).unwrap_or(&self.0)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeliveryTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of one outbound channel in the dispatch pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Media kind for non-audio media payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

/// Source of audio content for a voice-note payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Inline base64 data URL, produced by fetching and encoding the media.
    Encoded(String),
    /// Direct reference to the remote content.
    Url(String),
}

/// One outbound message as handed to a [`MessageGateway`](crate::traits::MessageGateway).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    Text {
        text: String,
    },
    Media {
        kind: MediaKind,
        url: String,
        caption: String,
    },
    /// Push-to-talk voice note, the primary audio delivery path.
    VoiceNote {
        audio: AudioSource,
    },
    /// Encoded audio sent as generic media, the alternate delivery encoding.
    AudioMedia {
        encoded: String,
    },
}

/// Opaque acknowledgment returned by a gateway on successful delivery.
#[derive(Debug, Clone, Default)]
pub struct GatewayReceipt {
    /// Raw response body, kept for operator-visible logging only.
    pub raw: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contact_key_strips_formatting() {
        let a = ContactKey::from_phone("+55 (11) 98888-7777").unwrap();
        let b = ContactKey::from_phone("11988887777").unwrap();
        let c = ContactKey::from_phone("5511988887777").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a.as_str(), "88887777");
    }

    #[test]
    fn contact_key_rejects_short_input() {
        assert!(ContactKey::from_phone("1234567").is_err());
        assert!(ContactKey::from_phone("").is_err());
        assert!(ContactKey::from_phone("abc").is_err());
    }

    #[test]
    fn target_adds_country_prefix() {
        let t = DeliveryTarget::from_phone("11988887777");
        assert_eq!(t.as_str(), "5511988887777@s.whatsapp.net");
        assert_eq!(t.number(), "5511988887777");
    }

    #[test]
    fn target_inserts_mobile_nine_for_twelve_digits() {
        // 55 + 11 + 88887777 is a legacy 8-digit mobile number.
        let t = DeliveryTarget::from_phone("551188887777");
        assert_eq!(t.as_str(), "5511988887777@s.whatsapp.net");
    }

    #[test]
    fn target_keeps_thirteen_digit_numbers() {
        let t = DeliveryTarget::from_phone("5511988887777");
        assert_eq!(t.as_str(), "5511988887777@s.whatsapp.net");
    }

    #[test]
    fn media_kind_display_is_lowercase() {
        assert_eq!(MediaKind::Image.to_string(), "image");
        assert_eq!(MediaKind::Video.to_string(), "video");
    }
}
