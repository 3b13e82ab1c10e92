//! OTAA credentials and radio wiring.

use super::ConfigError;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Over-the-air activation credentials handed to the radio layer at init.
///
/// EUIs are little-endian, the application key big-endian, matching what the
/// network server console shows for LMIC-style stacks.
#[derive(Clone, Default, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct OtaaCredentials {
    pub dev_eui: [u8; 8],
    pub app_eui: [u8; 8],
    pub app_key: [u8; 16],
}

impl OtaaCredentials {
    /// Parse credentials from hex strings as printed by the network console.
    ///
    /// EUIs are given most-significant byte first and stored reversed.
    pub fn from_hex(dev_eui: &str, app_eui: &str, app_key: &str) -> Result<Self, ConfigError> {
        let mut creds = Self::default();
        parse_hex(dev_eui, &mut creds.dev_eui, "dev_eui")?;
        parse_hex(app_eui, &mut creds.app_eui, "app_eui")?;
        parse_hex(app_key, &mut creds.app_key, "app_key")?;
        creds.dev_eui.reverse();
        creds.app_eui.reverse();
        Ok(creds)
    }

    /// True until real credentials have been provisioned.
    pub fn is_placeholder(&self) -> bool {
        self.dev_eui == [0; 8] && self.app_eui == [0; 8] && self.app_key == [0; 16]
    }
}

impl fmt::Debug for OtaaCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtaaCredentials")
            .field("dev_eui", &self.dev_eui)
            .field("app_eui", &self.app_eui)
            .field("app_key", &"<redacted>")
            .finish()
    }
}

fn parse_hex(s: &str, out: &mut [u8], field: &'static str) -> Result<(), ConfigError> {
    let bad = ConfigError::BadCredential {
        field,
        expected: out.len(),
    };
    let s = s.trim();
    if s.len() != out.len() * 2 || !s.is_ascii() {
        return Err(bad);
    }
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| bad.clone())?;
    }
    Ok(())
}

/// GPIO wiring between the MCU and the LoRa transceiver.
///
/// Defaults are the TTGO T-Beam SX1276 wiring.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(not(target_os = "espidf"), derive(serde::Serialize, serde::Deserialize))]
pub struct PinMapping {
    pub nss: u8,
    pub reset: u8,
    pub dio: [u8; 3],
    pub sck: u8,
    pub miso: u8,
    pub mosi: u8,
    /// User button, also the ext1 wake source.
    pub button: u8,
}

impl Default for PinMapping {
    fn default() -> Self {
        Self {
            nss: 18,
            reset: 23,
            dio: [26, 33, 32],
            sck: 5,
            miso: 19,
            mosi: 27,
            button: 38,
        }
    }
}
