use crate::modbus::packet::DecodedRegisterBlock;
use crate::prelude::*;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Signed16,
    Unsigned16,
    /// `words` registers, two ASCII bytes each, high byte first
    AsciiPacked,
    /// two registers, high word first
    Unsigned32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegisterMapEntry {
    pub address: u16,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default = "RegisterMapEntry::default_scale")]
    pub scale: f64,
    #[serde(default = "RegisterMapEntry::default_words")]
    pub words: u16,
}

impl RegisterMapEntry {
    fn default_scale() -> f64 {
        1.0
    }

    fn default_words() -> u16 {
        1
    }

    fn new(address: u16, name: &str, field_type: FieldType, scale: f64) -> Self {
        Self {
            address,
            name: name.to_owned(),
            field_type,
            scale,
            words: 1,
        }
    }

    pub fn signed(address: u16, name: &str, scale: f64) -> Self {
        Self::new(address, name, FieldType::Signed16, scale)
    }

    pub fn unsigned(address: u16, name: &str) -> Self {
        Self::new(address, name, FieldType::Unsigned16, 1.0)
    }

    pub fn unsigned32(address: u16, name: &str) -> Self {
        Self::new(address, name, FieldType::Unsigned32, 1.0)
    }

    pub fn ascii(address: u16, name: &str, words: u16) -> Self {
        Self {
            words,
            ..Self::new(address, name, FieldType::AsciiPacked, 1.0)
        }
    }

    /// Number of registers this field spans.
    pub fn width(&self) -> u16 {
        match self.field_type {
            FieldType::Signed16 | FieldType::Unsigned16 => 1,
            FieldType::Unsigned32 => 2,
            FieldType::AsciiPacked => self.words,
        }
    }

    /// Decodes this field from `lookup`. Absent when any register the
    /// field spans is missing.
    pub fn decode<F>(&self, lookup: F) -> Option<RegisterValue>
    where
        F: Fn(u16) -> Option<u16>,
    {
        let at = |offset: u16| lookup(self.address.checked_add(offset)?);

        match self.field_type {
            FieldType::Unsigned16 => Some(scaled(i64::from(at(0)?), self.scale)),
            FieldType::Signed16 => Some(scaled(i64::from(at(0)? as i16), self.scale)),
            FieldType::Unsigned32 => {
                let raw = (u32::from(at(0)?) << 16) | u32::from(at(1)?);
                Some(scaled(i64::from(raw), self.scale))
            }
            FieldType::AsciiPacked => {
                let mut bytes = Vec::with_capacity(usize::from(self.words) * 2);
                for offset in 0..self.words {
                    bytes.extend_from_slice(&at(offset)?.to_be_bytes());
                }
                let text: String = bytes
                    .iter()
                    .filter(|b| b.is_ascii())
                    .map(|b| char::from(*b))
                    .collect();
                Some(RegisterValue::Text(
                    text.trim_end_matches(|c: char| c == '\0' || c.is_whitespace())
                        .trim_start()
                        .to_owned(),
                ))
            }
        }
    }
}

/// Fixed-point conversion. Fractional scales divide by their reciprocal so
/// that 539 at 0.1 comes out as exactly 53.9.
fn scaled(raw: i64, scale: f64) -> RegisterValue {
    if scale == 1.0 {
        return RegisterValue::Int(raw);
    }

    let reciprocal = 1.0 / scale;
    let divisor = reciprocal.round();
    if divisor >= 1.0 && (reciprocal - divisor).abs() < 1e-9 {
        RegisterValue::Float(raw as f64 / divisor)
    } else {
        RegisterValue::Float(raw as f64 * scale)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RegisterValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RegisterValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Text(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Named values decoded from one or more register blocks.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct RegisterValues(BTreeMap<String, RegisterValue>);

impl RegisterValues {
    pub fn get(&self, name: &str) -> Option<&RegisterValue> {
        self.0.get(name)
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(RegisterValue::as_f64)
    }

    pub fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(RegisterValue::as_i64)
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(RegisterValue::as_text)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RegisterValue)> {
        self.0.iter()
    }
}

/// Address to typed-field table for one device family.
#[derive(Clone, Debug, PartialEq)]
pub struct RegisterMap {
    entries: Vec<RegisterMapEntry>,
}

impl RegisterMap {
    pub fn new(entries: Vec<RegisterMapEntry>) -> Result<Self> {
        let mut names = HashSet::new();
        for entry in &entries {
            if entry.name.is_empty() {
                bail!("register {} has an empty name", entry.address);
            }
            if !names.insert(entry.name.as_str()) {
                bail!("duplicate register name {}", entry.name);
            }
            if entry.width() == 0 {
                bail!("register {} spans no registers", entry.name);
            }
            if !(entry.scale.is_finite() && entry.scale > 0.0) {
                bail!("register {} has invalid scale {}", entry.name, entry.scale);
            }
        }

        Ok(Self { entries })
    }

    /// Runtime block 171..237 plus the fault/warning words of the ANERN
    /// family.
    pub fn anern() -> Self {
        use RegisterMapEntry as E;

        let entries = vec![
            E::unsigned32(100, "fault_code"),
            E::unsigned32(108, "warning_code"),
            E::unsigned(171, "device_type"),
            E::ascii(172, "device_name", 12),
            E::unsigned(184, "protocol_number"),
            E::ascii(186, "serial_number", 12),
            E::unsigned(201, "work_mode"),
            E::signed(202, "mains_voltage_v", 0.1),
            E::signed(203, "mains_freq_hz", 0.01),
            E::signed(204, "mains_power_w", 1.0),
            E::signed(205, "inv_voltage_v", 0.1),
            E::signed(206, "inv_current_a", 0.1),
            E::signed(207, "inv_freq_hz", 0.01),
            E::signed(208, "inv_power_w", 1.0),
            E::signed(209, "inv_charge_power_w", 1.0),
            E::signed(210, "out_voltage_v", 0.1),
            E::signed(211, "out_current_a", 0.1),
            E::signed(212, "out_freq_hz", 0.01),
            E::signed(213, "out_active_power_w", 1.0),
            E::signed(214, "out_apparent_power_va", 1.0),
            E::signed(215, "bat_voltage_v", 0.1),
            E::signed(216, "bat_current_a", 0.1),
            E::signed(217, "bat_power_w", 1.0),
            E::signed(219, "pv_voltage_v", 0.1),
            E::signed(220, "pv_current_a", 0.1),
            E::signed(223, "pv_power_w", 1.0),
            E::signed(224, "pv_charge_power_w", 1.0),
            E::signed(225, "load_percent", 1.0),
            E::signed(226, "temp_dcdc_c", 1.0),
            E::signed(227, "temp_inverter_c", 1.0),
            E::unsigned(229, "soc_percent"),
            E::unsigned(231, "power_flow_flags"),
            E::signed(233, "inv_charge_current_a", 0.1),
            E::signed(234, "pv_charge_current_a", 0.1),
        ];

        Self { entries }
    }

    pub fn entries(&self) -> &[RegisterMapEntry] {
        &self.entries
    }

    pub fn entry(&self, name: &str) -> Option<&RegisterMapEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Decodes every entry the given blocks cover; the rest stay absent.
    pub fn decode(&self, blocks: &[DecodedRegisterBlock]) -> RegisterValues {
        let lookup = |address: u16| blocks.iter().find_map(|b| b.get(address));

        let values = self
            .entries
            .iter()
            .filter_map(|e| e.decode(&lookup).map(|v| (e.name.clone(), v)))
            .collect();

        RegisterValues(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signed_scaling_is_exact() {
        let e = RegisterMapEntry::signed(215, "bat_voltage_v", 0.1);
        assert_eq!(e.decode(|_| Some(539)), Some(RegisterValue::Float(53.9)));

        let e = RegisterMapEntry::signed(216, "bat_current_a", 0.1);
        // 0xFFE2 is -30
        assert_eq!(e.decode(|_| Some(0xFFE2)), Some(RegisterValue::Float(-3.0)));

        let e = RegisterMapEntry::signed(203, "mains_freq_hz", 0.01);
        assert_eq!(e.decode(|_| Some(5001)), Some(RegisterValue::Float(50.01)));
    }

    #[test]
    fn unsigned_keeps_high_values() {
        let e = RegisterMapEntry::unsigned(231, "power_flow_flags");
        assert_eq!(e.decode(|_| Some(0xFFFF)), Some(RegisterValue::Int(65535)));
    }

    #[test]
    fn unsigned32_is_high_word_first() {
        let e = RegisterMapEntry::unsigned32(100, "fault_code");
        let lookup = |a| match a {
            100 => Some(0x0001),
            101 => Some(0x0002),
            _ => None,
        };
        assert_eq!(e.decode(lookup), Some(RegisterValue::Int(0x0001_0002)));
        assert_eq!(e.decode(|a| (a == 100).then_some(1)), None);
    }

    #[test]
    fn ascii_packed_trims_nul_and_space() {
        let e = RegisterMapEntry::ascii(172, "device_name", 4);
        // "AB", "C ", "\0\0", "\0\0"
        let words = [0x4142, 0x4320, 0x0000, 0x0000];
        let lookup = |a: u16| words.get(usize::from(a - 172)).copied();
        assert_eq!(e.decode(lookup), Some(RegisterValue::Text("ABC".to_owned())));
    }

    #[test]
    fn ascii_packed_absent_when_partially_covered() {
        let e = RegisterMapEntry::ascii(172, "device_name", 12);
        assert_eq!(e.decode(|a| (a < 180).then_some(0x4141)), None);
    }

    #[test]
    fn new_rejects_duplicates() {
        let entries = vec![
            RegisterMapEntry::unsigned(1, "a"),
            RegisterMapEntry::unsigned(2, "a"),
        ];
        assert!(RegisterMap::new(entries).is_err());
        assert!(RegisterMap::new(RegisterMap::anern().entries().to_vec()).is_ok());
    }
}
