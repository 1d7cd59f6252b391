use crate::modbus::{RegisterMap, RegisterMapEntry};
use crate::prelude::*;

use serde::Deserialize;

/// On-disk register table for one device family.
///
/// ```json
/// { "family": "anern",
///   "registers": [
///     { "address": 215, "name": "bat_voltage_v", "type": "signed16", "scale": 0.1 },
///     { "address": 172, "name": "device_name", "type": "ascii_packed", "words": 12 }
///   ] }
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterFile {
    #[serde(default)]
    pub family: String,
    pub registers: Vec<RegisterMapEntry>,
}

impl RegisterFile {
    pub fn parse(content: &str) -> Result<RegisterMap> {
        let file: RegisterFile = serde_json::from_str(content)
            .map_err(|err| anyhow!("Error parsing register file: {}", err))?;

        debug!(
            "register map {:?} with {} entries",
            file.family,
            file.registers.len()
        );

        RegisterMap::new(file.registers)
    }

    pub fn load(register_file: &str) -> Result<RegisterMap> {
        let content = std::fs::read_to_string(register_file)
            .map_err(|err| anyhow!("Error reading register file {}: {}", register_file, err))?;

        Self::parse(&content)
    }
}
