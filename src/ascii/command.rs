use crate::prelude::*;

use std::str::FromStr;

/// How a token is interpreted when decoded.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FieldKind {
    /// integer, else float, else the original string
    Auto,
    /// always kept verbatim (bit strings keep their leading zeros)
    Text,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

const fn auto(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Auto,
    }
}

const fn text(name: &'static str) -> FieldSpec {
    FieldSpec {
        name,
        kind: FieldKind::Text,
    }
}

/// The fixed layout of one command's response payload.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Schema {
    /// whitespace separated tokens zipped against these names in order
    Fields(&'static [FieldSpec]),
    /// the whole trimmed payload is one text field
    Whole {
        name: &'static str,
        strip_prefix: Option<&'static str>,
    },
}

// {{{ schemas
const QPIGS_FIELDS: &[FieldSpec] = &[
    auto("grid_voltage"),
    auto("grid_frequency"),
    auto("ac_output_voltage"),
    auto("ac_output_frequency"),
    auto("output_apparent_power"),
    auto("output_active_power"),
    auto("load_percent"),
    auto("bus_voltage"),
    auto("battery_voltage"),
    auto("battery_charging_current"),
    auto("battery_capacity"),
    auto("inverter_heat_sink_temperature"),
    auto("pv_input_current"),
    auto("pv_input_voltage"),
    auto("scc_battery_voltage"),
    auto("battery_discharge_current"),
    text("device_status_bits_b7_b0"),
    auto("battery_voltage_offset"),
    auto("eeprom_version"),
    auto("pv_charging_power"),
    text("device_status_bits_b10_b8"),
    auto("reserved_a"),
    auto("reserved_bb"),
    auto("reserved_cccc"),
];

const QPIGS2_FIELDS: &[FieldSpec] = &[
    auto("pv_current"),
    auto("pv_voltage"),
    auto("pv_charging_power"),
];

const QPIRI_FIELDS: &[FieldSpec] = &[
    auto("rated_grid_voltage"),
    auto("rated_input_current"),
    auto("rated_ac_output_voltage"),
    auto("rated_output_frequency"),
    auto("rated_output_current"),
    auto("rated_output_apparent_power"),
    auto("rated_output_active_power"),
    auto("rated_battery_voltage"),
    auto("low_battery_to_ac_bypass_voltage"),
    auto("shut_down_battery_voltage"),
    auto("bulk_charging_voltage"),
    auto("float_charging_voltage"),
    auto("battery_type"),
    auto("max_utility_charging_current"),
    auto("max_charging_current"),
    auto("ac_input_voltage_range"),
    auto("output_source_priority"),
    auto("charger_source_priority"),
    auto("parallel_max_number"),
    auto("reserved_uu"),
    auto("reserved_v"),
    auto("parallel_mode"),
    auto("high_battery_voltage_to_battery_mode"),
    auto("solar_work_condition_in_parallel"),
    auto("solar_max_charging_power_auto_adjust"),
    auto("rated_battery_capacity"),
    auto("reserved_b"),
    auto("reserved_ccc"),
];

const QMOD_FIELDS: &[FieldSpec] = &[text("operating_mode")];

const QBEQI_FIELDS: &[FieldSpec] = &[
    auto("equalization_function"),
    auto("equalization_time_min"),
    auto("interval_days"),
    auto("max_charging_current"),
    auto("float_voltage"),
    auto("reserved_1"),
    auto("equalization_timeout_min"),
    auto("immediate_activation_flag"),
    auto("elapsed_time_min"),
];
// }}}

/// Query commands understood by the ASCII protocol.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    Qpigs,
    Qpigs2,
    Qpiri,
    Qmod,
    Qmn,
    Qvfw,
    Qid,
    Qsid,
    Qflag,
    Qbeqi,
    Qpiws,
    Qmchgcr,
    Qmuchgcr,
}

impl Command {
    pub const ALL: [Command; 13] = [
        Command::Qpigs,
        Command::Qpigs2,
        Command::Qpiri,
        Command::Qmod,
        Command::Qmn,
        Command::Qvfw,
        Command::Qid,
        Command::Qsid,
        Command::Qflag,
        Command::Qbeqi,
        Command::Qpiws,
        Command::Qmchgcr,
        Command::Qmuchgcr,
    ];

    /// The command text sent on the wire, before checksum and terminator.
    pub fn name(&self) -> &'static str {
        use Command::*;

        match self {
            Qpigs => "QPIGS",
            Qpigs2 => "QPIGS2",
            Qpiri => "QPIRI",
            Qmod => "QMOD",
            Qmn => "QMN",
            Qvfw => "QVFW",
            Qid => "QID",
            Qsid => "QSID",
            Qflag => "QFLAG",
            Qbeqi => "QBEQI",
            Qpiws => "QPIWS",
            Qmchgcr => "QMCHGCR",
            Qmuchgcr => "QMUCHGCR",
        }
    }

    pub fn schema(&self) -> Schema {
        use Command::*;

        match self {
            Qpigs => Schema::Fields(QPIGS_FIELDS),
            Qpigs2 => Schema::Fields(QPIGS2_FIELDS),
            Qpiri => Schema::Fields(QPIRI_FIELDS),
            Qmod => Schema::Fields(QMOD_FIELDS),
            Qbeqi => Schema::Fields(QBEQI_FIELDS),
            Qmn => Schema::Whole {
                name: "model",
                strip_prefix: None,
            },
            Qvfw => Schema::Whole {
                name: "firmware_version",
                strip_prefix: Some("VERFW:"),
            },
            Qid | Qsid => Schema::Whole {
                name: "device_id",
                strip_prefix: None,
            },
            Qflag => Schema::Whole {
                name: "flags",
                strip_prefix: None,
            },
            Qpiws => Schema::Whole {
                name: "warning_status",
                strip_prefix: None,
            },
            Qmchgcr | Qmuchgcr => Schema::Whole {
                name: "charging_current_options",
                strip_prefix: None,
            },
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Command {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Self::ALL
            .iter()
            .find(|c| c.name() == upper)
            .copied()
            .ok_or_else(|| anyhow!("unknown ascii command {}", s))
    }
}
