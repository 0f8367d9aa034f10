//! Signal test rows derived from the pre-configuration step

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::StepError;

const DEFAULT_DIGITAL_CHANNELS: u32 = 16;
const ANALOG_CHANNELS: u32 = 8;
const DEFAULT_ANALOG_RANGE: &str = "4-20mA";

// Upper bounds on generated rows per module / register block
const MAX_CHANNELS_PER_MODULE: u32 = 256;
const MAX_REGISTERS_PER_BLOCK: i64 = 10_000;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PreConfiguration {
    digital_modules: Vec<DigitalModule>,
    analog_modules: Vec<AnalogModule>,
    modbus_config: Option<ModbusConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct DigitalModule {
    rack_no: Option<String>,
    module_position: Option<String>,
    channel_count: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct AnalogModule {
    rack_no: Option<String>,
    module_position: Option<String>,
    default_range: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ModbusConfig {
    digital_coils: Option<RegisterBlock>,
    digital_inputs: Option<RegisterBlock>,
    analog_holding: Option<RegisterBlock>,
    analog_input: Option<RegisterBlock>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RegisterBlock {
    start_address: Option<f64>,
    register_count: Option<f64>,
}

impl RegisterBlock {
    /// Addresses for this block; a missing start uses the conventional Modbus base
    fn addresses(block: Option<&RegisterBlock>, default_start: i64) -> impl Iterator<Item = (i64, i64)> {
        let (start, count) = match block {
            Some(b) => (
                b.start_address.map(|s| s as i64).unwrap_or(default_start),
                b.register_count.map(|c| c as i64).unwrap_or(0),
            ),
            None => (default_start, 0),
        };
        let count = count.clamp(0, MAX_REGISTERS_PER_BLOCK);
        (1..=count).map(move |n| (n, start + n - 1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigitalSignal {
    pub serial_no: String,
    pub rack_no: String,
    pub module_pos: String,
    pub signal_tag: String,
    pub signal_desc: String,
    pub punch_item: String,
    pub verified_by: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalogSignal {
    pub serial_no: String,
    pub rack_no: String,
    pub module_pos: String,
    pub io_range: String,
    pub signal_tag: String,
    pub punch_item: String,
    pub verified_by: String,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModbusSignal {
    pub address: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    pub tag: String,
    pub punch_item: String,
    pub verified_by: String,
    pub comment: String,
}

impl ModbusSignal {
    fn new(address: i64, description: String, range: Option<&str>, tag: String) -> Self {
        Self {
            address: address.to_string(),
            description,
            range: range.map(str::to_string),
            tag,
            punch_item: String::new(),
            verified_by: String::new(),
            comment: String::new(),
        }
    }
}

/// Data for the `signal_tests` step
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalTests {
    pub digital_signals: Vec<DigitalSignal>,
    pub analog_signals: Vec<AnalogSignal>,
    pub modbus_digital: Vec<ModbusSignal>,
    pub modbus_analog: Vec<ModbusSignal>,
}

fn or_default(value: &Option<String>, default: &str) -> String {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => v.to_string(),
        _ => default.to_string(),
    }
}

/// Build signal rows from saved pre-configuration data
pub fn generate(pre_configuration: &Value) -> Result<SignalTests, StepError> {
    let config: PreConfiguration = serde_json::from_value(pre_configuration.clone())
        .map_err(|_| StepError::MissingPreConfiguration)?;

    let mut out = SignalTests::default();

    for (index, module) in config.digital_modules.iter().enumerate() {
        let rack = or_default(&module.rack_no, "1");
        let position = or_default(&module.module_position, "1");
        let channels = match module.channel_count {
            Some(c) if c >= 1.0 => (c as u32).min(MAX_CHANNELS_PER_MODULE),
            _ => DEFAULT_DIGITAL_CHANNELS,
        };

        for i in 1..=channels {
            out.digital_signals.push(DigitalSignal {
                serial_no: format!("{}.{}", index + 1, i),
                rack_no: rack.clone(),
                module_pos: position.clone(),
                signal_tag: format!("DI_{}_{}_{:02}", rack, position, i),
                signal_desc: format!("Digital Input {}", i),
                punch_item: String::new(),
                verified_by: String::new(),
                comment: String::new(),
            });
        }
    }

    for (index, module) in config.analog_modules.iter().enumerate() {
        let rack = or_default(&module.rack_no, "1");
        let position = or_default(&module.module_position, "2");
        let range = or_default(&module.default_range, DEFAULT_ANALOG_RANGE);

        for i in 1..=ANALOG_CHANNELS {
            out.analog_signals.push(AnalogSignal {
                serial_no: format!("{}.{}", index + 1, i),
                rack_no: rack.clone(),
                module_pos: position.clone(),
                io_range: range.clone(),
                signal_tag: format!("AI_{}_{}_{:02}", rack, position, i),
                punch_item: String::new(),
                verified_by: String::new(),
                comment: String::new(),
            });
        }
    }

    if let Some(modbus) = &config.modbus_config {
        for (n, address) in RegisterBlock::addresses(modbus.digital_coils.as_ref(), 0) {
            out.modbus_digital.push(ModbusSignal::new(
                address,
                format!("Digital Coil {}", n),
                None,
                format!("MB_COIL_{}", n),
            ));
        }
        for (n, address) in RegisterBlock::addresses(modbus.digital_inputs.as_ref(), 10_000) {
            out.modbus_digital.push(ModbusSignal::new(
                address,
                format!("Digital Input {}", n),
                None,
                format!("MB_DI_{}", n),
            ));
        }
        for (n, address) in RegisterBlock::addresses(modbus.analog_holding.as_ref(), 40_000) {
            out.modbus_analog.push(ModbusSignal::new(
                address,
                format!("Holding Register {}", n),
                Some(DEFAULT_ANALOG_RANGE),
                format!("MB_HR_{}", n),
            ));
        }
        for (n, address) in RegisterBlock::addresses(modbus.analog_input.as_ref(), 30_000) {
            out.modbus_analog.push(ModbusSignal::new(
                address,
                format!("Input Register {}", n),
                Some(DEFAULT_ANALOG_RANGE),
                format!("MB_IR_{}", n),
            ));
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn digital_modules_default_to_sixteen_channels() {
        let out = generate(&json!({
            "digitalModules": [
                { "rackNo": "1", "modulePosition": "3" },
                { "rackNo": "2", "modulePosition": "4", "channelCount": 4 }
            ]
        }))
        .unwrap();

        assert_eq!(out.digital_signals.len(), 20);
        let first = &out.digital_signals[0];
        assert_eq!(first.serial_no, "1.1");
        assert_eq!(first.signal_tag, "DI_1_3_01");
        assert_eq!(first.signal_desc, "Digital Input 1");

        let last = out.digital_signals.last().unwrap();
        assert_eq!(last.serial_no, "2.4");
        assert_eq!(last.signal_tag, "DI_2_4_04");
    }

    #[test]
    fn analog_modules_yield_eight_rows_with_range() {
        let out = generate(&json!({
            "analogModules": [
                { "rackNo": "1", "modulePosition": "2" },
                { "rackNo": "1", "modulePosition": "5", "defaultRange": "0-10V" }
            ]
        }))
        .unwrap();

        assert_eq!(out.analog_signals.len(), 16);
        assert_eq!(out.analog_signals[0].io_range, "4-20mA");
        assert_eq!(out.analog_signals[7].signal_tag, "AI_1_2_08");
        assert_eq!(out.analog_signals[8].serial_no, "2.1");
        assert_eq!(out.analog_signals[8].io_range, "0-10V");
    }

    #[test]
    fn modbus_blocks_count_from_start_address() {
        let out = generate(&json!({
            "modbusConfig": {
                "digitalCoils": { "startAddress": 100, "registerCount": 2 },
                "digitalInputs": { "registerCount": 1 },
                "analogHolding": { "startAddress": 40001, "registerCount": 3 },
                "analogInput": { "startAddress": 30000, "registerCount": 0 }
            }
        }))
        .unwrap();

        let digital: Vec<_> = out.modbus_digital.iter().map(|s| (s.tag.as_str(), s.address.as_str())).collect();
        assert_eq!(digital, vec![("MB_COIL_1", "100"), ("MB_COIL_2", "101"), ("MB_DI_1", "10000")]);

        assert_eq!(out.modbus_analog.len(), 3);
        assert_eq!(out.modbus_analog[2].tag, "MB_HR_3");
        assert_eq!(out.modbus_analog[2].address, "40003");
        assert_eq!(out.modbus_analog[0].range.as_deref(), Some("4-20mA"));
    }

    #[test]
    fn missing_sections_produce_empty_tables() {
        let out = generate(&json!({})).unwrap();
        let value = serde_json::to_value(out).unwrap();
        assert_eq!(value, json!({
            "digitalSignals": [],
            "analogSignals": [],
            "modbusDigital": [],
            "modbusAnalog": []
        }));
    }

    #[test]
    fn register_counts_are_bounded() {
        let out = generate(&json!({
            "modbusConfig": { "digitalCoils": { "startAddress": 0, "registerCount": 1e9 } }
        }))
        .unwrap();
        assert_eq!(out.modbus_digital.len(), MAX_REGISTERS_PER_BLOCK as usize);
    }

    #[test]
    fn malformed_configuration_is_rejected() {
        assert!(matches!(
            generate(&json!({ "digitalModules": "lots" })),
            Err(StepError::MissingPreConfiguration)
        ));
    }
}
