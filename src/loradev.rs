use std::fmt;

use log::info;

use crate::error::Result;

/// LoRa modem parameters sent with `AT+PARAMETER`.
///
/// Values are the raw codes the modem firmware expects, not physical units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioParameters {
    /// Spreading factor (7-12)
    pub spreading_factor: u8,
    /// Bandwidth code
    pub bandwidth: u8,
    /// Coding rate code (1 = 4/5 .. 4 = 4/8)
    pub coding_rate: u8,
    /// Programmed preamble length
    pub preamble: u8,
}

impl Default for RadioParameters {
    fn default() -> Self {
        RadioParameters {
            spreading_factor: 10,
            bandwidth: 2,
            coding_rate: 1,
            preamble: 7,
        }
    }
}

/// A single AT command understood by the modem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand {
    /// Spreading factor, bandwidth, coding rate and preamble.
    Parameter(RadioParameters),
    /// Operating frequency in Hz.
    Band(u32),
    /// Address of this node.
    Address(u16),
    /// Network identifier shared by all nodes that talk to each other.
    NetworkId(u8),
    /// RF output power in dBm.
    RfPower(u8),
}

impl fmt::Display for AtCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AtCommand::Parameter(p) => write!(
                f,
                "AT+PARAMETER={},{},{},{}",
                p.spreading_factor, p.bandwidth, p.coding_rate, p.preamble
            ),
            AtCommand::Band(freq) => write!(f, "AT+BAND={}", freq),
            AtCommand::Address(addr) => write!(f, "AT+ADDRESS={}", addr),
            AtCommand::NetworkId(id) => write!(f, "AT+NETWORKID={}", id),
            AtCommand::RfPower(dbm) => write!(f, "AT+CRFOP={}", dbm),
        }
    }
}

/// Radio configuration applied on every run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModemConfig {
    pub parameters: RadioParameters,
    /// Frequency in Hz
    pub band: u32,
    pub address: u16,
    pub network_id: u8,
    /// Output power in dBm
    pub rf_power: u8,
}

impl Default for ModemConfig {
    fn default() -> Self {
        ModemConfig {
            parameters: RadioParameters::default(),
            band: 432_500_000, // 902_300_000 for the US band
            address: 1,
            network_id: 6,
            rf_power: 15,
        }
    }
}

impl ModemConfig {
    /// Commands in the order they have to reach the modem.
    pub fn commands(&self) -> Vec<AtCommand> {
        vec![
            AtCommand::Parameter(self.parameters),
            AtCommand::Band(self.band),
            AtCommand::Address(self.address),
            AtCommand::NetworkId(self.network_id),
            AtCommand::RfPower(self.rf_power),
        ]
    }
}

/// A command together with whatever the modem answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub command: String,
    pub response: String,
}

pub trait RylrLoraDevice {
    /// Send a raw command line and collect the modem's answer.
    fn send_command(&mut self, cmd: &str) -> Result<String>;

    /// Set spreading factor, bandwidth, coding rate and preamble.
    fn set_parameters(&mut self, parameters: RadioParameters) -> Result<String> {
        self.send_command(&AtCommand::Parameter(parameters).to_string())
    }
    /// Set operating frequency in Hz.
    fn set_band(&mut self, freq: u32) -> Result<String> {
        self.send_command(&AtCommand::Band(freq).to_string())
    }
    fn set_address(&mut self, address: u16) -> Result<String> {
        self.send_command(&AtCommand::Address(address).to_string())
    }
    fn set_network_id(&mut self, id: u8) -> Result<String> {
        self.send_command(&AtCommand::NetworkId(id).to_string())
    }
    /// Set RF output power in dBm.
    fn set_rf_power(&mut self, dbm: u8) -> Result<String> {
        self.send_command(&AtCommand::RfPower(dbm).to_string())
    }

    /// Send every command of `config` once, in order, logging each answer.
    ///
    /// Responses are not inspected, a rejected command does not stop the
    /// sequence. Write failures and response timeouts do.
    fn configure(&mut self, config: &ModemConfig) -> Result<Vec<CommandResponse>> {
        let mut results = Vec::new();
        for cmd in config.commands() {
            let command = cmd.to_string();
            let response = self.send_command(&command)?;
            info!("'{}' ran, result: '{}'", command, response);
            results.push(CommandResponse { command, response });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        sent: Vec<String>,
    }

    impl RylrLoraDevice for Recorder {
        fn send_command(&mut self, cmd: &str) -> Result<String> {
            self.sent.push(cmd.to_string());
            // answer something different every time
            Ok(if self.sent.len() % 2 == 0 {
                "+ERR=4\r\n".to_string()
            } else {
                "+OK\r\n".to_string()
            })
        }
    }

    #[test]
    fn default_sequence_is_literal() {
        let cmds: Vec<String> = ModemConfig::default()
            .commands()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(
            cmds,
            vec![
                "AT+PARAMETER=10,2,1,7",
                "AT+BAND=432500000",
                "AT+ADDRESS=1",
                "AT+NETWORKID=6",
                "AT+CRFOP=15",
            ]
        );
    }

    #[test]
    fn configure_sends_in_order_regardless_of_responses() {
        let mut dev = Recorder { sent: Vec::new() };
        let results = dev.configure(&ModemConfig::default()).unwrap();

        assert_eq!(dev.sent.len(), 5);
        assert_eq!(dev.sent[0], "AT+PARAMETER=10,2,1,7");
        assert_eq!(dev.sent[4], "AT+CRFOP=15");
        assert_eq!(results[1].command, "AT+BAND=432500000");
        assert_eq!(results[1].response, "+ERR=4\r\n");
        assert_eq!(results[2].response, "+OK\r\n");
    }

    #[test]
    fn setters_render_commands() {
        let mut dev = Recorder { sent: Vec::new() };
        dev.set_band(902_300_000).unwrap();
        dev.set_address(120).unwrap();
        dev.set_parameters(RadioParameters {
            spreading_factor: 12,
            bandwidth: 7,
            coding_rate: 4,
            preamble: 4,
        })
        .unwrap();
        assert_eq!(
            dev.sent,
            vec!["AT+BAND=902300000", "AT+ADDRESS=120", "AT+PARAMETER=12,7,4,4"]
        );
    }
}
