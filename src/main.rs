use anyhow::Context;
use log::{error, info};

use rylrmodem::{
    log_available_ports, DeviceLocator, ModemConfig, ModemSettings, RylrLoraDevice, RylrModem,
};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let locator = DeviceLocator::for_current_platform();
    let device = match locator.locate() {
        Ok(device) => device,
        Err(e) => {
            error!("{}", e);
            log_available_ports();
            return Err(e).context("Couldn't locate the LoRa radio module");
        }
    };
    info!("using LoRa radio module at {}", device);

    let mut modem = RylrModem::open(&device, ModemSettings::default())?;
    modem
        .configure(&ModemConfig::default())
        .with_context(|| format!("Failed to configure modem at {}", device))?;

    info!("modem at {} configured", modem.device());
    Ok(())
}
