//! Command translation: brightness/Kelvin requests to mesh commands

use matter_client::{DeviceCommand, MeshClient};

use crate::alias::AliasRegistry;
use crate::error::{Error, Result};
use crate::model::DeviceId;

/// Resolve an identifier (alias or canonical id) and issue the commands a
/// brightness and/or color-temperature request implies.
///
/// - brightness `0.0` turns the device off - no level command is sent
/// - brightness above zero maps to a raw level of `max(1, round(b * 254))`;
///   the move-to-level command implies power-on, so no separate on command
/// - `temperature_kelvin` maps back to mireds via `round(1_000_000 / K)`
///
/// Requires an established mesh connection ([`Error::NotReady`] otherwise).
/// Mesh failures are passed through verbatim; the bridge cannot interpret
/// protocol-level faults.
pub async fn resolve_and_send(
    client: &dyn MeshClient,
    aliases: &AliasRegistry,
    identifier: &str,
    brightness: Option<f64>,
    temperature_kelvin: Option<u32>,
) -> Result<DeviceId> {
    if !client.is_connected() {
        return Err(Error::NotReady);
    }

    let resolved = aliases.resolve(identifier);
    let id: DeviceId = resolved
        .parse()
        .map_err(|_| Error::MalformedIdentifier(resolved.clone()))?;

    if let Some(b) = brightness {
        let command = brightness_command(b);
        tracing::info!("sending {command:?} to {id}");
        client
            .send_device_command(id.node_id, id.endpoint_id, command)
            .await?;
    }

    if let Some(kelvin) = temperature_kelvin {
        if let Some(mireds) = kelvin_to_mireds(kelvin) {
            let command = DeviceCommand::MoveToColorTemperature { mireds };
            tracing::info!("sending {command:?} to {id}");
            client
                .send_device_command(id.node_id, id.endpoint_id, command)
                .await?;
        }
    }

    Ok(id)
}

/// Map a normalized brightness to the command it implies.
fn brightness_command(brightness: f64) -> DeviceCommand {
    if brightness <= 0.0 {
        return DeviceCommand::Off;
    }
    let level = (brightness.min(1.0) * 254.0).round().max(1.0) as u8;
    DeviceCommand::MoveToLevel { level }
}

/// Mireds from Kelvin; a non-positive Kelvin has no mired representation.
fn kelvin_to_mireds(kelvin: u32) -> Option<u16> {
    if kelvin == 0 {
        return None;
    }
    Some((1_000_000.0 / kelvin as f64).round().min(u16::MAX as f64) as u16)
}
