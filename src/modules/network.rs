//! Static IPv4 and DNS configuration
//!
//! Devices are configured in list order. DNS servers land on the first
//! connected interface, primary first, the rest appended in order.
//! Any failing verb stops the pass; earlier steps stay applied.

use crate::config::NetworkConfig;
use crate::control::ControlPlane;
use crate::error::NetworkApplyError;
use serde::Serialize;
use tracing::{debug, info};

/// Metric given to every default route
pub const GATEWAY_METRIC: u32 = 1;

/// What a network pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NetworkSummary {
    /// Interfaces given a static address, in order
    pub devices: Vec<String>,
    /// Interfaces given a default gateway
    pub gateways: Vec<String>,
    /// Interface that received the DNS servers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_interface: Option<String>,
    pub nameservers: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

/// Apply a network section through `control`
pub fn apply(
    net: &NetworkConfig,
    control: &dyn ControlPlane,
) -> Result<NetworkSummary, NetworkApplyError> {
    info!(
        "Applying network config v{} ({} devices, {} nameservers)",
        net.version,
        net.config.len(),
        net.nameservers.len()
    );

    let mut summary = NetworkSummary::default();

    for (index, device) in net.config.iter().enumerate() {
        if device.name.trim().is_empty() {
            return Err(NetworkApplyError::IncompleteDevice {
                index,
                field: "name",
            });
        }
        if device.address.trim().is_empty() {
            return Err(NetworkApplyError::IncompleteDevice {
                index,
                field: "address",
            });
        }

        control
            .set_static_address(&device.name, &device.address, &device.netmask)
            .map_err(|source| NetworkApplyError::Address {
                device: device.name.clone(),
                address: device.address.clone(),
                netmask: device.netmask.clone(),
                source,
            })?;
        info!(
            "Set {} address to {}/{}",
            device.name, device.address, device.netmask
        );
        summary.devices.push(device.name.clone());

        match device.gateway() {
            Some(gateway) => {
                control
                    .set_gateway(&device.name, gateway, GATEWAY_METRIC)
                    .map_err(|source| NetworkApplyError::Gateway {
                        device: device.name.clone(),
                        gateway: gateway.to_string(),
                        source,
                    })?;
                info!("Set {} default gateway to {}", device.name, gateway);
                summary.gateways.push(device.name.clone());
            }
            None => debug!("No gateway for {}", device.name),
        }
    }

    let nameservers = unique_servers(&net.nameservers);
    if !nameservers.is_empty() {
        let interface = active_interface(control)?;
        apply_dns(&interface, &nameservers, control)?;
        summary.dns_interface = Some(interface);
        summary.nameservers = nameservers;
    }

    if !net.domain.is_empty() {
        info!("DNS search domain: {}", net.domain);
        summary.domain = Some(net.domain.clone());
    }

    Ok(summary)
}

/// Nameservers in list order, blanks and repeats dropped
fn unique_servers(servers: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(servers.len());
    for server in servers.iter().map(|s| s.trim()).filter(|s| !s.is_empty()) {
        if unique.iter().any(|u| u == server) {
            debug!("Dropping repeated nameserver {}", server);
        } else {
            unique.push(server.to_string());
        }
    }
    unique
}

/// First interface reporting a connected state
fn active_interface(control: &dyn ControlPlane) -> Result<String, NetworkApplyError> {
    let interfaces = control
        .list_interfaces()
        .map_err(NetworkApplyError::ListInterfaces)?;

    interfaces
        .into_iter()
        .find(|i| i.connected)
        .map(|i| i.name)
        .ok_or(NetworkApplyError::NoActiveInterface)
}

fn apply_dns(
    interface: &str,
    servers: &[String],
    control: &dyn ControlPlane,
) -> Result<(), NetworkApplyError> {
    let Some((primary, secondary)) = servers.split_first() else {
        return Ok(());
    };

    control
        .set_primary_dns(interface, primary)
        .map_err(|source| NetworkApplyError::PrimaryDns {
            interface: interface.to_string(),
            server: primary.clone(),
            source,
        })?;

    for server in secondary {
        control
            .add_secondary_dns(interface, server)
            .map_err(|source| NetworkApplyError::SecondaryDns {
                interface: interface.to_string(),
                server: server.clone(),
                source,
            })?;
    }

    info!("Set DNS servers on {}: {:?}", interface, servers);
    Ok(())
}
