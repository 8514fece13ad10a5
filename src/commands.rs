//! Common commands
//!
//! Ready-made [`Command`]s for the menus the management application reads
//! most. Anything else is built with [`Command::new`] or [`Command::parse`].

use crate::protocol::Command;

/// `/system/identity/print`
pub fn identity() -> Command {
    Command::new("/system/identity/print")
}

/// `/system/resource/print`
pub fn resource() -> Command {
    Command::new("/system/resource/print")
}

/// `/interface/print`
pub fn interfaces() -> Command {
    Command::new("/interface/print")
}

/// `/interface/print` filtered to one interface
pub fn interface(name: &str) -> Command {
    interfaces().query(format!("name={}", name))
}

/// `/ip/arp/print`
pub fn arp_table() -> Command {
    Command::new("/ip/arp/print")
}

/// `/ip/dhcp-server/lease/print`
pub fn dhcp_leases() -> Command {
    Command::new("/ip/dhcp-server/lease/print")
}

/// `/ip/dhcp-server/network/print`
pub fn dhcp_networks() -> Command {
    Command::new("/ip/dhcp-server/network/print")
}

/// `/ip/dhcp-server/print`
pub fn dhcp_servers() -> Command {
    Command::new("/ip/dhcp-server/print")
}

/// `/ip/address/print`
pub fn addresses() -> Command {
    Command::new("/ip/address/print")
}

/// ICMP ping from the device; one `!re` per probe
pub fn ping(address: &str, count: u32) -> Command {
    Command::new("/ping")
        .attribute("address", address)
        .attribute("count", count.to_string())
}

/// ARP ping out of `interface`
pub fn arp_ping(address: &str, interface: &str, count: u32) -> Command {
    ping(address, count)
        .attribute("arp-ping", "yes")
        .attribute("interface", interface)
}
