//! RouterOS CLI command text
//!
//! Read commands are fixed strings. Mutations are assembled from validated
//! arguments only; anything that could break out of a token or a quoted
//! string is rejected before it reaches the device.

use std::net::Ipv4Addr;
use std::sync::LazyLock;

use regex::Regex;

use crate::session::{SessionError, SessionResult};

pub const SYSTEM_RESOURCE: &str = "/system resource print";
pub const DHCP_LEASES: &str = "/ip dhcp-server lease print detail";
pub const SIMPLE_QUEUES: &str = "/queue simple print detail";
pub const INTERFACES: &str = "/interface print detail";
pub const FIREWALL_FILTER: &str = "/ip firewall filter print detail";
pub const WIRELESS_INTERFACES: &str = "/interface wireless print detail";
pub const WIRELESS_REGISTRATIONS: &str = "/interface wireless registration-table print detail";

static MAC_ADDRESS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9A-Fa-f]{2}(:[0-9A-Fa-f]{2}){5}$").expect("valid MAC pattern")
});

static BARE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._:/,-]+$").expect("valid token pattern"));

fn ipv4(field: &str, value: &str) -> SessionResult<Ipv4Addr> {
    value
        .trim()
        .parse()
        .map_err(|_| SessionError::InvalidArgument(format!("{field}: `{value}` is not an IPv4 address")))
}

fn mac(value: &str) -> SessionResult<String> {
    let value = value.trim();
    if MAC_ADDRESS.is_match(value) {
        Ok(value.to_ascii_uppercase())
    } else {
        Err(SessionError::InvalidArgument(format!(
            "mac-address: `{value}` is not of the form XX:XX:XX:XX:XX:XX"
        )))
    }
}

fn token<'a>(field: &str, value: &'a str) -> SessionResult<&'a str> {
    let value = value.trim();
    if BARE_TOKEN.is_match(value) {
        Ok(value)
    } else {
        Err(SessionError::InvalidArgument(format!(
            "{field}: `{value}` contains characters not allowed in a bare value"
        )))
    }
}

/// Text that will be placed inside double quotes
fn quoted<'a>(field: &str, value: &'a str) -> SessionResult<&'a str> {
    let bad = value
        .chars()
        .any(|c| c == '"' || c == '\\' || c == '$' || c.is_control());
    if bad {
        return Err(SessionError::InvalidArgument(format!(
            "{field}: quotes, backslashes, `$` and control characters are not allowed"
        )));
    }
    Ok(value)
}

fn non_empty<'a>(field: &str, value: &'a str) -> SessionResult<&'a str> {
    if value.trim().is_empty() {
        return Err(SessionError::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(value)
}

fn push_comment(cmd: &mut String, comment: Option<&str>) -> SessionResult<()> {
    if let Some(comment) = comment.filter(|c| !c.is_empty()) {
        cmd.push_str(&format!(" comment=\"{}\"", quoted("comment", comment)?));
    }
    Ok(())
}

pub fn add_dhcp_lease(address: &str, mac_address: &str, comment: Option<&str>) -> SessionResult<String> {
    let address = ipv4("address", address)?;
    let mac_address = mac(mac_address)?;
    let mut cmd = format!("/ip dhcp-server lease add address={address} mac-address={mac_address}");
    push_comment(&mut cmd, comment)?;
    Ok(cmd)
}

pub fn remove_dhcp_lease(address: &str) -> SessionResult<String> {
    let address = ipv4("address", address)?;
    Ok(format!("/ip dhcp-server lease remove [find address={address}]"))
}

pub fn add_queue(name: &str, target: &str, max_limit: &str, comment: Option<&str>) -> SessionResult<String> {
    let name = quoted("name", non_empty("name", name)?)?;
    let target = token("target", target)?;
    let max_limit = token("max-limit", max_limit)?;
    let mut cmd = format!("/queue simple add name=\"{name}\" target={target} max-limit={max_limit}");
    push_comment(&mut cmd, comment)?;
    Ok(cmd)
}

pub fn remove_queue(name: &str) -> SessionResult<String> {
    let name = quoted("name", non_empty("name", name)?)?;
    Ok(format!("/queue simple remove [find name=\"{name}\"]"))
}

pub fn set_interface_mtu(name: &str, mtu: u32) -> SessionResult<String> {
    let name = quoted("name", non_empty("name", name)?)?;
    if !(68..=65535).contains(&mtu) {
        return Err(SessionError::InvalidArgument(format!(
            "mtu: {mtu} is outside 68..=65535"
        )));
    }
    Ok(format!("/interface set [find name=\"{name}\"] mtu={mtu}"))
}

/// Arguments for a new firewall filter rule
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct FirewallRuleSpec {
    pub chain: String,
    pub action: String,
    pub protocol: String,
    pub src_address: Option<String>,
    pub dst_address: Option<String>,
    pub src_port: Option<String>,
    pub dst_port: Option<String>,
    pub comment: Option<String>,
}

pub fn add_firewall_rule(rule: &FirewallRuleSpec) -> SessionResult<String> {
    let mut cmd = format!(
        "/ip firewall filter add chain={} action={} protocol={}",
        token("chain", &rule.chain)?,
        token("action", &rule.action)?,
        token("protocol", &rule.protocol)?,
    );

    let optional = [
        ("src-address", &rule.src_address),
        ("dst-address", &rule.dst_address),
        ("src-port", &rule.src_port),
        ("dst-port", &rule.dst_port),
    ];
    for (field, value) in optional {
        if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
            cmd.push_str(&format!(" {field}={}", token(field, value)?));
        }
    }

    push_comment(&mut cmd, rule.comment.as_deref())?;
    Ok(cmd)
}
