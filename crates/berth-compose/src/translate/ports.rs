//! Port declarations to port bindings.
//!
//! Short syntax: `[host_ip:][host_port:]container_port[/protocol]`, where
//! either port may be a `start-end` range and an IPv6 host IP is written in
//! brackets. Long syntax: `{target, published, protocol, host_ip}`.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use berth_common::error::{BerthError, Result};
use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::parser::value::scalar_to_string;

/// Transport protocol of a binding.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// TCP (default).
    #[default]
    Tcp,
    /// UDP.
    Udp,
    /// SCTP.
    Sctp,
}

impl Protocol {
    /// Lowercase protocol name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Udp => "udp",
            Self::Sctp => "sctp",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = BerthError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tcp" => Ok(Self::Tcp),
            "udp" => Ok(Self::Udp),
            "sctp" => Ok(Self::Sctp),
            other => Err(BerthError::invalid_field(
                "ports",
                format!("unknown protocol \"{other}\""),
            )),
        }
    }
}

/// A normalized port binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortBinding {
    /// Port inside the container.
    pub container_port: u16,
    /// Transport protocol.
    pub protocol: Protocol,
    /// Host interface to bind, all interfaces when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_ip: Option<String>,
    /// Host port, auto-assigned when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port: Option<u16>,
    /// Last port of a host range the runtime picks a free port from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_port_end: Option<u16>,
}

impl PortBinding {
    /// Host side as written for the runtime: a port, a `start-end` range,
    /// or empty when auto-assigned.
    #[must_use]
    pub fn host_port_spec(&self) -> String {
        match (self.host_port, self.host_port_end) {
            (Some(start), Some(end)) => format!("{start}-{end}"),
            (Some(port), None) => port.to_string(),
            (None, _) => String::new(),
        }
    }
}

/// One host side of a published port, in the runtime's string form.
/// Empty strings mean "any interface" and "auto-assigned".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HostBinding {
    /// Host interface.
    pub host_ip: String,
    /// Host port.
    pub host_port: String,
}

/// Translates all port declarations of one service.
///
/// # Errors
///
/// Returns an error for the first malformed declaration.
pub fn translate_ports(declarations: &[Value]) -> Result<Vec<PortBinding>> {
    let mut bindings = Vec::new();
    for declaration in declarations {
        match declaration {
            Value::Number(n) => {
                let port = n.as_u64().and_then(|p| u16::try_from(p).ok()).ok_or_else(|| {
                    BerthError::invalid_field("ports", format!("{n} is not a valid port"))
                })?;
                bindings.push(PortBinding {
                    container_port: port,
                    protocol: Protocol::Tcp,
                    host_ip: None,
                    host_port: None,
                    host_port_end: None,
                });
            }
            Value::String(spec) => bindings.extend(parse_short(spec)?),
            Value::Mapping(long) => bindings.extend(parse_long(long)?),
            _ => {
                return Err(BerthError::invalid_field(
                    "ports",
                    "entries must be numbers, strings or mappings",
                ));
            }
        }
    }
    Ok(bindings)
}

/// Folds bindings into a `"<port>/<proto>"` keyed map.
pub fn port_map(bindings: &[PortBinding]) -> BTreeMap<String, Vec<HostBinding>> {
    let mut map: BTreeMap<String, Vec<HostBinding>> = BTreeMap::new();
    for binding in bindings {
        map.entry(format!("{}/{}", binding.container_port, binding.protocol))
            .or_default()
            .push(HostBinding {
                host_ip: binding.host_ip.clone().unwrap_or_default(),
                host_port: binding.host_port_spec(),
            });
    }
    map
}

fn parse_short(spec: &str) -> Result<Vec<PortBinding>> {
    let invalid = |message: &str| BerthError::invalid_field("ports", format!("\"{spec}\": {message}"));

    let (addr, protocol) = match spec.rsplit_once('/') {
        Some((addr, proto)) => (addr, proto.parse::<Protocol>()?),
        None => (spec, Protocol::Tcp),
    };

    let (host_ip, rest) = if let Some(bracketed) = addr.strip_prefix('[') {
        let (ip, rest) = bracketed
            .split_once("]:")
            .ok_or_else(|| invalid("unterminated IPv6 address"))?;
        (Some(ip), Some(rest))
    } else {
        (None, None)
    };

    let parts: Vec<&str> = rest.unwrap_or(addr).split(':').collect();
    let (host_ip, host, container) = match (host_ip, parts.as_slice()) {
        (None, [container]) => (None, None, *container),
        (None, [host, container]) => (None, Some(*host), *container),
        (None, [ip, host, container]) => (Some(*ip), Some(*host), *container),
        (Some(ip), [host, container]) => (Some(ip), Some(*host), *container),
        (Some(ip), [container]) => (Some(ip), None, *container),
        _ => return Err(invalid("expected [ip:][host:]container")),
    };

    let host_ip = host_ip.filter(|ip| !ip.is_empty()).map(str::to_owned);
    let host = host.filter(|h| !h.is_empty()).map(parse_range).transpose()?;
    let container = parse_range(container)?;
    expand(container, host, host_ip, protocol).ok_or_else(|| invalid("port ranges differ in length"))
}

fn parse_long(long: &Mapping) -> Result<Vec<PortBinding>> {
    let target = long
        .get("target")
        .and_then(scalar_to_string)
        .ok_or_else(|| BerthError::invalid_field("ports", "long syntax requires a target"))?;
    let container = parse_range(&target)?;
    let host = long
        .get("published")
        .and_then(scalar_to_string)
        .filter(|p| !p.is_empty())
        .map(|p| parse_range(&p))
        .transpose()?;
    let protocol = long
        .get("protocol")
        .and_then(scalar_to_string)
        .map(|p| p.parse::<Protocol>())
        .transpose()?
        .unwrap_or_default();
    let host_ip = long
        .get("host_ip")
        .and_then(scalar_to_string)
        .filter(|ip| !ip.is_empty());
    expand(container, host, host_ip, protocol)
        .ok_or_else(|| BerthError::invalid_field("ports", format!("{target}: port ranges differ in length")))
}

type PortRange = (u16, u16);

fn parse_range(text: &str) -> Result<PortRange> {
    let port = |s: &str| {
        s.trim().parse::<u16>().map_err(|_| {
            BerthError::invalid_field("ports", format!("\"{text}\" is not a valid port or range"))
        })
    };
    let (start, end) = match text.split_once('-') {
        Some((start, end)) => (port(start)?, port(end)?),
        None => {
            let single = port(text)?;
            (single, single)
        }
    };
    if start > end {
        return Err(BerthError::invalid_field(
            "ports",
            format!("range \"{text}\" is reversed"),
        ));
    }
    Ok((start, end))
}

/// Pairs container and host ranges port by port. A missing host range
/// leaves every host port auto-assigned; a host range published to a
/// single container port lets the runtime pick any free port in it.
fn expand(
    container: PortRange,
    host: Option<PortRange>,
    host_ip: Option<String>,
    protocol: Protocol,
) -> Option<Vec<PortBinding>> {
    let len = container.1 - container.0;
    if let Some(host) = host {
        if len == 0 && host.1 > host.0 {
            return Some(vec![PortBinding {
                container_port: container.0,
                protocol,
                host_ip,
                host_port: Some(host.0),
                host_port_end: Some(host.1),
            }]);
        }
        if host.1 - host.0 != len {
            return None;
        }
    }
    Some(
        (0..=len)
            .map(|offset| PortBinding {
                container_port: container.0 + offset,
                protocol,
                host_ip: host_ip.clone(),
                host_port: host.map(|h| h.0 + offset),
                host_port_end: None,
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ports(text: &str) -> Vec<PortBinding> {
        let values: Vec<Value> = serde_yaml::from_str(text).expect("yaml");
        translate_ports(&values).expect("ports")
    }

    fn binding(container: u16, protocol: Protocol, ip: Option<&str>, host: Option<u16>) -> PortBinding {
        PortBinding {
            container_port: container,
            protocol,
            host_ip: ip.map(str::to_owned),
            host_port: host,
            host_port_end: None,
        }
    }

    #[test]
    fn ip_host_container_protocol() {
        assert_eq!(
            ports("[\"127.0.0.1:8080:80/udp\"]"),
            vec![binding(80, Protocol::Udp, Some("127.0.0.1"), Some(8080))]
        );
    }

    #[test]
    fn host_and_container() {
        assert_eq!(
            ports("[\"8080:80\"]"),
            vec![binding(80, Protocol::Tcp, None, Some(8080))]
        );
    }

    #[test]
    fn bare_container_port() {
        assert_eq!(
            ports("[\"3000\", 9000]"),
            vec![
                binding(3000, Protocol::Tcp, None, None),
                binding(9000, Protocol::Tcp, None, None),
            ]
        );
    }

    #[test]
    fn empty_host_port_is_auto() {
        assert_eq!(
            ports("[\"127.0.0.1::5432\"]"),
            vec![binding(5432, Protocol::Tcp, Some("127.0.0.1"), None)]
        );
    }

    #[test]
    fn bracketed_ipv6() {
        assert_eq!(
            ports("[\"[::1]:8080:80\"]"),
            vec![binding(80, Protocol::Tcp, Some("::1"), Some(8080))]
        );
    }

    #[test]
    fn ranges_expand_pairwise() {
        assert_eq!(
            ports("[\"8000-8001:80-81\"]"),
            vec![
                binding(80, Protocol::Tcp, None, Some(8000)),
                binding(81, Protocol::Tcp, None, Some(8001)),
            ]
        );
        assert_eq!(ports("[\"6000-6002\"]").len(), 3);
    }

    #[test]
    fn host_range_to_single_container_port() {
        let bound = ports("[\"8000-8010:80\", {target: 53, published: \"5300-5310\", protocol: udp}]");
        assert_eq!(bound.len(), 2);
        assert_eq!(bound[0].container_port, 80);
        assert_eq!((bound[0].host_port, bound[0].host_port_end), (Some(8000), Some(8010)));
        assert_eq!(bound[1].host_port_spec(), "5300-5310");
        assert_eq!(port_map(&bound)["80/tcp"][0].host_port, "8000-8010");
    }

    #[test]
    fn long_syntax() {
        assert_eq!(
            ports("[{target: 53, published: \"5353\", protocol: udp, host_ip: 0.0.0.0, mode: host}]"),
            vec![binding(53, Protocol::Udp, Some("0.0.0.0"), Some(5353))]
        );
    }

    #[test]
    fn malformed_ports_fail() {
        for bad in [
            "[\"a:b\"]",
            "[\"1:2:3:4\"]",
            "[\"80/quic\"]",
            "[\"8000-8002:80-81\"]",
            "[\"90-80\"]",
            "[\"70000\"]",
            "[\"[::1:80\"]",
            "[{published: 80}]",
        ] {
            let values: Vec<Value> = serde_yaml::from_str(bad).expect("yaml");
            assert!(translate_ports(&values).is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn port_map_groups_by_port_and_protocol() {
        let bindings = ports("[\"8080:80\", \"127.0.0.1:8081:80\", \"53/udp\"]");
        let map = port_map(&bindings);
        assert_eq!(map.len(), 2);
        assert_eq!(
            map["80/tcp"],
            vec![
                HostBinding {
                    host_ip: String::new(),
                    host_port: "8080".into()
                },
                HostBinding {
                    host_ip: "127.0.0.1".into(),
                    host_port: "8081".into()
                },
            ]
        );
        assert_eq!(map["53/udp"], vec![HostBinding::default()]);
    }
}
