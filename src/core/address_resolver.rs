//! Turns raw target and exclusion specifications into a concrete set of addresses.
//!
//! A specification line holds comma-separated tokens. Each token is either a literal
//! (a hostname, a URL) or IP notation: a single address, a CIDR network, a dash range
//! (`10.0.0.1-5`) or a glob (`10.0.*.1`). Targets and exclusions are resolved by the very
//! same function, so an exclusion always matches the spelling its target resolved to.

use cidr_utils::cidr::{IpCidr, IpInet};
use itertools::Itertools;
use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::str::FromStr;
use thiserror::Error;

/// The resolved, de-duplicated address set.
pub type AddressSet = BTreeSet<String>;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum AddressError {
    #[error("No targets remain after applying exclusions.")]
    EmptyTargetSet,
    #[error("'{token}' is not a valid CIDR network: {reason}")]
    InvalidCidr { token: String, reason: String },
    #[error("'{0}' is not a valid address range. Expected e.g. 10.0.0.1-5 or 10.0.0.1-10.0.0.5.")]
    InvalidRange(String),
    #[error("'{0}' is not a valid IPv4 glob. Expected four octets of numbers, ranges or '*'.")]
    InvalidGlob(String),
}

/// Resolves targets, subtracts the equivalently-resolved exclusions and fails if nothing remains.
///
/// ```rust
/// # use interweave::core::address_resolver::resolve;
/// let targets = resolve(&["10.0.0.0/30"], &["10.0.0.2"], true).unwrap();
/// assert_eq!(targets.len(), 3);
/// ```
pub fn resolve<S: AsRef<str>>(
    target_specs: &[S],
    exclusion_specs: &[S],
    allow_cidr_expansion: bool,
) -> Result<AddressSet, AddressError> {
    let targets = expand_specs(target_specs, allow_cidr_expansion)?;
    let exclusions = expand_specs(exclusion_specs, allow_cidr_expansion)?;
    log::debug!(
        "Resolved {} target(s) and {} exclusion(s).",
        targets.len(),
        exclusions.len()
    );

    let remaining: AddressSet = targets.difference(&exclusions).cloned().collect();
    if remaining.is_empty() {
        return Err(AddressError::EmptyTargetSet);
    }
    Ok(remaining)
}

/// Expands every token of every specification line and unions the results.
pub fn expand_specs<S: AsRef<str>>(
    specs: &[S],
    allow_cidr_expansion: bool,
) -> Result<AddressSet, AddressError> {
    let mut addresses = AddressSet::new();
    for spec in specs {
        for token in tokenize(spec.as_ref()) {
            addresses.extend(expand_token(&token, allow_cidr_expansion)?);
        }
    }
    Ok(addresses)
}

/// Strips all whitespace and splits on commas, dropping empty tokens.
fn tokenize(spec: &str) -> Vec<String> {
    let compact: String = spec.chars().filter(|c| !c.is_whitespace()).collect();
    compact
        .split(',')
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// A token is a literal when it is a URL, or when its last dot-separated segment starts
/// with a letter (`example.com`, `host.local/path`). Everything else is IP notation.
pub fn is_literal(token: &str) -> bool {
    token.contains("://")
        || token
            .rsplit('.')
            .next()
            .and_then(|segment| segment.chars().next())
            .is_some_and(|c| c.is_ascii_alphabetic())
}

fn expand_token(token: &str, allow_cidr_expansion: bool) -> Result<Vec<String>, AddressError> {
    // Classification first: domain names must never reach the IP parsers.
    if is_literal(token) {
        return Ok(vec![token.to_string()]);
    }

    if token.contains('/') {
        if allow_cidr_expansion {
            return expand_cidr(token);
        }
        return Ok(vec![token.to_string()]);
    }
    if token.contains('*') {
        return expand_glob(token);
    }
    if token.contains('-') {
        return expand_dash_range(token);
    }
    Ok(vec![token.to_string()])
}

fn expand_cidr(token: &str) -> Result<Vec<String>, AddressError> {
    let network = match IpCidr::from_str(token) {
        Ok(cidr) => cidr,
        // `10.0.0.1/30` has host bits set; expand the network that contains it.
        Err(strict_err) => IpInet::from_str(token)
            .map(|inet| inet.network())
            .map_err(|_| AddressError::InvalidCidr {
                token: token.to_string(),
                reason: strict_err.to_string(),
            })?,
    };
    Ok(network
        .iter()
        .map(|inet| inet.address().to_string())
        .collect())
}

/// `a.b.c.x-y` replaces only the final octet; `a.b.c.x-e.f.g.h` spans up to a full address.
fn expand_dash_range(token: &str) -> Result<Vec<String>, AddressError> {
    let invalid = || AddressError::InvalidRange(token.to_string());

    let (start_part, end_part) = token.split_once('-').ok_or_else(invalid)?;
    let start = Ipv4Addr::from_str(start_part).map_err(|_| invalid())?;

    let end = match Ipv4Addr::from_str(end_part) {
        Ok(full) => full,
        Err(_) => {
            let last_octet = u8::from_str(end_part).map_err(|_| invalid())?;
            let [a, b, c, _] = start.octets();
            Ipv4Addr::new(a, b, c, last_octet)
        }
    };

    let (first, last) = (u32::from(start), u32::from(end));
    if first > last {
        return Err(invalid());
    }
    Ok((first..=last)
        .map(|raw| Ipv4Addr::from(raw).to_string())
        .collect())
}

/// Each octet is `*` (0-255), `a-b` or a single number.
fn expand_glob(token: &str) -> Result<Vec<String>, AddressError> {
    let invalid = || AddressError::InvalidGlob(token.to_string());

    let octets: Vec<Vec<u8>> = token
        .split('.')
        .map(|octet| parse_glob_octet(octet).ok_or_else(invalid))
        .collect::<Result<_, _>>()?;
    if octets.len() != 4 {
        return Err(invalid());
    }

    Ok(octets
        .into_iter()
        .multi_cartesian_product()
        .map(|parts| parts.iter().join("."))
        .collect())
}

fn parse_glob_octet(octet: &str) -> Option<Vec<u8>> {
    if octet == "*" {
        return Some((0..=u8::MAX).collect());
    }
    if let Some((low, high)) = octet.split_once('-') {
        let (low, high) = (u8::from_str(low).ok()?, u8::from_str(high).ok()?);
        return (low <= high).then(|| (low..=high).collect());
    }
    u8::from_str(octet).ok().map(|single| vec![single])
}
