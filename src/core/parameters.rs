// src/core/parameters.rs

//! Parsing of the value lists that feed the expansion pipeline: ports, real ports,
//! protocols, proxies and the `_random_` file.

use rand::seq::IndexedRandom;
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ParameterError {
    #[error("Invalid port '{0}'. Ports must be numbers between 1 and 65535.")]
    InvalidPort(String),
    #[error("Invalid port range '{0}'. The start port must be lower than the end port.")]
    InvalidPortRange(String),
    #[error("The {0} list is empty.")]
    EmptyList(&'static str),
    #[error("Could not read directory '{path}': {source}")]
    RandomDir {
        path: String,
        #[source]
        source: walkdir::Error,
    },
    #[error("Directory '{0}' contains no files to pick from.")]
    NoRandomCandidates(String),
}

/// Parses a port specification: a comma list (`80,443`), a dash range (`8000-8010`)
/// or a single port. Values are returned as text, ready for substitution.
pub fn parse_ports(spec: &str) -> Result<Vec<String>, ParameterError> {
    let spec = spec.trim();
    if spec.contains(',') {
        let ports = spec
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| parse_single_port(part).map(|port| port.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        if ports.is_empty() {
            return Err(ParameterError::EmptyList("port"));
        }
        return Ok(ports);
    }

    if let Some((start, end)) = spec.split_once('-') {
        let start = parse_single_port(start.trim())?;
        let end = parse_single_port(end.trim())?;
        if start >= end {
            return Err(ParameterError::InvalidPortRange(spec.to_string()));
        }
        return Ok((start..=end).map(|port| port.to_string()).collect());
    }

    Ok(vec![parse_single_port(spec)?.to_string()])
}

fn parse_single_port(text: &str) -> Result<u16, ParameterError> {
    match text.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ParameterError::InvalidPort(text.to_string())),
    }
}

/// Parses a comma-separated protocol list such as `http,https`.
pub fn parse_protocols(spec: &str) -> Result<Vec<String>, ParameterError> {
    let protocols: Vec<String> = spec
        .split(',')
        .map(str::trim)
        .filter(|proto| !proto.is_empty())
        .map(str::to_string)
        .collect();
    if protocols.is_empty() {
        return Err(ParameterError::EmptyList("protocol"));
    }
    Ok(protocols)
}

/// Collects proxy addresses from the lines of a proxy list, skipping blanks.
pub fn parse_proxies<S: AsRef<str>>(lines: &[S]) -> Result<Vec<String>, ParameterError> {
    let proxies: Vec<String> = lines
        .iter()
        .map(|line| line.as_ref().trim())
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();
    if proxies.is_empty() {
        return Err(ParameterError::EmptyList("proxy"));
    }
    Ok(proxies)
}

/// Picks one regular file directly inside `dir`, uniformly at random.
pub fn pick_random_file(dir: &Path) -> Result<String, ParameterError> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|source| ParameterError::RandomDir {
            path: dir.display().to_string(),
            source,
        })?;
        if entry.file_type().is_file() {
            candidates.push(entry.path().display().to_string());
        }
    }

    let picked = candidates
        .choose(&mut rand::rng())
        .cloned()
        .ok_or_else(|| ParameterError::NoRandomCandidates(dir.display().to_string()))?;
    log::debug!("Picked '{}' for _random_ out of {} file(s).", picked, candidates.len());
    Ok(picked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_port_list() {
        assert_eq!(parse_ports("80, 443,8080").unwrap(), ["80", "443", "8080"]);
    }

    #[test]
    fn test_parse_port_range_is_inclusive() {
        assert_eq!(parse_ports("8000-8003").unwrap(), ["8000", "8001", "8002", "8003"]);
    }

    #[test]
    fn test_parse_single_port() {
        assert_eq!(parse_ports(" 22 ").unwrap(), ["22"]);
    }

    #[test]
    fn test_port_range_requires_start_below_end() {
        assert!(matches!(
            parse_ports("443-80"),
            Err(ParameterError::InvalidPortRange(_))
        ));
        assert!(matches!(
            parse_ports("80-80"),
            Err(ParameterError::InvalidPortRange(_))
        ));
    }

    #[test]
    fn test_invalid_port_values() {
        assert!(matches!(parse_ports("0"), Err(ParameterError::InvalidPort(_))));
        assert!(matches!(parse_ports("http"), Err(ParameterError::InvalidPort(_))));
        assert!(matches!(parse_ports("80,70000"), Err(ParameterError::InvalidPort(_))));
        assert!(matches!(parse_ports(","), Err(ParameterError::EmptyList(_))));
    }

    #[test]
    fn test_parse_protocols_and_proxies() {
        assert_eq!(parse_protocols("http, https").unwrap(), ["http", "https"]);
        assert!(parse_protocols(" , ").is_err());

        let proxies = parse_proxies(&["socks5://127.0.0.1:9050", "", "  http://proxy:3128 "]).unwrap();
        assert_eq!(proxies, ["socks5://127.0.0.1:9050", "http://proxy:3128"]);
        assert!(parse_proxies::<&str>(&[]).is_err());
    }

    #[test]
    fn test_pick_random_file_only_picks_files() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("deep.txt"), "x").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();

        for _ in 0..10 {
            let picked = pick_random_file(dir.path()).unwrap();
            assert!(picked.ends_with("a.txt") || picked.ends_with("b.txt"), "{picked}");
        }
    }

    #[test]
    fn test_pick_random_file_from_empty_dir_fails() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            pick_random_file(dir.path()),
            Err(ParameterError::NoRandomCandidates(_))
        ));
    }
}
