//! Environment-driven server configuration.

use ipnet::IpNet;
use marcrec::Profile;

use std::env;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::OnceLock;

static CONFIG: OnceLock<Config> = OnceLock::new();

pub const DEFAULT_PORT: u16 = 2100;
pub const DEFAULT_BIND: &str = "0.0.0.0";

pub fn global() -> &'static Config {
    CONFIG.get_or_init(Config::default)
}

/// Server configuration.
///
/// Sourced from the environment:
///
/// * `ZSERVER_PORT` — listen port (default 2100)
/// * `ZSERVER_BIND` — bind address (default 0.0.0.0)
/// * `ZSERVER_ALLOWED_IPS` — comma-separated CIDR list; empty allows all
/// * `ZSERVER_MARC_FORMAT` — `USMARC|MARC21|UNIMARC|CNMARC`
/// * `ZSERVER_DATABASE` — SQLite path or `postgres://` URL; unset runs
///   the built-in memory catalog
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub allowed_ips: Vec<IpNet>,
    pub default_profile: Profile,
    pub database: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            allowed_ips: Vec::new(),
            default_profile: Profile::Marc21,
            database: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Config, String> {
        let mut conf = Config::default();

        if let Ok(v) = env::var("ZSERVER_PORT") {
            conf.port = v
                .parse::<u16>()
                .map_err(|e| format!("Invalid ZSERVER_PORT value {v}: {e}"))?;
        }

        if let Ok(v) = env::var("ZSERVER_BIND") {
            conf.bind = v;
        }

        if let Ok(v) = env::var("ZSERVER_ALLOWED_IPS") {
            conf.allowed_ips = parse_cidr_list(&v)?;
        }

        if let Ok(v) = env::var("ZSERVER_MARC_FORMAT") {
            conf.default_profile = Profile::from_str(&v)?;
        }

        if let Ok(v) = env::var("ZSERVER_DATABASE") {
            if !v.is_empty() {
                conf.database = Some(v);
            }
        }

        Ok(conf)
    }

    pub fn apply(self) {
        if CONFIG.set(self).is_err() {
            panic!("Global Config already applied");
        }
    }
}

/// Parse a comma-separated CIDR list.  Bare addresses are accepted as
/// single-host networks.
fn parse_cidr_list(list: &str) -> Result<Vec<IpNet>, String> {
    let mut nets = Vec::new();

    for entry in list.split(',') {
        let entry = entry.trim();
        if entry.is_empty() {
            continue;
        }

        let net = entry.parse::<IpNet>().or_else(|_| {
            entry
                .parse::<IpAddr>()
                .map(IpNet::from)
                .map_err(|e| format!("Invalid CIDR entry {entry}: {e}"))
        })?;

        nets.push(net);
    }

    Ok(nets)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cidr_list() {
        let nets = parse_cidr_list("10.0.0.0/8, 192.168.1.17, ::1/128").unwrap();
        assert_eq!(nets.len(), 3);

        assert!(nets[0].contains(&"10.1.2.3".parse::<IpAddr>().unwrap()));
        assert!(!nets[0].contains(&"11.1.2.3".parse::<IpAddr>().unwrap()));
        assert!(nets[1].contains(&"192.168.1.17".parse::<IpAddr>().unwrap()));

        assert!(parse_cidr_list("").unwrap().is_empty());
        assert!(parse_cidr_list("not-an-ip").is_err());
    }
}
