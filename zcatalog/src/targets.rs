//! Remote catalog descriptors.

use crate::error::{LocalError, LocalResult};

use marcrec::Profile;

use std::collections::HashMap;
use std::str::FromStr;

/// How a remote target serves its records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecordEncoding {
    #[default]
    Marc21,
    Unimarc,
    Cnmarc,
    Sutrs,
}

impl RecordEncoding {
    /// The record syntax OID to request from this target.
    pub fn syntax_oid(self) -> &'static [u32] {
        match self {
            Self::Marc21 => z3950::oid::MARC21,
            // CNMARC targets speak the UNIMARC syntax on the wire.
            Self::Unimarc | Self::Cnmarc => z3950::oid::UNIMARC,
            Self::Sutrs => z3950::oid::SUTRS,
        }
    }

    /// The profile for reading returned records; None for plain text.
    pub fn profile(self) -> Option<Profile> {
        match self {
            Self::Marc21 => Some(Profile::Marc21),
            Self::Unimarc => Some(Profile::Unimarc),
            Self::Cnmarc => Some(Profile::Cnmarc),
            Self::Sutrs => None,
        }
    }
}

impl FromStr for RecordEncoding {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "MARC21" | "USMARC" => Ok(Self::Marc21),
            "UNIMARC" => Ok(Self::Unimarc),
            "CNMARC" => Ok(Self::Cnmarc),
            "SUTRS" => Ok(Self::Sutrs),
            _ => Err(format!("Unknown record encoding: {s}")),
        }
    }
}

impl std::fmt::Display for RecordEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Marc21 => write!(f, "MARC21"),
            Self::Unimarc => write!(f, "UNIMARC"),
            Self::Cnmarc => write!(f, "CNMARC"),
            Self::Sutrs => write!(f, "SUTRS"),
        }
    }
}

/// A remote Z39.50 catalog.  Lifetime-independent of any session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub host: String,
    pub port: u16,
    pub database_name: String,
    pub encoding: RecordEncoding,
    pub auth: Option<(String, String)>,
}

impl Target {
    pub fn new(name: &str, host: &str, port: u16, database_name: &str) -> Self {
        Target {
            name: name.to_string(),
            host: host.to_string(),
            port,
            database_name: database_name.to_string(),
            encoding: RecordEncoding::default(),
            auth: None,
        }
    }

    /// Assemble a target from `targets` table columns.
    pub fn from_columns(
        name: String,
        host: String,
        port: u16,
        database_name: String,
        encoding: &str,
        auth_user: Option<String>,
        auth_pass: Option<String>,
    ) -> LocalResult<Self> {
        let encoding = RecordEncoding::from_str(encoding).map_err(LocalError::Backend)?;

        let auth = match (auth_user, auth_pass) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        };

        Ok(Target {
            name,
            host,
            port,
            database_name,
            encoding,
            auth,
        })
    }

    /// Open-form credentials for the InitializeRequest.
    pub fn open_auth(&self) -> Option<String> {
        self.auth
            .as_ref()
            .map(|(user, pass)| format!("{user}/{pass}"))
    }
}

/// Named collection of targets.
#[derive(Debug, Clone, Default)]
pub struct TargetRegistry {
    targets: HashMap<String, Target>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_targets(targets: Vec<Target>) -> Self {
        let mut registry = Self::new();
        for target in targets {
            registry.add(target);
        }
        registry
    }

    pub fn add(&mut self, target: Target) {
        self.targets.insert(target.name.clone(), target);
    }

    pub fn get(&self, name: &str) -> Option<&Target> {
        self.targets.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.targets.keys().map(|k| k.as_str()).collect();
        names.sort();
        names
    }
}
