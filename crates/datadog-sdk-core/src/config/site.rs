// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Datadog site the SDK reports to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Site {
    #[default]
    Us1,
    Us3,
    Us5,
    Eu1,
    Ap1,
    Ap2,
    Us1Fed,
}

impl Site {
    pub fn domain(&self) -> &'static str {
        match self {
            Site::Us1 => "datadoghq.com",
            Site::Us3 => "us3.datadoghq.com",
            Site::Us5 => "us5.datadoghq.com",
            Site::Eu1 => "datadoghq.eu",
            Site::Ap1 => "ap1.datadoghq.com",
            Site::Ap2 => "ap2.datadoghq.com",
            Site::Us1Fed => "ddog-gov.com",
        }
    }

    /// Base URL of the client intake, e.g. `https://browser-intake-us3-datadoghq.com`.
    pub fn intake_endpoint(&self) -> String {
        // The region prefix is folded into the host with a dash, the TLD keeps its dot.
        let domain = self.domain();
        let host = match domain.rsplit_once('.') {
            Some((name, tld)) => format!("{}.{tld}", name.replace('.', "-")),
            None => domain.to_string(),
        };
        format!("https://browser-intake-{host}")
    }
}

impl fmt::Display for Site {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.domain())
    }
}

impl FromStr for Site {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let site = match s.trim().to_lowercase().as_str() {
            "us1" | "datadoghq.com" => Site::Us1,
            "us3" | "us3.datadoghq.com" => Site::Us3,
            "us5" | "us5.datadoghq.com" => Site::Us5,
            "eu1" | "eu" | "datadoghq.eu" => Site::Eu1,
            "ap1" | "ap1.datadoghq.com" => Site::Ap1,
            "ap2" | "ap2.datadoghq.com" => Site::Ap2,
            "us1_fed" | "gov" | "ddog-gov.com" => Site::Us1Fed,
            _ => {
                return Err(ConfigError::InvalidValue {
                    name: "DD_SITE",
                    value: s.to_string(),
                })
            }
        };
        Ok(site)
    }
}
