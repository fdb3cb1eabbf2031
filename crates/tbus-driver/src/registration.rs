//! Provider metadata for host registries
//!
//! Hosts enumerate drivers and their operator-facing functions from this
//! static description. Function identifiers are parsed into [`FunctionId`]
//! at the boundary so dispatch never sees an unknown tag.

use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tbus_core::DEFAULT_BUS_ADDRESS;

use crate::DriverError;

/// Static description of this driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProviderRegistration {
    pub id: &'static str,
    pub label: &'static str,
    pub manufacturer: &'static str,
    pub protocol: &'static str,
    pub description: &'static str,
    pub category: &'static str,
    pub default_address: u8,
    #[serde(serialize_with = "serialize_functions")]
    pub functions: &'static [FunctionId],
}

/// Registry entry for one function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FunctionDescriptor {
    pub id: FunctionId,
    pub label: &'static str,
    pub parameters: &'static [&'static str],
    pub multistage: bool,
}

fn serialize_functions<S: Serializer>(
    functions: &&'static [FunctionId],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(functions.iter().map(|id| id.descriptor()))
}

pub const REGISTRATION: ProviderRegistration = ProviderRegistration {
    id: "DeviceProviderRossNKIPS",
    label: "Carbonite NK-IPS",
    manufacturer: "Ross Video",
    protocol: "T-Bus Over TCP",
    description: "The NK Series routing family is a cost effective, high performance routing \
                  platform for Studios, OB Vans, and Flypacks.",
    category: "Hybrid Router",
    default_address: DEFAULT_BUS_ADDRESS,
    functions: &FunctionId::ALL,
};

/// Operator-facing driver functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FunctionId {
    /// Direct crosspoint
    #[serde(rename = "XPT")]
    Crosspoint,
    /// Multi-stage level select
    #[serde(rename = "LVL_MSX")]
    StageLevel,
    /// Multi-stage destination select
    #[serde(rename = "DST_MSX")]
    StageDestination,
    /// Multi-stage source select
    #[serde(rename = "SRC_MSX")]
    StageSource,
    /// Multi-stage take
    #[serde(rename = "TAKE_MSX")]
    Take,
}

impl FunctionId {
    pub const ALL: [FunctionId; 5] = [
        FunctionId::Crosspoint,
        FunctionId::StageLevel,
        FunctionId::StageDestination,
        FunctionId::StageSource,
        FunctionId::Take,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FunctionId::Crosspoint => "XPT",
            FunctionId::StageLevel => "LVL_MSX",
            FunctionId::StageDestination => "DST_MSX",
            FunctionId::StageSource => "SRC_MSX",
            FunctionId::Take => "TAKE_MSX",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FunctionId::Crosspoint => "Direct Crosspoint",
            FunctionId::StageLevel => "Level Select (MultiStage Crosspoint)",
            FunctionId::StageDestination => "Destination Select (MultiStage Crosspoint)",
            FunctionId::StageSource => "Source Select (MultiStage Crosspoint)",
            FunctionId::Take => "Take (MultiStage Crosspoint)",
        }
    }

    /// Parameters the function reads from an action
    pub fn parameters(self) -> &'static [&'static str] {
        match self {
            FunctionId::Crosspoint => &["level", "dst", "src"],
            FunctionId::StageLevel => &["level"],
            FunctionId::StageDestination => &["dst"],
            FunctionId::StageSource => &["src"],
            FunctionId::Take => &[],
        }
    }

    /// Whether the function acts on a controller's staged selection
    pub fn is_multistage(self) -> bool {
        !matches!(self, FunctionId::Crosspoint)
    }

    pub fn descriptor(self) -> FunctionDescriptor {
        FunctionDescriptor {
            id: self,
            label: self.label(),
            parameters: self.parameters(),
            multistage: self.is_multistage(),
        }
    }
}

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FunctionId {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| DriverError::UnknownFunction(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_ids_roundtrip() {
        for id in FunctionId::ALL {
            assert_eq!(id.as_str().parse::<FunctionId>().unwrap(), id);
        }
        assert!("XPT_SALVO".parse::<FunctionId>().is_err());
    }

    #[test]
    fn test_registration_json() {
        let json = serde_json::to_value(REGISTRATION).unwrap();
        assert_eq!(json["manufacturer"], "Ross Video");
        assert_eq!(json["default_address"], 254);
        assert_eq!(json["functions"][4]["id"], "TAKE_MSX");
    }

    #[test]
    fn test_registration_function_descriptors() {
        let json = serde_json::to_value(REGISTRATION).unwrap();
        let functions = json["functions"].as_array().unwrap();
        assert_eq!(functions.len(), 5);

        assert_eq!(functions[0]["id"], "XPT");
        assert_eq!(functions[0]["label"], "Direct Crosspoint");
        assert_eq!(functions[0]["parameters"], serde_json::json!(["level", "dst", "src"]));
        assert_eq!(functions[0]["multistage"], false);

        assert_eq!(functions[2]["id"], "DST_MSX");
        assert_eq!(functions[2]["parameters"], serde_json::json!(["dst"]));
        assert_eq!(functions[2]["multistage"], true);

        assert_eq!(functions[4]["parameters"], serde_json::json!([]));
        assert_eq!(functions[4]["multistage"], true);
    }
}
