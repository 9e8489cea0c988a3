//! Layered IoT architecture model
//!
//! Device ("thing") → Connectivity → IoT Cloud, with cross-cutting systems
//! spanning all three. Every sub-capability carries the keywords used to map
//! free-text technology requirements onto the model.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use super::contains_term;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TechnologyLayer {
    Device,
    Connectivity,
    Cloud,
    CrossCutting,
}

impl TechnologyLayer {
    pub const ALL: [TechnologyLayer; 4] = [
        TechnologyLayer::Device,
        TechnologyLayer::Connectivity,
        TechnologyLayer::Cloud,
        TechnologyLayer::CrossCutting,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            TechnologyLayer::Device => "Device Layer",
            TechnologyLayer::Connectivity => "Connectivity Layer",
            TechnologyLayer::Cloud => "IoT Cloud Layer",
            TechnologyLayer::CrossCutting => "Cross-cutting Systems",
        }
    }

    pub fn capabilities(&self) -> &'static [Capability] {
        match self {
            TechnologyLayer::Device => &[
                Capability::ThingHardware,
                Capability::IotComponents,
                Capability::ThingSoftware,
            ],
            TechnologyLayer::Connectivity => &[Capability::NetworkCommunication],
            TechnologyLayer::Cloud => &[
                Capability::ThingManagement,
                Capability::ApplicationPlatform,
                Capability::Analytics,
                Capability::ProcessManagement,
            ],
            TechnologyLayer::CrossCutting => &[
                Capability::IdentitySecurity,
                Capability::BusinessIntegration,
                Capability::ExternalInformation,
            ],
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.trim().to_lowercase().replace(['-', ' '], "_").as_str() {
            "device" | "thing" => Some(TechnologyLayer::Device),
            "connectivity" | "network" => Some(TechnologyLayer::Connectivity),
            "cloud" | "iot_cloud" => Some(TechnologyLayer::Cloud),
            "cross_cutting" | "crosscutting" => Some(TechnologyLayer::CrossCutting),
            _ => None,
        }
    }
}

impl fmt::Display for TechnologyLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Named sub-capability of a technology layer
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    ThingHardware,
    IotComponents,
    ThingSoftware,
    NetworkCommunication,
    ThingManagement,
    ApplicationPlatform,
    Analytics,
    ProcessManagement,
    IdentitySecurity,
    BusinessIntegration,
    ExternalInformation,
}

impl Capability {
    pub fn layer(&self) -> TechnologyLayer {
        match self {
            Capability::ThingHardware | Capability::IotComponents | Capability::ThingSoftware => {
                TechnologyLayer::Device
            }
            Capability::NetworkCommunication => TechnologyLayer::Connectivity,
            Capability::ThingManagement
            | Capability::ApplicationPlatform
            | Capability::Analytics
            | Capability::ProcessManagement => TechnologyLayer::Cloud,
            Capability::IdentitySecurity
            | Capability::BusinessIntegration
            | Capability::ExternalInformation => TechnologyLayer::CrossCutting,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Capability::ThingHardware => "thing-hardware",
            Capability::IotComponents => "iot-components",
            Capability::ThingSoftware => "thing-software",
            Capability::NetworkCommunication => "network-communication",
            Capability::ThingManagement => "thing-management",
            Capability::ApplicationPlatform => "application-platform",
            Capability::Analytics => "analytics",
            Capability::ProcessManagement => "process-management",
            Capability::IdentitySecurity => "identity-security",
            Capability::BusinessIntegration => "business-integration",
            Capability::ExternalInformation => "external-information",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Capability::ThingHardware => "Thing hardware",
            Capability::IotComponents => "IoT components",
            Capability::ThingSoftware => "Thing software",
            Capability::NetworkCommunication => "Network communication",
            Capability::ThingManagement => "Thing communication and management",
            Capability::ApplicationPlatform => "Application platform",
            Capability::Analytics => "Analytics and data management",
            Capability::ProcessManagement => "Process management and IoT applications",
            Capability::IdentitySecurity => "Identity and security",
            Capability::BusinessIntegration => "Integration with business systems",
            Capability::ExternalInformation => "External information sources",
        }
    }

    fn keywords(&self) -> &'static [&'static str] {
        match self {
            Capability::ThingHardware => &[
                "sensor", "sensors", "hardware", "actuator", "actuators", "circuit board",
                "pcb", "enclosure", "device", "devices", "meter", "meters", "tracker", "trackers",
            ],
            Capability::IotComponents => &[
                "embedded processor", "microcontroller", "mcu", "chipset", "module", "modules",
                "communication port", "edge device", "edge devices", "gateway", "gateways",
            ],
            Capability::ThingSoftware => &[
                "firmware", "embedded software", "rtos", "device software", "ota", "edge computing",
            ],
            Capability::NetworkCommunication => &[
                "connectivity", "network", "networks", "lpwan", "lorawan", "lora", "nb-iot",
                "lte-m", "5g", "4g", "cellular", "wi-fi", "wifi", "bluetooth", "ble", "zigbee",
                "satellite", "mqtt", "protocol", "protocols", "wireless", "mesh",
            ],
            Capability::ThingManagement => &[
                "device management", "fleet management", "provisioning", "remote monitoring",
                "digital twin", "digital twins",
            ],
            Capability::ApplicationPlatform => &[
                "cloud", "platform", "platforms", "application development", "api", "apis",
                "saas", "dashboard", "dashboards",
            ],
            Capability::Analytics => &[
                "analytics", "data management", "time-series", "time series", "machine learning",
                "ai", "predictive", "prediction", "big data", "data processing",
            ],
            Capability::ProcessManagement => &[
                "process management", "workflow", "workflows", "automation", "orchestration",
                "scheduling", "control system", "control systems",
            ],
            Capability::IdentitySecurity => &[
                "security", "cybersecurity", "identity", "authentication", "encryption",
                "access control", "privacy", "gdpr", "nis2",
            ],
            Capability::BusinessIntegration => &[
                "erp", "crm", "plm", "integration", "business system", "business systems",
                "interoperability",
            ],
            Capability::ExternalInformation => &[
                "weather", "external data", "third-party data", "open data", "market data",
                "satellite imagery", "data marketplace",
            ],
        }
    }

    pub fn all() -> impl Iterator<Item = Capability> {
        TechnologyLayer::ALL
            .into_iter()
            .flat_map(|layer| layer.capabilities().iter().copied())
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.slug())
    }
}

/// Map one free-text requirement onto the capabilities it names.
///
/// A keyword that is contained in a longer matched keyword of a different
/// capability is ignored, so "device management" lands on thing-management
/// rather than also on thing-hardware.
pub fn map_requirement(requirement: &str) -> BTreeSet<Capability> {
    let lowered = requirement.to_lowercase();

    let hits: Vec<(Capability, &'static str)> = Capability::all()
        .flat_map(|capability| {
            capability
                .keywords()
                .iter()
                .filter(|kw| contains_term(&lowered, kw))
                .map(move |kw| (capability, *kw))
                .collect::<Vec<_>>()
        })
        .collect();

    hits.iter()
        .filter(|(capability, keyword)| {
            !hits.iter().any(|(other, longer)| {
                other != capability && longer.len() > keyword.len() && longer.contains(*keyword)
            })
        })
        .map(|(capability, _)| *capability)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_capability_belongs_to_its_layer() {
        for layer in TechnologyLayer::ALL {
            for capability in layer.capabilities() {
                assert_eq!(capability.layer(), layer);
            }
        }
        assert_eq!(Capability::all().count(), 11);
    }

    #[test]
    fn test_device_sub_capabilities_in_order() {
        let slugs: Vec<_> = TechnologyLayer::Device
            .capabilities()
            .iter()
            .map(|c| c.slug())
            .collect();
        assert_eq!(slugs, vec!["thing-hardware", "iot-components", "thing-software"]);
    }

    #[test]
    fn test_map_requirement_prefers_longest_keyword() {
        let mapped = map_requirement("Device management");
        assert_eq!(mapped, BTreeSet::from([Capability::ThingManagement]));

        let mapped = map_requirement("Satellite imagery feeds");
        assert_eq!(mapped, BTreeSet::from([Capability::ExternalInformation]));
    }

    #[test]
    fn test_map_requirement_can_span_layers() {
        let mapped = map_requirement("Soil moisture sensors over LoRaWAN");
        assert!(mapped.contains(&Capability::ThingHardware));
        assert!(mapped.contains(&Capability::NetworkCommunication));

        assert!(map_requirement("Predictive maintenance").contains(&Capability::Analytics));
        assert!(map_requirement("Farmer training").is_empty());
    }

    #[test]
    fn test_layer_from_key() {
        assert_eq!(TechnologyLayer::from_key("cross-cutting"), Some(TechnologyLayer::CrossCutting));
        assert_eq!(TechnologyLayer::from_key("Cloud"), Some(TechnologyLayer::Cloud));
        assert_eq!(TechnologyLayer::from_key("fog"), None);
    }
}
