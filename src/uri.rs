//! The URI connector (§2 overview, §6 "URI scheme"): ingests `tCONNECT`-style
//! requests from the host runtime and publishes their status back as
//! structure events. Grounded in `protocol::nfs::mount`'s path-addressed
//! resource-binding pattern, generalized from a filesystem mount point to a
//! scheme-addressed remote port.

use crate::types::{DynamicConnectorParameters, PortPath, StaticConnectorParameters};

/// A parsed URI-connect request: `scheme://authority/path` where authority
/// identifies the peer (empty = any) and path is the remote port path (§6).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UriConnectRequest {
    pub scheme: String,
    pub authority: Option<String>,
    pub remote_path: PortPath,
    pub static_parameters: StaticConnectorParameters,
    pub dynamic_parameters: DynamicConnectorParameters,
}

/// Recognized parameter names on a URI connector (§6 "Configuration").
pub mod param_names {
    pub const CONVERSION_OPERATION_1: &str = "Server-side Conversion Operation 1";
    pub const CONVERSION_OPERATION_2: &str = "Server-side Conversion Operation 2";
    pub const CONVERSION_OPERATION_1_PARAMETER: &str = "Server-side Conversion Operation 1 Parameter";
    pub const CONVERSION_OPERATION_2_PARAMETER: &str = "Server-side Conversion Operation 2 Parameter";
    pub const CONVERSION_INTERMEDIATE_TYPE: &str = "Server-side Conversion Intermediate Type";
    pub const CONVERSION_DESTINATION_TYPE: &str = "Server-side Conversion Destination Type";
    pub const MINIMAL_UPDATE_INTERVAL: &str = "Minimal Update Interval";
    pub const HIGH_PRIORITY: &str = "High Priority";
}

/// Status a URI connector reports back through a structure event
/// (URI_CONNECTOR_CREATED/UPDATED/DELETED on the wire, once an underlying
/// [`crate::subscription::Connector`] exists).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum UriConnectorStatus {
    Resolving,
    Connected,
    Error,
    Disconnected,
}

impl std::fmt::Display for UriConnectorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UriConnectorStatus::Resolving => "resolving",
            UriConnectorStatus::Connected => "connected",
            UriConnectorStatus::Error => "error",
            UriConnectorStatus::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Parses recognized parameter names (§6) into static/dynamic connector
/// parameters. Unrecognized names are ignored; the scheme handler that
/// produced `params` is responsible for its own scheme-specific parameters.
pub fn parse_parameters(
    params: &[(String, String)],
) -> (StaticConnectorParameters, DynamicConnectorParameters) {
    use crate::types::{ServerSideConversion, Strategy};
    let mut static_parameters = StaticConnectorParameters::default();
    let mut dynamic_parameters = DynamicConnectorParameters { strategy: Strategy::NONE, ..Default::default() };
    let mut conversion = ServerSideConversion::default();
    let mut has_conversion = false;

    for (name, value) in params {
        match name.as_str() {
            param_names::CONVERSION_OPERATION_1 => {
                conversion.operation_1 = value.clone();
                has_conversion = true;
            }
            param_names::CONVERSION_OPERATION_2 => {
                conversion.operation_2 = value.clone();
                has_conversion = true;
            }
            param_names::CONVERSION_OPERATION_1_PARAMETER => conversion.operation_1_parameter = value.clone(),
            param_names::CONVERSION_OPERATION_2_PARAMETER => conversion.operation_2_parameter = value.clone(),
            param_names::CONVERSION_INTERMEDIATE_TYPE => conversion.intermediate_type = value.clone(),
            param_names::CONVERSION_DESTINATION_TYPE => conversion.destination_type = value.clone(),
            param_names::MINIMAL_UPDATE_INTERVAL => {
                dynamic_parameters.minimal_update_interval_ms = value.parse().unwrap_or(0);
            }
            param_names::HIGH_PRIORITY => {
                dynamic_parameters.high_priority = value.parse().unwrap_or(false);
            }
            _ => {}
        }
    }

    if has_conversion {
        static_parameters.server_side_conversion = Some(conversion);
    }
    (static_parameters, dynamic_parameters)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_parameters_maps_recognized_names() {
        let params = vec![
            (param_names::CONVERSION_OPERATION_1.to_string(), "ToVec3".to_string()),
            (param_names::CONVERSION_DESTINATION_TYPE.to_string(), "Vec3".to_string()),
            (param_names::MINIMAL_UPDATE_INTERVAL.to_string(), "50".to_string()),
            (param_names::HIGH_PRIORITY.to_string(), "true".to_string()),
        ];
        let (static_parameters, dynamic_parameters) = parse_parameters(&params);
        let conversion = static_parameters.server_side_conversion.unwrap();
        assert_eq!(conversion.operation_1, "ToVec3");
        assert_eq!(conversion.destination_type, "Vec3");
        assert_eq!(dynamic_parameters.minimal_update_interval_ms, 50);
        assert!(dynamic_parameters.high_priority);
    }

    #[test]
    fn parse_parameters_ignores_unrecognized_names() {
        let params = vec![("Scheme-Specific-Thing".to_string(), "whatever".to_string())];
        let (static_parameters, _) = parse_parameters(&params);
        assert!(static_parameters.server_side_conversion.is_none());
    }
}
