//! Endpoint selection for the metadata service.
//!
//! Precedence, first match wins:
//!
//! 1. protocol and port both configured: use them as-is;
//! 2. an ordinary service already listens on a usable protocol: share that listener;
//! 3. otherwise the configured (or default) protocol on the configured port, or an
//!    ephemeral one.
//!
//! Selection is a pure function of the configuration and a listener snapshot. It
//! never waits for services that have not bound yet.

use metadata_service_sdk::ListenerInfo;

use crate::config::MetadataExportConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoiceSource {
    Explicit,
    Reused,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointChoice {
    pub protocol: String,
    pub host: String,
    /// `0` asks the transport for an ephemeral port.
    pub port: u16,
    pub source: ChoiceSource,
}

/// Resolve the metadata service endpoint.
///
/// `default_host` is used when `metadata_service_host` is not configured.
#[must_use]
pub fn select_endpoint(
    config: &MetadataExportConfig,
    listeners: &[ListenerInfo],
    default_host: &str,
) -> EndpointChoice {
    let host = config
        .metadata_service_host
        .clone()
        .unwrap_or_else(|| default_host.to_owned());

    if let (Some(protocol), Some(port)) = (
        config.metadata_service_protocol.as_ref(),
        config.metadata_service_port,
    ) {
        return EndpointChoice {
            protocol: protocol.clone(),
            host,
            port,
            source: ChoiceSource::Explicit,
        };
    }

    if config.metadata_service_port.is_none()
        && let Some(listener) = find_reusable(config, listeners)
    {
        return EndpointChoice {
            protocol: listener.protocol.clone(),
            host: listener.host.clone(),
            port: listener.port,
            source: ChoiceSource::Reused,
        };
    }

    EndpointChoice {
        protocol: config
            .metadata_service_protocol
            .clone()
            .unwrap_or_else(|| config.default_protocol.clone()),
        host,
        port: config.metadata_service_port.unwrap_or(0),
        source: ChoiceSource::Fallback,
    }
}

fn find_reusable<'a>(
    config: &MetadataExportConfig,
    listeners: &'a [ListenerInfo],
) -> Option<&'a ListenerInfo> {
    let wanted: Vec<&str> = match config.metadata_service_protocol.as_deref() {
        Some(protocol) => vec![protocol],
        None => {
            let mut wanted = Vec::with_capacity(config.reusable_protocols.len() + 1);
            if config
                .reusable_protocols
                .iter()
                .any(|p| *p == config.default_protocol)
            {
                wanted.push(config.default_protocol.as_str());
            }
            wanted.extend(
                config
                    .reusable_protocols
                    .iter()
                    .map(String::as_str)
                    .filter(|p| *p != config.default_protocol),
            );
            wanted
        }
    };

    wanted.iter().find_map(|protocol| {
        listeners
            .iter()
            .find(|l| !l.metadata_only && l.protocol == *protocol)
    })
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    fn listener(protocol: &str, port: u16) -> ListenerInfo {
        ListenerInfo {
            protocol: protocol.to_owned(),
            host: "10.0.0.5".to_owned(),
            port,
            metadata_only: false,
            services: vec!["demo.DemoService".to_owned()],
        }
    }

    #[test]
    fn test_explicit_config_wins_over_bound_listener() {
        let config = MetadataExportConfig {
            metadata_service_protocol: Some("tri".to_owned()),
            metadata_service_port: Some(8089),
            ..MetadataExportConfig::default()
        };
        let choice = select_endpoint(&config, &[listener("dubbo", 2002)], "127.0.0.1");
        assert_eq!(choice.protocol, "tri");
        assert_eq!(choice.port, 8089);
        assert_eq!(choice.host, "127.0.0.1");
        assert_eq!(choice.source, ChoiceSource::Explicit);
    }

    #[test]
    fn test_reuses_ordinary_listener() {
        let choice = select_endpoint(
            &MetadataExportConfig::default(),
            &[listener("dubbo", 2002)],
            "127.0.0.1",
        );
        assert_eq!(choice.protocol, "dubbo");
        assert_eq!(choice.port, 2002);
        assert_eq!(choice.host, "10.0.0.5");
        assert_eq!(choice.source, ChoiceSource::Reused);
    }

    #[test]
    fn test_prefers_default_protocol_over_bind_order() {
        let choice = select_endpoint(
            &MetadataExportConfig::default(),
            &[listener("tri", 50051), listener("dubbo", 2002)],
            "127.0.0.1",
        );
        assert_eq!(choice.port, 2002);
    }

    #[test]
    fn test_falls_back_to_bind_order_among_reusable() {
        let choice = select_endpoint(
            &MetadataExportConfig::default(),
            &[listener("rest", 8080), listener("tri", 50051)],
            "127.0.0.1",
        );
        assert_eq!(choice.protocol, "tri");
        assert_eq!(choice.port, 50051);
    }

    #[test]
    fn test_configured_protocol_limits_reuse() {
        let config = MetadataExportConfig {
            metadata_service_protocol: Some("tri".to_owned()),
            ..MetadataExportConfig::default()
        };
        let choice = select_endpoint(&config, &[listener("dubbo", 2002)], "127.0.0.1");
        assert_eq!(choice.protocol, "tri");
        assert_eq!(choice.port, 0);
        assert_eq!(choice.source, ChoiceSource::Fallback);
    }

    #[test]
    fn test_metadata_only_listeners_are_not_reused() {
        let mut own = listener("dubbo", 30000);
        own.metadata_only = true;
        let choice = select_endpoint(&MetadataExportConfig::default(), &[own], "127.0.0.1");
        assert_eq!(choice.port, 0);
        assert_eq!(choice.protocol, "dubbo");
    }

    #[test]
    fn test_port_only_uses_default_protocol() {
        let config = MetadataExportConfig {
            metadata_service_port: Some(7001),
            metadata_service_host: Some("0.0.0.0".to_owned()),
            ..MetadataExportConfig::default()
        };
        let choice = select_endpoint(&config, &[listener("dubbo", 2002)], "127.0.0.1");
        assert_eq!(choice.protocol, "dubbo");
        assert_eq!(choice.port, 7001);
        assert_eq!(choice.host, "0.0.0.0");
        assert_eq!(choice.source, ChoiceSource::Fallback);
    }
}
