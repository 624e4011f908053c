#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use metadata_service::{
    AppContext, ApplicationConfig, ApplicationDeployer, InMemoryTransport, Invocation,
    MetadataCenterClient, ProtocolConfig, ServiceConfig, ServiceInvoker, Transport,
};
use serde_json::json;

pub const DEMO_SERVICE: &str = "org.example.DemoService";

/// Greets whoever calls `sayHello`.
pub struct DemoServiceImpl;

#[async_trait]
impl ServiceInvoker for DemoServiceImpl {
    async fn invoke(&self, invocation: Invocation) -> anyhow::Result<serde_json::Value> {
        match invocation.method.as_str() {
            "sayHello" => {
                let name = invocation.args.as_str().unwrap_or("world");
                Ok(json!(format!("Hello, {name}")))
            }
            other => anyhow::bail!("no such method: {other}"),
        }
    }
}

pub fn app_config(name: &str) -> ApplicationConfig {
    ApplicationConfig {
        name: name.to_owned(),
        ..ApplicationConfig::default()
    }
}

pub fn with_dubbo_2002(mut config: ApplicationConfig) -> ApplicationConfig {
    config.protocols = vec![ProtocolConfig::new("dubbo", Some(2002))];
    config
}

pub fn context(config: ApplicationConfig, transport: &Arc<InMemoryTransport>) -> Arc<AppContext> {
    AppContext::builder(config)
        .transport(Arc::clone(transport) as Arc<dyn Transport>)
        .build()
}

pub fn context_with_center(
    config: ApplicationConfig,
    transport: &Arc<InMemoryTransport>,
    center: Arc<dyn MetadataCenterClient>,
) -> Arc<AppContext> {
    AppContext::builder(config)
        .transport(Arc::clone(transport) as Arc<dyn Transport>)
        .metadata_center(center)
        .build()
}

pub fn deployer_with_demo(ctx: Arc<AppContext>, service: ServiceConfig) -> ApplicationDeployer {
    let deployer = ApplicationDeployer::new(ctx);
    deployer
        .add_service(service, Arc::new(DemoServiceImpl))
        .expect("valid service");
    deployer
}
