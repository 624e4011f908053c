#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end over real sockets: a deployer on the TCP transport serves
//! metadata queries to a client in the same process.

mod common;

use std::sync::Arc;

use common::{DEMO_SERVICE, DemoServiceImpl, app_config};
use metadata_service::{
    AppContext, ApplicationDeployer, BindSpec, InvokeError, Invocation, MetadataServiceClient,
    ProtocolConfig, RemoteMetadataClient, ServiceConfig, ServiceQuery, ServiceUrl, TcpTransport,
    Transport,
};
use serde_json::json;

fn tcp_deployer() -> (Arc<TcpTransport>, ApplicationDeployer) {
    let transport = Arc::new(TcpTransport::default());
    let mut config = app_config("tcp-app");
    config.protocols = vec![ProtocolConfig::new("dubbo", None)];
    let ctx = AppContext::builder(config)
        .transport(Arc::clone(&transport) as Arc<dyn Transport>)
        .build();
    let deployer = ApplicationDeployer::new(ctx);
    deployer
        .add_service(
            ServiceConfig::new(DEMO_SERVICE).with_version("1.0.0"),
            Arc::new(DemoServiceImpl),
        )
        .unwrap();
    (transport, deployer)
}

#[tokio::test]
async fn metadata_query_over_tcp() {
    let (server, deployer) = tcp_deployer();
    deployer.start().await.unwrap();

    let service_urls = deployer.service_urls();
    let metadata_url = deployer.exporter().exported_urls().remove(0);
    assert_eq!(metadata_url.port(), service_urls[0].port());
    assert_eq!(server.listeners().len(), 1);

    let client_transport: Arc<dyn Transport> = Arc::new(TcpTransport::default());
    let parsed = ServiceUrl::parse(&metadata_url.to_string()).unwrap();
    let client = RemoteMetadataClient::new(Arc::clone(&client_transport), parsed);

    assert_eq!(client.service_name().await.unwrap(), "tcp-app");
    assert_eq!(client.version(), "1.0.0");

    let urls = client
        .exported_urls(&ServiceQuery::new(DEMO_SERVICE).with_version("1.0.0"))
        .await
        .unwrap();
    assert_eq!(urls, service_urls);

    let info = client.metadata_info(None).await.unwrap().unwrap();
    assert_eq!(info.app, "tcp-app");
    let again = client
        .metadata_info(Some(&info.revision))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(again, info);

    let greeting = client_transport
        .invoke(&service_urls[0], Invocation::new("sayHello", json!("tcp")))
        .await
        .unwrap();
    assert_eq!(greeting, json!("Hello, tcp"));

    deployer.stop().await;
    assert!(server.listeners().is_empty());

    let err = client.service_name().await.unwrap_err();
    assert!(err.is_unavailable());
}

#[tokio::test]
async fn unpublished_service_and_remote_errors() {
    let (_server, deployer) = tcp_deployer();
    deployer.start().await.unwrap();
    let service_url = deployer.service_urls().remove(0);
    let client = TcpTransport::default();

    let unknown = ServiceUrl::new("dubbo", service_url.host(), service_url.port(), "org.example.Missing");
    let err = client
        .invoke(&unknown, Invocation::no_args("anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::NoService(s) if s == "org.example.Missing"));

    let err = client
        .invoke(&service_url, Invocation::no_args("explode"))
        .await
        .unwrap_err();
    assert!(matches!(err, InvokeError::Remote(m) if m.contains("no such method")));

    deployer.stop().await;
}

#[tokio::test]
async fn shared_tcp_listener_is_ref_counted() {
    let transport = TcpTransport::default();
    let first = transport
        .bind(&BindSpec::new("dubbo", "127.0.0.1", 0))
        .await
        .unwrap();
    let second = transport
        .bind(&BindSpec::new("dubbo", "127.0.0.1", first.port()).for_metadata())
        .await
        .unwrap();
    assert_eq!(first.id(), second.id());

    let conflict = transport
        .bind(&BindSpec::new("tri", "127.0.0.1", first.port()))
        .await;
    assert!(conflict.is_err());

    transport.unbind(&second).await;
    assert_eq!(transport.listeners().len(), 1);
    assert!(!transport.listeners()[0].metadata_only);
    transport.unbind(&first).await;
    assert!(transport.listeners().is_empty());
}
