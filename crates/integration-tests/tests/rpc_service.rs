//! JSON-RPC service over a real TCP socket

use std::sync::Arc;

use jsonrpsee::core::client::{ClientT, Error as ClientError};
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use nbapp_api_rpc::error::code;
use nbapp_api_rpc::types::{FormResponse, LaunchResponse};
use nbapp_api_rpc::{RpcServer, RpcServerConfig};
use nbapp_core::application::{
    shutdown_channel, Launcher, LauncherConfig, ShutdownReason, ShutdownToken,
};
use nbapp_core::port::environment_manager::mocks::InMemoryEnvironmentManager;
use nbapp_core::port::notebook_executor::mocks::MockNotebookExecutor;
use serde_json::json;
use tempfile::TempDir;

struct Service {
    _apps: TempDir,
    client: HttpClient,
    token: ShutdownToken,
    executor: Arc<MockNotebookExecutor>,
    handle: jsonrpsee::server::ServerHandle,
}

async fn start_service(host: &str) -> Service {
    let apps = TempDir::new().unwrap();
    let document = json!({
        "metadata": {"nbapp": {"desc": "Greeting", "inputs": {"who": "str"}}},
        "nbformat": 4,
        "cells": [
            {"cell_type": "code", "metadata": {}, "outputs": [], "execution_count": null,
             "source": "who = 'world'"},
            {"cell_type": "code", "metadata": {}, "outputs": [], "execution_count": null,
             "source": "print('hello', who)"}
        ]
    });
    std::fs::write(apps.path().join("hello.ipynb"), document.to_string()).unwrap();

    let executor = Arc::new(MockNotebookExecutor::new_echo());
    let launcher = Launcher::new(
        Arc::new(InMemoryEnvironmentManager::new("/conda")),
        executor.clone(),
        LauncherConfig::default(),
    );
    let (sender, token) = shutdown_channel();
    let config = RpcServerConfig {
        host: host.to_string(),
        port: 0,
        apps_dir: apps.path().to_path_buf(),
    };
    let (handle, addr) = RpcServer::new(config, Arc::new(launcher), sender)
        .start()
        .await
        .unwrap();
    let client = HttpClientBuilder::default()
        .build(format!("http://127.0.0.1:{}", addr.port()))
        .unwrap();

    Service {
        _apps: apps,
        client,
        token,
        executor,
        handle,
    }
}

fn launch_params(notebook: &str, args: serde_json::Value) -> ObjectParams {
    let mut params = ObjectParams::new();
    params.insert("notebook", notebook).unwrap();
    params.insert("args", args).unwrap();
    params
}

fn error_code(err: ClientError) -> i32 {
    match err {
        ClientError::Call(obj) => obj.code(),
        other => panic!("expected a call error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_launch_and_form_round_trip() {
    let svc = start_service("127.0.0.1").await;

    let resp: LaunchResponse = svc
        .client
        .request("app.launch.v1", launch_params("hello", json!({"who": "rust"})))
        .await
        .unwrap();
    match resp {
        LaunchResponse::Output(out) => {
            assert_eq!(out.name, "hello");
            assert_eq!(out.format, "html");
            assert!(out.content.contains("who = \\\"rust\\\""), "{}", out.content);
        }
        other => panic!("expected output, got {:?}", other),
    }

    let mut params = ObjectParams::new();
    params.insert("notebook", "hello").unwrap();
    let form: FormResponse = svc.client.request("app.form.v1", params).await.unwrap();
    assert_eq!(form.desc, "Greeting");
    assert_eq!(form.inputs.len(), 1);
    assert_eq!(form.inputs[0].type_tag, "str");

    svc.handle.stop().unwrap();
}

#[tokio::test]
async fn test_missing_inputs_return_form_or_error() {
    let svc = start_service("127.0.0.1").await;

    let mut params = launch_params("hello", json!({}));
    params.insert("form_if_missing", true).unwrap();
    let resp: LaunchResponse = svc.client.request("app.launch.v1", params).await.unwrap();
    assert!(matches!(resp, LaunchResponse::Form(ref form) if form.missing == vec!["who".to_string()]));

    let err = svc
        .client
        .request::<LaunchResponse, _>("app.launch.v1", launch_params("hello", json!({})))
        .await
        .unwrap_err();
    assert_eq!(error_code(err), code::PARAMETER_ERROR);
    assert_eq!(svc.executor.call_count(), 0);

    let err = svc
        .client
        .request::<LaunchResponse, _>("app.launch.v1", launch_params("../hello", json!({})))
        .await
        .unwrap_err();
    assert_eq!(error_code(err), code::NOT_FOUND);

    svc.handle.stop().unwrap();
}

#[tokio::test]
async fn test_admin_shutdown_fires_token() {
    let svc = start_service("127.0.0.1").await;

    let resp: serde_json::Value = svc
        .client
        .request("admin.shutdown.v1", rpc_params![])
        .await
        .unwrap();
    assert_eq!(resp["accepted"], json!(true));
    assert_eq!(svc.token.reason(), Some(ShutdownReason::AdminRequest));

    svc.handle.stop().unwrap();
}
