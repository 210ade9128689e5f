//! Tests of the Docker Engine client against a mock engine

use std::time::Duration;

use assert_matches::assert_matches;
use dockwatch::runtime::{
    ContainerFilter, DockerClient, EventFilter, RuntimeClient, RuntimeError,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client(server: &MockServer) -> DockerClient {
    DockerClient::new(server.uri(), Duration::from_secs(2)).unwrap()
}

#[tokio::test]
async fn test_list_containers() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/containers/json"))
        .and(query_param("all", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "Id": "c1", "Names": ["/web-1"], "State": "running", "Image": "nginx" },
            { "Id": "c2", "Names": ["/app.1.x7f3k2"], "State": "exited" }
        ])))
        .mount(&server)
        .await;

    let containers = client(&server)
        .await
        .list_containers(&ContainerFilter::named(vec!["web-1".into()]))
        .await
        .unwrap();

    assert_eq!(containers.len(), 2);
    assert_eq!(containers[0].name(), "web-1");
    assert_eq!(containers[1].state, "exited");
}

#[tokio::test]
async fn test_inspect_missing_container_is_not_found() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/containers/gone/json"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({ "message": "No such container: gone" })),
        )
        .mount(&server)
        .await;

    let result = client(&server).await.inspect_container("gone").await;
    assert_matches!(result, Err(RuntimeError::NotFound(_)));
}

#[tokio::test]
async fn test_engine_error_message_is_kept() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/services"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(json!({ "message": "This node is not a swarm manager." })),
        )
        .mount(&server)
        .await;

    let result = client(&server).await.list_services().await;
    assert_matches!(
        result,
        Err(RuntimeError::Api { status: 503, message }) if message.contains("swarm manager")
    );
}

#[tokio::test]
async fn test_inspect_container_detail() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/containers/c1/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Id": "c1",
            "Name": "/web-1",
            "State": { "Status": "exited", "Error": "", "ExitCode": 137 }
        })))
        .mount(&server)
        .await;

    let detail = client(&server).await.inspect_container("c1").await.unwrap();
    assert_eq!(detail.name(), "web-1");
    assert_eq!(detail.status(), "exited");
    assert_eq!(detail.error(), None);
    assert_eq!(detail.state.exit_code, Some(137));
}

#[tokio::test]
async fn test_resource_snapshot_is_one_shot() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/containers/c1/stats"))
        .and(query_param("stream", "false"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "read": "2025-03-01T12:00:00.000000000Z",
            "cpu_stats": { "cpu_usage": { "total_usage": 300 }, "system_cpu_usage": 2000, "online_cpus": 4 },
            "precpu_stats": { "cpu_usage": { "total_usage": 100 }, "system_cpu_usage": 1000 },
            "memory_stats": { "usage": 1048576, "limit": 4194304 },
            "networks": {
                "eth0": { "rx_bytes": 100, "tx_bytes": 50 },
                "eth1": { "rx_bytes": 20, "tx_bytes": 5 }
            },
            "blkio_stats": {
                "io_service_bytes_recursive": [
                    { "major": 8, "minor": 0, "op": "read", "value": 4096 },
                    { "major": 8, "minor": 0, "op": "write", "value": 1024 }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let snapshot = client(&server).await.resource_snapshot("c1").await.unwrap();
    assert_eq!(snapshot.memory_stats.usage, Some(1048576));
    assert_eq!(snapshot.networks.as_ref().map(|n| n.len()), Some(2));
    assert_eq!(snapshot.cpu_stats.online_cpus, Some(4));
}

#[tokio::test]
async fn test_list_tasks() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "ID": "t1",
                "ServiceID": "s1",
                "Status": {
                    "Timestamp": "2025-03-01T12:00:00Z",
                    "State": "failed",
                    "Err": "task: non-zero exit (1)"
                }
            }
        ])))
        .mount(&server)
        .await;

    let tasks = client(&server).await.list_tasks("api").await.unwrap();
    assert_eq!(tasks[0].status.state, "failed");
    assert!(tasks[0].status.timestamp.is_some());
    assert_eq!(tasks[0].status.err.as_deref(), Some("task: non-zero exit (1)"));
}

#[tokio::test]
async fn test_event_stream_skips_bad_lines() {
    let server = MockServer::start().await;

    let body = concat!(
        r#"{"Type":"container","Action":"die","Actor":{"ID":"c1","Attributes":{"name":"web-1"}},"time":1740830400}"#,
        "\n",
        "this is not json\n",
        r#"{"Type":"service","Action":"remove","Actor":{"ID":"s1","Attributes":{"name":"api"}}}"#,
        "\n",
    );

    Mock::given(method("GET"))
        .and(path("/events"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let mut subscription = client(&server)
        .await
        .subscribe_events(&EventFilter::health_feed())
        .await
        .unwrap();

    let first = subscription.next().await.unwrap().unwrap();
    assert_eq!(first.kind, "container");
    assert_eq!(first.name(), Some("web-1"));

    assert_matches!(subscription.next().await, Some(Err(RuntimeError::Decode(_))));

    let third = subscription.next().await.unwrap().unwrap();
    assert_eq!(third.action, "remove");

    // the engine closed the response
    assert!(subscription.next().await.is_none());
}

#[tokio::test]
async fn test_unreachable_engine_is_connection_error() {
    let client = DockerClient::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();

    let result = client.list_containers(&ContainerFilter::all()).await;
    assert_matches!(
        result,
        Err(RuntimeError::Connection(_)) | Err(RuntimeError::Timeout(_))
    );
}

#[cfg(unix)]
mod local_socket {
    use std::sync::{Arc, Mutex};

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::UnixListener;

    use super::*;

    /// Engine stand-in on a unix socket.
    ///
    /// Answers every connection with the same response and closes it,
    /// recording the request heads.
    fn serve(listener: UnixListener, status: &'static str, body: String) -> Arc<Mutex<Vec<String>>> {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let seen = requests.clone();

        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let mut head = Vec::new();
                let mut buf = [0u8; 1024];
                while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => head.extend_from_slice(&buf[..n]),
                    }
                }
                seen.lock().unwrap().push(String::from_utf8_lossy(&head).into_owned());

                let response = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nConnection: close\r\n\r\n{body}"
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        requests
    }

    fn socket_client(dir: &tempfile::TempDir) -> (UnixListener, DockerClient) {
        let socket = dir.path().join("docker.sock");
        let listener = UnixListener::bind(&socket).unwrap();
        let client = DockerClient::new(
            format!("unix://{}", socket.display()),
            Duration::from_secs(2),
        )
        .unwrap();
        (listener, client)
    }

    #[tokio::test]
    async fn test_list_containers_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let (listener, client) = socket_client(&dir);
        let body = json!([{ "Id": "c1", "Names": ["/web-1"], "State": "running" }]).to_string();
        let requests = serve(listener, "200 OK", body);

        let containers = client
            .list_containers(&ContainerFilter::named(vec!["web-1".into()]))
            .await
            .unwrap();

        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].name(), "web-1");

        let head = requests.lock().unwrap()[0].clone();
        assert!(head.starts_with("GET /containers/json?all=true&filters="), "{head}");
    }

    #[tokio::test]
    async fn test_missing_container_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let (listener, client) = socket_client(&dir);
        serve(
            listener,
            "404 Not Found",
            json!({ "message": "No such container: gone" }).to_string(),
        );

        let result = client.inspect_container("gone").await;
        assert_matches!(result, Err(RuntimeError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_event_stream_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let (listener, client) = socket_client(&dir);
        let body = concat!(
            r#"{"Type":"container","Action":"die","Actor":{"ID":"c1","Attributes":{"name":"web-1"}}}"#,
            "\n",
            r#"{"Type":"service","Action":"remove","Actor":{"ID":"s1","Attributes":{"name":"api"}}}"#,
            "\n",
        );
        serve(listener, "200 OK", body.to_string());

        let mut subscription = client
            .subscribe_events(&EventFilter::health_feed())
            .await
            .unwrap();

        assert_eq!(subscription.next().await.unwrap().unwrap().action, "die");
        assert_eq!(subscription.next().await.unwrap().unwrap().kind, "service");
        assert!(subscription.next().await.is_none());
    }

    #[tokio::test]
    async fn test_missing_socket_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let client = DockerClient::new(
            format!("unix://{}", dir.path().join("absent.sock").display()),
            Duration::from_secs(1),
        )
        .unwrap();

        let result = client.list_services().await;
        assert_matches!(result, Err(RuntimeError::Connection(_)));
    }
}
