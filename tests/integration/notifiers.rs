//! Tests of the notification sinks against mock gateways

use assert_matches::assert_matches;
use dockwatch::config::{Discord, Gateway, Webhook};
use dockwatch::notification::{
    DeliveryError, DiscordNotifier, EvolutionNotifier, GatewayFlavor, Notifier, WebhookNotifier,
    WuzapiNotifier,
};
use reqwest::Client;
use serde_json::json;
use tokio_test::assert_ok;
use wiremock::matchers::{body_json, body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn gateway(server: &MockServer, route: &str) -> Gateway {
    Gateway {
        api: format!("{}{route}", server.uri()),
        key: "secret".to_string(),
        number: "5511999999999".to_string(),
    }
}

#[tokio::test]
async fn test_evolution_request() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/message/sendText/main"))
        .and(header("apikey", "secret"))
        .and(body_json(json!({ "number": "5511999999999", "text": "web-1 is down" })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = EvolutionNotifier::new(Client::new(), gateway(&server, "/message/sendText/main"));
    assert_ok!(notifier.send_alert("web-1 is down").await);
}

#[tokio::test]
async fn test_wuzapi_and_meow_requests() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/send/text"))
        .and(header("token", "secret"))
        .and(body_json(json!({ "Phone": "5511999999999", "Body": "web-1 is down" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    for flavor in [GatewayFlavor::Wuzapi, GatewayFlavor::Meow] {
        let notifier = WuzapiNotifier::new(Client::new(), gateway(&server, "/chat/send/text"), flavor);
        assert_ok!(notifier.send_alert("web-1 is down").await);
    }
}

#[tokio::test]
async fn test_discord_mentions_user() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/api/webhooks/1/abc"))
        .and(body_json(json!({ "content": "web-1 is down\n<@42>" })))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = DiscordNotifier::new(
        Client::new(),
        Discord {
            url: format!("{}/api/webhooks/1/abc", server.uri()),
            user_id: Some("42".to_string()),
        },
    );
    notifier.send_alert("web-1 is down").await.unwrap();
}

#[tokio::test]
async fn test_webhook_payload() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/hook"))
        .and(body_partial_json(json!({ "message": "web-1 is down" })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = WebhookNotifier::new(
        Client::new(),
        Webhook {
            url: format!("{}/hook", server.uri()),
        },
    );
    notifier.send_alert("web-1 is down").await.unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_rejected_delivery() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid apikey"))
        .mount(&server)
        .await;

    let notifier = EvolutionNotifier::new(Client::new(), gateway(&server, "/send"));
    let result = notifier.send_alert("web-1 is down").await;

    assert_matches!(
        result,
        Err(DeliveryError::Rejected { status: 401, body }) if body == "invalid apikey"
    );
}

#[tokio::test]
async fn test_incomplete_gateway_sends_nothing() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut incomplete = gateway(&server, "/send");
    incomplete.number = String::new();

    let notifier = WuzapiNotifier::new(Client::new(), incomplete, GatewayFlavor::Wuzapi);
    let result = notifier.send_alert("web-1 is down").await;

    assert_matches!(result, Err(DeliveryError::NotConfigured(_)));
}
