// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::tests::test_context::{new_test_context, test_app};
use ed25519_dalek::Signer;
use serde_json::json;

#[tokio::test]
async fn introduce_then_answer_issues_a_session() {
    let (app, keypair) = test_app("demoClient", "127.0.0.0/24");
    let ctx = new_test_context(vec![app]).await;

    let resp = ctx
        .post("/introduce", json!({ "myNameIs": "demoClient" }))
        .await;
    let question = resp["data"]["question"].as_str().unwrap().to_string();
    assert!(!question.is_empty());

    let msg = base64::decode(&question).unwrap();
    let signature = base64::encode(keypair.sign(&msg).to_bytes());

    let resp = ctx
        .post(
            "/answer",
            json!({
                "myNameIs": "demoClient",
                "yourQuestionWas": question,
                "myAnswerIs": signature,
            }),
        )
        .await;

    assert!(resp["data"]["welcomePresent"].as_str().unwrap().len() > 0);
    assert!(resp["data"]["welcomePackage"].is_object());
}

#[tokio::test]
async fn introduce_rejects_unknown_app() {
    let ctx = new_test_context(vec![]).await.expect_status_code(401);
    ctx.post("/introduce", json!({ "myNameIs": "ghost" })).await;
}

#[tokio::test]
async fn introduce_rejects_ip_outside_bind_cidr() {
    let (app, _keypair) = test_app("demoClient", "10.0.0.0/24");
    let ctx = new_test_context(vec![app])
        .await
        .expect_status_code(401)
        .from_addr("127.0.0.1:9000");

    ctx.post("/introduce", json!({ "myNameIs": "demoClient" })).await;
}

#[tokio::test]
async fn answer_rejects_when_ip_differs_from_introduce() {
    let (app, keypair) = test_app("demoClient", "127.0.0.0/16");
    let ctx = new_test_context(vec![app]).await;

    let resp = ctx
        .from_addr("127.0.0.1:9000")
        .post("/introduce", json!({ "myNameIs": "demoClient" }))
        .await;
    let question = resp["data"]["question"].as_str().unwrap().to_string();

    let msg = base64::decode(&question).unwrap();
    let signature = base64::encode(keypair.sign(&msg).to_bytes());

    let resp = ctx
        .from_addr("127.0.2.1:9001")
        .expect_status_code(401)
        .post(
            "/answer",
            json!({
                "myNameIs": "demoClient",
                "yourQuestionWas": question,
                "myAnswerIs": signature,
            }),
        )
        .await;
    assert_eq!(resp["code"], 401);
}

#[tokio::test]
async fn answer_rejects_bad_signature() {
    let (app, _keypair) = test_app("demoClient", "127.0.0.0/24");
    let forged_keypair = {
        let mut csprng = rand::rngs::OsRng;
        ed25519_dalek::Keypair::generate(&mut csprng)
    };
    let ctx = new_test_context(vec![app]).await;

    let resp = ctx.post("/introduce", json!({ "myNameIs": "demoClient" })).await;
    let question = resp["data"]["question"].as_str().unwrap().to_string();

    let msg = base64::decode(&question).unwrap();
    let signature = base64::encode(forged_keypair.sign(&msg).to_bytes());

    let resp = ctx
        .expect_status_code(406)
        .post(
            "/answer",
            json!({
                "myNameIs": "demoClient",
                "yourQuestionWas": question,
                "myAnswerIs": signature,
            }),
        )
        .await;
    assert_eq!(resp["code"], 406);
}

#[tokio::test]
async fn answer_rejects_undecodable_fields() {
    let (app, _keypair) = test_app("demoClient", "127.0.0.0/24");
    let ctx = new_test_context(vec![app]).await;

    let resp = ctx.post("/introduce", json!({ "myNameIs": "demoClient" })).await;
    let question = resp["data"]["question"].as_str().unwrap().to_string();

    let resp = ctx
        .expect_status_code(400)
        .post(
            "/answer",
            json!({
                "myNameIs": "demoClient",
                "yourQuestionWas": question,
                "myAnswerIs": "not-valid-base64!!!",
            }),
        )
        .await;
    assert_eq!(resp["code"], 400);
}

#[tokio::test]
async fn knock_requires_a_bearer_session() {
    let ctx = new_test_context(vec![]).await.expect_status_code(401);
    ctx.post("/knock", json!({})).await;
}
