// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

use crate::auth::data::{Quiz, Session};
use crate::chain::BlockChainType;
use crate::ffi::fakes::FakeSigner;
use crate::ffi::SigningBackend;
use crate::keystore::KeyPairEntry;
use crate::tests::test_context::{new_test_context, test_app};
use chrono::{Duration, Utc};
use serde_json::json;

/// Inserts a ready-to-sign `KeyPairEntry` straight into the keystore's
/// in-memory index, bypassing the secret store (covered separately by
/// `keystore_test`).
async fn seed_entry(ctx: &crate::context::Context, app_id: &str) -> (String, KeyPairEntry) {
    let white_box = FakeSigner.init(app_id).unwrap();
    let address = FakeSigner.public_key(&white_box, BlockChainType::XLM).unwrap();
    let key_id = crate::keystore::key_id_for(app_id);
    let entry = KeyPairEntry {
        app_id: app_id.to_string(),
        bc_type: BlockChainType::XLM,
        address: address.clone(),
        white_box,
    };
    ctx.keystore.insert_for_test(key_id.clone(), entry.clone()).await;
    (key_id, entry)
}

/// Builds a session with a single quiz for `entry`, as `/answer` would.
fn session_with_quiz(app_name: &str, key_id: &str, entry: &KeyPairEntry, answer: &[u8]) -> (Session, Quiz) {
    let quiz = Quiz {
        question: base64::encode(b"nonce"),
        answer: base64::encode(answer),
        key_id: key_id.to_string(),
    };
    let mut quizzes = std::collections::HashMap::new();
    quizzes.insert(format!("{}:{}", entry.bc_type, entry.address), quiz.clone());
    let session = Session {
        session_id: "sess-1".to_string(),
        jws: String::new(),
        app_name: app_name.to_string(),
        expires: Utc::now() + Duration::seconds(3600),
        quizzes,
    };
    (session, quiz)
}

#[tokio::test]
async fn knock_returns_the_current_unix_time_for_a_valid_session() {
    let (app, _keypair) = test_app("demoClient", "127.0.0.0/24");
    let app_name = app.name.clone();
    let ctx = new_test_context(vec![app]).await;

    let jwt = ctx
        .inner
        .jwt
        .issue("jti-1", &app_name, Duration::seconds(3600))
        .unwrap();
    ctx.inner
        .auth_data
        .create_session(
            "jti-1".to_string(),
            Session {
                session_id: "jti-1".to_string(),
                jws: jwt.clone(),
                app_name,
                expires: Utc::now() + Duration::seconds(3600),
                quizzes: std::collections::HashMap::new(),
            },
        )
        .await;

    let resp = ctx.with_bearer_auth(jwt).post("/knock", json!({})).await;
    assert!(resp["data"]["now_unix"].as_i64().is_some());
}

#[tokio::test]
async fn sign_succeeds_for_a_matching_quiz_answer() {
    let (app, _keypair) = test_app("demoClient", "127.0.0.0/24");
    let app_name = app.name.clone();
    let ctx = new_test_context(vec![app]).await;

    let (key_id, entry) = seed_entry(&ctx.inner, "app-sign").await;
    let data = vec![0u8; 32];
    let white_box = ctx
        .inner
        .keystore
        .get_white_box_data(&key_id, BlockChainType::XLM)
        .await
        .unwrap();
    let expected_sig = ctx.inner.ffi.sign(&white_box, BlockChainType::XLM, &data).unwrap();

    let (session, quiz) = session_with_quiz(&app_name, &key_id, &entry, b"correct-answer");
    let jwt = ctx.inner.jwt.issue("jti-2", &app_name, Duration::seconds(3600)).unwrap();
    ctx.inner
        .auth_data
        .create_session("jti-2".to_string(), Session { session_id: "jti-2".to_string(), ..session })
        .await;

    let resp = ctx
        .with_bearer_auth(jwt)
        .post(
            "/sign",
            json!({
                "type": "XLM",
                "address": entry.address,
                "answer": quiz.answer,
                "data": hex::encode(&data),
            }),
        )
        .await;

    assert_eq!(resp["data"]["signature"], hex::encode(&expected_sig));
}

#[tokio::test]
async fn sign_rejects_a_wrong_quiz_answer() {
    let (app, _keypair) = test_app("demoClient", "127.0.0.0/24");
    let app_name = app.name.clone();
    let ctx = new_test_context(vec![app]).await.expect_status_code(400);

    let (key_id, entry) = seed_entry(&ctx.inner, "app-wrong-answer").await;
    let (session, _quiz) = session_with_quiz(&app_name, &key_id, &entry, b"correct-answer");
    let jwt = ctx.inner.jwt.issue("jti-3", &app_name, Duration::seconds(3600)).unwrap();
    ctx.inner
        .auth_data
        .create_session("jti-3".to_string(), Session { session_id: "jti-3".to_string(), ..session })
        .await;

    let resp = ctx
        .with_bearer_auth(jwt)
        .post(
            "/sign",
            json!({
                "type": "XLM",
                "address": entry.address,
                "answer": base64::encode("not-the-right-answer"),
                "data": hex::encode([0u8; 32]),
            }),
        )
        .await;
    assert_eq!(resp["code"], 400);
}

#[tokio::test]
async fn sign_rejects_a_quiz_for_a_different_type_or_address() {
    let (app, _keypair) = test_app("demoClient", "127.0.0.0/24");
    let app_name = app.name.clone();
    let ctx = new_test_context(vec![app]).await.expect_status_code(406);

    let (key_id, entry) = seed_entry(&ctx.inner, "app-no-quiz").await;
    let (session, quiz) = session_with_quiz(&app_name, &key_id, &entry, b"correct-answer");
    let jwt = ctx.inner.jwt.issue("jti-4", &app_name, Duration::seconds(3600)).unwrap();
    ctx.inner
        .auth_data
        .create_session("jti-4".to_string(), Session { session_id: "jti-4".to_string(), ..session })
        .await;

    let resp = ctx
        .with_bearer_auth(jwt)
        .post(
            "/sign",
            json!({
                "type": "BTC",
                "address": entry.address,
                "answer": quiz.answer,
                "data": hex::encode([0u8; 32]),
            }),
        )
        .await;
    assert_eq!(resp["code"], 406);
}

#[tokio::test]
async fn sign_rejects_data_not_a_multiple_of_32_bytes() {
    let (app, _keypair) = test_app("demoClient", "127.0.0.0/24");
    let app_name = app.name.clone();
    let ctx = new_test_context(vec![app]).await.expect_status_code(400);

    let (key_id, entry) = seed_entry(&ctx.inner, "app-bad-length").await;
    let (session, quiz) = session_with_quiz(&app_name, &key_id, &entry, b"correct-answer");
    let jwt = ctx.inner.jwt.issue("jti-5", &app_name, Duration::seconds(3600)).unwrap();
    ctx.inner
        .auth_data
        .create_session("jti-5".to_string(), Session { session_id: "jti-5".to_string(), ..session })
        .await;

    let resp = ctx
        .with_bearer_auth(jwt)
        .post(
            "/sign",
            json!({
                "type": "XLM",
                "address": entry.address,
                "answer": quiz.answer,
                "data": hex::encode([0u8; 31]),
            }),
        )
        .await;
    assert_eq!(resp["code"], 400);
}

#[tokio::test]
async fn sign_404s_when_the_keystore_has_no_matching_entry() {
    let (app, _keypair) = test_app("demoClient", "127.0.0.0/24");
    let app_name = app.name.clone();
    let ctx = new_test_context(vec![app]).await.expect_status_code(404);

    // A quiz that references a keyID the keystore never indexed.
    let quiz = Quiz {
        question: base64::encode(b"nonce"),
        answer: base64::encode(b"correct-answer"),
        key_id: "missing-key-id".to_string(),
    };
    let mut quizzes = std::collections::HashMap::new();
    quizzes.insert("XLM:GSOMEADDRESS".to_string(), quiz.clone());
    let jwt = ctx.inner.jwt.issue("jti-6", &app_name, Duration::seconds(3600)).unwrap();
    ctx.inner
        .auth_data
        .create_session(
            "jti-6".to_string(),
            Session {
                session_id: "jti-6".to_string(),
                jws: jwt.clone(),
                app_name,
                expires: Utc::now() + Duration::seconds(3600),
                quizzes,
            },
        )
        .await;

    let resp = ctx
        .with_bearer_auth(jwt)
        .post(
            "/sign",
            json!({
                "type": "XLM",
                "address": "GSOMEADDRESS",
                "answer": quiz.answer,
                "data": hex::encode([0u8; 32]),
            }),
        )
        .await;
    assert_eq!(resp["code"], 404);
}
