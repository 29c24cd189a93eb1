// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! `/introduce` and `/answer`, plus the JWT authenticator filter shared by
//! every protected route.

use crate::auth::data::{Question, Quiz, Session};
use crate::context::Context;
use crate::error::ServiceError;
use base64::DecodeError;
use chrono::{Duration, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use warp::Filter;

#[derive(Debug, Deserialize)]
pub struct IntroduceRequest {
    #[serde(rename = "myNameIs")]
    pub my_name_is: String,
}

#[derive(Debug, Serialize)]
pub struct IntroduceResponse {
    pub question: String,
    pub expires: i64,
}

pub async fn introduce(
    ctx: Context,
    remote_ip: Option<IpAddr>,
    req: IntroduceRequest,
) -> Result<IntroduceResponse, ServiceError> {
    if req.my_name_is.is_empty() {
        return Err(ServiceError::Auth("unknown app".into()));
    }
    let app = ctx
        .auth_data
        .get_app(&req.my_name_is)
        .await
        .ok_or_else(|| ServiceError::Auth("unknown app".into()))?;

    let ip = remote_ip.ok_or_else(|| ServiceError::Auth("no remote address".into()))?;
    if !app.contains(ip) {
        return Err(ServiceError::Auth("ip not in bind CIDR".into()));
    }

    let expires = Utc::now() + Duration::seconds(ctx.config.auth.question_expires);
    let question_id = ctx
        .auth_data
        .create_question(Question {
            app_name: app.name.clone(),
            request_ip: ip,
            expires,
        })
        .await;

    Ok(IntroduceResponse {
        question: question_id,
        expires: expires.timestamp(),
    })
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    #[serde(rename = "myNameIs")]
    pub my_name_is: String,
    #[serde(rename = "yourQuestionWas")]
    pub your_question_was: String,
    #[serde(rename = "myAnswerIs")]
    pub my_answer_is: String,
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    #[serde(rename = "welcomePresent")]
    pub welcome_present: String,
    #[serde(rename = "welcomePackage")]
    pub welcome_package: std::collections::HashMap<String, String>,
    pub expires: i64,
}

pub async fn answer(
    ctx: Context,
    remote_ip: Option<IpAddr>,
    req: AnswerRequest,
) -> Result<AnswerResponse, ServiceError> {
    if req.my_name_is.is_empty() || req.my_answer_is.is_empty() {
        return Err(ServiceError::Auth("missing name or signature".into()));
    }
    let app = ctx
        .auth_data
        .get_app(&req.my_name_is)
        .await
        .ok_or_else(|| ServiceError::Auth("unknown app".into()))?;

    let question = ctx
        .auth_data
        .get_question(&req.your_question_was)
        .await
        .ok_or_else(|| ServiceError::Auth("question missing or expired".into()))?;

    if question.app_name != req.my_name_is {
        return Err(ServiceError::Auth("question belongs to a different app".into()));
    }

    let ip = remote_ip.ok_or_else(|| ServiceError::Auth("no remote address".into()))?;
    if question.request_ip != ip {
        return Err(ServiceError::Auth("answered from a different IP than introduced".into()));
    }

    let msg = base64_decode(&req.your_question_was)
        .map_err(|_| ServiceError::Input("You are so bad.".into()))?;
    let sig = base64_decode(&req.my_answer_is)
        .map_err(|_| ServiceError::Input("You are so bad.".into()))?;

    if !app.verify(&msg, &sig) {
        return Err(ServiceError::QuizMismatch);
    }

    let mut quizzes = std::collections::HashMap::new();
    let mut welcome_package = std::collections::HashMap::new();
    for (key_id, symbol_address) in ctx.keystore.get_key_map().await {
        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);
        let key_question = base64::encode(nonce);
        let key_answer = base64::encode(app.sign(&nonce).to_bytes());

        quizzes.insert(
            symbol_address.clone(),
            Quiz {
                question: key_question.clone(),
                answer: key_answer,
                key_id,
            },
        );
        welcome_package.insert(symbol_address, key_question);
    }

    let token_id = req.your_question_was.clone();
    let expires = Utc::now() + Duration::seconds(ctx.config.auth.jwt_expires);
    let jws = ctx
        .jwt
        .issue(&token_id, &app.name, Duration::seconds(ctx.config.auth.jwt_expires))
        .map_err(|e| ServiceError::Auth(format!("failed to issue session token: {e}")))?;

    ctx.auth_data
        .create_session(
            token_id.clone(),
            Session {
                session_id: token_id,
                jws: jws.clone(),
                app_name: app.name.clone(),
                expires,
                quizzes,
            },
        )
        .await;
    ctx.auth_data.remove_question(&req.your_question_was).await;

    Ok(AnswerResponse {
        welcome_present: jws,
        welcome_package,
        expires: expires.timestamp(),
    })
}

fn base64_decode(s: &str) -> Result<Vec<u8>, DecodeError> {
    base64::decode(s)
}

/// Extracts and validates the bearer JWT, looks up the claimed app and
/// session, rechecks the CIDR, and yields the live [`Session`] to the
/// downstream handler. Any failure along this chain surfaces as a uniform
/// 401 without distinguishing the reason to the caller.
pub fn authenticated(
    ctx: Context,
) -> impl Filter<Extract = (Session,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("authorization")
        .and(warp::filters::addr::remote())
        .and_then(move |auth_header: Option<String>, remote: Option<std::net::SocketAddr>| {
            let ctx = ctx.clone();
            async move {
                authenticate(&ctx, auth_header, remote.map(|a| a.ip()))
                    .await
                    .map_err(warp::reject::custom)
            }
        })
}

async fn authenticate(
    ctx: &Context,
    auth_header: Option<String>,
    remote_ip: Option<IpAddr>,
) -> Result<Session, ServiceError> {
    let header = auth_header.ok_or_else(|| ServiceError::Auth("missing Authorization header".into()))?;
    let token = header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ServiceError::Auth("malformed Authorization header".into()))?;

    let claims = ctx
        .jwt
        .decode(token)
        .map_err(|e| ServiceError::Auth(format!("invalid token: {e}")))?;

    let app = ctx
        .auth_data
        .get_app(&claims.sub)
        .await
        .ok_or_else(|| ServiceError::Auth("unknown app".into()))?;

    let ip = remote_ip.ok_or_else(|| ServiceError::Auth("no remote address".into()))?;
    if !app.contains(ip) {
        return Err(ServiceError::Auth("ip not in bind CIDR".into()));
    }

    let session = ctx
        .auth_data
        .get_session(&claims.jti)
        .await
        .ok_or_else(|| ServiceError::Auth("session missing or expired".into()))?;

    if session.app_name != claims.sub {
        return Err(ServiceError::Auth("session/app mismatch".into()));
    }

    Ok(session)
}
