// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! `/knock` and `/sign`, gated behind the JWT + quiz checks established by
//! [`crate::auth::service::authenticated`].

use crate::auth::data::Session;
use crate::chain::BlockChainType;
use crate::context::Context;
use crate::error::ServiceError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
pub struct KnockResponse {
    pub now_unix: i64,
}

pub async fn knock(_session: Session) -> Result<KnockResponse, ServiceError> {
    Ok(KnockResponse {
        now_unix: chrono::Utc::now().timestamp(),
    })
}

#[derive(Debug, Deserialize)]
pub struct SignRequest {
    #[serde(rename = "type")]
    pub bc_type: String,
    pub address: String,
    pub answer: String,
    pub data: String,
}

#[derive(Debug, Serialize)]
pub struct SignResponse {
    pub signature: String,
}

pub async fn sign(
    ctx: Context,
    session: Session,
    req: SignRequest,
) -> Result<SignResponse, ServiceError> {
    let bc_type = BlockChainType::from_symbol(&req.bc_type)
        .ok_or_else(|| ServiceError::Input(format!("unknown blockchain type {}", req.bc_type)))?;

    let request_key = format!("{}:{}", req.bc_type, req.address);
    let quiz = session
        .quizzes
        .get(&request_key)
        .ok_or(ServiceError::QuizMismatch)?;

    if req.answer != quiz.answer {
        return Err(ServiceError::Input("answer does not match quiz".into()));
    }

    let data = hex::decode(&req.data)
        .map_err(|e| ServiceError::Ffi(format!("bad hex payload: {e}")))?;
    if data.len() % 32 != 0 {
        return Err(ServiceError::Input("data length must be 32*N".into()));
    }

    let white_box = ctx
        .keystore
        .get_white_box_data(&quiz.key_id, bc_type)
        .await
        .ok_or(ServiceError::NotFound)?;

    let timer = crate::metrics::SIGN_LATENCY_SECONDS
        .with_label_values(&[bc_type.symbol()])
        .start_timer();
    let result = ctx.ffi.sign(&white_box, bc_type, &data);
    timer.observe_duration();
    let signature = result.map_err(|e| ServiceError::Ffi(e.to_string()))?;

    Ok(SignResponse {
        signature: hex::encode(signature),
    })
}
