// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! In-memory apps/questions/sessions tables plus the 5s expiry sweeper.
//! All three maps are read-mostly; a mutex per map is enough given the
//! short critical sections.

use chrono::{DateTime, Utc};
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, Signer, Verifier};
use ipnet::IpNet;
use rand::RngCore;
use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

#[derive(Debug, thiserror::Error)]
pub enum AuthDataError {
    #[error("invalid CIDR {0}: {1}")]
    BadCidr(String, String),
    #[error("invalid ed25519 key material: {0}")]
    BadKey(String),
}

/// A registered signing client: its Ed25519 keypair (used only by the
/// server to *generate* quiz answers, never to hold a client secret) and
/// the CIDR it's allowed to connect from.
pub struct App {
    pub name: String,
    pub keypair: Keypair,
    pub bind_cidr: IpNet,
}

impl App {
    pub fn new(name: String, public_key: &[u8], private_key: &[u8], bind_cidr: &str) -> Result<Self, AuthDataError> {
        let secret = SecretKey::from_bytes(private_key)
            .map_err(|e| AuthDataError::BadKey(e.to_string()))?;
        let public = PublicKey::from_bytes(public_key)
            .map_err(|e| AuthDataError::BadKey(e.to_string()))?;
        let keypair = Keypair { secret, public };
        let bind_cidr = IpNet::from_str(bind_cidr)
            .map_err(|e| AuthDataError::BadCidr(bind_cidr.to_string(), e.to_string()))?;
        Ok(Self {
            name,
            keypair,
            bind_cidr,
        })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        self.bind_cidr.contains(&ip)
    }

    pub fn verify(&self, msg: &[u8], sig: &[u8]) -> bool {
        match Signature::from_bytes(sig) {
            Ok(sig) => self.keypair.public.verify(msg, &sig).is_ok(),
            Err(_) => false,
        }
    }

    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.keypair.sign(msg)
    }
}

#[derive(Clone)]
pub struct Question {
    pub app_name: String,
    pub request_ip: IpAddr,
    pub expires: DateTime<Utc>,
}

#[derive(Clone)]
pub struct Quiz {
    pub question: String, // base64 nonce
    pub answer: String,   // base64 server signature of the nonce
    pub key_id: String,
}

#[derive(Clone)]
pub struct Session {
    pub session_id: String,
    pub jws: String,
    pub app_name: String,
    pub expires: DateTime<Utc>,
    pub quizzes: HashMap<String, Quiz>, // "SYMBOL:ADDRESS" -> Quiz
}

/// Owns the three auth tables. Handlers obtain fetch-check-act semantics
/// through `get_question`/`get_session`, which treat an expired entry the
/// same as a missing one without relying on the sweeper having already run.
pub struct AuthData {
    apps: RwLock<HashMap<String, Arc<App>>>,
    questions: RwLock<HashMap<String, Question>>,
    sessions: RwLock<HashMap<String, Session>>,
}

impl AuthData {
    pub fn new() -> Self {
        Self {
            apps: RwLock::new(HashMap::new()),
            questions: RwLock::new(HashMap::new()),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub async fn load_apps(&self, apps: Vec<App>) {
        let mut table = self.apps.write().await;
        for app in apps {
            table.insert(app.name.clone(), Arc::new(app));
        }
    }

    pub async fn insert_app(&self, app: App) {
        self.apps.write().await.insert(app.name.clone(), Arc::new(app));
    }

    pub async fn get_app(&self, name: &str) -> Option<Arc<App>> {
        self.apps.read().await.get(name).cloned()
    }

    pub async fn get_question(&self, id: &str) -> Option<Question> {
        let mut table = self.questions.write().await;
        match table.get(id) {
            Some(q) if q.expires > Utc::now() => Some(q.clone()),
            Some(_) => {
                table.remove(id);
                None
            }
            None => None,
        }
    }

    pub async fn create_question(&self, question: Question) -> String {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let id = base64::encode(bytes);
        self.questions.write().await.insert(id.clone(), question);
        id
    }

    pub async fn remove_question(&self, id: &str) {
        self.questions.write().await.remove(id);
    }

    pub async fn get_session(&self, id: &str) -> Option<Session> {
        let mut table = self.sessions.write().await;
        match table.get(id) {
            Some(s) if s.expires > Utc::now() => Some(s.clone()),
            Some(_) => {
                table.remove(id);
                None
            }
            None => None,
        }
    }

    pub async fn create_session(&self, id: String, session: Session) {
        self.sessions.write().await.insert(id, session);
    }

    /// Deletes all questions/sessions whose `expires` is in the past.
    async fn sweep(&self) {
        let now = Utc::now();
        let removed_q = {
            let mut table = self.questions.write().await;
            let before = table.len();
            table.retain(|_, q| q.expires > now);
            before - table.len()
        };
        let removed_s = {
            let mut table = self.sessions.write().await;
            let before = table.len();
            table.retain(|_, s| s.expires > now);
            before - table.len()
        };
        if removed_q > 0 || removed_s > 0 {
            tracing::debug!(removed_q, removed_s, "expiry sweep");
        }
    }

    /// Spawns the 5s background sweeper. Returned handle can be aborted for
    /// deterministic shutdown in tests.
    pub fn start_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(5));
            loop {
                ticker.tick().await;
                this.sweep().await;
            }
        })
    }
}

impl Default for AuthData {
    fn default() -> Self {
        Self::new()
    }
}
