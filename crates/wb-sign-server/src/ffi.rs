// Copyright (c) Whitebox Signing Service Contributors
// SPDX-License-Identifier: Apache-2.0

//! Safe wrapper over the whitebox-cryptography native library.
//!
//! The native library is opened dynamically (the Rust analogue of the
//! original's static `cgo` link) so this module has no build-script or
//! linker coupling: it is a pure FFI boundary that can be swapped out in
//! tests. Every call copies native-owned buffers into caller-owned `Vec<u8>`
//! before returning and frees the native buffer immediately after — no raw
//! pointer from the library ever outlives a single adapter call.
//!
//! The one pointer that *does* need to outlive a call is `AppID`: the native
//! side keeps using it as a `char*` tag for the lifetime of a [`WhiteBox`].
//! We never cache that pointer. Each call below builds a fresh
//! `CString` from the owned `app_id` field and only its borrow crosses the
//! FFI boundary, so there is no dangling-pointer hazard even though the
//! native library may itself retain the bytes only for the call's duration.

use crate::chain::BlockChainType;
use libloading::{Library, Symbol};
use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_uchar};

#[derive(Debug, thiserror::Error)]
pub enum FfiError {
    #[error("failed to load native whitebox library at {0}: {1}")]
    LoadLibrary(String, String),
    #[error("missing native symbol {0}: {1}")]
    MissingSymbol(&'static str, String),
    #[error("native call {0} returned NULL")]
    NullReturn(&'static str),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("app id contains interior NUL byte")]
    AppIdNul,
}

/// Signing backend seam: [`FfiAdapter`] is the real implementation; tests
/// substitute an in-memory fake so the auth/keystore/HTTP layers can be
/// exercised without a native library on disk, the same shape jito's
/// `AuthServiceImpl<V: ValidatorAuther>` uses to keep its validator lookup
/// swappable in tests.
pub trait SigningBackend: Send + Sync {
    fn init(&self, app_id: &str) -> Result<WhiteBox, FfiError>;
    fn public_key(&self, wb: &WhiteBox, bc_type: BlockChainType) -> Result<String, FfiError>;
    fn sign(&self, wb: &WhiteBox, bc_type: BlockChainType, hash: &[u8]) -> Result<Vec<u8>, FfiError>;
    fn recovery(&self, wb: &WhiteBox, user_key: &[u8], server_key: &[u8]) -> Result<Vec<u8>, FfiError>;
    fn restore(&self, app_id: &str, user_key: &[u8], recovery_data: &[u8]) -> Result<WhiteBox, FfiError>;
}

/// An opaque whitebox blob tagged with the AppID it belongs to. The server
/// never inspects `bytes`; it only ever passes them back to the native
/// library.
#[derive(Debug, Clone)]
pub struct WhiteBox {
    pub app_id: String,
    pub bytes: Vec<u8>,
}

type InitFn = unsafe extern "C" fn(app_id: *const c_char) -> *mut c_uchar;
type PublicKeyFn = unsafe extern "C" fn(
    app_id: *const c_char,
    wb_data: *const c_uchar,
    wb_data_len: c_int,
    coin_symbol: *const c_char,
    hd_depth: c_int,
    hd_change: c_int,
    hd_index: c_int,
) -> *mut c_char;
type SignFn = unsafe extern "C" fn(
    app_id: *const c_char,
    wb_data: *const c_uchar,
    wb_data_len: c_int,
    coin_symbol: *const c_char,
    hd_depth: c_int,
    hd_change: c_int,
    hd_index: c_int,
    hash_message: *const c_uchar,
    hash_len: c_int,
) -> *mut c_uchar;
type RecoveryFn = unsafe extern "C" fn(
    app_id: *const c_char,
    wb_data: *const c_uchar,
    wb_data_len: c_int,
    user_key: *const c_uchar,
    server_key: *const c_uchar,
) -> *mut c_char;
type RestoreFn = unsafe extern "C" fn(
    app_id: *const c_char,
    user_key: *const c_uchar,
    recovery_data: *const c_char,
) -> *mut c_uchar;

const RECOVERY_KEY_LEN: usize = 128;
const RECOVERY_MAX_LEN: usize = 1024;

/// Safe wrapper over the four native entry points. Holds the loaded library
/// alive for the process lifetime; symbols borrow from it.
pub struct FfiAdapter {
    _lib: Library,
    init: Symbol<'static, InitFn>,
    public_key: Symbol<'static, PublicKeyFn>,
    sign: Symbol<'static, SignFn>,
    recovery: Symbol<'static, RecoveryFn>,
    restore: Symbol<'static, RestoreFn>,
}

// SAFETY: the native library is documented as thread-safe per
// distinct WhiteBox; the adapter itself holds no mutable state beyond the
// loaded symbols, so sharing it across threads is sound as long as callers
// honor the "no concurrent mutation of a single WhiteBox" contract.
unsafe impl Send for FfiAdapter {}
unsafe impl Sync for FfiAdapter {}

impl FfiAdapter {
    /// Loads the native library from `path`. The returned adapter borrows
    /// its symbols from a library it owns for its own lifetime; we leak the
    /// `Library` handle's borrow checker concerns by transmuting the symbol
    /// lifetime to `'static`, which is sound because `_lib` is never moved
    /// out of `self` and outlives every symbol call.
    pub fn load(path: &str) -> Result<Self, FfiError> {
        let lib = unsafe { Library::new(path) }
            .map_err(|e| FfiError::LoadLibrary(path.to_string(), e.to_string()))?;

        unsafe {
            let init: Symbol<InitFn> = lib
                .get(b"TrustSigner_getWBInitializeData")
                .map_err(|e| FfiError::MissingSymbol("TrustSigner_getWBInitializeData", e.to_string()))?;
            let public_key: Symbol<PublicKeyFn> = lib
                .get(b"TrustSigner_getWBPublicKey")
                .map_err(|e| FfiError::MissingSymbol("TrustSigner_getWBPublicKey", e.to_string()))?;
            let sign: Symbol<SignFn> = lib
                .get(b"TrustSigner_getWBSignatureData")
                .map_err(|e| FfiError::MissingSymbol("TrustSigner_getWBSignatureData", e.to_string()))?;
            let recovery: Symbol<RecoveryFn> = lib
                .get(b"TrustSigner_getRecoveryData")
                .map_err(|e| FfiError::MissingSymbol("TrustSigner_getRecoveryData", e.to_string()))?;
            let restore: Symbol<RestoreFn> = lib
                .get(b"TrustSigner_restoreWhiteBox")
                .map_err(|e| FfiError::MissingSymbol("TrustSigner_restoreWhiteBox", e.to_string()))?;

            // Extend the borrow to 'static: sound because `_lib` is stored
            // alongside the symbols in the same struct and dropped last.
            let init: Symbol<'static, InitFn> = std::mem::transmute(init);
            let public_key: Symbol<'static, PublicKeyFn> = std::mem::transmute(public_key);
            let sign: Symbol<'static, SignFn> = std::mem::transmute(sign);
            let recovery: Symbol<'static, RecoveryFn> = std::mem::transmute(recovery);
            let restore: Symbol<'static, RestoreFn> = std::mem::transmute(restore);

            Ok(Self {
                _lib: lib,
                init,
                public_key,
                sign,
                recovery,
                restore,
            })
        }
    }

    fn app_id_cstring(app_id: &str) -> Result<CString, FfiError> {
        CString::new(app_id).map_err(|_| FfiError::AppIdNul)
    }

    /// `init(app_id) -> wb_blob`. The first 4 bytes of the native return
    /// buffer are a little-endian `int32` length header used to size the
    /// copy; the header itself is NOT included in the returned blob.
    pub fn init(&self, app_id: &str) -> Result<WhiteBox, FfiError> {
        let c_app_id = Self::app_id_cstring(app_id)?;
        unsafe {
            let ptr = (self.init)(c_app_id.as_ptr());
            if ptr.is_null() {
                return Err(FfiError::NullReturn("TrustSigner_getWBInitializeData"));
            }
            let header = std::slice::from_raw_parts(ptr, 4);
            let len = i32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let body = std::slice::from_raw_parts(ptr.add(4), len);
            let bytes = body.to_vec();
            libc::free(ptr as *mut libc::c_void);
            Ok(WhiteBox {
                app_id: app_id.to_string(),
                bytes,
            })
        }
    }

    /// `public_key(app_id, wb, symbol, depth) -> ascii pubkey` (change=0,
    /// index=0; both are fixed to 0 for the single-address-per-key
    /// model this service implements).
    pub fn public_key(&self, wb: &WhiteBox, bc_type: BlockChainType) -> Result<String, FfiError> {
        let c_app_id = Self::app_id_cstring(&wb.app_id)?;
        let c_symbol = Self::app_id_cstring(bc_type.symbol())?;
        let params = bc_type.params();

        unsafe {
            let ptr = (self.public_key)(
                c_app_id.as_ptr(),
                wb.bytes.as_ptr(),
                wb.bytes.len() as c_int,
                c_symbol.as_ptr(),
                params.hd_depth as c_int,
                0,
                0,
            );
            if ptr.is_null() {
                return Err(FfiError::NullReturn("TrustSigner_getWBPublicKey"));
            }
            let bytes =
                std::slice::from_raw_parts(ptr as *const u8, params.public_key_length).to_vec();
            libc::free(ptr as *mut libc::c_void);
            String::from_utf8(bytes)
                .map_err(|e| FfiError::InvalidArgument(format!("non-ascii public key: {e}")))
        }
    }

    /// `sign(app_id, wb, symbol, depth, hash) -> sig`
    pub fn sign(
        &self,
        wb: &WhiteBox,
        bc_type: BlockChainType,
        hash: &[u8],
    ) -> Result<Vec<u8>, FfiError> {
        let c_app_id = Self::app_id_cstring(&wb.app_id)?;
        let c_symbol = Self::app_id_cstring(bc_type.symbol())?;
        let params = bc_type.params();

        unsafe {
            let ptr = (self.sign)(
                c_app_id.as_ptr(),
                wb.bytes.as_ptr(),
                wb.bytes.len() as c_int,
                c_symbol.as_ptr(),
                params.hd_depth as c_int,
                0,
                0,
                hash.as_ptr(),
                hash.len() as c_int,
            );
            if ptr.is_null() {
                return Err(FfiError::NullReturn("TrustSigner_getWBSignatureData"));
            }
            let bytes = std::slice::from_raw_parts(ptr, params.signature_length).to_vec();
            libc::free(ptr as *mut libc::c_void);
            Ok(bytes)
        }
    }

    /// `recovery(app_id, wb, user_key, server_key) -> recovery_bytes`
    /// (NUL-terminated, <= 1024 bytes). `user_key`/`server_key` MUST be
    /// exactly 128 bytes each.
    pub fn recovery(
        &self,
        wb: &WhiteBox,
        user_key: &[u8],
        server_key: &[u8],
    ) -> Result<Vec<u8>, FfiError> {
        if user_key.len() != RECOVERY_KEY_LEN || server_key.len() != RECOVERY_KEY_LEN {
            return Err(FfiError::InvalidArgument(format!(
                "recovery keys must be exactly {RECOVERY_KEY_LEN} bytes"
            )));
        }
        let c_app_id = Self::app_id_cstring(&wb.app_id)?;

        unsafe {
            let ptr = (self.recovery)(
                c_app_id.as_ptr(),
                wb.bytes.as_ptr(),
                wb.bytes.len() as c_int,
                user_key.as_ptr(),
                server_key.as_ptr(),
            );
            if ptr.is_null() {
                return Err(FfiError::NullReturn("TrustSigner_getRecoveryData"));
            }
            let c_str = std::ffi::CStr::from_ptr(ptr);
            let mut bytes = c_str.to_bytes().to_vec();
            bytes.truncate(RECOVERY_MAX_LEN);
            libc::free(ptr as *mut libc::c_void);
            Ok(bytes)
        }
    }

    /// `restore(app_id, user_key, recovery_data) -> wb_blob`, same
    /// length-header convention as [`FfiAdapter::init`].
    pub fn restore(
        &self,
        app_id: &str,
        user_key: &[u8],
        recovery_data: &[u8],
    ) -> Result<WhiteBox, FfiError> {
        if user_key.len() != RECOVERY_KEY_LEN {
            return Err(FfiError::InvalidArgument(format!(
                "user key must be exactly {RECOVERY_KEY_LEN} bytes"
            )));
        }
        let c_app_id = Self::app_id_cstring(app_id)?;
        let c_recovery = CString::new(recovery_data.to_vec())
            .map_err(|_| FfiError::InvalidArgument("recovery data contains interior NUL".into()))?;

        unsafe {
            let ptr = (self.restore)(c_app_id.as_ptr(), user_key.as_ptr(), c_recovery.as_ptr());
            if ptr.is_null() {
                return Err(FfiError::NullReturn("TrustSigner_restoreWhiteBox"));
            }
            let header = std::slice::from_raw_parts(ptr, 4);
            let len = i32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
            let body = std::slice::from_raw_parts(ptr.add(4), len);
            let bytes = body.to_vec();
            libc::free(ptr as *mut libc::c_void);
            Ok(WhiteBox {
                app_id: app_id.to_string(),
                bytes,
            })
        }
    }
}

impl SigningBackend for FfiAdapter {
    fn init(&self, app_id: &str) -> Result<WhiteBox, FfiError> {
        FfiAdapter::init(self, app_id)
    }

    fn public_key(&self, wb: &WhiteBox, bc_type: BlockChainType) -> Result<String, FfiError> {
        FfiAdapter::public_key(self, wb, bc_type)
    }

    fn sign(&self, wb: &WhiteBox, bc_type: BlockChainType, hash: &[u8]) -> Result<Vec<u8>, FfiError> {
        FfiAdapter::sign(self, wb, bc_type, hash)
    }

    fn recovery(&self, wb: &WhiteBox, user_key: &[u8], server_key: &[u8]) -> Result<Vec<u8>, FfiError> {
        FfiAdapter::recovery(self, wb, user_key, server_key)
    }

    fn restore(&self, app_id: &str, user_key: &[u8], recovery_data: &[u8]) -> Result<WhiteBox, FfiError> {
        FfiAdapter::restore(self, app_id, user_key, recovery_data)
    }
}

#[cfg(test)]
pub mod fakes {
    //! An in-memory [`SigningBackend`] for tests: derives a deterministic
    //! secp256k1-looking keypair from the app id instead of touching any
    //! native library. Good enough to exercise the keystore and HTTP
    //! layers; it does not implement real whitebox cryptography.
    use super::*;
    use sha2::{Digest, Sha256};

    pub struct FakeSigner;

    impl SigningBackend for FakeSigner {
        fn init(&self, app_id: &str) -> Result<WhiteBox, FfiError> {
            Ok(WhiteBox {
                app_id: app_id.to_string(),
                bytes: Sha256::digest(app_id.as_bytes()).to_vec(),
            })
        }

        fn public_key(&self, wb: &WhiteBox, _bc_type: BlockChainType) -> Result<String, FfiError> {
            // Not a real pubkey; callers in tests only need determinism
            // and a stable mapping back to the WhiteBox's app_id.
            Ok(hex::encode(&wb.bytes))
        }

        fn sign(&self, wb: &WhiteBox, _bc_type: BlockChainType, hash: &[u8]) -> Result<Vec<u8>, FfiError> {
            let mut input = wb.bytes.clone();
            input.extend_from_slice(hash);
            Ok(Sha256::digest(input).to_vec())
        }

        fn recovery(&self, wb: &WhiteBox, _user_key: &[u8], _server_key: &[u8]) -> Result<Vec<u8>, FfiError> {
            Ok(wb.bytes.clone())
        }

        fn restore(&self, app_id: &str, _user_key: &[u8], recovery_data: &[u8]) -> Result<WhiteBox, FfiError> {
            Ok(WhiteBox {
                app_id: app_id.to_string(),
                bytes: recovery_data.to_vec(),
            })
        }
    }
}
