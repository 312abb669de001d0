// Copyright (c) 2026 Amunchain
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! Participant keystore: one seed, one extended key, per-app child keys.
//!
//! ## Hardening
//! - **Atomic writes** for the seed file.
//! - **Seed-at-rest encryption** (optional) via `STATECHANNELS_KEY_PASSPHRASE`.
//! - **Audit log** of signed digests with rotation (best-effort).
//! - **Zeroization** of seed buffers.
//!
//! ### Seed file format
//! Plain: 64 raw seed bytes. Encrypted:
//! `MAGIC(8) || SALT(16) || NONCE(12) || CIPHERTEXT+TAG(..)` (AES-256-GCM,
//! key from PBKDF2-HMAC-SHA256 over the passphrase).

use ring::{
    aead, pbkdf2,
    rand::{SecureRandom, SystemRandom},
};
use std::{
    fs,
    io::Write,
    num::NonZeroU32,
    path::{Path, PathBuf},
    sync::Mutex,
    time::{Duration, Instant},
};
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::core::{
    security::{
        signatures::sign_digest,
        xkey::{xkey_kth_secret, ExtendedPrivateKey, ExtendedPublicKey, KeyError},
    },
    types::{Signature, H256},
};

const PASSPHRASE_ENV: &str = "STATECHANNELS_KEY_PASSPHRASE";
const SEED_FILE: &str = "participant.seed";
const AUDIT_FILE: &str = "audit.log";
const SEED_LEN: usize = 64;

const SEED_FILE_MAGIC: &[u8] = b"SCSEED01";
const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const PBKDF2_ITERS: u32 = 100_000;

const MAX_AUDIT_BYTES: u64 = 32 * 1024 * 1024; // 32 MiB
const AUDIT_ROTATE_KEEP: usize = 3;
const DEFAULT_SIGNS_PER_SEC: u32 = 10_000;

/// Keystore errors.
#[derive(Debug, Error)]
pub enum KeystoreError {
    /// Filesystem failure.
    #[error("io")]
    Io,
    /// Seed file undecodable.
    #[error("invalid seed encoding")]
    InvalidSeed,
    /// Encrypted seed without a passphrase.
    #[error("missing passphrase (set STATECHANNELS_KEY_PASSPHRASE)")]
    MissingPassphrase,
    /// AEAD or RNG failure.
    #[error("crypto")]
    Crypto,
    /// Signing budget exhausted for this second.
    #[error("rate limited")]
    RateLimited,
    /// Key derivation failed.
    #[error("key: {0}")]
    Key(#[from] KeyError),
}

/// Participant signer: its public identity plus digest signing at a key index.
pub trait Signer: Send + Sync {
    /// Extended public key identifying this participant.
    fn extended_public_key(&self) -> &ExtendedPublicKey;
    /// Sign `digest` with child key `key_index`.
    fn sign_digest(&self, digest: &H256, key_index: u64) -> Result<Signature, KeystoreError>;
}

/// Seed-backed signer.
pub struct SeedBackend {
    root: ExtendedPrivateKey,
    xpub: ExtendedPublicKey,
}

impl SeedBackend {
    /// Backend from raw seed bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, KeystoreError> {
        let root = ExtendedPrivateKey::from_seed(seed)?;
        let xpub = root.neuter();
        Ok(Self { root, xpub })
    }

    /// Load `path`, or create it with a fresh random seed.
    pub fn load_or_create(path: &Path) -> Result<Self, KeystoreError> {
        let pass = std::env::var(PASSPHRASE_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(Zeroizing::new);

        if path.exists() {
            let bytes = Zeroizing::new(fs::read(path).map_err(|_| KeystoreError::Io)?);
            let seed = if bytes.starts_with(SEED_FILE_MAGIC) {
                let Some(p) = pass.as_deref() else {
                    return Err(KeystoreError::MissingPassphrase);
                };
                open_sealed(p.as_bytes(), &bytes)?
            } else {
                bytes
            };
            if seed.len() != SEED_LEN {
                return Err(KeystoreError::InvalidSeed);
            }
            return Self::from_seed(&seed);
        }

        let mut seed = Zeroizing::new(vec![0u8; SEED_LEN]);
        SystemRandom::new()
            .fill(seed.as_mut_slice())
            .map_err(|_| KeystoreError::Crypto)?;
        let on_disk = match pass.as_deref() {
            Some(p) => Zeroizing::new(seal(p.as_bytes(), &seed)?),
            None => seed.clone(),
        };
        atomic_write_private(path, &on_disk)?;
        Self::from_seed(&seed)
    }
}

impl Signer for SeedBackend {
    fn extended_public_key(&self) -> &ExtendedPublicKey {
        &self.xpub
    }

    fn sign_digest(&self, digest: &H256, key_index: u64) -> Result<Signature, KeystoreError> {
        let mut sk = xkey_kth_secret(&self.root, key_index)?;
        let sig = sign_digest(&sk, digest);
        sk.non_secure_erase();
        Ok(sig)
    }
}

fn seal_key(passphrase: &[u8], salt: &[u8; SALT_LEN]) -> Result<aead::LessSafeKey, KeystoreError> {
    let mut key = [0u8; 32];
    let iters = NonZeroU32::new(PBKDF2_ITERS).ok_or(KeystoreError::Crypto)?;
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iters, salt, passphrase, &mut key);
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, &key).map_err(|_| KeystoreError::Crypto);
    key.zeroize();
    Ok(aead::LessSafeKey::new(unbound?))
}

fn seal(passphrase: &[u8], seed: &[u8]) -> Result<Vec<u8>, KeystoreError> {
    let rng = SystemRandom::new();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt).map_err(|_| KeystoreError::Crypto)?;
    let mut nonce = [0u8; NONCE_LEN];
    rng.fill(&mut nonce).map_err(|_| KeystoreError::Crypto)?;

    let key = seal_key(passphrase, &salt)?;
    let mut in_out = seed.to_vec();
    key.seal_in_place_append_tag(
        aead::Nonce::assume_unique_for_key(nonce),
        aead::Aad::from(SEED_FILE_MAGIC),
        &mut in_out,
    )
    .map_err(|_| KeystoreError::Crypto)?;

    let mut out = Vec::with_capacity(SEED_FILE_MAGIC.len() + SALT_LEN + NONCE_LEN + in_out.len());
    out.extend_from_slice(SEED_FILE_MAGIC);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&in_out);
    Ok(out)
}

fn open_sealed(passphrase: &[u8], bytes: &[u8]) -> Result<Zeroizing<Vec<u8>>, KeystoreError> {
    let header = SEED_FILE_MAGIC.len() + SALT_LEN + NONCE_LEN;
    if bytes.len() < header + TAG_LEN {
        return Err(KeystoreError::InvalidSeed);
    }
    let mut salt = [0u8; SALT_LEN];
    salt.copy_from_slice(&bytes[SEED_FILE_MAGIC.len()..SEED_FILE_MAGIC.len() + SALT_LEN]);
    let mut nonce = [0u8; NONCE_LEN];
    nonce.copy_from_slice(&bytes[SEED_FILE_MAGIC.len() + SALT_LEN..header]);

    let key = seal_key(passphrase, &salt)?;
    let mut in_out = Zeroizing::new(bytes[header..].to_vec());
    let plain = key
        .open_in_place(
            aead::Nonce::assume_unique_for_key(nonce),
            aead::Aad::from(SEED_FILE_MAGIC),
            in_out.as_mut_slice(),
        )
        .map_err(|_| KeystoreError::Crypto)?;
    Ok(Zeroizing::new(plain.to_vec()))
}

fn set_private_perms_best_effort(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
}

/// Atomic write (fsync, then rename).
fn atomic_write_private(path: &Path, bytes: &[u8]) -> Result<(), KeystoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|_| KeystoreError::Io)?;
    }
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    {
        let mut f = fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp)
            .map_err(|_| KeystoreError::Io)?;
        f.write_all(bytes).map_err(|_| KeystoreError::Io)?;
        let _ = f.sync_all();
    }
    set_private_perms_best_effort(&tmp);
    fs::rename(&tmp, path).map_err(|_| KeystoreError::Io)?;
    set_private_perms_best_effort(path);
    Ok(())
}

/// Fixed one-second window limiter.
#[derive(Debug)]
struct RateLimiter {
    window_start: Instant,
    count: u32,
    limit_per_sec: u32,
}

impl RateLimiter {
    fn new(limit_per_sec: u32) -> Self {
        Self { window_start: Instant::now(), count: 0, limit_per_sec }
    }

    fn allow(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= Duration::from_secs(1) {
            self.window_start = now;
            self.count = 0;
        }
        if self.count >= self.limit_per_sec {
            return false;
        }
        self.count = self.count.saturating_add(1);
        true
    }
}

/// Rate-limited, audited signer.
pub struct Keystore<B: Signer> {
    backend: B,
    limiter: Mutex<RateLimiter>,
    audit_path: Option<PathBuf>,
}

impl Keystore<SeedBackend> {
    /// Load or create `data_dir/participant.seed`; audit to `data_dir/audit.log`.
    pub fn open(data_dir: &str) -> Result<Self, KeystoreError> {
        let dir = PathBuf::from(data_dir);
        let backend = SeedBackend::load_or_create(&dir.join(SEED_FILE))?;
        Ok(Self::new(backend, Some(dir.join(AUDIT_FILE))))
    }

    /// In-memory keystore without an audit trail.
    pub fn from_seed(seed: &[u8]) -> Result<Self, KeystoreError> {
        Ok(Self::new(SeedBackend::from_seed(seed)?, None))
    }
}

impl<B: Signer> Keystore<B> {
    /// Wrap `backend`.
    pub fn new(backend: B, audit_path: Option<PathBuf>) -> Self {
        Self { backend, limiter: Mutex::new(RateLimiter::new(DEFAULT_SIGNS_PER_SEC)), audit_path }
    }

    /// Override the per-second signing budget.
    pub fn with_rate_limit(self, limit_per_sec: u32) -> Self {
        Self { limiter: Mutex::new(RateLimiter::new(limit_per_sec)), ..self }
    }
}

impl<B: Signer> Signer for Keystore<B> {
    fn extended_public_key(&self) -> &ExtendedPublicKey {
        self.backend.extended_public_key()
    }

    fn sign_digest(&self, digest: &H256, key_index: u64) -> Result<Signature, KeystoreError> {
        {
            let mut guard = self.limiter.lock().map_err(|_| KeystoreError::RateLimited)?;
            if !guard.allow() {
                return Err(KeystoreError::RateLimited);
            }
        }
        if let Some(path) = &self.audit_path {
            let _ = append_audit(path, digest, key_index);
        }
        self.backend.sign_digest(digest, key_index)
    }
}

fn rotate_audit_if_needed(path: &Path) {
    let Ok(md) = fs::metadata(path) else { return; };
    if md.len() <= MAX_AUDIT_BYTES {
        return;
    }
    for i in (1..=AUDIT_ROTATE_KEEP).rev() {
        let dst = PathBuf::from(format!("{}.{}", path.display(), i));
        let src = if i == 1 {
            path.to_path_buf()
        } else {
            PathBuf::from(format!("{}.{}", path.display(), i - 1))
        };
        if src.exists() {
            let _ = fs::rename(&src, &dst);
        }
    }
}

fn append_audit(path: &Path, digest: &H256, key_index: u64) -> Result<(), KeystoreError> {
    rotate_audit_if_needed(path);
    // SHA-256 of the digest only, never key material.
    let d = ring::digest::digest(&ring::digest::SHA256, digest.as_bytes());
    let line = format!(
        "{{\"action\":\"sign\",\"key_index\":{},\"digest_sha256\":\"{}\"}}\n",
        key_index,
        hex::encode(d.as_ref())
    );
    let mut f = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|_| KeystoreError::Io)?;
    set_private_perms_best_effort(path);
    f.write_all(line.as_bytes()).map_err(|_| KeystoreError::Io)?;
    Ok(())
}
