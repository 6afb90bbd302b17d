//! Job tokens: file-based mutual exclusion across jobs
//!
//! A token is a text file whose contents are the signature of the job
//! holding it. Presence means held, absence means free. Acquisition links a
//! fully written temp file into place; the link fails atomically when the
//! token already exists, which is the whole protocol.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write as _;
use std::path::{Path, PathBuf};

/// Result of one acquisition attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    /// Created by this attempt
    Acquired,
    /// Already present with our signature (earlier node in the same job)
    AlreadyOurs,
    /// Held by another job
    HeldBy(String),
}

/// Acquires and tracks tokens for one job
pub struct TokenArbiter {
    signature: String,
    created: Vec<PathBuf>,
}

impl TokenArbiter {
    pub fn new(signature: &str) -> Self {
        Self {
            signature: signature.to_string(),
            created: Vec::new(),
        }
    }

    /// Try to take one token
    pub fn try_acquire(&mut self, token: &Path) -> Result<TokenState> {
        if !token.exists() && self.create_token(token)? {
            self.created.push(token.to_path_buf());
            return Ok(TokenState::Acquired);
        }
        // Someone beat us to it, or it was already there: read the holder
        let holder = fs::read_to_string(token)
            .with_context(|| format!("Failed to read token {}", token.display()))?;
        let holder = holder.trim().to_string();
        if holder == self.signature {
            Ok(TokenState::AlreadyOurs)
        } else {
            Ok(TokenState::HeldBy(holder))
        }
    }

    /// Attempt every token, then report conflicts: token path → holder.
    ///
    /// Tokens acquired by this attempt stay held regardless of conflicts;
    /// call `release_created` to roll them back before aborting.
    pub fn acquire_all(&mut self, tokens: &[PathBuf]) -> Result<BTreeMap<PathBuf, String>> {
        let mut conflicts = BTreeMap::new();
        for token in tokens {
            if let TokenState::HeldBy(holder) = self.try_acquire(token)? {
                conflicts.insert(token.clone(), holder);
            }
        }
        Ok(conflicts)
    }

    /// Delete every token this arbiter created (acquisition rollback).
    ///
    /// Never called on a successful run: tokens stay owned for the rest of
    /// the job.
    pub fn release_created(&mut self) -> Result<()> {
        for token in self.created.drain(..) {
            match fs::remove_file(&token) {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err)
                        .with_context(|| format!("Failed to release token {}", token.display()));
                }
            }
        }
        Ok(())
    }

    /// Write the signature to a temp file and link it into place. Returns
    /// false when the token appeared in the meantime.
    fn create_token(&self, token: &Path) -> Result<bool> {
        let parent = token
            .parent()
            .with_context(|| format!("Token path {} has no parent", token.display()))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
        let mut temp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("Failed to create temp file in {}", parent.display()))?;
        temp.write_all(self.signature.as_bytes())
            .with_context(|| format!("Failed to write token {}", token.display()))?;
        temp.flush()?;
        match fs::hard_link(temp.path(), token) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
            Err(err) => {
                Err(err).with_context(|| format!("Failed to place token {}", token.display()))
            }
        }
    }
}

/// Read the signature currently holding a token, if any
pub fn read_holder(token: &Path) -> Result<Option<String>> {
    match fs::read_to_string(token) {
        Ok(content) => Ok(Some(content.trim().to_string())),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to read token {}", token.display()))
        }
    }
}
