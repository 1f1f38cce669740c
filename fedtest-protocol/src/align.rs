//! `sha256_sal`: salted-hash blind sample alignment.
//!
//! Each data party hashes its row key tuples with a shared salt and publishes
//! only the hashes. With a coordinator, the coordinator intersects every
//! party's hashes and publishes the intersection. Without one, each party
//! collects its peers' hashes and intersects locally. Every party then maps
//! the intersection back onto its own rows, so no party learns identifiers
//! outside the intersection.
//!
//! Aligned rows are reported sorted by key tuple, so parties agree on order
//! as well as content.

use async_trait::async_trait;
use fedtest_types::Role;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

use crate::contract::Aligner;
use crate::federation::FileFederation;
use crate::input::SecurityParam;
use crate::ProtocolError;

/// Method identifier.
pub const SHA256_SAL: &str = "sha256_sal";

const HASHES: &str = "align.hashes";
const INTERSECTION: &str = "align.intersection";

/// Reference blind aligner.
#[derive(Debug, Clone)]
pub struct HashAligner {
    federation: FileFederation,
    salt: String,
}

impl HashAligner {
    /// Build an aligner from the case's security schemes.
    ///
    /// Accepts a single `sha256` scheme with an optional `salt` string.
    /// No scheme means an empty salt.
    pub fn new(federation: FileFederation, security: &[SecurityParam]) -> Result<Self, ProtocolError> {
        let mut salt = String::new();
        for (scheme, params) in security {
            if scheme != "sha256" {
                return Err(ProtocolError::UnsupportedMethod(format!(
                    "security scheme {} with {}",
                    scheme, SHA256_SAL
                )));
            }
            match params.get("salt") {
                None => {}
                Some(serde_json::Value::String(s)) => salt = s.clone(),
                Some(other) => {
                    return Err(ProtocolError::InvalidInput(format!(
                        "sha256 salt must be a string, got {}",
                        other
                    )))
                }
            }
        }
        Ok(Self { federation, salt })
    }

    fn digest(&self, key: &[&str]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        for part in key {
            // Length-prefix each part so ("ab","c") and ("a","bc") differ.
            hasher.update((part.len() as u64).to_le_bytes());
            hasher.update(part.as_bytes());
        }
        hex::encode(hasher.finalize())
    }

    async fn coordinate(&self) -> Result<(), ProtocolError> {
        let parties = self.federation.data_parties();
        let published: Vec<(_, BTreeSet<String>)> =
            self.federation.collect_all(HASHES, &parties).await?;
        let intersection = intersect(published.into_iter().map(|(_, h)| h));
        tracing::info!(
            parties = parties.len(),
            common = intersection.len(),
            "Coordinator intersected hashes"
        );
        self.federation.publish(INTERSECTION, &intersection).await
    }

    async fn align_rows(&self, id_cols: &[Vec<String>]) -> Result<Vec<Vec<String>>, ProtocolError> {
        let rows = row_count(id_cols)?;

        let mut by_hash: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for i in 0..rows {
            let key: Vec<&str> = id_cols.iter().map(|c| c[i].as_str()).collect();
            by_hash.insert(self.digest(&key), key);
        }
        let mine: BTreeSet<String> = by_hash.keys().cloned().collect();
        self.federation.publish(HASHES, &mine).await?;

        let common: BTreeSet<String> = if self.federation.has_coordinator() {
            self.federation
                .collect(INTERSECTION, Role::Coordinator)
                .await?
        } else {
            let peers = self.federation.data_peers();
            let published: Vec<(_, BTreeSet<String>)> =
                self.federation.collect_all(HASHES, &peers).await?;
            intersect(std::iter::once(mine).chain(published.into_iter().map(|(_, h)| h)))
        };

        let mut aligned: Vec<Vec<&str>> = common
            .iter()
            .filter_map(|hash| by_hash.get(hash).cloned())
            .collect();
        aligned.sort();

        Ok((0..id_cols.len())
            .map(|c| aligned.iter().map(|row| row[c].to_string()).collect())
            .collect())
    }
}

#[async_trait]
impl Aligner for HashAligner {
    async fn align(&self, id_cols: &[Vec<String>]) -> Result<Vec<Vec<String>>, ProtocolError> {
        if self.federation.me().is_coordinator() {
            self.coordinate().await?;
            return Ok(Vec::new());
        }
        self.align_rows(id_cols).await
    }
}

fn row_count(id_cols: &[Vec<String>]) -> Result<usize, ProtocolError> {
    let Some(first) = id_cols.first() else {
        return Err(ProtocolError::InvalidInput(
            "data party has no identifier columns".to_string(),
        ));
    };
    if id_cols.iter().any(|c| c.len() != first.len()) {
        return Err(ProtocolError::InvalidInput(
            "identifier columns differ in length".to_string(),
        ));
    }
    Ok(first.len())
}

fn intersect(mut sets: impl Iterator<Item = BTreeSet<String>>) -> BTreeSet<String> {
    let Some(first) = sets.next() else {
        return BTreeSet::new();
    };
    sets.fold(first, |acc, set| acc.intersection(&set).cloned().collect())
}
