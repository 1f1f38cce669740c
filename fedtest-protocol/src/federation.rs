//! File federation: a directory-backed rendezvous between parties.
//!
//! Every party of a job publishes JSON messages as
//! `<root>/<job_id>/<tag>.<party>.json` and polls for the files its peers
//! publish. Writes go to a temporary name first and are renamed into place,
//! so a reader never sees a partial message.

use fedtest_types::Role;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

use crate::ProtocolError;

/// Session descriptor; its job id names the rendezvous directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConf {
    /// Job identifier shared by every party of one run.
    pub job_id: String,
}

/// Federation descriptor, as given in a role's `fed_conf`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationConf {
    /// Session (job id).
    pub session: SessionConf,
    /// Directory under which job directories are created.
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Every party of the job, including this one.
    pub parties: Vec<Role>,
    /// Poll interval while waiting for peers, in milliseconds (default: 50).
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Longest wait for any single peer message, in seconds (default: 30).
    #[serde(default = "default_wait_timeout_secs")]
    pub wait_timeout_secs: u64,
}

fn default_root() -> PathBuf {
    std::env::temp_dir().join("fedtest-federation")
}

fn default_poll_interval_ms() -> u64 {
    50
}

fn default_wait_timeout_secs() -> u64 {
    30
}

impl FederationConf {
    /// Append `suffix` to the job id.
    pub fn namespaced(mut self, suffix: &str) -> Self {
        self.session.job_id.push_str(suffix);
        self
    }

    /// Whether a coordinator takes part.
    pub fn has_coordinator(&self) -> bool {
        self.parties.iter().any(Role::is_coordinator)
    }
}

/// One party's handle on a federation job.
#[derive(Debug, Clone)]
pub struct FileFederation {
    conf: FederationConf,
    me: Role,
}

impl FileFederation {
    /// Join the job described by `conf` as `me`.
    ///
    /// # Errors
    ///
    /// Fails if `me` is not listed among the parties, a party is listed
    /// twice, or the job id is unusable as a directory name.
    pub fn new(conf: FederationConf, me: Role) -> Result<Self, ProtocolError> {
        if !conf.parties.contains(&me) {
            return Err(ProtocolError::InvalidInput(format!(
                "{} is not a party of job {}",
                me, conf.session.job_id
            )));
        }
        let mut sorted = conf.parties.clone();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != conf.parties.len() {
            return Err(ProtocolError::InvalidInput(
                "fed_conf lists a party twice".to_string(),
            ));
        }
        let job_id = &conf.session.job_id;
        if job_id.is_empty() || job_id.contains(['/', '\\']) || job_id == "." || job_id == ".." {
            return Err(ProtocolError::InvalidInput(format!(
                "job id {:?} is not a valid directory name",
                job_id
            )));
        }
        Ok(Self { conf, me })
    }

    /// This party.
    pub fn me(&self) -> Role {
        self.me
    }

    /// The federation descriptor.
    pub fn conf(&self) -> &FederationConf {
        &self.conf
    }

    /// Every data-holding party, in role order.
    pub fn data_parties(&self) -> Vec<Role> {
        let mut parties: Vec<Role> = self
            .conf
            .parties
            .iter()
            .copied()
            .filter(Role::holds_data)
            .collect();
        parties.sort();
        parties
    }

    /// Data-holding parties other than this one, in role order.
    pub fn data_peers(&self) -> Vec<Role> {
        self.data_parties()
            .into_iter()
            .filter(|p| *p != self.me)
            .collect()
    }

    /// Whether a coordinator takes part.
    pub fn has_coordinator(&self) -> bool {
        self.conf.has_coordinator()
    }

    /// Directory holding this job's messages.
    pub fn job_dir(&self) -> PathBuf {
        self.conf.root.join(&self.conf.session.job_id)
    }

    fn message_path(&self, tag: &str, party: Role) -> PathBuf {
        self.job_dir().join(format!("{}.{}.json", tag, party))
    }

    /// Publish `message` under `tag` as this party.
    pub async fn publish<T: Serialize>(&self, tag: &str, message: &T) -> Result<(), ProtocolError> {
        let dir = self.job_dir();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| ProtocolError::Federation {
                path: dir.clone(),
                source,
            })?;

        let path = self.message_path(tag, self.me);
        let payload = serde_json::to_vec(message).map_err(|source| ProtocolError::Message {
            path: path.clone(),
            source,
        })?;
        let tmp = path.with_extension("json.tmp");
        write_then_rename(&tmp, &path, &payload).await?;
        tracing::debug!(tag, party = %self.me, path = %path.display(), "Published message");
        Ok(())
    }

    /// Wait for `party` to publish under `tag`, then decode it.
    pub async fn collect<T: DeserializeOwned>(&self, tag: &str, party: Role) -> Result<T, ProtocolError> {
        let path = self.message_path(tag, party);
        let wait = Duration::from_secs(self.conf.wait_timeout_secs);
        let poll = Duration::from_millis(self.conf.poll_interval_ms.max(1));
        let started = Instant::now();

        loop {
            match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    tracing::debug!(tag, from = %party, "Collected message");
                    return serde_json::from_slice(&bytes)
                        .map_err(|source| ProtocolError::Message { path, source });
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(ProtocolError::Federation { path, source }),
            }
            if started.elapsed() >= wait {
                return Err(ProtocolError::PeerTimeout {
                    tag: tag.to_string(),
                    party,
                    waited: wait,
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Collect `tag` from each of `parties`, in the given order.
    pub async fn collect_all<T: DeserializeOwned>(
        &self,
        tag: &str,
        parties: &[Role],
    ) -> Result<Vec<(Role, T)>, ProtocolError> {
        let mut messages = Vec::with_capacity(parties.len());
        for party in parties {
            messages.push((*party, self.collect(tag, *party).await?));
        }
        Ok(messages)
    }
}

async fn write_then_rename(tmp: &Path, path: &Path, payload: &[u8]) -> Result<(), ProtocolError> {
    tokio::fs::write(tmp, payload)
        .await
        .map_err(|source| ProtocolError::Federation {
            path: tmp.to_path_buf(),
            source,
        })?;
    tokio::fs::rename(tmp, path)
        .await
        .map_err(|source| ProtocolError::Federation {
            path: path.to_path_buf(),
            source,
        })
}
