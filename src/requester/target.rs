// Copyright 2019-2025 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

use cid::Cid;
use url::Url;

use crate::error::Error;

/// What an IPFS URL points at: a CID, or a path below a CID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustlessTarget {
    Cid(Cid),
    Path { cid: Cid, path: Vec<String> },
}

impl TrustlessTarget {
    /// Accepts `ipfs://<cid>/<path>`, path gateway URLs
    /// `http(s)://<host>/ipfs/<cid>/<path>` and subdomain gateway URLs
    /// `http(s)://<cid>.ipfs.<host>/<path>`.
    pub fn from_url(url: &Url) -> Result<Self, Error> {
        let invalid = || Error::InvalidUrl(url.to_string());
        let (cid, path) = match url.scheme() {
            "ipfs" => (url.host_str().ok_or_else(invalid)?, url.path()),
            "http" | "https" => {
                if let Some(rest) = url.path().strip_prefix("/ipfs/") {
                    rest.split_once('/').unwrap_or((rest, ""))
                } else {
                    let host = url.host_str().ok_or_else(invalid)?;
                    let (cid, _) = host.split_once(".ipfs.").ok_or_else(invalid)?;
                    (cid, url.path())
                }
            }
            _ => return Err(invalid()),
        };
        let cid = Cid::try_from(cid).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        let path: Vec<String> = path
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_owned)
            .collect();
        Ok(if path.is_empty() {
            TrustlessTarget::Cid(cid)
        } else {
            TrustlessTarget::Path { cid, path }
        })
    }

    pub fn is_cid_target(&self) -> bool {
        matches!(self, TrustlessTarget::Cid(_))
    }

    pub fn is_path_target(&self) -> bool {
        matches!(self, TrustlessTarget::Path { .. })
    }

    pub fn cid(&self) -> &Cid {
        match self {
            TrustlessTarget::Cid(cid) | TrustlessTarget::Path { cid, .. } => cid,
        }
    }

    /// Path segments below the CID, empty for CID targets.
    pub fn path(&self) -> &[String] {
        match self {
            TrustlessTarget::Cid(_) => &[],
            TrustlessTarget::Path { path, .. } => path,
        }
    }
}
