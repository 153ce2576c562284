//! Retrieval candidates: which market providers to ask for a content ID.

use std::fmt;
use std::str::FromStr;

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use wormhole_dag::ContentId;

use crate::error::{Error, Result};

/// A market provider address such as `f010088`.
///
/// Network prefix `f` (mainnet) or `t` (testnet), then a protocol digit
/// `0`-`4`, then a lowercase alphanumeric payload. ID addresses (protocol
/// `0`) carry a decimal actor ID.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MinerAddress(String);

impl MinerAddress {
    /// The address text.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for MinerAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = |reason| Error::InvalidMinerAddress {
            input: s.to_string(),
            reason,
        };

        let mut chars = s.chars();
        match chars.next() {
            Some('f') | Some('t') => {}
            _ => return Err(invalid("address must start with network prefix f or t")),
        }
        let protocol = match chars.next() {
            Some(c @ '0'..='4') => c,
            _ => return Err(invalid("unknown address protocol")),
        };

        let payload = chars.as_str();
        if payload.is_empty() {
            return Err(invalid("address payload is empty"));
        }
        if !payload
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        {
            return Err(invalid("address payload must be lowercase alphanumeric"));
        }
        if protocol == '0' && !payload.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid("ID address payload must be decimal"));
        }

        Ok(Self(s.to_string()))
    }
}

impl TryFrom<String> for MinerAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<MinerAddress> for String {
    fn from(addr: MinerAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for MinerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One potential paid provider for a content ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub miner_address: MinerAddress,
    pub root_cid: ContentId,
    /// Storage deal the provider holds the content under, if known.
    #[serde(default)]
    pub deal_id: Option<u64>,
}

impl Candidate {
    /// Candidate with no known deal.
    pub fn new(miner_address: MinerAddress, root_cid: ContentId) -> Self {
        Self {
            miner_address,
            root_cid,
            deal_id: None,
        }
    }
}

/// Parse operator-supplied miners. Each entry may itself be a
/// comma-separated list; blank entries are ignored.
pub fn parse_miners<S: AsRef<str>>(entries: &[S]) -> Result<Vec<MinerAddress>> {
    entries
        .iter()
        .flat_map(|entry| entry.as_ref().split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

/// One candidate per miner, each rooted at `root`.
pub fn candidates_for(miners: Vec<MinerAddress>, root: ContentId) -> Vec<Candidate> {
    miners
        .into_iter()
        .map(|miner| Candidate::new(miner, root))
        .collect()
}

/// Client for a candidate discovery service.
///
/// `GET <endpoint>/<cid>` answers with a JSON array of candidates.
#[derive(Debug, Clone)]
pub struct CandidateDiscovery {
    http: reqwest::Client,
    endpoint: Url,
}

impl CandidateDiscovery {
    /// Create a client for `endpoint`.
    pub fn new(endpoint: &str) -> Result<Self> {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    /// Create a client reusing an existing HTTP client.
    pub fn with_client(http: reqwest::Client, endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| Error::InvalidConfig(format!("endpoint {endpoint} is not a valid url: {e}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::InvalidConfig(format!(
                "endpoint {endpoint} cannot have a path appended"
            )));
        }
        Ok(Self { http, endpoint })
    }

    /// The URL queried for `cid`.
    pub fn url_for(&self, cid: &ContentId) -> Url {
        let mut url = self.endpoint.clone();
        let path = format!("{}/{}", url.path().trim_end_matches('/'), cid);
        url.set_path(&path);
        url
    }

    /// Fetch the candidates for `cid`.
    pub async fn candidates(&self, cid: &ContentId) -> Result<Vec<Candidate>> {
        let url = self.url_for(cid);
        tracing::debug!(%url, "requesting retrieval candidates");

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| Error::Discovery(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(Error::Discovery(format!(
                "http request to endpoint {url} got status {status}"
            )));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::Discovery(format!("reading response from {url} failed: {e}")))?;
        let candidates: Vec<Candidate> = serde_json::from_slice(&body)
            .map_err(|e| Error::Discovery(format!("could not decode response for {cid}: {e}")))?;

        tracing::info!(count = candidates.len(), %cid, "discovered retrieval candidates");
        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode as AxumStatus, routing::get, Json, Router};
    use wormhole_dag::Codec;

    #[test]
    fn miner_address_validation() {
        assert!("f010088".parse::<MinerAddress>().is_ok());
        assert!("t01000".parse::<MinerAddress>().is_ok());
        assert!("f3abc123".parse::<MinerAddress>().is_ok());

        assert!("x01".parse::<MinerAddress>().is_err());
        assert!("f9123".parse::<MinerAddress>().is_err());
        assert!("f0".parse::<MinerAddress>().is_err());
        assert!("f0abc".parse::<MinerAddress>().is_err());
        assert!("f1ABC".parse::<MinerAddress>().is_err());
    }

    #[test]
    fn parse_miners_splits_and_trims() {
        let miners = parse_miners(&["f01, f02", "f03", ""]).unwrap();
        let names: Vec<_> = miners.iter().map(|m| m.as_str()).collect();
        assert_eq!(names, ["f01", "f02", "f03"]);
    }

    #[test]
    fn parse_miners_names_bad_entry() {
        let err = parse_miners(&["f01,bogus"]).unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn candidate_json_shape() {
        let root = ContentId::of(Codec::Dag, b"root");
        let json = format!(r#"[{{"minerAddress":"f01","rootCid":"{root}","dealId":7}}]"#);
        let parsed: Vec<Candidate> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0].deal_id, Some(7));
        assert_eq!(parsed[0].root_cid, root);
    }

    #[test]
    fn url_joins_path() {
        let discovery = CandidateDiscovery::new("https://example.com/retrieval-candidates/").unwrap();
        let cid = ContentId::of(Codec::Raw, b"x");
        assert_eq!(
            discovery.url_for(&cid).as_str(),
            format!("https://example.com/retrieval-candidates/{cid}")
        );
    }

    #[test]
    fn rejects_invalid_endpoint() {
        let err = CandidateDiscovery::new("not a url").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/candidates")
    }

    #[tokio::test]
    async fn fetches_candidates() {
        let app = Router::new().route(
            "/candidates/:cid",
            get(|Path(cid): Path<String>| async move {
                let root: ContentId = cid.parse().unwrap();
                Json(vec![Candidate::new("f010088".parse().unwrap(), root)])
            }),
        );
        let discovery = CandidateDiscovery::new(&serve(app).await).unwrap();
        let cid = ContentId::of(Codec::Dag, b"wanted");

        let candidates = discovery.candidates(&cid).await.unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].root_cid, cid);
        assert_eq!(candidates[0].miner_address.as_str(), "f010088");
    }

    #[tokio::test]
    async fn bad_status_is_discovery_error() {
        let app = Router::new().route(
            "/candidates/:cid",
            get(|| async { AxumStatus::NOT_FOUND }),
        );
        let discovery = CandidateDiscovery::new(&serve(app).await).unwrap();

        let err = discovery
            .candidates(&ContentId::of(Codec::Raw, b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Discovery(ref m) if m.contains("404")));
    }

    #[tokio::test]
    async fn bad_body_is_discovery_error() {
        let app = Router::new().route("/candidates/:cid", get(|| async { "not json" }));
        let discovery = CandidateDiscovery::new(&serve(app).await).unwrap();

        let err = discovery
            .candidates(&ContentId::of(Codec::Raw, b"x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Discovery(_)));
    }
}
