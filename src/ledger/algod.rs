//! Blocking client for a node's REST API.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::{Ledger, LedgerError, SuggestedParams, VALIDITY_WINDOW};
use crate::txn::SignedTransaction;

const TOKEN_HEADER: &str = "X-Algo-API-Token";

pub struct AlgodClient {
    base_url: String,
    token: String,
    http: Client,
}

#[derive(Deserialize)]
struct BoxesResponse {
    boxes: Vec<BoxDescriptor>,
}

#[derive(Deserialize)]
struct BoxDescriptor {
    name: String,
}

#[derive(Deserialize)]
struct BoxResponse {
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct ParamsResponse {
    fee: u64,
    genesis_hash: String,
    genesis_id: String,
    last_round: u64,
    min_fee: u64,
}

#[derive(Deserialize)]
struct CompileResponse {
    result: String,
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct PendingResponse {
    #[serde(default)]
    confirmed_round: Option<u64>,
    #[serde(default)]
    pool_error: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "kebab-case")]
struct StatusResponse {
    last_round: u64,
}

impl AlgodClient {
    /// Creates a client for the node at `base_url`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, LedgerError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(LedgerError::Http("node address must not be empty".into()));
        }

        let http = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| LedgerError::Http(e.to_string()))?;

        Ok(Self {
            base_url,
            token: token.into(),
            http,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.header(TOKEN_HEADER, &self.token)
        }
    }

    fn execute<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, LedgerError> {
        let response = self
            .authorize(request)
            .send()
            .map_err(|e| LedgerError::Http(e.to_string()))?;
        let response = check_status(response, what)?;
        response
            .json::<T>()
            .map_err(|e| LedgerError::Decode(format!("{}: {}", what, e)))
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, LedgerError> {
        debug!(path, "GET");
        self.execute(self.http.get(self.url(path)), path)
    }

    fn status(&self) -> Result<u64, LedgerError> {
        Ok(self.get::<StatusResponse>("/v2/status")?.last_round)
    }
}

fn check_status(response: Response, what: &str) -> Result<Response, LedgerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(LedgerError::NotFound(what.to_string()));
    }
    let message = response.text().unwrap_or_default();
    Err(LedgerError::Api {
        status: status.as_u16(),
        message,
    })
}

fn decode_base64(value: &str, what: &str) -> Result<Vec<u8>, LedgerError> {
    BASE64
        .decode(value)
        .map_err(|e| LedgerError::Decode(format!("{}: {}", what, e)))
}

impl Ledger for AlgodClient {
    fn box_names(&self, app_id: u64) -> Result<Vec<Vec<u8>>, LedgerError> {
        let response: BoxesResponse = self.get(&format!("/v2/applications/{}/boxes", app_id))?;
        response
            .boxes
            .iter()
            .map(|b| decode_base64(&b.name, "box name"))
            .collect()
    }

    fn box_value(&self, app_id: u64, name: &[u8]) -> Result<Vec<u8>, LedgerError> {
        let path = format!("/v2/applications/{}/box", app_id);
        let request = self
            .http
            .get(self.url(&path))
            .query(&[("name", format!("b64:{}", BASE64.encode(name)))]);
        let response: BoxResponse = self.execute(request, &format!("box {}", hex::encode(name)))?;
        decode_base64(&response.value, "box value")
    }

    fn suggested_params(&self) -> Result<SuggestedParams, LedgerError> {
        let response: ParamsResponse = self.get("/v2/transactions/params")?;
        let genesis_hash: [u8; 32] = decode_base64(&response.genesis_hash, "genesis hash")?
            .try_into()
            .map_err(|_| LedgerError::Decode("genesis hash is not 32 bytes".into()))?;

        Ok(SuggestedParams {
            fee: response.fee,
            min_fee: response.min_fee,
            first_valid: response.last_round,
            last_valid: response.last_round + VALIDITY_WINDOW,
            genesis_id: response.genesis_id,
            genesis_hash,
        })
    }

    fn compile_program(&self, source: &str) -> Result<Vec<u8>, LedgerError> {
        let request = self
            .http
            .post(self.url("/v2/teal/compile"))
            .body(source.to_string());
        let response: CompileResponse = self.execute(request, "program compilation")?;
        decode_base64(&response.result, "compiled program")
    }

    fn send_group(&self, group: &[SignedTransaction]) -> Result<String, LedgerError> {
        let mut body = Vec::new();
        for stx in group {
            body.extend(stx.encode().map_err(|e| LedgerError::Decode(e.to_string()))?);
        }

        let request = self
            .http
            .post(self.url("/v2/transactions"))
            .header(reqwest::header::CONTENT_TYPE, "application/x-binary")
            .body(body);

        // The node answers 400 with the rejection reason
        match self.execute::<SendResponse>(request, "transaction group") {
            Ok(response) => Ok(response.tx_id),
            Err(LedgerError::Api { status: 400, message }) => Err(LedgerError::Rejected(message)),
            Err(e) => Err(e),
        }
    }

    fn wait_for_confirmation(&self, txid: &str, rounds: u64) -> Result<u64, LedgerError> {
        let start = self.status()?;
        let mut current = start;

        while current < start + rounds {
            let pending: PendingResponse = self.get(&format!("/v2/transactions/pending/{}", txid))?;

            if let Some(round) = pending.confirmed_round.filter(|r| *r > 0) {
                return Ok(round);
            }
            if !pending.pool_error.is_empty() {
                return Err(LedgerError::Rejected(pending.pool_error));
            }

            let _: StatusResponse = self.get(&format!("/v2/status/wait-for-block-after/{}", current))?;
            current += 1;
        }

        Err(LedgerError::Timeout {
            txid: txid.to_string(),
            rounds,
        })
    }
}
