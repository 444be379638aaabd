use courier_runtime::HttpConfig;
use reqwest::{
    blocking::Client,
    header::{CONTENT_TYPE, USER_AGENT},
    redirect,
};

use crate::destination::{Destination, TransportError, WriteResponse};

const JSON_CONTENT_TYPE: &str = "application/json";
const COURIER_USER_AGENT: &str = concat!("courier/", env!("CARGO_PKG_VERSION"));

/// Writes each payload with its own `POST` over a fresh connection.
///
/// Redirects are not followed: a 3xx answer is reported as-is and counts as written.
#[derive(Debug, Clone)]
pub struct HttpDestination {
    client: Client,
}

impl HttpDestination {
    pub fn new(config: &HttpConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(0)
            .redirect(redirect::Policy::none())
            .build()?;

        Ok(Self { client })
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> TransportError {
    let url = url.to_owned();
    if e.is_timeout() {
        TransportError::Timeout { url }
    } else if e.is_connect() {
        TransportError::Connect {
            url,
            reason: e.to_string(),
        }
    } else {
        TransportError::Request {
            url,
            reason: e.to_string(),
        }
    }
}

impl Destination for HttpDestination {
    fn write(&self, url: &str, payload: &[u8]) -> Result<WriteResponse, TransportError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, JSON_CONTENT_TYPE)
            .header(USER_AGENT, COURIER_USER_AGENT)
            .body(payload.to_vec())
            .send()
            .map_err(|e| transport_error(url, e))?;

        let status = response.status().as_u16();
        if (200..400).contains(&status) {
            return Ok(WriteResponse::new(status, String::new()));
        }

        // Best effort: a body that cannot be read still leaves a usable status.
        let body = response
            .text()
            .unwrap_or_else(|e| format!("<unreadable body: {e}>"));
        Ok(WriteResponse::new(status, body))
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
