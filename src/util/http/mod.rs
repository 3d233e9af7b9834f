use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use once_cell::sync::{Lazy, OnceCell};
use reqwest::{header, Client, Method, Response};
use serde::de::DeserializeOwned;

use crate::logging::Logger;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.6943.60 Safari/537.36";

/// A singleton instance of the reqwest client.
static CLIENT: OnceCell<Client> = OnceCell::new();

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("http"));

/// Returns the reqwest client singleton instance or creates one if it doesn't exist.
fn get_client() -> Result<&'static Client> {
    CLIENT.get_or_try_init(|| {
        Client::builder()
            // ===== 壓縮 =====
            .gzip(true)
            // ===== 超時設置 =====
            .connect_timeout(Duration::from_secs(8))
            .timeout(Duration::from_secs(15))
            // ===== TCP 優化 =====
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(60))
            // ===== 連接池 =====
            .pool_max_idle_per_host(20)
            .pool_idle_timeout(Duration::from_secs(90))
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| anyhow!("Failed to create reqwest client: {:?}", e))
    })
}

/// Performs an HTTP GET request and deserializes the JSON response into the specified type.
///
/// The request is sent once. A transport failure, a non-success status or a body
/// that does not deserialize into `RES` is returned as an error.
pub async fn get_json<RES: DeserializeOwned>(
    url: &str,
    headers: Option<header::HeaderMap>,
) -> Result<RES> {
    let res_body = send(Method::GET, url, headers)
        .await?
        .text()
        .await
        .map_err(|e| anyhow!("Error reading response body: {}", e))?;

    serde_json::from_str(&res_body)
        .map_err(|e| anyhow!("Error parsing response JSON({}): {:?}", &res_body, e))
}

async fn send(method: Method, url: &str, headers: Option<header::HeaderMap>) -> Result<Response> {
    let visit_log = format!("{method}:{url}");
    let client = get_client()?;
    let mut rb = client.request(method, url);

    if let Some(h) = headers {
        rb = rb.headers(h);
    }

    let start = Instant::now();
    let res = rb.send().await;
    let elapsed = start.elapsed().as_millis();

    match res {
        Ok(response) => {
            let status = response.status();
            LOGGER.info(format!("{} {} {} ms", visit_log, status, elapsed));
            if !status.is_success() {
                return Err(anyhow!("Request {} failed with status {}", visit_log, status));
            }

            Ok(response)
        }
        Err(why) => {
            LOGGER.error(format!(
                "{} failed because {:?}. {} ms",
                visit_log, why, elapsed
            ));
            Err(anyhow!("Failed to send request to {} because {:?}", url, why))
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use crate::logging;

    use super::*;

    #[tokio::test]
    #[ignore]
    async fn test_get_json() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let url = "http://82.push2.eastmoney.com/api/qt/clist/get?pn=1&pz=1&po=1&np=1&fltt=2&invt=2&fid=f12&fs=m:0+t:6&fields=f12,f14";
        match get_json::<Value>(url, None).await {
            Ok(v) => {
                logging::debug_file_async(format!("get_json:{}", v));
            }
            Err(why) => {
                logging::error_file_async(format!("Failed to get_json because {:?}", why));
            }
        }
    }

    #[tokio::test]
    async fn test_get_json_unreachable_host() {
        let _ = rustls::crypto::ring::default_provider().install_default();
        let result = get_json::<Value>("http://127.0.0.1:1/api/qt/clist/get", None).await;
        assert!(result.is_err());
    }
}
