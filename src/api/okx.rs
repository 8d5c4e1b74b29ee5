use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::num::NonZeroU32;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use super::{ExchangeClient, ExchangeError};
use crate::config::ExchangeSettings;
use crate::models::{BalanceSnapshot, Candle, MarketSymbol, OrderResult, OrderSide};

// OKX REST API v5
// Docs: https://www.okx.com/docs-v5/en/
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 500;
const MAX_CANDLES_PER_REQUEST: usize = 300;
const SIZE_DECIMALS: i32 = 8;

type HmacSha256 = Hmac<Sha256>;

type OkxRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

#[derive(Clone)]
struct Credentials {
    api_key: String,
    secret_key: String,
    passphrase: String,
}

/// Client for the OKX spot REST API
///
/// Cloneable; clones share the rate limiter.
#[derive(Clone)]
pub struct OkxClient {
    client: Client,
    base_url: String,
    credentials: Option<Credentials>,
    simulated: bool,
    rate_limiter: Arc<OkxRateLimiter>,
}

/// Common envelope of every OKX response
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TickerData {
    last: String,
}

#[derive(Debug, Deserialize)]
struct BalanceData {
    #[serde(default)]
    details: Vec<BalanceDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceDetail {
    ccy: String,
    #[serde(default)]
    eq: String,
    #[serde(default)]
    cash_bal: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderRequest<'a> {
    inst_id: String,
    td_mode: &'a str,
    cl_ord_id: String,
    side: &'a str,
    ord_type: &'a str,
    sz: String,
    tgt_ccy: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    #[serde(default)]
    ord_id: String,
    #[serde(default)]
    s_code: String,
    #[serde(default)]
    s_msg: String,
}

/// Sign a private request: base64(HMAC-SHA256(secret, ts + METHOD + path + body))
pub fn sign(secret: &str, timestamp: &str, method: &str, request_path: &str, body: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(method.as_bytes());
    mac.update(request_path.as_bytes());
    mac.update(body.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}

/// Translate a `1m`/`1h`/`1d` style timeframe into an OKX bar
pub fn okx_bar(timeframe: &str) -> String {
    let split = timeframe.len().saturating_sub(1);
    let (count, unit) = timeframe.split_at(split);
    match unit {
        "h" | "d" | "w" => format!("{}{}", count, unit.to_uppercase()),
        _ => timeframe.to_string(),
    }
}

/// Base amount rounded down to the exchange lot precision
pub fn format_size(amount: f64) -> String {
    let scale = 10f64.powi(SIZE_DECIMALS);
    let floored = (amount * scale + 1e-6).floor() / scale;
    let text = format!("{:.*}", SIZE_DECIMALS as usize, floored);
    text.trim_end_matches('0').trim_end_matches('.').to_string()
}

fn parse_number(field: &str, value: &str) -> Result<f64, ExchangeError> {
    value
        .parse::<f64>()
        .map_err(|_| ExchangeError::InvalidResponse(format!("{} is not a number: '{}'", field, value)))
}

impl OkxClient {
    pub fn new(settings: &ExchangeSettings) -> Result<Self, ExchangeError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        let credentials = if settings.has_credentials() {
            Some(Credentials {
                api_key: settings.api_key.clone(),
                secret_key: settings.secret_key.clone(),
                passphrase: settings.passphrase.clone(),
            })
        } else {
            None
        };

        let per_second = NonZeroU32::new(settings.requests_per_second.max(1)).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_second(per_second)));

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            credentials,
            simulated: settings.simulated,
            rate_limiter,
        })
    }

    /// Single request, no retry. Returns the status and raw body.
    async fn send_once(
        &self,
        method: Method,
        request_path: &str,
        body: Option<&str>,
        signed: bool,
    ) -> Result<(StatusCode, String), ExchangeError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, request_path);
        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("Content-Type", "application/json");

        if self.simulated {
            request = request.header("x-simulated-trading", "1");
        }

        if signed {
            let credentials = self
                .credentials
                .as_ref()
                .ok_or(ExchangeError::MissingCredentials)?;
            let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
            let signature = sign(
                &credentials.secret_key,
                &timestamp,
                method.as_str(),
                request_path,
                body.unwrap_or(""),
            );

            request = request
                .header("OK-ACCESS-KEY", &credentials.api_key)
                .header("OK-ACCESS-SIGN", signature)
                .header("OK-ACCESS-TIMESTAMP", timestamp)
                .header("OK-ACCESS-PASSPHRASE", &credentials.passphrase);
        }

        if let Some(body) = body {
            request = request.body(body.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }

    /// GET with exponential backoff on transport errors, 429 and 5xx
    async fn get<T: DeserializeOwned>(
        &self,
        request_path: &str,
        signed: bool,
    ) -> Result<Vec<T>, ExchangeError> {
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        for attempt in 1..=MAX_RETRIES {
            match self.send_once(Method::GET, request_path, None, signed).await {
                Ok((status, text))
                    if (status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error())
                        && attempt < MAX_RETRIES =>
                {
                    tracing::warn!(
                        "OKX returned {} for {}, retrying in {}ms (attempt {}/{})",
                        status,
                        request_path,
                        backoff_ms,
                        attempt,
                        MAX_RETRIES
                    );
                    tracing::debug!("Response body: {}", text);
                }
                Ok((status, text)) => return Self::parse_envelope(status, &text),
                Err(ExchangeError::Http(e)) if attempt < MAX_RETRIES => {
                    tracing::warn!(
                        "Network error on {}: {}, retrying in {}ms (attempt {}/{})",
                        request_path,
                        e,
                        backoff_ms,
                        attempt,
                        MAX_RETRIES
                    );
                }
                Err(e) => return Err(e),
            }

            sleep(Duration::from_millis(backoff_ms)).await;
            backoff_ms *= 2;
        }

        Err(ExchangeError::InvalidResponse(format!(
            "{} failed after {} attempts",
            request_path, MAX_RETRIES
        )))
    }

    fn parse_envelope<T: DeserializeOwned>(status: StatusCode, text: &str) -> Result<Vec<T>, ExchangeError> {
        let envelope: Envelope<T> = serde_json::from_str(text).map_err(|e| {
            ExchangeError::InvalidResponse(format!("HTTP {}: {} ({})", status, e, text))
        })?;

        if envelope.code != "0" {
            return Err(ExchangeError::from_code(&envelope.code, &envelope.msg));
        }

        Ok(envelope.data)
    }

    async fn submit_order(
        &self,
        symbol: &MarketSymbol,
        side: OrderSide,
        base_amount: f64,
        price: f64,
    ) -> Result<OrderResult, ExchangeError> {
        // Report the size actually sent, not the unrounded request
        let sz = format_size(base_amount);
        let submitted = parse_number("sz", &sz)?;
        if !(submitted > 0.0) {
            return Err(ExchangeError::InvalidOrder(format!(
                "size {} rounds to zero at {} decimals",
                base_amount, SIZE_DECIMALS
            )));
        }

        let client_order_id = uuid::Uuid::new_v4().simple().to_string();
        let order = OrderRequest {
            inst_id: symbol.inst_id(),
            td_mode: "cash",
            cl_ord_id: client_order_id.clone(),
            side: match side {
                OrderSide::Buy => "buy",
                OrderSide::Sell => "sell",
            },
            ord_type: "market",
            sz,
            tgt_ccy: "base_ccy",
        };
        let body = serde_json::to_string(&order)
            .map_err(|e| ExchangeError::InvalidResponse(e.to_string()))?;

        tracing::debug!("Placing order: {}", body);

        let (status, text) = self
            .send_once(Method::POST, "/api/v5/trade/order", Some(&body), true)
            .await?;

        let envelope: Envelope<OrderAck> = serde_json::from_str(&text).map_err(|e| {
            ExchangeError::InvalidResponse(format!("HTTP {}: {} ({})", status, e, text))
        })?;

        // Order rejections carry the specific reason in the per-order sCode
        if let Some(ack) = envelope.data.first() {
            if !ack.s_code.is_empty() && ack.s_code != "0" {
                return Err(ExchangeError::from_code(&ack.s_code, &ack.s_msg));
            }
        }
        if envelope.code != "0" {
            return Err(ExchangeError::from_code(&envelope.code, &envelope.msg));
        }

        let ack = envelope
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ExchangeError::InvalidResponse("order response has no data".to_string()))?;

        Ok(OrderResult {
            order_id: if ack.ord_id.is_empty() {
                client_order_id
            } else {
                ack.ord_id
            },
            side,
            base_amount: submitted,
            fill_price: price,
            timestamp: Utc::now(),
        })
    }
}

#[async_trait]
impl ExchangeClient for OkxClient {
    async fn fetch_balances(&self, symbol: &MarketSymbol) -> Result<BalanceSnapshot, ExchangeError> {
        let path = format!("/api/v5/account/balance?ccy={},{}", symbol.base, symbol.quote);
        let data: Vec<BalanceData> = self.get(&path, true).await?;

        let mut snapshot = BalanceSnapshot::default();
        for detail in data.iter().flat_map(|d| d.details.iter()) {
            // Prefer equity; fall back to cash balance for accounts that omit it
            let raw = if detail.eq.is_empty() { &detail.cash_bal } else { &detail.eq };
            let total = if raw.is_empty() { 0.0 } else { parse_number("eq", raw)? };

            if detail.ccy.eq_ignore_ascii_case(&symbol.base) {
                snapshot.base_asset_total = total;
            } else if detail.ccy.eq_ignore_ascii_case(&symbol.quote) {
                snapshot.quote_asset_total = total;
            }
        }

        Ok(snapshot)
    }

    async fn fetch_current_price(&self, symbol: &MarketSymbol) -> Result<f64, ExchangeError> {
        let path = format!("/api/v5/market/ticker?instId={}", symbol.inst_id());
        let data: Vec<TickerData> = self.get(&path, false).await?;

        let ticker = data
            .first()
            .ok_or_else(|| ExchangeError::InvalidResponse(format!("no ticker for {}", symbol)))?;
        parse_number("last", &ticker.last)
    }

    async fn fetch_candles(
        &self,
        symbol: &MarketSymbol,
        timeframe: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let path = format!(
            "/api/v5/market/candles?instId={}&bar={}&limit={}",
            symbol.inst_id(),
            okx_bar(timeframe),
            limit.clamp(1, MAX_CANDLES_PER_REQUEST)
        );
        let rows: Vec<Vec<String>> = self.get(&path, false).await?;

        let mut candles = rows
            .iter()
            .map(|row| {
                if row.len() < 6 {
                    return Err(ExchangeError::InvalidResponse(format!(
                        "candle row has {} fields",
                        row.len()
                    )));
                }
                let millis = row[0]
                    .parse::<i64>()
                    .map_err(|_| ExchangeError::InvalidResponse(format!("bad candle timestamp '{}'", row[0])))?;
                let timestamp = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .ok_or_else(|| ExchangeError::InvalidResponse(format!("timestamp out of range: {}", millis)))?;

                Ok(Candle {
                    timestamp,
                    open: parse_number("open", &row[1])?,
                    high: parse_number("high", &row[2])?,
                    low: parse_number("low", &row[3])?,
                    close: parse_number("close", &row[4])?,
                    volume: parse_number("volume", &row[5])?,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        // OKX returns newest first
        candles.reverse();
        Ok(candles)
    }

    async fn place_market_buy(
        &self,
        symbol: &MarketSymbol,
        base_amount: f64,
        price: f64,
    ) -> Result<OrderResult, ExchangeError> {
        self.submit_order(symbol, OrderSide::Buy, base_amount, price).await
    }

    async fn place_market_sell(
        &self,
        symbol: &MarketSymbol,
        base_amount: f64,
        price: f64,
    ) -> Result<OrderResult, ExchangeError> {
        self.submit_order(symbol, OrderSide::Sell, base_amount, price).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn settings(base_url: &str, with_keys: bool) -> ExchangeSettings {
        ExchangeSettings {
            api_key: if with_keys { "key".to_string() } else { String::new() },
            secret_key: if with_keys { "secret".to_string() } else { String::new() },
            passphrase: if with_keys { "pass".to_string() } else { String::new() },
            base_url: base_url.to_string(),
            simulated: true,
            requests_per_second: 100,
        }
    }

    fn btc_usdt() -> MarketSymbol {
        MarketSymbol::new("BTC", "USDT")
    }

    #[test]
    fn test_signature_is_deterministic_base64() {
        let a = sign("secret", "2024-01-01T00:00:00.000Z", "GET", "/api/v5/account/balance", "");
        let b = sign("secret", "2024-01-01T00:00:00.000Z", "GET", "/api/v5/account/balance", "");
        let c = sign("secret", "2024-01-01T00:00:00.000Z", "POST", "/api/v5/trade/order", "{}");

        assert_eq!(a, b);
        assert_ne!(a, c);
        // 32 byte digest -> 44 base64 chars
        assert_eq!(a.len(), 44);
        assert!(BASE64.decode(&a).is_ok());
    }

    #[test]
    fn test_okx_bar_mapping() {
        assert_eq!(okx_bar("1m"), "1m");
        assert_eq!(okx_bar("15m"), "15m");
        assert_eq!(okx_bar("1h"), "1H");
        assert_eq!(okx_bar("4h"), "4H");
        assert_eq!(okx_bar("1d"), "1D");
        assert_eq!(okx_bar("1H"), "1H");
    }

    #[test]
    fn test_format_size_floors_to_lot_precision() {
        assert_eq!(format_size(200.0 / 60000.0), "0.00333333");
        assert_eq!(format_size(0.001), "0.001");
        assert_eq!(format_size(0.0015), "0.0015");
        assert_eq!(format_size(1.0), "1");
    }

    #[tokio::test]
    async fn test_fetch_current_price() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v5/market/ticker")
            .match_query(Matcher::UrlEncoded("instId".into(), "BTC-USDT".into()))
            .match_header("x-simulated-trading", "1")
            .with_status(200)
            .with_body(r#"{"code":"0","msg":"","data":[{"instId":"BTC-USDT","last":"43125.5"}]}"#)
            .create_async()
            .await;

        let client = OkxClient::new(&settings(&server.url(), false)).unwrap();
        let price = client.fetch_current_price(&btc_usdt()).await.unwrap();

        assert_eq!(price, 43125.5);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fetch_candles_oldest_first() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v5/market/candles")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("instId".into(), "BTC-USDT".into()),
                Matcher::UrlEncoded("bar".into(), "1H".into()),
                Matcher::UrlEncoded("limit".into(), "2".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"code":"0","msg":"","data":[
                    ["1704070800000","101","103","100","102","12.5","0","0","1"],
                    ["1704067200000","100","101","99","101","10","0","0","1"]
                ]}"#,
            )
            .create_async()
            .await;

        let client = OkxClient::new(&settings(&server.url(), false)).unwrap();
        let candles = client.fetch_candles(&btc_usdt(), "1h", 2).await.unwrap();

        assert_eq!(candles.len(), 2);
        assert!(candles[0].timestamp < candles[1].timestamp);
        assert_eq!(candles[0].close, 101.0);
        assert_eq!(candles[1].close, 102.0);
        assert_eq!(candles[1].volume, 12.5);
    }

    #[tokio::test]
    async fn test_fetch_balances_signed() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/v5/account/balance")
            .match_query(Matcher::UrlEncoded("ccy".into(), "BTC,USDT".into()))
            .match_header("OK-ACCESS-KEY", "key")
            .match_header("OK-ACCESS-PASSPHRASE", "pass")
            .match_header("OK-ACCESS-SIGN", Matcher::Any)
            .match_header("OK-ACCESS-TIMESTAMP", Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"code":"0","msg":"","data":[{"details":[
                    {"ccy":"BTC","eq":"0.0125","cashBal":"0.0125"},
                    {"ccy":"USDT","eq":"","cashBal":"512.75"}
                ]}]}"#,
            )
            .create_async()
            .await;

        let client = OkxClient::new(&settings(&server.url(), true)).unwrap();
        let balances = client.fetch_balances(&btc_usdt()).await.unwrap();

        assert_eq!(balances.base_asset_total, 0.0125);
        assert_eq!(balances.quote_asset_total, 512.75);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_missing_currency_is_zero() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v5/account/balance")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"code":"0","msg":"","data":[{"details":[{"ccy":"USDT","eq":"100"}]}]}"#)
            .create_async()
            .await;

        let client = OkxClient::new(&settings(&server.url(), true)).unwrap();
        let balances = client.fetch_balances(&btc_usdt()).await.unwrap();

        assert_eq!(balances.base_asset_total, 0.0);
        assert_eq!(balances.quote_asset_total, 100.0);
    }

    #[tokio::test]
    async fn test_private_call_without_credentials() {
        let client = OkxClient::new(&settings("http://127.0.0.1:9", false)).unwrap();
        let result = client.fetch_balances(&btc_usdt()).await;
        assert!(matches!(result, Err(ExchangeError::MissingCredentials)));
    }

    #[tokio::test]
    async fn test_market_buy_sends_base_size() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v5/trade/order")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "instId": "BTC-USDT",
                "tdMode": "cash",
                "side": "buy",
                "ordType": "market",
                "sz": "0.005",
                "tgtCcy": "base_ccy"
            })))
            .with_status(200)
            .with_body(r#"{"code":"0","msg":"","data":[{"ordId":"312269865356374016","clOrdId":"x","sCode":"0","sMsg":""}]}"#)
            .create_async()
            .await;

        let client = OkxClient::new(&settings(&server.url(), true)).unwrap();
        let fill = client.place_market_buy(&btc_usdt(), 0.005, 40000.0).await.unwrap();

        assert_eq!(fill.order_id, "312269865356374016");
        assert_eq!(fill.side, OrderSide::Buy);
        assert_eq!(fill.base_amount, 0.005);
        assert_eq!(fill.fill_price, 40000.0);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fill_reports_submitted_size() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v5/trade/order")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "side": "buy",
                "sz": "0.00333333"
            })))
            .with_status(200)
            .with_body(r#"{"code":"0","msg":"","data":[{"ordId":"4021","clOrdId":"x","sCode":"0","sMsg":""}]}"#)
            .create_async()
            .await;

        let client = OkxClient::new(&settings(&server.url(), true)).unwrap();
        let requested = 200.0 / 60000.0;
        let fill = client.place_market_buy(&btc_usdt(), requested, 60000.0).await.unwrap();

        assert_eq!(fill.base_amount, 0.00333333);
        assert!(fill.base_amount < requested);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_dust_order_never_sent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v5/trade/order")
            .expect(0)
            .create_async()
            .await;

        let client = OkxClient::new(&settings(&server.url(), true)).unwrap();
        let result = client.place_market_buy(&btc_usdt(), 2.7e-17, 60000.0).await;

        assert!(matches!(result, Err(ExchangeError::InvalidOrder(_))));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_rejected_order_maps_insufficient_funds() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v5/trade/order")
            .with_status(200)
            .with_body(r#"{"code":"1","msg":"Operation failed.","data":[{"ordId":"","clOrdId":"x","sCode":"51008","sMsg":"Order failed. Insufficient BTC balance in account."}]}"#)
            .expect(1)
            .create_async()
            .await;

        let client = OkxClient::new(&settings(&server.url(), true)).unwrap();
        let result = client.place_market_sell(&btc_usdt(), 0.5, 40000.0).await;

        assert!(matches!(result, Err(ExchangeError::InsufficientFunds(_))));
        // Orders are never retried
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_code_surfaces() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/v5/market/ticker")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"code":"51001","msg":"Instrument ID does not exist","data":[]}"#)
            .create_async()
            .await;

        let client = OkxClient::new(&settings(&server.url(), false)).unwrap();
        let result = client.fetch_current_price(&btc_usdt()).await;

        assert!(matches!(result, Err(ExchangeError::Api { ref code, .. }) if code == "51001"));
    }
}
