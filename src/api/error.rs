use thiserror::Error;

/// OKX error codes that mean the account cannot cover the order
const INSUFFICIENT_FUNDS_CODES: &[&str] = &["51008", "51119", "51127", "51131"];

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange returned error {code}: {message}")]
    Api { code: String, message: String },

    #[error("unexpected response from exchange: {0}")]
    InvalidResponse(String),

    #[error("API credentials are not configured")]
    MissingCredentials,

    #[error("order rejected before sending: {0}")]
    InvalidOrder(String),
}

impl ExchangeError {
    /// Classify an exchange error code, splitting out balance failures
    pub fn from_code(code: &str, message: &str) -> Self {
        if INSUFFICIENT_FUNDS_CODES.contains(&code) {
            ExchangeError::InsufficientFunds(format!("{} ({})", message, code))
        } else {
            ExchangeError::Api {
                code: code.to_string(),
                message: message.to_string(),
            }
        }
    }

    pub fn is_insufficient_funds(&self) -> bool {
        matches!(self, ExchangeError::InsufficientFunds(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balance_codes_map_to_insufficient_funds() {
        let err = ExchangeError::from_code("51008", "Order failed. Insufficient USDT balance");
        assert!(err.is_insufficient_funds());
        assert!(err.to_string().contains("51008"));
    }

    #[test]
    fn test_other_codes_stay_generic() {
        let err = ExchangeError::from_code("50011", "Rate limit reached");
        assert!(!err.is_insufficient_funds());
        assert!(matches!(err, ExchangeError::Api { ref code, .. } if code == "50011"));
    }
}
