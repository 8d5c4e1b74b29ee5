/// Calculate Simple Moving Average (SMA) over the last `period` prices
pub fn calculate_sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Calculate Exponential Moving Average (EMA) at the last price
///
/// Seeded with the first price and updated recursively with
/// `alpha = 2 / (period + 1)`. Undefined until `period` prices exist.
pub fn calculate_ema(prices: &[f64], period: usize) -> Option<f64> {
    ema_series(prices, period).last().copied().flatten()
}

/// Rolling SMA for every point of the series
pub fn sma_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; prices.len()];
    }

    let mut out = Vec::with_capacity(prices.len());
    let mut window_sum = 0.0;

    for (i, price) in prices.iter().enumerate() {
        window_sum += price;
        if i >= period {
            window_sum -= prices[i - period];
        }

        if i + 1 >= period {
            // Resum the window on exact boundaries to keep drift out of long series
            if (i + 1) % period == 0 {
                window_sum = prices[i + 1 - period..=i].iter().sum();
            }
            out.push(Some(window_sum / period as f64));
        } else {
            out.push(None);
        }
    }

    out
}

/// Recursive EMA for every point of the series
pub fn ema_series(prices: &[f64], period: usize) -> Vec<Option<f64>> {
    if period == 0 {
        return vec![None; prices.len()];
    }

    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(prices.len());
    let mut ema: Option<f64> = None;

    for (i, &price) in prices.iter().enumerate() {
        let next = match ema {
            None => price,
            Some(prev) => alpha * price + (1.0 - alpha) * prev,
        };
        ema = Some(next);

        out.push(if i + 1 >= period { Some(next) } else { None });
    }

    out
}
