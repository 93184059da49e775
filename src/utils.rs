// Utility functions

/// Rounds to `places` decimals. Exact halves go to the even neighbour.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round_ties_even() / factor
}

/// Rounds a value, treating NaN/Infinity as absent.
pub fn round_opt(value: Option<f64>, places: i32) -> Option<f64> {
    value
        .filter(|v| v.is_finite())
        .map(|v| round_to(v, places))
        .filter(|v| v.is_finite())
}

/// Fractional change from `base` to `value`.
pub fn pct_change(value: Option<f64>, base: Option<f64>) -> Option<f64> {
    match (value, base) {
        (Some(v), Some(b)) if b != 0.0 => Some((v - b) / b).filter(|c| c.is_finite()),
        _ => None,
    }
}

/// `BTC-USD`, `ETHUSDT` and friends.
pub fn is_crypto(symbol: &str) -> bool {
    let s = symbol.trim().to_uppercase();
    (s.contains('-') && s.ends_with("USD")) || s.ends_with("USDT")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounding() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(1234.5678, 0), 1235.0);
        assert_eq!(round_opt(Some(f64::NAN), 2), None);
        assert_eq!(round_opt(Some(f64::INFINITY), 2), None);
        assert_eq!(round_opt(Some(0.12345), 3), Some(0.123));
    }

    #[test]
    fn halves_round_to_even() {
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.375, 2), 0.38);
        assert_eq!(round_to(2.5, 0), 2.0);
        assert_eq!(round_to(-2.5, 0), -2.0);
        assert_eq!(round_to(3.5, 0), 4.0);
    }

    #[test]
    fn change_needs_non_zero_base() {
        assert_eq!(pct_change(Some(110.0), Some(100.0)), Some(0.1));
        assert_eq!(pct_change(Some(110.0), Some(0.0)), None);
        assert_eq!(pct_change(None, Some(100.0)), None);
    }

    #[test]
    fn crypto_symbols() {
        assert!(is_crypto("BTC-USD"));
        assert!(is_crypto("ethusdt"));
        assert!(!is_crypto("AAPL"));
        assert!(!is_crypto("BRK-B"));
    }
}
