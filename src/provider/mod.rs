// provider/mod.rs

pub mod snapshot;

pub use snapshot::SnapshotProvider;

use crate::model::{Bar, CorporateEvents, Derivatives, IntelBundle, NewsItem, ProviderError, Quote};
use crate::utils::is_crypto;
use tracing::{info, warn};

/// How much history and news to pull for one symbol.
#[derive(Debug, Clone, Copy)]
pub struct BundleRequest {
    pub bars: usize,
    pub news_limit: usize,
}

impl Default for BundleRequest {
    fn default() -> Self {
        Self {
            bars: 400,
            news_limit: 3,
        }
    }
}

/// A source of market data. The analysis core only ever sees the
/// [`IntelBundle`] assembled from these reads.
#[async_trait::async_trait]
pub trait MarketDataProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Up to `bars` most recent bars, oldest first.
    async fn fetch_series(&self, symbol: &str, bars: usize) -> Result<Vec<Bar>, ProviderError>;

    async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>, ProviderError>;

    async fn fetch_news(&self, symbol: &str, limit: usize) -> Result<Vec<NewsItem>, ProviderError>;

    async fn fetch_events(&self, symbol: &str) -> Result<CorporateEvents, ProviderError>;

    async fn fetch_derivatives(&self, symbol: &str) -> Result<Derivatives, ProviderError>;
}

/// Issues all reads for `symbol` concurrently and assembles a bundle.
///
/// Series and quote failures abort the load. News, events and derivatives
/// are optional: their failures are logged and replaced by empty values.
/// Crypto pairs skip corporate events and equities skip derivatives.
pub async fn load_bundle<P>(
    provider: &P,
    symbol: &str,
    req: &BundleRequest,
) -> Result<IntelBundle, ProviderError>
where
    P: MarketDataProvider + ?Sized,
{
    let crypto = is_crypto(symbol);
    info!("📥 Loading {} from {} (crypto: {})", symbol, provider.name(), crypto);

    let events = async {
        if crypto {
            Ok(CorporateEvents::default())
        } else {
            provider.fetch_events(symbol).await
        }
    };
    let derivatives = async {
        if crypto {
            provider.fetch_derivatives(symbol).await
        } else {
            Ok(Derivatives::default())
        }
    };

    let (bars, quote, news, events, derivatives) = futures::join!(
        provider.fetch_series(symbol, req.bars),
        provider.fetch_quote(symbol),
        provider.fetch_news(symbol, req.news_limit),
        events,
        derivatives
    );

    Ok(IntelBundle {
        symbol: symbol.to_string(),
        bars: bars?,
        quote: quote?,
        news: optional("news", symbol, news),
        events: optional("events", symbol, events),
        derivatives: optional("derivatives", symbol, derivatives),
    })
}

fn optional<T: Default>(what: &str, symbol: &str, result: Result<T, ProviderError>) -> T {
    result.unwrap_or_else(|e| {
        warn!("{} for {} unavailable: {}", what, symbol, e);
        T::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Funding, OpenInterest};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        event_calls: AtomicUsize,
        derivative_calls: AtomicUsize,
    }

    impl Flaky {
        fn new() -> Self {
            Self {
                event_calls: AtomicUsize::new(0),
                derivative_calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl MarketDataProvider for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn fetch_series(&self, symbol: &str, _bars: usize) -> Result<Vec<Bar>, ProviderError> {
            if symbol == "GONE" {
                return Err(ProviderError::UnknownSymbol(symbol.into()));
            }
            Ok(vec![Bar {
                t: 0,
                open: 1.0,
                high: 1.0,
                low: 1.0,
                close: 1.0,
                volume: 10.0,
            }])
        }

        async fn fetch_quote(&self, _symbol: &str) -> Result<Option<Quote>, ProviderError> {
            Ok(None)
        }

        async fn fetch_news(&self, _symbol: &str, _limit: usize) -> Result<Vec<NewsItem>, ProviderError> {
            Err(ProviderError::Transport("news feed down".into()))
        }

        async fn fetch_events(&self, _symbol: &str) -> Result<CorporateEvents, ProviderError> {
            self.event_calls.fetch_add(1, Ordering::SeqCst);
            Ok(CorporateEvents::default())
        }

        async fn fetch_derivatives(&self, symbol: &str) -> Result<Derivatives, ProviderError> {
            self.derivative_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Derivatives {
                funding: Some(Funding {
                    symbol: symbol.into(),
                    rate: 0.0001,
                    next_funding_time: None,
                }),
                open_interest: Some(OpenInterest {
                    symbol: symbol.into(),
                    amount: 12.5,
                    as_of: None,
                }),
            })
        }
    }

    #[tokio::test]
    async fn optional_failures_degrade_to_empty() {
        let p = Flaky::new();
        let bundle = load_bundle(&p, "AAPL", &BundleRequest::default()).await.unwrap();
        assert_eq!(bundle.bars.len(), 1);
        assert!(bundle.news.is_empty());
        assert!(bundle.derivatives.funding.is_none());
        assert_eq!(p.event_calls.load(Ordering::SeqCst), 1);
        assert_eq!(p.derivative_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn crypto_skips_events() {
        let p = Flaky::new();
        let bundle = load_bundle(&p, "BTC-USD", &BundleRequest::default()).await.unwrap();
        assert_eq!(p.event_calls.load(Ordering::SeqCst), 0);
        assert_eq!(p.derivative_calls.load(Ordering::SeqCst), 1);
        assert!(bundle.derivatives.open_interest.is_some());
    }

    #[tokio::test]
    async fn series_failure_is_fatal() {
        let p = Flaky::new();
        let err = load_bundle(&p, "GONE", &BundleRequest::default()).await.unwrap_err();
        assert!(matches!(err, ProviderError::UnknownSymbol(s) if s == "GONE"));
    }
}
