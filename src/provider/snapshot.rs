use crate::model::{Bar, CorporateEvents, Derivatives, IntelBundle, NewsItem, ProviderError, Quote};
use crate::provider::MarketDataProvider;
use serde::Deserialize;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotFile {
    Many(Vec<IntelBundle>),
    One(Box<IntelBundle>),
}

/// Serves bundles captured earlier as JSON. A snapshot file holds either a
/// single bundle or an array of them. Lookups ignore symbol case.
#[derive(Debug, Default)]
pub struct SnapshotProvider {
    bundles: HashMap<String, IntelBundle>,
}

impl SnapshotProvider {
    pub fn from_bundles(bundles: impl IntoIterator<Item = IntelBundle>) -> Self {
        let bundles = bundles
            .into_iter()
            .map(|b| (b.symbol.to_uppercase(), b))
            .collect();
        Self { bundles }
    }

    pub fn from_json(content: &str) -> Result<Self, ProviderError> {
        let provider = match serde_json::from_str(content)? {
            SnapshotFile::Many(bundles) => Self::from_bundles(bundles),
            SnapshotFile::One(bundle) => Self::from_bundles([*bundle]),
        };
        Ok(provider)
    }

    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ProviderError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await?;
        let provider = Self::from_json(&content)?;
        info!("Loaded {} symbol(s) from {}", provider.bundles.len(), path.display());
        Ok(provider)
    }

    pub fn symbols(&self) -> Vec<&str> {
        let mut symbols: Vec<&str> = self.bundles.values().map(|b| b.symbol.as_str()).collect();
        symbols.sort_unstable();
        symbols
    }

    fn bundle(&self, symbol: &str) -> Result<&IntelBundle, ProviderError> {
        self.bundles
            .get(&symbol.trim().to_uppercase())
            .ok_or_else(|| ProviderError::UnknownSymbol(symbol.to_string()))
    }
}

#[async_trait::async_trait]
impl MarketDataProvider for SnapshotProvider {
    fn name(&self) -> &str {
        "snapshot"
    }

    async fn fetch_series(&self, symbol: &str, bars: usize) -> Result<Vec<Bar>, ProviderError> {
        let mut series = self.bundle(symbol)?.bars.clone();
        series.sort_by_key(|b| b.t);
        let skip = series.len().saturating_sub(bars);
        Ok(series.split_off(skip))
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>, ProviderError> {
        Ok(self.bundle(symbol)?.quote.clone())
    }

    async fn fetch_news(&self, symbol: &str, limit: usize) -> Result<Vec<NewsItem>, ProviderError> {
        let mut news = self.bundle(symbol)?.news.clone();
        // Newest first; undated items go last.
        news.sort_by_key(|n| Reverse(n.published_at));
        news.truncate(limit);
        Ok(news)
    }

    async fn fetch_events(&self, symbol: &str) -> Result<CorporateEvents, ProviderError> {
        Ok(self.bundle(symbol)?.events.clone())
    }

    async fn fetch_derivatives(&self, symbol: &str) -> Result<Derivatives, ProviderError> {
        Ok(self.bundle(symbol)?.derivatives.clone())
    }
}
