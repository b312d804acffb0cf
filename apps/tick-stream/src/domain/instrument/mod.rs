//! Instrument Catalog
//!
//! The static list of tradable instruments and the parameters of their
//! synthetic price model. Loaded once at process start and shared read-only;
//! nothing mutates an `InstrumentConfig` after construction.

use std::collections::HashMap;

// =============================================================================
// Instrument Config
// =============================================================================

/// Price-model parameters for one instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentConfig {
    /// Unique ticker symbol.
    pub symbol: &'static str,
    /// Display name.
    pub name: &'static str,
    /// Anchor price the walk reverts toward.
    pub base_price: f64,
    /// Standard deviation of the per-step noise, in cents.
    pub tick_volatility_cents: f64,
    /// Maximum distance from the base price, in cents.
    pub max_intraday_deviation_cents: f64,
    /// Mean traded volume per tick.
    pub mean_volume: u32,
    /// Standard deviation of the traded volume.
    pub volume_jitter: u32,
}

impl InstrumentConfig {
    /// Create a new instrument config.
    #[must_use]
    pub const fn new(
        symbol: &'static str,
        name: &'static str,
        base_price: f64,
        tick_volatility_cents: f64,
        max_intraday_deviation_cents: f64,
        mean_volume: u32,
        volume_jitter: u32,
    ) -> Self {
        Self {
            symbol,
            name,
            base_price,
            tick_volatility_cents,
            max_intraday_deviation_cents,
            mean_volume,
            volume_jitter,
        }
    }

    /// Per-step noise standard deviation in price units.
    #[must_use]
    pub fn tick_volatility(&self) -> f64 {
        self.tick_volatility_cents / 100.0
    }

    /// Deviation band in price units.
    #[must_use]
    pub fn band(&self) -> f64 {
        self.max_intraday_deviation_cents / 100.0
    }

    /// Lowest price the model may emit.
    #[must_use]
    pub fn price_floor(&self) -> f64 {
        self.base_price - self.band()
    }

    /// Highest price the model may emit.
    #[must_use]
    pub fn price_ceiling(&self) -> f64 {
        self.base_price + self.band()
    }
}

// =============================================================================
// Symbol Registry
// =============================================================================

/// Immutable catalog of instruments, indexed by symbol.
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    instruments: Vec<InstrumentConfig>,
    by_symbol: HashMap<&'static str, usize>,
}

impl SymbolRegistry {
    /// Build a registry from an explicit instrument list.
    ///
    /// Later duplicates of a symbol are ignored.
    #[must_use]
    pub fn new(instruments: impl IntoIterator<Item = InstrumentConfig>) -> Self {
        let mut list = Vec::new();
        let mut by_symbol = HashMap::new();
        for instrument in instruments {
            if by_symbol.contains_key(instrument.symbol) {
                continue;
            }
            by_symbol.insert(instrument.symbol, list.len());
            list.push(instrument);
        }
        Self {
            instruments: list,
            by_symbol,
        }
    }

    /// The compiled-in catalog.
    #[must_use]
    pub fn builtin() -> Self {
        Self::new(CATALOG.iter().copied())
    }

    /// Look up an instrument by symbol.
    #[must_use]
    pub fn get(&self, symbol: &str) -> Option<&InstrumentConfig> {
        self.by_symbol.get(symbol).map(|&idx| &self.instruments[idx])
    }

    /// Whether the symbol is in the catalog.
    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.by_symbol.contains_key(symbol)
    }

    /// Instruments in catalog order.
    #[must_use]
    pub fn instruments(&self) -> &[InstrumentConfig] {
        &self.instruments
    }

    /// Symbols in catalog order.
    pub fn symbols(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.instruments.iter().map(|i| i.symbol)
    }

    /// Number of instruments.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// Compiled-in instrument catalog.
pub const CATALOG: &[InstrumentConfig] = &[
    // Mega-cap tech / growth
    InstrumentConfig::new("AAPL", "Apple Inc.", 190.0, 6.0, 250.0, 950, 250),
    InstrumentConfig::new("MSFT", "Microsoft Corp.", 380.0, 6.0, 250.0, 850, 220),
    InstrumentConfig::new("GOOG", "Alphabet Class C", 140.0, 5.0, 220.0, 800, 220),
    InstrumentConfig::new("AMZN", "Amazon.com Inc.", 150.0, 7.0, 260.0, 900, 260),
    InstrumentConfig::new("TSLA", "Tesla Inc.", 260.0, 12.0, 600.0, 1100, 400),
    InstrumentConfig::new("META", "Meta Platforms Inc.", 320.0, 8.0, 400.0, 900, 260),
    InstrumentConfig::new("NVDA", "NVIDIA Corp.", 450.0, 14.0, 800.0, 1000, 350),
    InstrumentConfig::new("NFLX", "Netflix Inc.", 400.0, 10.0, 450.0, 700, 220),
    InstrumentConfig::new("ADBE", "Adobe Inc.", 500.0, 10.0, 500.0, 650, 200),
    InstrumentConfig::new("CRM", "Salesforce Inc.", 230.0, 7.0, 300.0, 650, 200),
    InstrumentConfig::new("ORCL", "Oracle Corp.", 120.0, 4.0, 180.0, 600, 180),
    InstrumentConfig::new("INTC", "Intel Corp.", 40.0, 3.0, 120.0, 700, 200),
    InstrumentConfig::new("AMD", "Advanced Micro Devices", 120.0, 5.0, 220.0, 800, 230),
    InstrumentConfig::new("CSCO", "Cisco Systems Inc.", 55.0, 3.0, 130.0, 600, 170),
    InstrumentConfig::new("TXN", "Texas Instruments Inc.", 165.0, 5.0, 220.0, 600, 180),
    InstrumentConfig::new("QCOM", "Qualcomm Inc.", 140.0, 5.0, 220.0, 650, 190),
    InstrumentConfig::new("AVGO", "Broadcom Inc.", 900.0, 20.0, 1200.0, 600, 180),
    InstrumentConfig::new("IBM", "IBM Corp.", 140.0, 4.0, 180.0, 500, 150),
    InstrumentConfig::new("SHOP", "Shopify Inc.", 70.0, 6.0, 260.0, 700, 260),
    InstrumentConfig::new("SQ", "Block Inc.", 65.0, 7.0, 260.0, 750, 260),
    InstrumentConfig::new("PYPL", "PayPal Holdings Inc.", 70.0, 6.0, 260.0, 700, 230),
    InstrumentConfig::new("UBER", "Uber Technologies", 45.0, 4.0, 180.0, 800, 260),
    InstrumentConfig::new("LYFT", "Lyft Inc.", 12.0, 5.0, 200.0, 500, 200),
    InstrumentConfig::new("ABNB", "Airbnb Inc.", 130.0, 6.0, 260.0, 700, 230),
    InstrumentConfig::new("SNAP", "Snap Inc.", 10.0, 4.0, 150.0, 650, 220),
    InstrumentConfig::new("PINS", "Pinterest Inc.", 30.0, 4.0, 180.0, 600, 200),
    InstrumentConfig::new("SPOT", "Spotify Technology", 160.0, 8.0, 300.0, 600, 200),
    InstrumentConfig::new("DOCU", "DocuSign Inc.", 55.0, 6.0, 240.0, 500, 180),
    InstrumentConfig::new("ZM", "Zoom Video Communications", 70.0, 7.0, 260.0, 500, 180),
    InstrumentConfig::new("MDB", "MongoDB Inc.", 380.0, 12.0, 700.0, 500, 170),
    InstrumentConfig::new("SNOW", "Snowflake Inc.", 170.0, 10.0, 450.0, 550, 180),
    InstrumentConfig::new("DDOG", "Datadog Inc.", 110.0, 7.0, 260.0, 550, 180),
    InstrumentConfig::new("NET", "Cloudflare Inc.", 70.0, 7.0, 260.0, 600, 190),
    InstrumentConfig::new("CRWD", "CrowdStrike Holdings", 260.0, 10.0, 500.0, 600, 190),
    InstrumentConfig::new("ZS", "Zscaler Inc.", 180.0, 9.0, 400.0, 550, 180),
    InstrumentConfig::new("OKTA", "Okta Inc.", 90.0, 7.0, 260.0, 500, 170),
    InstrumentConfig::new("PANW", "Palo Alto Networks", 250.0, 9.0, 450.0, 550, 180),
    InstrumentConfig::new("TEAM", "Atlassian Corp.", 200.0, 8.0, 350.0, 550, 170),
    InstrumentConfig::new("INTU", "Intuit Inc.", 500.0, 10.0, 600.0, 550, 170),
    InstrumentConfig::new("NOW", "ServiceNow Inc.", 650.0, 12.0, 800.0, 500, 160),
    InstrumentConfig::new("HUBS", "HubSpot Inc.", 500.0, 11.0, 700.0, 450, 150),
    // Financials
    InstrumentConfig::new("JPM", "JPMorgan Chase & Co.", 170.0, 4.0, 200.0, 800, 220),
    InstrumentConfig::new("BAC", "Bank of America", 35.0, 3.0, 120.0, 900, 260),
    InstrumentConfig::new("C", "Citigroup Inc.", 50.0, 3.0, 130.0, 700, 220),
    InstrumentConfig::new("WFC", "Wells Fargo", 45.0, 3.0, 130.0, 700, 220),
    InstrumentConfig::new("GS", "Goldman Sachs", 360.0, 8.0, 400.0, 500, 160),
    InstrumentConfig::new("MS", "Morgan Stanley", 90.0, 5.0, 220.0, 600, 190),
    InstrumentConfig::new("V", "Visa Inc.", 250.0, 5.0, 260.0, 600, 180),
    InstrumentConfig::new("MA", "Mastercard Inc.", 400.0, 6.0, 320.0, 550, 170),
    InstrumentConfig::new("AXP", "American Express", 180.0, 5.0, 260.0, 550, 170),
    // Consumer
    InstrumentConfig::new("WMT", "Walmart Inc.", 155.0, 3.0, 150.0, 700, 200),
    InstrumentConfig::new("TGT", "Target Corp.", 140.0, 4.0, 200.0, 600, 190),
    InstrumentConfig::new("COST", "Costco Wholesale", 550.0, 6.0, 350.0, 600, 180),
    InstrumentConfig::new("HD", "Home Depot", 320.0, 5.0, 260.0, 600, 180),
    InstrumentConfig::new("LOW", "Lowe's Companies", 220.0, 5.0, 220.0, 550, 170),
    InstrumentConfig::new("NKE", "Nike Inc.", 110.0, 4.0, 200.0, 650, 200),
    InstrumentConfig::new("SBUX", "Starbucks Corp.", 100.0, 4.0, 200.0, 600, 190),
    InstrumentConfig::new("MCD", "McDonald's Corp.", 290.0, 4.0, 200.0, 550, 170),
    InstrumentConfig::new("KO", "Coca-Cola Co.", 60.0, 2.0, 80.0, 650, 200),
    InstrumentConfig::new("PEP", "PepsiCo Inc.", 180.0, 3.0, 150.0, 600, 180),
    InstrumentConfig::new("DIS", "Walt Disney Co.", 100.0, 4.0, 200.0, 600, 190),
    InstrumentConfig::new("ROKU", "Roku Inc.", 70.0, 8.0, 300.0, 500, 200),
    InstrumentConfig::new("TTD", "The Trade Desk", 80.0, 7.0, 260.0, 500, 190),
    InstrumentConfig::new("F", "Ford Motor Co.", 14.0, 2.0, 70.0, 650, 220),
    InstrumentConfig::new("GM", "General Motors", 35.0, 3.0, 120.0, 600, 200),
    // ETFs
    InstrumentConfig::new("SPY", "S&P 500 ETF", 450.0, 4.0, 260.0, 1000, 300),
    InstrumentConfig::new("QQQ", "NASDAQ 100 ETF", 380.0, 4.0, 260.0, 900, 270),
    InstrumentConfig::new("IWM", "Russell 2000 ETF", 200.0, 4.0, 220.0, 800, 250),
    // Energy / Industrials
    InstrumentConfig::new("XOM", "Exxon Mobil", 110.0, 3.0, 150.0, 700, 220),
    InstrumentConfig::new("CVX", "Chevron Corp.", 170.0, 3.0, 150.0, 650, 210),
    InstrumentConfig::new("COP", "ConocoPhillips", 115.0, 3.0, 150.0, 600, 200),
    InstrumentConfig::new("CAT", "Caterpillar Inc.", 260.0, 4.0, 220.0, 550, 180),
    InstrumentConfig::new("BA", "Boeing Co.", 220.0, 5.0, 260.0, 550, 180),
    InstrumentConfig::new("GE", "General Electric", 110.0, 3.0, 150.0, 600, 190),
    InstrumentConfig::new("LMT", "Lockheed Martin", 430.0, 5.0, 300.0, 450, 150),
    // Healthcare
    InstrumentConfig::new("JNJ", "Johnson & Johnson", 170.0, 3.0, 150.0, 600, 180),
    InstrumentConfig::new("PFE", "Pfizer Inc.", 35.0, 2.0, 80.0, 650, 200),
    InstrumentConfig::new("MRK", "Merck & Co.", 110.0, 3.0, 150.0, 600, 190),
    InstrumentConfig::new("ABBV", "AbbVie Inc.", 160.0, 3.0, 150.0, 600, 190),
    InstrumentConfig::new("UNH", "UnitedHealth Group", 500.0, 6.0, 350.0, 550, 170),
    InstrumentConfig::new("TMO", "Thermo Fisher Scientific", 550.0, 7.0, 400.0, 450, 150),
    InstrumentConfig::new("GILD", "Gilead Sciences", 80.0, 3.0, 130.0, 550, 180),
    InstrumentConfig::new("BMY", "Bristol-Myers Squibb", 65.0, 3.0, 120.0, 550, 180),
    InstrumentConfig::new("AMGN", "Amgen Inc.", 260.0, 4.0, 220.0, 500, 170),
    // Apparel / software
    InstrumentConfig::new("LULU", "Lululemon Athletica", 380.0, 6.0, 320.0, 550, 180),
    InstrumentConfig::new("ADSK", "Autodesk Inc.", 210.0, 6.0, 260.0, 500, 170),
    InstrumentConfig::new("ETSY", "Etsy Inc.", 70.0, 6.0, 260.0, 550, 180),
    InstrumentConfig::new("ROST", "Ross Stores", 120.0, 4.0, 200.0, 550, 180),
    InstrumentConfig::new("BKNG", "Booking Holdings", 3200.0, 25.0, 2000.0, 300, 120),
    // Airlines
    InstrumentConfig::new("DAL", "Delta Air Lines", 40.0, 3.0, 130.0, 600, 200),
    InstrumentConfig::new("UAL", "United Airlines", 45.0, 3.0, 130.0, 600, 200),
    InstrumentConfig::new("FDX", "FedEx Corp.", 260.0, 4.0, 220.0, 550, 180),
    InstrumentConfig::new("UPS", "United Parcel Service", 190.0, 4.0, 220.0, 550, 180),
    // Telecom
    InstrumentConfig::new("T", "AT&T Inc.", 18.0, 1.5, 60.0, 650, 200),
    InstrumentConfig::new("VZ", "Verizon Communications", 35.0, 2.0, 80.0, 650, 200),
    InstrumentConfig::new("CHTR", "Charter Communications", 330.0, 6.0, 300.0, 350, 140),
    InstrumentConfig::new("TMUS", "T-Mobile US", 150.0, 4.0, 200.0, 500, 170),
    // New tech / crypto-adjacent
    InstrumentConfig::new("PLTR", "Palantir Technologies", 22.0, 5.0, 200.0, 700, 230),
    InstrumentConfig::new("RBLX", "Roblox Corp.", 30.0, 5.0, 220.0, 650, 220),
    InstrumentConfig::new("COIN", "Coinbase Global", 140.0, 15.0, 900.0, 650, 250),
];

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_is_complete_and_unique() {
        let registry = SymbolRegistry::builtin();
        assert_eq!(registry.len(), CATALOG.len());
        assert_eq!(registry.len(), 100);
    }

    #[test]
    fn aapl_parameters() {
        let registry = SymbolRegistry::builtin();
        let aapl = registry.get("AAPL").unwrap();
        assert_eq!(aapl.name, "Apple Inc.");
        assert_eq!(aapl.base_price, 190.0);
        assert_eq!(aapl.tick_volatility_cents, 6.0);
        assert_eq!(aapl.max_intraday_deviation_cents, 250.0);
        assert_eq!(aapl.mean_volume, 950);
        assert_eq!(aapl.volume_jitter, 250);
    }

    #[test]
    fn band_converts_cents_to_price_units() {
        let aapl = InstrumentConfig::new("AAPL", "Apple Inc.", 190.0, 6.0, 250.0, 950, 250);
        assert!((aapl.band() - 2.5).abs() < 1e-12);
        assert!((aapl.tick_volatility() - 0.06).abs() < 1e-12);
        assert!((aapl.price_floor() - 187.5).abs() < 1e-12);
        assert!((aapl.price_ceiling() - 192.5).abs() < 1e-12);
    }

    #[test]
    fn every_floor_is_positive() {
        for instrument in CATALOG {
            assert!(
                instrument.price_floor() > 0.0,
                "{} floor is not positive",
                instrument.symbol
            );
        }
    }

    #[test]
    fn duplicate_symbols_keep_first() {
        let registry = SymbolRegistry::new([
            InstrumentConfig::new("AAA", "First", 10.0, 1.0, 10.0, 100, 10),
            InstrumentConfig::new("AAA", "Second", 20.0, 1.0, 10.0, 100, 10),
        ]);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("AAA").unwrap().name, "First");
        assert!(registry.contains("AAA"));
        assert!(!registry.contains("BBB"));
    }

    #[test]
    fn symbols_preserve_catalog_order() {
        let registry = SymbolRegistry::builtin();
        let first: Vec<_> = registry.symbols().take(3).collect();
        assert_eq!(first, vec!["AAPL", "MSFT", "GOOG"]);
    }
}
