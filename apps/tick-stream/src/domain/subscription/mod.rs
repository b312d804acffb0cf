//! Subscription Types
//!
//! A live connection subscribes at connect time to either a named set of
//! symbols or to everything (the `*` wildcard). The set never changes for the
//! life of the connection; a client that wants different symbols opens a new
//! connection.
//!
//! Symbols are normalised by trimming and uppercasing so `aapl`, ` AAPL ` and
//! `AAPL` all name the same instrument.

use std::collections::BTreeSet;

/// Marker that subscribes a connection to every symbol.
pub const WILDCARD: &str = "*";

/// A symbol string (instrument ticker).
pub type Symbol = String;

/// The symbols a connection wants to receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Subscription {
    /// Every symbol.
    All,
    /// A fixed, non-empty set of uppercased symbols.
    Symbols(BTreeSet<Symbol>),
}

impl Subscription {
    /// Parse a comma-separated `symbols` query value.
    ///
    /// Returns `None` when the value names no symbols at all, which the
    /// gateway treats as a request to close without subscribing.
    #[must_use]
    pub fn from_csv(raw: &str) -> Option<Self> {
        let symbols: BTreeSet<Symbol> = raw
            .split(',')
            .map(normalize_symbol)
            .filter(|s| !s.is_empty())
            .collect();

        if symbols.is_empty() {
            None
        } else if symbols.contains(WILDCARD) {
            Some(Self::All)
        } else {
            Some(Self::Symbols(symbols))
        }
    }

    /// Subscription for a single path-embedded symbol.
    #[must_use]
    pub fn single(symbol: &str) -> Self {
        let symbol = normalize_symbol(symbol);
        if symbol == WILDCARD {
            Self::All
        } else {
            Self::Symbols(BTreeSet::from([symbol]))
        }
    }

    /// Whether a tick for `symbol` should be delivered.
    #[must_use]
    pub fn matches(&self, symbol: &str) -> bool {
        match self {
            Self::All => true,
            Self::Symbols(symbols) => symbols.contains(symbol),
        }
    }

    /// Whether this is the wildcard subscription.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        matches!(self, Self::All)
    }

    /// Named symbols, empty for the wildcard.
    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        let named = match self {
            Self::All => None,
            Self::Symbols(symbols) => Some(symbols.iter().map(String::as_str)),
        };
        named.into_iter().flatten()
    }
}

impl std::fmt::Display for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => f.write_str(WILDCARD),
            Self::Symbols(symbols) => {
                let joined: Vec<&str> = symbols.iter().map(String::as_str).collect();
                f.write_str(&joined.join(","))
            }
        }
    }
}

/// Trim and uppercase a symbol.
#[must_use]
pub fn normalize_symbol(raw: &str) -> Symbol {
    raw.trim().to_uppercase()
}

// =============================================================================
// Tests
// =============================================================================
