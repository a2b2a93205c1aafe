//! Instrument Catalog
//!
//! The fixed universe of futures roots the gateway serves, with display
//! names and asset categories.
//!
//! # Symbol Form
//!
//! Continuous contracts are addressed as `ROOT.c.N` where `N` is the
//! rank of the contract by expiry (`0` is the front month). The catalog
//! treats every rank of a known root as a known symbol; only the front
//! month is part of the master subscription.

use std::collections::HashMap;

use serde::Serialize;

use super::streaming::Symbol;

// =============================================================================
// Categories
// =============================================================================

/// Asset category used by the symbology listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetCategory {
    /// Equity index futures.
    Index,
    /// Currency and crypto futures.
    Fx,
    /// Interest rate futures.
    InterestRates,
    /// Metals futures.
    Metals,
    /// Energy futures.
    Energy,
    /// Agricultural and livestock futures.
    Agriculture,
}

impl AssetCategory {
    /// All categories in listing order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Index,
            Self::Fx,
            Self::InterestRates,
            Self::Metals,
            Self::Energy,
            Self::Agriculture,
        ]
    }

    /// Wire name of the category.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Fx => "fx",
            Self::InterestRates => "interest_rates",
            Self::Metals => "metals",
            Self::Energy => "energy",
            Self::Agriculture => "agriculture",
        }
    }

    /// Parse a category name, ignoring case.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|category| category.as_str().eq_ignore_ascii_case(value.trim()))
    }
}

// =============================================================================
// Instruments
// =============================================================================

/// A futures root known to the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Instrument {
    /// Exchange root, e.g. `ES`.
    pub root: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Listing category.
    pub category: AssetCategory,
}

impl Instrument {
    /// Front-month continuous symbol for this root.
    #[must_use]
    pub fn front_contract(&self) -> Symbol {
        front_contract(self.root)
    }
}

/// Build the front-month continuous symbol for a root.
#[must_use]
pub fn front_contract(root: &str) -> Symbol {
    format!("{root}.c.0")
}

const fn instrument(root: &'static str, name: &'static str, category: AssetCategory) -> Instrument {
    Instrument {
        root,
        name,
        category,
    }
}

use AssetCategory::{Agriculture, Energy, Fx, Index, InterestRates, Metals};

/// Roots served by the gateway.
pub const INSTRUMENTS: &[Instrument] = &[
    // Index
    instrument("ES", "E-mini S&P 500", Index),
    instrument("MES", "Micro E-mini S&P 500", Index),
    instrument("NQ", "E-mini Nasdaq-100", Index),
    instrument("MNQ", "Micro E-mini Nasdaq-100", Index),
    instrument("RTY", "E-mini Russell 2000", Index),
    instrument("YM", "E-mini Dow", Index),
    instrument("NKD", "Nikkei 225 (USD)", Index),
    instrument("RX", "Dow Jones Real Estate", Index),
    instrument("AW", "Bloomberg Commodity Index", Index),
    // Fx and crypto
    instrument("6A", "Australian Dollar", Fx),
    instrument("6B", "British Pound", Fx),
    instrument("6C", "Canadian Dollar", Fx),
    instrument("6E", "Euro FX", Fx),
    instrument("6J", "Japanese Yen", Fx),
    instrument("6L", "Brazilian Real", Fx),
    instrument("6M", "Mexican Peso", Fx),
    instrument("6N", "New Zealand Dollar", Fx),
    instrument("6S", "Swiss Franc", Fx),
    instrument("6Z", "South African Rand", Fx),
    instrument("SIR", "Indian Rupee", Fx),
    instrument("CNH", "Standard-Size USD/Offshore RMB", Fx),
    instrument("BTC", "Bitcoin", Fx),
    instrument("ETH", "Ether", Fx),
    // Interest rates
    instrument("SR1", "One-Month SOFR", InterestRates),
    instrument("SR3", "Three-Month SOFR", InterestRates),
    instrument("ESR", "Euro Short-Term Rate", InterestRates),
    instrument("ZQ", "30-Day Fed Funds", InterestRates),
    instrument("ZT", "2-Year T-Note", InterestRates),
    instrument("ZF", "5-Year T-Note", InterestRates),
    instrument("ZN", "10-Year T-Note", InterestRates),
    instrument("TN", "Ultra 10-Year T-Note", InterestRates),
    instrument("ZB", "U.S. Treasury Bond", InterestRates),
    instrument("UB", "Ultra U.S. Treasury Bond", InterestRates),
    // Metals
    instrument("GC", "Gold", Metals),
    instrument("MGC", "Micro Gold", Metals),
    instrument("QO", "E-mini Gold", Metals),
    instrument("SI", "Silver", Metals),
    instrument("PL", "Platinum", Metals),
    instrument("PA", "Palladium", Metals),
    instrument("HG", "Copper", Metals),
    instrument("ALI", "Aluminum", Metals),
    instrument("HRC", "U.S. Midwest Hot-Rolled Coil Steel", Metals),
    // Energy
    instrument("CL", "Crude Oil", Energy),
    instrument("QM", "E-mini Crude Oil", Energy),
    instrument("BZ", "Brent Crude Oil", Energy),
    instrument("RB", "RBOB Gasoline", Energy),
    instrument("HO", "NY Harbor ULSD", Energy),
    instrument("NG", "Henry Hub Natural Gas", Energy),
    instrument("QG", "E-mini Natural Gas", Energy),
    instrument("UME", "Urea (Granular) FOB Middle East", Energy),
    instrument("LTH", "Lithium Hydroxide CIF CJK", Energy),
    // Agriculture
    instrument("ZC", "Corn", Agriculture),
    instrument("ZW", "Chicago SRW Wheat", Agriculture),
    instrument("KE", "KC HRW Wheat", Agriculture),
    instrument("ZS", "Soybean", Agriculture),
    instrument("ZM", "Soybean Meal", Agriculture),
    instrument("ZL", "Soybean Oil", Agriculture),
    instrument("ZO", "Oats", Agriculture),
    instrument("ZR", "Rough Rice", Agriculture),
    instrument("DY", "Dry Whey", Agriculture),
    instrument("CB", "Cash-Settled Butter", Agriculture),
    instrument("DC", "Class III Milk", Agriculture),
    instrument("CSC", "Cash-Settled Cheese", Agriculture),
    instrument("LBR", "Lumber", Agriculture),
    instrument("HE", "Lean Hog", Agriculture),
    instrument("LE", "Live Cattle", Agriculture),
    instrument("GF", "Feeder Cattle", Agriculture),
];

// =============================================================================
// Symbol Parsing
// =============================================================================

/// A parsed continuous-contract symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuousSymbol<'a> {
    /// Exchange root.
    pub root: &'a str,
    /// Expiry rank (`0` is the front month).
    pub rank: u8,
}

impl<'a> ContinuousSymbol<'a> {
    /// Parse `ROOT.c.N`. Returns `None` for any other shape.
    #[must_use]
    pub fn parse(symbol: &'a str) -> Option<Self> {
        let mut parts = symbol.split('.');
        let root = parts.next().filter(|r| !r.is_empty())?;
        if parts.next()? != "c" {
            return None;
        }
        let rank = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { root, rank })
    }
}

// =============================================================================
// Catalog
// =============================================================================

/// An entry in the symbology listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbologyEntry {
    /// Display name.
    pub label: String,
    /// Front-month symbol.
    pub value: Symbol,
}

/// Lookup table over the served roots.
#[derive(Debug, Clone)]
pub struct SymbolCatalog {
    by_root: HashMap<&'static str, Instrument>,
}

impl Default for SymbolCatalog {
    fn default() -> Self {
        Self::new(INSTRUMENTS.iter().copied())
    }
}

impl SymbolCatalog {
    /// Build a catalog from a set of instruments.
    #[must_use]
    pub fn new(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        Self {
            by_root: instruments.into_iter().map(|i| (i.root, i)).collect(),
        }
    }

    /// Restrict the catalog to the given roots. Unknown roots are ignored.
    #[must_use]
    pub fn restricted_to<S: AsRef<str>>(&self, roots: &[S]) -> Self {
        Self {
            by_root: roots
                .iter()
                .filter_map(|root| self.by_root.get_key_value(root.as_ref().trim()))
                .map(|(root, instrument)| (*root, *instrument))
                .collect(),
        }
    }

    /// Number of roots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_root.len()
    }

    /// True when the catalog holds no roots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_root.is_empty()
    }

    /// Look up a root.
    #[must_use]
    pub fn instrument(&self, root: &str) -> Option<&Instrument> {
        self.by_root.get(root)
    }

    /// Resolve a continuous symbol to its instrument.
    #[must_use]
    pub fn resolve(&self, symbol: &str) -> Option<&Instrument> {
        ContinuousSymbol::parse(symbol).and_then(|parsed| self.instrument(parsed.root))
    }

    /// True when the symbol is a continuous contract of a served root.
    #[must_use]
    pub fn is_known(&self, symbol: &str) -> bool {
        self.resolve(symbol).is_some()
    }

    /// Display name for a symbol, falling back to the symbol itself.
    #[must_use]
    pub fn display_name(&self, symbol: &str) -> String {
        self.resolve(symbol)
            .map_or_else(|| symbol.to_string(), |i| i.name.to_string())
    }

    /// Front-month symbols of every root, sorted.
    #[must_use]
    pub fn front_contracts(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.by_root.keys().map(|r| front_contract(r)).collect();
        symbols.sort_unstable();
        symbols
    }

    /// Symbology listing for one category, sorted by label.
    #[must_use]
    pub fn symbology(&self, category: AssetCategory) -> Vec<SymbologyEntry> {
        let mut entries: Vec<SymbologyEntry> = self
            .by_root
            .values()
            .filter(|i| i.category == category)
            .map(|i| SymbologyEntry {
                label: i.name.to_string(),
                value: i.front_contract(),
            })
            .collect();
        entries.sort_by(|a, b| a.label.cmp(&b.label));
        entries
    }

    /// Case-insensitive search over roots and names.
    ///
    /// Root-prefix matches rank ahead of name matches.
    #[must_use]
    pub fn search(&self, query: &str, limit: usize) -> Vec<&Instrument> {
        let needle = query.trim().to_ascii_uppercase();
        let mut hits: Vec<(u8, &Instrument)> = self
            .by_root
            .values()
            .filter_map(|i| {
                if needle.is_empty() || i.root.starts_with(&needle) {
                    Some((0, i))
                } else if i.name.to_ascii_uppercase().contains(&needle) {
                    Some((1, i))
                } else {
                    None
                }
            })
            .collect();
        hits.sort_by(|(ra, a), (rb, b)| ra.cmp(rb).then_with(|| a.root.cmp(b.root)));
        hits.into_iter().take(limit).map(|(_, i)| i).collect()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("ES.c.0", Some(("ES", 0)) ; "front month")]
    #[test_case("CL.c.2", Some(("CL", 2)) ; "deferred month")]
    #[test_case("6E.c.0", Some(("6E", 0)) ; "digit root")]
    #[test_case("ES", None ; "bare root")]
    #[test_case("ES.c", None ; "missing rank")]
    #[test_case("ES.v.0", None ; "volume roll")]
    #[test_case("ES.c.x", None ; "non numeric rank")]
    #[test_case("ES.c.0.1", None ; "trailing part")]
    #[test_case(".c.0", None ; "empty root")]
    fn parse_continuous_symbol(input: &str, expected: Option<(&str, u8)>) {
        let parsed = ContinuousSymbol::parse(input).map(|p| (p.root, p.rank));
        assert_eq!(parsed, expected);
    }

    #[test]
    fn roots_are_unique() {
        let catalog = SymbolCatalog::default();
        assert_eq!(catalog.len(), INSTRUMENTS.len());
    }

    #[test]
    fn resolve_known_and_unknown() {
        let catalog = SymbolCatalog::default();
        assert_eq!(catalog.resolve("ES.c.0").map(|i| i.name), Some("E-mini S&P 500"));
        assert_eq!(catalog.resolve("ES.c.1").map(|i| i.root), Some("ES"));
        assert!(catalog.resolve("XX.c.0").is_none());
        assert!(!catalog.is_known("ES"));
    }

    #[test]
    fn display_name_falls_back_to_symbol() {
        let catalog = SymbolCatalog::default();
        assert_eq!(catalog.display_name("GC.c.0"), "Gold");
        assert_eq!(catalog.display_name("ZZZ.c.0"), "ZZZ.c.0");
    }

    #[test]
    fn front_contracts_cover_every_root() {
        let catalog = SymbolCatalog::default();
        let fronts = catalog.front_contracts();
        assert_eq!(fronts.len(), INSTRUMENTS.len());
        assert!(fronts.contains(&"ES.c.0".to_string()));
        assert!(fronts.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn categories_separate_look_alike_roots() {
        let catalog = SymbolCatalog::default();
        assert_eq!(catalog.instrument("ESR").map(|i| i.category), Some(InterestRates));
        assert_eq!(catalog.instrument("ES").map(|i| i.category), Some(Index));
        assert_eq!(catalog.instrument("SIR").map(|i| i.category), Some(Fx));
        assert_eq!(catalog.instrument("SI").map(|i| i.category), Some(Metals));
    }

    #[test]
    fn symbology_is_sorted_by_label() {
        let catalog = SymbolCatalog::default();
        let metals = catalog.symbology(AssetCategory::Metals);
        assert!(!metals.is_empty());
        assert!(metals.windows(2).all(|w| w[0].label <= w[1].label));
        assert!(metals.iter().any(|e| e.label == "Gold" && e.value == "GC.c.0"));
    }

    #[test]
    fn every_category_has_members() {
        let catalog = SymbolCatalog::default();
        for category in AssetCategory::all() {
            assert!(!catalog.symbology(*category).is_empty(), "{category:?}");
        }
    }

    #[test_case("index", Some(Index))]
    #[test_case("INTEREST_RATES", Some(InterestRates))]
    #[test_case(" fx ", Some(Fx))]
    #[test_case("bonds", None)]
    fn parse_category(input: &str, expected: Option<AssetCategory>) {
        assert_eq!(AssetCategory::parse(input), expected);
    }

    #[test]
    fn search_prefers_root_prefix() {
        let catalog = SymbolCatalog::default();
        let hits: Vec<&str> = catalog.search("es", 10).iter().map(|i| i.root).collect();
        assert_eq!(hits.first().copied(), Some("ES"));
        assert!(hits.contains(&"ESR"));

        let by_name: Vec<&str> = catalog.search("gold", 10).iter().map(|i| i.root).collect();
        assert!(by_name.contains(&"GC"));
        assert!(by_name.contains(&"MGC"));
    }

    #[test]
    fn search_respects_limit() {
        let catalog = SymbolCatalog::default();
        assert_eq!(catalog.search("", 5).len(), 5);
    }

    #[test]
    fn restricted_catalog_drops_unknown_roots() {
        let catalog = SymbolCatalog::default().restricted_to(&["ES", "CL", "NOPE"]);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.front_contracts(), vec!["CL.c.0", "ES.c.0"]);
    }
}
