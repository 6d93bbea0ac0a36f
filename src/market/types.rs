//! Wire and domain types for the CodeMarket API.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display};

/// HTTP method used by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Method {
    /// Read-only query.
    Get,
    /// Form-encoded mutation.
    Post,
}

/// CodeMarket endpoints consumed by the bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Endpoint {
    /// Vendor registration.
    Register,
    /// Ledger snapshot for a vendor.
    LedgerState,
    /// Move items between stock and store.
    Stock,
    /// Registered vendor names.
    VendorNames,
    /// Registered vendor urls.
    VendorUrls,
    /// Buy from another vendor.
    Purchase,
}

impl Endpoint {
    /// Path relative to the market base address.
    pub const fn path(&self) -> &'static str {
        match self {
            Endpoint::Register => "/register",
            Endpoint::LedgerState => "/api/ledger_state",
            Endpoint::Stock => "/api/stock",
            Endpoint::VendorNames => "/api/vendor_names",
            Endpoint::VendorUrls => "/api/vendor_urls",
            Endpoint::Purchase => "/api/purchase",
        }
    }

    /// HTTP method for the endpoint.
    pub const fn method(&self) -> Method {
        match self {
            Endpoint::VendorNames | Endpoint::VendorUrls => Method::Get,
            _ => Method::Post,
        }
    }
}

/// A registered vendor identity.
///
/// The uuid is a capability token: it is the only credential sent with
/// requests after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    /// Name chosen at registration.
    pub name: String,
    /// Server-assigned identifier.
    pub uuid: String,
}

/// Parallel-array catalog as sent on the wire: `[names, prices, counts]`.
type CatalogWire = (Vec<String>, Vec<f64>, Vec<u32>);

/// One vendor's item catalog.
///
/// The server sends parallel arrays and the `"stored"` pool has an empty
/// price array, so accessors treat out-of-range indices as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "CatalogWire", into = "CatalogWire")]
pub struct Catalog {
    /// Item names.
    pub names: Vec<String>,
    /// Item prices.
    pub prices: Vec<f64>,
    /// Item counts.
    pub counts: Vec<u32>,
}

impl From<CatalogWire> for Catalog {
    fn from((names, prices, counts): CatalogWire) -> Self {
        Self {
            names,
            prices,
            counts,
        }
    }
}

impl From<Catalog> for CatalogWire {
    fn from(catalog: Catalog) -> Self {
        (catalog.names, catalog.prices, catalog.counts)
    }
}

/// A single catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogItem<'a> {
    /// Item name.
    pub name: &'a str,
    /// Price, if the catalog carries one.
    pub price: Option<f64>,
    /// Count on hand.
    pub count: u32,
}

impl Catalog {
    /// Number of items, as given by the name array.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the catalog lists no items.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Item name at an index.
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Count at an index, zero when absent.
    pub fn count(&self, index: usize) -> u32 {
        self.counts.get(index).copied().unwrap_or(0)
    }

    /// Price at an index.
    pub fn price(&self, index: usize) -> Option<f64> {
        self.prices.get(index).copied()
    }

    /// Iterate over catalog entries.
    pub fn items(&self) -> impl Iterator<Item = CatalogItem<'_>> {
        self.names.iter().enumerate().map(|(i, name)| CatalogItem {
            name,
            price: self.price(i),
            count: self.count(i),
        })
    }

    /// Index of an item by name.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

/// Snapshot of every vendor's catalog plus the requester's store pool.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerState {
    /// Catalogs keyed by vendor name, including [`LedgerState::STORED`].
    pub catalogs: HashMap<String, Catalog>,
}

impl LedgerState {
    /// Reserved key for the shared store pool.
    pub const STORED: &'static str = "stored";

    /// The requesting vendor's store pool.
    pub fn stored(&self) -> Option<&Catalog> {
        self.catalogs.get(Self::STORED)
    }

    /// A vendor's stocked catalog.
    pub fn vendor(&self, name: &str) -> Option<&Catalog> {
        self.catalogs.get(name)
    }

    /// Names of all vendors in the snapshot, excluding the store pool.
    pub fn vendor_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .catalogs
            .keys()
            .map(String::as_str)
            .filter(|name| *name != Self::STORED)
            .collect();
        names.sort_unstable();
        names
    }
}

/// Registration form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Registration {
    /// Requested vendor name.
    pub vendor_name: String,
    /// Requested vendor url, empty for a server-derived one.
    pub vendor_url: String,
}

/// Form carrying only the vendor uuid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UuidForm {
    /// Vendor uuid.
    pub uuid: String,
}

/// Stock adjustment form.
///
/// Positive quantities move items from the store to the stock, negative
/// quantities move them back.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockRequest {
    /// Item name.
    #[serde(rename = "name")]
    pub item: String,
    /// New price of the item.
    pub price: f64,
    /// Signed quantity to move.
    #[serde(rename = "stock")]
    pub quantity: i64,
    /// Vendor uuid.
    pub uuid: String,
}

/// Purchase form: items go from the named seller to the buyer's uuid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PurchaseOrder {
    /// Item name.
    pub item: String,
    /// Amount to buy.
    pub count: u32,
    /// Seller vendor name.
    pub from: String,
    /// Buyer uuid.
    #[serde(rename = "to")]
    pub buyer_uuid: String,
}

/// Receipt returned by stock and purchase requests.
///
/// The server renders every value as a string, so accessors parse on demand.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    /// Raw receipt fields.
    pub fields: BTreeMap<String, String>,
}

impl Receipt {
    /// Key that marks a body as a receipt rather than an error.
    pub const SUCCESS_KEY: &'static str = "success";

    /// Build a receipt from a JSON object.
    pub fn from_object(object: &serde_json::Map<String, Value>) -> Self {
        let fields = object
            .iter()
            .map(|(k, v)| {
                let value = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), value)
            })
            .collect();
        Self { fields }
    }

    /// Raw field value.
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    /// Whether the server reported success.
    pub fn success(&self) -> bool {
        self.get(Self::SUCCESS_KEY)
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Total cost of a purchase.
    pub fn total(&self) -> Option<f64> {
        self.get("total")?.trim().parse().ok()
    }

    /// Units ordered but not delivered.
    pub fn understock(&self) -> Option<u32> {
        self.get("understock")?.trim().parse().ok()
    }
}
