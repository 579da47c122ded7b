//! Canonical column naming.
//!
//! Raw exports use CamelCase headers with the odd irregular spelling
//! (`NumberofItems`, `TransactionID`). Every header is snake-cased first and
//! then looked up in a small per-entity alias table.

use std::sync::OnceLock;

use regex::Regex;
use store_core::models::EntityKind;

/// Output columns of each cleaned file, in schema order.
pub const CUSTOMER_COLUMNS: &[&str] = &[
    "customer_id",
    "name",
    "region",
    "join_date",
    "number_of_purchases",
    "contact_preferences",
];

pub const PRODUCT_COLUMNS: &[&str] = &[
    "product_id",
    "product_name",
    "category",
    "unit_price",
    "stock_quantity",
    "purchase_type",
];

pub const SALE_COLUMNS: &[&str] = &[
    "sale_id",
    "date",
    "customer_id",
    "product_id",
    "store_id",
    "campaign_id",
    "sales_amount",
    "number_of_items",
    "city",
];

pub const CUBE_COLUMNS: &[&str] = &[
    "category",
    "city",
    "year",
    "customer_id",
    "sales_amount_sum",
    "sales_amount_mean",
    "days_since_joined_sum",
    "days_since_joined_avg",
    "time_since_joined",
    "negative_tenure_rows",
    "row_count",
];

/// Snake-cased raw names that do not already match a canonical column.
fn aliases(entity: EntityKind) -> &'static [(&'static str, &'static str)] {
    match entity {
        EntityKind::Customers => &[
            ("id", "customer_id"),
            ("customer_name", "name"),
            ("joined", "join_date"),
            ("joined_date", "join_date"),
            ("purchases", "number_of_purchases"),
            ("numberof_purchases", "number_of_purchases"),
            ("purchase_count", "number_of_purchases"),
            ("contact_preference", "contact_preferences"),
        ],
        EntityKind::Products => &[
            ("id", "product_id"),
            ("name", "product_name"),
            ("price", "unit_price"),
            ("stock", "stock_quantity"),
        ],
        EntityKind::Sales => &[
            ("transaction_id", "sale_id"),
            ("sales_id", "sale_id"),
            ("sale_date", "date"),
            ("sale_amount", "sales_amount"),
            ("amount", "sales_amount"),
            ("numberof_items", "number_of_items"),
            ("items", "number_of_items"),
        ],
    }
}

/// Convert an arbitrary header to lower snake case.
///
/// `"TransactionID"` → `"transaction_id"`, `"Contact Preferences"` →
/// `"contact_preferences"`, `"HTTPStatus"` → `"http_status"`.
pub fn snake_case(raw: &str) -> String {
    static LOWER_UPPER: OnceLock<Regex> = OnceLock::new();
    static ACRONYM: OnceLock<Regex> = OnceLock::new();
    static SEPARATORS: OnceLock<Regex> = OnceLock::new();

    let lower_upper = LOWER_UPPER.get_or_init(|| Regex::new(r"([a-z0-9])([A-Z])").expect("regex is valid"));
    let acronym = ACRONYM.get_or_init(|| Regex::new(r"([A-Z]+)([A-Z][a-z])").expect("regex is valid"));
    let separators = SEPARATORS.get_or_init(|| Regex::new(r"[^A-Za-z0-9]+").expect("regex is valid"));

    let trimmed = raw.trim().trim_start_matches('\u{feff}');
    let step = acronym.replace_all(trimmed, "${1}_${2}");
    let step = lower_upper.replace_all(&step, "${1}_${2}");
    let step = separators.replace_all(&step, "_");
    step.trim_matches('_').to_lowercase()
}

/// Map a raw header onto the canonical column name for `entity`.
pub fn canonical_column(entity: EntityKind, raw: &str) -> String {
    let snake = snake_case(raw);
    aliases(entity)
        .iter()
        .find(|(from, _)| *from == snake)
        .map(|(_, to)| (*to).to_string())
        .unwrap_or(snake)
}

/// Columns a raw file must provide for rows of `entity` to be usable.
pub fn required_columns(entity: EntityKind) -> &'static [&'static str] {
    match entity {
        EntityKind::Customers => &["customer_id", "join_date", "number_of_purchases"],
        EntityKind::Products => &["product_id", "unit_price", "stock_quantity"],
        EntityKind::Sales => &[
            "sale_id",
            "date",
            "customer_id",
            "product_id",
            "sales_amount",
            "number_of_items",
        ],
    }
}
