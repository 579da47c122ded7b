//! Per-entity scrubbing: coerce, deduplicate, filter, write.
//!
//! Every row goes through the same three gates in order:
//!
//! 1. **Coercion** – [`Scrub::from_raw`] turns a [`RawRow`] into a typed
//!    record or a [`RowError`]. Failures are dropped as malformed.
//! 2. **Deduplication** – the first coerced row for each primary key wins,
//!    in file order.
//! 3. **Rules** – [`Scrub::rule_violation`] and [`Scrub::table_filter`] drop
//!    rows that are well-formed but unwanted (zero purchases, outliers).
//!
//! Nothing here aborts on a bad row; every drop is counted in a
//! [`ScrubReport`].

use std::collections::HashSet;
use std::path::Path;

use serde::Serialize;
use store_core::error::{Result, RowError};
use store_core::models::{Customer, EntityKind, Product, Sale};
use store_core::settings::{PipelineConfig, ScrubRules};
use tracing::{debug, info};

use crate::columns::{CUSTOMER_COLUMNS, PRODUCT_COLUMNS, SALE_COLUMNS};
use crate::reader::{read_raw_table, RawRow};
use crate::writer::write_records;

// ── ScrubReport ───────────────────────────────────────────────────────────────

/// Row counts for one scrub run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScrubReport {
    pub entity: EntityKind,
    pub rows_read: usize,
    pub rows_written: usize,
    pub dropped_malformed: usize,
    pub dropped_duplicate: usize,
    pub dropped_by_rule: usize,
}

impl ScrubReport {
    fn new(entity: EntityKind) -> Self {
        Self {
            entity,
            rows_read: 0,
            rows_written: 0,
            dropped_malformed: 0,
            dropped_duplicate: 0,
            dropped_by_rule: 0,
        }
    }

    pub fn total_dropped(&self) -> usize {
        self.dropped_malformed + self.dropped_duplicate + self.dropped_by_rule
    }
}

// ── Scrub trait ───────────────────────────────────────────────────────────────

/// A cleaned record type that can be produced from a raw row.
pub trait Scrub: Serialize + Sized {
    const ENTITY: EntityKind;
    const COLUMNS: &'static [&'static str];

    /// Coerce a raw row, or explain why it cannot be.
    fn from_raw(row: &RawRow) -> std::result::Result<Self, RowError>;

    /// Primary key used for deduplication.
    fn key(&self) -> String;

    /// Reason to drop a well-formed row, if any.
    fn rule_violation(&self, _rules: &ScrubRules) -> Option<String> {
        None
    }

    /// Whole-table filter run after per-row rules. Returns the kept rows.
    fn table_filter(records: Vec<Self>, _rules: &ScrubRules) -> Vec<Self> {
        records
    }
}

impl Scrub for Customer {
    const ENTITY: EntityKind = EntityKind::Customers;
    const COLUMNS: &'static [&'static str] = CUSTOMER_COLUMNS;

    fn from_raw(row: &RawRow) -> std::result::Result<Self, RowError> {
        Ok(Customer {
            customer_id: row.identifier("customer_id")?,
            name: row.text_or("name", ""),
            region: row.text_or("region", ""),
            join_date: row.date("join_date")?,
            number_of_purchases: row.count("number_of_purchases", 0)?,
            contact_preferences: row.text_or("contact_preferences", ""),
        })
    }

    fn key(&self) -> String {
        self.customer_id.clone()
    }

    fn rule_violation(&self, _rules: &ScrubRules) -> Option<String> {
        (self.number_of_purchases == 0).then(|| "zero purchases".to_string())
    }
}

impl Scrub for Product {
    const ENTITY: EntityKind = EntityKind::Products;
    const COLUMNS: &'static [&'static str] = PRODUCT_COLUMNS;

    fn from_raw(row: &RawRow) -> std::result::Result<Self, RowError> {
        let unit_price = row.money("unit_price")?;
        if unit_price.is_negative() {
            return Err(RowError::OutOfRange {
                field: "unit_price",
                value: unit_price.to_string(),
            });
        }
        Ok(Product {
            product_id: row.identifier("product_id")?,
            product_name: row
                .text("product_name")
                .map(title_case)
                .unwrap_or_else(|| "Unknown Product".to_string()),
            category: row.text_or("category", "unknown category").to_lowercase(),
            unit_price,
            stock_quantity: row.count("stock_quantity", 0)?,
            purchase_type: row.text_or("purchase_type", "unknown preference"),
        })
    }

    fn key(&self) -> String {
        self.product_id.clone()
    }

    fn table_filter(records: Vec<Self>, rules: &ScrubRules) -> Vec<Self> {
        if !rules.iqr_outliers || records.is_empty() {
            return records;
        }
        let prices: Vec<f64> = records.iter().map(|p| p.unit_price.cents() as f64).collect();
        let stock: Vec<f64> = records.iter().map(|p| f64::from(p.stock_quantity)).collect();
        let (price_lo, price_hi) = iqr_fence(&prices);
        let (stock_lo, stock_hi) = iqr_fence(&stock);
        debug!(
            "products: price fence [{:.2}, {:.2}], stock fence [{:.2}, {:.2}]",
            price_lo / 100.0,
            price_hi / 100.0,
            stock_lo,
            stock_hi
        );

        records
            .into_iter()
            .filter(|p| {
                let price = p.unit_price.cents() as f64;
                let qty = f64::from(p.stock_quantity);
                let keep = (price_lo..=price_hi).contains(&price) && (stock_lo..=stock_hi).contains(&qty);
                if !keep {
                    debug!("products: dropping {} as an outlier", p.product_id);
                }
                keep
            })
            .collect()
    }
}

impl Scrub for Sale {
    const ENTITY: EntityKind = EntityKind::Sales;
    const COLUMNS: &'static [&'static str] = SALE_COLUMNS;

    fn from_raw(row: &RawRow) -> std::result::Result<Self, RowError> {
        let sales_amount = row.money("sales_amount")?;
        if sales_amount.is_negative() {
            return Err(RowError::OutOfRange {
                field: "sales_amount",
                value: sales_amount.to_string(),
            });
        }
        Ok(Sale {
            sale_id: row.integer("sale_id")?,
            date: row.date("date")?,
            customer_id: row.identifier("customer_id")?,
            product_id: row.identifier("product_id")?,
            store_id: row.identifier_or_blank("store_id"),
            campaign_id: row.identifier_or_blank("campaign_id"),
            sales_amount,
            number_of_items: row.count("number_of_items", 1)?,
            city: row.text_or("city", "unknown city").to_lowercase(),
        })
    }

    fn key(&self) -> String {
        self.sale_id.to_string()
    }

    fn rule_violation(&self, rules: &ScrubRules) -> Option<String> {
        if let Some(max) = rules.max_items {
            if self.number_of_items > max {
                return Some(format!("{} items exceeds {}", self.number_of_items, max));
            }
        }
        if let Some(min) = rules.min_sale_amount {
            if self.sales_amount <= min {
                return Some(format!("amount {} at or below {}", self.sales_amount, min));
            }
        }
        None
    }
}

// ── Scrubbing ─────────────────────────────────────────────────────────────────

/// Run the coercion, deduplication and rule gates over already-read rows.
pub fn scrub_rows<T: Scrub>(
    rows: Vec<std::result::Result<RawRow, RowError>>,
    rules: &ScrubRules,
) -> (Vec<T>, ScrubReport) {
    let mut report = ScrubReport::new(T::ENTITY);
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept: Vec<T> = Vec::new();

    for row in rows {
        report.rows_read += 1;

        let record = match row {
            Ok(raw) => match T::from_raw(&raw) {
                Ok(record) => record,
                Err(e) => {
                    debug!("{}: dropping line {}: {}", T::ENTITY, raw.line, e);
                    report.dropped_malformed += 1;
                    continue;
                }
            },
            Err(e) => {
                debug!("{}: dropping undecodable record: {}", T::ENTITY, e);
                report.dropped_malformed += 1;
                continue;
            }
        };

        let key = record.key();
        if !seen.insert(key.clone()) {
            debug!("{}: dropping duplicate key {}", T::ENTITY, key);
            report.dropped_duplicate += 1;
            continue;
        }

        if let Some(reason) = record.rule_violation(rules) {
            debug!("{}: dropping {}: {}", T::ENTITY, key, reason);
            report.dropped_by_rule += 1;
            continue;
        }

        kept.push(record);
    }

    let before = kept.len();
    let kept = T::table_filter(kept, rules);
    report.dropped_by_rule += before - kept.len();
    report.rows_written = kept.len();

    (kept, report)
}

/// Scrub the raw file at `input` into a cleaned CSV at `output`.
pub fn scrub_file<T: Scrub>(input: &Path, output: &Path, rules: &ScrubRules) -> Result<ScrubReport> {
    info!("Scrubbing {} from {}", T::ENTITY, input.display());

    let table = read_raw_table(input, T::ENTITY)?;
    let (records, report) = scrub_rows::<T>(table.rows, rules);
    write_records(output, T::COLUMNS, &records)?;

    info!(
        "Scrubbed {}: {} read, {} written, {} dropped ({} malformed, {} duplicate, {} by rule) -> {}",
        report.entity,
        report.rows_read,
        report.rows_written,
        report.total_dropped(),
        report.dropped_malformed,
        report.dropped_duplicate,
        report.dropped_by_rule,
        output.display()
    );

    Ok(report)
}

/// Scrub one entity using the paths and rules from `config`.
pub fn scrub_entity(entity: EntityKind, config: &PipelineConfig) -> Result<ScrubReport> {
    let input = config.raw_path(entity);
    let output = config.prepared_path(entity);
    match entity {
        EntityKind::Customers => scrub_file::<Customer>(&input, &output, &config.rules),
        EntityKind::Products => scrub_file::<Product>(&input, &output, &config.rules),
        EntityKind::Sales => scrub_file::<Sale>(&input, &output, &config.rules),
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

/// Upper-case the first letter of every alphabetic run, lower-case the rest.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}

/// Linear-interpolated quantile of `sorted` at `q` in `[0, 1]`.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0];
    }
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Tukey fence `(Q1 - 1.5·IQR, Q3 + 1.5·IQR)`. `values` must be non-empty.
fn iqr_fence(values: &[f64]) -> (f64, f64) {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let q1 = quantile(&sorted, 0.25);
    let q3 = quantile(&sorted, 0.75);
    let iqr = q3 - q1;
    (q1 - 1.5 * iqr, q3 + 1.5 * iqr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use store_core::money::Money;
    use tempfile::TempDir;

    fn raw(pairs: &[(&str, &str)]) -> std::result::Result<RawRow, RowError> {
        Ok(RawRow::from_pairs(0, pairs.iter().copied()))
    }

    fn customer_row(id: &str, purchases: &str) -> std::result::Result<RawRow, RowError> {
        raw(&[
            ("customer_id", id),
            ("name", "Someone"),
            ("region", "North"),
            ("join_date", "2019-06-01"),
            ("number_of_purchases", purchases),
            ("contact_preferences", "sms"),
        ])
    }

    fn sale_row(id: &str, amount: &str, items: &str) -> std::result::Result<RawRow, RowError> {
        raw(&[
            ("sale_id", id),
            ("date", "2024-02-01"),
            ("customer_id", "C2"),
            ("product_id", "P1"),
            ("store_id", "401"),
            ("campaign_id", "0"),
            ("sales_amount", amount),
            ("number_of_items", items),
            ("city", "Springfield"),
        ])
    }

    fn product_row(id: &str, price: &str, stock: &str) -> std::result::Result<RawRow, RowError> {
        raw(&[
            ("product_id", id),
            ("product_name", "desk lamp"),
            ("category", "Home"),
            ("unit_price", price),
            ("stock_quantity", stock),
            ("purchase_type", "online"),
        ])
    }

    // ── customers ─────────────────────────────────────────────────────────────

    #[test]
    fn test_customer_zero_purchases_dropped() {
        let rows = vec![
            raw(&[
                ("customer_id", "C1"),
                ("name", "Jane Doe"),
                ("region", "South"),
                ("join_date", "2020-01-15"),
                ("number_of_purchases", "0"),
                ("contact_preferences", "email"),
            ]),
            raw(&[
                ("customer_id", "C2"),
                ("name", "John Roe"),
                ("region", "North"),
                ("join_date", "2019-06-01"),
                ("number_of_purchases", "5"),
                ("contact_preferences", "sms"),
            ]),
        ];

        let (kept, report) = scrub_rows::<Customer>(rows, &ScrubRules::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(
            kept[0],
            Customer {
                customer_id: "C2".to_string(),
                name: "John Roe".to_string(),
                region: "North".to_string(),
                join_date: NaiveDate::from_ymd_opt(2019, 6, 1).unwrap(),
                number_of_purchases: 5,
                contact_preferences: "sms".to_string(),
            }
        );
        assert_eq!(report.dropped_by_rule, 1);
        assert_eq!(report.rows_written, 1);
    }

    #[test]
    fn test_customer_negative_purchases_malformed() {
        let (kept, report) =
            scrub_rows::<Customer>(vec![customer_row("C9", "-1")], &ScrubRules::default());
        assert!(kept.is_empty());
        assert_eq!(report.dropped_malformed, 1);
    }

    #[test]
    fn test_dedupe_happens_before_zero_purchase_rule() {
        // The first C5 has zero purchases; it still claims the key.
        let rows = vec![customer_row("C5", "0"), customer_row("C5", "3")];
        let (kept, report) = scrub_rows::<Customer>(rows, &ScrubRules::default());
        assert!(kept.is_empty());
        assert_eq!(report.dropped_duplicate, 1);
        assert_eq!(report.dropped_by_rule, 1);
    }

    // ── sales ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_sale_duplicate_keeps_first() {
        let rows = vec![sale_row("100", "10.00", "2"), sale_row("100", "99.99", "1")];
        let (kept, report) = scrub_rows::<Sale>(rows, &ScrubRules::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].sales_amount, Money::from_cents(1000));
        assert_eq!(report.dropped_duplicate, 1);
    }

    #[test]
    fn test_malformed_first_row_does_not_claim_key() {
        let rows = vec![sale_row("100", "oops", "2"), sale_row("100", "12.00", "2")];
        let (kept, report) = scrub_rows::<Sale>(rows, &ScrubRules::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].sales_amount, Money::from_cents(1200));
        assert_eq!(report.dropped_malformed, 1);
        assert_eq!(report.dropped_duplicate, 0);
    }

    #[test]
    fn test_sale_coercion() {
        let (kept, _) = scrub_rows::<Sale>(vec![sale_row("100.0", "$15.499", "2.0")], &ScrubRules::default());
        let sale = &kept[0];
        assert_eq!(sale.sale_id, 100);
        assert_eq!(sale.sales_amount.to_string(), "15.50");
        assert_eq!(sale.number_of_items, 2);
        assert_eq!(sale.city, "springfield");
    }

    #[test]
    fn test_sale_zero_items_malformed() {
        let (kept, report) = scrub_rows::<Sale>(vec![sale_row("1", "5.00", "0")], &ScrubRules::default());
        assert!(kept.is_empty());
        assert_eq!(report.dropped_malformed, 1);
    }

    #[test]
    fn test_sale_rules() {
        let rules = ScrubRules {
            max_items: Some(7),
            min_sale_amount: Some(Money::from_cents(100)),
            iqr_outliers: false,
        };
        let rows = vec![
            sale_row("1", "50.00", "8"),
            sale_row("2", "1.00", "1"),
            sale_row("3", "1.01", "7"),
        ];
        let (kept, report) = scrub_rows::<Sale>(rows, &rules);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].sale_id, 3);
        assert_eq!(report.dropped_by_rule, 2);
    }

    #[test]
    fn test_undecodable_record_counted() {
        let rows = vec![Err(RowError::Malformed("invalid utf-8".to_string())), sale_row("1", "2.00", "1")];
        let (kept, report) = scrub_rows::<Sale>(rows, &ScrubRules::default());
        assert_eq!(kept.len(), 1);
        assert_eq!(report.rows_read, 2);
        assert_eq!(report.dropped_malformed, 1);
    }

    // ── products ──────────────────────────────────────────────────────────────

    #[test]
    fn test_product_normalization() {
        let (kept, _) = scrub_rows::<Product>(vec![product_row("P1", "19.999", "12")], &ScrubRules::default());
        let p = &kept[0];
        assert_eq!(p.product_name, "Desk Lamp");
        assert_eq!(p.category, "home");
        assert_eq!(p.unit_price.to_string(), "20.00");
    }

    #[test]
    fn test_product_placeholders() {
        let rows = vec![raw(&[
            ("product_id", "P2"),
            ("unit_price", "5"),
            ("stock_quantity", "1"),
        ])];
        let (kept, _) = scrub_rows::<Product>(rows, &ScrubRules::default());
        assert_eq!(kept[0].product_name, "Unknown Product");
        assert_eq!(kept[0].category, "unknown category");
        assert_eq!(kept[0].purchase_type, "unknown preference");
    }

    #[test]
    fn test_product_negative_price_malformed() {
        let (kept, report) = scrub_rows::<Product>(vec![product_row("P3", "-1.00", "4")], &ScrubRules::default());
        assert!(kept.is_empty());
        assert_eq!(report.dropped_malformed, 1);
    }

    #[test]
    fn test_product_iqr_outlier_removed() {
        let rules = ScrubRules {
            iqr_outliers: true,
            ..Default::default()
        };
        let rows = vec![
            product_row("P1", "10.00", "10"),
            product_row("P2", "11.00", "11"),
            product_row("P3", "12.00", "12"),
            product_row("P4", "13.00", "13"),
            product_row("P5", "900.00", "12"),
        ];
        let (kept, report) = scrub_rows::<Product>(rows, &rules);
        let ids: Vec<&str> = kept.iter().map(|p| p.product_id.as_str()).collect();
        assert_eq!(ids, vec!["P1", "P2", "P3", "P4"]);
        assert_eq!(report.dropped_by_rule, 1);
    }

    #[test]
    fn test_iqr_disabled_keeps_everything() {
        let rows = vec![product_row("P1", "10.00", "10"), product_row("P5", "900.00", "12")];
        let (kept, _) = scrub_rows::<Product>(rows, &ScrubRules::default());
        assert_eq!(kept.len(), 2);
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("desk LAMP"), "Desk Lamp");
        assert_eq!(title_case("o'neil 2-pack"), "O'Neil 2-Pack");
    }

    #[test]
    fn test_quantile_interpolates() {
        let v = [1.0, 2.0, 3.0, 4.0];
        assert!((quantile(&v, 0.25) - 1.75).abs() < 1e-9);
        assert!((quantile(&v, 0.75) - 3.25).abs() < 1e-9);
        assert_eq!(quantile(&[5.0], 0.5), 5.0);
    }

    // ── files ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_scrub_file_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("sales_data.csv");
        std::fs::write(
            &input,
            "TransactionID,SaleDate,CustomerID,ProductID,StoreID,CampaignID,SaleAmount,NumberofItems,City\n\
             100,2024-02-01,C2,P1,401,0,10.00,2,Springfield\n\
             100,2024-02-02,C2,P1,401,0,11.00,2,Springfield\n\
             101,02/03/2024,C2,P1,402,1,15.5,1,Shelbyville\n\
             102,not a date,C2,P1,402,1,15.5,1,Shelbyville\n",
        )
        .unwrap();

        let first = tmp.path().join("a.csv");
        let second = tmp.path().join("b.csv");
        let report = scrub_file::<Sale>(&input, &first, &ScrubRules::default()).unwrap();
        scrub_file::<Sale>(&input, &second, &ScrubRules::default()).unwrap();

        assert_eq!(report.rows_read, 4);
        assert_eq!(report.rows_written, 2);
        assert_eq!(report.dropped_duplicate, 1);
        assert_eq!(report.dropped_malformed, 1);

        let a = std::fs::read_to_string(&first).unwrap();
        let b = std::fs::read_to_string(&second).unwrap();
        assert_eq!(a, b);
        assert_eq!(
            a,
            "sale_id,date,customer_id,product_id,store_id,campaign_id,sales_amount,number_of_items,city\n\
             100,2024-02-01,C2,P1,401,0,10.00,2,springfield\n\
             101,2024-02-03,C2,P1,402,1,15.50,1,shelbyville\n"
        );
    }

    #[test]
    fn test_scrub_entity_uses_config_paths() {
        let tmp = TempDir::new().unwrap();
        let config = PipelineConfig::with_data_dir(tmp.path());
        std::fs::create_dir_all(&config.raw_dir).unwrap();
        std::fs::write(
            config.raw_path(EntityKind::Customers),
            "CustomerID,Name,Region,JoinDate,NumberOfPurchases,ContactPreference\n\
             C1,Jane Doe,South,2020-01-15,0,email\n\
             C2,John Roe,North,2019-06-01,5,sms\n",
        )
        .unwrap();

        let report = scrub_entity(EntityKind::Customers, &config).unwrap();
        assert_eq!(report.rows_written, 1);

        let out = std::fs::read_to_string(config.prepared_path(EntityKind::Customers)).unwrap();
        assert_eq!(
            out,
            "customer_id,name,region,join_date,number_of_purchases,contact_preferences\n\
             C2,John Roe,North,2019-06-01,5,sms\n"
        );
    }
}
