use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::Money;

/// The three warehouse entities handled by the scrubbers and the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Customers,
    Products,
    Sales,
}

impl EntityKind {
    /// All entities in load order (referenced tables first).
    pub const ALL: [EntityKind; 3] = [EntityKind::Customers, EntityKind::Products, EntityKind::Sales];

    /// Table name and file stem for this entity.
    pub fn name(self) -> &'static str {
        match self {
            EntityKind::Customers => "customers",
            EntityKind::Products => "products",
            EntityKind::Sales => "sales",
        }
    }

    /// Canonical primary-key column.
    pub fn key_column(self) -> &'static str {
        match self {
            EntityKind::Customers => "customer_id",
            EntityKind::Products => "product_id",
            EntityKind::Sales => "sale_id",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A cleaned customer row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub name: String,
    pub region: String,
    /// Serialized as ISO-8601 `YYYY-MM-DD`.
    pub join_date: NaiveDate,
    pub number_of_purchases: u32,
    pub contact_preferences: String,
}

/// A cleaned product row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub product_id: String,
    pub product_name: String,
    /// Lower-cased category label.
    pub category: String,
    pub unit_price: Money,
    pub stock_quantity: u32,
    pub purchase_type: String,
}

/// A cleaned sale row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub sale_id: i64,
    pub date: NaiveDate,
    pub customer_id: String,
    pub product_id: String,
    pub store_id: String,
    pub campaign_id: String,
    pub sales_amount: Money,
    pub number_of_items: u32,
    /// Lower-cased city name.
    pub city: String,
}

/// One aggregated cube cell keyed by (category, city, year, customer_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CubeRow {
    pub category: String,
    pub city: String,
    /// Calendar year the customer joined.
    pub year: i32,
    pub customer_id: String,
    pub sales_amount_sum: Money,
    pub sales_amount_mean: Money,
    pub days_since_joined_sum: i64,
    /// Mean tenure in days, rounded to two decimals.
    pub days_since_joined_avg: f64,
    pub time_since_joined: String,
    /// Rows whose basis date precedes the join date.
    pub negative_tenure_rows: u64,
    pub row_count: u64,
}

/// Which date tenure is measured against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenureBasis {
    /// Days from the customer's join date to each sale's date.
    SaleDate,
    /// Days from the customer's join date to a fixed reference date.
    AsOf(NaiveDate),
}

impl fmt::Display for TenureBasis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TenureBasis::SaleDate => f.write_str("sale-date"),
            TenureBasis::AsOf(d) => write!(f, "as-of {}", d),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_names_and_keys() {
        assert_eq!(EntityKind::Customers.name(), "customers");
        assert_eq!(EntityKind::Products.key_column(), "product_id");
        assert_eq!(EntityKind::Sales.key_column(), "sale_id");
        assert_eq!(EntityKind::Sales.to_string(), "sales");
    }

    #[test]
    fn test_entity_load_order_puts_sales_last() {
        assert_eq!(EntityKind::ALL.last(), Some(&EntityKind::Sales));
    }

    #[test]
    fn test_sale_serializes_in_schema_order() {
        let sale = Sale {
            sale_id: 100,
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            customer_id: "C2".to_string(),
            product_id: "P1".to_string(),
            store_id: "401".to_string(),
            campaign_id: "0".to_string(),
            sales_amount: Money::from_cents(1550),
            number_of_items: 2,
            city: "springfield".to_string(),
        };
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.serialize(&sale).unwrap();
        let out = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("sale_id,date,customer_id,product_id,store_id,campaign_id,sales_amount,number_of_items,city")
        );
        assert_eq!(lines.next(), Some("100,2024-02-01,C2,P1,401,0,15.50,2,springfield"));
    }

    #[test]
    fn test_tenure_basis_display() {
        assert_eq!(TenureBasis::SaleDate.to_string(), "sale-date");
        let basis = TenureBasis::AsOf(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        assert_eq!(basis.to_string(), "as-of 2025-01-01");
    }
}
