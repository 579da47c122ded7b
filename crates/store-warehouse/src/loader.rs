//! SQLite warehouse loader.
//!
//! Every load replaces the database file wholesale, creates the three tables,
//! and inserts customers, products and sales in that order inside a single
//! transaction. Primary-key and foreign-key violations are resolved per row
//! according to a [`ConflictPolicy`].

use std::path::{Path, PathBuf};

use rusqlite::{ffi, params, Connection, Statement, Transaction};
use serde::Serialize;
use store_core::error::{Result, StoreError};
use store_core::models::{Customer, EntityKind, Product, Sale};
pub use store_core::settings::ConflictPolicy;
use store_core::settings::PipelineConfig;
use store_data::reader::read_records;
use tracing::{debug, info, warn};

/// Warehouse DDL, one statement per table.
pub const SCHEMA: &str = "\
CREATE TABLE customers (customer_id TEXT PRIMARY KEY, name TEXT, region TEXT, join_date TEXT, number_of_purchases INTEGER, contact_preferences TEXT);
CREATE TABLE products (product_id TEXT PRIMARY KEY, product_name TEXT, category TEXT, unit_price REAL, stock_quantity INTEGER, purchase_type TEXT);
CREATE TABLE sales (sale_id INTEGER PRIMARY KEY, date TEXT, customer_id TEXT REFERENCES customers, product_id TEXT REFERENCES products, store_id TEXT, campaign_id TEXT, sales_amount REAL, number_of_items INTEGER, city TEXT);
";

// ── Report ───────────────────────────────────────────────────────────────────

/// Insert counts for one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableLoad {
    pub table: EntityKind,
    pub inserted: usize,
    pub skipped_duplicate: usize,
    pub skipped_dangling: usize,
}

impl TableLoad {
    fn new(table: EntityKind) -> Self {
        Self {
            table,
            inserted: 0,
            skipped_duplicate: 0,
            skipped_dangling: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    pub database: PathBuf,
    pub policy: ConflictPolicy,
    pub tables: Vec<TableLoad>,
    /// Cleaned rows that failed to deserialize before loading.
    pub malformed_rows: usize,
}

impl LoadReport {
    pub fn table(&self, entity: EntityKind) -> Option<&TableLoad> {
        self.tables.iter().find(|t| t.table == entity)
    }

    pub fn total_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.inserted).sum()
    }

    pub fn total_skipped(&self) -> usize {
        self.tables
            .iter()
            .map(|t| t.skipped_duplicate + t.skipped_dangling)
            .sum()
    }
}

// ── Row binding ───────────────────────────────────────────────────────────────

/// A cleaned record that maps onto one warehouse table.
trait WarehouseRow {
    const ENTITY: EntityKind;
    const INSERT: &'static str;

    fn key(&self) -> String;
    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize>;
}

impl WarehouseRow for Customer {
    const ENTITY: EntityKind = EntityKind::Customers;
    const INSERT: &'static str = "INSERT INTO customers (customer_id, name, region, join_date, number_of_purchases, contact_preferences) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

    fn key(&self) -> String {
        self.customer_id.clone()
    }

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.customer_id,
            self.name,
            self.region,
            self.join_date.to_string(),
            self.number_of_purchases,
            self.contact_preferences,
        ])
    }
}

impl WarehouseRow for Product {
    const ENTITY: EntityKind = EntityKind::Products;
    const INSERT: &'static str = "INSERT INTO products (product_id, product_name, category, unit_price, stock_quantity, purchase_type) VALUES (?1, ?2, ?3, ?4, ?5, ?6)";

    fn key(&self) -> String {
        self.product_id.clone()
    }

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.product_id,
            self.product_name,
            self.category,
            self.unit_price.as_f64(),
            self.stock_quantity,
            self.purchase_type,
        ])
    }
}

impl WarehouseRow for Sale {
    const ENTITY: EntityKind = EntityKind::Sales;
    const INSERT: &'static str = "INSERT INTO sales (sale_id, date, customer_id, product_id, store_id, campaign_id, sales_amount, number_of_items, city) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

    fn key(&self) -> String {
        self.sale_id.to_string()
    }

    fn insert(&self, stmt: &mut Statement<'_>) -> rusqlite::Result<usize> {
        stmt.execute(params![
            self.sale_id,
            self.date.to_string(),
            self.customer_id,
            self.product_id,
            self.store_id,
            self.campaign_id,
            self.sales_amount.as_f64(),
            self.number_of_items,
            self.city,
        ])
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Conflict {
    Duplicate,
    Dangling,
}

fn classify(err: &rusqlite::Error) -> Option<Conflict> {
    match err {
        rusqlite::Error::SqliteFailure(e, _) => match e.extended_code {
            ffi::SQLITE_CONSTRAINT_PRIMARYKEY | ffi::SQLITE_CONSTRAINT_UNIQUE => Some(Conflict::Duplicate),
            ffi::SQLITE_CONSTRAINT_FOREIGNKEY => Some(Conflict::Dangling),
            _ => None,
        },
        _ => None,
    }
}

// ── Loader ────────────────────────────────────────────────────────────────────

/// Writes cleaned tables into a fresh SQLite database.
#[derive(Debug, Clone)]
pub struct Loader {
    path: PathBuf,
    policy: ConflictPolicy,
}

impl Loader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            policy: ConflictPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the database and insert all rows in one transaction.
    pub fn load(&self, customers: &[Customer], products: &[Product], sales: &[Sale]) -> Result<LoadReport> {
        let mut conn = self.recreate()?;
        let tx = conn.transaction()?;

        let tables = vec![
            self.insert_rows(&tx, customers)?,
            self.insert_rows(&tx, products)?,
            self.insert_rows(&tx, sales)?,
        ];
        tx.commit()?;

        Ok(LoadReport {
            database: self.path.clone(),
            policy: self.policy,
            tables,
            malformed_rows: 0,
        })
    }

    /// Delete any existing database and open a new one with the schema.
    fn recreate(&self) -> Result<Connection> {
        if self.path.exists() {
            debug!("Removing existing warehouse {}", self.path.display());
            std::fs::remove_file(&self.path).map_err(|source| StoreError::FileWrite {
                path: self.path.clone(),
                source,
            })?;
        }

        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(conn)
    }

    fn insert_rows<T: WarehouseRow>(&self, tx: &Transaction<'_>, rows: &[T]) -> Result<TableLoad> {
        let mut stmt = tx.prepare(T::INSERT)?;
        let mut load = TableLoad::new(T::ENTITY);

        for row in rows {
            let err = match row.insert(&mut stmt) {
                Ok(_) => {
                    load.inserted += 1;
                    continue;
                }
                Err(err) => err,
            };

            match (classify(&err), self.policy) {
                (Some(Conflict::Duplicate), ConflictPolicy::Skip) => {
                    warn!("{}: skipping duplicate key {}", T::ENTITY, row.key());
                    load.skipped_duplicate += 1;
                }
                (Some(Conflict::Dangling), ConflictPolicy::Skip) => {
                    warn!("{}: skipping {} with a dangling reference", T::ENTITY, row.key());
                    load.skipped_dangling += 1;
                }
                _ => return Err(err.into()),
            }
        }

        info!(
            "{}: {} inserted, {} duplicate, {} dangling",
            T::ENTITY,
            load.inserted,
            load.skipped_duplicate,
            load.skipped_dangling
        );
        Ok(load)
    }
}

/// Read the cleaned files named by `config` and load them into the warehouse.
pub fn load_warehouse(config: &PipelineConfig) -> Result<LoadReport> {
    let (customers, bad_customers) = read_records::<Customer>(&config.prepared_path(EntityKind::Customers))?;
    let (products, bad_products) = read_records::<Product>(&config.prepared_path(EntityKind::Products))?;
    let (sales, bad_sales) = read_records::<Sale>(&config.prepared_path(EntityKind::Sales))?;

    let mut report = Loader::new(&config.warehouse_path)
        .with_policy(config.conflict_policy)
        .load(&customers, &products, &sales)?;
    report.malformed_rows = bad_customers + bad_products + bad_sales;
    info!(
        "Loaded {} rows into {} ({} skipped, {} malformed input rows, {} policy)",
        report.total_inserted(),
        config.warehouse_path.display(),
        report.total_skipped(),
        report.malformed_rows,
        config.conflict_policy
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use store_core::money::Money;
    use tempfile::TempDir;

    fn customer(id: &str) -> Customer {
        Customer {
            customer_id: id.to_string(),
            name: "John Roe".to_string(),
            region: "North".to_string(),
            join_date: NaiveDate::from_ymd_opt(2019, 6, 1).unwrap(),
            number_of_purchases: 5,
            contact_preferences: "sms".to_string(),
        }
    }

    fn product(id: &str) -> Product {
        Product {
            product_id: id.to_string(),
            product_name: "Desk Lamp".to_string(),
            category: "home".to_string(),
            unit_price: Money::from_cents(1999),
            stock_quantity: 4,
            purchase_type: "online".to_string(),
        }
    }

    fn sale(id: i64, customer_id: &str, product_id: &str) -> Sale {
        Sale {
            sale_id: id,
            date: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            customer_id: customer_id.to_string(),
            product_id: product_id.to_string(),
            store_id: "401".to_string(),
            campaign_id: "0".to_string(),
            sales_amount: Money::from_cents(1550),
            number_of_items: 2,
            city: "springfield".to_string(),
        }
    }

    fn count(path: &Path, table: &str) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    #[test]
    fn test_load_inserts_all_rows() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("smart_sales.db");

        let report = Loader::new(&db)
            .load(&[customer("C2")], &[product("P1")], &[sale(100, "C2", "P1")])
            .unwrap();

        assert_eq!(report.total_inserted(), 3);
        assert_eq!(report.total_skipped(), 0);
        assert_eq!(count(&db, "sales"), 1);

        let conn = Connection::open(&db).unwrap();
        let (date, amount): (String, f64) = conn
            .query_row("SELECT date, sales_amount FROM sales WHERE sale_id = 100", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(date, "2024-02-01");
        assert_eq!(amount, 15.5);
    }

    #[test]
    fn test_dangling_customer_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("smart_sales.db");

        let report = Loader::new(&db)
            .load(
                &[customer("C2")],
                &[product("P1")],
                &[sale(100, "C2", "P1"), sale(101, "C404", "P1")],
            )
            .unwrap();

        let sales = report.table(EntityKind::Sales).unwrap();
        assert_eq!(sales.inserted, 1);
        assert_eq!(sales.skipped_dangling, 1);
        assert_eq!(sales.skipped_duplicate, 0);
        assert_eq!(count(&db, "sales"), 1);
    }

    #[test]
    fn test_duplicate_key_is_skipped() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("smart_sales.db");

        let report = Loader::new(&db)
            .load(&[customer("C2"), customer("C2")], &[product("P1")], &[])
            .unwrap();

        let customers = report.table(EntityKind::Customers).unwrap();
        assert_eq!(customers.inserted, 1);
        assert_eq!(customers.skipped_duplicate, 1);
    }

    #[test]
    fn test_abort_policy_fails_and_commits_nothing() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("smart_sales.db");

        let err = Loader::new(&db)
            .with_policy(ConflictPolicy::Abort)
            .load(&[customer("C2")], &[product("P1")], &[sale(101, "C404", "P1")])
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
        assert_eq!(count(&db, "customers"), 0);
    }

    #[test]
    fn test_reload_replaces_database() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("smart_sales.db");
        let loader = Loader::new(&db);

        loader
            .load(&[customer("C1"), customer("C2")], &[product("P1")], &[])
            .unwrap();
        loader.load(&[customer("C2")], &[product("P1")], &[]).unwrap();

        assert_eq!(count(&db, "customers"), 1);
    }

    #[test]
    fn test_load_warehouse_reads_prepared_files() {
        let tmp = TempDir::new().unwrap();
        let config = PipelineConfig::with_data_dir(tmp.path());
        std::fs::create_dir_all(&config.prepared_dir).unwrap();
        std::fs::create_dir_all(config.warehouse_dir()).unwrap();
        std::fs::write(
            config.prepared_path(EntityKind::Customers),
            "customer_id,name,region,join_date,number_of_purchases,contact_preferences\n\
             C2,John Roe,North,2019-06-01,5,sms\n",
        )
        .unwrap();
        std::fs::write(
            config.prepared_path(EntityKind::Products),
            "product_id,product_name,category,unit_price,stock_quantity,purchase_type\n\
             P1,Desk Lamp,home,19.99,4,online\n",
        )
        .unwrap();
        std::fs::write(
            config.prepared_path(EntityKind::Sales),
            "sale_id,date,customer_id,product_id,store_id,campaign_id,sales_amount,number_of_items,city\n\
             100,2024-02-01,C2,P1,401,0,15.50,2,springfield\n\
             101,2024-02-02,C9,P1,401,0,1.00,1,springfield\n",
        )
        .unwrap();

        let report = load_warehouse(&config).unwrap();
        assert_eq!(report.total_inserted(), 3);
        assert_eq!(report.table(EntityKind::Sales).unwrap().skipped_dangling, 1);
        assert_eq!(report.malformed_rows, 0);
    }

    #[test]
    fn test_load_warehouse_counts_malformed_rows_and_honours_policy() {
        let tmp = TempDir::new().unwrap();
        let mut config = PipelineConfig::with_data_dir(tmp.path());
        std::fs::create_dir_all(&config.prepared_dir).unwrap();
        std::fs::create_dir_all(config.warehouse_dir()).unwrap();
        std::fs::write(
            config.prepared_path(EntityKind::Customers),
            "customer_id,name,region,join_date,number_of_purchases,contact_preferences\n\
             C2,John Roe,North,2019-06-01,5,sms\n\
             C3,Bad Date,East,not-a-date,2,email\n",
        )
        .unwrap();
        std::fs::write(
            config.prepared_path(EntityKind::Products),
            "product_id,product_name,category,unit_price,stock_quantity,purchase_type\n\
             P1,Desk Lamp,home,19.99,4,online\n",
        )
        .unwrap();
        std::fs::write(
            config.prepared_path(EntityKind::Sales),
            "sale_id,date,customer_id,product_id,store_id,campaign_id,sales_amount,number_of_items,city\n\
             100,2024-02-01,C2,P1,401,0,15.50,2,springfield\n\
             101,2024-02-02,C9,P1,401,0,1.00,1,springfield\n",
        )
        .unwrap();

        let report = load_warehouse(&config).unwrap();
        assert_eq!(report.malformed_rows, 1);
        assert_eq!(report.policy, ConflictPolicy::Skip);

        config.conflict_policy = ConflictPolicy::Abort;
        let err = load_warehouse(&config).unwrap_err();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
