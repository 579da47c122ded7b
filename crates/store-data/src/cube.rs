//! Sales cube aggregation.
//!
//! Joins each cleaned sale to its product (for the category) and customer
//! (for the join date), then groups by `(category, city, join_year,
//! customer_id)`. Groups live in a `BTreeMap` so the output is always sorted
//! by that key.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use store_core::dates::{days_between, describe_tenure, year_of};
use store_core::error::Result;
use store_core::models::{CubeRow, Customer, EntityKind, Product, Sale, TenureBasis};
use store_core::money::Money;
use store_core::settings::PipelineConfig;
use tracing::{debug, info, warn};

use crate::columns::CUBE_COLUMNS;
use crate::reader::read_records;
use crate::writer::write_records;

// ── GroupStats ────────────────────────────────────────────────────────────────

/// Running totals for one cube cell.
#[derive(Debug, Clone, Default)]
struct GroupStats {
    sales_amount: Money,
    tenure_days: i64,
    negative_tenure_rows: u64,
    count: u64,
}

impl GroupStats {
    fn add(&mut self, amount: Money, tenure_days: i64) {
        self.sales_amount += amount;
        self.tenure_days += tenure_days;
        if tenure_days < 0 {
            self.negative_tenure_rows += 1;
        }
        self.count += 1;
    }

    fn average_tenure(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.tenure_days as f64 / self.count as f64
    }
}

/// `(category, city, join_year, customer_id)`
type GroupKey = (String, String, i32, String);

// ── CubeReport ────────────────────────────────────────────────────────────────

/// Counts from one cube build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CubeReport {
    pub tenure_basis: TenureBasis,
    pub sales_read: usize,
    pub sales_joined: usize,
    pub dangling_customer: usize,
    pub dangling_product: usize,
    /// Sales dropped because their customer has no recorded purchases.
    pub zero_purchase_customer: usize,
    pub negative_tenure_rows: usize,
    /// Sales left out because their amount would overflow a group or the total.
    pub amount_overflow: usize,
    /// Sum of `sales_amount` over joined sales.
    pub sales_amount_total: Money,
    pub groups_written: usize,
    /// Cleaned rows that failed to deserialize, across all three inputs.
    pub malformed_rows: usize,
}

impl CubeReport {
    fn new(tenure_basis: TenureBasis) -> Self {
        Self {
            tenure_basis,
            sales_read: 0,
            sales_joined: 0,
            dangling_customer: 0,
            dangling_product: 0,
            zero_purchase_customer: 0,
            negative_tenure_rows: 0,
            amount_overflow: 0,
            sales_amount_total: Money::ZERO,
            groups_written: 0,
            malformed_rows: 0,
        }
    }
}

// ── CubeBuilder ───────────────────────────────────────────────────────────────

/// Stateless helper that folds cleaned tables into cube rows.
pub struct CubeBuilder;

impl CubeBuilder {
    /// Join and group `sales`, returning rows sorted by the grouping key.
    ///
    /// Sales whose customer or product is unknown are excluded, customer
    /// first, so each excluded sale is counted exactly once.
    pub fn aggregate(
        customers: &[Customer],
        products: &[Product],
        sales: &[Sale],
        basis: TenureBasis,
    ) -> (Vec<CubeRow>, CubeReport) {
        let customer_by_id: HashMap<&str, &Customer> =
            customers.iter().map(|c| (c.customer_id.as_str(), c)).collect();
        let product_by_id: HashMap<&str, &Product> =
            products.iter().map(|p| (p.product_id.as_str(), p)).collect();

        let mut report = CubeReport::new(basis);
        let mut groups: BTreeMap<GroupKey, GroupStats> = BTreeMap::new();

        for sale in sales {
            report.sales_read += 1;

            let Some(customer) = customer_by_id.get(sale.customer_id.as_str()) else {
                debug!("cube: sale {} references unknown customer {}", sale.sale_id, sale.customer_id);
                report.dangling_customer += 1;
                continue;
            };
            if customer.number_of_purchases == 0 {
                debug!("cube: sale {} belongs to zero-purchase customer {}", sale.sale_id, customer.customer_id);
                report.zero_purchase_customer += 1;
                continue;
            }
            let Some(product) = product_by_id.get(sale.product_id.as_str()) else {
                debug!("cube: sale {} references unknown product {}", sale.sale_id, sale.product_id);
                report.dangling_product += 1;
                continue;
            };

            let basis_date = match basis {
                TenureBasis::SaleDate => sale.date,
                TenureBasis::AsOf(date) => date,
            };
            let key = (
                product.category.clone(),
                sale.city.clone(),
                year_of(customer.join_date),
                sale.customer_id.clone(),
            );
            let group_sum = groups.get(&key).map_or(Money::ZERO, |g| g.sales_amount);
            let Some(total) = report.sales_amount_total.checked_add(sale.sales_amount) else {
                warn!("cube: sale {} amount {} overflows the sales total", sale.sale_id, sale.sales_amount);
                report.amount_overflow += 1;
                continue;
            };
            if group_sum.checked_add(sale.sales_amount).is_none() {
                warn!("cube: sale {} amount {} overflows its group total", sale.sale_id, sale.sales_amount);
                report.amount_overflow += 1;
                continue;
            }

            let tenure = days_between(customer.join_date, basis_date);
            if tenure < 0 {
                warn!(
                    "cube: sale {} has negative tenure ({} days): customer {} joined {} after {}",
                    sale.sale_id, tenure, customer.customer_id, customer.join_date, basis_date
                );
                report.negative_tenure_rows += 1;
            }

            groups.entry(key).or_default().add(sale.sales_amount, tenure);
            report.sales_amount_total = total;
            report.sales_joined += 1;
        }

        let rows: Vec<CubeRow> = groups
            .into_iter()
            .map(|((category, city, year, customer_id), stats)| {
                let avg = stats.average_tenure();
                CubeRow {
                    category,
                    city,
                    year,
                    customer_id,
                    sales_amount_sum: stats.sales_amount,
                    sales_amount_mean: stats.sales_amount.mean_of(stats.count),
                    days_since_joined_sum: stats.tenure_days,
                    days_since_joined_avg: (avg * 100.0).round() / 100.0,
                    time_since_joined: describe_tenure(avg.round() as i64),
                    negative_tenure_rows: stats.negative_tenure_rows,
                    row_count: stats.count,
                }
            })
            .collect();

        report.groups_written = rows.len();
        (rows, report)
    }
}

/// Read the cleaned files named by `config`, aggregate and write the cube.
pub fn build_cube(config: &PipelineConfig) -> Result<CubeReport> {
    let (customers, bad_customers) = read_records::<Customer>(&config.prepared_path(EntityKind::Customers))?;
    let (products, bad_products) = read_records::<Product>(&config.prepared_path(EntityKind::Products))?;
    let (sales, bad_sales) = read_records::<Sale>(&config.prepared_path(EntityKind::Sales))?;

    info!(
        "Building cube from {} customers, {} products, {} sales (tenure basis {})",
        customers.len(),
        products.len(),
        sales.len(),
        config.tenure_basis
    );

    let (rows, mut report) = CubeBuilder::aggregate(&customers, &products, &sales, config.tenure_basis);
    report.malformed_rows = bad_customers + bad_products + bad_sales;

    let path = config.cube_path();
    write_records(&path, CUBE_COLUMNS, &rows)?;

    if report.negative_tenure_rows > 0 {
        warn!("cube: {} sales have a basis date before the customer's join date", report.negative_tenure_rows);
    }
    info!(
        "Cube written: {} groups from {} of {} sales ({} dangling customer, {} dangling product, {} zero-purchase, {} amount overflow, {} malformed input rows) -> {}",
        report.groups_written,
        report.sales_joined,
        report.sales_read,
        report.dangling_customer,
        report.dangling_product,
        report.zero_purchase_customer,
        report.amount_overflow,
        report.malformed_rows,
        path.display()
    );

    Ok(report)
}
