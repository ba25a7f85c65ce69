// Builds the sample medical practice database.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tracing::info;

use crate::db::DbError;
use crate::sql::quote_identifier;

/// Tables in creation order.
pub const SEED_TABLES: &[&str] = &[
    "bank_statements",
    "profit_loss_reports",
    "purchase_orders",
    "purchase_order_items",
    "supply_catalog",
    "equity_ownership",
    "payor_contracts",
    "contract_procedures",
];

const SCHEMA_AND_DATA: &str = "
CREATE TABLE bank_statements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    date DATE,
    description VARCHAR(255),
    withdrawal REAL,
    deposit REAL,
    balance REAL
);
INSERT INTO bank_statements (date, description, withdrawal, deposit, balance) VALUES
    ('2025-01-02', 'Insurance Reimbursement (Aetna)', NULL, 145000.00, 145000.00),
    ('2025-01-05', 'Vendor Payment - Medline', 35820.00, NULL, 109180.00),
    ('2025-01-10', 'Payroll', 72100.00, NULL, 37080.00),
    ('2025-01-15', 'Patient Payment (POS)', NULL, 8700.00, 45780.00);

CREATE TABLE profit_loss_reports (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    period_start DATE,
    period_end DATE,
    total_revenue REAL,
    total_expense REAL,
    net_profit REAL
);
INSERT INTO profit_loss_reports (period_start, period_end, total_revenue, total_expense, net_profit) VALUES
    ('2024-10-01', '2024-12-31', 474500.00, 362500.00, 112000.00),
    ('2024-07-01', '2024-09-30', 500000.00, 380000.00, 120000.00);

CREATE TABLE purchase_orders (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    po_number VARCHAR(50),
    date DATE,
    vendor VARCHAR(100),
    total_amount REAL
);
INSERT INTO purchase_orders (po_number, date, vendor, total_amount) VALUES
    ('MS-PO-2025-011', '2025-01-12', 'Medline Industries', 18565.00),
    ('MS-PO-2025-012', '2025-01-15', 'Surgical Supplies Co.', 12250.00);

CREATE TABLE purchase_order_items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    purchase_order_id INTEGER REFERENCES purchase_orders(id),
    item_description VARCHAR(255),
    quantity INTEGER,
    unit_price REAL,
    total_price REAL
);
INSERT INTO purchase_order_items (purchase_order_id, item_description, quantity, unit_price, total_price) VALUES
    (1, 'Ortho Implant Kit', 5, 2400.00, 12000.00),
    (1, 'Surgical Drapes Set', 100, 22.50, 2250.00),
    (2, 'Hip Prosthesis', 10, 800.00, 8000.00);

CREATE TABLE supply_catalog (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    item_name VARCHAR(255),
    sku VARCHAR(50),
    unit_price REAL,
    vendor VARCHAR(100),
    notes TEXT
);
INSERT INTO supply_catalog (item_name, sku, unit_price, vendor, notes) VALUES
    ('Ortho Knee Implant (Standard)', 'OT-KI-STD', 2450.00, 'OrthoTech Supplies', 'FDA approved'),
    ('Hip Replacement Stem', 'OT-HR-STEM', 1980.00, 'OrthoTech Supplies', 'Titanium coated');

CREATE TABLE equity_ownership (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name VARCHAR(100),
    role VARCHAR(100),
    ownership_percent REAL,
    type VARCHAR(50)
);
INSERT INTO equity_ownership (name, role, ownership_percent, type) VALUES
    ('Dr. Alicia Mendez', 'Medical Director', 35.00, 'Voting Equity'),
    ('Dr. Rajiv Kapoor', 'Surgeon', 25.00, 'Voting Equity'),
    ('MedSure Holdings', 'Investment Partner', 40.00, 'Preferred Equity');

CREATE TABLE payor_contracts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payor_name VARCHAR(100),
    effective_from DATE,
    effective_to DATE,
    payment_terms TEXT
);
INSERT INTO payor_contracts (payor_name, effective_from, effective_to, payment_terms) VALUES
    ('Aetna', '2023-01-01', '2025-12-31', 'Claims due in 30 days, 45-day payout'),
    ('Blue Cross', '2023-06-01', '2025-06-01', 'Monthly claims, 60-day payout');

CREATE TABLE contract_procedures (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payor_contract_id INTEGER REFERENCES payor_contracts(id),
    cpt_code VARCHAR(10),
    procedure_name VARCHAR(255),
    fee_schedule_rate REAL,
    notes TEXT
);
INSERT INTO contract_procedures (payor_contract_id, cpt_code, procedure_name, fee_schedule_rate, notes) VALUES
    (1, '29881', 'Knee Arthroscopy (Meniscectomy)', 1250.00, 'Ambulatory surgery only'),
    (1, '27447', 'Total Knee Arthroplasty', 7800.00, 'Includes implant');
";

#[derive(Debug, Clone, PartialEq)]
pub struct SeededTable {
    pub name: String,
    pub row_count: i64,
    /// `(column, declared type)` pairs.
    pub columns: Vec<(String, String)>,
}

/// Summary of a fresh practice database.
#[derive(Debug, Clone)]
pub struct InitReport {
    pub path: PathBuf,
    pub replaced_existing: bool,
    pub tables: Vec<SeededTable>,
}

impl InitReport {
    /// Console summary printed by `medsql init-db`.
    pub fn render(&self) -> String {
        let mut out = format!("Initializing database: {}\n", self.path.display());
        if self.replaced_existing {
            let _ = writeln!(out, "Removed existing database: {}", self.path.display());
        }
        out.push_str("\nTables created and their row counts:\n");
        for table in &self.tables {
            let _ = writeln!(out, "{}: {} rows", table.name, table.row_count);
            out.push_str("  Columns:\n");
            for (name, ty) in &table.columns {
                let _ = writeln!(out, "  - {name} ({ty})");
            }
        }
        out
    }
}

/// Recreate the practice database at `path` with the sample tables and rows.
/// Any existing file is removed first.
pub fn init_database(path: &Path) -> Result<InitReport, DbError> {
    let replaced_existing = path.exists();
    if replaced_existing {
        std::fs::remove_file(path)?;
        info!("Removed existing database: {}", path.display());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let mut conn = Connection::open(path)?;
    let tx = conn.transaction()?;
    tx.execute_batch(SCHEMA_AND_DATA)?;
    tx.commit()?;

    let mut tables = Vec::with_capacity(SEED_TABLES.len());
    for name in SEED_TABLES {
        let row_count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", quote_identifier(name)),
            [],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare("SELECT name, type FROM pragma_table_info(?1)")?;
        let columns = stmt
            .query_map(params![name], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<(String, String)>, _>>()?;

        tables.push(SeededTable {
            name: name.to_string(),
            row_count,
            columns,
        });
    }

    info!("Initialized practice database at {}", path.display());
    Ok(InitReport {
        path: path.to_path_buf(),
        replaced_existing,
        tables,
    })
}
