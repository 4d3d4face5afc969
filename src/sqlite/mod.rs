//! SQLite-backed [`DocumentRepository`] and [`BillingDirectory`].
//!
//! One `tokio_rusqlite::Connection` serializes every statement on its
//! background thread. Number allocation additionally runs inside an
//! `IMMEDIATE` transaction and the `number` column is unique, so separate
//! processes sharing the database file cannot hand out the same number.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use rust_decimal::Decimal;
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::core::{
    AgencySettings, ArtifactKind, BelegError, BillingDirectory, Client, DocumentNumber,
    DocumentRecord, DocumentRepository, Invoice, LineItem, NextNumber, SequenceKey,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    family     TEXT NOT NULL,
    number     TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
);
CREATE TABLE IF NOT EXISTS document_artifacts (
    document_id INTEGER NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    kind        TEXT NOT NULL,
    path        TEXT NOT NULL,
    updated_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now')),
    PRIMARY KEY (document_id, kind)
);
CREATE TABLE IF NOT EXISTS clients (
    id           INTEGER PRIMARY KEY,
    name         TEXT,
    company_name TEXT,
    address      TEXT,
    postal_code  TEXT,
    city         TEXT,
    country      TEXT
);
CREATE TABLE IF NOT EXISTS invoices (
    id              INTEGER PRIMARY KEY REFERENCES documents(id),
    client_id       INTEGER NOT NULL,
    issue_date      TEXT NOT NULL,
    due_date        TEXT,
    vat_rate        TEXT NOT NULL,
    additional_info TEXT
);
CREATE TABLE IF NOT EXISTS invoice_lines (
    invoice_id  INTEGER NOT NULL REFERENCES invoices(id) ON DELETE CASCADE,
    position    INTEGER NOT NULL,
    description TEXT NOT NULL,
    quantity    TEXT NOT NULL,
    unit_price  TEXT NOT NULL,
    PRIMARY KEY (invoice_id, position)
);
CREATE TABLE IF NOT EXISTS agency_settings (
    id             INTEGER PRIMARY KEY CHECK (id = 1),
    company_name   TEXT,
    represented_by TEXT,
    street         TEXT,
    postal_code    TEXT,
    city           TEXT,
    country        TEXT,
    iban           TEXT,
    qr_iban        TEXT
);
";

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Repository over a single SQLite database.
#[derive(Clone)]
pub struct SqliteRepository {
    conn: Connection,
}

fn map_tr_err(context: &str) -> impl Fn(tokio_rusqlite::Error<rusqlite::Error>) -> BelegError + '_ {
    move |e| BelegError::Persistence(format!("{context}: {e}"))
}

/// Parse a TEXT column through `FromStr`, surfacing failures as conversion errors.
fn parsed<T>(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn parsed_date(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|r| {
        NaiveDate::parse_from_str(&r, DATE_FORMAT)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

impl SqliteRepository {
    /// Open (or create) the database file and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, BelegError> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).await.map_err(|e| {
            BelegError::Persistence(format!("failed to open {}: {e}", path.display()))
        })?;
        conn.call(|conn| {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            conn.busy_timeout(Duration::from_secs(5))?;
            Ok(())
        })
        .await
        .map_err(map_tr_err("failed to configure connection"))?;

        let repo = Self { conn };
        repo.migrate().await?;
        info!(path = %path.display(), "sqlite repository opened");
        Ok(repo)
    }

    /// Private in-memory database; for tests and throwaway runs.
    pub async fn open_in_memory() -> Result<Self, BelegError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| BelegError::Persistence(format!("failed to open in-memory database: {e}")))?;
        let repo = Self { conn };
        repo.migrate().await?;
        Ok(repo)
    }

    async fn migrate(&self) -> Result<(), BelegError> {
        self.conn
            .call(|conn| {
                conn.execute_batch("PRAGMA foreign_keys = ON;")?;
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await
            .map_err(map_tr_err("failed to apply schema"))
    }

    /// Insert a document with a given number, bypassing allocation
    /// (imports, fixtures). Returns its id.
    pub async fn insert_document(&self, number: DocumentNumber) -> Result<i64, BelegError> {
        let family = number.family.prefix();
        let number_display = number.display();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO documents (family, number) VALUES (?1, ?2)",
                    params![family, number_display],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(map_tr_err("failed to insert document"))
    }

    /// Store an invoice and its lines; it also becomes a document under the same id.
    pub async fn insert_invoice(&self, invoice: Invoice) -> Result<(), BelegError> {
        let number = DocumentNumber::parse(&invoice.number)?;
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO documents (id, family, number) VALUES (?1, ?2, ?3)",
                    params![invoice.id, number.family.prefix(), invoice.number],
                )?;
                tx.execute(
                    "INSERT OR REPLACE INTO invoices
                     (id, client_id, issue_date, due_date, vat_rate, additional_info)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        invoice.id,
                        invoice.client_id,
                        invoice.issue_date.format(DATE_FORMAT).to_string(),
                        invoice.due_date.map(|d| d.format(DATE_FORMAT).to_string()),
                        invoice.vat_rate.to_string(),
                        invoice.additional_info,
                    ],
                )?;
                tx.execute(
                    "DELETE FROM invoice_lines WHERE invoice_id = ?1",
                    params![invoice.id],
                )?;
                for (position, line) in invoice.lines.iter().enumerate() {
                    tx.execute(
                        "INSERT INTO invoice_lines
                         (invoice_id, position, description, quantity, unit_price)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            invoice.id,
                            position as i64,
                            line.description,
                            line.quantity.to_string(),
                            line.unit_price.to_string(),
                        ],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(map_tr_err("failed to insert invoice"))
    }

    pub async fn insert_client(&self, client: Client) -> Result<(), BelegError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO clients
                     (id, name, company_name, address, postal_code, city, country)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        client.id,
                        client.name,
                        client.company_name,
                        client.address,
                        client.postal_code,
                        client.city,
                        client.country,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err("failed to insert client"))
    }

    pub async fn set_agency_settings(&self, settings: AgencySettings) -> Result<(), BelegError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO agency_settings
                     (id, company_name, represented_by, street, postal_code, city, country, iban, qr_iban)
                     VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        settings.company_name,
                        settings.represented_by,
                        settings.street,
                        settings.postal_code,
                        settings.city,
                        settings.country,
                        settings.iban,
                        settings.qr_iban,
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(map_tr_err("failed to store agency settings"))
    }
}

#[async_trait]
impl DocumentRepository for SqliteRepository {
    async fn find_max_document_number(
        &self,
        key: SequenceKey,
    ) -> Result<Option<String>, BelegError> {
        let pattern = key.like_pattern();
        self.conn
            .call(move |conn| {
                let max = conn
                    .query_row(
                        "SELECT number FROM documents WHERE number LIKE ?1
                         ORDER BY number DESC LIMIT 1",
                        params![pattern],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                Ok(max)
            })
            .await
            .map_err(map_tr_err("failed to read maximum document number"))
    }

    async fn create_numbered_document(
        &self,
        key: SequenceKey,
        next: NextNumber,
    ) -> Result<DocumentRecord, BelegError> {
        let pattern = key.like_pattern();
        let (id, number) = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let max = tx
                    .query_row(
                        "SELECT number FROM documents WHERE number LIKE ?1
                         ORDER BY number DESC LIMIT 1",
                        params![pattern],
                        |row| row.get::<_, String>(0),
                    )
                    .optional()?;
                let number = next(max.as_deref());
                tx.execute(
                    "INSERT INTO documents (family, number) VALUES (?1, ?2)",
                    params![number.family.prefix(), number.display()],
                )?;
                let id = tx.last_insert_rowid();
                tx.commit()?;
                Ok((id, number))
            })
            .await
            .map_err(|e: tokio_rusqlite::Error<rusqlite::Error>| {
                BelegError::AllocationFailed(format!("{key}: {e}"))
            })?;

        debug!(id, number = %number, "inserted numbered document");
        Ok(DocumentRecord {
            id,
            number,
            artifacts: BTreeMap::new(),
        })
    }

    async fn document(&self, id: i64) -> Result<Option<DocumentRecord>, BelegError> {
        self.conn
            .call(move |conn| {
                let number = conn
                    .query_row(
                        "SELECT number FROM documents WHERE id = ?1",
                        params![id],
                        |row| parsed::<DocumentNumber>(row, 0),
                    )
                    .optional()?;
                let Some(number) = number else {
                    return Ok(None);
                };

                let mut stmt = conn
                    .prepare("SELECT kind, path FROM document_artifacts WHERE document_id = ?1")?;
                let rows = stmt.query_map(params![id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                let mut artifacts = BTreeMap::new();
                for row in rows {
                    let (kind, path) = row?;
                    if let Some(kind) = ArtifactKind::from_dir_name(&kind) {
                        artifacts.insert(kind, path);
                    }
                }
                Ok(Some(DocumentRecord {
                    id,
                    number,
                    artifacts,
                }))
            })
            .await
            .map_err(map_tr_err("failed to read document"))
    }

    async fn update_artifact_path(
        &self,
        id: i64,
        kind: ArtifactKind,
        path: &str,
    ) -> Result<(), BelegError> {
        let path = path.to_string();
        let updated = self
            .conn
            .call(move |conn| {
                let exists = conn
                    .query_row("SELECT 1 FROM documents WHERE id = ?1", params![id], |_| Ok(()))
                    .optional()?
                    .is_some();
                if !exists {
                    return Ok(false);
                }
                conn.execute(
                    "INSERT INTO document_artifacts (document_id, kind, path) VALUES (?1, ?2, ?3)
                     ON CONFLICT (document_id, kind) DO UPDATE
                     SET path = excluded.path,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![id, kind.dir_name(), path],
                )?;
                Ok(true)
            })
            .await
            .map_err(map_tr_err("failed to record artifact path"))?;

        if !updated {
            return Err(BelegError::NotFound(format!("document {id}")));
        }
        Ok(())
    }
}

#[async_trait]
impl BillingDirectory for SqliteRepository {
    async fn invoice(&self, id: i64) -> Result<Option<Invoice>, BelegError> {
        self.conn
            .call(move |conn| {
                let head = conn
                    .query_row(
                        "SELECT d.number, i.client_id, i.issue_date, i.due_date, i.vat_rate,
                                i.additional_info
                         FROM invoices i JOIN documents d ON d.id = i.id
                         WHERE i.id = ?1",
                        params![id],
                        |row| {
                            Ok(Invoice {
                                id,
                                number: row.get(0)?,
                                client_id: row.get(1)?,
                                issue_date: parsed(row, 2)?,
                                due_date: parsed_date(row, 3)?,
                                lines: Vec::new(),
                                vat_rate: parsed::<Decimal>(row, 4)?,
                                additional_info: row.get(5)?,
                            })
                        },
                    )
                    .optional()?;
                let Some(mut invoice) = head else {
                    return Ok(None);
                };

                let mut stmt = conn.prepare(
                    "SELECT description, quantity, unit_price FROM invoice_lines
                     WHERE invoice_id = ?1 ORDER BY position",
                )?;
                invoice.lines = stmt
                    .query_map(params![id], |row| {
                        Ok(LineItem {
                            description: row.get(0)?,
                            quantity: parsed(row, 1)?,
                            unit_price: parsed(row, 2)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Some(invoice))
            })
            .await
            .map_err(map_tr_err("failed to read invoice"))
    }

    async fn client(&self, id: i64) -> Result<Option<Client>, BelegError> {
        self.conn
            .call(move |conn| {
                let client = conn
                    .query_row(
                        "SELECT name, company_name, address, postal_code, city, country
                         FROM clients WHERE id = ?1",
                        params![id],
                        |row| {
                            Ok(Client {
                                id,
                                name: row.get(0)?,
                                company_name: row.get(1)?,
                                address: row.get(2)?,
                                postal_code: row.get(3)?,
                                city: row.get(4)?,
                                country: row.get(5)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(client)
            })
            .await
            .map_err(map_tr_err("failed to read client"))
    }

    async fn agency_settings(&self) -> Result<AgencySettings, BelegError> {
        self.conn
            .call(|conn| {
                let settings = conn
                    .query_row(
                        "SELECT company_name, represented_by, street, postal_code, city, country,
                                iban, qr_iban
                         FROM agency_settings WHERE id = 1",
                        [],
                        |row| {
                            Ok(AgencySettings {
                                company_name: row.get(0)?,
                                represented_by: row.get(1)?,
                                street: row.get(2)?,
                                postal_code: row.get(3)?,
                                city: row.get(4)?,
                                country: row.get(5)?,
                                iban: row.get(6)?,
                                qr_iban: row.get(7)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(settings.unwrap_or_default())
            })
            .await
            .map_err(map_tr_err("failed to read agency settings"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DocumentFamily, InvoiceBuilder};
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn max_number_uses_like_prefix() {
        let repo = SqliteRepository::open_in_memory().await.unwrap();
        for (family, year, seq) in [
            (DocumentFamily::Invoice, 2025, 2),
            (DocumentFamily::Invoice, 2025, 11),
            (DocumentFamily::Invoice, 2024, 40),
            (DocumentFamily::Contract, 2025, 99),
        ] {
            repo.insert_document(DocumentNumber::new(family, year, seq))
                .await
                .unwrap();
        }
        let max = repo
            .find_max_document_number(SequenceKey::new(DocumentFamily::Invoice, 2025))
            .await
            .unwrap();
        assert_eq!(max.as_deref(), Some("FAC-2025-0011"));
    }

    #[tokio::test]
    async fn allocation_commits_in_one_transaction() {
        let repo = SqliteRepository::open_in_memory().await.unwrap();
        let key = SequenceKey::new(DocumentFamily::Contract, 2025);
        let record = repo
            .create_numbered_document(
                key,
                Box::new(|max: Option<&str>| {
                    assert!(max.is_none());
                    DocumentNumber::new(DocumentFamily::Contract, 2025, 1)
                }),
            )
            .await
            .unwrap();
        assert_eq!(record.number.display(), "CTR-2025-0001");

        let err = repo
            .create_numbered_document(
                key,
                Box::new(|_: Option<&str>| DocumentNumber::new(DocumentFamily::Contract, 2025, 1)),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BelegError::AllocationFailed(_)));
    }

    #[tokio::test]
    async fn invoice_round_trips_with_lines() {
        let repo = SqliteRepository::open_in_memory().await.unwrap();
        let invoice = InvoiceBuilder::new(7, "FAC-2025-0007", NaiveDate::from_ymd_opt(2025, 3, 1).unwrap())
            .client(3)
            .add_line(LineItem::new("Atelier", dec!(2), dec!(450)))
            .add_line(LineItem::new("Frais", dec!(1), dec!(35.50)))
            .additional_info("Mandat 2025")
            .build()
            .unwrap();
        repo.insert_invoice(invoice.clone()).await.unwrap();

        let stored = repo.invoice(7).await.unwrap().unwrap();
        assert_eq!(stored, invoice);
        assert_eq!(stored.totals().net, dec!(935.50));
        assert!(repo.invoice(8).await.unwrap().is_none());

        let doc = repo.document(7).await.unwrap().unwrap();
        assert_eq!(doc.number.display(), "FAC-2025-0007");
    }

    #[tokio::test]
    async fn artifact_path_upserts() {
        let repo = SqliteRepository::open_in_memory().await.unwrap();
        let id = repo
            .insert_document(DocumentNumber::new(DocumentFamily::Invoice, 2025, 1))
            .await
            .unwrap();
        repo.update_artifact_path(id, ArtifactKind::QrBills, "qr-bills/2025/a.pdf")
            .await
            .unwrap();
        repo.update_artifact_path(id, ArtifactKind::QrBills, "qr-bills/2025/QR-FAC-2025-0001.pdf")
            .await
            .unwrap();
        let doc = repo.document(id).await.unwrap().unwrap();
        assert_eq!(
            doc.artifact_path(ArtifactKind::QrBills),
            Some("qr-bills/2025/QR-FAC-2025-0001.pdf")
        );
        assert_eq!(doc.artifacts.len(), 1);

        let err = repo
            .update_artifact_path(404, ArtifactKind::QrBills, "x")
            .await
            .unwrap_err();
        assert!(matches!(err, BelegError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_settings_are_empty() {
        let repo = SqliteRepository::open_in_memory().await.unwrap();
        assert_eq!(repo.agency_settings().await.unwrap(), AgencySettings::default());

        let settings = AgencySettings {
            company_name: Some("Agence Lumen Sàrl".into()),
            iban: Some("CH9300762011623852957".into()),
            ..Default::default()
        };
        repo.set_agency_settings(settings.clone()).await.unwrap();
        assert_eq!(repo.agency_settings().await.unwrap(), settings);
    }
}
