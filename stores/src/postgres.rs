//! PostgreSQL repository.
//!
//! One [`PostgresStore`] implements the shipment, partner and seller
//! repositories over a shared pool.
//!
//! # Capacity check
//!
//! `insert_assigned` runs in a transaction that locks the partner row with
//! `SELECT ... FOR UPDATE` before counting the partner's active shipments.
//! Concurrent creates for the same partner therefore queue on the row lock,
//! and each one counts the shipments committed before it.
//!
//! # Example
//!
//! ```no_run
//! use shiptrack_core::config::PostgresConfig;
//! use shiptrack_stores::PostgresStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresStore::connect(&PostgresConfig::default()).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use shiptrack_core::capacity::PartnerCapacity;
use shiptrack_core::config::PostgresConfig;
use shiptrack_core::error::{Result, ShipmentError};
use shiptrack_core::providers::{PartnerRepository, SellerRepository, ShipmentRepository};
use shiptrack_core::types::{
    Account, DeliveryPartner, EventId, PartnerId, Review, ReviewId, Seller, SellerId, Shipment,
    ShipmentEvent, ShipmentId, ShipmentStatus, Tag, TagName,
};
use sqlx::error::ErrorKind;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, Row, Transaction};
use std::time::Duration;
use uuid::Uuid;

/// Correlated count of `p`'s shipments whose latest event is not terminal.
macro_rules! active_shipments_sql {
    () => {
        "(SELECT COUNT(*) FROM shipments s \
           WHERE s.partner_id = p.id \
             AND COALESCE((SELECT e.status FROM shipment_events e \
                            WHERE e.shipment_id = s.id \
                            ORDER BY e.created_at DESC, e.sequence DESC \
                            LIMIT 1), '') NOT IN ('delivered', 'cancelled'))"
    };
}

macro_rules! partner_columns {
    () => {
        "p.id, p.name, p.email, p.email_verified, p.created_at, \
         p.serviceable_zip_codes, p.max_handling_capacity"
    };
}

const SHIPMENT_COLUMNS: &str = "id, content, weight, destination, client_contact_email, \
     client_contact_phone, seller_id, partner_id, created_at, estimated_delivery";

/// PostgreSQL-backed repository.
#[derive(Clone, Debug)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Wrap an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open a pool from configuration.
    ///
    /// # Errors
    ///
    /// Returns error if the database cannot be reached.
    pub async fn connect(config: &PostgresConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect(&config.url)
            .await
            .map_err(|e| db_error("Failed to connect to PostgreSQL", &e))?;

        tracing::info!(max_connections = config.max_connections, "PostgresStore connected");
        Ok(Self::new(pool))
    }

    /// Run the bundled migrations.
    ///
    /// # Errors
    ///
    /// Returns error if a migration fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| ShipmentError::Storage(format!("Migration failed: {e}")))
    }

    /// Underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn load_children(&self, shipment: &mut Shipment) -> Result<()> {
        let events = sqlx::query(
            "SELECT id, shipment_id, location, status, description, created_at, sequence \
             FROM shipment_events WHERE shipment_id = $1 ORDER BY sequence",
        )
        .bind(shipment.id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load timeline", &e))?;
        shipment.timeline = events.iter().map(event_from_row).collect::<Result<_>>()?;

        let review = sqlx::query(
            "SELECT id, shipment_id, rating, comment, created_at FROM reviews WHERE shipment_id = $1",
        )
        .bind(shipment.id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load review", &e))?;
        shipment.review = review.as_ref().map(review_from_row).transpose()?;

        let tags = sqlx::query(
            "SELECT name, instruction FROM shipment_tags WHERE shipment_id = $1 ORDER BY position",
        )
        .bind(shipment.id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to load tags", &e))?;
        shipment.tags = tags.iter().map(tag_from_row).collect::<Result<_>>()?;

        Ok(())
    }

    async fn claim_email(tx: &mut Transaction<'_, Postgres>, email: &str) -> Result<()> {
        sqlx::query("INSERT INTO account_emails (email) VALUES ($1)")
            .bind(email)
            .execute(&mut **tx)
            .await
            .map_err(|e| match error_kind(&e) {
                Some(ErrorKind::UniqueViolation) => {
                    ShipmentError::Conflict("email already registered".into())
                }
                _ => db_error("Failed to register email", &e),
            })?;
        Ok(())
    }
}

// ============================================================================
// Row mapping
// ============================================================================

fn db_error(context: &str, e: &sqlx::Error) -> ShipmentError {
    ShipmentError::Storage(format!("{context}: {e}"))
}

fn error_kind(e: &sqlx::Error) -> Option<ErrorKind> {
    e.as_database_error().map(|db| db.kind())
}

fn column<'r, T>(row: &'r PgRow, name: &str) -> Result<T>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| db_error(&format!("Failed to decode column {name}"), &e))
}

fn to_u32(value: i64, field: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| ShipmentError::Storage(format!("{field} out of range: {value}")))
}

fn shipment_from_row(row: &PgRow) -> Result<Shipment> {
    Ok(Shipment {
        id: ShipmentId::from_uuid(column(row, "id")?),
        content: column(row, "content")?,
        weight: column(row, "weight")?,
        destination: to_u32(column(row, "destination")?, "destination")?,
        client_contact_email: column(row, "client_contact_email")?,
        client_contact_phone: column(row, "client_contact_phone")?,
        seller_id: SellerId::from_uuid(column(row, "seller_id")?),
        partner_id: column::<Option<Uuid>>(row, "partner_id")?.map(PartnerId::from_uuid),
        created_at: column(row, "created_at")?,
        estimated_delivery: column(row, "estimated_delivery")?,
        timeline: Vec::new(),
        review: None,
        tags: Vec::new(),
    })
}

fn event_from_row(row: &PgRow) -> Result<ShipmentEvent> {
    let status: String = column(row, "status")?;
    let sequence: i64 = column(row, "sequence")?;
    Ok(ShipmentEvent {
        id: EventId::from_uuid(column(row, "id")?),
        shipment_id: ShipmentId::from_uuid(column(row, "shipment_id")?),
        location: to_u32(column(row, "location")?, "location")?,
        status: status
            .parse::<ShipmentStatus>()
            .map_err(|e| ShipmentError::Storage(e.to_string()))?,
        description: column(row, "description")?,
        created_at: column(row, "created_at")?,
        sequence: u64::try_from(sequence)
            .map_err(|_| ShipmentError::Storage(format!("sequence out of range: {sequence}")))?,
    })
}

fn review_from_row(row: &PgRow) -> Result<Review> {
    let rating: i16 = column(row, "rating")?;
    Ok(Review {
        id: ReviewId::from_uuid(column(row, "id")?),
        shipment_id: ShipmentId::from_uuid(column(row, "shipment_id")?),
        rating: u8::try_from(rating)
            .map_err(|_| ShipmentError::Storage(format!("rating out of range: {rating}")))?,
        comment: column(row, "comment")?,
        created_at: column(row, "created_at")?,
    })
}

fn tag_from_row(row: &PgRow) -> Result<Tag> {
    let name: String = column(row, "name")?;
    Ok(Tag {
        name: name
            .parse::<TagName>()
            .map_err(|e| ShipmentError::Storage(e.to_string()))?,
        instruction: column(row, "instruction")?,
    })
}

fn account_from_row<Id>(row: &PgRow, id: impl FnOnce(Uuid) -> Id) -> Result<Account<Id>> {
    Ok(Account {
        id: id(column(row, "id")?),
        name: column(row, "name")?,
        email: column(row, "email")?,
        email_verified: column(row, "email_verified")?,
        created_at: column(row, "created_at")?,
    })
}

fn partner_from_row(row: &PgRow) -> Result<DeliveryPartner> {
    let zip_codes: Vec<i64> = column(row, "serviceable_zip_codes")?;
    Ok(DeliveryPartner {
        account: account_from_row(row, PartnerId::from_uuid)?,
        serviceable_zip_codes: zip_codes
            .into_iter()
            .map(|zip| to_u32(zip, "serviceable_zip_codes"))
            .collect::<Result<_>>()?,
        max_handling_capacity: to_u32(
            column(row, "max_handling_capacity")?,
            "max_handling_capacity",
        )?,
    })
}

fn capacity_from_row(row: &PgRow) -> Result<PartnerCapacity> {
    Ok(PartnerCapacity {
        partner: partner_from_row(row)?,
        active_shipments: to_u32(column(row, "active_shipments")?, "active_shipments")?,
    })
}

fn seller_from_row(row: &PgRow) -> Result<Seller> {
    Ok(Seller {
        account: account_from_row(row, SellerId::from_uuid)?,
        zip_code: to_u32(column(row, "zip_code")?, "zip_code")?,
        address: column(row, "address")?,
    })
}

fn zip_array(zip_codes: impl IntoIterator<Item = u32>) -> Vec<i64> {
    zip_codes.into_iter().map(i64::from).collect()
}

async fn insert_event(
    tx: &mut Transaction<'_, Postgres>,
    event: &ShipmentEvent,
) -> std::result::Result<(), sqlx::Error> {
    let sequence = i64::try_from(event.sequence).unwrap_or(i64::MAX);
    sqlx::query(
        "INSERT INTO shipment_events \
         (id, shipment_id, location, status, description, created_at, sequence) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(event.id.0)
    .bind(event.shipment_id.0)
    .bind(i64::from(event.location))
    .bind(event.status.as_str())
    .bind(&event.description)
    .bind(event.created_at)
    .bind(sequence)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

// ============================================================================
// Shipments
// ============================================================================

impl ShipmentRepository for PostgresStore {
    async fn insert_assigned(&self, shipment: &Shipment, partner: PartnerId) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", &e))?;

        // Serializes concurrent assignments to this partner
        let locked = sqlx::query(
            "SELECT max_handling_capacity FROM delivery_partners WHERE id = $1 FOR UPDATE",
        )
        .bind(partner.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to lock partner", &e))?;
        let Some(locked) = locked else {
            return Err(ShipmentError::not_found("partner", partner));
        };
        let max_handling_capacity: i64 = column(&locked, "max_handling_capacity")?;

        let active: i64 = sqlx::query_scalar(concat!(
            "SELECT ",
            active_shipments_sql!(),
            " FROM delivery_partners p WHERE p.id = $1"
        ))
        .bind(partner.0)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to count active shipments", &e))?;

        if active >= max_handling_capacity {
            tracing::debug!(
                partner_id = %partner,
                active,
                max_handling_capacity,
                "Partner capacity exhausted"
            );
            return Err(ShipmentError::CapacityExhausted);
        }

        sqlx::query(
            "INSERT INTO shipments \
             (id, content, weight, destination, client_contact_email, client_contact_phone, \
              seller_id, partner_id, created_at, estimated_delivery) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(shipment.id.0)
        .bind(&shipment.content)
        .bind(shipment.weight)
        .bind(i64::from(shipment.destination))
        .bind(&shipment.client_contact_email)
        .bind(&shipment.client_contact_phone)
        .bind(shipment.seller_id.0)
        .bind(partner.0)
        .bind(shipment.created_at)
        .bind(shipment.estimated_delivery)
        .execute(&mut *tx)
        .await
        .map_err(|e| match error_kind(&e) {
            Some(ErrorKind::UniqueViolation) => {
                ShipmentError::Conflict(format!("shipment {} already exists", shipment.id))
            }
            _ => db_error("Failed to insert shipment", &e),
        })?;

        for event in &shipment.timeline {
            insert_event(&mut tx, event)
                .await
                .map_err(|e| db_error("Failed to insert event", &e))?;
        }

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", &e))?;

        tracing::debug!(shipment_id = %shipment.id, partner_id = %partner, "Shipment stored");
        Ok(())
    }

    async fn get_shipment(&self, id: ShipmentId) -> Result<Option<Shipment>> {
        let row = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get shipment", &e))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut shipment = shipment_from_row(&row)?;
        self.load_children(&mut shipment).await?;
        Ok(Some(shipment))
    }

    async fn list_shipments(&self) -> Result<Vec<Shipment>> {
        let rows = sqlx::query(&format!(
            "SELECT {SHIPMENT_COLUMNS} FROM shipments ORDER BY created_at, id"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to list shipments", &e))?;

        let mut shipments = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut shipment = shipment_from_row(row)?;
            self.load_children(&mut shipment).await?;
            shipments.push(shipment);
        }
        Ok(shipments)
    }

    async fn update_estimated_delivery(
        &self,
        id: ShipmentId,
        estimated_delivery: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query("UPDATE shipments SET estimated_delivery = $2 WHERE id = $1")
            .bind(id.0)
            .bind(estimated_delivery)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to update estimated delivery", &e))?;

        if result.rows_affected() == 0 {
            return Err(ShipmentError::not_found("shipment", id));
        }
        Ok(())
    }

    async fn append_event(&self, event: &ShipmentEvent) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", &e))?;

        insert_event(&mut tx, event)
            .await
            .map_err(|e| match error_kind(&e) {
                Some(ErrorKind::ForeignKeyViolation) => {
                    ShipmentError::not_found("shipment", event.shipment_id)
                }
                Some(ErrorKind::UniqueViolation) => ShipmentError::Conflict(format!(
                    "event {} already recorded for shipment {}",
                    event.sequence, event.shipment_id
                )),
                _ => db_error("Failed to append event", &e),
            })?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", &e))
    }

    async fn insert_review(&self, review: &Review) -> Result<()> {
        sqlx::query(
            "INSERT INTO reviews (id, shipment_id, rating, comment, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(review.id.0)
        .bind(review.shipment_id.0)
        .bind(i16::from(review.rating))
        .bind(&review.comment)
        .bind(review.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match error_kind(&e) {
            Some(ErrorKind::UniqueViolation) => {
                ShipmentError::Conflict("shipment has already been reviewed".into())
            }
            Some(ErrorKind::ForeignKeyViolation) => {
                ShipmentError::not_found("shipment", review.shipment_id)
            }
            _ => db_error("Failed to insert review", &e),
        })?;
        Ok(())
    }

    async fn add_tag(&self, id: ShipmentId, tag: &Tag) -> Result<()> {
        sqlx::query(
            "INSERT INTO shipment_tags (shipment_id, name, instruction) VALUES ($1, $2, $3)",
        )
        .bind(id.0)
        .bind(tag.name.as_str())
        .bind(&tag.instruction)
        .execute(&self.pool)
        .await
        .map_err(|e| match error_kind(&e) {
            Some(ErrorKind::UniqueViolation) => {
                ShipmentError::Conflict(format!("tag {} is already attached", tag.name))
            }
            Some(ErrorKind::ForeignKeyViolation) => ShipmentError::not_found("shipment", id),
            _ => db_error("Failed to add tag", &e),
        })?;
        Ok(())
    }

    async fn remove_tag(&self, id: ShipmentId, name: TagName) -> Result<()> {
        let result = sqlx::query("DELETE FROM shipment_tags WHERE shipment_id = $1 AND name = $2")
            .bind(id.0)
            .bind(name.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to remove tag", &e))?;

        if result.rows_affected() == 0 {
            return Err(ShipmentError::Conflict(format!("tag {name} is not attached")));
        }
        Ok(())
    }

    async fn delete_shipment(&self, id: ShipmentId) -> Result<bool> {
        // Events, review and tags go with it (ON DELETE CASCADE)
        let result = sqlx::query("DELETE FROM shipments WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to delete shipment", &e))?;
        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Delivery partners
// ============================================================================

impl PartnerRepository for PostgresStore {
    async fn find_serviceable(&self, destination: u32) -> Result<Vec<PartnerCapacity>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            partner_columns!(),
            ", ",
            active_shipments_sql!(),
            " AS active_shipments FROM delivery_partners p \
             WHERE $1 = ANY(p.serviceable_zip_codes) \
             ORDER BY p.created_at, p.id"
        ))
        .bind(i64::from(destination))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| db_error("Failed to find serviceable partners", &e))?;

        rows.iter().map(capacity_from_row).collect()
    }

    async fn partner_capacity(&self, id: PartnerId) -> Result<Option<PartnerCapacity>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            partner_columns!(),
            ", ",
            active_shipments_sql!(),
            " AS active_shipments FROM delivery_partners p WHERE p.id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get partner capacity", &e))?;

        row.as_ref().map(capacity_from_row).transpose()
    }

    async fn get_partner(&self, id: PartnerId) -> Result<Option<DeliveryPartner>> {
        let row = sqlx::query(concat!(
            "SELECT ",
            partner_columns!(),
            " FROM delivery_partners p WHERE p.id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get partner", &e))?;

        row.as_ref().map(partner_from_row).transpose()
    }

    async fn insert_partner(&self, partner: &DeliveryPartner) -> Result<()> {
        let email = partner.account.email.to_lowercase();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", &e))?;

        Self::claim_email(&mut tx, &email).await?;

        let max_handling_capacity = i64::from(partner.max_handling_capacity);
        sqlx::query(
            "INSERT INTO delivery_partners \
             (id, name, email, email_verified, created_at, serviceable_zip_codes, max_handling_capacity) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(partner.id().0)
        .bind(&partner.account.name)
        .bind(&email)
        .bind(partner.account.email_verified)
        .bind(partner.account.created_at)
        .bind(zip_array(partner.serviceable_zip_codes.iter().copied()))
        .bind(max_handling_capacity)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to insert partner", &e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", &e))?;

        tracing::info!(partner_id = %partner.id(), "Delivery partner stored");
        Ok(())
    }

    async fn update_partner(&self, partner: &DeliveryPartner) -> Result<()> {
        let result = sqlx::query(
            "UPDATE delivery_partners \
             SET serviceable_zip_codes = $2, max_handling_capacity = $3 WHERE id = $1",
        )
        .bind(partner.id().0)
        .bind(zip_array(partner.serviceable_zip_codes.iter().copied()))
        .bind(i64::from(partner.max_handling_capacity))
        .execute(&self.pool)
        .await
        .map_err(|e| db_error("Failed to update partner", &e))?;

        if result.rows_affected() == 0 {
            return Err(ShipmentError::not_found("partner", partner.id()));
        }
        Ok(())
    }

    async fn set_partner_email_verified(&self, id: PartnerId) -> Result<bool> {
        let result = sqlx::query("UPDATE delivery_partners SET email_verified = TRUE WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to verify partner email", &e))?;
        Ok(result.rows_affected() > 0)
    }
}

// ============================================================================
// Sellers
// ============================================================================

impl SellerRepository for PostgresStore {
    async fn insert_seller(&self, seller: &Seller) -> Result<()> {
        let email = seller.account.email.to_lowercase();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("Failed to begin transaction", &e))?;

        Self::claim_email(&mut tx, &email).await?;

        sqlx::query(
            "INSERT INTO sellers (id, name, email, email_verified, created_at, zip_code, address) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(seller.id().0)
        .bind(&seller.account.name)
        .bind(&email)
        .bind(seller.account.email_verified)
        .bind(seller.account.created_at)
        .bind(i64::from(seller.zip_code))
        .bind(&seller.address)
        .execute(&mut *tx)
        .await
        .map_err(|e| db_error("Failed to insert seller", &e))?;

        tx.commit()
            .await
            .map_err(|e| db_error("Failed to commit transaction", &e))?;

        tracing::info!(seller_id = %seller.id(), "Seller stored");
        Ok(())
    }

    async fn get_seller(&self, id: SellerId) -> Result<Option<Seller>> {
        let row = sqlx::query(
            "SELECT id, name, email, email_verified, created_at, zip_code, address \
             FROM sellers WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| db_error("Failed to get seller", &e))?;

        row.as_ref().map(seller_from_row).transpose()
    }

    async fn set_seller_email_verified(&self, id: SellerId) -> Result<bool> {
        let result = sqlx::query("UPDATE sellers SET email_verified = TRUE WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| db_error("Failed to verify seller email", &e))?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use shiptrack_core::mocks::{sample_partner, sample_seller, sample_shipment};

    async fn store() -> PostgresStore {
        let config = PostgresConfig {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| PostgresConfig::default().url),
            ..PostgresConfig::default()
        };
        let store = PostgresStore::connect(&config).await.unwrap();
        store.migrate().await.unwrap();
        store
    }

    fn unique(name: &str) -> String {
        format!("{name} {}", Uuid::new_v4().simple())
    }

    fn event(shipment: ShipmentId, status: ShipmentStatus, sequence: u64) -> ShipmentEvent {
        ShipmentEvent {
            id: EventId::new(),
            shipment_id: shipment,
            location: 11001,
            status,
            description: format!("{status}"),
            created_at: Utc::now(),
            sequence,
        }
    }

    #[test]
    fn test_zip_array_widens() {
        assert_eq!(zip_array([11001, u32::MAX]), vec![11001, i64::from(u32::MAX)]);
    }

    #[test]
    fn test_to_u32_rejects_out_of_range() {
        assert!(to_u32(-1, "zip").is_err());
        assert_eq!(to_u32(11001, "zip").unwrap(), 11001);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (DATABASE_URL)"]
    async fn test_shipment_roundtrip_with_children() {
        let store = store().await;
        let partner = sample_partner(&unique("Partner"), &[11001], 2);
        store.insert_partner(&partner).await.unwrap();

        let shipment = sample_shipment();
        store.insert_assigned(&shipment, partner.id()).await.unwrap();
        store
            .append_event(&event(shipment.id, ShipmentStatus::Placed, 1))
            .await
            .unwrap();
        store.add_tag(shipment.id, &Tag::new(TagName::Fragile)).await.unwrap();

        let stored = store.get_shipment(shipment.id).await.unwrap().unwrap();
        assert_eq!(stored.partner_id, Some(partner.id()));
        assert_eq!(stored.status(), Some(ShipmentStatus::Placed));
        assert!(stored.has_tag(TagName::Fragile));

        assert!(matches!(
            store.add_tag(shipment.id, &Tag::new(TagName::Fragile)).await,
            Err(ShipmentError::Conflict(_))
        ));

        let later = stored.estimated_delivery + ChronoDuration::days(1);
        store.update_estimated_delivery(shipment.id, later).await.unwrap();

        assert!(store.delete_shipment(shipment.id).await.unwrap());
        assert!(store.get_shipment(shipment.id).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (DATABASE_URL)"]
    async fn test_capacity_is_enforced_on_insert() {
        let store = store().await;
        let partner = sample_partner(&unique("Solo"), &[11001], 1);
        store.insert_partner(&partner).await.unwrap();

        let first = sample_shipment();
        store.insert_assigned(&first, partner.id()).await.unwrap();
        store
            .append_event(&event(first.id, ShipmentStatus::Placed, 1))
            .await
            .unwrap();

        let second = sample_shipment();
        assert!(matches!(
            store.insert_assigned(&second, partner.id()).await,
            Err(ShipmentError::CapacityExhausted)
        ));

        // Cancelling frees the slot
        store
            .append_event(&event(first.id, ShipmentStatus::Cancelled, 2))
            .await
            .unwrap();
        store.insert_assigned(&second, partner.id()).await.unwrap();

        let capacity = store.partner_capacity(partner.id()).await.unwrap().unwrap();
        assert_eq!(capacity.active_shipments, 1);
    }

    #[tokio::test]
    #[ignore = "requires PostgreSQL (DATABASE_URL)"]
    async fn test_duplicate_email_across_account_kinds() {
        let store = store().await;
        let seller = sample_seller(&unique("Seller"), 11001);
        store.insert_seller(&seller).await.unwrap();

        let mut partner = sample_partner("Other", &[11001], 1);
        partner.account.email = seller.account.email.to_uppercase();
        assert!(matches!(
            store.insert_partner(&partner).await,
            Err(ShipmentError::Conflict(_))
        ));

        assert!(store.set_seller_email_verified(seller.id()).await.unwrap());
        assert!(!store.set_seller_email_verified(SellerId::new()).await.unwrap());
    }
}
