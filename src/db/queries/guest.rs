//! Guest database queries

use anyhow::Result;
use sqlx::PgPool;
use uuid::Uuid;

use crate::types::guest::{Guest, GuestRecord, StoredGuest};

/// Insert a batch of imported guests in a single transaction.
/// Either every guest is stored or none is.
pub async fn insert_guest_batch(
    pool: &PgPool,
    event_id: Uuid,
    guests: &[GuestRecord],
) -> Result<Vec<StoredGuest>> {
    let mut tx = pool.begin().await?;
    let mut stored = Vec::with_capacity(guests.len());

    for guest in guests {
        let guest_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO guests (
                id, event_id, name, email, phone, rsvp_status,
                arrival_date, arrival_time, departure_date, departure_time,
                room_number, room_type, dietary_restrictions, plus_one,
                transport_needed, special_requests, events, created_at
            )
            VALUES (
                $1, $2, $3, $4, $5, $6,
                $7, $8, $9, $10,
                $11, $12, $13, $14,
                $15, $16, $17, NOW()
            )
            "#,
        )
        .bind(guest_id)
        .bind(event_id)
        .bind(&guest.name)
        .bind(&guest.email)
        .bind(&guest.phone)
        .bind(guest.rsvp_status.as_str())
        .bind(&guest.arrival_date)
        .bind(&guest.arrival_time)
        .bind(&guest.departure_date)
        .bind(&guest.departure_time)
        .bind(&guest.room_number)
        .bind(&guest.room_type)
        .bind(&guest.dietary_restrictions)
        .bind(&guest.plus_one)
        .bind(guest.transport_needed)
        .bind(&guest.special_requests)
        .bind(&guest.events)
        .execute(&mut *tx)
        .await?;

        stored.push(StoredGuest {
            record_id: guest.id,
            guest_id,
        });
    }

    tx.commit().await?;
    Ok(stored)
}

/// List guests of an event, oldest first
pub async fn list_guests(pool: &PgPool, event_id: Uuid) -> Result<Vec<Guest>> {
    let guests = sqlx::query_as::<_, Guest>(
        r#"
        SELECT
            id, event_id, name, email, phone, rsvp_status,
            arrival_date, arrival_time, departure_date, departure_time,
            room_number, room_type, dietary_restrictions, plus_one,
            transport_needed, special_requests, events, created_at
        FROM guests
        WHERE event_id = $1
        ORDER BY created_at, name
        "#,
    )
    .bind(event_id)
    .fetch_all(pool)
    .await?;

    Ok(guests)
}
