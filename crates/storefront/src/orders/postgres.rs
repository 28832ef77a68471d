//! `PostgreSQL` fallback order store.
//!
//! Writes to `storefront.orders` and `storefront.order_items`. Queries are
//! runtime-checked so the crate builds without a live database.

use async_trait::async_trait;
use atelier_core::{BasketLine, OrderKey};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use super::store::{NewOrder, OrderStore, StoreError};

/// Repository for fallback order writes.
#[derive(Clone)]
pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_order(&self, order: &NewOrder<'_>) -> Result<OrderKey, StoreError> {
        let form = &order.draft.form;
        let billing = form.billing_address();
        let delivery = form.delivery_address();
        let amounts = &order.draft.amounts;
        let invoice = |value: &str| {
            (form.needs_company_invoice && !value.trim().is_empty()).then(|| value.trim().to_owned())
        };
        let notes = Some(form.notes.trim()).filter(|n| !n.is_empty());

        let key = sqlx::query_scalar::<_, OrderKey>(
            r"
            INSERT INTO storefront.orders (
                order_number, payment_reference, status,
                first_name, last_name, email, phone,
                company_name, company_tax_id,
                billing_street, billing_city, billing_postal_code,
                shipping_street, shipping_city, shipping_postal_code,
                shipping_method, notes,
                subtotal, shipping_cost, vat_amount, total_amount,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12,
                    $13, $14, $15, $16, $17, $18, $19, $20, $21, $22)
            RETURNING id
            ",
        )
        .bind(order.order_number.as_str())
        .bind(order.payment_reference.as_str())
        .bind(order.status.as_str())
        .bind(form.first_name.trim())
        .bind(form.last_name.trim())
        .bind(form.email.trim())
        .bind(form.phone.trim())
        .bind(invoice(&form.company_name))
        .bind(invoice(&form.company_tax_id))
        .bind(&billing.street)
        .bind(&billing.city)
        .bind(&billing.postal_code)
        .bind(&delivery.street)
        .bind(&delivery.city)
        .bind(&delivery.postal_code)
        .bind(&form.shipping_method)
        .bind(notes)
        .bind(amounts.subtotal)
        .bind(amounts.shipping)
        .bind(amounts.vat)
        .bind(amounts.total)
        .bind(order.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(key)
    }

    async fn insert_items(&self, order: OrderKey, lines: &[BasketLine]) -> Result<(), StoreError> {
        if lines.is_empty() {
            return Ok(());
        }

        let rows = lines
            .iter()
            .map(|line| {
                let quantity = i32::try_from(line.quantity).map_err(|_| {
                    StoreError::DataCorruption(format!("quantity {} out of range", line.quantity))
                })?;
                Ok((line, quantity))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let mut builder = QueryBuilder::<Postgres>::new(
            "INSERT INTO storefront.order_items \
             (order_id, product_id, product_name, quantity, unit_price, line_total, options) ",
        );
        builder.push_values(rows, |mut row, (line, quantity)| {
            row.push_bind(order)
                .push_bind(line.product_id.as_str().to_owned())
                .push_bind(line.product_name.clone())
                .push_bind(quantity)
                .push_bind(line.effective_unit_price())
                .push_bind(line.line_total())
                .push_bind(Json(line.options.clone()));
        });

        builder.build().execute(&self.pool).await?;
        Ok(())
    }
}
